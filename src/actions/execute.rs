//! Phase execution.
//!
//! Every action works in a work directory that holds the cached workunit
//! definition (`workunit_definition.yml`), `chunks.yml` and one directory
//! per chunk. App commands receive the cached definition file, not the
//! numeric workunit id.

use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};
use serde_json::json;

use super::chunks::{chunk_label, select_chunks, ChunksFile, INPUTS_FILE, OUTPUTS_FILE};
use super::timeline::PhaseTimeline;
use super::types::{Action, ActionDispatch, ActionInputs, ActionOutputs, ActionProcess, ActionRun};
use crate::commands::execute_command;
use crate::error::{IoContext, Result};
use crate::inputs::prepare_folder;
use crate::lims::entities::Workunit;
use crate::lims::{Entity, LimsClient};
use crate::outputs::{register_outputs, register_workflow_step, RegisterOptions};
use crate::specs::parser::{load_runnable_app, RunnableApp};
use crate::specs::workunit::{WorkunitDefinition, WorkunitRef};
use crate::util::paths::{absolutize, expand_user};

pub const WORKUNIT_DEFINITION_FILE: &str = "workunit_definition.yml";

/// Workunit status values written by the driver.
pub mod status {
    pub const PROCESSING: &str = "processing";
    pub const AVAILABLE: &str = "available";
    pub const FAILED: &str = "failed";
}

/// The work directory together with its workunit definition.
struct Workspace {
    work_dir: PathBuf,
    definition_file: PathBuf,
    definition: WorkunitDefinition,
}

impl Workspace {
    /// Resolves `workunit_ref` and caches the definition in the work
    /// directory. Without a ref the cached definition must already exist.
    fn open(work_dir: &Path, workunit_ref: Option<&WorkunitRef>, client: &dyn LimsClient) -> Result<Self> {
        let work_dir = absolutize(&expand_user(work_dir));
        fs::create_dir_all(&work_dir).with_path(&work_dir)?;
        let definition_file = work_dir.join(WORKUNIT_DEFINITION_FILE);

        let definition = match workunit_ref {
            Some(WorkunitRef::Path(path)) => WorkunitDefinition::from_ref(
                &WorkunitRef::Path(absolutize(&expand_user(path))),
                client,
                Some(&definition_file),
            )?,
            Some(id) => WorkunitDefinition::from_ref(id, client, Some(&definition_file))?,
            None => WorkunitDefinition::from_yaml(&definition_file)?,
        };

        Ok(Self {
            work_dir,
            definition_file,
            definition,
        })
    }

    fn chunks(&self, chunk: Option<&str>) -> Result<Vec<PathBuf>> {
        select_chunks(&self.work_dir, chunk)
    }

    fn set_status(&self, client: &dyn LimsClient, status: &str) -> Result<()> {
        let workunit_id = self.definition.registration()?.workunit_id;
        info!("Setting workunit {} status to {}", workunit_id, status);
        client.save(Workunit::ENDPOINT, &json!({ "id": workunit_id, "status": status }))?;
        Ok(())
    }
}

fn arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn dispatch(workspace: &Workspace, app: &RunnableApp, read_only: bool, client: &dyn LimsClient) -> Result<Vec<PathBuf>> {
    if !read_only {
        workspace.set_status(client, status::PROCESSING)?;
    }
    info!("Dispatching app version {}", app.version.version);
    execute_command(
        &app.version.commands.dispatch,
        &[arg(&workspace.definition_file), arg(&workspace.work_dir)],
        Some(&workspace.work_dir),
    )?;

    let chunks = workspace.chunks(None)?;
    info!(
        "Dispatch listed {} chunks in {}",
        ChunksFile::read(&workspace.work_dir)?.chunks.len(),
        workspace.work_dir.display()
    );
    Ok(chunks)
}

fn prepare_chunk(chunk_dir: &Path, client: &dyn LimsClient, ssh_user: Option<&str>, filter: Option<&String>) -> Result<()> {
    prepare_folder(
        &chunk_dir.join(INPUTS_FILE),
        Some(chunk_dir),
        client,
        ssh_user,
        filter.map(std::slice::from_ref),
    )
}

fn process_chunk(workspace: &Workspace, app: &RunnableApp, chunk_dir: &Path) -> Result<()> {
    execute_command(&app.version.commands.process, &[arg(chunk_dir)], Some(&workspace.work_dir))
}

fn collect_and_register(
    workspace: &Workspace,
    app: &RunnableApp,
    chunk_dir: &Path,
    client: &dyn LimsClient,
    options: &RegisterOptions,
    read_only: bool,
) -> Result<()> {
    match &app.version.commands.collect {
        Some(collect) => execute_command(
            collect,
            &[arg(&workspace.definition_file), arg(chunk_dir)],
            Some(&workspace.work_dir),
        )?,
        None => info!("App does not have a collect step."),
    }

    if read_only {
        info!("Read-only mode, skipping output registration of {}", chunk_dir.display());
        return Ok(());
    }
    register_outputs(&chunk_dir.join(OUTPUTS_FILE), &workspace.definition, client, options)
}

fn register_workflow(workspace: &Workspace, app: &RunnableApp, client: &dyn LimsClient) -> Result<()> {
    match app.workflow_template_step_id {
        Some(step_id) => {
            let id = register_workflow_step(&workspace.definition, step_id, client)?;
            info!("Workunit is part of workflow step {}", id);
            Ok(())
        }
        None => Ok(()),
    }
}

fn register_options(app: &RunnableApp, ssh_user: Option<&String>, force_storage: Option<&PathBuf>) -> RegisterOptions {
    RegisterOptions {
        ssh_user: ssh_user.cloned(),
        reuse_default_resource: app.version.reuse_default_resource,
        force_storage: force_storage.cloned(),
    }
}

/// Runs the dispatch command and checks the chunks it listed.
///
/// Unless `read_only`, the workunit status is set to `processing` first.
pub fn execute_dispatch(action: &ActionDispatch, client: &dyn LimsClient) -> Result<()> {
    let workspace = Workspace::open(&action.work_dir, Some(&action.workunit_ref), client)?;
    let app = load_runnable_app(&action.app_ref, &workspace.definition)?;
    dispatch(&workspace, &app, action.read_only, client)?;
    Ok(())
}

/// Materialises the inputs of the selected chunks.
pub fn execute_inputs(action: &ActionInputs, client: &dyn LimsClient) -> Result<()> {
    let work_dir = absolutize(&expand_user(&action.work_dir));
    for chunk_dir in select_chunks(&work_dir, action.chunk.as_deref())? {
        info!("Preparing inputs of chunk {}", chunk_label(&work_dir, &chunk_dir));
        prepare_chunk(&chunk_dir, client, action.ssh_user.as_deref(), action.filter.as_ref())?;
    }
    Ok(())
}

/// Runs the process command of the selected chunks. The workunit definition
/// must already be cached in the work directory.
pub fn execute_process(action: &ActionProcess, client: &dyn LimsClient) -> Result<()> {
    let workspace = Workspace::open(&action.work_dir, None, client)?;
    let app = load_runnable_app(&action.app_ref, &workspace.definition)?;
    for chunk_dir in workspace.chunks(action.chunk.as_deref())? {
        info!("Processing chunk {}", chunk_label(&workspace.work_dir, &chunk_dir));
        process_chunk(&workspace, &app, &chunk_dir)?;
    }
    Ok(())
}

/// Runs the collect command and registers the outputs of the selected
/// chunks, then registers the workflow step. Nothing is written to the LIMS
/// in `read_only` mode.
pub fn execute_outputs(action: &ActionOutputs, client: &dyn LimsClient) -> Result<()> {
    let workspace = Workspace::open(&action.work_dir, Some(&action.workunit_ref), client)?;
    let app = load_runnable_app(&action.app_ref, &workspace.definition)?;
    let options = register_options(&app, action.ssh_user.as_ref(), action.force_storage.as_ref());

    for chunk_dir in workspace.chunks(action.chunk.as_deref())? {
        info!("Collecting outputs of chunk {}", chunk_label(&workspace.work_dir, &chunk_dir));
        collect_and_register(&workspace, &app, &chunk_dir, client, &options, action.read_only)?;
    }
    if !action.read_only {
        register_workflow(&workspace, &app, client)?;
    }
    Ok(())
}

fn run_phases(
    action: &ActionRun,
    workspace: &Workspace,
    app: &RunnableApp,
    client: &dyn LimsClient,
    timeline: &mut PhaseTimeline,
) -> Result<()> {
    let listed = timeline.track("dispatch", || dispatch(workspace, app, action.read_only, client))?;
    let chunks = match &action.chunk {
        Some(name) => workspace.chunks(Some(name))?,
        None => listed,
    };
    if chunks.is_empty() {
        info!("Nothing to process");
    }

    let options = register_options(app, action.ssh_user.as_ref(), action.force_storage.as_ref());
    for chunk_dir in &chunks {
        let label = chunk_label(&workspace.work_dir, chunk_dir);
        info!("Processing chunk {}", label);
        timeline.track(format!("{}/inputs", label), || {
            prepare_chunk(chunk_dir, client, action.ssh_user.as_deref(), action.filter.as_ref())
        })?;
        timeline.track(format!("{}/process", label), || process_chunk(workspace, app, chunk_dir))?;
        timeline.track(format!("{}/outputs", label), || {
            collect_and_register(workspace, app, chunk_dir, client, &options, action.read_only)
        })?;
    }

    if !action.read_only && app.workflow_template_step_id.is_some() {
        timeline.track("workflow", || register_workflow(workspace, app, client))?;
    }
    Ok(())
}

/// Runs dispatch once, then inputs, process and outputs for every chunk in
/// the order of `chunks.yml`.
///
/// Unless `read_only`, the workunit ends up `available` on success and
/// `failed` otherwise.
///
/// # Errors
///
/// The first failing phase aborts the run and its error is returned.
pub fn execute_run(action: &ActionRun, client: &dyn LimsClient) -> Result<()> {
    let workspace = Workspace::open(&action.work_dir, Some(&action.workunit_ref), client)?;
    let app = load_runnable_app(&action.app_ref, &workspace.definition)?;

    let mut timeline = PhaseTimeline::new();
    let result = run_phases(action, &workspace, &app, client, &mut timeline);
    info!("{}", timeline.summary());

    if action.read_only {
        return result;
    }
    match result {
        Ok(()) => workspace.set_status(client, status::AVAILABLE),
        Err(e) => {
            if let Err(status_error) = workspace.set_status(client, status::FAILED) {
                warn!("Could not mark workunit as failed: {}", status_error);
            }
            Err(e)
        }
    }
}

/// Executes any action.
pub fn execute(action: &Action, client: &dyn LimsClient) -> Result<()> {
    match action {
        Action::Dispatch(action) => execute_dispatch(action, client),
        Action::Inputs(action) => execute_inputs(action, client),
        Action::Process(action) => execute_process(action, client),
        Action::Outputs(action) => execute_outputs(action, client),
        Action::Run(action) => execute_run(action, client),
    }
}
