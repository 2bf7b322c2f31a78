//! Command Line Interface
//!
//! One binary with nested commands. Every command that talks to the LIMS
//! connects through the client config (see [`crate::lims::config`]).

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};
use log::info;

use crate::actions::execute::WORKUNIT_DEFINITION_FILE;
use crate::actions::{
    execute_dispatch, execute_inputs, execute_outputs, execute_process, execute_run, ActionConfig, ActionDispatch,
    ActionInputs, ActionOutputs, ActionProcess, ActionRun,
};
use crate::error::{AppRunnerError, Result};
use crate::inputs::integrity::format_input_states;
use crate::inputs::{check_folder, clean_folder, list_folder, prepare_folder};
use crate::lims::config::{connect, load_client_settings};
use crate::lims::{CachingClient, LimsClient};
use crate::outputs::{register_outputs, register_single_file, RegisterOptions};
use crate::specs::parser::{load_app_spec, load_app_spec_template, load_inputs_spec, load_outputs_spec};
use crate::specs::workunit::{WorkunitDefinition, WorkunitRef};
use crate::specs::UpdateExisting;
use crate::util::paths::absolutize;

#[derive(Debug, Clone, Parser)]
#[command(name = "bfabric-app-runner", version)]
#[command(about = "Runs B-Fabric apps: dispatch, input staging, processing and output registration")]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,

    /// LIMS config environment, overrides BFABRICPY_CONFIG_ENV
    #[arg(long, global = true)]
    pub config_env: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Run an app
    #[command(subcommand)]
    App(AppCommand),
    /// Prepare and inspect input files
    #[command(subcommand)]
    Inputs(InputsCommand),
    /// Register output files
    #[command(subcommand)]
    Outputs(OutputsCommand),
    /// Run an app on a chunk created by `app dispatch`
    #[command(subcommand)]
    Chunk(ChunkCommand),
    /// Validate spec files
    #[command(subcommand)]
    Validate(ValidateCommand),
    /// Run actions described in a config file
    #[command(subcommand)]
    Action(ActionCommand),
}

#[derive(Debug, Clone, Args)]
pub struct WorkunitArgs {
    /// Path to the app spec file
    #[arg(long)]
    pub app_spec: PathBuf,
    /// Workunit id or path to a workunit definition YAML file
    #[arg(long)]
    pub workunit_ref: WorkunitRef,
    /// Work directory
    #[arg(long)]
    pub work_dir: PathBuf,
}

#[derive(Debug, Clone, Subcommand)]
pub enum AppCommand {
    /// Create the chunks, which can then be processed individually
    Dispatch {
        #[command(flatten)]
        workunit: WorkunitArgs,
        /// Do not change the workunit status
        #[arg(long, default_value_t = false)]
        read_only: bool,
    },
    /// Run all phases of an app
    Run {
        #[command(flatten)]
        workunit: WorkunitArgs,
        /// Only drive this chunk
        #[arg(long)]
        chunk: Option<String>,
        /// Only prepare inputs matching this file name or glob
        #[arg(long)]
        filter: Option<String>,
        /// SSH user for storage transfers
        #[arg(long)]
        ssh_user: Option<String>,
        /// YAML file describing the storage to upload to
        #[arg(long)]
        force_storage: Option<PathBuf>,
        /// Register nothing and leave the workunit status unchanged
        #[arg(long, default_value_t = false)]
        read_only: bool,
    },
}

#[derive(Debug, Clone, Args)]
pub struct InputsArgs {
    /// Path to the inputs.yml file
    #[arg(long)]
    pub inputs_yaml: PathBuf,
    /// Target folder, defaults to the folder of the inputs file
    #[arg(long)]
    pub target_folder: Option<PathBuf>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum InputsCommand {
    /// Download and write the input files
    Prepare {
        #[command(flatten)]
        inputs: InputsArgs,
        #[arg(long)]
        ssh_user: Option<String>,
        /// Only prepare inputs matching this file name or glob
        #[arg(long)]
        filter: Option<String>,
    },
    /// Fail unless every input exists with the expected content
    Check {
        #[command(flatten)]
        inputs: InputsArgs,
    },
    /// Remove the input files
    Clean {
        #[command(flatten)]
        inputs: InputsArgs,
        #[arg(long)]
        filter: Option<String>,
    },
    /// Print the state of each input file
    List {
        #[command(flatten)]
        inputs: InputsArgs,
        /// Verify checksums and contents
        #[arg(long, default_value_t = false)]
        check: bool,
    },
}

/// `update_existing` policy of a single file registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum UpdateExistingArg {
    No,
    IfExists,
    Required,
}

impl From<UpdateExistingArg> for UpdateExisting {
    fn from(arg: UpdateExistingArg) -> Self {
        match arg {
            UpdateExistingArg::No => UpdateExisting::No,
            UpdateExistingArg::IfExists => UpdateExisting::IfExists,
            UpdateExistingArg::Required => UpdateExisting::Required,
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct RegisterArgs {
    /// Workunit id or path to a workunit definition YAML file
    #[arg(long)]
    pub workunit_ref: WorkunitRef,
    #[arg(long)]
    pub ssh_user: Option<String>,
    /// YAML file describing the storage to upload to
    #[arg(long)]
    pub force_storage: Option<PathBuf>,
    /// Reuse the workunit's pending default resource (default)
    #[arg(long, overrides_with = "no_reuse_default_resource")]
    pub reuse_default_resource: bool,
    /// Always create new resources
    #[arg(long, overrides_with = "reuse_default_resource")]
    pub no_reuse_default_resource: bool,
}

impl RegisterArgs {
    fn options(&self) -> RegisterOptions {
        RegisterOptions {
            ssh_user: self.ssh_user.clone(),
            reuse_default_resource: !self.no_reuse_default_resource,
            force_storage: self.force_storage.clone(),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
pub enum OutputsCommand {
    /// Register the outputs listed in an outputs.yml file
    Register {
        #[arg(long)]
        outputs_yaml: PathBuf,
        #[command(flatten)]
        register: RegisterArgs,
    },
    /// Register one local file as a resource of the workunit
    RegisterSingleFile {
        #[arg(long)]
        local_path: PathBuf,
        #[command(flatten)]
        register: RegisterArgs,
        /// Entry name in the storage, defaults to the file name
        #[arg(long)]
        store_entry_path: Option<PathBuf>,
        /// Folder in the storage, defaults to the workunit's output folder
        #[arg(long)]
        store_folder_path: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = UpdateExistingArg::IfExists)]
        update_existing: UpdateExistingArg,
    },
}

#[derive(Debug, Clone, Subcommand)]
pub enum ChunkCommand {
    /// Prepare inputs, process and register outputs of one chunk
    RunAll {
        #[arg(long)]
        chunk_dir: PathBuf,
        #[arg(long)]
        app_spec: PathBuf,
        /// Defaults to the definition cached in the work directory
        #[arg(long)]
        workunit_ref: Option<WorkunitRef>,
        #[arg(long)]
        ssh_user: Option<String>,
        #[arg(long)]
        force_storage: Option<PathBuf>,
        #[arg(long, default_value_t = false)]
        read_only: bool,
    },
    /// Process one chunk; its inputs must already be prepared
    Process {
        #[arg(long)]
        chunk_dir: PathBuf,
        #[arg(long)]
        app_spec: PathBuf,
    },
    /// Collect and register the outputs of one chunk
    Outputs {
        #[arg(long)]
        chunk_dir: PathBuf,
        #[arg(long)]
        app_spec: PathBuf,
        #[arg(long)]
        workunit_ref: WorkunitRef,
        #[arg(long)]
        ssh_user: Option<String>,
        #[arg(long)]
        force_storage: Option<PathBuf>,
        #[arg(long, default_value_t = false)]
        read_only: bool,
    },
}

#[derive(Debug, Clone, Subcommand)]
pub enum ValidateCommand {
    /// Expand an app spec and print the versions
    AppSpec {
        path: PathBuf,
        #[arg(long, default_value_t = -1)]
        app_id: i64,
        #[arg(long, default_value = "x")]
        app_name: String,
    },
    /// Validate an app spec template without rendering it
    AppSpecTemplate { path: PathBuf },
    /// Validate an inputs.yml file
    InputsSpec { path: PathBuf },
    /// Validate an outputs.yml file
    OutputsSpec { path: PathBuf },
}

#[derive(Debug, Clone, Subcommand)]
pub enum ActionCommand {
    /// Run the app described by the `bfabric_app_runner.action` section of a
    /// config file; explicit arguments win over the file
    RunFromConfig {
        #[arg(long)]
        config: PathBuf,
        #[arg(long)]
        work_dir: Option<PathBuf>,
        #[arg(long)]
        app_ref: Option<PathBuf>,
        #[arg(long)]
        workunit_ref: Option<WorkunitRef>,
        #[arg(long)]
        chunk: Option<String>,
        #[arg(long)]
        ssh_user: Option<String>,
        #[arg(long)]
        filter: Option<String>,
        #[arg(long)]
        force_storage: Option<PathBuf>,
        #[arg(long, default_value_t = false)]
        read_only: bool,
    },
}

/// Connects to the configured LIMS with a lookup cache in front.
fn connect_client(config_env: Option<&str>) -> Result<Box<dyn LimsClient>> {
    let settings = load_client_settings(config_env)?;
    info!("Using LIMS environment {}", settings.environment);
    Ok(Box::new(CachingClient::new(connect(&settings)?)))
}

fn print_yaml<T: serde::Serialize>(value: &T) -> Result<()> {
    print!("{}", serde_yaml::to_string(value)?);
    Ok(())
}

/// Splits a chunk directory into its work directory and chunk name.
fn split_chunk_dir(chunk_dir: &Path) -> Result<(PathBuf, String)> {
    let chunk_dir = absolutize(chunk_dir);
    match (chunk_dir.parent(), chunk_dir.file_name()) {
        (Some(work_dir), Some(name)) => Ok((work_dir.to_path_buf(), name.to_string_lossy().into_owned())),
        _ => Err(AppRunnerError::Resolve(format!(
            "{} is not a chunk directory",
            chunk_dir.display()
        ))),
    }
}

fn cached_definition_ref(work_dir: &Path) -> WorkunitRef {
    WorkunitRef::Path(work_dir.join(WORKUNIT_DEFINITION_FILE))
}

fn run_app_command(command: AppCommand, client: &dyn LimsClient) -> Result<()> {
    match command {
        AppCommand::Dispatch { workunit, read_only } => execute_dispatch(
            &ActionDispatch {
                work_dir: workunit.work_dir,
                app_ref: workunit.app_spec,
                workunit_ref: workunit.workunit_ref,
                read_only,
            },
            client,
        ),
        AppCommand::Run {
            workunit,
            chunk,
            filter,
            ssh_user,
            force_storage,
            read_only,
        } => execute_run(
            &ActionRun {
                work_dir: workunit.work_dir,
                app_ref: workunit.app_spec,
                workunit_ref: workunit.workunit_ref,
                chunk,
                ssh_user,
                filter,
                force_storage,
                read_only,
            },
            client,
        ),
    }
}

fn run_inputs_command(command: InputsCommand, client: &dyn LimsClient) -> Result<()> {
    match command {
        InputsCommand::Prepare {
            inputs,
            ssh_user,
            filter,
        } => prepare_folder(
            &inputs.inputs_yaml,
            inputs.target_folder.as_deref(),
            client,
            ssh_user.as_deref(),
            filter.as_ref().map(std::slice::from_ref),
        ),
        InputsCommand::Check { inputs } => {
            let states = check_folder(&inputs.inputs_yaml, inputs.target_folder.as_deref(), client)?;
            println!("{}", format_input_states(&states));
            Ok(())
        }
        InputsCommand::Clean { inputs, filter } => clean_folder(
            &inputs.inputs_yaml,
            inputs.target_folder.as_deref(),
            client,
            filter.as_ref().map(std::slice::from_ref),
        ),
        InputsCommand::List { inputs, check } => {
            let states = list_folder(&inputs.inputs_yaml, inputs.target_folder.as_deref(), client, check)?;
            println!("{}", format_input_states(&states));
            Ok(())
        }
    }
}

fn run_outputs_command(command: OutputsCommand, client: &dyn LimsClient) -> Result<()> {
    match command {
        OutputsCommand::Register { outputs_yaml, register } => {
            let definition = WorkunitDefinition::from_ref(&register.workunit_ref, client, None)?;
            register_outputs(&outputs_yaml, &definition, client, &register.options())
        }
        OutputsCommand::RegisterSingleFile {
            local_path,
            register,
            store_entry_path,
            store_folder_path,
            update_existing,
        } => {
            let definition = WorkunitDefinition::from_ref(&register.workunit_ref, client, None)?;
            register_single_file(
                &local_path,
                store_entry_path.as_deref(),
                store_folder_path.as_deref(),
                update_existing.into(),
                &definition,
                client,
                &register.options(),
            )
        }
    }
}

fn run_chunk_command(command: ChunkCommand, client: &dyn LimsClient) -> Result<()> {
    match command {
        ChunkCommand::RunAll {
            chunk_dir,
            app_spec,
            workunit_ref,
            ssh_user,
            force_storage,
            read_only,
        } => {
            let (work_dir, chunk) = split_chunk_dir(&chunk_dir)?;
            let workunit_ref = workunit_ref.unwrap_or_else(|| cached_definition_ref(&work_dir));
            execute_inputs(
                &ActionInputs {
                    work_dir: work_dir.clone(),
                    chunk: Some(chunk.clone()),
                    ssh_user: ssh_user.clone(),
                    filter: None,
                },
                client,
            )?;
            execute_process(
                &ActionProcess {
                    work_dir: work_dir.clone(),
                    app_ref: app_spec.clone(),
                    chunk: Some(chunk.clone()),
                },
                client,
            )?;
            execute_outputs(
                &ActionOutputs {
                    work_dir,
                    app_ref: app_spec,
                    workunit_ref,
                    chunk: Some(chunk),
                    ssh_user,
                    force_storage,
                    read_only,
                },
                client,
            )
        }
        ChunkCommand::Process { chunk_dir, app_spec } => {
            let (work_dir, chunk) = split_chunk_dir(&chunk_dir)?;
            execute_process(
                &ActionProcess {
                    work_dir,
                    app_ref: app_spec,
                    chunk: Some(chunk),
                },
                client,
            )
        }
        ChunkCommand::Outputs {
            chunk_dir,
            app_spec,
            workunit_ref,
            ssh_user,
            force_storage,
            read_only,
        } => {
            let (work_dir, chunk) = split_chunk_dir(&chunk_dir)?;
            execute_outputs(
                &ActionOutputs {
                    work_dir,
                    app_ref: app_spec,
                    workunit_ref,
                    chunk: Some(chunk),
                    ssh_user,
                    force_storage,
                    read_only,
                },
                client,
            )
        }
    }
}

fn run_validate_command(command: ValidateCommand) -> Result<()> {
    match command {
        ValidateCommand::AppSpec { path, app_id, app_name } => print_yaml(&load_app_spec(&path, app_id, &app_name)?),
        ValidateCommand::AppSpecTemplate { path } => print_yaml(&load_app_spec_template(&path)?),
        ValidateCommand::InputsSpec { path } => print_yaml(&load_inputs_spec(&path)?),
        ValidateCommand::OutputsSpec { path } => print_yaml(&load_outputs_spec(&path)?),
    }
}

fn run_action_command(command: ActionCommand, client: &dyn LimsClient) -> Result<()> {
    match command {
        ActionCommand::RunFromConfig {
            config,
            work_dir,
            app_ref,
            workunit_ref,
            chunk,
            ssh_user,
            filter,
            force_storage,
            read_only,
        } => {
            let explicit = ActionConfig {
                work_dir,
                app_ref,
                workunit_ref,
                ssh_user,
                filter,
                force_storage,
                read_only: read_only.then_some(true),
            };
            let action = explicit.or(ActionConfig::from_file(&config)?).into_run(chunk)?;
            execute_run(&action, client)
        }
    }
}

/// Executes the parsed command line.
pub fn run(cli: Cli) -> Result<()> {
    let command = match cli.command {
        Commands::Validate(command) => return run_validate_command(command),
        command => command,
    };

    let client = connect_client(cli.config_env.as_deref())?;
    let client = client.as_ref();
    match command {
        Commands::App(command) => run_app_command(command, client),
        Commands::Inputs(command) => run_inputs_command(command, client),
        Commands::Outputs(command) => run_outputs_command(command, client),
        Commands::Chunk(command) => run_chunk_command(command, client),
        Commands::Action(command) => run_action_command(command, client),
        Commands::Validate(command) => run_validate_command(command),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_help_lists_command_groups() {
        let help = Cli::command().render_long_help().to_string();
        for group in ["app", "inputs", "outputs", "chunk", "validate", "action"] {
            assert!(help.contains(group), "missing {}", group);
        }
    }

    #[test]
    fn test_parse_app_run() {
        let cli = Cli::try_parse_from([
            "bfabric-app-runner",
            "app",
            "run",
            "--app-spec",
            "app.yml",
            "--workunit-ref",
            "123",
            "--work-dir",
            "work",
            "--read-only",
            "--filter",
            "*.csv",
        ])
        .unwrap();
        match cli.command {
            Commands::App(AppCommand::Run {
                workunit,
                read_only,
                filter,
                ..
            }) => {
                assert_eq!(workunit.workunit_ref, WorkunitRef::Id(123));
                assert!(read_only);
                assert_eq!(filter.as_deref(), Some("*.csv"));
            }
            other => panic!("expected app run, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "bfabric-app-runner",
            "inputs",
            "list",
            "--inputs-yaml",
            "inputs.yml",
            "--verbose",
            "--config-env",
            "TEST",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config_env.as_deref(), Some("TEST"));
    }

    #[test]
    fn test_reuse_default_resource_flags() {
        let parse = |extra: &[&str]| {
            let mut args = vec![
                "bfabric-app-runner",
                "outputs",
                "register",
                "--outputs-yaml",
                "outputs.yml",
                "--workunit-ref",
                "wu.yml",
            ];
            args.extend_from_slice(extra);
            match Cli::try_parse_from(args).unwrap().command {
                Commands::Outputs(OutputsCommand::Register { register, .. }) => register.options(),
                other => panic!("expected outputs register, got {:?}", other),
            }
        };
        assert!(parse(&[]).reuse_default_resource);
        assert!(!parse(&["--no-reuse-default-resource"]).reuse_default_resource);
        assert!(parse(&["--no-reuse-default-resource", "--reuse-default-resource"]).reuse_default_resource);
    }

    #[test]
    fn test_parse_register_single_file() {
        let cli = Cli::try_parse_from([
            "bfabric-app-runner",
            "outputs",
            "register-single-file",
            "--local-path",
            "out.txt",
            "--workunit-ref",
            "5",
            "--update-existing",
            "required",
        ])
        .unwrap();
        match cli.command {
            Commands::Outputs(OutputsCommand::RegisterSingleFile { update_existing, .. }) => {
                assert_eq!(UpdateExisting::from(update_existing), UpdateExisting::Required);
            }
            other => panic!("expected register-single-file, got {:?}", other),
        }
    }

    #[test]
    fn test_split_chunk_dir() {
        let (work_dir, chunk) = split_chunk_dir(Path::new("/work/chunk1")).unwrap();
        assert_eq!(work_dir, PathBuf::from("/work"));
        assert_eq!(chunk, "chunk1");
        assert!(split_chunk_dir(Path::new("/")).is_err());
    }

    #[test]
    fn test_validate_inputs_spec() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inputs.yml");
        std::fs::write(&path, "inputs:\n  - type: static_file\n    content: hi\n    filename: a.txt\n").unwrap();
        let cli = Cli::try_parse_from([
            "bfabric-app-runner",
            "validate",
            "inputs-spec",
            path.to_str().unwrap(),
        ])
        .unwrap();
        run(cli).unwrap();
    }
}
