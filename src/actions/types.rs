//! Action types and the action config file.

use std::path::{Path, PathBuf};

use log::debug;
use serde::Deserialize;

use crate::error::{AppRunnerError, Result};
use crate::specs::parser::read_yaml_value;
use crate::specs::workunit::WorkunitRef;

/// Runs the dispatch command once.
#[derive(Debug, Clone)]
pub struct ActionDispatch {
    pub work_dir: PathBuf,
    pub app_ref: PathBuf,
    pub workunit_ref: WorkunitRef,
    pub read_only: bool,
}

/// Materialises `inputs.yml` of one or all chunks.
#[derive(Debug, Clone)]
pub struct ActionInputs {
    pub work_dir: PathBuf,
    pub chunk: Option<String>,
    pub ssh_user: Option<String>,
    /// File name or glob restricting which inputs are prepared.
    pub filter: Option<String>,
}

/// Runs the process command of one or all chunks.
#[derive(Debug, Clone)]
pub struct ActionProcess {
    pub work_dir: PathBuf,
    pub app_ref: PathBuf,
    pub chunk: Option<String>,
}

/// Runs the collect command, then registers `outputs.yml`, of one or all
/// chunks.
#[derive(Debug, Clone)]
pub struct ActionOutputs {
    pub work_dir: PathBuf,
    pub app_ref: PathBuf,
    pub workunit_ref: WorkunitRef,
    pub chunk: Option<String>,
    pub ssh_user: Option<String>,
    pub force_storage: Option<PathBuf>,
    pub read_only: bool,
}

/// Dispatch followed by inputs, process and outputs for every chunk.
#[derive(Debug, Clone)]
pub struct ActionRun {
    pub work_dir: PathBuf,
    pub app_ref: PathBuf,
    pub workunit_ref: WorkunitRef,
    pub chunk: Option<String>,
    pub ssh_user: Option<String>,
    pub filter: Option<String>,
    pub force_storage: Option<PathBuf>,
    pub read_only: bool,
}

impl ActionRun {
    pub fn dispatch(&self) -> ActionDispatch {
        ActionDispatch {
            work_dir: self.work_dir.clone(),
            app_ref: self.app_ref.clone(),
            workunit_ref: self.workunit_ref.clone(),
            read_only: self.read_only,
        }
    }

    pub fn inputs(&self) -> ActionInputs {
        ActionInputs {
            work_dir: self.work_dir.clone(),
            chunk: self.chunk.clone(),
            ssh_user: self.ssh_user.clone(),
            filter: self.filter.clone(),
        }
    }

    pub fn process(&self) -> ActionProcess {
        ActionProcess {
            work_dir: self.work_dir.clone(),
            app_ref: self.app_ref.clone(),
            chunk: self.chunk.clone(),
        }
    }

    pub fn outputs(&self) -> ActionOutputs {
        ActionOutputs {
            work_dir: self.work_dir.clone(),
            app_ref: self.app_ref.clone(),
            workunit_ref: self.workunit_ref.clone(),
            chunk: self.chunk.clone(),
            ssh_user: self.ssh_user.clone(),
            force_storage: self.force_storage.clone(),
            read_only: self.read_only,
        }
    }
}

/// Any action.
#[derive(Debug, Clone)]
pub enum Action {
    Dispatch(ActionDispatch),
    Inputs(ActionInputs),
    Process(ActionProcess),
    Outputs(ActionOutputs),
    Run(ActionRun),
}

/// Action settings, as read from the `bfabric_app_runner.action` section of
/// a YAML file or given on the command line.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActionConfig {
    pub work_dir: Option<PathBuf>,
    pub app_ref: Option<PathBuf>,
    pub workunit_ref: Option<WorkunitRef>,
    pub ssh_user: Option<String>,
    pub filter: Option<String>,
    pub force_storage: Option<PathBuf>,
    pub read_only: Option<bool>,
}

impl ActionConfig {
    /// Reads the `bfabric_app_runner.action` section of `path`.
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Parsing action config file: {}", path.display());
        let document = read_yaml_value(path)?;
        let section = document
            .get("bfabric_app_runner")
            .and_then(|runner| runner.get("action"))
            .cloned()
            .ok_or_else(|| {
                AppRunnerError::spec(
                    path.display().to_string(),
                    "missing section 'bfabric_app_runner.action'",
                )
            })?;
        serde_yaml::from_value(section)
            .map_err(|e| AppRunnerError::spec(format!("{}: bfabric_app_runner.action", path.display()), e.to_string()))
    }

    /// Keeps every value set in `self` and fills the rest from `fallback`.
    pub fn or(self, fallback: ActionConfig) -> ActionConfig {
        ActionConfig {
            work_dir: self.work_dir.or(fallback.work_dir),
            app_ref: self.app_ref.or(fallback.app_ref),
            workunit_ref: self.workunit_ref.or(fallback.workunit_ref),
            ssh_user: self.ssh_user.or(fallback.ssh_user),
            filter: self.filter.or(fallback.filter),
            force_storage: self.force_storage.or(fallback.force_storage),
            read_only: self.read_only.or(fallback.read_only),
        }
    }

    /// Builds a run action; `work_dir`, `app_ref` and `workunit_ref` are
    /// required.
    pub fn into_run(self, chunk: Option<String>) -> Result<ActionRun> {
        fn required<T>(value: Option<T>, key: &str) -> Result<T> {
            value.ok_or_else(|| AppRunnerError::spec("action config", format!("missing required value '{}'", key)))
        }

        Ok(ActionRun {
            work_dir: required(self.work_dir, "work_dir")?,
            app_ref: required(self.app_ref, "app_ref")?,
            workunit_ref: required(self.workunit_ref, "workunit_ref")?,
            chunk,
            ssh_user: self.ssh_user,
            filter: self.filter,
            force_storage: self.force_storage,
            read_only: self.read_only.unwrap_or(false),
        })
    }
}
