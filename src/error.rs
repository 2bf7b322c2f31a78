//! Error Types
//!
//! A single error enum covers every failure the runner can surface. Each
//! phase maps its failures onto one of the kinds below so the CLI can print
//! the kind together with its most salient data (path, id, exit code).

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors produced while evaluating specs, staging inputs, running commands
/// or registering outputs.
#[derive(Debug, Error)]
pub enum AppRunnerError {
    /// A spec document failed schema validation.
    #[error("invalid spec {location}: {message}")]
    SpecInvalid { location: String, message: String },

    /// A `${...}` template could not be rendered.
    #[error("interpolation failed for '{template}': {message}")]
    Interpolation { template: String, message: String },

    /// Inputs could not be resolved into concrete files.
    #[error("could not resolve inputs: {0}")]
    Resolve(String),

    /// A resolved input could not be materialised on disk.
    #[error("could not materialise '{path}': {message}")]
    MaterialiseFailed { path: PathBuf, message: String },

    /// A child process exited unsuccessfully.
    #[error("command {argv:?} failed with exit code {exit_code:?}")]
    CommandFailed {
        argv: Vec<String>,
        exit_code: Option<i32>,
    },

    /// The LIMS refused an output registration, or an `update_existing`
    /// policy was violated.
    #[error("output registration failed: {0}")]
    RegisterFailed(String),

    /// The workflow step bookkeeping after output registration failed.
    #[error("workflow step registration failed: {0}")]
    WorkflowStepFailed(String),

    /// The LIMS client reported an error.
    #[error("LIMS request to '{endpoint}' failed: {message}")]
    Lims { endpoint: String, message: String },

    /// A CSV or parquet table could not be read or written.
    #[error("table error: {0}")]
    Table(String),

    /// Client configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(String),

    /// Filesystem error with the offending path.
    #[error("I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl AppRunnerError {
    /// Short name of the error kind, used as the prefix of CLI error output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SpecInvalid { .. } => "SpecInvalid",
            Self::Interpolation { .. } => "InterpolationError",
            Self::Resolve(_) => "ResolveError",
            Self::MaterialiseFailed { .. } => "MaterialiseFailed",
            Self::CommandFailed { .. } => "CommandFailed",
            Self::RegisterFailed(_) => "RegisterFailed",
            Self::WorkflowStepFailed(_) => "WorkflowStepFailed",
            Self::Lims { .. } => "LimsError",
            Self::Table(_) => "TableError",
            Self::Config(_) => "ConfigError",
            Self::Io { .. } => "IoError",
            Self::Yaml(_) => "YamlError",
            Self::Json(_) => "JsonError",
        }
    }

    pub(crate) fn spec(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SpecInvalid {
            location: location.into(),
            message: message.into(),
        }
    }

    pub(crate) fn materialise(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::MaterialiseFailed {
            path: path.into(),
            message: message.into(),
        }
    }

    pub(crate) fn lims(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Lims {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, AppRunnerError>;

/// Attaches a path to `std::io::Error`s.
pub(crate) trait IoContext<T> {
    fn with_path(self, path: &Path) -> Result<T>;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn with_path(self, path: &Path) -> Result<T> {
        self.map_err(|source| AppRunnerError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}
