//! Spec Validation
//!
//! Checks that go beyond what the serde schemas enforce:
//! - filenames are relative and stay inside the target folder
//! - `file` sources are absolute, and only local sources may be linked
//! - links carry an `entity_id` exactly when they need one
//! - commands are not empty

use std::path::Path;

use log::debug;

use super::app::{AppSpec, AppSpecTemplate};
use super::commands::{Command, CommandsSpec};
use super::inputs::{FileSource, InputSpec, InputsSpec};
use super::outputs::{OutputSpec, OutputsSpec};
use crate::error::{AppRunnerError, Result};
use crate::util::paths::validate_relative_filename;

/// Validation error types for user-friendly error messages.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    InvalidFilename { index: usize, filename: String, reason: String },
    RelativeSource { index: usize, path: String },
    RemoteLink { index: usize },
    EmptyCommand(&'static str),
    EmptyImage(&'static str),
    LinkEntity { index: usize, message: String },
    EmptyStoreEntry { index: usize },
    EmptySeparator { index: usize },
    NoVersions,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidFilename { index, filename, reason } => {
                write!(f, "inputs[{}]: invalid filename '{}': {}", index, filename, reason)
            }
            Self::RelativeSource { index, path } => {
                write!(f, "inputs[{}]: source path '{}' must be absolute", index, path)
            }
            Self::RemoteLink { index } => write!(f, "inputs[{}]: Cannot link to a remote file.", index),
            Self::EmptyCommand(phase) => write!(f, "commands.{}: command is empty", phase),
            Self::EmptyImage(phase) => write!(f, "commands.{}: docker image is empty", phase),
            Self::LinkEntity { index, message } => write!(f, "outputs[{}]: {}", index, message),
            Self::EmptyStoreEntry { index } => {
                write!(f, "outputs[{}]: store_entry_path is empty", index)
            }
            Self::EmptySeparator { index } => write!(f, "outputs[{}]: separator is empty", index),
            Self::NoVersions => write!(f, "app spec defines no versions"),
        }
    }
}

fn input_filename(spec: &InputSpec) -> Option<String> {
    match spec {
        InputSpec::BfabricResource(s) => s.filename.clone(),
        InputSpec::BfabricResourceArchive(s) => Some(s.filename.clone()),
        InputSpec::BfabricDataset(s) => Some(s.filename.clone()),
        InputSpec::BfabricResourceDataset(s) => Some(s.filename.clone()),
        InputSpec::BfabricAnnotation(s) => Some(s.filename.clone()),
        InputSpec::File(s) => Some(s.resolved_filename()),
        InputSpec::StaticFile(s) => Some(s.filename.clone()),
        InputSpec::StaticYaml(s) => Some(s.filename.clone()),
    }
}

/// Validates an inputs spec, collecting every problem.
pub fn validate_inputs_spec(spec: &InputsSpec) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    for (index, input) in spec.inputs.iter().enumerate() {
        if let Some(filename) = input_filename(input) {
            if let Err(reason) = validate_relative_filename(&filename) {
                errors.push(ValidationError::InvalidFilename {
                    index,
                    filename,
                    reason,
                });
            }
        }

        if let InputSpec::File(file) = input {
            if !file.source.path().is_absolute() {
                errors.push(ValidationError::RelativeSource {
                    index,
                    path: file.source.path().display().to_string(),
                });
            }
            if file.link && matches!(file.source, FileSource::Ssh { .. }) {
                errors.push(ValidationError::RemoteLink { index });
            }
        }
    }

    debug!("Inputs spec validation found {} problems", errors.len());
    errors
}

/// Validates an outputs spec, collecting every problem.
pub fn validate_outputs_spec(spec: &OutputsSpec) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    for (index, output) in spec.outputs.iter().enumerate() {
        match output {
            OutputSpec::BfabricCopyResource(copy) => {
                if copy.store_entry_path.as_os_str().is_empty() {
                    errors.push(ValidationError::EmptyStoreEntry { index });
                }
            }
            OutputSpec::BfabricDataset(dataset) => {
                if dataset.separator.is_empty() {
                    errors.push(ValidationError::EmptySeparator { index });
                }
            }
            OutputSpec::BfabricLink(link) => {
                if let Err(AppRunnerError::SpecInvalid { message, .. }) = link.validate() {
                    errors.push(ValidationError::LinkEntity { index, message });
                }
            }
        }
    }

    errors
}

fn validate_command(phase: &'static str, command: &Command, errors: &mut Vec<ValidationError>) {
    if command.command_text().trim().is_empty() {
        errors.push(ValidationError::EmptyCommand(phase));
    }
    if let Command::Docker(docker) = command {
        if docker.image.trim().is_empty() {
            errors.push(ValidationError::EmptyImage(phase));
        }
    }
}

/// Validates the commands of one app version.
pub fn validate_commands(commands: &CommandsSpec) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    validate_command("dispatch", &commands.dispatch, &mut errors);
    validate_command("process", &commands.process, &mut errors);
    if let Some(collect) = &commands.collect {
        validate_command("collect", collect, &mut errors);
    }
    errors
}

/// Validates an unexpanded app spec template.
pub fn validate_app_spec_template(template: &AppSpecTemplate) -> Vec<ValidationError> {
    if template.versions.is_empty() {
        return vec![ValidationError::NoVersions];
    }
    template
        .versions
        .iter()
        .flat_map(|version| validate_commands(&version.commands))
        .collect()
}

/// Validates an expanded app spec.
pub fn validate_app_spec(spec: &AppSpec) -> Vec<ValidationError> {
    if spec.versions.is_empty() {
        return vec![ValidationError::NoVersions];
    }
    spec.versions
        .iter()
        .flat_map(|version| validate_commands(&version.commands))
        .collect()
}

/// Turns collected problems into a single `SpecInvalid` error.
pub fn ensure_valid(location: &Path, errors: Vec<ValidationError>) -> Result<()> {
    if errors.is_empty() {
        return Ok(());
    }
    let message = errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ");
    Err(AppRunnerError::spec(location.display().to_string(), message))
}
