//! Spec Loading
//!
//! Reads spec documents from YAML files and runs the semantic checks of
//! [`super::validator`] on them.

use std::fs;
use std::path::Path;

use log::{debug, info};
use serde::de::DeserializeOwned;

use super::app::{parse_app_spec_template, AppSpec, AppSpecTemplate, AppVersion};
use super::inputs::InputsSpec;
use super::interpolation::VariablesWorkunit;
use super::outputs::OutputsSpec;
use super::validator::{
    ensure_valid, validate_app_spec, validate_app_spec_template, validate_commands,
    validate_inputs_spec, validate_outputs_spec,
};
use super::workunit::WorkunitDefinition;
use crate::error::{AppRunnerError, IoContext, Result};

/// Reads a YAML file into a raw value.
pub fn read_yaml_value(path: &Path) -> Result<serde_yaml::Value> {
    let text = fs::read_to_string(path).with_path(path)?;
    debug!("YAML content loaded from {} ({} bytes)", path.display(), text.len());
    serde_yaml::from_str(&text).map_err(|e| AppRunnerError::spec(path.display().to_string(), e.to_string()))
}

/// Reads a YAML file into a typed model; schema errors become `SpecInvalid`.
pub fn read_yaml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path).with_path(path)?;
    serde_yaml::from_str(&text).map_err(|e| AppRunnerError::spec(path.display().to_string(), e.to_string()))
}

/// Loads and validates `inputs.yml`.
pub fn load_inputs_spec(path: &Path) -> Result<InputsSpec> {
    let spec: InputsSpec = read_yaml(path)?;
    ensure_valid(path, validate_inputs_spec(&spec))?;
    Ok(spec)
}

/// Loads and validates `outputs.yml`.
pub fn load_outputs_spec(path: &Path) -> Result<OutputsSpec> {
    let spec: OutputsSpec = read_yaml(path)?;
    ensure_valid(path, validate_outputs_spec(&spec))?;
    Ok(spec)
}

/// Loads an app spec template without rendering it.
pub fn load_app_spec_template(path: &Path) -> Result<AppSpecTemplate> {
    let template = parse_app_spec_template(read_yaml_value(path)?)
        .map_err(|e| relocate(e, path))?;
    ensure_valid(path, validate_app_spec_template(&template))?;
    Ok(template)
}

/// Loads an app spec template and renders it for one app.
pub fn load_app_spec(path: &Path, app_id: i64, app_name: &str) -> Result<AppSpec> {
    let spec = load_app_spec_template(path)?.evaluate(app_id, app_name, None)?;
    ensure_valid(path, validate_app_spec(&spec))?;
    Ok(spec)
}

/// An app file holds either one concrete version or a template.
#[derive(Debug, Clone)]
pub enum LoadedApp {
    Version(AppVersion),
    Spec(AppSpec),
}

fn load_app(path: &Path, app_id: i64, app_name: &str, workunit: Option<&VariablesWorkunit>) -> Result<LoadedApp> {
    let value = read_yaml_value(path)?;
    if let Ok(version) = serde_yaml::from_value::<AppVersion>(value.clone()) {
        debug!("{} is a single app version", path.display());
        ensure_valid(path, validate_commands(&version.commands))?;
        return Ok(LoadedApp::Version(version));
    }

    let template = parse_app_spec_template(value).map_err(|e| relocate(e, path))?;
    ensure_valid(path, validate_app_spec_template(&template))?;
    Ok(LoadedApp::Spec(template.evaluate(app_id, app_name, workunit)?))
}

/// Picks the version named by the workunit's `application_version` parameter.
pub fn resolve_app_version(spec: &AppSpec, definition: &WorkunitDefinition) -> Result<AppVersion> {
    let available = spec.available_versions().into_iter().collect::<Vec<_>>();
    let requested = definition.application_version().ok_or_else(|| {
        AppRunnerError::spec(
            "application_version",
            format!(
                "The workunit definition does not contain an application version, available versions: [{}]",
                available.join(", ")
            ),
        )
    })?;

    spec.get(requested).cloned().ok_or_else(|| {
        AppRunnerError::spec(
            "application_version",
            format!(
                "application_version '{}' is not defined in the app spec, available versions: [{}]",
                requested,
                available.join(", ")
            ),
        )
    })
}

/// The version to run together with the app-level LIMS settings.
#[derive(Debug, Clone)]
pub struct RunnableApp {
    pub version: AppVersion,
    /// Only app spec templates can name one.
    pub workflow_template_step_id: Option<i64>,
}

/// Loads the app version to run for a workunit.
///
/// # Arguments
///
/// * `path` - app file, either one `AppVersion` or an app spec template
/// * `definition` - supplies the app id/name for rendering and, for
///   templates, the `application_version` parameter
///
/// # Errors
///
/// * `SpecInvalid` when the file matches neither schema, or the requested
///   version does not exist
pub fn load_runnable_app(path: &Path, definition: &WorkunitDefinition) -> Result<RunnableApp> {
    info!("Loading app from: {}", path.display());
    let (app_id, app_name) = match &definition.registration {
        Some(registration) => (registration.application_id, registration.application_name.as_str()),
        None => (-1, "x"),
    };
    let workunit = definition
        .registration
        .as_ref()
        .map(|r| VariablesWorkunit::new(r.workunit_id));

    match load_app(path, app_id, app_name, workunit.as_ref())? {
        LoadedApp::Version(version) => Ok(RunnableApp {
            version,
            workflow_template_step_id: None,
        }),
        LoadedApp::Spec(spec) => {
            let version = resolve_app_version(&spec, definition)?;
            info!("Resolved app version {}", version.version);
            Ok(RunnableApp {
                version,
                workflow_template_step_id: spec.workflow_template_step_id(),
            })
        }
    }
}

/// Like [`load_runnable_app`], returning only the version.
pub fn load_app_version(path: &Path, definition: &WorkunitDefinition) -> Result<AppVersion> {
    load_runnable_app(path, definition).map(|app| app.version)
}

fn relocate(error: AppRunnerError, path: &Path) -> AppRunnerError {
    match error {
        AppRunnerError::SpecInvalid { message, .. } => {
            AppRunnerError::spec(path.display().to_string(), message)
        }
        other => other,
    }
}
