//! App specifications.
//!
//! An app spec file holds a list of version templates. Each template may list
//! several version strings; expansion produces one template per version, and
//! evaluation renders the `${...}` placeholders into a concrete [`AppVersion`].

use std::collections::{BTreeSet, HashSet};

use log::debug;
use serde::{Deserialize, Deserializer, Serialize};
use serde_yaml::{Mapping, Value};

use super::commands::{default_true, CommandsSpec};
use super::interpolation::{interpolate_config_strings, Variables, VariablesApp, VariablesWorkunit};
use crate::error::{AppRunnerError, Result};

/// LIMS-facing settings of an app, independent of the app's commands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BfabricAppSpec {
    /// Required app runner version: a release (`0.0.17`) or a VCS reference.
    pub app_runner: String,
    /// Workflow template step registered after outputs succeed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_template_step_id: Option<i64>,
}

/// Names the submitter that runs the app on the cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubmitterRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Mapping::is_empty")]
    pub params: Mapping,
}

/// A concrete, fully rendered app version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppVersion {
    #[serde(default = "default_version")]
    pub version: String,
    pub commands: CommandsSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitter: Option<SubmitterRef>,
    /// Reuse the workunit's pending default resource for the first copied
    /// output.
    #[serde(default = "default_true")]
    pub reuse_default_resource: bool,
}

fn default_version() -> String {
    "latest".to_string()
}

/// A single-version template whose strings may still hold placeholders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppVersionTemplate {
    pub version: String,
    pub commands: CommandsSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitter: Option<SubmitterRef>,
    #[serde(default = "default_true")]
    pub reuse_default_resource: bool,
}

impl AppVersionTemplate {
    /// Renders the template for one app.
    pub fn evaluate(
        &self,
        app_id: i64,
        app_name: &str,
        workunit: Option<&VariablesWorkunit>,
    ) -> Result<AppVersion> {
        let variables = Variables {
            app: VariablesApp::new(app_id, app_name, self.version.clone()),
            workunit: workunit.cloned(),
        };
        let data = serde_yaml::to_value(self)?;
        let rendered = interpolate_config_strings(data, &variables)?;
        serde_yaml::from_value(rendered).map_err(|e| {
            AppRunnerError::spec(format!("version {}", self.version), e.to_string())
        })
    }
}

/// A template listing one or more versions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppVersionMultiTemplate {
    /// A single version string or a list of them.
    #[serde(deserialize_with = "one_or_many")]
    pub version: Vec<String>,
    pub commands: CommandsSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitter: Option<SubmitterRef>,
    #[serde(default = "default_true")]
    pub reuse_default_resource: bool,
}

fn one_or_many<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(version) => vec![version],
        OneOrMany::Many(versions) => versions,
    })
}

impl AppVersionMultiTemplate {
    /// One template per listed version. Placeholders stay unrendered.
    pub fn expand_versions(&self) -> Vec<AppVersionTemplate> {
        self.version
            .iter()
            .map(|version| AppVersionTemplate {
                version: version.clone(),
                commands: self.commands.clone(),
                submitter: self.submitter.clone(),
                reuse_default_resource: self.reuse_default_resource,
            })
            .collect()
    }
}

/// The app spec file as written by app authors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppSpecTemplate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bfabric: Option<BfabricAppSpec>,
    pub versions: Vec<AppVersionMultiTemplate>,
}

impl AppSpecTemplate {
    /// Expands every template and renders it for the given app.
    ///
    /// # Errors
    ///
    /// * `SpecInvalid` when two concrete versions share a version string
    /// * `Interpolation` when a placeholder cannot be rendered
    pub fn evaluate(
        &self,
        app_id: i64,
        app_name: &str,
        workunit: Option<&VariablesWorkunit>,
    ) -> Result<AppSpec> {
        let versions = self
            .versions
            .iter()
            .flat_map(AppVersionMultiTemplate::expand_versions)
            .map(|template| template.evaluate(app_id, app_name, workunit))
            .collect::<Result<Vec<_>>>()?;

        debug!("Expanded app spec into {} versions", versions.len());
        AppSpec::new(self.bfabric.clone(), versions)
    }
}

/// Concrete app versions of one app.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppSpec {
    pub bfabric: Option<BfabricAppSpec>,
    pub versions: Vec<AppVersion>,
}

impl AppSpec {
    /// Builds the spec, rejecting duplicate version strings.
    pub fn new(bfabric: Option<BfabricAppSpec>, versions: Vec<AppVersion>) -> Result<Self> {
        let mut seen = HashSet::new();
        let mut duplicates: Vec<&str> = versions
            .iter()
            .map(|v| v.version.as_str())
            .filter(|v| !seen.insert(*v))
            .collect();
        if !duplicates.is_empty() {
            duplicates.sort_unstable();
            duplicates.dedup();
            return Err(AppRunnerError::spec(
                "versions",
                format!("Duplicate versions found: {}", duplicates.join(", ")),
            ));
        }
        Ok(Self { bfabric, versions })
    }

    pub fn available_versions(&self) -> BTreeSet<String> {
        self.versions.iter().map(|v| v.version.clone()).collect()
    }

    pub fn contains(&self, version: &str) -> bool {
        self.get(version).is_some()
    }

    /// The version with this string, or `None`.
    pub fn get(&self, version: &str) -> Option<&AppVersion> {
        self.versions.iter().find(|v| v.version == version)
    }

    pub fn workflow_template_step_id(&self) -> Option<i64> {
        self.bfabric.as_ref().and_then(|b| b.workflow_template_step_id)
    }
}

/// Parses an app spec template from a YAML value.
pub fn parse_app_spec_template(value: Value) -> Result<AppSpecTemplate> {
    serde_yaml::from_value(value).map_err(|e| AppRunnerError::spec("app spec", e.to_string()))
}
