//! Workunit definitions.
//!
//! A [`WorkunitDefinition`] is the envelope the driver works from: how to
//! execute the workunit and where to register its results. It is either read
//! from YAML or assembled from the LIMS, and cached in the work directory so
//! every phase sees the same values.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::{AppRunnerError, IoContext, Result};
use crate::lims::entities::{Application, Entity, Storage, Workunit};
use crate::lims::LimsClient;

/// Identifies a workunit: a LIMS id or a definition YAML file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkunitRef {
    Id(i64),
    Path(PathBuf),
}

impl FromStr for WorkunitRef {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.trim().parse::<i64>() {
            Ok(id) => WorkunitRef::Id(id),
            Err(_) => WorkunitRef::Path(PathBuf::from(s)),
        })
    }
}

impl<'de> Deserialize<'de> for WorkunitRef {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Id(i64),
            Text(String),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Id(id) => WorkunitRef::Id(id),
            Raw::Text(text) => text.parse().unwrap_or_else(|never| match never {}),
        })
    }
}

impl fmt::Display for WorkunitRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkunitRef::Id(id) => write!(f, "{}", id),
            WorkunitRef::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

/// How to execute the workunit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkunitExecutionDefinition {
    #[serde(default)]
    pub raw_parameters: BTreeMap<String, Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset: Option<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<i64>,
}

impl WorkunitExecutionDefinition {
    /// Exactly one of `dataset` and `resources` must be given.
    pub fn validate(&self) -> Result<()> {
        match (self.dataset.is_some(), self.resources.is_empty()) {
            (true, false) => Err(AppRunnerError::spec(
                "execution",
                "dataset and resources are mutually exclusive",
            )),
            (false, true) => Err(AppRunnerError::spec(
                "execution",
                "either dataset or resources must be provided",
            )),
            _ => Ok(()),
        }
    }

    fn from_workunit(workunit: &Workunit, client: &dyn LimsClient) -> Result<Self> {
        let definition = Self {
            raw_parameters: workunit.parameter_values(client)?,
            dataset: workunit.input_dataset_id(),
            resources: workunit.input_resource_ids(),
        };
        definition.validate()?;
        Ok(definition)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerType {
    #[default]
    Project,
    Order,
}

/// Where the workunit's results are registered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkunitRegistrationDefinition {
    pub application_id: i64,
    pub application_name: String,
    pub workunit_id: i64,
    pub workunit_name: String,
    pub container_id: i64,
    pub container_type: ContainerType,
    pub storage_id: i64,
    pub storage_output_folder: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
}

impl WorkunitRegistrationDefinition {
    fn from_workunit(workunit: &Workunit, client: &dyn LimsClient) -> Result<Self> {
        let missing = |what: &str| {
            AppRunnerError::Resolve(format!("workunit {} has no {}", workunit.id(), what))
        };

        let application_id = workunit.application_id().ok_or_else(|| missing("application"))?;
        let application = Application::find_required(application_id, client)?;
        let storage_id = application
            .storage_id()
            .ok_or_else(|| missing("application storage"))?;
        let storage = Storage::find_required(storage_id, client)?;
        let container_type = match workunit.container_type().as_str() {
            "order" => ContainerType::Order,
            _ => ContainerType::Project,
        };

        Ok(Self {
            application_id,
            application_name: application.name().to_string(),
            workunit_id: workunit.id(),
            workunit_name: workunit.name().to_string(),
            container_id: workunit.container_id().ok_or_else(|| missing("container"))?,
            container_type,
            storage_id,
            storage_output_folder: workunit.store_output_folder(&application, &storage)?,
            user_id: workunit.user_id(),
        })
    }
}

/// Execution and registration details of one workunit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkunitDefinition {
    pub execution: WorkunitExecutionDefinition,
    /// Absent for definitions written by hand for local testing.
    #[serde(default)]
    pub registration: Option<WorkunitRegistrationDefinition>,
}

impl WorkunitDefinition {
    /// Loads the definition behind `workunit_ref`.
    ///
    /// # Arguments
    ///
    /// * `workunit_ref` - LIMS id or path to a definition YAML file
    /// * `client` - used only for id references
    /// * `cache_file` - when it exists it is returned as is; otherwise the
    ///   resolved definition is written there
    pub fn from_ref(
        workunit_ref: &WorkunitRef,
        client: &dyn LimsClient,
        cache_file: Option<&Path>,
    ) -> Result<Self> {
        if let Some(cache) = cache_file.filter(|p| p.exists()) {
            debug!("Using cached workunit definition {}", cache.display());
            return Self::from_yaml(cache);
        }

        let definition = match workunit_ref {
            WorkunitRef::Path(path) => Self::from_yaml(path)?,
            WorkunitRef::Id(id) => {
                info!("Fetching workunit {} from the LIMS", id);
                let workunit = Workunit::find(*id, client)?.ok_or_else(|| {
                    AppRunnerError::Resolve(format!("Workunit with ID {} does not exist", id))
                })?;
                Self::from_workunit(&workunit, client)?
            }
        };

        if let Some(cache) = cache_file {
            if let Some(parent) = cache.parent() {
                fs::create_dir_all(parent).with_path(parent)?;
            }
            definition.to_yaml(cache)?;
        }
        Ok(definition)
    }

    pub fn from_workunit(workunit: &Workunit, client: &dyn LimsClient) -> Result<Self> {
        Ok(Self {
            execution: WorkunitExecutionDefinition::from_workunit(workunit, client)?,
            registration: Some(WorkunitRegistrationDefinition::from_workunit(workunit, client)?),
        })
    }

    pub fn from_yaml(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).with_path(path)?;
        let definition: Self = serde_yaml::from_str(&text)
            .map_err(|e| AppRunnerError::spec(path.display().to_string(), e.to_string()))?;
        definition.execution.validate()?;
        Ok(definition)
    }

    pub fn to_yaml(&self, path: &Path) -> Result<()> {
        let text = serde_yaml::to_string(self)?;
        fs::write(path, text).with_path(path)
    }

    /// The registration block, required by every LIMS-writing phase.
    pub fn registration(&self) -> Result<&WorkunitRegistrationDefinition> {
        self.registration.as_ref().ok_or_else(|| {
            AppRunnerError::Resolve("workunit definition has no registration block".to_string())
        })
    }

    /// Value of the `application_version` parameter, if set.
    pub fn application_version(&self) -> Option<&str> {
        self.execution
            .raw_parameters
            .get("application_version")
            .and_then(|v| v.as_deref())
    }
}
