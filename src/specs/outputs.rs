//! Output specifications.
//!
//! `outputs.yml` is written by the process or collect command and lists what
//! should be registered in the LIMS once the chunk has finished.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AppRunnerError, Result};

/// How an output treats an entity that already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateExisting {
    /// Always create; an existing entity is an error.
    No,
    /// Update when present, create otherwise.
    #[default]
    IfExists,
    /// Update; a missing entity is an error.
    Required,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CopyProtocol {
    #[default]
    Scp,
}

/// Uploads a file to storage and registers it as a resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CopyResourceSpec {
    pub local_path: PathBuf,
    /// Path of the entry inside the storage folder.
    pub store_entry_path: PathBuf,
    /// Defaults to the workunit's storage output folder.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_folder_path: Option<PathBuf>,
    #[serde(default)]
    pub update_existing: UpdateExisting,
    #[serde(default)]
    pub protocol: CopyProtocol,
}

impl CopyResourceSpec {
    /// Resource name: the last component of `store_entry_path`.
    pub fn entry_name(&self) -> String {
        self.store_entry_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Saves a CSV/TSV file as a dataset of the workunit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SaveDatasetSpec {
    pub local_path: PathBuf,
    pub separator: String,
    /// Defaults to the file stem of `local_path`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default = "super::commands::default_true")]
    pub has_header: bool,
    /// Characters that must not occur in any cell.
    #[serde(default)]
    pub invalid_characters: String,
}

impl SaveDatasetSpec {
    pub fn dataset_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| {
            self.local_path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default()
        })
    }
}

/// Attaches a URL to a LIMS entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SaveLinkSpec {
    pub name: String,
    pub url: String,
    #[serde(default = "default_entity_type")]
    pub entity_type: String,
    /// Required unless the link goes to the workunit itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<i64>,
    #[serde(default)]
    pub update_existing: UpdateExisting,
}

fn default_entity_type() -> String {
    "Workunit".to_string()
}

impl SaveLinkSpec {
    fn targets_workunit(&self) -> bool {
        self.entity_type == "Workunit"
    }

    /// Checks that `entity_id` is given exactly when it is needed.
    pub fn validate(&self) -> Result<()> {
        match (self.targets_workunit(), self.entity_id) {
            (false, None) => Err(AppRunnerError::spec(
                format!("link '{}'", self.name),
                format!("entity_id is required for entity_type '{}'", self.entity_type),
            )),
            (true, Some(_)) => Err(AppRunnerError::spec(
                format!("link '{}'", self.name),
                "entity_id must not be set when linking to the workunit",
            )),
            _ => Ok(()),
        }
    }

    /// The linked entity's id, using `workunit_id` for workunit links.
    pub fn target_id(&self, workunit_id: i64) -> i64 {
        self.entity_id.unwrap_or(workunit_id)
    }
}

/// One entry of `outputs.yml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputSpec {
    BfabricCopyResource(CopyResourceSpec),
    BfabricDataset(SaveDatasetSpec),
    BfabricLink(SaveLinkSpec),
}

impl OutputSpec {
    pub fn type_name(&self) -> &'static str {
        match self {
            OutputSpec::BfabricCopyResource(_) => "bfabric_copy_resource",
            OutputSpec::BfabricDataset(_) => "bfabric_dataset",
            OutputSpec::BfabricLink(_) => "bfabric_link",
        }
    }
}

/// The `outputs.yml` document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputsSpec {
    pub outputs: Vec<OutputSpec>,
}

impl OutputsSpec {
    /// Checks the constraints serde cannot express.
    pub fn validate(&self) -> Result<()> {
        for output in &self.outputs {
            if let OutputSpec::BfabricLink(link) = output {
                link.validate()?;
            }
        }
        Ok(())
    }

    /// Local paths read by the registrar, for existence checks.
    pub fn local_paths(&self) -> Vec<&Path> {
        self.outputs
            .iter()
            .filter_map(|output| match output {
                OutputSpec::BfabricCopyResource(spec) => Some(spec.local_path.as_path()),
                OutputSpec::BfabricDataset(spec) => Some(spec.local_path.as_path()),
                OutputSpec::BfabricLink(_) => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OUTPUTS: &str = r#"
outputs:
  - type: bfabric_copy_resource
    local_path: /work/chunk1/result.zip
    store_entry_path: WU1_result.zip
  - type: bfabric_dataset
    local_path: /work/chunk1/table.tsv
    separator: "\t"
  - type: bfabric_link
    name: Report
    url: https://example.org/report
"#;

    #[test]
    fn test_parse_defaults() {
        let spec: OutputsSpec = serde_yaml::from_str(OUTPUTS).unwrap();
        assert_eq!(spec.outputs.len(), 3);

        let OutputSpec::BfabricCopyResource(copy) = &spec.outputs[0] else {
            panic!("expected copy resource");
        };
        assert_eq!(copy.update_existing, UpdateExisting::IfExists);
        assert_eq!(copy.protocol, CopyProtocol::Scp);
        assert_eq!(copy.entry_name(), "WU1_result.zip");

        let OutputSpec::BfabricDataset(dataset) = &spec.outputs[1] else {
            panic!("expected dataset");
        };
        assert!(dataset.has_header);
        assert_eq!(dataset.dataset_name(), "table");

        assert!(spec.validate().is_ok());
        assert_eq!(spec.local_paths().len(), 2);
    }

    #[test]
    fn test_update_existing_values() {
        let yaml = "type: bfabric_copy_resource\nlocal_path: a\nstore_entry_path: b\nupdate_existing: required\n";
        let spec: OutputSpec = serde_yaml::from_str(yaml).unwrap();
        let OutputSpec::BfabricCopyResource(copy) = spec else {
            panic!("expected copy resource");
        };
        assert_eq!(copy.update_existing, UpdateExisting::Required);
    }

    #[test]
    fn test_link_entity_id_rule() {
        let link = SaveLinkSpec {
            name: "n".to_string(),
            url: "u".to_string(),
            entity_type: "Dataset".to_string(),
            entity_id: None,
            update_existing: UpdateExisting::IfExists,
        };
        assert!(link.validate().is_err());

        let link = SaveLinkSpec {
            entity_id: Some(4),
            ..link
        };
        assert!(link.validate().is_ok());
        assert_eq!(link.target_id(99), 4);

        let workunit_link = SaveLinkSpec {
            entity_type: "Workunit".to_string(),
            ..link
        };
        assert!(workunit_link.validate().is_err());
    }

    #[test]
    fn test_unknown_protocol_rejected() {
        let yaml = "type: bfabric_copy_resource\nlocal_path: a\nstore_entry_path: b\nprotocol: ftp\n";
        assert!(serde_yaml::from_str::<OutputSpec>(yaml).is_err());
    }

    #[test]
    fn test_round_trip_is_stable() {
        let spec: OutputsSpec = serde_yaml::from_str(OUTPUTS).unwrap();
        let dumped = serde_yaml::to_string(&spec).unwrap();
        assert_eq!(serde_yaml::from_str::<OutputsSpec>(&dumped).unwrap(), spec);
    }
}
