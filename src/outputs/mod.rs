//! Output Registration
//!
//! Registers the entries of `outputs.yml` in the LIMS, one output at a time:
//! each is uploaded and saved before the next one starts.
//!
//! - [`resource`]: storage upload plus `Resource` entity
//! - [`dataset`]: delimited file to `Dataset` entity
//! - [`link`]: `Link` entities
//! - [`workflow`]: workflow step bookkeeping

pub mod dataset;
pub mod link;
pub mod resource;
pub mod workflow;

use std::path::{Path, PathBuf};

use log::{debug, info};

pub use resource::StorageTarget;
pub use workflow::register_workflow_step;

use crate::error::Result;
use crate::lims::LimsClient;
use crate::specs::outputs::{CopyProtocol, CopyResourceSpec, OutputSpec, UpdateExisting};
use crate::specs::parser::load_outputs_spec;
use crate::specs::workunit::WorkunitDefinition;

/// Settings shared by every output of one registration run.
#[derive(Debug, Clone, Default)]
pub struct RegisterOptions {
    pub ssh_user: Option<String>,
    /// Let the first uploaded file take over the workunit's pending resource.
    pub reuse_default_resource: bool,
    /// YAML file describing a storage that replaces the workunit's.
    pub force_storage: Option<PathBuf>,
}

/// Registers every output in declaration order.
pub fn register_all(
    specs: &[OutputSpec],
    definition: &WorkunitDefinition,
    client: &dyn LimsClient,
    options: &RegisterOptions,
) -> Result<()> {
    let mut storage: Option<StorageTarget> = None;
    let mut default_resource_pending = options.reuse_default_resource;

    for spec in specs {
        debug!("Registering {:?}", spec);
        match spec {
            OutputSpec::BfabricCopyResource(copy) => {
                let target = match &storage {
                    Some(target) => target.clone(),
                    None => {
                        let target = StorageTarget::resolve(definition, client, options.force_storage.as_deref())?;
                        storage = Some(target.clone());
                        target
                    }
                };
                let default_id = if default_resource_pending {
                    default_resource_pending = false;
                    resource::find_default_resource_id(definition, client)?
                } else {
                    None
                };
                resource::register_copy_resource(
                    copy,
                    definition,
                    client,
                    &target,
                    options.ssh_user.as_deref(),
                    default_id,
                )?;
            }
            OutputSpec::BfabricDataset(spec) => {
                dataset::register_dataset(spec, definition, client)?;
            }
            OutputSpec::BfabricLink(spec) => {
                link::register_link(spec, definition, client)?;
            }
        }
    }
    info!("Registered {} outputs", specs.len());
    Ok(())
}

/// Makes a relative local path relative to `base`.
fn anchor(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Registers the outputs declared in `outputs_yaml`. Relative local paths are
/// taken relative to the folder containing the file.
pub fn register_outputs(
    outputs_yaml: &Path,
    definition: &WorkunitDefinition,
    client: &dyn LimsClient,
    options: &RegisterOptions,
) -> Result<()> {
    let spec = load_outputs_spec(outputs_yaml)?;
    let base = outputs_yaml.parent().unwrap_or_else(|| Path::new("."));
    let outputs: Vec<OutputSpec> = spec
        .outputs
        .into_iter()
        .map(|output| match output {
            OutputSpec::BfabricCopyResource(mut copy) => {
                copy.local_path = anchor(&copy.local_path, base);
                OutputSpec::BfabricCopyResource(copy)
            }
            OutputSpec::BfabricDataset(mut save) => {
                save.local_path = anchor(&save.local_path, base);
                OutputSpec::BfabricDataset(save)
            }
            other => other,
        })
        .collect();
    register_all(&outputs, definition, client, options)
}

/// Registers one local file as a resource of the workunit.
///
/// `store_entry_path` defaults to the file name.
pub fn register_single_file(
    local_path: &Path,
    store_entry_path: Option<&Path>,
    store_folder_path: Option<&Path>,
    update_existing: UpdateExisting,
    definition: &WorkunitDefinition,
    client: &dyn LimsClient,
    options: &RegisterOptions,
) -> Result<()> {
    let store_entry_path = match store_entry_path {
        Some(path) => path.to_path_buf(),
        None => PathBuf::from(local_path.file_name().unwrap_or_default()),
    };
    let spec = CopyResourceSpec {
        local_path: local_path.to_path_buf(),
        store_entry_path,
        store_folder_path: store_folder_path.map(Path::to_path_buf),
        update_existing,
        protocol: CopyProtocol::Scp,
    };
    register_all(&[OutputSpec::BfabricCopyResource(spec)], definition, client, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lims::MockClient;
    use crate::specs::workunit::{ContainerType, WorkunitExecutionDefinition, WorkunitRegistrationDefinition};
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::fs;
    use tempfile::tempdir;

    fn definition() -> WorkunitDefinition {
        WorkunitDefinition {
            execution: WorkunitExecutionDefinition {
                raw_parameters: BTreeMap::new(),
                dataset: None,
                resources: vec![1],
            },
            registration: Some(WorkunitRegistrationDefinition {
                application_id: 10,
                application_name: "app".to_string(),
                workunit_id: 300,
                workunit_name: "wu".to_string(),
                container_id: 3000,
                container_type: ContainerType::Project,
                storage_id: 2,
                storage_output_folder: PathBuf::from("out"),
                user_id: None,
            }),
        }
    }

    #[test]
    fn test_register_dataset_and_link_relative_paths() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("table.csv"), "a,b\n1,2\n").unwrap();
        let outputs_yaml = dir.path().join("outputs.yml");
        fs::write(
            &outputs_yaml,
            "outputs:\n  - type: bfabric_dataset\n    local_path: table.csv\n    separator: \",\"\n  - type: bfabric_link\n    name: Report\n    url: https://example.org\n",
        )
        .unwrap();
        let mock = MockClient::new();

        register_outputs(&outputs_yaml, &definition(), &mock, &RegisterOptions::default()).unwrap();
        assert_eq!(mock.saved("dataset")[0]["name"], "table");
        assert_eq!(mock.saved("link")[0]["parentid"], 300);
    }

    #[test]
    fn test_required_resource_stops_registration() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("result.txt"), "x").unwrap();
        let mock = MockClient::new();
        mock.insert("storage", json!({"id": 2, "host": "storage-host", "basepath": "/srv/"}));

        let err = register_single_file(
            &dir.path().join("result.txt"),
            None,
            None,
            UpdateExisting::Required,
            &definition(),
            &mock,
            &RegisterOptions::default(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), "RegisterFailed");
        assert!(mock.saved("resource").is_empty());
    }
}
