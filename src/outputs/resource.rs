//! Resource outputs: upload a file to storage, then register it.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use log::{debug, info};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{AppRunnerError, IoContext, Result};
use crate::lims::entities::{join_storage_path, Resource, Storage, Workunit};
use crate::lims::{Entity, LimsClient};
use crate::specs::outputs::{CopyProtocol, CopyResourceSpec, UpdateExisting};
use crate::specs::parser::read_yaml;
use crate::specs::workunit::WorkunitDefinition;
use crate::util::checksum::md5sum;
use crate::util::scp::scp;

/// Resources created by the batch system that never count as the default
/// resource.
const SCHEDULER_RESOURCES: [&str; 2] = ["slurm_stdout", "slurm_stderr"];

/// Storage override read from a `--force-storage` file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ForcedStorage {
    pub id: i64,
    pub host: String,
    pub base_path: String,
    #[serde(default)]
    pub protocol: CopyProtocol,
}

/// Where uploads go.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageTarget {
    pub id: i64,
    pub host: String,
    pub base_path: String,
}

impl StorageTarget {
    /// The workunit's storage, unless `force_storage` names a replacement.
    pub fn resolve(
        definition: &WorkunitDefinition,
        client: &dyn LimsClient,
        force_storage: Option<&Path>,
    ) -> Result<Self> {
        if let Some(path) = force_storage {
            let forced: ForcedStorage = read_yaml(path)?;
            info!("Using forced storage {} ({})", forced.id, forced.host);
            return Ok(Self {
                id: forced.id,
                host: forced.host,
                base_path: forced.base_path,
            });
        }
        let storage = Storage::find_required(definition.registration()?.storage_id, client)?;
        Ok(Self {
            id: storage.id(),
            host: storage.host().to_string(),
            base_path: storage.base_path().to_string(),
        })
    }

    /// `host:<base_path>/<relative>`.
    pub fn uri(&self, relative: &Path) -> String {
        format!(
            "{}:{}",
            self.host,
            join_storage_path(&self.base_path, &relative.to_string_lossy())
        )
    }
}

/// Folder of the entry relative to the storage base path.
pub fn output_folder(spec: &CopyResourceSpec, definition: &WorkunitDefinition) -> Result<PathBuf> {
    match &spec.store_folder_path {
        Some(folder) => Ok(folder.clone()),
        None => Ok(definition.registration()?.storage_output_folder.clone()),
    }
}

/// Id of the resource the output will update, applying the
/// `update_existing` policy.
///
/// # Errors
///
/// * `RegisterFailed` when `no` finds a resource or `required` finds none
pub fn existing_resource_id(
    spec: &CopyResourceSpec,
    definition: &WorkunitDefinition,
    client: &dyn LimsClient,
) -> Result<Option<i64>> {
    let workunit_id = definition.registration()?.workunit_id;
    let name = spec.entry_name();
    let found = Resource::find_by(&json!({ "name": name, "workunitid": workunit_id }), client)?;
    let existing = found.first().map(|r| r.id());

    match (spec.update_existing, existing) {
        (UpdateExisting::No, Some(id)) => Err(AppRunnerError::RegisterFailed(format!(
            "Resource {} already exists in workunit {} (id {})",
            name, workunit_id, id
        ))),
        (UpdateExisting::Required, None) => Err(AppRunnerError::RegisterFailed(format!(
            "Resource {} not found in workunit {}",
            name, workunit_id
        ))),
        (UpdateExisting::No, None) => Ok(None),
        (_, existing) => Ok(existing),
    }
}

/// The workunit's single pending resource, which the first uploaded file may
/// take over.
pub fn find_default_resource_id(definition: &WorkunitDefinition, client: &dyn LimsClient) -> Result<Option<i64>> {
    let workunit = Workunit::find_required(definition.registration()?.workunit_id, client)?;
    let resources = Resource::find_all(&workunit.resource_ids(), client)?;
    let candidates: Vec<&Resource> = resources
        .values()
        .filter(|r| !SCHEDULER_RESOURCES.iter().any(|name| *name == r.name()))
        .collect();
    match candidates.as_slice() {
        [only] if only.status() == Some("pending") => Ok(Some(only.id())),
        _ => Ok(None),
    }
}

/// Picks the id to save under: the existing resource, else the default one.
pub fn target_resource_id(existing_id: Option<i64>, default_id: Option<i64>) -> Result<Option<i64>> {
    match (existing_id, default_id) {
        (Some(existing), Some(default)) if existing != default => Err(AppRunnerError::RegisterFailed(format!(
            "Resource id {} does not match existing resource id {}",
            default, existing
        ))),
        (Some(existing), _) => Ok(Some(existing)),
        (None, default) => Ok(default),
    }
}

/// Builds the resource payload for an uploaded file.
pub fn resource_payload(
    spec: &CopyResourceSpec,
    definition: &WorkunitDefinition,
    storage: &StorageTarget,
    resource_id: Option<i64>,
) -> Result<Value> {
    let registration = definition.registration()?;
    let relative_path = output_folder(spec, definition)?.join(&spec.store_entry_path);
    let metadata = fs::metadata(&spec.local_path).with_path(&spec.local_path)?;
    let modified: DateTime<Local> = metadata.modified().with_path(&spec.local_path)?.into();

    let mut payload = json!({
        "name": spec.entry_name(),
        "workunitid": registration.workunit_id,
        "storageid": storage.id,
        "relativepath": relative_path.to_string_lossy(),
        "filechecksum": md5sum(&spec.local_path)?,
        "status": "available",
        "size": metadata.len(),
        "filedate": modified.format("%Y-%m-%d %H:%M:%S").to_string(),
    });
    if let Some(id) = resource_id {
        payload["id"] = json!(id);
    }
    Ok(payload)
}

/// Uploads and registers one file.
///
/// The `update_existing` check runs before anything is copied.
pub fn register_copy_resource(
    spec: &CopyResourceSpec,
    definition: &WorkunitDefinition,
    client: &dyn LimsClient,
    storage: &StorageTarget,
    ssh_user: Option<&str>,
    default_id: Option<i64>,
) -> Result<Value> {
    let existing_id = existing_resource_id(spec, definition, client)?;
    let resource_id = target_resource_id(existing_id, default_id)?;
    if !spec.local_path.is_file() {
        return Err(AppRunnerError::RegisterFailed(format!(
            "Output file {} does not exist",
            spec.local_path.display()
        )));
    }

    let relative_path = output_folder(spec, definition)?.join(&spec.store_entry_path);
    match spec.protocol {
        CopyProtocol::Scp => scp(
            &spec.local_path.to_string_lossy(),
            &storage.uri(&relative_path),
            ssh_user,
            true,
        )?,
    }

    save_resource(spec, definition, client, storage, resource_id)
}

/// Saves the resource entity of an already uploaded file.
pub fn save_resource(
    spec: &CopyResourceSpec,
    definition: &WorkunitDefinition,
    client: &dyn LimsClient,
    storage: &StorageTarget,
    resource_id: Option<i64>,
) -> Result<Value> {
    let payload = resource_payload(spec, definition, storage, resource_id)?;
    debug!("Saving resource {}", payload);
    let saved = client
        .save(Resource::ENDPOINT, &payload)
        .map_err(|e| AppRunnerError::RegisterFailed(e.to_string()))?;
    info!("Registered resource {} as id {}", spec.entry_name(), saved["id"]);
    Ok(saved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lims::MockClient;
    use crate::specs::workunit::{ContainerType, WorkunitExecutionDefinition, WorkunitRegistrationDefinition};
    use std::collections::BTreeMap;
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
                storage_output_folder: PathBuf::from("p3000/bfabric/wu300"),
                user_id: Some(7),
            }),
        }
    }

    fn spec(local_path: &Path, update_existing: UpdateExisting) -> CopyResourceSpec {
        CopyResourceSpec {
            local_path: local_path.to_path_buf(),
            store_entry_path: PathBuf::from("result.zip"),
            store_folder_path: None,
            update_existing,
            protocol: CopyProtocol::Scp,
        }
    }

    fn storage() -> StorageTarget {
        StorageTarget {
            id: 2,
            host: "fgcz-s-022".to_string(),
            base_path: "/srv/www/htdocs/".to_string(),
        }
    }

    #[test]
    fn test_required_without_existing_fails_before_upload() {
        let mock = MockClient::new();
        let spec = spec(Path::new("/nonexistent/result.zip"), UpdateExisting::Required);

        let err = register_copy_resource(&spec, &definition(), &mock, &storage(), None, None).unwrap_err();
        assert_eq!(err.kind(), "RegisterFailed");
        assert!(err.to_string().contains("Resource result.zip not found in workunit 300"));
        assert!(mock.saved("resource").is_empty());
    }

    #[test]
    fn test_no_with_existing_fails() {
        let mock = MockClient::new();
        mock.insert("resource", json!({"id": 5, "name": "result.zip", "workunit": {"id": 300}}));

        let err = existing_resource_id(&spec(Path::new("/x"), UpdateExisting::No), &definition(), &mock).unwrap_err();
        assert_eq!(err.kind(), "RegisterFailed");
        assert_eq!(
            existing_resource_id(&spec(Path::new("/x"), UpdateExisting::IfExists), &definition(), &mock).unwrap(),
            Some(5)
        );
    }

    #[test]
    fn test_save_resource_payload() {
        let dir = tempdir().unwrap();
        let local = dir.path().join("result.zip");
        fs::write(&local, "hello\n").unwrap();
        let mock = MockClient::new();

        save_resource(&spec(&local, UpdateExisting::IfExists), &definition(), &mock, &storage(), None).unwrap();
        let saved = mock.saved("resource");
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0]["name"], "result.zip");
        assert_eq!(saved[0]["relativepath"], "p3000/bfabric/wu300/result.zip");
        assert_eq!(saved[0]["filechecksum"], "b1946ac92492d2347c6235b4d2611184");
        assert_eq!(saved[0]["size"], 6);
        assert_eq!(saved[0]["storageid"], 2);
        assert_eq!(saved[0]["filedate"].as_str().unwrap().len(), 19);
        assert!(saved[0].get("id").is_none());
    }

    #[test]
    fn test_default_resource_detection() {
        let mock = MockClient::new();
        mock.insert("workunit", json!({"id": 300, "resource": [{"id": 20}, {"id": 21}]}));
        mock.insert("resource", json!({"id": 20, "name": "slurm_stdout", "status": "available"}));
        mock.insert("resource", json!({"id": 21, "name": "out.zip", "status": "pending"}));
        assert_eq!(find_default_resource_id(&definition(), &mock).unwrap(), Some(21));

        let mock = MockClient::new();
        mock.insert("workunit", json!({"id": 300, "resource": [{"id": 21}]}));
        mock.insert("resource", json!({"id": 21, "name": "out.zip", "status": "available"}));
        assert_eq!(find_default_resource_id(&definition(), &mock).unwrap(), None);
    }

    #[test]
    fn test_target_resource_id() {
        assert_eq!(target_resource_id(None, Some(4)).unwrap(), Some(4));
        assert_eq!(target_resource_id(Some(4), Some(4)).unwrap(), Some(4));
        assert_eq!(target_resource_id(Some(5), None).unwrap(), Some(5));
        assert!(target_resource_id(Some(5), Some(4)).is_err());
    }

    #[test]
    fn test_storage_uri_and_forced_storage() {
        assert_eq!(
            storage().uri(Path::new("p1/result.zip")),
            "fgcz-s-022:/srv/www/htdocs/p1/result.zip"
        );

        let dir = tempdir().unwrap();
        let forced = dir.path().join("storage.yml");
        fs::write(&forced, "id: 9\nhost: other\nbase_path: /data\n").unwrap();
        let target = StorageTarget::resolve(&definition(), &MockClient::new(), Some(&forced)).unwrap();
        assert_eq!(target.id, 9);
        assert_eq!(target.uri(Path::new("x")), "other:/data/x");
    }
}
