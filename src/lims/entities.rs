//! Typed read-only wrappers over LIMS entities.
//!
//! Each wrapper holds the JSON object returned by the client and exposes the
//! fields the runner needs. Lookups go through the [`Entity`] trait:
//! `find` and `find_by` return `None`/empty on a miss instead of failing.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::{json, Value};

use super::client::LimsClient;
use crate::error::{AppRunnerError, Result};
use crate::util::table::Table;

/// Common behaviour of all entity wrappers.
pub trait Entity: Sized {
    /// Endpoint name used for client calls.
    const ENDPOINT: &'static str;

    fn from_data(data: Value) -> Self;

    fn data(&self) -> &Value;

    fn id(&self) -> i64 {
        self.get_i64("id").unwrap_or_default()
    }

    fn get_str(&self, key: &str) -> Option<&str> {
        self.data().get(key).and_then(Value::as_str)
    }

    /// Reads an integer field, accepting numeric strings.
    fn get_i64(&self, key: &str) -> Option<i64> {
        match self.data().get(key)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Id of the to-one relation stored under `key` (`{"id": ...}`).
    fn relation_id(&self, key: &str) -> Option<i64> {
        self.data().get(key)?.get("id")?.as_i64()
    }

    /// Ids of the to-many relation stored under `key` (`[{"id": ...}, ...]`).
    /// A single object is treated as a one-element list.
    fn relation_ids(&self, key: &str) -> Vec<i64> {
        match self.data().get(key) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| item.get("id").and_then(Value::as_i64))
                .collect(),
            Some(item @ Value::Object(_)) => item
                .get("id")
                .and_then(Value::as_i64)
                .into_iter()
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Fetches the entity with `id`, or `None` when it does not exist.
    fn find(id: i64, client: &dyn LimsClient) -> Result<Option<Self>> {
        let mut results = client.read(Self::ENDPOINT, &json!({ "id": id }))?;
        Ok(if results.is_empty() {
            None
        } else {
            Some(Self::from_data(results.swap_remove(0)))
        })
    }

    /// Fetches several entities by id; missing ids are absent from the map.
    fn find_all(ids: &[i64], client: &dyn LimsClient) -> Result<BTreeMap<i64, Self>> {
        if ids.is_empty() {
            return Ok(BTreeMap::new());
        }
        let results = client.read(Self::ENDPOINT, &json!({ "id": ids }))?;
        Ok(results
            .into_iter()
            .map(Self::from_data)
            .map(|entity| (entity.id(), entity))
            .collect())
    }

    /// Fetches every entity matching `query`.
    fn find_by(query: &Value, client: &dyn LimsClient) -> Result<Vec<Self>> {
        Ok(client
            .read(Self::ENDPOINT, query)?
            .into_iter()
            .map(Self::from_data)
            .collect())
    }

    /// Like [`Entity::find`] but a miss becomes a `Resolve` error.
    fn find_required(id: i64, client: &dyn LimsClient) -> Result<Self> {
        Self::find(id, client)?.ok_or_else(|| {
            AppRunnerError::Resolve(format!("{} with id {} does not exist", Self::ENDPOINT, id))
        })
    }
}

macro_rules! entity {
    ($(#[$meta:meta])* $name:ident, $endpoint:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq)]
        pub struct $name {
            data: Value,
        }

        impl Entity for $name {
            const ENDPOINT: &'static str = $endpoint;

            fn from_data(data: Value) -> Self {
                Self { data }
            }

            fn data(&self) -> &Value {
                &self.data
            }
        }
    };
}

entity!(
    /// A unit of computational work.
    Workunit,
    "workunit"
);
entity!(Application, "application");
entity!(
    /// One file stored in a [`Storage`].
    Resource,
    "resource"
);
entity!(
    /// A host and base path reachable over SSH.
    Storage,
    "storage"
);
entity!(
    /// A rectangular table, optionally referencing resources.
    Dataset,
    "dataset"
);
entity!(Sample, "sample");
entity!(Parameter, "parameter");
entity!(WorkflowTemplateStep, "workflowtemplatestep");
entity!(WorkflowTemplate, "workflowtemplate");
entity!(Workflow, "workflow");
entity!(WorkflowStep, "workflowstep");
entity!(Link, "link");

impl Workunit {
    pub fn name(&self) -> &str {
        self.get_str("name").unwrap_or_default()
    }

    pub fn status(&self) -> Option<&str> {
        self.get_str("status")
    }

    pub fn application_id(&self) -> Option<i64> {
        self.relation_id("application")
    }

    pub fn container_id(&self) -> Option<i64> {
        self.relation_id("container")
    }

    /// `project` or `order`, from the container's class name.
    pub fn container_type(&self) -> String {
        self.data
            .get("container")
            .and_then(|c| c.get("classname"))
            .and_then(Value::as_str)
            .unwrap_or("project")
            .to_lowercase()
    }

    pub fn input_dataset_id(&self) -> Option<i64> {
        self.relation_id("inputdataset")
    }

    pub fn input_resource_ids(&self) -> Vec<i64> {
        self.relation_ids("inputresource")
    }

    /// Output resources attached to the workunit.
    pub fn resource_ids(&self) -> Vec<i64> {
        self.relation_ids("resource")
    }

    pub fn user_id(&self) -> Option<i64> {
        self.relation_id("user")
    }

    /// Parameter key/value pairs of the workunit.
    pub fn parameter_values(
        &self,
        client: &dyn LimsClient,
    ) -> Result<BTreeMap<String, Option<String>>> {
        let ids = self.relation_ids("parameter");
        Ok(Parameter::find_all(&ids, client)?
            .into_values()
            .filter_map(|p| {
                let key = p.key()?.to_string();
                Some((key, p.value()))
            })
            .collect())
    }

    /// Parses the `created` timestamp.
    pub fn created(&self) -> Result<NaiveDateTime> {
        let raw = self.get_str("created").ok_or_else(|| {
            AppRunnerError::Resolve(format!("workunit {} has no creation date", self.id()))
        })?;
        parse_timestamp(raw).ok_or_else(|| {
            AppRunnerError::Resolve(format!(
                "workunit {} has an unparseable creation date '{}'",
                self.id(),
                raw
            ))
        })
    }

    /// Relative storage folder for the workunit's outputs:
    /// `<prefix><container>/bfabric/<technology>/<app>/<YYYY>/<YYYY-MM>/<YYYY-MM-DD>/workunit_<id>`.
    pub fn store_output_folder(&self, application: &Application, storage: &Storage) -> Result<PathBuf> {
        let container_id = self.container_id().ok_or_else(|| {
            AppRunnerError::Resolve(format!("workunit {} has no container", self.id()))
        })?;
        let date = self.created()?;

        Ok(PathBuf::from(format!(
            "{}{}",
            storage.project_folder_prefix(),
            container_id
        ))
        .join("bfabric")
        .join(application.technology().replace(' ', "_"))
        .join(application.name().replace(' ', "_"))
        .join(date.format("%Y").to_string())
        .join(date.format("%Y-%m").to_string())
        .join(date.format("%Y-%m-%d").to_string())
        .join(format!("workunit_{}", self.id())))
    }
}

fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.naive_local());
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(parsed);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

impl Application {
    pub fn name(&self) -> &str {
        self.get_str("name").unwrap_or_default()
    }

    pub fn technology(&self) -> &str {
        self.get_str("technology").unwrap_or_default()
    }

    pub fn storage_id(&self) -> Option<i64> {
        self.relation_id("storage")
    }
}

impl Resource {
    pub fn name(&self) -> &str {
        self.get_str("name").unwrap_or_default()
    }

    pub fn status(&self) -> Option<&str> {
        self.get_str("status")
    }

    /// Path relative to the storage base path.
    pub fn relative_path(&self) -> &str {
        self.get_str("relativepath").unwrap_or_default()
    }

    /// Basename of the relative path.
    pub fn filename(&self) -> String {
        Path::new(self.relative_path())
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn checksum(&self) -> Option<&str> {
        self.get_str("filechecksum").filter(|c| !c.is_empty())
    }

    pub fn storage_id(&self) -> Option<i64> {
        self.relation_id("storage")
    }

    pub fn sample_id(&self) -> Option<i64> {
        self.relation_id("sample")
    }

    /// The resource's storage, which must exist.
    pub fn storage(&self, client: &dyn LimsClient) -> Result<Storage> {
        let storage_id = self.storage_id().ok_or_else(|| {
            AppRunnerError::Resolve(format!("resource {} has no storage", self.id()))
        })?;
        Storage::find_required(storage_id, client)
    }
}

impl Storage {
    pub fn host(&self) -> &str {
        self.get_str("host").unwrap_or_default()
    }

    pub fn base_path(&self) -> &str {
        self.get_str("basepath").unwrap_or_default()
    }

    pub fn project_folder_prefix(&self) -> &str {
        self.get_str("projectfolderprefix").unwrap_or("p")
    }

    /// Absolute path on the storage host for a path relative to the base.
    pub fn absolute_path(&self, relative: &str) -> String {
        join_storage_path(self.base_path(), relative)
    }
}

/// Joins a storage base path and a relative path with exactly one `/`.
pub fn join_storage_path(base: &str, relative: &str) -> String {
    match (base.ends_with('/'), relative.starts_with('/')) {
        (true, true) => format!("{}{}", base, &relative[1..]),
        (false, false) if !base.is_empty() => format!("{}/{}", base, relative),
        _ => format!("{}{}", base, relative),
    }
}

impl Dataset {
    pub fn name(&self) -> &str {
        self.get_str("name").unwrap_or_default()
    }

    /// Converts the attribute/item representation into a table.
    ///
    /// Columns follow attribute positions, rows follow item positions. A field
    /// absent from an item becomes an empty cell.
    pub fn to_table(&self) -> Result<Table> {
        let mut attributes: Vec<(i64, String)> = self
            .data
            .get("attribute")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .map(|a| {
                        (
                            a.get("position").and_then(value_as_i64).unwrap_or_default(),
                            a.get("name")
                                .and_then(Value::as_str)
                                .unwrap_or_default()
                                .to_string(),
                        )
                    })
                    .collect()
            })
            .unwrap_or_default();
        attributes.sort_by_key(|(position, _)| *position);

        let mut items: Vec<(i64, &Value)> = self
            .data
            .get("item")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .map(|i| (i.get("position").and_then(value_as_i64).unwrap_or_default(), i))
                    .collect()
            })
            .unwrap_or_default();
        items.sort_by_key(|(position, _)| *position);

        let rows = items
            .into_iter()
            .map(|(_, item)| {
                let fields: BTreeMap<i64, String> = item
                    .get("field")
                    .and_then(Value::as_array)
                    .map(|fields| {
                        fields
                            .iter()
                            .filter_map(|f| {
                                let position = f.get("attributeposition").and_then(value_as_i64)?;
                                Some((position, f.get("value").map(scalar_to_string).unwrap_or_default()))
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                attributes
                    .iter()
                    .map(|(position, _)| fields.get(position).cloned().unwrap_or_default())
                    .collect()
            })
            .collect();

        Table::new(attributes.into_iter().map(|(_, name)| name).collect(), rows)
    }
}

fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Renders a scalar JSON value as a table cell.
pub fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl Parameter {
    pub fn key(&self) -> Option<&str> {
        self.get_str("key")
    }

    pub fn value(&self) -> Option<String> {
        self.data
            .get("value")
            .filter(|v| !v.is_null())
            .map(scalar_to_string)
    }
}

impl WorkflowTemplateStep {
    pub fn workflow_template_id(&self) -> Option<i64> {
        self.relation_id("workflowtemplate")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lims::mock::MockClient;

    #[test]
    fn test_find_and_find_by() {
        let mock = MockClient::new();
        mock.insert(
            "resource",
            json!({"id": 3, "name": "a.raw", "relativepath": "/p1/a.raw", "storage": {"id": 2}}),
        );

        let resource = Resource::find(3, &mock).unwrap().unwrap();
        assert_eq!(resource.filename(), "a.raw");
        assert_eq!(resource.storage_id(), Some(2));
        assert!(Resource::find(4, &mock).unwrap().is_none());

        let found = Resource::find_by(&json!({"name": "a.raw"}), &mock).unwrap();
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn test_find_required_miss_is_resolve_error() {
        let mock = MockClient::new();
        let err = Storage::find_required(1, &mock).unwrap_err();
        assert_eq!(err.kind(), "ResolveError");
    }

    #[test]
    fn test_dataset_to_table_orders_by_position() {
        let dataset = Dataset::from_data(json!({
            "id": 1,
            "attribute": [
                {"name": "Name", "position": 2, "type": "String"},
                {"name": "Resource", "position": 1, "type": "Resource"}
            ],
            "item": [
                {"position": 2, "field": [{"attributeposition": 1, "value": "11"}, {"attributeposition": 2, "value": "b"}]},
                {"position": 1, "field": [{"attributeposition": 1, "value": "10"}]}
            ]
        }));

        let table = dataset.to_table().unwrap();
        assert_eq!(table.columns(), ["Resource", "Name"]);
        assert_eq!(table.rows()[0], vec!["10".to_string(), String::new()]);
        assert_eq!(table.rows()[1], vec!["11".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_store_output_folder() {
        let workunit = Workunit::from_data(json!({
            "id": 300, "container": {"id": 42, "classname": "project"}, "created": "2024-03-05 10:11:12"
        }));
        let application = Application::from_data(json!({
            "id": 1, "name": "My App", "technology": "Proteomics Tools"
        }));
        let storage = Storage::from_data(json!({"id": 2, "projectfolderprefix": "p"}));

        let folder = workunit.store_output_folder(&application, &storage).unwrap();
        assert_eq!(
            folder,
            PathBuf::from("p42/bfabric/Proteomics_Tools/My_App/2024/2024-03/2024-03-05/workunit_300")
        );
    }

    #[test]
    fn test_parameter_values() {
        let mock = MockClient::new();
        mock.insert("parameter", json!({"id": 1, "key": "application_version", "value": "1.0.1"}));
        mock.insert("parameter", json!({"id": 2, "key": "flag"}));
        let workunit = Workunit::from_data(json!({"id": 9, "parameter": [{"id": 1}, {"id": 2}]}));

        let values = workunit.parameter_values(&mock).unwrap();
        assert_eq!(values["application_version"], Some("1.0.1".to_string()));
        assert_eq!(values["flag"], None);
    }

    #[test]
    fn test_join_storage_path() {
        assert_eq!(join_storage_path("/srv/data/", "/p1/x"), "/srv/data/p1/x");
        assert_eq!(join_storage_path("/srv/data", "p1/x"), "/srv/data/p1/x");
        assert_eq!(join_storage_path("/srv/data", "/p1/x"), "/srv/data/p1/x");
    }

    #[test]
    fn test_container_type_defaults_to_project() {
        let workunit = Workunit::from_data(json!({"id": 1, "container": {"id": 2}}));
        assert_eq!(workunit.container_type(), "project");
        let order = Workunit::from_data(json!({"id": 1, "container": {"id": 2, "classname": "Order"}}));
        assert_eq!(order.container_type(), "order");
    }
}
