//! In-process LIMS used by the `__MOCK` profile and the test suite.
//!
//! Entities live in memory, grouped by endpoint. A mock can be backed by a
//! YAML store file (`{endpoint: [entity, ...]}`) which is loaded on start and
//! rewritten after every mutation, so separate invocations of the binary
//! observe each other's saves.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde_json::{Map, Value};

use super::client::LimsClient;
use crate::error::{AppRunnerError, IoContext, Result};

type Store = BTreeMap<String, Vec<Value>>;

/// In-memory LIMS.
#[derive(Debug, Default)]
pub struct MockClient {
    store: RefCell<Store>,
    next_id: Cell<i64>,
    store_path: Option<PathBuf>,
    reads: RefCell<HashMap<String, usize>>,
    saves: RefCell<Vec<(String, Value)>>,
}

impl MockClient {
    /// Creates an empty mock.
    pub fn new() -> Self {
        Self {
            next_id: Cell::new(1),
            ..Default::default()
        }
    }

    /// Creates a mock backed by `path`. A missing file starts empty.
    pub fn from_store_file(path: &Path) -> Result<Self> {
        let store: Store = if path.exists() {
            let content = fs::read_to_string(path).with_path(path)?;
            if content.trim().is_empty() {
                Store::new()
            } else {
                serde_yaml::from_str(&content)?
            }
        } else {
            Store::new()
        };

        let max_id = store
            .values()
            .flatten()
            .filter_map(|entity| entity.get("id").and_then(Value::as_i64))
            .max()
            .unwrap_or(0);
        info!("Mock LIMS store: {}", path.display());

        Ok(Self {
            store: RefCell::new(store),
            next_id: Cell::new(max_id + 1),
            store_path: Some(path.to_path_buf()),
            ..Default::default()
        })
    }

    /// Adds an entity as-is. Ids handed out later stay above it.
    pub fn insert(&self, endpoint: &str, entity: Value) {
        if let Some(id) = entity.get("id").and_then(Value::as_i64) {
            if id >= self.next_id.get() {
                self.next_id.set(id + 1);
            }
        }
        self.store
            .borrow_mut()
            .entry(endpoint.to_string())
            .or_default()
            .push(entity);
    }

    /// All entities currently stored under `endpoint`.
    pub fn entities(&self, endpoint: &str) -> Vec<Value> {
        self.store
            .borrow()
            .get(endpoint)
            .cloned()
            .unwrap_or_default()
    }

    /// Payloads passed to `save` for `endpoint`, in call order.
    pub fn saved(&self, endpoint: &str) -> Vec<Value> {
        self.saves
            .borrow()
            .iter()
            .filter(|(e, _)| e == endpoint)
            .map(|(_, obj)| obj.clone())
            .collect()
    }

    /// Number of `read` calls issued against `endpoint`.
    pub fn read_count(&self, endpoint: &str) -> usize {
        self.reads.borrow().get(endpoint).copied().unwrap_or(0)
    }

    fn persist(&self) -> Result<()> {
        if let Some(path) = &self.store_path {
            let content = serde_yaml::to_string(&*self.store.borrow())?;
            fs::write(path, content).with_path(path)?;
        }
        Ok(())
    }
}

/// Looks up `key` in `entity`, following the LIMS convention that `fooid`
/// refers to the id of the `foo` relation.
fn field<'a>(entity: &'a Value, key: &str) -> Option<&'a Value> {
    if let Some(value) = entity.get(key) {
        return Some(value);
    }
    let relation = key.strip_suffix("id").filter(|r| !r.is_empty())?;
    entity.get(relation).and_then(|r| r.get("id"))
}

fn value_matches(actual: &Value, expected: &Value) -> bool {
    if actual == expected {
        return true;
    }
    if let Some(id) = actual.get("id") {
        return value_matches(id, expected);
    }
    match (actual, expected) {
        (Value::String(a), Value::Number(e)) => a == &e.to_string(),
        (Value::Number(a), Value::String(e)) => &a.to_string() == e,
        _ => false,
    }
}

fn matches(entity: &Value, query: &Value) -> bool {
    let Some(query) = query.as_object() else {
        return true;
    };
    query.iter().all(|(key, expected)| match field(entity, key) {
        None => false,
        Some(actual) => match expected {
            Value::Array(options) => options.iter().any(|option| value_matches(actual, option)),
            _ => value_matches(actual, expected),
        },
    })
}

impl LimsClient for MockClient {
    fn read(&self, endpoint: &str, query: &Value) -> Result<Vec<Value>> {
        *self
            .reads
            .borrow_mut()
            .entry(endpoint.to_string())
            .or_default() += 1;

        let results: Vec<Value> = self
            .store
            .borrow()
            .get(endpoint)
            .map(|entities| {
                entities
                    .iter()
                    .filter(|entity| matches(entity, query))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        debug!("mock read {} {} -> {} results", endpoint, query, results.len());
        Ok(results)
    }

    fn save(&self, endpoint: &str, obj: &Value) -> Result<Value> {
        let Some(fields) = obj.as_object() else {
            return Err(AppRunnerError::lims(endpoint, "saved object must be a mapping"));
        };
        self.saves
            .borrow_mut()
            .push((endpoint.to_string(), obj.clone()));

        let saved = {
            let mut store = self.store.borrow_mut();
            let entities = store.entry(endpoint.to_string()).or_default();

            match fields.get("id").and_then(Value::as_i64) {
                Some(id) => {
                    let existing = entities
                        .iter_mut()
                        .find(|e| e.get("id").and_then(Value::as_i64) == Some(id))
                        .ok_or_else(|| {
                            AppRunnerError::lims(endpoint, format!("no entity with id {}", id))
                        })?;
                    if let Some(target) = existing.as_object_mut() {
                        for (key, value) in fields {
                            target.insert(key.clone(), value.clone());
                        }
                    }
                    existing.clone()
                }
                None => {
                    let id = self.next_id.get();
                    self.next_id.set(id + 1);
                    let mut created = Map::new();
                    created.insert("id".to_string(), Value::from(id));
                    for (key, value) in fields {
                        created.insert(key.clone(), value.clone());
                    }
                    let created = Value::Object(created);
                    entities.push(created.clone());
                    created
                }
            }
        };

        info!("mock save {} -> id {}", endpoint, saved["id"]);
        self.persist()?;
        Ok(saved)
    }

    fn delete(&self, endpoint: &str, id: i64) -> Result<()> {
        {
            let mut store = self.store.borrow_mut();
            let entities = store.entry(endpoint.to_string()).or_default();
            let before = entities.len();
            entities.retain(|e| e.get("id").and_then(Value::as_i64) != Some(id));
            if entities.len() == before {
                return Err(AppRunnerError::lims(endpoint, format!("no entity with id {}", id)));
            }
        }
        self.persist()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_read_filters_by_fields() {
        let mock = MockClient::new();
        mock.insert("resource", json!({"id": 1, "name": "a", "workunit": {"id": 7}}));
        mock.insert("resource", json!({"id": 2, "name": "b", "workunit": {"id": 8}}));

        let by_relation = mock.read("resource", &json!({"workunitid": 7})).unwrap();
        assert_eq!(by_relation.len(), 1);
        assert_eq!(by_relation[0]["name"], "a");

        let by_ids = mock.read("resource", &json!({"id": [1, 2, 3]})).unwrap();
        assert_eq!(by_ids.len(), 2);

        let none = mock.read("resource", &json!({"name": "zzz"})).unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_save_creates_then_updates() {
        let mock = MockClient::new();
        mock.insert("workunit", json!({"id": 10, "status": "pending"}));

        let created = mock.save("resource", &json!({"name": "out.txt"})).unwrap();
        assert_eq!(created["id"], 11);

        let updated = mock
            .save("workunit", &json!({"id": 10, "status": "available"}))
            .unwrap();
        assert_eq!(updated["status"], "available");
        assert_eq!(mock.saved("workunit").len(), 1);
    }

    #[test]
    fn test_save_unknown_id_fails() {
        let mock = MockClient::new();
        assert!(mock.save("resource", &json!({"id": 99})).is_err());
    }

    #[test]
    fn test_delete() {
        let mock = MockClient::new();
        mock.insert("link", json!({"id": 3}));
        mock.delete("link", 3).unwrap();
        assert!(mock.entities("link").is_empty());
        assert!(mock.delete("link", 3).is_err());
    }

    #[test]
    fn test_store_file_persists_saves() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.yml");
        fs::write(&path, "workunit:\n- id: 5\n  status: pending\n").unwrap();

        let mock = MockClient::from_store_file(&path).unwrap();
        mock.save("workunit", &json!({"id": 5, "status": "processing"}))
            .unwrap();

        let reloaded = MockClient::from_store_file(&path).unwrap();
        let workunits = reloaded.read("workunit", &json!({"id": 5})).unwrap();
        assert_eq!(workunits[0]["status"], "processing");

        let created = reloaded.save("resource", &json!({"name": "x"})).unwrap();
        assert_eq!(created["id"], 6);
    }
}
