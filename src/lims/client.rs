//! The LIMS client contract.

use serde_json::Value;

use crate::error::Result;

/// Minimal CRUD surface of the LIMS.
///
/// Entities are exchanged as JSON objects. A query is a JSON object whose
/// keys are entity fields; an array value matches any of its elements.
pub trait LimsClient {
    /// Returns every entity of `endpoint` matching `query`.
    fn read(&self, endpoint: &str, query: &Value) -> Result<Vec<Value>>;

    /// Creates `obj`, or updates the entity with `obj["id"]` when present,
    /// and returns the stored entity.
    fn save(&self, endpoint: &str, obj: &Value) -> Result<Value>;

    /// Deletes the entity with `id`.
    fn delete(&self, endpoint: &str, id: i64) -> Result<()>;
}

impl<T: LimsClient + ?Sized> LimsClient for &T {
    fn read(&self, endpoint: &str, query: &Value) -> Result<Vec<Value>> {
        (**self).read(endpoint, query)
    }

    fn save(&self, endpoint: &str, obj: &Value) -> Result<Value> {
        (**self).save(endpoint, obj)
    }

    fn delete(&self, endpoint: &str, id: i64) -> Result<()> {
        (**self).delete(endpoint, id)
    }
}

impl<T: LimsClient + ?Sized> LimsClient for Box<T> {
    fn read(&self, endpoint: &str, query: &Value) -> Result<Vec<Value>> {
        (**self).read(endpoint, query)
    }

    fn save(&self, endpoint: &str, obj: &Value) -> Result<Value> {
        (**self).save(endpoint, obj)
    }

    fn delete(&self, endpoint: &str, id: i64) -> Result<()> {
        (**self).delete(endpoint, id)
    }
}
