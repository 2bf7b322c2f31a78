//! Entity Lookup Cache
//!
//! A bounded FIFO cache for entities fetched by id. Entities are treated as
//! immutable within one phase, so the cache only needs to drop entries that
//! the same process saves or deletes.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::hash::Hash;

use log::debug;
use serde_json::{json, Value};

use super::client::LimsClient;
use crate::error::Result;

/// Default number of entities kept by [`CachingClient`].
pub const DEFAULT_CACHE_SIZE: usize = 1024;

/// Insertion-ordered cache evicting the oldest entry once full.
#[derive(Debug, Clone)]
pub struct FifoCache<K, V> {
    max_size: usize,
    order: VecDeque<K>,
    entries: HashMap<K, V>,
}

impl<K: Eq + Hash + Clone, V> FifoCache<K, V> {
    /// Creates a cache holding at most `max_size` entries (0 disables it).
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            order: VecDeque::new(),
            entries: HashMap::new(),
        }
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    /// Inserts or replaces `key`. Replacing keeps the original position.
    pub fn put(&mut self, key: K, value: V) {
        if self.max_size == 0 {
            return;
        }
        if self.entries.insert(key.clone(), value).is_none() {
            self.order.push_back(key);
        }
        while self.order.len() > self.max_size {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
    }

    pub fn remove(&mut self, key: &K) {
        if self.entries.remove(key).is_some() {
            self.order.retain(|k| k != key);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Wraps a client and memoises lookups of the form `{"id": n}` or
/// `{"id": [n, ...]}`.
pub struct CachingClient<C> {
    inner: C,
    cache: RefCell<FifoCache<(String, i64), Value>>,
}

impl<C: LimsClient> CachingClient<C> {
    pub fn new(inner: C) -> Self {
        Self::with_capacity(inner, DEFAULT_CACHE_SIZE)
    }

    pub fn with_capacity(inner: C, max_size: usize) -> Self {
        Self {
            inner,
            cache: RefCell::new(FifoCache::new(max_size)),
        }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    /// Extracts the requested ids when the query is a pure id lookup.
    fn id_lookup(query: &Value) -> Option<Vec<i64>> {
        let object = query.as_object()?;
        if object.len() != 1 {
            return None;
        }
        match object.get("id")? {
            Value::Number(n) => n.as_i64().map(|id| vec![id]),
            Value::Array(items) => items.iter().map(Value::as_i64).collect(),
            _ => None,
        }
    }
}

impl<C: LimsClient> LimsClient for CachingClient<C> {
    fn read(&self, endpoint: &str, query: &Value) -> Result<Vec<Value>> {
        let Some(ids) = Self::id_lookup(query) else {
            return self.inner.read(endpoint, query);
        };

        let missing: Vec<i64> = {
            let cache = self.cache.borrow();
            ids.iter()
                .copied()
                .filter(|id| cache.get(&(endpoint.to_string(), *id)).is_none())
                .collect()
        };

        if missing.is_empty() {
            debug!("Cache hit for {} {:?}", endpoint, ids);
        } else {
            let fetched = self.inner.read(endpoint, &json!({ "id": missing }))?;
            let mut cache = self.cache.borrow_mut();
            for entity in fetched {
                if let Some(id) = entity.get("id").and_then(Value::as_i64) {
                    cache.put((endpoint.to_string(), id), entity);
                }
            }
        }

        let cache = self.cache.borrow();
        Ok(ids
            .iter()
            .filter_map(|id| cache.get(&(endpoint.to_string(), *id)).cloned())
            .collect())
    }

    fn save(&self, endpoint: &str, obj: &Value) -> Result<Value> {
        if let Some(id) = obj.get("id").and_then(Value::as_i64) {
            self.cache.borrow_mut().remove(&(endpoint.to_string(), id));
        }
        self.inner.save(endpoint, obj)
    }

    fn delete(&self, endpoint: &str, id: i64) -> Result<()> {
        self.cache.borrow_mut().remove(&(endpoint.to_string(), id));
        self.inner.delete(endpoint, id)
    }
}
