//! Execution Context: per-request key-value store shared by all stages
use serde_json::Value;
use std::any::{type_name, Any};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::ContextError;

type Entry = Arc<dyn Any + Send + Sync>;

/// Per-request side channel between stages.
///
/// Cloning a `Context` clones the handle, not the map: every clone (including
/// the ones handed to parallel branches) sees the same entries. Each `get` or
/// `set` is atomic on its own, but nothing groups several calls together, so
/// read-modify-write sequences across branches need their own synchronization.
#[derive(Clone, Default)]
pub struct Context {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores any typed payload under `key`, replacing a previous entry.
    pub fn set<T: Any + Send + Sync>(&self, key: impl Into<String>, value: T) {
        self.insert(key.into(), Arc::new(value));
    }

    /// Stores a pipeline value under `key`.
    pub fn set_value(&self, key: impl Into<String>, value: Value) {
        self.set(key, value);
    }

    /// Returns the entry under `key` if it exists and holds a `T`.
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        self.entry(key).and_then(|entry| entry.downcast::<T>().ok())
    }

    /// Returns a copy of the pipeline value stored under `key`.
    pub fn get_value(&self, key: &str) -> Option<Value> {
        self.get::<Value>(key).map(|value| (*value).clone())
    }

    /// Like [`Context::get`], but distinguishes a missing key from a wrong type.
    pub fn must_get<T: Any + Send + Sync>(&self, key: &str) -> Result<Arc<T>, ContextError> {
        let entry = self
            .entry(key)
            .ok_or_else(|| ContextError::KeyNotFound(key.to_string()))?;

        entry.downcast::<T>().map_err(|_| ContextError::TypeMismatch {
            key: key.to_string(),
            expected: type_name::<T>(),
        })
    }

    pub fn must_get_value(&self, key: &str) -> Result<Value, ContextError> {
        self.must_get::<Value>(key).map(|value| (*value).clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.read().contains_key(key)
    }

    /// Removes `key`, returning whether it was present.
    pub fn remove(&self, key: &str) -> bool {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
            .is_some()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn entry(&self, key: &str) -> Option<Entry> {
        self.read().get(key).cloned()
    }

    fn insert(&self, key: String, entry: Entry) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, entry);
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Entry>> {
        // Entries are replaced whole, so a poisoned map is still consistent.
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context").field("keys", &self.keys()).finish()
    }
}
