use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::MultiIndexError;

type InnerMap<K, V> = Arc<Mutex<HashMap<K, V>>>;

/// A thread-safe registry of named mappings.
///
/// Each named index owns its own lock, so concurrent operations on two
/// different index names never contend with each other. A single top-level
/// lock guards only the name → inner-map table itself, and is never held
/// while an inner lock is taken or while a caller consumes a [`range`]
/// snapshot.
///
/// [`range`]: MultiIndex::range
pub struct MultiIndex<K, V> {
    registry: Mutex<HashMap<String, InnerMap<K, V>>>,
}

impl<K, V> Default for MultiIndex<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> MultiIndex<K, V>
where
    K: Eq + Hash,
{
    pub fn new() -> Self {
        Self {
            registry: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a named index. Idempotent: if `name` already exists this
    /// preserves whatever entries are already stored in it.
    pub fn create(&self, name: &str) {
        self.registry
            .lock()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(HashMap::new())));
    }

    fn index(&self, name: &str) -> InnerMap<K, V> {
        let mut registry = self.registry.lock();
        registry
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(HashMap::new())))
            .clone()
    }

    fn existing_index(&self, name: &str) -> Option<InnerMap<K, V>> {
        self.registry.lock().get(name).cloned()
    }

    /// Stores `value` under `key` in the named index, auto-creating the
    /// index if it did not already exist. Overwrites any prior value.
    pub fn store(&self, name: &str, key: K, value: V) {
        let inner = self.index(name);
        inner.lock().insert(key, value);
    }

    /// Returns the existing value for `key` if present (with `true`), or
    /// inserts `value` and returns it (with `false`). The read-then-write is
    /// atomic with respect to other `load_or_store` calls on the same
    /// `(name, key)`, since only the inner lock is held throughout.
    pub fn load_or_store(&self, name: &str, key: K, value: V) -> (V, bool)
    where
        V: Clone,
    {
        let inner = self.index(name);
        let mut guard = inner.lock();
        if let Some(existing) = guard.get(&key) {
            return (existing.clone(), true);
        }
        guard.insert(key, value.clone());
        (value, false)
    }

    /// Loads the value for `key` in the named index.
    ///
    /// # Errors
    /// Returns [`MultiIndexError::UnknownIndex`] if `name` was never created.
    pub fn load(&self, name: &str, key: &K) -> Result<Option<V>, MultiIndexError>
    where
        V: Clone,
    {
        let inner = self
            .existing_index(name)
            .ok_or_else(|| MultiIndexError::UnknownIndex(name.to_string()))?;
        Ok(inner.lock().get(key).cloned())
    }

    /// Returns a stable snapshot of `(key, value)` pairs in the named index,
    /// captured while the inner lock was held and yielded without it.
    ///
    /// # Errors
    /// Returns [`MultiIndexError::UnknownIndex`] if `name` was never created.
    pub fn range(&self, name: &str) -> Result<Vec<(K, V)>, MultiIndexError>
    where
        K: Clone,
        V: Clone,
    {
        let inner = self
            .existing_index(name)
            .ok_or_else(|| MultiIndexError::UnknownIndex(name.to_string()))?;
        let snapshot = inner
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Ok(snapshot)
    }

    /// Removes `key` from the named index, if both exist.
    pub fn delete(&self, name: &str, key: &K) {
        if let Some(inner) = self.existing_index(name) {
            inner.lock().remove(key);
        }
    }

    /// Removes an entire named index.
    pub fn drop_index(&self, name: &str) {
        self.registry.lock().remove(name);
    }

    /// Lists all registered index names.
    pub fn list_names(&self) -> Vec<String> {
        self.registry.lock().keys().cloned().collect()
    }
}
