//! Bounded memo tables.

use dashmap::DashMap;
use std::hash::Hash;

/// A concurrent memo table that stops admitting entries at `capacity`.
///
/// Values are pure functions of their keys, so a full table only costs
/// recomputation; it never changes an answer.
#[derive(Debug)]
pub struct BoundedMemo<K: Eq + Hash, V> {
    entries: DashMap<K, V>,
    capacity: usize,
}

impl<K, V> BoundedMemo<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            capacity,
        }
    }

    pub fn get_or_insert_with(&self, key: K, compute: impl FnOnce() -> V) -> V {
        if let Some(value) = self.entries.get(&key) {
            return value.clone();
        }
        let value = compute();
        self.admit(key, value.clone());
        value
    }

    pub fn try_get_or_insert_with<E>(
        &self,
        key: K,
        compute: impl FnOnce() -> Result<V, E>,
    ) -> Result<V, E> {
        if let Some(value) = self.entries.get(&key) {
            return Ok(value.clone());
        }
        let value = compute()?;
        self.admit(key, value.clone());
        Ok(value)
    }

    fn admit(&self, key: K, value: V) {
        if self.entries.len() < self.capacity {
            self.entries.insert(key, value);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
