//! Reader/writer-locked containers shared across connection tasks.
//!
//! Lock discipline: lookups and iteration take the shared lock, mutation takes
//! the exclusive lock. Closures passed to [`SafeMap::read`] and
//! [`SafeMap::write`] run with the lock held, so they must not perform network
//! I/O or call back into the same map.

use std::collections::HashMap;
use std::hash::Hash;

use parking_lot::RwLock;

#[derive(Debug)]
pub struct SafeMap<K, V> {
    inner: RwLock<HashMap<K, V>>,
}

impl<K, V> Default for SafeMap<K, V> {
    fn default() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash, V> SafeMap<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Whether `key` is present.
    pub fn contains_key(&self, key: &K) -> bool {
        self.inner.read().contains_key(key)
    }

    /// Inserts `value`, returning whatever was stored under `key` before.
    pub fn insert(&self, key: K, value: V) -> Option<V> {
        self.inner.write().insert(key, value)
    }

    /// Removes and returns the entry for `key`.
    pub fn remove(&self, key: &K) -> Option<V> {
        self.inner.write().remove(key)
    }

    /// Removes the entry only when `pred` accepts the current value.
    pub fn remove_if(&self, key: &K, pred: impl FnOnce(&V) -> bool) -> Option<V> {
        let mut map = self.inner.write();
        match map.get(key) {
            Some(v) if pred(v) => map.remove(key),
            _ => None,
        }
    }

    /// Runs `f` under the read lock.
    pub fn read<R>(&self, f: impl FnOnce(&HashMap<K, V>) -> R) -> R {
        f(&self.inner.read())
    }

    /// Runs `f` under the write lock.
    pub fn write<R>(&self, f: impl FnOnce(&mut HashMap<K, V>) -> R) -> R {
        f(&mut self.inner.write())
    }

    /// Drains every entry, leaving the map empty.
    pub fn drain(&self) -> Vec<(K, V)> {
        self.inner.write().drain().collect()
    }
}

impl<K: Eq + Hash, V: Clone> SafeMap<K, V> {
    /// A clone of the value for `key`.
    pub fn get(&self, key: &K) -> Option<V> {
        self.inner.read().get(key).cloned()
    }

    /// Clones of every value.
    pub fn values(&self) -> Vec<V> {
        self.inner.read().values().cloned().collect()
    }

    /// Clones every value accepted by `pred` under a single shared lock.
    pub fn filter_values(&self, mut pred: impl FnMut(&K, &V) -> bool) -> Vec<V> {
        self.inner
            .read()
            .iter()
            .filter(|(k, v)| pred(k, v))
            .map(|(_, v)| v.clone())
            .collect()
    }
}

impl<K: Eq + Hash + Clone, V> SafeMap<K, V> {
    pub fn keys(&self) -> Vec<K> {
        self.inner.read().keys().cloned().collect()
    }
}
