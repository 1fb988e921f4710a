//! Order-preserving multi-map
//!
//! Keys keep insertion order; each key owns an insertion-ordered set of values.
//! Used for adjacency lists, entry dependency declarations and chunk allocations.

use std::hash::Hash;

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

/// A mapping from a key to a set of values
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
#[serde(bound(
    serialize = "K: Serialize + Hash + Eq, V: Serialize + Hash + Eq",
    deserialize = "K: Deserialize<'de> + Hash + Eq, V: Deserialize<'de> + Hash + Eq"
))]
pub struct MultiMap<K, V> {
    map: IndexMap<K, IndexSet<V>>,
}

impl<K: Hash + Eq, V: Hash + Eq> PartialEq for MultiMap<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.map == other.map
    }
}

impl<K: Hash + Eq, V: Hash + Eq> Eq for MultiMap<K, V> {}

impl<K, V> Default for MultiMap<K, V> {
    fn default() -> Self {
        Self {
            map: IndexMap::new(),
        }
    }
}

impl<K: Hash + Eq, V: Hash + Eq> MultiMap<K, V> {
    /// Create an empty multi-map
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a key with no values (no-op when it already exists)
    pub fn add_key(&mut self, key: K) {
        self.map.entry(key).or_default();
    }

    /// Add a value under a key, creating the key if needed
    pub fn add(&mut self, key: K, value: V) {
        self.map.entry(key).or_default().insert(value);
    }

    /// Replace every value under `key`. An existing key keeps its position.
    pub fn put_all(&mut self, key: K, values: impl IntoIterator<Item = V>) -> &mut Self {
        self.map.insert(key, values.into_iter().collect());
        self
    }

    /// Whether `value` is stored under `key`
    pub fn contains(&self, key: &K, value: &V) -> bool {
        self.map
            .get(key)
            .map(|values| values.contains(value))
            .unwrap_or(false)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    /// Reverse lookup: the first key owning `value`
    pub fn find_key(&self, value: &V) -> Option<&K> {
        self.map
            .iter()
            .find(|(_, values)| values.contains(value))
            .map(|(key, _)| key)
    }

    /// Values under `key` in insertion order (empty for unknown keys)
    pub fn values(&self, key: &K) -> impl Iterator<Item = &V> + '_ {
        self.map.get(key).into_iter().flat_map(|values| values.iter())
    }

    /// Values under `key` collected into a vector
    pub fn get(&self, key: &K) -> Vec<&V> {
        self.values(key).collect()
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> + '_ {
        self.map.keys()
    }

    /// Every `(key, value)` pair, key-major
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> + '_ {
        self.map
            .iter()
            .flat_map(|(key, values)| values.iter().map(move |value| (key, value)))
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl<K: Hash + Eq + Clone, V: Hash + Eq + Clone> MultiMap<K, V> {
    /// Snapshot as a plain ordered map of vectors
    pub fn to_map(&self) -> IndexMap<K, Vec<V>> {
        self.map
            .iter()
            .map(|(key, values)| (key.clone(), values.iter().cloned().collect()))
            .collect()
    }
}

impl<K: Hash + Eq, V: Hash + Eq> FromIterator<(K, Vec<V>)> for MultiMap<K, V> {
    fn from_iter<T: IntoIterator<Item = (K, Vec<V>)>>(iter: T) -> Self {
        let mut map = Self::new();
        for (key, values) in iter {
            map.map.entry(key).or_default().extend(values);
        }
        map
    }
}
