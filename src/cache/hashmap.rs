//! HashMap-backed key/value store with hit and miss counters.

use std::collections::HashMap;
use std::hash::Hash;

/// A cache backed by [HashMap].
///
/// Lookups are counted so callers can report hit rates.
#[derive(Debug, Clone)]
pub struct HashMapCache<K, V> {
    map: HashMap<K, V>,
    hits: usize,
    misses: usize,
}

impl<K, V> Default for HashMapCache<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> HashMapCache<K, V> {
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
            hits: 0,
            misses: 0,
        }
    }

    /// Creates a new cache with pre-allocated capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            map: HashMap::with_capacity(capacity),
            hits: 0,
            misses: 0,
        }
    }

    /// Returns the number of entries in the cache.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns true if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Returns the number of cache hits.
    pub fn hits(&self) -> usize {
        self.hits
    }

    /// Returns the number of cache misses.
    pub fn misses(&self) -> usize {
        self.misses
    }

    /// Fraction of lookups that hit, 0 when nothing was looked up.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Clears all entries. The counters are kept.
    pub fn clear(&mut self) {
        self.map.clear();
    }
}

impl<K, V> HashMapCache<K, V>
where
    K: Hash + Eq,
{
    /// Looks up a key in the cache.
    #[inline]
    pub fn get(&mut self, key: &K) -> Option<&V> {
        match self.map.get(key) {
            Some(v) => {
                self.hits += 1;
                Some(v)
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Looks up a key without touching the counters.
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.map.get(key)
    }

    /// Inserts a key-value pair, keeping an existing entry for the same key.
    #[inline]
    pub fn insert(&mut self, key: K, value: V) {
        self.map.entry(key).or_insert(value);
    }
}
