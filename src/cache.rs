use std::hash::Hash;

use ahash::AHashMap;
use parking_lot::RwLock;

use crate::definition::{Multiplicity, PropertyKeyDef};

pub struct CatalogCache<K, V> {
    inner: RwLock<AHashMap<K, V>>,
}

impl<K: Eq + Hash, V: Clone> CatalogCache<K, V> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(AHashMap::new()),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.inner.read().get(key).cloned()
    }

    pub fn insert(&self, key: K, value: V) {
        self.inner.write().insert(key, value);
    }

    pub fn clear(&self) {
        self.inner.write().clear();
    }
}

impl<K: Eq + Hash, V: Clone> Default for CatalogCache<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Positive lookups against the schema catalog.
///
/// Catalog entries are never altered once committed, so only hits are stored.
/// A rolled back management transaction may have exposed uncommitted entries
/// and must call [`SchemaCache::clear`].
#[derive(Default)]
pub struct SchemaCache {
    pub property_keys: CatalogCache<String, PropertyKeyDef>,
    pub vertex_labels: CatalogCache<String, ()>,
    pub edge_labels: CatalogCache<String, Multiplicity>,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&self) {
        self.property_keys.clear();
        self.vertex_labels.clear();
        self.edge_labels.clear();
    }
}
