//! Concurrent maps that can hold a collection.
//!
//! Collections are always keyed by record id (a `String`). Implement
//! [`MapBackend`] to bring your own concurrent map.

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Trait that a concurrent map must satisfy to back a
/// [`Collection`](crate::collection::Collection).
///
/// Every method works with owned values so collections behave the same
/// regardless of how the map stores things internally. ShardMap keeps values
/// behind an `Arc` and clones on read; records are small enough that this
/// does not matter.
pub trait MapBackend<V>: Send + Sync
where
    V: Send + Sync + Clone + Serialize + DeserializeOwned,
{
    /// Insert a value under `id`, returning the previous value if any.
    fn insert(&self, id: String, value: V) -> Option<V>;

    /// Look up a value by id.
    fn get(&self, id: &str) -> Option<V>;

    /// Remove an id, returning its value if it was present.
    fn remove(&self, id: &str) -> Option<V>;

    /// Snapshot of all entries. Must not hold locks that would block
    /// concurrent writers while the caller iterates.
    fn snapshot(&self) -> Vec<(String, V)>;

    /// Number of entries.
    fn len(&self) -> usize;

    /// Check if an id exists without cloning the value.
    fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Drop all entries. Override with the map's native clear when it has one.
    fn clear(&self) {
        for (id, _) in self.snapshot() {
            self.remove(&id);
        }
    }
}

// ---- ShardMap ----------------------------------------------------------------

impl<V> MapBackend<V> for shardmap::ShardMap<String, V>
where
    V: Send + Sync + Clone + Serialize + DeserializeOwned,
{
    fn insert(&self, id: String, value: V) -> Option<V> {
        shardmap::ShardMap::insert(self, id, value)
    }

    fn get(&self, id: &str) -> Option<V> {
        shardmap::ShardMap::get(self, id)
    }

    fn remove(&self, id: &str) -> Option<V> {
        shardmap::ShardMap::remove(self, id)
    }

    fn snapshot(&self) -> Vec<(String, V)> {
        self.entries()
    }

    fn len(&self) -> usize {
        shardmap::ShardMap::len(self)
    }

    // get returns Arc<V>, so is_some() is only a refcount bump.
    fn contains(&self, id: &str) -> bool {
        shardmap::ShardMap::get(self, id).is_some()
    }
}

// ---- RwLock<HashMap> ---------------------------------------------------------

impl<V> MapBackend<V> for parking_lot::RwLock<std::collections::HashMap<String, V>>
where
    V: Send + Sync + Clone + Serialize + DeserializeOwned,
{
    fn insert(&self, id: String, value: V) -> Option<V> {
        self.write().insert(id, value)
    }

    fn get(&self, id: &str) -> Option<V> {
        self.read().get(id).cloned()
    }

    fn remove(&self, id: &str) -> Option<V> {
        self.write().remove(id)
    }

    fn snapshot(&self) -> Vec<(String, V)> {
        self.read()
            .iter()
            .map(|(id, v)| (id.clone(), v.clone()))
            .collect()
    }

    fn len(&self) -> usize {
        self.read().len()
    }

    fn contains(&self, id: &str) -> bool {
        self.read().contains_key(id)
    }

    fn clear(&self) {
        self.write().clear()
    }
}

// ---- DashMap (feature-gated) -------------------------------------------------

#[cfg(feature = "dashmap")]
impl<V> MapBackend<V> for dashmap::DashMap<String, V>
where
    V: Send + Sync + Clone + Serialize + DeserializeOwned,
{
    fn insert(&self, id: String, value: V) -> Option<V> {
        dashmap::DashMap::insert(self, id, value)
    }

    fn get(&self, id: &str) -> Option<V> {
        dashmap::DashMap::get(self, id).map(|r| r.value().clone())
    }

    fn remove(&self, id: &str) -> Option<V> {
        dashmap::DashMap::remove(self, id).map(|(_, v)| v)
    }

    fn snapshot(&self) -> Vec<(String, V)> {
        self.iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect()
    }

    fn len(&self) -> usize {
        dashmap::DashMap::len(self)
    }

    fn contains(&self, id: &str) -> bool {
        dashmap::DashMap::contains_key(self, id)
    }

    fn clear(&self) {
        dashmap::DashMap::clear(self)
    }
}
