//! Per-entity collection engine: concurrent id→value map, JSON file, flush
//! policy.

use crate::backend::MapBackend;
use crate::codec::{Codec, JsonCodec};
use crate::error::Result;
use crate::flush::{FlushPolicy, FlushWorker};
use crate::persist::{atomic_write, load};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::mpsc::SyncSender;
use std::sync::Arc;

/// Values keyed by id, optionally persisted to a JSON object on disk.
///
/// Generic over value `V` and map backend `M`. Use
/// [`in_memory`](Self::in_memory) or [`open`](Self::open) for a quick start,
/// or [`builder`](Self::builder) for control over flush policy and
/// formatting.
///
/// All operations are thread-safe; the concurrency guarantees come from
/// whichever backend you pick. Writes to disk are serialised per collection,
/// and each one captures the map as it is once the writer holds the lock, so
/// an older snapshot never lands on top of a newer one.
///
/// Under [`FlushPolicy::Immediate`] a mutation whose write fails is undone
/// before the error is returned.
pub struct Collection<V, M> {
    map: Arc<M>,
    path: Option<PathBuf>,
    codec: JsonCodec,
    flush_lock: Arc<Mutex<()>>,
    policy: FlushPolicy,
    trigger: Option<SyncSender<()>>,
    _marker: PhantomData<V>,
}

impl<V, M> Collection<V, M>
where
    V: Send + Sync + Clone + Serialize + DeserializeOwned + 'static,
    M: MapBackend<V> + 'static,
{
    /// A collection that never touches disk.
    pub fn in_memory() -> CollectionHandle<V, M>
    where
        M: Default,
    {
        CollectionHandle {
            inner: Arc::new(Collection {
                map: Arc::new(M::default()),
                path: None,
                codec: JsonCodec::new(),
                flush_lock: Arc::new(Mutex::new(())),
                policy: FlushPolicy::Manual,
                trigger: None,
                _marker: PhantomData,
            }),
            worker: None,
        }
    }

    /// Open (or create) a collection at `path`, flushing after every write.
    pub fn open(path: impl AsRef<Path>) -> Result<CollectionHandle<V, M>>
    where
        M: Default,
    {
        Self::builder().path(path).build()
    }

    /// Start configuring a new collection.
    pub fn builder() -> CollectionBuilder<V, M>
    where
        M: Default,
    {
        CollectionBuilder::new()
    }

    // ---- reads ----

    /// The value stored under `id`, or `None`.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<V> {
        self.map.get(id)
    }

    /// `true` if `id` is present.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.map.contains(id)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// `true` when the collection has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of all (id, value) pairs in no particular order.
    #[must_use]
    pub fn entries(&self) -> Vec<(String, V)> {
        self.map.snapshot()
    }

    /// Snapshot of all values in no particular order.
    #[must_use]
    pub fn values(&self) -> Vec<V> {
        self.map.snapshot().into_iter().map(|(_, v)| v).collect()
    }

    /// Backing file, if the collection is persisted.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    // ---- writes ----

    /// Store `value` under `id`, returning the value it replaced.
    pub fn insert(&self, id: String, value: V) -> Result<Option<V>> {
        let prev = self.map.insert(id.clone(), value);
        if let Err(e) = self.notify_mutation() {
            self.restore(&id, prev);
            return Err(e);
        }
        Ok(prev)
    }

    /// Remove `id`, returning its value if it was present.
    pub fn remove(&self, id: &str) -> Result<Option<V>> {
        let prev = self.map.remove(id);
        if let Some(v) = &prev {
            if let Err(e) = self.notify_mutation() {
                self.map.insert(id.to_string(), v.clone());
                return Err(e);
            }
        }
        Ok(prev)
    }

    /// Remove every id in `ids` with a single write. Returns how many were
    /// present.
    pub fn remove_all(&self, ids: &[String]) -> Result<usize> {
        let removed: Vec<(String, V)> = ids
            .iter()
            .filter_map(|id| self.map.remove(id).map(|v| (id.clone(), v)))
            .collect();
        if removed.is_empty() {
            return Ok(0);
        }
        if let Err(e) = self.notify_mutation() {
            for (id, v) in removed {
                self.map.insert(id, v);
            }
            return Err(e);
        }
        Ok(removed.len())
    }

    /// Drop every entry.
    pub fn clear(&self) -> Result<()> {
        let before = self.map.snapshot();
        self.map.clear();
        if let Err(e) = self.notify_mutation() {
            for (id, v) in before {
                self.map.insert(id, v);
            }
            return Err(e);
        }
        Ok(())
    }

    /// Bulk insert. Triggers one flush at the end, not one per entry.
    pub fn extend<I>(&self, iter: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, V)>,
    {
        let replaced: Vec<(String, Option<V>)> = iter
            .into_iter()
            .map(|(id, v)| {
                let prev = self.map.insert(id.clone(), v);
                (id, prev)
            })
            .collect();
        if let Err(e) = self.notify_mutation() {
            for (id, prev) in replaced.into_iter().rev() {
                self.restore(&id, prev);
            }
            return Err(e);
        }
        Ok(())
    }

    /// Mutate the value at `id` in place and return the new value, or `None`
    /// when the id is absent (nothing is written in that case). The closure
    /// may fail, in which case nothing is written either.
    ///
    /// This is a get-then-put, so two concurrent updates of the same id can
    /// lose one of the changes.
    pub fn update<F>(&self, id: &str, f: F) -> Result<Option<V>>
    where
        F: FnOnce(&mut V) -> Result<()>,
    {
        let Some(mut v) = self.map.get(id) else {
            return Ok(None);
        };
        f(&mut v)?;
        let prev = self.map.insert(id.to_string(), v.clone());
        if let Err(e) = self.notify_mutation() {
            self.restore(id, prev);
            return Err(e);
        }
        Ok(Some(v))
    }

    // ---- persistence ----

    /// Write the current contents to disk (atomic temp-file + rename). No-op
    /// for in-memory collections.
    pub fn flush(&self) -> Result<()> {
        match &self.path {
            Some(path) => write_snapshot(self.map.as_ref(), path, &self.codec, &self.flush_lock),
            None => Ok(()),
        }
    }

    // ---- internal ----

    fn restore(&self, id: &str, prev: Option<V>) {
        match prev {
            Some(v) => {
                self.map.insert(id.to_string(), v);
            }
            None => {
                self.map.remove(id);
            }
        }
    }

    fn notify_mutation(&self) -> Result<()> {
        match &self.policy {
            FlushPolicy::Immediate => self.flush()?,
            FlushPolicy::Async(_) => {
                if let Some(t) = &self.trigger {
                    let _ = t.try_send(());
                }
            }
            FlushPolicy::Manual => {}
        }
        Ok(())
    }
}

impl<V, M> std::fmt::Debug for Collection<V, M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("path", &self.path)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

// Sorted by id so the file diffs cleanly between writes.
fn write_snapshot<V, M>(map: &M, path: &Path, codec: &JsonCodec, lock: &Mutex<()>) -> Result<()>
where
    V: Send + Sync + Clone + Serialize + DeserializeOwned,
    M: MapBackend<V>,
{
    let _guard = lock.lock();
    let data: BTreeMap<String, V> = map.snapshot().into_iter().collect();
    let bytes = codec.encode(&data)?;
    atomic_write(path, &bytes)
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Configures and opens a [`Collection`].
///
/// ```rust,no_run
/// use cashpot::collection::Collection;
/// use cashpot::FlushPolicy;
/// use shardmap::ShardMap;
///
/// let items = Collection::<String, ShardMap<String, String>>::builder()
///     .path("storage.json")
///     .policy(FlushPolicy::Manual)
///     .pretty(true)
///     .build()
///     .unwrap();
/// ```
pub struct CollectionBuilder<V, M> {
    path: Option<PathBuf>,
    policy: FlushPolicy,
    pretty: bool,
    _marker: PhantomData<(V, M)>,
}

impl<V, M> CollectionBuilder<V, M>
where
    V: Send + Sync + Clone + Serialize + DeserializeOwned + 'static,
    M: MapBackend<V> + Default + 'static,
{
    fn new() -> Self {
        Self {
            path: None,
            policy: FlushPolicy::Immediate,
            pretty: false,
            _marker: PhantomData,
        }
    }

    /// Persist to this file (default: memory only).
    pub fn path(mut self, path: impl AsRef<Path>) -> Self {
        self.path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Set the flush policy (default: [`FlushPolicy::Immediate`]).
    pub fn policy(mut self, policy: FlushPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Write indented JSON (default: compact).
    pub fn pretty(mut self, yes: bool) -> Self {
        self.pretty = yes;
        self
    }

    /// Load (or create) the collection and return a handle.
    pub fn build(self) -> Result<CollectionHandle<V, M>> {
        let codec = JsonCodec::with_pretty(self.pretty);
        let map = Arc::new(M::default());
        let flush_lock = Arc::new(Mutex::new(()));

        if let Some(path) = &self.path {
            let data: BTreeMap<String, V> = load(path, &codec)?;
            for (id, v) in data {
                map.insert(id, v);
            }
        }

        let (worker, trigger) = match (&self.policy, &self.path) {
            (FlushPolicy::Async(interval), Some(path)) => {
                let (tx, rx) = std::sync::mpsc::sync_channel(0);
                let map_ref = Arc::clone(&map);
                let lock = Arc::clone(&flush_lock);
                let path = path.clone();
                let w = FlushWorker::start(
                    *interval,
                    move || {
                        if let Err(e) = write_snapshot(map_ref.as_ref(), &path, &codec, &lock) {
                            tracing::error!(path = %path.display(), error = %e, "background flush failed");
                        }
                    },
                    rx,
                );
                (Some(w), Some(tx))
            }
            _ => (None, None),
        };

        let collection = Collection {
            map,
            path: self.path,
            codec,
            flush_lock,
            policy: self.policy,
            trigger,
            _marker: PhantomData,
        };

        Ok(CollectionHandle {
            inner: Arc::new(collection),
            worker,
        })
    }
}

impl<V, M> std::fmt::Debug for CollectionBuilder<V, M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionBuilder")
            .field("path", &self.path)
            .field("policy", &self.policy)
            .field("pretty", &self.pretty)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Owns the collection and, for the async policy, its flush thread.
///
/// Derefs to [`Collection`]. Dropping the handle drops the trigger first so
/// the worker wakes up, writes once more and exits.
pub struct CollectionHandle<V, M> {
    inner: Arc<Collection<V, M>>,
    #[allow(dead_code)]
    worker: Option<FlushWorker>,
}

impl<V, M> std::ops::Deref for CollectionHandle<V, M> {
    type Target = Collection<V, M>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<V, M> std::fmt::Debug for CollectionHandle<V, M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(&*self.inner, f)
    }
}
