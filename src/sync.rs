//! Local storage and the cross-tab sync layer.
//!
//! [`LocalStorage`] is a string key/value area shared by every tab of one
//! session, optionally persisted to a JSON file. Each write publishes a
//! [`StorageEvent`] naming the tab that made it.
//!
//! A [`SyncBus`] is one tab's view: an in-memory mirror of each entity's list
//! (stored under `cashpot_<entity>`), a [`Store`] implementation over that
//! mirror, and a [`DataChanged`] feed for whatever renders the data. Events
//! written by other tabs refresh the mirror; a tab never reacts to its own
//! writes. There is no conflict resolution: the last list written wins.

use crate::collection::{Collection, CollectionHandle};
use crate::error::{Error, Result};
use crate::flush::FlushPolicy;
use crate::record::{Dataset, Fields, Record};
use crate::store::Store;
use crate::DefaultBackend;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Prefix of every entity key in local storage.
pub const KEY_PREFIX: &str = "cashpot_";

const EVENT_CAPACITY: usize = 256;

/// Identifies one tab (one [`SyncBus`]) of a shared [`LocalStorage`].
pub type TabId = u64;

/// A key changed in local storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    /// The key that changed.
    pub key: String,
    /// New value; `None` when the key was removed.
    pub new_value: Option<String>,
    /// Tab that made the change.
    pub origin: TabId,
}

/// An entity's list changed in this tab's mirror.
#[derive(Debug, Clone, PartialEq)]
pub struct DataChanged {
    /// Entity name.
    pub entity: String,
    /// The full list after the change.
    pub records: Vec<Record>,
}

/// Storage key for an entity's list.
pub fn storage_key(entity: &str) -> String {
    format!("{KEY_PREFIX}{entity}")
}

// ---------------------------------------------------------------------------
// LocalStorage
// ---------------------------------------------------------------------------

/// String key/value storage shared between tabs.
pub struct LocalStorage {
    items: CollectionHandle<String, DefaultBackend<String>>,
    events: broadcast::Sender<StorageEvent>,
    next_tab: AtomicU64,
}

impl LocalStorage {
    /// Storage that lives only as long as the process.
    pub fn in_memory() -> Arc<Self> {
        Arc::new(Self::with_items(Collection::in_memory()))
    }

    /// Storage persisted to `path`, written on every change.
    pub fn open(path: impl AsRef<Path>) -> Result<Arc<Self>> {
        let items = Collection::builder()
            .path(path)
            .policy(FlushPolicy::Immediate)
            .pretty(true)
            .build()?;
        Ok(Arc::new(Self::with_items(items)))
    }

    fn with_items(items: CollectionHandle<String, DefaultBackend<String>>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            items,
            events,
            next_tab: AtomicU64::new(1),
        }
    }

    /// Value under `key`.
    pub fn get_item(&self, key: &str) -> Option<String> {
        self.items.get(key)
    }

    /// Store `value` under `key` on behalf of tab `origin`.
    pub fn set_item(&self, key: &str, value: String, origin: TabId) -> Result<()> {
        self.items.insert(key.to_string(), value.clone())?;
        self.publish(StorageEvent {
            key: key.to_string(),
            new_value: Some(value),
            origin,
        });
        Ok(())
    }

    /// Remove `key` on behalf of tab `origin`.
    pub fn remove_item(&self, key: &str, origin: TabId) -> Result<()> {
        if self.items.remove(key)?.is_some() {
            self.publish(StorageEvent {
                key: key.to_string(),
                new_value: None,
                origin,
            });
        }
        Ok(())
    }

    /// Every key currently stored.
    pub fn keys(&self) -> Vec<String> {
        self.items.entries().into_iter().map(|(k, _)| k).collect()
    }

    /// Feed of every change made by any tab.
    pub fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
        self.events.subscribe()
    }

    fn new_tab(&self) -> TabId {
        self.next_tab.fetch_add(1, Ordering::Relaxed)
    }

    fn publish(&self, event: StorageEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }
}

impl std::fmt::Debug for LocalStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStorage")
            .field("items", &self.items)
            .field("subscribers", &self.events.receiver_count())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// SyncBus
// ---------------------------------------------------------------------------

/// One tab's mirror of the entity lists kept in [`LocalStorage`].
pub struct SyncBus {
    tab: TabId,
    storage: Arc<LocalStorage>,
    mirror: RwLock<HashMap<String, Vec<Record>>>,
    changes: broadcast::Sender<DataChanged>,
    write_lock: Mutex<()>,
}

impl SyncBus {
    /// Attach a new tab to `storage`.
    pub fn new(storage: Arc<LocalStorage>) -> Self {
        let (changes, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            tab: storage.new_tab(),
            storage,
            mirror: RwLock::new(HashMap::new()),
            changes,
            write_lock: Mutex::new(()),
        }
    }

    /// This tab's id.
    pub fn tab(&self) -> TabId {
        self.tab
    }

    /// The storage this tab writes to.
    pub fn storage(&self) -> &Arc<LocalStorage> {
        &self.storage
    }

    /// Feed of list changes, both local writes and ones picked up from other
    /// tabs.
    pub fn subscribe(&self) -> broadcast::Receiver<DataChanged> {
        self.changes.subscribe()
    }

    /// Fold a storage event into the mirror. Returns `true` when the mirror
    /// changed. Events from this tab and keys outside the `cashpot_` prefix
    /// are ignored, as are values that do not parse.
    pub fn apply_storage_event(&self, event: &StorageEvent) -> bool {
        if event.origin == self.tab {
            return false;
        }
        let Some(entity) = event.key.strip_prefix(KEY_PREFIX) else {
            return false;
        };
        let records = match event.new_value.as_deref() {
            None => Vec::new(),
            Some(raw) => match parse_list(raw) {
                Ok(records) => records,
                Err(e) => {
                    warn!(key = %event.key, error = %e, "ignoring malformed storage value");
                    return false;
                }
            },
        };
        debug!(tab = self.tab, entity, from = event.origin, "mirror refreshed");
        self.mirror
            .write()
            .insert(entity.to_string(), records.clone());
        self.notify(entity, records);
        true
    }

    /// Re-read an entity's list from storage, replacing the mirror.
    pub fn reload(&self, entity: &str) -> Result<Vec<Record>> {
        let records = self.load(entity)?;
        self.mirror
            .write()
            .insert(entity.to_string(), records.clone());
        Ok(records)
    }

    /// Listen for other tabs' writes on a tokio task until this bus is
    /// dropped or the storage goes away.
    pub fn spawn_listener(self: &Arc<Self>) -> JoinHandle<()> {
        let mut rx = self.storage.subscribe();
        let bus = Arc::downgrade(self);
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => match bus.upgrade() {
                        Some(bus) => {
                            bus.apply_storage_event(&event);
                        }
                        None => break,
                    },
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        let Some(bus) = bus.upgrade() else { break };
                        warn!(tab = bus.tab, missed, "storage events dropped, reloading mirror");
                        bus.reload_all();
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    fn reload_all(&self) {
        let loaded: Vec<String> = self.mirror.read().keys().cloned().collect();
        for entity in loaded {
            match self.reload(&entity) {
                Ok(records) => self.notify(&entity, records),
                Err(e) => warn!(entity = %entity, error = %e, "reload failed"),
            }
        }
    }

    fn load(&self, entity: &str) -> Result<Vec<Record>> {
        match self.storage.get_item(&storage_key(entity)) {
            Some(raw) => parse_list(&raw),
            None => Ok(Vec::new()),
        }
    }

    fn records(&self, entity: &str) -> Result<Vec<Record>> {
        if let Some(records) = self.mirror.read().get(entity) {
            return Ok(records.clone());
        }
        self.reload(entity)
    }

    /// Mirror, persist and announce a new list for `entity`.
    fn commit(&self, entity: &str, records: Vec<Record>) -> Result<()> {
        let raw = serde_json::to_string(&records).map_err(|e| Error::Serialize(e.to_string()))?;
        self.storage.set_item(&storage_key(entity), raw, self.tab)?;
        self.mirror
            .write()
            .insert(entity.to_string(), records.clone());
        self.notify(entity, records);
        Ok(())
    }

    fn modify<T, F>(&self, entity: &str, f: F) -> Result<T>
    where
        F: FnOnce(&mut Vec<Record>) -> Result<T>,
    {
        let _guard = self.write_lock.lock();
        let mut records = self.records(entity)?;
        let out = f(&mut records)?;
        self.commit(entity, records)?;
        Ok(out)
    }

    fn notify(&self, entity: &str, records: Vec<Record>) {
        let _ = self.changes.send(DataChanged {
            entity: entity.to_string(),
            records,
        });
    }
}

fn parse_list(raw: &str) -> Result<Vec<Record>> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(raw).map_err(|e| Error::Deserialize(e.to_string()))
}

impl Store for SyncBus {
    fn list(&self, entity: &str) -> Result<Vec<Record>> {
        self.records(entity)
    }

    fn get(&self, entity: &str, id: &str) -> Result<Option<Record>> {
        Ok(self.records(entity)?.into_iter().find(|r| r.id == id))
    }

    fn create(&self, entity: &str, fields: Fields) -> Result<Record> {
        let record = Record::create(entity, fields);
        let out = record.clone();
        self.modify(entity, move |list| {
            list.push(record);
            Ok(())
        })?;
        Ok(out)
    }

    fn update(&self, entity: &str, id: &str, fields: Fields) -> Result<Record> {
        self.modify(entity, |list| {
            let record = list
                .iter_mut()
                .find(|r| r.id == id)
                .ok_or_else(|| Error::not_found(entity, id))?;
            record.apply(fields);
            Ok(record.clone())
        })
    }

    fn delete(&self, entity: &str, id: &str) -> Result<()> {
        self.modify(entity, |list| {
            let index = list
                .iter()
                .position(|r| r.id == id)
                .ok_or_else(|| Error::not_found(entity, id))?;
            list.remove(index);
            Ok(())
        })
    }

    fn replace(&self, entity: &str, records: Vec<Record>) -> Result<()> {
        let _guard = self.write_lock.lock();
        self.commit(entity, records)
    }

    fn bulk_delete(&self, entity: &str, ids: &[String]) -> Result<usize> {
        self.modify(entity, |list| {
            let missing: Vec<&str> = ids
                .iter()
                .filter(|id| !list.iter().any(|r| &r.id == *id))
                .map(String::as_str)
                .collect();
            if !missing.is_empty() {
                return Err(Error::not_found(entity, &missing.join(", ")));
            }
            let before = list.len();
            list.retain(|r| !ids.contains(&r.id));
            Ok(before - list.len())
        })
    }

    fn import(&self, entity: &str, records: Vec<Record>) -> Result<usize> {
        self.modify(entity, move |list| {
            let count = records.len();
            for record in records {
                match list.iter_mut().find(|r| r.id == record.id) {
                    Some(slot) => *slot = record,
                    None => list.push(record),
                }
            }
            Ok(count)
        })
    }

    fn snapshot(&self) -> Result<Dataset> {
        let mut names: Vec<String> = self
            .storage
            .keys()
            .into_iter()
            .filter_map(|k| k.strip_prefix(KEY_PREFIX).map(str::to_string))
            .collect();
        names.extend(self.mirror.read().keys().cloned());
        let mut data = Dataset::new();
        for name in names {
            if !data.contains_key(&name) {
                let records = self.records(&name)?;
                data.insert(name, records);
            }
        }
        Ok(data)
    }
}

impl std::fmt::Debug for SyncBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncBus")
            .field("tab", &self.tab)
            .field("entities", &self.mirror.read().len())
            .finish_non_exhaustive()
    }
}
