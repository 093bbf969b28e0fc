//! Document store: one collection per entity, schema-checked.
//!
//! Collections live in memory and, when a directory is configured, are
//! written to `<dir>/<entity>.json` according to the flush policy.

use crate::collection::{Collection, CollectionHandle};
use crate::entity::{self, EntityDef};
use crate::error::{Error, Result};
use crate::flush::FlushPolicy;
use crate::record::{Dataset, Fields, Record};
use crate::store::Store;
use crate::DefaultBackend;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

type RecordCollection = CollectionHandle<Record, DefaultBackend<Record>>;

/// Where the document store keeps its collections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backing {
    /// Nothing is written to disk.
    Memory,
    /// One JSON file per entity in this directory.
    Directory(PathBuf),
}

impl Backing {
    /// Parse a connection string: `memory://`, `file://<dir>` or a bare
    /// directory path.
    pub fn parse(url: &str) -> Result<Self> {
        let url = url.trim();
        if url.is_empty() {
            return Err(Error::Config("empty database url".into()));
        }
        if url == "memory://" || url == "memory" {
            return Ok(Backing::Memory);
        }
        if let Some(dir) = url.strip_prefix("file://") {
            if dir.is_empty() {
                return Err(Error::Config(format!("no directory in database url {url}")));
            }
            return Ok(Backing::Directory(PathBuf::from(dir)));
        }
        if url.contains("://") {
            return Err(Error::Config(format!("unsupported database url {url}")));
        }
        Ok(Backing::Directory(PathBuf::from(url)))
    }
}

/// Schema-checked store with one [`Collection`] per entity.
pub struct DocumentStore {
    location: Backing,
    policy: FlushPolicy,
    pretty: bool,
    collections: RwLock<HashMap<&'static str, Arc<RecordCollection>>>,
}

impl DocumentStore {
    /// Store that keeps everything in memory.
    pub fn in_memory() -> Self {
        Self::new(Backing::Memory, FlushPolicy::Manual, false)
    }

    /// Store that persists every write to `<dir>/<entity>.json`.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let store = Self::new(
            Backing::Directory(dir.as_ref().to_path_buf()),
            FlushPolicy::Immediate,
            true,
        );
        store.open_existing()?;
        Ok(store)
    }

    /// Store with explicit location, flush policy and formatting. Existing
    /// collection files are loaded right away.
    pub fn with_options(location: Backing, policy: FlushPolicy, pretty: bool) -> Result<Self> {
        let store = Self::new(location, policy, pretty);
        store.open_existing()?;
        Ok(store)
    }

    fn new(location: Backing, policy: FlushPolicy, pretty: bool) -> Self {
        Self {
            location,
            policy,
            pretty,
            collections: RwLock::new(HashMap::new()),
        }
    }

    /// Where collections are kept.
    pub fn location(&self) -> &Backing {
        &self.location
    }

    fn open_existing(&self) -> Result<()> {
        if let Backing::Directory(dir) = &self.location {
            for def in entity::ENTITIES {
                if dir.join(format!("{}.json", def.name)).exists() {
                    self.collection(def)?;
                }
            }
        }
        Ok(())
    }

    fn collection(&self, def: &'static EntityDef) -> Result<Arc<RecordCollection>> {
        if let Some(c) = self.collections.read().get(def.name) {
            return Ok(Arc::clone(c));
        }
        let mut collections = self.collections.write();
        if let Some(c) = collections.get(def.name) {
            return Ok(Arc::clone(c));
        }
        let handle: RecordCollection = match &self.location {
            Backing::Memory => Collection::in_memory(),
            Backing::Directory(dir) => Collection::builder()
                .path(dir.join(format!("{}.json", def.name)))
                .policy(self.policy.clone())
                .pretty(self.pretty)
                .build()?,
        };
        debug!(entity = def.name, "collection opened");
        let handle = Arc::new(handle);
        collections.insert(def.name, Arc::clone(&handle));
        Ok(handle)
    }

    fn open_entity(&self, entity: &str) -> Result<(&'static EntityDef, Arc<RecordCollection>)> {
        let def = entity::require(entity)?;
        Ok((def, self.collection(def)?))
    }
}

fn natural_order(records: &mut [Record]) {
    records.sort_by(|a, b| {
        a.created_date
            .cmp(&b.created_date)
            .then_with(|| a.id.cmp(&b.id))
    });
}

impl Store for DocumentStore {
    fn list(&self, entity: &str) -> Result<Vec<Record>> {
        let (_, collection) = self.open_entity(entity)?;
        let mut records = collection.values();
        natural_order(&mut records);
        Ok(records)
    }

    fn get(&self, entity: &str, id: &str) -> Result<Option<Record>> {
        let (_, collection) = self.open_entity(entity)?;
        Ok(collection.get(id))
    }

    fn create(&self, entity: &str, fields: Fields) -> Result<Record> {
        let (def, collection) = self.open_entity(entity)?;
        let record = Record::create(def.name, fields);
        def.validate(&record.fields, false)?;
        collection.insert(record.id.clone(), record.clone())?;
        debug!(entity, id = %record.id, "created");
        Ok(record)
    }

    fn update(&self, entity: &str, id: &str, fields: Fields) -> Result<Record> {
        let (def, collection) = self.open_entity(entity)?;
        let updated = collection.update(id, |record| {
            def.validate(&fields, true)?;
            record.apply(fields);
            Ok(())
        })?;
        let record = updated.ok_or_else(|| Error::not_found(entity, id))?;
        debug!(entity, id, "updated");
        Ok(record)
    }

    fn delete(&self, entity: &str, id: &str) -> Result<()> {
        let (_, collection) = self.open_entity(entity)?;
        collection
            .remove(id)?
            .ok_or_else(|| Error::not_found(entity, id))?;
        debug!(entity, id, "deleted");
        Ok(())
    }

    // Drops only the ids absent from `records`, so the collection is never
    // empty in between.
    fn replace(&self, entity: &str, records: Vec<Record>) -> Result<()> {
        let (_, collection) = self.open_entity(entity)?;
        let stale: Vec<String> = collection
            .entries()
            .into_iter()
            .map(|(id, _)| id)
            .filter(|id| !records.iter().any(|r| &r.id == id))
            .collect();
        collection.remove_all(&stale)?;
        collection.extend(records.into_iter().map(|r| (r.id.clone(), r)))
    }

    fn snapshot(&self) -> Result<Dataset> {
        let mut data = Dataset::new();
        let open: Vec<&'static str> = self.collections.read().keys().copied().collect();
        for name in open {
            data.insert(name.to_string(), self.list(name)?);
        }
        Ok(data)
    }

    fn bulk_delete(&self, entity: &str, ids: &[String]) -> Result<usize> {
        let (_, collection) = self.open_entity(entity)?;
        let missing: Vec<&str> = ids
            .iter()
            .filter(|id| !collection.contains(id))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(Error::not_found(entity, &missing.join(", ")));
        }
        let deleted = collection.remove_all(ids)?;
        debug!(entity, deleted, "bulk deleted");
        Ok(deleted)
    }

    fn import(&self, entity: &str, records: Vec<Record>) -> Result<usize> {
        let (_, collection) = self.open_entity(entity)?;
        let count = records.len();
        collection.extend(records.into_iter().map(|r| (r.id.clone(), r)))?;
        Ok(count)
    }

    fn flush(&self) -> Result<()> {
        let collections: Vec<_> = self.collections.read().values().cloned().collect();
        for collection in collections {
            collection.flush()?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for DocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentStore")
            .field("location", &self.location)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
