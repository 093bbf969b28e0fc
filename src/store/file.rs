//! Whole-dataset JSON file store.
//!
//! The file holds `{ "<entity>": [records…], … }`. Reads load the whole
//! file; writes load it, change one list and rewrite the whole file through a
//! temp file + rename.
//!
//! Writers inside one process take a lock around the load/modify/write
//! cycle, so concurrent requests cannot drop each other's records. Two
//! processes pointed at the same file are not coordinated and the last
//! rewrite wins.

use crate::codec::{Codec, JsonCodec};
use crate::error::{Error, Result};
use crate::persist::{atomic_write, load};
use crate::record::{Dataset, Fields, Record};
use crate::store::Store;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Store backed by one JSON document on disk.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    codec: JsonCodec,
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Open the data file at `path`, creating it as `{}` when absent.
    /// Output is pretty-printed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, JsonCodec::pretty())
    }

    /// Open with an explicit codec.
    pub fn open_with(path: impl AsRef<Path>, codec: JsonCodec) -> Result<Self> {
        let store = Self {
            path: path.as_ref().to_path_buf(),
            codec,
            write_lock: Mutex::new(()),
        };
        if !store.path.exists() {
            store.write(&Dataset::new())?;
        } else {
            // fail early on a file we cannot parse
            store.read()?;
        }
        debug!(path = %store.path.display(), "file store opened");
        Ok(store)
    }

    /// The data file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<Dataset> {
        load(&self.path, &self.codec)
    }

    fn write(&self, data: &Dataset) -> Result<()> {
        let bytes = self.codec.encode(data)?;
        atomic_write(&self.path, &bytes)
    }

    /// One serialised read-modify-write cycle on the list for `entity`.
    fn modify<T, F>(&self, entity: &str, f: F) -> Result<T>
    where
        F: FnOnce(&mut Vec<Record>) -> Result<T>,
    {
        let _guard = self.write_lock.lock();
        let mut data = self.read()?;
        let out = f(data.entry(entity.to_string()).or_default())?;
        self.write(&data)?;
        Ok(out)
    }
}

impl Store for FileStore {
    fn list(&self, entity: &str) -> Result<Vec<Record>> {
        Ok(self.read()?.remove(entity).unwrap_or_default())
    }

    fn get(&self, entity: &str, id: &str) -> Result<Option<Record>> {
        Ok(self.list(entity)?.into_iter().find(|r| r.id == id))
    }

    fn create(&self, entity: &str, fields: Fields) -> Result<Record> {
        let record = Record::create(entity, fields);
        let out = record.clone();
        self.modify(entity, move |list| {
            list.push(record);
            Ok(())
        })?;
        debug!(entity, id = %out.id, "created");
        Ok(out)
    }

    fn update(&self, entity: &str, id: &str, fields: Fields) -> Result<Record> {
        let out = self.modify(entity, |list| {
            let record = list
                .iter_mut()
                .find(|r| r.id == id)
                .ok_or_else(|| Error::not_found(entity, id))?;
            record.apply(fields);
            Ok(record.clone())
        })?;
        debug!(entity, id, "updated");
        Ok(out)
    }

    fn delete(&self, entity: &str, id: &str) -> Result<()> {
        self.modify(entity, |list| {
            let index = list
                .iter()
                .position(|r| r.id == id)
                .ok_or_else(|| Error::not_found(entity, id))?;
            list.remove(index);
            Ok(())
        })?;
        debug!(entity, id, "deleted");
        Ok(())
    }

    fn replace(&self, entity: &str, records: Vec<Record>) -> Result<()> {
        self.modify(entity, move |list| {
            *list = records;
            Ok(())
        })
    }

    fn snapshot(&self) -> Result<Dataset> {
        self.read()
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
}
