//! The generic CRUD contract every persistence variant implements.
//!
//! A [`Store`] serves any number of entities by name. The document store and
//! the file store live here; the local-storage variant is
//! [`SyncBus`](crate::sync::SyncBus).

use crate::error::{Error, Result};
use crate::record::{sort_records, Dataset, Fields, Record, SortKey};

pub mod document;
pub mod file;

pub use document::DocumentStore;
pub use file::FileStore;

/// List/get/create/update/delete per entity name.
///
/// `get` reports a missing id as `Ok(None)`; `update` and `delete` report it
/// as [`Error::NotFound`].
pub trait Store: Send + Sync {
    /// Every record of `entity`, in the store's natural order.
    fn list(&self, entity: &str) -> Result<Vec<Record>>;

    /// The record with `id`, if any.
    fn get(&self, entity: &str, id: &str) -> Result<Option<Record>>;

    /// Store a new record built from `fields` and return it.
    fn create(&self, entity: &str, fields: Fields) -> Result<Record>;

    /// Merge `fields` into the record with `id` and return the result.
    fn update(&self, entity: &str, id: &str, fields: Fields) -> Result<Record>;

    /// Remove the record with `id`.
    fn delete(&self, entity: &str, id: &str) -> Result<()>;

    /// Overwrite the whole collection of `entity` with `records`.
    fn replace(&self, entity: &str, records: Vec<Record>) -> Result<()>;

    /// Every entity's records.
    fn snapshot(&self) -> Result<Dataset>;

    /// [`list`](Self::list), optionally sorted.
    fn list_sorted(&self, entity: &str, sort: Option<&SortKey>) -> Result<Vec<Record>> {
        let mut records = self.list(entity)?;
        if let Some(key) = sort {
            sort_records(&mut records, key);
        }
        Ok(records)
    }

    /// Delete every id in `ids`. If any id is missing nothing is deleted and
    /// the error names all the missing ones.
    ///
    /// The default is a list followed by a replace; stores with concurrent
    /// writers override it.
    fn bulk_delete(&self, entity: &str, ids: &[String]) -> Result<usize> {
        let mut records = self.list(entity)?;
        let missing: Vec<&str> = ids
            .iter()
            .filter(|id| !records.iter().any(|r| &r.id == *id))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(Error::not_found(entity, &missing.join(", ")));
        }
        let before = records.len();
        records.retain(|r| !ids.contains(&r.id));
        let deleted = before - records.len();
        self.replace(entity, records)?;
        Ok(deleted)
    }

    /// Upsert records as they are (ids and timestamps kept), e.g. from an
    /// export file or a remote listing. Returns how many were written.
    ///
    /// Same caveat as [`bulk_delete`](Self::bulk_delete) for the default.
    fn import(&self, entity: &str, records: Vec<Record>) -> Result<usize> {
        let mut current = self.list(entity)?;
        let count = records.len();
        for record in records {
            match current.iter_mut().find(|r| r.id == record.id) {
                Some(slot) => *slot = record,
                None => current.push(record),
            }
        }
        self.replace(entity, current)?;
        Ok(count)
    }

    /// Write out anything still buffered. Stores that persist every write
    /// right away have nothing to do.
    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

impl<S: Store + ?Sized> Store for std::sync::Arc<S> {
    fn list(&self, entity: &str) -> Result<Vec<Record>> {
        (**self).list(entity)
    }

    fn get(&self, entity: &str, id: &str) -> Result<Option<Record>> {
        (**self).get(entity, id)
    }

    fn create(&self, entity: &str, fields: Fields) -> Result<Record> {
        (**self).create(entity, fields)
    }

    fn update(&self, entity: &str, id: &str, fields: Fields) -> Result<Record> {
        (**self).update(entity, id, fields)
    }

    fn delete(&self, entity: &str, id: &str) -> Result<()> {
        (**self).delete(entity, id)
    }

    fn replace(&self, entity: &str, records: Vec<Record>) -> Result<()> {
        (**self).replace(entity, records)
    }

    fn snapshot(&self) -> Result<Dataset> {
        (**self).snapshot()
    }

    fn list_sorted(&self, entity: &str, sort: Option<&SortKey>) -> Result<Vec<Record>> {
        (**self).list_sorted(entity, sort)
    }

    fn bulk_delete(&self, entity: &str, ids: &[String]) -> Result<usize> {
        (**self).bulk_delete(entity, ids)
    }

    fn import(&self, entity: &str, records: Vec<Record>) -> Result<usize> {
        (**self).import(entity, records)
    }

    fn flush(&self) -> Result<()> {
        (**self).flush()
    }
}
