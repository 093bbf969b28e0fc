//! Typed entity client with a remote tier and a local fallback tier.
//!
//! A [`Client`] is built once per session from a [`Remote`] and a local
//! [`Store`] and hands out one [`Repository`] per entity. Every repository
//! call goes to the remote first. When the remote is
//! [unavailable](RemoteError::Unavailable) the same operation runs against
//! the local store and the result is tagged [`Source::Local`]; a remote that
//! answers with a rejection is authoritative and its error is returned as is.
//!
//! Successful remote results are written through to the local store so a
//! later fallback sees the latest data the session knew about.

use crate::entity::{to_fields, Entity, Stored};
use crate::error::{Error, Result};
use crate::models::{
    Cabinet, Company, GameMix, Invoice, Jackpot, Location, Metrology, MetrologyApproval,
    MetrologyAuthority, MetrologyCommission, MetrologySoftware, Platform, Provider, SlotMachine,
    User,
};
use crate::record::{sort_records, Fields, Record, SortKey};
use crate::store::Store;
use futures_util::future::join_all;
use serde::Serialize;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, warn};

pub mod remote;

pub use remote::{ApiLayout, AuthSession, HttpRemote, InProcess, Offline};

/// Which tier produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    /// The remote answered.
    Remote,
    /// The remote was unavailable and the local store answered.
    Local,
}

/// A value tagged with the tier it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Sourced<T> {
    /// The result itself.
    pub value: T,
    /// Where it came from.
    pub source: Source,
}

impl<T> Sourced<T> {
    fn remote(value: T) -> Self {
        Self {
            value,
            source: Source::Remote,
        }
    }

    fn local(value: T) -> Self {
        Self {
            value,
            source: Source::Local,
        }
    }

    /// `true` when the local store answered.
    pub fn is_degraded(&self) -> bool {
        self.source == Source::Local
    }

    /// Transform the value, keeping the source.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Sourced<U> {
        Sourced {
            value: f(self.value),
            source: self.source,
        }
    }

    /// Drop the source tag.
    pub fn into_inner(self) -> T {
        self.value
    }
}

/// How a remote call failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    /// Transport failure, server error or an unreadable response. The
    /// operation may be retried against the local store.
    #[error("remote unavailable: {0}")]
    Unavailable(String),
    /// The remote understood the request and refused it.
    #[error(transparent)]
    Rejected(Error),
}

/// Result of a remote call.
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// The remote tier: CRUD by entity name.
///
/// `get` reports a missing id as `Ok(None)`; `update` and `delete` reject it
/// with [`Error::NotFound`].
pub trait Remote: Send + Sync {
    /// Every record of `entity`, optionally sorted.
    fn list(
        &self,
        entity: &str,
        sort: Option<&SortKey>,
    ) -> impl Future<Output = RemoteResult<Vec<Record>>> + Send;

    /// One record.
    fn get(&self, entity: &str, id: &str)
        -> impl Future<Output = RemoteResult<Option<Record>>> + Send;

    /// Create a record from `fields`.
    fn create(&self, entity: &str, fields: Fields)
        -> impl Future<Output = RemoteResult<Record>> + Send;

    /// Merge `fields` into the record with `id`.
    fn update(
        &self,
        entity: &str,
        id: &str,
        fields: Fields,
    ) -> impl Future<Output = RemoteResult<Record>> + Send;

    /// Remove the record with `id`.
    fn delete(&self, entity: &str, id: &str) -> impl Future<Output = RemoteResult<()>> + Send;
}

// ---------------------------------------------------------------------------
// Repository
// ---------------------------------------------------------------------------

/// Typed CRUD for entity `T` over a remote and a local tier.
pub struct Repository<T, R, L> {
    remote: Arc<R>,
    local: Arc<L>,
    _entity: PhantomData<fn() -> T>,
}

impl<T, R, L> Clone for Repository<T, R, L> {
    fn clone(&self) -> Self {
        Self {
            remote: Arc::clone(&self.remote),
            local: Arc::clone(&self.local),
            _entity: PhantomData,
        }
    }
}

impl<T, R, L> Repository<T, R, L>
where
    T: Entity,
    R: Remote,
    L: Store,
{
    /// Bind a repository for `T` to the given tiers.
    pub fn new(remote: Arc<R>, local: Arc<L>) -> Self {
        Self {
            remote,
            local,
            _entity: PhantomData,
        }
    }

    /// Entity name this repository serves.
    pub fn name(&self) -> &'static str {
        T::NAME
    }

    /// Every record, sorted when `sort` is given.
    pub async fn list(&self, sort: Option<&SortKey>) -> Result<Sourced<Vec<Stored<T>>>> {
        let fetched = match self.remote.list(T::NAME, sort).await {
            Ok(records) => {
                self.mirror("list", |local| local.import(T::NAME, records.clone()).map(drop));
                Sourced::remote(records)
            }
            Err(RemoteError::Unavailable(reason)) => {
                self.degraded("list", &reason);
                Sourced::local(self.local.list_sorted(T::NAME, sort)?)
            }
            Err(RemoteError::Rejected(e)) => return Err(e),
        };
        let Sourced { value, source } = fetched;
        let typed = value
            .into_iter()
            .map(Stored::from_record)
            .collect::<Result<Vec<_>>>()?;
        Ok(Sourced { value: typed, source })
    }

    /// The record with `id`, or `None`.
    pub async fn get(&self, id: &str) -> Result<Sourced<Option<Stored<T>>>> {
        let fetched = match self.remote.get(T::NAME, id).await {
            Ok(found) => {
                if let Some(record) = &found {
                    self.mirror("get", |local| {
                        local.import(T::NAME, vec![record.clone()]).map(drop)
                    });
                }
                Sourced::remote(found)
            }
            Err(RemoteError::Unavailable(reason)) => {
                self.degraded("get", &reason);
                Sourced::local(self.local.get(T::NAME, id)?)
            }
            Err(RemoteError::Rejected(e)) => return Err(e),
        };
        let Sourced { value, source } = fetched;
        Ok(Sourced {
            value: value.map(Stored::from_record).transpose()?,
            source,
        })
    }

    /// Create a record from `payload`; the id and timestamps are assigned by
    /// whichever tier stores it.
    pub async fn create(&self, payload: &T) -> Result<Sourced<Stored<T>>> {
        let fields = to_fields(payload)?;
        let created = match self.remote.create(T::NAME, fields.clone()).await {
            Ok(record) => {
                self.mirror("create", |local| {
                    local.import(T::NAME, vec![record.clone()]).map(drop)
                });
                Sourced::remote(record)
            }
            Err(RemoteError::Unavailable(reason)) => {
                self.degraded("create", &reason);
                Sourced::local(self.local.create(T::NAME, fields)?)
            }
            Err(RemoteError::Rejected(e)) => return Err(e),
        };
        debug!(entity = T::NAME, id = %created.value.id, source = ?created.source, "created");
        typed(created)
    }

    /// Merge `patch` into the record with `id`. Only the keys `patch`
    /// serialises are changed.
    pub async fn update<P>(&self, id: &str, patch: &P) -> Result<Sourced<Stored<T>>>
    where
        P: Serialize + ?Sized,
    {
        let fields = to_fields(patch)?;
        let updated = match self.remote.update(T::NAME, id, fields.clone()).await {
            Ok(record) => {
                self.mirror("update", |local| {
                    local.import(T::NAME, vec![record.clone()]).map(drop)
                });
                Sourced::remote(record)
            }
            Err(RemoteError::Unavailable(reason)) => {
                self.degraded("update", &reason);
                Sourced::local(self.local.update(T::NAME, id, fields)?)
            }
            Err(RemoteError::Rejected(e)) => return Err(e),
        };
        typed(updated)
    }

    /// Remove the record with `id`.
    pub async fn delete(&self, id: &str) -> Result<Sourced<()>> {
        match self.remote.delete(T::NAME, id).await {
            Ok(()) => {
                self.mirror("delete", |local| match local.delete(T::NAME, id) {
                    Err(Error::NotFound { .. }) => Ok(()),
                    other => other,
                });
                Ok(Sourced::remote(()))
            }
            Err(RemoteError::Unavailable(reason)) => {
                self.degraded("delete", &reason);
                self.local.delete(T::NAME, id)?;
                Ok(Sourced::local(()))
            }
            Err(RemoteError::Rejected(e)) => Err(e),
        }
    }

    /// Delete every id, one request each, all in flight at once. Results come
    /// back in the order of `ids`.
    pub async fn delete_many(&self, ids: &[String]) -> Vec<Result<Sourced<()>>> {
        join_all(ids.iter().map(|id| self.delete(id))).await
    }

    fn degraded(&self, op: &str, reason: &str) {
        warn!(entity = T::NAME, op, reason, "remote unavailable, using local store");
    }

    fn mirror(&self, op: &str, f: impl FnOnce(&L) -> Result<()>) {
        if let Err(e) = f(&self.local) {
            warn!(entity = T::NAME, op, error = %e, "local mirror write failed");
        }
    }
}

fn typed<T: Entity>(sourced: Sourced<Record>) -> Result<Sourced<Stored<T>>> {
    let Sourced { value, source } = sourced;
    Ok(Sourced {
        value: Stored::from_record(value)?,
        source,
    })
}

impl<T, R, L> std::fmt::Debug for Repository<T, R, L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("entity", &std::any::type_name::<T>())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// One session's pair of tiers. Cheap to clone.
pub struct Client<R, L> {
    remote: Arc<R>,
    local: Arc<L>,
}

impl<R, L> Clone for Client<R, L> {
    fn clone(&self) -> Self {
        Self {
            remote: Arc::clone(&self.remote),
            local: Arc::clone(&self.local),
        }
    }
}

impl<L: Store> Client<Offline, L> {
    /// Pure local mode: every call is served by `local`.
    pub fn offline(local: L) -> Self {
        Self::new(Offline, local)
    }
}

impl<R: Remote, L: Store> Client<R, L> {
    /// Wrap the two tiers.
    pub fn new(remote: R, local: L) -> Self {
        Self::from_shared(Arc::new(remote), Arc::new(local))
    }

    /// Wrap tiers that are shared with other owners.
    pub fn from_shared(remote: Arc<R>, local: Arc<L>) -> Self {
        Self { remote, local }
    }

    /// The remote tier.
    pub fn remote(&self) -> &R {
        &self.remote
    }

    /// The local tier.
    pub fn local(&self) -> &L {
        &self.local
    }

    /// Repository for any entity type.
    pub fn entity<T: Entity>(&self) -> Repository<T, R, L> {
        Repository::new(Arc::clone(&self.remote), Arc::clone(&self.local))
    }

    /// `companies`.
    pub fn companies(&self) -> Repository<Company, R, L> {
        self.entity()
    }

    /// `locations`.
    pub fn locations(&self) -> Repository<Location, R, L> {
        self.entity()
    }

    /// `providers`.
    pub fn providers(&self) -> Repository<Provider, R, L> {
        self.entity()
    }

    /// `cabinets`.
    pub fn cabinets(&self) -> Repository<Cabinet, R, L> {
        self.entity()
    }

    /// `gameMixes`.
    pub fn game_mixes(&self) -> Repository<GameMix, R, L> {
        self.entity()
    }

    /// `platforms`.
    pub fn platforms(&self) -> Repository<Platform, R, L> {
        self.entity()
    }

    /// `slotMachines`.
    pub fn slot_machines(&self) -> Repository<SlotMachine, R, L> {
        self.entity()
    }

    /// `invoices`.
    pub fn invoices(&self) -> Repository<Invoice, R, L> {
        self.entity()
    }

    /// `metrology`.
    pub fn metrology(&self) -> Repository<Metrology, R, L> {
        self.entity()
    }

    /// `metrologyApprovals`.
    pub fn metrology_approvals(&self) -> Repository<MetrologyApproval, R, L> {
        self.entity()
    }

    /// `metrologyCommissions`.
    pub fn metrology_commissions(&self) -> Repository<MetrologyCommission, R, L> {
        self.entity()
    }

    /// `metrologyAuthorities`.
    pub fn metrology_authorities(&self) -> Repository<MetrologyAuthority, R, L> {
        self.entity()
    }

    /// `metrologySoftware`.
    pub fn metrology_software(&self) -> Repository<MetrologySoftware, R, L> {
        self.entity()
    }

    /// `jackpots`.
    pub fn jackpots(&self) -> Repository<Jackpot, R, L> {
        self.entity()
    }

    /// `users`.
    pub fn users(&self) -> Repository<User, R, L> {
        self.entity()
    }
}

impl<R, L> std::fmt::Debug for Client<R, L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client").finish_non_exhaustive()
    }
}

/// Sort records the way a remote without server-side sorting would be
/// expected to.
pub(crate) fn sorted(mut records: Vec<Record>, sort: Option<&SortKey>) -> Vec<Record> {
    if let Some(key) = sort {
        sort_records(&mut records, key);
    }
    records
}
