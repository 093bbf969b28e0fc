//! Inventory and compliance records for gaming equipment: companies,
//! locations, providers, cabinets, slot machines, game mixes, invoices,
//! metrology certificates, jackpots and users.
//!
//! Every entity goes through one [`Store`] contract with three
//! interchangeable implementations: a schema-checked
//! [`DocumentStore`](store::DocumentStore), a single-file
//! [`FileStore`](store::FileStore), and the tab-local
//! [`SyncBus`](sync::SyncBus) over [`LocalStorage`](sync::LocalStorage).
//! [`server`] puts any of them behind a REST API and [`client`] reads and
//! writes through that API, falling back to a local store when it cannot be
//! reached.
//!
//! ```rust,no_run
//! use cashpot::client::Client;
//! use cashpot::models::Company;
//! use cashpot::sync::{LocalStorage, SyncBus};
//!
//! # async fn demo() -> cashpot::Result<()> {
//! let client = Client::offline(SyncBus::new(LocalStorage::in_memory()));
//! let acme = Company { name: Some("Acme".into()), ..Default::default() };
//! let created = client.companies().create(&acme).await?;
//! assert!(created.is_degraded());
//! # Ok(())
//! # }
//! ```
//!
//! The file store serialises writers inside one process only. Two processes
//! sharing a data file will overwrite each other's changes.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod client;
pub mod codec;
pub mod collection;
pub mod config;
pub mod entity;
pub mod error;
pub mod export;
pub mod flush;
pub mod lookup;
pub mod models;
pub mod persist;
pub mod record;
pub mod server;
pub mod store;
pub mod sync;

pub use config::Config;
pub use entity::{Entity, Stored};
pub use error::{Error, Result};
pub use flush::FlushPolicy;
pub use record::{Dataset, Fields, Record, SortKey};
pub use store::Store;

/// Default map backend for collections: ShardMap keyed by id.
pub type DefaultBackend<V> = shardmap::ShardMap<String, V>;
