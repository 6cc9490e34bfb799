//! Data access layer for the content gateway
//!
//! This crate owns the connection to the backing document store and every
//! query that crosses it:
//!
//! - [`connection`]: the lazily-initialized, single-flight connection
//!   manager (`Disconnected → Connecting → Connected`).
//! - [`deadline`]: the executor that races a read against the caller's
//!   remaining-time budget and resolves a timeout into a fallback value.
//! - [`query`]: typed filter and patch builders that compile down to wire
//!   documents.
//! - [`store`]: the [`store::Datastore`] trait, implemented by the
//!   production [`mongo::MongoStore`] backend and the in-process
//!   [`memory::MemoryStore`] backend used by tests and local development.

pub mod config;
pub mod connection;
pub mod deadline;
pub mod error;
pub mod memory;
pub mod mongo;
pub mod query;
pub mod record;
pub mod store;

pub use config::DatastoreConfig;
pub use connection::{Connect, ConnectionManager, MongoConnector, MongoHandle};
pub use deadline::{Deadline, Fallback, run_bounded};
pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use mongo::MongoStore;
pub use query::{Filter, Patch};
pub use store::{Datastore, FindOptions, FirstOptions, Order, UpdateOutcome};
