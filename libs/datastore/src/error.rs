//! Custom error types for the datastore
//!
//! This module defines the store-level error taxonomy shared by every
//! backend. Authorization failures live in the auth crate; only
//! connectivity, query, and configuration failures originate here.

use mongodb::error::Error as MongoError;
use thiserror::Error;

/// Custom error type for datastore operations.
///
/// `Clone` is required because a single connect failure fans out through a
/// shared in-flight future to every concurrent waiter.
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    /// Error occurred while establishing or closing the store connection
    #[error("store connection error: {0}")]
    Connection(#[source] MongoError),

    /// Error reported by the backing store during query execution
    #[error("store query error: {0}")]
    Query(#[source] MongoError),

    /// A write collided with an existing record key
    #[error("duplicate key {id} in collection {collection}")]
    Duplicate { collection: String, id: String },

    /// Configuration error
    #[error("store configuration error: {0}")]
    Configuration(String),

    /// Operation not supported by the selected backend
    #[error("unsupported store operation: {0}")]
    Unsupported(String),
}

/// Type alias for Result with StoreError
pub type StoreResult<T> = Result<T, StoreError>;
