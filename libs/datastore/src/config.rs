//! Datastore configuration
//!
//! Configuration is read from environment variables with local-development
//! defaults, the same way the rest of the platform configures itself.

use std::env;

use crate::error::StoreResult;

/// Connection settings for the backing document store.
#[derive(Debug, Clone)]
pub struct DatastoreConfig {
    /// Connection URL of the backing store
    pub url: String,
    /// Logical database name
    pub database: String,
}

impl DatastoreConfig {
    /// Create a new DatastoreConfig from the `DB_URL` and `DB_NAME`
    /// environment variables.
    pub fn from_env() -> StoreResult<Self> {
        let url =
            env::var("DB_URL").unwrap_or_else(|_| "mongodb://localhost:27017".to_string());
        let database = env::var("DB_NAME").unwrap_or_else(|_| "content".to_string());

        Ok(Self { url, database })
    }
}
