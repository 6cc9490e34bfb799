//! The query/mutation surface over the backing document store

use async_trait::async_trait;
use bson::{Bson, Document};

use crate::deadline::Deadline;
use crate::error::StoreResult;
use crate::query::{Filter, Patch};

/// Default page size applied by [`Datastore::find`] when the caller does
/// not override the limit.
pub const DEFAULT_PAGE_SIZE: i64 = 100;

/// Sort direction for an ordered read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

/// Options for [`Datastore::first`].
#[derive(Debug, Clone, Default)]
pub struct FirstOptions {
    /// Restrict the returned record to these fields (`_id` is always kept).
    pub projection: Option<Vec<String>>,
}

/// Options for [`Datastore::find`] / [`Datastore::find_all`].
///
/// The default sort is most-recently-updated first. When a deadline is
/// supplied, a read that exceeds it resolves to an **empty sequence**
/// rather than an error; callers opting in accept that a degraded result
/// is indistinguishable from a genuinely empty one.
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    pub projection: Option<Vec<String>>,
    pub sort: Option<(String, Order)>,
    pub limit: Option<i64>,
    pub deadline: Option<Deadline>,
}

/// Outcome of an update: how many records matched the filter and how many
/// were actually modified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub matched: u64,
    pub modified: u64,
}

/// The data-access contract every protected handler consumes.
///
/// Implemented by the production MongoDB backend and by the in-memory
/// backend used in tests and local development.
#[async_trait]
pub trait Datastore: Send + Sync {
    /// Return the single highest-priority match (most-recently-updated
    /// first) or `None`. Absence is not an error.
    async fn first(
        &self,
        collection: &str,
        filter: Filter,
        options: FirstOptions,
    ) -> StoreResult<Option<Document>>;

    /// Return an ordered page of matches, capped at
    /// [`DEFAULT_PAGE_SIZE`] unless the caller overrides the limit.
    async fn find(
        &self,
        collection: &str,
        filter: Filter,
        options: FindOptions,
    ) -> StoreResult<Vec<Document>>;

    /// Like [`Datastore::find`] but with no implicit cap.
    async fn find_all(
        &self,
        collection: &str,
        filter: Filter,
        options: FindOptions,
    ) -> StoreResult<Vec<Document>>;

    /// Insert one record, stamping `_id`/`_created_at`/`_updated_at`, and
    /// return the full stored record. Callers depend on the generated
    /// identifier and timestamps being present in the return value.
    async fn insert(&self, collection: &str, record: Document) -> StoreResult<Document>;

    /// Insert a batch, stamping each record, and return the stored records.
    async fn insert_many(
        &self,
        collection: &str,
        records: Vec<Document>,
    ) -> StoreResult<Vec<Document>>;

    /// Apply `patch` to **every** record matching `filter`, re-stamping
    /// `_updated_at` whether or not the patch mentions it.
    ///
    /// Single-record intent requires a filter precise enough to scope to
    /// one logical entity (typically an `_id` equality); this method will
    /// not stop at the first match.
    async fn update(
        &self,
        collection: &str,
        patch: Patch,
        filter: Filter,
    ) -> StoreResult<UpdateOutcome>;

    /// Physically remove the first matching record. Reserved for the
    /// session and bootstrap paths; tenant-facing deletes are soft deletes
    /// through [`Datastore::update`].
    async fn delete(&self, collection: &str, filter: Filter) -> StoreResult<u64>;

    /// Physically remove every matching record. Same restrictions as
    /// [`Datastore::delete`].
    async fn delete_many(&self, collection: &str, filter: Filter) -> StoreResult<u64>;

    /// Number of records matching the filter.
    async fn count(&self, collection: &str, filter: Filter) -> StoreResult<u64>;

    /// Run a multi-stage aggregation pipeline. Deadline-bounded like
    /// [`Datastore::find`], with the empty sequence as the fallback.
    async fn aggregate(
        &self,
        collection: &str,
        pipeline: Vec<Document>,
        deadline: Option<Deadline>,
    ) -> StoreResult<Vec<Document>>;

    /// Distinct values of `field` among records matching the filter.
    async fn distinct(
        &self,
        collection: &str,
        field: &str,
        filter: Filter,
    ) -> StoreResult<Vec<Bson>>;
}
