//! MongoDB-backed [`Datastore`] implementation
//!
//! Thin glue between the connection manager, the deadline executor, and
//! the driver: every operation acquires the shared handle, compiles its
//! typed filter to the wire document, and (for the list-shaped reads)
//! runs behind the deadline race so a slow query degrades instead of
//! outliving the invocation.

use std::sync::Arc;

use bson::{Bson, Document};
use futures::TryStreamExt;
use mongodb::Collection;
use mongodb::options::FindOptions as DriverFindOptions;
use tracing::debug;

use crate::config::DatastoreConfig;
use crate::connection::{ConnectionManager, MongoConnector};
use crate::deadline::{Deadline, Fallback, run_bounded};
use crate::error::{StoreError, StoreResult};
use crate::query::{Filter, Patch};
use crate::record;
use crate::store::{
    DEFAULT_PAGE_SIZE, Datastore, FindOptions, FirstOptions, Order, UpdateOutcome,
};

/// Production datastore over a shared MongoDB connection.
pub struct MongoStore {
    manager: Arc<ConnectionManager<MongoConnector>>,
}

impl MongoStore {
    pub fn new(config: DatastoreConfig) -> Self {
        Self {
            manager: Arc::new(ConnectionManager::new(MongoConnector::new(config))),
        }
    }

    /// Build a store over an externally owned connection manager, so
    /// several stores in one process share the single live connection.
    pub fn with_manager(manager: Arc<ConnectionManager<MongoConnector>>) -> Self {
        Self { manager }
    }

    /// Close the shared connection; the next operation reconnects.
    pub async fn release(&self) {
        self.manager.release().await;
    }

    async fn collection(&self, name: &str) -> StoreResult<Collection<Document>> {
        let handle = self.manager.acquire().await?;
        Ok(handle.database.collection::<Document>(name))
    }
}

fn projection_doc(fields: &[String]) -> Document {
    let mut projection = Document::new();
    for field in fields {
        projection.insert(field, 1);
    }
    projection
}

fn sort_doc(sort: Option<&(String, Order)>) -> Document {
    let mut wire = Document::new();
    match sort {
        Some((field, order)) => {
            wire.insert(field, if *order == Order::Asc { 1 } else { -1 });
        }
        None => {
            wire.insert(record::FIELD_UPDATED_AT, -1);
        }
    }
    wire
}

impl MongoStore {
    async fn find_with_limit(
        &self,
        collection: &str,
        filter: Filter,
        options: FindOptions,
        default_limit: i64,
    ) -> StoreResult<Vec<Document>> {
        let coll = self.collection(collection).await?;
        let wire = filter.to_document();
        debug!(collection, filter = ?wire, "find");

        let mut driver_options = DriverFindOptions::default();
        driver_options.projection = options.projection.as_deref().map(projection_doc);
        driver_options.sort = Some(sort_doc(options.sort.as_ref()));
        driver_options.limit = Some(options.limit.unwrap_or(default_limit));

        let bound = options.deadline.map(|deadline| Fallback {
            deadline,
            value: Vec::new(),
        });
        let op = async move {
            let cursor = coll
                .find(wire)
                .with_options(driver_options)
                .await
                .map_err(StoreError::Query)?;
            cursor
                .try_collect::<Vec<Document>>()
                .await
                .map_err(StoreError::Query)
        };
        run_bounded(op, bound).await
    }
}

#[async_trait::async_trait]
impl Datastore for MongoStore {
    async fn first(
        &self,
        collection: &str,
        filter: Filter,
        options: FirstOptions,
    ) -> StoreResult<Option<Document>> {
        let records = self
            .find_with_limit(
                collection,
                filter,
                FindOptions {
                    projection: options.projection,
                    sort: None,
                    limit: Some(1),
                    deadline: None,
                },
                1,
            )
            .await?;
        Ok(records.into_iter().next())
    }

    async fn find(
        &self,
        collection: &str,
        filter: Filter,
        options: FindOptions,
    ) -> StoreResult<Vec<Document>> {
        self.find_with_limit(collection, filter, options, DEFAULT_PAGE_SIZE)
            .await
    }

    async fn find_all(
        &self,
        collection: &str,
        filter: Filter,
        options: FindOptions,
    ) -> StoreResult<Vec<Document>> {
        // Driver limit 0 means unbounded.
        self.find_with_limit(collection, filter, options, 0).await
    }

    async fn insert(&self, collection: &str, record: Document) -> StoreResult<Document> {
        let coll = self.collection(collection).await?;
        let stamped = record::stamp_insert(record);
        debug!(collection, id = ?stamped.get(record::FIELD_ID), "insert");

        coll.insert_one(stamped.clone())
            .await
            .map_err(StoreError::Query)?;
        Ok(stamped)
    }

    async fn insert_many(
        &self,
        collection: &str,
        records: Vec<Document>,
    ) -> StoreResult<Vec<Document>> {
        let coll = self.collection(collection).await?;
        let stamped: Vec<Document> = records.into_iter().map(record::stamp_insert).collect();
        debug!(collection, count = stamped.len(), "insert_many");

        if stamped.is_empty() {
            return Ok(stamped);
        }
        coll.insert_many(stamped.clone())
            .await
            .map_err(StoreError::Query)?;
        Ok(stamped)
    }

    async fn update(
        &self,
        collection: &str,
        patch: Patch,
        filter: Filter,
    ) -> StoreResult<UpdateOutcome> {
        let coll = self.collection(collection).await?;
        let wire = filter.to_document();
        let update = record::stamp_update(patch.to_document());
        debug!(collection, filter = ?wire, update = ?update, "update");

        let result = coll
            .update_many(wire, update)
            .await
            .map_err(StoreError::Query)?;
        Ok(UpdateOutcome {
            matched: result.matched_count,
            modified: result.modified_count,
        })
    }

    async fn delete(&self, collection: &str, filter: Filter) -> StoreResult<u64> {
        let coll = self.collection(collection).await?;
        let wire = filter.to_document();
        debug!(collection, filter = ?wire, "delete");

        let result = coll.delete_one(wire).await.map_err(StoreError::Query)?;
        Ok(result.deleted_count)
    }

    async fn delete_many(&self, collection: &str, filter: Filter) -> StoreResult<u64> {
        let coll = self.collection(collection).await?;
        let wire = filter.to_document();
        debug!(collection, filter = ?wire, "delete_many");

        let result = coll.delete_many(wire).await.map_err(StoreError::Query)?;
        Ok(result.deleted_count)
    }

    async fn count(&self, collection: &str, filter: Filter) -> StoreResult<u64> {
        let coll = self.collection(collection).await?;
        let wire = filter.to_document();
        debug!(collection, filter = ?wire, "count");

        coll.count_documents(wire).await.map_err(StoreError::Query)
    }

    async fn aggregate(
        &self,
        collection: &str,
        pipeline: Vec<Document>,
        deadline: Option<Deadline>,
    ) -> StoreResult<Vec<Document>> {
        let coll = self.collection(collection).await?;
        debug!(collection, stages = pipeline.len(), "aggregate");

        let bound = deadline.map(|deadline| Fallback {
            deadline,
            value: Vec::new(),
        });
        let op = async move {
            let cursor = coll.aggregate(pipeline).await.map_err(StoreError::Query)?;
            cursor
                .try_collect::<Vec<Document>>()
                .await
                .map_err(StoreError::Query)
        };
        run_bounded(op, bound).await
    }

    async fn distinct(
        &self,
        collection: &str,
        field: &str,
        filter: Filter,
    ) -> StoreResult<Vec<Bson>> {
        let coll = self.collection(collection).await?;
        let wire = filter.to_document();
        debug!(collection, field, filter = ?wire, "distinct");

        coll.distinct(field, wire).await.map_err(StoreError::Query)
    }
}
