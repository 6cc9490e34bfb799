//! In-memory [`Datastore`] backend
//!
//! Holds collections in a mutex-guarded map and interprets the same
//! wire-level filters the MongoDB backend sends over the network, so tests
//! and local development run against the identical operation surface
//! without infrastructure. Aggregation supports the subset of stages the
//! system actually uses (`$match`, `$group` with `$sum`, `$sort`,
//! `$limit`).

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Mutex;

use bson::{Bson, Document};
use regex::Regex;

use crate::deadline::{Deadline, Fallback, run_bounded};
use crate::error::{StoreError, StoreResult};
use crate::query::{Filter, Patch};
use crate::record;
use crate::store::{
    DEFAULT_PAGE_SIZE, Datastore, FindOptions, FirstOptions, Order, UpdateOutcome,
};

/// In-process datastore used by tests and local development.
#[derive(Default)]
pub struct MemoryStore {
    collections: Mutex<HashMap<String, Vec<Document>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn numeric(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(v) => Some(*v as f64),
        Bson::Int64(v) => Some(*v as f64),
        Bson::Double(v) => Some(*v),
        _ => None,
    }
}

fn bson_cmp(a: &Bson, b: &Bson) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (numeric(a), numeric(b)) {
        return x.partial_cmp(&y);
    }
    match (a, b) {
        (Bson::String(x), Bson::String(y)) => Some(x.cmp(y)),
        (Bson::DateTime(x), Bson::DateTime(y)) => Some(x.cmp(y)),
        (Bson::Boolean(x), Bson::Boolean(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn bson_eq(a: &Bson, b: &Bson) -> bool {
    match bson_cmp(a, b) {
        Some(ordering) => ordering == Ordering::Equal,
        None => a == b,
    }
}

fn operator_matches(value: Option<&Bson>, op: &str, operand: &Bson) -> bool {
    match op {
        // $ne matches records lacking the field, like the wire protocol.
        "$ne" => !value.is_some_and(|v| bson_eq(v, operand)),
        "$gte" => value
            .and_then(|v| bson_cmp(v, operand))
            .is_some_and(|o| o != Ordering::Less),
        "$lte" => value
            .and_then(|v| bson_cmp(v, operand))
            .is_some_and(|o| o != Ordering::Greater),
        "$gt" => value
            .and_then(|v| bson_cmp(v, operand))
            .is_some_and(|o| o == Ordering::Greater),
        "$lt" => value
            .and_then(|v| bson_cmp(v, operand))
            .is_some_and(|o| o == Ordering::Less),
        "$in" => match operand {
            Bson::Array(set) => value.is_some_and(|v| set.iter().any(|c| bson_eq(v, c))),
            _ => false,
        },
        "$regex" => match (value, operand) {
            (Some(Bson::String(haystack)), Bson::String(pattern)) => Regex::new(pattern)
                .map(|re| re.is_match(haystack))
                .unwrap_or(false),
            _ => false,
        },
        "$exists" => match operand {
            Bson::Boolean(expected) => value.is_some() == *expected,
            _ => false,
        },
        _ => false,
    }
}

fn field_matches(value: Option<&Bson>, condition: &Bson) -> bool {
    match condition {
        Bson::Document(ops) if !ops.is_empty() && ops.keys().all(|k| k.starts_with('$')) => ops
            .iter()
            .all(|(op, operand)| operator_matches(value, op, operand)),
        other => value.is_some_and(|v| bson_eq(v, other)),
    }
}

/// Evaluate a wire-level filter document against a record.
fn matches(filter: &Document, row: &Document) -> bool {
    filter.iter().all(|(key, condition)| match key.as_str() {
        "$or" => match condition {
            Bson::Array(branches) => branches.iter().any(|branch| match branch {
                Bson::Document(sub) => matches(sub, row),
                _ => false,
            }),
            _ => false,
        },
        "$and" => match condition {
            Bson::Array(branches) => branches.iter().all(|branch| match branch {
                Bson::Document(sub) => matches(sub, row),
                _ => false,
            }),
            _ => false,
        },
        field => field_matches(row.get(field), condition),
    })
}

fn sort_rows(rows: &mut [Document], sort: Option<&(String, Order)>) {
    let (field, order) = match sort {
        Some((field, order)) => (field.as_str(), *order),
        None => (record::FIELD_UPDATED_AT, Order::Desc),
    };
    rows.sort_by(|a, b| {
        let ordering = match (a.get(field), b.get(field)) {
            (Some(x), Some(y)) => bson_cmp(x, y).unwrap_or(Ordering::Equal),
            (Some(_), None) => Ordering::Greater,
            (None, Some(_)) => Ordering::Less,
            (None, None) => Ordering::Equal,
        };
        match order {
            Order::Asc => ordering,
            Order::Desc => ordering.reverse(),
        }
    });
}

/// Apply a `$set` clause to a record, reporting whether any field actually
/// changed. The production backend counts a record as modified only when
/// the write changed it, so the in-memory backend does the same.
fn apply_set(row: &mut Document, set: &Document) -> bool {
    let changed = set.iter().any(|(field, value)| row.get(field) != Some(value));
    if changed {
        for (field, value) in set.iter() {
            row.insert(field, value.clone());
        }
    }
    changed
}

fn project(row: Document, fields: &[String]) -> Document {
    let mut projected = Document::new();
    if let Some(id) = row.get(record::FIELD_ID) {
        projected.insert(record::FIELD_ID, id.clone());
    }
    for field in fields {
        if let Some(value) = row.get(field) {
            projected.insert(field, value.clone());
        }
    }
    projected
}

impl MemoryStore {
    fn select(
        &self,
        collection: &str,
        wire: &Document,
        sort: Option<&(String, Order)>,
        limit: i64,
        projection: Option<&[String]>,
    ) -> Vec<Document> {
        let collections = self.collections.lock().expect("memory store lock poisoned");
        let mut rows: Vec<Document> = collections
            .get(collection)
            .map(|rows| rows.iter().filter(|row| matches(wire, row)).cloned().collect())
            .unwrap_or_default();
        drop(collections);

        sort_rows(&mut rows, sort);
        if limit > 0 {
            rows.truncate(limit as usize);
        }
        match projection {
            Some(fields) => rows.into_iter().map(|row| project(row, fields)).collect(),
            None => rows,
        }
    }
}

fn resolve(expr: &Bson, row: &Document) -> Bson {
    match expr {
        Bson::String(path) if path.starts_with('$') => {
            row.get(&path[1..]).cloned().unwrap_or(Bson::Null)
        }
        literal => literal.clone(),
    }
}

fn run_group(rows: Vec<Document>, spec: &Document) -> StoreResult<Vec<Document>> {
    let id_expr = spec
        .get("_id")
        .ok_or_else(|| StoreError::Unsupported("$group without _id".to_string()))?;

    let mut buckets: Vec<(Bson, Document)> = Vec::new();
    for row in &rows {
        let key = resolve(id_expr, row);
        let index = match buckets.iter().position(|(k, _)| bson_eq(k, &key)) {
            Some(index) => index,
            None => {
                buckets.push((key, Document::new()));
                buckets.len() - 1
            }
        };
        let bucket = &mut buckets[index].1;
        for (field, accumulator) in spec.iter().filter(|(field, _)| *field != "_id") {
            let sum_operand = accumulator
                .as_document()
                .and_then(|acc| acc.get("$sum"))
                .ok_or_else(|| {
                    StoreError::Unsupported(format!("accumulator for field {field}"))
                })?;
            let increment = numeric(&resolve(sum_operand, row)).unwrap_or(0.0);
            let total = bucket.get(field).and_then(numeric).unwrap_or(0.0) + increment;
            bucket.insert(field, total);
        }
    }

    Ok(buckets
        .into_iter()
        .map(|(key, mut acc)| {
            // Integral sums come back as integers, like the wire protocol.
            let fields: Vec<(String, f64)> = acc
                .iter()
                .filter_map(|(f, v)| numeric(v).map(|n| (f.clone(), n)))
                .collect();
            for (field, value) in fields {
                if value.fract() == 0.0 {
                    acc.insert(field, Bson::Int64(value as i64));
                }
            }
            let mut out = Document::new();
            out.insert("_id", key);
            for (field, value) in acc {
                out.insert(field, value);
            }
            out
        })
        .collect())
}

fn run_pipeline(mut rows: Vec<Document>, pipeline: &[Document]) -> StoreResult<Vec<Document>> {
    for stage in pipeline {
        let (name, spec) = stage
            .iter()
            .next()
            .ok_or_else(|| StoreError::Unsupported("empty aggregation stage".to_string()))?;
        match name.as_str() {
            "$match" => {
                let condition = spec.as_document().ok_or_else(|| {
                    StoreError::Unsupported("$match expects a document".to_string())
                })?;
                rows.retain(|row| matches(condition, row));
            }
            "$group" => {
                let spec = spec.as_document().ok_or_else(|| {
                    StoreError::Unsupported("$group expects a document".to_string())
                })?;
                rows = run_group(rows, spec)?;
            }
            "$sort" => {
                let spec = spec.as_document().ok_or_else(|| {
                    StoreError::Unsupported("$sort expects a document".to_string())
                })?;
                if let Some((field, direction)) = spec.iter().next() {
                    let order = if numeric(direction).unwrap_or(1.0) < 0.0 {
                        Order::Desc
                    } else {
                        Order::Asc
                    };
                    sort_rows(&mut rows, Some(&(field.clone(), order)));
                }
            }
            "$limit" => {
                let cap = numeric(spec).unwrap_or(0.0) as usize;
                rows.truncate(cap);
            }
            other => {
                return Err(StoreError::Unsupported(format!(
                    "aggregation stage {other}"
                )));
            }
        }
    }
    Ok(rows)
}

#[async_trait::async_trait]
impl Datastore for MemoryStore {
    async fn first(
        &self,
        collection: &str,
        filter: Filter,
        options: FirstOptions,
    ) -> StoreResult<Option<Document>> {
        let wire = filter.to_document();
        let rows = self.select(collection, &wire, None, 1, options.projection.as_deref());
        Ok(rows.into_iter().next())
    }

    async fn find(
        &self,
        collection: &str,
        filter: Filter,
        options: FindOptions,
    ) -> StoreResult<Vec<Document>> {
        let wire = filter.to_document();
        let bound = options.deadline.map(|deadline| Fallback {
            deadline,
            value: Vec::new(),
        });
        let op = async {
            Ok(self.select(
                collection,
                &wire,
                options.sort.as_ref(),
                options.limit.unwrap_or(DEFAULT_PAGE_SIZE),
                options.projection.as_deref(),
            ))
        };
        run_bounded(op, bound).await
    }

    async fn find_all(
        &self,
        collection: &str,
        filter: Filter,
        options: FindOptions,
    ) -> StoreResult<Vec<Document>> {
        let wire = filter.to_document();
        let bound = options.deadline.map(|deadline| Fallback {
            deadline,
            value: Vec::new(),
        });
        let op = async {
            Ok(self.select(
                collection,
                &wire,
                options.sort.as_ref(),
                options.limit.unwrap_or(0),
                options.projection.as_deref(),
            ))
        };
        run_bounded(op, bound).await
    }

    async fn insert(&self, collection: &str, record: Document) -> StoreResult<Document> {
        let stamped = record::stamp_insert(record);
        let mut collections = self.collections.lock().expect("memory store lock poisoned");
        let rows = collections.entry(collection.to_string()).or_default();

        if let Ok(id) = stamped.get_str(record::FIELD_ID) {
            if rows
                .iter()
                .any(|row| row.get_str(record::FIELD_ID) == Ok(id))
            {
                return Err(StoreError::Duplicate {
                    collection: collection.to_string(),
                    id: id.to_string(),
                });
            }
        }
        rows.push(stamped.clone());
        Ok(stamped)
    }

    async fn insert_many(
        &self,
        collection: &str,
        records: Vec<Document>,
    ) -> StoreResult<Vec<Document>> {
        let mut stored = Vec::with_capacity(records.len());
        for record in records {
            stored.push(self.insert(collection, record).await?);
        }
        Ok(stored)
    }

    async fn update(
        &self,
        collection: &str,
        patch: Patch,
        filter: Filter,
    ) -> StoreResult<UpdateOutcome> {
        let wire = filter.to_document();
        let update = record::stamp_update(patch.to_document());
        let set = update.get_document("$set").ok().cloned().unwrap_or_default();

        let mut collections = self.collections.lock().expect("memory store lock poisoned");
        let rows = collections.entry(collection.to_string()).or_default();

        let mut matched = 0;
        let mut modified = 0;
        for row in rows.iter_mut().filter(|row| matches(&wire, row)) {
            matched += 1;
            if apply_set(row, &set) {
                modified += 1;
            }
        }
        Ok(UpdateOutcome { matched, modified })
    }

    async fn delete(&self, collection: &str, filter: Filter) -> StoreResult<u64> {
        let wire = filter.to_document();
        let mut collections = self.collections.lock().expect("memory store lock poisoned");
        let rows = collections.entry(collection.to_string()).or_default();

        match rows.iter().position(|row| matches(&wire, row)) {
            Some(index) => {
                rows.remove(index);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn delete_many(&self, collection: &str, filter: Filter) -> StoreResult<u64> {
        let wire = filter.to_document();
        let mut collections = self.collections.lock().expect("memory store lock poisoned");
        let rows = collections.entry(collection.to_string()).or_default();

        let before = rows.len();
        rows.retain(|row| !matches(&wire, row));
        Ok((before - rows.len()) as u64)
    }

    async fn count(&self, collection: &str, filter: Filter) -> StoreResult<u64> {
        let wire = filter.to_document();
        let collections = self.collections.lock().expect("memory store lock poisoned");
        Ok(collections
            .get(collection)
            .map(|rows| rows.iter().filter(|row| matches(&wire, row)).count() as u64)
            .unwrap_or(0))
    }

    async fn aggregate(
        &self,
        collection: &str,
        pipeline: Vec<Document>,
        deadline: Option<Deadline>,
    ) -> StoreResult<Vec<Document>> {
        let bound = deadline.map(|deadline| Fallback {
            deadline,
            value: Vec::new(),
        });
        let op = async {
            let rows = {
                let collections =
                    self.collections.lock().expect("memory store lock poisoned");
                collections.get(collection).cloned().unwrap_or_default()
            };
            run_pipeline(rows, &pipeline)
        };
        run_bounded(op, bound).await
    }

    async fn distinct(
        &self,
        collection: &str,
        field: &str,
        filter: Filter,
    ) -> StoreResult<Vec<Bson>> {
        let wire = filter.to_document();
        let collections = self.collections.lock().expect("memory store lock poisoned");
        let mut values: Vec<Bson> = Vec::new();
        if let Some(rows) = collections.get(collection) {
            for row in rows.iter().filter(|row| matches(&wire, row)) {
                if let Some(value) = row.get(field) {
                    if !values.iter().any(|seen| bson_eq(seen, value)) {
                        values.push(value.clone());
                    }
                }
            }
        }
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn ne_matches_records_lacking_the_field() {
        let filter = doc! { "restricted": { "$ne": true } };
        assert!(matches(&filter, &doc! { "token": "t" }));
        assert!(matches(&filter, &doc! { "restricted": false }));
        assert!(!matches(&filter, &doc! { "restricted": true }));
    }

    #[test]
    fn range_operators_require_the_field() {
        let filter = doc! { "n": { "$gte": 5 } };
        assert!(matches(&filter, &doc! { "n": 5 }));
        assert!(matches(&filter, &doc! { "n": 9_i64 }));
        assert!(!matches(&filter, &doc! { "n": 4 }));
        assert!(!matches(&filter, &doc! {}));
    }

    #[test]
    fn in_or_and_regex_evaluate() {
        assert!(matches(
            &doc! { "_id": { "$in": ["a", "b"] } },
            &doc! { "_id": "b" }
        ));
        assert!(matches(
            &doc! { "$or": [ { "s": "x" }, { "s": "y" } ] },
            &doc! { "s": "y" }
        ));
        assert!(matches(
            &doc! { "username": { "$regex": "^adm" } },
            &doc! { "username": "admin" }
        ));
        assert!(!matches(
            &doc! { "username": { "$regex": "^adm" } },
            &doc! { "username": "root" }
        ));
    }

    #[test]
    fn numeric_equality_crosses_integer_widths() {
        assert!(matches(&doc! { "n": 3_i64 }, &doc! { "n": 3_i32 }));
    }

    #[test]
    fn set_of_identical_values_does_not_count_as_modified() {
        let mut row = doc! { "_id": "r1", "name": "n" };

        assert!(!apply_set(&mut row, &doc! { "name": "n" }));
        assert_eq!(row, doc! { "_id": "r1", "name": "n" });

        assert!(apply_set(&mut row, &doc! { "name": "m" }));
        assert_eq!(row.get_str("name").expect("missing name"), "m");

        // A field the record lacks counts as a change.
        assert!(apply_set(&mut row, &doc! { "archived": true }));
        assert!(row.get_bool("archived").expect("missing archived"));
    }
}
