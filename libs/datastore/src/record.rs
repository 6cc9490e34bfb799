//! System fields stamped onto every stored record
//!
//! Both backends route inserts and updates through these helpers so that
//! identifier synthesis and timestamp stamping behave identically.

use bson::{Bson, DateTime, Document};

use common::token;

pub const FIELD_ID: &str = "_id";
pub const FIELD_CREATED_AT: &str = "_created_at";
pub const FIELD_UPDATED_AT: &str = "_updated_at";
pub const FIELD_DELETED: &str = "isDeleted";

/// Prepare a record for insertion: stamp both timestamps and synthesize a
/// random `_id` when the caller did not supply one.
///
/// Caller-supplied fields win over the generated stamps, which the
/// bootstrap path relies on to seed records with fixed timestamps.
pub fn stamp_insert(record: Document) -> Document {
    let now = DateTime::now();
    let mut stamped = Document::new();
    stamped.insert(FIELD_CREATED_AT, now);
    stamped.insert(FIELD_UPDATED_AT, now);
    for (key, value) in record {
        stamped.insert(key, value);
    }
    if !stamped.contains_key(FIELD_ID) {
        stamped.insert(FIELD_ID, token::record_id());
    }
    stamped
}

/// Force `_updated_at` into the `$set` clause of an update document, even
/// when the caller's patch never mentions it.
pub fn stamp_update(mut update: Document) -> Document {
    match update.get_mut("$set") {
        Some(Bson::Document(set)) => {
            set.insert(FIELD_UPDATED_AT, DateTime::now());
        }
        _ => {
            let mut set = Document::new();
            set.insert(FIELD_UPDATED_AT, DateTime::now());
            update.insert("$set", set);
        }
    }
    update
}
