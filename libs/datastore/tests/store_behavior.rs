//! Behavioral tests for the datastore operation surface
//!
//! These run against the in-memory backend, which interprets the same
//! wire-level filters the production backend sends to the server.

use std::time::Duration;

use bson::doc;
use datastore::record::{FIELD_CREATED_AT, FIELD_ID, FIELD_UPDATED_AT};
use datastore::{
    Datastore, Deadline, Filter, FindOptions, FirstOptions, MemoryStore, Order, Patch,
};

#[tokio::test]
async fn insert_returns_the_stored_record_with_stamps() {
    let store = MemoryStore::new();

    let stored = store
        .insert("Item", doc! { "name": "brief-01" })
        .await
        .expect("insert failed");

    let id = stored.get_str(FIELD_ID).expect("missing _id");
    assert!(!id.is_empty());
    assert_eq!(
        stored.get_datetime(FIELD_CREATED_AT).expect("missing _created_at"),
        stored.get_datetime(FIELD_UPDATED_AT).expect("missing _updated_at"),
    );

    let other = store
        .insert("Item", doc! { "name": "brief-02" })
        .await
        .expect("insert failed");
    assert_ne!(id, other.get_str(FIELD_ID).expect("missing _id"));
}

#[tokio::test]
async fn update_restamps_updated_at_even_without_a_patch_field() {
    let store = MemoryStore::new();
    let stored = store
        .insert("Item", doc! { "name": "n" })
        .await
        .expect("insert failed");
    let id = stored.get_str(FIELD_ID).expect("missing _id").to_string();
    let before = *stored.get_datetime(FIELD_UPDATED_AT).expect("missing stamp");

    // BSON datetimes have millisecond precision.
    tokio::time::sleep(Duration::from_millis(5)).await;

    let outcome = store
        .update(
            "Item",
            Patch::new().set("name", "renamed"),
            Filter::new().eq("_id", id.as_str()),
        )
        .await
        .expect("update failed");
    assert_eq!(outcome.matched, 1);

    let after = store
        .first("Item", Filter::new().eq("_id", id.as_str()), FirstOptions::default())
        .await
        .expect("first failed")
        .expect("record vanished");
    assert!(
        *after.get_datetime(FIELD_UPDATED_AT).expect("missing stamp") > before,
        "update did not advance _updated_at"
    );
    assert_eq!(after.get_str("name").expect("missing name"), "renamed");
}

#[tokio::test]
async fn update_patches_every_matching_record() {
    let store = MemoryStore::new();
    for n in 0..3 {
        store
            .insert("Item", doc! { "project": "p1", "n": n })
            .await
            .expect("insert failed");
    }
    store
        .insert("Item", doc! { "project": "p2", "n": 99 })
        .await
        .expect("insert failed");

    let outcome = store
        .update(
            "Item",
            Patch::new().set("archived", true),
            Filter::new().eq("project", "p1"),
        )
        .await
        .expect("update failed");

    assert_eq!(outcome.matched, 3);
    let archived = store
        .count("Item", Filter::new().eq("archived", true))
        .await
        .expect("count failed");
    assert_eq!(archived, 3);
}

#[tokio::test]
async fn soft_deleted_records_hide_behind_the_delete_filter_only() {
    let store = MemoryStore::new();
    let stored = store
        .insert("Item", doc! { "name": "n" })
        .await
        .expect("insert failed");
    let id = stored.get_str(FIELD_ID).expect("missing _id").to_string();

    store
        .update(
            "Item",
            Patch::new().soft_delete(),
            Filter::new().eq("_id", id.as_str()),
        )
        .await
        .expect("update failed");

    let hidden = store
        .first(
            "Item",
            Filter::new().eq("_id", id.as_str()).not_deleted(),
            FirstOptions::default(),
        )
        .await
        .expect("first failed");
    assert!(hidden.is_none(), "soft-deleted record leaked through");

    let still_there = store
        .first("Item", Filter::new().eq("_id", id.as_str()), FirstOptions::default())
        .await
        .expect("first failed");
    assert!(still_there.is_some(), "soft delete physically removed the record");
}

#[tokio::test]
async fn find_caps_at_the_default_page_size_and_find_all_does_not() {
    let store = MemoryStore::new();
    for n in 0..101 {
        store
            .insert("Usage", doc! { "n": n })
            .await
            .expect("insert failed");
    }

    let page = store
        .find("Usage", Filter::new(), FindOptions::default())
        .await
        .expect("find failed");
    assert_eq!(page.len(), 100);

    let all = store
        .find_all("Usage", Filter::new(), FindOptions::default())
        .await
        .expect("find_all failed");
    assert_eq!(all.len(), 101);
}

#[tokio::test]
async fn default_order_is_most_recently_updated_first() {
    let store = MemoryStore::new();
    // Fixed stamps survive insertion, so the order is deterministic.
    for (name, millis) in [("old", 1_000_i64), ("new", 3_000), ("mid", 2_000)] {
        store
            .insert(
                "Item",
                doc! { "name": name, FIELD_UPDATED_AT: bson::DateTime::from_millis(millis) },
            )
            .await
            .expect("insert failed");
    }

    let rows = store
        .find("Item", Filter::new(), FindOptions::default())
        .await
        .expect("find failed");
    let names: Vec<&str> = rows.iter().map(|r| r.get_str("name").unwrap()).collect();
    assert_eq!(names, ["new", "mid", "old"]);

    let ascending = store
        .find(
            "Item",
            Filter::new(),
            FindOptions {
                sort: Some((FIELD_UPDATED_AT.to_string(), Order::Asc)),
                ..Default::default()
            },
        )
        .await
        .expect("find failed");
    let names: Vec<&str> = ascending.iter().map(|r| r.get_str("name").unwrap()).collect();
    assert_eq!(names, ["old", "mid", "new"]);
}

#[tokio::test]
async fn projection_keeps_listed_fields_and_the_id() {
    let store = MemoryStore::new();
    store
        .insert("User", doc! { "username": "v", "password": "hash", "name": "V" })
        .await
        .expect("insert failed");

    let projected = store
        .first(
            "User",
            Filter::new().eq("username", "v"),
            FirstOptions {
                projection: Some(vec!["username".to_string()]),
            },
        )
        .await
        .expect("first failed")
        .expect("record missing");

    assert!(projected.get_str(FIELD_ID).is_ok());
    assert_eq!(projected.get_str("username").expect("username dropped"), "v");
    assert!(projected.get("password").is_none(), "projection leaked a field");
}

#[tokio::test]
async fn first_returns_none_for_absence_not_an_error() {
    let store = MemoryStore::new();
    let missing = store
        .first("Item", Filter::new().eq("_id", "nope"), FirstOptions::default())
        .await
        .expect("absence must not be an error");
    assert!(missing.is_none());
}

#[tokio::test]
async fn delete_many_physically_removes_and_count_reflects_it() {
    let store = MemoryStore::new();
    for n in 0..4 {
        store
            .insert("Session", doc! { "user": "u1", "n": n })
            .await
            .expect("insert failed");
    }

    let removed = store
        .delete_many("Session", Filter::new().eq("user", "u1"))
        .await
        .expect("delete_many failed");
    assert_eq!(removed, 4);
    assert_eq!(
        store.count("Session", Filter::new()).await.expect("count failed"),
        0
    );
}

#[tokio::test]
async fn distinct_collects_unique_values_under_the_filter() {
    let store = MemoryStore::new();
    for (project, kind) in [("p1", "image"), ("p1", "video"), ("p1", "image"), ("p2", "brief")] {
        store
            .insert("Item", doc! { "project": project, "type": kind })
            .await
            .expect("insert failed");
    }

    let mut kinds = store
        .distinct("Item", "type", Filter::new().eq("project", "p1"))
        .await
        .expect("distinct failed");
    kinds.sort_by_key(|b| b.as_str().unwrap_or_default().to_string());
    assert_eq!(kinds, vec![bson::Bson::from("image"), bson::Bson::from("video")]);
}

#[tokio::test]
async fn aggregate_match_and_group_count_per_key() {
    let store = MemoryStore::new();
    for (user, kind) in [("u1", "image"), ("u1", "image"), ("u2", "image"), ("u2", "video")] {
        store
            .insert("Usage", doc! { "_p_user": user, "type": kind })
            .await
            .expect("insert failed");
    }

    let mut groups = store
        .aggregate(
            "Usage",
            vec![
                doc! { "$match": { "type": "image" } },
                doc! { "$group": { "_id": "$_p_user", "count": { "$sum": 1 } } },
            ],
            None,
        )
        .await
        .expect("aggregate failed");
    groups.sort_by_key(|g| g.get_str("_id").unwrap_or_default().to_string());

    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0].get_str("_id").unwrap(), "u1");
    assert_eq!(groups[0].get_i64("count").unwrap(), 2);
    assert_eq!(groups[1].get_str("_id").unwrap(), "u2");
    assert_eq!(groups[1].get_i64("count").unwrap(), 1);
}

#[tokio::test]
async fn exhausted_deadline_returns_the_empty_fallback() {
    let store = MemoryStore::new();
    store
        .insert("Item", doc! { "name": "n" })
        .await
        .expect("insert failed");

    let rows = store
        .find(
            "Item",
            Filter::new(),
            FindOptions {
                deadline: Some(Deadline {
                    budget: Duration::from_millis(5_000),
                    remaining: Duration::from_millis(10),
                    safety_margin: Duration::from_millis(50),
                }),
                ..Default::default()
            },
        )
        .await
        .expect("fallback must not be an error");
    assert!(rows.is_empty(), "exhausted runway should yield the fallback");
}
