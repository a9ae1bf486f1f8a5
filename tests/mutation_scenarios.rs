//! Mutation Scenario Tests
//!
//! End-to-end mutation flows through the public API:
//! - Paginated updates resume from the returned cursor
//! - Multi-probe selections cannot be paginated
//! - Unindexed selections need an explicit full-scan opt-in
//! - Async execution continues through the scheduler

use boundorm::engine::{Host, Orm};
use boundorm::filter::builder;
use boundorm::mutation::{ContinuationPayload, ExecuteOptions, WorkType, CONTINUATION_FUNCTION};
use boundorm::schema::{EngineConfig, Schema, TableBuilder};
use boundorm::store::{DocumentWriter, MemoryScheduler, MemoryStore};
use boundorm::stream::PaginationOptions;
use serde_json::{json, Value};

// =============================================================================
// Helper Functions
// =============================================================================

fn schema() -> Schema {
    Schema::builder()
        .table(
            TableBuilder::new("posts")
                .columns(["title", "status", "published"])
                .index("by_status", ["status"]),
        )
        .config(EngineConfig::default())
        .build()
        .unwrap()
}

fn seed(store: &MemoryStore) {
    for (title, status) in [("a", "draft"), ("b", "draft"), ("c", "live"), ("d", "draft")] {
        let body = json!({"title": title, "status": status, "published": false});
        store.insert("posts", body.as_object().cloned().unwrap()).unwrap();
    }
}

fn published(store: &MemoryStore, status: &str) -> Vec<bool> {
    store
        .all("posts")
        .into_iter()
        .filter(|d| d.get("status") == Some(&json!(status)))
        .map(|d| d.get("published").and_then(Value::as_bool).unwrap_or(false))
        .collect()
}

// =============================================================================
// Paginated Mutations
// =============================================================================

/// Test: a paginated update writes one page per call and resumes from the cursor.
#[test]
fn test_paginated_update_resumes() {
    let schema = schema();
    let store = MemoryStore::new(&schema);
    let scheduler = MemoryScheduler::new();
    let orm = Orm::new(&schema, Host::memory(&store, &scheduler));
    seed(&store);

    let update = orm
        .update("posts")
        .unwrap()
        .set(json!({"published": true}))
        .with_where(builder::eq("status", json!("draft")));

    let first = update.paginate(&PaginationOptions::new(2)).unwrap();
    assert_eq!(first.num_affected, 2);
    assert!(!first.is_done);

    let second = update
        .paginate(&PaginationOptions::new(2).with_cursor(Some(first.continue_cursor)))
        .unwrap();
    assert_eq!(second.num_affected, 1);
    assert!(second.is_done);

    assert_eq!(published(&store, "draft"), vec![true, true, true]);
    assert_eq!(published(&store, "live"), vec![false]);
}

/// Test: inArray selections plan several probes and cannot be paginated.
#[test]
fn test_multi_probe_pagination_rejected() {
    let schema = schema();
    let store = MemoryStore::new(&schema);
    let scheduler = MemoryScheduler::new();
    let orm = Orm::new(&schema, Host::memory(&store, &scheduler));
    seed(&store);

    let selection = || builder::in_array("status", vec![json!("draft"), json!("live")]);

    let err = orm
        .update("posts")
        .unwrap()
        .set(json!({"published": true}))
        .with_where(selection())
        .paginate(&PaginationOptions::new(2))
        .unwrap_err();
    assert_eq!(err.code(), "ORM_MULTI_PROBE_PAGINATION");

    let err = orm
        .delete("posts")
        .unwrap()
        .with_where(selection())
        .hard()
        .paginate(&PaginationOptions::new(2))
        .unwrap_err();
    assert_eq!(err.code(), "ORM_MULTI_PROBE_PAGINATION");

    assert_eq!(store.count("posts"), 4);
    assert!(published(&store, "draft").iter().all(|p| !p));
}

// =============================================================================
// Full-Scan Opt-In
// =============================================================================

/// Test: an unindexed selection fails on a strict schema until opted in.
#[test]
fn test_unindexed_update_requires_opt_in() {
    let schema = schema();
    let store = MemoryStore::new(&schema);
    let scheduler = MemoryScheduler::new();
    let orm = Orm::new(&schema, Host::memory(&store, &scheduler));
    seed(&store);

    let err = orm
        .update("posts")
        .unwrap()
        .set(json!({"published": true}))
        .with_where(builder::eq("title", json!("c")))
        .execute(&ExecuteOptions::new())
        .unwrap_err();
    assert_eq!(err.code(), "ORM_FULL_SCAN_REQUIRED");
    assert_eq!(published(&store, "live"), vec![false]);

    let result = orm
        .update("posts")
        .unwrap()
        .set(json!({"published": true}))
        .with_where(builder::eq("title", json!("c")))
        .allow_full_scan()
        .execute(&ExecuteOptions::new())
        .unwrap();
    assert_eq!(result.num_affected, 1);
    assert_eq!(published(&store, "live"), vec![true]);
}

/// Test: update and delete without a where clause need allowFullScan.
#[test]
fn test_whole_table_mutation_requires_opt_in() {
    let schema = schema();
    let store = MemoryStore::new(&schema);
    let scheduler = MemoryScheduler::new();
    let orm = Orm::new(&schema, Host::memory(&store, &scheduler));
    seed(&store);

    let err = orm
        .update("posts")
        .unwrap()
        .set(json!({"published": true}))
        .execute(&ExecuteOptions::new())
        .unwrap_err();
    assert_eq!(err.code(), "ORM_FULL_SCAN_REQUIRED");

    let err = orm
        .delete("posts")
        .unwrap()
        .hard()
        .execute(&ExecuteOptions::new())
        .unwrap_err();
    assert_eq!(err.code(), "ORM_FULL_SCAN_REQUIRED");
    assert_eq!(store.count("posts"), 4);

    let result = orm
        .delete("posts")
        .unwrap()
        .hard()
        .allow_full_scan()
        .execute(&ExecuteOptions::new())
        .unwrap();
    assert_eq!(result.num_affected, 4);
    assert_eq!(store.count("posts"), 0);
}

// =============================================================================
// Async Execution
// =============================================================================

/// Test: async updates write one batch and schedule the remainder.
#[test]
fn test_async_update_continues_through_scheduler() {
    let schema = schema();
    let store = MemoryStore::new(&schema);
    let scheduler = MemoryScheduler::new();
    let orm = Orm::new(&schema, Host::memory(&store, &scheduler));
    seed(&store);

    let result = orm
        .update("posts")
        .unwrap()
        .set(json!({"published": true}))
        .with_where(builder::eq("status", json!("draft")))
        .execute_async(&ExecuteOptions::new().with_batch_size(2))
        .unwrap();
    assert_eq!(result.num_affected, 2);
    assert!(!result.is_done);

    let pending = scheduler.pending();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].function, CONTINUATION_FUNCTION);
    assert_eq!(pending[0].payload["operation"], json!("update"));
    assert_eq!(pending[0].payload["table"], json!("posts"));
    assert_eq!(pending[0].payload["batchSize"], json!(2));

    let payload = ContinuationPayload::from_value(&pending[0].payload).unwrap();
    assert_eq!(payload.work_type, WorkType::Root);
    assert!(payload.cursor.is_some());

    assert_eq!(orm.drain(&scheduler).unwrap(), 1);
    assert!(scheduler.pending().is_empty());
    assert_eq!(published(&store, "draft"), vec![true, true, true]);
    assert_eq!(published(&store, "live"), vec![false]);
}

/// Test: a tampered continuation payload is rejected before any write.
#[test]
fn test_invalid_continuation_payload_rejected() {
    let schema = schema();
    let store = MemoryStore::new(&schema);
    let scheduler = MemoryScheduler::new();
    let orm = Orm::new(&schema, Host::memory(&store, &scheduler));
    seed(&store);

    orm.update("posts")
        .unwrap()
        .set(json!({"published": true}))
        .with_where(builder::eq("status", json!("draft")))
        .execute_async(&ExecuteOptions::new().with_batch_size(2))
        .unwrap();

    let mut payload = scheduler.pending()[0].payload.clone();
    payload["batchSize"] = json!(0);

    let err = orm.handle_job(CONTINUATION_FUNCTION, &payload).unwrap_err();
    assert_eq!(err.code(), "ORM_INVALID_PAYLOAD");
    assert_eq!(published(&store, "draft").iter().filter(|p| **p).count(), 2);
}
