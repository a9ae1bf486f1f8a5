//! Pagination Property Tests
//!
//! Tests for read invariants:
//! - Compilation is deterministic
//! - Paginating to completion returns every row exactly once
//! - Replaying a cursor returns the same page

use std::collections::HashSet;

use boundorm::engine::{Host, Orm};
use boundorm::filter::{builder, FilterExpression};
use boundorm::planner::WhereClauseCompiler;
use boundorm::query::{FindManyOptions, RowEnvelope};
use boundorm::schema::{Schema, TableBuilder};
use boundorm::store::{DocumentWriter, MemoryScheduler, MemoryStore};
use boundorm::stream::PaginationOptions;
use proptest::prelude::*;
use serde_json::{json, Value};

// =============================================================================
// Helper Functions
// =============================================================================

const STATUSES: [&str; 3] = ["draft", "active", "archived"];

fn schema() -> Schema {
    Schema::builder()
        .table(
            TableBuilder::new("items")
                .index("by_status", ["status"])
                .index("by_status_rank", ["status", "rank"]),
        )
        .build()
        .unwrap()
}

fn seed(store: &MemoryStore, rows: &[(usize, i64)]) {
    for (status, rank) in rows {
        let body = json!({"status": STATUSES[*status], "rank": rank});
        store.insert("items", body.as_object().cloned().unwrap()).unwrap();
    }
}

fn ids(rows: &[RowEnvelope]) -> Vec<String> {
    rows.iter().map(|r| r.id().to_string()).collect()
}

/// Pages through `options` until done
fn paginate_all(orm: &Orm<'_>, options: &FindManyOptions, page_size: usize) -> Vec<Vec<RowEnvelope>> {
    let query = orm.query("items").unwrap();
    let mut pages = Vec::new();
    let mut cursor = None;
    // bound the loop so a broken cursor fails instead of hanging
    for _ in 0..1000 {
        let page = query
            .paginate(options, &PaginationOptions::new(page_size).with_cursor(cursor))
            .unwrap();
        let done = page.is_done;
        pages.push(page.page);
        if done {
            return pages;
        }
        cursor = Some(page.continue_cursor);
    }
    panic!("pagination did not finish");
}

// =============================================================================
// Scenario Tests
// =============================================================================

/// Test: 25 rows paged by 10 give pages of 10, 10 and 5.
#[test]
fn test_twenty_five_rows_in_three_pages() {
    let schema = schema();
    let store = MemoryStore::new(&schema);
    let scheduler = MemoryScheduler::new();
    let orm = Orm::new(&schema, Host::memory(&store, &scheduler));
    seed(&store, &(0..25).map(|i| (0, i)).collect::<Vec<_>>());

    let query = orm.query("items").unwrap();
    let options = FindManyOptions::new().with_where(builder::eq("status", json!("draft")));

    let mut sizes = Vec::new();
    let mut done = Vec::new();
    let mut seen = HashSet::new();
    let mut cursor = None;
    for _ in 0..3 {
        let page = query
            .paginate(&options, &PaginationOptions::new(10).with_cursor(cursor))
            .unwrap();
        sizes.push(page.page.len());
        done.push(page.is_done);
        seen.extend(ids(&page.page));
        cursor = Some(page.continue_cursor);
    }

    assert_eq!(sizes, vec![10, 10, 5]);
    assert_eq!(done, vec![false, false, true]);
    assert_eq!(seen.len(), 25);
}

/// Test: replaying a cursor with the same limit returns identical pages.
#[test]
fn test_cursor_replay_is_stable() {
    let schema = schema();
    let store = MemoryStore::new(&schema);
    let scheduler = MemoryScheduler::new();
    let orm = Orm::new(&schema, Host::memory(&store, &scheduler));
    seed(&store, &(0..12).map(|i| (i % 2, i as i64)).collect::<Vec<_>>());

    let query = orm.query("items").unwrap();
    let options = FindManyOptions::new().with_where(builder::eq("status", json!("draft")));
    let first = query.paginate(&options, &PaginationOptions::new(2)).unwrap();

    let replay = |cursor: &str| {
        let page = query
            .paginate(
                &options,
                &PaginationOptions::new(2).with_cursor(Some(cursor.to_string())),
            )
            .unwrap();
        (ids(&page.page), page.continue_cursor)
    };
    assert_eq!(replay(&first.continue_cursor), replay(&first.continue_cursor));
}

/// Test: range pages come back in index order.
#[test]
fn test_range_pages_follow_index_order() {
    let schema = schema();
    let store = MemoryStore::new(&schema);
    let scheduler = MemoryScheduler::new();
    let orm = Orm::new(&schema, Host::memory(&store, &scheduler));
    seed(&store, &[(0, 5), (0, 1), (0, 4), (1, 2), (0, 3)]);

    let options = FindManyOptions::new()
        .with_index("by_status_rank")
        .with_where(builder::and(vec![
            builder::eq("status", json!("draft")),
            builder::gte("rank", json!(2)),
        ]));
    let pages = paginate_all(&orm, &options, 2);
    assert_eq!(pages.len(), 2);
    let ranks: Vec<i64> = pages
        .iter()
        .flatten()
        .filter_map(|row| row.get("rank").and_then(Value::as_i64))
        .collect();
    assert_eq!(ranks, vec![3, 4, 5]);
}

// =============================================================================
// Properties
// =============================================================================

fn status_filter() -> impl Strategy<Value = Option<FilterExpression>> {
    prop_oneof![
        Just(None),
        (0..STATUSES.len()).prop_map(|i| Some(builder::eq("status", json!(STATUSES[i])))),
        (0..STATUSES.len(), -3i64..3).prop_map(|(i, rank)| Some(builder::and(vec![
            builder::eq("status", json!(STATUSES[i])),
            builder::gt("rank", json!(rank)),
        ]))),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Test: the same expression always compiles to the same plan.
    #[test]
    fn prop_compilation_is_deterministic(
        values in proptest::collection::vec(0..STATUSES.len(), 1..4),
        rank in -5i64..5,
    ) {
        let schema = schema();
        let table = schema.table("items").unwrap();
        let statuses: Vec<Value> = values.iter().map(|i| json!(STATUSES[*i])).collect();
        let expression = builder::and(vec![
            builder::in_array("status", statuses),
            builder::lt("rank", json!(rank)),
        ]);

        let first = WhereClauseCompiler::new(table).compile(Some(&expression)).unwrap();
        let second = WhereClauseCompiler::new(table).compile(Some(&expression)).unwrap();
        prop_assert_eq!(first, second);
    }

    /// Test: paging to completion returns the unpaginated row set, once each.
    #[test]
    fn prop_pages_cover_every_row_once(
        rows in proptest::collection::vec((0..STATUSES.len(), -5i64..5), 0..30),
        page_size in 1usize..8,
        filter in status_filter(),
    ) {
        let schema = schema();
        let store = MemoryStore::new(&schema);
        let scheduler = MemoryScheduler::new();
        let orm = Orm::new(&schema, Host::memory(&store, &scheduler));
        seed(&store, &rows);

        let mut options = FindManyOptions::new();
        if let Some(expression) = filter {
            options = options.with_where(expression);
        }

        let paged: Vec<String> = paginate_all(&orm, &options, page_size)
            .iter()
            .flat_map(|page| ids(page))
            .collect();
        let unique: HashSet<&String> = paged.iter().collect();
        prop_assert_eq!(unique.len(), paged.len());

        let all = orm
            .query("items")
            .unwrap()
            .find_many(&options.clone().with_limit(rows.len() + 1))
            .unwrap();
        prop_assert_eq!(paged, ids(&all));
    }
}
