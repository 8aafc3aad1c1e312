/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use dynowrap::test_util::InMemoryStore;
use dynowrap::transport::Operation;
use dynowrap::{
    attr, Client, Config, Error, IndexDescriptor, Item, Page, ScalarType, Select, Table,
    TableDescriptor, Value,
};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing_test::traced_test;

fn events() -> TableDescriptor {
    TableDescriptor::builder("Events")
        .hash_key("userId", ScalarType::String)
        .range_key("ts", ScalarType::Number)
        .attribute("kind", ScalarType::String)
        .index(IndexDescriptor::global("by_kind", "kind").with_range_key("ts"))
        .build()
        .unwrap()
}

fn event(user: &str, ts: i64, kind: Option<&str>) -> Item {
    let mut item = Item::new();
    item.insert("userId".into(), Value::from(user));
    item.insert("ts".into(), Value::from(ts));
    item.insert("score".into(), Value::from(ts * 10));
    if let Some(kind) = kind {
        item.insert("kind".into(), Value::from(kind));
    }
    item
}

/// A table holding `count` events for "u1" (ts 1..=count) and two for "u2".
fn seeded(count: i64) -> (InMemoryStore, Table) {
    let descriptor = events();
    let store = InMemoryStore::new().with_table(&descriptor);
    for ts in 1..=count {
        let kind = if ts % 2 == 0 { Some("click") } else { None };
        store.insert("Events", &event("u1", ts, kind)).unwrap();
    }
    store.insert("Events", &event("u2", 1, Some("view"))).unwrap();
    store.insert("Events", &event("u2", 2, Some("click"))).unwrap();
    let config = Config::builder().transport(store.clone()).build().unwrap();
    (store, Client::new(config).table(descriptor))
}

fn timestamps(items: &[Item]) -> Vec<i64> {
    items
        .iter()
        .map(|item| item["ts"].as_number().and_then(|n| n.to_i64()).unwrap())
        .collect()
}

fn page_sizes(pages: &[Page]) -> Vec<usize> {
    pages.iter().map(|page| page.items().len()).collect()
}

#[tokio::test]
async fn auto_continuation_follows_cursors_until_exhausted() {
    let (store, table) = seeded(5);
    let pages = table
        .query("u1")
        .limit(2)
        .into_paginator()
        .send()
        .collect()
        .await
        .unwrap();

    assert_eq!(page_sizes(&pages), vec![2, 2, 1]);
    assert_eq!(store.call_count(Operation::Query), 3);
    assert!(pages[2].is_last());
    let items: Vec<Item> = pages.into_iter().flat_map(Page::into_items).collect();
    assert_eq!(timestamps(&items), vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn resuming_from_a_cursor_yields_exactly_the_rest() {
    let (_store, table) = seeded(5);
    let first = table.query("u1").limit(2).send().await.unwrap();
    assert_eq!(timestamps(first.items()), vec![1, 2]);
    let cursor = first.next_cursor().cloned();
    assert!(cursor.is_some());

    let rest = table
        .query("u1")
        .start_from(cursor)
        .into_paginator()
        .send()
        .items()
        .collect()
        .await
        .unwrap();
    assert_eq!(timestamps(&rest), vec![3, 4, 5]);
}

#[tokio::test]
async fn max_items_truncates_the_final_page() {
    let (store, table) = seeded(5);
    let pages = table
        .query("u1")
        .limit(2)
        .into_paginator()
        .max_items(3)
        .send()
        .collect()
        .await
        .unwrap();
    assert_eq!(page_sizes(&pages), vec![2, 1]);
    assert_eq!(store.call_count(Operation::Query), 2);

    // the truncated page resumes right after its last item
    let cursor = pages[1].next_cursor().cloned();
    let rest = table
        .query("u1")
        .start_from(cursor)
        .into_paginator()
        .send()
        .items()
        .collect()
        .await
        .unwrap();
    assert_eq!(timestamps(&rest), vec![4, 5]);
}

#[tokio::test]
async fn truncated_projections_still_resume() {
    let (_store, table) = seeded(5);
    let pages = table
        .query("u1")
        .attributes(["score"])
        .limit(2)
        .into_paginator()
        .max_items(3)
        .send()
        .collect()
        .await
        .unwrap();
    assert_eq!(page_sizes(&pages), vec![2, 1]);
    assert!(pages[1].items()[0].contains_key("ts"));
    let cursor = pages[1].next_cursor().cloned();
    assert!(cursor.is_some());

    let rest = table
        .query("u1")
        .attributes(["score"])
        .start_from(cursor)
        .into_paginator()
        .send()
        .items()
        .collect()
        .await
        .unwrap();
    let scores: Vec<&Value> = rest.iter().map(|item| &item["score"]).collect();
    assert_eq!(scores, vec![&Value::from(40), &Value::from(50)]);
    assert!(rest.iter().all(|item| !item.contains_key("ts")));
}

#[tokio::test]
async fn untruncated_projections_are_left_alone() {
    let (_store, table) = seeded(1);
    let spec = table.query("u1").attributes(["score"]).build().unwrap();
    assert_eq!(spec.projection_expression(), Some("#score"));
}

#[tokio::test]
async fn max_items_does_not_combine_with_counts() {
    let (store, table) = seeded(5);
    let mut pages = table
        .query("u1")
        .select(Select::Count)
        .into_paginator()
        .max_items(3)
        .send();
    assert!(matches!(pages.next().await, Some(Err(Error::Configuration(_)))));
    assert!(pages.next().await.is_none());

    let mut pages = table.scan().select(Select::Count).parallel(2).max_items(3).send();
    assert!(matches!(pages.next().await, Some(Err(Error::Configuration(_)))));
    assert_eq!(store.call_count(Operation::Query) + store.call_count(Operation::Scan), 0);
}

#[tokio::test]
async fn a_full_final_page_is_followed_by_an_empty_one() {
    let (store, table) = seeded(4);
    let pages = table
        .query("u1")
        .limit(2)
        .into_paginator()
        .send()
        .collect()
        .await
        .unwrap();
    assert_eq!(page_sizes(&pages), vec![2, 2, 0]);
    assert!(!pages[1].is_last());
    assert!(pages[2].is_last());
    assert_eq!(store.call_count(Operation::Query), 3);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn pagination_is_complete_for_any_limit(count in 0i64..12, limit in 1u32..=13) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let (store, items) = runtime.block_on(async {
            let (store, table) = seeded(count);
            let items = table
                .query("u1")
                .limit(limit)
                .into_paginator()
                .send()
                .items()
                .collect()
                .await
                .unwrap();
            (store, items)
        });
        prop_assert_eq!(timestamps(&items), (1..=count).collect::<Vec<_>>());
        prop_assert_eq!(
            store.call_count(Operation::Query),
            count as usize / limit as usize + 1
        );
    }
}

#[tokio::test]
async fn max_items_of_zero_sends_nothing() {
    let (store, table) = seeded(5);
    let pages = table.query("u1").into_paginator().max_items(0).send().collect().await.unwrap();
    assert!(pages.is_empty());
    assert_eq!(store.call_count(Operation::Query), 0);
}

#[tokio::test]
async fn key_conditions_and_direction() {
    let (_store, table) = seeded(5);
    let items = table
        .query("u1")
        .key_condition(attr("ts").between(2, 4))
        .descending()
        .into_paginator()
        .send()
        .items()
        .collect()
        .await
        .unwrap();
    assert_eq!(timestamps(&items), vec![4, 3, 2]);
}

#[tokio::test]
async fn filtered_pages_may_be_empty_but_pagination_continues() {
    let (store, table) = seeded(5);
    let pages = table
        .query("u1")
        .filter(attr("score").gt(40))
        .limit(2)
        .into_paginator()
        .send()
        .collect()
        .await
        .unwrap();
    assert_eq!(page_sizes(&pages), vec![0, 0, 1]);
    assert_eq!(
        pages.iter().map(Page::scanned_count).collect::<Vec<_>>(),
        vec![2, 2, 1]
    );
    assert_eq!(store.call_count(Operation::Query), 3);
}

#[tokio::test]
async fn count_select_returns_counts_only() {
    let (_store, table) = seeded(5);
    let page = table.query("u1").select(Select::Count).send().await.unwrap();
    assert!(page.items().is_empty());
    assert_eq!(page.count(), 5);
}

#[tokio::test]
async fn index_queries_skip_items_without_the_index_key() {
    let (_store, table) = seeded(6);
    let items = table
        .query("click")
        .using_index("by_kind")
        .limit(2)
        .into_paginator()
        .send()
        .items()
        .collect()
        .await
        .unwrap();
    // u1 at 2, 4, 6 and u2 at 2
    assert_eq!(items.len(), 4);
    assert!(items.iter().all(|item| item["kind"] == Value::from("click")));
}

#[tokio::test]
async fn an_error_ends_the_stream() {
    let (store, table) = seeded(5);
    let mut pages = table.query("u1").limit(2).into_paginator().send();
    assert_eq!(pages.try_next().await.unwrap().unwrap().items().len(), 2);

    store.fail_next(
        Operation::Query,
        400,
        "ProvisionedThroughputExceededException",
        "slow down",
    );
    let err = pages.next().await.unwrap().unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(
        err.as_transport().and_then(|err| err.code()),
        Some("ProvisionedThroughputExceededException")
    );
    assert!(pages.next().await.is_none());
    assert_eq!(store.call_count(Operation::Query), 2);
}

#[tokio::test]
async fn server_errors_on_plain_reads_are_not_retried() {
    let (store, table) = seeded(5);
    store.fail_next(Operation::Scan, 500, "InternalServerError", "boom");
    let err = table.scan().send().await.unwrap_err();
    assert!(matches!(err, Error::Transport(_)));
    assert!(err.is_retryable());
    assert_eq!(store.call_count(Operation::Scan), 1);
}

#[tokio::test]
async fn cancellation_stops_continuations() {
    let (store, table) = seeded(5);
    let token = CancellationToken::new();
    let mut pages = table
        .query("u1")
        .limit(2)
        .cancellation(token.clone())
        .into_paginator()
        .send();
    assert!(pages.try_next().await.unwrap().is_some());
    token.cancel();
    assert!(matches!(pages.next().await, Some(Err(Error::Cancelled))));
    assert!(pages.next().await.is_none());
    assert_eq!(store.call_count(Operation::Query), 1);
}

#[tokio::test]
async fn invalid_requests_fail_before_any_call() {
    let (store, table) = seeded(5);
    let mut pages = table.query("u1").using_index("missing").into_paginator().send();
    assert!(matches!(pages.next().await, Some(Err(Error::Configuration(_)))));
    assert!(pages.next().await.is_none());

    let err = table.query("u1").limit(0).send().await.unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
    assert_eq!(store.call_count(Operation::Query), 0);
}

#[tokio::test]
async fn scans_paginate_over_the_whole_table() {
    let (store, table) = seeded(5);
    let items = table
        .scan()
        .limit(3)
        .into_paginator()
        .send()
        .items()
        .collect()
        .await
        .unwrap();
    assert_eq!(items.len(), 7);
    assert_eq!(store.call_count(Operation::Scan), 3);
}

#[tokio::test]
async fn parallel_scan_reads_every_segment() {
    let (store, table) = seeded(20);
    let items = table
        .scan()
        .limit(4)
        .parallel(4)
        .send()
        .items()
        .collect()
        .await
        .unwrap();
    assert_eq!(items.len(), 22);
    assert!(store.call_count(Operation::Scan) >= 4);

    let limited = table
        .scan()
        .limit(4)
        .parallel(4)
        .max_items(7)
        .send()
        .collect()
        .await
        .unwrap();
    assert_eq!(limited.iter().map(|page| page.items().len()).sum::<usize>(), 7);
}

#[tokio::test]
#[traced_test]
async fn page_fetches_are_logged() {
    let (_store, table) = seeded(3);
    table
        .query("u1")
        .limit(2)
        .into_paginator()
        .send()
        .collect()
        .await
        .unwrap();
    assert!(logs_contain("fetched page"));
    assert!(logs_contain("querying"));
}
