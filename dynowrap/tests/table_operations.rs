/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use dynowrap::test_util::{InMemoryStore, ReplayTransport};
use dynowrap::transport::{Operation, WireRequest, WireResponse};
use dynowrap::{
    attr, Client, Config, Error, Item, ReturnConsumedCapacity, ReturnValues, ScalarType, Table,
    TableDescriptor, Value,
};
use pretty_assertions::assert_eq;

fn scores() -> TableDescriptor {
    TableDescriptor::builder("GameScores")
        .hash_key("userId", ScalarType::String)
        .range_key("gameTitle", ScalarType::String)
        .build()
        .unwrap()
}

fn score(user: &str, game: &str, top: i64) -> Item {
    let mut item = Item::new();
    item.insert("userId".into(), Value::from(user));
    item.insert("gameTitle".into(), Value::from(game));
    item.insert("topScore".into(), Value::from(top));
    item
}

fn in_memory() -> (InMemoryStore, Table) {
    let store = InMemoryStore::new().with_table(&scores());
    let config = Config::builder().transport(store.clone()).build().unwrap();
    (store, Client::new(config).table(scores()))
}

fn replaying(conversation: Vec<(WireRequest, WireResponse)>) -> (ReplayTransport, Table) {
    let replay = ReplayTransport::new(conversation);
    let config = Config::builder().transport(replay.clone()).build().unwrap();
    (replay, Client::new(config).table(scores()))
}

#[tokio::test]
async fn put_then_get_then_delete() {
    let (store, table) = in_memory();
    table.put(score("u1", "Galaxy", 10)).send().await.unwrap();

    let found = table.get(("u1", "Galaxy")).send().await.unwrap();
    assert_eq!(found.item(), Some(&score("u1", "Galaxy", 10)));

    let missing = table.get(("u1", "Meteor")).send().await.unwrap();
    assert!(missing.item().is_none());

    let deleted = table
        .delete(("u1", "Galaxy"))
        .return_values(ReturnValues::AllOld)
        .send()
        .await
        .unwrap();
    assert_eq!(deleted.into_item(), Some(score("u1", "Galaxy", 10)));
    assert!(store.items("GameScores").is_empty());
}

#[tokio::test]
async fn gets_can_project_attributes() {
    let (_store, table) = in_memory();
    table.put(score("u1", "Galaxy", 10)).send().await.unwrap();
    let output = table
        .get(("u1", "Galaxy"))
        .attributes(["topScore"])
        .consistent_read(true)
        .return_consumed_capacity(ReturnConsumedCapacity::Total)
        .send()
        .await
        .unwrap();
    let mut expected = Item::new();
    expected.insert("topScore".into(), Value::from(10));
    assert_eq!(output.item(), Some(&expected));
    assert!(output.consumed_capacity().is_some());
}

#[tokio::test]
async fn puts_without_overwrite_fail_on_existing_items() {
    let (_store, table) = in_memory();
    table.put(score("u1", "Galaxy", 10)).overwrite(false).send().await.unwrap();
    let err = table
        .put(score("u1", "Galaxy", 20))
        .overwrite(false)
        .send()
        .await
        .unwrap_err();
    let transport = err.as_transport().unwrap();
    assert!(transport.is_conditional_check_failed());
    assert!(!err.is_retryable());

    let kept = table.get(("u1", "Galaxy")).send().await.unwrap();
    assert_eq!(kept.item(), Some(&score("u1", "Galaxy", 10)));
}

#[tokio::test]
async fn conditional_updates() {
    let (_store, table) = in_memory();
    table.put(score("u1", "Galaxy", 10)).send().await.unwrap();

    let output = table
        .update(("u1", "Galaxy"))
        .add("topScore", 5)
        .set("lastPlayed", "today")
        .condition(attr("topScore").lt(100))
        .return_values(ReturnValues::UpdatedNew)
        .send()
        .await
        .unwrap();
    let mut updated = Item::new();
    updated.insert("topScore".into(), Value::from(15));
    updated.insert("lastPlayed".into(), Value::from("today"));
    assert_eq!(output.item(), Some(&updated));

    let err = table
        .update(("u1", "Galaxy"))
        .set("topScore", 0)
        .condition(attr("topScore").gt(100))
        .send()
        .await
        .unwrap_err();
    assert!(err.as_transport().unwrap().is_conditional_check_failed());
}

#[tokio::test]
async fn update_from_sets_and_removes() {
    let (_store, table) = in_memory();
    let mut original = score("u1", "Galaxy", 10);
    original.insert("badge".into(), Value::from("gold"));
    table.put(original).send().await.unwrap();

    let mut changes = score("u1", "Galaxy", 42);
    changes.insert("badge".into(), Value::Null);
    let output = table
        .update_from(&changes)
        .return_values(ReturnValues::AllNew)
        .send()
        .await
        .unwrap();
    assert_eq!(output.into_item(), Some(score("u1", "Galaxy", 42)));
}

#[tokio::test]
async fn key_attributes_cannot_be_updated() {
    let (store, table) = in_memory();
    let err = table
        .update(("u1", "Galaxy"))
        .set("gameTitle", "Meteor")
        .send()
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));

    let err = table.update(("u1", "Galaxy")).send().await.unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
    assert_eq!(store.call_count(Operation::UpdateItem), 0);
}

#[tokio::test]
async fn malformed_keys_fail_before_sending() {
    let (store, table) = in_memory();
    let err = table.get("u1").send().await.unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));

    let mut keyless = Item::new();
    keyless.insert("topScore".into(), Value::from(1));
    assert!(table.put(keyless).send().await.is_err());
    assert!(store.requests().is_empty());
}

#[tokio::test]
async fn unknown_tables_surface_the_store_error() {
    let store = InMemoryStore::new();
    let config = Config::builder().transport(store).build().unwrap();
    let table = Client::new(config).table(scores());
    let err = table.get(("u1", "Galaxy")).send().await.unwrap_err();
    assert_eq!(
        err.as_transport().and_then(|err| err.code()),
        Some("ResourceNotFoundException")
    );
}

#[tokio::test]
async fn get_request_shape() {
    let (replay, table) = replaying(vec![(
        WireRequest::new(
            Operation::GetItem,
            r##"{
                "TableName": "GameScores",
                "Key": {"userId": {"S": "u1"}, "gameTitle": {"S": "Galaxy"}},
                "ConsistentRead": true,
                "ProjectionExpression": "#topScore",
                "ExpressionAttributeNames": {"#topScore": "topScore"}
            }"##,
        ),
        WireResponse::ok(r#"{"Item": {"topScore": {"N": "10"}}}"#),
    )]);
    let output = table
        .get(("u1", "Galaxy"))
        .consistent_read(true)
        .attributes(["topScore"])
        .send()
        .await
        .unwrap();
    assert_eq!(output.item().map(|item| &item["topScore"]), Some(&Value::from(10)));
    replay.assert_requests_match();
}

#[tokio::test]
async fn conditional_put_request_shape() {
    let (replay, table) = replaying(vec![(
        WireRequest::new(
            Operation::PutItem,
            r##"{
                "TableName": "GameScores",
                "Item": {
                    "userId": {"S": "u1"},
                    "gameTitle": {"S": "Galaxy"},
                    "topScore": {"N": "10"}
                },
                "ConditionExpression": "attribute_not_exists(#userId)",
                "ExpressionAttributeNames": {"#userId": "userId"},
                "ReturnValues": "ALL_OLD"
            }"##,
        ),
        WireResponse::ok("{}"),
    )]);
    let output = table
        .put(score("u1", "Galaxy", 10))
        .overwrite(false)
        .return_values(ReturnValues::AllOld)
        .send()
        .await
        .unwrap();
    assert!(output.item().is_none());
    replay.assert_requests_match();
    assert_eq!(replay.remaining(), 0);
}

#[tokio::test]
async fn error_responses_are_classified() {
    let (_replay, table) = replaying(vec![(
        WireRequest::new(Operation::DeleteItem, "{}"),
        WireResponse::new(
            400,
            r#"{"__type": "com.amazonaws.dynamodb.v20120810#ProvisionedThroughputExceededException", "message": "slow down"}"#,
        ),
    )]);
    let err = table.delete(("u1", "Galaxy")).send().await.unwrap_err();
    let transport = err.as_transport().unwrap();
    assert_eq!(transport.code(), Some("ProvisionedThroughputExceededException"));
    assert_eq!(transport.message(), "slow down");
    assert_eq!(transport.status(), Some(400));
    assert!(err.is_retryable());
}
