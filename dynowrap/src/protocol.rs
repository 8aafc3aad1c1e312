/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Request and response bodies of the JSON 1.0 protocol.
//!
//! Field names follow the store's PascalCase convention. Absent optional fields are
//! omitted on serialization and unknown fields are ignored on deserialization.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use dynowrap_core::AttributeMap;

use crate::error::{ErrorKind, TransportError};
use crate::transport::WireResponse;

/// Which attributes a read returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Select {
    /// Every attribute of each item.
    AllAttributes,
    /// Every attribute projected into the queried index.
    AllProjectedAttributes,
    /// Only the attributes named in the projection.
    SpecificAttributes,
    /// No items, only the matching count.
    Count,
}

/// Whether the store reports consumed capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReturnConsumedCapacity {
    /// Totals, broken down per table and index.
    Indexes,
    /// Totals only.
    Total,
    /// Nothing.
    None,
}

/// Which item attributes a write returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReturnValues {
    /// Nothing.
    None,
    /// The whole item as it was before the write.
    AllOld,
    /// The updated attributes as they were before the write.
    UpdatedOld,
    /// The whole item as it is after the write.
    AllNew,
    /// The updated attributes as they are after the write.
    UpdatedNew,
}

/// Capacity consumed by one call.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ConsumedCapacity {
    /// The table the capacity was consumed on.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_name: Option<String>,
    /// Total capacity units.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capacity_units: Option<f64>,
    /// Read capacity units.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_capacity_units: Option<f64>,
    /// Write capacity units.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub write_capacity_units: Option<f64>,
}

/// Placeholder bindings shared by every input that carries expressions.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct ExpressionAttributes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) expression_attribute_names: Option<HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) expression_attribute_values: Option<AttributeMap>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct GetItemInput {
    pub(crate) table_name: String,
    pub(crate) key: AttributeMap,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) consistent_read: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) projection_expression: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) expression_attribute_names: Option<HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) return_consumed_capacity: Option<ReturnConsumedCapacity>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct GetItemOutput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) item: Option<AttributeMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) consumed_capacity: Option<ConsumedCapacity>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct PutItemInput {
    pub(crate) table_name: String,
    pub(crate) item: AttributeMap,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) condition_expression: Option<String>,
    #[serde(flatten)]
    pub(crate) expression_attributes: ExpressionAttributes,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) return_values: Option<ReturnValues>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) return_consumed_capacity: Option<ReturnConsumedCapacity>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct UpdateItemInput {
    pub(crate) table_name: String,
    pub(crate) key: AttributeMap,
    pub(crate) update_expression: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) condition_expression: Option<String>,
    #[serde(flatten)]
    pub(crate) expression_attributes: ExpressionAttributes,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) return_values: Option<ReturnValues>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) return_consumed_capacity: Option<ReturnConsumedCapacity>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct DeleteItemInput {
    pub(crate) table_name: String,
    pub(crate) key: AttributeMap,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) condition_expression: Option<String>,
    #[serde(flatten)]
    pub(crate) expression_attributes: ExpressionAttributes,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) return_values: Option<ReturnValues>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) return_consumed_capacity: Option<ReturnConsumedCapacity>,
}

/// Output of PutItem, UpdateItem and DeleteItem.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct WriteItemOutput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) attributes: Option<AttributeMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) consumed_capacity: Option<ConsumedCapacity>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct QueryInput {
    pub(crate) table_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) index_name: Option<String>,
    pub(crate) key_condition_expression: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) filter_expression: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) projection_expression: Option<String>,
    #[serde(flatten)]
    pub(crate) expression_attributes: ExpressionAttributes,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) consistent_read: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) scan_index_forward: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) select: Option<Select>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) exclusive_start_key: Option<AttributeMap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) return_consumed_capacity: Option<ReturnConsumedCapacity>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct ScanInput {
    pub(crate) table_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) index_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) filter_expression: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) projection_expression: Option<String>,
    #[serde(flatten)]
    pub(crate) expression_attributes: ExpressionAttributes,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) consistent_read: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) select: Option<Select>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) exclusive_start_key: Option<AttributeMap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) segment: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) total_segments: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) return_consumed_capacity: Option<ReturnConsumedCapacity>,
}

/// Output of Query and Scan.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct ReadPageOutput {
    #[serde(default)]
    pub(crate) items: Vec<AttributeMap>,
    #[serde(default)]
    pub(crate) count: usize,
    #[serde(default)]
    pub(crate) scanned_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) last_evaluated_key: Option<AttributeMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) consumed_capacity: Option<ConsumedCapacity>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct KeysAndAttributes {
    pub(crate) keys: Vec<AttributeMap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) consistent_read: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) projection_expression: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) expression_attribute_names: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct BatchGetItemInput {
    pub(crate) request_items: HashMap<String, KeysAndAttributes>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) return_consumed_capacity: Option<ReturnConsumedCapacity>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct BatchGetItemOutput {
    #[serde(default)]
    pub(crate) responses: HashMap<String, Vec<AttributeMap>>,
    #[serde(default)]
    pub(crate) unprocessed_keys: HashMap<String, KeysAndAttributes>,
    #[serde(default)]
    pub(crate) consumed_capacity: Vec<ConsumedCapacity>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct PutRequest {
    pub(crate) item: AttributeMap,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct DeleteRequest {
    pub(crate) key: AttributeMap,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct WriteRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) put_request: Option<PutRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) delete_request: Option<DeleteRequest>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct BatchWriteItemInput {
    pub(crate) request_items: HashMap<String, Vec<WriteRequest>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) return_consumed_capacity: Option<ReturnConsumedCapacity>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct BatchWriteItemOutput {
    #[serde(default)]
    pub(crate) unprocessed_items: HashMap<String, Vec<WriteRequest>>,
    #[serde(default)]
    pub(crate) consumed_capacity: Vec<ConsumedCapacity>,
}

/// Body of an error response.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(rename = "__type", default, skip_serializing_if = "Option::is_none")]
    pub(crate) error_type: Option<String>,
    #[serde(alias = "Message", default, skip_serializing_if = "Option::is_none")]
    pub(crate) message: Option<String>,
}

impl ErrorBody {
    #[cfg(any(test, feature = "test-util"))]
    pub(crate) fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            error_type: Some(format!("com.amazonaws.dynamodb.v20120810#{code}")),
            message: Some(message.into()),
        }
    }
}

const THROTTLING_ERRORS: &[&str] = &[
    "ProvisionedThroughputExceededException",
    "ThrottlingException",
    "RequestLimitExceeded",
];

/// Strips the namespace (`aws.protocols#`) and any trailing `:http://...` from a `__type`.
fn sanitize_error_code(error_type: &str) -> &str {
    let code = error_type.split(':').next().unwrap_or(error_type);
    code.rsplit('#').next().unwrap_or(code)
}

/// Converts a non-2xx response into a classified [`TransportError`].
pub(crate) fn parse_error_response(response: &WireResponse) -> TransportError {
    let status = response.status();
    let body: ErrorBody = serde_json::from_slice(response.body()).unwrap_or_default();
    let code = body.error_type.as_deref().map(sanitize_error_code);
    let kind = match code {
        Some(code) if THROTTLING_ERRORS.contains(&code) => ErrorKind::ThrottlingError,
        _ if status >= 500 => ErrorKind::ServerError,
        _ => ErrorKind::ClientError,
    };
    let message = body
        .message
        .unwrap_or_else(|| format!("request failed with status {status}"));
    let mut err = TransportError::new(kind, message).with_status(status);
    if let Some(code) = code {
        err = err.with_code(code);
    }
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use dynowrap_core::AttributeValue;
    use pretty_assertions::assert_eq;

    #[test]
    fn query_input_uses_store_field_names() {
        let mut names = HashMap::new();
        names.insert("#userId".to_string(), "userId".to_string());
        let mut values = AttributeMap::new();
        values.insert(":userId".to_string(), AttributeValue::S("u1".into()));
        let input = QueryInput {
            table_name: "GameScores".into(),
            key_condition_expression: "#userId = :userId".into(),
            expression_attributes: ExpressionAttributes {
                expression_attribute_names: Some(names),
                expression_attribute_values: Some(values),
            },
            limit: Some(2),
            select: Some(Select::Count),
            ..Default::default()
        };
        let json = serde_json::to_value(&input).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "TableName": "GameScores",
                "KeyConditionExpression": "#userId = :userId",
                "ExpressionAttributeNames": {"#userId": "userId"},
                "ExpressionAttributeValues": {":userId": {"S": "u1"}},
                "Limit": 2,
                "Select": "COUNT"
            })
        );
    }

    #[test]
    fn outputs_ignore_unknown_fields() {
        let output: ReadPageOutput = serde_json::from_str(
            r#"{"Items": [{"id": {"N": "1"}}], "Count": 1, "ScannedCount": 3,
                "LastEvaluatedKey": {"id": {"N": "1"}}, "SomethingNew": true}"#,
        )
        .unwrap();
        assert_eq!(output.items.len(), 1);
        assert_eq!(output.scanned_count, 3);
        assert!(output.last_evaluated_key.is_some());

        let empty: BatchGetItemOutput = serde_json::from_str("{}").unwrap();
        assert!(empty.unprocessed_keys.is_empty());
    }

    #[test]
    fn classifies_error_responses() {
        let throttled = WireResponse::new(
            400,
            r#"{"__type":"com.amazonaws.dynamodb.v20120810#ProvisionedThroughputExceededException","message":"slow down"}"#,
        );
        let err = parse_error_response(&throttled);
        assert_eq!(err.kind(), ErrorKind::ThrottlingError);
        assert_eq!(err.code(), Some("ProvisionedThroughputExceededException"));
        assert_eq!(err.message(), "slow down");

        let conditional = WireResponse::new(
            400,
            r#"{"__type":"com.amazonaws.dynamodb.v20120810#ConditionalCheckFailedException","Message":"failed"}"#,
        );
        let err = parse_error_response(&conditional);
        assert_eq!(err.kind(), ErrorKind::ClientError);
        assert!(err.is_conditional_check_failed());

        let unavailable = WireResponse::new(503, "<html>unavailable</html>");
        let err = parse_error_response(&unavailable);
        assert_eq!(err.kind(), ErrorKind::ServerError);
        assert_eq!(err.code(), None);
        assert_eq!(err.status(), Some(503));
    }

    #[test]
    fn sanitizes_error_codes() {
        assert_eq!(sanitize_error_code("aws.protocoltests#FooError"), "FooError");
        assert_eq!(sanitize_error_code("FooError:http://internal.amazon.com/"), "FooError");
        assert_eq!(sanitize_error_code("FooError"), "FooError");
    }
}
