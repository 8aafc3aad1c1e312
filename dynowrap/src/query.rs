/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Query requests.

use std::collections::HashMap;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use dynowrap_core::{encode_key_value, AttributeMap, KeyNames, TableDescriptor, Value};
use dynowrap_expressions::{AttributePath, Comparator, Condition, ExpressionContext};

use crate::client::Client;
use crate::error::Error;
use crate::page::{Cursor, Page};
use crate::paginate::{PageSource, Paginator};
use crate::protocol::{ExpressionAttributes, QueryInput, ReadPageOutput, ReturnConsumedCapacity, Select};
use crate::read::{cursor_attributes, ReadOptions};
use crate::table::Table;
use crate::transport::Operation;

/// Builds a Query on one hash key value.
///
/// Created with [`Table::query`]. Every method returns the updated builder; nothing is
/// sent until [`send`](Self::send) or [`into_paginator`](Self::into_paginator).
///
/// ```no_run
/// # async fn docs(table: dynowrap::Table) -> Result<(), dynowrap::Error> {
/// use dynowrap::attr;
///
/// let page = table
///     .query("u1")
///     .key_condition(attr("gameTitle").begins_with("Meteor"))
///     .filter(attr("wins").gt(3))
///     .limit(10)
///     .send()
///     .await?;
/// for item in page.items() {
///     println!("{item:?}");
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
#[must_use]
pub struct QueryBuilder {
    table: Table,
    hash: Value,
    key_condition: Option<Condition>,
    scan_index_forward: Option<bool>,
    options: ReadOptions,
}

impl QueryBuilder {
    pub(crate) fn new(table: Table, hash: Value) -> Self {
        Self {
            table,
            hash,
            key_condition: None,
            scan_index_forward: None,
            options: ReadOptions::default(),
        }
    }

    /// Queries the named secondary index instead of the table.
    pub fn using_index(mut self, index: impl Into<String>) -> Self {
        self.options.index = Some(index.into());
        self
    }

    /// Restricts the range key of the table or index.
    ///
    /// Only `=`, `<`, `<=`, `>`, `>=`, `BETWEEN` and `begins_with` are allowed. A second
    /// call replaces the first.
    pub fn key_condition(mut self, condition: Condition) -> Self {
        self.key_condition = Some(condition);
        self
    }

    /// Adds a filter applied after the key condition. Filters are combined with `AND`
    /// and may not reference key attributes.
    pub fn filter(mut self, condition: Condition) -> Self {
        self.options.filters.push(condition);
        self
    }

    /// Returns only the listed attributes.
    pub fn attributes<I, P>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<AttributePath>,
    {
        self.options
            .attributes
            .extend(attributes.into_iter().map(Into::into));
        self
    }

    /// Evaluates at most `limit` items per request.
    pub fn limit(mut self, limit: u32) -> Self {
        self.options.limit = Some(limit);
        self
    }

    /// Requests a strongly consistent read.
    pub fn consistent_read(mut self, consistent_read: bool) -> Self {
        self.options.consistent_read = Some(consistent_read);
        self
    }

    /// Returns items in ascending range key order (the default).
    pub fn ascending(mut self) -> Self {
        self.scan_index_forward = Some(true);
        self
    }

    /// Returns items in descending range key order.
    pub fn descending(mut self) -> Self {
        self.scan_index_forward = Some(false);
        self
    }

    /// Sets the select mode.
    pub fn select(mut self, select: Select) -> Self {
        self.options.select = Some(select);
        self
    }

    /// Asks the store to report consumed capacity on every page.
    pub fn return_consumed_capacity(mut self, mode: ReturnConsumedCapacity) -> Self {
        self.options.return_consumed_capacity = Some(mode);
        self
    }

    /// Starts after `cursor`, typically the [`next_cursor`](Page::next_cursor) of an
    /// earlier page.
    pub fn start_from(mut self, cursor: impl Into<Option<Cursor>>) -> Self {
        self.options.cursor = cursor.into();
        self
    }

    /// Stops pagination once `token` is cancelled.
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.options.cancellation = Some(token);
        self
    }

    /// Validates the builder and renders its expressions.
    pub fn build(&self) -> Result<QuerySpec, Error> {
        self.build_with(false)
    }

    /// With `project_keys`, a projection also returns the attributes a cursor is
    /// rebuilt from.
    pub(crate) fn build_with(&self, project_keys: bool) -> Result<QuerySpec, Error> {
        let descriptor = self.table.descriptor();
        let keys = descriptor.key_names_for(self.options.index.as_deref())?;
        let key_attributes = cursor_attributes(descriptor, self.options.index.as_deref())?;
        let options = if project_keys {
            self.options.with_projected_keys(&key_attributes)
        } else {
            self.options.clone()
        };
        if self.hash.is_null() {
            return Err(Error::configuration("query requires a hash key value"));
        }

        let mut ctx = ExpressionContext::new();
        let hash_value = encode_key_value(descriptor, keys.hash_key, &self.hash)?;
        let mut key_condition_expression = format!(
            "{} = {}",
            ctx.name(keys.hash_key),
            ctx.wire_value(keys.hash_key, hash_value)
        );
        if let Some(condition) = &self.key_condition {
            check_key_condition(descriptor, keys, condition)?;
            key_condition_expression.push_str(" AND ");
            key_condition_expression.push_str(&condition.render(&mut ctx)?);
        }
        let rendered = options.render(descriptor, Some(keys), &mut ctx)?;
        let (names, values) = ctx.into_parts();

        let input = QueryInput {
            table_name: descriptor.name().to_string(),
            index_name: self.options.index.clone(),
            key_condition_expression,
            filter_expression: rendered.filter_expression,
            projection_expression: rendered.projection_expression,
            expression_attributes: ExpressionAttributes {
                expression_attribute_names: names,
                expression_attribute_values: values,
            },
            limit: options.limit,
            consistent_read: options.consistent_read,
            scan_index_forward: self.scan_index_forward,
            select: options.wire_select(),
            exclusive_start_key: None,
            return_consumed_capacity: options.return_consumed_capacity,
        };
        Ok(QuerySpec {
            input,
            cursor: options.cursor,
            key_attributes,
            cancellation: options.cancellation,
        })
    }

    /// Sends one request and returns its page.
    pub async fn send(self) -> Result<Page, Error> {
        let spec = self.build()?;
        if spec.cancellation().map_or(false, CancellationToken::is_cancelled) {
            return Err(Error::Cancelled);
        }
        spec.fetch(self.table.client()).await
    }

    /// Turns the builder into a paginator that follows cursors automatically.
    pub fn into_paginator(self) -> Paginator {
        Paginator::new(self.table.client().clone(), PageSource::Query(self))
    }
}

/// Checks that `condition` is a legal key condition on the range key of `keys`.
fn check_key_condition(
    table: &TableDescriptor,
    keys: KeyNames<'_>,
    condition: &Condition,
) -> Result<(), Error> {
    let range_key = keys.range_key.ok_or_else(|| {
        Error::configuration(format!(
            "key conditions need a range key, but '{}' has none",
            table.name()
        ))
    })?;
    let (path, operands): (&AttributePath, Vec<&Value>) = match condition {
        Condition::Compare { path, op, value } => {
            if *op == Comparator::Ne {
                return Err(Error::configuration(
                    "'<>' is not allowed in a key condition",
                ));
            }
            (path, vec![value])
        }
        Condition::Between { path, low, high } => (path, vec![low, high]),
        Condition::BeginsWith { path, prefix } => (path, vec![prefix]),
        other => {
            return Err(Error::configuration(format!(
                "unsupported key condition: {other:?}; use =, <, <=, >, >=, between or begins_with"
            )))
        }
    };
    if !path.is_top_level() || path.root() != range_key {
        return Err(Error::configuration(format!(
            "key conditions must target range key '{range_key}', not '{path}'"
        )));
    }
    for operand in operands {
        encode_key_value(table, range_key, operand)?;
    }
    Ok(())
}

/// A validated, rendered Query.
///
/// Immutable: [`with_cursor`](Self::with_cursor) returns a copy starting elsewhere.
#[derive(Debug, Clone)]
pub struct QuerySpec {
    input: QueryInput,
    cursor: Option<Cursor>,
    key_attributes: Vec<String>,
    cancellation: Option<CancellationToken>,
}

impl QuerySpec {
    /// The table queried.
    pub fn table_name(&self) -> &str {
        &self.input.table_name
    }

    /// The index queried, if any.
    pub fn index_name(&self) -> Option<&str> {
        self.input.index_name.as_deref()
    }

    /// The rendered key condition, e.g. `#userId = :userId AND #ts > :ts`.
    pub fn key_condition_expression(&self) -> &str {
        &self.input.key_condition_expression
    }

    /// The rendered filter.
    pub fn filter_expression(&self) -> Option<&str> {
        self.input.filter_expression.as_deref()
    }

    /// The rendered projection.
    pub fn projection_expression(&self) -> Option<&str> {
        self.input.projection_expression.as_deref()
    }

    /// Name placeholder bindings.
    pub fn expression_attribute_names(&self) -> Option<&HashMap<String, String>> {
        self.input.expression_attributes.expression_attribute_names.as_ref()
    }

    /// Value placeholder bindings.
    pub fn expression_attribute_values(&self) -> Option<&AttributeMap> {
        self.input.expression_attributes.expression_attribute_values.as_ref()
    }

    /// Items evaluated per request.
    pub fn limit(&self) -> Option<u32> {
        self.input.limit
    }

    /// The select mode sent on the wire.
    pub fn select(&self) -> Option<Select> {
        self.input.select
    }

    /// Where the next request starts.
    pub fn cursor(&self) -> Option<&Cursor> {
        self.cursor.as_ref()
    }

    /// A copy starting at `cursor`.
    pub fn with_cursor(&self, cursor: Option<Cursor>) -> Self {
        Self {
            cursor,
            ..self.clone()
        }
    }

    pub(crate) fn key_attributes(&self) -> &[String] {
        &self.key_attributes
    }

    pub(crate) fn cancellation(&self) -> Option<&CancellationToken> {
        self.cancellation.as_ref()
    }

    pub(crate) async fn fetch(&self, client: &Client) -> Result<Page, Error> {
        let mut input = self.input.clone();
        input.exclusive_start_key = self.cursor.as_ref().map(|cursor| cursor.as_wire().clone());
        debug!(
            table = %input.table_name,
            index = ?input.index_name,
            resumed = input.exclusive_start_key.is_some(),
            "querying"
        );
        let output: ReadPageOutput = client.call(Operation::Query, &input.table_name, &input).await?;
        Ok(Page::from_output(output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::InMemoryStore;
    use crate::Config;
    use dynowrap_core::{AttributeValue, IndexDescriptor, ScalarType};
    use dynowrap_expressions::attr;
    use pretty_assertions::assert_eq;

    fn table() -> Table {
        let descriptor = TableDescriptor::builder("GameScores")
            .hash_key("userId", ScalarType::String)
            .range_key("ts", ScalarType::Number)
            .attribute("gameTitle", ScalarType::String)
            .index(IndexDescriptor::local("TitleIndex", "userId", "gameTitle"))
            .index(IndexDescriptor::global("Leaderboard", "gameTitle").with_range_key("ts"))
            .build()
            .unwrap();
        let config = Config::builder()
            .transport(InMemoryStore::new())
            .build()
            .unwrap();
        Client::new(config).table(descriptor)
    }

    #[test]
    fn renders_hash_and_range_conditions() {
        let spec = table()
            .query("u1")
            .key_condition(attr("ts").between(10, 20))
            .filter(attr("score").ge(100))
            .limit(2)
            .build()
            .unwrap();
        assert_eq!(
            spec.key_condition_expression(),
            "#userId = :userId AND #ts BETWEEN :ts AND :ts_2"
        );
        assert_eq!(spec.filter_expression(), Some("#score >= :score"));
        let values = spec.expression_attribute_values().unwrap();
        assert_eq!(values[":userId"], AttributeValue::S("u1".into()));
        assert_eq!(values[":ts_2"], AttributeValue::N(20i64.into()));
        assert_eq!(spec.limit(), Some(2));
    }

    #[test]
    fn null_hash_is_rejected() {
        let err = table().query(Value::Null).build().unwrap_err();
        assert_eq!(err, Error::configuration("query requires a hash key value"));
    }

    #[test]
    fn hash_type_must_match_the_descriptor() {
        let err = table().query(5i64).build().unwrap_err();
        assert!(matches!(err, Error::Serialization(_)));
    }

    #[test]
    fn key_condition_must_target_the_range_key() {
        let err = table()
            .query("u1")
            .key_condition(attr("score").gt(1))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("range key 'ts'"));

        let err = table()
            .query("u1")
            .key_condition(attr("ts").ne(1))
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));

        let err = table()
            .query("u1")
            .key_condition(attr("ts").exists())
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn index_keys_apply_to_index_queries() {
        let spec = table()
            .query("Meteor Blasters")
            .using_index("Leaderboard")
            .key_condition(attr("ts").gt(5))
            .descending()
            .build()
            .unwrap();
        assert_eq!(spec.index_name(), Some("Leaderboard"));
        assert_eq!(
            spec.key_condition_expression(),
            "#gameTitle = :gameTitle AND #ts > :ts"
        );

        let err = table().query("u1").using_index("Nope").build().unwrap_err();
        assert!(err.to_string().contains("no index named 'Nope'"));
    }

    #[test]
    fn filters_on_key_attributes_are_rejected() {
        let err = table()
            .query("u1")
            .filter(attr("ts").gt(3))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("key attribute 'ts'"));
    }

    #[test]
    fn with_cursor_leaves_the_original_untouched() {
        let spec = table().query("u1").build().unwrap();
        let mut key = AttributeMap::new();
        key.insert("userId".into(), AttributeValue::S("u1".into()));
        let resumed = spec.with_cursor(Some(Cursor::from_wire(key)));
        assert!(spec.cursor().is_none());
        assert!(resumed.cursor().is_some());
        assert_eq!(resumed.key_condition_expression(), spec.key_condition_expression());
    }
}
