/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Scan requests, sequential and parallel.

use std::collections::HashMap;

use futures_util::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use dynowrap_core::AttributeMap;
use dynowrap_expressions::{AttributePath, Condition, ExpressionContext};

use crate::client::Client;
use crate::error::Error;
use crate::page::{Cursor, Page};
use crate::paginate::{check_max_items, PageSource, PageStream, Paginator, ReadRequest};
use crate::protocol::{ExpressionAttributes, ReadPageOutput, ReturnConsumedCapacity, ScanInput, Select};
use crate::read::{cursor_attributes, ReadOptions};
use crate::table::Table;
use crate::transport::Operation;

/// Builds a Scan over a table or index.
///
/// Created with [`Table::scan`].
#[derive(Debug, Clone)]
#[must_use]
pub struct ScanBuilder {
    table: Table,
    segment: Option<(u32, u32)>,
    options: ReadOptions,
}

impl ScanBuilder {
    pub(crate) fn new(table: Table) -> Self {
        Self {
            table,
            segment: None,
            options: ReadOptions::default(),
        }
    }

    /// Scans the named secondary index instead of the table.
    pub fn using_index(mut self, index: impl Into<String>) -> Self {
        self.options.index = Some(index.into());
        self
    }

    /// Adds a filter. Filters are combined with `AND`.
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

    /// Starts after `cursor`.
    pub fn start_from(mut self, cursor: impl Into<Option<Cursor>>) -> Self {
        self.options.cursor = cursor.into();
        self
    }

    /// Stops pagination once `token` is cancelled.
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.options.cancellation = Some(token);
        self
    }

    /// Scans only segment `segment` of `total_segments`.
    pub fn segment(mut self, segment: u32, total_segments: u32) -> Self {
        self.segment = Some((segment, total_segments));
        self
    }

    /// Validates the builder and renders its expressions.
    pub fn build(&self) -> Result<ScanSpec, Error> {
        self.build_with(false)
    }

    /// With `project_keys`, a projection also returns the attributes a cursor is
    /// rebuilt from.
    pub(crate) fn build_with(&self, project_keys: bool) -> Result<ScanSpec, Error> {
        let descriptor = self.table.descriptor();
        if let Some((segment, total)) = self.segment {
            check_segments(total)?;
            if segment >= total {
                return Err(Error::configuration(format!(
                    "segment {segment} is out of range for {total} total segments"
                )));
            }
        }
        let key_attributes = cursor_attributes(descriptor, self.options.index.as_deref())?;
        let options = if project_keys {
            self.options.with_projected_keys(&key_attributes)
        } else {
            self.options.clone()
        };
        let mut ctx = ExpressionContext::new();
        let rendered = options.render(descriptor, None, &mut ctx)?;
        let (names, values) = ctx.into_parts();
        let input = ScanInput {
            table_name: descriptor.name().to_string(),
            index_name: self.options.index.clone(),
            filter_expression: rendered.filter_expression,
            projection_expression: rendered.projection_expression,
            expression_attributes: ExpressionAttributes {
                expression_attribute_names: names,
                expression_attribute_values: values,
            },
            limit: options.limit,
            consistent_read: options.consistent_read,
            select: options.wire_select(),
            exclusive_start_key: None,
            segment: self.segment.map(|(segment, _)| segment),
            total_segments: self.segment.map(|(_, total)| total),
            return_consumed_capacity: options.return_consumed_capacity,
        };
        Ok(ScanSpec {
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
        Paginator::new(self.table.client().clone(), PageSource::Scan(self))
    }

    /// Splits the scan into `total_segments` segments read concurrently.
    ///
    /// Any segment or start cursor set on this builder is ignored.
    pub fn parallel(self, total_segments: u32) -> ParallelScan {
        ParallelScan {
            builder: self,
            total_segments,
            max_items: None,
        }
    }
}

fn check_segments(total: u32) -> Result<(), Error> {
    if total == 0 {
        return Err(Error::configuration("total segments must be at least 1"));
    }
    Ok(())
}

/// A validated, rendered Scan.
#[derive(Debug, Clone)]
pub struct ScanSpec {
    input: ScanInput,
    cursor: Option<Cursor>,
    key_attributes: Vec<String>,
    cancellation: Option<CancellationToken>,
}

impl ScanSpec {
    /// The table scanned.
    pub fn table_name(&self) -> &str {
        &self.input.table_name
    }

    /// The index scanned, if any.
    pub fn index_name(&self) -> Option<&str> {
        self.input.index_name.as_deref()
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

    /// The segment and total segment count, for a segmented scan.
    pub fn segment(&self) -> Option<(u32, u32)> {
        self.input.segment.zip(self.input.total_segments)
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

    fn with_segment(&self, segment: u32, total_segments: u32) -> Self {
        let mut spec = self.with_cursor(None);
        spec.input.segment = Some(segment);
        spec.input.total_segments = Some(total_segments);
        spec
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
            segment = ?input.segment,
            resumed = input.exclusive_start_key.is_some(),
            "scanning"
        );
        let output: ReadPageOutput = client.call(Operation::Scan, &input.table_name, &input).await?;
        Ok(Page::from_output(output))
    }
}

/// A scan split into segments that are paginated concurrently.
///
/// Pages are yielded in the order they arrive, so items of different segments
/// interleave. Truncated pages (see [`max_items`](Self::max_items)) carry no cursor,
/// since one cursor cannot describe every segment.
#[derive(Debug)]
#[must_use]
pub struct ParallelScan {
    builder: ScanBuilder,
    total_segments: u32,
    max_items: Option<usize>,
}

impl ParallelScan {
    /// Stops once `max_items` items have been returned across all segments.
    pub fn max_items(mut self, max_items: usize) -> Self {
        self.max_items = Some(max_items);
        self
    }

    /// Starts every segment. The stream ends after the first error.
    pub fn send(self) -> PageStream {
        let spec = check_segments(self.total_segments)
            .and_then(|_| self.builder.build())
            .and_then(|spec| {
                check_max_items(self.max_items, spec.select())?;
                Ok(spec)
            });
        let spec = match spec {
            Ok(spec) => spec,
            Err(err) => return PageStream::failed(err),
        };
        let client = self.builder.table.client().clone();
        let segments = (0..self.total_segments).map(|segment| {
            Paginator::new(
                client.clone(),
                PageSource::Built(ReadRequest::Scan(
                    spec.with_segment(segment, self.total_segments),
                )),
            )
            .send()
        });
        let merged = stream::select_all(segments);

        let limited = stream::unfold(
            (merged, self.max_items, false),
            |(mut merged, remaining, failed)| async move {
                if failed || remaining == Some(0) {
                    return None;
                }
                match merged.next().await? {
                    Ok(mut page) => {
                        let remaining = remaining.map(|left| {
                            page.truncate(left, None);
                            left - page.items().len()
                        });
                        Some((Ok(page), (merged, remaining, false)))
                    }
                    Err(err) => Some((Err(err), (merged, remaining, true))),
                }
            },
        );
        PageStream::new(limited.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::InMemoryStore;
    use crate::{Client, Config};
    use dynowrap_core::{ScalarType, TableDescriptor};
    use dynowrap_expressions::attr;
    use pretty_assertions::assert_eq;

    fn table() -> Table {
        let descriptor = TableDescriptor::builder("Music")
            .hash_key("artist", ScalarType::String)
            .range_key("song", ScalarType::String)
            .build()
            .unwrap();
        let config = Config::builder()
            .transport(InMemoryStore::new())
            .build()
            .unwrap();
        Client::new(config).table(descriptor)
    }

    #[test]
    fn scans_may_filter_on_keys() {
        let spec = table()
            .scan()
            .filter(attr("artist").begins_with("The"))
            .filter(attr("year").lt(1970))
            .build()
            .unwrap();
        assert_eq!(
            spec.filter_expression(),
            Some("begins_with(#artist, :artist) AND #year < :year")
        );
        assert_eq!(spec.segment(), None);
    }

    #[test]
    fn segments_are_validated() {
        let spec = table().scan().segment(1, 4).build().unwrap();
        assert_eq!(spec.segment(), Some((1, 4)));

        let err = table().scan().segment(4, 4).build().unwrap_err();
        assert!(err.to_string().contains("out of range"));
        let err = table().scan().segment(0, 0).build().unwrap_err();
        assert!(err.to_string().contains("at least 1"));
    }

    #[tokio::test]
    async fn parallel_scan_with_no_segments_fails_once() {
        let mut pages = table().scan().parallel(0).send();
        assert!(matches!(pages.next().await, Some(Err(Error::Configuration(_)))));
        assert!(pages.next().await.is_none());
    }
}
