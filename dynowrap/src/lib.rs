/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! A typed query, scan, pagination and batch engine over the DynamoDB JSON protocol.
//!
//! A [`Client`] sends requests through a pluggable [`Transport`](transport::Transport).
//! [`Client::table`] returns a [`Table`] handle from which every operation starts:
//!
//! - point operations: [`Table::get`], [`Table::put`], [`Table::update`], [`Table::delete`]
//! - reads: [`Table::query`] and [`Table::scan`], sent as single pages or through a
//!   [`Paginator`] that follows cursors and yields a [`PageStream`]
//! - batches: [`Table::batch_get`] and [`Table::batch_write`], chunked to the store's
//!   limits, sent concurrently and retried until every item is processed or the retry
//!   budget runs out
//!
//! Conditions, filters and updates are built with [`attr`] and rendered with
//! placeholders for every name and value.
//!
//! # Example
//!
//! ```no_run
//! use dynowrap::transport::HyperTransport;
//! use dynowrap::{attr, Client, Config, ScalarType, TableDescriptor};
//!
//! # async fn docs() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = HyperTransport::builder()
//!     .endpoint("http://localhost:8000")
//!     .build()?;
//! let client = Client::new(Config::builder().transport(transport).build()?);
//!
//! let scores = TableDescriptor::builder("GameScores")
//!     .hash_key("userId", ScalarType::String)
//!     .range_key("gameTitle", ScalarType::String)
//!     .build()?;
//! let mut items = client
//!     .table(scores)
//!     .query("user-1")
//!     .filter(attr("topScore").gt(1000))
//!     .into_paginator()
//!     .send()
//!     .items();
//! while let Some(item) = items.try_next().await? {
//!     println!("{item:?}");
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

mod batch;
mod client;
mod config;
mod error;
mod page;
mod paginate;
mod protocol;
mod query;
mod read;
mod retry;
mod scan;
mod table;

pub mod transport;

#[cfg(any(test, feature = "test-util"))]
pub mod test_util;

pub use batch::{
    BatchGetBuilder, BatchGetOutput, BatchWriteBuilder, BatchWriteOutput, GetOutcome,
    WriteOutcome, MAX_GET_CHUNK, MAX_WRITE_CHUNK,
};
pub use client::Client;
pub use config::{Builder as ConfigBuilder, Config};
pub use error::{ConfigurationError, Error, ErrorKind, SerializationError, TransportError};
pub use page::{Cursor, Page};
pub use paginate::{ItemStream, PageStream, Paginator, ReadRequest};
pub use protocol::{ConsumedCapacity, ReturnConsumedCapacity, ReturnValues, Select};
pub use query::{QueryBuilder, QuerySpec};
pub use retry::RetryConfig;
pub use scan::{ParallelScan, ScanBuilder, ScanSpec};
pub use table::{DeleteBuilder, GetBuilder, ItemOutput, PutBuilder, Table, UpdateBuilder};

pub use dynowrap_core::{
    AttributeMap, AttributeValue, Blob, IndexDescriptor, IndexType, Item, ItemConvert,
    KeyInput, Number, Projection, ScalarType, TableDescriptor, Value, ValueConvert,
};
pub use dynowrap_expressions::{
    attr, AttributePath, Comparator, Condition, ConditionBuilder, ProjectionExpression,
    UpdateAction, UpdateExpression,
};
