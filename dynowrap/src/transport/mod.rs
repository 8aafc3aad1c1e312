/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! The seam between the engine and the network.
//!
//! A [`Transport`] delivers one JSON request body for one [`Operation`] and returns the
//! raw response. Error responses are returned as [`WireResponse`]s with their status;
//! the engine classifies them. A `TransportError` is only produced when no response
//! arrived at all.

use std::fmt::{self, Debug, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;

use crate::error::TransportError;

mod connector;

pub use self::connector::{HyperTransport, HyperTransportBuilder, SharedSigner, SignRequest};

/// Protocol version prefix of the `X-Amz-Target` header.
pub const TARGET_PREFIX: &str = "DynamoDB_20120810";

/// Content type of every request.
pub const CONTENT_TYPE: &str = "application/x-amz-json-1.0";

/// The store operations this crate issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Operation {
    /// Read one item by key.
    GetItem,
    /// Create or replace one item.
    PutItem,
    /// Modify attributes of one item.
    UpdateItem,
    /// Delete one item by key.
    DeleteItem,
    /// Read items sharing a hash key.
    Query,
    /// Read every item of a table or index.
    Scan,
    /// Read up to 100 items by key.
    BatchGetItem,
    /// Put or delete up to 25 items.
    BatchWriteItem,
}

impl Operation {
    /// The operation name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::GetItem => "GetItem",
            Operation::PutItem => "PutItem",
            Operation::UpdateItem => "UpdateItem",
            Operation::DeleteItem => "DeleteItem",
            Operation::Query => "Query",
            Operation::Scan => "Scan",
            Operation::BatchGetItem => "BatchGetItem",
            Operation::BatchWriteItem => "BatchWriteItem",
        }
    }

    /// The `X-Amz-Target` header value.
    pub fn target(&self) -> String {
        format!("{TARGET_PREFIX}.{}", self.as_str())
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One serialized request.
#[derive(Debug, Clone, PartialEq)]
pub struct WireRequest {
    operation: Operation,
    body: Bytes,
}

impl WireRequest {
    /// Creates a request for `operation` with a JSON body.
    pub fn new(operation: Operation, body: impl Into<Bytes>) -> Self {
        Self {
            operation,
            body: body.into(),
        }
    }

    /// The operation.
    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// The JSON body.
    pub fn body(&self) -> &Bytes {
        &self.body
    }
}

/// A raw response: HTTP status and body.
#[derive(Debug, Clone, PartialEq)]
pub struct WireResponse {
    status: u16,
    body: Bytes,
}

impl WireResponse {
    /// Creates a response.
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// A `200 OK` response.
    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self::new(200, body)
    }

    /// The HTTP status.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// The body.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Returns `true` for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends requests to the store.
pub trait Transport: Debug + Send + Sync {
    /// Sends `request`, resolving to the raw response.
    fn call(&self, request: WireRequest) -> TransportFuture;
}

impl<T> Transport for Arc<T>
where
    T: Transport + ?Sized,
{
    fn call(&self, request: WireRequest) -> TransportFuture {
        T::call(self, request)
    }
}

/// Future returned by [`Transport::call`].
#[must_use]
pub struct TransportFuture(
    Pin<Box<dyn Future<Output = Result<WireResponse, TransportError>> + Send + 'static>>,
);

impl Debug for TransportFuture {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "TransportFuture")
    }
}

impl TransportFuture {
    /// Boxes `future`.
    pub fn new(
        future: impl Future<Output = Result<WireResponse, TransportError>> + Send + 'static,
    ) -> Self {
        Self(Box::pin(future))
    }

    /// A future that is immediately ready.
    pub fn ready(result: Result<WireResponse, TransportError>) -> Self {
        Self::new(std::future::ready(result))
    }
}

impl Future for TransportFuture {
    type Output = Result<WireResponse, TransportError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.0.as_mut().poll(cx)
    }
}

/// A transport shared by every call made through a client.
#[derive(Clone, Debug)]
pub struct SharedTransport(Arc<dyn Transport>);

impl SharedTransport {
    /// Wraps `transport`.
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self(Arc::new(transport))
    }
}

impl From<Arc<dyn Transport>> for SharedTransport {
    fn from(transport: Arc<dyn Transport>) -> Self {
        Self(transport)
    }
}

impl Transport for SharedTransport {
    fn call(&self, request: WireRequest) -> TransportFuture {
        self.0.call(request)
    }
}
