/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Auto-continuation over Query and Scan results.
//!
//! A [`PageStream`] is pull based: the next request is only sent once the consumer asks
//! for the next page, and the cursor of each response is threaded into the next request
//! until the store reports no further page. The stream is finite, forward only and
//! cannot be restarted; a failed request ends it with one `Err`.

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::future;
use futures_util::stream::{self, BoxStream, Stream, StreamExt, TryStreamExt};
use pin_project_lite::pin_project;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use dynowrap_core::{Item, ItemConvert};

use crate::client::Client;
use crate::error::Error;
use crate::page::{Cursor, Page};
use crate::protocol::Select;
use crate::query::{QueryBuilder, QuerySpec};
use crate::scan::{ScanBuilder, ScanSpec};

/// A built read request.
#[derive(Debug, Clone)]
pub enum ReadRequest {
    /// A Query.
    Query(QuerySpec),
    /// A Scan, or one segment of a parallel scan.
    Scan(ScanSpec),
}

impl ReadRequest {
    pub(crate) async fn fetch(&self, client: &Client) -> Result<Page, Error> {
        match self {
            ReadRequest::Query(spec) => spec.fetch(client).await,
            ReadRequest::Scan(spec) => spec.fetch(client).await,
        }
    }

    /// The same request starting at `cursor`.
    pub fn with_cursor(&self, cursor: Option<Cursor>) -> Self {
        match self {
            ReadRequest::Query(spec) => ReadRequest::Query(spec.with_cursor(cursor)),
            ReadRequest::Scan(spec) => ReadRequest::Scan(spec.with_cursor(cursor)),
        }
    }

    fn key_attributes(&self) -> &[String] {
        match self {
            ReadRequest::Query(spec) => spec.key_attributes(),
            ReadRequest::Scan(spec) => spec.key_attributes(),
        }
    }

    fn select(&self) -> Option<Select> {
        match self {
            ReadRequest::Query(spec) => spec.select(),
            ReadRequest::Scan(spec) => spec.select(),
        }
    }

    fn cancellation(&self) -> Option<&CancellationToken> {
        match self {
            ReadRequest::Query(spec) => spec.cancellation(),
            ReadRequest::Scan(spec) => spec.cancellation(),
        }
    }

    fn operation(&self) -> &'static str {
        match self {
            ReadRequest::Query(_) => "Query",
            ReadRequest::Scan(_) => "Scan",
        }
    }
}

impl From<QuerySpec> for ReadRequest {
    fn from(spec: QuerySpec) -> Self {
        ReadRequest::Query(spec)
    }
}

impl From<ScanSpec> for ReadRequest {
    fn from(spec: ScanSpec) -> Self {
        ReadRequest::Scan(spec)
    }
}

/// What a [`Paginator`] reads: a builder still to be rendered, or a rendered request.
#[derive(Debug)]
pub(crate) enum PageSource {
    Query(QueryBuilder),
    Scan(ScanBuilder),
    Built(ReadRequest),
}

/// `max_items` counts items, and `Select::Count` pages carry none.
pub(crate) fn check_max_items(max_items: Option<usize>, select: Option<Select>) -> Result<(), Error> {
    if max_items.is_some() && select == Some(Select::Count) {
        return Err(Error::configuration(
            "max_items cannot be combined with Select::Count, whose pages carry no items",
        ));
    }
    Ok(())
}

/// Sends a read request page after page.
///
/// Created with `into_paginator()` on a query or scan builder.
#[derive(Debug)]
pub struct Paginator {
    client: Client,
    source: PageSource,
    max_items: Option<usize>,
}

impl Paginator {
    pub(crate) fn new(client: Client, source: PageSource) -> Self {
        Self {
            client,
            source,
            max_items: None,
        }
    }

    /// Stops once `max_items` items have been returned in total, truncating the final
    /// page. The truncated page's cursor points just after its last item; a projection
    /// is widened to the key attributes so that cursor can be rebuilt.
    ///
    /// Fails with a configuration error under `Select::Count`.
    pub fn max_items(mut self, max_items: usize) -> Self {
        self.max_items = Some(max_items);
        self
    }

    fn build(&self) -> Result<ReadRequest, Error> {
        let truncates = self.max_items.is_some();
        let request = match &self.source {
            PageSource::Query(builder) => ReadRequest::Query(builder.build_with(truncates)?),
            PageSource::Scan(builder) => ReadRequest::Scan(builder.build_with(truncates)?),
            PageSource::Built(request) => request.clone(),
        };
        check_max_items(self.max_items, request.select())?;
        Ok(request)
    }

    /// Starts the stream. No request is sent until the first page is polled.
    pub fn send(self) -> PageStream {
        match self.build() {
            Ok(request) => PageStream::new(page_stream(self.client, request, self.max_items)),
            Err(err) => PageStream::failed(err),
        }
    }
}

struct State {
    client: Client,
    next: Option<ReadRequest>,
    remaining: Option<usize>,
}

fn page_stream(
    client: Client,
    request: ReadRequest,
    max_items: Option<usize>,
) -> BoxStream<'static, Result<Page, Error>> {
    let state = State {
        client,
        next: Some(request),
        remaining: max_items,
    };
    stream::unfold(state, |mut state| async move {
        let request = state.next.take()?;
        if state.remaining == Some(0) {
            return None;
        }
        if request.cancellation().map_or(false, CancellationToken::is_cancelled) {
            debug!(operation = request.operation(), "pagination cancelled");
            return Some((Err(Error::Cancelled), state));
        }
        let mut page = match request.fetch(&state.client).await {
            Ok(page) => page,
            Err(err) => return Some((Err(err), state)),
        };
        debug!(
            operation = request.operation(),
            items = page.items().len(),
            scanned = page.scanned_count(),
            has_more = !page.is_last(),
            "fetched page"
        );
        if let Some(remaining) = state.remaining {
            if page.items().len() >= remaining {
                page.truncate(remaining, Some(request.key_attributes()));
                state.remaining = Some(0);
                return Some((Ok(page), state));
            }
            state.remaining = Some(remaining - page.items().len());
        }
        state.next = page
            .next_cursor()
            .cloned()
            .map(|cursor| request.with_cursor(Some(cursor)));
        Some((Ok(page), state))
    })
    .boxed()
}

pin_project! {
    /// A stream of pages. See the [module docs](self).
    #[must_use = "streams do nothing unless polled"]
    pub struct PageStream {
        #[pin]
        inner: BoxStream<'static, Result<Page, Error>>,
    }
}

impl fmt::Debug for PageStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PageStream")
    }
}

impl PageStream {
    pub(crate) fn new(inner: BoxStream<'static, Result<Page, Error>>) -> Self {
        Self { inner }
    }

    pub(crate) fn failed(err: Error) -> Self {
        Self::new(stream::once(future::ready(Err(err))).boxed())
    }

    /// The next page, or `None` once the stream is exhausted.
    pub async fn next(&mut self) -> Option<Result<Page, Error>> {
        self.inner.next().await
    }

    /// The next page, with the error hoisted out.
    pub async fn try_next(&mut self) -> Result<Option<Page>, Error> {
        self.next().await.transpose()
    }

    /// Reads every page, stopping at the first error.
    pub async fn collect(self) -> Result<Vec<Page>, Error> {
        self.inner.try_collect().await
    }

    /// Flattens the pages into their items.
    pub fn items(self) -> ItemStream<Item> {
        ItemStream::new(
            self.inner
                .map_ok(|page| stream::iter(page.into_items().into_iter().map(Ok::<Item, Error>)))
                .try_flatten()
                .boxed(),
        )
    }

    /// Flattens the pages into their items, converting each into `T`.
    pub fn items_as<T>(self) -> ItemStream<T>
    where
        T: ItemConvert + Send + 'static,
    {
        ItemStream::new(
            self.items()
                .inner
                .and_then(|item| future::ready(T::from_item(item).map_err(Error::from)))
                .boxed(),
        )
    }
}

impl Stream for PageStream {
    type Item = Result<Page, Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.project().inner.poll_next(cx)
    }
}

pin_project! {
    /// A stream of items from consecutive pages.
    #[must_use = "streams do nothing unless polled"]
    pub struct ItemStream<T> {
        #[pin]
        inner: BoxStream<'static, Result<T, Error>>,
    }
}

impl<T> fmt::Debug for ItemStream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ItemStream<{}>", std::any::type_name::<T>())
    }
}

impl<T> ItemStream<T> {
    fn new(inner: BoxStream<'static, Result<T, Error>>) -> Self {
        Self { inner }
    }

    /// The next item, or `None` once every page has been read.
    pub async fn next(&mut self) -> Option<Result<T, Error>> {
        self.inner.next().await
    }

    /// The next item, with the error hoisted out.
    pub async fn try_next(&mut self) -> Result<Option<T>, Error> {
        self.next().await.transpose()
    }

    /// Reads every item, stopping at the first error.
    pub async fn collect(self) -> Result<Vec<T>, Error> {
        self.inner.try_collect().await
    }
}

impl<T> Stream for ItemStream<T> {
    type Item = Result<T, Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.project().inner.poll_next(cx)
    }
}
