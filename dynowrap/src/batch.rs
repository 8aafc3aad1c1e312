/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Batch reads and writes of any size.
//!
//! The store accepts at most 100 keys per BatchGetItem and 25 operations per
//! BatchWriteItem. Larger batches are split, in input order, into chunks of that size.
//! Chunks are sent concurrently up to a configurable bound. Whatever a chunk response
//! reports as unprocessed is resent after an exponential, jittered delay until the
//! [`RetryConfig`] attempt ceiling is reached. The call never aborts on partial failure:
//! every input position gets an outcome, in input order.
//!
//! A transport error stops further chunks from being dispatched and, once the chunks
//! already in flight have finished, is returned as the result of the whole call.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures_util::stream::{FuturesUnordered, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use dynowrap_core::{
    decode_item, encode_item, extract_key, AttributeMap, ConfigurationError, Item, ItemConvert,
    KeyFingerprint, KeyInput, TableDescriptor,
};
use dynowrap_expressions::{AttributePath, ExpressionContext, ProjectionExpression};

use crate::client::Client;
use crate::error::{Error, ErrorKind, TransportError};
use crate::protocol::{
    BatchGetItemInput, BatchGetItemOutput, BatchWriteItemInput, BatchWriteItemOutput,
    ConsumedCapacity, DeleteRequest, KeysAndAttributes, PutRequest, ReturnConsumedCapacity,
    WriteRequest,
};
use crate::retry::RetryConfig;
use crate::table::Table;
use crate::transport::Operation;

/// Most keys one BatchGetItem call may carry.
pub const MAX_GET_CHUNK: usize = 100;

/// Most operations one BatchWriteItem call may carry.
pub const MAX_WRITE_CHUNK: usize = 25;

/// What happened to one key of a batch get.
#[derive(Debug, Clone, PartialEq)]
pub enum GetOutcome {
    /// The item exists.
    Found(Item),
    /// The store has no item with this key.
    NotFound,
    /// The store still reported the key as unprocessed after every attempt.
    Unprocessed {
        /// Attempts made for the key's chunk.
        attempts: u32,
    },
    /// The call was cancelled before the key was read.
    Cancelled,
}

impl GetOutcome {
    /// The item, if it was found.
    pub fn item(&self) -> Option<&Item> {
        match self {
            GetOutcome::Found(item) => Some(item),
            _ => None,
        }
    }

    /// Returns `true` if the key was read, whether or not an item exists.
    pub fn is_processed(&self) -> bool {
        matches!(self, GetOutcome::Found(_) | GetOutcome::NotFound)
    }
}

/// Result of a batch get: one outcome per requested key, in request order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BatchGetOutput {
    outcomes: Vec<GetOutcome>,
    consumed_capacity: Vec<ConsumedCapacity>,
}

impl BatchGetOutput {
    /// Outcomes in request order.
    pub fn outcomes(&self) -> &[GetOutcome] {
        &self.outcomes
    }

    /// Consumes the output, returning the outcomes.
    pub fn into_outcomes(self) -> Vec<GetOutcome> {
        self.outcomes
    }

    /// The item for each requested key, `None` where none was returned.
    pub fn items(&self) -> Vec<Option<&Item>> {
        self.outcomes.iter().map(GetOutcome::item).collect()
    }

    /// Converts every found item into `T`.
    pub fn items_as<T: ItemConvert>(&self) -> Result<Vec<Option<T>>, Error> {
        self.outcomes
            .iter()
            .map(|outcome| {
                outcome
                    .item()
                    .cloned()
                    .map(T::from_item)
                    .transpose()
                    .map_err(Error::from)
            })
            .collect()
    }

    /// Returns `true` if every key was read.
    pub fn is_complete(&self) -> bool {
        self.outcomes.iter().all(GetOutcome::is_processed)
    }

    /// Capacity reported by every call, when it was requested.
    pub fn consumed_capacity(&self) -> &[ConsumedCapacity] {
        &self.consumed_capacity
    }
}

/// What happened to one operation of a batch write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The write was applied.
    Succeeded,
    /// The store still reported the operation as unprocessed after every attempt.
    Unprocessed {
        /// Attempts made for the operation's chunk.
        attempts: u32,
    },
    /// The call was cancelled before the operation was sent.
    Cancelled,
}

impl WriteOutcome {
    /// Returns `true` if the write was applied.
    pub fn is_succeeded(&self) -> bool {
        matches!(self, WriteOutcome::Succeeded)
    }
}

/// Result of a batch write: one outcome per operation, in the order they were added.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BatchWriteOutput {
    outcomes: Vec<WriteOutcome>,
    consumed_capacity: Vec<ConsumedCapacity>,
}

impl BatchWriteOutput {
    /// Outcomes in operation order.
    pub fn outcomes(&self) -> &[WriteOutcome] {
        &self.outcomes
    }

    /// Positions of the operations that were not applied.
    pub fn failed_positions(&self) -> Vec<usize> {
        self.outcomes
            .iter()
            .enumerate()
            .filter(|(_, outcome)| !outcome.is_succeeded())
            .map(|(position, _)| position)
            .collect()
    }

    /// Returns `true` if every operation was applied.
    pub fn is_complete(&self) -> bool {
        self.outcomes.iter().all(WriteOutcome::is_succeeded)
    }

    /// Capacity reported by every call, when it was requested.
    pub fn consumed_capacity(&self) -> &[ConsumedCapacity] {
        &self.consumed_capacity
    }
}

/// Builds a batch get. Created with [`Table::batch_get`].
#[derive(Debug, Clone)]
#[must_use]
pub struct BatchGetBuilder {
    table: Table,
    keys: Vec<KeyInput>,
    consistent_read: Option<bool>,
    attributes: Vec<AttributePath>,
    return_consumed_capacity: Option<ReturnConsumedCapacity>,
    concurrency: Option<usize>,
    cancellation: Option<CancellationToken>,
}

impl BatchGetBuilder {
    pub(crate) fn new(table: Table, keys: Vec<KeyInput>) -> Self {
        Self {
            table,
            keys,
            consistent_read: None,
            attributes: Vec::new(),
            return_consumed_capacity: None,
            concurrency: None,
            cancellation: None,
        }
    }

    /// Requests strongly consistent reads.
    pub fn consistent_read(mut self, consistent_read: bool) -> Self {
        self.consistent_read = Some(consistent_read);
        self
    }

    /// Returns only the listed attributes, plus the key attributes.
    pub fn attributes<I, P>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<AttributePath>,
    {
        self.attributes.extend(attributes.into_iter().map(Into::into));
        self
    }

    /// Asks the store to report consumed capacity.
    pub fn return_consumed_capacity(mut self, mode: ReturnConsumedCapacity) -> Self {
        self.return_consumed_capacity = Some(mode);
        self
    }

    /// Overrides the client's batch concurrency for this call.
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = Some(concurrency);
        self
    }

    /// Stops dispatching chunks and retries once `token` is cancelled.
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Reads every key.
    pub async fn send(self) -> Result<BatchGetOutput, Error> {
        let descriptor = self.table.descriptor_arc();
        let concurrency = resolve_concurrency(self.concurrency, self.table.client())?;

        // duplicate keys are read once and fanned back out
        let mut slots = Vec::with_capacity(self.keys.len());
        let mut unique: Vec<KeyEntry> = Vec::new();
        let mut seen: HashMap<KeyFingerprint, usize> = HashMap::new();
        for input in &self.keys {
            let key = extract_key(&descriptor, input)?;
            let fingerprint = key.fingerprint();
            let slot = *seen.entry(fingerprint.clone()).or_insert_with(|| {
                unique.push(KeyEntry {
                    slot: unique.len(),
                    fingerprint,
                    key: key.to_map(),
                });
                unique.len() - 1
            });
            slots.push(slot);
        }
        if unique.is_empty() {
            return Ok(BatchGetOutput::default());
        }

        let (projection_expression, expression_attribute_names) = if self.attributes.is_empty() {
            (None, None)
        } else {
            let mut projection = ProjectionExpression::new(self.attributes.iter().cloned());
            projection.include(descriptor.hash_key());
            if let Some(range_key) = descriptor.range_key() {
                projection.include(range_key);
            }
            let mut ctx = ExpressionContext::new();
            let rendered = projection.render(&mut ctx);
            (Some(rendered), ctx.into_parts().0)
        };
        let template = Arc::new(GetTemplate {
            table: descriptor.clone(),
            consistent_read: self.consistent_read,
            projection_expression,
            expression_attribute_names,
            return_consumed_capacity: self.return_consumed_capacity,
        });

        let unique_count = unique.len();
        let chunks = into_chunks(unique, MAX_GET_CHUNK);
        debug!(
            table = descriptor.name(),
            keys = self.keys.len(),
            unique = unique_count,
            chunks = chunks.len(),
            "starting batch get"
        );
        let client = self.table.client().clone();
        let retry = *client.config().retry_config();
        let cancellation = self.cancellation.clone();
        let dispatched = dispatch(chunks, concurrency, cancellation.as_ref(), |index, chunk| {
            let client = client.clone();
            let template = template.clone();
            send_with_retries(index, retry, cancellation.clone(), chunk, move |pending| {
                get_once(client.clone(), template.clone(), pending)
            })
        })
        .await?;

        let mut outcomes = vec![GetOutcome::NotFound; unique_count];
        let mut consumed_capacity = Vec::new();
        for run in dispatched.finished {
            for output in run.outputs {
                for (slot, item) in output.found {
                    outcomes[slot] = GetOutcome::Found(item);
                }
                consumed_capacity.extend(output.consumed_capacity);
            }
            for entry in run.unprocessed {
                outcomes[entry.slot] = GetOutcome::Unprocessed {
                    attempts: run.attempts,
                };
            }
            for entry in run.cancelled {
                outcomes[entry.slot] = GetOutcome::Cancelled;
            }
        }
        for entry in dispatched.undispatched.into_iter().flatten() {
            outcomes[entry.slot] = GetOutcome::Cancelled;
        }

        Ok(BatchGetOutput {
            outcomes: slots.into_iter().map(|slot| outcomes[slot].clone()).collect(),
            consumed_capacity,
        })
    }
}

#[derive(Debug, Clone)]
enum WriteOperation {
    Put(Item),
    Delete(KeyInput),
}

/// Builds a batch write. Created with [`Table::batch_write`].
#[derive(Debug, Clone)]
#[must_use]
pub struct BatchWriteBuilder {
    table: Table,
    operations: Vec<WriteOperation>,
    return_consumed_capacity: Option<ReturnConsumedCapacity>,
    concurrency: Option<usize>,
    cancellation: Option<CancellationToken>,
}

impl BatchWriteBuilder {
    pub(crate) fn new(table: Table) -> Self {
        Self {
            table,
            operations: Vec::new(),
            return_consumed_capacity: None,
            concurrency: None,
            cancellation: None,
        }
    }

    /// Adds a put of `item`, replacing any item with the same key.
    pub fn put(mut self, item: Item) -> Self {
        self.operations.push(WriteOperation::Put(item));
        self
    }

    /// Adds a put of every item.
    pub fn put_all(mut self, items: impl IntoIterator<Item = Item>) -> Self {
        self.operations
            .extend(items.into_iter().map(WriteOperation::Put));
        self
    }

    /// Adds a delete of the item with `key`.
    pub fn delete(mut self, key: impl Into<KeyInput>) -> Self {
        self.operations.push(WriteOperation::Delete(key.into()));
        self
    }

    /// Asks the store to report consumed capacity.
    pub fn return_consumed_capacity(mut self, mode: ReturnConsumedCapacity) -> Self {
        self.return_consumed_capacity = Some(mode);
        self
    }

    /// Overrides the client's batch concurrency for this call.
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = Some(concurrency);
        self
    }

    /// Stops dispatching chunks and retries once `token` is cancelled.
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Applies every operation.
    ///
    /// Two operations on the same key are rejected with a configuration error before
    /// anything is sent.
    pub async fn send(self) -> Result<BatchWriteOutput, Error> {
        let descriptor = self.table.descriptor_arc();
        let concurrency = resolve_concurrency(self.concurrency, self.table.client())?;

        let mut entries = Vec::with_capacity(self.operations.len());
        let mut seen: HashMap<KeyFingerprint, usize> = HashMap::new();
        for (slot, operation) in self.operations.iter().enumerate() {
            let (key, request) = match operation {
                WriteOperation::Put(item) => {
                    let key = extract_key(&descriptor, &KeyInput::Item(item.clone()))?;
                    let request = WriteRequest {
                        put_request: Some(PutRequest {
                            item: encode_item(item)?,
                        }),
                        delete_request: None,
                    };
                    (key, request)
                }
                WriteOperation::Delete(input) => {
                    let key = extract_key(&descriptor, input)?;
                    let request = WriteRequest {
                        put_request: None,
                        delete_request: Some(DeleteRequest { key: key.to_map() }),
                    };
                    (key, request)
                }
            };
            let fingerprint = key.fingerprint();
            if let Some(first) = seen.insert(fingerprint.clone(), slot) {
                return Err(Error::configuration(format!(
                    "operations {first} and {slot} of the batch write target the same key"
                )));
            }
            entries.push(WriteEntry {
                slot,
                fingerprint,
                request,
            });
        }
        if entries.is_empty() {
            return Ok(BatchWriteOutput::default());
        }

        let template = Arc::new(WriteTemplate {
            table: descriptor.clone(),
            return_consumed_capacity: self.return_consumed_capacity,
        });
        let total = entries.len();
        let chunks = into_chunks(entries, MAX_WRITE_CHUNK);
        debug!(
            table = descriptor.name(),
            operations = total,
            chunks = chunks.len(),
            "starting batch write"
        );
        let client = self.table.client().clone();
        let retry = *client.config().retry_config();
        let cancellation = self.cancellation.clone();
        let dispatched = dispatch(chunks, concurrency, cancellation.as_ref(), |index, chunk| {
            let client = client.clone();
            let template = template.clone();
            send_with_retries(index, retry, cancellation.clone(), chunk, move |pending| {
                write_once(client.clone(), template.clone(), pending)
            })
        })
        .await?;

        let mut outcomes = vec![WriteOutcome::Succeeded; total];
        let mut consumed_capacity = Vec::new();
        for run in dispatched.finished {
            for output in run.outputs {
                consumed_capacity.extend(output);
            }
            for entry in run.unprocessed {
                outcomes[entry.slot] = WriteOutcome::Unprocessed {
                    attempts: run.attempts,
                };
            }
            for entry in run.cancelled {
                outcomes[entry.slot] = WriteOutcome::Cancelled;
            }
        }
        for entry in dispatched.undispatched.into_iter().flatten() {
            outcomes[entry.slot] = WriteOutcome::Cancelled;
        }
        Ok(BatchWriteOutput {
            outcomes,
            consumed_capacity,
        })
    }
}

fn resolve_concurrency(requested: Option<usize>, client: &Client) -> Result<usize, Error> {
    match requested {
        Some(0) => Err(Error::configuration("batch concurrency must be at least 1")),
        Some(concurrency) => Ok(concurrency),
        None => Ok(client.config().batch_concurrency()),
    }
}

fn is_cancelled(token: Option<&CancellationToken>) -> bool {
    token.map_or(false, CancellationToken::is_cancelled)
}

/// Splits `entries` into consecutive chunks of at most `size`.
fn into_chunks<T>(entries: Vec<T>, size: usize) -> Vec<Vec<T>> {
    let mut chunks = Vec::with_capacity((entries.len() + size - 1) / size);
    let mut current = Vec::with_capacity(size.min(entries.len()));
    for entry in entries {
        current.push(entry);
        if current.len() == size {
            chunks.push(std::mem::replace(&mut current, Vec::with_capacity(size)));
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[derive(Debug, Clone)]
struct KeyEntry {
    slot: usize,
    fingerprint: KeyFingerprint,
    key: AttributeMap,
}

#[derive(Debug, Clone)]
struct WriteEntry {
    slot: usize,
    fingerprint: KeyFingerprint,
    request: WriteRequest,
}

#[derive(Debug)]
struct GetTemplate {
    table: Arc<TableDescriptor>,
    consistent_read: Option<bool>,
    projection_expression: Option<String>,
    expression_attribute_names: Option<HashMap<String, String>>,
    return_consumed_capacity: Option<ReturnConsumedCapacity>,
}

#[derive(Debug)]
struct WriteTemplate {
    table: Arc<TableDescriptor>,
    return_consumed_capacity: Option<ReturnConsumedCapacity>,
}

#[derive(Debug)]
struct GetChunkOutput {
    found: Vec<(usize, Item)>,
    consumed_capacity: Vec<ConsumedCapacity>,
}

fn unexpected_response(err: ConfigurationError) -> Error {
    TransportError::new(
        ErrorKind::ClientError,
        format!("unexpected batch response: {}", err.message()),
    )
    .into()
}

/// One BatchGetItem call. Returns the found items and the entries still unprocessed.
async fn get_once(
    client: Client,
    template: Arc<GetTemplate>,
    pending: Vec<KeyEntry>,
) -> Result<(GetChunkOutput, Vec<KeyEntry>), Error> {
    let table_name = template.table.name();
    let mut request_items = HashMap::with_capacity(1);
    request_items.insert(
        table_name.to_string(),
        KeysAndAttributes {
            keys: pending.iter().map(|entry| entry.key.clone()).collect(),
            consistent_read: template.consistent_read,
            projection_expression: template.projection_expression.clone(),
            expression_attribute_names: template.expression_attribute_names.clone(),
        },
    );
    let input = BatchGetItemInput {
        request_items,
        return_consumed_capacity: template.return_consumed_capacity,
    };
    let mut output: BatchGetItemOutput = client
        .call(Operation::BatchGetItem, table_name, &input)
        .await?;

    let keys = template.table.key_names();
    let mut by_fingerprint: HashMap<KeyFingerprint, KeyEntry> = pending
        .into_iter()
        .map(|entry| (entry.fingerprint.clone(), entry))
        .collect();
    let mut found = Vec::new();
    for item in output.responses.remove(table_name).unwrap_or_default() {
        let fingerprint = KeyFingerprint::of_wire_item(keys, &item).map_err(unexpected_response)?;
        if let Some(entry) = by_fingerprint.get(&fingerprint) {
            found.push((entry.slot, decode_item(item)));
        }
    }
    let mut unprocessed = Vec::new();
    if let Some(leftover) = output.unprocessed_keys.remove(table_name) {
        for key in &leftover.keys {
            let fingerprint = KeyFingerprint::of_wire_item(keys, key).map_err(unexpected_response)?;
            if let Some(entry) = by_fingerprint.remove(&fingerprint) {
                unprocessed.push(entry);
            }
        }
    }
    Ok((
        GetChunkOutput {
            found,
            consumed_capacity: output.consumed_capacity,
        },
        unprocessed,
    ))
}

/// One BatchWriteItem call. Returns the consumed capacity and the entries still
/// unprocessed.
async fn write_once(
    client: Client,
    template: Arc<WriteTemplate>,
    pending: Vec<WriteEntry>,
) -> Result<(Vec<ConsumedCapacity>, Vec<WriteEntry>), Error> {
    let table_name = template.table.name();
    let mut request_items = HashMap::with_capacity(1);
    request_items.insert(
        table_name.to_string(),
        pending.iter().map(|entry| entry.request.clone()).collect(),
    );
    let input = BatchWriteItemInput {
        request_items,
        return_consumed_capacity: template.return_consumed_capacity,
    };
    let mut output: BatchWriteItemOutput = client
        .call(Operation::BatchWriteItem, table_name, &input)
        .await?;

    let keys = template.table.key_names();
    let mut by_fingerprint: HashMap<KeyFingerprint, WriteEntry> = pending
        .into_iter()
        .map(|entry| (entry.fingerprint.clone(), entry))
        .collect();
    let mut unprocessed = Vec::new();
    for request in output.unprocessed_items.remove(table_name).unwrap_or_default() {
        let key = match (&request.put_request, &request.delete_request) {
            (Some(put), _) => &put.item,
            (None, Some(delete)) => &delete.key,
            (None, None) => continue,
        };
        let fingerprint = KeyFingerprint::of_wire_item(keys, key).map_err(unexpected_response)?;
        if let Some(entry) = by_fingerprint.remove(&fingerprint) {
            unprocessed.push(entry);
        }
    }
    Ok((output.consumed_capacity, unprocessed))
}

/// Result of one chunk, including its retries.
#[derive(Debug)]
struct ChunkRun<T, O> {
    outputs: Vec<O>,
    unprocessed: Vec<T>,
    cancelled: Vec<T>,
    attempts: u32,
}

/// Sends `pending` until nothing is left unprocessed, the attempt ceiling is reached or
/// `cancellation` fires.
async fn send_with_retries<T, O, F, Fut>(
    chunk: usize,
    retry: RetryConfig,
    cancellation: Option<CancellationToken>,
    mut pending: Vec<T>,
    mut send: F,
) -> Result<ChunkRun<T, O>, Error>
where
    F: FnMut(Vec<T>) -> Fut,
    Fut: Future<Output = Result<(O, Vec<T>), Error>>,
{
    let mut outputs = Vec::new();
    let mut attempts = 0;
    loop {
        if is_cancelled(cancellation.as_ref()) {
            debug!(chunk, attempts, "batch chunk cancelled");
            return Ok(ChunkRun {
                outputs,
                unprocessed: Vec::new(),
                cancelled: pending,
                attempts,
            });
        }
        attempts += 1;
        let (output, unprocessed) = send(pending).await?;
        outputs.push(output);
        if unprocessed.is_empty() {
            return Ok(ChunkRun {
                outputs,
                unprocessed,
                cancelled: Vec::new(),
                attempts,
            });
        }
        if attempts >= retry.max_attempts() {
            warn!(
                chunk,
                attempts,
                unprocessed = unprocessed.len(),
                "batch retries exhausted; reporting items as unprocessed"
            );
            return Ok(ChunkRun {
                outputs,
                unprocessed,
                cancelled: Vec::new(),
                attempts,
            });
        }
        let delay = retry.backoff(attempts - 1);
        debug!(
            chunk,
            attempt = attempts,
            unprocessed = unprocessed.len(),
            delay = ?delay,
            "retrying unprocessed batch items"
        );
        pending = unprocessed;
        match &cancellation {
            Some(token) => {
                tokio::select! {
                    _ = token.cancelled() => {}
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            None => tokio::time::sleep(delay).await,
        }
    }
}

struct Dispatched<C, R> {
    finished: Vec<R>,
    undispatched: Vec<C>,
}

/// Runs `run` on every chunk with at most `concurrency` in flight.
///
/// After an error or cancellation no further chunks are started; chunks already in
/// flight run to completion.
async fn dispatch<C, R, F, Fut>(
    chunks: Vec<C>,
    concurrency: usize,
    cancellation: Option<&CancellationToken>,
    mut run: F,
) -> Result<Dispatched<C, R>, Error>
where
    F: FnMut(usize, C) -> Fut,
    Fut: Future<Output = Result<R, Error>>,
{
    let total = chunks.len();
    let mut queued = chunks.into_iter().enumerate();
    let mut in_flight = FuturesUnordered::new();
    let mut finished = Vec::with_capacity(total);
    let mut first_error = None;
    let mut stopped = false;
    loop {
        while !stopped && in_flight.len() < concurrency {
            if is_cancelled(cancellation) {
                debug!("batch cancelled; no further chunks are dispatched");
                stopped = true;
                break;
            }
            match queued.next() {
                Some((index, chunk)) => {
                    debug!(chunk = index, total, "dispatching batch chunk");
                    in_flight.push(run(index, chunk));
                }
                None => break,
            }
        }
        match in_flight.next().await {
            Some(Ok(result)) => finished.push(result),
            Some(Err(err)) => {
                stopped = true;
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
            None => break,
        }
    }
    match first_error {
        Some(err) => Err(err),
        None => Ok(Dispatched {
            finished,
            undispatched: queued.map(|(_, chunk)| chunk).collect(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn chunks_preserve_order_and_respect_the_ceiling() {
        let chunks = into_chunks((0..151).collect(), MAX_GET_CHUNK);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 100);
        assert_eq!(chunks[1].len(), 51);
        assert_eq!(chunks[1][0], 100);

        let chunks = into_chunks((0..50).collect::<Vec<u32>>(), MAX_WRITE_CHUNK);
        assert_eq!(chunks.iter().map(Vec::len).collect::<Vec<_>>(), [25, 25]);
        assert!(into_chunks(Vec::<u8>::new(), MAX_WRITE_CHUNK).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_nothing_is_left() {
        let retry = RetryConfig::standard()
            .with_initial_backoff(Duration::from_secs(1))
            .with_static_base(|| 1.0);
        let start = tokio::time::Instant::now();
        // each attempt processes the first item only
        let run = send_with_retries(0, retry, None, vec![1, 2, 3], |mut pending: Vec<u32>| {
            let done = pending.remove(0);
            async move { Ok((done, pending)) }
        })
        .await
        .unwrap();
        assert_eq!(run.outputs, [1, 2, 3]);
        assert_eq!(run.attempts, 3);
        assert!(run.unprocessed.is_empty());
        // 1s before the second attempt, 2s before the third
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_at_the_attempt_ceiling() {
        let retry = RetryConfig::standard().with_max_attempts(3);
        let run = send_with_retries(0, retry, None, vec![7], |pending: Vec<u32>| async move {
            Ok(((), pending))
        })
        .await
        .unwrap();
        assert_eq!(run.attempts, 3);
        assert_eq!(run.unprocessed, [7]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_the_backoff() {
        let token = CancellationToken::new();
        let retry = RetryConfig::standard()
            .with_initial_backoff(Duration::from_secs(60))
            .with_static_base(|| 1.0);
        let trigger = token.clone();
        let run = send_with_retries(0, retry, Some(token), vec![1, 2], move |pending: Vec<u32>| {
            trigger.cancel();
            async move { Ok(((), pending)) }
        })
        .await
        .unwrap();
        assert_eq!(run.attempts, 1);
        assert_eq!(run.cancelled, [1, 2]);
    }

    #[tokio::test]
    async fn dispatch_stops_after_the_first_error() {
        let mut started = Vec::new();
        let result = dispatch(vec![0, 1, 2, 3], 1, None, |index, chunk: u32| {
            started.push(index);
            async move {
                if chunk == 1 {
                    Err(Error::configuration("boom"))
                } else {
                    Ok(chunk)
                }
            }
        })
        .await;
        assert!(matches!(result, Err(Error::Configuration(_))));
        assert_eq!(started, [0, 1]);
    }
}
