/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use std::cmp::Ordering;
use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use dynowrap_core::{
    decode_item, encode_item, AttributeMap, Item, KeyFingerprint, KeyNames, Projection,
    TableDescriptor,
};

use super::expr::{
    apply_update, compare, evaluate, parse_condition, parse_projection, parse_update, project,
    Bindings, Cond, Seg, UpdateOp,
};
use crate::error::{Error, TransportError};
use crate::protocol::{
    BatchGetItemInput, BatchGetItemOutput, BatchWriteItemInput, BatchWriteItemOutput,
    ConsumedCapacity, DeleteItemInput, ErrorBody, ExpressionAttributes, GetItemInput,
    GetItemOutput, KeysAndAttributes, PutItemInput, QueryInput, ReadPageOutput,
    ReturnConsumedCapacity, ReturnValues, ScanInput, Select, UpdateItemInput, WriteItemOutput,
    WriteRequest,
};
use crate::transport::{Operation, Transport, TransportFuture, WireRequest, WireResponse};

type UnprocessedPolicy = Arc<dyn Fn(&AttributeMap, u32) -> bool + Send + Sync>;

/// An in-process store that speaks the JSON protocol.
///
/// Tables must be registered with [`with_table`](Self::with_table) before use. Query
/// and Scan return items in key order, and `LastEvaluatedKey` is set whenever `Limit`
/// items were evaluated, even if none remain, so a read can end on an empty page. Scan
/// segments are assigned by hashing the primary key.
///
/// Clones share state, so a clone kept by a test observes the calls a client makes.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    state: Mutex<State>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

#[derive(Default)]
struct State {
    tables: HashMap<String, TableState>,
    failures: VecDeque<(Operation, WireResponse)>,
    requests: Vec<WireRequest>,
    latency: Option<Duration>,
    unprocessed: Option<UnprocessedPolicy>,
    seen: HashMap<(String, KeyFingerprint), u32>,
}

impl fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("InMemoryStore")
            .field("tables", &state.tables.keys().collect::<Vec<_>>())
            .field("requests", &state.requests.len())
            .finish()
    }
}

impl InMemoryStore {
    /// An empty store with no tables.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a table. Registering a name twice drops the earlier table's items.
    pub fn with_table(self, descriptor: &TableDescriptor) -> Self {
        self.state().tables.insert(
            descriptor.name().to_string(),
            TableState {
                descriptor: descriptor.clone(),
                items: Vec::new(),
            },
        );
        self
    }

    /// Delays every response by `latency`.
    pub fn with_latency(self, latency: Duration) -> Self {
        self.state().latency = Some(latency);
        self
    }

    /// Decides which batch items the store reports back as unprocessed.
    ///
    /// `policy` receives the item's primary key and how many earlier batch calls
    /// already carried that key.
    pub fn with_unprocessed<F>(self, policy: F) -> Self
    where
        F: Fn(&AttributeMap, u32) -> bool + Send + Sync + 'static,
    {
        self.state().unprocessed = Some(Arc::new(policy));
        self
    }

    /// Makes the next call of `operation` fail with the given status and error code.
    pub fn fail_next(&self, operation: Operation, status: u16, code: &str, message: &str) {
        let body = serde_json::to_vec(&ErrorBody::new(code, message)).unwrap_or_default();
        self.state()
            .failures
            .push_back((operation, WireResponse::new(status, body)));
    }

    /// Stores `item`, replacing any item with the same key.
    pub fn insert(&self, table: &str, item: &Item) -> Result<(), Error> {
        let wire = encode_item(item)?;
        let mut state = self.state();
        let table = state
            .tables
            .get_mut(table)
            .ok_or_else(|| Error::configuration(format!("table '{table}' is not registered")))?;
        let fingerprint = KeyFingerprint::of_wire_item(table.descriptor.key_names(), &wire)?;
        table.upsert(fingerprint, wire);
        Ok(())
    }

    /// Snapshot of a table's items in key order.
    pub fn items(&self, table: &str) -> Vec<Item> {
        let state = self.state();
        let Some(table) = state.tables.get(table) else {
            return Vec::new();
        };
        let attrs = table.sort_attributes(table.descriptor.key_names());
        let mut items: Vec<_> = table.items.iter().collect();
        items.sort_by(|a, b| compare_keys(a, b, &attrs));
        items.into_iter().cloned().map(decode_item).collect()
    }

    /// Every request received so far, in arrival order.
    pub fn requests(&self) -> Vec<WireRequest> {
        self.state().requests.clone()
    }

    /// Number of requests received for `operation`.
    pub fn call_count(&self, operation: Operation) -> usize {
        self.state()
            .requests
            .iter()
            .filter(|request| request.operation() == operation)
            .count()
    }

    /// Highest number of requests that were being served at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.inner.max_in_flight.load(AtomicOrdering::SeqCst)
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn handle(self, request: WireRequest) -> Result<WireResponse, TransportError> {
        let latency = self.state().latency;
        let _guard = InFlight::enter(&self.inner);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        Ok(self.state().respond(request))
    }
}

impl Transport for InMemoryStore {
    fn call(&self, request: WireRequest) -> TransportFuture {
        TransportFuture::new(self.clone().handle(request))
    }
}

struct InFlight<'a>(&'a Inner);

impl<'a> InFlight<'a> {
    fn enter(inner: &'a Inner) -> Self {
        let now = inner.in_flight.fetch_add(1, AtomicOrdering::SeqCst) + 1;
        inner.max_in_flight.fetch_max(now, AtomicOrdering::SeqCst);
        InFlight(inner)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, AtomicOrdering::SeqCst);
    }
}

/// An error response.
#[derive(Debug)]
struct Fault {
    status: u16,
    code: &'static str,
    message: String,
}

impl Fault {
    fn validation(message: impl Into<String>) -> Self {
        Fault {
            status: 400,
            code: "ValidationException",
            message: message.into(),
        }
    }

    fn condition_failed() -> Self {
        Fault {
            status: 400,
            code: "ConditionalCheckFailedException",
            message: "The conditional request failed".to_string(),
        }
    }

    fn not_found() -> Self {
        Fault {
            status: 400,
            code: "ResourceNotFoundException",
            message: "Requested resource not found".to_string(),
        }
    }

    fn into_response(self) -> WireResponse {
        let body = serde_json::to_vec(&ErrorBody::new(self.code, self.message)).unwrap_or_default();
        WireResponse::new(self.status, body)
    }
}

fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, Fault> {
    serde_json::from_slice(body).map_err(|err| Fault::validation(format!("malformed request: {err}")))
}

fn encode<T: Serialize>(output: &T) -> Result<Bytes, Fault> {
    serde_json::to_vec(output).map(Bytes::from).map_err(|err| Fault {
        status: 500,
        code: "InternalServerError",
        message: err.to_string(),
    })
}

fn bindings(attributes: &ExpressionAttributes) -> Bindings<'_> {
    Bindings {
        names: attributes.expression_attribute_names.as_ref(),
        values: attributes.expression_attribute_values.as_ref(),
    }
}

fn capacity(table: &str, mode: Option<ReturnConsumedCapacity>, units: f64) -> Option<ConsumedCapacity> {
    match mode {
        Some(ReturnConsumedCapacity::Total | ReturnConsumedCapacity::Indexes) => Some(ConsumedCapacity {
            table_name: Some(table.to_string()),
            capacity_units: Some(units),
            ..Default::default()
        }),
        _ => None,
    }
}

fn check_condition(
    expression: Option<&str>,
    attributes: &ExpressionAttributes,
    existing: Option<&AttributeMap>,
) -> Result<(), Fault> {
    let Some(expression) = expression else {
        return Ok(());
    };
    let cond = parse_condition(expression, bindings(attributes)).map_err(Fault::validation)?;
    let empty = AttributeMap::new();
    if evaluate(existing.unwrap_or(&empty), &cond).map_err(Fault::validation)? {
        Ok(())
    } else {
        Err(Fault::condition_failed())
    }
}

fn pick(item: &AttributeMap, names: &[String]) -> AttributeMap {
    names
        .iter()
        .filter_map(|name| item.get(name).map(|value| (name.clone(), value.clone())))
        .collect()
}

/// Orders two records by the listed attributes. A missing attribute sorts first.
fn compare_keys(a: &AttributeMap, b: &AttributeMap, attrs: &[String]) -> Ordering {
    for attr in attrs {
        let ord = match (a.get(attr), b.get(attr)) {
            (Some(x), Some(y)) => compare(x, y).unwrap_or(Ordering::Equal),
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

struct TableState {
    descriptor: TableDescriptor,
    items: Vec<AttributeMap>,
}

struct ReadArgs<'a> {
    index_name: Option<&'a str>,
    key_condition: Option<Cond>,
    filter: Option<Cond>,
    projection: Option<Vec<Vec<Seg>>>,
    limit: Option<u32>,
    forward: bool,
    select: Option<Select>,
    exclusive_start_key: Option<&'a AttributeMap>,
    segment: Option<(u32, u32)>,
}

impl TableState {
    fn key_names(&self) -> KeyNames<'_> {
        self.descriptor.key_names()
    }

    fn key_attributes(&self) -> Vec<String> {
        let names = self.key_names();
        std::iter::once(names.hash_key)
            .chain(names.range_key)
            .map(str::to_string)
            .collect()
    }

    /// Target index keys first, then the table keys, without repeats.
    fn sort_attributes(&self, target: KeyNames<'_>) -> Vec<String> {
        let table = self.key_names();
        let mut attrs: Vec<String> = Vec::new();
        for name in [
            Some(target.hash_key),
            target.range_key,
            Some(table.hash_key),
            table.range_key,
        ]
        .into_iter()
        .flatten()
        {
            if !attrs.iter().any(|attr| attr == name) {
                attrs.push(name.to_string());
            }
        }
        attrs
    }

    fn fingerprint(&self, item: &AttributeMap) -> Result<KeyFingerprint, Fault> {
        KeyFingerprint::of_wire_item(self.key_names(), item)
            .map_err(|_| Fault::validation("The provided key element does not match the schema"))
    }

    fn check_key(&self, key: &AttributeMap) -> Result<KeyFingerprint, Fault> {
        if key.len() != self.key_attributes().len() {
            return Err(Fault::validation("The provided key element does not match the schema"));
        }
        self.fingerprint(key)
    }

    fn position(&self, fingerprint: &KeyFingerprint) -> Option<usize> {
        self.items
            .iter()
            .position(|item| self.fingerprint(item).ok().as_ref() == Some(fingerprint))
    }

    fn upsert(&mut self, fingerprint: KeyFingerprint, item: AttributeMap) -> Option<AttributeMap> {
        match self.position(&fingerprint) {
            Some(index) => Some(std::mem::replace(&mut self.items[index], item)),
            None => {
                self.items.push(item);
                None
            }
        }
    }

    fn remove(&mut self, fingerprint: &KeyFingerprint) -> Option<AttributeMap> {
        self.position(fingerprint).map(|index| self.items.remove(index))
    }

    fn segment_of(&self, item: &AttributeMap, total: u32) -> u32 {
        let mut hasher = DefaultHasher::new();
        if let Ok(fingerprint) = self.fingerprint(item) {
            fingerprint.hash(&mut hasher);
        }
        (hasher.finish() % u64::from(total)) as u32
    }

    fn read(&self, args: ReadArgs<'_>) -> Result<(Vec<AttributeMap>, usize, usize, Option<AttributeMap>), Fault> {
        let (target, index_projection) = match args.index_name {
            None => (self.key_names(), Projection::All),
            Some(name) => {
                let index = self.descriptor.index(name).ok_or_else(|| {
                    Fault::validation(format!("The table does not have the specified index: {name}"))
                })?;
                (
                    KeyNames {
                        hash_key: index.hash_key(),
                        range_key: index.range_key(),
                    },
                    index.projection().clone(),
                )
            }
        };
        let attrs = self.sort_attributes(target);
        if let Some((segment, total)) = args.segment {
            if total == 0 || segment >= total {
                return Err(Fault::validation("Segment must be less than TotalSegments"));
            }
        }

        let mut candidates = Vec::new();
        for item in &self.items {
            // items without the index key are absent from the index
            if !attrs.iter().all(|attr| item.contains_key(attr)) {
                continue;
            }
            if let Some((segment, total)) = args.segment {
                if self.segment_of(item, total) != segment {
                    continue;
                }
            }
            if let Some(cond) = &args.key_condition {
                if !evaluate(item, cond).map_err(Fault::validation)? {
                    continue;
                }
            }
            candidates.push(item);
        }
        candidates.sort_by(|a, b| compare_keys(a, b, &attrs));
        if !args.forward {
            candidates.reverse();
        }

        let start = match args.exclusive_start_key {
            None => 0,
            Some(start_key) => candidates
                .iter()
                .position(|item| {
                    let ord = compare_keys(item, start_key, &attrs);
                    if args.forward {
                        ord == Ordering::Greater
                    } else {
                        ord == Ordering::Less
                    }
                })
                .unwrap_or(candidates.len()),
        };
        let remaining = &candidates[start..];
        let limit = args.limit.map_or(usize::MAX, |limit| limit as usize);
        let evaluated = &remaining[..remaining.len().min(limit)];
        let last_evaluated_key = if evaluated.len() == limit || evaluated.len() < remaining.len() {
            evaluated.last().map(|item| pick(item, &attrs))
        } else {
            None
        };

        let mut matched = Vec::new();
        for item in evaluated {
            let keep = match &args.filter {
                Some(cond) => evaluate(item, cond).map_err(Fault::validation)?,
                None => true,
            };
            if keep {
                matched.push(*item);
            }
        }
        let count = matched.len();
        let items = if args.select == Some(Select::Count) {
            Vec::new()
        } else {
            matched
                .into_iter()
                .map(|item| match (&args.projection, &index_projection) {
                    (Some(paths), _) => project(item, paths),
                    (None, Projection::All) => item.clone(),
                    (None, Projection::KeysOnly) => pick(item, &attrs),
                    (None, Projection::Include(extra)) => {
                        let mut names = attrs.clone();
                        names.extend(extra.iter().cloned());
                        pick(item, &names)
                    }
                })
                .collect()
        };
        Ok((items, count, evaluated.len(), last_evaluated_key))
    }
}

impl State {
    fn respond(&mut self, request: WireRequest) -> WireResponse {
        let operation = request.operation();
        let body = request.body().clone();
        self.requests.push(request);
        if let Some(position) = self.failures.iter().position(|(op, _)| *op == operation) {
            if let Some((_, response)) = self.failures.remove(position) {
                return response;
            }
        }
        let result = match operation {
            Operation::GetItem => decode(&body).and_then(|input| self.get_item(input)).and_then(|out| encode(&out)),
            Operation::PutItem => decode(&body).and_then(|input| self.put_item(input)).and_then(|out| encode(&out)),
            Operation::UpdateItem => decode(&body).and_then(|input| self.update_item(input)).and_then(|out| encode(&out)),
            Operation::DeleteItem => decode(&body).and_then(|input| self.delete_item(input)).and_then(|out| encode(&out)),
            Operation::Query => decode(&body).and_then(|input| self.query(input)).and_then(|out| encode(&out)),
            Operation::Scan => decode(&body).and_then(|input| self.scan(input)).and_then(|out| encode(&out)),
            Operation::BatchGetItem => decode(&body).and_then(|input| self.batch_get(input)).and_then(|out| encode(&out)),
            Operation::BatchWriteItem => decode(&body).and_then(|input| self.batch_write(input)).and_then(|out| encode(&out)),
        };
        match result {
            Ok(body) => WireResponse::ok(body),
            Err(fault) => fault.into_response(),
        }
    }

    fn table(&self, name: &str) -> Result<&TableState, Fault> {
        self.tables.get(name).ok_or_else(Fault::not_found)
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut TableState, Fault> {
        self.tables.get_mut(name).ok_or_else(Fault::not_found)
    }

    fn get_item(&mut self, input: GetItemInput) -> Result<GetItemOutput, Fault> {
        let table = self.table(&input.table_name)?;
        let fingerprint = table.check_key(&input.key)?;
        let item = table.position(&fingerprint).map(|index| &table.items[index]);
        let item = match (item, &input.projection_expression) {
            (Some(item), Some(projection)) => {
                let paths = parse_projection(projection, Bindings {
                    names: input.expression_attribute_names.as_ref(),
                    values: None,
                })
                .map_err(Fault::validation)?;
                Some(project(item, &paths))
            }
            (item, _) => item.cloned(),
        };
        Ok(GetItemOutput {
            item,
            consumed_capacity: capacity(&input.table_name, input.return_consumed_capacity, 1.0),
        })
    }

    fn put_item(&mut self, input: PutItemInput) -> Result<WriteItemOutput, Fault> {
        let table = self.table_mut(&input.table_name)?;
        let fingerprint = table.fingerprint(&input.item)?;
        let existing = table.position(&fingerprint).map(|index| &table.items[index]);
        check_condition(input.condition_expression.as_deref(), &input.expression_attributes, existing)?;
        let old = table.upsert(fingerprint, input.item);
        Ok(WriteItemOutput {
            attributes: old_values(input.return_values, old)?,
            consumed_capacity: capacity(&input.table_name, input.return_consumed_capacity, 1.0),
        })
    }

    fn delete_item(&mut self, input: DeleteItemInput) -> Result<WriteItemOutput, Fault> {
        let table = self.table_mut(&input.table_name)?;
        let fingerprint = table.check_key(&input.key)?;
        let existing = table.position(&fingerprint).map(|index| &table.items[index]);
        check_condition(input.condition_expression.as_deref(), &input.expression_attributes, existing)?;
        let old = table.remove(&fingerprint);
        Ok(WriteItemOutput {
            attributes: old_values(input.return_values, old)?,
            consumed_capacity: capacity(&input.table_name, input.return_consumed_capacity, 1.0),
        })
    }

    fn update_item(&mut self, input: UpdateItemInput) -> Result<WriteItemOutput, Fault> {
        let table = self.table_mut(&input.table_name)?;
        let fingerprint = table.check_key(&input.key)?;
        let ops = parse_update(&input.update_expression, bindings(&input.expression_attributes))
            .map_err(Fault::validation)?;
        let keys = table.key_attributes();
        for op in &ops {
            let path = match op {
                UpdateOp::Set(path, _) | UpdateOp::Remove(path) | UpdateOp::Add(path, _) | UpdateOp::Delete(path, _) => path,
            };
            if let Some(Seg::Key(root)) = path.first() {
                if keys.contains(root) {
                    return Err(Fault::validation(format!(
                        "Cannot update attribute {root}. This attribute is part of the key"
                    )));
                }
            }
        }
        let position = table.position(&fingerprint);
        let old = position.map(|index| table.items[index].clone());
        check_condition(input.condition_expression.as_deref(), &input.expression_attributes, old.as_ref())?;
        let mut new = old.clone().unwrap_or_else(|| input.key.clone());
        let touched = apply_update(&mut new, &ops).map_err(Fault::validation)?;
        match position {
            Some(index) => table.items[index] = new.clone(),
            None => table.items.push(new.clone()),
        }
        let attributes = match input.return_values {
            None | Some(ReturnValues::None) => None,
            Some(ReturnValues::AllOld) => old,
            Some(ReturnValues::AllNew) => Some(new),
            Some(ReturnValues::UpdatedOld) => old.map(|old| pick(&old, &touched)),
            Some(ReturnValues::UpdatedNew) => Some(pick(&new, &touched)),
        };
        Ok(WriteItemOutput {
            attributes,
            consumed_capacity: capacity(&input.table_name, input.return_consumed_capacity, 1.0),
        })
    }

    fn query(&mut self, input: QueryInput) -> Result<ReadPageOutput, Fault> {
        let table = self.table(&input.table_name)?;
        let bindings = bindings(&input.expression_attributes);
        let key_condition = parse_condition(&input.key_condition_expression, bindings).map_err(Fault::validation)?;
        let args = ReadArgs {
            index_name: input.index_name.as_deref(),
            key_condition: Some(key_condition),
            filter: parse_optional_condition(input.filter_expression.as_deref(), bindings)?,
            projection: parse_optional_projection(input.projection_expression.as_deref(), bindings)?,
            limit: input.limit,
            forward: input.scan_index_forward.unwrap_or(true),
            select: input.select,
            exclusive_start_key: input.exclusive_start_key.as_ref(),
            segment: None,
        };
        let (items, count, scanned_count, last_evaluated_key) = table.read(args)?;
        Ok(ReadPageOutput {
            items,
            count,
            scanned_count,
            last_evaluated_key,
            consumed_capacity: capacity(&input.table_name, input.return_consumed_capacity, scanned_count.max(1) as f64 / 2.0),
        })
    }

    fn scan(&mut self, input: ScanInput) -> Result<ReadPageOutput, Fault> {
        let table = self.table(&input.table_name)?;
        let bindings = bindings(&input.expression_attributes);
        let segment = match (input.segment, input.total_segments) {
            (Some(segment), Some(total)) => Some((segment, total)),
            (None, None) => None,
            _ => return Err(Fault::validation("Segment and TotalSegments must be given together")),
        };
        let args = ReadArgs {
            index_name: input.index_name.as_deref(),
            key_condition: None,
            filter: parse_optional_condition(input.filter_expression.as_deref(), bindings)?,
            projection: parse_optional_projection(input.projection_expression.as_deref(), bindings)?,
            limit: input.limit,
            forward: true,
            select: input.select,
            exclusive_start_key: input.exclusive_start_key.as_ref(),
            segment,
        };
        let (items, count, scanned_count, last_evaluated_key) = table.read(args)?;
        Ok(ReadPageOutput {
            items,
            count,
            scanned_count,
            last_evaluated_key,
            consumed_capacity: capacity(&input.table_name, input.return_consumed_capacity, scanned_count.max(1) as f64 / 2.0),
        })
    }

    fn batch_get(&mut self, input: BatchGetItemInput) -> Result<BatchGetItemOutput, Fault> {
        let total: usize = input.request_items.values().map(|request| request.keys.len()).sum();
        if total > 100 {
            return Err(Fault::validation("Too many items requested for the BatchGetItem call"));
        }
        let State {
            tables,
            unprocessed,
            seen,
            ..
        } = self;
        let mut output = BatchGetItemOutput::default();
        for (table_name, request) in input.request_items {
            let table = tables.get(&table_name).ok_or_else(Fault::not_found)?;
            let paths = parse_optional_projection(request.projection_expression.as_deref(), Bindings {
                names: request.expression_attribute_names.as_ref(),
                values: None,
            })?;
            let mut fingerprints = HashSet::new();
            let mut found = Vec::new();
            let mut skipped = Vec::new();
            for key in &request.keys {
                let fingerprint = table.check_key(key)?;
                if !fingerprints.insert(fingerprint.clone()) {
                    return Err(Fault::validation("Provided list of item keys contains duplicates"));
                }
                if is_unprocessed(unprocessed, seen, &table_name, fingerprint.clone(), key) {
                    skipped.push(key.clone());
                    continue;
                }
                if let Some(index) = table.position(&fingerprint) {
                    let item = &table.items[index];
                    found.push(match &paths {
                        Some(paths) => project(item, paths),
                        None => item.clone(),
                    });
                }
            }
            if let Some(consumed) = capacity(&table_name, input.return_consumed_capacity, found.len() as f64) {
                output.consumed_capacity.push(consumed);
            }
            output.responses.insert(table_name.clone(), found);
            if !skipped.is_empty() {
                output.unprocessed_keys.insert(
                    table_name,
                    KeysAndAttributes {
                        keys: skipped,
                        ..request
                    },
                );
            }
        }
        Ok(output)
    }

    fn batch_write(&mut self, input: BatchWriteItemInput) -> Result<BatchWriteItemOutput, Fault> {
        let total: usize = input.request_items.values().map(Vec::len).sum();
        if total > 25 {
            return Err(Fault::validation(
                "Too many items requested for the BatchWriteItem call",
            ));
        }
        let State {
            tables,
            unprocessed,
            seen,
            ..
        } = self;
        let mut output = BatchWriteItemOutput::default();
        for (table_name, requests) in input.request_items {
            let table = tables.get_mut(&table_name).ok_or_else(Fault::not_found)?;
            let mut planned = Vec::with_capacity(requests.len());
            let mut fingerprints = HashSet::new();
            for request in &requests {
                let fingerprint = match (&request.put_request, &request.delete_request) {
                    (Some(put), None) => table.fingerprint(&put.item)?,
                    (None, Some(delete)) => table.check_key(&delete.key)?,
                    _ => {
                        return Err(Fault::validation(
                            "Each write request needs exactly one of PutRequest or DeleteRequest",
                        ))
                    }
                };
                if !fingerprints.insert(fingerprint.clone()) {
                    return Err(Fault::validation("Provided list of item keys contains duplicates"));
                }
                planned.push(fingerprint);
            }

            let key_attributes = table.key_attributes();
            let mut skipped: Vec<WriteRequest> = Vec::new();
            let mut written = 0usize;
            for (request, fingerprint) in requests.into_iter().zip(planned) {
                let key = match (&request.put_request, &request.delete_request) {
                    (Some(put), _) => pick(&put.item, &key_attributes),
                    (_, Some(delete)) => delete.key.clone(),
                    _ => continue,
                };
                if is_unprocessed(unprocessed, seen, &table_name, fingerprint.clone(), &key) {
                    skipped.push(request);
                    continue;
                }
                written += 1;
                match (request.put_request, request.delete_request) {
                    (Some(put), _) => {
                        table.upsert(fingerprint, put.item);
                    }
                    (_, Some(_)) => {
                        table.remove(&fingerprint);
                    }
                    _ => {}
                }
            }
            if let Some(consumed) = capacity(&table_name, input.return_consumed_capacity, written as f64) {
                output.consumed_capacity.push(consumed);
            }
            if !skipped.is_empty() {
                output.unprocessed_items.insert(table_name, skipped);
            }
        }
        Ok(output)
    }
}

fn is_unprocessed(
    policy: &Option<UnprocessedPolicy>,
    seen: &mut HashMap<(String, KeyFingerprint), u32>,
    table: &str,
    fingerprint: KeyFingerprint,
    key: &AttributeMap,
) -> bool {
    let count = seen.entry((table.to_string(), fingerprint)).or_insert(0);
    let earlier = *count;
    *count += 1;
    policy.as_ref().map_or(false, |policy| policy(key, earlier))
}

fn old_values(mode: Option<ReturnValues>, old: Option<AttributeMap>) -> Result<Option<AttributeMap>, Fault> {
    match mode {
        None | Some(ReturnValues::None) => Ok(None),
        Some(ReturnValues::AllOld) => Ok(old),
        Some(other) => Err(Fault::validation(format!(
            "Return values set to invalid value: {other:?}"
        ))),
    }
}

fn parse_optional_condition(expression: Option<&str>, bindings: Bindings<'_>) -> Result<Option<Cond>, Fault> {
    expression
        .map(|expression| parse_condition(expression, bindings).map_err(Fault::validation))
        .transpose()
}

fn parse_optional_projection(
    expression: Option<&str>,
    bindings: Bindings<'_>,
) -> Result<Option<Vec<Vec<Seg>>>, Fault> {
    expression
        .map(|expression| parse_projection(expression, bindings).map_err(Fault::validation))
        .transpose()
}
