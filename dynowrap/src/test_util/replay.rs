/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use std::ops::Deref;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::TransportError;
use crate::transport::{Transport, TransportFuture, WireRequest, WireResponse};

type Conversation = Vec<(WireRequest, WireResponse)>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A request the transport received, next to the one the test expected.
#[derive(Debug, Clone)]
pub struct ValidateRequest {
    /// The request the test scripted.
    pub expected: WireRequest,
    /// The request the client sent.
    pub actual: WireRequest,
}

impl ValidateRequest {
    /// Panics unless both requests target the same operation with equivalent JSON bodies.
    ///
    /// Bodies are compared as JSON values, so key order and whitespace do not matter.
    pub fn assert_matches(&self) {
        let (actual, expected) = (&self.actual, &self.expected);
        assert_eq!(actual.operation(), expected.operation(), "operation mismatch");
        let parsed = (
            serde_json::from_slice::<serde_json::Value>(actual.body()),
            serde_json::from_slice::<serde_json::Value>(expected.body()),
        );
        match parsed {
            (Ok(actual), Ok(expected)) => assert_eq!(actual, expected, "body mismatch"),
            _ => assert_eq!(actual.body(), expected.body(), "body mismatch"),
        }
    }
}

/// A transport that answers with a scripted series of responses.
///
/// Each call pops the next `(expected request, response)` pair and records the
/// request it actually received. Once the script runs out, calls fail with a
/// dispatch error.
#[derive(Clone, Debug)]
pub struct ReplayTransport {
    data: Arc<Mutex<Conversation>>,
    requests: Arc<Mutex<Vec<ValidateRequest>>>,
}

impl ReplayTransport {
    /// Creates a transport that replays `data` in order.
    pub fn new(mut data: Conversation) -> Self {
        data.reverse();
        ReplayTransport {
            data: Arc::new(Mutex::new(data)),
            requests: Default::default(),
        }
    }

    /// The requests received so far.
    pub fn requests(&self) -> impl Deref<Target = Vec<ValidateRequest>> + '_ {
        lock(&self.requests)
    }

    /// Number of scripted responses not yet used.
    pub fn remaining(&self) -> usize {
        lock(&self.data).len()
    }

    /// Checks every received request against its scripted counterpart.
    pub fn assert_requests_match(&self) {
        for request in self.requests().iter() {
            request.assert_matches();
        }
    }
}

impl Transport for ReplayTransport {
    fn call(&self, actual: WireRequest) -> TransportFuture {
        let next = lock(&self.data).pop();
        match next {
            Some((expected, response)) => {
                lock(&self.requests).push(ValidateRequest { expected, actual });
                TransportFuture::ready(Ok(response))
            }
            None => TransportFuture::ready(Err(TransportError::dispatch("no more scripted responses"))),
        }
    }
}

/// Wraps a transport and records every exchange it carries.
///
/// The recorded conversation can seed a [`ReplayTransport`].
#[derive(Clone, Debug)]
pub struct RecordingTransport<T> {
    inner: T,
    data: Arc<Mutex<Conversation>>,
}

impl<T> RecordingTransport<T> {
    /// Records calls made through `inner`.
    pub fn new(inner: T) -> Self {
        RecordingTransport {
            inner,
            data: Default::default(),
        }
    }

    /// The exchanges recorded so far. Failed calls are not recorded.
    pub fn conversation(&self) -> Conversation {
        lock(&self.data).clone()
    }
}

impl<T: Transport> Transport for RecordingTransport<T> {
    fn call(&self, request: WireRequest) -> TransportFuture {
        let response = self.inner.call(request.clone());
        let data = self.data.clone();
        TransportFuture::new(async move {
            let response = response.await?;
            lock(&data).push((request, response.clone()));
            Ok(response)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Operation;

    fn get(body: &'static str) -> WireRequest {
        WireRequest::new(Operation::GetItem, body)
    }

    #[tokio::test]
    async fn replays_in_order_then_runs_dry() {
        let replay = ReplayTransport::new(vec![
            (get(r#"{"TableName":"a"}"#), WireResponse::ok("{}")),
            (get(r#"{"TableName":"b"}"#), WireResponse::new(400, "{}")),
        ]);
        assert_eq!(replay.call(get(r#"{ "TableName": "a" }"#)).await.unwrap().status(), 200);
        assert_eq!(replay.call(get(r#"{"TableName":"b"}"#)).await.unwrap().status(), 400);
        let err = replay.call(get("{}")).await.unwrap_err();
        assert!(err.message().contains("no more scripted responses"));
        assert_eq!(replay.requests().len(), 2);
        replay.assert_requests_match();
    }

    #[tokio::test]
    #[should_panic(expected = "body mismatch")]
    async fn mismatched_bodies_panic() {
        let replay = ReplayTransport::new(vec![(get(r#"{"TableName":"a"}"#), WireResponse::ok("{}"))]);
        replay.call(get(r#"{"TableName":"z"}"#)).await.unwrap();
        replay.assert_requests_match();
    }

    #[tokio::test]
    async fn recordings_replay() {
        let upstream = ReplayTransport::new(vec![(get(r#"{"TableName":"a"}"#), WireResponse::ok(r#"{"Item":{}}"#))]);
        let recorder = RecordingTransport::new(upstream);
        recorder.call(get(r#"{"TableName":"a"}"#)).await.unwrap();

        let replay = ReplayTransport::new(recorder.conversation());
        let response = replay.call(get(r#"{"TableName":"a"}"#)).await.unwrap();
        assert_eq!(response.body().as_ref(), br#"{"Item":{}}"#);
        assert_eq!(replay.remaining(), 0);
        replay.assert_requests_match();
    }
}
