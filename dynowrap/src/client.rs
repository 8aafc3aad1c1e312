/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug_span, trace, Instrument};

use dynowrap_core::TableDescriptor;

use crate::config::Config;
use crate::error::{Error, ErrorKind, TransportError};
use crate::protocol::parse_error_response;
use crate::table::Table;
use crate::transport::{Operation, Transport, WireRequest};

/// Entry point: sends requests through the configured transport.
///
/// Cloning a client is cheap; clones share the configuration.
#[derive(Clone, Debug)]
pub struct Client {
    config: Arc<Config>,
}

impl Client {
    /// Creates a client.
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// The client configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// A handle for one table.
    pub fn table(&self, descriptor: impl Into<Arc<TableDescriptor>>) -> Table {
        Table::new(self.clone(), descriptor.into())
    }

    /// Serializes `input`, sends it and deserializes the output.
    ///
    /// Error responses are classified into a [`TransportError`].
    pub(crate) async fn call<I, O>(&self, operation: Operation, table: &str, input: &I) -> Result<O, Error>
    where
        I: Serialize,
        O: DeserializeOwned,
    {
        let span = debug_span!("dynowrap", operation = %operation, table = %table);
        async move {
            let body = serde_json::to_vec(input).map_err(|err| {
                TransportError::new(
                    ErrorKind::ClientError,
                    format!("failed to serialize request: {err}"),
                )
            })?;
            trace!(len = body.len(), "sending request");
            let response = self
                .config
                .transport()
                .call(WireRequest::new(operation, body))
                .await?;
            if !response.is_success() {
                let err = parse_error_response(&response);
                trace!(error = %err, "received error response");
                return Err(err.into());
            }
            serde_json::from_slice(response.body()).map_err(|err| {
                TransportError::new(
                    ErrorKind::ClientError,
                    format!("failed to parse response: {err}"),
                )
                .with_status(response.status())
                .into()
            })
        }
        .instrument(span)
        .await
    }
}
