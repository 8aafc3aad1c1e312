/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Client configuration.

use crate::error::ConfigurationError;
use crate::retry::RetryConfig;
use crate::transport::{SharedTransport, Transport};

const DEFAULT_BATCH_CONCURRENCY: usize = 4;

/// Configuration shared by every call made through a [`Client`](crate::Client).
#[derive(Clone, Debug)]
pub struct Config {
    transport: SharedTransport,
    retry_config: RetryConfig,
    batch_concurrency: usize,
}

impl Config {
    /// Starts building a configuration.
    ///
    /// # Examples
    /// ```no_run
    /// use dynowrap::{Config, RetryConfig};
    /// use dynowrap::transport::HyperTransport;
    ///
    /// let transport = HyperTransport::builder()
    ///     .endpoint("http://localhost:8000")
    ///     .build()
    ///     .unwrap();
    /// let config = Config::builder()
    ///     .transport(transport)
    ///     .retry_config(RetryConfig::standard().with_max_attempts(3))
    ///     .batch_concurrency(8)
    ///     .build()
    ///     .unwrap();
    /// ```
    pub fn builder() -> Builder {
        Builder::default()
    }

    /// The transport requests are sent through.
    pub fn transport(&self) -> &SharedTransport {
        &self.transport
    }

    /// Retry behavior for batch chunks.
    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry_config
    }

    /// The maximum number of batch chunks in flight at once.
    pub fn batch_concurrency(&self) -> usize {
        self.batch_concurrency
    }
}

/// Builder for [`Config`].
#[derive(Clone, Debug, Default)]
pub struct Builder {
    transport: Option<SharedTransport>,
    retry_config: Option<RetryConfig>,
    batch_concurrency: Option<usize>,
}

impl Builder {
    /// Sets the transport. Required.
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.set_transport(Some(SharedTransport::new(transport)));
        self
    }

    /// Sets the transport. Required.
    pub fn set_transport(&mut self, transport: Option<SharedTransport>) -> &mut Self {
        self.transport = transport;
        self
    }

    /// Sets the retry behavior for batch chunks. Defaults to [`RetryConfig::standard`].
    pub fn retry_config(mut self, retry_config: RetryConfig) -> Self {
        self.set_retry_config(Some(retry_config));
        self
    }

    /// Sets the retry behavior for batch chunks.
    pub fn set_retry_config(&mut self, retry_config: Option<RetryConfig>) -> &mut Self {
        self.retry_config = retry_config;
        self
    }

    /// Sets how many batch chunks may be in flight at once. Defaults to 4.
    pub fn batch_concurrency(mut self, batch_concurrency: usize) -> Self {
        self.set_batch_concurrency(Some(batch_concurrency));
        self
    }

    /// Sets how many batch chunks may be in flight at once.
    pub fn set_batch_concurrency(&mut self, batch_concurrency: Option<usize>) -> &mut Self {
        self.batch_concurrency = batch_concurrency;
        self
    }

    /// Builds the configuration.
    ///
    /// Fails if no transport was set or the batch concurrency is zero.
    pub fn build(self) -> Result<Config, ConfigurationError> {
        let transport = self
            .transport
            .ok_or_else(|| ConfigurationError::new("a transport is required"))?;
        let batch_concurrency = self.batch_concurrency.unwrap_or(DEFAULT_BATCH_CONCURRENCY);
        if batch_concurrency == 0 {
            return Err(ConfigurationError::new(
                "batch concurrency must be at least 1",
            ));
        }
        Ok(Config {
            transport,
            retry_config: self.retry_config.unwrap_or_default(),
            batch_concurrency,
        })
    }
}
