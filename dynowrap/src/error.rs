/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Errors returned by every dynowrap operation.

use std::fmt;

pub use dynowrap_core::{ConfigurationError, SerializationError};

/// Classification of a failed store call, used to decide whether it may be retried.
#[derive(Clone, Copy, Eq, PartialEq, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// A connection level error such as a socket timeout, connect error or TLS failure.
    TransientError,

    /// The store explicitly asked the client to back off, e.g.
    /// `ProvisionedThroughputExceededException`.
    ThrottlingError,

    /// A server error that isn't throttling but may succeed on retry.
    ServerError,

    /// The request itself was rejected. Retrying it unchanged will fail again.
    ClientError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::TransientError => write!(f, "transient error"),
            ErrorKind::ThrottlingError => write!(f, "throttling error"),
            ErrorKind::ServerError => write!(f, "server error"),
            ErrorKind::ClientError => write!(f, "client error"),
        }
    }
}

/// A store call failed, either before a response arrived or with an error response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError {
    kind: ErrorKind,
    code: Option<String>,
    message: String,
    status: Option<u16>,
}

impl TransportError {
    /// Creates an error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: None,
            message: message.into(),
            status: None,
        }
    }

    /// A dispatch failure: no response was received.
    pub fn dispatch(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TransientError, message)
    }

    /// Sets the store's error code, e.g. `ConditionalCheckFailedException`.
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Sets the HTTP status of the error response.
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// The error classification.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The store's error code, if the store returned one.
    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    /// The error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The HTTP status, if a response was received.
    pub fn status(&self) -> Option<u16> {
        self.status
    }

    /// Returns `true` if the same request may succeed when sent again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::TransientError | ErrorKind::ThrottlingError | ErrorKind::ServerError
        )
    }

    /// Returns `true` if a write condition did not hold.
    pub fn is_conditional_check_failed(&self) -> bool {
        self.code() == Some("ConditionalCheckFailedException")
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(code) = &self.code {
            write!(f, " ({code})")?;
        }
        write!(f, ": {}", self.message)
    }
}

impl std::error::Error for TransportError {}

/// Errors returned by dynowrap.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The request was malformed. Never retried.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// A value could not be encoded or decoded. Never retried.
    #[error(transparent)]
    Serialization(#[from] SerializationError),

    /// The store call failed.
    #[error("store call failed: {0}")]
    Transport(#[from] TransportError),

    /// The operation was cancelled before it completed.
    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    /// Returns `true` if the failed request may succeed when sent again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transport(err) if err.is_retryable())
    }

    /// The transport error, if this is one.
    pub fn as_transport(&self) -> Option<&TransportError> {
        match self {
            Error::Transport(err) => Some(err),
            _ => None,
        }
    }

    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        Error::Configuration(ConfigurationError::new(message))
    }
}

impl From<dynowrap_core::Error> for Error {
    fn from(err: dynowrap_core::Error) -> Self {
        match err {
            dynowrap_core::Error::Configuration(err) => Error::Configuration(err),
            dynowrap_core::Error::Serialization(err) => Error::Serialization(err),
        }
    }
}
