/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Error types for serialization and request configuration.

use std::fmt;

/// A request or descriptor is malformed: a missing hash key, an unknown index, a key
/// extracted without a required range key.
///
/// Configuration errors are never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid configuration: {message}")]
pub struct ConfigurationError {
    message: String,
}

impl ConfigurationError {
    /// Creates a configuration error with the given description.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the description of what was misconfigured.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// A value could not be converted to or from the wire format.
#[derive(Debug, Clone, PartialEq)]
pub struct SerializationError {
    kind: SerializationErrorKind,
    path: Option<String>,
}

/// The kind of serialization error that occurred.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum SerializationErrorKind {
    /// A set mixed element types, e.g. strings and numbers.
    MixedSet {
        /// The element type of the first member.
        expected: &'static str,
        /// The element type of the offending member.
        actual: &'static str,
    },
    /// Sets must contain at least one member.
    EmptySet,
    /// A set contained the same member twice.
    DuplicateSetMember,
    /// Sets may only hold strings, numbers or binary values.
    UnsupportedSetMember(&'static str),
    /// A number was not a valid decimal literal or exceeds the store's precision.
    InvalidNumber(String),
    /// The value had an unexpected type.
    InvalidType {
        /// The expected type.
        expected: &'static str,
        /// The type that was found.
        actual: &'static str,
    },
    /// A required attribute was missing from the item.
    MissingAttribute,
    /// The value could not be represented for another reason.
    InvalidValue(String),
}

impl SerializationError {
    /// Creates an error without an attribute path.
    pub fn new(kind: SerializationErrorKind) -> Self {
        Self { kind, path: None }
    }

    /// Creates an error for a value of the wrong type.
    pub fn invalid_type(expected: &'static str, actual: &'static str) -> Self {
        Self::new(SerializationErrorKind::InvalidType { expected, actual })
    }

    /// Creates an error for a missing attribute.
    pub fn missing_attribute(name: impl Into<String>) -> Self {
        Self::new(SerializationErrorKind::MissingAttribute).at(name)
    }

    /// Creates an error for a value that is invalid for a reason other than its type.
    pub fn invalid_value(message: impl Into<String>) -> Self {
        Self::new(SerializationErrorKind::InvalidValue(message.into()))
    }

    /// Records the attribute path where the error occurred.
    ///
    /// Called while unwinding out of nested values, so an existing path is treated as
    /// relative to `segment`.
    pub fn at(mut self, segment: impl Into<String>) -> Self {
        let segment = segment.into();
        self.path = Some(match self.path.take() {
            None => segment,
            Some(rest) if rest.starts_with('[') => format!("{segment}{rest}"),
            Some(rest) => format!("{segment}.{rest}"),
        });
        self
    }

    /// Records a list or set position as the innermost known path segment.
    pub fn at_index(mut self, index: usize) -> Self {
        self.path = Some(match self.path.take() {
            None => format!("[{index}]"),
            Some(rest) if rest.starts_with('[') => format!("[{index}]{rest}"),
            Some(rest) => format!("[{index}].{rest}"),
        });
        self
    }

    /// Returns the kind of error.
    pub fn kind(&self) -> &SerializationErrorKind {
        &self.kind
    }

    /// Returns the attribute path, if known.
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }
}

impl fmt::Display for SerializationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SerializationErrorKind::MixedSet { expected, actual } => write!(
                f,
                "set members must share one type: expected {expected}, got {actual}"
            ),
            SerializationErrorKind::EmptySet => write!(f, "sets cannot be empty"),
            SerializationErrorKind::DuplicateSetMember => write!(f, "set contains duplicate members"),
            SerializationErrorKind::UnsupportedSetMember(actual) => {
                write!(f, "sets cannot contain {actual} values")
            }
            SerializationErrorKind::InvalidNumber(reason) => write!(f, "invalid number: {reason}"),
            SerializationErrorKind::InvalidType { expected, actual } => {
                write!(f, "invalid type: expected {expected}, got {actual}")
            }
            SerializationErrorKind::MissingAttribute => write!(f, "missing required attribute"),
            SerializationErrorKind::InvalidValue(message) => write!(f, "invalid value: {message}"),
        }
    }
}

impl fmt::Display for SerializationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(f, "{} at '{}'", self.kind, path),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl std::error::Error for SerializationError {}

/// Either kind of error the core crate can produce.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// See [`ConfigurationError`].
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    /// See [`SerializationError`].
    #[error(transparent)]
    Serialization(#[from] SerializationError),
}
