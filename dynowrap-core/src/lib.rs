/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Core types for dynowrap.
//!
//! - [`Value`] and [`Item`]: records as application code sees them
//! - [`AttributeValue`]: the tagged wire format, with [`encode_item`] / [`decode_item`]
//! - [`Number`]: decimal numbers that never pass through binary floating point
//! - [`TableDescriptor`]: key structure and secondary indexes of a table
//! - [`extract_key`]: derives a primary key from a record or bare key values
//! - [`ValueConvert`] / [`ItemConvert`]: conversions for Rust types
//!
//! # Example
//!
//! ```
//! use dynowrap_core::{encode_item, decode_item, Item, Value};
//!
//! let mut item = Item::new();
//! item.insert("name".to_string(), Value::from("Ada"));
//! item.insert("tags".to_string(), Value::set(["admin", "dev"]));
//!
//! let wire = encode_item(&item).unwrap();
//! assert_eq!(decode_item(wire), item);
//! ```

#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

mod codec;
mod convert;
pub mod error;
mod key;
mod number;
pub mod schema;
mod value;

pub use codec::{decode_item, decode_value, encode_item, encode_value};
pub use convert::{optional, required, ItemConvert, ValueConvert};
pub use error::{ConfigurationError, Error, SerializationError, SerializationErrorKind};
pub use key::{encode_key_value, extract_key, Key, KeyFingerprint, KeyInput};
pub use number::Number;
pub use schema::{
    IndexDescriptor, IndexType, KeyNames, Projection, ScalarType, TableDescriptor,
    TableDescriptorBuilder,
};
pub use value::{AttributeMap, AttributeValue, Blob, Item, Value};
