/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Primary key extraction.

use crate::codec::encode_value;
use crate::error::{ConfigurationError, Error, SerializationError};
use crate::number::Number;
use crate::schema::{KeyNames, TableDescriptor};
use crate::value::{AttributeMap, AttributeValue, Blob, Item, Value};

/// Where a key comes from: a full record or bare key values.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyInput {
    /// A record holding (at least) the key attributes. Other attributes are ignored.
    Item(Item),
    /// A hash key value for a table without a range key.
    Hash(Value),
    /// Hash and range key values.
    HashRange(Value, Value),
}

impl From<Item> for KeyInput {
    fn from(item: Item) -> Self {
        KeyInput::Item(item)
    }
}

impl From<&Item> for KeyInput {
    fn from(item: &Item) -> Self {
        KeyInput::Item(item.clone())
    }
}

impl From<Value> for KeyInput {
    fn from(value: Value) -> Self {
        KeyInput::Hash(value)
    }
}

impl From<&str> for KeyInput {
    fn from(value: &str) -> Self {
        KeyInput::Hash(value.into())
    }
}

impl From<String> for KeyInput {
    fn from(value: String) -> Self {
        KeyInput::Hash(value.into())
    }
}

impl From<Number> for KeyInput {
    fn from(value: Number) -> Self {
        KeyInput::Hash(value.into())
    }
}

impl From<Blob> for KeyInput {
    fn from(value: Blob) -> Self {
        KeyInput::Hash(value.into())
    }
}

impl From<i64> for KeyInput {
    fn from(value: i64) -> Self {
        KeyInput::Hash(value.into())
    }
}

impl<H, R> From<(H, R)> for KeyInput
where
    H: Into<Value>,
    R: Into<Value>,
{
    fn from((hash, range): (H, R)) -> Self {
        KeyInput::HashRange(hash.into(), range.into())
    }
}

/// An extracted primary key in wire form.
#[derive(Debug, Clone, PartialEq)]
pub struct Key {
    hash: (String, AttributeValue),
    range: Option<(String, AttributeValue)>,
}

impl Key {
    /// The hash key attribute name and value.
    pub fn hash(&self) -> (&str, &AttributeValue) {
        (&self.hash.0, &self.hash.1)
    }

    /// The range key attribute name and value, if the table has one.
    pub fn range(&self) -> Option<(&str, &AttributeValue)> {
        self.range.as_ref().map(|(name, value)| (name.as_str(), value))
    }

    /// The key as sent in a `Key` request field.
    pub fn to_map(&self) -> AttributeMap {
        let mut map = AttributeMap::with_capacity(2);
        map.insert(self.hash.0.clone(), self.hash.1.clone());
        if let Some((name, value)) = &self.range {
            map.insert(name.clone(), value.clone());
        }
        map
    }

    /// Identity of this key that ignores number formatting.
    pub fn fingerprint(&self) -> KeyFingerprint {
        let mut parts = vec![(self.hash.0.clone(), KeyPart::from_wire(&self.hash.1))];
        if let Some((name, value)) = &self.range {
            parts.push((name.clone(), KeyPart::from_wire(value)));
        }
        KeyFingerprint(parts)
    }
}

/// One scalar key component, normalised so that `"1.0"` and `"1"` compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum KeyPart {
    String(String),
    Number(String),
    Binary(Vec<u8>),
    Other(String),
}

impl KeyPart {
    fn from_wire(value: &AttributeValue) -> KeyPart {
        match value {
            AttributeValue::S(s) => KeyPart::String(s.clone()),
            AttributeValue::N(n) => KeyPart::Number(n.canonical()),
            AttributeValue::B(b) => KeyPart::Binary(b.as_ref().to_vec()),
            other => KeyPart::Other(other.tag().to_string()),
        }
    }
}

/// Hashable identity of a primary key, used to match store responses back to requests.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyFingerprint(Vec<(String, KeyPart)>);

impl KeyFingerprint {
    /// Fingerprints the key attributes of a wire record.
    ///
    /// Fails if the record lacks a key attribute.
    pub fn of_wire_item(
        names: KeyNames<'_>,
        item: &AttributeMap,
    ) -> Result<KeyFingerprint, ConfigurationError> {
        let part = |name: &str| {
            item.get(name)
                .map(|value| (name.to_string(), KeyPart::from_wire(value)))
                .ok_or_else(|| {
                    ConfigurationError::new(format!("record is missing key attribute '{name}'"))
                })
        };
        let mut parts = vec![part(names.hash_key)?];
        if let Some(range_key) = names.range_key {
            parts.push(part(range_key)?);
        }
        Ok(KeyFingerprint(parts))
    }
}

/// Derives the table's primary key from `input`.
///
/// Fails with a [`ConfigurationError`] when a key attribute is missing, or when a range
/// value is given for a table without a range key. Key values must be strings, numbers or
/// binary, and must match the type recorded in the descriptor; otherwise a
/// [`SerializationError`] is returned.
pub fn extract_key(table: &TableDescriptor, input: &KeyInput) -> Result<Key, Error> {
    let names = table.key_names();
    let (hash, range) = match input {
        KeyInput::Item(item) => {
            let hash = item.get(names.hash_key).ok_or_else(|| {
                ConfigurationError::new(format!(
                    "record is missing hash key '{}' of table '{}'",
                    names.hash_key,
                    table.name()
                ))
            })?;
            let range = match names.range_key {
                Some(range_key) => Some(item.get(range_key).ok_or_else(|| {
                    ConfigurationError::new(format!(
                        "record is missing range key '{range_key}' of table '{}'",
                        table.name()
                    ))
                })?),
                None => None,
            };
            (hash, range)
        }
        KeyInput::Hash(hash) => {
            if let Some(range_key) = names.range_key {
                return Err(ConfigurationError::new(format!(
                    "table '{}' requires range key '{range_key}'",
                    table.name()
                ))
                .into());
            }
            (hash, None)
        }
        KeyInput::HashRange(hash, range) => {
            if names.range_key.is_none() {
                return Err(ConfigurationError::new(format!(
                    "table '{}' has no range key",
                    table.name()
                ))
                .into());
            }
            (hash, Some(range))
        }
    };

    let hash = (
        names.hash_key.to_string(),
        encode_key_value(table, names.hash_key, hash)?,
    );
    let range = match (names.range_key, range) {
        (Some(name), Some(value)) => Some((name.to_string(), encode_key_value(table, name, value)?)),
        _ => None,
    };
    Ok(Key { hash, range })
}

/// Encodes a key attribute value, checking it against the descriptor's declared type.
pub fn encode_key_value(
    table: &TableDescriptor,
    name: &str,
    value: &Value,
) -> Result<AttributeValue, SerializationError> {
    if !matches!(value, Value::String(_) | Value::Number(_) | Value::Binary(_)) {
        return Err(SerializationError::invalid_type("string, number or binary", value.type_name()).at(name));
    }
    if let Some(ty) = table.attribute_type(name) {
        if !ty.matches(value) {
            return Err(SerializationError::invalid_type(ty.name(), value.type_name()).at(name));
        }
    }
    encode_value(value).map_err(|err| err.at(name))
}
