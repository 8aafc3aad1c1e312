/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Domain values and their tagged wire representation.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::number::Number;

/// A domain record: attribute name to value.
pub type Item = HashMap<String, Value>;

/// A record in wire form: attribute name to tagged attribute value.
pub type AttributeMap = HashMap<String, AttributeValue>;

/// Binary data. Transmitted as base64.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Blob {
    inner: Vec<u8>,
}

impl Blob {
    /// Creates a new blob from the given bytes.
    pub fn new<T: Into<Vec<u8>>>(input: T) -> Self {
        Blob {
            inner: input.into(),
        }
    }

    /// Consumes the blob and returns its bytes.
    pub fn into_inner(self) -> Vec<u8> {
        self.inner
    }
}

impl AsRef<[u8]> for Blob {
    fn as_ref(&self) -> &[u8] {
        &self.inner
    }
}

impl Serialize for Blob {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&base64_simd::STANDARD.encode_to_string(&self.inner))
    }
}

impl<'de> Deserialize<'de> for Blob {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        base64_simd::STANDARD
            .decode_to_vec(encoded.as_bytes())
            .map(Blob::new)
            .map_err(|err| serde::de::Error::custom(format!("invalid base64 blob: {err}")))
    }
}

/// An attribute value as application code sees it.
///
/// Sets are untyped here; [`encode_value`](crate::encode_value) checks that every member
/// shares one scalar type and picks the matching wire set.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// A UTF-8 string.
    String(String),
    /// A decimal number.
    Number(Number),
    /// A boolean.
    Bool(bool),
    /// Raw bytes.
    Binary(Blob),
    /// An explicit null.
    Null,
    /// A set of strings, numbers or binary values.
    Set(Vec<Value>),
    /// An ordered list of arbitrary values.
    List(Vec<Value>),
    /// A nested map.
    Map(HashMap<String, Value>),
}

impl Value {
    /// Builds a set from anything convertible into values.
    pub fn set<I, T>(members: I) -> Value
    where
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        Value::Set(members.into_iter().map(Into::into).collect())
    }

    /// Returns the variant name, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::String(_) => "string",
            Value::Number(_) => "number",
            Value::Bool(_) => "bool",
            Value::Binary(_) => "binary",
            Value::Null => "null",
            Value::Set(_) => "set",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    /// Returns the string if this is a [`Value::String`].
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the number if this is a [`Value::Number`].
    pub fn as_number(&self) -> Option<&Number> {
        match self {
            Value::Number(n) => Some(n),
            _ => None,
        }
    }

    /// Returns `true` for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<Number> for Value {
    fn from(value: Number) -> Self {
        Value::Number(value)
    }
}

impl From<Blob> for Value {
    fn from(value: Blob) -> Self {
        Value::Binary(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::List(value)
    }
}

impl From<HashMap<String, Value>> for Value {
    fn from(value: HashMap<String, Value>) -> Self {
        Value::Map(value)
    }
}

macro_rules! value_from_integer {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    Value::Number(Number::from(value))
                }
            }
        )*
    };
}

value_from_integer!(i8, i16, i32, i64, u8, u16, u32, u64, usize, isize);

/// A tagged attribute value in the store's JSON format, e.g. `{"S": "abc"}` or
/// `{"NS": ["1", "2.5"]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    /// `S`
    #[serde(rename = "S")]
    S(String),
    /// `N`
    #[serde(rename = "N")]
    N(Number),
    /// `B`, base64 encoded
    #[serde(rename = "B")]
    B(Blob),
    /// `SS`
    #[serde(rename = "SS")]
    Ss(Vec<String>),
    /// `NS`
    #[serde(rename = "NS")]
    Ns(Vec<Number>),
    /// `BS`
    #[serde(rename = "BS")]
    Bs(Vec<Blob>),
    /// `M`
    #[serde(rename = "M")]
    M(HashMap<String, AttributeValue>),
    /// `L`
    #[serde(rename = "L")]
    L(Vec<AttributeValue>),
    /// `NULL`
    #[serde(rename = "NULL")]
    Null(bool),
    /// `BOOL`
    #[serde(rename = "BOOL")]
    Bool(bool),
}

impl AttributeValue {
    /// Returns the wire tag of this value.
    pub fn tag(&self) -> &'static str {
        match self {
            AttributeValue::S(_) => "S",
            AttributeValue::N(_) => "N",
            AttributeValue::B(_) => "B",
            AttributeValue::Ss(_) => "SS",
            AttributeValue::Ns(_) => "NS",
            AttributeValue::Bs(_) => "BS",
            AttributeValue::M(_) => "M",
            AttributeValue::L(_) => "L",
            AttributeValue::Null(_) => "NULL",
            AttributeValue::Bool(_) => "BOOL",
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::S(s) => write!(f, "{s:?}"),
            AttributeValue::N(n) => write!(f, "{n}"),
            other => write!(f, "<{}>", other.tag()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn wire_json_uses_store_tags() {
        let mut nested = HashMap::new();
        nested.insert("n".to_string(), AttributeValue::N("1.5".parse().unwrap()));
        let value = AttributeValue::L(vec![
            AttributeValue::S("a".into()),
            AttributeValue::Ns(vec!["1".parse().unwrap(), "2".parse().unwrap()]),
            AttributeValue::B(Blob::new(b"hi".to_vec())),
            AttributeValue::Null(true),
            AttributeValue::Bool(false),
            AttributeValue::M(nested),
        ]);
        let json = serde_json::to_value(&value).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"L": [
                {"S": "a"},
                {"NS": ["1", "2"]},
                {"B": "aGk="},
                {"NULL": true},
                {"BOOL": false},
                {"M": {"n": {"N": "1.5"}}}
            ]})
        );
        let back: AttributeValue = serde_json::from_value(json).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn invalid_blobs_and_numbers_are_rejected() {
        assert!(serde_json::from_str::<AttributeValue>(r#"{"B": "***"}"#).is_err());
        assert!(serde_json::from_str::<AttributeValue>(r#"{"N": "one"}"#).is_err());
    }

    #[test]
    fn integers_convert_into_number_values() {
        assert_eq!(Value::from(7u32), Value::Number(Number::from(7u32)));
        assert_eq!(Value::from("x").as_str(), Some("x"));
        assert_eq!(
            Value::set(["a", "b"]),
            Value::Set(vec![Value::from("a"), Value::from("b")])
        );
    }
}
