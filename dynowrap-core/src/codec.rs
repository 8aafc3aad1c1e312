/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Conversion between domain [`Value`]s and wire [`AttributeValue`]s.
//!
//! `decode_value(encode_value(v)?) == v` holds for every value `encode_value` accepts.

use std::collections::HashSet;

use crate::error::{SerializationError, SerializationErrorKind};
use crate::value::{AttributeMap, AttributeValue, Blob, Item, Value};

/// Encodes a domain record into its wire form.
pub fn encode_item(item: &Item) -> Result<AttributeMap, SerializationError> {
    item.iter()
        .map(|(name, value)| {
            encode_value(value)
                .map(|encoded| (name.clone(), encoded))
                .map_err(|err| err.at(name.as_str()))
        })
        .collect()
}

/// Decodes a wire record into a domain record.
pub fn decode_item(item: AttributeMap) -> Item {
    item.into_iter()
        .map(|(name, value)| (name, decode_value(value)))
        .collect()
}

/// Encodes a single value, choosing the wire tag from its variant.
pub fn encode_value(value: &Value) -> Result<AttributeValue, SerializationError> {
    Ok(match value {
        Value::String(s) => AttributeValue::S(s.clone()),
        Value::Number(n) => AttributeValue::N(n.clone()),
        Value::Bool(b) => AttributeValue::Bool(*b),
        Value::Binary(b) => AttributeValue::B(b.clone()),
        Value::Null => AttributeValue::Null(true),
        Value::Set(members) => encode_set(members)?,
        Value::List(values) => AttributeValue::L(
            values
                .iter()
                .enumerate()
                .map(|(idx, v)| encode_value(v).map_err(|err| err.at_index(idx)))
                .collect::<Result<_, _>>()?,
        ),
        Value::Map(map) => AttributeValue::M(encode_item(map)?),
    })
}

/// Decodes a single wire value. Every wire value has a domain representation.
pub fn decode_value(value: AttributeValue) -> Value {
    match value {
        AttributeValue::S(s) => Value::String(s),
        AttributeValue::N(n) => Value::Number(n),
        AttributeValue::B(b) => Value::Binary(b),
        AttributeValue::Bool(b) => Value::Bool(b),
        AttributeValue::Null(_) => Value::Null,
        AttributeValue::Ss(members) => Value::Set(members.into_iter().map(Value::String).collect()),
        AttributeValue::Ns(members) => Value::Set(members.into_iter().map(Value::Number).collect()),
        AttributeValue::Bs(members) => Value::Set(members.into_iter().map(Value::Binary).collect()),
        AttributeValue::L(values) => Value::List(values.into_iter().map(decode_value).collect()),
        AttributeValue::M(map) => Value::Map(decode_item(map)),
    }
}

fn encode_set(members: &[Value]) -> Result<AttributeValue, SerializationError> {
    let first = members
        .first()
        .ok_or_else(|| SerializationError::new(SerializationErrorKind::EmptySet))?;
    let mixed = |idx: usize, member: &Value| {
        SerializationError::new(SerializationErrorKind::MixedSet {
            expected: first.type_name(),
            actual: member.type_name(),
        })
        .at_index(idx)
    };
    let duplicate =
        |idx: usize| SerializationError::new(SerializationErrorKind::DuplicateSetMember).at_index(idx);

    match first {
        Value::String(_) => {
            let mut seen = HashSet::new();
            let mut out = Vec::with_capacity(members.len());
            for (idx, member) in members.iter().enumerate() {
                let Value::String(s) = member else {
                    return Err(mixed(idx, member));
                };
                if !seen.insert(s.as_str()) {
                    return Err(duplicate(idx));
                }
                out.push(s.clone());
            }
            Ok(AttributeValue::Ss(out))
        }
        Value::Number(_) => {
            let mut seen = HashSet::new();
            let mut out = Vec::with_capacity(members.len());
            for (idx, member) in members.iter().enumerate() {
                let Value::Number(n) = member else {
                    return Err(mixed(idx, member));
                };
                if !seen.insert(n.canonical()) {
                    return Err(duplicate(idx));
                }
                out.push(n.clone());
            }
            Ok(AttributeValue::Ns(out))
        }
        Value::Binary(_) => {
            let mut seen: HashSet<&[u8]> = HashSet::new();
            let mut out: Vec<Blob> = Vec::with_capacity(members.len());
            for (idx, member) in members.iter().enumerate() {
                let Value::Binary(b) = member else {
                    return Err(mixed(idx, member));
                };
                if !seen.insert(b.as_ref()) {
                    return Err(duplicate(idx));
                }
                out.push(b.clone());
            }
            Ok(AttributeValue::Bs(out))
        }
        other => Err(
            SerializationError::new(SerializationErrorKind::UnsupportedSetMember(
                other.type_name(),
            ))
            .at_index(0),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::number::Number;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use std::collections::HashMap;

    fn item(pairs: &[(&str, Value)]) -> Item {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn encodes_each_variant_with_its_tag() {
        let record = item(&[
            ("name", Value::from("Ada")),
            ("age", Value::from(36)),
            ("admin", Value::from(true)),
            ("avatar", Value::Binary(Blob::new(vec![0u8, 1, 2]))),
            ("nickname", Value::Null),
            ("tags", Value::set(["a", "b"])),
            ("scores", Value::set([1, 2])),
        ]);
        let wire = encode_item(&record).unwrap();
        assert_eq!(wire["name"], AttributeValue::S("Ada".into()));
        assert_eq!(wire["age"], AttributeValue::N(Number::from(36)));
        assert_eq!(wire["admin"], AttributeValue::Bool(true));
        assert_eq!(wire["avatar"], AttributeValue::B(Blob::new(vec![0u8, 1, 2])));
        assert_eq!(wire["nickname"], AttributeValue::Null(true));
        assert_eq!(
            wire["tags"],
            AttributeValue::Ss(vec!["a".to_string(), "b".to_string()])
        );
        assert_eq!(
            wire["scores"],
            AttributeValue::Ns(vec![Number::from(1), Number::from(2)])
        );
        assert_eq!(decode_item(wire), record);
    }

    #[test]
    fn mixed_sets_are_rejected_with_a_path() {
        let record = item(&[(
            "profile",
            Value::Map(item(&[(
                "tags",
                Value::Set(vec![Value::from("a"), Value::from(1)]),
            )])),
        )]);
        let err = encode_item(&record).unwrap_err();
        assert_eq!(
            err.kind(),
            &SerializationErrorKind::MixedSet {
                expected: "string",
                actual: "number"
            }
        );
        assert_eq!(err.path(), Some("profile.tags[1]"));
    }

    #[test]
    fn empty_nested_and_duplicate_sets_are_rejected() {
        assert_eq!(
            encode_value(&Value::Set(vec![])).unwrap_err().kind(),
            &SerializationErrorKind::EmptySet
        );
        assert_eq!(
            encode_value(&Value::set([Value::List(vec![])]))
                .unwrap_err()
                .kind(),
            &SerializationErrorKind::UnsupportedSetMember("list")
        );
        let numbers = Value::Set(vec![
            Value::Number("1.0".parse().unwrap()),
            Value::Number("1".parse().unwrap()),
        ]);
        assert_eq!(
            encode_value(&numbers).unwrap_err().kind(),
            &SerializationErrorKind::DuplicateSetMember
        );
    }

    #[test]
    fn list_errors_carry_the_position() {
        let value = Value::List(vec![Value::from(1), Value::Set(vec![])]);
        assert_eq!(encode_value(&value).unwrap_err().path(), Some("[1]"));
    }

    #[test]
    fn numbers_keep_full_precision() {
        let precise: Number = "0.1000000000000000000000000000000000001".parse().unwrap();
        let encoded = encode_value(&Value::Number(precise.clone())).unwrap();
        let json = serde_json::to_string(&encoded).unwrap();
        assert_eq!(json, r#"{"N":"0.1000000000000000000000000000000000001"}"#);
        let parsed: AttributeValue = serde_json::from_str(&json).unwrap();
        assert_eq!(decode_value(parsed), Value::Number(precise));
    }

    fn number_strategy() -> impl Strategy<Value = Number> {
        (any::<bool>(), "[1-9][0-9]{0,20}", "[0-9]{0,15}").prop_map(|(neg, int, frac)| {
            let sign = if neg { "-" } else { "" };
            let literal = if frac.is_empty() {
                format!("{sign}{int}")
            } else {
                format!("{sign}{int}.{frac}")
            };
            literal.parse().expect("generated literal is valid")
        })
    }

    fn scalar_set() -> impl Strategy<Value = Value> {
        prop_oneof![
            proptest::collection::hash_set("[a-z]{1,8}", 1..5)
                .prop_map(|s| Value::set(s.into_iter())),
            proptest::collection::hash_set(any::<i64>(), 1..5)
                .prop_map(|s| Value::set(s.into_iter())),
            proptest::collection::hash_set(proptest::collection::vec(any::<u8>(), 0..6), 1..5)
                .prop_map(|s| Value::Set(s.into_iter().map(|b| Value::Binary(Blob::new(b))).collect())),
        ]
    }

    fn value_strategy() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            ".*".prop_map(Value::String),
            number_strategy().prop_map(Value::Number),
            any::<bool>().prop_map(Value::Bool),
            proptest::collection::vec(any::<u8>(), 0..16).prop_map(|b| Value::Binary(Blob::new(b))),
            Just(Value::Null),
            scalar_set(),
        ];
        leaf.prop_recursive(4, 32, 6, |inner| {
            prop_oneof![
                proptest::collection::vec(inner.clone(), 0..6).prop_map(Value::List),
                proptest::collection::hash_map("[a-zA-Z_]{1,10}", inner, 0..6)
                    .prop_map(|m: HashMap<String, Value>| Value::Map(m)),
            ]
        })
    }

    proptest! {
        #[test]
        fn decode_inverts_encode(value in value_strategy()) {
            let encoded = encode_value(&value).expect("generated values are representable");
            prop_assert_eq!(decode_value(encoded), value);
        }

        #[test]
        fn wire_json_round_trips(value in value_strategy()) {
            let encoded = encode_value(&value).unwrap();
            let json = serde_json::to_string(&encoded).unwrap();
            let parsed: AttributeValue = serde_json::from_str(&json).unwrap();
            prop_assert_eq!(decode_value(parsed), value);
        }
    }
}
