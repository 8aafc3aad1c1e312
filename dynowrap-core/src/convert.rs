/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Conversions between Rust types and [`Value`]s.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::hash::Hash;

use crate::error::SerializationError;
use crate::number::Number;
use crate::value::{Blob, Item, Value};

/// Converts individual Rust values to and from [`Value`]s.
///
/// For whole records see [`ItemConvert`].
pub trait ValueConvert: Sized {
    /// Converts this value to a domain value.
    fn to_value(&self) -> Result<Value, SerializationError>;

    /// Constructs a value from a domain value.
    fn from_value(value: Value) -> Result<Self, SerializationError>;
}

/// Converts a Rust struct to and from a record.
///
/// ```
/// use dynowrap_core::{optional, required, Item, ItemConvert, SerializationError, Value};
///
/// struct User {
///     id: String,
///     age: Option<u32>,
/// }
///
/// impl ItemConvert for User {
///     fn to_item(&self) -> Result<Item, SerializationError> {
///         let mut item = Item::new();
///         item.insert("id".into(), Value::from(self.id.as_str()));
///         if let Some(age) = self.age {
///             item.insert("age".into(), Value::from(age));
///         }
///         Ok(item)
///     }
///
///     fn from_item(mut item: Item) -> Result<Self, SerializationError> {
///         Ok(User {
///             id: required(&mut item, "id")?,
///             age: optional(&mut item, "age")?,
///         })
///     }
/// }
/// ```
pub trait ItemConvert: Sized {
    /// Converts this object to a record.
    fn to_item(&self) -> Result<Item, SerializationError>;

    /// Constructs an object from a record.
    fn from_item(item: Item) -> Result<Self, SerializationError>;
}

impl ItemConvert for Item {
    fn to_item(&self) -> Result<Item, SerializationError> {
        Ok(self.clone())
    }

    fn from_item(item: Item) -> Result<Self, SerializationError> {
        Ok(item)
    }
}

/// Removes and converts a required attribute from `item`.
pub fn required<T: ValueConvert>(item: &mut Item, name: &str) -> Result<T, SerializationError> {
    let value = item
        .remove(name)
        .ok_or_else(|| SerializationError::missing_attribute(name))?;
    T::from_value(value).map_err(|err| err.at(name))
}

/// Removes and converts an optional attribute. Absent and null attributes yield `None`.
pub fn optional<T: ValueConvert>(
    item: &mut Item,
    name: &str,
) -> Result<Option<T>, SerializationError> {
    match item.remove(name) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => T::from_value(value).map(Some).map_err(|err| err.at(name)),
    }
}

fn mismatch(expected: &'static str, actual: &Value) -> SerializationError {
    SerializationError::invalid_type(expected, actual.type_name())
}

impl ValueConvert for Value {
    fn to_value(&self) -> Result<Value, SerializationError> {
        Ok(self.clone())
    }

    fn from_value(value: Value) -> Result<Self, SerializationError> {
        Ok(value)
    }
}

impl ValueConvert for String {
    fn to_value(&self) -> Result<Value, SerializationError> {
        Ok(Value::String(self.clone()))
    }

    fn from_value(value: Value) -> Result<Self, SerializationError> {
        match value {
            Value::String(s) => Ok(s),
            other => Err(mismatch("string", &other)),
        }
    }
}

impl ValueConvert for Number {
    fn to_value(&self) -> Result<Value, SerializationError> {
        Ok(Value::Number(self.clone()))
    }

    fn from_value(value: Value) -> Result<Self, SerializationError> {
        match value {
            Value::Number(n) => Ok(n),
            other => Err(mismatch("number", &other)),
        }
    }
}

impl ValueConvert for bool {
    fn to_value(&self) -> Result<Value, SerializationError> {
        Ok(Value::Bool(*self))
    }

    fn from_value(value: Value) -> Result<Self, SerializationError> {
        match value {
            Value::Bool(b) => Ok(b),
            other => Err(mismatch("bool", &other)),
        }
    }
}

impl ValueConvert for Blob {
    fn to_value(&self) -> Result<Value, SerializationError> {
        Ok(Value::Binary(self.clone()))
    }

    fn from_value(value: Value) -> Result<Self, SerializationError> {
        match value {
            Value::Binary(b) => Ok(b),
            other => Err(mismatch("binary", &other)),
        }
    }
}

impl ValueConvert for f64 {
    fn to_value(&self) -> Result<Value, SerializationError> {
        Number::try_from(*self).map(Value::Number)
    }

    fn from_value(value: Value) -> Result<Self, SerializationError> {
        match value {
            Value::Number(n) => Ok(n.to_f64_lossy()),
            other => Err(mismatch("number", &other)),
        }
    }
}

macro_rules! convert_integer {
    ($($ty:ty),*) => {
        $(
            impl ValueConvert for $ty {
                fn to_value(&self) -> Result<Value, SerializationError> {
                    Ok(Value::Number(Number::from(*self)))
                }

                fn from_value(value: Value) -> Result<Self, SerializationError> {
                    match value {
                        Value::Number(n) => n
                            .to_i64()
                            .and_then(|i| <$ty>::try_from(i).ok())
                            .ok_or_else(|| {
                                SerializationError::invalid_value(format!(
                                    "{n} does not fit in {}",
                                    stringify!($ty)
                                ))
                            }),
                        other => Err(mismatch("number", &other)),
                    }
                }
            }
        )*
    };
}

convert_integer!(i8, i16, i32, i64, u8, u16, u32, u64, usize, isize);

impl<T: ValueConvert> ValueConvert for Option<T> {
    fn to_value(&self) -> Result<Value, SerializationError> {
        match self {
            Some(v) => v.to_value(),
            None => Ok(Value::Null),
        }
    }

    fn from_value(value: Value) -> Result<Self, SerializationError> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl<T: ValueConvert> ValueConvert for Vec<T> {
    fn to_value(&self) -> Result<Value, SerializationError> {
        self.iter()
            .enumerate()
            .map(|(idx, v)| v.to_value().map_err(|err| err.at_index(idx)))
            .collect::<Result<_, _>>()
            .map(Value::List)
    }

    fn from_value(value: Value) -> Result<Self, SerializationError> {
        match value {
            Value::List(values) => values
                .into_iter()
                .enumerate()
                .map(|(idx, v)| T::from_value(v).map_err(|err| err.at_index(idx)))
                .collect(),
            other => Err(mismatch("list", &other)),
        }
    }
}

impl<V: ValueConvert> ValueConvert for HashMap<String, V> {
    fn to_value(&self) -> Result<Value, SerializationError> {
        self.iter()
            .map(|(k, v)| {
                v.to_value()
                    .map(|v| (k.clone(), v))
                    .map_err(|err| err.at(k.as_str()))
            })
            .collect::<Result<_, _>>()
            .map(Value::Map)
    }

    fn from_value(value: Value) -> Result<Self, SerializationError> {
        match value {
            Value::Map(map) => map
                .into_iter()
                .map(|(k, v)| match V::from_value(v) {
                    Ok(v) => Ok((k, v)),
                    Err(err) => Err(err.at(k)),
                })
                .collect(),
            other => Err(mismatch("map", &other)),
        }
    }
}

fn set_members<T, C>(value: Value) -> Result<C, SerializationError>
where
    T: ValueConvert,
    C: FromIterator<T>,
{
    match value {
        Value::Set(members) => members
            .into_iter()
            .enumerate()
            .map(|(idx, v)| T::from_value(v).map_err(|err| err.at_index(idx)))
            .collect(),
        other => Err(mismatch("set", &other)),
    }
}

impl<T: ValueConvert + Eq + Hash> ValueConvert for HashSet<T> {
    fn to_value(&self) -> Result<Value, SerializationError> {
        self.iter()
            .map(ValueConvert::to_value)
            .collect::<Result<_, _>>()
            .map(Value::Set)
    }

    fn from_value(value: Value) -> Result<Self, SerializationError> {
        set_members(value)
    }
}

impl<T: ValueConvert + Ord> ValueConvert for BTreeSet<T> {
    fn to_value(&self) -> Result<Value, SerializationError> {
        self.iter()
            .map(ValueConvert::to_value)
            .collect::<Result<_, _>>()
            .map(Value::Set)
    }

    fn from_value(value: Value) -> Result<Self, SerializationError> {
        set_members(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SerializationErrorKind;
    use pretty_assertions::assert_eq;

    #[derive(Debug, PartialEq)]
    struct Account {
        name: String,
        email: String,
        age: Option<u32>,
        roles: BTreeSet<String>,
    }

    impl ItemConvert for Account {
        fn to_item(&self) -> Result<Item, SerializationError> {
            let mut item = Item::new();
            item.insert("name".into(), self.name.to_value()?);
            item.insert("email".into(), self.email.to_value()?);
            item.insert("age".into(), self.age.to_value()?);
            item.insert("roles".into(), self.roles.to_value()?);
            Ok(item)
        }

        fn from_item(mut item: Item) -> Result<Self, SerializationError> {
            Ok(Account {
                name: required(&mut item, "name")?,
                email: required(&mut item, "email")?,
                age: optional(&mut item, "age")?,
                roles: optional(&mut item, "roles")?.unwrap_or_default(),
            })
        }
    }

    #[test]
    fn struct_round_trip() {
        let account = Account {
            name: "Ada".into(),
            email: "ada@example.com".into(),
            age: None,
            roles: ["admin".to_string(), "dev".to_string()].into_iter().collect(),
        };
        let item = account.to_item().unwrap();
        assert_eq!(item["age"], Value::Null);
        assert_eq!(
            item["roles"],
            Value::Set(vec![Value::from("admin"), Value::from("dev")])
        );
        assert_eq!(Account::from_item(item).unwrap(), account);
    }

    #[test]
    fn missing_and_mistyped_attributes_name_the_attribute() {
        let mut item = Item::new();
        item.insert("name".into(), Value::from("Ada"));
        let err = Account::from_item(item.clone()).unwrap_err();
        assert_eq!(err.kind(), &SerializationErrorKind::MissingAttribute);
        assert_eq!(err.path(), Some("email"));

        item.insert("email".into(), Value::from(5));
        let err = Account::from_item(item).unwrap_err();
        assert_eq!(
            err.kind(),
            &SerializationErrorKind::InvalidType {
                expected: "string",
                actual: "number"
            }
        );
        assert_eq!(err.path(), Some("email"));
    }

    #[test]
    fn integers_are_range_checked() {
        assert_eq!(u8::from_value(Value::from(255)).unwrap(), 255);
        assert!(u8::from_value(Value::from(256)).is_err());
        assert!(i32::from_value(Value::Number("1.5".parse().unwrap())).is_err());
        assert_eq!(i64::from_value(Value::Number("1e3".parse().unwrap())).unwrap(), 1000);
    }

    #[test]
    fn nested_collections_report_positions() {
        let value = Value::List(vec![Value::from(1), Value::from("two")]);
        let err = Vec::<i64>::from_value(value).unwrap_err();
        assert_eq!(err.path(), Some("[1]"));

        let tags: HashSet<i64> = [1, 2, 3].into_iter().collect();
        let back = HashSet::<i64>::from_value(tags.to_value().unwrap()).unwrap();
        assert_eq!(back, tags);
    }
}
