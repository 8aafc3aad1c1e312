/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Decimal numbers kept in their string form.
//!
//! The store transmits numbers as decimal strings with up to 38 significant digits. A
//! [`Number`] holds that string as given so values round-trip exactly; converting to a
//! binary float is always an explicit, lossy call.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{SerializationError, SerializationErrorKind};

const MAX_SIGNIFICANT_DIGITS: usize = 38;
const MAX_ADJUSTED_EXPONENT: i64 = 125;
const MIN_ADJUSTED_EXPONENT: i64 = -130;

/// A validated decimal number.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Number(String);

/// Sign, significant digits and exponent of a parsed number.
///
/// The value is `digits * 10^exponent`; `digits` has no leading or trailing zeros and is
/// empty for zero.
#[derive(Debug, PartialEq)]
struct Decimal {
    negative: bool,
    digits: String,
    exponent: i64,
}

impl Decimal {
    fn parse(input: &str) -> Result<Decimal, String> {
        let (negative, rest) = match input.as_bytes().first() {
            Some(b'-') => (true, &input[1..]),
            Some(b'+') => (false, &input[1..]),
            _ => (false, input),
        };
        let (mantissa, exponent) = match rest.find(|c: char| c == 'e' || c == 'E') {
            Some(idx) => {
                let exponent = rest[idx + 1..]
                    .parse::<i64>()
                    .map_err(|_| format!("'{input}' has a malformed exponent"))?;
                (&rest[..idx], exponent)
            }
            None => (rest, 0),
        };
        let (integer, fraction) = match mantissa.find('.') {
            Some(idx) => (&mantissa[..idx], &mantissa[idx + 1..]),
            None => (mantissa, ""),
        };
        if integer.is_empty() && fraction.is_empty() {
            return Err(format!("'{input}' contains no digits"));
        }
        if !integer.bytes().chain(fraction.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(format!("'{input}' is not a decimal literal"));
        }

        let all_digits = format!("{integer}{fraction}");
        let leading_trimmed = all_digits.trim_start_matches('0');
        let significant = leading_trimmed.trim_end_matches('0');
        if significant.is_empty() {
            return Ok(Decimal {
                negative: false,
                digits: String::new(),
                exponent: 0,
            });
        }
        let trailing_zeros = (leading_trimmed.len() - significant.len()) as i64;
        let exponent = exponent
            .checked_sub(fraction.len() as i64)
            .and_then(|e| e.checked_add(trailing_zeros))
            .ok_or_else(|| format!("'{input}' is out of range"))?;
        Ok(Decimal {
            negative,
            digits: significant.to_string(),
            exponent,
        })
    }

    fn is_zero(&self) -> bool {
        self.digits.is_empty()
    }

    /// Exponent of the most significant digit, `None` if it does not fit an `i64`.
    fn adjusted_exponent(&self) -> Option<i64> {
        self.exponent.checked_add(self.digits.len() as i64 - 1)
    }

    fn validate(&self, input: &str) -> Result<(), String> {
        if self.is_zero() {
            return Ok(());
        }
        if self.digits.len() > MAX_SIGNIFICANT_DIGITS {
            return Err(format!(
                "'{input}' has more than {MAX_SIGNIFICANT_DIGITS} significant digits"
            ));
        }
        match self.adjusted_exponent() {
            Some(adjusted) if (MIN_ADJUSTED_EXPONENT..=MAX_ADJUSTED_EXPONENT).contains(&adjusted) => {
                Ok(())
            }
            _ => Err(format!("'{input}' is out of range")),
        }
    }

    fn signum(&self) -> i8 {
        match (self.is_zero(), self.negative) {
            (true, _) => 0,
            (false, true) => -1,
            (false, false) => 1,
        }
    }

    fn compare(&self, other: &Decimal) -> Ordering {
        match self.signum().cmp(&other.signum()) {
            Ordering::Equal if self.is_zero() => return Ordering::Equal,
            Ordering::Equal => {}
            unequal => return unequal,
        }
        let width = self.digits.len().max(other.digits.len());
        let padded = |digits: &str| {
            digits
                .bytes()
                .chain(std::iter::repeat(b'0'))
                .take(width)
                .collect::<Vec<_>>()
        };
        let magnitude = self
            .adjusted_exponent()
            .cmp(&other.adjusted_exponent())
            .then_with(|| padded(&self.digits).cmp(&padded(&other.digits)));
        if self.negative {
            magnitude.reverse()
        } else {
            magnitude
        }
    }
}

impl Number {
    /// Returns the number exactly as it will be sent on the wire.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns a canonical spelling: two numbers are numerically equal exactly when their
    /// canonical spellings are equal (`"1.50"`, `"15e-1"` and `"1.5"` all agree).
    pub fn canonical(&self) -> String {
        let decimal = self.decimal();
        if decimal.is_zero() {
            return "0".to_string();
        }
        let sign = if decimal.negative { "-" } else { "" };
        format!("{sign}{}E{}", decimal.digits, decimal.exponent)
    }

    /// Compares two numbers by value rather than by spelling.
    pub fn numeric_cmp(&self, other: &Number) -> Ordering {
        self.decimal().compare(&other.decimal())
    }

    /// Converts to an `i64` if the number is integral and in range.
    pub fn to_i64(&self) -> Option<i64> {
        let decimal = self.decimal();
        if decimal.is_zero() {
            return Some(0);
        }
        if decimal.exponent < 0 || decimal.adjusted_exponent().map_or(true, |adjusted| adjusted > 19) {
            return None;
        }
        let zeros = "0".repeat(decimal.exponent as usize);
        let sign = if decimal.negative { "-" } else { "" };
        format!("{sign}{}{zeros}", decimal.digits).parse().ok()
    }

    /// Converts to the nearest `f64`. This loses precision for most decimal values.
    pub fn to_f64_lossy(&self) -> f64 {
        self.0.parse().unwrap_or(f64::NAN)
    }

    fn decimal(&self) -> Decimal {
        // A `Number` can only be constructed from a string that already parsed.
        Decimal::parse(&self.0).unwrap_or(Decimal {
            negative: false,
            digits: String::new(),
            exponent: 0,
        })
    }
}

impl FromStr for Number {
    type Err = SerializationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: String| {
            SerializationError::new(SerializationErrorKind::InvalidNumber(reason))
        };
        let decimal = Decimal::parse(s).map_err(invalid)?;
        decimal.validate(s).map_err(invalid)?;
        Ok(Number(s.to_string()))
    }
}

impl TryFrom<f64> for Number {
    type Error = SerializationError;

    /// Uses the shortest decimal spelling that parses back to the same `f64`.
    fn try_from(value: f64) -> Result<Self, Self::Error> {
        if !value.is_finite() {
            return Err(SerializationError::new(SerializationErrorKind::InvalidNumber(
                format!("{value} is not finite"),
            )));
        }
        value.to_string().parse()
    }
}

macro_rules! number_from_integer {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Number {
                fn from(value: $ty) -> Self {
                    Number(value.to_string())
                }
            }
        )*
    };
}

number_from_integer!(i8, i16, i32, i64, u8, u16, u32, u64, usize, isize);

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Number {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for Number {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Number {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(s: &str) -> Number {
        s.parse().expect("valid number")
    }

    #[test]
    fn keeps_the_original_spelling() {
        assert_eq!(num("1.50").as_str(), "1.50");
        assert_eq!(num("-0.000123").as_str(), "-0.000123");
        assert_eq!(
            num("12345678901234567890123456789012345678").as_str(),
            "12345678901234567890123456789012345678"
        );
    }

    #[test]
    fn rejects_malformed_literals() {
        for bad in ["", "-", ".", "1.2.3", "abc", "1e", "1e+", "0x10", "NaN", "1_000"] {
            assert!(bad.parse::<Number>().is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn rejects_excess_precision_and_range() {
        assert!("123456789012345678901234567890123456789".parse::<Number>().is_err());
        assert!("1e126".parse::<Number>().is_err());
        assert!("1e-131".parse::<Number>().is_err());
        assert!("12e9223372036854775807".parse::<Number>().is_err());
        assert!("-1e-9223372036854775808".parse::<Number>().is_err());
        assert!("9.9e125".parse::<Number>().is_ok());
        // trailing zeros are not significant
        assert!("1000000000000000000000000000000000000000000".parse::<Number>().is_ok());
    }

    #[test]
    fn canonical_spelling_ignores_formatting() {
        assert_eq!(num("1.50").canonical(), num("15e-1").canonical());
        assert_eq!(num("0.0").canonical(), num("-0").canonical());
        assert_eq!(num("100").canonical(), "1E2");
        assert_ne!(num("1.5").canonical(), num("-1.5").canonical());
    }

    #[test]
    fn numeric_ordering() {
        assert_eq!(num("2").numeric_cmp(&num("10")), Ordering::Less);
        assert_eq!(num("-2").numeric_cmp(&num("-10")), Ordering::Greater);
        assert_eq!(num("0.1").numeric_cmp(&num("0.10")), Ordering::Equal);
        assert_eq!(num("-0.5").numeric_cmp(&num("0")), Ordering::Less);
        assert_eq!(num("1.25").numeric_cmp(&num("1.3")), Ordering::Less);
    }

    #[test]
    fn integer_conversions() {
        assert_eq!(Number::from(42u8).as_str(), "42");
        assert_eq!(num("4.2e1").to_i64(), Some(42));
        assert_eq!(num("4.25").to_i64(), None);
        assert_eq!(num("-9223372036854775808").to_i64(), Some(i64::MIN));
    }

    #[test]
    fn float_conversion_uses_shortest_spelling() {
        assert_eq!(Number::try_from(0.1).unwrap().as_str(), "0.1");
        assert!(Number::try_from(f64::INFINITY).is_err());
    }

    #[test]
    fn serializes_as_a_json_string() {
        let json = serde_json::to_string(&num("3.14")).unwrap();
        assert_eq!(json, r#""3.14""#);
        let back: Number = serde_json::from_str(&json).unwrap();
        assert_eq!(back, num("3.14"));
        assert!(serde_json::from_str::<Number>(r#""pi""#).is_err());
        assert!(serde_json::from_str::<Number>(r#""12e9223372036854775807""#).is_err());
    }
}
