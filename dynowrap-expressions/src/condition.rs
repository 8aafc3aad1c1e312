/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Condition trees used for key conditions, filters and write conditions.

use std::fmt;
use std::ops::Not;

use dynowrap_core::{SerializationError, Value};

use crate::context::ExpressionContext;
use crate::path::AttributePath;

/// A binary comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    /// `=`
    Eq,
    /// `<>`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl Comparator {
    /// The operator as written in an expression.
    pub fn as_str(&self) -> &'static str {
        match self {
            Comparator::Eq => "=",
            Comparator::Ne => "<>",
            Comparator::Lt => "<",
            Comparator::Le => "<=",
            Comparator::Gt => ">",
            Comparator::Ge => ">=",
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A condition over attribute values.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// `path op :value`
    Compare {
        /// The attribute compared.
        path: AttributePath,
        /// The operator.
        op: Comparator,
        /// The literal operand.
        value: Value,
    },
    /// `path BETWEEN :low AND :high`
    Between {
        /// The attribute compared.
        path: AttributePath,
        /// Inclusive lower bound.
        low: Value,
        /// Inclusive upper bound.
        high: Value,
    },
    /// `path IN (:a, :b, ...)`
    In {
        /// The attribute compared.
        path: AttributePath,
        /// Candidate values.
        values: Vec<Value>,
    },
    /// `begins_with(path, :prefix)`
    BeginsWith {
        /// The attribute tested.
        path: AttributePath,
        /// The prefix.
        prefix: Value,
    },
    /// `contains(path, :value)`
    Contains {
        /// The attribute tested.
        path: AttributePath,
        /// A substring or set member.
        value: Value,
    },
    /// `NOT contains(path, :value)`
    NotContains {
        /// The attribute tested.
        path: AttributePath,
        /// A substring or set member.
        value: Value,
    },
    /// `attribute_exists(path)`
    Exists(AttributePath),
    /// `attribute_not_exists(path)`
    NotExists(AttributePath),
    /// All of the conditions hold.
    And(Vec<Condition>),
    /// Any of the conditions holds.
    Or(Vec<Condition>),
    /// The condition does not hold.
    Not(Box<Condition>),
}

/// Starts a condition on the attribute at `path`.
///
/// ```
/// use dynowrap_expressions::attr;
///
/// let adult_admins = attr("age").ge(18).and(attr("roles").contains("admin"));
/// ```
pub fn attr(path: impl Into<AttributePath>) -> ConditionBuilder {
    ConditionBuilder { path: path.into() }
}

/// Builds a [`Condition`] on one attribute. See [`attr`].
#[derive(Debug, Clone)]
pub struct ConditionBuilder {
    path: AttributePath,
}

impl ConditionBuilder {
    fn compare(self, op: Comparator, value: impl Into<Value>) -> Condition {
        Condition::Compare {
            path: self.path,
            op,
            value: value.into(),
        }
    }

    /// `= value`
    pub fn eq(self, value: impl Into<Value>) -> Condition {
        self.compare(Comparator::Eq, value)
    }

    /// `<> value`
    pub fn ne(self, value: impl Into<Value>) -> Condition {
        self.compare(Comparator::Ne, value)
    }

    /// `< value`
    pub fn lt(self, value: impl Into<Value>) -> Condition {
        self.compare(Comparator::Lt, value)
    }

    /// `<= value`
    pub fn le(self, value: impl Into<Value>) -> Condition {
        self.compare(Comparator::Le, value)
    }

    /// `> value`
    pub fn gt(self, value: impl Into<Value>) -> Condition {
        self.compare(Comparator::Gt, value)
    }

    /// `>= value`
    pub fn ge(self, value: impl Into<Value>) -> Condition {
        self.compare(Comparator::Ge, value)
    }

    /// Between `low` and `high`, inclusive.
    pub fn between(self, low: impl Into<Value>, high: impl Into<Value>) -> Condition {
        Condition::Between {
            path: self.path,
            low: low.into(),
            high: high.into(),
        }
    }

    /// Equal to any of `values`.
    pub fn is_in<I, T>(self, values: I) -> Condition
    where
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        Condition::In {
            path: self.path,
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Starts with `prefix`.
    pub fn begins_with(self, prefix: impl Into<Value>) -> Condition {
        Condition::BeginsWith {
            path: self.path,
            prefix: prefix.into(),
        }
    }

    /// Contains `value` as a substring or set member.
    pub fn contains(self, value: impl Into<Value>) -> Condition {
        Condition::Contains {
            path: self.path,
            value: value.into(),
        }
    }

    /// Does not contain `value`.
    pub fn not_contains(self, value: impl Into<Value>) -> Condition {
        Condition::NotContains {
            path: self.path,
            value: value.into(),
        }
    }

    /// The attribute is present.
    pub fn exists(self) -> Condition {
        Condition::Exists(self.path)
    }

    /// The attribute is absent.
    pub fn not_exists(self) -> Condition {
        Condition::NotExists(self.path)
    }
}

impl Condition {
    /// Combines with `other` so both must hold. Nested `And`s are flattened.
    pub fn and(self, other: Condition) -> Condition {
        match (self, other) {
            (Condition::And(mut left), Condition::And(right)) => {
                left.extend(right);
                Condition::And(left)
            }
            (Condition::And(mut left), right) => {
                left.push(right);
                Condition::And(left)
            }
            (left, right) => Condition::And(vec![left, right]),
        }
    }

    /// Combines with `other` so either may hold. Nested `Or`s are flattened.
    pub fn or(self, other: Condition) -> Condition {
        match (self, other) {
            (Condition::Or(mut left), Condition::Or(right)) => {
                left.extend(right);
                Condition::Or(left)
            }
            (Condition::Or(mut left), right) => {
                left.push(right);
                Condition::Or(left)
            }
            (left, right) => Condition::Or(vec![left, right]),
        }
    }

    /// Joins `conditions` with AND. Returns `None` if there are none.
    pub fn all(conditions: impl IntoIterator<Item = Condition>) -> Option<Condition> {
        let mut conditions: Vec<_> = conditions.into_iter().collect();
        match conditions.len() {
            0 => None,
            1 => conditions.pop(),
            _ => Some(Condition::And(conditions)),
        }
    }

    /// The attribute paths this condition references.
    pub fn paths(&self) -> Vec<&AttributePath> {
        let mut out = Vec::new();
        self.collect_paths(&mut out);
        out
    }

    fn collect_paths<'a>(&'a self, out: &mut Vec<&'a AttributePath>) {
        match self {
            Condition::Compare { path, .. }
            | Condition::Between { path, .. }
            | Condition::In { path, .. }
            | Condition::BeginsWith { path, .. }
            | Condition::Contains { path, .. }
            | Condition::NotContains { path, .. }
            | Condition::Exists(path)
            | Condition::NotExists(path) => out.push(path),
            Condition::And(children) | Condition::Or(children) => {
                for child in children {
                    child.collect_paths(out);
                }
            }
            Condition::Not(child) => child.collect_paths(out),
        }
    }

    /// Renders the expression text, binding names and values in `ctx`.
    pub fn render(&self, ctx: &mut ExpressionContext) -> Result<String, SerializationError> {
        Ok(match self {
            Condition::Compare { path, op, value } => {
                let name = ctx.path(path);
                let value = ctx.value(path.leaf_name(), value)?;
                format!("{name} {op} {value}")
            }
            Condition::Between { path, low, high } => {
                let name = ctx.path(path);
                let low = ctx.value(path.leaf_name(), low)?;
                let high = ctx.value(path.leaf_name(), high)?;
                format!("{name} BETWEEN {low} AND {high}")
            }
            Condition::In { path, values } => {
                let name = ctx.path(path);
                let placeholders = values
                    .iter()
                    .map(|value| ctx.value(path.leaf_name(), value))
                    .collect::<Result<Vec<_>, _>>()?;
                format!("{name} IN ({})", placeholders.join(", "))
            }
            Condition::BeginsWith { path, prefix } => {
                let name = ctx.path(path);
                let value = ctx.value(path.leaf_name(), prefix)?;
                format!("begins_with({name}, {value})")
            }
            Condition::Contains { path, value } => {
                let name = ctx.path(path);
                let value = ctx.value(path.leaf_name(), value)?;
                format!("contains({name}, {value})")
            }
            Condition::NotContains { path, value } => {
                let name = ctx.path(path);
                let value = ctx.value(path.leaf_name(), value)?;
                format!("NOT contains({name}, {value})")
            }
            Condition::Exists(path) => format!("attribute_exists({})", ctx.path(path)),
            Condition::NotExists(path) => format!("attribute_not_exists({})", ctx.path(path)),
            Condition::And(children) => render_joined(children, " AND ", ctx)?,
            Condition::Or(children) => render_joined(children, " OR ", ctx)?,
            Condition::Not(child) => format!("NOT ({})", child.render(ctx)?),
        })
    }
}

fn render_joined(
    children: &[Condition],
    separator: &str,
    ctx: &mut ExpressionContext,
) -> Result<String, SerializationError> {
    let mut parts = Vec::with_capacity(children.len());
    for child in children {
        let rendered = child.render(ctx)?;
        parts.push(match child {
            Condition::And(_) | Condition::Or(_) => format!("({rendered})"),
            _ => rendered,
        });
    }
    Ok(parts.join(separator))
}

impl Not for Condition {
    type Output = Condition;

    fn not(self) -> Condition {
        match self {
            Condition::Not(inner) => *inner,
            other => Condition::Not(Box::new(other)),
        }
    }
}
