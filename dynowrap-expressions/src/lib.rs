/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Condition, update and projection expression builders.
//!
//! Expressions are plain values; rendering them against an [`ExpressionContext`]
//! produces the expression text and binds every attribute name and literal to a
//! placeholder.
//!
//! ```
//! use dynowrap_expressions::{attr, ExpressionContext};
//!
//! let filter = attr("age").gt(18).and(attr("age").lt(65));
//! let mut ctx = ExpressionContext::new();
//! assert_eq!(filter.render(&mut ctx).unwrap(), "#age > :age AND #age < :age_2");
//! ```

#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

mod condition;
mod context;
mod path;
mod projection;
mod update;

pub use condition::{attr, Comparator, Condition, ConditionBuilder};
pub use context::ExpressionContext;
pub use path::{AttributePath, PathSegment};
pub use projection::ProjectionExpression;
pub use update::{UpdateAction, UpdateExpression};
