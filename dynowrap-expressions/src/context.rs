/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Placeholder allocation for expression attribute names and values.
//!
//! Every attribute name in an expression is replaced with a `#name` placeholder and
//! every literal with a `:name` placeholder, so reserved words and arbitrary characters
//! never reach the expression grammar. One [`ExpressionContext`] is shared by all the
//! expressions of a request; a name used twice reuses its placeholder, a value
//! placeholder base used twice gets a counter suffix (`:age`, `:age_2`, `:age_3`).

use std::collections::HashMap;

use dynowrap_core::{encode_value, AttributeMap, AttributeValue, SerializationError, Value};

use crate::path::{AttributePath, PathSegment};

/// Accumulates placeholders for one request.
#[derive(Debug, Clone, Default)]
pub struct ExpressionContext {
    names: HashMap<String, String>,
    name_placeholders: HashMap<String, String>,
    values: AttributeMap,
    counters: HashMap<String, usize>,
}

/// Keeps `[A-Za-z0-9_]`, dropping everything else.
fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    if cleaned.is_empty() {
        "attr".to_string()
    } else {
        cleaned
    }
}

impl ExpressionContext {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    fn next_free(&mut self, prefix: char, base: &str) -> String {
        let counter = self.counters.entry(format!("{prefix}{base}")).or_insert(0);
        loop {
            *counter += 1;
            let candidate = if *counter == 1 {
                format!("{prefix}{base}")
            } else {
                format!("{prefix}{base}_{counter}")
            };
            let taken = match prefix {
                '#' => self.names.contains_key(&candidate),
                _ => self.values.contains_key(&candidate),
            };
            if !taken {
                return candidate;
            }
        }
    }

    /// Returns the `#` placeholder for an attribute name, allocating one on first use.
    pub fn name(&mut self, name: &str) -> String {
        if let Some(existing) = self.name_placeholders.get(name) {
            return existing.clone();
        }
        let placeholder = self.next_free('#', &sanitize(name));
        self.names.insert(placeholder.clone(), name.to_string());
        self.name_placeholders
            .insert(name.to_string(), placeholder.clone());
        placeholder
    }

    /// Renders a path with every named segment replaced by its placeholder.
    pub fn path(&mut self, path: &AttributePath) -> String {
        let mut rendered = String::new();
        for segment in path.segments() {
            match segment {
                PathSegment::Name(name) => {
                    if !rendered.is_empty() {
                        rendered.push('.');
                    }
                    let placeholder = self.name(name);
                    rendered.push_str(&placeholder);
                }
                PathSegment::Index(index) => rendered.push_str(&format!("[{index}]")),
            }
        }
        rendered
    }

    /// Encodes `value` and binds it to a fresh `:` placeholder derived from `hint`.
    pub fn value(&mut self, hint: &str, value: &Value) -> Result<String, SerializationError> {
        let encoded = encode_value(value).map_err(|err| err.at(hint))?;
        Ok(self.wire_value(hint, encoded))
    }

    /// Binds an already encoded value to a fresh `:` placeholder derived from `hint`.
    pub fn wire_value(&mut self, hint: &str, value: AttributeValue) -> String {
        let placeholder = self.next_free(':', &sanitize(hint));
        self.values.insert(placeholder.clone(), value);
        placeholder
    }

    /// Placeholder to attribute name bindings, `None` if empty.
    pub fn names(&self) -> Option<HashMap<String, String>> {
        (!self.names.is_empty()).then(|| self.names.clone())
    }

    /// Placeholder to value bindings, `None` if empty.
    pub fn values(&self) -> Option<AttributeMap> {
        (!self.values.is_empty()).then(|| self.values.clone())
    }

    /// Consumes the context, returning the name and value bindings.
    pub fn into_parts(self) -> (Option<HashMap<String, String>>, Option<AttributeMap>) {
        let names = (!self.names.is_empty()).then_some(self.names);
        let values = (!self.values.is_empty()).then_some(self.values);
        (names, values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn names_are_reused_and_values_are_counted() {
        let mut ctx = ExpressionContext::new();
        assert_eq!(ctx.name("age"), "#age");
        assert_eq!(ctx.name("age"), "#age");
        assert_eq!(ctx.value("age", &Value::from(1)).unwrap(), ":age");
        assert_eq!(ctx.value("age", &Value::from(2)).unwrap(), ":age_2");
        assert_eq!(ctx.value("age", &Value::from(3)).unwrap(), ":age_3");
        let (names, values) = ctx.into_parts();
        assert_eq!(names.unwrap().len(), 1);
        assert_eq!(values.unwrap().len(), 3);
    }

    #[test]
    fn sanitized_collisions_get_distinct_placeholders() {
        let mut ctx = ExpressionContext::new();
        assert_eq!(ctx.name("first-name"), "#firstname");
        assert_eq!(ctx.name("first.name"), "#firstname_2");
        assert_eq!(ctx.name("firstname"), "#firstname_3");
        assert_eq!(ctx.name("ü"), "#attr");

        let names = ctx.names().unwrap();
        assert_eq!(names["#firstname"], "first-name");
        assert_eq!(names["#firstname_2"], "first.name");
    }

    #[test]
    fn suffixed_bases_do_not_collide() {
        let mut ctx = ExpressionContext::new();
        assert_eq!(ctx.value("a_2", &Value::from(1)).unwrap(), ":a_2");
        assert_eq!(ctx.value("a", &Value::from(1)).unwrap(), ":a");
        assert_eq!(ctx.value("a", &Value::from(1)).unwrap(), ":a_3");
    }

    #[test]
    fn nested_paths_use_one_placeholder_per_segment() {
        let mut ctx = ExpressionContext::new();
        let rendered = ctx.path(&AttributePath::parse("address.lines[1]"));
        assert_eq!(rendered, "#address.#lines[1]");
    }

    #[test]
    fn invalid_literals_report_the_attribute() {
        let mut ctx = ExpressionContext::new();
        let err = ctx.value("tags", &Value::Set(vec![])).unwrap_err();
        assert_eq!(err.path(), Some("tags"));
        assert!(ctx.values().is_none());
    }
}
