/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Update expressions: `SET`, `ADD`, `REMOVE` and `DELETE` clauses.

use dynowrap_core::{SerializationError, Value};

use crate::context::ExpressionContext;
use crate::path::AttributePath;

/// One action of an update expression.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateAction {
    /// `SET path = :value`
    Set(AttributePath, Value),
    /// `SET path = if_not_exists(path, :value)`
    SetIfNotExists(AttributePath, Value),
    /// `ADD path :value`, incrementing a number or adding set members.
    Add(AttributePath, Value),
    /// `REMOVE path`
    Remove(AttributePath),
    /// `DELETE path :value`, removing set members.
    Delete(AttributePath, Value),
}

impl UpdateAction {
    /// The attribute this action modifies.
    pub fn path(&self) -> &AttributePath {
        match self {
            UpdateAction::Set(path, _)
            | UpdateAction::SetIfNotExists(path, _)
            | UpdateAction::Add(path, _)
            | UpdateAction::Remove(path)
            | UpdateAction::Delete(path, _) => path,
        }
    }
}

/// An ordered list of update actions.
///
/// ```
/// use dynowrap_expressions::UpdateExpression;
///
/// let update = UpdateExpression::new()
///     .set("name", "Ada")
///     .add("logins", 1)
///     .remove("legacy_flag");
/// assert_eq!(update.len(), 3);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateExpression {
    actions: Vec<UpdateAction>,
}

impl UpdateExpression {
    /// An empty update.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets an attribute.
    pub fn set(mut self, path: impl Into<AttributePath>, value: impl Into<Value>) -> Self {
        self.actions
            .push(UpdateAction::Set(path.into(), value.into()));
        self
    }

    /// Sets an attribute only if it is absent.
    pub fn set_if_not_exists(
        mut self,
        path: impl Into<AttributePath>,
        value: impl Into<Value>,
    ) -> Self {
        self.actions
            .push(UpdateAction::SetIfNotExists(path.into(), value.into()));
        self
    }

    /// Adds to a number or a set.
    pub fn add(mut self, path: impl Into<AttributePath>, value: impl Into<Value>) -> Self {
        self.actions
            .push(UpdateAction::Add(path.into(), value.into()));
        self
    }

    /// Removes an attribute.
    pub fn remove(mut self, path: impl Into<AttributePath>) -> Self {
        self.actions.push(UpdateAction::Remove(path.into()));
        self
    }

    /// Deletes members from a set.
    pub fn delete(mut self, path: impl Into<AttributePath>, value: impl Into<Value>) -> Self {
        self.actions
            .push(UpdateAction::Delete(path.into(), value.into()));
        self
    }

    /// Appends an action.
    pub fn push(&mut self, action: UpdateAction) {
        self.actions.push(action);
    }

    /// The actions, in insertion order.
    pub fn actions(&self) -> &[UpdateAction] {
        &self.actions
    }

    /// Number of actions.
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Returns `true` if there are no actions.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Renders the expression, grouping actions into clauses.
    pub fn render(&self, ctx: &mut ExpressionContext) -> Result<String, SerializationError> {
        let mut set = Vec::new();
        let mut add = Vec::new();
        let mut remove = Vec::new();
        let mut delete = Vec::new();
        for action in &self.actions {
            match action {
                UpdateAction::Set(path, value) => {
                    let name = ctx.path(path);
                    let value = ctx.value(path.leaf_name(), value)?;
                    set.push(format!("{name} = {value}"));
                }
                UpdateAction::SetIfNotExists(path, value) => {
                    let name = ctx.path(path);
                    let value = ctx.value(path.leaf_name(), value)?;
                    set.push(format!("{name} = if_not_exists({name}, {value})"));
                }
                UpdateAction::Add(path, value) => {
                    let name = ctx.path(path);
                    let value = ctx.value(path.leaf_name(), value)?;
                    add.push(format!("{name} {value}"));
                }
                UpdateAction::Remove(path) => remove.push(ctx.path(path)),
                UpdateAction::Delete(path, value) => {
                    let name = ctx.path(path);
                    let value = ctx.value(path.leaf_name(), value)?;
                    delete.push(format!("{name} {value}"));
                }
            }
        }
        let clauses: Vec<String> = [("SET", set), ("ADD", add), ("REMOVE", remove), ("DELETE", delete)]
            .into_iter()
            .filter(|(_, parts)| !parts.is_empty())
            .map(|(keyword, parts)| format!("{keyword} {}", parts.join(", ")))
            .collect();
        Ok(clauses.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn groups_actions_into_clauses() {
        let update = UpdateExpression::new()
            .set("name", "Ada")
            .add("logins", 1)
            .set_if_not_exists("created", "2021-01-01")
            .remove("legacy")
            .delete("tags", Value::set(["old"]))
            .remove("address.zip");
        let mut ctx = ExpressionContext::new();
        assert_eq!(
            update.render(&mut ctx).unwrap(),
            "SET #name = :name, #created = if_not_exists(#created, :created) \
             ADD #logins :logins REMOVE #legacy, #address.#zip DELETE #tags :tags"
        );
        let names = ctx.names().unwrap();
        assert_eq!(names.len(), 7);
        assert_eq!(ctx.values().unwrap().len(), 4);
    }

    #[test]
    fn remove_only_binds_no_values() {
        let mut ctx = ExpressionContext::new();
        let rendered = UpdateExpression::new().remove("a").render(&mut ctx).unwrap();
        assert_eq!(rendered, "REMOVE #a");
        assert!(ctx.values().is_none());
    }
}
