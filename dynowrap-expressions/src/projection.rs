/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use crate::context::ExpressionContext;
use crate::path::AttributePath;

/// The attributes a read returns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectionExpression {
    paths: Vec<AttributePath>,
}

impl ProjectionExpression {
    /// Projects the given paths.
    pub fn new<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<AttributePath>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }

    /// Adds `path` unless it is already projected.
    pub fn include(&mut self, path: impl Into<AttributePath>) {
        let path = path.into();
        if !self.paths.contains(&path) {
            self.paths.push(path);
        }
    }

    /// The projected paths.
    pub fn paths(&self) -> &[AttributePath] {
        &self.paths
    }

    /// Returns `true` if nothing is projected.
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Renders a comma separated list of name placeholders.
    pub fn render(&self, ctx: &mut ExpressionContext) -> String {
        self.paths
            .iter()
            .map(|path| ctx.path(path))
            .collect::<Vec<_>>()
            .join(", ")
    }
}
