/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Options shared by Query and Scan.

use tokio_util::sync::CancellationToken;

use dynowrap_core::{IndexType, KeyNames, TableDescriptor};
use dynowrap_expressions::{AttributePath, Condition, ExpressionContext, ProjectionExpression};

use crate::error::Error;
use crate::page::Cursor;
use crate::protocol::{ReturnConsumedCapacity, Select};

#[derive(Debug, Clone, Default)]
pub(crate) struct ReadOptions {
    pub(crate) index: Option<String>,
    pub(crate) filters: Vec<Condition>,
    pub(crate) attributes: Vec<AttributePath>,
    pub(crate) limit: Option<u32>,
    pub(crate) consistent_read: Option<bool>,
    pub(crate) select: Option<Select>,
    pub(crate) return_consumed_capacity: Option<ReturnConsumedCapacity>,
    pub(crate) cursor: Option<Cursor>,
    pub(crate) cancellation: Option<CancellationToken>,
}

/// Expression fields rendered from [`ReadOptions`].
#[derive(Debug, Default)]
pub(crate) struct RenderedRead {
    pub(crate) filter_expression: Option<String>,
    pub(crate) projection_expression: Option<String>,
}

impl ReadOptions {
    /// Checks the options against the table and renders filter and projection into `ctx`.
    ///
    /// `protected_keys` are key attributes filters may not reference.
    pub(crate) fn render(
        &self,
        table: &TableDescriptor,
        protected_keys: Option<KeyNames<'_>>,
        ctx: &mut ExpressionContext,
    ) -> Result<RenderedRead, Error> {
        if self.limit == Some(0) {
            return Err(Error::configuration("limit must be at least 1"));
        }
        if let Some(index) = &self.index {
            let descriptor = table.index(index).ok_or_else(|| {
                Error::configuration(format!(
                    "table '{}' has no index named '{index}'",
                    table.name()
                ))
            })?;
            if descriptor.index_type() == IndexType::Global && self.consistent_read == Some(true) {
                return Err(Error::configuration(format!(
                    "consistent reads are not supported on global secondary index '{index}'"
                )));
            }
        }
        match (self.select, self.attributes.is_empty()) {
            (Some(Select::SpecificAttributes), true) => {
                return Err(Error::configuration(
                    "Select::SpecificAttributes requires at least one attribute",
                ))
            }
            (Some(select @ (Select::Count | Select::AllAttributes)), false) => {
                return Err(Error::configuration(format!(
                    "{select:?} cannot be combined with a projection"
                )))
            }
            _ => {}
        }

        let filter = Condition::all(self.filters.iter().cloned());
        if let (Some(filter), Some(keys)) = (&filter, protected_keys) {
            for path in filter.paths() {
                let root = path.root();
                if root == keys.hash_key || Some(root) == keys.range_key {
                    return Err(Error::configuration(format!(
                        "filter conditions cannot reference key attribute '{root}'; use the key condition instead"
                    )));
                }
            }
        }
        let filter_expression = filter.map(|filter| filter.render(ctx)).transpose()?;
        let projection_expression = (!self.attributes.is_empty())
            .then(|| ProjectionExpression::new(self.attributes.iter().cloned()).render(ctx));
        Ok(RenderedRead {
            filter_expression,
            projection_expression,
        })
    }

    /// A copy whose projection, if any, also returns `keys`.
    pub(crate) fn with_projected_keys(&self, keys: &[String]) -> ReadOptions {
        let mut options = self.clone();
        if options.attributes.is_empty() {
            return options;
        }
        for key in keys {
            let projected = options
                .attributes
                .iter()
                .any(|path| path.is_top_level() && path.root() == key);
            if !projected {
                options.attributes.push(AttributePath::name(key.as_str()));
            }
        }
        options
    }

    /// The select mode sent on the wire: explicit, or implied by a projection.
    pub(crate) fn wire_select(&self) -> Option<Select> {
        match self.select {
            Some(select) => Some(select),
            None if !self.attributes.is_empty() => Some(Select::SpecificAttributes),
            None => None,
        }
    }
}

/// Attributes a cursor needs: the table key, plus the index key when reading an index.
pub(crate) fn cursor_attributes(
    table: &TableDescriptor,
    index: Option<&str>,
) -> Result<Vec<String>, Error> {
    let mut names = Vec::with_capacity(4);
    let table_keys = table.key_names();
    let index_keys = table.key_names_for(index)?;
    for name in [
        Some(table_keys.hash_key),
        table_keys.range_key,
        Some(index_keys.hash_key),
        index_keys.range_key,
    ]
    .into_iter()
    .flatten()
    {
        if !names.iter().any(|existing| existing == name) {
            names.push(name.to_string());
        }
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dynowrap_core::{IndexDescriptor, Projection, ScalarType};
    use dynowrap_expressions::attr;

    fn scores() -> TableDescriptor {
        TableDescriptor::builder("GameScores")
            .hash_key("userId", ScalarType::String)
            .range_key("gameTitle", ScalarType::String)
            .attribute("topScore", ScalarType::Number)
            .index(
                IndexDescriptor::global("GameTitleIndex", "gameTitle")
                    .with_range_key("topScore")
                    .with_projection(Projection::KeysOnly),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn cursor_attributes_include_index_keys_once() {
        let table = scores();
        assert_eq!(cursor_attributes(&table, None).unwrap(), ["userId", "gameTitle"]);
        assert_eq!(
            cursor_attributes(&table, Some("GameTitleIndex")).unwrap(),
            ["userId", "gameTitle", "topScore"]
        );
        assert!(cursor_attributes(&table, Some("Missing")).is_err());
    }

    #[test]
    fn rejects_invalid_combinations() {
        let table = scores();
        let mut ctx = ExpressionContext::new();
        let zero_limit = ReadOptions {
            limit: Some(0),
            ..Default::default()
        };
        assert!(zero_limit.render(&table, None, &mut ctx).is_err());

        let consistent_gsi = ReadOptions {
            index: Some("GameTitleIndex".into()),
            consistent_read: Some(true),
            ..Default::default()
        };
        let err = consistent_gsi.render(&table, None, &mut ctx).unwrap_err();
        assert!(err.to_string().contains("consistent reads"));

        let count_with_projection = ReadOptions {
            select: Some(Select::Count),
            attributes: vec!["topScore".into()],
            ..Default::default()
        };
        assert!(count_with_projection.render(&table, None, &mut ctx).is_err());
    }

    #[test]
    fn filters_may_not_touch_protected_keys() {
        let table = scores();
        let mut ctx = ExpressionContext::new();
        let options = ReadOptions {
            filters: vec![attr("gameTitle").eq("Meteor Blasters")],
            ..Default::default()
        };
        let err = options
            .render(&table, Some(table.key_names()), &mut ctx)
            .unwrap_err();
        assert!(err.to_string().contains("gameTitle"));
        // a scan has no key condition, so key attributes may be filtered on
        assert!(options.render(&table, None, &mut ctx).is_ok());
    }

    #[test]
    fn projected_keys_are_added_once() {
        let options = ReadOptions {
            attributes: vec!["topScore".into(), "userId".into()],
            ..Default::default()
        };
        let keys = cursor_attributes(&scores(), Some("GameTitleIndex")).unwrap();
        let projected = options.with_projected_keys(&keys);
        let mut ctx = ExpressionContext::new();
        let rendered = projected.render(&scores(), None, &mut ctx).unwrap();
        assert_eq!(
            rendered.projection_expression.as_deref(),
            Some("#topScore, #userId, #gameTitle")
        );

        let unprojected = ReadOptions::default().with_projected_keys(&keys);
        assert!(unprojected.attributes.is_empty());
    }

    #[test]
    fn renders_filter_and_projection() {
        let table = scores();
        let mut ctx = ExpressionContext::new();
        let options = ReadOptions {
            filters: vec![attr("topScore").gt(100), attr("wins").exists()],
            attributes: vec!["topScore".into(), "wins".into()],
            ..Default::default()
        };
        let rendered = options.render(&table, None, &mut ctx).unwrap();
        assert_eq!(
            rendered.filter_expression.as_deref(),
            Some("#topScore > :topScore AND attribute_exists(#wins)")
        );
        assert_eq!(rendered.projection_expression.as_deref(), Some("#topScore, #wins"));
        assert_eq!(options.wire_select(), Some(Select::SpecificAttributes));
    }
}
