/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Table descriptors: key structure, secondary indexes and key attribute types.
//!
//! A [`TableDescriptor`] is produced once by whatever defines the table and shared
//! read-only by every request afterwards.

use std::collections::HashMap;

use crate::error::ConfigurationError;
use crate::value::{AttributeValue, Value};

/// The scalar types a key attribute may have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    /// `S`
    String,
    /// `N`
    Number,
    /// `B`
    Binary,
}

impl ScalarType {
    /// Returns `true` if `value` is of this type.
    pub fn matches(&self, value: &Value) -> bool {
        matches!(
            (self, value),
            (ScalarType::String, Value::String(_))
                | (ScalarType::Number, Value::Number(_))
                | (ScalarType::Binary, Value::Binary(_))
        )
    }

    /// Returns `true` if the wire value is of this type.
    pub fn matches_wire(&self, value: &AttributeValue) -> bool {
        matches!(
            (self, value),
            (ScalarType::String, AttributeValue::S(_))
                | (ScalarType::Number, AttributeValue::N(_))
                | (ScalarType::Binary, AttributeValue::B(_))
        )
    }

    /// Returns the name used in error messages.
    pub fn name(&self) -> &'static str {
        match self {
            ScalarType::String => "string",
            ScalarType::Number => "number",
            ScalarType::Binary => "binary",
        }
    }
}

/// Whether a secondary index shares the table's hash key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexType {
    /// Shares the table's hash key, orders by a different range key.
    Local,
    /// Independent hash and range keys.
    Global,
}

/// Which attributes an index carries.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Projection {
    /// Every attribute.
    #[default]
    All,
    /// Only table and index keys.
    KeysOnly,
    /// Keys plus the listed attributes.
    Include(Vec<String>),
}

/// A secondary index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDescriptor {
    name: String,
    index_type: IndexType,
    hash_key: String,
    range_key: Option<String>,
    projection: Projection,
}

impl IndexDescriptor {
    /// A local index over `hash_key` (which must be the table's hash key) and `range_key`.
    pub fn local(
        name: impl Into<String>,
        hash_key: impl Into<String>,
        range_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            index_type: IndexType::Local,
            hash_key: hash_key.into(),
            range_key: Some(range_key.into()),
            projection: Projection::All,
        }
    }

    /// A global index hashed on `hash_key`.
    pub fn global(name: impl Into<String>, hash_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            index_type: IndexType::Global,
            hash_key: hash_key.into(),
            range_key: None,
            projection: Projection::All,
        }
    }

    /// Sets the index range key.
    pub fn with_range_key(mut self, range_key: impl Into<String>) -> Self {
        self.range_key = Some(range_key.into());
        self
    }

    /// Sets the projection.
    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.projection = projection;
        self
    }

    /// The index name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Local or global.
    pub fn index_type(&self) -> IndexType {
        self.index_type
    }

    /// The index hash key attribute.
    pub fn hash_key(&self) -> &str {
        &self.hash_key
    }

    /// The index range key attribute, if any.
    pub fn range_key(&self) -> Option<&str> {
        self.range_key.as_deref()
    }

    /// The attributes projected into the index.
    pub fn projection(&self) -> &Projection {
        &self.projection
    }
}

/// The key attributes a request targets: the table's primary key or an index's key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyNames<'a> {
    /// The hash key attribute.
    pub hash_key: &'a str,
    /// The range key attribute, if the table or index has one.
    pub range_key: Option<&'a str>,
}

/// Immutable description of a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescriptor {
    name: String,
    hash_key: String,
    range_key: Option<String>,
    indexes: Vec<IndexDescriptor>,
    attribute_types: HashMap<String, ScalarType>,
}

impl TableDescriptor {
    /// Starts building a descriptor for the named table.
    pub fn builder(name: impl Into<String>) -> TableDescriptorBuilder {
        TableDescriptorBuilder {
            name: name.into(),
            ..Default::default()
        }
    }

    /// The table name sent on every request.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The table hash key attribute.
    pub fn hash_key(&self) -> &str {
        &self.hash_key
    }

    /// The table range key attribute, if any.
    pub fn range_key(&self) -> Option<&str> {
        self.range_key.as_deref()
    }

    /// The table's primary key attributes.
    pub fn key_names(&self) -> KeyNames<'_> {
        KeyNames {
            hash_key: &self.hash_key,
            range_key: self.range_key.as_deref(),
        }
    }

    /// All secondary indexes.
    pub fn indexes(&self) -> &[IndexDescriptor] {
        &self.indexes
    }

    /// Looks up a secondary index by name.
    pub fn index(&self, name: &str) -> Option<&IndexDescriptor> {
        self.indexes.iter().find(|index| index.name == name)
    }

    /// Key attributes of the table (`None`) or of the named index.
    pub fn key_names_for(&self, index: Option<&str>) -> Result<KeyNames<'_>, ConfigurationError> {
        match index {
            None => Ok(self.key_names()),
            Some(name) => {
                let index = self.index(name).ok_or_else(|| {
                    ConfigurationError::new(format!(
                        "table '{}' has no index named '{name}'",
                        self.name
                    ))
                })?;
                Ok(KeyNames {
                    hash_key: &index.hash_key,
                    range_key: index.range_key.as_deref(),
                })
            }
        }
    }

    /// Declared type of an attribute, if the descriptor records one.
    pub fn attribute_type(&self, name: &str) -> Option<ScalarType> {
        self.attribute_types.get(name).copied()
    }

    /// Returns `true` if `name` is part of the table key or of any index key.
    pub fn is_key_attribute(&self, name: &str) -> bool {
        self.hash_key == name
            || self.range_key.as_deref() == Some(name)
            || self
                .indexes
                .iter()
                .any(|index| index.hash_key == name || index.range_key.as_deref() == Some(name))
    }
}

/// Builder for [`TableDescriptor`].
#[derive(Debug, Default)]
pub struct TableDescriptorBuilder {
    name: String,
    hash_key: Option<(String, ScalarType)>,
    range_key: Option<(String, ScalarType)>,
    indexes: Vec<IndexDescriptor>,
    attribute_types: HashMap<String, ScalarType>,
}

impl TableDescriptorBuilder {
    /// Sets the hash key attribute and its type.
    pub fn hash_key(mut self, name: impl Into<String>, ty: ScalarType) -> Self {
        self.hash_key = Some((name.into(), ty));
        self
    }

    /// Sets the range key attribute and its type.
    pub fn range_key(mut self, name: impl Into<String>, ty: ScalarType) -> Self {
        self.range_key = Some((name.into(), ty));
        self
    }

    /// Records the type of a non-primary attribute, typically an index key.
    pub fn attribute(mut self, name: impl Into<String>, ty: ScalarType) -> Self {
        self.attribute_types.insert(name.into(), ty);
        self
    }

    /// Adds a secondary index.
    pub fn index(mut self, index: IndexDescriptor) -> Self {
        self.indexes.push(index);
        self
    }

    /// Validates and builds the descriptor.
    pub fn build(self) -> Result<TableDescriptor, ConfigurationError> {
        if self.name.is_empty() {
            return Err(ConfigurationError::new("table name cannot be empty"));
        }
        let (hash_key, hash_type) = self.hash_key.ok_or_else(|| {
            ConfigurationError::new(format!("table '{}' has no hash key", self.name))
        })?;
        let mut attribute_types = self.attribute_types;
        attribute_types.insert(hash_key.clone(), hash_type);
        let range_key = match self.range_key {
            Some((name, ty)) => {
                if name == hash_key {
                    return Err(ConfigurationError::new(format!(
                        "'{name}' cannot be both hash and range key"
                    )));
                }
                attribute_types.insert(name.clone(), ty);
                Some(name)
            }
            None => None,
        };

        for (pos, index) in self.indexes.iter().enumerate() {
            if self.indexes[..pos].iter().any(|other| other.name == index.name) {
                return Err(ConfigurationError::new(format!(
                    "duplicate index name '{}'",
                    index.name
                )));
            }
            if index.index_type == IndexType::Local {
                if index.hash_key != hash_key {
                    return Err(ConfigurationError::new(format!(
                        "local index '{}' must use the table hash key '{hash_key}'",
                        index.name
                    )));
                }
                if index.range_key.is_none() {
                    return Err(ConfigurationError::new(format!(
                        "local index '{}' requires a range key",
                        index.name
                    )));
                }
            }
        }

        Ok(TableDescriptor {
            name: self.name,
            hash_key,
            range_key,
            indexes: self.indexes,
            attribute_types,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn game_scores() -> TableDescriptor {
        TableDescriptor::builder("GameScores")
            .hash_key("userId", ScalarType::String)
            .range_key("gameTitle", ScalarType::String)
            .attribute("topScore", ScalarType::Number)
            .index(
                IndexDescriptor::global("GameTitleIndex", "gameTitle")
                    .with_range_key("topScore")
                    .with_projection(Projection::Include(vec!["wins".into()])),
            )
            .index(IndexDescriptor::local("UserScoreIndex", "userId", "topScore"))
            .build()
            .expect("valid descriptor")
    }

    #[test]
    fn resolves_index_keys() {
        let table = game_scores();
        assert_eq!(
            table.key_names_for(Some("GameTitleIndex")).unwrap(),
            KeyNames {
                hash_key: "gameTitle",
                range_key: Some("topScore")
            }
        );
        assert_eq!(table.key_names_for(None).unwrap().hash_key, "userId");
        assert!(table.key_names_for(Some("Missing")).is_err());
        assert_eq!(table.attribute_type("topScore"), Some(ScalarType::Number));
        assert!(table.is_key_attribute("topScore"));
        assert!(!table.is_key_attribute("wins"));
    }

    #[test]
    fn validates_structure() {
        assert!(TableDescriptor::builder("t").build().is_err());
        assert!(TableDescriptor::builder("")
            .hash_key("id", ScalarType::String)
            .build()
            .is_err());
        let err = TableDescriptor::builder("t")
            .hash_key("id", ScalarType::String)
            .index(IndexDescriptor::local("ByAge", "other", "age"))
            .build()
            .unwrap_err();
        assert!(err.message().contains("must use the table hash key"));
        let err = TableDescriptor::builder("t")
            .hash_key("id", ScalarType::String)
            .index(IndexDescriptor::global("G", "a"))
            .index(IndexDescriptor::global("G", "b"))
            .build()
            .unwrap_err();
        assert!(err.message().contains("duplicate index"));
    }
}
