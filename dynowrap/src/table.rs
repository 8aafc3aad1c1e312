/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! The table handle and single-item operations.

use std::sync::Arc;

use dynowrap_core::{
    decode_item, encode_item, extract_key, AttributeMap, Item, ItemConvert, KeyInput,
    TableDescriptor, Value,
};
use dynowrap_expressions::{
    attr, AttributePath, Condition, ExpressionContext, ProjectionExpression, UpdateAction,
    UpdateExpression,
};

use crate::batch::{BatchGetBuilder, BatchWriteBuilder};
use crate::client::Client;
use crate::error::Error;
use crate::protocol::{
    ConsumedCapacity, DeleteItemInput, ExpressionAttributes, GetItemInput, GetItemOutput,
    PutItemInput, ReturnConsumedCapacity, ReturnValues, UpdateItemInput, WriteItemOutput,
};
use crate::query::QueryBuilder;
use crate::scan::ScanBuilder;
use crate::transport::Operation;

/// A table: its descriptor paired with the client that talks to it.
///
/// ```no_run
/// # async fn docs(client: dynowrap::Client) -> Result<(), dynowrap::Error> {
/// use dynowrap::{ScalarType, TableDescriptor};
///
/// let descriptor = TableDescriptor::builder("GameScores")
///     .hash_key("userId", ScalarType::String)
///     .range_key("gameTitle", ScalarType::String)
///     .build()?;
/// let table = client.table(descriptor);
/// let output = table.get(("u1", "Meteor Blasters")).send().await?;
/// println!("{:?}", output.item());
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct Table {
    client: Client,
    descriptor: Arc<TableDescriptor>,
}

impl Table {
    pub(crate) fn new(client: Client, descriptor: Arc<TableDescriptor>) -> Self {
        Self { client, descriptor }
    }

    /// The table descriptor.
    pub fn descriptor(&self) -> &TableDescriptor {
        &self.descriptor
    }

    pub(crate) fn descriptor_arc(&self) -> Arc<TableDescriptor> {
        self.descriptor.clone()
    }

    /// The client requests are sent through.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Reads one item.
    pub fn get(&self, key: impl Into<KeyInput>) -> GetBuilder {
        GetBuilder {
            table: self.clone(),
            key: key.into(),
            consistent_read: None,
            attributes: Vec::new(),
            return_consumed_capacity: None,
        }
    }

    /// Creates or replaces one item.
    pub fn put(&self, item: Item) -> PutBuilder {
        PutBuilder {
            table: self.clone(),
            item,
            overwrite: true,
            write: WriteOptions::default(),
        }
    }

    /// Modifies attributes of one item, creating it if it does not exist.
    pub fn update(&self, key: impl Into<KeyInput>) -> UpdateBuilder {
        UpdateBuilder {
            table: self.clone(),
            key: key.into(),
            expression: UpdateExpression::new(),
            write: WriteOptions::default(),
        }
    }

    /// Updates the item `item` identifies so that it carries `item`'s attributes.
    ///
    /// Non-null attributes are SET and null attributes REMOVEd. Attributes the item does
    /// not mention are left as they are.
    pub fn update_from(&self, item: &Item) -> UpdateBuilder {
        let mut expression = UpdateExpression::new();
        let mut names: Vec<&String> = item.keys().collect();
        names.sort();
        for name in names {
            if self.descriptor.key_names().hash_key == name
                || self.descriptor.key_names().range_key == Some(name.as_str())
            {
                continue;
            }
            let path = AttributePath::name(name.as_str());
            match &item[name] {
                Value::Null => expression.push(UpdateAction::Remove(path)),
                value => expression.push(UpdateAction::Set(path, value.clone())),
            }
        }
        UpdateBuilder {
            table: self.clone(),
            key: KeyInput::Item(item.clone()),
            expression,
            write: WriteOptions::default(),
        }
    }

    /// Deletes one item.
    pub fn delete(&self, key: impl Into<KeyInput>) -> DeleteBuilder {
        DeleteBuilder {
            table: self.clone(),
            key: key.into(),
            write: WriteOptions::default(),
        }
    }

    /// Queries the items sharing a hash key value.
    pub fn query(&self, hash: impl Into<Value>) -> QueryBuilder {
        QueryBuilder::new(self.clone(), hash.into())
    }

    /// Scans the table.
    pub fn scan(&self) -> ScanBuilder {
        ScanBuilder::new(self.clone())
    }

    /// Reads any number of items by key.
    pub fn batch_get<I, K>(&self, keys: I) -> BatchGetBuilder
    where
        I: IntoIterator<Item = K>,
        K: Into<KeyInput>,
    {
        BatchGetBuilder::new(self.clone(), keys.into_iter().map(Into::into).collect())
    }

    /// Puts and deletes any number of items.
    pub fn batch_write(&self) -> BatchWriteBuilder {
        BatchWriteBuilder::new(self.clone())
    }
}

/// Output of a single-item operation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ItemOutput {
    item: Option<Item>,
    consumed_capacity: Option<ConsumedCapacity>,
}

impl ItemOutput {
    fn new(item: Option<AttributeMap>, consumed_capacity: Option<ConsumedCapacity>) -> Self {
        Self {
            item: item.map(decode_item),
            consumed_capacity,
        }
    }

    /// The item read, or the attributes requested with [`ReturnValues`].
    pub fn item(&self) -> Option<&Item> {
        self.item.as_ref()
    }

    /// Consumes the output, returning the item.
    pub fn into_item(self) -> Option<Item> {
        self.item
    }

    /// Converts the item into `T`.
    pub fn item_as<T: ItemConvert>(&self) -> Result<Option<T>, Error> {
        self.item
            .clone()
            .map(T::from_item)
            .transpose()
            .map_err(Error::from)
    }

    /// Capacity consumed, when it was requested.
    pub fn consumed_capacity(&self) -> Option<&ConsumedCapacity> {
        self.consumed_capacity.as_ref()
    }
}

/// Builds a GetItem. Created with [`Table::get`].
#[derive(Debug, Clone)]
#[must_use]
pub struct GetBuilder {
    table: Table,
    key: KeyInput,
    consistent_read: Option<bool>,
    attributes: Vec<AttributePath>,
    return_consumed_capacity: Option<ReturnConsumedCapacity>,
}

impl GetBuilder {
    /// Requests a strongly consistent read.
    pub fn consistent_read(mut self, consistent_read: bool) -> Self {
        self.consistent_read = Some(consistent_read);
        self
    }

    /// Returns only the listed attributes.
    pub fn attributes<I, P>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<AttributePath>,
    {
        self.attributes.extend(attributes.into_iter().map(Into::into));
        self
    }

    /// Asks the store to report consumed capacity.
    pub fn return_consumed_capacity(mut self, mode: ReturnConsumedCapacity) -> Self {
        self.return_consumed_capacity = Some(mode);
        self
    }

    /// Reads the item.
    pub async fn send(self) -> Result<ItemOutput, Error> {
        let descriptor = self.table.descriptor();
        let key = extract_key(descriptor, &self.key)?;
        let mut ctx = ExpressionContext::new();
        let projection_expression = (!self.attributes.is_empty())
            .then(|| ProjectionExpression::new(self.attributes.iter().cloned()).render(&mut ctx));
        let input = GetItemInput {
            table_name: descriptor.name().to_string(),
            key: key.to_map(),
            consistent_read: self.consistent_read,
            projection_expression,
            expression_attribute_names: ctx.names(),
            return_consumed_capacity: self.return_consumed_capacity,
        };
        let output: GetItemOutput = self
            .table
            .client
            .call(Operation::GetItem, descriptor.name(), &input)
            .await?;
        Ok(ItemOutput::new(output.item, output.consumed_capacity))
    }
}

#[derive(Debug, Clone, Default)]
struct WriteOptions {
    conditions: Vec<Condition>,
    return_values: Option<ReturnValues>,
    return_consumed_capacity: Option<ReturnConsumedCapacity>,
}

impl WriteOptions {
    fn render_condition(
        &self,
        ctx: &mut ExpressionContext,
    ) -> Result<Option<String>, Error> {
        Ok(Condition::all(self.conditions.iter().cloned())
            .map(|condition| condition.render(ctx))
            .transpose()?)
    }
}

macro_rules! write_options {
    () => {
        /// Only writes if `condition` holds. Several conditions are combined with `AND`.
        pub fn condition(mut self, condition: Condition) -> Self {
            self.write.conditions.push(condition);
            self
        }

        /// Returns item attributes from before or after the write.
        pub fn return_values(mut self, return_values: ReturnValues) -> Self {
            self.write.return_values = Some(return_values);
            self
        }

        /// Asks the store to report consumed capacity.
        pub fn return_consumed_capacity(mut self, mode: ReturnConsumedCapacity) -> Self {
            self.write.return_consumed_capacity = Some(mode);
            self
        }
    };
}

/// Builds a PutItem. Created with [`Table::put`].
#[derive(Debug, Clone)]
#[must_use]
pub struct PutBuilder {
    table: Table,
    item: Item,
    overwrite: bool,
    write: WriteOptions,
}

impl PutBuilder {
    write_options!();

    /// With `false`, the put fails with `ConditionalCheckFailedException` if an item
    /// with the same key exists.
    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Writes the item.
    pub async fn send(self) -> Result<ItemOutput, Error> {
        let descriptor = self.table.descriptor();
        extract_key(descriptor, &KeyInput::Item(self.item.clone()))?;
        let item = encode_item(&self.item)?;
        let mut write = self.write.clone();
        if !self.overwrite {
            write.conditions.push(attr(descriptor.hash_key()).not_exists());
        }
        let mut ctx = ExpressionContext::new();
        let condition_expression = write.render_condition(&mut ctx)?;
        let (names, values) = ctx.into_parts();
        let input = PutItemInput {
            table_name: descriptor.name().to_string(),
            item,
            condition_expression,
            expression_attributes: ExpressionAttributes {
                expression_attribute_names: names,
                expression_attribute_values: values,
            },
            return_values: write.return_values,
            return_consumed_capacity: write.return_consumed_capacity,
        };
        let output: WriteItemOutput = self
            .table
            .client
            .call(Operation::PutItem, descriptor.name(), &input)
            .await?;
        Ok(ItemOutput::new(output.attributes, output.consumed_capacity))
    }
}

/// Builds an UpdateItem. Created with [`Table::update`] or [`Table::update_from`].
#[derive(Debug, Clone)]
#[must_use]
pub struct UpdateBuilder {
    table: Table,
    key: KeyInput,
    expression: UpdateExpression,
    write: WriteOptions,
}

impl UpdateBuilder {
    write_options!();

    /// `SET path = value`
    pub fn set(mut self, path: impl Into<AttributePath>, value: impl Into<Value>) -> Self {
        self.expression = self.expression.set(path, value);
        self
    }

    /// `SET path = if_not_exists(path, value)`
    pub fn set_if_not_exists(
        mut self,
        path: impl Into<AttributePath>,
        value: impl Into<Value>,
    ) -> Self {
        self.expression = self.expression.set_if_not_exists(path, value);
        self
    }

    /// `ADD path value`: increments a number or adds set members.
    pub fn add(mut self, path: impl Into<AttributePath>, value: impl Into<Value>) -> Self {
        self.expression = self.expression.add(path, value);
        self
    }

    /// `REMOVE path`
    pub fn remove(mut self, path: impl Into<AttributePath>) -> Self {
        self.expression = self.expression.remove(path);
        self
    }

    /// `DELETE path value`: removes set members.
    pub fn delete(mut self, path: impl Into<AttributePath>, value: impl Into<Value>) -> Self {
        self.expression = self.expression.delete(path, value);
        self
    }

    /// Appends every action of `expression`.
    pub fn expression(mut self, expression: UpdateExpression) -> Self {
        for action in expression.actions() {
            self.expression.push(action.clone());
        }
        self
    }

    /// Applies the update.
    pub async fn send(self) -> Result<ItemOutput, Error> {
        let descriptor = self.table.descriptor();
        let key = extract_key(descriptor, &self.key)?;
        if self.expression.is_empty() {
            return Err(Error::configuration("an update needs at least one action"));
        }
        let keys = descriptor.key_names();
        for action in self.expression.actions() {
            let root = action.path().root();
            if root == keys.hash_key || Some(root) == keys.range_key {
                return Err(Error::configuration(format!(
                    "key attribute '{root}' cannot be updated"
                )));
            }
        }
        let mut ctx = ExpressionContext::new();
        let update_expression = self.expression.render(&mut ctx)?;
        let condition_expression = self.write.render_condition(&mut ctx)?;
        let (names, values) = ctx.into_parts();
        let input = UpdateItemInput {
            table_name: descriptor.name().to_string(),
            key: key.to_map(),
            update_expression,
            condition_expression,
            expression_attributes: ExpressionAttributes {
                expression_attribute_names: names,
                expression_attribute_values: values,
            },
            return_values: self.write.return_values,
            return_consumed_capacity: self.write.return_consumed_capacity,
        };
        let output: WriteItemOutput = self
            .table
            .client
            .call(Operation::UpdateItem, descriptor.name(), &input)
            .await?;
        Ok(ItemOutput::new(output.attributes, output.consumed_capacity))
    }
}

/// Builds a DeleteItem. Created with [`Table::delete`].
#[derive(Debug, Clone)]
#[must_use]
pub struct DeleteBuilder {
    table: Table,
    key: KeyInput,
    write: WriteOptions,
}

impl DeleteBuilder {
    write_options!();

    /// Deletes the item. Deleting a missing item succeeds.
    pub async fn send(self) -> Result<ItemOutput, Error> {
        let descriptor = self.table.descriptor();
        let key = extract_key(descriptor, &self.key)?;
        let mut ctx = ExpressionContext::new();
        let condition_expression = self.write.render_condition(&mut ctx)?;
        let (names, values) = ctx.into_parts();
        let input = DeleteItemInput {
            table_name: descriptor.name().to_string(),
            key: key.to_map(),
            condition_expression,
            expression_attributes: ExpressionAttributes {
                expression_attribute_names: names,
                expression_attribute_values: values,
            },
            return_values: self.write.return_values,
            return_consumed_capacity: self.write.return_consumed_capacity,
        };
        let output: WriteItemOutput = self
            .table
            .client
            .call(Operation::DeleteItem, descriptor.name(), &input)
            .await?;
        Ok(ItemOutput::new(output.attributes, output.consumed_capacity))
    }
}
