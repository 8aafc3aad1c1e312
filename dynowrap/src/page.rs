/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use serde::{Deserialize, Serialize};

use dynowrap_core::{decode_item, encode_value, AttributeMap, Item, ItemConvert};

use crate::error::Error;
use crate::protocol::{ConsumedCapacity, ReadPageOutput};

/// Where a read left off.
///
/// A cursor is the store's `LastEvaluatedKey`, passed back verbatim as the
/// `ExclusiveStartKey` of the next request. It serializes as the tagged wire map, so it
/// can be handed to another process and resumed there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(AttributeMap);

impl Cursor {
    /// Wraps a wire key map.
    pub fn from_wire(key: AttributeMap) -> Self {
        Self(key)
    }

    /// The wire key map.
    pub fn as_wire(&self) -> &AttributeMap {
        &self.0
    }

    /// Consumes the cursor, returning the wire key map.
    pub fn into_wire(self) -> AttributeMap {
        self.0
    }

    /// Builds a cursor from the key attributes of a decoded item, or `None` if the item
    /// lacks one of them.
    pub(crate) fn from_item<'a>(item: &Item, key_attributes: impl IntoIterator<Item = &'a str>) -> Option<Self> {
        let mut key = AttributeMap::new();
        for name in key_attributes {
            let value = encode_value(item.get(name)?).ok()?;
            key.insert(name.to_string(), value);
        }
        Some(Self(key))
    }
}

/// One decoded Query or Scan response.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    items: Vec<Item>,
    count: usize,
    scanned_count: usize,
    next_cursor: Option<Cursor>,
    consumed_capacity: Option<ConsumedCapacity>,
}

impl Page {
    pub(crate) fn from_output(output: ReadPageOutput) -> Self {
        Self {
            items: output.items.into_iter().map(decode_item).collect(),
            count: output.count,
            scanned_count: output.scanned_count,
            next_cursor: output.last_evaluated_key.map(Cursor),
            consumed_capacity: output.consumed_capacity,
        }
    }

    /// The items, in the order the store returned them. Empty for `Select::Count`.
    pub fn items(&self) -> &[Item] {
        &self.items
    }

    /// Consumes the page, returning its items.
    pub fn into_items(self) -> Vec<Item> {
        self.items
    }

    /// Converts every item into `T`.
    pub fn items_as<T: ItemConvert>(&self) -> Result<Vec<T>, Error> {
        self.items
            .iter()
            .cloned()
            .map(|item| T::from_item(item).map_err(Error::from))
            .collect()
    }

    /// The number of items that matched, after filtering.
    pub fn count(&self) -> usize {
        self.count
    }

    /// The number of items evaluated, before filtering.
    pub fn scanned_count(&self) -> usize {
        self.scanned_count
    }

    /// Where the next page starts, or `None` if this was the last page.
    pub fn next_cursor(&self) -> Option<&Cursor> {
        self.next_cursor.as_ref()
    }

    /// Returns `true` if no further page exists.
    pub fn is_last(&self) -> bool {
        self.next_cursor.is_none()
    }

    /// Capacity consumed by the call, when it was requested.
    pub fn consumed_capacity(&self) -> Option<&ConsumedCapacity> {
        self.consumed_capacity.as_ref()
    }

    /// Keeps the first `len` items. The cursor is rebuilt from the last kept item, or
    /// dropped when `key_attributes` is `None` or the item lacks a key attribute.
    pub(crate) fn truncate(&mut self, len: usize, key_attributes: Option<&[String]>) {
        if self.items.len() <= len {
            return;
        }
        self.items.truncate(len);
        self.count = len;
        self.next_cursor = match (self.items.last(), key_attributes) {
            (Some(last), Some(names)) => Cursor::from_item(last, names.iter().map(String::as_str)),
            _ => None,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dynowrap_core::{AttributeValue, Value};
    use pretty_assertions::assert_eq;

    fn item(user: &str, ts: i64, extra: &str) -> AttributeMap {
        let mut map = AttributeMap::new();
        map.insert("userId".into(), AttributeValue::S(user.into()));
        map.insert("ts".into(), AttributeValue::N(ts.into()));
        map.insert("note".into(), AttributeValue::S(extra.into()));
        map
    }

    fn page() -> Page {
        Page::from_output(ReadPageOutput {
            items: vec![item("u1", 1, "a"), item("u1", 2, "b"), item("u1", 3, "c")],
            count: 3,
            scanned_count: 4,
            last_evaluated_key: Some(item("u1", 3, "c")),
            consumed_capacity: None,
        })
    }

    #[test]
    fn decodes_items() {
        let page = page();
        assert_eq!(page.items().len(), 3);
        assert_eq!(page.items()[0]["note"], Value::from("a"));
        assert_eq!(page.scanned_count(), 4);
        assert!(!page.is_last());
    }

    #[test]
    fn truncation_rebuilds_the_cursor_from_the_last_kept_item() {
        let mut page = page();
        let keys = vec!["userId".to_string(), "ts".to_string()];
        page.truncate(2, Some(&keys));
        assert_eq!(page.items().len(), 2);
        assert_eq!(page.count(), 2);
        let cursor = page.next_cursor().unwrap().as_wire();
        assert_eq!(cursor.len(), 2);
        assert_eq!(cursor["ts"], AttributeValue::N(2i64.into()));
    }

    #[test]
    fn truncation_without_key_attributes_drops_the_cursor() {
        let mut page = page();
        page.truncate(1, None);
        assert!(page.is_last());

        let mut page = self::page();
        page.truncate(1, Some(&["missing".to_string()]));
        assert!(page.is_last());
    }

    #[test]
    fn cursors_serialize_as_wire_maps() {
        let cursor = page().next_cursor().cloned().unwrap();
        let json = serde_json::to_string(&cursor).unwrap();
        let parsed: Cursor = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, cursor);
    }
}
