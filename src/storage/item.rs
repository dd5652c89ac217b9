//! Items and Attribute Values
//!
//! Value objects exchanged with the remote store.

use bytes::Bytes;
use std::collections::BTreeMap;
use std::fmt;

/// A single attribute value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AttributeValue {
    /// String
    S(String),
    /// Number, kept in its decimal string form
    N(String),
    /// Binary
    B(Bytes),
    /// Boolean
    Bool(bool),
    /// Explicit null
    Null,
}

impl AttributeValue {
    pub fn s(value: impl Into<String>) -> Self {
        AttributeValue::S(value.into())
    }

    pub fn n(value: impl ToString) -> Self {
        AttributeValue::N(value.to_string())
    }

    /// String content, if this is an `S` value
    pub fn as_s(&self) -> Option<&str> {
        match self {
            AttributeValue::S(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::S(s) => write!(f, "S({})", s),
            AttributeValue::N(n) => write!(f, "N({})", n),
            AttributeValue::B(b) => write!(f, "B({} bytes)", b.len()),
            AttributeValue::Bool(v) => write!(f, "BOOL({})", v),
            AttributeValue::Null => write!(f, "NULL"),
        }
    }
}

/// An item: attribute name to value, ordered by name
pub type Item = BTreeMap<String, AttributeValue>;

/// A key is an item holding only the key attributes
pub type Key = Item;

/// Build a key from a partition attribute and an optional sort attribute
pub fn key_of(
    partition: (&str, AttributeValue),
    sort: Option<(&str, AttributeValue)>,
) -> Key {
    let mut key = Key::new();
    key.insert(partition.0.to_string(), partition.1);
    if let Some((name, value)) = sort {
        key.insert(name.to_string(), value);
    }
    key
}

/// Table metadata as reported by `describe_table`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescription {
    pub name: String,
    pub partition_key: String,
    pub sort_key: Option<String>,
    pub item_count: u64,
    pub status: String,
}

impl TableDescription {
    /// Extract this table's key attributes from an item.
    ///
    /// Returns `None` when a key attribute is missing.
    pub fn key_from(&self, item: &Item) -> Option<Key> {
        let mut key = Key::new();
        let partition = item.get(&self.partition_key)?;
        key.insert(self.partition_key.clone(), partition.clone());
        if let Some(sort_key) = &self.sort_key {
            let sort = item.get(sort_key)?;
            key.insert(sort_key.clone(), sort.clone());
        }
        Some(key)
    }
}

impl fmt::Display for TableDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] pk={} sk={} items={}",
            self.name,
            self.status,
            self.partition_key,
            self.sort_key.as_deref().unwrap_or("-"),
            self.item_count
        )
    }
}
