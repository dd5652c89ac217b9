//! Concurrent In-Memory Tables
//!
//! Item tables backed by DashMap, keyed by each item's key attributes.

use dashmap::DashMap;
use std::sync::Arc;

use super::item::{Item, Key, TableDescription};

/// Why a table rejected a write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableError {
    /// The table does not exist
    NotFound(String),
    /// The item is missing one of the key attributes
    MissingKey(String),
}

/// One table: key schema plus items
///
/// Each shard has its own lock, so puts and gets on different keys
/// proceed in parallel.
#[derive(Debug)]
pub struct Table {
    name: String,
    partition_key: String,
    sort_key: Option<String>,
    items: DashMap<Key, Item>,
}

impl Table {
    pub fn new(name: &str, partition_key: &str, sort_key: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            partition_key: partition_key.to_string(),
            sort_key: sort_key.map(str::to_string),
            items: DashMap::new(),
        }
    }

    /// Current metadata snapshot
    pub fn describe(&self) -> TableDescription {
        TableDescription {
            name: self.name.clone(),
            partition_key: self.partition_key.clone(),
            sort_key: self.sort_key.clone(),
            item_count: self.items.len() as u64,
            status: "ACTIVE".to_string(),
        }
    }

    /// Insert or replace an item
    #[inline]
    pub fn put(&self, item: Item) -> Result<(), TableError> {
        let key = self
            .describe()
            .key_from(&item)
            .ok_or_else(|| TableError::MissingKey(self.key_names()))?;
        self.items.insert(key, item);
        Ok(())
    }

    /// Look up an item by its full key.
    ///
    /// Extra attributes in `key` are ignored.
    #[inline]
    pub fn get(&self, key: &Key) -> Result<Option<Item>, TableError> {
        let key = self
            .describe()
            .key_from(key)
            .ok_or_else(|| TableError::MissingKey(self.key_names()))?;
        Ok(self.items.get(&key).map(|entry| entry.value().clone()))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn key_names(&self) -> String {
        match &self.sort_key {
            Some(sort) => format!("{}, {}", self.partition_key, sort),
            None => self.partition_key.clone(),
        }
    }
}

/// Catalog of tables, shared by clone
#[derive(Debug, Clone, Default)]
pub struct Tables {
    inner: Arc<DashMap<String, Arc<Table>>>,
}

impl Tables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a table; an existing table with the same name is kept
    pub fn create(&self, name: &str, partition_key: &str, sort_key: Option<&str>) -> Arc<Table> {
        self.inner
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Table::new(name, partition_key, sort_key)))
            .value()
            .clone()
    }

    pub fn get(&self, name: &str) -> Result<Arc<Table>, TableError> {
        self.inner
            .get(name)
            .map(|t| t.value().clone())
            .ok_or_else(|| TableError::NotFound(name.to_string()))
    }

    /// Table names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.iter().map(|r| r.key().clone()).collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::AttributeValue;
    use std::thread;

    fn person(last: &str, first: &str) -> Item {
        let mut item = Item::new();
        item.insert("last-name".into(), AttributeValue::s(last));
        item.insert("first-name".into(), AttributeValue::s(first));
        item
    }

    #[test]
    fn test_basic_operations() {
        let table = Table::new("Person", "last-name", Some("first-name"));
        let mut item = person("Scriffiny", "Patty");
        item.insert("timestamp".into(), AttributeValue::s("t1"));

        table.put(item.clone()).unwrap();
        assert_eq!(table.get(&person("Scriffiny", "Patty")).unwrap(), Some(item));
        assert_eq!(table.get(&person("Scriffiny", "Other")).unwrap(), None);
        assert_eq!(table.describe().item_count, 1);
    }

    #[test]
    fn test_put_replaces_same_key() {
        let table = Table::new("Person", "last-name", Some("first-name"));
        table.put(person("a", "b")).unwrap();
        table.put(person("a", "b")).unwrap();
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_missing_key_attribute() {
        let table = Table::new("Person", "last-name", Some("first-name"));
        let mut item = Item::new();
        item.insert("last-name".into(), AttributeValue::s("a"));

        assert!(matches!(table.put(item), Err(TableError::MissingKey(_))));
    }

    #[test]
    fn test_catalog() {
        let tables = Tables::new();
        tables.create("Person", "last-name", Some("first-name"));
        tables.create("Audit", "id", None);

        assert_eq!(tables.names(), vec!["Audit".to_string(), "Person".to_string()]);
        assert!(matches!(tables.get("Nope"), Err(TableError::NotFound(_))));
    }

    #[test]
    fn test_concurrent_access() {
        let table = Arc::new(Table::new("Person", "last-name", Some("first-name")));

        let handles: Vec<_> = (0..10)
            .map(|i| {
                let t = table.clone();
                thread::spawn(move || {
                    for j in 0..100 {
                        t.put(person(&format!("last-{}", i), &format!("first-{}", j)))
                            .unwrap();
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(table.len(), 1000);
    }
}
