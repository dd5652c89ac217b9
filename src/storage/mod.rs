//! Storage
//!
//! Item model and in-memory tables used by the local store.

mod item;
mod table;

pub use item::{key_of, AttributeValue, Item, Key, TableDescription};
pub use table::{Table, TableError, Tables};
