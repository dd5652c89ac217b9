//! Data Clients
//!
//! The seam between regional connections and the remote store: a
//! `Connector` builds one `DataClient` per region endpoint.

mod local;
mod remote;

pub use local::{
    LocalClient, LocalCluster, LocalConnector, RegionAccess, ACCESS_DENIED_CODE, NOT_FOUND_CODE,
    VALIDATION_CODE,
};
pub use remote::{RemoteClient, RemoteConnector};

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::ClientError;
use crate::region::RegionEndpoint;
use crate::storage::{Item, Key, TableDescription};

/// Result type for client calls
pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Wire client bound to one region's endpoint
#[async_trait]
pub trait DataClient: Send + Sync {
    /// Insert or replace an item
    async fn put_item(&self, table: &str, item: Item) -> ClientResult<()>;

    /// Read an item; `Ok(None)` when absent
    async fn get_item(&self, table: &str, key: &Key) -> ClientResult<Option<Item>>;

    async fn describe_table(&self, table: &str) -> ClientResult<TableDescription>;

    async fn list_tables(&self) -> ClientResult<Vec<String>>;

    /// Release the underlying resources
    async fn close(&self) -> ClientResult<()>;
}

/// Builds clients for region endpoints
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, endpoint: &RegionEndpoint) -> ClientResult<Arc<dyn DataClient>>;
}
