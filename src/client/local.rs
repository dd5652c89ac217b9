//! Local Cluster
//!
//! In-process multi-region store. All regions share one set of tables
//! (a global table); each region carries an access policy that decides
//! how calls routed through it are answered.

use async_trait::async_trait;
use hashbrown::HashMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

use super::{ClientResult, Connector, DataClient};
use crate::error::ClientError;
use crate::region::RegionEndpoint;
use crate::storage::{Item, Key, TableDescription, TableError, Tables};

pub const ACCESS_DENIED_CODE: &str = "AccessDeniedException";
pub const NOT_FOUND_CODE: &str = "ResourceNotFoundException";
pub const VALIDATION_CODE: &str = "ValidationException";

/// How a region answers calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionAccess {
    /// Calls are served
    Allowed,
    /// Calls fail with an access-denied store error
    Denied,
    /// Calls fail with a transport error
    Unreachable,
    /// Calls never complete
    Stalled,
}

#[derive(Debug)]
struct RegionState {
    access: RegionAccess,
    fail_connect: bool,
    connects: u64,
    closes: u64,
}

impl RegionState {
    fn new() -> Self {
        Self {
            access: RegionAccess::Allowed,
            fail_connect: false,
            connects: 0,
            closes: 0,
        }
    }
}

/// Shared handle to the in-process store
#[derive(Debug, Clone, Default)]
pub struct LocalCluster {
    tables: Tables,
    regions: Arc<RwLock<HashMap<String, RegionState>>>,
}

impl LocalCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a cluster with the given regions, all `Allowed`
    pub fn with_regions(regions: &[&str]) -> Self {
        let cluster = Self::new();
        for region in regions {
            cluster.add_region(region);
        }
        cluster
    }

    pub fn add_region(&self, region: &str) {
        self.regions
            .write()
            .entry(region.to_string())
            .or_insert_with(RegionState::new);
    }

    pub fn set_access(&self, region: &str, access: RegionAccess) {
        if let Some(state) = self.regions.write().get_mut(region) {
            state.access = access;
        }
    }

    pub fn access(&self, region: &str) -> Option<RegionAccess> {
        self.regions.read().get(region).map(|s| s.access)
    }

    /// Make client construction for `region` fail
    pub fn set_connect_failure(&self, region: &str, fail: bool) {
        if let Some(state) = self.regions.write().get_mut(region) {
            state.fail_connect = fail;
        }
    }

    /// Number of clients built for `region`
    pub fn connects(&self, region: &str) -> u64 {
        self.regions.read().get(region).map(|s| s.connects).unwrap_or(0)
    }

    /// Number of clients closed for `region`
    pub fn closes(&self, region: &str) -> u64 {
        self.regions.read().get(region).map(|s| s.closes).unwrap_or(0)
    }

    pub fn create_table(&self, name: &str, partition_key: &str, sort_key: Option<&str>) {
        self.tables.create(name, partition_key, sort_key);
    }

    /// Direct access to the shared tables, bypassing region policy
    pub fn tables(&self) -> &Tables {
        &self.tables
    }

    /// Apply the region's access policy to one call
    pub async fn admit(&self, region: &str) -> ClientResult<()> {
        let access = self.access(region).ok_or_else(|| {
            ClientError::Transport(format!("unknown region: {}", region))
        })?;
        match access {
            RegionAccess::Allowed => Ok(()),
            RegionAccess::Denied => Err(ClientError::store(
                ACCESS_DENIED_CODE,
                format!("region {} is not authorized for this caller", region),
            )),
            RegionAccess::Unreachable => Err(ClientError::Transport(format!(
                "region {} is unreachable",
                region
            ))),
            RegionAccess::Stalled => {
                futures::future::pending::<()>().await;
                Ok(())
            }
        }
    }

    pub async fn put_item(&self, region: &str, table: &str, item: Item) -> ClientResult<()> {
        self.admit(region).await?;
        self.tables
            .get(table)
            .and_then(|t| t.put(item))
            .map_err(table_error)
    }

    pub async fn get_item(&self, region: &str, table: &str, key: &Key) -> ClientResult<Option<Item>> {
        self.admit(region).await?;
        self.tables
            .get(table)
            .and_then(|t| t.get(key))
            .map_err(table_error)
    }

    pub async fn describe_table(&self, region: &str, table: &str) -> ClientResult<TableDescription> {
        self.admit(region).await?;
        self.tables
            .get(table)
            .map(|t| t.describe())
            .map_err(table_error)
    }

    pub async fn list_tables(&self, region: &str) -> ClientResult<Vec<String>> {
        self.admit(region).await?;
        Ok(self.tables.names())
    }

    fn record_connect(&self, region: &str) -> ClientResult<()> {
        let mut regions = self.regions.write();
        let state = regions.get_mut(region).ok_or_else(|| {
            ClientError::Transport(format!("no endpoint for region {}", region))
        })?;
        if state.fail_connect {
            return Err(ClientError::Transport(format!(
                "cannot build client for region {}",
                region
            )));
        }
        state.connects += 1;
        Ok(())
    }

    fn record_close(&self, region: &str) {
        if let Some(state) = self.regions.write().get_mut(region) {
            state.closes += 1;
        }
    }
}

fn table_error(err: TableError) -> ClientError {
    match err {
        TableError::NotFound(name) => {
            ClientError::store(NOT_FOUND_CODE, format!("table {} not found", name))
        }
        TableError::MissingKey(keys) => {
            ClientError::store(VALIDATION_CODE, format!("missing key attributes: {}", keys))
        }
    }
}

/// Client bound to one region of a `LocalCluster`
#[derive(Debug)]
pub struct LocalClient {
    cluster: LocalCluster,
    region: String,
    closed: AtomicBool,
}

impl LocalClient {
    fn check_open(&self) -> ClientResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ClientError::Transport("client is closed".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl DataClient for LocalClient {
    async fn put_item(&self, table: &str, item: Item) -> ClientResult<()> {
        self.check_open()?;
        self.cluster.put_item(&self.region, table, item).await
    }

    async fn get_item(&self, table: &str, key: &Key) -> ClientResult<Option<Item>> {
        self.check_open()?;
        self.cluster.get_item(&self.region, table, key).await
    }

    async fn describe_table(&self, table: &str) -> ClientResult<TableDescription> {
        self.check_open()?;
        self.cluster.describe_table(&self.region, table).await
    }

    async fn list_tables(&self) -> ClientResult<Vec<String>> {
        self.check_open()?;
        self.cluster.list_tables(&self.region).await
    }

    async fn close(&self) -> ClientResult<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.cluster.record_close(&self.region);
        }
        Ok(())
    }
}

/// Builds `LocalClient`s; the endpoint string is ignored
#[derive(Debug, Clone)]
pub struct LocalConnector {
    cluster: LocalCluster,
}

impl LocalConnector {
    pub fn new(cluster: LocalCluster) -> Self {
        Self { cluster }
    }
}

#[async_trait]
impl Connector for LocalConnector {
    async fn connect(&self, endpoint: &RegionEndpoint) -> ClientResult<Arc<dyn DataClient>> {
        self.cluster.record_connect(&endpoint.region)?;
        debug!(region = %endpoint.region, "Built local client");
        Ok(Arc::new(LocalClient {
            cluster: self.cluster.clone(),
            region: endpoint.region.clone(),
            closed: AtomicBool::new(false),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuthorizationOutcome;
    use crate::storage::AttributeValue;
    use tokio_test::{assert_err, assert_ok};

    fn person(last: &str, first: &str) -> Item {
        let mut item = Item::new();
        item.insert("last-name".into(), AttributeValue::s(last));
        item.insert("first-name".into(), AttributeValue::s(first));
        item
    }

    async fn client(cluster: &LocalCluster, region: &str) -> Arc<dyn DataClient> {
        let connector = LocalConnector::new(cluster.clone());
        assert_ok!(connector.connect(&RegionEndpoint::new(region, "local")).await)
    }

    #[tokio::test]
    async fn test_regions_share_tables() {
        let cluster = LocalCluster::with_regions(&["a", "b"]);
        cluster.create_table("Person", "last-name", Some("first-name"));

        let a = client(&cluster, "a").await;
        let b = client(&cluster, "b").await;
        assert_ok!(a.put_item("Person", person("x", "y")).await);

        let found = assert_ok!(b.get_item("Person", &person("x", "y")).await);
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn test_denied_region() {
        let cluster = LocalCluster::with_regions(&["a"]);
        cluster.create_table("Person", "last-name", Some("first-name"));
        cluster.set_access("a", RegionAccess::Denied);

        let a = client(&cluster, "a").await;
        let err = assert_err!(a.get_item("Person", &person("x", "y")).await);
        assert_eq!(err.outcome(), AuthorizationOutcome::Denied);
    }

    #[tokio::test]
    async fn test_unreachable_and_missing_table() {
        let cluster = LocalCluster::with_regions(&["a"]);
        let a = client(&cluster, "a").await;

        let err = assert_err!(a.describe_table("Nope").await);
        assert!(matches!(&err, ClientError::Store { code, .. } if code == NOT_FOUND_CODE));

        cluster.set_access("a", RegionAccess::Unreachable);
        let err = assert_err!(a.list_tables().await);
        assert_eq!(err.outcome(), AuthorizationOutcome::OtherFailure);
    }

    #[tokio::test]
    async fn test_connect_and_close_counters() {
        let cluster = LocalCluster::with_regions(&["a"]);
        let a = client(&cluster, "a").await;
        assert_eq!(cluster.connects("a"), 1);

        assert_ok!(a.close().await);
        assert_ok!(a.close().await);
        assert_eq!(cluster.closes("a"), 1);
        assert!(a.list_tables().await.is_err());
    }

    #[tokio::test]
    async fn test_connect_failure() {
        let cluster = LocalCluster::with_regions(&["a"]);
        cluster.set_connect_failure("a", true);

        let connector = LocalConnector::new(cluster.clone());
        assert!(connector
            .connect(&RegionEndpoint::new("a", "local"))
            .await
            .is_err());
        assert!(connector
            .connect(&RegionEndpoint::new("unknown", "local"))
            .await
            .is_err());
        assert_eq!(cluster.connects("a"), 0);
    }
}
