//! Connection Manager
//!
//! Owns one `RegionalConnection` per configured region, hands out the
//! current primary, and keeps primary status fresh from a background
//! poller.
//!
//! The region set is published as an immutable `Generation`. A rebuild
//! builds a complete new generation, swaps it in, and only then retires the
//! old one, so a lookup never walks a half-built or half-closed map.

use futures::future::join_all;
use parking_lot::{Mutex as SyncMutex, RwLock};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::config::ManagerConfig;
use super::connection::{ConnectionSettings, PrimaryState, RegionalConnection};
use super::poller::Poller;
use crate::client::Connector;
use crate::error::Result;
use crate::metrics::FailoverMetrics;

/// One immutable set of regional connections, in configuration order
pub(crate) struct Generation {
    number: u64,
    connections: Vec<Arc<RegionalConnection>>,
}

/// State shared between the manager handle and its poller
pub(crate) struct ManagerShared {
    config: ManagerConfig,
    settings: Arc<ConnectionSettings>,
    current: RwLock<Arc<Generation>>,
    /// Serialises poll cycles and rebuilds
    cycle_lock: Mutex<()>,
}

impl ManagerShared {
    pub(crate) fn metrics(&self) -> &FailoverMetrics {
        &self.settings.metrics
    }

    fn snapshot(&self) -> Arc<Generation> {
        self.current.read().clone()
    }

    /// Create every connection and run its initial probe
    async fn build_generation(
        config: &ManagerConfig,
        settings: &Arc<ConnectionSettings>,
        number: u64,
    ) -> Generation {
        let connections: Vec<Arc<RegionalConnection>> = config
            .regions
            .iter()
            .map(|endpoint| Arc::new(RegionalConnection::new(endpoint.clone(), settings.clone())))
            .collect();

        join_all(connections.iter().map(|conn| conn.get_handle())).await;

        Generation {
            number,
            connections,
        }
    }

    /// Probe every region and rebuild if any cached status is stale.
    ///
    /// Probes run concurrently; the rebuild decision uses the complete set
    /// of results from this cycle. Returns `true` when a rebuild happened.
    pub(crate) async fn poll_once(&self) -> bool {
        let _cycle = self.cycle_lock.lock().await;
        self.metrics().record_poll_cycle();

        let snapshot = self.snapshot();
        let results = join_all(snapshot.connections.iter().map(|conn| async move {
            let should_be_primary = conn.probe_health().await;
            let cached = conn.is_primary().await;
            (conn.region(), should_be_primary, cached)
        }))
        .await;

        let changed: Vec<&str> = results
            .iter()
            .filter(|(_, should_be_primary, cached)| should_be_primary != cached)
            .map(|(region, _, _)| *region)
            .collect();

        if changed.is_empty() {
            debug!(generation = snapshot.number, "Primary status unchanged");
            return false;
        }

        info!(
            regions = ?changed,
            generation = snapshot.number,
            "Primary status changed, rebuilding all regional connections"
        );
        self.rebuild(snapshot.number + 1).await;
        true
    }

    /// Replace every connection. Caller holds `cycle_lock`.
    async fn rebuild(&self, number: u64) {
        let next = Arc::new(Self::build_generation(&self.config, &self.settings, number).await);
        let old = std::mem::replace(&mut *self.current.write(), next);
        self.metrics().record_rebuild();

        join_all(old.connections.iter().map(|conn| conn.retire())).await;
        info!(generation = number, "Regional connections rebuilt");
    }
}

/// Per-region line of a status report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionStatus {
    pub region: String,
    pub state: PrimaryState,
    pub has_handle: bool,
}

/// Point-in-time view of the manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerStatus {
    pub generation: u64,
    pub regions: Vec<RegionStatus>,
}

impl ManagerStatus {
    /// First region in configuration order whose cached state is primary
    pub fn primary(&self) -> Option<&str> {
        self.regions
            .iter()
            .find(|r| r.state == PrimaryState::Primary)
            .map(|r| r.region.as_str())
    }
}

impl fmt::Display for ManagerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "generation {}:", self.generation)?;
        for region in &self.regions {
            write!(
                f,
                " {}={}{}",
                region.region,
                region.state,
                if region.has_handle { "" } else { "(closed)" }
            )?;
        }
        Ok(())
    }
}

/// Multi-region connection manager
pub struct ConnectionManager {
    shared: Arc<ManagerShared>,
    shutdown: CancellationToken,
    poller: SyncMutex<Option<JoinHandle<()>>>,
}

impl ConnectionManager {
    /// Connect to every configured region, probe each one, and start the
    /// background poller.
    ///
    /// Must be called from within a Tokio runtime. Unreachable regions do
    /// not fail the call; only an invalid configuration does.
    pub async fn start(config: ManagerConfig, connector: Arc<dyn Connector>) -> Result<Self> {
        config.validate()?;

        let metrics = Arc::new(FailoverMetrics::new());
        let settings = Arc::new(ConnectionSettings::new(connector, &config, metrics));
        let generation = ManagerShared::build_generation(&config, &settings, 0).await;

        let poll_interval = config.poll_interval;
        let shared = Arc::new(ManagerShared {
            config,
            settings,
            current: RwLock::new(Arc::new(generation)),
            cycle_lock: Mutex::new(()),
        });

        let shutdown = CancellationToken::new();
        let poller = Poller::spawn(shared.clone(), poll_interval, shutdown.clone());

        let manager = Self {
            shared,
            shutdown,
            poller: SyncMutex::new(Some(poller)),
        };
        info!(
            regions = manager.shared.config.regions.len(),
            interval = ?poll_interval,
            "Connection manager started"
        );
        Ok(manager)
    }

    /// First region, in configuration order, whose cached status is
    /// primary. Returns `None` when no region qualifies right now; waiting
    /// and retrying is up to the caller.
    ///
    /// Reads cached state only and never connects. Every connection of a
    /// published generation has already run its initial probe; regions that
    /// could not be reached are picked up by the poller. Selection happens
    /// under the read lock, so the result belongs to the generation that
    /// was current at that moment and had not been retired.
    pub fn get_primary_connection(&self) -> Option<Arc<RegionalConnection>> {
        self.shared
            .current
            .read()
            .connections
            .iter()
            .find(|conn| conn.state() == PrimaryState::Primary)
            .cloned()
    }

    /// Connection currently bound to `region`
    pub fn connection(&self, region: &str) -> Option<Arc<RegionalConnection>> {
        self.shared
            .snapshot()
            .connections
            .iter()
            .find(|conn| conn.region() == region)
            .cloned()
    }

    /// Number of rebuilds so far
    pub fn generation(&self) -> u64 {
        self.shared.snapshot().number
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.shared.config
    }

    pub fn metrics(&self) -> Arc<FailoverMetrics> {
        self.shared.settings.metrics.clone()
    }

    /// Run one poll cycle now; `true` if it rebuilt the connections
    pub async fn poll_once(&self) -> bool {
        self.shared.poll_once().await
    }

    pub async fn status(&self) -> ManagerStatus {
        let snapshot = self.shared.snapshot();
        let mut regions = Vec::with_capacity(snapshot.connections.len());
        for conn in &snapshot.connections {
            regions.push(RegionStatus {
                region: conn.region().to_string(),
                state: conn.state(),
                has_handle: conn.has_handle().await,
            });
        }
        ManagerStatus {
            generation: snapshot.number,
            regions,
        }
    }

    /// Close every connection of the current generation
    pub async fn close_all(&self) {
        let snapshot = self.shared.snapshot();
        join_all(snapshot.connections.iter().map(|conn| conn.close())).await;
    }

    /// Stop the poller, wait for it, and close every connection
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let poller = self.poller.lock().take();
        if let Some(handle) = poller {
            if let Err(e) = handle.await {
                warn!(error = %e, "Region poller ended abnormally");
            }
        }
        self.close_all().await;
        info!(summary = %self.shared.metrics().summary(), "Connection manager shut down");
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{
        ClientResult, DataClient, LocalCluster, LocalConnector, RegionAccess, RemoteConnector,
    };
    use crate::error::Error;
    use crate::region::RegionEndpoint;
    use crate::server::EndpointServer;
    use crate::storage::{AttributeValue, Item};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tokio_test::assert_ok;

    fn cluster(regions: &[&str]) -> LocalCluster {
        let cluster = LocalCluster::with_regions(regions);
        cluster.create_table("Person", "last-name", Some("first-name"));
        cluster
    }

    fn config(regions: &[&str], poll_interval: Duration) -> ManagerConfig {
        regions
            .iter()
            .fold(ManagerConfig::default(), |config, region| {
                config.with_region(*region, "local")
            })
            .with_poll_interval(poll_interval)
            .with_request_timeout(Duration::from_millis(200))
    }

    async fn manager(cluster: &LocalCluster, regions: &[&str]) -> ConnectionManager {
        // Long interval: tests drive cycles with poll_once()
        let config = config(regions, Duration::from_secs(3600));
        assert_ok!(ConnectionManager::start(config, Arc::new(LocalConnector::new(cluster.clone()))).await)
    }

    fn person(last: &str, first: &str) -> Item {
        let mut item = Item::new();
        item.insert("last-name".into(), AttributeValue::s(last));
        item.insert("first-name".into(), AttributeValue::s(first));
        item
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let cluster = cluster(&["a"]);
        let connector = Arc::new(LocalConnector::new(cluster));
        let result = ConnectionManager::start(ManagerConfig::default(), connector).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_start_probes_every_region() {
        let cluster = cluster(&["a", "b"]);
        cluster.set_access("a", RegionAccess::Denied);
        let manager = manager(&cluster, &["a", "b"]).await;

        let status = manager.status().await;
        assert_eq!(status.generation, 0);
        assert_eq!(status.regions[0].state, PrimaryState::NotPrimary);
        assert_eq!(status.regions[1].state, PrimaryState::Primary);
        assert!(status.regions.iter().all(|r| r.has_handle));
        assert_eq!(status.primary(), Some("b"));

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_selection_follows_configuration_order() {
        let cluster = cluster(&["a", "b"]);
        let manager = manager(&cluster, &["b", "a"]).await;

        let first = manager.get_primary_connection().unwrap();
        let second = manager.get_primary_connection().unwrap();
        assert_eq!(first.region(), "b");
        assert!(Arc::ptr_eq(&first, &second));

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_failover_scenario() {
        let cluster = cluster(&["A", "B"]);
        cluster.set_access("A", RegionAccess::Denied);
        let manager = manager(&cluster, &["A", "B"]).await;

        let primary = manager.get_primary_connection().unwrap();
        assert_eq!(primary.region(), "B");

        // B starts denying: the failed put demotes it on the spot
        cluster.set_access("B", RegionAccess::Denied);
        let err = primary.put("Person", person("Scriffiny", "Patty")).await.unwrap_err();
        assert!(err.is_access_denied());
        assert!(!primary.is_primary().await);
        assert!(manager.get_primary_connection().is_none());

        // Probes agree with the cache: nothing to rebuild
        assert!(!manager.poll_once().await);
        assert_eq!(manager.generation(), 0);

        // A becomes writable: cache disagrees, everything is rebuilt
        let old_a = manager.connection("A").unwrap();
        let old_b = manager.connection("B").unwrap();
        cluster.set_access("A", RegionAccess::Allowed);
        assert!(manager.poll_once().await);
        assert_eq!(manager.generation(), 1);

        let new_a = manager.connection("A").unwrap();
        let new_b = manager.connection("B").unwrap();
        assert!(!Arc::ptr_eq(&old_a, &new_a));
        assert!(!Arc::ptr_eq(&old_b, &new_b));
        assert!(!old_a.has_handle().await);
        assert!(!old_b.has_handle().await);
        assert!(old_a.is_retired() && old_b.is_retired());
        assert!(new_a.has_handle().await);
        assert!(new_b.has_handle().await);

        let primary = manager.get_primary_connection().unwrap();
        assert_eq!(primary.region(), "A");
        assert_ok!(primary.put("Person", person("Scriffiny", "Patty")).await);
        assert_eq!(manager.metrics().rebuilds(), 1);

        // Replaced connections do not come back to life
        let err = old_a.put("Person", person("Scriffiny", "Patty")).await.unwrap_err();
        assert!(matches!(err, Error::Unavailable { .. }));
        assert!(!old_a.has_handle().await);

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_transient_errors_do_not_rebuild() {
        let cluster = cluster(&["a", "b"]);
        let manager = manager(&cluster, &["a", "b"]).await;

        cluster.set_access("a", RegionAccess::Unreachable);
        cluster.set_access("b", RegionAccess::Stalled);
        assert!(!manager.poll_once().await);

        let primary = manager.get_primary_connection().unwrap();
        assert_eq!(primary.region(), "a");
        assert!(primary.get("Person", &person("x", "y")).await.is_err());
        assert!(primary.is_primary().await);
        assert_eq!(manager.generation(), 0);

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_region_recovers_after_late_first_contact() {
        let cluster = cluster(&["a"]);
        cluster.set_access("a", RegionAccess::Unreachable);
        let manager = manager(&cluster, &["a"]).await;
        assert!(manager.get_primary_connection().is_none());

        cluster.set_access("a", RegionAccess::Allowed);
        assert!(manager.poll_once().await);
        assert_eq!(
            manager.get_primary_connection().unwrap().region(),
            "a"
        );

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_construction_failure_is_not_fatal() {
        let cluster = cluster(&["a", "b"]);
        cluster.set_connect_failure("a", true);
        let manager = manager(&cluster, &["a", "b"]).await;

        let status = manager.status().await;
        assert!(!status.regions[0].has_handle);
        assert_eq!(status.primary(), Some("b"));
        assert_eq!(manager.metrics().connect_failures(), 1);

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_lookup_does_not_connect() {
        let cluster = cluster(&["a", "b"]);
        cluster.set_connect_failure("a", true);
        let manager = manager(&cluster, &["a", "b"]).await;

        for _ in 0..5 {
            assert_eq!(manager.get_primary_connection().unwrap().region(), "b");
        }
        assert_eq!(manager.metrics().connect_failures(), 1);
        assert_eq!(cluster.connects("b"), 1);

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_close_all_is_idempotent() {
        let cluster = cluster(&["a", "b"]);
        let manager = manager(&cluster, &["a", "b"]).await;

        manager.close_all().await;
        manager.close_all().await;
        assert_eq!(cluster.closes("a"), 1);
        assert_eq!(cluster.closes("b"), 1);

        // Still primary; the handle comes back on the next data operation
        let primary = manager.get_primary_connection().unwrap();
        assert!(!primary.has_handle().await);
        assert_ok!(primary.put("Person", person("a", "b")).await);
        assert!(primary.has_handle().await);
        assert_eq!(cluster.connects("a"), 2);

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_background_poller_keeps_running_when_all_denied() {
        let cluster = cluster(&["a", "b"]);
        cluster.set_access("a", RegionAccess::Denied);
        cluster.set_access("b", RegionAccess::Denied);
        let config = config(&["a", "b"], Duration::from_millis(10));
        let manager = assert_ok!(
            ConnectionManager::start(config, Arc::new(LocalConnector::new(cluster.clone()))).await
        );

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(manager.get_primary_connection().is_none());
        assert!(manager.metrics().poll_cycles() >= 3);
        assert_eq!(manager.metrics().rebuilds(), 0);

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_background_poller_promotes_recovered_region() {
        let cluster = cluster(&["a", "b"]);
        cluster.set_access("a", RegionAccess::Denied);
        cluster.set_access("b", RegionAccess::Denied);
        let config = config(&["a", "b"], Duration::from_millis(10));
        let manager = assert_ok!(
            ConnectionManager::start(config, Arc::new(LocalConnector::new(cluster.clone()))).await
        );
        assert!(manager.get_primary_connection().is_none());

        cluster.set_access("b", RegionAccess::Allowed);
        let mut primary = None;
        for _ in 0..100 {
            primary = manager.get_primary_connection();
            if primary.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(primary.unwrap().region(), "b");
        assert!(manager.generation() >= 1);

        manager.shutdown().await;
    }

    /// Panics on connect while armed
    struct PanickingConnector {
        inner: LocalConnector,
        armed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Connector for PanickingConnector {
        async fn connect(&self, endpoint: &RegionEndpoint) -> ClientResult<Arc<dyn DataClient>> {
            if self.armed.load(Ordering::SeqCst) {
                panic!("connector exploded");
            }
            self.inner.connect(endpoint).await
        }
    }

    #[tokio::test]
    async fn test_panicking_cycle_does_not_stop_poller() {
        let cluster = cluster(&["a"]);
        let armed = Arc::new(AtomicBool::new(false));
        let connector = PanickingConnector {
            inner: LocalConnector::new(cluster.clone()),
            armed: armed.clone(),
        };
        let config = config(&["a"], Duration::from_millis(10));
        let manager = assert_ok!(ConnectionManager::start(config, Arc::new(connector)).await);

        armed.store(true, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;
        armed.store(false, Ordering::SeqCst);
        let panics = manager.metrics().poll_panics();
        assert!(panics >= 1);

        let cycles = manager.metrics().poll_cycles();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(manager.metrics().poll_cycles() > cycles);
        assert!(manager.get_primary_connection().is_some());

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_stops_poller() {
        let cluster = cluster(&["a"]);
        let config = config(&["a"], Duration::from_millis(10));
        let manager = assert_ok!(
            ConnectionManager::start(config, Arc::new(LocalConnector::new(cluster.clone()))).await
        );

        manager.shutdown().await;
        let cycles = manager.metrics().poll_cycles();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(manager.metrics().poll_cycles(), cycles);
        assert!(!manager.status().await.regions[0].has_handle);
    }

    async fn serve(cluster: &LocalCluster, region: &str) -> String {
        let server = assert_ok!(EndpointServer::bind(cluster.clone(), region, "127.0.0.1:0").await);
        let addr = assert_ok!(server.local_addr()).to_string();
        tokio::spawn(server.run());
        addr
    }

    #[tokio::test]
    async fn test_remote_region_reconnects_after_transport_error() {
        let cluster = cluster(&["a"]);
        let addr = serve(&cluster, "a").await;
        let config = ManagerConfig::default()
            .with_region("a", addr)
            .with_poll_interval(Duration::from_secs(3600))
            .with_request_timeout(Duration::from_secs(1));
        let manager = assert_ok!(ConnectionManager::start(config, Arc::new(RemoteConnector::new())).await);

        let primary = manager.get_primary_connection().unwrap();
        assert_ok!(primary.put("Person", person("Scriffiny", "Patty")).await);

        // The endpoint drops the connection
        cluster.set_access("a", RegionAccess::Unreachable);
        let err = primary.put("Person", person("Scriffiny", "Patty")).await.unwrap_err();
        assert!(matches!(err, Error::Transport { .. }));
        assert!(!primary.has_handle().await);

        cluster.set_access("a", RegionAccess::Allowed);
        assert!(!manager.poll_once().await);
        assert_eq!(manager.generation(), 0);

        for _ in 0..3 {
            assert_ok!(primary.put("Person", person("Scriffiny", "Patty")).await);
        }
        assert!(primary.is_primary().await);

        manager.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_lookup_during_rebuild_sees_whole_generation() {
        let cluster = cluster(&["a", "b"]);
        cluster.set_access("a", RegionAccess::Denied);
        let manager = Arc::new(manager(&cluster, &["a", "b"]).await);

        let mut generations = vec![vec![
            manager.connection("a").unwrap(),
            manager.connection("b").unwrap(),
        ]];

        let done = Arc::new(AtomicBool::new(false));
        let lookups = {
            let manager = manager.clone();
            let done = done.clone();
            tokio::spawn(async move {
                let mut seen = Vec::new();
                loop {
                    let finished = done.load(Ordering::SeqCst);
                    if let Some(conn) = manager.get_primary_connection() {
                        // Only a replaced connection may lose its handle
                        if !conn.has_handle().await {
                            assert!(conn.is_retired());
                            assert!(manager.generation() >= 1);
                        }
                        seen.push(conn);
                    }
                    if finished {
                        break;
                    }
                    tokio::task::yield_now().await;
                }
                seen
            })
        };

        // Move the writable region back and forth; every cycle rebuilds
        for round in 0..6 {
            let (allowed, denied) = if round % 2 == 0 { ("a", "b") } else { ("b", "a") };
            cluster.set_access(allowed, RegionAccess::Allowed);
            cluster.set_access(denied, RegionAccess::Denied);
            assert!(manager.poll_once().await);
            generations.push(vec![
                manager.connection("a").unwrap(),
                manager.connection("b").unwrap(),
            ]);
        }

        done.store(true, Ordering::SeqCst);
        let seen = assert_ok!(lookups.await);
        assert!(!seen.is_empty());
        for conn in &seen {
            assert!(generations
                .iter()
                .flatten()
                .any(|known| Arc::ptr_eq(known, conn)));
        }
        assert_eq!(manager.generation(), 6);

        manager.shutdown().await;
    }
}
