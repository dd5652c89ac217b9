//! Regional Connection
//!
//! One region's client handle and its cached primary status.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use super::config::{CanaryRecord, ManagerConfig, RegionEndpoint};
use crate::client::{ClientResult, Connector, DataClient};
use crate::error::{AuthorizationOutcome, Error, Result};
use crate::metrics::FailoverMetrics;
use crate::storage::{Item, Key, TableDescription};

/// Cached primary status of a region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PrimaryState {
    /// No conclusive probe yet
    Unknown = 0,
    Primary = 1,
    NotPrimary = 2,
}

impl PrimaryState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => PrimaryState::Primary,
            2 => PrimaryState::NotPrimary,
            _ => PrimaryState::Unknown,
        }
    }
}

impl fmt::Display for PrimaryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrimaryState::Unknown => write!(f, "unknown"),
            PrimaryState::Primary => write!(f, "primary"),
            PrimaryState::NotPrimary => write!(f, "not-primary"),
        }
    }
}

/// Everything a regional connection needs besides its endpoint.
///
/// Shared by all connections of a manager.
pub struct ConnectionSettings {
    pub connector: Arc<dyn Connector>,
    pub canary: CanaryRecord,
    pub request_timeout: Duration,
    pub metrics: Arc<FailoverMetrics>,
}

impl ConnectionSettings {
    pub fn new(
        connector: Arc<dyn Connector>,
        config: &ManagerConfig,
        metrics: Arc<FailoverMetrics>,
    ) -> Self {
        Self {
            connector,
            canary: config.canary.clone(),
            request_timeout: config.request_timeout,
            metrics,
        }
    }
}

/// Connection to one region
pub struct RegionalConnection {
    endpoint: RegionEndpoint,
    settings: Arc<ConnectionSettings>,
    /// Lazily built client; the lock also serialises construction
    handle: Mutex<Option<Arc<dyn DataClient>>>,
    state: AtomicU8,
    /// Set once the owning generation has been replaced
    retired: AtomicBool,
}

impl RegionalConnection {
    pub fn new(endpoint: RegionEndpoint, settings: Arc<ConnectionSettings>) -> Self {
        Self {
            endpoint,
            settings,
            handle: Mutex::new(None),
            state: AtomicU8::new(PrimaryState::Unknown as u8),
            retired: AtomicBool::new(false),
        }
    }

    pub fn region(&self) -> &str {
        &self.endpoint.region
    }

    pub fn endpoint(&self) -> &RegionEndpoint {
        &self.endpoint
    }

    /// Cached state, without side effects
    pub fn state(&self) -> PrimaryState {
        PrimaryState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub async fn has_handle(&self) -> bool {
        self.handle.lock().await.is_some()
    }

    /// Whether a rebuild has replaced this connection
    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    /// Return the client, building it on first use.
    ///
    /// A freshly built client runs the canary probe before it is handed
    /// out, so the cached state is initialised by the time anyone sees the
    /// handle. Construction failures are logged and yield `None`. A
    /// retired connection never builds a new client.
    pub async fn get_handle(&self) -> Option<Arc<dyn DataClient>> {
        let mut slot = self.handle.lock().await;
        if let Some(client) = slot.as_ref() {
            return Some(client.clone());
        }
        if self.is_retired() {
            debug!(region = %self.region(), "Connection retired, not reopening");
            return None;
        }

        let client = match self.build_client().await {
            Some(client) => client,
            None => {
                if self.state() == PrimaryState::Primary {
                    self.set_state(PrimaryState::NotPrimary);
                }
                return None;
            }
        };

        info!(region = %self.region(), "Checking region for primary");
        let outcome = self.canary_read(client.as_ref()).await;
        match outcome {
            AuthorizationOutcome::Authorized => self.set_state(PrimaryState::Primary),
            AuthorizationOutcome::Denied => self.set_state(PrimaryState::NotPrimary),
            AuthorizationOutcome::OtherFailure => {}
        }
        info!(region = %self.region(), state = %self.state(), "Region primary status set");

        *slot = Some(client.clone());
        Some(client)
    }

    /// Cached primary flag; builds the handle first if there is none.
    ///
    /// This is a cache read, not a health check.
    pub async fn is_primary(&self) -> bool {
        self.get_handle().await;
        self.state() == PrimaryState::Primary
    }

    /// Fresh authorization check of the region.
    ///
    /// The canary read goes through a throwaway client built for this probe
    /// only, so no credentials cached in the long-lived handle are reused.
    /// Only an explicit denial reports `false`; any other failure reports
    /// the current cached value. The cached state itself is not touched.
    pub async fn probe_health(&self) -> bool {
        let metrics = &self.settings.metrics;
        metrics.record_probe();
        let previous = self.state() == PrimaryState::Primary;

        let outcome = match self.build_client().await {
            Some(client) => {
                let outcome = self.canary_read(client.as_ref()).await;
                self.close_client(client).await;
                outcome
            }
            None => AuthorizationOutcome::OtherFailure,
        };

        match outcome {
            AuthorizationOutcome::Authorized => true,
            AuthorizationOutcome::Denied => {
                metrics.record_probe_denied();
                false
            }
            AuthorizationOutcome::OtherFailure => {
                metrics.record_probe_failed();
                previous
            }
        }
    }

    /// Insert or replace an item
    pub async fn put(&self, table: &str, item: Item) -> Result<()> {
        self.run("PUT_ITEM", |client| async move { client.put_item(table, item).await })
            .await
    }

    /// Read an item; `Ok(None)` when absent
    pub async fn get(&self, table: &str, key: &Key) -> Result<Option<Item>> {
        self.run("GET_ITEM", |client| async move { client.get_item(table, key).await })
            .await
    }

    pub async fn describe_table(&self, table: &str) -> Result<TableDescription> {
        self.run("DESCRIBE_TABLE", |client| async move {
            client.describe_table(table).await
        })
        .await
    }

    pub async fn list_tables(&self) -> Result<Vec<String>> {
        self.run("LIST_TABLES", |client| async move { client.list_tables().await })
            .await
    }

    /// Release the handle if there is one. Never fails.
    ///
    /// The handle is rebuilt on next access unless the connection has been
    /// retired.
    pub async fn close(&self) {
        let taken = self.handle.lock().await.take();
        if let Some(client) = taken {
            self.close_client(client).await;
            debug!(region = %self.region(), "Closed regional connection");
        }
    }

    /// Close for good: the connection's generation has been replaced.
    ///
    /// Holders of the old `Arc` get `Error::Unavailable` from then on and
    /// must look up the primary again.
    pub(crate) async fn retire(&self) {
        self.retired.store(true, Ordering::Release);
        self.close().await;
    }

    async fn run<T, F, Fut>(&self, name: &'static str, op: F) -> Result<T>
    where
        F: FnOnce(Arc<dyn DataClient>) -> Fut,
        Fut: Future<Output = ClientResult<T>>,
    {
        let client = self.get_handle().await.ok_or_else(|| Error::Unavailable {
            region: self.region().to_string(),
        })?;

        let started = Instant::now();
        let result = timeout(self.settings.request_timeout, op(client.clone())).await;
        self.settings.metrics.record_operation(name, started.elapsed());

        let err = match result {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => Error::from_client(self.region(), e),
            Err(_) => Error::Timeout {
                region: self.region().to_string(),
                timeout: self.settings.request_timeout,
            },
        };

        match &err {
            Error::AccessDenied { .. } => self.demote(),
            // The client may be dead or out of step; the primary status stays
            Error::Transport { .. } | Error::Timeout { .. } => self.discard(&client).await,
            _ => {}
        }
        Err(err)
    }

    /// Drop `client` from the slot if it is still the cached handle
    async fn discard(&self, client: &Arc<dyn DataClient>) {
        let taken = {
            let mut slot = self.handle.lock().await;
            let cached = slot
                .as_ref()
                .is_some_and(|current| Arc::ptr_eq(current, client));
            if cached {
                slot.take()
            } else {
                None
            }
        };
        if let Some(client) = taken {
            warn!(region = %self.region(), "Discarding failed region client");
            self.close_client(client).await;
        }
    }

    async fn build_client(&self) -> Option<Arc<dyn DataClient>> {
        let connect = self.settings.connector.connect(&self.endpoint);
        match timeout(self.settings.request_timeout, connect).await {
            Ok(Ok(client)) => Some(client),
            Ok(Err(e)) => {
                warn!(region = %self.region(), error = %e, "Error creating region client");
                self.settings.metrics.record_connect_failure();
                None
            }
            Err(_) => {
                warn!(
                    region = %self.region(),
                    timeout = ?self.settings.request_timeout,
                    "Timed out creating region client"
                );
                self.settings.metrics.record_connect_failure();
                None
            }
        }
    }

    async fn canary_read(&self, client: &dyn DataClient) -> AuthorizationOutcome {
        let canary = &self.settings.canary;
        let read = client.get_item(&canary.table, &canary.key);
        match timeout(self.settings.request_timeout, read).await {
            Ok(Ok(_)) => AuthorizationOutcome::Authorized,
            Ok(Err(e)) => {
                let outcome = e.outcome();
                if outcome == AuthorizationOutcome::Denied {
                    info!(region = %self.region(), error = %e, "Canary read denied");
                } else {
                    warn!(region = %self.region(), error = %e, "Canary read failed");
                }
                outcome
            }
            Err(_) => {
                warn!(region = %self.region(), "Canary read timed out");
                AuthorizationOutcome::OtherFailure
            }
        }
    }

    async fn close_client(&self, client: Arc<dyn DataClient>) {
        match timeout(self.settings.request_timeout, client.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(region = %self.region(), error = %e, "Error closing region client"),
            Err(_) => error!(region = %self.region(), "Timed out closing region client"),
        }
    }

    fn demote(&self) {
        let previous = self
            .state
            .swap(PrimaryState::NotPrimary as u8, Ordering::AcqRel);
        if PrimaryState::from_u8(previous) == PrimaryState::Primary {
            self.settings.metrics.record_demotion();
            info!(region = %self.region(), "Region denied access, demoted locally");
        }
    }

    fn set_state(&self, state: PrimaryState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

impl fmt::Display for RegionalConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RegionalConnection [Region: {}, state: {}]",
            self.region(),
            self.state()
        )
    }
}

impl fmt::Debug for RegionalConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegionalConnection")
            .field("endpoint", &self.endpoint)
            .field("state", &self.state())
            .finish()
    }
}
