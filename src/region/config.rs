//! Manager Configuration

use std::collections::HashSet;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::storage::{key_of, AttributeValue, Key};

/// Sentinel value used for both canary key attributes
pub const CANARY_SENTINEL: &str = "regionkv-canary";

/// One configured region and the address of its endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionEndpoint {
    pub region: String,
    pub endpoint: String,
}

impl RegionEndpoint {
    pub fn new(region: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            endpoint: endpoint.into(),
        }
    }
}

/// Parses `region=endpoint`
impl FromStr for RegionEndpoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('=') {
            Some((region, endpoint)) if !region.is_empty() && !endpoint.is_empty() => {
                Ok(Self::new(region.trim(), endpoint.trim()))
            }
            _ => Err(Error::Config(format!(
                "expected region=endpoint, got '{}'",
                s
            ))),
        }
    }
}

/// Well-known record read by health probes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanaryRecord {
    pub table: String,
    pub key: Key,
}

impl CanaryRecord {
    pub fn new(table: impl Into<String>, key: Key) -> Self {
        Self {
            table: table.into(),
            key,
        }
    }
}

impl Default for CanaryRecord {
    fn default() -> Self {
        Self::new(
            "Person",
            key_of(
                ("last-name", AttributeValue::s(CANARY_SENTINEL)),
                Some(("first-name", AttributeValue::s(CANARY_SENTINEL))),
            ),
        )
    }
}

/// Connection manager configuration
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Regions in preference order
    pub regions: Vec<RegionEndpoint>,

    /// Time between background poll cycles
    pub poll_interval: Duration,

    /// Upper bound for any single remote call
    pub request_timeout: Duration,

    /// Record read by health probes
    pub canary: CanaryRecord,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            regions: Vec::new(),
            poll_interval: Duration::from_secs(5),
            request_timeout: Duration::from_secs(2),
            canary: CanaryRecord::default(),
        }
    }
}

impl ManagerConfig {
    /// Append a region
    pub fn with_region(mut self, region: impl Into<String>, endpoint: impl Into<String>) -> Self {
        self.regions.push(RegionEndpoint::new(region, endpoint));
        self
    }

    pub fn with_regions(mut self, regions: impl IntoIterator<Item = RegionEndpoint>) -> Self {
        self.regions.extend(regions);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_canary(mut self, canary: CanaryRecord) -> Self {
        self.canary = canary;
        self
    }

    /// Reject configurations the manager cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.regions.is_empty() {
            return Err(Error::Config("at least one region is required".into()));
        }
        let mut seen = HashSet::new();
        for endpoint in &self.regions {
            if !seen.insert(endpoint.region.as_str()) {
                return Err(Error::Config(format!(
                    "duplicate region: {}",
                    endpoint.region
                )));
            }
        }
        if self.poll_interval.is_zero() {
            return Err(Error::Config("poll interval must be positive".into()));
        }
        if self.request_timeout.is_zero() {
            return Err(Error::Config("request timeout must be positive".into()));
        }
        if self.canary.key.is_empty() {
            return Err(Error::Config("canary key must not be empty".into()));
        }
        Ok(())
    }
}
