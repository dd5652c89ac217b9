//! Region Failover
//!
//! Per-region connections with cached primary status, and the manager
//! that picks the primary and rebuilds connections when status changes.

mod config;
mod connection;
mod manager;
mod poller;

pub use config::{CanaryRecord, ManagerConfig, RegionEndpoint, CANARY_SENTINEL};
pub use connection::{ConnectionSettings, PrimaryState, RegionalConnection};
pub use manager::{ConnectionManager, ManagerStatus, RegionStatus};
