//! regionkv - Multi-Region Key-Value Failover Client
//!
//! Keeps one connection per configured region of a globally replicated
//! store, tracks which region currently accepts writes from this caller,
//! and switches over when a background probe sees that change.

pub mod client;
pub mod error;
pub mod metrics;
pub mod protocol;
pub mod region;
pub mod server;
pub mod storage;

pub use client::{Connector, DataClient, LocalCluster, LocalConnector, RegionAccess, RemoteConnector};
pub use error::{AuthorizationOutcome, ClientError, Error, Result};
pub use metrics::FailoverMetrics;
pub use protocol::{Frame, Request, Response, WireCodec};
pub use region::{
    CanaryRecord, ConnectionManager, ManagerConfig, ManagerStatus, PrimaryState, RegionEndpoint,
    RegionalConnection,
};
pub use server::{EndpointConfig, EndpointServer};
pub use storage::{AttributeValue, Item, Key, TableDescription};
