//! Server Module
//!
//! TCP endpoint for one region of a local cluster. Several endpoints over
//! the same cluster stand in for a multi-region deployment.

mod config;
mod handler;

pub use config::EndpointConfig;
pub use handler::Handler;

use std::io;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio_util::codec::Framed;
use tracing::{error, info};

use crate::client::LocalCluster;
use crate::protocol::WireCodec;

/// Region endpoint server
pub struct EndpointServer {
    listener: TcpListener,
    cluster: LocalCluster,
    region: String,
}

impl EndpointServer {
    /// Bind the listener; the region must already exist in the cluster
    pub async fn bind(cluster: LocalCluster, region: &str, addr: &str) -> io::Result<Self> {
        if cluster.access(region).is_none() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("unknown region: {}", region),
            ));
        }
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            cluster,
            region: region.to_string(),
        })
    }

    /// Bind using an endpoint configuration
    pub async fn from_config(cluster: LocalCluster, config: &EndpointConfig) -> io::Result<Self> {
        Self::bind(cluster, &config.region, &config.addr()).await
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Accept connections until the task is dropped
    pub async fn run(self) -> io::Result<()> {
        info!(region = %self.region, addr = ?self.local_addr()?, "Region endpoint listening");

        loop {
            match self.listener.accept().await {
                Ok((socket, peer_addr)) => {
                    info!("New connection from {}", peer_addr);
                    if let Err(e) = socket.set_nodelay(true) {
                        error!("Failed to set TCP_NODELAY for {}: {}", peer_addr, e);
                    }

                    let handler = Handler::new(self.cluster.clone(), self.region.clone());
                    tokio::spawn(async move {
                        let framed = Framed::new(socket, WireCodec::new());
                        if let Err(e) = handler.run(framed).await {
                            error!("Connection error from {}: {}", peer_addr, e);
                        }
                        info!("Connection closed: {}", peer_addr);
                    });
                }
                Err(e) => {
                    error!("Accept error: {}", e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{DataClient, RegionAccess, RemoteClient};
    use crate::error::ClientError;
    use tokio_test::{assert_err, assert_ok};

    async fn serve(cluster: &LocalCluster, region: &str) -> String {
        let server = assert_ok!(EndpointServer::bind(cluster.clone(), region, "127.0.0.1:0").await);
        let addr = assert_ok!(server.local_addr()).to_string();
        tokio::spawn(server.run());
        addr
    }

    #[tokio::test]
    async fn test_unknown_region_rejected() {
        let cluster = LocalCluster::with_regions(&["us-east-2"]);
        let result = EndpointServer::bind(cluster, "eu-west-1", "127.0.0.1:0").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_unreachable_region_drops_connection() {
        let cluster = LocalCluster::with_regions(&["us-east-2"]);
        let addr = serve(&cluster, "us-east-2").await;
        let client = assert_ok!(RemoteClient::connect("us-east-2", &addr).await);
        assert_ok!(client.list_tables().await);

        cluster.set_access("us-east-2", RegionAccess::Unreachable);
        let err = assert_err!(client.list_tables().await);
        assert!(!matches!(err, ClientError::Store { .. }));
    }

    #[tokio::test]
    async fn test_store_errors_keep_connection() {
        let cluster = LocalCluster::with_regions(&["us-east-2"]);
        let addr = serve(&cluster, "us-east-2").await;
        let client = assert_ok!(RemoteClient::connect("us-east-2", &addr).await);

        let err = assert_err!(client.describe_table("Missing").await);
        assert!(matches!(err, ClientError::Store { .. }));
        assert_ok!(client.ping().await);
    }
}
