//! Remote Client
//!
//! `DataClient` over one TCP connection speaking the wire protocol.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::codec::Framed;
use tracing::debug;

use super::{ClientResult, Connector, DataClient};
use crate::error::ClientError;
use crate::protocol::{Request, Response, WireCodec};
use crate::region::RegionEndpoint;
use crate::storage::{Item, Key, TableDescription};

/// Client for one region endpoint.
///
/// Requests are serialised on the connection: one request in flight at a
/// time, answered in order.
pub struct RemoteClient {
    region: String,
    addr: String,
    conn: Mutex<Option<Framed<TcpStream, WireCodec>>>,
    next_id: AtomicU64,
}

impl RemoteClient {
    pub async fn connect(region: &str, addr: &str) -> ClientResult<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        debug!(region = %region, addr = %addr, "Connected to region endpoint");
        Ok(Self {
            region: region.to_string(),
            addr: addr.to_string(),
            conn: Mutex::new(Some(Framed::new(stream, WireCodec::new()))),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Send the ping request and wait for the pong
    pub async fn ping(&self) -> ClientResult<()> {
        match self.call(Request::Ping).await? {
            Response::Pong => Ok(()),
            other => Err(unexpected(&other)),
        }
    }

    async fn call(&self, request: Request) -> ClientResult<Response> {
        let request_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut guard = self.conn.lock().await;
        let framed = guard
            .as_mut()
            .ok_or_else(|| ClientError::Transport("client is closed".to_string()))?;

        framed.send(request.to_frame(request_id)).await?;

        let frame = match framed.next().await {
            Some(frame) => frame?,
            None => {
                *guard = None;
                return Err(ClientError::Transport(format!(
                    "connection to {} closed by endpoint",
                    self.region
                )));
            }
        };

        if frame.request_id() != request_id {
            // The stream is out of step; it cannot be reused
            *guard = None;
            return Err(ClientError::Transport(format!(
                "response id {} does not match request id {}",
                frame.request_id(),
                request_id
            )));
        }

        match Response::from_frame(&frame)? {
            Response::Error { code, message } => Err(ClientError::Store { code, message }),
            response => Ok(response),
        }
    }
}

fn unexpected(response: &Response) -> ClientError {
    ClientError::Transport(format!("unexpected response: {}", response))
}

#[async_trait]
impl DataClient for RemoteClient {
    async fn put_item(&self, table: &str, item: Item) -> ClientResult<()> {
        let request = Request::PutItem {
            table: table.to_string(),
            item,
        };
        match self.call(request).await? {
            Response::Ok => Ok(()),
            other => Err(unexpected(&other)),
        }
    }

    async fn get_item(&self, table: &str, key: &Key) -> ClientResult<Option<Item>> {
        let request = Request::GetItem {
            table: table.to_string(),
            key: key.clone(),
        };
        match self.call(request).await? {
            Response::Item(item) => Ok(Some(item)),
            Response::Nil => Ok(None),
            other => Err(unexpected(&other)),
        }
    }

    async fn describe_table(&self, table: &str) -> ClientResult<TableDescription> {
        let request = Request::DescribeTable {
            table: table.to_string(),
        };
        match self.call(request).await? {
            Response::Table(description) => Ok(description),
            other => Err(unexpected(&other)),
        }
    }

    async fn list_tables(&self) -> ClientResult<Vec<String>> {
        match self.call(Request::ListTables).await? {
            Response::Names(names) => Ok(names),
            other => Err(unexpected(&other)),
        }
    }

    async fn close(&self) -> ClientResult<()> {
        if let Some(mut framed) = self.conn.lock().await.take() {
            framed.get_mut().shutdown().await?;
            debug!(region = %self.region, "Closed region endpoint connection");
        }
        Ok(())
    }
}

/// Connects to the TCP address configured as each region's endpoint
#[derive(Debug, Default, Clone)]
pub struct RemoteConnector;

impl RemoteConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for RemoteConnector {
    async fn connect(&self, endpoint: &RegionEndpoint) -> ClientResult<Arc<dyn DataClient>> {
        let client = RemoteClient::connect(&endpoint.region, &endpoint.endpoint).await?;
        Ok(Arc::new(client))
    }
}
