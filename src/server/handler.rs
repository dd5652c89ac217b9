//! Connection Handler
//!
//! Decodes request frames and answers them from the local cluster, as seen
//! through one region.

use futures::{SinkExt, StreamExt};
use std::io;
use std::time::Instant;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::debug;

use crate::client::{LocalCluster, VALIDATION_CODE};
use crate::error::ClientError;
use crate::protocol::{Request, Response, WireCodec};

/// Connection handler
pub struct Handler {
    cluster: LocalCluster,
    region: String,
}

impl Handler {
    pub fn new(cluster: LocalCluster, region: impl Into<String>) -> Self {
        Self {
            cluster,
            region: region.into(),
        }
    }

    /// Run the handler for a connection.
    ///
    /// A region that is unreachable drops the connection instead of
    /// answering, which the client sees as a transport failure.
    pub async fn run(self, mut framed: Framed<TcpStream, WireCodec>) -> io::Result<()> {
        while let Some(result) = framed.next().await {
            let frame = result?;
            let start = Instant::now();
            let request_id = frame.request_id();

            let (name, response) = match Request::from_frame(&frame) {
                Ok(request) => {
                    let name = request.name();
                    match self.execute(request).await {
                        Ok(response) => (name, response),
                        Err(ClientError::Store { code, message }) => {
                            (name, Response::Error { code, message })
                        }
                        Err(e) => {
                            debug!(region = %self.region, error = %e, "Dropping connection");
                            return Ok(());
                        }
                    }
                }
                Err(e) => ("INVALID", Response::error(VALIDATION_CODE, e.to_string())),
            };

            framed.send(response.to_frame(request_id)).await?;
            debug!(cmd = name, latency = ?start.elapsed(), "Request served");
        }

        Ok(())
    }

    async fn execute(&self, request: Request) -> Result<Response, ClientError> {
        let region = self.region.as_str();
        let response = match request {
            Request::Ping => Response::Pong,

            Request::PutItem { table, item } => {
                self.cluster.put_item(region, &table, item).await?;
                Response::Ok
            }

            Request::GetItem { table, key } => {
                match self.cluster.get_item(region, &table, &key).await? {
                    Some(item) => Response::Item(item),
                    None => Response::Nil,
                }
            }

            Request::DescribeTable { table } => {
                Response::Table(self.cluster.describe_table(region, &table).await?)
            }

            Request::ListTables => Response::Names(self.cluster.list_tables(region).await?),
        };
        Ok(response)
    }
}
