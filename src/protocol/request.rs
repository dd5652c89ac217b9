//! Wire Requests
//!
//! Requests a client sends to a region endpoint.

use bytes::{Bytes, BytesMut};
use std::io;

use super::encoding::{get_item, get_string, put_item, put_string};
use super::frame::{Frame, OpCode};
use crate::storage::{Item, Key};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Liveness check
    Ping,

    /// Insert or replace an item
    PutItem { table: String, item: Item },

    /// Read an item by key
    GetItem { table: String, key: Key },

    /// Table metadata
    DescribeTable { table: String },

    /// Names of all tables
    ListTables,
}

impl Request {
    /// Parse a request from a frame
    pub fn from_frame(frame: &Frame) -> io::Result<Self> {
        let mut payload = frame.payload.clone();
        match frame.opcode() {
            OpCode::Ping => Ok(Request::Ping),

            OpCode::PutItem => {
                let table = get_string(&mut payload)?;
                let item = get_item(&mut payload)?;
                Ok(Request::PutItem { table, item })
            }

            OpCode::GetItem => {
                let table = get_string(&mut payload)?;
                let key = get_item(&mut payload)?;
                Ok(Request::GetItem { table, key })
            }

            OpCode::DescribeTable => {
                let table = get_string(&mut payload)?;
                Ok(Request::DescribeTable { table })
            }

            OpCode::ListTables => Ok(Request::ListTables),

            other => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Unexpected opcode for request: {:?}", other),
            )),
        }
    }

    /// Encode into a frame with the given request id
    pub fn to_frame(&self, request_id: u64) -> Frame {
        let mut buf = BytesMut::new();
        let opcode = match self {
            Request::Ping => OpCode::Ping,
            Request::PutItem { table, item } => {
                put_string(&mut buf, table);
                put_item(&mut buf, item);
                OpCode::PutItem
            }
            Request::GetItem { table, key } => {
                put_string(&mut buf, table);
                put_item(&mut buf, key);
                OpCode::GetItem
            }
            Request::DescribeTable { table } => {
                put_string(&mut buf, table);
                OpCode::DescribeTable
            }
            Request::ListTables => OpCode::ListTables,
        };
        let payload: Bytes = buf.freeze();
        Frame::new(opcode, request_id, payload)
    }

    /// Short name for logs and metrics
    pub fn name(&self) -> &'static str {
        match self {
            Request::Ping => "PING",
            Request::PutItem { .. } => "PUT_ITEM",
            Request::GetItem { .. } => "GET_ITEM",
            Request::DescribeTable { .. } => "DESCRIBE_TABLE",
            Request::ListTables => "LIST_TABLES",
        }
    }
}
