//! Wire Responses
//!
//! Response variants for request results.

use bytes::{Buf, BufMut, BytesMut};
use std::io;

use super::encoding::{
    get_description, get_item, get_string, put_description, put_item, put_string,
};
use super::frame::{Frame, OpCode};
use crate::storage::{Item, TableDescription};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Pong response (for PING)
    Pong,

    /// Write accepted
    Ok,

    /// Item found
    Item(Item),

    /// Item not found
    Nil,

    /// Table metadata
    Table(TableDescription),

    /// Table names
    Names(Vec<String>),

    /// Store error with its code
    Error { code: String, message: String },
}

impl Response {
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Response::Error {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Convert response to a frame
    pub fn to_frame(&self, request_id: u64) -> Frame {
        let mut buf = BytesMut::new();
        let opcode = match self {
            Response::Pong => OpCode::Pong,
            Response::Ok => OpCode::Ok,
            Response::Nil => OpCode::Nil,
            Response::Item(item) => {
                put_item(&mut buf, item);
                OpCode::Item
            }
            Response::Table(table) => {
                put_description(&mut buf, table);
                OpCode::Table
            }
            Response::Names(names) => {
                buf.put_u32(names.len() as u32);
                for name in names {
                    put_string(&mut buf, name);
                }
                OpCode::Names
            }
            Response::Error { code, message } => {
                put_string(&mut buf, code);
                put_string(&mut buf, message);
                OpCode::Error
            }
        };
        Frame::new(opcode, request_id, buf.freeze())
    }

    /// Parse response from a frame
    pub fn from_frame(frame: &Frame) -> io::Result<Self> {
        let mut payload = frame.payload.clone();
        match frame.opcode() {
            OpCode::Pong => Ok(Response::Pong),
            OpCode::Ok => Ok(Response::Ok),
            OpCode::Nil => Ok(Response::Nil),
            OpCode::Item => Ok(Response::Item(get_item(&mut payload)?)),
            OpCode::Table => Ok(Response::Table(get_description(&mut payload)?)),
            OpCode::Names => {
                if payload.remaining() < 4 {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "Invalid names payload",
                    ));
                }
                let count = payload.get_u32() as usize;
                let mut names = Vec::with_capacity(count.min(1024));
                for _ in 0..count {
                    names.push(get_string(&mut payload)?);
                }
                Ok(Response::Names(names))
            }
            OpCode::Error => {
                let code = get_string(&mut payload)?;
                let message = get_string(&mut payload)?;
                Ok(Response::Error { code, message })
            }
            other => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Unexpected opcode for response: {:?}", other),
            )),
        }
    }
}

impl std::fmt::Display for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Response::Pong => write!(f, "PONG"),
            Response::Ok => write!(f, "OK"),
            Response::Nil => write!(f, "(nil)"),
            Response::Item(item) => {
                write!(f, "{{")?;
                for (i, (name, value)) in item.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", name, value)?;
                }
                write!(f, "}}")
            }
            Response::Table(table) => write!(f, "{}", table),
            Response::Names(names) => write!(f, "[{}]", names.join(", ")),
            Response::Error { code, message } => write!(f, "(error) {}: {}", code, message),
        }
    }
}
