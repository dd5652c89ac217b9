//! Wire Protocol
//!
//! Binary request/response protocol spoken with region endpoints.
//! Uses 22-byte fixed headers.

mod codec;
mod encoding;
mod frame;
mod request;
mod response;

pub use codec::{WireCodec, MAX_PAYLOAD_LEN};
pub use frame::{Frame, FrameHeader, OpCode, HEADER_SIZE, MAGIC};
pub use request::Request;
pub use response::Response;
