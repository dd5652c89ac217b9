//! Wire Codec for Tokio
//!
//! `Encoder`/`Decoder` pair used with `Framed` on both ends of a
//! region connection.

use bytes::BytesMut;
use std::io;
use tokio_util::codec::{Decoder, Encoder};

use super::frame::{Frame, FrameHeader, HEADER_SIZE};

/// Largest payload accepted from the peer
pub const MAX_PAYLOAD_LEN: usize = 16 * 1024 * 1024;

#[derive(Debug, Default)]
pub struct WireCodec {
    /// Header of the frame whose payload is still arriving
    pending: Option<FrameHeader>,
}

impl WireCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for WireCodec {
    type Item = Frame;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let header = match self.pending.take() {
            Some(header) => header,
            None => {
                if src.len() < HEADER_SIZE {
                    return Ok(None);
                }
                let header = FrameHeader::decode(&mut src.split_to(HEADER_SIZE).freeze())?;
                if header.payload_len as usize > MAX_PAYLOAD_LEN {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("Payload too large: {} bytes", header.payload_len),
                    ));
                }
                header
            }
        };

        let payload_len = header.payload_len as usize;
        if src.len() < payload_len {
            src.reserve(payload_len - src.len());
            self.pending = Some(header);
            return Ok(None);
        }

        let payload = src.split_to(payload_len).freeze();
        Ok(Some(Frame { header, payload }))
    }
}

impl Encoder<Frame> for WireCodec {
    type Error = io::Error;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(HEADER_SIZE + item.payload.len());
        item.encode(dst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::OpCode;
    use bytes::{BufMut, Bytes};

    #[test]
    fn test_partial_decode() {
        let mut codec = WireCodec::new();
        let frame = Frame::new(OpCode::PutItem, 1, Bytes::from_static(b"test data"));

        let mut full = BytesMut::new();
        codec.encode(frame.clone(), &mut full).unwrap();

        // Header only, then the rest of the payload
        let mut buf = full.split_to(HEADER_SIZE + 4);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.unsplit(full);

        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, frame);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_two_frames_in_one_buffer() {
        let mut codec = WireCodec::new();
        let mut buf = BytesMut::new();
        codec
            .encode(Frame::new(OpCode::Ping, 1, Bytes::new()), &mut buf)
            .unwrap();
        codec
            .encode(Frame::new(OpCode::ListTables, 2, Bytes::new()), &mut buf)
            .unwrap();

        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().request_id(), 1);
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().request_id(), 2);
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let mut codec = WireCodec::new();
        let mut buf = BytesMut::new();
        FrameHeader::new(OpCode::PutItem, 1, 0).encode(&mut buf);
        // Overwrite payload_len (offset 8)
        let mut len = &mut buf[8..12];
        len.put_u32((MAX_PAYLOAD_LEN + 1) as u32);

        assert!(codec.decode(&mut buf).is_err());
    }
}
