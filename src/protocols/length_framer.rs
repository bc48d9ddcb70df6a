//! 4-byte big-endian length-prefixed framing, both directions.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

const HEADER_LEN: usize = 4;

/// Streaming length-prefixed frame splitter.
#[derive(Debug, Default)]
pub struct LengthPrefixFramer {
    max_frame_length: usize,
}

impl LengthPrefixFramer {
    pub fn new(max_frame_length: usize) -> Self {
        Self { max_frame_length }
    }

    /// Drain as many complete `u32 length || payload` frames as `buffer`
    /// currently yields. A length exceeding `maxFrameLength` is terminal.
    pub fn decode(&self, buffer: &mut BytesMut) -> Result<Vec<Bytes>> {
        let mut frames = Vec::new();

        loop {
            if buffer.len() < HEADER_LEN {
                return Ok(frames);
            }

            let length = u32::from_be_bytes([buffer[0], buffer[1], buffer[2], buffer[3]]) as usize;
            if length > self.max_frame_length {
                return Err(FrameError::FrameTooLong(format!(
                    "length-prefixed frame declares {length} bytes, exceeding max {}",
                    self.max_frame_length
                )));
            }

            if buffer.len() < HEADER_LEN + length {
                return Ok(frames);
            }

            buffer.advance(HEADER_LEN);
            frames.push(buffer.split_to(length).freeze());
        }
    }

    /// Prepend a 4-byte big-endian length header to `payload`.
    pub fn encode(&self, payload: &[u8]) -> Bytes {
        let mut out = BytesMut::with_capacity(HEADER_LEN + payload.len());
        out.put_u32(payload.len() as u32);
        out.extend_from_slice(payload);
        out.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_frame_whole() {
        let mut buf = BytesMut::new();
        buf.put_u32(5);
        buf.extend_from_slice(b"hello");
        let frames = LengthPrefixFramer::new(1024).decode(&mut buf).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..], b"hello");
        assert!(buf.is_empty());
    }

    #[test]
    fn waits_for_full_payload() {
        let mut buf = BytesMut::new();
        buf.put_u32(5);
        buf.extend_from_slice(b"hel");
        let framer = LengthPrefixFramer::new(1024);
        assert!(framer.decode(&mut buf).unwrap().is_empty());
        buf.extend_from_slice(b"lo");
        let frames = framer.decode(&mut buf).unwrap();
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn waits_for_header() {
        let mut buf = BytesMut::from(&[0u8, 0][..]);
        assert!(LengthPrefixFramer::new(1024).decode(&mut buf).unwrap().is_empty());
    }

    #[test]
    fn concatenated_frames() {
        let mut buf = BytesMut::new();
        buf.put_u32(2);
        buf.extend_from_slice(b"ab");
        buf.put_u32(3);
        buf.extend_from_slice(b"cde");
        let frames = LengthPrefixFramer::new(1024).decode(&mut buf).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(&frames[0][..], b"ab");
        assert_eq!(&frames[1][..], b"cde");
    }

    #[test]
    fn oversized_length_is_terminal() {
        let mut buf = BytesMut::new();
        buf.put_u32(2048);
        let err = LengthPrefixFramer::new(1024).decode(&mut buf).unwrap_err();
        assert!(matches!(err, FrameError::FrameTooLong(_)));
    }

    #[test]
    fn encode_prepends_big_endian_length() {
        let encoded = LengthPrefixFramer::new(1024).encode(b"hi");
        assert_eq!(&encoded[..4], &[0, 0, 0, 2]);
        assert_eq!(&encoded[4..], b"hi");
    }
}
