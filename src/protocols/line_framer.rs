//! LF/CRLF line framing: inbound split, outbound LF-terminate.

use bytes::{Buf, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Streaming line-delimited frame splitter.
#[derive(Debug, Default)]
pub struct LineFramer {
    max_frame_length: usize,
}

impl LineFramer {
    pub fn new(max_frame_length: usize) -> Self {
        Self { max_frame_length }
    }

    /// Drain as many complete lines as `buffer` currently yields. A
    /// trailing CR is treated as part of the delimiter and stripped along
    /// with the LF. An unterminated prefix longer than `maxFrameLength` is
    /// terminal for the connection.
    pub fn decode(&self, buffer: &mut BytesMut) -> Result<Vec<Bytes>> {
        let mut frames = Vec::new();

        loop {
            match buffer.iter().position(|&b| b == b'\n') {
                Some(pos) => {
                    let mut line_len = pos;
                    if line_len > 0 && buffer[line_len - 1] == b'\r' {
                        line_len -= 1;
                    }
                    let line = buffer.split_to(line_len).freeze();
                    buffer.advance(pos - line_len + 1); // skip optional CR + LF
                    frames.push(line);
                }
                None => {
                    if buffer.len() > self.max_frame_length {
                        return Err(FrameError::FrameTooLong(format!(
                            "unterminated line reached {} bytes, exceeding max {}",
                            buffer.len(),
                            self.max_frame_length
                        )));
                    }
                    return Ok(frames);
                }
            }
        }
    }

    /// Append LF to `payload` unless it already ends in one.
    pub fn encode(&self, payload: &[u8]) -> Bytes {
        let mut out = BytesMut::with_capacity(payload.len() + 1);
        out.extend_from_slice(payload);
        if out.last() != Some(&b'\n') {
            out.extend_from_slice(b"\n");
        }
        out.freeze()
    }
}
