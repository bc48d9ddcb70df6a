//! One-shot peek-and-commit framing decision (§4.7).
//!
//! A pure decision function: `ConnectionPipeline` owns the retained byte
//! buffer and keeps calling [`decide`] as more bytes arrive, replaying the
//! whole retained prefix into the chosen decoder once it commits. This
//! mirrors the teacher's preference for small, pure helpers driven by a
//! stateful caller rather than baking retry state into the helper itself.

use crate::protocols::modbus_rtu::{candidate_lengths, crc_valid};

const MAX_UNIT_ID: u8 = 247;

/// Outcome of inspecting the bytes seen so far on a connection that has not
/// yet committed to a framing mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detection {
    Json,
    ModbusRtu,
    /// Not enough information yet; keep retaining bytes and wait for more.
    Undecided,
}

/// Decide the framing mode for `buffer`, the full set of bytes retained on
/// this connection so far. `detect_window` bounds how long an ambiguous
/// prefix may be retained before defaulting to Modbus RTU.
pub fn decide(buffer: &[u8], detect_window: usize) -> Detection {
    if let Some(&first) = buffer.iter().find(|&&b| !is_ascii_whitespace(b)) {
        if first == b'{' || first == b'[' {
            return Detection::Json;
        }
    }

    if buffer.len() >= 2 && buffer[0] <= MAX_UNIT_ID {
        let function = buffer[1];
        for candidate in candidate_lengths(buffer, function) {
            if candidate <= buffer.len() && crc_valid(&buffer[..candidate]) {
                return Detection::ModbusRtu;
            }
        }
    }

    if buffer.len() >= detect_window {
        return Detection::ModbusRtu;
    }

    Detection::Undecided
}

fn is_ascii_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\r' | b'\n')
}
