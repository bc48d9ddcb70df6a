//! Incremental, non-blocking JSON value extractor.
//!
//! Ingests arbitrary byte chunks — on any chunk boundary, including inside a
//! string escape or a multi-digit number — and yields complete root-level
//! JSON values as soon as they close. No library `Deserializer` in this
//! ecosystem resumes across an arbitrary byte boundary without buffering
//! the whole value first, so this is a hand-rolled tokenizer covering
//! exactly the shapes spec.md §4.3/§9 calls for: object, array, string,
//! number, and `true`/`false`/`null`. Completed buffers are handed to
//! `serde_json` for the actual parse, so correctness of value construction
//! still rests on a real parser.

use serde_json::Value;

use crate::error::{FrameError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueKind {
    /// `{` or `[` led; completion tracked via bracket depth.
    Structural,
    /// A bare `"` led; completion is the matching closing quote.
    StringScalar,
    /// A number, `true`, `false`, or `null`; completion is the first byte
    /// that cannot extend the token.
    BareScalar,
}

#[derive(Debug)]
struct Accumulator {
    kind: ValueKind,
    buffer: Vec<u8>,
    depth: i32,
    in_string: bool,
    escape: bool,
}

/// Per-connection streaming JSON state (§3 "JSON stream state").
#[derive(Debug)]
pub struct JsonStreamExtractor {
    max_frame_length: usize,
    accum: Option<Accumulator>,
}

impl JsonStreamExtractor {
    pub fn new(max_frame_length: usize) -> Self {
        Self {
            max_frame_length,
            accum: None,
        }
    }

    /// Bytes consumed into the value currently being accumulated. Zero
    /// while idle.
    pub fn pending_bytes(&self) -> usize {
        self.accum.as_ref().map_or(0, |a| a.buffer.len())
    }

    /// Feed one chunk, returning every root JSON value it completes.
    ///
    /// For any decomposition of a concatenation of valid JSON values into
    /// chunks, repeated calls to `feed` emit the same sequence of values as
    /// a single call over the whole concatenation.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<Value>> {
        let mut values = Vec::new();
        let mut i = 0;

        while i < chunk.len() {
            let b = chunk[i];

            if self.accum.is_none() {
                if is_json_whitespace(b) {
                    i += 1;
                    continue;
                }
                self.accum = Some(Accumulator::start(b));
                self.bound_check()?;
                i += 1;
                continue;
            }

            let accum = self.accum.as_mut().unwrap();
            match accum.kind {
                ValueKind::BareScalar => {
                    if is_bare_scalar_byte(b) {
                        accum.buffer.push(b);
                        self.bound_check()?;
                        i += 1;
                    } else {
                        values.push(self.finish()?);
                        // Re-process this byte from Idle: it may start the
                        // next value or be whitespace to absorb.
                    }
                }
                ValueKind::StringScalar => {
                    accum.buffer.push(b);
                    self.bound_check()?;
                    let accum = self.accum.as_mut().unwrap();
                    if accum.escape {
                        accum.escape = false;
                    } else if b == b'\\' {
                        accum.escape = true;
                    } else if b == b'"' {
                        i += 1;
                        values.push(self.finish()?);
                        continue;
                    }
                    i += 1;
                }
                ValueKind::Structural => {
                    accum.buffer.push(b);
                    self.bound_check()?;
                    let accum = self.accum.as_mut().unwrap();
                    if accum.in_string {
                        if accum.escape {
                            accum.escape = false;
                        } else if b == b'\\' {
                            accum.escape = true;
                        } else if b == b'"' {
                            accum.in_string = false;
                        }
                    } else {
                        match b {
                            b'"' => accum.in_string = true,
                            b'{' | b'[' => accum.depth += 1,
                            b'}' | b']' => {
                                accum.depth -= 1;
                                if accum.depth == 0 {
                                    i += 1;
                                    values.push(self.finish()?);
                                    continue;
                                }
                            }
                            _ => {}
                        }
                    }
                    i += 1;
                }
            }
        }

        Ok(values)
    }

    fn bound_check(&self) -> Result<()> {
        let pending = self.pending_bytes();
        if pending > self.max_frame_length {
            return Err(FrameError::StreamTooLong(format!(
                "JSON accumulator reached {pending} bytes, exceeding max {}",
                self.max_frame_length
            )));
        }
        Ok(())
    }

    /// Parse the completed accumulator and reset to idle.
    fn finish(&mut self) -> Result<Value> {
        let accum = self.accum.take().expect("finish called while idle");
        serde_json::from_slice(&accum.buffer)
            .map_err(|e| FrameError::MalformedJson(e.to_string()))
    }
}

impl Accumulator {
    fn start(first: u8) -> Self {
        let kind = match first {
            b'{' | b'[' => ValueKind::Structural,
            b'"' => ValueKind::StringScalar,
            _ => ValueKind::BareScalar,
        };
        let mut buffer = Vec::with_capacity(16);
        buffer.push(first);
        Self {
            kind,
            buffer,
            depth: if matches!(first, b'{' | b'[') { 1 } else { 0 },
            in_string: first == b'"',
            escape: false,
        }
    }
}

fn is_json_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\r' | b'\n')
}

fn is_bare_scalar_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'+' | b'-' | b'.')
}
