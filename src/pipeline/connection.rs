//! Per-connection pipeline state (§4.8): the active framing choice, its
//! decoder state, and the idle-timeout configuration the accept loop reads.
//!
//! Per design note §9, the decoder "chain" is modeled as a tagged variant
//! (`ActiveDecoder`) driven through explicit state transitions rather than
//! by inserting handlers into a runtime list — `AutoDetector`'s commit is
//! the only transition `PipelineState` ever makes.

use bytes::{Bytes, BytesMut};
use uuid::Uuid;

use crate::config::{FramingMode, ServerConfig};
use crate::error::{FrameError, Result};
use crate::pipeline::auto_detect::{decide, Detection};
use crate::pipeline::router::route;
use crate::protocols::envelope::{format_response, parse_request, parse_request_value, Response};
use crate::protocols::json_stream::JsonStreamExtractor;
use crate::protocols::length_framer::LengthPrefixFramer;
use crate::protocols::line_framer::LineFramer;
use crate::protocols::modbus_rtu::ModbusRtuFramer;

/// Something the pipeline wants the caller to do in response to bytes it
/// just decoded.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// Bytes to write back to the socket (an already-framed response).
    Outbound(Bytes),
    /// A raw Modbus RTU frame observed; the core does not interpret it
    /// beyond framing.
    ModbusFrame(Bytes),
    /// A raw chunk observed on a `Raw`-framed connection.
    RawChunk(Bytes),
}

/// Result of feeding one chunk: the events it produced, and whether the
/// connection must now be closed.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FeedOutcome {
    pub events: Vec<PipelineEvent>,
    pub fatal: bool,
}

enum PipelineState {
    /// Pre-commit: retaining every byte seen until `AutoDetector` decides.
    Detecting { retained: BytesMut },
    Active(ActiveDecoder),
}

enum ActiveDecoder {
    Raw,
    LengthField {
        framer: LengthPrefixFramer,
        buf: BytesMut,
    },
    JsonObject {
        extractor: JsonStreamExtractor,
    },
    Line {
        framer: LineFramer,
        buf: BytesMut,
    },
    ModbusRtu {
        framer: ModbusRtuFramer,
        buf: BytesMut,
    },
}

pub struct ConnectionPipeline {
    max_frame_length: usize,
    respond_enabled: bool,
    detect_window: usize,
    reader_idle_seconds: u64,
    state: PipelineState,
}

impl ConnectionPipeline {
    pub fn new(config: &ServerConfig) -> Self {
        let max_frame_length = config.max_frame_length;
        let state = match config.framing {
            FramingMode::Auto => PipelineState::Detecting {
                retained: BytesMut::new(),
            },
            FramingMode::Raw => PipelineState::Active(ActiveDecoder::Raw),
            FramingMode::LengthField => PipelineState::Active(ActiveDecoder::LengthField {
                framer: LengthPrefixFramer::new(max_frame_length),
                buf: BytesMut::new(),
            }),
            FramingMode::JsonObject => PipelineState::Active(ActiveDecoder::JsonObject {
                extractor: JsonStreamExtractor::new(max_frame_length),
            }),
            FramingMode::Line => PipelineState::Active(ActiveDecoder::Line {
                framer: LineFramer::new(max_frame_length),
                buf: BytesMut::new(),
            }),
            FramingMode::ModbusRtu => PipelineState::Active(ActiveDecoder::ModbusRtu {
                framer: ModbusRtuFramer::new(max_frame_length),
                buf: BytesMut::new(),
            }),
        };

        Self {
            max_frame_length,
            respond_enabled: config.respond_enabled,
            detect_window: config.detect_window,
            reader_idle_seconds: config.reader_idle_seconds,
            state,
        }
    }

    pub fn reader_idle_seconds(&self) -> u64 {
        self.reader_idle_seconds
    }

    /// Feed one inbound chunk. `Err` is reserved for unconditionally fatal
    /// conditions with no response attempt (`FrameTooLong`, `StreamTooLong`);
    /// a streaming JSON corruption is reported as `Ok` with `fatal: true`
    /// and, if `respondEnabled`, one best-effort error response already
    /// queued in `events` (open question (a): attempt before close).
    pub fn feed(&mut self, chunk: &[u8]) -> Result<FeedOutcome> {
        let respond_enabled = self.respond_enabled;
        let detect_window = self.detect_window;
        let max_frame_length = self.max_frame_length;

        match &mut self.state {
            PipelineState::Detecting { retained } => {
                retained.extend_from_slice(chunk);
                match decide(retained, detect_window) {
                    Detection::Undecided => Ok(FeedOutcome::default()),
                    Detection::Json => {
                        let carried = std::mem::take(retained);
                        let mut extractor = JsonStreamExtractor::new(max_frame_length);
                        let outcome = process_json(&mut extractor, &carried, respond_enabled)?;
                        self.state = PipelineState::Active(ActiveDecoder::JsonObject { extractor });
                        Ok(outcome)
                    }
                    Detection::ModbusRtu => {
                        let carried = std::mem::take(retained);
                        let framer = ModbusRtuFramer::new(max_frame_length);
                        let mut buf = carried;
                        let outcome = process_modbus(&framer, &mut buf)?;
                        self.state = PipelineState::Active(ActiveDecoder::ModbusRtu { framer, buf });
                        Ok(outcome)
                    }
                }
            }
            PipelineState::Active(decoder) => feed_active(decoder, chunk, respond_enabled),
        }
    }
}

fn feed_active(decoder: &mut ActiveDecoder, chunk: &[u8], respond_enabled: bool) -> Result<FeedOutcome> {
    match decoder {
        ActiveDecoder::Raw => Ok(FeedOutcome {
            events: vec![PipelineEvent::RawChunk(Bytes::copy_from_slice(chunk))],
            fatal: false,
        }),
        ActiveDecoder::LengthField { framer, buf } => {
            buf.extend_from_slice(chunk);
            process_length_field(framer, buf, respond_enabled)
        }
        ActiveDecoder::Line { framer, buf } => {
            buf.extend_from_slice(chunk);
            process_line(framer, buf, respond_enabled)
        }
        ActiveDecoder::ModbusRtu { framer, buf } => {
            buf.extend_from_slice(chunk);
            process_modbus(framer, buf)
        }
        ActiveDecoder::JsonObject { extractor } => process_json(extractor, chunk, respond_enabled),
    }
}

fn process_length_field(
    framer: &LengthPrefixFramer,
    buf: &mut BytesMut,
    respond_enabled: bool,
) -> Result<FeedOutcome> {
    let frames = framer.decode(buf)?;
    let mut events = Vec::new();
    for frame in frames {
        let response = match parse_request(&frame) {
            Ok(request) => route(&request),
            Err(_) => Response::error(Uuid::new_v4().to_string(), 400, "malformed JSON"),
        };
        if respond_enabled {
            let bytes = format_response(&response);
            events.push(PipelineEvent::Outbound(framer.encode(&bytes)));
        }
    }
    Ok(FeedOutcome { events, fatal: false })
}

fn process_line(framer: &LineFramer, buf: &mut BytesMut, respond_enabled: bool) -> Result<FeedOutcome> {
    let frames = framer.decode(buf)?;
    let mut events = Vec::new();
    for frame in frames {
        let response = match parse_request(&frame) {
            Ok(request) => route(&request),
            Err(_) => Response::error(Uuid::new_v4().to_string(), 400, "malformed JSON"),
        };
        if respond_enabled {
            let bytes = format_response(&response);
            events.push(PipelineEvent::Outbound(framer.encode(&bytes)));
        }
    }
    Ok(FeedOutcome { events, fatal: false })
}

fn process_modbus(framer: &ModbusRtuFramer, buf: &mut BytesMut) -> Result<FeedOutcome> {
    let frames = framer.decode(buf)?;
    let events = frames.into_iter().map(PipelineEvent::ModbusFrame).collect();
    Ok(FeedOutcome { events, fatal: false })
}

fn process_json(extractor: &mut JsonStreamExtractor, chunk: &[u8], respond_enabled: bool) -> Result<FeedOutcome> {
    match extractor.feed(chunk) {
        Ok(values) => {
            let mut events = Vec::new();
            for value in values {
                let response = match parse_request_value(value) {
                    Ok(request) => route(&request),
                    Err(_) => Response::error(Uuid::new_v4().to_string(), 400, "malformed JSON"),
                };
                if respond_enabled {
                    events.push(PipelineEvent::Outbound(Bytes::from(format_response(&response))));
                }
            }
            Ok(FeedOutcome { events, fatal: false })
        }
        Err(FrameError::MalformedJson(_)) => {
            let mut events = Vec::new();
            if respond_enabled {
                let response = Response::error(Uuid::new_v4().to_string(), 400, "malformed JSON");
                events.push(PipelineEvent::Outbound(Bytes::from(format_response(&response))));
            }
            Ok(FeedOutcome { events, fatal: true })
        }
        Err(other) => Err(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FramingMode;
    use serde_json::Value;

    fn config(framing: FramingMode) -> ServerConfig {
        ServerConfig {
            framing,
            ..ServerConfig::default()
        }
    }

    fn response_value(bytes: &Bytes) -> Value {
        serde_json::from_slice(bytes).unwrap()
    }

    #[test]
    fn length_field_ping_produces_pong() {
        let mut pipeline = ConnectionPipeline::new(&config(FramingMode::LengthField));
        let body = br#"{"requestId":"t1","action":"PING","data":{}}"#;
        let mut input = (body.len() as u32).to_be_bytes().to_vec();
        input.extend_from_slice(body);

        let outcome = pipeline.feed(&input).unwrap();
        assert_eq!(outcome.events.len(), 1);
        assert!(!outcome.fatal);
        let PipelineEvent::Outbound(bytes) = &outcome.events[0] else {
            panic!("expected Outbound event");
        };
        let payload = &bytes[4..];
        let value = response_value(&Bytes::copy_from_slice(payload));
        assert_eq!(value["requestId"], "t1");
        assert_eq!(value["code"], 0);
        assert_eq!(value["data"]["action"], "PONG");
    }

    #[test]
    fn length_field_malformed_json_responds_400_and_stays_open() {
        let mut pipeline = ConnectionPipeline::new(&config(FramingMode::LengthField));
        let body = b"not-a-json";
        let mut input = (body.len() as u32).to_be_bytes().to_vec();
        input.extend_from_slice(body);

        let outcome = pipeline.feed(&input).unwrap();
        assert!(!outcome.fatal);
        let PipelineEvent::Outbound(bytes) = &outcome.events[0] else {
            panic!("expected Outbound event");
        };
        let value = response_value(&Bytes::copy_from_slice(&bytes[4..]));
        assert_eq!(value["code"], 400);
    }

    #[test]
    fn fragmented_streaming_ping() {
        let mut pipeline = ConnectionPipeline::new(&config(FramingMode::JsonObject));
        let body = br#"{"requestId":"t2","action":"PING","data":{}}"#;

        let first = pipeline.feed(&body[..10]).unwrap();
        assert!(first.events.is_empty());

        let second = pipeline.feed(&body[10..]).unwrap();
        assert_eq!(second.events.len(), 1);
        let PipelineEvent::Outbound(bytes) = &second.events[0] else {
            panic!("expected Outbound event");
        };
        let value = response_value(bytes);
        assert_eq!(value["requestId"], "t2");
        assert_eq!(value["data"]["action"], "PONG");
    }

    #[test]
    fn concatenated_modbus_frames() {
        let mut pipeline = ConnectionPipeline::new(&config(FramingMode::ModbusRtu));
        let frame_a = vec![0x01, 0x02, 0x01, 0x00, 0x00, 0x30, 0x79, 0xE2];
        let frame_b = vec![
            0x01, 0x02, 0x06, 0x00, 0x00, 0x80, 0x00, 0x80, 0x00, 0xA8, 0xB9,
        ];

        let mut input = frame_a.clone();
        input.extend_from_slice(&frame_b);

        let outcome = pipeline.feed(&input).unwrap();
        assert_eq!(outcome.events.len(), 2);
        assert_eq!(
            outcome.events[0],
            PipelineEvent::ModbusFrame(Bytes::from(frame_a))
        );
        assert_eq!(
            outcome.events[1],
            PipelineEvent::ModbusFrame(Bytes::from(frame_b))
        );
    }

    #[test]
    fn auto_detect_commits_to_json_and_responds() {
        let mut pipeline = ConnectionPipeline::new(&config(FramingMode::Auto));
        let body = br#"{"requestId":"t3","action":"PING","data":{}}"#;
        let outcome = pipeline.feed(body).unwrap();
        assert_eq!(outcome.events.len(), 1);
        let PipelineEvent::Outbound(bytes) = &outcome.events[0] else {
            panic!("expected Outbound event");
        };
        assert_eq!(response_value(bytes)["data"]["action"], "PONG");
    }

    #[test]
    fn auto_detect_commits_to_modbus_and_observes_frames() {
        let mut pipeline = ConnectionPipeline::new(&config(FramingMode::Auto));
        let frame_a = vec![0x01, 0x02, 0x01, 0x00, 0x00, 0x30, 0x79, 0xE2];
        let frame_b = vec![
            0x01, 0x02, 0x06, 0x00, 0x00, 0x80, 0x00, 0x80, 0x00, 0xA8, 0xB9,
        ];
        let mut input = frame_a.clone();
        input.extend_from_slice(&frame_b);

        let outcome = pipeline.feed(&input).unwrap();
        assert_eq!(outcome.events.len(), 2);
        assert_eq!(outcome.events[0], PipelineEvent::ModbusFrame(Bytes::from(frame_a)));
        assert_eq!(outcome.events[1], PipelineEvent::ModbusFrame(Bytes::from(frame_b)));
    }

    #[test]
    fn streaming_corruption_is_fatal_and_attempts_a_response() {
        let mut pipeline = ConnectionPipeline::new(&config(FramingMode::JsonObject));
        let outcome = pipeline.feed(b"{not valid}").unwrap();
        assert!(outcome.fatal);
        assert_eq!(outcome.events.len(), 1);
        let PipelineEvent::Outbound(bytes) = &outcome.events[0] else {
            panic!("expected Outbound event");
        };
        assert_eq!(response_value(bytes)["code"], 400);
    }

    #[test]
    fn respond_enabled_false_suppresses_output() {
        let mut cfg = config(FramingMode::LengthField);
        cfg.respond_enabled = false;
        let mut pipeline = ConnectionPipeline::new(&cfg);
        let body = br#"{"requestId":"t1","action":"PING"}"#;
        let mut input = (body.len() as u32).to_be_bytes().to_vec();
        input.extend_from_slice(body);

        let outcome = pipeline.feed(&input).unwrap();
        assert!(outcome.events.is_empty());
        assert!(!outcome.fatal);
    }

    #[test]
    fn raw_mode_passes_chunks_through_unframed() {
        let mut pipeline = ConnectionPipeline::new(&config(FramingMode::Raw));
        let outcome = pipeline.feed(b"\x00\x01\x02").unwrap();
        assert_eq!(
            outcome.events,
            vec![PipelineEvent::RawChunk(Bytes::from_static(b"\x00\x01\x02"))]
        );
    }

    #[test]
    fn length_field_frame_too_long_is_fatal_err_with_no_events() {
        let mut cfg = config(FramingMode::LengthField);
        cfg.max_frame_length = 4;
        let mut pipeline = ConnectionPipeline::new(&cfg);
        let input = 100u32.to_be_bytes();
        let err = pipeline.feed(&input).unwrap_err();
        assert!(matches!(err, FrameError::FrameTooLong(_)));
    }
}
