//! Unified error handling for the framing and dispatch core.
//!
//! Mirrors the teacher's `ComSrvError`: one flat, documented enum with
//! `thiserror` messages and `From` conversions at the few real boundaries
//! (I/O, JSON, address parsing). Every fatal framing condition gets its own
//! variant so callers can match on it instead of parsing strings.

use thiserror::Error;

/// Errors surfaced by the framing/decoding core.
///
/// Not every failure mode in the spec becomes one of these: a single CRC
/// mismatch inside [`crate::protocols::modbus_rtu::ModbusRtuFramer`] is
/// resync control flow, never an error value. These variants are reserved
/// for conditions that change connection state (close it, or turn into a
/// `code=400` response).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// A framer could not make sense of the bytes it was given.
    #[error("protocol error: {0}")]
    ProtocolError(String),

    /// A single frame (any framer) would exceed `maxFrameLength`. Fatal for
    /// the connection.
    #[error("frame too long: {0}")]
    FrameTooLong(String),

    /// The JSON streaming accumulator's `pendingBytes` crossed
    /// `maxFrameLength` before a value completed. Fatal for the connection.
    #[error("stream too long: {0}")]
    StreamTooLong(String),

    /// Malformed JSON. On the length-prefixed/line path this becomes a
    /// `code=400` response; on the streaming path it is fatal.
    #[error("malformed JSON: {0}")]
    MalformedJson(String),

    /// Connection establishment or I/O failure.
    #[error("connection error: {0}")]
    ConnectionError(String),

    /// Failure serializing a response envelope.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Configuration load or validation failure.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    IoError(String),

    /// Anything that should never happen.
    #[error("internal error: {0}")]
    InternalError(String),
}

impl From<std::io::Error> for FrameError {
    fn from(err: std::io::Error) -> Self {
        FrameError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for FrameError {
    fn from(err: serde_json::Error) -> Self {
        FrameError::SerializationError(err.to_string())
    }
}

impl From<std::net::AddrParseError> for FrameError {
    fn from(err: std::net::AddrParseError) -> Self {
        FrameError::ConfigError(format!("address parse error: {err}"))
    }
}

/// Shorthand for `Result<T, FrameError>`.
pub type Result<T> = std::result::Result<T, FrameError>;
