//! Request/response envelope parsing and formatting.
//!
//! Grounded on the teacher's `ErrorResponse`/API envelope shapes in
//! `utils/error.rs`: a flat, documented struct with a total formatting
//! path and a generated identifier when the caller omits one.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{FrameError, Result};

/// A parsed inbound request, ready for `RequestRouter`.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub request_id: String,
    pub action: String,
    pub data: Option<Value>,
}

/// An outbound response, ready for `EnvelopeCodec::format_response`.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub request_id: String,
    pub code: i32,
    pub message: String,
    pub data: Option<Value>,
}

impl Response {
    pub fn success(request_id: String, data: Option<Value>) -> Self {
        Self {
            request_id,
            code: 0,
            message: "ok".to_string(),
            data,
        }
    }

    pub fn error(request_id: String, code: i32, message: impl Into<String>) -> Self {
        Self {
            request_id,
            code,
            message: message.into(),
            data: None,
        }
    }
}

/// Wire shape of a response envelope, matching spec.md §3 field-for-field.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponseEnvelope {
    request_id: String,
    code: i32,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
    server_time: String,
}

/// Fixed fallback bytes `formatResponse` returns when serialization itself
/// fails; keeps that function total instead of fallible.
const FALLBACK_RESPONSE: &[u8] = br#"{"code":500,"message":"internal server error"}"#;

/// Parse a request envelope from raw bytes (length-prefixed/line path).
///
/// Unknown top-level fields are ignored; `data` is preserved as opaque JSON.
/// Never partially mutates anything on `ParseError` — the caller's retained
/// buffer is untouched regardless of outcome.
pub fn parse_request(bytes: &[u8]) -> Result<Request> {
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|e| FrameError::MalformedJson(e.to_string()))?;
    parse_request_value(value)
}

/// Parse a request envelope from an already-decoded JSON value (streaming
/// path, fed by `JsonStreamExtractor`).
pub fn parse_request_value(value: Value) -> Result<Request> {
    let obj = value
        .as_object()
        .ok_or_else(|| FrameError::MalformedJson("request envelope must be a JSON object".to_string()))?;

    let request_id = match obj.get("requestId").and_then(Value::as_str) {
        Some(id) if !id.trim().is_empty() => id.to_string(),
        _ => Uuid::new_v4().to_string(),
    };

    let action = obj
        .get("action")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();

    let data = obj.get("data").cloned();

    Ok(Request {
        request_id,
        action,
        data,
    })
}

/// Format a response envelope. Total: a serialization failure falls back to
/// a fixed byte sequence instead of propagating an error.
pub fn format_response(response: &Response) -> Vec<u8> {
    let envelope = ResponseEnvelope {
        request_id: response.request_id.clone(),
        code: response.code,
        message: response.message.clone(),
        data: response.data.clone(),
        server_time: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    };

    serde_json::to_vec(&envelope).unwrap_or_else(|_| FALLBACK_RESPONSE.to_vec())
}
