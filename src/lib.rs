//! Multi-protocol TCP frame decoding and dispatch core.
//!
//! Accepts TCP connections, detects or pins a framing mode per connection,
//! decodes frames into request envelopes (or raw Modbus RTU frames), routes
//! parsed requests, and writes back framed responses.

pub mod config;
pub mod error;
pub mod pipeline;
pub mod protocols;
pub mod server;
