//! Framers and codecs: pure, allocation-light transforms over byte buffers.
//! None of these types touch a socket; `pipeline` wires them to connections.

pub mod crc16;
pub mod envelope;
pub mod json_stream;
pub mod length_framer;
pub mod line_framer;
pub mod modbus_rtu;
