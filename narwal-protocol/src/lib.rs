//! Wire protocol definitions for the Narwal local WebSocket control channel.
//!
//! This crate defines the binary frame format and the schema-free protobuf
//! payload model used by Narwal robot vacuums on their local WebSocket
//! server (port 9002). The format is reverse-engineered from traffic
//! captures; parsing is deliberately permissive and callers should treat
//! decode failures as per-frame events, not connection faults.
//!
//! # Frame Format
//!
//! ```text
//! +--------+--------+--------+--------+-----------+------------------+
//! | Type   | Header | Marker | TopLen |   Topic   |     Payload      |
//! | 0x01   | len+2  | 0x22/  | u8     |  UTF-8    |  protobuf,       |
//! |        |        | 0x2A   |        |  string   |  schema-free     |
//! +--------+--------+--------+--------+-----------+------------------+
//! | 1 byte | 1 byte | 1 byte | 1 byte | TopLen    |  variable        |
//! +--------+--------+--------+--------+-----------+------------------+
//! ```
//!
//! # Example
//!
//! ```rust
//! use narwal_protocol::{build_frame, parse_frame, PbMessage};
//!
//! // Build a command frame with a varint(1) = 1 payload.
//! let frame = build_frame("/QoEsI5qYXO/DEV123/task/pause", b"\x08\x01", None).unwrap();
//!
//! // Parse it back and decode the payload without a schema.
//! let msg = parse_frame(&frame).unwrap();
//! assert_eq!(msg.short_topic(), "task/pause");
//! let payload = PbMessage::decode(&msg.payload).unwrap();
//! assert_eq!(payload.u64_field(1), Some(1));
//! ```

pub mod error;
pub mod frame;
pub mod pb;
pub mod types;

pub use error::{ProtocolError, ValidationError};
pub use frame::{build_frame, parse_frame, Frame, FrameMarker, FRAME_TYPE_BYTE, HEADER_SIZE};
pub use pb::{
    decode_varint, put_bytes_field, put_fixed32_field, put_string_field, put_varint,
    put_varint_field, PbMessage, PbValue,
};
pub use types::{CommandResult, FanLevel, MopHumidity, WorkingMode};
