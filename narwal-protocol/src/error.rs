//! Error types for the Narwal wire protocol.

use thiserror::Error;

/// Protocol-level errors raised while parsing incoming frames or payloads.
///
/// The wire format is reverse-engineered, so callers are expected to treat
/// these as per-frame failures: log and drop, never tear down the connection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Frame is shorter than the fixed 4-byte header.
    #[error("Frame too short: {0} bytes (minimum 4)")]
    FrameTooShort(usize),

    /// Frame-type byte is not the single recognized constant.
    #[error("Invalid frame type byte: 0x{0:02x} (expected 0x01)")]
    InvalidFrameType(u8),

    /// Field-marker byte is neither the broadcast nor the response marker.
    #[error("Invalid field marker: 0x{0:02x} (expected 0x22 or 0x2a)")]
    InvalidFieldMarker(u8),

    /// Declared topic length exceeds the remaining buffer.
    #[error("Frame truncated: expected {expected} bytes for topic, got {actual}")]
    TruncatedTopic { expected: usize, actual: usize },

    /// Topic bytes are not valid UTF-8.
    #[error("Invalid UTF-8 in topic: {0}")]
    InvalidTopicUtf8(String),

    /// Protobuf payload could not be decoded.
    #[error("Failed to decode payload: {0}")]
    DecodeError(String),
}

/// Validation errors raised while building outgoing frames.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Topic must be non-empty.
    #[error("Topic cannot be empty")]
    EmptyTopic,

    /// Topic length is encoded in a single byte.
    #[error("Topic too long: {0} bytes (max 255)")]
    TopicTooLong(usize),
}
