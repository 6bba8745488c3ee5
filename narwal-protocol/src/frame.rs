//! Frame codec for the Narwal WebSocket control channel.
//!
//! Frame format:
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
//! The marker byte is the sole wire-level distinction between unsolicited
//! broadcasts (0x22, protobuf field 4) and command responses (0x2A, field 5).
//! Responses carry no correlation id; matching a response to its command is
//! the dispatcher's job.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{ProtocolError, ValidationError};

/// First byte of every frame.
pub const FRAME_TYPE_BYTE: u8 = 0x01;

/// Fixed header size preceding the topic string.
pub const HEADER_SIZE: usize = 4;

/// Wire category of a frame, taken from the field-marker byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameMarker {
    /// Protobuf field 4, wire type 2. Unsolicited broadcasts and all
    /// client-to-robot command frames.
    Broadcast = 0x22,
    /// Protobuf field 5, wire type 2. Responses to previously sent commands.
    Response = 0x2A,
}

impl FrameMarker {
    /// Classify a raw marker byte.
    pub fn from_byte(byte: u8) -> Result<Self, ProtocolError> {
        match byte {
            0x22 => Ok(FrameMarker::Broadcast),
            0x2A => Ok(FrameMarker::Response),
            other => Err(ProtocolError::InvalidFieldMarker(other)),
        }
    }
}

/// A parsed control-channel frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Full slash-delimited topic: `/{prefix}/{device_id}/{category}/{name}`.
    pub topic: String,
    /// Opaque protobuf payload. May be empty.
    pub payload: Bytes,
    /// Secondary header byte. `topic_len + 2` by convention.
    pub header_byte: u8,
    /// Wire category.
    pub marker: FrameMarker,
    /// The original frame, kept for raw passthrough.
    pub raw: Bytes,
}

impl Frame {
    /// True for command-response frames.
    pub fn is_response(&self) -> bool {
        self.marker == FrameMarker::Response
    }

    /// Topic without the addressing prefix and device id.
    ///
    /// `/{prefix}/{device_id}/status/working_status` → `status/working_status`
    pub fn short_topic(&self) -> &str {
        let mut parts = self.topic.splitn(4, '/');
        // Leading slash yields an empty first segment, then prefix, device id.
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(""), Some(_), Some(_), Some(rest)) => rest,
            _ => &self.topic,
        }
    }
}

/// Build a binary frame for sending to the robot.
///
/// When `header_byte` is `None` it is auto-computed as `topic_len + 2`,
/// matching the observed broadcast format (the length of the field-4 TLV
/// encoding that follows byte 1).
pub fn build_frame(
    topic: &str,
    payload: &[u8],
    header_byte: Option<u8>,
) -> Result<Bytes, ValidationError> {
    let topic_bytes = topic.as_bytes();
    if topic_bytes.is_empty() {
        return Err(ValidationError::EmptyTopic);
    }
    if topic_bytes.len() > 255 {
        return Err(ValidationError::TopicTooLong(topic_bytes.len()));
    }

    let header = header_byte.unwrap_or((topic_bytes.len() + 2) as u8);

    let mut frame = BytesMut::with_capacity(HEADER_SIZE + topic_bytes.len() + payload.len());
    frame.put_u8(FRAME_TYPE_BYTE);
    frame.put_u8(header);
    frame.put_u8(FrameMarker::Broadcast as u8);
    frame.put_u8(topic_bytes.len() as u8);
    frame.put_slice(topic_bytes);
    frame.put_slice(payload);

    Ok(frame.freeze())
}

/// Parse a raw binary frame received from the WebSocket.
pub fn parse_frame(data: &[u8]) -> Result<Frame, ProtocolError> {
    if data.len() < HEADER_SIZE {
        return Err(ProtocolError::FrameTooShort(data.len()));
    }

    if data[0] != FRAME_TYPE_BYTE {
        return Err(ProtocolError::InvalidFrameType(data[0]));
    }

    let marker = FrameMarker::from_byte(data[2])?;
    let header_byte = data[1];
    let topic_len = data[3] as usize;

    let topic_end = HEADER_SIZE + topic_len;
    if data.len() < topic_end {
        return Err(ProtocolError::TruncatedTopic {
            expected: topic_end,
            actual: data.len(),
        });
    }

    let topic = std::str::from_utf8(&data[HEADER_SIZE..topic_end])
        .map_err(|e| ProtocolError::InvalidTopicUtf8(e.to_string()))?
        .to_string();

    Ok(Frame {
        topic,
        payload: Bytes::copy_from_slice(&data[topic_end..]),
        header_byte,
        marker,
        raw: Bytes::copy_from_slice(data),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_TOPIC: &str = "/QoEsI5qYXO/test_device_id_000000000000000/status/working_status";

    #[test]
    fn test_build_parse_roundtrip() {
        let frame = build_frame(SAMPLE_TOPIC, b"\x18\x01", None).unwrap();
        let msg = parse_frame(&frame).unwrap();
        assert_eq!(msg.topic, SAMPLE_TOPIC);
        assert_eq!(&msg.payload[..], b"\x18\x01");
        assert_eq!(msg.header_byte, SAMPLE_TOPIC.len() as u8 + 2);
        assert_eq!(msg.marker, FrameMarker::Broadcast);
    }

    #[test]
    fn test_frame_structure() {
        let frame = build_frame("abc", b"\x08\x01", None).unwrap();
        assert_eq!(frame[0], 0x01);
        assert_eq!(frame[1], 5); // topic_len(3) + 2
        assert_eq!(frame[2], 0x22);
        assert_eq!(frame[3], 3);
        assert_eq!(&frame[4..7], b"abc");
        assert_eq!(&frame[7..], b"\x08\x01");
    }

    #[test]
    fn test_roundtrip_boundary_topic_lengths() {
        for len in [1usize, 255] {
            let topic = "t".repeat(len);
            let frame = build_frame(&topic, b"\x08\x01", None).unwrap();
            let msg = parse_frame(&frame).unwrap();
            assert_eq!(msg.topic, topic);
            assert_eq!(&msg.payload[..], b"\x08\x01");
        }
    }

    #[test]
    fn test_short_topic_extraction() {
        let frame = build_frame(SAMPLE_TOPIC, b"", None).unwrap();
        let msg = parse_frame(&frame).unwrap();
        assert_eq!(msg.short_topic(), "status/working_status");

        // Topics without the full prefix shape pass through unchanged.
        let msg = parse_frame(&build_frame("a/b", b"", None).unwrap()).unwrap();
        assert_eq!(msg.short_topic(), "a/b");
    }

    #[test]
    fn test_empty_payload() {
        let msg = parse_frame(&build_frame("test/topic", b"", None).unwrap()).unwrap();
        assert!(msg.payload.is_empty());
        assert_eq!(msg.topic, "test/topic");
    }

    #[test]
    fn test_custom_header_byte() {
        let frame = build_frame("test/topic", b"\x08\x01", Some(0xAB)).unwrap();
        let msg = parse_frame(&frame).unwrap();
        assert_eq!(msg.header_byte, 0xAB);
    }

    #[test]
    fn test_response_marker() {
        let mut frame = build_frame("t", b"\x0a\x01\x02", None).unwrap().to_vec();
        frame[2] = 0x2A;
        let msg = parse_frame(&frame).unwrap();
        assert!(msg.is_response());
        assert_eq!(msg.marker, FrameMarker::Response);
    }

    #[test]
    fn test_too_short() {
        assert!(matches!(
            parse_frame(b"\x01\x00\x22"),
            Err(ProtocolError::FrameTooShort(3))
        ));
    }

    #[test]
    fn test_wrong_frame_type() {
        assert!(matches!(
            parse_frame(b"\x02\x00\x22\x01X"),
            Err(ProtocolError::InvalidFrameType(0x02))
        ));
    }

    #[test]
    fn test_wrong_field_marker() {
        assert!(matches!(
            parse_frame(b"\x01\x00\x33\x01X"),
            Err(ProtocolError::InvalidFieldMarker(0x33))
        ));
    }

    #[test]
    fn test_truncated_topic() {
        // Declares a 10-byte topic but only 1 byte follows.
        assert!(matches!(
            parse_frame(b"\x01\x00\x22\x0aX"),
            Err(ProtocolError::TruncatedTopic { expected: 14, actual: 5 })
        ));
    }

    #[test]
    fn test_invalid_utf8_topic() {
        let result = parse_frame(b"\x01\x00\x22\x02\xff\xfe");
        assert!(matches!(result, Err(ProtocolError::InvalidTopicUtf8(_))));
    }

    #[test]
    fn test_build_empty_topic() {
        assert_eq!(build_frame("", b"\x08\x01", None), Err(ValidationError::EmptyTopic));
    }

    #[test]
    fn test_build_long_topic() {
        let topic = "x".repeat(256);
        assert_eq!(
            build_frame(&topic, b"", None),
            Err(ValidationError::TopicTooLong(256))
        );
    }
}
