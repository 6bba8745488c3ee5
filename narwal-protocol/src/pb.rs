//! Schema-free protobuf decoding.
//!
//! The robot's message definitions are undocumented, so payloads are decoded
//! without a compiled schema into a recursive tagged value. Length-delimited
//! fields are speculatively decoded as nested messages and fall back to raw
//! bytes when that fails. Consumers must pattern-match defensively: every
//! accessor returns `Option` and defaults on shape mismatch, because field
//! meanings are inferred, not specified.

use std::borrow::Cow;
use std::collections::BTreeMap;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;

/// Nested-message recursion limit for speculative decoding.
const MAX_DEPTH: usize = 16;

/// A single decoded protobuf value of unknown schema.
#[derive(Debug, Clone, PartialEq)]
pub enum PbValue {
    /// Wire type 0.
    Varint(u64),
    /// Wire type 5. Without a schema this may be a u32, an i32, or the bit
    /// pattern of an f32; see [`PbValue::as_f32`].
    Fixed32(u32),
    /// Wire type 1.
    Fixed64(u64),
    /// Wire type 2 that did not decode as a nested message.
    Bytes(Bytes),
    /// Wire type 2 that decoded cleanly as a nested message.
    Message(PbMessage),
    /// A field number that occurred more than once.
    Repeated(Vec<PbValue>),
}

impl PbValue {
    /// Integer view of varint and fixed-width values.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            PbValue::Varint(v) => Some(*v),
            PbValue::Fixed32(v) => Some(u64::from(*v)),
            PbValue::Fixed64(v) => Some(*v),
            _ => None,
        }
    }

    /// Signed integer view.
    pub fn as_i64(&self) -> Option<i64> {
        self.as_u64().map(|v| v as i64)
    }

    /// Interpret the value as an IEEE 754 float32.
    ///
    /// Fixed32 fields carry the bit pattern directly; varints holding a
    /// 32-bit pattern are also accepted because the robot encodes some float
    /// fields either way depending on firmware.
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            PbValue::Fixed32(bits) => Some(f32::from_bits(*bits)),
            PbValue::Varint(v) if *v <= u64::from(u32::MAX) => Some(f32::from_bits(*v as u32)),
            _ => None,
        }
    }

    /// Raw bytes view.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            PbValue::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Lossy UTF-8 view of a bytes field, with trailing newlines trimmed
    /// (device identity strings come back newline-terminated).
    pub fn as_str_lossy(&self) -> Option<Cow<'_, str>> {
        match self {
            PbValue::Bytes(b) => Some(match String::from_utf8_lossy(b) {
                Cow::Borrowed(s) => Cow::Borrowed(s.trim_end_matches('\n')),
                Cow::Owned(s) => Cow::Owned(s.trim_end_matches('\n').to_string()),
            }),
            _ => None,
        }
    }

    /// Nested message view.
    pub fn as_message(&self) -> Option<&PbMessage> {
        match self {
            PbValue::Message(m) => Some(m),
            _ => None,
        }
    }

    /// Iterate the value as a repeated field: a `Repeated` yields its items,
    /// any other value yields itself once.
    pub fn iter_repeated(&self) -> impl Iterator<Item = &PbValue> {
        match self {
            PbValue::Repeated(items) => items.iter(),
            other => std::slice::from_ref(other).iter(),
        }
    }
}

/// A decoded protobuf message: field number → value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PbMessage {
    fields: BTreeMap<u32, PbValue>,
}

impl PbMessage {
    /// Decode a payload without a schema.
    pub fn decode(data: &[u8]) -> Result<PbMessage, ProtocolError> {
        decode_message(data, 0)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Look up a field by number.
    pub fn get(&self, field: u32) -> Option<&PbValue> {
        self.fields.get(&field)
    }

    /// Iterate fields in field-number order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &PbValue)> {
        self.fields.iter().map(|(k, v)| (*k, v))
    }

    /// Integer field, `None` when absent or not an integer.
    pub fn u64_field(&self, field: u32) -> Option<u64> {
        self.get(field).and_then(PbValue::as_u64)
    }

    pub fn i64_field(&self, field: u32) -> Option<i64> {
        self.get(field).and_then(PbValue::as_i64)
    }

    pub fn f32_field(&self, field: u32) -> Option<f32> {
        self.get(field).and_then(PbValue::as_f32)
    }

    pub fn str_field(&self, field: u32) -> Option<Cow<'_, str>> {
        self.get(field).and_then(PbValue::as_str_lossy)
    }

    pub fn bytes_field(&self, field: u32) -> Option<&Bytes> {
        self.get(field).and_then(PbValue::as_bytes)
    }

    pub fn message_field(&self, field: u32) -> Option<&PbMessage> {
        self.get(field).and_then(PbValue::as_message)
    }

    fn insert(&mut self, field: u32, value: PbValue) {
        match self.fields.get_mut(&field) {
            Some(PbValue::Repeated(items)) => items.push(value),
            Some(existing) => {
                let first = std::mem::replace(existing, PbValue::Varint(0));
                *existing = PbValue::Repeated(vec![first, value]);
            }
            None => {
                self.fields.insert(field, value);
            }
        }
    }
}

fn decode_message(data: &[u8], depth: usize) -> Result<PbMessage, ProtocolError> {
    if depth > MAX_DEPTH {
        return Err(ProtocolError::DecodeError("nesting too deep".into()));
    }

    let mut msg = PbMessage::default();
    let mut pos = 0usize;

    while pos < data.len() {
        let (tag, n) = decode_varint(&data[pos..])?;
        pos += n;
        let field = (tag >> 3) as u32;
        let wire_type = (tag & 0x07) as u8;
        if field == 0 {
            return Err(ProtocolError::DecodeError("field number 0".into()));
        }

        let value = match wire_type {
            0 => {
                let (v, n) = decode_varint(&data[pos..])?;
                pos += n;
                PbValue::Varint(v)
            }
            1 => {
                let end = pos + 8;
                let chunk = data
                    .get(pos..end)
                    .ok_or_else(|| ProtocolError::DecodeError("fixed64 truncated".into()))?;
                pos = end;
                PbValue::Fixed64(u64::from_le_bytes(chunk.try_into().unwrap_or([0; 8])))
            }
            2 => {
                let (len, n) = decode_varint(&data[pos..])?;
                pos += n;
                let end = pos
                    .checked_add(len as usize)
                    .ok_or_else(|| ProtocolError::DecodeError("length overflows".into()))?;
                let chunk = data
                    .get(pos..end)
                    .ok_or_else(|| ProtocolError::DecodeError("length-delimited truncated".into()))?;
                pos = end;
                // Speculative nested decode; raw bytes on any failure.
                if !chunk.is_empty() {
                    match decode_message(chunk, depth + 1) {
                        Ok(nested) if !nested.is_empty() => PbValue::Message(nested),
                        _ => PbValue::Bytes(Bytes::copy_from_slice(chunk)),
                    }
                } else {
                    PbValue::Bytes(Bytes::new())
                }
            }
            5 => {
                let end = pos + 4;
                let chunk = data
                    .get(pos..end)
                    .ok_or_else(|| ProtocolError::DecodeError("fixed32 truncated".into()))?;
                pos = end;
                PbValue::Fixed32(u32::from_le_bytes(chunk.try_into().unwrap_or([0; 4])))
            }
            other => {
                return Err(ProtocolError::DecodeError(format!(
                    "unsupported wire type {other}"
                )));
            }
        };

        msg.insert(field, value);
    }

    Ok(msg)
}

/// Decode a single varint, returning the value and bytes consumed.
pub fn decode_varint(data: &[u8]) -> Result<(u64, usize), ProtocolError> {
    let mut value: u64 = 0;
    for (i, byte) in data.iter().enumerate() {
        if i >= 10 {
            break;
        }
        value |= u64::from(byte & 0x7F) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    Err(ProtocolError::DecodeError("varint truncated".into()))
}

/// Append a varint to a buffer.
pub fn put_varint(buf: &mut BytesMut, mut value: u64) {
    while value > 0x7F {
        buf.put_u8((value as u8 & 0x7F) | 0x80);
        value >>= 7;
    }
    buf.put_u8(value as u8);
}

/// Append a varint field (wire type 0).
pub fn put_varint_field(buf: &mut BytesMut, field: u32, value: u64) {
    put_varint(buf, u64::from(field) << 3);
    put_varint(buf, value);
}

/// Append a length-delimited field (wire type 2).
pub fn put_bytes_field(buf: &mut BytesMut, field: u32, data: &[u8]) {
    put_varint(buf, (u64::from(field) << 3) | 2);
    put_varint(buf, data.len() as u64);
    buf.put_slice(data);
}

/// Append a UTF-8 string field (wire type 2).
pub fn put_string_field(buf: &mut BytesMut, field: u32, text: &str) {
    put_bytes_field(buf, field, text.as_bytes());
}

/// Append a fixed32 field (wire type 5).
pub fn put_fixed32_field(buf: &mut BytesMut, field: u32, value: u32) {
    put_varint(buf, (u64::from(field) << 3) | 5);
    buf.put_u32_le(value);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_varint_field() {
        // Field 3, varint 1.
        let msg = PbMessage::decode(b"\x18\x01").unwrap();
        assert_eq!(msg.u64_field(3), Some(1));
    }

    #[test]
    fn test_decode_nested_message() {
        let mut inner = BytesMut::new();
        put_varint_field(&mut inner, 1, 4);
        put_varint_field(&mut inner, 2, 1);
        let mut outer = BytesMut::new();
        put_bytes_field(&mut outer, 3, &inner);

        let msg = PbMessage::decode(&outer).unwrap();
        let nested = msg.message_field(3).unwrap();
        assert_eq!(nested.u64_field(1), Some(4));
        assert_eq!(nested.u64_field(2), Some(1));
    }

    #[test]
    fn test_decode_fixed32_as_f32() {
        let mut buf = BytesMut::new();
        put_fixed32_field(&mut buf, 2, 85.0_f32.to_bits());
        let msg = PbMessage::decode(&buf).unwrap();
        assert_eq!(msg.f32_field(2), Some(85.0));
    }

    #[test]
    fn test_varint_holding_float_bits() {
        // Some firmwares emit float fields as varints carrying the bit pattern.
        let mut buf = BytesMut::new();
        put_varint_field(&mut buf, 2, u64::from(83.0_f32.to_bits()));
        let msg = PbMessage::decode(&buf).unwrap();
        assert_eq!(msg.f32_field(2), Some(83.0));
    }

    #[test]
    fn test_text_bytes_fall_back_to_bytes() {
        let mut buf = BytesMut::new();
        put_string_field(&mut buf, 7, "v01.02.19.02\n");
        let msg = PbMessage::decode(&buf).unwrap();
        assert_eq!(msg.str_field(7).as_deref(), Some("v01.02.19.02"));
    }

    #[test]
    fn test_repeated_field_collects() {
        let mut buf = BytesMut::new();
        let mut room = BytesMut::new();
        put_varint_field(&mut room, 1, 1);
        put_string_field(&mut room, 3, "Kitchen");
        put_bytes_field(&mut buf, 12, &room);
        room.clear();
        put_varint_field(&mut room, 1, 2);
        put_string_field(&mut room, 3, "Hall");
        put_bytes_field(&mut buf, 12, &room);

        let msg = PbMessage::decode(&buf).unwrap();
        let rooms: Vec<_> = msg.get(12).unwrap().iter_repeated().collect();
        assert_eq!(rooms.len(), 2);
        assert_eq!(rooms[1].as_message().unwrap().u64_field(1), Some(2));
    }

    #[test]
    fn test_single_value_iterates_once() {
        let msg = PbMessage::decode(b"\x18\x01").unwrap();
        assert_eq!(msg.get(3).unwrap().iter_repeated().count(), 1);
    }

    #[test]
    fn test_truncated_payload_errors() {
        // Field 1, length-delimited claiming 10 bytes with 2 available.
        assert!(PbMessage::decode(b"\x0a\x0aXY").is_err());
    }

    #[test]
    fn test_accessors_default_on_mismatch() {
        let msg = PbMessage::decode(b"\x18\x01").unwrap();
        assert_eq!(msg.str_field(3), None);
        assert_eq!(msg.message_field(3), None);
        assert_eq!(msg.u64_field(99), None);
    }

    #[test]
    fn test_empty_payload_is_empty_message() {
        let msg = PbMessage::decode(b"").unwrap();
        assert!(msg.is_empty());
    }
}
