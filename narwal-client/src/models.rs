//! Data models decoded from robot payloads.
//!
//! Every `from_*` constructor reads a schema-free [`PbMessage`] and tolerates
//! absent or oddly-shaped fields, because the field layout is inferred from
//! traffic captures rather than a published schema.

use bytes::Bytes;

use narwal_protocol::pb::{PbMessage, PbValue};
use narwal_protocol::types::CommandResult;

/// Device identity from a get_device_info response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceInfo {
    pub product_key: String,
    pub device_id: String,
    pub firmware_version: String,
}

impl DeviceInfo {
    /// Fields 1..=3 hold newline-terminated identity strings.
    pub fn from_response(data: &PbMessage) -> Self {
        Self {
            product_key: data.str_field(1).unwrap_or_default().into_owned(),
            device_id: data.str_field(2).unwrap_or_default().into_owned(),
            firmware_version: data.str_field(3).unwrap_or_default().into_owned(),
        }
    }
}

/// A room on the map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoomInfo {
    pub room_id: u64,
    pub room_type: u64,
    pub name: String,
}

/// Numeric view of a field that may arrive as a float bit pattern or a
/// plain integer depending on firmware.
fn numeric(value: &PbValue) -> Option<f64> {
    match value {
        PbValue::Fixed32(_) => value.as_f32().map(f64::from),
        PbValue::Varint(v) => Some(*v as f64),
        PbValue::Fixed64(v) => Some(*v as f64),
        _ => None,
    }
}

/// Static map from a get_map response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MapData {
    /// Grid width in pixels.
    pub width: u64,
    /// Grid height in pixels.
    pub height: u64,
    /// Millimeters per pixel.
    pub resolution: u64,
    pub rooms: Vec<RoomInfo>,
    /// Compressed occupancy grid; decompression and rendering are external.
    pub compressed_map: Bytes,
    /// Mapped area in cm2.
    pub area: u64,
    pub created_at: u64,
    /// Dock position in grid pixel coordinates, when derivable.
    pub dock_x: Option<f64>,
    pub dock_y: Option<f64>,
    /// Full decoded payload, kept for fields not yet understood.
    pub raw: PbMessage,
}

impl MapData {
    /// Parse a get_map response. The map body sits in field 2 of the
    /// response envelope.
    pub fn from_response(data: &PbMessage) -> Self {
        let Some(payload) = data.message_field(2) else {
            return Self::default();
        };

        let mut rooms = Vec::new();
        if let Some(value) = payload.get(12) {
            for entry in value.iter_repeated() {
                if let Some(room) = entry.as_message() {
                    rooms.push(RoomInfo {
                        room_id: room.u64_field(1).unwrap_or(0),
                        room_type: room.u64_field(2).unwrap_or(0),
                        name: room.str_field(3).unwrap_or_default().into_owned(),
                    });
                }
            }
        }

        let resolution = payload.u64_field(3).unwrap_or(0);
        let (dock_x, dock_y) = dock_position(payload, resolution);

        Self {
            width: payload.u64_field(4).unwrap_or(0),
            height: payload.u64_field(5).unwrap_or(0),
            resolution,
            rooms,
            compressed_map: payload.bytes_field(17).cloned().unwrap_or_default(),
            area: payload.u64_field(33).unwrap_or(0),
            created_at: payload.u64_field(34).unwrap_or(0),
            dock_x,
            dock_y,
            raw: payload.clone(),
        }
    }
}

/// Derive the dock pixel position from the map payload.
///
/// Field 48 is a repeated list of timestamped positions in centimeters:
/// `{1: id, 2: {1: x_cm, 2: y_cm}, 3: timestamp}`. The entry with the
/// latest timestamp is the current dock. Field 6 carries the grid origin
/// offsets (sub-field 3 = x, sub-field 1 = y), and resolution is mm/pixel,
/// so `px = cm / (resolution / 10) - origin`.
fn dock_position(payload: &PbMessage, resolution: u64) -> (Option<f64>, Option<f64>) {
    if resolution == 0 {
        return (None, None);
    }
    let (Some(entries), Some(origin)) = (payload.get(48), payload.message_field(6)) else {
        return (None, None);
    };

    let mut best_ts: i64 = -1;
    let mut best_pos: Option<&PbMessage> = None;
    for entry in entries.iter_repeated() {
        let Some(entry) = entry.as_message() else {
            continue;
        };
        let ts = entry.i64_field(3).unwrap_or(0);
        if let Some(pos) = entry.message_field(2) {
            if pos.get(1).is_some() && pos.get(2).is_some() && ts >= best_ts {
                best_ts = ts;
                best_pos = Some(pos);
            }
        }
    }

    let Some(pos) = best_pos else {
        return (None, None);
    };
    let (Some(x_cm), Some(y_cm)) = (
        pos.get(1).and_then(numeric),
        pos.get(2).and_then(numeric),
    ) else {
        return (None, None);
    };

    let cm_per_pixel = resolution as f64 / 10.0;
    let origin_x = origin.i64_field(3).unwrap_or(0) as f64;
    let origin_y = origin.i64_field(1).unwrap_or(0) as f64;
    (
        Some(x_cm / cm_per_pixel - origin_x),
        Some(y_cm / cm_per_pixel - origin_y),
    )
}

/// Robot position from a live map broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub heading: f64,
}

/// Live map snapshot from map/display_map broadcasts, sent during cleaning.
///
/// Field layout inferred from protocol analysis: field 7 is the grid
/// sub-message `{1: width, 2: height, 3: compressed grid}` and field 1 the
/// robot position `{1: x, 2: y, 3: heading}`, with top-level fallbacks seen
/// on some firmware revisions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MapDisplayData {
    pub width: u64,
    pub height: u64,
    pub compressed_grid: Bytes,
    pub position: Position,
    pub timestamp: u64,
}

impl MapDisplayData {
    pub fn from_broadcast(data: &PbMessage) -> Self {
        let mut result = Self::default();

        match data.get(7) {
            Some(PbValue::Message(grid)) => {
                result.width = grid.u64_field(1).unwrap_or(0);
                result.height = grid.u64_field(2).unwrap_or(0);
                result.compressed_grid = grid.bytes_field(3).cloned().unwrap_or_default();
            }
            Some(PbValue::Bytes(raw)) if raw.len() > 100 => {
                result.compressed_grid = raw.clone();
            }
            _ => {}
        }

        if let Some(pos) = data.message_field(1) {
            result.position = Position {
                x: pos.get(1).and_then(numeric).unwrap_or(0.0),
                y: pos.get(2).and_then(numeric).unwrap_or(0.0),
                heading: pos.get(3).and_then(numeric).unwrap_or(0.0),
            };
        }

        // Some firmwares put dimensions at the top level instead.
        if result.width == 0 && result.height == 0 {
            result.width = data.u64_field(4).unwrap_or(0);
            result.height = data.u64_field(5).unwrap_or(0);
        }

        // Last resort: any large bytes field is likely the grid.
        if result.compressed_grid.is_empty() {
            for (_, value) in data.iter() {
                if let Some(raw) = value.as_bytes() {
                    if raw.len() > 100 {
                        result.compressed_grid = raw.clone();
                        break;
                    }
                }
            }
        }

        result.timestamp = data.u64_field(2).unwrap_or(0);
        result
    }
}

/// Response to a command sent to the robot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandResponse {
    /// Result code from field 1 when it holds an integer. `None` when field 1
    /// carries data instead (some queries echo a payload there), which is an
    /// implicit success.
    pub result_code: Option<i64>,
    /// Full decoded response payload.
    pub data: PbMessage,
    /// Undecoded payload bytes.
    pub raw_payload: Bytes,
}

impl CommandResponse {
    /// Build a response from a decoded payload, extracting the result code
    /// when field 1 is coercible to an integer.
    pub fn from_payload(data: PbMessage, raw_payload: Bytes) -> Self {
        let result_code = data.get(1).and_then(PbValue::as_i64);
        Self {
            result_code,
            data,
            raw_payload,
        }
    }

    pub fn success(&self) -> bool {
        match self.result_code {
            None => true,
            Some(code) => code == CommandResult::Success as i64,
        }
    }

    /// The command made no sense in the robot's current state.
    pub fn not_applicable(&self) -> bool {
        self.result_code == Some(CommandResult::NotApplicable as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;
    use narwal_protocol::pb::{put_bytes_field, put_fixed32_field, put_string_field, put_varint_field};

    fn map_response() -> PbMessage {
        let mut pos = BytesMut::new();
        put_fixed32_field(&mut pos, 1, 120.0_f32.to_bits());
        put_fixed32_field(&mut pos, 2, 60.0_f32.to_bits());
        let mut dock = BytesMut::new();
        put_varint_field(&mut dock, 1, 1);
        put_bytes_field(&mut dock, 2, &pos);
        put_varint_field(&mut dock, 3, 1_700_000_000);

        let mut origin = BytesMut::new();
        put_varint_field(&mut origin, 1, 5);
        put_varint_field(&mut origin, 3, 10);

        let mut room = BytesMut::new();
        put_varint_field(&mut room, 1, 2);
        put_varint_field(&mut room, 2, 1);
        put_string_field(&mut room, 3, "Kitchen");

        let mut payload = BytesMut::new();
        put_varint_field(&mut payload, 3, 60); // resolution mm/px
        put_varint_field(&mut payload, 4, 200);
        put_varint_field(&mut payload, 5, 150);
        put_bytes_field(&mut payload, 6, &origin);
        put_bytes_field(&mut payload, 12, &room);
        put_varint_field(&mut payload, 33, 42_000);
        put_bytes_field(&mut payload, 48, &dock);

        let mut envelope = BytesMut::new();
        put_varint_field(&mut envelope, 1, 1);
        put_bytes_field(&mut envelope, 2, &payload);
        PbMessage::decode(&envelope).unwrap()
    }

    #[test]
    fn test_map_data_from_response() {
        let map = MapData::from_response(&map_response());
        assert_eq!(map.width, 200);
        assert_eq!(map.height, 150);
        assert_eq!(map.resolution, 60);
        assert_eq!(map.area, 42_000);
        assert_eq!(map.rooms.len(), 1);
        assert_eq!(map.rooms[0].name, "Kitchen");
        // 120cm at 6cm/px minus x origin 10 = 10px; 60cm / 6 - 5 = 5px.
        assert_eq!(map.dock_x, Some(10.0));
        assert_eq!(map.dock_y, Some(5.0));
    }

    #[test]
    fn test_map_data_missing_payload() {
        let map = MapData::from_response(&PbMessage::decode(b"\x08\x01").unwrap());
        assert_eq!(map, MapData::default());
    }

    #[test]
    fn test_device_info_trims_newlines() {
        let mut buf = BytesMut::new();
        put_string_field(&mut buf, 1, "QoEsI5qYXO\n");
        put_string_field(&mut buf, 2, "NWL-0042\n");
        put_string_field(&mut buf, 3, "v01.02.19.02\n");
        let info = DeviceInfo::from_response(&PbMessage::decode(&buf).unwrap());
        assert_eq!(info.product_key, "QoEsI5qYXO");
        assert_eq!(info.device_id, "NWL-0042");
        assert_eq!(info.firmware_version, "v01.02.19.02");
    }

    #[test]
    fn test_command_response_result_codes() {
        let ok = CommandResponse::from_payload(PbMessage::decode(b"\x08\x01").unwrap(), Bytes::new());
        assert_eq!(ok.result_code, Some(1));
        assert!(ok.success());
        assert!(!ok.not_applicable());

        let na = CommandResponse::from_payload(PbMessage::decode(b"\x08\x02").unwrap(), Bytes::new());
        assert!(!na.success());
        assert!(na.not_applicable());
    }

    #[test]
    fn test_command_response_data_in_field_one() {
        // Queries that echo a string in field 1 are implicit successes.
        let mut buf = BytesMut::new();
        put_string_field(&mut buf, 1, "feature_list");
        let resp = CommandResponse::from_payload(PbMessage::decode(&buf).unwrap(), Bytes::new());
        assert_eq!(resp.result_code, None);
        assert!(resp.success());
    }

    #[test]
    fn test_display_data_nested_grid() {
        let grid_bytes = vec![0xAAu8; 150];
        let mut grid = BytesMut::new();
        put_varint_field(&mut grid, 1, 64);
        put_varint_field(&mut grid, 2, 48);
        put_bytes_field(&mut grid, 3, &grid_bytes);
        let mut pos = BytesMut::new();
        put_fixed32_field(&mut pos, 1, 12.5_f32.to_bits());
        put_fixed32_field(&mut pos, 2, 7.25_f32.to_bits());
        put_fixed32_field(&mut pos, 3, 90.0_f32.to_bits());
        let mut buf = BytesMut::new();
        put_bytes_field(&mut buf, 1, &pos);
        put_bytes_field(&mut buf, 7, &grid);

        let display = MapDisplayData::from_broadcast(&PbMessage::decode(&buf).unwrap());
        assert_eq!(display.width, 64);
        assert_eq!(display.height, 48);
        assert_eq!(display.compressed_grid.len(), 150);
        assert_eq!(display.position.x, 12.5);
        assert_eq!(display.position.heading, 90.0);
    }

    #[test]
    fn test_display_data_top_level_fallbacks() {
        let grid_bytes = vec![0x42u8; 200];
        let mut buf = BytesMut::new();
        put_varint_field(&mut buf, 4, 32);
        put_varint_field(&mut buf, 5, 24);
        put_bytes_field(&mut buf, 9, &grid_bytes);

        let display = MapDisplayData::from_broadcast(&PbMessage::decode(&buf).unwrap());
        assert_eq!(display.width, 32);
        assert_eq!(display.height, 24);
        assert_eq!(display.compressed_grid.len(), 200);
    }
}
