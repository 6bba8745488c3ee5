//! Wake burst and keepalive payload construction.
//!
//! The robot drops into a low-power mode when idle and stops broadcasting;
//! only an active wake sequence restores the flow. The burst mirrors what
//! the vendor app sends on open: an app-event notification, topic
//! subscriptions, a heartbeat, and a couple of cheap queries that force the
//! firmware to process commands.

use std::time::Duration;

use bytes::{Bytes, BytesMut};

use narwal_protocol::pb::{put_bytes_field, put_string_field, put_varint_field};
use narwal_protocol::types::{
    TOPIC_CMD_ACTIVE_ROBOT, TOPIC_CMD_APP_HEARTBEAT, TOPIC_CMD_GET_BASE_STATUS,
    TOPIC_CMD_GET_DEVICE_INFO, TOPIC_CMD_NOTIFY_APP_EVENT, TOPIC_CMD_PING, TOPIC_DISPLAY_MAP,
    TOPIC_DOWNLOAD_STATUS, TOPIC_ROBOT_BASE_STATUS, TOPIC_TIMELINE_STATUS, TOPIC_UPGRADE_STATUS,
    TOPIC_WORKING_STATUS,
};

/// Delay between consecutive frames of a wake burst.
pub const BURST_FRAME_DELAY: Duration = Duration::from_millis(200);

/// Subscription lifetime requested from the robot, in seconds.
pub const SUBSCRIPTION_DURATION_SECS: u64 = 600;

/// Every broadcast topic the robot can publish.
pub const ALL_BROADCAST_TOPICS: [&str; 6] = [
    TOPIC_ROBOT_BASE_STATUS,
    TOPIC_WORKING_STATUS,
    TOPIC_UPGRADE_STATUS,
    TOPIC_DOWNLOAD_STATUS,
    TOPIC_DISPLAY_MAP,
    TOPIC_TIMELINE_STATUS,
];

/// Payload of a single varint field, the shape of most trigger commands.
pub fn varint_payload(field: u32, value: u64) -> Bytes {
    let mut buf = BytesMut::new();
    put_varint_field(&mut buf, field, value);
    buf.freeze()
}

/// active_robot_publish payload subscribing to every broadcast topic.
///
/// Repeated field 1 holds `{1: topic, 2: duration_seconds}` sub-messages.
pub fn topic_subscription_payload(duration_secs: u64) -> Bytes {
    let mut buf = BytesMut::new();
    for topic in ALL_BROADCAST_TOPICS {
        let mut entry = BytesMut::new();
        put_string_field(&mut entry, 1, topic);
        put_varint_field(&mut entry, 2, duration_secs);
        put_bytes_field(&mut buf, 1, &entry);
    }
    buf.freeze()
}

/// Keepalive heartbeat payload sent while the robot is awake.
pub fn heartbeat_payload() -> Bytes {
    varint_payload(1, 1)
}

/// The ordered wake burst: (short topic, payload) pairs to send with
/// [`BURST_FRAME_DELAY`] between them.
pub fn wake_commands() -> Vec<(&'static str, Bytes)> {
    vec![
        // Signal "app opened", which triggers the firmware wake path.
        (TOPIC_CMD_NOTIFY_APP_EVENT, varint_payload(1, 1)),
        // Subscribe to all broadcast topics for ten minutes.
        (
            TOPIC_CMD_ACTIVE_ROBOT,
            topic_subscription_payload(SUBSCRIPTION_DURATION_SECS),
        ),
        // Simple-duration variant accepted by older firmware.
        (
            TOPIC_CMD_ACTIVE_ROBOT,
            varint_payload(1, SUBSCRIPTION_DURATION_SECS),
        ),
        (TOPIC_CMD_APP_HEARTBEAT, varint_payload(1, 1)),
        // Cheap queries: force command processing, and the status response
        // refreshes battery even if no broadcast follows.
        (TOPIC_CMD_GET_BASE_STATUS, Bytes::new()),
        (TOPIC_CMD_GET_DEVICE_INFO, Bytes::new()),
        (TOPIC_CMD_PING, Bytes::new()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use narwal_protocol::pb::PbMessage;

    #[test]
    fn test_burst_order() {
        let cmds = wake_commands();
        assert_eq!(cmds.len(), 7);
        assert_eq!(cmds[0].0, TOPIC_CMD_NOTIFY_APP_EVENT);
        assert_eq!(cmds[1].0, TOPIC_CMD_ACTIVE_ROBOT);
        assert_eq!(cmds[2].0, TOPIC_CMD_ACTIVE_ROBOT);
        assert_eq!(cmds[3].0, TOPIC_CMD_APP_HEARTBEAT);
        assert_eq!(cmds[6].0, TOPIC_CMD_PING);
    }

    #[test]
    fn test_subscription_payload_structure() {
        let payload = topic_subscription_payload(600);
        let msg = PbMessage::decode(&payload).unwrap();
        let entries: Vec<_> = msg.get(1).unwrap().iter_repeated().collect();
        assert_eq!(entries.len(), ALL_BROADCAST_TOPICS.len());
        for (entry, topic) in entries.iter().zip(ALL_BROADCAST_TOPICS) {
            let entry = entry.as_message().unwrap();
            assert_eq!(entry.str_field(1).as_deref(), Some(topic));
            assert_eq!(entry.u64_field(2), Some(600));
        }
    }

    #[test]
    fn test_heartbeat_payload() {
        assert_eq!(&heartbeat_payload()[..], b"\x08\x01");
    }
}
