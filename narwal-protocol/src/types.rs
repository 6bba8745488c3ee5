//! Protocol constants, enums, and field mappings for the Narwal control channel.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default WebSocket port of the robot's local control server.
pub const DEFAULT_PORT: u16 = 9002;

/// Default topic prefix (Narwal Flow / AX12 product key). Replaced at runtime
/// once device discovery returns the actual product key.
pub const DEFAULT_TOPIC_PREFIX: &str = "/QoEsI5qYXO";

// --- Status topics (robot → client, broadcast frames) ---
pub const TOPIC_WORKING_STATUS: &str = "status/working_status";
pub const TOPIC_ROBOT_BASE_STATUS: &str = "status/robot_base_status";
pub const TOPIC_UPGRADE_STATUS: &str = "upgrade/upgrade_status";
pub const TOPIC_DOWNLOAD_STATUS: &str = "status/download_status";
pub const TOPIC_DISPLAY_MAP: &str = "map/display_map";
pub const TOPIC_TIMELINE_STATUS: &str = "status/time_line_status";

// --- Command topics (client → robot) ---
pub const TOPIC_CMD_YELL: &str = "common/yell";
pub const TOPIC_CMD_GET_DEVICE_INFO: &str = "common/get_device_info";
pub const TOPIC_CMD_GET_FEATURE_LIST: &str = "common/get_feature_list";
pub const TOPIC_CMD_GET_BASE_STATUS: &str = "status/get_device_base_status";

pub const TOPIC_CMD_PAUSE: &str = "task/pause";
pub const TOPIC_CMD_RESUME: &str = "task/resume";
pub const TOPIC_CMD_FORCE_END: &str = "task/force_end";
pub const TOPIC_CMD_CANCEL: &str = "task/cancel";

pub const TOPIC_CMD_RECALL: &str = "supply/recall";
pub const TOPIC_CMD_WASH_MOP: &str = "supply/wash_mop";
pub const TOPIC_CMD_DRY_MOP: &str = "supply/dry_mop";
pub const TOPIC_CMD_DUST_GATHERING: &str = "supply/dust_gathering";

/// Whole-house clean. The legacy `clean/start_clean` topic does not start a
/// task from standby on AX12 firmware.
pub const TOPIC_CMD_START_CLEAN: &str = "clean/plan/start";
pub const TOPIC_CMD_EASY_CLEAN: &str = "clean/easy_clean/start";
pub const TOPIC_CMD_SET_FAN_LEVEL: &str = "clean/set_fan_level";
pub const TOPIC_CMD_SET_MOP_HUMIDITY: &str = "clean/set_mop_humidity";
pub const TOPIC_CMD_GET_CURRENT_TASK: &str = "clean/current_clean_task/get";

pub const TOPIC_CMD_GET_MAP: &str = "map/get_map";
pub const TOPIC_CMD_GET_ALL_MAPS: &str = "map/get_all_reduced_maps";

// --- Wake / keep-alive topics ---
pub const TOPIC_CMD_ACTIVE_ROBOT: &str = "common/active_robot_publish";
pub const TOPIC_CMD_APP_HEARTBEAT: &str = "status/app_status_heartbeat";
pub const TOPIC_CMD_NOTIFY_APP_EVENT: &str = "common/notify_app_event";
pub const TOPIC_CMD_PING: &str = "developer/ping";

// --- Reconnection parameters ---
pub const RECONNECT_INITIAL_DELAY: Duration = Duration::from_secs(1);
pub const RECONNECT_MAX_DELAY: Duration = Duration::from_secs(300);
pub const RECONNECT_BACKOFF_FACTOR: f64 = 2.0;

/// Transport-level ping interval.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Interval of the keep-alive loop that prevents the robot from sleeping.
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// How long without a broadcast before the robot is considered asleep again
/// (~30x the 1.5s broadcast interval).
pub const BROADCAST_STALE_TIMEOUT: Duration = Duration::from_secs(45);

/// Default deadline for a wake burst sequence.
pub const WAKE_TIMEOUT: Duration = Duration::from_secs(20);

/// Default per-command response deadline.
pub const COMMAND_RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Map downloads carry large payloads and need a longer deadline.
pub const MAP_RESPONSE_TIMEOUT: Duration = Duration::from_secs(15);

/// Result code carried in field 1 of a command response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i64)]
pub enum CommandResult {
    Success = 1,
    /// Command made no sense in the current state, e.g. set_fan_level while
    /// not cleaning, or force_end with no running task.
    NotApplicable = 2,
    /// Command conflicts with an identical operation already in progress.
    Conflict = 3,
}

/// Robot working state from robot_base_status field 3, sub-field 1.
///
/// Values confirmed via live WebSocket monitoring:
/// - 1  = standby (idle, transition state between cleaning and docked)
/// - 4  = cleaning (plan-based start; stays 4 while returning to dock)
/// - 5  = cleaning variant seen in some modes
/// - 10 = on dock, charging
/// - 14 = on dock, fully charged
///
/// The error value is a placeholder: no error state has been observed live
/// yet, so unknown values map to [`WorkingMode::Unknown`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkingMode {
    #[default]
    Unknown,
    Standby,
    Cleaning,
    CleaningAlt,
    Docked,
    Charged,
    Error,
}

impl WorkingMode {
    /// Classify a raw mode value from the wire.
    pub fn from_raw(value: u64) -> Self {
        match value {
            1 => WorkingMode::Standby,
            4 => WorkingMode::Cleaning,
            5 => WorkingMode::CleaningAlt,
            10 => WorkingMode::Docked,
            14 => WorkingMode::Charged,
            99 => WorkingMode::Error,
            _ => WorkingMode::Unknown,
        }
    }

    /// True for the terminal on-dock states.
    pub fn is_dock_state(self) -> bool {
        matches!(self, WorkingMode::Docked | WorkingMode::Charged)
    }

    /// True for either active-cleaning variant.
    pub fn is_cleaning_state(self) -> bool {
        matches!(self, WorkingMode::Cleaning | WorkingMode::CleaningAlt)
    }
}

/// Suction fan speed levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum FanLevel {
    Quiet = 0,
    Normal = 1,
    Strong = 2,
    Max = 3,
}

/// Mop wetness levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MopHumidity {
    Dry = 0,
    Normal = 1,
    Wet = 2,
}

/// Field numbers in the robot_base_status message.
///
/// Field 2 is the real-time battery percentage as an IEEE 754 float32,
/// sampled by hardware and fresh even while the main processor sleeps.
/// Field 38 is a static battery-health figure (design capacity, always 100).
pub mod base_status_field {
    pub const BATTERY_LEVEL: u32 = 2;
    pub const MODE_STATE: u32 = 3;
    pub const SESSION_ID: u32 = 13;
    pub const TIMESTAMP: u32 = 36;
    pub const BATTERY_HEALTH: u32 = 38;

    /// Sub-fields of the nested field-3 mode message.
    pub mod mode {
        pub const MODE: u32 = 1;
        pub const PAUSED: u32 = 2;
        pub const RETURNING: u32 = 7;
        /// 1 = docked, 2 = docking in progress.
        pub const DOCK_SUB_STATE: u32 = 10;
        /// Nonzero (2 and 6 observed) while physically on the dock.
        pub const DOCK_ACTIVITY: u32 = 12;
    }
}

/// Field numbers in the working_status message. Field 3 is the session
/// elapsed time in seconds, field 13 the cleaned area in cm².
pub mod working_status_field {
    pub const ELAPSED_TIME: u32 = 3;
    pub const AREA: u32 = 13;
}

/// Field numbers in the upgrade_status message.
pub mod upgrade_status_field {
    pub const STATUS_CODE: u32 = 4;
    pub const CURRENT_FIRMWARE: u32 = 7;
    pub const TARGET_FIRMWARE: u32 = 8;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_working_mode_from_raw() {
        assert_eq!(WorkingMode::from_raw(1), WorkingMode::Standby);
        assert_eq!(WorkingMode::from_raw(4), WorkingMode::Cleaning);
        assert_eq!(WorkingMode::from_raw(5), WorkingMode::CleaningAlt);
        assert_eq!(WorkingMode::from_raw(10), WorkingMode::Docked);
        assert_eq!(WorkingMode::from_raw(14), WorkingMode::Charged);
        assert_eq!(WorkingMode::from_raw(7), WorkingMode::Unknown);
        assert_eq!(WorkingMode::from_raw(0), WorkingMode::Unknown);
    }

    #[test]
    fn test_mode_classifiers() {
        assert!(WorkingMode::Docked.is_dock_state());
        assert!(WorkingMode::Charged.is_dock_state());
        assert!(!WorkingMode::Standby.is_dock_state());
        assert!(WorkingMode::Cleaning.is_cleaning_state());
        assert!(WorkingMode::CleaningAlt.is_cleaning_state());
        assert!(!WorkingMode::Docked.is_cleaning_state());
    }
}
