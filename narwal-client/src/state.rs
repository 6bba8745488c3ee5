//! Device state aggregate.
//!
//! One instance per client, created with unknown/zero defaults and patched
//! incrementally by whichever message type arrives. Fields persist until a
//! newer message overwrites them, so a field can be stale; deciding which
//! updates to trust is the reconciler's job, not this module's.

use narwal_protocol::pb::PbMessage;
use narwal_protocol::types::{
    base_status_field, upgrade_status_field, working_status_field, WorkingMode,
};

use crate::models::{DeviceInfo, MapData, MapDisplayData};

/// Dock sub-state value meaning "on dock".
pub const DOCK_SUB_DOCKED: u64 = 1;
/// Dock sub-state value meaning "docking in progress".
pub const DOCK_SUB_DOCKING: u64 = 2;

/// Complete observable state of one robot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceState {
    pub mode: WorkingMode,
    /// Real-time battery percentage; hardware-sampled, fresh even in sleep.
    pub battery_level: Option<u8>,
    /// Battery health figure; has only ever read 100.
    pub battery_health: Option<u8>,
    /// Pause overlay on a cleaning mode.
    pub paused: bool,
    /// Explicit returning-to-dock flag.
    pub returning: bool,
    /// 0 = none, 1 = docked, 2 = docking in progress.
    pub dock_sub_state: u64,
    /// Second dock indicator; nonzero while physically on the dock.
    pub dock_activity: u64,
    pub session_id: String,
    /// Robot-reported epoch timestamp.
    pub robot_timestamp: u64,
    /// Current session elapsed time in seconds.
    pub cleaning_time: u64,
    /// Cleaned area in cm2.
    pub cleaning_area: u64,
    pub firmware_version: String,
    pub firmware_target: String,
    pub upgrade_status_code: u64,
    pub download_status: u64,
    pub device_info: Option<DeviceInfo>,
    pub map_data: Option<MapData>,
    pub map_display: Option<MapDisplayData>,
    /// Raw payload caches for fields not yet understood.
    pub raw_base_status: Option<PbMessage>,
    pub raw_working_status: Option<PbMessage>,
}

impl DeviceState {
    /// True while actively cleaning: a cleaning mode with neither the pause
    /// overlay nor a return-to-dock in progress.
    pub fn is_cleaning(&self) -> bool {
        self.mode.is_cleaning_state() && !self.paused && !self.is_returning()
    }

    /// True while on the dock. Docked/Charged are definitive; Standby is the
    /// ambiguous case (idle on or off the dock), resolved by the redundant
    /// dock indicators.
    pub fn is_docked(&self) -> bool {
        if self.mode.is_dock_state() {
            return true;
        }
        self.mode == WorkingMode::Standby
            && (self.dock_sub_state == DOCK_SUB_DOCKED || self.dock_activity != 0)
    }

    /// True while navigating back to the dock.
    pub fn is_returning(&self) -> bool {
        self.returning || (self.dock_sub_state == DOCK_SUB_DOCKING && !self.mode.is_dock_state())
    }

    /// Apply a robot_base_status payload in full.
    pub fn apply_base_status(&mut self, msg: &PbMessage) {
        if let Some(mode_msg) = msg.message_field(base_status_field::MODE_STATE) {
            self.mode = mode_msg
                .u64_field(base_status_field::mode::MODE)
                .map(WorkingMode::from_raw)
                .unwrap_or(WorkingMode::Unknown);
            self.paused = mode_msg
                .u64_field(base_status_field::mode::PAUSED)
                .unwrap_or(0)
                != 0;
            self.returning = mode_msg
                .u64_field(base_status_field::mode::RETURNING)
                .unwrap_or(0)
                != 0;
            self.dock_sub_state = mode_msg
                .u64_field(base_status_field::mode::DOCK_SUB_STATE)
                .unwrap_or(0);
            self.dock_activity = mode_msg
                .u64_field(base_status_field::mode::DOCK_ACTIVITY)
                .unwrap_or(0);
        }

        self.apply_battery_only(msg);

        if let Some(ts) = msg.u64_field(base_status_field::TIMESTAMP) {
            self.robot_timestamp = ts;
        }
        if let Some(session) = msg.str_field(base_status_field::SESSION_ID) {
            self.session_id = session.into_owned();
        } else if let Some(session) = msg.u64_field(base_status_field::SESSION_ID) {
            self.session_id = session.to_string();
        }

        self.raw_base_status = Some(msg.clone());
    }

    /// Apply only the hardware-sampled fields of a robot_base_status payload.
    /// Used while the robot is asleep, when mode/dock fields may be a cached
    /// value from a previous session.
    pub fn apply_battery_only(&mut self, msg: &PbMessage) {
        if let Some(level) = msg.f32_field(base_status_field::BATTERY_LEVEL) {
            if (0.0..=100.0).contains(&level) {
                self.battery_level = Some(level.round() as u8);
            }
        }
        if let Some(health) = msg.u64_field(base_status_field::BATTERY_HEALTH) {
            if health <= 100 {
                self.battery_health = Some(health as u8);
            }
        }
    }

    /// Apply a working_status payload: session elapsed time and area.
    pub fn apply_working_status(&mut self, msg: &PbMessage) {
        if let Some(elapsed) = msg.u64_field(working_status_field::ELAPSED_TIME) {
            self.cleaning_time = elapsed;
        }
        if let Some(area) = msg.u64_field(working_status_field::AREA) {
            self.cleaning_area = area;
        }
        self.raw_working_status = Some(msg.clone());
    }

    /// Apply an upgrade_status payload: firmware versions and status code.
    pub fn apply_upgrade_status(&mut self, msg: &PbMessage) {
        if let Some(version) = msg.str_field(upgrade_status_field::CURRENT_FIRMWARE) {
            self.firmware_version = version.into_owned();
        }
        if let Some(target) = msg.str_field(upgrade_status_field::TARGET_FIRMWARE) {
            self.firmware_target = target.into_owned();
        }
        if let Some(code) = msg.u64_field(upgrade_status_field::STATUS_CODE) {
            self.upgrade_status_code = code;
        }
    }

    /// Apply a download_status payload.
    pub fn apply_download_status(&mut self, msg: &PbMessage) {
        if let Some(status) = msg.u64_field(1) {
            self.download_status = status;
        }
    }

    /// Override a stale mode after verification proved no task is running.
    pub fn mark_docked(&mut self) {
        self.mode = WorkingMode::Docked;
        self.paused = false;
        self.returning = false;
    }
}
