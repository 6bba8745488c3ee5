//! State reconciliation and trust policy.
//!
//! The robot is not a clean source of truth. While its main processor is in
//! low-power sleep, mode and dock fields in a polled status response can be a
//! cached value from a previous session; only battery level and health are
//! hardware-sampled and always fresh. Broadcasts, by contrast, only flow
//! while the firmware is actually running, so they are authoritative.
//!
//! The reconciler owns that trust decision plus the machinery around it:
//! tracking whether the robot is broadcasting, suppressing echoes of a
//! corrected stale value, flagging suspicious "cleaning" reports for active
//! verification, and adapting the fallback poll cadence.
//!
//! Every method is synchronous and takes explicit time arguments; the facade
//! drives the I/O.

use std::time::{Duration, Instant};

use log::{debug, info};

use narwal_protocol::pb::PbMessage;
use narwal_protocol::types::{
    base_status_field, WorkingMode, BROADCAST_STALE_TIMEOUT, TOPIC_DISPLAY_MAP,
    TOPIC_DOWNLOAD_STATUS, TOPIC_ROBOT_BASE_STATUS, TOPIC_UPGRADE_STATUS, TOPIC_WORKING_STATUS,
};

use crate::models::MapDisplayData;
use crate::state::DeviceState;

/// How long after a stale-state correction contradicting "cleaning"
/// broadcasts are rejected. Covers the brief partial wake that can still
/// replay the old cached mode.
pub const SUPPRESSION_WINDOW: Duration = Duration::from_secs(30);

/// Battery level at or above which a non-dock mode while asleep is suspect:
/// a robot that cleaned long enough to sleep mid-task would have drained.
pub const HIGH_BATTERY_THRESHOLD: u8 = 95;

/// Poll cadence while state is unresolved.
pub const FAST_POLL_INTERVAL: Duration = Duration::from_secs(10);
/// Poll cadence once state is known.
pub const NORMAL_POLL_INTERVAL: Duration = Duration::from_secs(60);
/// Fast polls allowed before giving up and reverting to normal cadence.
pub const FAST_POLL_BUDGET: u32 = 6;

/// Result of a force-stop verification probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationOutcome {
    /// Force-stop returned not-applicable: no task was running, the reported
    /// cleaning mode was stale.
    NoTaskRunning,
    /// Force-stop succeeded: a real lingering task was just terminated.
    TaskTerminated,
    /// Response was missing or ambiguous.
    Inconclusive,
}

/// Trust-policy state machine wrapped around [`DeviceState`].
#[derive(Debug)]
pub struct Reconciler {
    awake: bool,
    last_broadcast: Option<Instant>,
    suppress_until: Option<Instant>,
    fast_polls_left: u32,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new()
    }
}

impl Reconciler {
    /// Starts asleep with the fast-poll budget armed, since nothing is known
    /// about the robot yet.
    pub fn new() -> Self {
        Self {
            awake: false,
            last_broadcast: None,
            suppress_until: None,
            fast_polls_left: FAST_POLL_BUDGET,
        }
    }

    /// True while the robot is actively broadcasting.
    pub fn is_awake(&self) -> bool {
        self.awake
    }

    /// Forget the awake flag, e.g. on disconnect.
    pub fn mark_asleep(&mut self) {
        self.awake = false;
    }

    /// Check whether broadcasts have gone silent past the stale timeout.
    /// Returns true when this call flipped the robot to asleep.
    pub fn check_broadcast_stale(&mut self, now: Instant) -> bool {
        if !self.awake {
            return false;
        }
        match self.last_broadcast {
            Some(at) if now.duration_since(at) > BROADCAST_STALE_TIMEOUT => {
                info!(
                    "No broadcast for {:?}, robot presumed asleep",
                    now.duration_since(at)
                );
                self.awake = false;
                true
            }
            _ => false,
        }
    }

    /// True while inside the post-correction suppression window.
    pub fn suppressed(&self, now: Instant) -> bool {
        matches!(self.suppress_until, Some(until) if now < until)
    }

    /// Current fallback poll interval.
    pub fn poll_interval(&self) -> Duration {
        if self.fast_polls_left > 0 {
            FAST_POLL_INTERVAL
        } else {
            NORMAL_POLL_INTERVAL
        }
    }

    /// Re-arm the fast-poll budget, e.g. after a reconnect.
    pub fn boost_polling(&mut self) {
        self.fast_polls_left = FAST_POLL_BUDGET;
    }

    /// Record that any broadcast frame arrived. Any broadcast, decodable or
    /// not, proves the firmware is running.
    pub fn note_broadcast(&mut self, now: Instant) {
        if !self.awake {
            info!("Robot is awake (received broadcast)");
        }
        self.awake = true;
        self.last_broadcast = Some(now);
    }

    /// Apply a broadcast frame to the state. Broadcasts are authoritative
    /// and mark the robot awake; the one exception is a "cleaning" base
    /// status inside the suppression window, which is treated as an echo of
    /// the corrected stale value and applied battery-only.
    pub fn apply_broadcast(
        &mut self,
        state: &mut DeviceState,
        short_topic: &str,
        msg: &PbMessage,
        now: Instant,
    ) {
        self.note_broadcast(now);

        match short_topic {
            TOPIC_ROBOT_BASE_STATUS => {
                if self.suppressed(now) && claims_cleaning(msg) {
                    debug!("Suppression window active, ignoring cleaning mode in broadcast");
                    state.apply_battery_only(msg);
                    return;
                }
                let was_cleaning = state.is_cleaning();
                state.apply_base_status(msg);
                // The live map is only meaningful during a session.
                if was_cleaning && !state.is_cleaning() {
                    state.map_display = None;
                }
                if state.mode != WorkingMode::Unknown {
                    self.fast_polls_left = 0;
                }
            }
            TOPIC_WORKING_STATUS => state.apply_working_status(msg),
            TOPIC_UPGRADE_STATUS => state.apply_upgrade_status(msg),
            TOPIC_DOWNLOAD_STATUS => state.apply_download_status(msg),
            TOPIC_DISPLAY_MAP => {
                state.map_display = Some(MapDisplayData::from_broadcast(msg));
            }
            other => debug!("Unhandled broadcast topic: {other}"),
        }
    }

    /// Apply a polled base-status response under the trust policy: fully
    /// while the robot is broadcasting, battery-only while it sleeps.
    pub fn apply_poll_response(&mut self, state: &mut DeviceState, msg: &PbMessage, now: Instant) {
        if self.awake && !(self.suppressed(now) && claims_cleaning(msg)) {
            state.apply_base_status(msg);
        } else {
            debug!("Robot not broadcasting, applying hardware-sampled fields only");
            state.apply_battery_only(msg);
        }

        if self.fast_polls_left > 0 {
            self.fast_polls_left -= 1;
            if state.mode != WorkingMode::Unknown {
                self.fast_polls_left = 0;
            }
        }
    }

    /// Whether the current state smells like a stale cached value: the robot
    /// is not broadcasting yet claims to be cleaning, or sits at high battery
    /// in a non-dock mode. Callers should verify with a force-stop probe.
    pub fn suspects_stale_cleaning(&self, state: &DeviceState) -> bool {
        if self.awake {
            return false;
        }
        if state.mode.is_cleaning_state() {
            return true;
        }
        !state.is_docked()
            && state.mode != WorkingMode::Unknown
            && state.battery_level.is_some_and(|b| b >= HIGH_BATTERY_THRESHOLD)
    }

    /// Record the outcome of a force-stop verification probe.
    pub fn record_verification(
        &mut self,
        state: &mut DeviceState,
        outcome: VerificationOutcome,
        now: Instant,
    ) {
        match outcome {
            VerificationOutcome::NoTaskRunning => {
                info!("Force-stop not applicable: mode was stale, overriding to docked");
                self.apply_correction(state, now);
            }
            VerificationOutcome::TaskTerminated => {
                info!("Force-stop succeeded: a real lingering task was terminated");
            }
            VerificationOutcome::Inconclusive => {
                debug!("Verification inconclusive, caller should escalate");
            }
        }
    }

    /// Override the mode to docked and open the suppression window. Used on
    /// a proven-stale verification and as the final fallback when a re-query
    /// after a forced wake still reads stale.
    pub fn apply_correction(&mut self, state: &mut DeviceState, now: Instant) {
        state.mark_docked();
        self.suppress_until = Some(now + SUPPRESSION_WINDOW);
    }
}

/// Whether a base-status payload reports an active cleaning mode.
fn claims_cleaning(msg: &PbMessage) -> bool {
    msg.message_field(base_status_field::MODE_STATE)
        .and_then(|m| m.u64_field(base_status_field::mode::MODE))
        .map(WorkingMode::from_raw)
        .is_some_and(|m| m.is_cleaning_state())
}
