//! Async client for the Narwal robot vacuum local WebSocket control channel.
//!
//! The robot exposes a binary-frame protocol on port 9002 (see
//! [`narwal_protocol`]) and goes through an unreliable sleep cycle: while
//! its main processor is in low-power mode it stops broadcasting, and polled
//! status fields may be stale cached values from a previous session. This
//! crate layers on top of the wire protocol:
//!
//! - a connection manager with reconnect backoff and heartbeat;
//! - a wake/keepalive engine that coaxes the robot out of sleep and notices
//!   when it drops back;
//! - a command dispatcher correlating responses by wire marker;
//! - a state reconciler implementing the trust policy for contradictory
//!   telemetry (broadcasts authoritative, sleeping polls battery-only,
//!   active verification of suspect "cleaning" modes);
//! - a facade, [`NarwalClient`], tying it together.

pub mod config;
pub mod error;
pub mod models;
pub mod reconcile;
pub mod state;
pub mod wake;

mod client;

pub use client::{NarwalClient, StateCallback};
pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use models::{CommandResponse, DeviceInfo, MapData, MapDisplayData, Position, RoomInfo};
pub use reconcile::{Reconciler, VerificationOutcome};
pub use state::DeviceState;
