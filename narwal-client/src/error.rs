//! Client error types.

use std::time::Duration;

use thiserror::Error;

use narwal_protocol::{ProtocolError, ValidationError};

/// Errors surfaced to callers of the client.
///
/// Transport failures during the listener loop are handled internally by the
/// reconnect loop and never reach callers through this type; they show up
/// only as staleness of the device state.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Transport could not be established.
    #[error("Failed to connect: {0}")]
    Connection(String),

    /// Operation requires an open connection.
    #[error("Not connected to vacuum")]
    NotConnected,

    /// No correlated response arrived within the deadline.
    #[error("No response for command '{topic}' within {timeout:?}")]
    CommandTimeout { topic: String, timeout: Duration },

    /// Device identity could not be resolved.
    #[error("Device discovery failed: {0}")]
    Discovery(String),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

pub type Result<T> = std::result::Result<T, ClientError>;
