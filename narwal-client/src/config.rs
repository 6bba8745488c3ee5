//! Client configuration.

use std::time::Duration;

use narwal_protocol::types::{
    COMMAND_RESPONSE_TIMEOUT, DEFAULT_PORT, DEFAULT_TOPIC_PREFIX, WAKE_TIMEOUT,
};

/// Connection and timing configuration for [`crate::NarwalClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Robot IP address or hostname.
    pub host: String,
    /// Local WebSocket server port.
    pub port: u16,
    /// Device id used in command topics. Empty until discovered.
    pub device_id: String,
    /// Addressing prefix (product key). Model-specific; the default is
    /// replaced once discovery or get_device_info resolves the real one.
    pub topic_prefix: String,
    /// Deadline for establishing the WebSocket connection.
    pub connect_timeout: Duration,
    /// Default per-command response deadline.
    pub command_timeout: Duration,
    /// Default deadline for a wake attempt.
    pub wake_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_PORT,
            device_id: String::new(),
            topic_prefix: DEFAULT_TOPIC_PREFIX.to_string(),
            connect_timeout: Duration::from_secs(10),
            command_timeout: COMMAND_RESPONSE_TIMEOUT,
            wake_timeout: WAKE_TIMEOUT,
        }
    }
}

impl ClientConfig {
    /// Configuration for a robot at `host` with default port and timeouts.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }

    /// WebSocket URL for this configuration.
    pub fn url(&self) -> String {
        format!("ws://{}:{}", self.host, self.port)
    }
}
