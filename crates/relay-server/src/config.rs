//! Server configuration.

use std::time::Duration;

use relay_settings::ServerSettings;
use tokio::sync::Semaphore;

/// Smallest tick or write window the server will run with.
const MIN_TIMING: Duration = Duration::from_millis(1);

/// Runtime configuration for [`RelayServer`](crate::server::RelayServer),
/// derived from validated [`ServerSettings`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    /// Host to bind.
    pub host: String,
    /// Port to bind (`0` for auto-assign).
    pub port: u16,
    /// Path that accepts the WebSocket upgrade.
    pub ws_path: String,
    /// Allowed `Origin` values; `"*"` accepts any.
    pub allowed_origins: Vec<String>,
    /// Maximum concurrent WebSocket connections.
    pub max_connections: usize,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Capacity of the shared inbound queue.
    pub inbound_queue_capacity: usize,
    /// Capacity of each connection's outbound queue.
    pub outbound_queue_capacity: usize,
    /// Time allowed for a single socket write.
    pub write_timeout: Duration,
    /// Ping interval.
    pub heartbeat_interval: Duration,
    /// Close after this long without a pong.
    pub heartbeat_timeout: Duration,
    /// Time allowed for tasks to finish on shutdown.
    pub shutdown_timeout: Duration,
}

impl ServerConfig {
    /// Address string passed to the listener.
    pub fn bind_addr(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Clamp values the runtime cannot work with.
    ///
    /// Zero timings become 1 ms, the heartbeat timeout is kept at least one
    /// interval, queues hold at least one message and the connection limit
    /// stays within what a semaphore can count.
    #[must_use]
    pub fn clamped(mut self) -> Self {
        self.write_timeout = self.write_timeout.max(MIN_TIMING);
        self.heartbeat_interval = self.heartbeat_interval.max(MIN_TIMING);
        self.heartbeat_timeout = self.heartbeat_timeout.max(self.heartbeat_interval);
        self.inbound_queue_capacity = self.inbound_queue_capacity.max(1);
        self.outbound_queue_capacity = self.outbound_queue_capacity.max(1);
        self.max_connections = self.max_connections.min(Semaphore::MAX_PERMITS);
        self
    }
}

impl From<&ServerSettings> for ServerConfig {
    fn from(s: &ServerSettings) -> Self {
        Self {
            host: s.host.clone(),
            port: s.port,
            ws_path: s.ws_path.clone(),
            allowed_origins: s.allowed_origins.clone(),
            max_connections: s.max_connections,
            max_message_size: s.max_message_size,
            inbound_queue_capacity: s.inbound_queue_capacity,
            outbound_queue_capacity: s.outbound_queue_capacity,
            write_timeout: Duration::from_millis(s.write_timeout_ms),
            heartbeat_interval: Duration::from_millis(s.heartbeat_interval_ms),
            heartbeat_timeout: Duration::from_millis(s.heartbeat_timeout_ms),
            shutdown_timeout: Duration::from_millis(s.shutdown_timeout_ms),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from(&ServerSettings::default())
    }
}
