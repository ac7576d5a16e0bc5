//! Server network, queueing, and liveness settings.

use serde::{Deserialize, Serialize};

/// Origin pattern that accepts every origin.
pub const ANY_ORIGIN: &str = "*";

/// Server network and runtime settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listening port (`0` for auto-assign).
    pub port: u16,
    /// HTTP path that accepts the WebSocket upgrade.
    pub ws_path: String,
    /// Origins allowed to open a WebSocket. `"*"` accepts any origin.
    pub allowed_origins: Vec<String>,
    /// Maximum concurrent WebSocket connections.
    pub max_connections: usize,
    /// Maximum size of one inbound message in bytes.
    pub max_message_size: usize,
    /// Capacity of the shared inbound queue feeding the dispatcher.
    pub inbound_queue_capacity: usize,
    /// Capacity of each connection's outbound queue.
    pub outbound_queue_capacity: usize,
    /// Time allowed for a single socket write before the client is dropped.
    pub write_timeout_ms: u64,
    /// Ping interval in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Close a connection after this long without a pong.
    pub heartbeat_timeout_ms: u64,
    /// Time allowed for tasks to finish on shutdown.
    pub shutdown_timeout_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            ws_path: "/ws".to_string(),
            allowed_origins: vec![ANY_ORIGIN.to_string()],
            max_connections: 10_000,
            max_message_size: 1024 * 1024,
            inbound_queue_capacity: 1024,
            outbound_queue_capacity: 256,
            write_timeout_ms: 10_000,
            heartbeat_interval_ms: 30_000,
            heartbeat_timeout_ms: 90_000,
            shutdown_timeout_ms: 10_000,
        }
    }
}
