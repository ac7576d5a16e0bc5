//! WebSocket connection management, registry, heartbeat and broadcast fan-out.

pub mod connection;
pub mod heartbeat;
pub mod hub;
pub mod message;
pub mod registry;
pub mod session;
