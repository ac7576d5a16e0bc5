//! # relay-server
//!
//! Axum HTTP + `WebSocket` server that relays every inbound message to every
//! connected client, the sender included.
//!
//! - `WebSocket` gateway: origin and capacity checks, per-connection read and
//!   write loops, heartbeat
//! - [`websocket::registry::ConnectionRegistry`]: the set of live connections
//! - [`websocket::hub::BroadcastHub`]: bounded inbound queue drained by a
//!   single dispatcher that fans out to a registry snapshot
//! - HTTP endpoints: `/health`, `/metrics`
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod health;
pub mod metrics;
pub mod origin;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use server::{RelayServer, ServerHandle};
pub use websocket::hub::{BroadcastHub, DispatchReport, Dispatcher};
pub use websocket::message::RelayMessage;
pub use websocket::registry::ConnectionRegistry;
