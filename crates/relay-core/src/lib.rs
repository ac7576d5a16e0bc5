//! # relay-core
//!
//! Foundation types shared by every relay crate.
//!
//! - **IDs**: [`ids::ConnectionId`] branded newtype, one per accepted socket
//! - **Errors**: [`errors::RelayError`] and [`errors::DeliveryError`] via `thiserror`
//!
//! ## Crate Position
//!
//! Foundation crate. Depended on by `relay-server` and `relay-agent`.

#![deny(unsafe_code)]

pub mod errors;
pub mod ids;

pub use errors::{DeliveryError, RelayError, Result};
pub use ids::ConnectionId;
