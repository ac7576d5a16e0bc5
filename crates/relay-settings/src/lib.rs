//! # relay-settings
//!
//! Configuration management with layered sources for the WebSocket relay.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`RelaySettings::default()`]
//! 2. **Settings file**: JSON named by `RELAY_CONFIG` or `--config` (deep-merged over defaults)
//! 3. **Environment variables**: `PORT` and `RELAY_*` overrides (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use relay_settings::load_settings;
//!
//! let settings = load_settings().unwrap_or_default();
//! println!("listening port: {}", settings.server.port);
//! ```

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_env_overrides_with, deep_merge, load_settings,
    load_settings_from_path, load_settings_with, settings_path,
};
pub use types::*;
