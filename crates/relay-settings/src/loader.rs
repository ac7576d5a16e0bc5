//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`RelaySettings::default()`]
//! 2. If a settings file exists, deep-merge its values over defaults
//! 3. Apply environment variable overrides (highest priority)
//! 4. [`RelaySettings::validate`]
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::{LogFormat, LogLevel, RelaySettings};

/// Env var naming an explicit settings file.
pub const CONFIG_PATH_ENV: &str = "RELAY_CONFIG";

/// Resolve the settings file path from `RELAY_CONFIG`, if set.
pub fn settings_path() -> Option<PathBuf> {
    read_env_string(&|k: &str| std::env::var(k).ok(), CONFIG_PATH_ENV).map(PathBuf::from)
}

/// Load settings from `RELAY_CONFIG` (if set) with env var overrides.
pub fn load_settings() -> Result<RelaySettings> {
    match settings_path() {
        Some(path) => load_settings_from_path(&path),
        None => {
            let mut settings = RelaySettings::default();
            apply_env_overrides(&mut settings);
            settings.validate();
            Ok(settings)
        }
    }
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults (plus env). If the file
/// contains invalid JSON, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<RelaySettings> {
    load_settings_with(path, &|k: &str| std::env::var(k).ok())
}

/// Load settings from `path`, reading env overrides through `lookup`.
pub fn load_settings_with(
    path: &Path,
    lookup: &dyn Fn(&str) -> Option<String>,
) -> Result<RelaySettings> {
    let defaults = serde_json::to_value(RelaySettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: RelaySettings = serde_json::from_value(merged)?;
    apply_env_overrides_with(&mut settings, lookup);
    settings.validate();
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply overrides from the process environment.
pub fn apply_env_overrides(settings: &mut RelaySettings) {
    apply_env_overrides_with(settings, &|k: &str| std::env::var(k).ok());
}

/// Apply environment overrides read through `lookup`.
///
/// Invalid values are ignored with a warning (fall back to file/default).
/// `PORT` is honoured for compatibility with PaaS hosts; `RELAY_PORT` wins
/// when both are set.
pub fn apply_env_overrides_with(
    settings: &mut RelaySettings,
    lookup: &dyn Fn(&str) -> Option<String>,
) {
    let s = &mut settings.server;

    // ── Network ─────────────────────────────────────────────────────
    if let Some(v) = read_env_u16(lookup, "PORT", 0, 65535) {
        s.port = v;
    }
    if let Some(v) = read_env_u16(lookup, "RELAY_PORT", 0, 65535) {
        s.port = v;
    }
    if let Some(v) = read_env_string(lookup, "RELAY_HOST") {
        s.host = v;
    }
    if let Some(v) = read_env_string(lookup, "RELAY_WS_PATH") {
        s.ws_path = v;
    }
    if let Some(v) = read_env_string(lookup, "RELAY_ALLOWED_ORIGINS") {
        s.allowed_origins = parse_list(&v);
    }

    // ── Limits and queues ───────────────────────────────────────────
    if let Some(v) = read_env_usize(lookup, "RELAY_MAX_CONNECTIONS", 1, 1_000_000) {
        s.max_connections = v;
    }
    if let Some(v) = read_env_usize(lookup, "RELAY_MAX_MESSAGE_SIZE", 1, 256 * 1024 * 1024) {
        s.max_message_size = v;
    }
    if let Some(v) = read_env_usize(lookup, "RELAY_INBOUND_QUEUE", 1, 1_000_000) {
        s.inbound_queue_capacity = v;
    }
    if let Some(v) = read_env_usize(lookup, "RELAY_OUTBOUND_QUEUE", 1, 1_000_000) {
        s.outbound_queue_capacity = v;
    }

    // ── Timing ──────────────────────────────────────────────────────
    if let Some(v) = read_env_u64(lookup, "RELAY_WRITE_TIMEOUT_MS", 1, 600_000) {
        s.write_timeout_ms = v;
    }
    if let Some(v) = read_env_u64(lookup, "RELAY_HEARTBEAT_INTERVAL_MS", 100, 600_000) {
        s.heartbeat_interval_ms = v;
    }
    if let Some(v) = read_env_u64(lookup, "RELAY_HEARTBEAT_TIMEOUT_MS", 100, 3_600_000) {
        s.heartbeat_timeout_ms = v;
    }
    if let Some(v) = read_env_u64(lookup, "RELAY_SHUTDOWN_TIMEOUT_MS", 0, 600_000) {
        s.shutdown_timeout_ms = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = read_env_parsed::<LogLevel>(lookup, "RELAY_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read_env_parsed::<LogFormat>(lookup, "RELAY_LOG_FORMAT") {
        settings.logging.format = v;
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Split a comma-separated list, dropping blanks.
pub fn parse_list(val: &str) -> Vec<String> {
    val.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

fn read_env_string(lookup: &dyn Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).filter(|v| !v.trim().is_empty())
}

fn read_env_u16(
    lookup: &dyn Fn(&str) -> Option<String>,
    name: &str,
    min: u16,
    max: u16,
) -> Option<u16> {
    let val = read_env_string(lookup, name)?;
    let result = parse_u16_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u16 env var, ignoring");
    }
    result
}

fn read_env_u64(
    lookup: &dyn Fn(&str) -> Option<String>,
    name: &str,
    min: u64,
    max: u64,
) -> Option<u64> {
    let val = read_env_string(lookup, name)?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
    }
    result
}

fn read_env_usize(
    lookup: &dyn Fn(&str) -> Option<String>,
    name: &str,
    min: usize,
    max: usize,
) -> Option<usize> {
    let val = read_env_string(lookup, name)?;
    let result = parse_usize_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid usize env var, ignoring");
    }
    result
}

fn read_env_parsed<T>(lookup: &dyn Fn(&str) -> Option<String>, name: &str) -> Option<T>
where
    T: std::str::FromStr<Err = String>,
{
    let val = read_env_string(lookup, name)?;
    match val.parse() {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!(key = name, error = %e, "invalid env var, ignoring");
            None
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
