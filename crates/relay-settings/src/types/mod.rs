//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]`, so a settings
//! file may be partial: missing fields get their compiled default.

mod logging;
mod server;

pub use logging::*;
pub use server::*;

use serde::{Deserialize, Serialize};

/// Root settings type for the relay.
///
/// # JSON Format
///
/// ```json
/// {
///   "server": { "port": 9000, "allowedOrigins": ["https://chat.example"] },
///   "logging": { "level": "debug", "format": "json" }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelaySettings {
    /// Server network settings.
    pub server: ServerSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl RelaySettings {
    /// Correct invalid values in place.
    ///
    /// Called automatically during loading. Out-of-range values are corrected
    /// with a warning rather than rejected.
    pub fn validate(&mut self) {
        fn at_least_one(val: &mut usize, name: &str) {
            if *val == 0 {
                tracing::warn!("{name} must be at least 1, using 1");
                *val = 1;
            }
        }

        let s = &mut self.server;
        at_least_one(&mut s.max_connections, "max_connections");
        at_least_one(&mut s.max_message_size, "max_message_size");
        at_least_one(&mut s.inbound_queue_capacity, "inbound_queue_capacity");
        at_least_one(&mut s.outbound_queue_capacity, "outbound_queue_capacity");

        let path = s.ws_path.trim().to_string();
        s.ws_path = if path.is_empty() {
            tracing::warn!("ws_path is empty, using /ws");
            "/ws".to_string()
        } else if path.starts_with('/') {
            path
        } else {
            format!("/{path}")
        };

        s.allowed_origins = s
            .allowed_origins
            .iter()
            .map(|o| o.trim().trim_end_matches('/').to_string())
            .filter(|o| !o.is_empty())
            .collect();
        if s.allowed_origins.is_empty() {
            tracing::warn!("allowed_origins has no usable entries, accepting any origin");
            s.allowed_origins = vec![ANY_ORIGIN.to_string()];
        }

        if s.heartbeat_interval_ms == 0 {
            tracing::warn!("heartbeat_interval_ms must be positive, using 1000");
            s.heartbeat_interval_ms = 1000;
        }
        if s.heartbeat_timeout_ms < s.heartbeat_interval_ms {
            tracing::warn!(
                timeout = s.heartbeat_timeout_ms,
                interval = s.heartbeat_interval_ms,
                "heartbeat timeout shorter than interval, raising to interval"
            );
            s.heartbeat_timeout_ms = s.heartbeat_interval_ms;
        }
        if s.write_timeout_ms == 0 {
            s.write_timeout_ms = 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validated(f: impl FnOnce(&mut RelaySettings)) -> RelaySettings {
        let mut s = RelaySettings::default();
        f(&mut s);
        s.validate();
        s
    }

    #[test]
    fn defaults_survive_validation() {
        let s = validated(|_| {});
        assert_eq!(s, RelaySettings::default());
    }

    #[test]
    fn zero_capacities_raised_to_one() {
        let s = validated(|s| {
            s.server.inbound_queue_capacity = 0;
            s.server.outbound_queue_capacity = 0;
            s.server.max_connections = 0;
        });
        assert_eq!(s.server.inbound_queue_capacity, 1);
        assert_eq!(s.server.outbound_queue_capacity, 1);
        assert_eq!(s.server.max_connections, 1);
    }

    #[test]
    fn ws_path_gets_leading_slash() {
        let s = validated(|s| s.server.ws_path = "chat".into());
        assert_eq!(s.server.ws_path, "/chat");
    }

    #[test]
    fn empty_ws_path_falls_back() {
        let s = validated(|s| s.server.ws_path = "  ".into());
        assert_eq!(s.server.ws_path, "/ws");
    }

    #[test]
    fn origins_trimmed_and_blank_dropped() {
        let s = validated(|s| {
            s.server.allowed_origins =
                vec![" https://a.example/ ".into(), String::new(), "http://b".into()];
        });
        assert_eq!(
            s.server.allowed_origins,
            vec!["https://a.example".to_string(), "http://b".to_string()]
        );
    }

    #[test]
    fn blank_origins_fall_back_to_any() {
        let s = validated(|s| {
            s.server.allowed_origins = vec![String::new(), "  ".into(), "/".into()];
        });
        assert_eq!(s.server.allowed_origins, vec![ANY_ORIGIN.to_string()]);
    }

    #[test]
    fn heartbeat_timeout_not_below_interval() {
        let s = validated(|s| {
            s.server.heartbeat_interval_ms = 5000;
            s.server.heartbeat_timeout_ms = 1000;
        });
        assert_eq!(s.server.heartbeat_timeout_ms, 5000);
    }

    #[test]
    fn zero_heartbeat_interval_corrected() {
        let s = validated(|s| {
            s.server.heartbeat_interval_ms = 0;
            s.server.heartbeat_timeout_ms = 0;
        });
        assert_eq!(s.server.heartbeat_interval_ms, 1000);
        assert_eq!(s.server.heartbeat_timeout_ms, 1000);
    }

    #[test]
    fn serde_roundtrip() {
        let s = RelaySettings::default();
        let json = serde_json::to_string(&s).unwrap();
        let back: RelaySettings = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
    }
}
