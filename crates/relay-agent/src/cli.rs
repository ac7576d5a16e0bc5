//! Command-line flags.

use std::path::PathBuf;

use clap::Parser;
use relay_settings::{LogFormat, LogLevel, RelaySettings};

/// WebSocket broadcast relay.
#[derive(Parser, Debug)]
#[command(name = "relay", about = "Relays every WebSocket message to every connected client")]
pub struct Cli {
    /// Host to bind (overrides settings and `RELAY_HOST`).
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind (overrides settings and `PORT`).
    #[arg(long)]
    pub port: Option<u16>,

    /// Settings file (JSON). Defaults to `RELAY_CONFIG` when set.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Log format: `pretty` or `json`.
    #[arg(long)]
    pub log_format: Option<LogFormat>,

    /// Minimum log level when `RUST_LOG` is not set.
    #[arg(long)]
    pub log_level: Option<LogLevel>,
}

impl Cli {
    /// Apply flags over loaded settings. Flags win over file and env.
    pub fn apply(&self, settings: &mut RelaySettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(format) = self.log_format {
            settings.logging.format = format;
        }
        if let Some(level) = self.log_level {
            settings.logging.level = level;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_flags_leave_settings_untouched() {
        let cli = Cli::parse_from(["relay"]);
        let mut settings = RelaySettings::default();
        cli.apply(&mut settings);
        assert_eq!(settings, RelaySettings::default());
        assert!(cli.config.is_none());
    }

    #[test]
    fn cli_custom_port() {
        let cli = Cli::parse_from(["relay", "--port", "9000"]);
        let mut settings = RelaySettings::default();
        cli.apply(&mut settings);
        assert_eq!(settings.server.port, 9000);
    }

    #[test]
    fn cli_custom_host() {
        let cli = Cli::parse_from(["relay", "--host", "127.0.0.1"]);
        let mut settings = RelaySettings::default();
        cli.apply(&mut settings);
        assert_eq!(settings.server.host, "127.0.0.1");
    }

    #[test]
    fn cli_config_path() {
        let cli = Cli::parse_from(["relay", "--config", "/etc/relay.json"]);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/relay.json")));
    }

    #[test]
    fn cli_logging_flags() {
        let cli = Cli::parse_from(["relay", "--log-format", "json", "--log-level", "debug"]);
        let mut settings = RelaySettings::default();
        cli.apply(&mut settings);
        assert_eq!(settings.logging.format, LogFormat::Json);
        assert_eq!(settings.logging.level, LogLevel::Debug);
    }

    #[test]
    fn cli_rejects_bad_port() {
        assert!(Cli::try_parse_from(["relay", "--port", "99999"]).is_err());
    }

    #[test]
    fn cli_rejects_bad_log_format() {
        assert!(Cli::try_parse_from(["relay", "--log-format", "xml"]).is_err());
    }
}
