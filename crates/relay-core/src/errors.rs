//! Relay error taxonomy.
//!
//! Per-connection failures ([`DeliveryError`], read errors, handshake
//! rejections) are handled where they happen and never reach other
//! connections. Only [`RelayError::Bind`] is fatal to the process.

/// Failure to hand a message to one connection during fan-out.
///
/// The dispatcher never retries: the connection is removed from the
/// registry and closed.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    /// The connection is closing or its write loop has exited.
    #[error("connection closed")]
    Closed,
    /// The connection's outbound queue is full (client is not keeping up).
    #[error("outbound queue full ({capacity} messages)")]
    QueueFull {
        /// Capacity of the outbound queue that overflowed.
        capacity: usize,
    },
}

impl DeliveryError {
    /// Short classification string for logging/metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::QueueFull { .. } => "queue_full",
        }
    }
}

/// Errors surfaced by the relay server and hub.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// The listening socket could not be bound. Fatal at startup.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that was requested.
        addr: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The HTTP server task failed while running.
    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),
    /// The dispatch loop has stopped; no further messages can be published.
    #[error("broadcast hub closed")]
    HubClosed,
    /// The inbound queue is full and the caller asked not to wait.
    #[error("broadcast hub backlogged")]
    HubBacklogged,
    /// The metrics recorder could not be installed.
    #[error("metrics recorder: {0}")]
    Metrics(String),
}

impl RelayError {
    /// Whether this error must terminate the process.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Bind { .. })
    }

    /// Short classification string for logging/metrics.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Bind { .. } => "bind",
            Self::Serve(_) => "serve",
            Self::HubClosed => "hub_closed",
            Self::HubBacklogged => "hub_backlogged",
            Self::Metrics(_) => "metrics",
        }
    }
}

/// Result type for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn bind_error() -> RelayError {
        RelayError::Bind {
            addr: "0.0.0.0:8080".into(),
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "address in use"),
        }
    }

    #[test]
    fn bind_is_fatal() {
        assert!(bind_error().is_fatal());
    }

    #[test]
    fn per_connection_errors_are_not_fatal() {
        assert!(!RelayError::HubClosed.is_fatal());
        assert!(!RelayError::HubBacklogged.is_fatal());
        let serve = RelayError::Serve(std::io::Error::other("reset"));
        assert!(!serve.is_fatal());
    }

    #[test]
    fn bind_display_names_address() {
        let msg = bind_error().to_string();
        assert!(msg.contains("0.0.0.0:8080"), "got: {msg}");
        assert!(msg.contains("address in use"), "got: {msg}");
    }

    #[test]
    fn queue_full_display() {
        let err = DeliveryError::QueueFull { capacity: 256 };
        assert_eq!(err.to_string(), "outbound queue full (256 messages)");
    }

    #[test]
    fn delivery_reasons() {
        assert_eq!(DeliveryError::Closed.reason(), "closed");
        assert_eq!(DeliveryError::QueueFull { capacity: 1 }.reason(), "queue_full");
    }

    #[test]
    fn error_kinds_are_snake_case() {
        let errors = [
            bind_error(),
            RelayError::Serve(std::io::Error::other("x")),
            RelayError::HubClosed,
            RelayError::HubBacklogged,
            RelayError::Metrics("x".into()),
        ];
        for err in errors {
            let kind = err.error_kind();
            assert!(
                kind.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "kind '{kind}' must be snake_case"
            );
        }
    }
}
