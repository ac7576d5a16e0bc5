//! Handshake `Origin` policy.

use std::collections::HashSet;

use relay_settings::ANY_ORIGIN;

/// Which browser origins may open a WebSocket.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OriginPolicy {
    /// Accept every origin.
    Any,
    /// Accept only these origins (normalized: lowercase, no trailing `/`).
    List(HashSet<String>),
}

impl OriginPolicy {
    /// Build from configured patterns. A `"*"` entry accepts everything.
    ///
    /// A list with no usable entries also accepts everything, with a warning.
    pub fn from_list(origins: &[String]) -> Self {
        if origins.iter().any(|o| o.trim() == ANY_ORIGIN) {
            return Self::Any;
        }
        let allowed: HashSet<String> = origins
            .iter()
            .map(|o| normalize(o))
            .filter(|o| !o.is_empty())
            .collect();
        if allowed.is_empty() {
            tracing::warn!("no usable allowed origins configured, accepting any origin");
            return Self::Any;
        }
        Self::List(allowed)
    }

    /// Whether a handshake with this `Origin` header is accepted.
    ///
    /// Requests without an `Origin` header (non-browser clients) are always
    /// accepted.
    pub fn allows(&self, origin: Option<&str>) -> bool {
        match (self, origin) {
            (Self::Any, _) | (_, None) => true,
            (Self::List(allowed), Some(origin)) => allowed.contains(&normalize(origin)),
        }
    }
}

impl Default for OriginPolicy {
    fn default() -> Self {
        Self::Any
    }
}

fn normalize(origin: &str) -> String {
    origin.trim().trim_end_matches('/').to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(origins: &[&str]) -> OriginPolicy {
        let owned: Vec<String> = origins.iter().map(|s| (*s).to_string()).collect();
        OriginPolicy::from_list(&owned)
    }

    #[test]
    fn wildcard_accepts_everything() {
        let policy = list(&["*"]);
        assert_eq!(policy, OriginPolicy::Any);
        assert!(policy.allows(Some("https://evil.example")));
        assert!(policy.allows(None));
    }

    #[test]
    fn wildcard_among_others_is_any() {
        assert_eq!(list(&["https://a.example", "*"]), OriginPolicy::Any);
    }

    #[test]
    fn listed_origin_accepted() {
        let policy = list(&["https://chat.example"]);
        assert!(policy.allows(Some("https://chat.example")));
        assert!(policy.allows(Some("HTTPS://Chat.Example/")));
    }

    #[test]
    fn unlisted_origin_rejected() {
        let policy = list(&["https://chat.example"]);
        assert!(!policy.allows(Some("https://evil.example")));
        assert!(!policy.allows(Some("http://chat.example")));
        assert!(!policy.allows(Some("")));
    }

    #[test]
    fn missing_origin_accepted() {
        assert!(list(&["https://chat.example"]).allows(None));
    }

    #[test]
    fn empty_list_falls_back_to_any() {
        assert_eq!(list(&[]), OriginPolicy::Any);
        assert!(list(&[]).allows(Some("https://chat.example")));
    }

    #[test]
    fn blank_entries_only_fall_back_to_any() {
        assert_eq!(list(&["", " ", "/"]), OriginPolicy::Any);
    }
}
