//! Relayed payloads.

use axum::extract::ws::{Message, Utf8Bytes};
use bytes::Bytes;

/// One inbound data frame, relayed verbatim.
///
/// The frame kind is preserved so text stays text and binary stays binary.
/// Both variants share their buffer on clone, so fan-out never copies the
/// payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RelayMessage {
    /// UTF-8 text frame.
    Text(Utf8Bytes),
    /// Binary frame.
    Binary(Bytes),
}

impl RelayMessage {
    /// Convert an inbound WebSocket frame into a relay payload.
    ///
    /// Returns `None` for control frames (ping, pong, close), which are
    /// never relayed.
    pub fn from_ws(msg: Message) -> Option<Self> {
        match msg {
            Message::Text(text) => Some(Self::Text(text)),
            Message::Binary(data) => Some(Self::Binary(data)),
            Message::Ping(_) | Message::Pong(_) | Message::Close(_) => None,
        }
    }

    /// Convert into an outbound WebSocket frame.
    pub fn into_ws(self) -> Message {
        match self {
            Self::Text(text) => Message::Text(text),
            Self::Binary(data) => Message::Binary(data),
        }
    }

    /// Payload size in bytes.
    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Binary(data) => data.len(),
        }
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Short frame-kind label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Binary(_) => "binary",
        }
    }
}

impl From<&'static str> for RelayMessage {
    fn from(text: &'static str) -> Self {
        Self::Text(Utf8Bytes::from_static(text))
    }
}

impl From<String> for RelayMessage {
    fn from(text: String) -> Self {
        Self::Text(text.into())
    }
}

impl From<Bytes> for RelayMessage {
    fn from(data: Bytes) -> Self {
        Self::Binary(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_frame_kept_as_text() {
        let msg = RelayMessage::from_ws(Message::Text("hello".into())).unwrap();
        assert_eq!(msg, RelayMessage::from("hello"));
        assert_eq!(msg.kind(), "text");
        assert_eq!(msg.len(), 5);
    }

    #[test]
    fn binary_frame_kept_as_binary() {
        let data = Bytes::from_static(&[0, 159, 146, 150]);
        let msg = RelayMessage::from_ws(Message::Binary(data.clone())).unwrap();
        assert_eq!(msg, RelayMessage::Binary(data.clone()));
        assert_eq!(msg.into_ws(), Message::Binary(data));
    }

    #[test]
    fn control_frames_not_relayed() {
        assert!(RelayMessage::from_ws(Message::Ping(Bytes::new())).is_none());
        assert!(RelayMessage::from_ws(Message::Pong(Bytes::new())).is_none());
        assert!(RelayMessage::from_ws(Message::Close(None)).is_none());
    }

    #[test]
    fn empty_text_is_relayed() {
        let msg = RelayMessage::from_ws(Message::Text(Utf8Bytes::from_static(""))).unwrap();
        assert!(msg.is_empty());
    }

    #[test]
    fn clone_shares_buffer() {
        let data = Bytes::from(vec![7u8; 1024]);
        let msg = RelayMessage::Binary(data.clone());
        let copy = msg.clone();
        match (msg, copy) {
            (RelayMessage::Binary(a), RelayMessage::Binary(b)) => {
                assert_eq!(a.as_ptr(), b.as_ptr());
            }
            _ => panic!("expected binary"),
        }
    }

    #[test]
    fn into_ws_preserves_text() {
        let out = RelayMessage::from(String::from("hi")).into_ws();
        assert_eq!(out, Message::Text("hi".into()));
    }
}
