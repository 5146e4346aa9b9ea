//! Cross-context message protocol.
//!
//! Pages post JSON objects with a `type` discriminator:
//!
//! ```json
//! {"type": "SKIP_WAITING"}
//! {"type": "GET_VERSION"}
//! {"type": "CACHE_URLS", "urls": ["/ch01.html", "/ch02.html"]}
//! {"type": "CLEAR_CACHE"}
//! ```
//!
//! Replies travel back over the port the caller supplied.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tokio::sync::oneshot;
use tracing::debug;

use crate::ServiceWorkerError;

/// A command from a controlled page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    SkipWaiting,
    GetVersion,
    CacheUrls { urls: Vec<String> },
    ClearCache,
}

impl ClientMessage {
    pub fn parse(data: &JsonValue) -> Result<Self, ServiceWorkerError> {
        serde_json::from_value(data.clone())
            .map_err(|e| ServiceWorkerError::Message(format!("{e}: {data}")))
    }
}

/// Reply to a [`ClientMessage`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageReply {
    Version { version: String, timestamp: u64 },
    Status { success: bool },
}

/// Reply channel supplied by the caller.
pub type ReplyPort = oneshot::Sender<MessageReply>;

/// Send `reply` if the caller gave us somewhere to send it.
pub(crate) fn respond(port: Option<ReplyPort>, reply: MessageReply) {
    match port {
        Some(port) => {
            if port.send(reply).is_err() {
                debug!("Reply port closed before reply was sent");
            }
        }
        None => debug!(?reply, "No reply port supplied"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_each_command() {
        assert_eq!(
            ClientMessage::parse(&json!({"type": "SKIP_WAITING"})).unwrap(),
            ClientMessage::SkipWaiting
        );
        assert_eq!(
            ClientMessage::parse(&json!({"type": "GET_VERSION"})).unwrap(),
            ClientMessage::GetVersion
        );
        assert_eq!(
            ClientMessage::parse(&json!({"type": "CACHE_URLS", "urls": ["/a", "/b"]})).unwrap(),
            ClientMessage::CacheUrls {
                urls: vec!["/a".to_string(), "/b".to_string()]
            }
        );
        assert_eq!(
            ClientMessage::parse(&json!({"type": "CLEAR_CACHE"})).unwrap(),
            ClientMessage::ClearCache
        );
    }

    #[test]
    fn test_parse_rejects_unknown_and_malformed() {
        assert!(ClientMessage::parse(&json!({"type": "REBOOT"})).is_err());
        assert!(ClientMessage::parse(&json!({"type": "CACHE_URLS"})).is_err());
        assert!(ClientMessage::parse(&json!("SKIP_WAITING")).is_err());
    }

    #[test]
    fn test_reply_shapes() {
        let version = MessageReply::Version {
            version: "tutorial-precache-v1".to_string(),
            timestamp: 42,
        };
        assert_eq!(
            serde_json::to_value(&version).unwrap(),
            json!({"version": "tutorial-precache-v1", "timestamp": 42})
        );
        assert_eq!(
            serde_json::to_value(MessageReply::Status { success: false }).unwrap(),
            json!({"success": false})
        );
    }

    #[test]
    fn test_respond_to_dropped_port_is_harmless() {
        let (tx, rx) = oneshot::channel();
        drop(rx);
        respond(Some(tx), MessageReply::Status { success: true });
        respond(None, MessageReply::Status { success: true });
    }
}
