//! Core data model shared across the engine
//!
//! Wire field names follow the server's camelCase JSON; domain code uses the
//! serde-renamed snake_case fields.

pub mod error;

pub use error::{ChatError, Result};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One chat message as carried on the broadcast topic and in history pages.
///
/// Immutable once received. `mid` is the server-assigned monotonic id and
/// the uniqueness key for log merging.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub mid: i64,
    pub content: MessageContent,
    pub creator_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator_name: Option<String>,
    pub creator_email: String,
    pub create_date: DateTime<Utc>,
}

impl ChatMessage {
    /// Whether this message was authored by the given identity.
    ///
    /// Self-messages are identified by email comparison, not by a separate
    /// local-echo path.
    pub fn is_authored_by(&self, identity: &UserIdentity) -> bool {
        identity
            .email
            .as_deref()
            .is_some_and(|email| email == self.creator_email)
    }
}

/// Structured message body
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageContent {
    pub text: String,
}

/// One online user as reported by the roster snapshot and status deltas
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserEntry {
    pub id: i64,
    pub nickname: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

/// The caller's own identity, as exposed by the identity provider
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserIdentity {
    pub nickname: Option<String>,
    pub email: Option<String>,
}

/// Session lifecycle state
///
/// Owned exclusively by the session driver; observers read it through a
/// watch channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    /// Terminal. No automatic reconnect.
    Closed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
            SessionState::Reconnecting => "reconnecting",
            SessionState::Closed => "closed",
        }
    }

    /// Whether outbound publishes are currently possible
    pub fn is_connected(&self) -> bool {
        matches!(self, SessionState::Connected)
    }
}

/// Monotonic counter identifying one physical connection.
///
/// Subscriptions are tagged with the generation they were created under so
/// frames from a stale connection can never reach the reconcilers.
pub type Generation = u64;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_wire_shape() {
        let json = r#"{
            "mid": 42,
            "content": {"text": "hello"},
            "creatorId": 7,
            "creatorName": "ada",
            "creatorEmail": "ada@example.com",
            "createDate": "2025-01-15T10:30:00Z"
        }"#;

        let msg: ChatMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.mid, 42);
        assert_eq!(msg.content.text, "hello");
        assert_eq!(msg.creator_id, 7);
        assert_eq!(msg.creator_name.as_deref(), Some("ada"));
    }

    #[test]
    fn test_message_without_creator_name() {
        let json = r#"{
            "mid": 1,
            "content": {"text": "hi"},
            "creatorId": 2,
            "creatorEmail": "x@example.com",
            "createDate": "2025-01-15T10:30:00Z"
        }"#;

        let msg: ChatMessage = serde_json::from_str(json).unwrap();
        assert!(msg.creator_name.is_none());
    }

    #[test]
    fn test_is_authored_by() {
        let msg: ChatMessage = serde_json::from_str(
            r#"{"mid":1,"content":{"text":"hi"},"creatorId":2,
                "creatorEmail":"me@example.com","createDate":"2025-01-15T10:30:00Z"}"#,
        )
        .unwrap();

        let me = UserIdentity {
            nickname: Some("me".to_string()),
            email: Some("me@example.com".to_string()),
        };
        let other = UserIdentity {
            nickname: None,
            email: Some("other@example.com".to_string()),
        };
        let anonymous = UserIdentity::default();

        assert!(msg.is_authored_by(&me));
        assert!(!msg.is_authored_by(&other));
        assert!(!msg.is_authored_by(&anonymous));
    }
}
