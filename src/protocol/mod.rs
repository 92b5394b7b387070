//! Chat wire protocol
//!
//! JSON envelopes carried in STOMP frame bodies, discriminated by a `type`
//! tag. The envelope is inspected first so frames with unknown tags can be
//! dropped without a deserialization error (forward compatibility).

pub mod stomp;

use serde::{Deserialize, Serialize};

use crate::types::{ChatMessage, Result, UserEntry};

/// Private per-identity control topic
pub const PRIVATE_TOPIC: &str = "/user/topic/private";
/// Shared broadcast topic
pub const PUBLIC_TOPIC: &str = "/topic/public";
/// Destination for publishing user-authored messages
pub const SEND_DESTINATION: &str = "/app/message/send";
/// Destination for requesting a history backfill page
pub const HISTORY_DESTINATION: &str = "/app/message/history";

/// Default backfill page size
pub const HISTORY_PAGE_SIZE: u32 = 20;

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
}

/// Frames arriving on the private control topic
#[derive(Debug, Clone, PartialEq)]
pub enum PrivateFrame {
    Statistics(StatisticsFrame),
    History(HistoryFrame),
}

/// Roster snapshot, delivered once per connection after the handshake.
///
/// `anonymous` is the server's own count of anonymous sessions; the engine
/// exposes the derived count instead (see `roster`).
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct StatisticsFrame {
    pub online: u32,
    #[serde(default)]
    pub anonymous: u32,
    pub users: Vec<UserEntry>,
}

/// One backfill page, ordered oldest to newest
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryFrame {
    pub messages: Vec<ChatMessage>,
    pub has_more: bool,
    #[serde(default, rename = "lastMId")]
    pub last_mid: Option<i64>,
}

/// Frames arriving on the public broadcast topic
#[derive(Debug, Clone, PartialEq)]
pub enum PublicFrame {
    Message(ChatMessage),
    StatusChange(StatusChangeFrame),
}

/// Join/leave roster delta
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct StatusChangeFrame {
    pub id: i64,
    #[serde(default)]
    pub nickname: String,
    #[serde(default)]
    pub email: String,
    pub status: UserChangeStatus,
    /// Anonymous sessions never mutate the roster
    #[serde(default)]
    pub anonymous: bool,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserChangeStatus {
    Join,
    Leave,
}

/// Parse a private-topic frame body.
///
/// Returns `Ok(None)` for unknown `type` tags; malformed JSON is a protocol
/// error.
pub fn parse_private(body: &str) -> Result<Option<PrivateFrame>> {
    let envelope: Envelope = serde_json::from_str(body)?;
    match envelope.kind.as_str() {
        "STATISTICS" => Ok(Some(PrivateFrame::Statistics(serde_json::from_str(body)?))),
        "HISTORY_MESSAGE" => Ok(Some(PrivateFrame::History(serde_json::from_str(body)?))),
        _ => Ok(None),
    }
}

/// Parse a public-topic frame body. Same contract as [`parse_private`].
pub fn parse_public(body: &str) -> Result<Option<PublicFrame>> {
    let envelope: Envelope = serde_json::from_str(body)?;
    match envelope.kind.as_str() {
        "USER_MESSAGE" => Ok(Some(PublicFrame::Message(serde_json::from_str(body)?))),
        "USER_STATUS_CHANGE" => Ok(Some(PublicFrame::StatusChange(serde_json::from_str(
            body,
        )?))),
        _ => Ok(None),
    }
}

#[derive(Serialize)]
struct SendPayload {
    content: String,
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct ContentPayload<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct HistoryRequest {
    mid: Option<i64>,
    size: u32,
}

/// Body for the send-message destination.
///
/// The `content` field is a JSON-encoded *string*, not an object; inbound
/// messages carry `content` as an object. The asymmetry matches the server
/// contract.
pub fn send_message_body(text: &str) -> Result<String> {
    let content = serde_json::to_string(&ContentPayload { text })?;
    Ok(serde_json::to_string(&SendPayload {
        content,
        kind: "TEXT",
    })?)
}

/// Body for the history-request destination (`mid` null on the initial fetch)
pub fn history_request_body(mid: Option<i64>, size: u32) -> Result<String> {
    Ok(serde_json::to_string(&HistoryRequest { mid, size })?)
}
