//! Channel dispatcher
//!
//! Demultiplexes inbound MESSAGE frames by destination topic and `type` tag
//! into typed chat events, applying them to the roster and the message log.
//! Receipt of the statistics snapshot is the only trigger for requesting
//! history backfill; at most one initial request is issued per connection
//! generation.

use tracing::debug;

use crate::history::MessageLog;
use crate::protocol::{
    self, stomp::StompFrame, PrivateFrame, PublicFrame, UserChangeStatus,
};
use crate::roster::RosterStore;
use crate::types::{ChatError, ChatMessage, Result, UserEntry};

/// Typed event produced from an inbound frame
#[derive(Debug, Clone)]
pub enum ChatEvent {
    /// A live broadcast message was appended to the log
    MessageReceived(ChatMessage),
    /// A history page was merged into the log
    HistoryMerged { inserted: usize, has_more: bool },
    /// The roster was replaced by a snapshot
    RosterSnapshot { online: u32 },
    UserJoined(UserEntry),
    UserLeft(i64),
}

/// What the session driver must do after a frame was dispatched
#[derive(Debug, Default)]
pub struct DispatchResult {
    pub events: Vec<ChatEvent>,
    /// A frame to publish (the one-shot history request)
    pub publish: Option<StompFrame>,
}

pub struct Dispatcher {
    page_size: u32,
    history_requested: bool,
}

impl Dispatcher {
    pub fn new(page_size: u32) -> Self {
        Self {
            page_size,
            history_requested: false,
        }
    }

    /// Forget per-generation state. Called on every reconnect so the fresh
    /// statistics snapshot triggers a fresh backfill.
    pub fn reset(&mut self) {
        self.history_requested = false;
    }

    /// Dispatch one inbound MESSAGE frame.
    ///
    /// Frames for unknown topics or with unknown `type` tags are ignored;
    /// malformed bodies return a protocol error and mutate nothing.
    pub fn dispatch(
        &mut self,
        frame: &StompFrame,
        roster: &mut RosterStore,
        log: &mut MessageLog,
    ) -> Result<DispatchResult> {
        let destination = frame
            .header("destination")
            .ok_or_else(|| ChatError::Protocol("MESSAGE frame without destination".to_string()))?;

        match destination {
            protocol::PRIVATE_TOPIC => self.dispatch_private(&frame.body, roster, log),
            protocol::PUBLIC_TOPIC => self.dispatch_public(&frame.body, roster, log),
            other => {
                debug!(destination = other, "frame for unknown topic ignored");
                Ok(DispatchResult::default())
            }
        }
    }

    fn dispatch_private(
        &mut self,
        body: &str,
        roster: &mut RosterStore,
        log: &mut MessageLog,
    ) -> Result<DispatchResult> {
        let mut result = DispatchResult::default();
        match protocol::parse_private(body)? {
            Some(PrivateFrame::Statistics(stats)) => {
                roster.apply_snapshot(&stats);
                result.events.push(ChatEvent::RosterSnapshot {
                    online: stats.online,
                });
                if !self.history_requested {
                    self.history_requested = true;
                    let body = protocol::history_request_body(None, self.page_size)?;
                    result.publish =
                        Some(StompFrame::send(protocol::HISTORY_DESTINATION, body));
                }
            }
            Some(PrivateFrame::History(page)) => {
                let inserted = log.merge_page(&page);
                result.events.push(ChatEvent::HistoryMerged {
                    inserted,
                    has_more: page.has_more,
                });
            }
            None => debug!("private frame with unknown type ignored"),
        }
        Ok(result)
    }

    fn dispatch_public(
        &mut self,
        body: &str,
        roster: &mut RosterStore,
        log: &mut MessageLog,
    ) -> Result<DispatchResult> {
        let mut result = DispatchResult::default();
        match protocol::parse_public(body)? {
            Some(PublicFrame::Message(message)) => {
                if log.append_live(message.clone()) {
                    result.events.push(ChatEvent::MessageReceived(message));
                }
            }
            Some(PublicFrame::StatusChange(delta)) => {
                if roster.apply_delta(&delta) {
                    let event = match delta.status {
                        UserChangeStatus::Join => ChatEvent::UserJoined(UserEntry {
                            id: delta.id,
                            nickname: delta.nickname,
                            email: delta.email,
                            avatar: None,
                        }),
                        UserChangeStatus::Leave => ChatEvent::UserLeft(delta.id),
                    };
                    result.events.push(event);
                }
            }
            None => debug!("public frame with unknown type ignored"),
        }
        Ok(result)
    }
}
