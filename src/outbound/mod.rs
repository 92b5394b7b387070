//! Outbound message pipeline
//!
//! Validates user-authored messages and builds the publish frame. Fails
//! fast: nothing is queued while disconnected, and no optimistic local echo
//! is performed; the message shows up when the server broadcasts it back.

use std::sync::Arc;

use crate::identity::IdentityProvider;
use crate::notify::Notifier;
use crate::protocol::{self, stomp::StompFrame};
use crate::types::{ChatError, Result, SessionState};

pub struct OutboundPipeline {
    identity: Arc<dyn IdentityProvider>,
    notifier: Arc<dyn Notifier>,
}

impl OutboundPipeline {
    pub fn new(identity: Arc<dyn IdentityProvider>, notifier: Arc<dyn Notifier>) -> Self {
        Self { identity, notifier }
    }

    /// Validate `text` against the current session state and build the
    /// SEND frame for the message destination.
    ///
    /// Validation failures are reported through the notification sink and
    /// returned synchronously; no state is mutated.
    pub fn prepare(&self, state: SessionState, text: &str) -> Result<StompFrame> {
        if !state.is_connected() {
            return Err(self.reject("Not connected to the chat room"));
        }
        if !self.identity.is_authenticated() {
            return Err(self.reject("Sign in before sending messages"));
        }
        if text.trim().is_empty() {
            return Err(self.reject("Message is empty"));
        }

        let body = protocol::send_message_body(text)?;
        Ok(StompFrame::send(protocol::SEND_DESTINATION, body))
    }

    fn reject(&self, message: &str) -> ChatError {
        self.notifier.error(message);
        ChatError::Validation(message.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::AuthContext;
    use crate::notify::RecordingNotifier;
    use crate::types::UserIdentity;

    fn pipeline(authenticated: bool) -> (OutboundPipeline, Arc<RecordingNotifier>) {
        let identity = if authenticated {
            AuthContext::authenticated("tok", UserIdentity::default())
        } else {
            AuthContext::anonymous()
        };
        let notifier = Arc::new(RecordingNotifier::new());
        (
            OutboundPipeline::new(Arc::new(identity), notifier.clone()),
            notifier,
        )
    }

    #[test]
    fn test_send_while_disconnected_rejected() {
        let (pipeline, notifier) = pipeline(true);
        let result = pipeline.prepare(SessionState::Disconnected, "hello");

        assert!(matches!(result, Err(ChatError::Validation(_))));
        assert_eq!(notifier.errors().len(), 1);
    }

    #[test]
    fn test_send_unauthenticated_rejected() {
        let (pipeline, notifier) = pipeline(false);
        let result = pipeline.prepare(SessionState::Connected, "hello");

        assert!(matches!(result, Err(ChatError::Validation(_))));
        assert!(notifier.errors()[0].contains("Sign in"));
    }

    #[test]
    fn test_empty_and_whitespace_rejected() {
        let (pipeline, notifier) = pipeline(true);

        assert!(pipeline.prepare(SessionState::Connected, "").is_err());
        assert!(pipeline.prepare(SessionState::Connected, "   ").is_err());
        assert!(pipeline.prepare(SessionState::Connected, "\n\t").is_err());
        assert_eq!(notifier.errors().len(), 3);
    }

    #[test]
    fn test_valid_send_builds_frame() {
        let (pipeline, notifier) = pipeline(true);
        let frame = pipeline
            .prepare(SessionState::Connected, "hello there")
            .unwrap();

        assert_eq!(frame.command, "SEND");
        assert_eq!(
            frame.header("destination"),
            Some(crate::protocol::SEND_DESTINATION)
        );
        assert!(frame.body.contains("TEXT"));
        assert!(notifier.errors().is_empty());
    }

    #[test]
    fn test_reconnecting_counts_as_not_connected() {
        let (pipeline, _) = pipeline(true);
        assert!(pipeline.prepare(SessionState::Reconnecting, "hi").is_err());
    }
}
