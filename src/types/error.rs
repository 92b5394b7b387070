//! Error types for the chat client

/// Main error type for chat client operations
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// Socket-level failure. Drives the session to Reconnecting; never
    /// returned to callers of the public API.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Malformed or unexpected frame. Logged, frame dropped, session stays up.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Rejected send (empty text, unauthenticated, not connected).
    /// Reported synchronously at the call site.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Server rejected the handshake while credentials were presented.
    /// Terminal: the identity must be refreshed before reconnecting.
    #[error("Authentication expired: {0}")]
    AuthExpired(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// The session has been torn down.
    #[error("Session closed: {0}")]
    Closed(String),
}

impl From<serde_json::Error> for ChatError {
    fn from(err: serde_json::Error) -> Self {
        Self::Protocol(format!("JSON error: {}", err))
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ChatError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

/// Result type alias for chat client operations
pub type Result<T> = std::result::Result<T, ChatError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tungstenite_error_maps_to_transport() {
        let err: ChatError = tokio_tungstenite::tungstenite::Error::ConnectionClosed.into();
        assert!(matches!(err, ChatError::Transport(_)));
    }

    #[test]
    fn test_serde_error_maps_to_protocol() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: ChatError = json_err.into();
        assert!(matches!(err, ChatError::Protocol(_)));
    }

    #[test]
    fn test_display_prefixes() {
        assert_eq!(
            ChatError::AuthExpired("bad token".to_string()).to_string(),
            "Authentication expired: bad token"
        );
        assert_eq!(
            ChatError::Config("bad url".to_string()).to_string(),
            "Configuration error: bad url"
        );
    }
}
