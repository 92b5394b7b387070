//! Configuration for the parlor client
//!
//! CLI arguments and environment variable handling using clap.

use std::time::Duration;

use clap::Parser;

use crate::session::SessionConfig;
use crate::types::{ChatError, Result};

/// Parlor - realtime chat room client
#[derive(Parser, Debug, Clone)]
#[command(name = "parlor")]
#[command(about = "Terminal client for the chat room STOMP endpoint")]
pub struct Args {
    /// Full WebSocket URL of the chat STOMP endpoint
    #[arg(long, env = "CHAT_URL", default_value = "ws://localhost:8080/cr")]
    pub chat_url: String,

    /// Bearer token for authenticated sessions (omit to connect anonymously)
    #[arg(long, env = "CHAT_TOKEN")]
    pub token: Option<String>,

    /// Nickname of the signed-in user (display only)
    #[arg(long, env = "CHAT_NICKNAME")]
    pub nickname: Option<String>,

    /// Email of the signed-in user, used for is-self comparison
    #[arg(long, env = "CHAT_EMAIL")]
    pub email: Option<String>,

    /// History backfill page size
    #[arg(long, env = "CHAT_PAGE_SIZE", default_value = "20")]
    pub page_size: u32,

    /// Handshake ack timeout in milliseconds
    #[arg(long, env = "CHAT_HANDSHAKE_TIMEOUT_MS", default_value = "10000")]
    pub handshake_timeout_ms: u64,

    /// First reconnect delay in milliseconds (doubles up to the cap)
    #[arg(long, env = "CHAT_BACKOFF_INITIAL_MS", default_value = "100")]
    pub backoff_initial_ms: u64,

    /// Reconnect delay cap in milliseconds
    #[arg(long, env = "CHAT_BACKOFF_MAX_MS", default_value = "30000")]
    pub backoff_max_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Args {
    /// Value for the STOMP `host` header, derived from the endpoint URL
    pub fn stomp_host(&self) -> String {
        let after_scheme = self
            .chat_url
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(&self.chat_url);
        let host_port = after_scheme.split('/').next().unwrap_or(after_scheme);
        host_port
            .split(':')
            .next()
            .unwrap_or("localhost")
            .to_string()
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            host: self.stomp_host(),
            page_size: self.page_size,
            handshake_timeout: Duration::from_millis(self.handshake_timeout_ms),
            backoff_initial: Duration::from_millis(self.backoff_initial_ms),
            backoff_max: Duration::from_millis(self.backoff_max_ms),
            ..SessionConfig::default()
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !self.chat_url.starts_with("ws://") && !self.chat_url.starts_with("wss://") {
            return Err(ChatError::Config(
                "CHAT_URL must be a ws:// or wss:// URL".to_string(),
            ));
        }
        if self.page_size == 0 {
            return Err(ChatError::Config(
                "CHAT_PAGE_SIZE must be greater than zero".to_string(),
            ));
        }
        if self.backoff_initial_ms > self.backoff_max_ms {
            return Err(ChatError::Config(
                "CHAT_BACKOFF_INITIAL_MS must be less than or equal to CHAT_BACKOFF_MAX_MS"
                    .to_string(),
            ));
        }
        Ok(())
    }
}
