//! Parlor - realtime chat room synchronization client
//!
//! Owns one persistent STOMP-over-WebSocket session with a chat server and
//! reconciles three independently-arriving streams into a consistent view:
//!
//! - **Live broadcast**: new chat messages, appended at the log tail
//! - **History backfill**: paginated older messages, merged at the head
//! - **Roster deltas**: join/leave events patched into the online-user set
//!
//! ## Components
//!
//! - **Transport**: WebSocket duplex connection carrying STOMP frames
//! - **Session**: connect/authenticate/reconnect/teardown state machine
//! - **Dispatch**: topic + type demultiplexing into typed chat events
//! - **Roster**: snapshot-plus-delta online-user reconciliation
//! - **History**: id-deduplicated, time-ordered message log merge
//! - **Outbound**: fail-fast validation and publishing of user messages

pub mod config;
pub mod dispatch;
pub mod history;
pub mod identity;
pub mod notify;
pub mod outbound;
pub mod protocol;
pub mod roster;
pub mod session;
pub mod transport;
pub mod types;

pub use config::Args;
pub use dispatch::ChatEvent;
pub use identity::{AuthContext, IdentityProvider};
pub use notify::{Notifier, TracingNotifier};
pub use session::{ChatClient, ChatHandle, SessionConfig};
pub use transport::{Connector, Transport, WsConnector};
pub use types::{ChatError, ChatMessage, Result, SessionState, UserEntry, UserIdentity};
