//! Transport seam
//!
//! One physical duplex connection carrying STOMP frames. The session driver
//! talks to `Transport`/`Connector` traits so tests can swap the WebSocket
//! for an in-memory peer.

pub mod websocket;

pub use websocket::WsConnector;

use async_trait::async_trait;

use crate::protocol::stomp::StompFrame;
use crate::types::{ChatError, Result};

/// One inbound occurrence on the transport
#[derive(Debug)]
pub enum TransportEvent {
    /// A decoded STOMP frame
    Frame(StompFrame),
    /// An undecodable payload; the frame is dropped, the connection stays up
    Dropped(ChatError),
    /// The connection is gone (peer close or socket error)
    Closed(String),
}

/// An established duplex connection
#[async_trait]
pub trait Transport: Send {
    async fn send(&mut self, frame: StompFrame) -> Result<()>;

    /// Next inbound event. Must be cancellation safe: the driver polls this
    /// inside a `select!` against its command channel.
    async fn recv(&mut self) -> TransportEvent;

    /// Close the underlying connection. Safe to call more than once.
    async fn close(&mut self);
}

/// Opens fresh transports; one call per connection generation
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn Transport>>;
}
