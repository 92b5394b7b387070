//! WebSocket transport
//!
//! STOMP frames ride as text messages on a tokio-tungstenite connection.
//! Heartbeat payloads (bare EOL) are filtered here so the session driver
//! only ever sees whole frames.

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use super::{Connector, Transport, TransportEvent};
use crate::protocol::stomp::StompFrame;
use crate::types::{ChatError, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connector for the chat server's STOMP endpoint
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    /// `url` is the full WebSocket URL of the STOMP endpoint,
    /// e.g. `ws://localhost:8080/cr`.
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self) -> Result<Box<dyn Transport>> {
        let (ws, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| ChatError::Transport(format!("WebSocket connect failed: {}", e)))?;
        debug!(url = %self.url, "websocket open");
        let (sink, stream) = ws.split();
        Ok(Box::new(WsTransport { sink, stream }))
    }
}

struct WsTransport {
    sink: SplitSink<WsStream, Message>,
    stream: SplitStream<WsStream>,
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, frame: StompFrame) -> Result<()> {
        self.sink.send(Message::Text(frame.encode())).await?;
        Ok(())
    }

    async fn recv(&mut self) -> TransportEvent {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    // Server heartbeat is a bare EOL
                    if text.chars().all(|c| c == '\n' || c == '\r') {
                        continue;
                    }
                    match StompFrame::parse(&text) {
                        Ok(frame) => return TransportEvent::Frame(frame),
                        Err(e) => return TransportEvent::Dropped(e),
                    }
                }
                Some(Ok(Message::Close(reason))) => {
                    let detail = reason
                        .map(|r| r.to_string())
                        .unwrap_or_else(|| "close frame".to_string());
                    return TransportEvent::Closed(detail);
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                Some(Ok(other)) => {
                    warn!("ignoring non-text websocket message: {:?}", other);
                    continue;
                }
                Some(Err(e)) => return TransportEvent::Closed(e.to_string()),
                None => return TransportEvent::Closed("stream ended".to_string()),
            }
        }
    }

    async fn close(&mut self) {
        let _ = self.sink.send(Message::Close(None)).await;
        let _ = self.sink.flush().await;
    }
}
