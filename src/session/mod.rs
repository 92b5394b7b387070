//! Session state machine and driver loop
//!
//! One spawned task exclusively owns the physical connection, the roster
//! and the message log. Frames are applied sequentially in arrival order;
//! commands (send, close) are serialized through an mpsc channel, so no
//! locking is needed beyond the shared read views.
//!
//! Lifecycle: Disconnected -> Connecting -> Connected, back to Connecting
//! through Reconnecting on any transport or handshake failure, with capped
//! exponential backoff and unlimited retries. Explicit close is terminal.
//! Every pass through Connecting opens a brand-new transport and re-issues
//! both subscriptions under a fresh connection generation; nothing survives
//! a drop.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::Rng;
use tokio::sync::{broadcast, mpsc, oneshot, watch, RwLock};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::dispatch::{ChatEvent, Dispatcher};
use crate::history::{HistoryCursor, MessageLog};
use crate::identity::IdentityProvider;
use crate::notify::Notifier;
use crate::outbound::OutboundPipeline;
use crate::protocol::{
    self,
    stomp::{StompFrame, CMD_CONNECTED, CMD_ERROR, CMD_MESSAGE},
};
use crate::roster::RosterStore;
use crate::transport::{Connector, Transport, TransportEvent};
use crate::types::{ChatError, ChatMessage, Generation, Result, SessionState, UserEntry};

/// Tuning knobs for one chat session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Value for the STOMP `host` header
    pub host: String,
    /// History backfill page size
    pub page_size: u32,
    /// How long to wait for the CONNECTED handshake ack
    pub handshake_timeout: Duration,
    /// First reconnect delay; doubles up to `backoff_max`
    pub backoff_initial: Duration,
    pub backoff_max: Duration,
    /// Capacity of the chat event broadcast channel
    pub event_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            page_size: protocol::HISTORY_PAGE_SIZE,
            handshake_timeout: Duration::from_secs(10),
            backoff_initial: Duration::from_millis(100),
            backoff_max: Duration::from_secs(30),
            event_capacity: 256,
        }
    }
}

enum Command {
    /// No-op unless the session is already closed
    Connect,
    Send {
        text: String,
        reply: oneshot::Sender<Result<()>>,
    },
    /// Fetch the next older history page if the cursor has more
    RequestOlder {
        reply: oneshot::Sender<Result<bool>>,
    },
    Close,
}

type LogoutHook = Box<dyn Fn() + Send + Sync>;

/// Chat synchronization client
pub struct ChatClient;

impl ChatClient {
    /// Spawn the session driver and start connecting immediately.
    ///
    /// The identity is read once per handshake; a changed token takes
    /// effect only after `close` and a fresh spawn.
    pub fn spawn(
        connector: Arc<dyn Connector>,
        config: SessionConfig,
        identity: Arc<dyn IdentityProvider>,
        notifier: Arc<dyn Notifier>,
    ) -> ChatHandle {
        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        let (state_tx, state_rx) = watch::channel(SessionState::Disconnected);
        let (event_tx, _) = broadcast::channel(config.event_capacity);
        let roster = Arc::new(RwLock::new(RosterStore::new()));
        let log = Arc::new(RwLock::new(MessageLog::new()));
        let logout_hooks: Arc<Mutex<Vec<LogoutHook>>> = Arc::new(Mutex::new(Vec::new()));
        let expired: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
        let dispatcher = Dispatcher::new(config.page_size);

        let driver = Driver {
            connector,
            config,
            outbound: OutboundPipeline::new(identity.clone(), notifier.clone()),
            identity,
            notifier,
            cmd_rx,
            state_tx,
            event_tx: event_tx.clone(),
            roster: roster.clone(),
            log: log.clone(),
            logout_hooks: logout_hooks.clone(),
            expired: expired.clone(),
            dispatcher,
        };

        tokio::spawn(driver.run());

        ChatHandle {
            cmd_tx,
            state_rx,
            event_tx,
            roster,
            log,
            logout_hooks,
            expired,
        }
    }
}

/// Handle to a running chat session. Cheap to clone.
pub struct ChatHandle {
    cmd_tx: mpsc::Sender<Command>,
    state_rx: watch::Receiver<SessionState>,
    event_tx: broadcast::Sender<ChatEvent>,
    roster: Arc<RwLock<RosterStore>>,
    log: Arc<RwLock<MessageLog>>,
    logout_hooks: Arc<Mutex<Vec<LogoutHook>>>,
    expired: Arc<Mutex<Option<String>>>,
}

impl Clone for ChatHandle {
    fn clone(&self) -> Self {
        Self {
            cmd_tx: self.cmd_tx.clone(),
            state_rx: self.state_rx.clone(),
            event_tx: self.event_tx.clone(),
            roster: self.roster.clone(),
            log: self.log.clone(),
            logout_hooks: self.logout_hooks.clone(),
            expired: self.expired.clone(),
        }
    }
}

impl ChatHandle {
    /// Current session state
    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    /// Watch channel for connection-indicator style observers
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }

    /// Subscribe to typed chat events
    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.event_tx.subscribe()
    }

    /// Request a connect. No-op while already connecting or connected.
    pub async fn connect(&self) -> Result<()> {
        self.cmd_tx
            .send(Command::Connect)
            .await
            .map_err(|_| self.closed_error())
    }

    /// Publish a user-authored message.
    ///
    /// Fails fast with a validation error when the session is not
    /// connected, the caller is unauthenticated, or the text is blank;
    /// nothing is queued and no local echo is produced.
    pub async fn send(&self, text: impl Into<String>) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Send {
                text: text.into(),
                reply,
            })
            .await
            .map_err(|_| self.closed_error())?;
        rx.await.map_err(|_| self.closed_error())?
    }

    /// Request the next older history page.
    ///
    /// Returns `Ok(false)` when the cursor has no more pages.
    pub async fn request_older(&self) -> Result<bool> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::RequestOlder { reply })
            .await
            .map_err(|_| self.closed_error())?;
        rx.await.map_err(|_| self.closed_error())?
    }

    /// Tear the session down. Terminal and safe to call repeatedly.
    pub async fn close(&self) {
        // An already-stopped driver means close is a no-op
        let _ = self.cmd_tx.send(Command::Close).await;
    }

    /// Register a callback invoked synchronously when the session reaches
    /// `Closed` (explicit close or credential rejection).
    pub fn on_logout(&self, hook: impl Fn() + Send + Sync + 'static) {
        self.logout_hooks
            .lock()
            .expect("logout hooks poisoned")
            .push(Box::new(hook));
    }

    /// Reconciled message log, ascending by message id
    pub async fn messages(&self) -> Vec<ChatMessage> {
        self.log.read().await.messages().to_vec()
    }

    pub async fn history_cursor(&self) -> HistoryCursor {
        self.log.read().await.cursor().clone()
    }

    /// Named online users
    pub async fn roster(&self) -> Vec<UserEntry> {
        self.roster.read().await.entries()
    }

    /// Total online count from the last snapshot
    pub async fn online_count(&self) -> u32 {
        self.roster.read().await.online_count()
    }

    /// Derived anonymous-session count (approximate between snapshots)
    pub async fn anonymous_count(&self) -> u32 {
        self.roster.read().await.anonymous_count()
    }

    /// Whether the session was closed because the server rejected the
    /// presented credentials at handshake
    pub fn auth_expired(&self) -> bool {
        self.expired.lock().expect("expiry flag poisoned").is_some()
    }

    /// Error for operations against a stopped driver. Credential rejection
    /// and ordinary teardown stay distinguishable after the fact.
    fn closed_error(&self) -> ChatError {
        let expired = self.expired.lock().expect("expiry flag poisoned");
        match expired.as_ref() {
            Some(message) => ChatError::AuthExpired(message.clone()),
            None => ChatError::Closed("session driver gone".to_string()),
        }
    }
}

enum Established {
    Transport(Box<dyn Transport>),
    /// Handshake rejected while a bearer token was presented
    AuthRejected(String),
    Failed(String),
}

enum LoopExit {
    Reconnect(String),
    Shutdown,
}

struct Driver {
    connector: Arc<dyn Connector>,
    config: SessionConfig,
    outbound: OutboundPipeline,
    identity: Arc<dyn IdentityProvider>,
    notifier: Arc<dyn Notifier>,
    cmd_rx: mpsc::Receiver<Command>,
    state_tx: watch::Sender<SessionState>,
    event_tx: broadcast::Sender<ChatEvent>,
    roster: Arc<RwLock<RosterStore>>,
    log: Arc<RwLock<MessageLog>>,
    logout_hooks: Arc<Mutex<Vec<LogoutHook>>>,
    expired: Arc<Mutex<Option<String>>>,
    dispatcher: Dispatcher,
}

impl Driver {
    async fn run(mut self) {
        let mut backoff = self.config.backoff_initial;
        let mut generation: Generation = 0;

        loop {
            generation += 1;
            self.set_state(SessionState::Connecting);

            match self.establish(generation).await {
                Some(Established::Transport(mut transport)) => {
                    let connection_id = Uuid::new_v4();
                    if let Err(e) = self.subscribe_topics(&mut transport, generation).await {
                        warn!(error = %e, "subscribe failed");
                        transport.close().await;
                    } else {
                        self.dispatcher.reset();
                        backoff = self.config.backoff_initial;
                        self.set_state(SessionState::Connected);
                        info!(generation, connection_id = %connection_id, "chat session connected");
                        if generation > 1 {
                            self.notifier.info("Reconnected to the chat room");
                        }

                        match self.connected_loop(&mut transport, generation).await {
                            LoopExit::Reconnect(reason) => {
                                warn!(generation, reason = %reason, "connection lost");
                                transport.close().await;
                            }
                            LoopExit::Shutdown => {
                                self.teardown(Some(&mut transport), generation).await;
                                return;
                            }
                        }
                    }
                }
                Some(Established::AuthRejected(message)) => {
                    // Stale credentials are never retried silently
                    error!(generation, message = %message, "handshake rejected, credentials expired");
                    self.notifier
                        .error("Authentication expired, sign in again");
                    *self.expired.lock().expect("expiry flag poisoned") = Some(message);
                    self.teardown(None, generation).await;
                    return;
                }
                Some(Established::Failed(message)) => {
                    warn!(generation, message = %message, "connect failed");
                }
                // Close command arrived while connecting
                None => {
                    self.teardown(None, generation).await;
                    return;
                }
            }

            self.set_state(SessionState::Reconnecting);
            let delay = backoff + jitter();
            debug!(generation, ?delay, "reconnecting after backoff");
            if !self.backoff_sleep(delay).await {
                self.teardown(None, generation).await;
                return;
            }
            backoff = (backoff * 2).min(self.config.backoff_max);
        }
    }

    /// Open a transport and run the STOMP handshake, staying responsive to
    /// commands the whole time. Returns `None` when a close arrived.
    async fn establish(&mut self, generation: Generation) -> Option<Established> {
        let connector = self.connector.clone();
        let token = self.identity.token();
        let host = self.config.host.clone();
        let handshake_timeout = self.config.handshake_timeout;

        let establish = async move {
            let mut transport = match connector.connect().await {
                Ok(t) => t,
                Err(e) => return Established::Failed(e.to_string()),
            };

            let had_token = token.is_some();
            let connect_frame = StompFrame::connect(&host, token.as_deref());
            if let Err(e) = transport.send(connect_frame).await {
                return Established::Failed(e.to_string());
            }

            match timeout(handshake_timeout, await_handshake(&mut transport)).await {
                Ok(Handshake::Acked) => Established::Transport(transport),
                Ok(Handshake::Rejected(message)) => {
                    if had_token {
                        Established::AuthRejected(message)
                    } else {
                        Established::Failed(message)
                    }
                }
                Ok(Handshake::Lost(message)) => Established::Failed(message),
                Err(_) => Established::Failed("handshake timed out".to_string()),
            }
        };
        tokio::pin!(establish);

        loop {
            tokio::select! {
                outcome = &mut establish => return Some(outcome),
                cmd = self.cmd_rx.recv() => {
                    if self.offline_command(cmd).await {
                        return None;
                    }
                }
            }
        }
    }

    async fn subscribe_topics(
        &self,
        transport: &mut Box<dyn Transport>,
        generation: Generation,
    ) -> Result<()> {
        transport
            .send(StompFrame::subscribe(
                &subscription_id(generation, 0),
                protocol::PRIVATE_TOPIC,
            ))
            .await?;
        transport
            .send(StompFrame::subscribe(
                &subscription_id(generation, 1),
                protocol::PUBLIC_TOPIC,
            ))
            .await?;
        Ok(())
    }

    /// Main connected-phase loop: frames and commands, strictly serialized.
    async fn connected_loop(
        &mut self,
        transport: &mut Box<dyn Transport>,
        generation: Generation,
    ) -> LoopExit {
        loop {
            tokio::select! {
                event = transport.recv() => match event {
                    TransportEvent::Frame(frame) => {
                        match frame.command.as_str() {
                            CMD_MESSAGE => {
                                if let Err(e) = self.handle_message(transport, &frame, generation).await {
                                    // Protocol errors drop the frame, not the session
                                    warn!(error = %e, "inbound frame dropped");
                                }
                            }
                            CMD_ERROR => {
                                let message = frame
                                    .header("message")
                                    .unwrap_or("server error")
                                    .to_string();
                                return LoopExit::Reconnect(message);
                            }
                            other => debug!(command = other, "ignoring frame"),
                        }
                    }
                    TransportEvent::Dropped(e) => {
                        warn!(error = %e, "undecodable payload dropped");
                    }
                    TransportEvent::Closed(reason) => return LoopExit::Reconnect(reason),
                },
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(Command::Connect) => {
                        // Already connected: idempotent no-op
                    }
                    Some(Command::Send { text, reply }) => {
                        let result = self.publish_message(transport, &text).await;
                        let _ = reply.send(result);
                    }
                    Some(Command::RequestOlder { reply }) => {
                        let result = self.publish_older_request(transport).await;
                        let _ = reply.send(result);
                    }
                    Some(Command::Close) | None => return LoopExit::Shutdown,
                },
            }
        }
    }

    async fn handle_message(
        &mut self,
        transport: &mut Box<dyn Transport>,
        frame: &StompFrame,
        generation: Generation,
    ) -> Result<()> {
        // Frames from a previous connection generation are never applied
        if let Some(sub) = frame.header("subscription") {
            if !sub.starts_with(&format!("sub-{}-", generation)) {
                debug!(subscription = sub, generation, "stale-generation frame dropped");
                return Ok(());
            }
        }

        let result = {
            let mut roster = self.roster.write().await;
            let mut log = self.log.write().await;
            self.dispatcher.dispatch(frame, &mut roster, &mut log)?
        };

        for event in result.events {
            let _ = self.event_tx.send(event);
        }
        if let Some(request) = result.publish {
            transport.send(request).await?;
        }
        Ok(())
    }

    async fn publish_message(
        &mut self,
        transport: &mut Box<dyn Transport>,
        text: &str,
    ) -> Result<()> {
        let frame = self.outbound.prepare(SessionState::Connected, text)?;
        transport.send(frame).await
    }

    async fn publish_older_request(
        &mut self,
        transport: &mut Box<dyn Transport>,
    ) -> Result<bool> {
        let cursor = self.log.read().await.cursor().clone();
        if !cursor.has_more {
            return Ok(false);
        }
        let body = protocol::history_request_body(cursor.last_seen_id, self.config.page_size)?;
        transport
            .send(StompFrame::send(protocol::HISTORY_DESTINATION, body))
            .await?;
        Ok(true)
    }

    /// Handle a command while no connection is up. Returns true on close.
    async fn offline_command(&mut self, cmd: Option<Command>) -> bool {
        match cmd {
            Some(Command::Connect) => false,
            Some(Command::Send { text, reply }) => {
                let state = *self.state_tx.borrow();
                let _ = reply.send(self.outbound.prepare(state, &text).map(|_| ()));
                false
            }
            Some(Command::RequestOlder { reply }) => {
                let _ = reply.send(Err(ChatError::Validation(
                    "Not connected to the chat room".to_string(),
                )));
                false
            }
            Some(Command::Close) | None => true,
        }
    }

    /// Sleep through the reconnect backoff while staying responsive to
    /// commands. Returns false when a close arrived.
    async fn backoff_sleep(&mut self, delay: Duration) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => return true,
                cmd = self.cmd_rx.recv() => {
                    if self.offline_command(cmd).await {
                        return false;
                    }
                }
            }
        }
    }

    /// Unsubscribe, disconnect, close, mark terminal, fire logout hooks.
    async fn teardown(&mut self, transport: Option<&mut Box<dyn Transport>>, generation: Generation) {
        if let Some(transport) = transport {
            for index in 0..2 {
                let _ = transport
                    .send(StompFrame::unsubscribe(&subscription_id(generation, index)))
                    .await;
            }
            let _ = transport.send(StompFrame::disconnect()).await;
            transport.close().await;
        }
        self.set_state(SessionState::Closed);
        info!(generation, "chat session closed");

        let hooks = self.logout_hooks.lock().expect("logout hooks poisoned");
        for hook in hooks.iter() {
            hook();
        }
    }

    fn set_state(&self, state: SessionState) {
        debug!(state = state.as_str(), "session state");
        let _ = self.state_tx.send(state);
    }
}

enum Handshake {
    Acked,
    /// Server answered the CONNECT with an ERROR frame
    Rejected(String),
    Lost(String),
}

async fn await_handshake(transport: &mut Box<dyn Transport>) -> Handshake {
    loop {
        match transport.recv().await {
            TransportEvent::Frame(frame) => match frame.command.as_str() {
                CMD_CONNECTED => return Handshake::Acked,
                CMD_ERROR => {
                    let message = frame.header("message").unwrap_or("handshake rejected");
                    return Handshake::Rejected(message.to_string());
                }
                other => debug!(command = other, "ignoring pre-handshake frame"),
            },
            TransportEvent::Dropped(e) => {
                return Handshake::Lost(format!("undecodable handshake reply: {}", e))
            }
            TransportEvent::Closed(reason) => return Handshake::Lost(reason),
        }
    }
}

fn subscription_id(generation: Generation, index: u32) -> String {
    format!("sub-{}-{}", generation, index)
}

fn jitter() -> Duration {
    Duration::from_millis(rand::thread_rng().gen_range(0..100))
}
