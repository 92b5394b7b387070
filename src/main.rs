//! Parlor - terminal chat room client
//!
//! Connects to the chat STOMP endpoint, prints the reconciled message log
//! and roster changes, and sends lines read from stdin.

use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use parlor::{
    Args, AuthContext, ChatClient, ChatEvent, IdentityProvider, SessionState, TracingNotifier,
    UserIdentity, WsConnector,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("parlor={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = args.validate() {
        error!("{}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  Parlor - chat room client");
    info!("======================================");
    info!("Endpoint: {}", args.chat_url);
    info!(
        "Identity: {}",
        if args.token.is_some() {
            args.nickname.as_deref().unwrap_or("authenticated")
        } else {
            "anonymous"
        }
    );
    info!("Page size: {}", args.page_size);
    info!("======================================");

    let identity = match &args.token {
        Some(token) => AuthContext::authenticated(
            token.clone(),
            UserIdentity {
                nickname: args.nickname.clone(),
                email: args.email.clone(),
            },
        ),
        None => AuthContext::anonymous(),
    };
    let me = identity.current_user();

    let client = ChatClient::spawn(
        Arc::new(WsConnector::new(args.chat_url.clone())),
        args.session_config(),
        Arc::new(identity),
        Arc::new(TracingNotifier),
    );
    client.on_logout(|| info!("session closed, goodbye"));

    // Print connection-indicator changes
    let mut state_rx = client.watch_state();
    tokio::spawn(async move {
        while state_rx.changed().await.is_ok() {
            let state = *state_rx.borrow();
            info!("connection: {}", state.as_str());
            if state == SessionState::Closed {
                break;
            }
        }
    });

    // Print chat events as they arrive
    let mut events = client.subscribe();
    let event_client = client.clone();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(ChatEvent::MessageReceived(msg)) => {
                    let who = if me.as_ref().is_some_and(|id| msg.is_authored_by(id)) {
                        "you".to_string()
                    } else {
                        format!(
                            "{}#{}",
                            msg.creator_name.as_deref().unwrap_or("?"),
                            msg.creator_id
                        )
                    };
                    println!("[{}] {}: {}", msg.create_date, who, msg.content.text);
                }
                Ok(ChatEvent::HistoryMerged { inserted, has_more }) => {
                    println!("--- {} older messages loaded (more: {}) ---", inserted, has_more);
                    for msg in event_client.messages().await {
                        println!(
                            "[{}] {}#{}: {}",
                            msg.create_date,
                            msg.creator_name.as_deref().unwrap_or("?"),
                            msg.creator_id,
                            msg.content.text
                        );
                    }
                }
                Ok(ChatEvent::RosterSnapshot { online }) => {
                    let named = event_client.roster().await.len();
                    println!("--- {} online ({} named, {} anonymous) ---",
                        online, named, event_client.anonymous_count().await);
                }
                Ok(ChatEvent::UserJoined(user)) => {
                    println!("--- {} joined ---", user.nickname);
                }
                Ok(ChatEvent::UserLeft(id)) => {
                    println!("--- user #{} left ---", id);
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    info!("event stream lagged by {}", n);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // Read stdin lines and publish them
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if line.trim() == "/quit" {
            break;
        }
        if line.trim() == "/older" {
            match client.request_older().await {
                Ok(true) => {}
                Ok(false) => println!("--- no more history ---"),
                Err(e) => error!("history request failed: {}", e),
            }
            continue;
        }
        if let Err(e) = client.send(line).await {
            // Validation errors were already surfaced through the notifier
            error!("send rejected: {}", e);
        }
    }

    client.close().await;
    Ok(())
}
