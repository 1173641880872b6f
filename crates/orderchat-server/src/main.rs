//! # orderchat-server
//!
//! Order-scoped chat between a customer and the store fulfilling the order.
//!
//! This binary provides:
//! - **REST API** (axum) for rooms, message history, read receipts, room
//!   closing, store/admin system messages and per-user stats
//! - **WebSocket transport** with per-order groups, typing indicators and
//!   live message fan-out
//! - **Order event ingestion** that narrates order lifecycle changes into
//!   each room as system messages
//! - **Per-IP and per-sender rate limiting** to protect against abuse

mod api;
mod auth;
mod config;
mod error;
mod messaging;
mod notify;
mod order_events;
mod rate_limit;
mod realtime;
mod rooms;
mod system_messages;
mod ws;

#[cfg(test)]
mod testutil;

use std::sync::Arc;
use std::time::Duration;

use orderchat_store::{Database, SharedDatabase};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::api::AppState;
use crate::config::ServerConfig;
use crate::notify::LogNotifier;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,orderchat_server=debug")),
        )
        .init();

    info!("Starting order chat server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(
        addr = %config.http_addr,
        database = %config.database_path.display(),
        event_ingestion = config.admin_token.is_some(),
        block_closed_rooms = config.block_sends_on_closed_rooms,
        max_message_length = config.max_message_length,
        "Loaded configuration"
    );
    if config.auth_server_pubkey == [0u8; 32] {
        tracing::warn!("AUTH_SERVER_PUBKEY not set, every identity token will be rejected");
    }

    // -----------------------------------------------------------------------
    // 3. Open the database and wire components
    // -----------------------------------------------------------------------
    let db = SharedDatabase::new(Database::open_at(&config.database_path)?);
    let http_addr = config.http_addr;
    let state = AppState::new(config, db, Arc::new(LogNotifier));

    // -----------------------------------------------------------------------
    // 4. Spawn background tasks
    // -----------------------------------------------------------------------

    // Order lifecycle events -> system messages
    let _listener =
        order_events::spawn_listener(state.order_handler.clone(), state.order_events.subscribe());

    // Periodic rate limiter cleanup (every 5 minutes, evict buckets idle >10 min)
    let ip_limiter = state.ip_limiter.clone();
    let sender_limiter = state.sender_limiter.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(300));
        loop {
            interval.tick().await;
            ip_limiter.purge_stale(600.0).await;
            sender_limiter.purge_stale(600.0).await;
        }
    });

    // -----------------------------------------------------------------------
    // 5. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(state, http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
