//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;

use orderchat_shared::constants::{
    DEFAULT_HTTP_PORT, DEFAULT_MAX_MESSAGE_LENGTH, DEFAULT_OUTBOUND_BUFFER,
};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP and websocket server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// SQLite database file.
    /// Env: `DATABASE_PATH`
    /// Default: `./data/orderchat.db`
    pub database_path: PathBuf,

    /// Ed25519 public key of the auth service (hex-encoded, 64 chars).
    /// Env: `AUTH_SERVER_PUBKEY`
    /// Default: all-zeros, which rejects every token (development only).
    pub auth_server_pubkey: [u8; 32],

    /// Bearer token the order lifecycle service uses to push events.
    /// Env: `ADMIN_TOKEN`
    /// Default: empty (event ingestion disabled).
    pub admin_token: Option<String>,

    /// Maximum message body length in characters.
    /// Env: `MAX_MESSAGE_LENGTH`
    /// Default: `1000`
    pub max_message_length: usize,

    /// Reject sends into closed rooms.
    /// Env: `BLOCK_SENDS_ON_CLOSED_ROOMS` (true/false)
    /// Default: `false`
    pub block_sends_on_closed_rooms: bool,

    /// Sustained messages per second allowed per sender.
    /// Env: `MESSAGE_RATE_PER_SEC`
    /// Default: `5`
    pub message_rate_per_sec: f64,

    /// Message burst allowed per sender.
    /// Env: `MESSAGE_BURST`
    /// Default: `20`
    pub message_burst: f64,

    /// Per-connection outbound event queue depth.
    /// Env: `OUTBOUND_BUFFER`
    /// Default: `256`
    pub outbound_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            database_path: PathBuf::from("./data/orderchat.db"),
            auth_server_pubkey: [0u8; 32],
            admin_token: None,
            max_message_length: DEFAULT_MAX_MESSAGE_LENGTH,
            block_sends_on_closed_rooms: false,
            message_rate_per_sec: 5.0,
            message_burst: 20.0,
            outbound_buffer: DEFAULT_OUTBOUND_BUFFER,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = lookup("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        if let Some(path) = lookup("DATABASE_PATH") {
            config.database_path = PathBuf::from(path);
        }

        if let Some(hex_key) = lookup("AUTH_SERVER_PUBKEY") {
            match parse_hex_pubkey(&hex_key) {
                Ok(key) => config.auth_server_pubkey = key,
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        "Invalid AUTH_SERVER_PUBKEY, using default (dev-only)"
                    );
                }
            }
        }

        if let Some(token) = lookup("ADMIN_TOKEN") {
            if !token.is_empty() {
                config.admin_token = Some(token);
            }
        }

        if let Some(val) = lookup("MAX_MESSAGE_LENGTH") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.max_message_length = n,
                _ => tracing::warn!(value = %val, "Invalid MAX_MESSAGE_LENGTH, using default"),
            }
        }

        if let Some(val) = lookup("BLOCK_SENDS_ON_CLOSED_ROOMS") {
            config.block_sends_on_closed_rooms = val == "true" || val == "1";
        }

        if let Some(val) = lookup("MESSAGE_RATE_PER_SEC") {
            match val.parse::<f64>() {
                Ok(n) if n > 0.0 => config.message_rate_per_sec = n,
                _ => tracing::warn!(value = %val, "Invalid MESSAGE_RATE_PER_SEC, using default"),
            }
        }

        if let Some(val) = lookup("MESSAGE_BURST") {
            match val.parse::<f64>() {
                Ok(n) if n >= 1.0 => config.message_burst = n,
                _ => tracing::warn!(value = %val, "Invalid MESSAGE_BURST, using default"),
            }
        }

        if let Some(val) = lookup("OUTBOUND_BUFFER") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.outbound_buffer = n,
                _ => tracing::warn!(value = %val, "Invalid OUTBOUND_BUFFER, using default"),
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }
}

/// Parse a 64-character hex string into a 32-byte array.
fn parse_hex_pubkey(hex_str: &str) -> Result<[u8; 32], String> {
    let hex_str = hex_str.trim();
    if hex_str.len() != 64 {
        return Err(format!("expected 64 hex chars, got {}", hex_str.len()));
    }

    let bytes = hex::decode(hex_str).map_err(|e| format!("invalid hex: {e}"))?;
    let mut key = [0u8; 32];
    key.copy_from_slice(&bytes);
    Ok(key)
}
