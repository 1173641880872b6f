//! Request authentication.
//!
//! Bearer identity tokens are verified against the auth service's Ed25519
//! key. Verified display names are mirrored into the users directory so
//! rooms can show them; a small cache keeps that to one write per name
//! change.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use orderchat_shared::identity::{authenticate_bearer, Identity};
use orderchat_shared::ChatError;
use orderchat_store::SharedDatabase;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::error::ServerError;

#[derive(Clone)]
pub struct Authenticator {
    /// The auth service's Ed25519 public key.
    server_pubkey: [u8; 32],
    db: SharedDatabase,
    /// user_id -> last display name written to the directory.
    known_names: Arc<RwLock<HashMap<Uuid, String>>>,
}

impl Authenticator {
    pub fn new(server_pubkey: [u8; 32], db: SharedDatabase) -> Self {
        Self {
            server_pubkey,
            db,
            known_names: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Verify a bearer token and return the caller.
    pub async fn authenticate(&self, bearer: &str) -> Result<Identity, ChatError> {
        let identity = authenticate_bearer(bearer, &self.server_pubkey).map_err(|e| {
            debug!(error = %e, "Identity token rejected");
            ChatError::Unauthenticated
        })?;

        self.remember_name(&identity).await;
        Ok(identity)
    }

    async fn remember_name(&self, identity: &Identity) {
        {
            let names = self.known_names.read().await;
            if names.get(&identity.user_id) == Some(&identity.name) {
                return;
            }
        }

        let (user_id, name) = (identity.user_id, identity.name.clone());
        let stored = {
            let name = name.clone();
            self.db.call(move |db| db.upsert_user(user_id, &name)).await
        };
        match stored {
            Ok(()) => {
                self.known_names.write().await.insert(user_id, name);
            }
            Err(e) => warn!(user = %user_id, error = %e, "Failed to record display name"),
        }
    }

    #[cfg(test)]
    pub async fn known_users(&self) -> usize {
        self.known_names.read().await.len()
    }
}

/// The credential from `Authorization: Bearer <token>`, if present.
pub fn bearer_from_headers(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Reject unauthenticated requests; on success the [`Identity`] is
/// available to handlers as an `Extension`.
pub async fn require_auth(
    State(auth): State<Authenticator>,
    mut req: Request,
    next: Next,
) -> Result<Response, ServerError> {
    let bearer = bearer_from_headers(req.headers()).ok_or(ChatError::Unauthenticated)?;
    let identity = auth.authenticate(bearer).await?;
    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}

/// Gate for the internal event ingestion endpoint. A missing or wrong token
/// is unauthenticated; ingestion switched off entirely is forbidden.
pub fn verify_admin_token(headers: &HeaderMap, config: &ServerConfig) -> Result<(), ServerError> {
    let Some(ref expected) = config.admin_token else {
        return Err(ServerError::Forbidden(
            "Event ingestion is disabled (no ADMIN_TOKEN configured)".into(),
        ));
    };

    let token = bearer_from_headers(headers).unwrap_or("");

    use subtle::ConstantTimeEq;
    let token_bytes = token.as_bytes();
    let expected_bytes = expected.as_bytes();
    if token_bytes.len() != expected_bytes.len()
        || token_bytes.ct_eq(expected_bytes).unwrap_u8() != 1
    {
        return Err(ServerError::Unauthorized("Invalid admin token".into()));
    }

    Ok(())
}
