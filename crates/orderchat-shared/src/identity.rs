//! Identity tokens issued by the user/auth service.
//!
//! The auth service signs `(user_id, role, name, valid_until)` with its
//! Ed25519 key; clients present the token as a bearer credential on every
//! HTTP request and at the realtime handshake. The chat server only ever
//! verifies, it never issues (except in tests).

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::IdentityError;
use crate::types::AccountRole;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityToken {
    pub user_id: Uuid,
    pub name: String,
    pub role: AccountRole,
    pub valid_until: DateTime<Utc>,
    pub signature: Vec<u8>,
}

/// The authenticated caller, as extracted from a verified token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Uuid,
    pub name: String,
    pub role: AccountRole,
}

impl Identity {
    pub fn is_admin(&self) -> bool {
        self.role == AccountRole::Admin
    }
}

// payload = user_id || role || 0x00 || name || 0x00 || valid_until (rfc3339)
fn signing_payload(
    user_id: &Uuid,
    role: AccountRole,
    name: &str,
    valid_until: &DateTime<Utc>,
) -> Vec<u8> {
    let mut payload = Vec::with_capacity(64 + name.len());
    payload.extend_from_slice(user_id.as_bytes());
    payload.extend_from_slice(role.as_str().as_bytes());
    payload.push(0);
    payload.extend_from_slice(name.as_bytes());
    payload.push(0);
    payload.extend_from_slice(valid_until.to_rfc3339().as_bytes());
    payload
}

impl IdentityToken {
    /// Bearer form: base64url (no padding) of the JSON token.
    pub fn encode(&self) -> String {
        // Serializing plain owned fields cannot fail.
        let json = serde_json::to_vec(self).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    pub fn decode(bearer: &str) -> Result<Self, IdentityError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(bearer.trim())
            .map_err(|_| IdentityError::Malformed)?;
        serde_json::from_slice(&bytes).map_err(|_| IdentityError::Malformed)
    }
}

/// Verify a token against the auth server's public key at time `now`.
pub fn verify_identity_token(
    token: &IdentityToken,
    server_pubkey: &[u8; 32],
    now: DateTime<Utc>,
) -> Result<Identity, IdentityError> {
    if now > token.valid_until {
        return Err(IdentityError::Expired);
    }

    let verifying_key =
        VerifyingKey::from_bytes(server_pubkey).map_err(|_| IdentityError::InvalidServerKey)?;

    let signature =
        Signature::from_slice(&token.signature).map_err(|_| IdentityError::BadSignature)?;

    let payload = signing_payload(&token.user_id, token.role, &token.name, &token.valid_until);
    verifying_key
        .verify(&payload, &signature)
        .map_err(|_| IdentityError::BadSignature)?;

    Ok(Identity {
        user_id: token.user_id,
        name: token.name.clone(),
        role: token.role,
    })
}

/// Decode a bearer string and verify it in one step.
pub fn authenticate_bearer(
    bearer: &str,
    server_pubkey: &[u8; 32],
) -> Result<Identity, IdentityError> {
    let token = IdentityToken::decode(bearer)?;
    verify_identity_token(&token, server_pubkey, Utc::now())
}

pub fn create_identity_token(
    user_id: Uuid,
    name: &str,
    role: AccountRole,
    valid_until: DateTime<Utc>,
    server_signing_key: &ed25519_dalek::SigningKey,
) -> IdentityToken {
    use ed25519_dalek::Signer;

    let payload = signing_payload(&user_id, role, name, &valid_until);
    let signature = server_signing_key.sign(&payload);

    IdentityToken {
        user_id,
        name: name.to_string(),
        role,
        valid_until,
        signature: signature.to_bytes().to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use ed25519_dalek::SigningKey;
    use rand::rngs::OsRng;

    fn issue(key: &SigningKey, valid_for: Duration) -> IdentityToken {
        create_identity_token(
            Uuid::new_v4(),
            "Alice",
            AccountRole::Customer,
            Utc::now() + valid_for,
            key,
        )
    }

    #[test]
    fn test_identity_token_valid() {
        let server_key = SigningKey::generate(&mut OsRng);
        let server_pubkey = server_key.verifying_key().to_bytes();
        let token = issue(&server_key, Duration::hours(1));

        let identity = authenticate_bearer(&token.encode(), &server_pubkey).unwrap();
        assert_eq!(identity.user_id, token.user_id);
        assert_eq!(identity.name, "Alice");
        assert!(!identity.is_admin());
    }

    #[test]
    fn test_identity_token_expired() {
        let server_key = SigningKey::generate(&mut OsRng);
        let server_pubkey = server_key.verifying_key().to_bytes();
        let token = issue(&server_key, Duration::hours(-1));

        assert_eq!(
            verify_identity_token(&token, &server_pubkey, Utc::now()),
            Err(IdentityError::Expired)
        );
    }

    #[test]
    fn test_identity_token_wrong_server_key() {
        let server_key = SigningKey::generate(&mut OsRng);
        let wrong_pubkey = SigningKey::generate(&mut OsRng).verifying_key().to_bytes();
        let token = issue(&server_key, Duration::hours(1));

        assert_eq!(
            verify_identity_token(&token, &wrong_pubkey, Utc::now()),
            Err(IdentityError::BadSignature)
        );
    }

    #[test]
    fn test_identity_token_tampered_role() {
        let server_key = SigningKey::generate(&mut OsRng);
        let server_pubkey = server_key.verifying_key().to_bytes();
        let mut token = issue(&server_key, Duration::hours(1));
        token.role = AccountRole::Admin;

        assert_eq!(
            verify_identity_token(&token, &server_pubkey, Utc::now()),
            Err(IdentityError::BadSignature)
        );
    }

    #[test]
    fn test_garbage_bearer_is_malformed() {
        let server_pubkey = SigningKey::generate(&mut OsRng).verifying_key().to_bytes();
        assert_eq!(
            authenticate_bearer("not a token!", &server_pubkey),
            Err(IdentityError::Malformed)
        );
    }
}
