//! Ed25519-signed identity claims.
//!
//! A token is `base64url(json claims) "." base64url(signature)`. The signature
//! covers the encoded claims segment exactly as transmitted.

use crate::error::{DirectoryError, DirectoryResult};
use crate::permissions::Role;
use base64::{engine::general_purpose, Engine as _};
use chrono::Utc;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

/// Claims carried inside a signed token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityClaims {
    /// Principal name
    pub sub: String,
    pub id: u64,
    pub role: Role,
    #[serde(default)]
    pub roles: Vec<Role>,
    #[serde(default)]
    pub administers_node_id: Option<u64>,
    /// Path at issue time. Informational only; authorization reloads it.
    pub path: String,
    pub iat: i64,
    pub exp: i64,
}

impl IdentityClaims {
    pub fn is_expired_at(&self, now: i64) -> bool {
        now >= self.exp
    }
}

/// Signs and verifies [`IdentityClaims`].
pub struct ClaimSigner {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
    ttl_secs: i64,
}

impl ClaimSigner {
    /// Fresh random key, suitable for a single process lifetime.
    pub fn generate(ttl_secs: i64) -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        let verifying_key = signing_key.verifying_key();
        Self {
            signing_key,
            verifying_key,
            ttl_secs,
        }
    }

    /// Deterministic key from 32 secret bytes, so tokens survive restarts.
    pub fn from_secret_bytes(secret: &[u8], ttl_secs: i64) -> DirectoryResult<Self> {
        let key_bytes: [u8; 32] = secret
            .try_into()
            .map_err(|_| DirectoryError::Config("Signing secret must be 32 bytes".to_string()))?;
        let signing_key = SigningKey::from_bytes(&key_bytes);
        let verifying_key = signing_key.verifying_key();
        Ok(Self {
            signing_key,
            verifying_key,
            ttl_secs,
        })
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.verifying_key
    }

    pub fn ttl_secs(&self) -> i64 {
        self.ttl_secs
    }

    /// Stamps `iat`/`exp` and returns the encoded token.
    pub fn sign(&self, mut claims: IdentityClaims) -> DirectoryResult<(String, IdentityClaims)> {
        let now = Utc::now().timestamp();
        claims.iat = now;
        claims.exp = now + self.ttl_secs;

        let payload = general_purpose::URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?);
        let signature = self.signing_key.sign(payload.as_bytes());
        let token = format!(
            "{}.{}",
            payload,
            general_purpose::URL_SAFE_NO_PAD.encode(signature.to_bytes())
        );
        Ok((token, claims))
    }

    /// Checks signature and expiry, returning the embedded claims.
    pub fn verify(&self, token: &str) -> DirectoryResult<IdentityClaims> {
        let (payload, signature) = token
            .split_once('.')
            .ok_or_else(|| DirectoryError::InvalidToken("Malformed token".to_string()))?;

        let signature_bytes = general_purpose::URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|e| DirectoryError::InvalidToken(format!("Bad signature encoding: {}", e)))?;
        let signature = Signature::from_slice(&signature_bytes)
            .map_err(|e| DirectoryError::InvalidToken(format!("Bad signature: {}", e)))?;
        self.verifying_key
            .verify(payload.as_bytes(), &signature)
            .map_err(|_| DirectoryError::InvalidToken("Signature verification failed".to_string()))?;

        let claims_bytes = general_purpose::URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|e| DirectoryError::InvalidToken(format!("Bad claims encoding: {}", e)))?;
        let claims: IdentityClaims = serde_json::from_slice(&claims_bytes)
            .map_err(|e| DirectoryError::InvalidToken(format!("Bad claims: {}", e)))?;

        if claims.is_expired_at(Utc::now().timestamp()) {
            return Err(DirectoryError::InvalidToken("Token expired".to_string()));
        }
        Ok(claims)
    }
}
