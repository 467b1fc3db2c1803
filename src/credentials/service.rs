use crate::auth::identity::CallerIdentity;
use crate::credentials::token::{ClaimSigner, IdentityClaims};
use crate::directory::{DirectoryNode, DirectoryStore};
use crate::error::{DirectoryError, DirectoryResult};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

/// A token together with the claims it encodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedClaims {
    pub token: String,
    pub claims: IdentityClaims,
}

/// Validates credentials and turns tokens back into caller identities.
pub trait CredentialService: Send + Sync {
    /// Returns the principal (without its secret) when `secret` matches.
    fn verify_credentials(&self, username: &str, secret: &str) -> DirectoryResult<Option<DirectoryNode>>;

    fn issue_claims(&self, node: &DirectoryNode) -> DirectoryResult<SignedClaims>;

    /// Decodes a token into the caller's current identity.
    fn resolve(&self, token: &str) -> DirectoryResult<CallerIdentity>;
}

/// Default credential service: Argon2id secrets in the tree store and
/// Ed25519-signed claims.
pub struct DirectoryCredentials {
    store: DirectoryStore,
    signer: ClaimSigner,
}

impl DirectoryCredentials {
    pub fn new(store: DirectoryStore, signer: ClaimSigner) -> Self {
        Self { store, signer }
    }

    pub fn signer(&self) -> &ClaimSigner {
        &self.signer
    }
}

impl CredentialService for DirectoryCredentials {
    fn verify_credentials(&self, username: &str, secret: &str) -> DirectoryResult<Option<DirectoryNode>> {
        let Some(node) = self.store.find_principal_by_name_with_secret(username)? else {
            debug!("No principal named '{}'", username);
            return Ok(None);
        };
        let Some(hashed) = node.credential_secret.as_deref() else {
            debug!("Principal '{}' has no secret set", username);
            return Ok(None);
        };

        if self.store.hasher().verify(secret, hashed)? {
            Ok(Some(node.redacted()))
        } else {
            warn!("Secret mismatch for principal '{}'", username);
            Ok(None)
        }
    }

    fn issue_claims(&self, node: &DirectoryNode) -> DirectoryResult<SignedClaims> {
        if !node.is_principal() {
            return Err(DirectoryError::invalid_operation(format!(
                "claims can only be issued for principals, '{}' is a {}",
                node.name, node.kind
            )));
        }
        let identity = CallerIdentity::from_node(node);
        let (token, claims) = self.signer.sign(IdentityClaims {
            sub: identity.name,
            id: identity.id,
            role: identity.role,
            roles: identity.roles,
            administers_node_id: identity.administers_node_id,
            path: identity.path,
            iat: 0,
            exp: 0,
        })?;
        Ok(SignedClaims { token, claims })
    }

    /// Role, administered node and path come from the stored node, not the
    /// token, so role changes and moves apply to live sessions.
    fn resolve(&self, token: &str) -> DirectoryResult<CallerIdentity> {
        let claims = self.signer.verify(token)?;
        let node = self.store.find_by_id(claims.id)?.ok_or_else(|| {
            DirectoryError::AuthRequired(format!("principal {} no longer exists", claims.id))
        })?;
        if !node.is_principal() || node.name != claims.sub {
            return Err(DirectoryError::InvalidToken(format!(
                "token subject '{}' does not match node {}",
                claims.sub, claims.id
            )));
        }
        Ok(CallerIdentity::from_node(&node))
    }
}
