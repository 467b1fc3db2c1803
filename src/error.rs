//! Unified error handling for the directory and its authorization engine.
//!
//! Every failure carries a stable, programmatic code (see
//! [`DirectoryError::error_code`]) plus a human-readable detail. Details may
//! include materialized paths, which are only disclosed to callers that have
//! already been authenticated.

use thiserror::Error;

/// Errors raised by the tree store, the authorization engine and the
/// collaborators wired around them.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// A referenced node or parent does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Duplicate sibling name
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Structural violation, e.g. a principal owning children
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// No resolved caller identity
    #[error("Authentication required: {0}")]
    AuthRequired(String),

    /// The caller's role does not hold the requested permission
    #[error("Role insufficient: {0}")]
    RoleInsufficient(String),

    /// The target lies outside the caller's effective scope
    #[error("Scope violation: {0}")]
    ScopeViolation(String),

    /// The target is a strict ancestor of the caller's effective scope
    #[error("Ancestor edit forbidden: {0}")]
    AncestorEditForbidden(String),

    /// The operation would grant privileges beyond the caller's own
    #[error("Escalation denied: {0}")]
    EscalationDenied(String),

    /// Operation authorized but not implemented by the store
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// Malformed materialized path
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Claim token failed decoding, signature or expiry checks
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// Backing store failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// The tree changed between authorizing a mutation and applying it
    #[error("Stale authorization: {0}")]
    StaleAuthorization(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Secret hashing or verification failure
    #[error("Hashing error: {0}")]
    Hashing(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl DirectoryError {
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict<S: Into<String>>(msg: S) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn invalid_operation<S: Into<String>>(msg: S) -> Self {
        Self::InvalidOperation(msg.into())
    }

    pub fn storage<S: Into<String>>(msg: S) -> Self {
        Self::Storage(msg.into())
    }

    pub fn invalid_path<S: Into<String>>(msg: S) -> Self {
        Self::InvalidPath(msg.into())
    }

    /// Get error code for programmatic error handling
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::InvalidOperation(_) => "INVALID_OPERATION",
            Self::AuthRequired(_) => "AUTH_REQUIRED",
            Self::RoleInsufficient(_) => "ROLE_INSUFFICIENT",
            Self::ScopeViolation(_) => "SCOPE_VIOLATION",
            Self::AncestorEditForbidden(_) => "ANCESTOR_EDIT_FORBIDDEN",
            Self::EscalationDenied(_) => "ESCALATION_DENIED",
            Self::NotImplemented(_) => "NOT_IMPLEMENTED",
            Self::InvalidPath(_) => "INVALID_PATH",
            Self::InvalidToken(_) => "INVALID_TOKEN",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::StaleAuthorization(_) => "STALE_AUTHORIZATION",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Hashing(_) => "HASHING_ERROR",
            Self::Config(_) => "CONFIGURATION_ERROR",
        }
    }

    /// Backing-store failures and stale authorizations are transient.
    /// Callers retry the whole operation, authorization included.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::StaleAuthorization(_))
    }

    /// True for the policy denials produced by the authorization pipeline.
    pub fn is_denial(&self) -> bool {
        matches!(
            self,
            Self::AuthRequired(_)
                | Self::RoleInsufficient(_)
                | Self::ScopeViolation(_)
                | Self::AncestorEditForbidden(_)
                | Self::EscalationDenied(_)
        )
    }
}

impl From<sled::Error> for DirectoryError {
    fn from(error: sled::Error) -> Self {
        DirectoryError::Storage(error.to_string())
    }
}

impl From<sled::transaction::TransactionError<DirectoryError>> for DirectoryError {
    fn from(error: sled::transaction::TransactionError<DirectoryError>) -> Self {
        match error {
            sled::transaction::TransactionError::Abort(inner) => inner,
            sled::transaction::TransactionError::Storage(e) => DirectoryError::Storage(e.to_string()),
        }
    }
}

impl From<toml::de::Error> for DirectoryError {
    fn from(error: toml::de::Error) -> Self {
        DirectoryError::Config(error.to_string())
    }
}

impl From<std::io::Error> for DirectoryError {
    fn from(error: std::io::Error) -> Self {
        DirectoryError::Config(error.to_string())
    }
}

/// Result type for directory operations
pub type DirectoryResult<T> = Result<T, DirectoryError>;
