use crate::error::{DirectoryError, DirectoryResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a request was denied. Each reason maps to one error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DenyReason {
    AuthRequired,
    RoleInsufficient,
    ScopeViolation,
    AncestorEditForbidden,
    EscalationDenied,
}

impl DenyReason {
    pub fn code(&self) -> &'static str {
        match self {
            DenyReason::AuthRequired => "AUTH_REQUIRED",
            DenyReason::RoleInsufficient => "ROLE_INSUFFICIENT",
            DenyReason::ScopeViolation => "SCOPE_VIOLATION",
            DenyReason::AncestorEditForbidden => "ANCESTOR_EDIT_FORBIDDEN",
            DenyReason::EscalationDenied => "ESCALATION_DENIED",
        }
    }

    pub fn into_error(self, detail: impl Into<String>) -> DirectoryError {
        let detail = detail.into();
        match self {
            DenyReason::AuthRequired => DirectoryError::AuthRequired(detail),
            DenyReason::RoleInsufficient => DirectoryError::RoleInsufficient(detail),
            DenyReason::ScopeViolation => DirectoryError::ScopeViolation(detail),
            DenyReason::AncestorEditForbidden => DirectoryError::AncestorEditForbidden(detail),
            DenyReason::EscalationDenied => DirectoryError::EscalationDenied(detail),
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    Allow,
    Deny { reason: DenyReason, detail: String },
}

impl Decision {
    pub fn deny(reason: DenyReason, detail: impl Into<String>) -> Self {
        Decision::Deny {
            reason,
            detail: detail.into(),
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    pub fn reason(&self) -> Option<DenyReason> {
        match self {
            Decision::Allow => None,
            Decision::Deny { reason, .. } => Some(*reason),
        }
    }

    pub fn into_result(self) -> DirectoryResult<()> {
        match self {
            Decision::Allow => Ok(()),
            Decision::Deny { reason, detail } => Err(reason.into_error(detail)),
        }
    }
}

/// Pipeline stages, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    Identity,
    Role,
    Scope,
    Escalation,
}

/// A decision plus the stages that ran to reach it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub decision: Decision,
    pub stages: Vec<Stage>,
}
