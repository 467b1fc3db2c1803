use crate::auth::CallerIdentity;
use crate::directory::{DirectoryNode, NodeKind};
use crate::permissions::Role;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Create,
    Read,
    Update,
    Delete,
    Move,
    Login,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "CREATE",
            AuditAction::Read => "READ",
            AuditAction::Update => "UPDATE",
            AuditAction::Delete => "DELETE",
            AuditAction::Move => "MOVE",
            AuditAction::Login => "LOGIN",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditStatus {
    Success,
    Failed,
    Denied,
}

impl fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AuditStatus::Success => "SUCCESS",
            AuditStatus::Failed => "FAILED",
            AuditStatus::Denied => "DENIED",
        })
    }
}

/// Network context of the request, when the transport knows it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientContext {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// One audit record: who did what to which node, within which scope, and how
/// it ended. Built once and never mutated after it reaches a sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: Uuid,
    pub actor_id: Option<u64>,
    pub actor_name: String,
    pub actor_role: Option<Role>,
    pub action: AuditAction,
    pub target_id: Option<u64>,
    pub target_name: Option<String>,
    pub target_kind: Option<NodeKind>,
    /// Caller's effective path when the action happened
    pub scope: Option<String>,
    #[serde(default)]
    pub metadata: Value,
    #[serde(default)]
    pub client: ClientContext,
    pub status: AuditStatus,
    pub error_message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(action: AuditAction, actor_name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            actor_id: None,
            actor_name: actor_name.into(),
            actor_role: None,
            action,
            target_id: None,
            target_name: None,
            target_kind: None,
            scope: None,
            metadata: Value::Null,
            client: ClientContext::default(),
            status: AuditStatus::Success,
            error_message: None,
            timestamp: Utc::now(),
        }
    }

    /// Event attributed to a resolved caller.
    pub fn by(action: AuditAction, caller: &CallerIdentity) -> Self {
        Self {
            actor_id: Some(caller.id),
            actor_role: Some(caller.role),
            ..Self::new(action, caller.name.clone())
        }
    }

    pub fn target(mut self, node: &DirectoryNode) -> Self {
        self.target_id = Some(node.id);
        self.target_name = Some(node.name.clone());
        self.target_kind = Some(node.kind);
        self
    }

    /// Target known only by id, e.g. a node that failed to load.
    pub fn target_id(mut self, id: u64) -> Self {
        self.target_id = Some(id);
        self
    }

    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn client(mut self, client: ClientContext) -> Self {
        self.client = client;
        self
    }

    pub fn failed(mut self, message: impl Into<String>) -> Self {
        self.status = AuditStatus::Failed;
        self.error_message = Some(message.into());
        self
    }

    pub fn denied(mut self, message: impl Into<String>) -> Self {
        self.status = AuditStatus::Denied;
        self.error_message = Some(message.into());
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == AuditStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builder_fills_actor_and_status() {
        let caller = CallerIdentity {
            id: 4,
            name: "admin_ops".to_string(),
            role: Role::OuAdmin,
            roles: vec![Role::OuAdmin],
            administers_node_id: Some(2),
            path: "1.2.4.".to_string(),
        };
        let event = AuditEvent::by(AuditAction::Move, &caller)
            .target_id(9)
            .scope("1.2.")
            .metadata(json!({"new_parent_id": 3}))
            .denied("SCOPE_VIOLATION");

        assert_eq!(event.actor_id, Some(4));
        assert_eq!(event.actor_role, Some(Role::OuAdmin));
        assert_eq!(event.status, AuditStatus::Denied);
        assert_eq!(event.scope.as_deref(), Some("1.2."));
        assert!(!event.is_success());
    }

    #[test]
    fn test_serialized_codes() {
        let event = AuditEvent::new(AuditAction::Login, "ghost").failed("bad secret");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["action"], "LOGIN");
        assert_eq!(json["status"], "FAILED");
    }
}
