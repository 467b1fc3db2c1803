//! Resolved caller identity and role resolution from stored nodes.

use crate::directory::DirectoryNode;
use crate::permissions::Role;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Legacy attribute flags honored when a node carries no explicit roles.
pub const ROLE_ATTRIBUTE: &str = "role";
pub const SUPER_ADMIN_ATTRIBUTE: &str = "isSuperAdmin";
pub const ADMIN_ATTRIBUTE: &str = "isAdmin";
pub const ADMIN_OF_ATTRIBUTE: &str = "adminOf";
pub const ROLES_ATTRIBUTE: &str = "roles";

/// Who is asking. Produced by a [`crate::credentials::CredentialService`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallerIdentity {
    pub id: u64,
    pub name: String,
    pub role: Role,
    #[serde(default)]
    pub roles: Vec<Role>,
    pub administers_node_id: Option<u64>,
    /// Caller's own path when the identity was resolved. The engine reloads
    /// it from the store before every decision.
    pub path: String,
}

impl CallerIdentity {
    /// Builds an identity from the caller's stored node.
    pub fn from_node(node: &DirectoryNode) -> Self {
        let role = resolve_role(node);
        Self {
            id: node.id,
            name: node.name.clone(),
            role,
            roles: node.roles.clone(),
            administers_node_id: resolve_administered_node(node, role),
            path: node.path.clone(),
        }
    }

    pub fn is_super_admin(&self) -> bool {
        self.role == Role::SuperAdmin
    }
}

/// Primary role of a node. Explicit roles win (highest rank); otherwise the
/// legacy attribute flags are consulted in order `role`, `isSuperAdmin`,
/// `isAdmin` + `adminOf`. Anything else is a plain `User`.
pub fn resolve_role(node: &DirectoryNode) -> Role {
    if let Some(role) = node.roles.iter().copied().max_by_key(Role::rank) {
        return role;
    }

    if let Some(role) = node
        .attribute_str(ROLE_ATTRIBUTE)
        .and_then(|value| value.parse::<Role>().ok())
    {
        return role;
    }
    if is_flag_set(node.attributes.get(SUPER_ADMIN_ATTRIBUTE)) {
        return Role::SuperAdmin;
    }
    if is_flag_set(node.attributes.get(ADMIN_ATTRIBUTE)) && admin_of_attribute(node).is_some() {
        return Role::OuAdmin;
    }
    Role::User
}

/// Administered node: the explicit field first, else the legacy `adminOf`
/// attribute when the resolved role is `OuAdmin`.
pub fn resolve_administered_node(node: &DirectoryNode, role: Role) -> Option<u64> {
    node.administers_node_id.or_else(|| {
        if role == Role::OuAdmin {
            admin_of_attribute(node)
        } else {
            None
        }
    })
}

pub(crate) fn is_flag_set(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(flag)) => *flag,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

pub(crate) fn parse_node_ref(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn admin_of_attribute(node: &DirectoryNode) -> Option<u64> {
    node.attributes.get(ADMIN_OF_ATTRIBUTE).and_then(parse_node_ref)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{Attributes, NodeKind};
    use chrono::Utc;
    use serde_json::json;

    fn principal(roles: Vec<Role>, attributes: Attributes) -> DirectoryNode {
        DirectoryNode {
            id: 9,
            name: "someone".to_string(),
            kind: NodeKind::Principal,
            attributes,
            credential_secret: None,
            roles,
            administers_node_id: None,
            path: "1.2.9.".to_string(),
            parent_id: Some(2),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn attrs(value: Value) -> Attributes {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_explicit_roles_take_highest_rank() {
        let node = principal(vec![Role::ReadOnly, Role::OuAdmin], Attributes::new());
        assert_eq!(resolve_role(&node), Role::OuAdmin);
    }

    #[test]
    fn test_explicit_roles_win_over_attributes() {
        let node = principal(vec![Role::ReadOnly], attrs(json!({"isSuperAdmin": true})));
        assert_eq!(resolve_role(&node), Role::ReadOnly);
    }

    #[test]
    fn test_legacy_attribute_order() {
        let node = principal(vec![], attrs(json!({"role": "READONLY", "isSuperAdmin": true})));
        assert_eq!(resolve_role(&node), Role::ReadOnly);

        let node = principal(vec![], attrs(json!({"isSuperAdmin": true})));
        assert_eq!(resolve_role(&node), Role::SuperAdmin);

        let node = principal(vec![], attrs(json!({"isAdmin": true, "adminOf": "2"})));
        assert_eq!(resolve_role(&node), Role::OuAdmin);
        assert_eq!(CallerIdentity::from_node(&node).administers_node_id, Some(2));

        let node = principal(vec![], attrs(json!({"isAdmin": true})));
        assert_eq!(resolve_role(&node), Role::User);
    }

    #[test]
    fn test_default_is_user() {
        let identity = CallerIdentity::from_node(&principal(vec![], Attributes::new()));
        assert_eq!(identity.role, Role::User);
        assert_eq!(identity.administers_node_id, None);
        assert_eq!(identity.path, "1.2.9.");
    }
}
