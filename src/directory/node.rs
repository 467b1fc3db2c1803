//! Directory node model.

use crate::path;
use crate::permissions::Role;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Schema-free attribute bag (email, display name, legacy role hints, ...).
pub type Attributes = serde_json::Map<String, Value>;

/// Attribute key searched alongside the node name.
pub const EMAIL_ATTRIBUTE: &str = "email";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeKind {
    /// Domain component, e.g. `com` or `acme`
    Domain,
    /// Organizational unit
    #[default]
    Unit,
    /// Security group
    Group,
    /// Authenticable identity; always a leaf
    Principal,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Domain => "DOMAIN",
            NodeKind::Unit => "UNIT",
            NodeKind::Group => "GROUP",
            NodeKind::Principal => "PRINCIPAL",
        }
    }

    pub fn can_own_children(&self) -> bool {
        !matches!(self, NodeKind::Principal)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeKind {
    type Err = String;

    /// Accepts the LDAP-flavoured aliases (`DC`, `OU`, `USER`) as well.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DOMAIN" | "DC" => Ok(NodeKind::Domain),
            "UNIT" | "OU" => Ok(NodeKind::Unit),
            "GROUP" => Ok(NodeKind::Group),
            "PRINCIPAL" | "USER" => Ok(NodeKind::Principal),
            other => Err(format!("unknown node kind '{}'", other)),
        }
    }
}

/// A node of the directory hierarchy as persisted by the tree store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryNode {
    pub id: u64,
    pub name: String,
    pub kind: NodeKind,
    #[serde(default)]
    pub attributes: Attributes,
    /// Hashed secret, principals only. Stripped from every default read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_secret: Option<String>,
    #[serde(default)]
    pub roles: Vec<Role>,
    #[serde(default)]
    pub administers_node_id: Option<u64>,
    /// Materialized path, e.g. `"1.2.5."`. Maintained by the store.
    pub path: String,
    pub parent_id: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DirectoryNode {
    pub fn is_principal(&self) -> bool {
        self.kind == NodeKind::Principal
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn depth(&self) -> usize {
        path::depth(&self.path)
    }

    pub fn attribute_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }

    pub fn email(&self) -> Option<&str> {
        self.attribute_str(EMAIL_ATTRIBUTE)
    }

    /// Case-insensitive substring match on the name or the email attribute.
    pub fn matches_term(&self, term: &str) -> bool {
        let needle = term.to_lowercase();
        self.name.to_lowercase().contains(&needle)
            || self
                .email()
                .is_some_and(|email| email.to_lowercase().contains(&needle))
    }

    /// Merges `patch` into the attributes. A `null` value removes the key.
    pub fn merge_attributes(&mut self, patch: Attributes) {
        for (key, value) in patch {
            if value.is_null() {
                self.attributes.remove(&key);
            } else {
                self.attributes.insert(key, value);
            }
        }
    }

    /// Copy of the node without its secret material.
    #[must_use]
    pub fn redacted(mut self) -> Self {
        self.credential_secret = None;
        self
    }
}

/// Input for [`crate::directory::DirectoryStore::create`].
#[derive(Debug, Clone, Default)]
pub struct NewNode {
    pub name: String,
    pub kind: NodeKind,
    pub parent_id: Option<u64>,
    pub attributes: Attributes,
    /// Plain or already-hashed secret; only kept for principals.
    pub secret: Option<String>,
    pub roles: Vec<Role>,
    pub administers_node_id: Option<u64>,
}

impl NewNode {
    pub fn new(name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            ..Default::default()
        }
    }

    pub fn under(mut self, parent_id: u64) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn with_attribute(mut self, key: &str, value: Value) -> Self {
        self.attributes.insert(key.to_string(), value);
        self
    }

    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    pub fn with_roles(mut self, roles: Vec<Role>) -> Self {
        self.roles = roles;
        self
    }

    pub fn administering(mut self, node_id: u64) -> Self {
        self.administers_node_id = Some(node_id);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample(name: &str, email: Option<&str>) -> DirectoryNode {
        let mut attributes = Attributes::new();
        if let Some(email) = email {
            attributes.insert(EMAIL_ATTRIBUTE.to_string(), json!(email));
        }
        DirectoryNode {
            id: 3,
            name: name.to_string(),
            kind: NodeKind::Principal,
            attributes,
            credential_secret: Some("$argon2id$secret".to_string()),
            roles: vec![],
            administers_node_id: None,
            path: "1.3.".to_string(),
            parent_id: Some(1),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_kind_aliases() {
        assert_eq!("ou".parse::<NodeKind>().unwrap(), NodeKind::Unit);
        assert_eq!("DC".parse::<NodeKind>().unwrap(), NodeKind::Domain);
        assert_eq!("USER".parse::<NodeKind>().unwrap(), NodeKind::Principal);
        assert!("TEAM".parse::<NodeKind>().is_err());
    }

    #[test]
    fn test_matches_term_on_name_or_email() {
        let node = sample("Juan.Perez", Some("jp@Empresa.com"));
        assert!(node.matches_term("juan"));
        assert!(node.matches_term("EMPRESA"));
        assert!(!node.matches_term("maria"));
        assert!(!sample("ana", None).matches_term("empresa"));
    }

    #[test]
    fn test_redacted_secret_is_not_serialized() {
        let node = sample("juan", None).redacted();
        let json = serde_json::to_value(&node).unwrap();
        assert!(json.get("credential_secret").is_none());
    }

    #[test]
    fn test_new_node_defaults_to_unit() {
        let request = NewNode {
            name: "ventas".to_string(),
            ..Default::default()
        };
        assert_eq!(request.kind, NodeKind::Unit);
        assert_eq!(NewNode::new("x", NodeKind::Group).under(4).parent_id, Some(4));
    }
}
