use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Roles a principal can hold, highest privilege first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Global access, bypasses every scope check
    SuperAdmin,
    /// Elevated within the subtree rooted at the administered node
    OuAdmin,
    /// Read-mostly end user
    User,
    /// Read-only
    #[serde(rename = "READONLY")]
    ReadOnly,
}

impl Role {
    /// Privilege rank, higher is more privileged.
    pub fn rank(&self) -> u8 {
        match self {
            Role::SuperAdmin => 3,
            Role::OuAdmin => 2,
            Role::User => 1,
            Role::ReadOnly => 0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "SUPER_ADMIN",
            Role::OuAdmin => "OU_ADMIN",
            Role::User => "USER",
            Role::ReadOnly => "READONLY",
        }
    }

    /// Administrative roles may hold permissions beyond `Read`.
    pub fn is_admin(&self) -> bool {
        matches!(self, Role::SuperAdmin | Role::OuAdmin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SUPER_ADMIN" => Ok(Role::SuperAdmin),
            "OU_ADMIN" => Ok(Role::OuAdmin),
            "USER" => Ok(Role::User),
            "READONLY" | "READ_ONLY" => Ok(Role::ReadOnly),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

/// Actions that can be performed on directory nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Permission {
    Read,
    Create,
    Update,
    Delete,
    /// Superset of all the others
    Manage,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::Read => "READ",
            Permission::Create => "CREATE",
            Permission::Update => "UPDATE",
            Permission::Delete => "DELETE",
            Permission::Manage => "MANAGE",
        }
    }

    /// True if holding `self` implies holding `other`.
    pub fn implies(&self, other: Permission) -> bool {
        *self == Permission::Manage || *self == other
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
