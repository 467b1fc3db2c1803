use crate::directory::{Attributes, NewNode};
use crate::permissions::{Permission, Role};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Operations the authorization engine knows how to evaluate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operation {
    Read,
    Search,
    FlatSearch,
    FullTree,
    Create,
    Update,
    Delete,
    Move,
}

impl Operation {
    pub fn required_permission(&self) -> Permission {
        match self {
            Operation::Read | Operation::Search | Operation::FlatSearch | Operation::FullTree => {
                Permission::Read
            }
            Operation::Create => Permission::Create,
            Operation::Update | Operation::Move => Permission::Update,
            Operation::Delete => Permission::Delete,
        }
    }

    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            Operation::Create | Operation::Update | Operation::Delete | Operation::Move
        )
    }

    /// Only these pass through the anti-escalation stage.
    pub fn is_escalation_sensitive(&self) -> bool {
        matches!(self, Operation::Create | Operation::Update | Operation::Move)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Read => "READ",
            Operation::Search => "SEARCH",
            Operation::FlatSearch => "FLAT_SEARCH",
            Operation::FullTree => "FULL_TREE",
            Operation::Create => "CREATE",
            Operation::Update => "UPDATE",
            Operation::Delete => "DELETE",
            Operation::Move => "MOVE",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operation descriptor evaluated by [`crate::auth::AuthorizationEngine`].
///
/// `target_id` is the existing node acted upon (or the root of a scoped
/// search); `parent_id` is the parent of a node being created or the new
/// parent of a move.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessRequest {
    pub operation: Operation,
    /// `None` means the operation needs no permission at all.
    pub required: Option<Permission>,
    pub target_id: Option<u64>,
    pub parent_id: Option<u64>,
    /// Attributes the created node would carry, or the patch of an update
    pub attributes: Attributes,
    pub roles: Vec<Role>,
    pub administers_node_id: Option<u64>,
}

impl AccessRequest {
    fn for_operation(operation: Operation) -> Self {
        Self {
            operation,
            required: Some(operation.required_permission()),
            target_id: None,
            parent_id: None,
            attributes: Attributes::new(),
            roles: Vec::new(),
            administers_node_id: None,
        }
    }

    pub fn read(node_id: u64) -> Self {
        Self {
            target_id: Some(node_id),
            ..Self::for_operation(Operation::Read)
        }
    }

    pub fn search(root_id: u64) -> Self {
        Self {
            target_id: Some(root_id),
            ..Self::for_operation(Operation::Search)
        }
    }

    pub fn flat_search() -> Self {
        Self::for_operation(Operation::FlatSearch)
    }

    pub fn full_tree() -> Self {
        Self::for_operation(Operation::FullTree)
    }

    pub fn create(request: &NewNode) -> Self {
        Self {
            parent_id: request.parent_id,
            attributes: request.attributes.clone(),
            roles: request.roles.clone(),
            administers_node_id: request.administers_node_id,
            ..Self::for_operation(Operation::Create)
        }
    }

    pub fn update(node_id: u64, attributes: Attributes) -> Self {
        Self {
            target_id: Some(node_id),
            attributes,
            ..Self::for_operation(Operation::Update)
        }
    }

    pub fn delete(node_id: u64) -> Self {
        Self {
            target_id: Some(node_id),
            ..Self::for_operation(Operation::Delete)
        }
    }

    pub fn move_node(node_id: u64, new_parent_id: u64) -> Self {
        Self {
            target_id: Some(node_id),
            parent_id: Some(new_parent_id),
            ..Self::for_operation(Operation::Move)
        }
    }

    /// Drops the permission requirement; the pipeline then stops after the
    /// identity check.
    pub fn without_permission(mut self) -> Self {
        self.required = None;
        self
    }

    /// Node whose path the scope stage compares against the caller's scope.
    pub fn scope_target(&self) -> Option<u64> {
        match self.operation {
            Operation::Create => self.parent_id,
            _ => self.target_id,
        }
    }
}
