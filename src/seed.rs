//! Default organization used by fresh installations and tests.
//!
//! ```text
//! root (DOMAIN)
//! ├── admin       PRINCIPAL  SUPER_ADMIN
//! └── operaciones UNIT
//!     ├── operador   PRINCIPAL  USER
//!     ├── auditor    PRINCIPAL  READONLY
//!     └── admin_ops  PRINCIPAL  OU_ADMIN of operaciones
//! ```

use crate::directory::{DirectoryNode, DirectoryStore, NewNode, NodeKind};
use crate::error::DirectoryResult;
use crate::permissions::Role;
use log::info;
use serde_json::json;

pub const ROOT_NAME: &str = "root";
pub const OPERATIONS_UNIT: &str = "operaciones";

/// Ids of the seeded nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedReport {
    pub root_id: u64,
    pub admin_id: u64,
    pub operations_id: u64,
    pub operator_id: u64,
    pub auditor_id: u64,
    pub ops_admin_id: u64,
    /// Number of nodes created by this run; zero when already seeded
    pub created: usize,
}

/// Creates whatever part of the default organization is missing.
pub fn seed_default_directory(store: &DirectoryStore) -> DirectoryResult<SeedReport> {
    let mut created = 0;

    let root = match store
        .search_flat(ROOT_NAME, Some(NodeKind::Domain))?
        .into_iter()
        .find(|node| node.is_root() && node.name == ROOT_NAME)
    {
        Some(root) => root,
        None => {
            created += 1;
            store.create(NewNode::new(ROOT_NAME, NodeKind::Domain))?
        }
    };

    let admin = ensure_child(
        store,
        &mut created,
        NewNode::new("admin", NodeKind::Principal)
            .under(root.id)
            .with_attribute("email", json!("admin@localhost"))
            .with_secret("ChangeMe123!")
            .with_roles(vec![Role::SuperAdmin]),
    )?;
    let operations = ensure_child(
        store,
        &mut created,
        NewNode::new(OPERATIONS_UNIT, NodeKind::Unit).under(root.id),
    )?;
    let operator = ensure_child(
        store,
        &mut created,
        NewNode::new("operador", NodeKind::Principal)
            .under(operations.id)
            .with_attribute("email", json!("operador@localhost"))
            .with_secret("UserPass123!")
            .with_roles(vec![Role::User]),
    )?;
    let auditor = ensure_child(
        store,
        &mut created,
        NewNode::new("auditor", NodeKind::Principal)
            .under(operations.id)
            .with_attribute("email", json!("auditor@localhost"))
            .with_secret("AuditPass123!")
            .with_roles(vec![Role::ReadOnly]),
    )?;
    let ops_admin = ensure_child(
        store,
        &mut created,
        NewNode::new("admin_ops", NodeKind::Principal)
            .under(operations.id)
            .with_attribute("email", json!("admin_ops@localhost"))
            .with_secret("OpsPass123!")
            .with_roles(vec![Role::OuAdmin])
            .administering(operations.id),
    )?;

    if created > 0 {
        info!("Seeded default directory ({} nodes created)", created);
    }
    Ok(SeedReport {
        root_id: root.id,
        admin_id: admin.id,
        operations_id: operations.id,
        operator_id: operator.id,
        auditor_id: auditor.id,
        ops_admin_id: ops_admin.id,
        created,
    })
}

fn ensure_child(store: &DirectoryStore, created: &mut usize, request: NewNode) -> DirectoryResult<DirectoryNode> {
    if let Some(parent_id) = request.parent_id {
        if let Some(existing) = store
            .children(parent_id)?
            .into_iter()
            .find(|child| child.name == request.name)
        {
            return Ok(existing);
        }
    }
    *created += 1;
    store.create(request)
}
