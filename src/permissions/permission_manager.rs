use crate::permissions::types::{Permission, Role};

/// Maps roles onto the permissions they may hold, before any positional
/// scope is considered.
///
/// Base rule:
/// - `ReadOnly` and `User` may only hold `Read`
/// - `OuAdmin` and `SuperAdmin` may hold any permission
///
/// Whether an administrator may actually exercise a permission on a given
/// node is decided later by the scope and anti-escalation stages of the
/// authorization pipeline.
#[derive(Default, Clone)]
pub struct PermissionManager {}

impl PermissionManager {
    /// Creates a new PermissionManager instance.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Permissions a role may hold.
    #[must_use]
    pub fn granted_permissions(&self, role: Role) -> &'static [Permission] {
        match role {
            Role::SuperAdmin | Role::OuAdmin => &[
                Permission::Read,
                Permission::Create,
                Permission::Update,
                Permission::Delete,
                Permission::Manage,
            ],
            Role::User | Role::ReadOnly => &[Permission::Read],
        }
    }

    /// Checks if a role holds a single permission.
    #[must_use]
    pub fn has_permission(&self, role: Role, required: Permission) -> bool {
        let allowed = self
            .granted_permissions(role)
            .iter()
            .any(|held| held.implies(required));
        log::debug!("Role check: {} holds {} = {}", role, required, allowed);
        allowed
    }

    /// Checks if a role holds every permission in `required`.
    ///
    /// An empty requirement is always satisfied.
    #[must_use]
    pub fn has_all_permissions(&self, role: Role, required: &[Permission]) -> bool {
        required.iter().all(|p| self.has_permission(role, *p))
    }
}
