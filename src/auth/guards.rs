//! The authorization pipeline as an ordered list of guard functions.
//!
//! Every guard reads the shared [`GuardContext`] and either lets the request
//! continue, settles it (allow), or denies it. Lookup failures such as a
//! missing target node are returned as errors, not denials.

use crate::auth::decision::{Decision, DenyReason, Stage};
use crate::auth::identity::{
    is_flag_set, parse_node_ref, resolve_administered_node, resolve_role, CallerIdentity, ADMIN_ATTRIBUTE,
    ADMIN_OF_ATTRIBUTE, ROLES_ATTRIBUTE, ROLE_ATTRIBUTE, SUPER_ADMIN_ATTRIBUTE,
};
use crate::auth::request::{AccessRequest, Operation};
use crate::directory::DirectoryStore;
use crate::error::{DirectoryError, DirectoryResult};
use crate::path;
use crate::permissions::{PermissionManager, Role};
use log::debug;
use serde_json::Value;

/// What a guard decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardOutcome {
    Continue,
    Allow,
    Deny(DenyReason, String),
}

impl GuardOutcome {
    fn deny(reason: DenyReason, detail: impl Into<String>) -> Self {
        GuardOutcome::Deny(reason, detail.into())
    }
}

impl From<Decision> for GuardOutcome {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Allow => GuardOutcome::Continue,
            Decision::Deny { reason, detail } => GuardOutcome::Deny(reason, detail),
        }
    }
}

pub type Guard = fn(&mut GuardContext<'_>) -> DirectoryResult<GuardOutcome>;

/// The four stages, in the order they run.
pub const PIPELINE: [(Stage, Guard); 4] = [
    (Stage::Identity, check_identity as Guard),
    (Stage::Role, check_role as Guard),
    (Stage::Scope, check_scope as Guard),
    (Stage::Escalation, check_escalation as Guard),
];

const CREATE_ESCALATION_GUARDS: [Guard; 2] = [check_role_granting, check_phantom_creation];
const UPDATE_ESCALATION_GUARDS: [Guard; 2] = [check_role_granting, check_patched_grants];
const MOVE_ESCALATION_GUARDS: [Guard; 2] = [check_self_promotion, check_move_scope];

/// State shared by the guards of one evaluation.
pub struct GuardContext<'a> {
    pub store: &'a DirectoryStore,
    pub permissions: &'a PermissionManager,
    pub caller: Option<&'a CallerIdentity>,
    pub request: &'a AccessRequest,
    caller_path: Option<String>,
    effective_path: Option<String>,
}

impl<'a> GuardContext<'a> {
    pub fn new(
        store: &'a DirectoryStore,
        permissions: &'a PermissionManager,
        caller: Option<&'a CallerIdentity>,
        request: &'a AccessRequest,
    ) -> Self {
        Self {
            store,
            permissions,
            caller,
            request,
            caller_path: None,
            effective_path: None,
        }
    }

    fn caller(&self) -> DirectoryResult<&'a CallerIdentity> {
        self.caller
            .ok_or_else(|| DirectoryError::AuthRequired("no caller identity".to_string()))
    }

    /// Caller's current path, as loaded by the identity stage.
    pub fn caller_path(&self) -> Option<&str> {
        self.caller_path.as_deref()
    }

    /// Effective path, as resolved by the identity stage.
    pub fn effective_path(&self) -> DirectoryResult<&str> {
        self.effective_path
            .as_deref()
            .ok_or_else(|| DirectoryError::AuthRequired("caller scope has not been resolved".to_string()))
    }

    fn node_path(&self, id: u64) -> DirectoryResult<String> {
        self.store
            .find_by_id(id)?
            .map(|node| node.path)
            .ok_or_else(|| DirectoryError::not_found(format!("Node with id {} does not exist", id)))
    }
}

/// Scope test of one target path against an effective path.
///
/// A strict ancestor of the scope is reported as such before the plain
/// descendant test, so `"1."` against `"1.2."` is an ancestor edit rather than
/// a generic scope violation.
pub fn check_path_scope(effective_path: &str, target_path: &str) -> Decision {
    if path::is_strict_ancestor(effective_path, target_path) {
        return Decision::deny(
            DenyReason::AncestorEditForbidden,
            format!(
                "target {} is an ancestor of your scope {}",
                target_path, effective_path
            ),
        );
    }
    if !path::is_descendant_or_self(effective_path, target_path) {
        return Decision::deny(
            DenyReason::ScopeViolation,
            format!(
                "target {} lies outside your scope {}",
                target_path, effective_path
            ),
        );
    }
    Decision::Allow
}

/// Path used for scope comparisons: the administered node's path for an
/// `OuAdmin`, the caller's own path otherwise. An administered node that no
/// longer exists falls back to the caller's own path.
pub fn resolve_effective_path(
    store: &DirectoryStore,
    caller: &CallerIdentity,
    own_path: &str,
) -> DirectoryResult<String> {
    if caller.role == Role::OuAdmin {
        if let Some(admin_id) = caller.administers_node_id {
            if let Some(node) = store.find_by_id(admin_id)? {
                return Ok(node.path);
            }
            debug!(
                "Administered node {} of caller {} is gone, using own path",
                admin_id, caller.id
            );
        }
    }
    Ok(own_path.to_string())
}

/// Stage 1: a caller must be present and still exist in the directory.
pub fn check_identity(ctx: &mut GuardContext<'_>) -> DirectoryResult<GuardOutcome> {
    let Some(caller) = ctx.caller else {
        return Ok(GuardOutcome::deny(DenyReason::AuthRequired, "no caller identity"));
    };
    let Some(node) = ctx.store.find_by_id(caller.id)? else {
        return Ok(GuardOutcome::deny(
            DenyReason::AuthRequired,
            format!("caller {} no longer exists", caller.id),
        ));
    };
    if !node.is_principal() {
        return Ok(GuardOutcome::deny(
            DenyReason::AuthRequired,
            format!("node {} is not a principal", caller.id),
        ));
    }

    let effective = resolve_effective_path(ctx.store, caller, &node.path)?;
    debug!(
        "Caller {} ({}) resolved with path {} and scope {}",
        caller.id, caller.role, node.path, effective
    );
    ctx.caller_path = Some(node.path);
    ctx.effective_path = Some(effective);
    Ok(GuardOutcome::Continue)
}

/// Stage 2: the role must hold the requested permission.
pub fn check_role(ctx: &mut GuardContext<'_>) -> DirectoryResult<GuardOutcome> {
    let Some(required) = ctx.request.required else {
        return Ok(GuardOutcome::Allow);
    };
    let caller = ctx.caller()?;
    if caller.is_super_admin() || ctx.permissions.has_permission(caller.role, required) {
        return Ok(GuardOutcome::Continue);
    }
    Ok(GuardOutcome::deny(
        DenyReason::RoleInsufficient,
        format!("role {} does not hold the {} permission", caller.role, required),
    ))
}

/// Stage 3: the target must sit inside the caller's scope.
pub fn check_scope(ctx: &mut GuardContext<'_>) -> DirectoryResult<GuardOutcome> {
    let caller = ctx.caller()?;
    if caller.is_super_admin() {
        return Ok(GuardOutcome::Continue);
    }
    let Some(target_id) = ctx.request.scope_target() else {
        return Ok(GuardOutcome::Continue);
    };
    if target_id == caller.id {
        debug!("Self operation by caller {}", caller.id);
        return Ok(GuardOutcome::Continue);
    }

    let target_path = ctx.node_path(target_id)?;
    Ok(check_path_scope(ctx.effective_path()?, &target_path).into())
}

/// Stage 4: create, update and move must not widen anybody's privileges.
pub fn check_escalation(ctx: &mut GuardContext<'_>) -> DirectoryResult<GuardOutcome> {
    if !ctx.request.operation.is_escalation_sensitive() || ctx.caller()?.is_super_admin() {
        return Ok(GuardOutcome::Continue);
    }
    let guards: &[Guard] = match ctx.request.operation {
        Operation::Create => &CREATE_ESCALATION_GUARDS,
        Operation::Update => &UPDATE_ESCALATION_GUARDS,
        Operation::Move => &MOVE_ESCALATION_GUARDS,
        _ => &[],
    };
    for guard in guards.iter().copied() {
        match guard(&mut *ctx)? {
            GuardOutcome::Continue => {}
            outcome => return Ok(outcome),
        }
    }
    Ok(GuardOutcome::Continue)
}

/// Nobody below `SuperAdmin` may grant it; a non-admin may grant nothing
/// administrative; an `OuAdmin` may only hand out administration of nodes
/// inside their own scope.
pub fn check_role_granting(ctx: &mut GuardContext<'_>) -> DirectoryResult<GuardOutcome> {
    let caller = ctx.caller()?;
    let request = ctx.request;

    if grants_role(request, |role| role == Role::SuperAdmin)
        || is_flag_set(request.attributes.get(SUPER_ADMIN_ATTRIBUTE))
    {
        return Ok(GuardOutcome::deny(
            DenyReason::EscalationDenied,
            format!("role {} cannot grant {}", caller.role, Role::SuperAdmin),
        ));
    }

    if !caller.role.is_admin() {
        if grants_role(request, |role| role.is_admin())
            || is_flag_set(request.attributes.get(ADMIN_ATTRIBUTE))
            || request.attributes.contains_key(ADMIN_OF_ATTRIBUTE)
            || request.administers_node_id.is_some()
        {
            return Ok(GuardOutcome::deny(
                DenyReason::EscalationDenied,
                format!("role {} cannot grant administrative attributes", caller.role),
            ));
        }
        return Ok(GuardOutcome::Continue);
    }

    let administered = request.administers_node_id.or_else(|| {
        request
            .attributes
            .get(ADMIN_OF_ATTRIBUTE)
            .and_then(parse_node_ref)
    });
    if let Some(admin_id) = administered {
        let admin_path = ctx.node_path(admin_id)?;
        let effective = ctx.effective_path()?;
        if !path::is_descendant_or_self(effective, &admin_path) {
            return Ok(GuardOutcome::deny(
                DenyReason::EscalationDenied,
                format!(
                    "cannot grant administration of {} outside your scope {}",
                    admin_path, effective
                ),
            ));
        }
    }
    Ok(GuardOutcome::Continue)
}

/// Applies an attribute patch to a copy of the stored target and compares the
/// role it would resolve to. Catches grants that only take effect in
/// combination with attributes the node already carries, e.g. `isAdmin` on a
/// node whose stored `adminOf` points outside the caller's scope.
pub fn check_patched_grants(ctx: &mut GuardContext<'_>) -> DirectoryResult<GuardOutcome> {
    let Some(target_id) = ctx.request.target_id else {
        return Ok(GuardOutcome::Continue);
    };
    let before = ctx
        .store
        .find_by_id(target_id)?
        .ok_or_else(|| DirectoryError::not_found(format!("Node with id {} does not exist", target_id)))?;
    let before_role = resolve_role(&before);
    let before_admin = resolve_administered_node(&before, before_role);

    let mut after = before;
    after.merge_attributes(ctx.request.attributes.clone());
    let after_role = resolve_role(&after);
    let after_admin = resolve_administered_node(&after, after_role);

    if after_role == Role::SuperAdmin && before_role != Role::SuperAdmin {
        return Ok(GuardOutcome::deny(
            DenyReason::EscalationDenied,
            format!("patch would make node {} a {}", target_id, Role::SuperAdmin),
        ));
    }
    if (after_role, after_admin) == (before_role, before_admin) {
        return Ok(GuardOutcome::Continue);
    }
    if after_role.is_admin() {
        let Some(admin_id) = after_admin else {
            return Ok(GuardOutcome::Continue);
        };
        let admin_path = ctx.node_path(admin_id)?;
        let effective = ctx.effective_path()?;
        if !path::is_descendant_or_self(effective, &admin_path) {
            return Ok(GuardOutcome::deny(
                DenyReason::EscalationDenied,
                format!(
                    "patch would grant administration of {} outside your scope {}",
                    admin_path, effective
                ),
            ));
        }
    }
    Ok(GuardOutcome::Continue)
}

/// The parent of a created node is re-validated against the caller's scope.
pub fn check_phantom_creation(ctx: &mut GuardContext<'_>) -> DirectoryResult<GuardOutcome> {
    let caller = ctx.caller()?;
    let Some(parent_id) = ctx.request.parent_id else {
        return Ok(GuardOutcome::deny(
            DenyReason::ScopeViolation,
            "only a super administrator may create root nodes",
        ));
    };
    if parent_id == caller.id {
        return Ok(GuardOutcome::Continue);
    }

    let parent_path = ctx.node_path(parent_id)?;
    let effective = ctx.effective_path()?;
    if !path::is_descendant_or_self(effective, &parent_path) {
        return Ok(GuardOutcome::deny(
            DenyReason::ScopeViolation,
            format!("parent {} lies outside your scope {}", parent_path, effective),
        ));
    }
    Ok(GuardOutcome::Continue)
}

/// A move may not lift a node above the caller's scope, and an `OuAdmin` may
/// not move the node they administer.
pub fn check_self_promotion(ctx: &mut GuardContext<'_>) -> DirectoryResult<GuardOutcome> {
    let caller = ctx.caller()?;
    if let Some(new_parent_id) = ctx.request.parent_id {
        let new_parent_path = ctx.node_path(new_parent_id)?;
        let effective = ctx.effective_path()?;
        if new_parent_path.len() < effective.len() {
            return Ok(GuardOutcome::deny(
                DenyReason::EscalationDenied,
                format!(
                    "new parent {} sits above your scope {}",
                    new_parent_path, effective
                ),
            ));
        }
    }

    if caller.role == Role::OuAdmin {
        if let (Some(admin_id), Some(target_id)) = (caller.administers_node_id, ctx.request.target_id) {
            if admin_id == target_id {
                return Ok(GuardOutcome::deny(
                    DenyReason::EscalationDenied,
                    format!("cannot move node {} which you administer", admin_id),
                ));
            }
        }
    }
    Ok(GuardOutcome::Continue)
}

/// Both the moved node and its new parent must be inside the caller's scope.
pub fn check_move_scope(ctx: &mut GuardContext<'_>) -> DirectoryResult<GuardOutcome> {
    let effective = ctx.effective_path()?.to_string();
    for (label, id) in [("node", ctx.request.target_id), ("new parent", ctx.request.parent_id)] {
        let Some(id) = id else { continue };
        let node_path = ctx.node_path(id)?;
        if !path::is_descendant_or_self(&effective, &node_path) {
            return Ok(GuardOutcome::deny(
                DenyReason::ScopeViolation,
                format!("{} {} lies outside your scope {}", label, node_path, effective),
            ));
        }
    }
    Ok(GuardOutcome::Continue)
}

/// True if the request assigns a role matching `predicate`, through the
/// explicit role list or the legacy `role`/`roles` attributes.
fn grants_role(request: &AccessRequest, predicate: impl Fn(Role) -> bool) -> bool {
    let parse = |value: &Value| value.as_str().and_then(|s| s.parse::<Role>().ok());

    request.roles.iter().copied().any(&predicate)
        || request
            .attributes
            .get(ROLE_ATTRIBUTE)
            .and_then(parse)
            .is_some_and(&predicate)
        || request
            .attributes
            .get(ROLES_ATTRIBUTE)
            .and_then(Value::as_array)
            .is_some_and(|roles| roles.iter().filter_map(parse).any(&predicate))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_scope_table() {
        let effective = "1.2.";
        assert!(check_path_scope(effective, "1.2.5.10.").is_allowed());
        assert!(check_path_scope(effective, "1.2.").is_allowed());
        assert_eq!(
            check_path_scope(effective, "1.3.8.").reason(),
            Some(DenyReason::ScopeViolation)
        );
        assert_eq!(
            check_path_scope(effective, "1.").reason(),
            Some(DenyReason::AncestorEditForbidden)
        );
        assert_eq!(
            check_path_scope(effective, "1.23.").reason(),
            Some(DenyReason::ScopeViolation)
        );
    }

    #[test]
    fn test_grants_role_detects_every_channel() {
        let mut request = AccessRequest::flat_search();
        assert!(!grants_role(&request, |r| r == Role::SuperAdmin));

        request.roles = vec![Role::SuperAdmin];
        assert!(grants_role(&request, |r| r == Role::SuperAdmin));

        request.roles.clear();
        request
            .attributes
            .insert("role".to_string(), Value::String("super_admin".to_string()));
        assert!(grants_role(&request, |r| r == Role::SuperAdmin));

        request.attributes.clear();
        request
            .attributes
            .insert("roles".to_string(), serde_json::json!(["USER", "OU_ADMIN"]));
        assert!(grants_role(&request, |r| r.is_admin()));
        assert!(!grants_role(&request, |r| r == Role::SuperAdmin));
    }

    #[test]
    fn test_pipeline_order() {
        let stages: Vec<_> = PIPELINE.iter().map(|(stage, _)| *stage).collect();
        assert_eq!(
            stages,
            vec![Stage::Identity, Stage::Role, Stage::Scope, Stage::Escalation]
        );
    }
}
