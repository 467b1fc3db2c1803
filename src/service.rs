//! Query surface of the directory: every operation is authorized by the
//! [`AuthorizationEngine`], carried out by the [`DirectoryStore`] and reported
//! to the [`AuditSink`].

use crate::audit::{AuditAction, AuditEvent, AuditSink, ClientContext};
use crate::auth::{AccessRequest, AuthorizationEngine, CallerIdentity, Decision};
use crate::constants::MAX_AUTHORIZATION_ATTEMPTS;
use crate::credentials::{CredentialService, SignedClaims};
use crate::directory::{Attributes, DirectoryNode, DirectoryStore, NewNode, NodeKind, TreeNode};
use crate::error::{DirectoryError, DirectoryResult};
use log::{debug, info, warn};
use serde_json::json;
use std::sync::Arc;

/// Per-request input: who is calling and from where.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub caller: Option<CallerIdentity>,
    pub client: ClientContext,
}

impl RequestContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn for_caller(caller: CallerIdentity) -> Self {
        Self {
            caller: Some(caller),
            client: ClientContext::default(),
        }
    }

    pub fn with_client(mut self, client: ClientContext) -> Self {
        self.client = client;
        self
    }

    fn caller(&self) -> DirectoryResult<&CallerIdentity> {
        self.caller
            .as_ref()
            .ok_or_else(|| DirectoryError::AuthRequired("no caller identity".to_string()))
    }
}

pub struct DirectoryService {
    store: DirectoryStore,
    engine: AuthorizationEngine,
    credentials: Arc<dyn CredentialService>,
    audit: Arc<dyn AuditSink>,
}

impl DirectoryService {
    pub fn new(
        store: DirectoryStore,
        credentials: Arc<dyn CredentialService>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        let engine = AuthorizationEngine::new(store.clone());
        Self {
            store,
            engine,
            credentials,
            audit,
        }
    }

    pub fn store(&self) -> &DirectoryStore {
        &self.store
    }

    pub fn engine(&self) -> &AuthorizationEngine {
        &self.engine
    }

    /// Verifies a principal's secret and issues signed claims. Both outcomes
    /// are audited.
    pub async fn login(&self, username: &str, secret: &str, client: ClientContext) -> DirectoryResult<SignedClaims> {
        let Some(node) = self.credentials.verify_credentials(username, secret)? else {
            self.emit(
                AuditEvent::new(AuditAction::Login, username)
                    .client(client)
                    .failed("invalid credentials"),
            )
            .await;
            return Err(DirectoryError::AuthRequired("invalid credentials".to_string()));
        };

        let signed = self.credentials.issue_claims(&node)?;
        let identity = CallerIdentity::from_node(&node);
        info!("Principal '{}' logged in as {}", node.name, identity.role);
        self.emit(
            AuditEvent::by(AuditAction::Login, &identity)
                .target(&node)
                .scope(node.path.clone())
                .client(client),
        )
        .await;
        Ok(signed)
    }

    /// Resolves a token into a request context.
    pub fn identify(&self, token: &str) -> DirectoryResult<RequestContext> {
        Ok(RequestContext::for_caller(self.credentials.resolve(token)?))
    }

    pub async fn create_node(&self, ctx: &RequestContext, request: NewNode) -> DirectoryResult<DirectoryNode> {
        let access = AccessRequest::create(&request);
        let node = self
            .authorized_mutation(ctx, &access, AuditAction::Create, |generation| {
                self.store.create_if_unchanged(request.clone(), generation)
            })
            .await?;
        let caller = ctx.caller()?;

        if caller.role.is_admin() {
            let event = self
                .caller_event(ctx, AuditAction::Create)
                .target(&node)
                .metadata(json!({ "parent_id": node.parent_id, "path": node.path }));
            self.emit(event).await;
        }
        Ok(node)
    }

    pub async fn get_node(&self, ctx: &RequestContext, id: u64) -> DirectoryResult<DirectoryNode> {
        self.authorize(ctx, &AccessRequest::read(id), AuditAction::Read)
            .await?;
        let node = self
            .store
            .find_by_id(id)?
            .ok_or_else(|| DirectoryError::not_found(format!("Node with id {} does not exist", id)))?;

        if ctx.caller()?.role.is_admin() {
            let event = self.caller_event(ctx, AuditAction::Read).target(&node);
            self.emit(event).await;
        }
        Ok(node)
    }

    /// Breadcrumbs from the root down to the node's parent.
    pub async fn get_ancestors(&self, ctx: &RequestContext, id: u64) -> DirectoryResult<Vec<DirectoryNode>> {
        self.authorize(ctx, &AccessRequest::read(id), AuditAction::Read)
            .await?;
        self.store.find_ancestors(id)
    }

    pub async fn move_node(&self, ctx: &RequestContext, node_id: u64, new_parent_id: u64) -> DirectoryResult<DirectoryNode> {
        let access = AccessRequest::move_node(node_id, new_parent_id);
        let (before, moved) = self
            .authorized_mutation(ctx, &access, AuditAction::Move, |generation| {
                let before = self.store.find_by_id(node_id)?.ok_or_else(|| {
                    DirectoryError::not_found(format!("Node with id {} does not exist", node_id))
                })?;
                let moved = self
                    .store
                    .move_node_if_unchanged(node_id, new_parent_id, generation)?;
                Ok((before, moved))
            })
            .await?;
        let caller = ctx.caller()?;
        if caller.role.is_admin() {
            let event = self.caller_event(ctx, AuditAction::Move).target(&moved).metadata(json!({
                "from_parent_id": before.parent_id,
                "to_parent_id": new_parent_id,
                "old_path": before.path,
                "new_path": moved.path,
            }));
            self.emit(event).await;
        }
        Ok(moved)
    }

    pub async fn update_attributes(
        &self,
        ctx: &RequestContext,
        node_id: u64,
        attributes: Attributes,
    ) -> DirectoryResult<DirectoryNode> {
        let changed: Vec<String> = attributes.keys().cloned().collect();
        let access = AccessRequest::update(node_id, attributes);
        let node = self
            .authorized_mutation(ctx, &access, AuditAction::Update, |generation| {
                self.store
                    .update_attributes_if_unchanged(node_id, access.attributes.clone(), generation)
            })
            .await?;
        let caller = ctx.caller()?;
        if caller.role.is_admin() {
            let event = self
                .caller_event(ctx, AuditAction::Update)
                .target(&node)
                .metadata(json!({ "attributes": changed }));
            self.emit(event).await;
        }
        Ok(node)
    }

    /// Authorized and audited, but nodes are never removed: always fails with
    /// `NOT_IMPLEMENTED` and leaves the tree untouched.
    pub async fn delete_node(&self, ctx: &RequestContext, node_id: u64) -> DirectoryResult<()> {
        self.authorize(ctx, &AccessRequest::delete(node_id), AuditAction::Delete)
            .await?;

        let message = format!("deleting node {} is not supported", node_id);
        let mut event = self
            .caller_event(ctx, AuditAction::Delete)
            .failed(message.clone());
        event = match self.store.find_by_id(node_id)? {
            Some(node) => event.target(&node),
            None => event.target_id(node_id),
        };
        self.emit(event).await;
        Err(DirectoryError::NotImplemented(message))
    }

    pub async fn search_subtree(
        &self,
        ctx: &RequestContext,
        root_id: u64,
        term: Option<&str>,
    ) -> DirectoryResult<Vec<DirectoryNode>> {
        self.authorize(ctx, &AccessRequest::search(root_id), AuditAction::Read)
            .await?;
        self.store.search_subtree(root_id, term)
    }

    pub async fn flat_search(
        &self,
        ctx: &RequestContext,
        term: &str,
        kind: Option<NodeKind>,
    ) -> DirectoryResult<Vec<DirectoryNode>> {
        self.authorize(ctx, &AccessRequest::flat_search(), AuditAction::Read)
            .await?;
        self.store.search_flat(term, kind)
    }

    pub async fn full_tree(&self, ctx: &RequestContext) -> DirectoryResult<Vec<TreeNode>> {
        self.authorize(ctx, &AccessRequest::full_tree(), AuditAction::Read)
            .await?;
        self.store.full_tree()
    }

    /// Authorizes `request` and applies `mutate` against the store generation
    /// the decision was taken at. When the tree changed in between, the
    /// decision is discarded and the whole pipeline runs again.
    async fn authorized_mutation<T, F>(
        &self,
        ctx: &RequestContext,
        request: &AccessRequest,
        action: AuditAction,
        mut mutate: F,
    ) -> DirectoryResult<T>
    where
        F: FnMut(u64) -> DirectoryResult<T>,
    {
        let mut attempt = 1;
        loop {
            let generation = self.store.generation();
            self.authorize(ctx, request, action).await?;
            match mutate(generation) {
                Err(DirectoryError::StaleAuthorization(detail)) if attempt < MAX_AUTHORIZATION_ATTEMPTS => {
                    debug!("Re-authorizing {} (attempt {}): {}", request.operation, attempt + 1, detail);
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    /// Runs the pipeline. Denied mutations by an identified caller are
    /// audited before the denial is returned.
    async fn authorize(&self, ctx: &RequestContext, request: &AccessRequest, action: AuditAction) -> DirectoryResult<()> {
        let (reason, detail) = match self.engine.evaluate(ctx.caller.as_ref(), request)? {
            Decision::Allow => return Ok(()),
            Decision::Deny { reason, detail } => (reason, detail),
        };

        if ctx.caller.is_some() && request.operation.is_mutating() {
            let mut event = self
                .caller_event(ctx, action)
                .denied(format!("{}: {}", reason, detail))
                .metadata(json!({ "parent_id": request.parent_id }));
            if let Some(target_id) = request.target_id {
                event = event.target_id(target_id);
            }
            self.emit(event).await;
        }
        Err(reason.into_error(detail))
    }

    /// Event stamped with the caller, their current scope and client context.
    fn caller_event(&self, ctx: &RequestContext, action: AuditAction) -> AuditEvent {
        let mut event = match &ctx.caller {
            Some(caller) => {
                let event = AuditEvent::by(action, caller);
                match self.engine.effective_path(caller) {
                    Ok(scope) => event.scope(scope),
                    Err(_) => event,
                }
            }
            None => AuditEvent::new(action, "anonymous"),
        };
        event.client = ctx.client.clone();
        event
    }

    async fn emit(&self, event: AuditEvent) {
        let action = event.action;
        if let Err(e) = self.audit.record(event).await {
            warn!("Failed to record {} audit event: {}", action, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditStatus;
    use crate::testing_utils::TestDirectoryFactory;

    #[tokio::test]
    async fn test_login_audits_both_outcomes() {
        let fixture = TestDirectoryFactory::create_seeded_service().unwrap();

        assert!(fixture
            .service
            .login("admin", "ChangeMe123!", ClientContext::default())
            .await
            .is_ok());
        let err = fixture
            .service
            .login("admin", "wrong", ClientContext::default())
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "AUTH_REQUIRED");

        let logins = fixture.audit.by_action(AuditAction::Login, 10).await;
        assert_eq!(logins.len(), 2);
        assert_eq!(logins[0].status, AuditStatus::Failed);
        assert_eq!(logins[1].status, AuditStatus::Success);
    }

    #[tokio::test]
    async fn test_identify_round_trips_token() {
        let fixture = TestDirectoryFactory::create_seeded_service().unwrap();
        let signed = fixture
            .service
            .login("operador", "UserPass123!", ClientContext::default())
            .await
            .unwrap();
        let ctx = fixture.service.identify(&signed.token).unwrap();
        assert_eq!(ctx.caller.unwrap().name, "operador");
    }

    #[tokio::test]
    async fn test_move_between_authorize_and_create_is_reauthorized() {
        let fixture = TestDirectoryFactory::create_seeded_service().unwrap();
        let seed = fixture.seed().unwrap();
        let team = fixture
            .store
            .create(NewNode::new("turno", NodeKind::Unit).under(seed.operations_id))
            .unwrap();
        let ventas = fixture
            .store
            .create(NewNode::new("ventas", NodeKind::Unit).under(seed.root_id))
            .unwrap();
        let ctx = fixture.context_for(seed.ops_admin_id).unwrap();
        let request = NewNode::new("x", NodeKind::Unit).under(team.id);
        let access = AccessRequest::create(&request);
        let before = fixture.store.len();

        let mut attempts = 0;
        let err = fixture
            .service
            .authorized_mutation(&ctx, &access, AuditAction::Create, |generation| {
                attempts += 1;
                if attempts == 1 {
                    // a super admin relocates the parent after the decision
                    fixture.store.move_node(team.id, ventas.id)?;
                }
                fixture.store.create_if_unchanged(request.clone(), generation)
            })
            .await
            .unwrap_err();

        assert_eq!(attempts, 1);
        assert_eq!(err.error_code(), "SCOPE_VIOLATION");
        assert_eq!(fixture.store.len(), before);
        assert_eq!(fixture.audit.by_status(AuditStatus::Denied, 10).await.len(), 1);
    }

    #[tokio::test]
    async fn test_unrelated_change_is_retried_transparently() {
        let fixture = TestDirectoryFactory::create_seeded_service().unwrap();
        let seed = fixture.seed().unwrap();
        let ctx = fixture.context_for(seed.ops_admin_id).unwrap();
        let request = NewNode::new("turno", NodeKind::Unit).under(seed.operations_id);
        let access = AccessRequest::create(&request);

        let mut attempts = 0;
        let node = fixture
            .service
            .authorized_mutation(&ctx, &access, AuditAction::Create, |generation| {
                attempts += 1;
                if attempts == 1 {
                    let mut patch = Attributes::new();
                    patch.insert("phone".to_string(), json!("555"));
                    fixture.store.update_attributes(seed.auditor_id, patch)?;
                }
                fixture.store.create_if_unchanged(request.clone(), generation)
            })
            .await
            .unwrap();

        assert_eq!(attempts, 2);
        assert_eq!(node.parent_id, Some(seed.operations_id));
    }

    #[tokio::test]
    async fn test_anonymous_is_rejected() {
        let fixture = TestDirectoryFactory::create_seeded_service().unwrap();
        let err = fixture
            .service
            .full_tree(&RequestContext::anonymous())
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "AUTH_REQUIRED");
        assert!(fixture.audit.is_empty().await);
    }
}
