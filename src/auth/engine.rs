use crate::auth::decision::{Decision, Evaluation};
use crate::auth::guards::{resolve_effective_path, GuardContext, GuardOutcome, PIPELINE};
use crate::auth::identity::CallerIdentity;
use crate::auth::request::AccessRequest;
use crate::directory::DirectoryStore;
use crate::error::{DirectoryError, DirectoryResult};
use crate::permissions::PermissionManager;
use log::{debug, warn};

/// Decides whether a caller may perform an operation.
///
/// The engine holds no per-request state. Caller and target paths are read
/// from the store on every evaluation, never from the caller's claims.
#[derive(Clone)]
pub struct AuthorizationEngine {
    store: DirectoryStore,
    permissions: PermissionManager,
}

impl AuthorizationEngine {
    pub fn new(store: DirectoryStore) -> Self {
        Self::with_permissions(store, PermissionManager::new())
    }

    pub fn with_permissions(store: DirectoryStore, permissions: PermissionManager) -> Self {
        Self { store, permissions }
    }

    /// Runs the pipeline and reports which stages ran.
    pub fn evaluate_traced(
        &self,
        caller: Option<&CallerIdentity>,
        request: &AccessRequest,
    ) -> DirectoryResult<Evaluation> {
        let mut ctx = GuardContext::new(&self.store, &self.permissions, caller, request);
        let mut stages = Vec::with_capacity(PIPELINE.len());

        for (stage, guard) in PIPELINE {
            stages.push(stage);
            match guard(&mut ctx)? {
                GuardOutcome::Continue => {}
                GuardOutcome::Allow => {
                    debug!("{} allowed at {:?} stage", request.operation, stage);
                    return Ok(Evaluation {
                        decision: Decision::Allow,
                        stages,
                    });
                }
                GuardOutcome::Deny(reason, detail) => {
                    warn!(
                        "{} denied for caller {:?} at {:?} stage: {} ({})",
                        request.operation,
                        caller.map(|c| c.id),
                        stage,
                        reason,
                        detail
                    );
                    return Ok(Evaluation {
                        decision: Decision::Deny { reason, detail },
                        stages,
                    });
                }
            }
        }

        debug!("{} allowed for caller {:?}", request.operation, caller.map(|c| c.id));
        Ok(Evaluation {
            decision: Decision::Allow,
            stages,
        })
    }

    pub fn evaluate(&self, caller: Option<&CallerIdentity>, request: &AccessRequest) -> DirectoryResult<Decision> {
        Ok(self.evaluate_traced(caller, request)?.decision)
    }

    /// Like [`Self::evaluate`] but turns a denial into its error.
    pub fn authorize(&self, caller: Option<&CallerIdentity>, request: &AccessRequest) -> DirectoryResult<()> {
        self.evaluate(caller, request)?.into_result()
    }

    /// Current effective path of `caller`, as the scope stage would use it.
    pub fn effective_path(&self, caller: &CallerIdentity) -> DirectoryResult<String> {
        let node = self.store.find_by_id(caller.id)?.ok_or_else(|| {
            DirectoryError::AuthRequired(format!("caller {} no longer exists", caller.id))
        })?;
        resolve_effective_path(&self.store, caller, &node.path)
    }
}
