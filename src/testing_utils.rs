//! Shared fixtures for unit and integration tests.

use crate::audit::InMemoryAuditLog;
use crate::auth::CallerIdentity;
use crate::credentials::{Argon2SecretHasher, ClaimSigner, DirectoryCredentials};
use crate::directory::DirectoryStore;
use crate::error::{DirectoryError, DirectoryResult};
use crate::seed::{seed_default_directory, SeedReport};
use crate::service::{DirectoryService, RequestContext};
use sled::Db;
use std::sync::Arc;

/// A service wired to an in-memory audit log that tests can inspect.
pub struct ServiceFixture {
    pub service: DirectoryService,
    pub store: DirectoryStore,
    pub audit: InMemoryAuditLog,
    pub seed: Option<SeedReport>,
}

impl ServiceFixture {
    /// Request context for an existing principal, resolved from the store.
    pub fn context_for(&self, node_id: u64) -> DirectoryResult<RequestContext> {
        let node = self
            .store
            .find_by_id(node_id)?
            .ok_or_else(|| DirectoryError::not_found(format!("Node with id {} does not exist", node_id)))?;
        Ok(RequestContext::for_caller(CallerIdentity::from_node(&node)))
    }

    pub fn seed(&self) -> DirectoryResult<SeedReport> {
        self.seed
            .ok_or_else(|| DirectoryError::invalid_operation("fixture was not seeded"))
    }
}

pub struct TestDirectoryFactory;

impl TestDirectoryFactory {
    /// Create a temporary sled database for testing
    pub fn create_temp_sled_db() -> Result<Db, sled::Error> {
        sled::Config::new().temporary(true).open()
    }

    /// Argon2 with minimal cost so tests stay fast.
    pub fn cheap_hasher() -> DirectoryResult<Argon2SecretHasher> {
        Argon2SecretHasher::with_params(1024, 1, 1)
    }

    pub fn create_store() -> DirectoryResult<DirectoryStore> {
        let db = Self::create_temp_sled_db()?;
        DirectoryStore::new(db, Arc::new(Self::cheap_hasher()?))
    }

    pub fn create_service() -> DirectoryResult<ServiceFixture> {
        let store = Self::create_store()?;
        let audit = InMemoryAuditLog::default();
        let credentials = DirectoryCredentials::new(store.clone(), ClaimSigner::generate(300));
        let service = DirectoryService::new(store.clone(), Arc::new(credentials), Arc::new(audit.clone()));
        Ok(ServiceFixture {
            service,
            store,
            audit,
            seed: None,
        })
    }

    /// Service over the default organization of [`crate::seed`].
    pub fn create_seeded_service() -> DirectoryResult<ServiceFixture> {
        let mut fixture = Self::create_service()?;
        fixture.seed = Some(seed_default_directory(&fixture.store)?);
        Ok(fixture)
    }
}
