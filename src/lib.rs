//! # orgtree
//!
//! A hierarchical organizational directory (domains, units, groups and
//! principals) stored as a materialized-path tree, with an authorization
//! engine that combines roles with the caller's position in the tree.
//!
//! ## Components
//!
//! * `path` - materialized path encoding and prefix relations
//! * `directory` - sled-backed tree store with atomic subtree moves
//! * `permissions` - roles and the permissions they may hold
//! * `auth` - the identity, role, scope and anti-escalation pipeline
//! * `credentials` - secret hashing and signed identity claims
//! * `audit` - audit events and sinks
//! * `service` - the authorized, audited query surface
//!
//! ```no_run
//! use orgtree::testing_utils::TestDirectoryFactory;
//! use orgtree::directory::{NewNode, NodeKind};
//!
//! # async fn demo() -> orgtree::error::DirectoryResult<()> {
//! let fixture = TestDirectoryFactory::create_seeded_service()?;
//! let seed = fixture.seed()?;
//! let ctx = fixture.context_for(seed.ops_admin_id)?;
//! fixture
//!     .service
//!     .create_node(&ctx, NewNode::new("turno_noche", NodeKind::Unit).under(seed.operations_id))
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod audit;
pub mod auth;
pub mod config;
pub mod constants;
pub mod credentials;
pub mod directory;
pub mod error;
pub mod logging;
pub mod path;
pub mod permissions;
pub mod seed;
pub mod service;
pub mod testing_utils;

pub use audit::{AuditAction, AuditEvent, AuditSink, AuditStatus, InMemoryAuditLog};
pub use auth::{AccessRequest, AuthorizationEngine, CallerIdentity, Decision, DenyReason};
pub use config::{load_config, DirectoryConfig};
pub use credentials::{Argon2SecretHasher, ClaimSigner, CredentialService, DirectoryCredentials, SecretHasher};
pub use directory::{DirectoryNode, DirectoryStore, NewNode, NodeKind};
pub use error::{DirectoryError, DirectoryResult};
pub use permissions::{Permission, PermissionManager, Role};
pub use service::{DirectoryService, RequestContext};
