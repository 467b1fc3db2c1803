//! Authorization: caller identity, operation descriptors and the decision
//! pipeline (identity, role, scope, anti-escalation).

pub mod decision;
pub mod engine;
pub mod guards;
pub mod identity;
pub mod request;

pub use decision::{Decision, DenyReason, Evaluation, Stage};
pub use engine::AuthorizationEngine;
pub use identity::CallerIdentity;
pub use request::{AccessRequest, Operation};
