//! Audit trail: event records, the sink contract and an in-memory sink.

pub mod event;
pub mod memory;
pub mod sink;

pub use event::{AuditAction, AuditEvent, AuditStatus, ClientContext};
pub use memory::{ActorStats, InMemoryAuditLog, DEFAULT_QUERY_LIMIT, DEFAULT_RANGE_LIMIT};
pub use sink::AuditSink;
