use crate::audit::event::AuditEvent;
use crate::error::DirectoryResult;
use async_trait::async_trait;

/// Destination for audit events.
///
/// Implementations must not drop events silently. A failed `record` is
/// reported to the caller, which logs it without undoing the business
/// operation that already succeeded.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: AuditEvent) -> DirectoryResult<()>;
}
