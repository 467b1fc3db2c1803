//! Bounded in-memory audit log with the query surface administrators use.

use crate::audit::event::{AuditAction, AuditEvent, AuditStatus};
use crate::audit::sink::AuditSink;
use crate::constants::DEFAULT_AUDIT_MAX_ENTRIES;
use crate::error::DirectoryResult;
use crate::path;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Default page size of the lookup queries.
pub const DEFAULT_QUERY_LIMIT: usize = 100;
/// Default page size of time-range queries.
pub const DEFAULT_RANGE_LIMIT: usize = 1000;

/// Per-action counts for one actor.
pub type ActorStats = HashMap<AuditAction, usize>;

/// Audit sink keeping the most recent `max_entries` events in memory.
///
/// Queries return newest first.
#[derive(Clone)]
pub struct InMemoryAuditLog {
    events: Arc<RwLock<Vec<AuditEvent>>>,
    max_entries: usize,
}

impl Default for InMemoryAuditLog {
    fn default() -> Self {
        Self::new(DEFAULT_AUDIT_MAX_ENTRIES)
    }
}

impl InMemoryAuditLog {
    pub fn new(max_entries: usize) -> Self {
        Self {
            events: Arc::new(RwLock::new(Vec::new())),
            max_entries: max_entries.max(1),
        }
    }

    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.events.read().await.is_empty()
    }

    /// Every retained event, oldest first.
    pub async fn all(&self) -> Vec<AuditEvent> {
        self.events.read().await.clone()
    }

    async fn newest_matching<F>(&self, limit: usize, predicate: F) -> Vec<AuditEvent>
    where
        F: Fn(&AuditEvent) -> bool,
    {
        self.events
            .read()
            .await
            .iter()
            .rev()
            .filter(|event| predicate(event))
            .take(limit)
            .cloned()
            .collect()
    }

    pub async fn by_actor(&self, actor_id: u64, limit: usize) -> Vec<AuditEvent> {
        self.newest_matching(limit, |e| e.actor_id == Some(actor_id)).await
    }

    pub async fn by_target(&self, target_id: u64, limit: usize) -> Vec<AuditEvent> {
        self.newest_matching(limit, |e| e.target_id == Some(target_id)).await
    }

    pub async fn by_action(&self, action: AuditAction, limit: usize) -> Vec<AuditEvent> {
        self.newest_matching(limit, |e| e.action == action).await
    }

    /// Events whose recorded scope lies within `scope_path`.
    pub async fn by_scope(&self, scope_path: &str, limit: usize) -> Vec<AuditEvent> {
        self.newest_matching(limit, |e| {
            e.scope
                .as_deref()
                .is_some_and(|scope| path::is_descendant_or_self(scope_path, scope))
        })
        .await
    }

    /// Events with `from <= timestamp <= to`.
    pub async fn by_time_range(&self, from: DateTime<Utc>, to: DateTime<Utc>, limit: usize) -> Vec<AuditEvent> {
        self.newest_matching(limit, |e| e.timestamp >= from && e.timestamp <= to)
            .await
    }

    pub async fn by_status(&self, status: AuditStatus, limit: usize) -> Vec<AuditEvent> {
        self.newest_matching(limit, |e| e.status == status).await
    }

    pub async fn actor_stats(&self, actor_id: u64) -> ActorStats {
        let mut stats = ActorStats::new();
        for event in self.events.read().await.iter() {
            if event.actor_id == Some(actor_id) {
                *stats.entry(event.action).or_insert(0) += 1;
            }
        }
        stats
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditLog {
    async fn record(&self, event: AuditEvent) -> DirectoryResult<()> {
        let target = event
            .target_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string());
        match event.status {
            AuditStatus::Success => log::info!(
                "AUDIT: {} by {} ({:?}) on {} scope={:?}",
                event.action,
                event.actor_name,
                event.actor_id,
                target,
                event.scope
            ),
            _ => log::warn!(
                "AUDIT: {} {} by {} ({:?}) on {} scope={:?}: {}",
                event.action,
                event.status,
                event.actor_name,
                event.actor_id,
                target,
                event.scope,
                event.error_message.as_deref().unwrap_or("")
            ),
        }

        let mut events = self.events.write().await;
        events.push(event);
        if events.len() > self.max_entries {
            let excess = events.len() - self.max_entries;
            events.drain(0..excess);
        }
        Ok(())
    }
}
