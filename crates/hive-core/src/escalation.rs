use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::types::{Escalation, EscalationStatus};

/// Aggregate escalation counts surfaced on dashboards.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EscalationStats {
    pub total: usize,
    pub pending: usize,
    pub in_review: usize,
    pub resolved: usize,
    pub cannot_fix: usize,
    pub wont_fix: usize,
    pub cancelled: usize,
    pub avg_resolution_secs: f64,
}

/// Tracks the lifecycle of hand-offs to human review.
///
/// Creation is idempotent on `(task_id, reason)`: re-submitting the same
/// escalation returns the existing record instead of creating a duplicate.
/// Resolution only happens through external HITL action.
#[derive(Default)]
pub struct EscalationManager {
    inner: Mutex<HashMap<String, Escalation>>,
}

impl EscalationManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create (or return the existing) escalation for `(task_id, reason)`.
    ///
    /// The returned bool is `true` when a new record was created.
    pub async fn create(
        &self,
        task_id: &str,
        worker_id: &str,
        reason: &str,
    ) -> (Escalation, bool) {
        let mut inner = self.inner.lock().await;
        if let Some(existing) = inner
            .values()
            .find(|e| e.task_id == task_id && e.reason == reason)
        {
            warn!(task_id, reason, id = %existing.id, "escalation already recorded");
            return (existing.clone(), false);
        }

        let escalation = Escalation::new(task_id, worker_id, reason);
        info!(id = %escalation.id, task_id, reason, "escalation created");
        inner.insert(escalation.id.clone(), escalation.clone());
        (escalation, true)
    }

    /// Move a pending escalation into human review.
    pub async fn assign(&self, escalation_id: &str) -> bool {
        let mut inner = self.inner.lock().await;
        match inner.get_mut(escalation_id) {
            Some(esc) if esc.status == EscalationStatus::Pending => {
                esc.status = EscalationStatus::InReview;
                true
            }
            _ => false,
        }
    }

    /// Record the human resolution of an escalation.
    pub async fn resolve(
        &self,
        escalation_id: &str,
        status: EscalationStatus,
        notes: impl Into<String>,
    ) -> bool {
        if !status.is_resolution() {
            warn!(escalation_id, ?status, "not a resolution status");
            return false;
        }
        let mut inner = self.inner.lock().await;
        match inner.get_mut(escalation_id) {
            Some(esc) => {
                esc.status = status;
                esc.notes = Some(notes.into());
                esc.resolved_at = Some(Utc::now());
                info!(escalation_id, ?status, "escalation resolved");
                true
            }
            None => {
                warn!(escalation_id, "escalation not found");
                false
            }
        }
    }

    pub async fn get(&self, escalation_id: &str) -> Option<Escalation> {
        self.inner.lock().await.get(escalation_id).cloned()
    }

    pub async fn pending(&self) -> Vec<Escalation> {
        let inner = self.inner.lock().await;
        let mut pending: Vec<Escalation> = inner
            .values()
            .filter(|e| e.status == EscalationStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        pending
    }

    pub async fn stats(&self) -> EscalationStats {
        let inner = self.inner.lock().await;
        let mut stats = EscalationStats {
            total: inner.len(),
            ..EscalationStats::default()
        };
        let mut resolution_secs = Vec::new();
        for esc in inner.values() {
            match esc.status {
                EscalationStatus::Pending => stats.pending += 1,
                EscalationStatus::InReview => stats.in_review += 1,
                EscalationStatus::Resolved => stats.resolved += 1,
                EscalationStatus::CannotFix => stats.cannot_fix += 1,
                EscalationStatus::WontFix => stats.wont_fix += 1,
                EscalationStatus::Cancelled => stats.cancelled += 1,
            }
            if let (EscalationStatus::Resolved, Some(resolved_at)) = (esc.status, esc.resolved_at) {
                resolution_secs
                    .push((resolved_at - esc.created_at).num_milliseconds() as f64 / 1000.0);
            }
        }
        if !resolution_secs.is_empty() {
            stats.avg_resolution_secs =
                resolution_secs.iter().sum::<f64>() / resolution_secs.len() as f64;
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_is_idempotent_on_task_and_reason() {
        let manager = EscalationManager::new();
        let (first, created) = manager.create("t-1", "qa-cc-1", "worker timeout").await;
        assert!(created);
        let (second, created) = manager.create("t-1", "qa-cc-1", "worker timeout").await;
        assert!(!created);
        assert_eq!(first.id, second.id);
        assert_eq!(manager.stats().await.total, 1);
    }

    #[tokio::test]
    async fn different_reason_creates_new_record() {
        let manager = EscalationManager::new();
        manager.create("t-1", "w-1", "worker timeout").await;
        let (_, created) = manager.create("t-1", "w-1", "fix budget exhausted").await;
        assert!(created);
        assert_eq!(manager.stats().await.total, 2);
    }

    #[tokio::test]
    async fn resolve_requires_resolution_status() {
        let manager = EscalationManager::new();
        let (esc, _) = manager.create("t-1", "w-1", "stuck").await;

        assert!(!manager.resolve(&esc.id, EscalationStatus::Pending, "nope").await);
        assert!(
            manager
                .resolve(&esc.id, EscalationStatus::Resolved, "fixed by hand")
                .await
        );

        let resolved = manager.get(&esc.id).await.expect("exists");
        assert_eq!(resolved.status, EscalationStatus::Resolved);
        assert!(resolved.resolved_at.is_some());
    }

    #[tokio::test]
    async fn pending_listing_excludes_resolved() {
        let manager = EscalationManager::new();
        let (a, _) = manager.create("t-1", "w-1", "one").await;
        manager.create("t-2", "w-2", "two").await;
        manager
            .resolve(&a.id, EscalationStatus::WontFix, "by design review")
            .await;

        let pending = manager.pending().await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].task_id, "t-2");
    }
}
