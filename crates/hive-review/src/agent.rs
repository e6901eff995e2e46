use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use hive_bus::{EventBus, EventKind, TaskEvent};
use hive_core::escalation::EscalationManager;
use hive_core::store::TaskStore;
use hive_core::types::{FixOutcome, ReviewDecision, Task, TaskStatus};
use hive_harness::ShutdownSignal;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::autofix::AutoFixLoop;
use crate::engine::ReviewEngine;

const SOURCE_AGENT: &str = "ai-reviewer";

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Session counters, reported periodically and in the shutdown summary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReviewerStats {
    pub reviewed: u64,
    pub approved: u64,
    pub rejected: u64,
    pub rework: u64,
    pub escalated: u64,
    pub auto_fixed: u64,
    pub fix_attempts: u64,
    pub errors: u64,
    pub started_at: Option<DateTime<Utc>>,
}

impl ReviewerStats {
    fn record_decision(&mut self, decision: ReviewDecision) {
        match decision {
            ReviewDecision::Approve => self.approved += 1,
            ReviewDecision::Reject => self.rejected += 1,
            ReviewDecision::Rework => self.rework += 1,
            ReviewDecision::Escalate => self.escalated += 1,
        }
    }

    /// One-line session summary for the shutdown log.
    pub fn summary(&self) -> String {
        let runtime = self
            .started_at
            .map(|start| (Utc::now() - start).num_seconds())
            .unwrap_or(0);
        format!(
            "runtime={runtime}s reviewed={} approved={} rejected={} rework={} escalated={} auto_fixed={} fix_attempts={} errors={}",
            self.reviewed,
            self.approved,
            self.rejected,
            self.rework,
            self.escalated,
            self.auto_fixed,
            self.fix_attempts,
            self.errors,
        )
    }
}

// ---------------------------------------------------------------------------
// ReviewerAgent
// ---------------------------------------------------------------------------

/// Long-running daemon that claims review-pending tasks, reviews them, runs
/// the auto-fix loop on rejections, and publishes the outcome.
pub struct ReviewerAgent {
    store: Arc<dyn TaskStore>,
    engine: ReviewEngine,
    autofix: Option<AutoFixLoop>,
    escalations: Arc<EscalationManager>,
    bus: Arc<dyn EventBus>,
    polling_interval: Duration,
    shutdown: ShutdownSignal,
    stats: Mutex<ReviewerStats>,
}

impl ReviewerAgent {
    pub fn new(
        store: Arc<dyn TaskStore>,
        engine: ReviewEngine,
        autofix: Option<AutoFixLoop>,
        escalations: Arc<EscalationManager>,
        bus: Arc<dyn EventBus>,
        polling_interval: Duration,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            store,
            engine,
            autofix,
            escalations,
            bus,
            polling_interval,
            shutdown,
            stats: Mutex::new(ReviewerStats::default()),
        }
    }

    pub async fn stats(&self) -> ReviewerStats {
        self.stats.lock().await.clone()
    }

    /// Main autonomous loop; exits at the next cycle boundary once the
    /// shutdown signal fires.
    pub async fn run(&self) -> anyhow::Result<()> {
        {
            let mut stats = self.stats.lock().await;
            stats.started_at = Some(Utc::now());
        }
        info!(
            polling_secs = self.polling_interval.as_secs(),
            auto_fix = self.autofix.is_some(),
            "ai-reviewer agent started"
        );

        let mut interval = tokio::time::interval(self.polling_interval);
        interval.tick().await;
        let mut shutdown_rx = self.shutdown.subscribe();

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.process_queue().await;
                }
                _ = shutdown_rx.recv() => {
                    info!("shutdown signal received");
                    break;
                }
            }
        }

        let stats = self.stats.lock().await;
        info!(summary = %stats.summary(), "ai-reviewer session complete");
        Ok(())
    }

    /// One polling pass over the review queue.
    pub async fn process_queue(&self) {
        let pending = match self.store.get_by_status(TaskStatus::ReviewPending).await {
            Ok(pending) => pending,
            Err(e) => {
                error!(error = %e, "failed to query review queue");
                self.stats.lock().await.errors += 1;
                return;
            }
        };
        if pending.is_empty() {
            return;
        }
        info!(count = pending.len(), "tasks pending review");

        for task in pending {
            if self.shutdown.is_shutting_down() {
                break;
            }
            // Atomic claim; losers skip the task.
            match self
                .store
                .claim(&task.id, TaskStatus::ReviewPending, TaskStatus::InProgress)
                .await
            {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    error!(task_id = %task.id, error = %e, "claim failed");
                    self.stats.lock().await.errors += 1;
                    continue;
                }
            }

            if let Err(e) = self.review_task(&task).await {
                error!(task_id = %task.id, error = %e, "review failed, escalating task");
                self.stats.lock().await.errors += 1;
                let _ = self
                    .store
                    .set_status(
                        &task.id,
                        TaskStatus::Escalated,
                        serde_json::json!({"error": e.to_string()}),
                    )
                    .await;
                self.publish(
                    EventKind::Escalated,
                    &task,
                    serde_json::json!({"escalation_reason": format!("review error: {e}")}),
                );
            }
        }
    }

    async fn review_task(&self, task: &Task) -> anyhow::Result<()> {
        info!(task_id = %task.id, description = %task.description, "reviewing task");
        let mut artifacts = self.store.load_artifacts(&task.id).await?;

        // Nothing to review is an immediate hand-off to humans.
        if artifacts.code_files.is_empty() {
            warn!(task_id = %task.id, "no code files, escalating");
            self.store
                .set_status(
                    &task.id,
                    TaskStatus::Escalated,
                    serde_json::json!({"reason": "no code files"}),
                )
                .await?;
            self.escalations
                .create(&task.id, SOURCE_AGENT, "no code files")
                .await;
            self.publish(
                EventKind::Escalated,
                task,
                serde_json::json!({"escalation_reason": "no code files"}),
            );
            let mut stats = self.stats.lock().await;
            stats.reviewed += 1;
            stats.escalated += 1;
            return Ok(());
        }

        let mut verdict = self
            .engine
            .review(&task.id, &task.description, &artifacts)
            .await;
        let mut fix_attempts = 0u32;
        let mut fix_escalation = None;

        if verdict.decision == ReviewDecision::Reject {
            if let Some(autofix) = &self.autofix {
                info!(task_id = %task.id, "attempting auto-fix for rejected task");
                let validation = artifacts.test_results.clone().unwrap_or_default();
                let outcome = autofix.try_fix(task, &validation).await;
                fix_attempts = outcome.session.attempt_count;

                if outcome.fixed() {
                    info!(task_id = %task.id, "auto-fix succeeded, re-running review");
                    artifacts = self.store.load_artifacts(&task.id).await?;
                    verdict = self
                        .engine
                        .review(&task.id, &task.description, &artifacts)
                        .await;
                    let mut stats = self.stats.lock().await;
                    stats.auto_fixed += 1;
                } else if outcome.session.outcome == FixOutcome::Escalated {
                    fix_escalation = outcome.report;
                } else {
                    warn!(task_id = %task.id, "auto-fix failed, keeping reject decision");
                }
            }
        }

        // A fix session that escalated overrides the verdict.
        if let Some(report) = &fix_escalation {
            verdict.decision = ReviewDecision::Escalate;
            verdict.escalation_reason = Some(report.reason.as_str().to_string());
        }

        // Per-task ordering: REVIEW_COMPLETED strictly precedes the
        // decision event.
        self.publish(
            EventKind::ReviewCompleted,
            task,
            serde_json::json!({
                "review_decision": verdict.decision.as_str(),
                "overall_score": verdict.overall_score(),
                "summary": verdict.summary.clone(),
            }),
        );

        let new_status = match verdict.decision {
            ReviewDecision::Approve => TaskStatus::Approved,
            ReviewDecision::Reject => TaskStatus::Rejected,
            ReviewDecision::Rework => TaskStatus::ReworkNeeded,
            ReviewDecision::Escalate => TaskStatus::Escalated,
        };
        self.store
            .set_status(&task.id, new_status, verdict.to_metadata())
            .await?;

        match verdict.decision {
            ReviewDecision::Approve => {
                self.publish(
                    EventKind::Approved,
                    task,
                    serde_json::json!({
                        "overall_score": verdict.overall_score(),
                        "summary": verdict.summary.clone(),
                        "reviewed_by": SOURCE_AGENT,
                    }),
                );
            }
            ReviewDecision::Reject | ReviewDecision::Rework => {
                self.publish(
                    EventKind::Rejected,
                    task,
                    serde_json::json!({
                        "review_decision": verdict.decision.as_str(),
                        "summary": verdict.summary.clone(),
                        "issues": verdict.issues.clone(),
                        "suggestions": verdict.suggestions.clone(),
                    }),
                );
            }
            ReviewDecision::Escalate => {
                let reason = verdict
                    .escalation_reason
                    .clone()
                    .unwrap_or_else(|| verdict.summary.clone());
                self.escalations.create(&task.id, SOURCE_AGENT, &reason).await;
                let mut payload = serde_json::json!({"escalation_reason": reason});
                if let Some(report) = &fix_escalation {
                    payload["fix_attempts"] = serde_json::json!(report.attempt_count);
                    payload["applied_fixes"] = serde_json::to_value(&report.applied_fixes)?;
                    payload["last_validator_output"] =
                        serde_json::json!(report.last_validator_output.clone());
                }
                self.publish(EventKind::Escalated, task, payload);
            }
        }

        let mut stats = self.stats.lock().await;
        stats.reviewed += 1;
        stats.fix_attempts += fix_attempts as u64;
        stats.record_decision(verdict.decision);
        info!(task_id = %task.id, decision = verdict.decision.as_str(), "review completed");
        Ok(())
    }

    fn publish(&self, kind: EventKind, task: &Task, payload: serde_json::Value) {
        self.bus.publish(
            TaskEvent::new(kind, &task.id, SOURCE_AGENT)
                .with_correlation(task.correlation_id.clone())
                .with_payload(payload),
        );
    }
}
