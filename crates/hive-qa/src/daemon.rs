use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use hive_bus::{EventBus, EventKind, TaskEvent};
use hive_core::config::QaConfig;
use hive_core::escalation::EscalationManager;
use hive_core::store::TaskStore;
use hive_core::types::{FooterStatus, Task, TaskStatus, WorkerDecision, WorkerType};
use hive_harness::ShutdownSignal;
use hive_transport::Dispatcher;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::decision::WorkerDecisionEngine;
use crate::pools::{FastFixPool, HeavyFixPool, PoolError, QaWorkflow};
use crate::rag;

const SOURCE_AGENT: &str = "qa-agent";

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QaMetrics {
    pub processed: u64,
    pub fast: u64,
    pub heavy: u64,
    pub escalated: u64,
    pub failed: u64,
    pub requeued: u64,
    pub started_at: Option<DateTime<Utc>>,
}

impl QaMetrics {
    pub fn summary(&self) -> String {
        let pct = |n: u64| {
            if self.processed == 0 {
                0.0
            } else {
                (n as f64 / self.processed as f64) * 100.0
            }
        };
        format!(
            "processed={} fast={} ({:.1}%) heavy={} ({:.1}%) escalated={} ({:.1}%) failed={} ({:.1}%) requeued={}",
            self.processed,
            self.fast,
            pct(self.fast),
            self.heavy,
            pct(self.heavy),
            self.escalated,
            pct(self.escalated),
            self.failed,
            pct(self.failed),
            self.requeued,
        )
    }
}

// ---------------------------------------------------------------------------
// QaDaemon
// ---------------------------------------------------------------------------

/// Autonomous quality-enforcement daemon.
///
/// Claims queued QA tasks, scores their violation batches, and routes them
/// to the fast in-process pool or to spawned heavy-fix terminals. Saturated
/// pools leave the task queued for the next tick rather than queueing
/// unboundedly inside the agent.
pub struct QaDaemon {
    store: Arc<dyn TaskStore>,
    engine: WorkerDecisionEngine,
    fast: Arc<FastFixPool>,
    heavy: Arc<HeavyFixPool>,
    dispatcher: Arc<Dispatcher>,
    escalations: Arc<EscalationManager>,
    bus: Arc<dyn EventBus>,
    config: QaConfig,
    shutdown: ShutdownSignal,
    metrics: Mutex<QaMetrics>,
}

impl QaDaemon {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn TaskStore>,
        engine: WorkerDecisionEngine,
        fast: Arc<FastFixPool>,
        heavy: Arc<HeavyFixPool>,
        dispatcher: Arc<Dispatcher>,
        escalations: Arc<EscalationManager>,
        bus: Arc<dyn EventBus>,
        config: QaConfig,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            store,
            engine,
            fast,
            heavy,
            dispatcher,
            escalations,
            bus,
            config,
            shutdown,
            metrics: Mutex::new(QaMetrics::default()),
        }
    }

    pub async fn metrics(&self) -> QaMetrics {
        self.metrics.lock().await.clone()
    }

    /// Main daemon loop; exits at the next cycle boundary after shutdown.
    pub async fn run(&self) -> anyhow::Result<()> {
        {
            let mut metrics = self.metrics.lock().await;
            metrics.started_at = Some(Utc::now());
        }
        info!(
            poll_secs = self.config.poll_interval_secs,
            max_fast = self.config.max_fast,
            max_heavy = self.config.max_heavy,
            "qa-agent daemon started"
        );

        let mut interval = tokio::time::interval(Duration::from_secs(self.config.poll_interval_secs));
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

        let metrics = self.metrics.lock().await;
        info!(summary = %metrics.summary(), "qa-agent session complete");
        Ok(())
    }

    /// One polling pass: claim and route every queued QA task.
    pub async fn process_queue(&self) {
        let queued = match self.store.get_by_status(TaskStatus::Queued).await {
            Ok(queued) => queued,
            Err(e) => {
                error!(error = %e, "failed to query queue");
                return;
            }
        };

        for task in queued {
            if self.shutdown.is_shutting_down() {
                break;
            }
            match self
                .store
                .claim(&task.id, TaskStatus::Queued, TaskStatus::InProgress)
                .await
            {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    error!(task_id = %task.id, error = %e, "claim failed");
                    continue;
                }
            }

            if let Err(e) = self.process_task(&task).await {
                error!(task_id = %task.id, error = %e, "task processing failed");
                let mut metrics = self.metrics.lock().await;
                metrics.failed += 1;
                let _ = self
                    .store
                    .set_status(
                        &task.id,
                        TaskStatus::Failed,
                        serde_json::json!({"error": e.to_string()}),
                    )
                    .await;
            }
        }
    }

    async fn process_task(&self, task: &Task) -> anyhow::Result<()> {
        let violations = task.violations();
        self.metrics.lock().await.processed += 1;

        if violations.is_empty() {
            warn!(task_id = %task.id, "no violations in payload, marking complete");
            self.store
                .set_status(
                    &task.id,
                    TaskStatus::Approved,
                    serde_json::json!({"note": "no violations"}),
                )
                .await?;
            return Ok(());
        }

        let decision = self.engine.decide(&violations).await;
        info!(
            task_id = %task.id,
            worker_type = ?decision.worker_type,
            reason = %decision.reason,
            "routing decision"
        );

        match decision.worker_type {
            WorkerType::FastFix => self.route_fast(task, violations, decision).await,
            WorkerType::HeavyFixHeadless => self.route_heavy(task, decision, false).await,
            WorkerType::HeavyFixWithHuman => self.route_heavy(task, decision, true).await,
        }
    }

    async fn route_fast(
        &self,
        task: &Task,
        violations: Vec<hive_core::types::Violation>,
        decision: WorkerDecision,
    ) -> anyhow::Result<()> {
        let workflow = QaWorkflow {
            task: task.clone(),
            violations,
            context: decision.context.clone(),
        };

        match self.fast.try_execute(&workflow).await {
            Ok(report) if report.remaining == 0 => {
                self.metrics.lock().await.fast += 1;
                self.store
                    .set_status(&task.id, TaskStatus::Approved, serde_json::to_value(&report)?)
                    .await?;
                Ok(())
            }
            Ok(report) => {
                // Partial fix: escalate the leftovers to a heavy worker.
                info!(task_id = %task.id, remaining = report.remaining, "fast-fix left violations, going heavy");
                self.route_heavy(task, decision, false).await
            }
            Err(PoolError::Saturated { .. }) | Err(PoolError::CircuitOpen) => {
                self.requeue(task).await
            }
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "fast-fix failed, escalating");
                self.escalate_task(task, &format!("fast-fix failed: {e}"), &decision)
                    .await
            }
        }
    }

    async fn route_heavy(
        &self,
        task: &Task,
        decision: WorkerDecision,
        interactive: bool,
    ) -> anyhow::Result<()> {
        let context = rag::batch_context(&decision.context, 2000);
        let command = format!(
            "{context}\n\nFix the following violations in {}:\n{}",
            task.service_directory
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| ".".into()),
            task.payload["violations"]
        );

        let worker = match self.heavy.spawn(task, "", interactive).await {
            Ok(worker) => worker,
            Err(PoolError::Saturated { .. }) => return self.requeue(task).await,
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "heavy spawn failed, escalating");
                return self
                    .escalate_task(task, &format!("heavy-fix spawn failed: {e}"), &decision)
                    .await;
            }
        };
        self.metrics.lock().await.heavy += 1;

        if interactive {
            // HITL: the human drives the spawned terminal; record the
            // hand-off and stop here.
            self.dispatcher
                .dispatch(&worker.pane, &task.id, &command, Duration::ZERO)
                .await
                .ok();
            self.metrics.lock().await.escalated += 1;
            self.store
                .set_status(
                    &task.id,
                    TaskStatus::Escalated,
                    serde_json::json!({"reason": decision.reason.clone(), "worker_id": worker.id.clone()}),
                )
                .await?;
            let (escalation, _) = self
                .escalations
                .create(&task.id, &worker.id, &decision.reason)
                .await;
            self.bus.publish(
                TaskEvent::new(EventKind::QaEscalation, &task.id, SOURCE_AGENT)
                    .with_correlation(task.correlation_id.clone())
                    .with_payload(serde_json::json!({
                        "escalation_id": escalation.id,
                        "worker_id": worker.id.clone(),
                        "reason": decision.reason.clone(),
                    })),
            );
            return Ok(());
        }

        // Headless: drive the worker over the sentinel protocol and follow
        // it to completion in the background.
        let dispatcher = self.dispatcher.clone();
        let store = self.store.clone();
        let heavy = self.heavy.clone();
        let escalations = self.escalations.clone();
        let bus = self.bus.clone();
        let timeout = Duration::from_secs(self.config.worker_timeout_secs);
        let task = task.clone();
        tokio::spawn(async move {
            let footer = match dispatcher
                .round_trip(&worker.pane, &task.id, &command, timeout)
                .await
            {
                Ok(footer) => footer,
                Err(e) => {
                    error!(task_id = %task.id, error = %e, "heavy dispatch failed");
                    hive_core::types::StatusFooter::failed(e.to_string())
                }
            };

            let _ = heavy.release(&worker.id).await;

            match footer.status {
                FooterStatus::Success => {
                    info!(task_id = %task.id, "heavy-fix complete, sending to review");
                    let _ = store
                        .set_status(
                            &task.id,
                            TaskStatus::ReviewPending,
                            serde_json::json!({"changes": footer.changes}),
                        )
                        .await;
                }
                status => {
                    let reason = match status {
                        FooterStatus::Timeout => "worker timeout".to_string(),
                        _ => format!("worker reported {}", status.as_str()),
                    };
                    warn!(task_id = %task.id, reason, "heavy-fix did not succeed");
                    let _ = store
                        .set_status(
                            &task.id,
                            TaskStatus::Escalated,
                            serde_json::json!({"reason": reason.clone()}),
                        )
                        .await;
                    let (escalation, _) =
                        escalations.create(&task.id, &worker.id, &reason).await;
                    bus.publish(
                        TaskEvent::new(EventKind::QaEscalation, &task.id, SOURCE_AGENT)
                            .with_correlation(task.correlation_id.clone())
                            .with_payload(serde_json::json!({
                                "escalation_id": escalation.id,
                                "worker_id": worker.id,
                                "reason": reason,
                            })),
                    );
                }
            }
        });

        Ok(())
    }

    /// Saturated pool: put the task back in the queue for the next tick.
    async fn requeue(&self, task: &Task) -> anyhow::Result<()> {
        info!(task_id = %task.id, "pool saturated, requeueing");
        self.metrics.lock().await.requeued += 1;
        self.store
            .set_status(&task.id, TaskStatus::Queued, serde_json::Value::Null)
            .await?;
        Ok(())
    }

    async fn escalate_task(
        &self,
        task: &Task,
        reason: &str,
        decision: &WorkerDecision,
    ) -> anyhow::Result<()> {
        self.metrics.lock().await.escalated += 1;
        self.store
            .set_status(
                &task.id,
                TaskStatus::Escalated,
                serde_json::json!({"reason": reason}),
            )
            .await?;
        let (escalation, _) = self.escalations.create(&task.id, SOURCE_AGENT, reason).await;
        self.bus.publish(
            TaskEvent::new(EventKind::QaEscalation, &task.id, SOURCE_AGENT)
                .with_correlation(task.correlation_id.clone())
                .with_payload(serde_json::json!({
                    "escalation_id": escalation.id,
                    "reason": reason,
                    "complexity_score": decision.complexity_score,
                    "rag_confidence": decision.rag_confidence,
                })),
        );
        Ok(())
    }
}
