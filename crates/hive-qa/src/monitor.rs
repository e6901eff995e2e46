use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use hive_bus::{EventBus, EventKind, TaskEvent};
use hive_core::escalation::EscalationManager;
use hive_harness::ShutdownSignal;
use hive_transport::sentinel;
use tracing::{debug, info, warn};

use crate::pools::HeavyFixPool;

const SOURCE_AGENT: &str = "qa-agent-monitor";

/// Health monitor for spawned heavy-fix workers.
///
/// Every heartbeat interval it refreshes worker heartbeats from their pane
/// output and escalates workers whose heartbeat is older than the timeout:
/// the worker is recorded as an escalation, a `qa.escalation` event is
/// published, and its slot is freed. A `qa.monitor.heartbeat` event carries
/// the aggregate picture each cycle.
pub struct WorkerMonitor {
    heavy: Arc<HeavyFixPool>,
    escalations: Arc<EscalationManager>,
    bus: Arc<dyn EventBus>,
    heartbeat_interval: Duration,
    worker_timeout: Duration,
    capture_tail: usize,
    shutdown: ShutdownSignal,
    failures_detected: AtomicU64,
}

impl WorkerMonitor {
    pub fn new(
        heavy: Arc<HeavyFixPool>,
        escalations: Arc<EscalationManager>,
        bus: Arc<dyn EventBus>,
        heartbeat_interval: Duration,
        worker_timeout: Duration,
        capture_tail: usize,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            heavy,
            escalations,
            bus,
            heartbeat_interval,
            worker_timeout,
            capture_tail,
            shutdown,
            failures_detected: AtomicU64::new(0),
        }
    }

    pub fn failures_detected(&self) -> u64 {
        self.failures_detected.load(Ordering::Relaxed)
    }

    /// Background monitoring loop; exits on shutdown.
    pub async fn run(&self) {
        info!(
            interval_secs = self.heartbeat_interval.as_secs(),
            timeout_secs = self.worker_timeout.as_secs(),
            "worker monitor started"
        );
        let mut interval = tokio::time::interval(self.heartbeat_interval);
        interval.tick().await;
        let mut shutdown_rx = self.shutdown.subscribe();

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.cycle().await;
                }
                _ = shutdown_rx.recv() => {
                    info!("worker monitor stopped");
                    break;
                }
            }
        }
    }

    /// One monitoring cycle, public for tests.
    pub async fn cycle(&self) {
        self.refresh_heartbeats().await;

        let now = Utc::now();
        let mut healthy = 0usize;
        let mut unhealthy = Vec::new();
        for worker in self.heavy.workers().await {
            let stale_for = (now - worker.last_heartbeat)
                .to_std()
                .unwrap_or(Duration::ZERO);
            if stale_for > self.worker_timeout {
                unhealthy.push(worker);
            } else {
                healthy += 1;
            }
        }

        for worker in unhealthy {
            self.failures_detected.fetch_add(1, Ordering::Relaxed);
            warn!(
                worker_id = %worker.id,
                task_id = %worker.task_id,
                last_heartbeat = %worker.last_heartbeat,
                "worker timed out, escalating"
            );

            let (escalation, _) = self
                .escalations
                .create(&worker.task_id, &worker.id, "worker timeout")
                .await;
            self.bus.publish(
                TaskEvent::new(EventKind::QaEscalation, &worker.task_id, SOURCE_AGENT)
                    .with_payload(serde_json::json!({
                        "escalation_id": escalation.id,
                        "worker_id": worker.id.clone(),
                        "reason": "worker timeout",
                        "last_heartbeat": worker.last_heartbeat,
                        "timeout_secs": self.worker_timeout.as_secs(),
                    })),
            );

            // Offline workers free their slot immediately.
            if let Err(e) = self.heavy.release(&worker.id).await {
                warn!(worker_id = %worker.id, error = %e, "failed to release worker");
            }
        }

        self.bus.publish(
            TaskEvent::new(EventKind::QaMonitorHeartbeat, "-", SOURCE_AGENT).with_payload(
                serde_json::json!({
                    "healthy_workers": healthy,
                    "total_failures_detected": self.failures_detected(),
                }),
            ),
        );
    }

    /// A worker is alive as long as its pane shows sentinel output for its
    /// task; any visible region (complete or not) refreshes the heartbeat.
    async fn refresh_heartbeats(&self) {
        for worker in self.heavy.workers().await {
            let lines = match self
                .heavy
                .transport()
                .capture(&worker.pane, self.capture_tail)
                .await
            {
                Ok(lines) => lines,
                Err(e) => {
                    debug!(worker_id = %worker.id, error = %e, "capture failed");
                    continue;
                }
            };
            let begin = sentinel::begin_marker(&worker.task_id);
            if lines.iter().any(|l| l.contains(&begin)) {
                self.heavy.mark_heartbeat(&worker.id).await;
            }
        }
    }
}
