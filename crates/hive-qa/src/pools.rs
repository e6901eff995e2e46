use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hive_core::types::{PatternMatch, Task, Violation};
use hive_harness::{CircuitBreaker, CircuitState};
use hive_transport::Transport;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// No worker slot is available; the task stays queued and is retried
    /// on the next polling tick.
    #[error("pool saturated (capacity {capacity})")]
    Saturated { capacity: usize },

    #[error("fast-fix circuit is open")]
    CircuitOpen,

    #[error("fast-fix execution exceeded {0:?}")]
    DeadlineExceeded(Duration),

    #[error("fast-fix execution failed: {0}")]
    ExecutionFailed(String),

    #[error("transport error: {0}")]
    Transport(#[from] hive_transport::TransportError),
}

pub type Result<T> = std::result::Result<T, PoolError>;

// ---------------------------------------------------------------------------
// Fast-fix pool
// ---------------------------------------------------------------------------

/// The work handed to a fast fixer.
#[derive(Debug, Clone)]
pub struct QaWorkflow {
    pub task: Task,
    pub violations: Vec<Violation>,
    pub context: Vec<PatternMatch>,
}

/// What a fast fixer reports back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixReport {
    pub task_id: String,
    pub fixed: usize,
    pub remaining: usize,
    pub summary: String,
}

/// In-process executor that repairs a violation batch synchronously within
/// a bounded deadline.
#[async_trait]
pub trait FastFixer: Send + Sync {
    async fn execute(&self, workflow: &QaWorkflow) -> std::result::Result<FixReport, String>;
}

/// Bounded pool of in-process fast fixers.
///
/// Capacity is enforced with a semaphore; a per-operation deadline turns
/// slow executions into failures, which feed the circuit breaker. An open
/// circuit rejects work until its half-open probe succeeds.
pub struct FastFixPool {
    fixer: Arc<dyn FastFixer>,
    semaphore: Arc<tokio::sync::Semaphore>,
    capacity: usize,
    deadline: Duration,
    breaker: CircuitBreaker,
}

impl FastFixPool {
    pub fn new(
        fixer: Arc<dyn FastFixer>,
        capacity: usize,
        deadline: Duration,
        breaker: CircuitBreaker,
    ) -> Self {
        Self {
            fixer,
            semaphore: Arc::new(tokio::sync::Semaphore::new(capacity)),
            capacity,
            deadline,
            breaker,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn active_count(&self) -> usize {
        self.capacity - self.semaphore.available_permits()
    }

    pub fn breaker_state(&self) -> CircuitState {
        self.breaker.state()
    }

    /// Execute the workflow if a slot is free and the circuit allows it.
    pub async fn try_execute(&self, workflow: &QaWorkflow) -> Result<FixReport> {
        let Ok(_permit) = self.semaphore.clone().try_acquire_owned() else {
            return Err(PoolError::Saturated {
                capacity: self.capacity,
            });
        };

        if !self.breaker.allow_call() {
            return Err(PoolError::CircuitOpen);
        }

        match tokio::time::timeout(self.deadline, self.fixer.execute(workflow)).await {
            Ok(Ok(report)) => {
                self.breaker.record_success();
                info!(task_id = %report.task_id, fixed = report.fixed, "fast-fix complete");
                Ok(report)
            }
            Ok(Err(e)) => {
                self.breaker.record_failure();
                warn!(task_id = %workflow.task.id, error = %e, "fast-fix failed");
                Err(PoolError::ExecutionFailed(e))
            }
            Err(_) => {
                // Exceeded deadlines count as failures against the breaker.
                self.breaker.record_failure();
                warn!(task_id = %workflow.task.id, deadline = ?self.deadline, "fast-fix deadline exceeded");
                Err(PoolError::DeadlineExceeded(self.deadline))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Heavy-fix pool
// ---------------------------------------------------------------------------

/// A spawned heavy-fix worker: a terminal pane driven over the sentinel
/// protocol, tracked with a heartbeat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeavyWorker {
    pub id: String,
    pub pane: String,
    pub task_id: String,
    pub interactive: bool,
    pub spawned_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
}

/// Bounded pool of spawned heavy-fix terminals.
///
/// Slots are freed explicitly by [`release`](HeavyFixPool::release) (worker
/// finished) or by the monitor when a worker times out.
pub struct HeavyFixPool {
    transport: Arc<dyn Transport>,
    capacity: usize,
    workers: Mutex<HashMap<String, HeavyWorker>>,
}

impl HeavyFixPool {
    pub fn new(transport: Arc<dyn Transport>, capacity: usize) -> Self {
        Self {
            transport,
            capacity,
            workers: Mutex::new(HashMap::new()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub async fn active_count(&self) -> usize {
        self.workers.lock().await.len()
    }

    pub async fn workers(&self) -> Vec<HeavyWorker> {
        self.workers.lock().await.values().cloned().collect()
    }

    /// Spawn a worker pane for the task and register it with a fresh
    /// heartbeat. The capacity check and registration happen under one lock
    /// so the bound can never be exceeded.
    pub async fn spawn(
        &self,
        task: &Task,
        startup_script: &str,
        interactive: bool,
    ) -> Result<HeavyWorker> {
        let mut workers = self.workers.lock().await;
        if workers.len() >= self.capacity {
            return Err(PoolError::Saturated {
                capacity: self.capacity,
            });
        }

        let id = format!("qa-cc-{}", &Uuid::new_v4().simple().to_string()[..8]);
        let pane = id.clone();
        self.transport
            .spawn_pane(&pane, Some(startup_script))
            .await?;

        let now = Utc::now();
        let worker = HeavyWorker {
            id: id.clone(),
            pane,
            task_id: task.id.clone(),
            interactive,
            spawned_at: now,
            last_heartbeat: now,
        };
        workers.insert(id.clone(), worker.clone());
        info!(worker_id = %id, task_id = %task.id, interactive, "heavy-fix worker spawned");
        Ok(worker)
    }

    /// Refresh a worker's heartbeat.
    pub async fn mark_heartbeat(&self, worker_id: &str) {
        if let Some(worker) = self.workers.lock().await.get_mut(worker_id) {
            worker.last_heartbeat = Utc::now();
        }
    }

    /// Free the worker's slot and kill its pane.
    pub async fn release(&self, worker_id: &str) -> Result<()> {
        let removed = self.workers.lock().await.remove(worker_id);
        if let Some(worker) = removed {
            self.transport.kill_pane(&worker.pane).await?;
            info!(worker_id, "heavy-fix worker released");
        }
        Ok(())
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }
}
