use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::types::{Task, TaskArtifacts, TaskStatus};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("task not found: {0}")]
    NotFound(String),
    #[error("invalid transition for {task_id}: {from:?} -> {to:?}")]
    InvalidTransition {
        task_id: String,
        from: TaskStatus,
        to: TaskStatus,
    },
    #[error("store backend error: {0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

// ---------------------------------------------------------------------------
// TaskStore contract
// ---------------------------------------------------------------------------

/// Shared task ledger. Implementations are free (relational, document, KV)
/// provided the compare-and-set semantics of [`claim`](TaskStore::claim) hold:
/// no two agents may move the same task out of the same status.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn get_by_status(&self, status: TaskStatus) -> Result<Vec<Task>>;

    /// Atomically transition `task_id` from `expected` to `new`.
    ///
    /// Returns `Ok(false)` when the task is no longer in `expected` (another
    /// agent won the claim); the loser retries on its next tick.
    async fn claim(&self, task_id: &str, expected: TaskStatus, new: TaskStatus) -> Result<bool>;

    /// Transition `task_id` to `status`, attaching decision metadata.
    async fn set_status(
        &self,
        task_id: &str,
        status: TaskStatus,
        metadata: serde_json::Value,
    ) -> Result<()>;

    async fn load_artifacts(&self, task_id: &str) -> Result<TaskArtifacts>;

    async fn insert(&self, task: Task) -> Result<()>;

    async fn get(&self, task_id: &str) -> Result<Option<Task>>;
}

// ---------------------------------------------------------------------------
// MemoryTaskStore
// ---------------------------------------------------------------------------

struct Entry {
    task: Task,
    artifacts: TaskArtifacts,
    metadata: Vec<serde_json::Value>,
}

/// In-memory task store with compare-and-set status transitions.
///
/// Used by tests and single-process deployments; the daemons only ever see
/// the [`TaskStore`] trait.
#[derive(Default)]
pub struct MemoryTaskStore {
    inner: Mutex<HashMap<String, Entry>>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach review artifacts to an existing task.
    pub async fn put_artifacts(&self, task_id: &str, artifacts: TaskArtifacts) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let entry = inner
            .get_mut(task_id)
            .ok_or_else(|| StoreError::NotFound(task_id.to_string()))?;
        entry.artifacts = artifacts;
        Ok(())
    }

    /// Metadata values recorded by `set_status`, oldest first.
    pub async fn metadata_history(&self, task_id: &str) -> Vec<serde_json::Value> {
        let inner = self.inner.lock().await;
        inner
            .get(task_id)
            .map(|e| e.metadata.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn get_by_status(&self, status: TaskStatus) -> Result<Vec<Task>> {
        let inner = self.inner.lock().await;
        let mut tasks: Vec<Task> = inner
            .values()
            .filter(|e| e.task.status == status)
            .map(|e| e.task.clone())
            .collect();
        tasks.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(tasks)
    }

    async fn claim(&self, task_id: &str, expected: TaskStatus, new: TaskStatus) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        let entry = inner
            .get_mut(task_id)
            .ok_or_else(|| StoreError::NotFound(task_id.to_string()))?;
        if entry.task.status != expected {
            debug!(task_id, actual = ?entry.task.status, ?expected, "claim lost");
            return Ok(false);
        }
        if !entry.task.status.can_transition_to(&new) {
            return Err(StoreError::InvalidTransition {
                task_id: task_id.to_string(),
                from: entry.task.status,
                to: new,
            });
        }
        entry.task.status = new;
        Ok(true)
    }

    async fn set_status(
        &self,
        task_id: &str,
        status: TaskStatus,
        metadata: serde_json::Value,
    ) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let entry = inner
            .get_mut(task_id)
            .ok_or_else(|| StoreError::NotFound(task_id.to_string()))?;
        if entry.task.status != status && !entry.task.status.can_transition_to(&status) {
            return Err(StoreError::InvalidTransition {
                task_id: task_id.to_string(),
                from: entry.task.status,
                to: status,
            });
        }
        entry.task.status = status;
        if !metadata.is_null() {
            entry.metadata.push(metadata);
        }
        Ok(())
    }

    async fn load_artifacts(&self, task_id: &str) -> Result<TaskArtifacts> {
        let inner = self.inner.lock().await;
        inner
            .get(task_id)
            .map(|e| e.artifacts.clone())
            .ok_or_else(|| StoreError::NotFound(task_id.to_string()))
    }

    async fn insert(&self, task: Task) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.insert(
            task.id.clone(),
            Entry {
                task,
                artifacts: TaskArtifacts::default(),
                metadata: Vec::new(),
            },
        );
        Ok(())
    }

    async fn get(&self, task_id: &str) -> Result<Option<Task>> {
        let inner = self.inner.lock().await;
        Ok(inner.get(task_id).map(|e| e.task.clone()))
    }
}
