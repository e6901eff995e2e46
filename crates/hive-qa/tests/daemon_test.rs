use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hive_bus::{EventBus, EventKind, FlumeBus, TaskEvent};
use hive_core::config::QaConfig;
use hive_core::escalation::EscalationManager;
use hive_core::store::{MemoryTaskStore, TaskStore};
use hive_core::types::{Task, TaskStatus};
use hive_harness::{CircuitBreaker, CircuitBreakerConfig, ShutdownSignal};
use hive_qa::daemon::QaDaemon;
use hive_qa::decision::WorkerDecisionEngine;
use hive_qa::executor::MechanicalFastFixer;
use hive_qa::pools::{FastFixPool, HeavyFixPool};
use hive_review::fixer::MechanicalFixGenerator;
use hive_transport::event_log::TaskEventLog;
use hive_transport::tmux::{Result as TransportResult, Transport};
use hive_transport::Dispatcher;

// ---------------------------------------------------------------------------
// Transport double
// ---------------------------------------------------------------------------

/// Pane transport; when `respond_success` is set, every send answers with a
/// complete sentinel region so headless heavy workers finish immediately.
struct PaneTransport {
    panes: std::sync::Mutex<HashMap<String, Vec<String>>>,
    respond_success: bool,
}

impl PaneTransport {
    fn new(respond_success: bool) -> Self {
        Self {
            panes: std::sync::Mutex::new(HashMap::new()),
            respond_success,
        }
    }
}

#[async_trait]
impl Transport for PaneTransport {
    async fn ensure_session(&self) -> TransportResult<()> {
        Ok(())
    }

    async fn send(&self, pane: &str, lines: &[String]) -> TransportResult<()> {
        let task_id = lines
            .first()
            .and_then(|l| l.strip_prefix("===BEGIN TASK "))
            .and_then(|l| l.strip_suffix("==="))
            .unwrap_or("unknown")
            .to_string();
        let mut panes = self.panes.lock().expect("lock");
        let buffer = panes.entry(pane.to_string()).or_default();
        if self.respond_success {
            buffer.push(format!("===BEGIN TASK {task_id}==="));
            buffer.push("STATUS: success".into());
            buffer.push("CHANGES: violations fixed".into());
            buffer.push("NEXT: review".into());
            buffer.push(format!("===END TASK {task_id}==="));
        }
        Ok(())
    }

    async fn capture(&self, pane: &str, _tail: usize) -> TransportResult<Vec<String>> {
        Ok(self
            .panes
            .lock()
            .expect("lock")
            .get(pane)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_panes(&self) -> TransportResult<Vec<String>> {
        Ok(self.panes.lock().expect("lock").keys().cloned().collect())
    }

    async fn spawn_pane(&self, title: &str, _command: Option<&str>) -> TransportResult<()> {
        self.panes
            .lock()
            .expect("lock")
            .insert(title.to_string(), Vec::new());
        Ok(())
    }

    async fn kill_pane(&self, title: &str) -> TransportResult<()> {
        self.panes.lock().expect("lock").remove(title);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

struct Harness {
    store: Arc<MemoryTaskStore>,
    escalations: Arc<EscalationManager>,
    daemon: QaDaemon,
    events: flume::Receiver<TaskEvent>,
}

fn harness(log_dir: &std::path::Path, max_fast: usize, respond_success: bool) -> Harness {
    let store = Arc::new(MemoryTaskStore::new());
    let escalations = Arc::new(EscalationManager::new());
    let bus = FlumeBus::new();
    let events = bus.subscribe();

    let transport = Arc::new(PaneTransport::new(respond_success));
    let dispatcher = Arc::new(Dispatcher::new(
        transport.clone(),
        TaskEventLog::new(log_dir),
        200,
        Duration::from_millis(10),
    ));

    let fast = Arc::new(FastFixPool::new(
        Arc::new(MechanicalFastFixer::new(
            Arc::new(MechanicalFixGenerator::new()),
            false,
        )),
        max_fast,
        Duration::from_secs(5),
        CircuitBreaker::new(CircuitBreakerConfig::default()),
    ));
    let heavy = Arc::new(HeavyFixPool::new(transport, 2));

    let config = QaConfig {
        poll_interval_secs: 1,
        worker_timeout_secs: 5,
        ..QaConfig::default()
    };
    let daemon = QaDaemon::new(
        store.clone() as Arc<dyn TaskStore>,
        WorkerDecisionEngine::new(None, config.complexity_threshold, config.rag_confidence_threshold),
        fast,
        heavy,
        dispatcher,
        escalations.clone(),
        Arc::new(bus) as Arc<dyn EventBus>,
        config,
        ShutdownSignal::new(),
    );

    Harness {
        store,
        escalations,
        daemon,
        events,
    }
}

async fn seed_qa_task(
    store: &MemoryTaskStore,
    service_dir: Option<&std::path::Path>,
    violations: serde_json::Value,
) -> Task {
    let mut task = Task::new("qa batch");
    task.payload = serde_json::json!({ "violations": violations });
    task.service_directory = service_dir.map(|p| p.to_path_buf());
    store.insert(task.clone()).await.expect("insert");
    task
}

async fn wait_for_status(store: &MemoryTaskStore, task_id: &str, status: TaskStatus) {
    for _ in 0..200 {
        let task = store.get(task_id).await.expect("get").expect("exists");
        if task.status == status {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let task = store.get(task_id).await.expect("get").expect("exists");
    panic!("task never reached {status:?}, still {:?}", task.status);
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fast_path_fixes_and_approves() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let service = tmp.path().join("svc");
    std::fs::create_dir_all(&service).expect("mkdir");
    std::fs::write(service.join("app.py"), "x = 1   \ny = 2\n").expect("seed");

    let h = harness(tmp.path(), 3, false);
    let task = seed_qa_task(
        &h.store,
        Some(&service),
        serde_json::json!([
            {"type": "W291", "file": "app.py", "message": "trailing whitespace", "severity": "warn"},
        ]),
    )
    .await;

    h.daemon.process_queue().await;

    let stored = h.store.get(&task.id).await.expect("get").expect("exists");
    assert_eq!(stored.status, TaskStatus::Approved);
    let content = std::fs::read_to_string(service.join("app.py")).expect("read");
    assert_eq!(content, "x = 1\ny = 2\n");

    let metrics = h.daemon.metrics().await;
    assert_eq!(metrics.processed, 1);
    assert_eq!(metrics.fast, 1);
}

#[tokio::test]
async fn empty_violations_complete_immediately() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let h = harness(tmp.path(), 3, false);
    let task = seed_qa_task(&h.store, None, serde_json::json!([])).await;

    h.daemon.process_queue().await;

    let stored = h.store.get(&task.id).await.expect("get").expect("exists");
    assert_eq!(stored.status, TaskStatus::Approved);
}

#[tokio::test]
async fn saturated_fast_pool_requeues_for_next_tick() {
    let tmp = tempfile::tempdir().expect("tempdir");
    // Zero-capacity pool: every fast route is saturated.
    let h = harness(tmp.path(), 0, false);
    let task = seed_qa_task(
        &h.store,
        None,
        serde_json::json!([
            {"type": "E501", "file": "app.py", "message": "line too long", "severity": "warn"},
        ]),
    )
    .await;

    h.daemon.process_queue().await;

    let stored = h.store.get(&task.id).await.expect("get").expect("exists");
    assert_eq!(stored.status, TaskStatus::Queued, "task stays queued");
    assert_eq!(h.daemon.metrics().await.requeued, 1);
}

#[tokio::test]
async fn critical_violation_spawns_interactive_worker_and_escalates() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let h = harness(tmp.path(), 3, false);
    let task = seed_qa_task(
        &h.store,
        None,
        serde_json::json!([
            {"type": "security", "file": "src/auth.py", "message": "hardcoded secret", "severity": "critical"},
        ]),
    )
    .await;

    h.daemon.process_queue().await;

    let stored = h.store.get(&task.id).await.expect("get").expect("exists");
    assert_eq!(stored.status, TaskStatus::Escalated);
    assert_eq!(h.escalations.stats().await.total, 1);

    let drained: Vec<_> = h.events.drain().collect();
    assert!(drained
        .iter()
        .any(|e| e.event_type == EventKind::QaEscalation && e.task_id == task.id));
}

#[tokio::test]
async fn complex_batch_runs_headless_worker_to_review() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let h = harness(tmp.path(), 3, true);

    let violations: Vec<serde_json::Value> = (0..16)
        .map(|i| {
            serde_json::json!({
                "type": "architecture",
                "file": format!("src/mod{}.py", i % 8),
                "message": "layering violation",
                "severity": "error",
            })
        })
        .collect();
    let task = seed_qa_task(&h.store, None, serde_json::Value::Array(violations)).await;

    h.daemon.process_queue().await;
    wait_for_status(&h.store, &task.id, TaskStatus::ReviewPending).await;

    assert_eq!(h.daemon.metrics().await.heavy, 1);
    assert_eq!(h.escalations.stats().await.total, 0);
}
