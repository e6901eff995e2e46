use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hive_bus::{EventBus, EventKind, FlumeBus};
use hive_core::escalation::EscalationManager;
use hive_core::types::Task;
use hive_harness::ShutdownSignal;
use hive_qa::monitor::WorkerMonitor;
use hive_qa::pools::HeavyFixPool;
use hive_transport::sentinel;
use hive_transport::tmux::{Result as TransportResult, Transport};

/// Transport whose pane buffers can be scripted from the test.
struct PaneTransport {
    panes: std::sync::Mutex<HashMap<String, Vec<String>>>,
}

impl PaneTransport {
    fn new() -> Self {
        Self {
            panes: std::sync::Mutex::new(HashMap::new()),
        }
    }

    fn push(&self, pane: &str, line: String) {
        self.panes
            .lock()
            .expect("lock")
            .entry(pane.to_string())
            .or_default()
            .push(line);
    }
}

#[async_trait]
impl Transport for PaneTransport {
    async fn ensure_session(&self) -> TransportResult<()> {
        Ok(())
    }

    async fn send(&self, pane: &str, lines: &[String]) -> TransportResult<()> {
        let mut panes = self.panes.lock().expect("lock");
        panes
            .entry(pane.to_string())
            .or_default()
            .extend(lines.iter().cloned());
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

fn monitor_with(
    transport: Arc<PaneTransport>,
    timeout: Duration,
) -> (
    WorkerMonitor,
    Arc<HeavyFixPool>,
    Arc<EscalationManager>,
    flume::Receiver<hive_bus::TaskEvent>,
) {
    let heavy = Arc::new(HeavyFixPool::new(transport, 4));
    let escalations = Arc::new(EscalationManager::new());
    let bus = FlumeBus::new();
    let events = bus.subscribe();
    let monitor = WorkerMonitor::new(
        heavy.clone(),
        escalations.clone(),
        Arc::new(bus) as Arc<dyn EventBus>,
        Duration::from_secs(30),
        timeout,
        200,
        ShutdownSignal::new(),
    );
    (monitor, heavy, escalations, events)
}

#[tokio::test]
async fn timed_out_worker_is_escalated_and_freed() {
    let transport = Arc::new(PaneTransport::new());
    let (monitor, heavy, escalations, events) = monitor_with(transport, Duration::ZERO);

    let task = Task::new("stuck work");
    heavy.spawn(&task, "", false).await.expect("spawn");
    // Let the heartbeat age past the zero timeout.
    tokio::time::sleep(Duration::from_millis(5)).await;

    monitor.cycle().await;

    assert_eq!(heavy.active_count().await, 0, "slot freed");
    assert_eq!(escalations.stats().await.total, 1);
    assert_eq!(monitor.failures_detected(), 1);

    let drained: Vec<_> = events.drain().collect();
    assert!(drained
        .iter()
        .any(|e| e.event_type == EventKind::QaEscalation && e.task_id == task.id));
    assert!(drained
        .iter()
        .any(|e| e.event_type == EventKind::QaMonitorHeartbeat));
}

#[tokio::test]
async fn repeated_cycles_do_not_duplicate_escalations() {
    let transport = Arc::new(PaneTransport::new());
    let (monitor, heavy, escalations, _events) = monitor_with(transport, Duration::ZERO);

    let task = Task::new("stuck work");
    heavy.spawn(&task, "", false).await.expect("spawn");
    tokio::time::sleep(Duration::from_millis(5)).await;

    monitor.cycle().await;
    monitor.cycle().await;

    // Worker was freed after the first cycle; the escalation ledger is
    // idempotent on (task, reason) either way.
    assert_eq!(escalations.stats().await.total, 1);
}

#[tokio::test]
async fn sentinel_output_refreshes_heartbeat() {
    let transport = Arc::new(PaneTransport::new());
    let (monitor, heavy, escalations, _events) =
        monitor_with(transport.clone(), Duration::from_secs(60));

    let task = Task::new("active work");
    let worker = heavy.spawn(&task, "", false).await.expect("spawn");
    transport.push(&worker.pane, sentinel::begin_marker(&task.id));

    monitor.cycle().await;

    assert_eq!(heavy.active_count().await, 1, "active worker stays");
    assert_eq!(escalations.stats().await.total, 0);
}
