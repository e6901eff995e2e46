use std::sync::Arc;
use std::time::Duration;

use hive_bus::{EventBus, EventKind, FlumeBus};
use hive_core::config::Config;
use hive_core::escalation::EscalationManager;
use hive_core::store::{MemoryTaskStore, TaskStore};
use hive_harness::{CircuitBreaker, CircuitBreakerConfig, ShutdownSignal};
use hive_qa::daemon::QaDaemon;
use hive_qa::decision::WorkerDecisionEngine;
use hive_qa::executor::MechanicalFastFixer;
use hive_qa::monitor::WorkerMonitor;
use hive_qa::pools::{FastFixPool, HeavyFixPool};
use hive_qa::rag::{JsonPatternIndex, PatternIndex};
use hive_review::fixer::MechanicalFixGenerator;
use hive_telemetry::TextSink;
use tracing::{info, warn};

pub struct StartOptions {
    pub polling_interval: Option<u64>,
    pub max_fast: Option<usize>,
    pub max_heavy: Option<usize>,
    pub test_mode: bool,
}

/// Start the QA daemon (and its worker monitor) and block until shutdown.
pub async fn start(
    config: &Config,
    options: StartOptions,
    shutdown: ShutdownSignal,
) -> anyhow::Result<()> {
    if config.store.url.is_some() {
        warn!("external task stores are not wired in this build; using the in-memory store");
    }

    let mut qa_config = config.qa.clone();
    if let Some(v) = options.polling_interval {
        qa_config.poll_interval_secs = v;
    } else if options.test_mode {
        qa_config.poll_interval_secs = 1;
    }
    if let Some(v) = options.max_fast {
        qa_config.max_fast = v;
    }
    if let Some(v) = options.max_heavy {
        qa_config.max_heavy = v;
    }

    let store: Arc<dyn TaskStore> = Arc::new(MemoryTaskStore::new());
    let flume_bus = FlumeBus::new();

    // Escalations are the primary human-facing signal; mirror that topic
    // into the operator log as it happens.
    let escalation_feed = flume_bus.subscribe_topic(EventKind::QaEscalation);
    tokio::spawn(async move {
        while let Ok(event) = escalation_feed.recv_async().await {
            warn!(
                task_id = %event.task_id,
                reason = event.payload["reason"].as_str().unwrap_or("unknown"),
                "escalation requires human review"
            );
        }
    });

    let bus: Arc<dyn EventBus> = Arc::new(flume_bus);
    let escalations = Arc::new(EscalationManager::new());
    let dispatcher = super::build_dispatcher(config);
    dispatcher.transport().ensure_session().await?;

    let index = JsonPatternIndex::load(&config.rag.index_dir);
    info!(patterns = index.pattern_count(), "pattern index primed");
    let index: Option<Arc<dyn PatternIndex>> = Some(Arc::new(index));

    let fast = Arc::new(FastFixPool::new(
        Arc::new(MechanicalFastFixer::new(
            Arc::new(MechanicalFixGenerator::new()),
            config.autofix.create_backups,
        )),
        qa_config.max_fast,
        Duration::from_secs(qa_config.fast_deadline_secs),
        CircuitBreaker::new(CircuitBreakerConfig::default()),
    ));
    let heavy = Arc::new(HeavyFixPool::new(
        dispatcher.transport().clone(),
        qa_config.max_heavy,
    ));

    let monitor = WorkerMonitor::new(
        heavy.clone(),
        escalations.clone(),
        bus.clone(),
        Duration::from_secs(qa_config.heartbeat_interval_secs),
        Duration::from_secs(qa_config.worker_timeout_secs),
        config.transport.capture_tail,
        shutdown.clone(),
    );
    tokio::spawn(async move { monitor.run().await });

    let daemon = QaDaemon::new(
        store,
        WorkerDecisionEngine::new(
            index,
            qa_config.complexity_threshold,
            qa_config.rag_confidence_threshold,
        ),
        fast,
        heavy,
        dispatcher,
        escalations,
        bus,
        qa_config,
        shutdown,
    );
    daemon.run().await
}

pub fn status(config: &Config, sink: &dyn TextSink) -> anyhow::Result<()> {
    super::render_log_summary(config, sink, "qa-agent: today's activity")
}

pub fn dashboard(config: &Config, sink: &dyn TextSink) -> anyhow::Result<()> {
    super::render_log_summary(config, sink, "qa-agent: today's activity")?;
    super::render_agent_breakdown(config, sink)?;
    sink.line("configuration:");
    sink.line(&format!(
        "  pools: {} fast / {} heavy",
        config.qa.max_fast, config.qa.max_heavy
    ));
    sink.line(&format!(
        "  heartbeat every {}s, worker timeout {}s",
        config.qa.heartbeat_interval_secs, config.qa.worker_timeout_secs
    ));
    sink.line(&format!(
        "  routing: complexity > {} goes heavy, confidence > {} batches fast",
        config.qa.complexity_threshold, config.qa.rag_confidence_threshold
    ));
    sink.line(&format!(
        "  pattern index: {}",
        config.rag.index_dir.display()
    ));
    Ok(())
}
