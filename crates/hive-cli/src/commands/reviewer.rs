use std::sync::Arc;
use std::time::Duration;

use hive_bus::{EventBus, FlumeBus};
use hive_core::config::Config;
use hive_core::escalation::EscalationManager;
use hive_core::store::{MemoryTaskStore, TaskStore};
use hive_harness::{RetryPolicy, ShutdownSignal};
use hive_review::autofix::AutoFixLoop;
use hive_review::engine::ReviewEngine;
use hive_review::fixer::MechanicalFixGenerator;
use hive_review::validate::ValidatorSuite;
use hive_review::ReviewerAgent;
use hive_telemetry::TextSink;
use tracing::warn;

use crate::collab::CommandReviewCollaborator;

pub struct StartOptions {
    pub polling_interval: Option<u64>,
    pub test_mode: bool,
    pub auto_fix: bool,
    pub max_fix_attempts: Option<u32>,
}

/// Start the reviewer daemon and block until shutdown.
pub async fn start(
    config: &Config,
    options: StartOptions,
    shutdown: ShutdownSignal,
) -> anyhow::Result<()> {
    if config.review.collab_cmd.is_empty() {
        warn!("no review collaborator configured; every review will escalate");
    }
    if config.store.url.is_some() {
        warn!("external task stores are not wired in this build; using the in-memory store");
    }

    let store: Arc<dyn TaskStore> = Arc::new(MemoryTaskStore::new());
    let bus: Arc<dyn EventBus> = Arc::new(FlumeBus::new());
    let escalations = Arc::new(EscalationManager::new());

    let engine = ReviewEngine::new(
        Arc::new(CommandReviewCollaborator::new(
            config.review.collab_cmd.clone(),
        )),
        None,
        config.review.thresholds.clone(),
        RetryPolicy::default(),
    );

    let max_fix_attempts = options
        .max_fix_attempts
        .unwrap_or(config.review.max_fix_attempts);
    let autofix = (options.auto_fix && config.review.auto_fix_enabled).then(|| {
        AutoFixLoop::new(
            Arc::new(MechanicalFixGenerator::new()),
            ValidatorSuite::from_config(&config.autofix),
            config.autofix.clone(),
            max_fix_attempts,
        )
    });

    let polling_secs = options.polling_interval.unwrap_or(if options.test_mode {
        config.review.test_polling_interval_secs
    } else {
        config.review.polling_interval_secs
    });

    let agent = ReviewerAgent::new(
        store,
        engine,
        autofix,
        escalations,
        bus,
        Duration::from_secs(polling_secs),
        shutdown,
    );
    agent.run().await
}

pub fn status(config: &Config, sink: &dyn TextSink) -> anyhow::Result<()> {
    super::render_log_summary(config, sink, "ai-reviewer: today's activity")
}

pub fn dashboard(config: &Config, sink: &dyn TextSink) -> anyhow::Result<()> {
    super::render_log_summary(config, sink, "ai-reviewer: today's activity")?;
    super::render_agent_breakdown(config, sink)?;
    sink.line("configuration:");
    sink.line(&format!(
        "  polling interval: {}s (test mode {}s)",
        config.review.polling_interval_secs, config.review.test_polling_interval_secs
    ));
    sink.line(&format!(
        "  auto-fix: {} (max {} attempts)",
        config.review.auto_fix_enabled, config.review.max_fix_attempts
    ));
    sink.line(&format!(
        "  thresholds: approve {} / reject {} / escalate {} / confidence {}",
        config.review.thresholds.approve,
        config.review.thresholds.reject,
        config.review.thresholds.escalate,
        config.review.thresholds.confidence,
    ));
    Ok(())
}
