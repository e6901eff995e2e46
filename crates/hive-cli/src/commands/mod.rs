use std::sync::Arc;
use std::time::Duration;

use hive_core::config::Config;
use hive_telemetry::TextSink;
use hive_transport::event_log::{RecordKind, TaskEventLog};
use hive_transport::{Dispatcher, TmuxTransport};

pub mod qa;
pub mod queen;
pub mod reviewer;

/// Build the dispatcher over the configured tmux session.
pub fn build_dispatcher(config: &Config) -> Arc<Dispatcher> {
    let transport = Arc::new(TmuxTransport::new(
        config.transport.session.clone(),
        Duration::from_millis(config.transport.send_delay_ms),
    ));
    Arc::new(Dispatcher::new(
        transport,
        TaskEventLog::new(config.general.log_dir.clone()),
        config.transport.capture_tail,
        Duration::from_secs(config.transport.poll_interval_secs),
    ))
}

/// Render today's event-log counts: dispatches and footers per status.
pub fn render_log_summary(config: &Config, sink: &dyn TextSink, heading: &str) -> anyhow::Result<()> {
    let log = TaskEventLog::new(config.general.log_dir.clone());
    let records = log.today()?;

    let commands = records.iter().filter(|r| r.kind == RecordKind::Command).count();
    let mut by_status: std::collections::BTreeMap<&str, usize> = Default::default();
    for record in &records {
        if record.kind == RecordKind::Status {
            *by_status
                .entry(record.status.as_deref().unwrap_or("unknown"))
                .or_default() += 1;
        }
    }

    sink.line(heading);
    sink.line(&format!("  commands dispatched: {commands}"));
    if by_status.is_empty() {
        sink.line("  no footers recorded today");
    } else {
        for (status, count) in by_status {
            sink.line(&format!("  {status}: {count}"));
        }
    }
    Ok(())
}

/// Per-agent dispatch/footer breakdown for the dashboard view.
pub fn render_agent_breakdown(config: &Config, sink: &dyn TextSink) -> anyhow::Result<()> {
    let log = TaskEventLog::new(config.general.log_dir.clone());
    let records = log.today()?;

    let mut agents: std::collections::BTreeMap<String, (usize, usize)> = Default::default();
    for record in &records {
        let entry = agents.entry(record.agent.clone()).or_default();
        match record.kind {
            RecordKind::Command => entry.0 += 1,
            RecordKind::Status => entry.1 += 1,
        }
    }

    sink.line("agents:");
    if agents.is_empty() {
        sink.line("  (no activity today)");
    }
    for (agent, (commands, statuses)) in agents {
        sink.line(&format!(
            "  {agent}: {commands} dispatched, {statuses} footers"
        ));
    }
    Ok(())
}
