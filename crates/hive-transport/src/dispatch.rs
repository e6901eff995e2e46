use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use hive_core::types::{DispatchRecord, StatusFooter};
use tracing::{debug, info, warn};

use crate::event_log::TaskEventLog;
use crate::sentinel;
use crate::tmux::{Result, Transport};

/// Sends wrapped commands to agents and awaits their sentinel footers.
///
/// Owns the live [`DispatchRecord`]s and the task event log. Every dispatch
/// produces exactly one logged footer: either the parsed one or a synthesised
/// `timeout`, never both and never neither.
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    log: TaskEventLog,
    capture_tail: usize,
    poll_interval: Duration,
    counter: AtomicU64,
}

impl Dispatcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        log: TaskEventLog,
        capture_tail: usize,
        poll_interval: Duration,
    ) -> Self {
        Self {
            transport,
            log,
            capture_tail,
            poll_interval,
            counter: AtomicU64::new(0),
        }
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn log(&self) -> &TaskEventLog {
        &self.log
    }

    /// Mint a unique, time-ordered task id.
    pub fn next_task_id(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}_{n}", Utc::now().format("%Y%m%d_%H%M%S"))
    }

    /// Wrap `command` in sentinel markers and send it to `agent`.
    ///
    /// The command record is written to the event log before the keystrokes
    /// go out, so a crash mid-send still leaves a trace.
    pub async fn dispatch(
        &self,
        agent: &str,
        task_id: &str,
        command: &str,
        timeout: Duration,
    ) -> Result<DispatchRecord> {
        if let Err(e) = self.log.append_command(agent, task_id, command) {
            warn!(agent, task_id, error = %e, "failed to log command");
        }

        let wrapped = sentinel::wrap_command(task_id, command);
        let lines: Vec<String> = wrapped.lines().map(str::to_string).collect();
        self.transport.send(agent, &lines).await?;

        info!(agent, task_id, "dispatched command");
        Ok(DispatchRecord {
            task_id: task_id.to_string(),
            agent_name: agent.to_string(),
            command: command.to_string(),
            sent_at: Utc::now(),
            timeout_secs: timeout.as_secs(),
        })
    }

    /// Poll the agent's pane until its footer appears or `timeout` elapses.
    ///
    /// Wakes every poll interval, captures the pane tail, and runs the
    /// sentinel extractor. A complete region whose footer does not parse is
    /// immediately downgraded to `failed` (malformed footers are logged,
    /// never raised); an elapsed budget yields a synthesised `timeout`
    /// footer. The one resulting footer is logged as the status record for
    /// this dispatch.
    pub async fn read_status(
        &self,
        agent: &str,
        task_id: &str,
        timeout: Duration,
    ) -> StatusFooter {
        let deadline = tokio::time::Instant::now() + timeout;

        let footer = loop {
            tokio::time::sleep(self.poll_interval).await;

            match self.transport.capture(agent, self.capture_tail).await {
                Ok(lines) => {
                    if let Some(region) = sentinel::extract(&lines, task_id) {
                        match sentinel::parse_footer(region) {
                            Some(footer) => break footer,
                            None => {
                                warn!(agent, task_id, "malformed footer, treating as failed");
                                break StatusFooter::failed("malformed footer");
                            }
                        }
                    }
                }
                Err(e) => {
                    debug!(agent, task_id, error = %e, "capture failed, will retry");
                }
            }

            if tokio::time::Instant::now() >= deadline {
                warn!(agent, task_id, "no footer within budget, synthesising timeout");
                break StatusFooter::timeout();
            }
        };

        if let Err(e) = self.log.append_status(agent, task_id, &footer) {
            warn!(agent, task_id, error = %e, "failed to log status");
        }
        debug!(agent, task_id, status = footer.status.as_str(), "footer resolved");
        footer
    }

    /// Dispatch and wait for the footer in one call.
    pub async fn round_trip(
        &self,
        agent: &str,
        task_id: &str,
        command: &str,
        timeout: Duration,
    ) -> Result<StatusFooter> {
        self.dispatch(agent, task_id, command, timeout).await?;
        Ok(self.read_status(agent, task_id, timeout).await)
    }
}
