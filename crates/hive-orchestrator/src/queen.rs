use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use hive_core::config::OrchestratorConfig;
use hive_core::types::{FooterStatus, StatusFooter};
use hive_harness::{AdaptiveTimeout, ShutdownSignal, TimeoutConfig};
use hive_transport::{Dispatcher, TransportError};
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

const OP_PLAN: &str = "plan";
const OP_WORK: &str = "work";

use crate::gitops::{GitError, GitWorkflow};
use crate::plan;

// ---------------------------------------------------------------------------
// Errors & outcome
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum QueenError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Git(#[from] GitError),
    #[error("run halted: {0}")]
    Halted(String),
}

pub type Result<T> = std::result::Result<T, QueenError>;

/// Phases of one orchestrated run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Planning,
    Delegating,
    Gathering,
    Committing,
    Done,
    Failed,
}

/// What came out of a run: the final phase, version-control artifacts, and
/// every footer that was gathered along the way.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    pub goal: String,
    pub phase: RunPhase,
    pub branch: Option<String>,
    pub pr_url: Option<String>,
    pub footers: BTreeMap<String, StatusFooter>,
}

impl RunOutcome {
    pub fn success(&self) -> bool {
        self.phase == RunPhase::Done
    }

    fn failed(goal: &str, footers: BTreeMap<String, StatusFooter>, branch: Option<String>) -> Self {
        Self {
            goal: goal.to_string(),
            phase: RunPhase::Failed,
            branch,
            pr_url: None,
            footers,
        }
    }
}

// ---------------------------------------------------------------------------
// Queen
// ---------------------------------------------------------------------------

/// The central orchestrator: drives a goal through plan → dispatch → gather
/// → commit/PR. Collaborators arrive through the constructor; the queen owns
/// no global state.
pub struct Queen {
    dispatcher: Arc<Dispatcher>,
    git: GitWorkflow,
    config: OrchestratorConfig,
    timeouts: Arc<AdaptiveTimeout>,
    shutdown: ShutdownSignal,
}

impl Queen {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        git: GitWorkflow,
        config: OrchestratorConfig,
        shutdown: ShutdownSignal,
    ) -> Self {
        // Operation-class budgets come from config; successful dispatch
        // durations feed back so chronically slow agents get more rope.
        let timeouts = AdaptiveTimeout::new(TimeoutConfig::default())
            .with_class(OP_PLAN, Duration::from_secs(config.plan_timeout_secs))
            .with_class(OP_WORK, Duration::from_secs(config.work_timeout_secs));
        Self {
            dispatcher,
            git,
            config,
            timeouts: Arc::new(timeouts),
            shutdown,
        }
    }

    /// Quick sanity check before a run: the transport session must exist and
    /// the PAUSE kill switch must not be engaged. Failures here abort with a
    /// clear message instead of a half-started run.
    pub async fn preflight(&self) -> Result<()> {
        self.dispatcher.transport().ensure_session().await?;
        if self.git.pause_active() {
            return Err(QueenError::Halted("PAUSE file present".into()));
        }
        Ok(())
    }

    /// Execute one full mission for `goal`.
    pub async fn run(&self, goal: &str) -> Result<RunOutcome> {
        self.preflight().await?;
        info!(goal, "queen initiating task");

        // -- Branching ----------------------------------------------------
        let branch = self.git.create_feature_branch(goal).await?;

        // -- Planning -----------------------------------------------------
        let plan_prompt = format!(
            "You are the Queen of the hive. Create a detailed execution plan for:\n\
             '{goal}'\n\
             \n\
             Requirements:\n\
             - Break into 3-5 atomic steps (<30min each)\n\
             - Assign steps as lines 'worker-<name>: <subtask>'\n\
             - Define clear acceptance criteria\n\
             - Consider dependencies between steps"
        );
        let plan_task = self.dispatcher.next_task_id();
        let plan_timeout = self.timeouts.timeout_for(OP_PLAN, 0);
        let plan_started = std::time::Instant::now();
        let plan_footer = self
            .dispatcher
            .round_trip("queen", &plan_task, &plan_prompt, plan_timeout)
            .await?;
        if plan_footer.status == FooterStatus::Success {
            self.timeouts.record_success(OP_PLAN, plan_started.elapsed());
        }

        let mut footers = BTreeMap::new();
        footers.insert("queen".to_string(), plan_footer.clone());

        if plan_footer.status != FooterStatus::Success {
            error!(status = plan_footer.status.as_str(), "queen planning failed");
            return Ok(RunOutcome::failed(goal, footers, Some(branch)));
        }

        // -- Delegation ---------------------------------------------------
        let plan_text = format!("{}\n{}", plan_footer.changes, plan_footer.next);
        let assignments = plan::assignments(&plan_text, goal, &self.config.workers);
        let work_timeout = self.timeouts.timeout_for(OP_WORK, 0);

        let mut join_set: JoinSet<(String, StatusFooter)> = JoinSet::new();
        for (worker, subtask) in assignments {
            let dispatcher = self.dispatcher.clone();
            let timeouts = self.timeouts.clone();
            let task_id = dispatcher.next_task_id();
            join_set.spawn(async move {
                let started = std::time::Instant::now();
                let footer = match dispatcher
                    .round_trip(&worker, &task_id, &subtask, work_timeout)
                    .await
                {
                    Ok(footer) => footer,
                    Err(e) => {
                        // A vanished pane fails the task, not the daemon.
                        error!(worker, error = %e, "dispatch failed");
                        StatusFooter::failed(e.to_string())
                    }
                };
                if footer.status == FooterStatus::Success {
                    timeouts.record_success(OP_WORK, started.elapsed());
                }
                (worker, footer)
            });
        }

        // -- Aggregation --------------------------------------------------
        while let Some(joined) = join_set.join_next().await {
            if self.shutdown.is_shutting_down() {
                join_set.abort_all();
                return Err(QueenError::Halted("shutdown requested".into()));
            }
            match joined {
                Ok((worker, footer)) => {
                    info!(worker, status = footer.status.as_str(), "worker finished");
                    footers.insert(worker, footer);
                }
                Err(e) => {
                    error!(error = %e, "worker task panicked");
                }
            }
        }

        let worker_footers: Vec<&StatusFooter> = footers
            .iter()
            .filter(|(name, _)| name.as_str() != "queen")
            .map(|(_, f)| f)
            .collect();
        let all_success = !worker_footers.is_empty()
            && worker_footers
                .iter()
                .all(|f| f.status == FooterStatus::Success);
        if !all_success {
            warn!(goal, "not all workers succeeded");
            return Ok(RunOutcome::failed(goal, footers, Some(branch)));
        }

        // -- Commit & PR --------------------------------------------------
        let message = format!("feat: {goal}");
        self.git.commit_and_push(&branch, &message).await?;
        let pr_url = self.git.create_pr(&branch, &message, "").await?;

        if pr_url.is_none() {
            warn!(goal, "PR suppressed by kill switch");
            return Ok(RunOutcome::failed(goal, footers, Some(branch)));
        }

        info!(goal, branch, pr = pr_url.as_deref().unwrap_or(""), "mission complete");
        Ok(RunOutcome {
            goal: goal.to_string(),
            phase: RunPhase::Done,
            branch: Some(branch),
            pr_url,
            footers,
        })
    }
}
