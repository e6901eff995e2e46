use hive_core::config::Config;
use hive_harness::ShutdownSignal;
use hive_orchestrator::{GitWorkflow, Queen};
use hive_telemetry::TextSink;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{info, warn};

const WORKER_PANES: [&str; 3] = ["worker-backend", "worker-frontend", "worker-infra"];

/// Provision the tmux session (queen + three worker panes) and per-worker
/// worktrees. This is an explicit operator action; the daemons themselves
/// refuse to auto-create the session.
pub async fn setup(config: &Config, sink: &dyn TextSink) -> anyhow::Result<()> {
    let session = config.transport.session.as_str();
    let window = format!("{session}:0");
    let pane = |idx: usize| format!("{session}:0.{idx}");

    // A fresh session every time; a stale one holds dead agents.
    run_tmux(&["kill-session", "-t", session], true).await?;
    run_tmux(&["new-session", "-d", "-s", session, "-n", "hive"], false).await?;
    run_tmux(&["select-pane", "-t", pane(0).as_str(), "-T", "queen"], false).await?;
    run_tmux(&["split-window", "-h", "-t", window.as_str()], false).await?;
    run_tmux(
        &["select-pane", "-t", pane(1).as_str(), "-T", "worker-backend"],
        false,
    )
    .await?;
    run_tmux(&["split-window", "-v", "-t", pane(0).as_str()], false).await?;
    run_tmux(
        &["select-pane", "-t", pane(2).as_str(), "-T", "worker-frontend"],
        false,
    )
    .await?;
    run_tmux(&["split-window", "-v", "-t", pane(1).as_str()], false).await?;
    run_tmux(
        &["select-pane", "-t", pane(3).as_str(), "-T", "worker-infra"],
        false,
    )
    .await?;

    sink.line(&format!("session '{session}' ready (queen + 3 workers)"));
    sink.line(&format!("attach with: tmux attach-session -t {session}"));

    let git = GitWorkflow::new(".", config.git.clone());
    let workers: Vec<String> = WORKER_PANES.iter().map(|w| w.to_string()).collect();
    match git.setup_worktrees(&workers).await {
        Ok(()) => {
            git.push_worker_branches(&workers).await?;
        }
        Err(e) => {
            warn!(error = %e, "worktree provisioning failed (not a git repo?)");
            sink.line("warning: worktree provisioning failed; workers share the main tree");
        }
    }
    Ok(())
}

/// Execute one mission.
pub async fn run(
    config: &Config,
    goal: &str,
    dry_run: bool,
    sink: &dyn TextSink,
    shutdown: ShutdownSignal,
) -> anyhow::Result<bool> {
    let dispatcher = super::build_dispatcher(config);
    let mut git_config = config.git.clone();
    git_config.dry_run = git_config.dry_run || dry_run;
    let git = GitWorkflow::new(".", git_config);
    let queen = Queen::new(dispatcher, git, config.orchestrator.clone(), shutdown);

    let outcome = queen.run(goal).await?;
    for (agent, footer) in &outcome.footers {
        sink.line(&format!("  {agent}: {}", footer.status.as_str()));
    }
    if outcome.success() {
        sink.line(&format!(
            "mission complete: branch={} pr={}",
            outcome.branch.as_deref().unwrap_or("-"),
            outcome.pr_url.as_deref().unwrap_or("-"),
        ));
    } else {
        sink.line("mission failed; check the tmux session and event log");
    }
    Ok(outcome.success())
}

/// Interactive mission loop: one goal per stdin line until `exit` or EOF.
pub async fn shell(
    config: &Config,
    sink: &dyn TextSink,
    shutdown: ShutdownSignal,
) -> anyhow::Result<()> {
    sink.line("queen ready; enter a goal per line ('exit' to quit)");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        if shutdown.is_shutting_down() {
            break;
        }
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let goal = line.trim();
        if goal.is_empty() {
            continue;
        }
        if matches!(goal, "exit" | "quit" | "q") {
            break;
        }
        match run(config, goal, false, sink, shutdown.clone()).await {
            Ok(true) => info!(goal, "mission accomplished"),
            Ok(false) => warn!(goal, "mission failed"),
            Err(e) => {
                warn!(goal, error = %e, "mission aborted");
                sink.line(&format!("error: {e}"));
            }
        }
    }
    sink.line("queen shutting down");
    Ok(())
}

pub fn status(config: &Config, sink: &dyn TextSink) -> anyhow::Result<()> {
    super::render_log_summary(config, sink, "queen: today's activity")
}

pub fn dashboard(config: &Config, sink: &dyn TextSink) -> anyhow::Result<()> {
    super::render_log_summary(config, sink, "queen: today's activity")?;
    super::render_agent_breakdown(config, sink)?;
    sink.line("configuration:");
    sink.line(&format!("  session: {}", config.transport.session));
    sink.line(&format!(
        "  timeouts: plan {}s / work {}s",
        config.orchestrator.plan_timeout_secs, config.orchestrator.work_timeout_secs
    ));
    sink.line(&format!(
        "  workers: {}",
        config.orchestrator.workers.join(", ")
    ));
    Ok(())
}

async fn run_tmux(args: &[&str], tolerate_failure: bool) -> anyhow::Result<()> {
    let output = Command::new("tmux").args(args).output().await?;
    if !output.status.success() && !tolerate_failure {
        anyhow::bail!(
            "tmux {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(())
}
