#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

mod collab;
mod commands;

use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use hive_core::config::Config;
use hive_harness::ShutdownSignal;
use hive_telemetry::StdoutSink;
use tracing::error;

/// hive CLI -- orchestrate the queen, reviewer, and QA daemons.
#[derive(Parser)]
#[command(name = "hive", version, about)]
struct Cli {
    /// Load configuration from this file instead of ~/.hive/config.toml.
    #[arg(short = 'c', long, global = true)]
    config: Option<String>,

    /// Emit JSON logs (for log shippers) instead of human-readable output.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Queen orchestrator: session setup and mission execution.
    Queen {
        #[command(subcommand)]
        command: QueenCommands,
    },
    /// AI reviewer daemon.
    Reviewer {
        #[command(subcommand)]
        command: DaemonCommands,
    },
    /// QA routing daemon.
    Qa {
        #[command(subcommand)]
        command: DaemonCommands,
    },
}

#[derive(Subcommand)]
enum QueenCommands {
    /// Provision the tmux session and worker worktrees.
    Setup,
    /// Run a single mission for the given goal.
    Run {
        /// Natural-language goal.
        goal: String,
        /// Log git/PR effects without touching the repository.
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
    /// Interactive mission loop (one goal per stdin line).
    #[command(alias = "shell")]
    Start,
    /// Show today's activity counters.
    Status,
    /// Render the full text dashboard.
    Dashboard,
}

#[derive(Subcommand)]
enum DaemonCommands {
    /// Start the daemon (runs until SIGINT/SIGTERM).
    Start {
        /// Seconds between queue polls.
        #[arg(long)]
        polling_interval: Option<u64>,
        /// Fast-fix pool capacity (qa only).
        #[arg(long)]
        max_fast: Option<usize>,
        /// Heavy-fix pool capacity (qa only).
        #[arg(long)]
        max_heavy: Option<usize>,
        /// Shorter intervals for testing.
        #[arg(long, default_value_t = false)]
        test_mode: bool,
        /// Disable the auto-fix loop (reviewer only).
        #[arg(long, default_value_t = false)]
        no_auto_fix: bool,
        /// Fix attempts before escalation (reviewer only).
        #[arg(long)]
        max_fix_attempts: Option<u32>,
    },
    /// Show today's activity counters.
    Status,
    /// Render the full text dashboard.
    Dashboard,
}

/// Trip the shutdown signal on SIGINT/SIGTERM; remembers whether SIGINT was
/// the cause so the process can exit 130.
fn install_signal_handlers(shutdown: ShutdownSignal) -> Arc<AtomicBool> {
    let interrupted = Arc::new(AtomicBool::new(false));

    {
        let shutdown = shutdown.clone();
        let interrupted = interrupted.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                interrupted.store(true, Ordering::SeqCst);
                shutdown.trigger();
            }
        });
    }

    #[cfg(unix)]
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let Ok(mut sigterm) =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            else {
                return;
            };
            if sigterm.recv().await.is_some() {
                shutdown.trigger();
            }
        });
    }

    interrupted
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: failed to load configuration: {e}");
            return ExitCode::from(1);
        }
    };

    let service = match &cli.command {
        Commands::Queen { .. } => "hive-queen",
        Commands::Reviewer { .. } => "hive-reviewer",
        Commands::Qa { .. } => "hive-qa",
    };
    if cli.json_logs {
        hive_telemetry::init_logging_json(service, &config.general.log_level);
    } else {
        hive_telemetry::init_logging(service, &config.general.log_level);
    }

    let shutdown = ShutdownSignal::new();
    let interrupted = install_signal_handlers(shutdown.clone());
    let sink = StdoutSink;

    let result: anyhow::Result<bool> = match cli.command {
        Commands::Queen { command } => match command {
            QueenCommands::Setup => commands::queen::setup(&config, &sink).await.map(|_| true),
            QueenCommands::Run { goal, dry_run } => {
                commands::queen::run(&config, &goal, dry_run, &sink, shutdown.clone()).await
            }
            QueenCommands::Start => commands::queen::shell(&config, &sink, shutdown.clone())
                .await
                .map(|_| true),
            QueenCommands::Status => commands::queen::status(&config, &sink).map(|_| true),
            QueenCommands::Dashboard => commands::queen::dashboard(&config, &sink).map(|_| true),
        },
        Commands::Reviewer { command } => match command {
            DaemonCommands::Start {
                polling_interval,
                test_mode,
                no_auto_fix,
                max_fix_attempts,
                ..
            } => {
                let options = commands::reviewer::StartOptions {
                    polling_interval,
                    test_mode,
                    auto_fix: !no_auto_fix,
                    max_fix_attempts,
                };
                commands::reviewer::start(&config, options, shutdown.clone())
                    .await
                    .map(|_| true)
            }
            DaemonCommands::Status => commands::reviewer::status(&config, &sink).map(|_| true),
            DaemonCommands::Dashboard => {
                commands::reviewer::dashboard(&config, &sink).map(|_| true)
            }
        },
        Commands::Qa { command } => match command {
            DaemonCommands::Start {
                polling_interval,
                max_fast,
                max_heavy,
                test_mode,
                ..
            } => {
                let options = commands::qa::StartOptions {
                    polling_interval,
                    max_fast,
                    max_heavy,
                    test_mode,
                };
                commands::qa::start(&config, options, shutdown.clone())
                    .await
                    .map(|_| true)
            }
            DaemonCommands::Status => commands::qa::status(&config, &sink).map(|_| true),
            DaemonCommands::Dashboard => commands::qa::dashboard(&config, &sink).map(|_| true),
        },
    };

    match result {
        Ok(_) if interrupted.load(Ordering::SeqCst) => ExitCode::from(130),
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            error!(error = %e, "command failed");
            eprintln!("error: {e}");
            ExitCode::from(1)
        }
    }
}
