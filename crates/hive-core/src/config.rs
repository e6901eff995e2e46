use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration loaded from `~/.hive/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub git: GitConfig,
    #[serde(default)]
    pub review: ReviewConfig,
    #[serde(default)]
    pub autofix: AutofixConfig,
    #[serde(default)]
    pub qa: QaConfig,
    #[serde(default)]
    pub rag: RagConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub bus: BusConfig,
}

impl Config {
    /// Load config from `~/.hive/config.toml`, falling back to defaults when
    /// the file does not exist, then apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        let mut cfg = if path.exists() {
            let text =
                std::fs::read_to_string(&path).map_err(|e| ConfigError::Io(e.to_string()))?;
            toml::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))?
        } else {
            Config::default()
        };
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    /// Load from a specific path (no env overrides).
    pub fn load_from(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let text = std::fs::read_to_string(&path).map_err(|e| ConfigError::Io(e.to_string()))?;
        toml::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// `HIVE_*` environment variables override the file values so deployed
    /// daemons can be pointed at their collaborators without editing config.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("HIVE_TMUX_SESSION") {
            if !v.is_empty() {
                self.transport.session = v;
            }
        }
        if let Ok(v) = std::env::var("HIVE_RAG_INDEX_DIR") {
            if !v.is_empty() {
                self.rag.index_dir = PathBuf::from(v);
            }
        }
        if let Ok(v) = std::env::var("HIVE_TASK_STORE") {
            if !v.is_empty() {
                self.store.url = Some(v);
            }
        }
        if let Ok(v) = std::env::var("HIVE_EVENT_BUS") {
            if !v.is_empty() {
                self.bus.url = Some(v);
            }
        }
    }

    fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".hive")
            .join("config.toml")
    }
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io: {0}")]
    Io(String),
    #[error("parse: {0}")]
    Parse(String),
}

// ---------------------------------------------------------------------------
// Section structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Directory for the JSONL task event log.
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_dir: default_log_dir(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}
fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Name of the pre-provisioned tmux session.
    #[serde(default = "default_session")]
    pub session: String,
    /// How many trailing pane rows `capture` reads.
    #[serde(default = "default_capture_tail")]
    pub capture_tail: usize,
    /// Inter-line delay when sending keystrokes, in milliseconds.
    #[serde(default = "default_send_delay_ms")]
    pub send_delay_ms: u64,
    /// Poll interval of the read-status loop, in seconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            session: default_session(),
            capture_tail: default_capture_tail(),
            send_delay_ms: default_send_delay_ms(),
            poll_interval_secs: default_poll_interval(),
        }
    }
}

fn default_session() -> String {
    "hive-swarm".into()
}
fn default_capture_tail() -> usize {
    200
}
fn default_send_delay_ms() -> u64 {
    100
}
fn default_poll_interval() -> u64 {
    2
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Timeout for the queen's planning dispatch, seconds.
    #[serde(default = "default_plan_timeout")]
    pub plan_timeout_secs: u64,
    /// Timeout for each worker dispatch, seconds.
    #[serde(default = "default_work_timeout")]
    pub work_timeout_secs: u64,
    /// Worker pane names used by the static delegation fallback.
    #[serde(default = "default_workers")]
    pub workers: Vec<String>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            plan_timeout_secs: default_plan_timeout(),
            work_timeout_secs: default_work_timeout(),
            workers: default_workers(),
        }
    }
}

fn default_plan_timeout() -> u64 {
    60
}
fn default_work_timeout() -> u64 {
    120
}
fn default_workers() -> Vec<String> {
    vec!["worker-backend".into(), "worker-frontend".into()]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitConfig {
    #[serde(default = "default_base_branch")]
    pub base_branch: String,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default = "default_true")]
    pub auto_merge: bool,
    /// When this file exists PR creation is suppressed.
    #[serde(default = "default_pause_file")]
    pub pause_file: PathBuf,
    /// Directory for per-worker worktrees.
    #[serde(default = "default_workspaces_dir")]
    pub workspaces_dir: PathBuf,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            base_branch: default_base_branch(),
            dry_run: false,
            auto_merge: true,
            pause_file: default_pause_file(),
            workspaces_dir: default_workspaces_dir(),
        }
    }
}

fn default_base_branch() -> String {
    "main".into()
}
fn default_true() -> bool {
    true
}
fn default_pause_file() -> PathBuf {
    PathBuf::from(".ops/PAUSE")
}
fn default_workspaces_dir() -> PathBuf {
    PathBuf::from("workspaces")
}

/// Decision thresholds for the review engine. Values come from operational
/// tuning and are advisory to the LLM as well as enforced post-hoc.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewThresholds {
    #[serde(default = "default_approve")]
    pub approve: f64,
    #[serde(default = "default_reject")]
    pub reject: f64,
    #[serde(default = "default_escalate")]
    pub escalate: f64,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

impl Default for ReviewThresholds {
    fn default() -> Self {
        Self {
            approve: default_approve(),
            reject: default_reject(),
            escalate: default_escalate(),
            confidence: default_confidence(),
        }
    }
}

fn default_approve() -> f64 {
    80.0
}
fn default_reject() -> f64 {
    40.0
}
fn default_escalate() -> f64 {
    60.0
}
fn default_confidence() -> f64 {
    0.7
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewConfig {
    #[serde(default = "default_review_poll")]
    pub polling_interval_secs: u64,
    /// Shorter polling interval when running under `--test-mode`.
    #[serde(default = "default_test_poll")]
    pub test_polling_interval_secs: u64,
    #[serde(default = "default_true")]
    pub auto_fix_enabled: bool,
    #[serde(default = "default_max_fix_attempts")]
    pub max_fix_attempts: u32,
    /// Argv of the review collaborator command; it receives the request
    /// bundle as JSON on stdin and prints a verdict JSON on stdout. Empty
    /// means no collaborator is wired and every review escalates.
    #[serde(default)]
    pub collab_cmd: Vec<String>,
    #[serde(default)]
    pub thresholds: ReviewThresholds,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            polling_interval_secs: default_review_poll(),
            test_polling_interval_secs: default_test_poll(),
            auto_fix_enabled: true,
            max_fix_attempts: default_max_fix_attempts(),
            collab_cmd: Vec::new(),
            thresholds: ReviewThresholds::default(),
        }
    }
}

fn default_review_poll() -> u64 {
    30
}
fn default_test_poll() -> u64 {
    5
}
fn default_max_fix_attempts() -> u32 {
    3
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutofixConfig {
    #[serde(default = "default_syntax_timeout")]
    pub syntax_timeout_secs: u64,
    #[serde(default = "default_lint_timeout")]
    pub lint_timeout_secs: u64,
    #[serde(default = "default_test_timeout")]
    pub test_timeout_secs: u64,
    #[serde(default = "default_true")]
    pub create_backups: bool,
    #[serde(default)]
    pub dry_run: bool,
    /// Validator argv templates; the service directory is appended.
    #[serde(default = "default_syntax_cmd")]
    pub syntax_cmd: Vec<String>,
    #[serde(default = "default_lint_cmd")]
    pub lint_cmd: Vec<String>,
    #[serde(default = "default_test_cmd")]
    pub test_cmd: Vec<String>,
}

impl Default for AutofixConfig {
    fn default() -> Self {
        Self {
            syntax_timeout_secs: default_syntax_timeout(),
            lint_timeout_secs: default_lint_timeout(),
            test_timeout_secs: default_test_timeout(),
            create_backups: true,
            dry_run: false,
            syntax_cmd: default_syntax_cmd(),
            lint_cmd: default_lint_cmd(),
            test_cmd: default_test_cmd(),
        }
    }
}

fn default_syntax_timeout() -> u64 {
    10
}
fn default_lint_timeout() -> u64 {
    30
}
fn default_test_timeout() -> u64 {
    30
}
fn default_syntax_cmd() -> Vec<String> {
    vec!["python".into(), "-m".into(), "compileall".into(), "-q".into()]
}
fn default_lint_cmd() -> Vec<String> {
    vec!["ruff".into(), "check".into()]
}
fn default_test_cmd() -> Vec<String> {
    vec![
        "python".into(),
        "-m".into(),
        "pytest".into(),
        "--collect-only".into(),
        "-q".into(),
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QaConfig {
    #[serde(default = "default_qa_poll")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_max_fast")]
    pub max_fast: usize,
    #[serde(default = "default_max_heavy")]
    pub max_heavy: usize,
    #[serde(default = "default_heartbeat")]
    pub heartbeat_interval_secs: u64,
    #[serde(default = "default_worker_timeout")]
    pub worker_timeout_secs: u64,
    /// Per-operation deadline for fast-fix executions, seconds.
    #[serde(default = "default_fast_deadline")]
    pub fast_deadline_secs: u64,
    #[serde(default = "default_complexity_threshold")]
    pub complexity_threshold: f64,
    #[serde(default = "default_rag_confidence_threshold")]
    pub rag_confidence_threshold: f64,
}

impl Default for QaConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_qa_poll(),
            max_fast: default_max_fast(),
            max_heavy: default_max_heavy(),
            heartbeat_interval_secs: default_heartbeat(),
            worker_timeout_secs: default_worker_timeout(),
            fast_deadline_secs: default_fast_deadline(),
            complexity_threshold: default_complexity_threshold(),
            rag_confidence_threshold: default_rag_confidence_threshold(),
        }
    }
}

fn default_qa_poll() -> u64 {
    5
}
fn default_max_fast() -> usize {
    3
}
fn default_max_heavy() -> usize {
    2
}
fn default_heartbeat() -> u64 {
    30
}
fn default_worker_timeout() -> u64 {
    300
}
fn default_fast_deadline() -> u64 {
    30
}
fn default_complexity_threshold() -> f64 {
    0.7
}
fn default_rag_confidence_threshold() -> f64 {
    0.8
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    #[serde(default = "default_rag_index_dir")]
    pub index_dir: PathBuf,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            index_dir: default_rag_index_dir(),
        }
    }
}

fn default_rag_index_dir() -> PathBuf {
    PathBuf::from("data/rag_index")
}

/// Task-store connection string; `None` selects the in-memory store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub url: Option<String>,
}

/// Event-bus endpoint; `None` selects the in-process bus.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BusConfig {
    #[serde(default)]
    pub url: Option<String>,
}
