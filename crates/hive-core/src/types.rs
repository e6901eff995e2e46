use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// TaskStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    InProgress,
    ReviewPending,
    Approved,
    Rejected,
    ReworkNeeded,
    Escalated,
    Failed,
}

impl TaskStatus {
    /// Returns `true` when a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: &TaskStatus) -> bool {
        matches!(
            (self, target),
            (TaskStatus::Queued, TaskStatus::InProgress)
                | (TaskStatus::InProgress, TaskStatus::Queued)
                | (TaskStatus::InProgress, TaskStatus::ReviewPending)
                | (TaskStatus::InProgress, TaskStatus::Approved)
                | (TaskStatus::InProgress, TaskStatus::Rejected)
                | (TaskStatus::InProgress, TaskStatus::ReworkNeeded)
                | (TaskStatus::InProgress, TaskStatus::Escalated)
                | (TaskStatus::InProgress, TaskStatus::Failed)
                | (TaskStatus::ReviewPending, TaskStatus::InProgress)
                | (TaskStatus::ReviewPending, TaskStatus::Escalated)
                | (TaskStatus::Rejected, TaskStatus::ReworkNeeded)
                | (TaskStatus::Rejected, TaskStatus::Escalated)
                | (TaskStatus::ReworkNeeded, TaskStatus::Queued)
                | (TaskStatus::Escalated, TaskStatus::Queued)
        )
    }

    /// Terminal states admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Approved | TaskStatus::Failed)
    }
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Opaque, time-ordered identifier (`YYYYmmdd_HHMMSS_<suffix>`).
    pub id: String,
    pub description: String,
    pub status: TaskStatus,
    /// Arbitrary payload; QA tasks carry a `violations` array here.
    #[serde(default)]
    pub payload: serde_json::Value,
    pub correlation_id: Option<String>,
    /// Filesystem path of the code under review, when there is one.
    pub service_directory: Option<PathBuf>,
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn new(description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: format!(
                "{}_{}",
                now.format("%Y%m%d_%H%M%S"),
                &Uuid::new_v4().simple().to_string()[..8]
            ),
            description: description.into(),
            status: TaskStatus::Queued,
            payload: serde_json::Value::Null,
            correlation_id: None,
            service_directory: None,
            created_at: now,
        }
    }

    /// Violations carried in the payload of a QA workflow task.
    pub fn violations(&self) -> Vec<Violation> {
        self.payload
            .get("violations")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Agent
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    Queen,
    Worker,
    FastFix,
    HeavyFix,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Idle,
    Busy,
    Unhealthy,
    Offline,
}

/// A named endpoint reachable through the terminal transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentInfo {
    pub name: String,
    /// Pane title inside the multiplexer session.
    pub pane: String,
    pub kind: AgentKind,
    pub state: AgentState,
    pub last_heartbeat: DateTime<Utc>,
    pub current_task_id: Option<String>,
}

impl AgentInfo {
    pub fn new(name: impl Into<String>, kind: AgentKind) -> Self {
        let name = name.into();
        Self {
            pane: name.clone(),
            name,
            kind,
            state: AgentState::Idle,
            last_heartbeat: Utc::now(),
            current_task_id: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Dispatch & footers
// ---------------------------------------------------------------------------

/// The status value printed by an agent in its sentinel footer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FooterStatus {
    Success,
    Partial,
    Blocked,
    Failed,
    /// Synthesised locally when no footer arrived inside the budget.
    Timeout,
}

impl FooterStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FooterStatus::Success => "success",
            FooterStatus::Partial => "partial",
            FooterStatus::Blocked => "blocked",
            FooterStatus::Failed => "failed",
            FooterStatus::Timeout => "timeout",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "success" => Some(FooterStatus::Success),
            "partial" => Some(FooterStatus::Partial),
            "blocked" => Some(FooterStatus::Blocked),
            "failed" => Some(FooterStatus::Failed),
            "timeout" => Some(FooterStatus::Timeout),
            _ => None,
        }
    }
}

/// The `STATUS/CHANGES/NEXT/LAST_CMD` block terminating every dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusFooter {
    pub status: FooterStatus,
    pub changes: String,
    pub next: String,
    pub last_cmd: Option<String>,
}

impl StatusFooter {
    pub fn timeout() -> Self {
        Self {
            status: FooterStatus::Timeout,
            changes: String::new(),
            next: String::new(),
            last_cmd: None,
        }
    }

    pub fn failed(changes: impl Into<String>) -> Self {
        Self {
            status: FooterStatus::Failed,
            changes: changes.into(),
            next: String::new(),
            last_cmd: None,
        }
    }
}

/// In-flight record of a wrapped command sent to an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchRecord {
    pub task_id: String,
    pub agent_name: String,
    pub command: String,
    pub sent_at: DateTime<Utc>,
    pub timeout_secs: u64,
}

// ---------------------------------------------------------------------------
// Review verdicts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Approve,
    Reject,
    Rework,
    Escalate,
}

impl ReviewDecision {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "approve" => Some(ReviewDecision::Approve),
            "reject" => Some(ReviewDecision::Reject),
            "rework" => Some(ReviewDecision::Rework),
            "escalate" => Some(ReviewDecision::Escalate),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewDecision::Approve => "approve",
            ReviewDecision::Reject => "reject",
            ReviewDecision::Rework => "rework",
            ReviewDecision::Escalate => "escalate",
        }
    }
}

/// Per-dimension quality scores, each in `[0, 100]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub code_quality: f64,
    pub test_coverage: f64,
    pub documentation: f64,
    pub security: f64,
    pub architecture: f64,
}

impl QualityMetrics {
    /// Weighted overall score: 0.30 quality + 0.25 coverage + 0.15 docs
    /// + 0.20 security + 0.10 architecture.
    pub fn overall_score(&self) -> f64 {
        let total = self.code_quality * 0.30
            + self.test_coverage * 0.25
            + self.documentation * 0.15
            + self.security * 0.20
            + self.architecture * 0.10;
        (total * 100.0).round() / 100.0
    }
}

impl Default for QualityMetrics {
    fn default() -> Self {
        // Missing metrics default to the midpoint.
        Self {
            code_quality: 50.0,
            test_coverage: 50.0,
            documentation: 50.0,
            security: 50.0,
            architecture: 50.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewVerdict {
    pub task_id: String,
    pub decision: ReviewDecision,
    pub metrics: QualityMetrics,
    pub summary: String,
    pub issues: Vec<String>,
    pub suggestions: Vec<String>,
    pub confidence: f64,
    pub escalation_reason: Option<String>,
}

impl ReviewVerdict {
    pub fn overall_score(&self) -> f64 {
        self.metrics.overall_score()
    }

    pub fn to_metadata(&self) -> serde_json::Value {
        serde_json::json!({
            "decision": self.decision.as_str(),
            "metrics": self.metrics.clone(),
            "overall_score": self.overall_score(),
            "summary": self.summary.clone(),
            "issues": self.issues.clone(),
            "suggestions": self.suggestions.clone(),
            "confidence": self.confidence,
            "escalation_reason": self.escalation_reason.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// Fix sessions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixOutcome {
    InProgress,
    Fixed,
    Escalated,
    Failed,
}

impl FixOutcome {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, FixOutcome::InProgress)
    }
}

/// One fix that was applied to disk during a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppliedFix {
    pub file: String,
    pub fix_type: String,
    pub description: String,
    pub applied_at: DateTime<Utc>,
}

/// A bounded attempt sequence to repair a rejected task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixSession {
    pub task_id: String,
    pub service_path: PathBuf,
    pub attempt_count: u32,
    pub max_attempts: u32,
    pub applied_fixes: Vec<AppliedFix>,
    pub outcome: FixOutcome,
}

impl FixSession {
    pub fn new(task_id: impl Into<String>, service_path: PathBuf, max_attempts: u32) -> Self {
        Self {
            task_id: task_id.into(),
            service_path,
            attempt_count: 0,
            max_attempts,
            applied_fixes: Vec::new(),
            outcome: FixOutcome::InProgress,
        }
    }

    pub fn can_retry(&self) -> bool {
        self.outcome == FixOutcome::InProgress && self.attempt_count < self.max_attempts
    }
}

// ---------------------------------------------------------------------------
// Parsed errors & violations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warn,
    Error,
    Critical,
}

/// A single diagnostic extracted from validator output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedError {
    pub file_path: String,
    pub line: u32,
    pub error_code: String,
    pub error_message: String,
    pub severity: Severity,
    pub auto_fixable: bool,
}

/// A lint/test violation carried in a QA task payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Violation {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default = "Violation::default_severity")]
    pub severity: Severity,
}

impl Violation {
    fn default_severity() -> Severity {
        Severity::Warn
    }
}

// ---------------------------------------------------------------------------
// QA routing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkerType {
    FastFix,
    HeavyFixHeadless,
    HeavyFixWithHuman,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    GitCommit,
    CodeChunk,
}

/// A historical fix pattern retrieved from the pattern index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternMatch {
    #[serde(rename = "type")]
    pub kind: PatternKind,
    pub data: serde_json::Value,
    pub similarity: f64,
}

/// The routing decision for one violation batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerDecision {
    pub worker_type: WorkerType,
    pub reason: String,
    pub complexity_score: f64,
    pub rag_confidence: f64,
    /// Advisory fix patterns handed to the chosen worker.
    pub context: Vec<PatternMatch>,
}

// ---------------------------------------------------------------------------
// Escalations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationStatus {
    Pending,
    InReview,
    Resolved,
    CannotFix,
    WontFix,
    Cancelled,
}

impl EscalationStatus {
    pub fn is_resolution(&self) -> bool {
        matches!(
            self,
            EscalationStatus::Resolved
                | EscalationStatus::CannotFix
                | EscalationStatus::WontFix
                | EscalationStatus::Cancelled
        )
    }
}

/// A recorded hand-off to human review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Escalation {
    pub id: String,
    pub task_id: String,
    pub worker_id: String,
    pub reason: String,
    pub status: EscalationStatus,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

impl Escalation {
    pub fn new(
        task_id: impl Into<String>,
        worker_id: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            id: format!("esc-{}", &Uuid::new_v4().simple().to_string()[..8]),
            task_id: task_id.into(),
            worker_id: worker_id.into(),
            reason: reason.into(),
            status: EscalationStatus::Pending,
            created_at: Utc::now(),
            resolved_at: None,
            notes: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Task artifacts
// ---------------------------------------------------------------------------

/// Artifacts attached to a task for review: code files, raw test-runner
/// output, and the worker transcript when one was captured.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskArtifacts {
    pub code_files: BTreeMap<String, String>,
    pub test_results: Option<String>,
    pub transcript: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_ids_are_time_ordered_prefix() {
        let task = Task::new("add health endpoint");
        let prefix = &task.id[..15];
        assert_eq!(prefix.len(), 15);
        assert!(prefix.chars().nth(8) == Some('_'));
    }

    #[test]
    fn terminal_statuses_admit_no_transitions() {
        for target in [
            TaskStatus::Queued,
            TaskStatus::InProgress,
            TaskStatus::ReviewPending,
            TaskStatus::Rejected,
        ] {
            assert!(!TaskStatus::Approved.can_transition_to(&target));
            assert!(!TaskStatus::Failed.can_transition_to(&target));
        }
    }

    #[test]
    fn overall_score_uses_documented_weights() {
        let metrics = QualityMetrics {
            code_quality: 100.0,
            test_coverage: 0.0,
            documentation: 0.0,
            security: 0.0,
            architecture: 0.0,
        };
        assert_eq!(metrics.overall_score(), 30.0);

        let uniform = QualityMetrics {
            code_quality: 80.0,
            test_coverage: 80.0,
            documentation: 80.0,
            security: 80.0,
            architecture: 80.0,
        };
        assert_eq!(uniform.overall_score(), 80.0);
    }

    #[test]
    fn footer_status_round_trips_through_str() {
        for status in [
            FooterStatus::Success,
            FooterStatus::Partial,
            FooterStatus::Blocked,
            FooterStatus::Failed,
            FooterStatus::Timeout,
        ] {
            assert_eq!(FooterStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(FooterStatus::parse("done"), None);
    }

    #[test]
    fn violations_parse_from_payload() {
        let mut task = Task::new("qa batch");
        task.payload = serde_json::json!({
            "violations": [
                {"type": "E501", "file": "src/app.py", "message": "line too long", "severity": "warn"},
                {"type": "security", "severity": "critical"},
            ]
        });
        let violations = task.violations();
        assert_eq!(violations.len(), 2);
        assert_eq!(violations[0].kind, "E501");
        assert_eq!(violations[1].severity, Severity::Critical);
    }

    #[test]
    fn fix_session_retry_budget() {
        let mut session = FixSession::new("t-1", PathBuf::from("/tmp/svc"), 3);
        assert!(session.can_retry());
        session.attempt_count = 3;
        assert!(!session.can_retry());
        session.attempt_count = 1;
        session.outcome = FixOutcome::Escalated;
        assert!(!session.can_retry());
    }
}
