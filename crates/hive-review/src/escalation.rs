use hive_core::types::{AppliedFix, FixSession};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Why an auto-fix session gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationReason {
    ConsecutiveIdenticalFailures,
    AttemptBudgetExhausted,
    NoParseableErrors,
}

impl EscalationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EscalationReason::ConsecutiveIdenticalFailures => "consecutive_identical_failures",
            EscalationReason::AttemptBudgetExhausted => "attempt_budget_exhausted",
            EscalationReason::NoParseableErrors => "no_parseable_errors",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EscalationDecision {
    pub should_escalate: bool,
    pub reason: Option<EscalationReason>,
}

impl EscalationDecision {
    fn stay() -> Self {
        Self {
            should_escalate: false,
            reason: None,
        }
    }

    fn escalate(reason: EscalationReason) -> Self {
        Self {
            should_escalate: true,
            reason: Some(reason),
        }
    }
}

/// Snapshot handed to humans when the loop gives up: everything that was
/// tried plus the last validator output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationReport {
    pub task_id: String,
    pub reason: EscalationReason,
    pub attempt_count: u32,
    pub applied_fixes: Vec<AppliedFix>,
    pub last_validator_output: String,
}

/// Decides when an auto-fix session must stop and hand off to a human.
#[derive(Debug, Clone, Copy)]
pub struct EscalationLogic {
    max_attempts: u32,
}

impl EscalationLogic {
    pub fn new(max_attempts: u32) -> Self {
        Self { max_attempts }
    }

    /// Escalation is warranted when the attempt budget is spent, when a later
    /// pass produced nothing parseable to work on, or when two consecutive
    /// re-validations failed identically (the fixes are not moving anything).
    pub fn should_escalate(
        &self,
        session: &FixSession,
        last_output: &str,
        previous_output: Option<&str>,
        fixable_remaining: usize,
    ) -> EscalationDecision {
        if session.attempt_count >= self.max_attempts {
            return EscalationDecision::escalate(EscalationReason::AttemptBudgetExhausted);
        }
        if fixable_remaining == 0 {
            return EscalationDecision::escalate(EscalationReason::NoParseableErrors);
        }
        if let Some(prev) = previous_output {
            if prev == last_output {
                return EscalationDecision::escalate(
                    EscalationReason::ConsecutiveIdenticalFailures,
                );
            }
        }
        debug!(
            attempt = session.attempt_count,
            fixable_remaining, "continuing fix session"
        );
        EscalationDecision::stay()
    }

    pub fn report(
        &self,
        session: &FixSession,
        reason: EscalationReason,
        last_output: &str,
    ) -> EscalationReport {
        EscalationReport {
            task_id: session.task_id.clone(),
            reason,
            attempt_count: session.attempt_count,
            applied_fixes: session.applied_fixes.clone(),
            last_validator_output: last_output.to_string(),
        }
    }
}
