//! The autonomous review pipeline: verdict engine, validator-output parsing,
//! fix generation and application, the bounded auto-fix loop, and the
//! reviewer daemon that ties them to the task store and event bus.

pub mod agent;
pub mod autofix;
pub mod engine;
pub mod escalation;
pub mod fixer;
pub mod parsers;
pub mod validate;

pub use agent::{ReviewerAgent, ReviewerStats};
pub use autofix::{AutoFixLoop, AutoFixOutcome};
pub use engine::{ObjectiveAnalyzer, ReviewCollaborator, ReviewEngine, ReviewRequest};
pub use fixer::{Fix, FixGenerator, MechanicalFixGenerator};

/// Failures from external collaborators (LLM reviewer, fix generator).
///
/// Transient and rate-limit failures are retried with bounded backoff;
/// fatal ones surface immediately and end up as escalations.
#[derive(Debug, thiserror::Error)]
pub enum CollaboratorError {
    #[error("collaborator rate limited: {0}")]
    RateLimited(String),
    #[error("transient collaborator failure: {0}")]
    Transient(String),
    #[error("collaborator failure: {0}")]
    Fatal(String),
}

impl CollaboratorError {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CollaboratorError::RateLimited(_) | CollaboratorError::Transient(_)
        )
    }
}
