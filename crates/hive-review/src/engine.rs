use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use hive_core::config::ReviewThresholds;
use hive_core::types::{QualityMetrics, ReviewDecision, ReviewVerdict, TaskArtifacts};
use hive_harness::RetryPolicy;
use tracing::{info, warn};

use crate::CollaboratorError;

// ---------------------------------------------------------------------------
// Collaborator contracts
// ---------------------------------------------------------------------------

/// The bundle sent to the reviewing collaborators.
#[derive(Debug, Clone)]
pub struct ReviewRequest {
    pub task_id: String,
    pub description: String,
    pub code_files: BTreeMap<String, String>,
    pub test_results: Option<String>,
    pub transcript: Option<String>,
    /// Per-file metrics and issue lists from the objective analyser, when
    /// one ran.
    pub objective_analysis: Option<serde_json::Value>,
    /// Advisory thresholds so the collaborator knows the decision bands.
    pub thresholds: ReviewThresholds,
}

/// LLM-backed reviewer: consumes the request bundle and produces a
/// structured verdict as JSON.
#[async_trait]
pub trait ReviewCollaborator: Send + Sync {
    async fn review(&self, request: &ReviewRequest) -> Result<serde_json::Value, CollaboratorError>;
}

/// Objective analyser: returns per-file metrics and issue lists.
#[async_trait]
pub trait ObjectiveAnalyzer: Send + Sync {
    async fn analyze(
        &self,
        task_id: &str,
        code_files: &BTreeMap<String, String>,
    ) -> Result<serde_json::Value, CollaboratorError>;
}

// ---------------------------------------------------------------------------
// ReviewEngine
// ---------------------------------------------------------------------------

/// Orchestrates the objective analyser and the LLM reviewer and coerces
/// their output into a [`ReviewVerdict`].
///
/// The engine never inspects source itself. It does enforce the decision
/// invariants: unknown decisions coerce to escalate, missing metrics default
/// to 50, low confidence forces escalation, and threshold violations
/// downgrade/upgrade to rework (a misscored verdict never silently
/// approves).
pub struct ReviewEngine {
    collaborator: Arc<dyn ReviewCollaborator>,
    analyzer: Option<Arc<dyn ObjectiveAnalyzer>>,
    thresholds: ReviewThresholds,
    retry: RetryPolicy,
}

impl ReviewEngine {
    pub fn new(
        collaborator: Arc<dyn ReviewCollaborator>,
        analyzer: Option<Arc<dyn ObjectiveAnalyzer>>,
        thresholds: ReviewThresholds,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            collaborator,
            analyzer,
            thresholds,
            retry,
        }
    }

    pub fn thresholds(&self) -> &ReviewThresholds {
        &self.thresholds
    }

    /// Review a task's artifacts and produce a verdict.
    pub async fn review(
        &self,
        task_id: &str,
        description: &str,
        artifacts: &TaskArtifacts,
    ) -> ReviewVerdict {
        let objective_analysis = match &self.analyzer {
            Some(analyzer) => match analyzer.analyze(task_id, &artifacts.code_files).await {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!(task_id, error = %e, "objective analysis failed, continuing without it");
                    None
                }
            },
            None => None,
        };

        let request = ReviewRequest {
            task_id: task_id.to_string(),
            description: description.to_string(),
            code_files: artifacts.code_files.clone(),
            test_results: artifacts.test_results.clone(),
            transcript: artifacts.transcript.clone(),
            objective_analysis,
            thresholds: self.thresholds.clone(),
        };

        let raw = self
            .retry
            .run(
                |_| async { self.collaborator.review(&request).await },
                CollaboratorError::is_transient,
            )
            .await;

        match raw {
            Ok(value) => self.coerce(task_id, value),
            Err(e) => {
                warn!(task_id, error = %e, "review collaborator failed, escalating");
                ReviewVerdict {
                    task_id: task_id.to_string(),
                    decision: ReviewDecision::Escalate,
                    metrics: QualityMetrics::default(),
                    summary: format!("Review failed: {e}"),
                    issues: vec!["Review process encountered an error".into()],
                    suggestions: vec!["Manual review required".into()],
                    confidence: 0.0,
                    escalation_reason: Some(format!("review collaborator failed: {e}")),
                }
            }
        }
    }

    /// Coerce raw collaborator output into the verdict schema and enforce
    /// the decision invariants.
    fn coerce(&self, task_id: &str, value: serde_json::Value) -> ReviewVerdict {
        let decision_str = value["decision"].as_str().unwrap_or("escalate");
        let mut decision = match ReviewDecision::parse(decision_str) {
            Some(decision) => decision,
            None => {
                warn!(task_id, decision = decision_str, "unknown decision, coercing to escalate");
                ReviewDecision::Escalate
            }
        };

        let metrics_value = &value["metrics"];
        let metric = |keys: &[&str]| -> f64 {
            keys.iter()
                .find_map(|k| metrics_value[*k].as_f64())
                .unwrap_or(50.0)
                .clamp(0.0, 100.0)
        };
        let metrics = QualityMetrics {
            code_quality: metric(&["code_quality"]),
            test_coverage: metric(&["test_coverage", "testing"]),
            documentation: metric(&["documentation"]),
            security: metric(&["security"]),
            architecture: metric(&["architecture"]),
        };

        let confidence = value["confidence"].as_f64().unwrap_or(0.5).clamp(0.0, 1.0);
        let summary = value["summary"]
            .as_str()
            .unwrap_or("Review completed")
            .to_string();
        let strings = |key: &str| -> Vec<String> {
            value[key]
                .as_array()
                .map(|a| {
                    a.iter()
                        .filter_map(|v| v.as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default()
        };
        let mut escalation_reason = value["escalation_reason"].as_str().map(str::to_string);

        let overall = metrics.overall_score();

        // Low confidence always escalates, whatever the collaborator said.
        if confidence < self.thresholds.confidence && decision != ReviewDecision::Escalate {
            warn!(task_id, confidence, "confidence below threshold, escalating");
            escalation_reason.get_or_insert_with(|| {
                format!(
                    "confidence {confidence:.2} below threshold {:.2}",
                    self.thresholds.confidence
                )
            });
            decision = ReviewDecision::Escalate;
        }

        // Post-hoc threshold enforcement.
        if decision == ReviewDecision::Approve && overall < self.thresholds.approve {
            warn!(task_id, overall, "approve below approve threshold, downgrading to rework");
            decision = ReviewDecision::Rework;
        } else if decision == ReviewDecision::Reject && overall >= self.thresholds.approve {
            warn!(task_id, overall, "reject above approve threshold, upgrading to rework");
            decision = ReviewDecision::Rework;
        }

        info!(
            task_id,
            decision = decision.as_str(),
            overall,
            confidence,
            "verdict coerced"
        );
        ReviewVerdict {
            task_id: task_id.to_string(),
            decision,
            metrics,
            summary,
            issues: strings("issues"),
            suggestions: strings("suggestions"),
            confidence,
            escalation_reason,
        }
    }
}
