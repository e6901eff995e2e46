use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use hive_core::config::ReviewThresholds;
use hive_core::types::{ReviewDecision, TaskArtifacts};
use hive_harness::RetryPolicy;
use hive_review::engine::{ReviewCollaborator, ReviewEngine, ReviewRequest};
use hive_review::CollaboratorError;

struct StaticCollaborator {
    response: serde_json::Value,
}

#[async_trait]
impl ReviewCollaborator for StaticCollaborator {
    async fn review(&self, _request: &ReviewRequest) -> Result<serde_json::Value, CollaboratorError> {
        Ok(self.response.clone())
    }
}

struct FlakyCollaborator {
    calls: AtomicU32,
    fail_times: u32,
    response: serde_json::Value,
}

#[async_trait]
impl ReviewCollaborator for FlakyCollaborator {
    async fn review(&self, _request: &ReviewRequest) -> Result<serde_json::Value, CollaboratorError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.fail_times {
            Err(CollaboratorError::Transient("busy".into()))
        } else {
            Ok(self.response.clone())
        }
    }
}

fn engine_with(response: serde_json::Value) -> ReviewEngine {
    ReviewEngine::new(
        Arc::new(StaticCollaborator { response }),
        None,
        ReviewThresholds::default(),
        RetryPolicy::immediate(3),
    )
}

fn artifacts() -> TaskArtifacts {
    let mut artifacts = TaskArtifacts::default();
    artifacts
        .code_files
        .insert("src/api.py".into(), "def health(): ...".into());
    artifacts
}

fn verdict_json(decision: &str, score: f64, confidence: f64) -> serde_json::Value {
    serde_json::json!({
        "decision": decision,
        "metrics": {
            "code_quality": score,
            "test_coverage": score,
            "documentation": score,
            "security": score,
            "architecture": score,
        },
        "summary": "looks fine",
        "issues": [],
        "suggestions": [],
        "confidence": confidence,
    })
}

#[tokio::test]
async fn approve_passes_through_when_thresholds_hold() {
    let engine = engine_with(verdict_json("approve", 85.0, 0.9));
    let verdict = engine.review("t-1", "add endpoint", &artifacts()).await;

    assert_eq!(verdict.decision, ReviewDecision::Approve);
    assert_eq!(verdict.overall_score(), 85.0);
    assert!(verdict.confidence >= 0.7);
}

#[tokio::test]
async fn low_confidence_forces_escalation() {
    let engine = engine_with(verdict_json("approve", 90.0, 0.4));
    let verdict = engine.review("t-1", "add endpoint", &artifacts()).await;

    assert_eq!(verdict.decision, ReviewDecision::Escalate);
    assert!(verdict.escalation_reason.is_some());
}

#[tokio::test]
async fn approve_below_threshold_downgrades_to_rework() {
    let engine = engine_with(verdict_json("approve", 70.0, 0.9));
    let verdict = engine.review("t-1", "add endpoint", &artifacts()).await;

    assert_eq!(verdict.decision, ReviewDecision::Rework);
}

#[tokio::test]
async fn reject_above_approve_threshold_upgrades_to_rework() {
    // Never silently approves: a contradictory reject becomes rework.
    let engine = engine_with(verdict_json("reject", 90.0, 0.9));
    let verdict = engine.review("t-1", "add endpoint", &artifacts()).await;

    assert_eq!(verdict.decision, ReviewDecision::Rework);
}

#[tokio::test]
async fn unknown_decision_coerces_to_escalate() {
    let engine = engine_with(verdict_json("maybe", 85.0, 0.9));
    let verdict = engine.review("t-1", "add endpoint", &artifacts()).await;

    assert_eq!(verdict.decision, ReviewDecision::Escalate);
}

#[tokio::test]
async fn missing_metrics_default_to_midpoint() {
    let engine = engine_with(serde_json::json!({
        "decision": "reject",
        "summary": "bad",
        "confidence": 0.9,
    }));
    let verdict = engine.review("t-1", "add endpoint", &artifacts()).await;

    assert_eq!(verdict.metrics.code_quality, 50.0);
    assert_eq!(verdict.overall_score(), 50.0);
    assert_eq!(verdict.decision, ReviewDecision::Reject);
}

#[tokio::test]
async fn testing_metric_alias_is_accepted() {
    let engine = engine_with(serde_json::json!({
        "decision": "reject",
        "metrics": {"testing": 20.0},
        "confidence": 0.9,
    }));
    let verdict = engine.review("t-1", "add endpoint", &artifacts()).await;
    assert_eq!(verdict.metrics.test_coverage, 20.0);
}

#[tokio::test]
async fn transient_collaborator_failures_are_retried() {
    let engine = ReviewEngine::new(
        Arc::new(FlakyCollaborator {
            calls: AtomicU32::new(0),
            fail_times: 2,
            response: verdict_json("approve", 85.0, 0.9),
        }),
        None,
        ReviewThresholds::default(),
        RetryPolicy::immediate(3),
    );
    let verdict = engine.review("t-1", "add endpoint", &artifacts()).await;
    assert_eq!(verdict.decision, ReviewDecision::Approve);
}

#[tokio::test]
async fn exhausted_retries_escalate_with_zero_confidence() {
    let engine = ReviewEngine::new(
        Arc::new(FlakyCollaborator {
            calls: AtomicU32::new(0),
            fail_times: 10,
            response: serde_json::Value::Null,
        }),
        None,
        ReviewThresholds::default(),
        RetryPolicy::immediate(2),
    );
    let verdict = engine.review("t-1", "add endpoint", &artifacts()).await;

    assert_eq!(verdict.decision, ReviewDecision::Escalate);
    assert_eq!(verdict.confidence, 0.0);
    assert!(verdict.escalation_reason.is_some());
}
