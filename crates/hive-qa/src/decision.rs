use std::collections::HashSet;
use std::sync::Arc;

use hive_core::types::{Severity, Violation, WorkerDecision, WorkerType};
use tracing::info;

use crate::rag::PatternIndex;

/// Per-violation-type complexity weight. Style violations are near-free,
/// configuration edits cost a little, architectural refactors and security
/// findings dominate the batch score.
fn violation_weight(kind: &str) -> f64 {
    match kind {
        "E501" | "F401" | "style" => 0.05,
        "E402" => 0.1,
        "config" | "GR31" | "GR32" => 0.15,
        "logging" | "GR9" => 0.2,
        "pytest" | "test" => 0.3,
        "GR6" | "GR4" | "imports" => 0.4,
        "GR37" | "architecture" => 0.5,
        "security" => 0.7,
        _ => 0.2,
    }
}

/// Scores violation batches and routes them to a worker pool.
///
/// Rules, evaluated in order: critical severity always goes to a human;
/// high complexity goes to a headless heavy worker; high-confidence large
/// batches go to the fast pool; everything else defaults to the fast pool
/// and may escalate later.
pub struct WorkerDecisionEngine {
    index: Option<Arc<dyn PatternIndex>>,
    complexity_threshold: f64,
    confidence_threshold: f64,
}

impl WorkerDecisionEngine {
    pub fn new(
        index: Option<Arc<dyn PatternIndex>>,
        complexity_threshold: f64,
        confidence_threshold: f64,
    ) -> Self {
        Self {
            index,
            complexity_threshold,
            confidence_threshold,
        }
    }

    pub async fn decide(&self, violations: &[Violation]) -> WorkerDecision {
        let complexity_score = complexity(violations);
        let context = self.retrieve_patterns(violations).await;
        let rag_confidence = rag_confidence(&context);

        info!(
            violations = violations.len(),
            complexity = format!("{complexity_score:.2}"),
            rag_confidence = format!("{rag_confidence:.2}"),
            "scoring violation batch"
        );

        // Rule 1: critical severity always goes to HITL.
        if violations.iter().any(|v| v.severity == Severity::Critical) {
            return WorkerDecision {
                worker_type: WorkerType::HeavyFixWithHuman,
                reason: "critical severity requires human review".into(),
                complexity_score,
                rag_confidence,
                context,
            };
        }

        // Rule 2: high complexity goes to a headless heavy worker.
        if complexity_score > self.complexity_threshold {
            return WorkerDecision {
                worker_type: WorkerType::HeavyFixHeadless,
                reason: format!("complex reasoning required (score {complexity_score:.2})"),
                complexity_score,
                rag_confidence,
                context,
            };
        }

        // Rule 3: high-confidence batches go to the fast pool.
        if rag_confidence > self.confidence_threshold && violations.len() > 5 {
            return WorkerDecision {
                worker_type: WorkerType::FastFix,
                reason: format!("high-confidence batch fix (confidence {rag_confidence:.2})"),
                complexity_score,
                rag_confidence,
                context,
            };
        }

        // Rule 4: default to the fast pool; it can escalate later.
        WorkerDecision {
            worker_type: WorkerType::FastFix,
            reason: "lightweight auto-fix attempt".into(),
            complexity_score,
            rag_confidence,
            context,
        }
    }

    async fn retrieve_patterns(
        &self,
        violations: &[Violation],
    ) -> Vec<hive_core::types::PatternMatch> {
        let Some(index) = &self.index else {
            return Vec::new();
        };
        let Some(first) = violations.first() else {
            return Vec::new();
        };
        let query = format!(
            "{} in {}: {}",
            first.kind,
            first.file.as_deref().unwrap_or(""),
            first.message
        );
        index.retrieve(&query, 5).await
    }
}

/// Complexity in [0, 1]: violation count (capped at 0.5) + distinct files
/// (capped at 0.3) + the worst per-violation type weight.
pub fn complexity(violations: &[Violation]) -> f64 {
    if violations.is_empty() {
        return 0.0;
    }
    let base = (violations.len() as f64 / 20.0).min(0.5);

    let unique_files: HashSet<&str> = violations
        .iter()
        .filter_map(|v| v.file.as_deref())
        .collect();
    let files = (unique_files.len() as f64 / 10.0).min(0.3);

    let type_weight = violations
        .iter()
        .map(|v| violation_weight(&v.kind))
        .fold(0.0, f64::max);

    (base + files + type_weight).min(1.0)
}

/// Mean similarity of the top three retrieved patterns; 0 with no patterns.
pub fn rag_confidence(patterns: &[hive_core::types::PatternMatch]) -> f64 {
    if patterns.is_empty() {
        return 0.0;
    }
    let top: Vec<f64> = patterns.iter().take(3).map(|p| p.similarity).collect();
    top.iter().sum::<f64>() / top.len() as f64
}
