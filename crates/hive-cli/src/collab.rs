use std::process::Stdio;

use async_trait::async_trait;
use hive_review::engine::{ReviewCollaborator, ReviewRequest};
use hive_review::CollaboratorError;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Review collaborator backed by an external command.
///
/// The command receives the request bundle as JSON on stdin and must print
/// a verdict JSON object on stdout. Non-zero exits are treated as transient
/// (the service may be rate limited); unparseable output is fatal.
pub struct CommandReviewCollaborator {
    argv: Vec<String>,
}

impl CommandReviewCollaborator {
    pub fn new(argv: Vec<String>) -> Self {
        Self { argv }
    }
}

#[async_trait]
impl ReviewCollaborator for CommandReviewCollaborator {
    async fn review(&self, request: &ReviewRequest) -> Result<serde_json::Value, CollaboratorError> {
        let Some(program) = self.argv.first() else {
            return Err(CollaboratorError::Fatal(
                "no review collaborator configured".into(),
            ));
        };

        let bundle = serde_json::json!({
            "task_id": request.task_id.clone(),
            "description": request.description.clone(),
            "code_files": request.code_files.clone(),
            "test_results": request.test_results.clone(),
            "transcript": request.transcript.clone(),
            "objective_analysis": request.objective_analysis.clone(),
            "thresholds": {
                "approve": request.thresholds.approve,
                "reject": request.thresholds.reject,
                "escalate": request.thresholds.escalate,
            },
        });

        let mut child = tokio::process::Command::new(program)
            .args(&self.argv[1..])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CollaboratorError::Fatal(format!("spawn {program}: {e}")))?;

        if let Some(stdin) = child.stdin.as_mut() {
            let payload =
                serde_json::to_vec(&bundle).map_err(|e| CollaboratorError::Fatal(e.to_string()))?;
            stdin
                .write_all(&payload)
                .await
                .map_err(|e| CollaboratorError::Transient(e.to_string()))?;
        }
        drop(child.stdin.take());

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| CollaboratorError::Transient(e.to_string()))?;

        if !output.status.success() {
            return Err(CollaboratorError::Transient(format!(
                "{program} exited {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        debug!(task_id = %request.task_id, "collaborator verdict received");
        serde_json::from_slice(&output.stdout)
            .map_err(|e| CollaboratorError::Fatal(format!("unparseable verdict: {e}")))
    }
}
