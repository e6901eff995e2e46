use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hive_core::config::AutofixConfig;
use hive_core::types::{FixOutcome, ParsedError, Task};
use hive_review::autofix::AutoFixLoop;
use hive_review::escalation::EscalationReason;
use hive_review::fixer::{Fix, FixGenerator, MechanicalFixGenerator};
use hive_review::validate::{CommandValidator, ValidatorKind, ValidatorSuite};
use hive_review::CollaboratorError;

/// Generator that rewrites the whole file to a fixed payload.
struct RewriteGenerator;

#[async_trait]
impl FixGenerator for RewriteGenerator {
    async fn generate_fix(
        &self,
        error: &ParsedError,
        _file_contents: &str,
    ) -> Result<Option<Fix>, CollaboratorError> {
        Ok(Some(Fix {
            file: error.file_path.clone(),
            patch: "fixed = True\n".into(),
            fix_type: error.error_code.clone(),
            description: "rewrite".into(),
        }))
    }
}

fn suite_with(cmds: &[Vec<String>]) -> ValidatorSuite {
    let kinds = [
        ValidatorKind::Syntax,
        ValidatorKind::Lint,
        ValidatorKind::TestCollect,
    ];
    ValidatorSuite::new(
        cmds.iter()
            .zip(kinds)
            .map(|(argv, kind)| {
                Arc::new(CommandValidator::new(
                    kind,
                    argv.clone(),
                    Duration::from_secs(5),
                )) as Arc<dyn hive_review::validate::Validator>
            })
            .collect(),
    )
}

fn passing_suite() -> ValidatorSuite {
    suite_with(&[vec!["true".into()], vec!["true".into()], vec!["true".into()]])
}

/// A lint validator that always fails with fresh (pid-varying) output so no
/// two consecutive failures are identical.
fn always_failing_suite(dir: &Path) -> ValidatorSuite {
    let script = dir.join("failing-lint.sh");
    std::fs::write(
        &script,
        "#!/bin/sh\necho \"app.py:$$:1: W291 trailing whitespace\"\nexit 1\n",
    )
    .expect("write script");
    suite_with(&[
        vec!["true".into()],
        vec!["sh".into(), script.display().to_string()],
        vec!["true".into()],
    ])
}

fn qa_task(service_dir: &Path) -> Task {
    let mut task = Task::new("rejected task");
    task.service_directory = Some(service_dir.to_path_buf());
    task
}

const TWO_LINT_ERRORS: &str = "\
    app.py:1:1: F401 'os' imported but unused\n\
    app.py:3:5: W291 trailing whitespace\n";

#[tokio::test]
async fn session_fixes_when_revalidation_passes() {
    let tmp = tempfile::tempdir().expect("tempdir");
    std::fs::write(tmp.path().join("app.py"), "import os\n\nx = 1   \n").expect("seed");

    let fixer = AutoFixLoop::new(
        Arc::new(RewriteGenerator),
        passing_suite(),
        AutofixConfig::default(),
        3,
    );
    let outcome = fixer.try_fix(&qa_task(tmp.path()), TWO_LINT_ERRORS).await;

    assert!(outcome.fixed());
    assert_eq!(outcome.session.outcome, FixOutcome::Fixed);
    assert_eq!(outcome.session.attempt_count, 1);
    assert_eq!(outcome.session.applied_fixes.len(), 2);
    assert!(outcome.report.is_none());

    // Round-trip law: the file now holds the generated patch.
    let content = std::fs::read_to_string(tmp.path().join("app.py")).expect("read");
    assert_eq!(content, "fixed = True\n");
}

#[tokio::test]
async fn session_escalates_after_attempt_budget() {
    let tmp = tempfile::tempdir().expect("tempdir");
    std::fs::write(tmp.path().join("app.py"), "x = 1   \n").expect("seed");

    let fixer = AutoFixLoop::new(
        Arc::new(RewriteGenerator),
        always_failing_suite(tmp.path()),
        AutofixConfig::default(),
        3,
    );
    let outcome = fixer.try_fix(&qa_task(tmp.path()), TWO_LINT_ERRORS).await;

    assert!(!outcome.fixed());
    assert_eq!(outcome.session.outcome, FixOutcome::Escalated);
    assert_eq!(outcome.session.attempt_count, 3);

    let report = outcome.report.expect("escalation report");
    assert_eq!(report.reason, EscalationReason::AttemptBudgetExhausted);
    assert_eq!(report.attempt_count, 3);
    assert!(!report.applied_fixes.is_empty());
    assert!(!report.last_validator_output.is_empty());
}

#[tokio::test]
async fn identical_failures_short_circuit_the_budget() {
    let tmp = tempfile::tempdir().expect("tempdir");
    std::fs::write(tmp.path().join("app.py"), "x = 1   \n").expect("seed");

    // Stable failure output: same diagnostic every pass.
    let suite = suite_with(&[
        vec!["true".into()],
        vec![
            "sh".into(),
            "-c".into(),
            "echo 'app.py:1:1: W291 trailing whitespace'; exit 1".into(),
        ],
        vec!["true".into()],
    ]);
    let fixer = AutoFixLoop::new(
        Arc::new(RewriteGenerator),
        suite,
        AutofixConfig::default(),
        5,
    );
    let outcome = fixer.try_fix(&qa_task(tmp.path()), TWO_LINT_ERRORS).await;

    assert_eq!(outcome.session.outcome, FixOutcome::Escalated);
    assert_eq!(outcome.session.attempt_count, 2);
    assert_eq!(
        outcome.report.expect("report").reason,
        EscalationReason::ConsecutiveIdenticalFailures
    );
}

#[tokio::test]
async fn nothing_fixable_fails_without_attempts() {
    let tmp = tempfile::tempdir().expect("tempdir");

    let fixer = AutoFixLoop::new(
        Arc::new(MechanicalFixGenerator::new()),
        passing_suite(),
        AutofixConfig::default(),
        3,
    );
    let outcome = fixer
        .try_fix(&qa_task(tmp.path()), "FAILED tests/test_x.py::t - boom\n")
        .await;

    assert!(!outcome.fixed());
    assert_eq!(outcome.session.outcome, FixOutcome::Failed);
    assert_eq!(outcome.session.attempt_count, 0);
}

#[tokio::test]
async fn missing_service_directory_fails_cleanly() {
    let fixer = AutoFixLoop::new(
        Arc::new(MechanicalFixGenerator::new()),
        passing_suite(),
        AutofixConfig::default(),
        3,
    );
    let task = Task::new("no service dir");
    let outcome = fixer.try_fix(&task, TWO_LINT_ERRORS).await;
    assert_eq!(outcome.session.outcome, FixOutcome::Failed);
}
