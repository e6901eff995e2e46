use std::sync::Arc;

use hive_core::config::AutofixConfig;
use hive_core::types::{FixOutcome, FixSession, Task};
use tracing::{info, warn};

use crate::escalation::{EscalationLogic, EscalationReport};
use crate::fixer::{FixApplier, FixGenerator};
use crate::parsers::ErrorAnalyzer;
use crate::validate::ValidatorSuite;

/// What a fix session produced.
#[derive(Debug)]
pub struct AutoFixOutcome {
    pub session: FixSession,
    /// Present when the session ended in escalation.
    pub report: Option<EscalationReport>,
}

impl AutoFixOutcome {
    pub fn fixed(&self) -> bool {
        self.session.outcome == FixOutcome::Fixed
    }
}

/// The parse → generate → apply → re-validate cycle with a bounded retry
/// budget. A session either reduces the error count each attempt or is
/// terminated by the escalation logic.
pub struct AutoFixLoop {
    generator: Arc<dyn FixGenerator>,
    suite: ValidatorSuite,
    analyzer: ErrorAnalyzer,
    logic: EscalationLogic,
    config: AutofixConfig,
    max_attempts: u32,
}

impl AutoFixLoop {
    pub fn new(
        generator: Arc<dyn FixGenerator>,
        suite: ValidatorSuite,
        config: AutofixConfig,
        max_attempts: u32,
    ) -> Self {
        Self {
            generator,
            suite,
            analyzer: ErrorAnalyzer::new(),
            logic: EscalationLogic::new(max_attempts),
            config,
            max_attempts,
        }
    }

    /// Attempt to repair the task's service directory.
    ///
    /// Returns a terminal session: `fixed` when the last re-validation run
    /// passed across all available validators, `escalated` when the
    /// escalation logic fired, `failed` otherwise.
    pub async fn try_fix(&self, task: &Task, validator_output: &str) -> AutoFixOutcome {
        let Some(service_path) = task.service_directory.clone() else {
            warn!(task_id = %task.id, "no service directory, cannot auto-fix");
            let mut session = FixSession::new(&task.id, Default::default(), self.max_attempts);
            session.outcome = FixOutcome::Failed;
            return AutoFixOutcome {
                session,
                report: None,
            };
        };

        let mut session = FixSession::new(&task.id, service_path.clone(), self.max_attempts);

        if !service_path.exists() {
            warn!(task_id = %task.id, path = %service_path.display(), "service directory missing");
            session.outcome = FixOutcome::Failed;
            return AutoFixOutcome {
                session,
                report: None,
            };
        }

        let errors = self.analyzer.analyze(validator_output);
        let mut fixable = self.analyzer.fixable(&errors);
        if fixable.is_empty() {
            info!(task_id = %task.id, "no auto-fixable errors in validator output");
            session.outcome = FixOutcome::Failed;
            return AutoFixOutcome {
                session,
                report: None,
            };
        }
        info!(task_id = %task.id, total = errors.len(), fixable = fixable.len(), "starting fix session");

        let mut applier = FixApplier::new(
            &service_path,
            self.config.create_backups,
            self.config.dry_run,
        );
        let mut previous_output: Option<String> = None;

        while session.can_retry() {
            session.attempt_count += 1;

            for error in &fixable {
                let file_path = session.service_path.join(&error.file_path);
                let contents = match std::fs::read_to_string(&file_path) {
                    Ok(contents) => contents,
                    Err(e) => {
                        warn!(file = %file_path.display(), error = %e, "cannot read file, skipping");
                        continue;
                    }
                };

                let fix = match self.generator.generate_fix(error, &contents).await {
                    Ok(Some(fix)) => fix,
                    Ok(None) => {
                        warn!(code = %error.error_code, "no fix generated");
                        continue;
                    }
                    Err(e) => {
                        warn!(code = %error.error_code, error = %e, "fix generation failed");
                        continue;
                    }
                };

                match applier.apply(&fix) {
                    Ok(applied) => session.applied_fixes.push(applied),
                    Err(e) => warn!(file = %fix.file, error = %e, "fix application failed"),
                }
            }

            info!(task_id = %task.id, attempt = session.attempt_count, "re-running validation");
            let outcome = self.suite.run(&session.service_path).await;
            if outcome.passed {
                info!(task_id = %task.id, attempts = session.attempt_count, "validation passed");
                session.outcome = FixOutcome::Fixed;
                return AutoFixOutcome {
                    session,
                    report: None,
                };
            }

            let errors = self.analyzer.analyze(&outcome.output);
            fixable = self.analyzer.fixable(&errors);

            let decision = self.logic.should_escalate(
                &session,
                &outcome.output,
                previous_output.as_deref(),
                fixable.len(),
            );
            if decision.should_escalate {
                let reason = decision.reason.expect("escalation carries a reason");
                warn!(task_id = %task.id, reason = reason.as_str(), "escalating fix session");
                session.outcome = FixOutcome::Escalated;
                let report = self.logic.report(&session, reason, &outcome.output);
                return AutoFixOutcome {
                    session,
                    report: Some(report),
                };
            }

            previous_output = Some(outcome.output);
        }

        // The escalation logic fires on budget exhaustion inside the loop;
        // reaching here means the session was already terminal.
        session.outcome = FixOutcome::Failed;
        AutoFixOutcome {
            session,
            report: None,
        }
    }
}
