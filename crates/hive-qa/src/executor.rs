use std::sync::Arc;

use async_trait::async_trait;
use hive_core::types::{ParsedError, Severity};
use tracing::{debug, warn};

use hive_review::fixer::{FixApplier, FixGenerator};
use hive_review::parsers::is_auto_fixable;

use crate::pools::{FastFixer, FixReport, QaWorkflow};

/// Baseline fast fixer: applies mechanical fixes for auto-fixable lint
/// violations directly against the task's service directory. Violations the
/// generator cannot repair stay in the batch and count as remaining.
pub struct MechanicalFastFixer {
    generator: Arc<dyn FixGenerator>,
    create_backups: bool,
}

impl MechanicalFastFixer {
    pub fn new(generator: Arc<dyn FixGenerator>, create_backups: bool) -> Self {
        Self {
            generator,
            create_backups,
        }
    }
}

#[async_trait]
impl FastFixer for MechanicalFastFixer {
    async fn execute(&self, workflow: &QaWorkflow) -> Result<FixReport, String> {
        let Some(service_dir) = workflow.task.service_directory.clone() else {
            return Err("task has no service directory".into());
        };

        let mut applier = FixApplier::new(&service_dir, self.create_backups, false);
        let mut fixed = 0usize;
        let mut remaining = 0usize;

        for violation in &workflow.violations {
            let Some(file) = violation.file.clone() else {
                remaining += 1;
                continue;
            };
            if !is_auto_fixable(&violation.kind) {
                remaining += 1;
                continue;
            }

            let path = service_dir.join(&file);
            let contents = match std::fs::read_to_string(&path) {
                Ok(contents) => contents,
                Err(e) => {
                    warn!(file, error = %e, "cannot read violation file");
                    remaining += 1;
                    continue;
                }
            };

            let error = ParsedError {
                file_path: file.clone(),
                line: 0,
                error_code: violation.kind.clone(),
                error_message: violation.message.clone(),
                severity: Severity::Warn,
                auto_fixable: true,
            };
            match self.generator.generate_fix(&error, &contents).await {
                Ok(Some(fix)) => match applier.apply(&fix) {
                    Ok(_) => fixed += 1,
                    Err(e) => {
                        warn!(file, error = %e, "fix application failed");
                        remaining += 1;
                    }
                },
                Ok(None) => {
                    debug!(kind = %violation.kind, "no mechanical fix available");
                    remaining += 1;
                }
                Err(e) => {
                    warn!(kind = %violation.kind, error = %e, "fix generation failed");
                    remaining += 1;
                }
            }
        }

        Ok(FixReport {
            task_id: workflow.task.id.clone(),
            fixed,
            remaining,
            summary: format!("{fixed} fixed, {remaining} remaining"),
        })
    }
}
