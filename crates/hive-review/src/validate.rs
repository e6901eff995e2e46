use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hive_core::config::AutofixConfig;
use tokio::process::Command;
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Validator contract
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidatorKind {
    Syntax,
    Lint,
    TestCollect,
}

impl ValidatorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidatorKind::Syntax => "syntax",
            ValidatorKind::Lint => "lint",
            ValidatorKind::TestCollect => "test-collect",
        }
    }
}

/// Result of running one validator over a service directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidatorVerdict {
    Passed,
    /// Validation failed; carries the diagnostic output.
    Failed(String),
    /// The tool binary is missing; its check becomes advisory.
    Absent,
}

#[async_trait]
pub trait Validator: Send + Sync {
    fn kind(&self) -> ValidatorKind;
    async fn validate(&self, service_dir: &Path) -> ValidatorVerdict;
}

// ---------------------------------------------------------------------------
// CommandValidator
// ---------------------------------------------------------------------------

/// Validator that runs a subprocess with the service directory appended as
/// the final argument. Exit 0 means clean; a missing binary is tolerated
/// (warned once) and an exceeded timeout counts as failure.
pub struct CommandValidator {
    kind: ValidatorKind,
    argv: Vec<String>,
    timeout: Duration,
    warned_absent: AtomicBool,
}

impl CommandValidator {
    pub fn new(kind: ValidatorKind, argv: Vec<String>, timeout: Duration) -> Self {
        Self {
            kind,
            argv,
            timeout,
            warned_absent: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Validator for CommandValidator {
    fn kind(&self) -> ValidatorKind {
        self.kind
    }

    async fn validate(&self, service_dir: &Path) -> ValidatorVerdict {
        let Some(program) = self.argv.first() else {
            return ValidatorVerdict::Absent;
        };

        let child = Command::new(program)
            .args(&self.argv[1..])
            .arg(service_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let child = match child {
            Ok(child) => child,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if !self.warned_absent.swap(true, Ordering::Relaxed) {
                    warn!(tool = program, kind = self.kind.as_str(), "validator not found, check is advisory");
                }
                return ValidatorVerdict::Absent;
            }
            Err(e) => {
                warn!(tool = program, error = %e, "validator failed to spawn");
                return ValidatorVerdict::Failed(e.to_string());
            }
        };

        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                if output.status.success() {
                    debug!(kind = self.kind.as_str(), "validation passed");
                    ValidatorVerdict::Passed
                } else {
                    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
                    text.push_str(&String::from_utf8_lossy(&output.stderr));
                    ValidatorVerdict::Failed(text)
                }
            }
            Ok(Err(e)) => ValidatorVerdict::Failed(e.to_string()),
            Err(_) => {
                warn!(kind = self.kind.as_str(), timeout_secs = self.timeout.as_secs(), "validator timed out");
                ValidatorVerdict::Failed(format!(
                    "{} validator timed out after {}s",
                    self.kind.as_str(),
                    self.timeout.as_secs()
                ))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// ValidatorSuite
// ---------------------------------------------------------------------------

/// Combined outcome of a validation pass.
#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    /// True when every available validator passed (absent tools are advisory).
    pub passed: bool,
    /// Tools that were skipped because their binaries are missing.
    pub skipped: Vec<ValidatorKind>,
    /// Concatenated diagnostic output from failing validators.
    pub output: String,
}

/// Runs the syntax check, linter, and test collection in order.
pub struct ValidatorSuite {
    validators: Vec<Arc<dyn Validator>>,
}

impl ValidatorSuite {
    pub fn new(validators: Vec<Arc<dyn Validator>>) -> Self {
        Self { validators }
    }

    pub fn from_config(config: &AutofixConfig) -> Self {
        Self::new(vec![
            Arc::new(CommandValidator::new(
                ValidatorKind::Syntax,
                config.syntax_cmd.clone(),
                Duration::from_secs(config.syntax_timeout_secs),
            )),
            Arc::new(CommandValidator::new(
                ValidatorKind::Lint,
                config.lint_cmd.clone(),
                Duration::from_secs(config.lint_timeout_secs),
            )),
            Arc::new(CommandValidator::new(
                ValidatorKind::TestCollect,
                config.test_cmd.clone(),
                Duration::from_secs(config.test_timeout_secs),
            )),
        ])
    }

    pub async fn run(&self, service_dir: &Path) -> ValidationOutcome {
        let mut passed = true;
        let mut skipped = Vec::new();
        let mut output = String::new();

        for validator in &self.validators {
            match validator.validate(service_dir).await {
                ValidatorVerdict::Passed => {}
                ValidatorVerdict::Absent => skipped.push(validator.kind()),
                ValidatorVerdict::Failed(text) => {
                    passed = false;
                    output.push_str(&text);
                    if !text.ends_with('\n') {
                        output.push('\n');
                    }
                }
            }
        }

        info!(passed, skipped = skipped.len(), "validation pass complete");
        ValidationOutcome {
            passed,
            skipped,
            output,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn suite(cmds: &[&[&str]]) -> ValidatorSuite {
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
                        argv.iter().map(|s| s.to_string()).collect(),
                        Duration::from_secs(5),
                    )) as Arc<dyn Validator>
                })
                .collect(),
        )
    }

    #[tokio::test]
    async fn clean_exit_codes_pass() {
        let suite = suite(&[&["true"], &["true"], &["true"]]);
        let outcome = suite.run(Path::new(".")).await;
        assert!(outcome.passed);
        assert!(outcome.skipped.is_empty());
    }

    #[tokio::test]
    async fn nonzero_exit_fails_the_pass() {
        let suite = suite(&[&["true"], &["false"], &["true"]]);
        let outcome = suite.run(Path::new(".")).await;
        assert!(!outcome.passed);
    }

    #[tokio::test]
    async fn missing_binary_is_advisory() {
        let suite = suite(&[&["hive-no-such-binary"], &["true"], &["true"]]);
        let outcome = suite.run(Path::new(".")).await;
        assert!(outcome.passed, "absent tools must not fail the pass");
        assert_eq!(outcome.skipped, vec![ValidatorKind::Syntax]);
    }

    #[tokio::test]
    async fn failure_output_is_captured() {
        let suite = suite(&[&["sh", "-c", "echo broken; exit 1"], &["true"], &["true"]]);
        let outcome = suite.run(Path::new(".")).await;
        assert!(!outcome.passed);
        assert!(outcome.output.contains("broken"));
    }
}
