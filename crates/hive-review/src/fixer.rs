use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use hive_core::types::{AppliedFix, ParsedError};
use tracing::{debug, info, warn};

use crate::CollaboratorError;

// ---------------------------------------------------------------------------
// Fix
// ---------------------------------------------------------------------------

/// A candidate repair: the full post-patch content for one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fix {
    /// Path relative to the service directory.
    pub file: String,
    /// Replacement content; applying the fix then reading the file yields
    /// exactly this text.
    pub patch: String,
    pub fix_type: String,
    pub description: String,
}

/// Produces candidate fixes for parsed errors.
#[async_trait]
pub trait FixGenerator: Send + Sync {
    /// `None` means the generator has no repair for this error.
    async fn generate_fix(
        &self,
        error: &ParsedError,
        file_contents: &str,
    ) -> Result<Option<Fix>, CollaboratorError>;
}

// ---------------------------------------------------------------------------
// MechanicalFixGenerator
// ---------------------------------------------------------------------------

/// Baseline generator for mechanical lint violations: unused imports,
/// trailing whitespace, missing final newline, surplus blank lines.
/// Heavier repairs come from an external collaborator behind the same trait.
#[derive(Debug, Clone, Copy, Default)]
pub struct MechanicalFixGenerator;

impl MechanicalFixGenerator {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FixGenerator for MechanicalFixGenerator {
    async fn generate_fix(
        &self,
        error: &ParsedError,
        file_contents: &str,
    ) -> Result<Option<Fix>, CollaboratorError> {
        let patched = match error.error_code.as_str() {
            "F401" => remove_line(file_contents, error.line),
            "W291" | "W293" => strip_trailing_whitespace(file_contents),
            "W292" => ensure_final_newline(file_contents),
            "E303" => collapse_blank_runs(file_contents),
            _ => None,
        };

        Ok(patched.map(|patch| Fix {
            file: error.file_path.clone(),
            patch,
            fix_type: error.error_code.clone(),
            description: format!("mechanical fix for {}: {}", error.error_code, error.error_message),
        }))
    }
}

fn remove_line(contents: &str, line_no: u32) -> Option<String> {
    if line_no == 0 {
        return None;
    }
    let lines: Vec<&str> = contents.lines().collect();
    let idx = (line_no - 1) as usize;
    if idx >= lines.len() {
        return None;
    }
    let mut out: Vec<&str> = Vec::with_capacity(lines.len() - 1);
    out.extend(&lines[..idx]);
    out.extend(&lines[idx + 1..]);
    Some(format!("{}\n", out.join("\n")))
}

fn strip_trailing_whitespace(contents: &str) -> Option<String> {
    let stripped: Vec<&str> = contents.lines().map(str::trim_end).collect();
    let patched = format!("{}\n", stripped.join("\n"));
    (patched != contents).then_some(patched)
}

fn ensure_final_newline(contents: &str) -> Option<String> {
    (!contents.ends_with('\n')).then(|| format!("{contents}\n"))
}

fn collapse_blank_runs(contents: &str) -> Option<String> {
    let mut out: Vec<&str> = Vec::new();
    let mut blanks = 0usize;
    for line in contents.lines() {
        if line.trim().is_empty() {
            blanks += 1;
            if blanks > 2 {
                continue;
            }
        } else {
            blanks = 0;
        }
        out.push(line);
    }
    let patched = format!("{}\n", out.join("\n"));
    (patched != contents).then_some(patched)
}

// ---------------------------------------------------------------------------
// FixApplier
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum FixError {
    #[error("file outside service directory: {0}")]
    OutsideRoot(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Writes fixes to the service directory.
///
/// The first modification of each file leaves a `.bak` sibling (unless
/// disabled); dry-run mode reports the would-be patch without touching disk.
pub struct FixApplier {
    root: PathBuf,
    create_backups: bool,
    dry_run: bool,
    backed_up: HashSet<PathBuf>,
}

impl FixApplier {
    pub fn new(root: impl Into<PathBuf>, create_backups: bool, dry_run: bool) -> Self {
        Self {
            root: root.into(),
            create_backups,
            dry_run,
            backed_up: HashSet::new(),
        }
    }

    pub fn apply(&mut self, fix: &Fix) -> Result<AppliedFix, FixError> {
        let path = self.resolve(&fix.file)?;

        if self.dry_run {
            info!(file = %fix.file, fix_type = %fix.fix_type, "[dry run] would apply fix");
        } else {
            if self.create_backups && !self.backed_up.contains(&path) && path.exists() {
                let backup = backup_path(&path);
                std::fs::copy(&path, &backup)?;
                self.backed_up.insert(path.clone());
                debug!(backup = %backup.display(), "backup created");
            }
            std::fs::write(&path, &fix.patch)?;
            info!(file = %fix.file, fix_type = %fix.fix_type, "fix applied");
        }

        Ok(AppliedFix {
            file: fix.file.clone(),
            fix_type: fix.fix_type.clone(),
            description: fix.description.clone(),
            applied_at: Utc::now(),
        })
    }

    fn resolve(&self, file: &str) -> Result<PathBuf, FixError> {
        let rel = Path::new(file);
        if rel.is_absolute() || rel.components().any(|c| matches!(c, std::path::Component::ParentDir))
        {
            warn!(file, "refusing path outside service directory");
            return Err(FixError::OutsideRoot(file.to_string()));
        }
        Ok(self.root.join(rel))
    }
}

fn backup_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(".bak");
    PathBuf::from(os)
}
