use std::path::{Path, PathBuf};

use chrono::Utc;
use hive_core::config::GitConfig;
use tokio::process::Command;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum GitError {
    #[error("git command failed: {0}")]
    GitCommand(String),
    #[error("gh command failed: {0}")]
    GhCommand(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, GitError>;

// ---------------------------------------------------------------------------
// GitWorkflow
// ---------------------------------------------------------------------------

/// Branch/commit/PR workflow driven through the `git` and `gh` binaries.
///
/// Kill switches: a `PAUSE` file at the configured path suppresses PR
/// creation entirely, and a `hold` label on a freshly created PR suppresses
/// auto-merge. Dry-run mode logs the would-be effect and returns synthetic
/// values without touching the repository.
pub struct GitWorkflow {
    repo_dir: PathBuf,
    config: GitConfig,
}

impl GitWorkflow {
    pub fn new(repo_dir: impl Into<PathBuf>, config: GitConfig) -> Self {
        Self {
            repo_dir: repo_dir.into(),
            config,
        }
    }

    pub fn dry_run(&self) -> bool {
        self.config.dry_run
    }

    /// Whether the PAUSE kill switch is currently engaged.
    pub fn pause_active(&self) -> bool {
        self.pause_path().exists()
    }

    fn pause_path(&self) -> PathBuf {
        if self.config.pause_file.is_absolute() {
            self.config.pause_file.clone()
        } else {
            self.repo_dir.join(&self.config.pause_file)
        }
    }

    /// Create a feature branch named after a URL-safe slug of the goal plus
    /// a monotonic timestamp, e.g. `feature/add-health-endpoint-1712345678`.
    pub async fn create_feature_branch(&self, goal: &str) -> Result<String> {
        let branch = format!("feature/{}-{}", slugify(goal), Utc::now().timestamp());

        if self.config.dry_run {
            info!(branch, "[dry run] would create branch");
            return Ok(branch);
        }

        self.run_git(&["checkout", self.config.base_branch.as_str()]).await?;
        if let Err(e) = self.run_git(&["pull"]).await {
            warn!(error = %e, "pull failed, branching from local base");
        }
        self.run_git(&["checkout", "-b", branch.as_str()]).await?;
        info!(branch, "created feature branch");
        Ok(branch)
    }

    /// Stage everything, commit, and push the branch upstream.
    ///
    /// Returns `false` when the working tree had nothing to commit.
    pub async fn commit_and_push(&self, branch: &str, message: &str) -> Result<bool> {
        if self.config.dry_run {
            info!(message, "[dry run] would commit and push");
            return Ok(true);
        }

        let status = self.run_git(&["status", "--porcelain"]).await?;
        if status.trim().is_empty() {
            info!("no changes to commit");
            return Ok(false);
        }

        self.run_git(&["add", "-A"]).await?;
        self.run_git(&["commit", "-m", message]).await?;
        self.run_git(&["push", "--set-upstream", "origin", branch])
            .await?;
        info!(branch, "pushed changes");
        Ok(true)
    }

    /// Open a PR for the branch; returns the PR URL, or `None` when the
    /// PAUSE kill switch suppressed creation.
    pub async fn create_pr(&self, branch: &str, title: &str, body: &str) -> Result<Option<String>> {
        if self.config.dry_run {
            info!(title, "[dry run] would create PR");
            return Ok(Some("dry-run-pr-url".to_string()));
        }

        if self.pause_active() {
            warn!(path = %self.pause_path().display(), "PAUSE file detected, skipping PR creation");
            return Ok(None);
        }

        let body = if body.is_empty() {
            "Automated PR by Hive Queen"
        } else {
            body
        };
        let url = self
            .run_gh(&[
                "pr",
                "create",
                "--title",
                title,
                "--body",
                body,
                "--base",
                self.config.base_branch.as_str(),
                "--head",
                branch,
            ])
            .await?;
        let url = url.trim().to_string();
        info!(url, "PR created");

        if self.pr_has_hold_label(&url).await? {
            warn!(url, "'hold' label detected, skipping auto-merge");
            return Ok(Some(url));
        }

        if self.config.auto_merge {
            self.run_gh(&["pr", "merge", url.as_str(), "--auto", "--squash"])
                .await?;
            info!(url, "auto-merge enabled (pending CI)");
        }

        Ok(Some(url))
    }

    async fn pr_has_hold_label(&self, pr_url: &str) -> Result<bool> {
        let number = pr_url.rsplit('/').next().unwrap_or(pr_url);
        let raw = match self.run_gh(&["pr", "view", number, "--json", "labels"]).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "label lookup failed, assuming no hold");
                return Ok(false);
            }
        };
        let labels: serde_json::Value = serde_json::from_str(&raw).unwrap_or_default();
        Ok(labels["labels"]
            .as_array()
            .map(|l| l.iter().any(|label| label["name"] == "hold"))
            .unwrap_or(false))
    }

    /// Create one isolated worktree per worker on a dedicated branch, so
    /// workers can edit without stepping on each other.
    pub async fn setup_worktrees(&self, workers: &[String]) -> Result<()> {
        for worker in workers {
            let name = worker.strip_prefix("worker-").unwrap_or(worker);
            let path = self.config.workspaces_dir.join(name);
            let target = self.repo_dir.join(&path);
            if target.exists() {
                continue;
            }
            let branch = format!("worker/{name}");
            // Branch may already exist from a previous provisioning run.
            let _ = self
                .run_git(&["branch", branch.as_str(), self.config.base_branch.as_str()])
                .await;
            self.run_git(&[
                "worktree",
                "add",
                path.to_str().unwrap_or(name),
                branch.as_str(),
            ])
            .await?;
            info!(worker = name, path = %path.display(), "created worktree");
        }
        Ok(())
    }

    /// Push each worker branch to the remote; missing remotes are tolerated.
    pub async fn push_worker_branches(&self, workers: &[String]) -> Result<()> {
        for worker in workers {
            let name = worker.strip_prefix("worker-").unwrap_or(worker);
            let branch = format!("worker/{name}");
            if let Err(e) = self.run_git(&["push", "origin", branch.as_str()]).await {
                warn!(branch, error = %e, "push failed");
            }
        }
        Ok(())
    }

    async fn run_git(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.repo_dir)
            .output()
            .await?;
        if !output.status.success() {
            return Err(GitError::GitCommand(format!(
                "git {}: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn run_gh(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("gh")
            .args(args)
            .current_dir(&self.repo_dir)
            .output()
            .await?;
        if !output.status.success() {
            return Err(GitError::GhCommand(format!(
                "gh {}: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Lowercased, URL-safe slug of a goal, truncated to 30 characters.
pub fn slugify(goal: &str) -> String {
    let mut slug: String = goal
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    while slug.contains("--") {
        slug = slug.replace("--", "-");
    }
    let slug = slug.trim_matches('-');
    slug.chars().take(30).collect::<String>().trim_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugs_are_url_safe_and_bounded() {
        assert_eq!(slugify("add /health endpoint"), "add-health-endpoint");
        assert_eq!(slugify("Fix: crash on empty input!"), "fix-crash-on-empty-input");
        assert!(slugify("a goal with a very very very long description").len() <= 30);
    }

    #[tokio::test]
    async fn dry_run_branch_name_has_slug_prefix() {
        let git = GitWorkflow::new(
            ".",
            GitConfig {
                dry_run: true,
                ..GitConfig::default()
            },
        );
        let branch = git
            .create_feature_branch("add /health endpoint")
            .await
            .expect("branch");
        assert!(branch.starts_with("feature/add-health-endpoint-"));
    }

    #[tokio::test]
    async fn pause_file_suppresses_pr() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let pause = tmp.path().join("PAUSE");
        std::fs::write(&pause, "").expect("write pause");

        let git = GitWorkflow::new(
            tmp.path(),
            GitConfig {
                pause_file: pause,
                ..GitConfig::default()
            },
        );
        let pr = git
            .create_pr("feature/x-1", "feat: x", "")
            .await
            .expect("create_pr");
        assert!(pr.is_none());
    }
}
