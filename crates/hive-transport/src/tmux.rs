use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The expected multiplexer session does not exist. The core refuses to
    /// auto-create sessions in production so agent identities stay explicit.
    #[error("session '{0}' is not provisioned")]
    NotProvisioned(String),

    #[error("pane '{pane}' not found in session '{session}'")]
    PaneNotFound { session: String, pane: String },

    #[error("tmux command failed: {0}")]
    Command(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;

// ---------------------------------------------------------------------------
// Transport contract
// ---------------------------------------------------------------------------

/// A multiplexed terminal session with named panes.
///
/// Implementations send keystrokes into a pane and scrape its rolling buffer;
/// the scraped text is given structure by the sentinel codec, never here.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fail with [`TransportError::NotProvisioned`] if the session is absent.
    async fn ensure_session(&self) -> Result<()>;

    /// Transmit `lines` to the named pane, one keystroke sequence per line,
    /// each followed by Enter, with a short inter-line delay so the agent's
    /// input buffer is not overrun.
    async fn send(&self, pane: &str, lines: &[String]) -> Result<()>;

    /// The last `tail` rows of the pane's rolling buffer, oldest first.
    async fn capture(&self, pane: &str, tail: usize) -> Result<Vec<String>>;

    /// Names of all panes in the session.
    async fn list_panes(&self) -> Result<Vec<String>>;

    /// Split off a new pane titled `title`, optionally running `command`.
    /// Used to spawn heavy-fix workers.
    async fn spawn_pane(&self, title: &str, command: Option<&str>) -> Result<()>;

    /// Kill the pane titled `title`.
    async fn kill_pane(&self, title: &str) -> Result<()>;
}

// ---------------------------------------------------------------------------
// TmuxTransport
// ---------------------------------------------------------------------------

/// Transport over a tmux session, driven through the `tmux` binary.
///
/// Using tmux gives operators a live, inspectable substrate and decouples
/// agent processes from any daemon's lifetime; agents survive daemon
/// restarts. The cost is that output is a scraped text buffer, which the
/// sentinel protocol compensates for.
pub struct TmuxTransport {
    session: String,
    send_delay: Duration,
}

impl TmuxTransport {
    pub fn new(session: impl Into<String>, send_delay: Duration) -> Self {
        Self {
            session: session.into(),
            send_delay,
        }
    }

    pub fn session(&self) -> &str {
        &self.session
    }

    async fn run_tmux(&self, args: &[&str]) -> Result<String> {
        debug!(?args, "tmux");
        let output = Command::new("tmux").args(args).output().await?;
        if !output.status.success() {
            return Err(TransportError::Command(format!(
                "tmux {}: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Resolve a pane title to its tmux pane id (`%N`).
    async fn pane_id(&self, title: &str) -> Result<String> {
        let listing = self
            .run_tmux(&[
                "list-panes",
                "-s",
                "-t",
                self.session.as_str(),
                "-F",
                "#{pane_id} #{pane_title}",
            ])
            .await?;
        for line in listing.lines() {
            if let Some((id, pane_title)) = line.split_once(' ') {
                if pane_title == title {
                    return Ok(id.to_string());
                }
            }
        }
        Err(TransportError::PaneNotFound {
            session: self.session.clone(),
            pane: title.to_string(),
        })
    }
}

#[async_trait]
impl Transport for TmuxTransport {
    async fn ensure_session(&self) -> Result<()> {
        let status = Command::new("tmux")
            .args(["has-session", "-t", self.session.as_str()])
            .output()
            .await?;
        if status.status.success() {
            Ok(())
        } else {
            Err(TransportError::NotProvisioned(self.session.clone()))
        }
    }

    async fn send(&self, pane: &str, lines: &[String]) -> Result<()> {
        let id = self.pane_id(pane).await?;
        for line in lines {
            // `-l` sends the line literally; Enter is a separate keystroke.
            self.run_tmux(&["send-keys", "-t", id.as_str(), "-l", "--", line.as_str()])
                .await?;
            self.run_tmux(&["send-keys", "-t", id.as_str(), "Enter"]).await?;
            tokio::time::sleep(self.send_delay).await;
        }
        debug!(pane, lines = lines.len(), "sent keystrokes");
        Ok(())
    }

    async fn capture(&self, pane: &str, tail: usize) -> Result<Vec<String>> {
        let id = self.pane_id(pane).await?;
        let start = format!("-{tail}");
        let captured = self
            .run_tmux(&["capture-pane", "-p", "-t", id.as_str(), "-S", start.as_str()])
            .await?;
        let mut lines: Vec<String> = captured.lines().map(str::to_string).collect();
        if lines.len() > tail {
            lines.drain(..lines.len() - tail);
        }
        Ok(lines)
    }

    async fn list_panes(&self) -> Result<Vec<String>> {
        let listing = self
            .run_tmux(&[
                "list-panes",
                "-s",
                "-t",
                self.session.as_str(),
                "-F",
                "#{pane_title}",
            ])
            .await?;
        Ok(listing.lines().map(str::to_string).collect())
    }

    async fn spawn_pane(&self, title: &str, command: Option<&str>) -> Result<()> {
        let id = self
            .run_tmux(&["split-window", "-d", "-t", self.session.as_str(), "-P", "-F", "#{pane_id}"])
            .await?;
        let id = id.trim().to_string();
        self.run_tmux(&["select-pane", "-t", id.as_str(), "-T", title]).await?;
        if let Some(cmd) = command {
            self.run_tmux(&["send-keys", "-t", id.as_str(), "-l", "--", cmd]).await?;
            self.run_tmux(&["send-keys", "-t", id.as_str(), "Enter"]).await?;
        }
        info!(pane = title, "spawned pane");
        Ok(())
    }

    async fn kill_pane(&self, title: &str) -> Result<()> {
        match self.pane_id(title).await {
            Ok(id) => {
                self.run_tmux(&["kill-pane", "-t", id.as_str()]).await?;
                info!(pane = title, "killed pane");
                Ok(())
            }
            Err(TransportError::PaneNotFound { .. }) => {
                // Already gone; killing is idempotent.
                warn!(pane = title, "pane already absent");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
