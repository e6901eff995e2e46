use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use hive_core::types::StatusFooter;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Command,
    Status,
}

/// One line of the forensic trail: a command dispatch or a parsed status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: RecordKind,
    pub agent: String,
    pub task_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_cmd: Option<String>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialize: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, LogError>;

// ---------------------------------------------------------------------------
// TaskEventLog
// ---------------------------------------------------------------------------

/// Append-only JSONL log of every dispatch and status, keyed by task id.
///
/// Written on the hot path: the command record lands before `send` returns
/// and the status record immediately on parse, so the log is a complete
/// forensic trail. Rotation is daily via the date embedded in the filename
/// (`hive_<YYYY-MM-DD>.jsonl`).
pub struct TaskEventLog {
    dir: PathBuf,
}

impl TaskEventLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Log file for the given date.
    pub fn file_for(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!("hive_{}.jsonl", date.format("%Y-%m-%d")))
    }

    /// Record an outbound command.
    pub fn append_command(&self, agent: &str, task_id: &str, command: &str) -> Result<()> {
        self.append(LogRecord {
            timestamp: Utc::now(),
            kind: RecordKind::Command,
            agent: agent.to_string(),
            task_id: task_id.to_string(),
            command: Some(command.to_string()),
            status: None,
            changes: None,
            next: None,
            last_cmd: None,
        })
    }

    /// Record a footer (parsed from the pane or synthesised on timeout).
    pub fn append_status(&self, agent: &str, task_id: &str, footer: &StatusFooter) -> Result<()> {
        self.append(LogRecord {
            timestamp: Utc::now(),
            kind: RecordKind::Status,
            agent: agent.to_string(),
            task_id: task_id.to_string(),
            command: None,
            status: Some(footer.status.as_str().to_string()),
            changes: Some(footer.changes.clone()),
            next: Some(footer.next.clone()),
            last_cmd: footer.last_cmd.clone(),
        })
    }

    fn append(&self, record: LogRecord) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.file_for(Utc::now().date_naive());
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    /// Read back all records for a date, skipping unparseable lines.
    pub fn records(&self, date: NaiveDate) -> Result<Vec<LogRecord>> {
        let path = self.file_for(date);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let text = std::fs::read_to_string(path)?;
        Ok(text
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect())
    }

    /// Records logged today.
    pub fn today(&self) -> Result<Vec<LogRecord>> {
        self.records(Utc::now().date_naive())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hive_core::types::FooterStatus;

    #[test]
    fn command_and_status_records_round_trip() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let log = TaskEventLog::new(tmp.path());

        log.append_command("queen", "t-1", "plan the work").expect("append");
        log.append_status(
            "queen",
            "t-1",
            &StatusFooter {
                status: FooterStatus::Success,
                changes: "plan made".into(),
                next: "delegate".into(),
                last_cmd: None,
            },
        )
        .expect("append");

        let records = log.today().expect("read");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].kind, RecordKind::Command);
        assert_eq!(records[0].command.as_deref(), Some("plan the work"));
        assert_eq!(records[1].kind, RecordKind::Status);
        assert_eq!(records[1].status.as_deref(), Some("success"));
    }

    #[test]
    fn filename_embeds_date() {
        let log = TaskEventLog::new("logs");
        let date = NaiveDate::from_ymd_opt(2025, 3, 14).expect("date");
        assert_eq!(
            log.file_for(date),
            PathBuf::from("logs").join("hive_2025-03-14.jsonl")
        );
    }

    #[test]
    fn missing_file_reads_empty() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let log = TaskEventLog::new(tmp.path());
        let date = NaiveDate::from_ymd_opt(2020, 1, 1).expect("date");
        assert!(log.records(date).expect("read").is_empty());
    }
}
