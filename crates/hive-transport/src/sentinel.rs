//! Sentinel framing for commands scraped back out of terminal buffers.
//!
//! Every outbound command is wrapped between `===BEGIN TASK <id>===` and
//! `===END TASK <id>===` markers and instructs the agent to finish with a
//! `STATUS/CHANGES/NEXT/LAST_CMD` footer. Embedding the task id in both
//! markers prevents cross-talk between re-sends and between tasks sharing a
//! pane.

use hive_core::types::{FooterStatus, StatusFooter};

pub const STATUS_KEY: &str = "STATUS:";
pub const CHANGES_KEY: &str = "CHANGES:";
pub const NEXT_KEY: &str = "NEXT:";
pub const LAST_CMD_KEY: &str = "LAST_CMD:";

pub fn begin_marker(task_id: &str) -> String {
    format!("===BEGIN TASK {task_id}===")
}

pub fn end_marker(task_id: &str) -> String {
    format!("===END TASK {task_id}===")
}

/// Wrap a command body in sentinel markers plus the footer instructions.
pub fn wrap_command(task_id: &str, body: &str) -> String {
    format!(
        "{begin}\n\
         {body}\n\
         When complete, print exactly:\n\
         STATUS: success|partial|blocked|failed\n\
         CHANGES: <files changed or summary>\n\
         NEXT: <recommended next action>\n\
         LAST_CMD: <last shell command executed>\n\
         {end}",
        begin = begin_marker(task_id),
        end = end_marker(task_id),
    )
}

/// Extract the region between the sentinel markers for `task_id`.
///
/// Returns `None` while the region is incomplete (no end marker yet). When a
/// task was re-sent and multiple begin markers appear, only the region
/// between the **last** begin and the **first** subsequent end counts.
pub fn extract<'a>(lines: &'a [String], task_id: &str) -> Option<&'a [String]> {
    let begin = begin_marker(task_id);
    let end = end_marker(task_id);

    let mut start_idx = None;
    let mut end_idx = None;
    for (i, line) in lines.iter().enumerate() {
        if line.contains(&begin) {
            start_idx = Some(i);
            end_idx = None;
        } else if end_idx.is_none() && start_idx.is_some() && line.contains(&end) {
            end_idx = Some(i);
        }
    }

    match (start_idx, end_idx) {
        (Some(s), Some(e)) if e > s => Some(&lines[s..=e]),
        _ => None,
    }
}

/// Parse the status footer out of an extracted region.
///
/// Returns a footer iff all required keys (`STATUS`, `CHANGES`, `NEXT`) are
/// present and the status is a legal value; otherwise `None`. This is the
/// single place where parsing is tolerant; malformed footers are downgraded
/// to `failed` by the dispatcher, never raised.
pub fn parse_footer(region: &[String]) -> Option<StatusFooter> {
    let mut status = None;
    let mut changes = None;
    let mut next = None;
    let mut last_cmd = None;

    for line in region {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix(STATUS_KEY) {
            // The instruction line echoes all legal values joined by pipes;
            // it must not parse as a status.
            status = FooterStatus::parse(rest.trim());
        } else if let Some(rest) = line.strip_prefix(CHANGES_KEY) {
            changes = Some(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix(NEXT_KEY) {
            next = Some(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix(LAST_CMD_KEY) {
            let rest = rest.trim();
            if !rest.is_empty() && !rest.starts_with('<') {
                last_cmd = Some(rest.to_string());
            }
        }
    }

    Some(StatusFooter {
        status: status?,
        changes: changes?,
        next: next?,
        last_cmd,
    })
}

/// Render a footer in wire format; `parse_footer(format_footer(f)) == f`.
pub fn format_footer(footer: &StatusFooter) -> Vec<String> {
    let mut lines = vec![
        format!("{STATUS_KEY} {}", footer.status.as_str()),
        format!("{CHANGES_KEY} {}", footer.changes),
        format!("{NEXT_KEY} {}", footer.next),
    ];
    if let Some(cmd) = &footer.last_cmd {
        lines.push(format!("{LAST_CMD_KEY} {cmd}"));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region_for(task_id: &str, footer_lines: &[String]) -> Vec<String> {
        let mut lines = vec![begin_marker(task_id)];
        lines.push("doing the work".into());
        lines.extend(footer_lines.iter().cloned());
        lines.push(end_marker(task_id));
        lines
    }

    #[test]
    fn wrap_contains_markers_and_instructions() {
        let wrapped = wrap_command("t-1", "echo hello");
        assert!(wrapped.starts_with("===BEGIN TASK t-1==="));
        assert!(wrapped.ends_with("===END TASK t-1==="));
        assert!(wrapped.contains("STATUS: success|partial|blocked|failed"));
    }

    #[test]
    fn extract_returns_none_without_end_marker() {
        let lines = vec![begin_marker("t-1"), "working...".into()];
        assert!(extract(&lines, "t-1").is_none());
    }

    #[test]
    fn extract_uses_last_begin_first_end() {
        let mut lines = region_for("t-1", &[format!("{STATUS_KEY} failed")]);
        // Re-send: a second begin/end pair after the first.
        lines.extend(region_for(
            "t-1",
            &[
                format!("{STATUS_KEY} success"),
                format!("{CHANGES_KEY} second run"),
                format!("{NEXT_KEY} none"),
            ],
        ));

        let region = extract(&lines, "t-1").expect("complete region");
        let footer = parse_footer(region).expect("footer parses");
        assert_eq!(footer.status, FooterStatus::Success);
        assert_eq!(footer.changes, "second run");
    }

    #[test]
    fn extract_ignores_other_task_ids() {
        let lines = region_for("t-2", &[format!("{STATUS_KEY} success")]);
        assert!(extract(&lines, "t-1").is_none());
    }

    #[test]
    fn instruction_line_does_not_parse_as_status() {
        let wrapped = wrap_command("t-1", "do the thing");
        let lines: Vec<String> = wrapped.lines().map(str::to_string).collect();
        let region = extract(&lines, "t-1").expect("markers present");
        // Only the instruction footer template is present; not a real footer.
        assert!(parse_footer(region).is_none());
    }

    #[test]
    fn parse_requires_all_required_keys() {
        let missing_next = region_for(
            "t-1",
            &[
                format!("{STATUS_KEY} success"),
                format!("{CHANGES_KEY} src/app.py"),
            ],
        );
        let region = extract(&missing_next, "t-1").expect("region");
        assert!(parse_footer(region).is_none());
    }

    #[test]
    fn parse_rejects_illegal_status() {
        let bad = region_for(
            "t-1",
            &[
                format!("{STATUS_KEY} done"),
                format!("{CHANGES_KEY} x"),
                format!("{NEXT_KEY} y"),
            ],
        );
        let region = extract(&bad, "t-1").expect("region");
        assert!(parse_footer(region).is_none());
    }

    #[test]
    fn footer_round_trips_for_all_legal_statuses() {
        for status in [
            FooterStatus::Success,
            FooterStatus::Partial,
            FooterStatus::Blocked,
            FooterStatus::Failed,
            FooterStatus::Timeout,
        ] {
            let footer = StatusFooter {
                status,
                changes: "src/api.py updated".into(),
                next: "run tests".into(),
                last_cmd: Some("pytest -q".into()),
            };
            let parsed = parse_footer(&format_footer(&footer)).expect("round trip");
            assert_eq!(parsed, footer);
        }
    }

    #[test]
    fn footer_round_trips_without_last_cmd() {
        let footer = StatusFooter {
            status: FooterStatus::Partial,
            changes: "half done".into(),
            next: "continue".into(),
            last_cmd: None,
        };
        let parsed = parse_footer(&format_footer(&footer)).expect("round trip");
        assert_eq!(parsed, footer);
    }
}
