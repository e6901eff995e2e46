//! Worker assignment extraction from the queen's plan.
//!
//! Planning output is authoritative when it contains assignment lines of the
//! form `worker-<name>: <subtask>`; otherwise the static per-worker mapping
//! is used as the fallback.

use tracing::{debug, warn};

/// Parse `worker-<name>: <subtask>` lines addressed to known workers.
pub fn parse_assignments(plan_text: &str, workers: &[String]) -> Vec<(String, String)> {
    let mut assignments = Vec::new();
    for line in plan_text.lines() {
        let line = line.trim().trim_start_matches(['-', '*', ' ']);
        let Some((target, subtask)) = line.split_once(':') else {
            continue;
        };
        let target = target.trim();
        let subtask = subtask.trim();
        if subtask.is_empty() {
            continue;
        }
        if let Some(worker) = workers.iter().find(|w| w.eq_ignore_ascii_case(target)) {
            debug!(worker = %worker, subtask, "plan assignment");
            assignments.push((worker.clone(), subtask.to_string()));
        }
    }
    assignments
}

/// The static delegation map: every configured worker implements its slice
/// of the goal.
pub fn static_assignments(goal: &str, workers: &[String]) -> Vec<(String, String)> {
    workers
        .iter()
        .map(|worker| {
            let role = worker.strip_prefix("worker-").unwrap_or(worker);
            (worker.clone(), format!("Implement {role} for: {goal}"))
        })
        .collect()
}

/// Assignments from the plan when any parse, else the static fallback.
pub fn assignments(plan_text: &str, goal: &str, workers: &[String]) -> Vec<(String, String)> {
    let parsed = parse_assignments(plan_text, workers);
    if parsed.is_empty() {
        warn!("plan produced no parseable assignments, using static delegation");
        static_assignments(goal, workers)
    } else {
        parsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workers() -> Vec<String> {
        vec!["worker-backend".into(), "worker-frontend".into()]
    }

    #[test]
    fn parses_assignment_lines() {
        let plan = "\
            1. plan overview\n\
            - worker-backend: add the /health route\n\
            - worker-frontend: surface status on the dashboard\n\
            notes: ignore this line\n";
        let parsed = parse_assignments(plan, &workers());
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].0, "worker-backend");
        assert_eq!(parsed[0].1, "add the /health route");
    }

    #[test]
    fn unknown_workers_are_ignored() {
        let plan = "worker-db: migrate the schema";
        assert!(parse_assignments(plan, &workers()).is_empty());
    }

    #[test]
    fn falls_back_to_static_map() {
        let result = assignments("no assignments here", "add /health endpoint", &workers());
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].1, "Implement backend for: add /health endpoint");
        assert_eq!(result[1].1, "Implement frontend for: add /health endpoint");
    }

    #[test]
    fn plan_wins_over_static_map() {
        let plan = "worker-backend: just the route";
        let result = assignments(plan, "goal", &workers());
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].1, "just the route");
    }
}
