use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// EventKind
// ---------------------------------------------------------------------------

/// Every topic published across the hive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ReviewCompleted,
    Approved,
    Rejected,
    Escalated,
    QaEscalation,
    QaMonitorHeartbeat,
}

impl EventKind {
    /// The dotted topic name used on the wire and in logs.
    pub fn topic(&self) -> &'static str {
        match self {
            EventKind::ReviewCompleted => "task.review_completed",
            EventKind::Approved => "task.approved",
            EventKind::Rejected => "task.rejected",
            EventKind::Escalated => "task.escalated",
            EventKind::QaEscalation => "qa.escalation",
            EventKind::QaMonitorHeartbeat => "qa.monitor.heartbeat",
        }
    }
}

// ---------------------------------------------------------------------------
// TaskEvent
// ---------------------------------------------------------------------------

/// A single event published to the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEvent {
    pub id: Uuid,
    pub event_type: EventKind,
    pub task_id: String,
    pub source_agent: String,
    pub correlation_id: Option<String>,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl TaskEvent {
    pub fn new(
        event_type: EventKind,
        task_id: impl Into<String>,
        source_agent: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type,
            task_id: task_id.into(),
            source_agent: source_agent.into(),
            correlation_id: None,
            payload: serde_json::Value::Null,
            timestamp: Utc::now(),
        }
    }

    pub fn with_correlation(mut self, correlation_id: Option<String>) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topics_match_wire_names() {
        assert_eq!(EventKind::ReviewCompleted.topic(), "task.review_completed");
        assert_eq!(EventKind::QaEscalation.topic(), "qa.escalation");
        assert_eq!(EventKind::QaMonitorHeartbeat.topic(), "qa.monitor.heartbeat");
    }

    #[test]
    fn event_serializes_with_snake_case_kind() {
        let event = TaskEvent::new(EventKind::Approved, "t-1", "ai-reviewer")
            .with_payload(serde_json::json!({"overall_score": 85.0}));
        let json = serde_json::to_value(&event).expect("serialize");
        assert_eq!(json["event_type"], "approved");
        assert_eq!(json["payload"]["overall_score"], 85.0);
    }
}
