//! Server-push task update events

use crate::protocol::messages::{Message, TaskState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One event on a task subscription
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StreamEvent {
    #[serde(rename = "type")]
    pub event_type: StreamEventType,
    pub task_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<TaskState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl StreamEvent {
    pub fn new(event_type: StreamEventType, task_id: impl Into<String>) -> Self {
        Self {
            event_type,
            task_id: task_id.into(),
            timestamp: Utc::now(),
            state: None,
            message: None,
            data: None,
        }
    }

    /// Whether the subscription ends after this event
    pub fn is_terminal(&self) -> bool {
        self.event_type.is_terminal()
            || matches!(self.state, Some(TaskState::Completed | TaskState::Failed))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StreamEventType {
    Status,
    Message,
    Artifact,
    Completed,
    Failed,
}

impl StreamEventType {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEventType::Completed | StreamEventType::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_decodes_wire_names() {
        let event: StreamEvent = serde_json::from_value(json!({
            "type": "status",
            "taskId": "t-1",
            "timestamp": "2024-01-01T12:00:00Z",
            "state": "working"
        }))
        .unwrap();

        assert_eq!(event.event_type, StreamEventType::Status);
        assert_eq!(event.task_id, "t-1");
        assert_eq!(event.state, Some(TaskState::Working));
        assert!(!event.is_terminal());
    }

    #[test]
    fn test_terminal_events() {
        assert!(StreamEvent::new(StreamEventType::Completed, "t").is_terminal());
        assert!(StreamEvent::new(StreamEventType::Failed, "t").is_terminal());

        let mut status = StreamEvent::new(StreamEventType::Status, "t");
        assert!(!status.is_terminal());
        status.state = Some(TaskState::Failed);
        assert!(status.is_terminal());
    }
}
