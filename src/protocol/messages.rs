//! Task, message and part types for the A2A task protocol
//!
//! These are the payload structures carried inside the JSON-RPC envelope.
//! A [`Part`] is a closed tagged union decoded through its `type` field;
//! each variant carries exactly the fields its type declares.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Unit of work tracked across one routed request and its sub-consultations
///
/// # Examples
/// ```
/// use a2a_orchestrator::protocol::{Task, TaskState};
///
/// let parent = Task::new();
/// let sub = Task::subtask(&parent.id, "legal");
///
/// assert_eq!(sub.parent_id.as_deref(), Some(parent.id.as_str()));
/// assert_eq!(sub.agent_id.as_deref(), Some("legal"));
/// assert_eq!(sub.state, TaskState::Submitted);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Task {
    /// Opaque identifier, unique per request
    pub id: String,
    /// Task this one was spawned from (sub-tasks only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Handler this task is addressed to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub state: TaskState,
}

impl Task {
    /// Create a fresh submitted task with a generated id
    pub fn new() -> Self {
        Self {
            id: generate_task_id(),
            parent_id: None,
            agent_id: None,
            state: TaskState::Submitted,
        }
    }

    /// Create the sub-task used for one handler invocation
    pub fn subtask(parent_id: &str, agent_id: &str) -> Self {
        Self {
            id: generate_task_id(),
            parent_id: Some(parent_id.to_string()),
            agent_id: Some(agent_id.to_string()),
            state: TaskState::Submitted,
        }
    }

    /// Copy of this task with a different state
    pub fn with_state(&self, state: TaskState) -> Self {
        Self {
            state,
            ..self.clone()
        }
    }
}

impl Default for Task {
    fn default() -> Self {
        Self::new()
    }
}

/// Task lifecycle states
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum TaskState {
    #[default]
    Submitted,
    Working,
    InputRequired,
    Completed,
    Failed,
}

impl TaskState {
    /// Wire name of the state
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Submitted => "submitted",
            TaskState::Working => "working",
            TaskState::InputRequired => "input-required",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Content envelope exchanged between router and handlers
///
/// Messages are never mutated after construction; build a new one instead.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Message {
    pub parts: Vec<Part>,
    pub role: Role,
}

impl Message {
    pub fn new(parts: Vec<Part>, role: Role) -> Self {
        Self { parts, role }
    }

    /// Single text part message from the user
    pub fn user_text(text: impl Into<String>) -> Self {
        Self::new(vec![Part::text(text)], Role::User)
    }

    /// Single text part message from an agent
    pub fn agent_text(text: impl Into<String>) -> Self {
        Self::new(vec![Part::text(text)], Role::Agent)
    }

    /// Iterate over the text of every text part, in order
    pub fn text_parts(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().filter_map(|part| match part {
            Part::Text(text) => Some(text.text.as_str()),
            _ => None,
        })
    }

    /// Join all text parts with `separator`
    pub fn text(&self, separator: &str) -> String {
        self.text_parts().collect::<Vec<_>>().join(separator)
    }

    pub fn has_text_parts(&self) -> bool {
        self.parts.iter().any(|p| matches!(p, Part::Text(_)))
    }

    pub fn has_data_parts(&self) -> bool {
        self.parts.iter().any(|p| matches!(p, Part::Data(_)))
    }

    /// First data part with the given name
    pub fn data_part(&self, name: &str) -> Option<&Map<String, Value>> {
        self.parts.iter().find_map(|part| match part {
            Part::Data(data) if data.name.as_deref() == Some(name) => Some(&data.data),
            _ => None,
        })
    }
}

/// Message author roles
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Agent,
    Task,
}

/// One piece of message content, discriminated by `type`
///
/// # Examples
/// ```
/// use a2a_orchestrator::protocol::Part;
///
/// let part: Part = serde_json::from_str(r#"{"type":"text","text":"hi"}"#).unwrap();
/// assert_eq!(part, Part::text("hi"));
///
/// // Fields belonging to another variant are rejected
/// let bad = serde_json::from_str::<Part>(r#"{"type":"text","text":"hi","data":{}}"#);
/// assert!(bad.is_err());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Part {
    Text(TextPart),
    Data(DataPart),
    File(FilePart),
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text(TextPart {
            text: text.into(),
            name: None,
        })
    }

    pub fn named_text(text: impl Into<String>, name: impl Into<String>) -> Self {
        Part::Text(TextPart {
            text: text.into(),
            name: Some(name.into()),
        })
    }

    pub fn data(data: Map<String, Value>, name: Option<String>) -> Self {
        Part::Data(DataPart { data, name })
    }

    pub fn file(
        content: impl Into<String>,
        mimetype: impl Into<String>,
        filename: Option<String>,
        name: Option<String>,
    ) -> Self {
        Part::File(FilePart {
            file: FileContent {
                content: content.into(),
                mimetype: mimetype.into(),
                name: filename,
            },
            name,
        })
    }

    /// The optional part name, whatever the variant
    pub fn name(&self) -> Option<&str> {
        match self {
            Part::Text(p) => p.name.as_deref(),
            Part::Data(p) => p.name.as_deref(),
            Part::File(p) => p.name.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TextPart {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct DataPart {
    pub data: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FilePart {
    pub file: FileContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Inline file payload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FileContent {
    /// Base64 encoded bytes
    pub content: String,
    pub mimetype: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Generate a new task id
pub fn generate_task_id() -> String {
    Uuid::new_v4().to_string()
}
