//! Capability descriptor served at the well-known discovery path

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Well-known path of the discovery document
pub const AGENT_CARD_PATH: &str = "/.well-known/agent.json";

/// Capability descriptor for one handler
///
/// # Examples
/// ```
/// use a2a_orchestrator::protocol::AgentCard;
///
/// let card = AgentCard::new("Legal Agent", "Contracts and compliance", "ops@example.com");
/// assert!(card.supports_tasks_send());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentCard {
    pub name: String,
    pub description: String,
    pub contact: String,
    pub capabilities: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub specialties: Vec<String>,
}

impl AgentCard {
    /// Card advertising the `tasks/send` capability
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        contact: impl Into<String>,
    ) -> Self {
        let mut capabilities = Map::new();
        capabilities.insert(
            crate::protocol::TASKS_SEND.to_string(),
            json!({ "streaming": false, "input": ["text", "data", "file"] }),
        );

        Self {
            name: name.into(),
            description: description.into(),
            contact: contact.into(),
            capabilities,
            url: None,
            specialties: Vec::new(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_specialties(mut self, specialties: Vec<String>) -> Self {
        self.specialties = specialties;
        self
    }

    pub fn supports_tasks_send(&self) -> bool {
        self.capabilities.contains_key(crate::protocol::TASKS_SEND)
    }
}
