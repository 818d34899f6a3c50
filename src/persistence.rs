//! Persistence port
//!
//! The router records tasks, messages and handler interactions through
//! [`PersistencePort`]. Every call is best-effort: a failing store is logged
//! and never changes the routing outcome.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum PersistenceError {
    #[error("Persistence backend unavailable: {0}")]
    Unavailable(String),
    #[error("Persistence write failed: {0}")]
    WriteFailed(String),
}

/// Task created for one routed request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskRecord {
    pub task_id: String,
    pub initial_query: String,
    pub primary_handler: String,
    pub assigned_handlers: Vec<String>,
    pub classification_method: String,
    pub classification_confidence: f64,
    pub classification_reasoning: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    UserQuery,
    AgentResponse,
    AgentError,
    OrchestratorResponse,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SenderType {
    User,
    Agent,
    System,
    Orchestrator,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageRecord {
    pub task_id: String,
    pub message_id: String,
    pub content: String,
    pub message_type: MessageType,
    pub sender_type: SenderType,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FinalStatus {
    Completed,
    RequiresEscalation,
}

/// Final outcome of a routed request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskStatusUpdate {
    pub status: FinalStatus,
    pub success_rate: f64,
    pub handlers_consulted: usize,
    pub successful_handlers: usize,
    pub failed_handlers: usize,
    pub escalated: bool,
    pub single_handler: bool,
    pub response_length: usize,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InteractionType {
    ConsultationStart,
    ConsultationSuccess,
    Delegation,
    ConsultationError,
}

/// One edge in the consultation graph
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentInteraction {
    pub task_id: String,
    pub from_agent: String,
    pub to_agent: String,
    pub interaction_type: InteractionType,
    pub success: Option<bool>,
    pub reason: Option<String>,
    #[serde(default)]
    pub context: Map<String, Value>,
}

/// Storage backend for routing history
#[async_trait]
pub trait PersistencePort: Send + Sync {
    async fn create_task(&self, record: TaskRecord) -> Result<(), PersistenceError>;

    async fn log_message(&self, record: MessageRecord) -> Result<(), PersistenceError>;

    async fn update_task_status(
        &self,
        task_id: &str,
        update: TaskStatusUpdate,
    ) -> Result<(), PersistenceError>;

    async fn record_agent_interaction(
        &self,
        interaction: AgentInteraction,
    ) -> Result<(), PersistenceError>;
}

/// Port that stores nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPersistence;

#[async_trait]
impl PersistencePort for NoopPersistence {
    async fn create_task(&self, _record: TaskRecord) -> Result<(), PersistenceError> {
        Ok(())
    }

    async fn log_message(&self, _record: MessageRecord) -> Result<(), PersistenceError> {
        Ok(())
    }

    async fn update_task_status(
        &self,
        _task_id: &str,
        _update: TaskStatusUpdate,
    ) -> Result<(), PersistenceError> {
        Ok(())
    }

    async fn record_agent_interaction(
        &self,
        _interaction: AgentInteraction,
    ) -> Result<(), PersistenceError> {
        Ok(())
    }
}

/// Wrapper that logs and swallows every persistence failure
#[derive(Clone)]
pub struct BestEffort {
    inner: Arc<dyn PersistencePort>,
}

impl BestEffort {
    pub fn new(inner: Arc<dyn PersistencePort>) -> Self {
        Self { inner }
    }

    pub fn noop() -> Self {
        Self::new(Arc::new(NoopPersistence))
    }

    pub async fn create_task(&self, record: TaskRecord) {
        let task_id = record.task_id.clone();
        if let Err(e) = self.inner.create_task(record).await {
            warn!(task_id = %task_id, error = %e, "Failed to persist task");
        }
    }

    pub async fn log_message(&self, record: MessageRecord) {
        let task_id = record.task_id.clone();
        let message_type = record.message_type;
        if let Err(e) = self.inner.log_message(record).await {
            warn!(task_id = %task_id, message_type = ?message_type, error = %e, "Failed to persist message");
        }
    }

    pub async fn update_task_status(&self, task_id: &str, update: TaskStatusUpdate) {
        if let Err(e) = self.inner.update_task_status(task_id, update).await {
            warn!(task_id = %task_id, error = %e, "Failed to persist task status");
        }
    }

    pub async fn record_agent_interaction(&self, interaction: AgentInteraction) {
        let task_id = interaction.task_id.clone();
        let interaction_type = interaction.interaction_type;
        if let Err(e) = self.inner.record_agent_interaction(interaction).await {
            warn!(task_id = %task_id, interaction = ?interaction_type, error = %e, "Failed to persist agent interaction");
        }
    }
}

impl Default for BestEffort {
    fn default() -> Self {
        Self::noop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingPersistence;

    #[async_trait]
    impl PersistencePort for FailingPersistence {
        async fn create_task(&self, _record: TaskRecord) -> Result<(), PersistenceError> {
            Err(PersistenceError::Unavailable("db down".to_string()))
        }

        async fn log_message(&self, _record: MessageRecord) -> Result<(), PersistenceError> {
            Err(PersistenceError::WriteFailed("disk full".to_string()))
        }

        async fn update_task_status(
            &self,
            _task_id: &str,
            _update: TaskStatusUpdate,
        ) -> Result<(), PersistenceError> {
            Err(PersistenceError::Unavailable("db down".to_string()))
        }

        async fn record_agent_interaction(
            &self,
            _interaction: AgentInteraction,
        ) -> Result<(), PersistenceError> {
            Err(PersistenceError::Unavailable("db down".to_string()))
        }
    }

    #[tokio::test]
    async fn test_best_effort_swallows_failures() {
        let port = BestEffort::new(Arc::new(FailingPersistence));

        port.log_message(MessageRecord {
            task_id: "t1".to_string(),
            message_id: "m1".to_string(),
            content: "hello".to_string(),
            message_type: MessageType::UserQuery,
            sender_type: SenderType::User,
            metadata: Map::new(),
        })
        .await;

        port.record_agent_interaction(AgentInteraction {
            task_id: "t1".to_string(),
            from_agent: "orchestrator".to_string(),
            to_agent: "legal".to_string(),
            interaction_type: InteractionType::ConsultationStart,
            success: None,
            reason: None,
            context: Map::new(),
        })
        .await;
    }

    #[test]
    fn test_interaction_type_wire_names() {
        assert_eq!(
            serde_json::to_value(InteractionType::ConsultationStart).unwrap(),
            "consultation_start"
        );
        assert_eq!(
            serde_json::to_value(FinalStatus::RequiresEscalation).unwrap(),
            "requires_escalation"
        );
    }
}
