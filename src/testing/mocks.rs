//! Mock implementations for testing
//!
//! Provides mock LLM provider, handler transport, semantic classifier,
//! knowledge retriever and persistence implementations so routing can be
//! exercised without network access.

use crate::classifier::{ClassificationError, SemanticClassification, SemanticClassifier};
use crate::knowledge::{KnowledgeError, KnowledgeResult, KnowledgeRetriever};
use crate::llm::provider::{
    CompletionRequest, CompletionResponse, FinishReason, LlmError, LlmProvider, TokenUsage,
};
use crate::persistence::{
    AgentInteraction, MessageRecord, PersistenceError, PersistencePort, TaskRecord,
    TaskStatusUpdate,
};
use crate::protocol::{AgentCard, Message, Task, TaskSendResult, TaskState};
use crate::transport::{HandlerTransport, HealthStatus, TransportError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Mock LLM provider that cycles through canned responses
#[derive(Debug)]
pub struct MockLlmProvider {
    pub responses: Vec<String>,
    pub current_response: Arc<Mutex<usize>>,
    pub should_fail: bool,
    name: String,
    calls: AtomicUsize,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockLlmProvider {
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            responses,
            current_response: Arc::new(Mutex::new(0)),
            should_fail: false,
            name: "mock".to_string(),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_failure() -> Self {
        Self {
            should_fail: true,
            ..Self::new(vec![])
        }
    }

    pub fn single_response(response: impl Into<String>) -> Self {
        Self::new(vec![response.into()])
    }

    /// Report a different provider name, e.g. "openai" to enable schema output
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().await.push(request);

        if self.should_fail {
            return Err(LlmError::RequestFailed("Mock LLM failure".to_string()));
        }

        let mut current = self.current_response.lock().await;
        let response_idx = *current % self.responses.len().max(1);
        *current += 1;

        let content = if self.responses.is_empty() {
            "Mock response".to_string()
        } else {
            self.responses[response_idx].clone()
        };

        Ok(CompletionResponse {
            content: Some(content),
            model: "mock-model".to_string(),
            usage: TokenUsage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            },
            finish_reason: FinishReason::Stop,
            metadata: HashMap::new(),
        })
    }

    async fn health_check(&self) -> Result<(), LlmError> {
        if self.should_fail {
            Err(LlmError::RequestFailed(
                "Mock health check failure".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Clone)]
enum ScriptedReply {
    Respond {
        text: String,
        state: TaskState,
        delay: Option<Duration>,
    },
    Fail(TransportError),
}

/// One `send_task` call seen by [`MockHandlerTransport`]
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub url: String,
    pub task: Task,
    pub message: Message,
}

/// Handler transport answering from a per-URL script
///
/// URLs without a script fail with a network error.
#[derive(Debug, Default)]
pub struct MockHandlerTransport {
    replies: Mutex<HashMap<String, ScriptedReply>>,
    health: Mutex<HashMap<String, HealthStatus>>,
    cards: Mutex<HashMap<String, AgentCard>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockHandlerTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn respond(&self, url: &str, text: impl Into<String>) {
        self.script(
            url,
            ScriptedReply::Respond {
                text: text.into(),
                state: TaskState::Completed,
                delay: None,
            },
        )
        .await;
    }

    /// Answer only after `delay`; a delay past the call timeout becomes a timeout error
    pub async fn respond_after(&self, url: &str, text: impl Into<String>, delay: Duration) {
        self.script(
            url,
            ScriptedReply::Respond {
                text: text.into(),
                state: TaskState::Completed,
                delay: Some(delay),
            },
        )
        .await;
    }

    pub async fn respond_with_state(&self, url: &str, text: impl Into<String>, state: TaskState) {
        self.script(
            url,
            ScriptedReply::Respond {
                text: text.into(),
                state,
                delay: None,
            },
        )
        .await;
    }

    pub async fn fail(&self, url: &str, error: TransportError) {
        self.script(url, ScriptedReply::Fail(error)).await;
    }

    pub async fn set_health(&self, url: &str, status: HealthStatus) {
        self.health.lock().await.insert(url.to_string(), status);
    }

    pub async fn set_agent_card(&self, base_url: &str, card: AgentCard) {
        self.cards.lock().await.insert(base_url.to_string(), card);
    }

    pub async fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().await.clone()
    }

    async fn script(&self, url: &str, reply: ScriptedReply) {
        self.replies.lock().await.insert(url.to_string(), reply);
    }
}

#[async_trait]
impl HandlerTransport for MockHandlerTransport {
    async fn send_task(
        &self,
        url: &str,
        task: &Task,
        message: &Message,
        timeout: Duration,
    ) -> Result<TaskSendResult, TransportError> {
        self.calls.lock().await.push(RecordedCall {
            url: url.to_string(),
            task: task.clone(),
            message: message.clone(),
        });

        let reply = self.replies.lock().await.get(url).cloned();
        match reply {
            Some(ScriptedReply::Respond { text, state, delay }) => {
                if let Some(delay) = delay {
                    if delay > timeout {
                        tokio::time::sleep(timeout).await;
                        return Err(TransportError::Timeout {
                            timeout_ms: timeout.as_millis() as u64,
                        });
                    }
                    tokio::time::sleep(delay).await;
                }
                Ok(TaskSendResult {
                    task: task.with_state(state),
                    message: Message::agent_text(text),
                })
            }
            Some(ScriptedReply::Fail(error)) => Err(error),
            None => Err(TransportError::Network(format!(
                "connection refused: {url}"
            ))),
        }
    }

    async fn fetch_agent_card(&self, base_url: &str) -> Result<AgentCard, TransportError> {
        self.cards
            .lock()
            .await
            .get(base_url)
            .cloned()
            .ok_or_else(|| TransportError::HttpStatus {
                status: 404,
                message: "Not Found".to_string(),
            })
    }

    async fn check_health(&self, url: &str) -> HealthStatus {
        self.health
            .lock()
            .await
            .get(url)
            .copied()
            .unwrap_or(HealthStatus::Healthy)
    }
}

/// Semantic classifier with a fixed verdict
#[derive(Debug)]
pub struct MockSemanticClassifier {
    verdict: Option<SemanticClassification>,
    calls: AtomicUsize,
    contexts: Mutex<Vec<Vec<String>>>,
}

impl MockSemanticClassifier {
    pub fn returning(verdict: SemanticClassification) -> Self {
        Self {
            verdict: Some(verdict),
            calls: AtomicUsize::new(0),
            contexts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            verdict: None,
            calls: AtomicUsize::new(0),
            contexts: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Context passed on each call
    pub async fn contexts(&self) -> Vec<Vec<String>> {
        self.contexts.lock().await.clone()
    }
}

#[async_trait]
impl SemanticClassifier for MockSemanticClassifier {
    async fn classify(
        &self,
        _text: &str,
        context: &[String],
    ) -> Result<SemanticClassification, ClassificationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.contexts.lock().await.push(context.to_vec());

        self.verdict
            .clone()
            .ok_or_else(|| ClassificationError::Unavailable("mock classifier offline".to_string()))
    }
}

#[derive(Debug)]
pub struct MockKnowledgeRetriever {
    outcome: Result<KnowledgeResult, KnowledgeError>,
}

impl MockKnowledgeRetriever {
    pub fn returning(result: KnowledgeResult) -> Self {
        Self {
            outcome: Ok(result),
        }
    }

    pub fn failing(error: KnowledgeError) -> Self {
        Self {
            outcome: Err(error),
        }
    }
}

#[async_trait]
impl KnowledgeRetriever for MockKnowledgeRetriever {
    async fn retrieve(
        &self,
        _text: &str,
        _domain_tag: &str,
        _max_results: usize,
    ) -> Result<KnowledgeResult, KnowledgeError> {
        self.outcome.clone()
    }
}

/// Persistence port that keeps every record in memory
#[derive(Debug, Default)]
pub struct RecordingPersistence {
    tasks: Mutex<Vec<TaskRecord>>,
    messages: Mutex<Vec<MessageRecord>>,
    status_updates: Mutex<Vec<(String, TaskStatusUpdate)>>,
    interactions: Mutex<Vec<AgentInteraction>>,
}

impl RecordingPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn tasks(&self) -> Vec<TaskRecord> {
        self.tasks.lock().await.clone()
    }

    pub async fn messages(&self) -> Vec<MessageRecord> {
        self.messages.lock().await.clone()
    }

    pub async fn status_updates(&self) -> Vec<(String, TaskStatusUpdate)> {
        self.status_updates.lock().await.clone()
    }

    pub async fn interactions(&self) -> Vec<AgentInteraction> {
        self.interactions.lock().await.clone()
    }
}

#[async_trait]
impl PersistencePort for RecordingPersistence {
    async fn create_task(&self, record: TaskRecord) -> Result<(), PersistenceError> {
        self.tasks.lock().await.push(record);
        Ok(())
    }

    async fn log_message(&self, record: MessageRecord) -> Result<(), PersistenceError> {
        self.messages.lock().await.push(record);
        Ok(())
    }

    async fn update_task_status(
        &self,
        task_id: &str,
        update: TaskStatusUpdate,
    ) -> Result<(), PersistenceError> {
        self.status_updates
            .lock()
            .await
            .push((task_id.to_string(), update));
        Ok(())
    }

    async fn record_agent_interaction(
        &self,
        interaction: AgentInteraction,
    ) -> Result<(), PersistenceError> {
        self.interactions.lock().await.push(interaction);
        Ok(())
    }
}
