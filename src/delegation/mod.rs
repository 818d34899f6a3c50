//! Sequential handler consultation
//!
//! Handlers are consulted one at a time in queue order, because a handler's
//! answer may enqueue further handlers through the delegation rules. Each
//! handler runs at most once per request; failures are recorded and the
//! loop moves on.

pub mod generalist;
pub mod rules;

pub use generalist::GeneralistHandler;

use crate::classifier::ClassificationResult;
use crate::handler_span;
use crate::observability::metrics::metrics;
use crate::observability::trace::{StepStatus, TraceRecorder};
use crate::persistence::{
    AgentInteraction, BestEffort, InteractionType, MessageRecord, MessageType, SenderType,
};
use crate::protocol::{generate_task_id, Message, Task, TaskState};
use crate::registry::{HandlerDescriptor, HandlerRegistry};
use crate::transport::HandlerTransport;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn, Instrument};

/// Longest handler response stored by the persistence port
const PERSISTED_RESPONSE_CHARS: usize = 1000;

/// Outcome of one handler consultation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentResult {
    pub agent: String,
    pub success: bool,
    pub response: Option<Message>,
    pub error: Option<String>,
    /// 1-based consultation order
    pub order: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub delegated_to: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegation_reason: Option<String>,
    /// Handler whose response caused this consultation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegated_from: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl AgentResult {
    fn succeeded(agent: &str, order: usize, response: Message, delegated_from: Option<String>) -> Self {
        Self {
            agent: agent.to_string(),
            success: true,
            response: Some(response),
            error: None,
            order,
            delegated_to: Vec::new(),
            delegation_reason: None,
            delegated_from,
            timestamp: Utc::now(),
        }
    }

    fn failed(agent: &str, order: usize, error: String, delegated_from: Option<String>) -> Self {
        Self {
            agent: agent.to_string(),
            success: false,
            response: None,
            error: Some(error),
            order,
            delegated_to: Vec::new(),
            delegation_reason: None,
            delegated_from,
            timestamp: Utc::now(),
        }
    }

    /// Text parts of the response joined with `separator`
    pub fn response_text(&self, separator: &str) -> String {
        self.response
            .as_ref()
            .map(|m| m.text(separator))
            .unwrap_or_default()
    }
}

/// Queue entry: handler key plus the handler that delegated to it
type Pending = (String, Option<String>);

pub struct DelegationProcessor {
    registry: Arc<HandlerRegistry>,
    transport: Arc<dyn HandlerTransport>,
    generalist: Arc<GeneralistHandler>,
    persistence: BestEffort,
    timeout: Duration,
    max_hops: usize,
}

impl DelegationProcessor {
    pub fn new(
        registry: Arc<HandlerRegistry>,
        transport: Arc<dyn HandlerTransport>,
        generalist: Arc<GeneralistHandler>,
        timeout: Duration,
        max_hops: usize,
    ) -> Self {
        Self {
            registry,
            transport,
            generalist,
            persistence: BestEffort::noop(),
            timeout,
            max_hops,
        }
    }

    pub fn with_persistence(mut self, persistence: BestEffort) -> Self {
        self.persistence = persistence;
        self
    }

    /// Consult the classified handlers and everything they delegate to
    pub async fn process(
        &self,
        classification: &ClassificationResult,
        task: &Task,
        message: &Message,
        text: &str,
        trace: &mut TraceRecorder,
    ) -> Vec<AgentResult> {
        let mut queue: VecDeque<Pending> = classification
            .agents
            .iter()
            .map(|agent| (agent.clone(), None))
            .collect();
        let mut processed: HashSet<String> = HashSet::new();
        let mut results: Vec<AgentResult> = Vec::new();

        while let Some((key, delegated_from)) = queue.pop_front() {
            if processed.contains(&key) {
                continue;
            }
            if results.len() >= self.max_hops {
                let skipped: Vec<&str> = std::iter::once(key.as_str())
                    .chain(queue.iter().map(|(k, _)| k.as_str()))
                    .filter(|k| !processed.contains(*k))
                    .collect();
                warn!(
                    task_id = %task.id,
                    max_hops = self.max_hops,
                    skipped = ?skipped,
                    "Consultation limit reached"
                );
                trace.add_step(
                    format!(
                        "Consultation limit of {} handlers reached, skipping: {}",
                        self.max_hops,
                        skipped.join(", ")
                    ),
                    StepStatus::Error,
                );
                break;
            }

            processed.insert(key.clone());
            let order = results.len() + 1;

            let Some(handler) = self.registry.get(&key).cloned() else {
                warn!(task_id = %task.id, handler = %key, "Classification selected an unknown handler");
                trace.add_step(
                    format!("❌ Error from {key}: unknown handler"),
                    StepStatus::Error,
                );
                results.push(AgentResult::failed(
                    &key,
                    order,
                    "unknown handler".to_string(),
                    delegated_from,
                ));
                continue;
            };

            let span = handler_span!(handler = %key, order = order, task_id = %task.id);
            let mut result = self
                .consult(&handler, order, delegated_from, classification, task, message, text, trace)
                .instrument(span)
                .await;

            if result.success {
                let candidates = rules::analyze(
                    &key,
                    &result.response_text(" "),
                    text,
                    &processed,
                    &self.registry,
                );
                if !candidates.is_empty() {
                    result = self
                        .delegate(result, candidates, &mut queue, task, trace)
                        .await;
                }
            }
            results.push(result);
        }

        results
    }

    #[allow(clippy::too_many_arguments)]
    async fn consult(
        &self,
        handler: &HandlerDescriptor,
        order: usize,
        delegated_from: Option<String>,
        classification: &ClassificationResult,
        task: &Task,
        message: &Message,
        text: &str,
        trace: &mut TraceRecorder,
    ) -> AgentResult {
        let subtask = Task::subtask(&task.id, &handler.key);
        trace.add_step(
            format!(
                "Step {order}: Consulting {} for specialized analysis...",
                handler.name
            ),
            StepStatus::Active,
        );
        info!(sub_task_id = %subtask.id, "Consulting {}", handler.name);

        let mut context = Map::new();
        context.insert("agentOrder".to_string(), json!(order));
        context.insert("subTaskId".to_string(), json!(subtask.id));
        context.insert("parentTaskId".to_string(), json!(task.id));
        context.insert("agentUrl".to_string(), json!(handler.url));
        context.insert("specialties".to_string(), json!(handler.specialties));
        context.insert(
            "classificationConfidence".to_string(),
            json!(classification.confidence),
        );
        let reason = if delegated_from.is_some() {
            "delegation"
        } else {
            "initial_classification"
        };
        self.persistence
            .record_agent_interaction(AgentInteraction {
                task_id: task.id.clone(),
                from_agent: "orchestrator".to_string(),
                to_agent: handler.key.clone(),
                interaction_type: InteractionType::ConsultationStart,
                success: None,
                reason: Some(reason.to_string()),
                context,
            })
            .await;

        let started = Instant::now();
        let outcome = self.invoke(handler, &subtask, message, text).await;
        let elapsed = started.elapsed();
        metrics().handler_called(&handler.key, elapsed, outcome.is_ok());

        match outcome {
            Ok(response) => {
                trace.add_step(
                    format!("✅ {} provided successful analysis", handler.name),
                    StepStatus::Completed,
                );
                info!(elapsed_ms = elapsed.as_millis() as u64, "Handler succeeded");
                self.persist_success(handler, order, &subtask, &response, task, elapsed)
                    .await;
                AgentResult::succeeded(&handler.key, order, response, delegated_from)
            }
            Err(error) => {
                let mut metadata = Map::new();
                metadata.insert("error".to_string(), json!(error));
                trace.add_step_with_metadata(
                    format!("❌ Error from {}: {error}", handler.name),
                    StepStatus::Error,
                    metadata,
                );
                warn!(error = %error, "Handler failed");
                self.persist_failure(handler, order, &subtask, &error, task)
                    .await;
                AgentResult::failed(&handler.key, order, error, delegated_from)
            }
        }
    }

    /// Run one handler; `Err` carries the failure text for the result
    async fn invoke(
        &self,
        handler: &HandlerDescriptor,
        subtask: &Task,
        message: &Message,
        text: &str,
    ) -> Result<Message, String> {
        let Some(url) = &handler.url else {
            return self
                .generalist
                .respond(text)
                .await
                .map(Message::agent_text)
                .map_err(|e| e.to_string());
        };

        match self
            .transport
            .send_task(url, subtask, message, self.timeout)
            .await
        {
            Ok(result) if result.task.state == TaskState::Failed => {
                let detail = result.message.text(" ");
                Err(if detail.is_empty() {
                    "Handler reported task failure".to_string()
                } else {
                    format!("Handler reported task failure: {detail}")
                })
            }
            Ok(result) => Ok(result.message),
            Err(e) => {
                if e.is_timeout() {
                    metrics().handler_timeout(&handler.key);
                }
                Err(e.to_string())
            }
        }
    }

    async fn delegate(
        &self,
        mut result: AgentResult,
        candidates: Vec<String>,
        queue: &mut VecDeque<Pending>,
        task: &Task,
        trace: &mut TraceRecorder,
    ) -> AgentResult {
        let name = self.registry.display_name(&result.agent);
        trace.add_step(
            format!("🔄 {name} suggests consulting: {}", candidates.join(", ")),
            StepStatus::Completed,
        );
        info!(task_id = %task.id, from = %result.agent, to = ?candidates, "Delegating");
        metrics().delegation();

        let mut context = Map::new();
        context.insert("delegatedTo".to_string(), json!(candidates));
        context.insert("agentOrder".to_string(), json!(result.order));
        self.persistence
            .record_agent_interaction(AgentInteraction {
                task_id: task.id.clone(),
                from_agent: result.agent.clone(),
                to_agent: candidates.join(","),
                interaction_type: InteractionType::Delegation,
                success: None,
                reason: Some("response_analysis_triggered_delegation".to_string()),
                context,
            })
            .await;

        let reasons: Vec<&str> = candidates
            .iter()
            .map(|to| rules::delegation_reason(&result.agent, to))
            .collect();
        result.delegation_reason = Some(reasons.join("; "));

        for candidate in &candidates {
            queue.push_back((candidate.clone(), Some(result.agent.clone())));
        }
        result.delegated_to = candidates;
        result
    }

    async fn persist_success(
        &self,
        handler: &HandlerDescriptor,
        order: usize,
        subtask: &Task,
        response: &Message,
        task: &Task,
        elapsed: Duration,
    ) {
        let text = response.text(" ");
        let content = if text.is_empty() {
            "No text response".to_string()
        } else {
            text.chars().take(PERSISTED_RESPONSE_CHARS).collect()
        };

        let mut metadata = Map::new();
        metadata.insert("agentName".to_string(), json!(handler.key));
        metadata.insert("agentOrder".to_string(), json!(order));
        metadata.insert("subTaskId".to_string(), json!(subtask.id));
        metadata.insert("responseLength".to_string(), json!(text.chars().count()));
        metadata.insert("successful".to_string(), Value::Bool(true));
        self.persistence
            .log_message(MessageRecord {
                task_id: task.id.clone(),
                message_id: generate_task_id(),
                content,
                message_type: MessageType::AgentResponse,
                sender_type: SenderType::Agent,
                metadata,
            })
            .await;

        let mut context = Map::new();
        context.insert("responseLength".to_string(), json!(text.chars().count()));
        context.insert("hasTextParts".to_string(), json!(response.has_text_parts()));
        context.insert("hasDataParts".to_string(), json!(response.has_data_parts()));
        context.insert("agentOrder".to_string(), json!(order));
        context.insert("subTaskId".to_string(), json!(subtask.id));
        context.insert("responseTimeMs".to_string(), json!(elapsed.as_millis() as u64));
        self.persistence
            .record_agent_interaction(AgentInteraction {
                task_id: task.id.clone(),
                from_agent: handler.key.clone(),
                to_agent: "orchestrator".to_string(),
                interaction_type: InteractionType::ConsultationSuccess,
                success: Some(true),
                reason: None,
                context,
            })
            .await;
    }

    async fn persist_failure(
        &self,
        handler: &HandlerDescriptor,
        order: usize,
        subtask: &Task,
        error: &str,
        task: &Task,
    ) {
        let mut metadata = Map::new();
        metadata.insert("agentName".to_string(), json!(handler.key));
        metadata.insert("agentOrder".to_string(), json!(order));
        metadata.insert("successful".to_string(), Value::Bool(false));
        self.persistence
            .log_message(MessageRecord {
                task_id: task.id.clone(),
                message_id: generate_task_id(),
                content: format!("Agent error: {error}"),
                message_type: MessageType::AgentError,
                sender_type: SenderType::System,
                metadata,
            })
            .await;

        let mut context = Map::new();
        context.insert("error".to_string(), json!(error));
        context.insert("agentOrder".to_string(), json!(order));
        context.insert("subTaskId".to_string(), json!(subtask.id));
        self.persistence
            .record_agent_interaction(AgentInteraction {
                task_id: task.id.clone(),
                from_agent: handler.key.clone(),
                to_agent: "orchestrator".to_string(),
                interaction_type: InteractionType::ConsultationError,
                success: Some(false),
                reason: Some(error.to_string()),
                context,
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::ClassificationMethod;
    use crate::config::OrchestratorConfig;
    use crate::persistence::PersistencePort;
    use crate::testing::mocks::{MockHandlerTransport, MockLlmProvider, RecordingPersistence};
    use crate::transport::TransportError;
    use std::collections::BTreeMap;

    const REVENUE_URL: &str = "http://localhost:5002/a2a/tasks/send";
    const LEGAL_URL: &str = "http://localhost:5003/a2a/tasks/send";
    const FINANCE_URL: &str = "http://localhost:5004/a2a/tasks/send";

    fn classification(agents: &[&str]) -> ClassificationResult {
        ClassificationResult {
            agents: agents.iter().map(|a| a.to_string()).collect(),
            confidence: 0.9,
            reasoning: "test".to_string(),
            method: ClassificationMethod::Regex,
            agent_confidences: BTreeMap::new(),
            requires_multiple_agents: agents.len() > 1,
        }
    }

    fn processor(transport: Arc<MockHandlerTransport>) -> DelegationProcessor {
        let config = OrchestratorConfig::test_config();
        DelegationProcessor::new(
            Arc::new(HandlerRegistry::from_config(&config)),
            transport,
            Arc::new(GeneralistHandler::new(
                Arc::new(MockLlmProvider::single_response("Happy to help!")),
                "mock-model",
            )),
            Duration::from_millis(100),
            16,
        )
    }

    async fn run(processor: &DelegationProcessor, agents: &[&str], text: &str) -> Vec<AgentResult> {
        let task = Task::new();
        let message = Message::user_text(text);
        let mut trace = TraceRecorder::new("orchestrator");
        processor
            .process(&classification(agents), &task, &message, text, &mut trace)
            .await
    }

    #[tokio::test]
    async fn test_delegation_appends_after_queued_handlers() {
        let transport = Arc::new(MockHandlerTransport::new());
        transport
            .respond(LEGAL_URL, "Review the NDA. Also check the tax impact.")
            .await;
        transport.respond(REVENUE_URL, "Grow via partnerships.").await;
        transport.respond(FINANCE_URL, "Tax exposure is modest.").await;

        let results = run(&processor(transport.clone()), &["legal", "revenue"], "nda terms").await;

        let order: Vec<_> = results.iter().map(|r| (r.agent.as_str(), r.order)).collect();
        assert_eq!(order, vec![("legal", 1), ("revenue", 2), ("finance", 3)]);
        assert_eq!(results[0].delegated_to, vec!["finance"]);
        assert_eq!(
            results[0].delegation_reason.as_deref(),
            Some("Financial impact analysis required")
        );
        assert_eq!(results[2].delegated_from.as_deref(), Some("legal"));
    }

    #[tokio::test]
    async fn test_timeout_is_recorded_and_loop_continues() {
        let transport = Arc::new(MockHandlerTransport::new());
        transport
            .respond_after(LEGAL_URL, "too late", Duration::from_millis(500))
            .await;
        transport.respond(FINANCE_URL, "Margins are healthy.").await;

        let results = run(&processor(transport), &["legal", "finance"], "margins").await;

        assert_eq!(results.len(), 2);
        assert!(!results[0].success);
        assert!(results[0].error.as_deref().unwrap().contains("timed out"));
        assert!(results[1].success);
    }

    #[tokio::test]
    async fn test_each_handler_runs_once() {
        let transport = Arc::new(MockHandlerTransport::new());
        transport.respond(LEGAL_URL, "Check the EBITDA and the tax.").await;
        transport
            .respond(FINANCE_URL, "Compliance and contract review needed.")
            .await;

        let results = run(
            &processor(transport.clone()),
            &["legal", "finance", "legal"],
            "deal structure",
        )
        .await;

        let agents: Vec<_> = results.iter().map(|r| r.agent.as_str()).collect();
        assert_eq!(agents, vec!["legal", "finance"]);
        assert_eq!(transport.calls().await.len(), 2);
    }

    #[tokio::test]
    async fn test_generic_handler_runs_in_process() {
        let transport = Arc::new(MockHandlerTransport::new());
        let results = run(&processor(transport.clone()), &["general"], "hello").await;

        assert!(results[0].success);
        assert_eq!(results[0].response_text("\n"), "Happy to help!");
        assert!(transport.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_task_state_and_unknown_handler_are_failures() {
        let transport = Arc::new(MockHandlerTransport::new());
        transport
            .respond_with_state(LEGAL_URL, "could not parse contract", TaskState::Failed)
            .await;

        let results = run(&processor(transport), &["legal", "marketing"], "contract").await;

        assert!(!results[0].success);
        assert_eq!(
            results[0].error.as_deref(),
            Some("Handler reported task failure: could not parse contract")
        );
        assert_eq!(results[1].agent, "marketing");
        assert_eq!(results[1].error.as_deref(), Some("unknown handler"));
    }

    #[tokio::test]
    async fn test_max_hops_bounds_consultations() {
        let transport = Arc::new(MockHandlerTransport::new());
        transport.respond(REVENUE_URL, "ok.").await;
        transport.respond(LEGAL_URL, "ok.").await;
        let config = OrchestratorConfig::test_config();
        let processor = DelegationProcessor::new(
            Arc::new(HandlerRegistry::from_config(&config)),
            transport,
            Arc::new(GeneralistHandler::new(
                Arc::new(MockLlmProvider::single_response("hi")),
                "mock-model",
            )),
            Duration::from_millis(100),
            2,
        );

        let results = run(&processor, &["revenue", "legal", "finance"], "plan").await;
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn test_persistence_records_consultations() {
        let transport = Arc::new(MockHandlerTransport::new());
        transport.fail(LEGAL_URL, TransportError::Network("refused".to_string())).await;
        let recording = Arc::new(RecordingPersistence::new());
        let processor = processor(transport)
            .with_persistence(BestEffort::new(recording.clone() as Arc<dyn PersistencePort>));

        run(&processor, &["legal"], "nda").await;

        let interactions: Vec<_> = recording
            .interactions()
            .await
            .into_iter()
            .map(|i| i.interaction_type)
            .collect();
        assert_eq!(
            interactions,
            vec![
                InteractionType::ConsultationStart,
                InteractionType::ConsultationError
            ]
        );
        let messages = recording.messages().await;
        assert_eq!(messages[0].message_type, MessageType::AgentError);
        assert_eq!(messages[0].content, "Agent error: Network error: refused");
    }
}
