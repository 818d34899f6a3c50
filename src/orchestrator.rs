//! Request pipeline
//!
//! [`Orchestrator`] ties the layers together for one `tasks/send` request:
//! validate, classify, consult handlers sequentially, aggregate, and answer
//! with the aggregated text plus an orchestration metadata part.
//!
//! The orchestrator holds only read-only state after construction, so one
//! instance serves concurrent requests behind an `Arc`.

use crate::aggregation::{Aggregation, ResponseAggregator};
use crate::classifier::{ClassificationResult, IntentClassifier, LlmSemanticClassifier, SemanticClassifier};
use crate::config::OrchestratorConfig;
use crate::delegation::{AgentResult, DelegationProcessor, GeneralistHandler};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::knowledge::KnowledgeRetriever;
use crate::llm::provider::LlmProvider;
use crate::observability::metrics::metrics;
use crate::observability::trace::{TraceRecorder, TraceSnapshot};
use crate::persistence::{
    BestEffort, FinalStatus, MessageRecord, MessageType, PersistencePort, SenderType, TaskRecord,
    TaskStatusUpdate,
};
use crate::protocol::{
    generate_task_id, validate_task_request, AgentCard, JsonRpcResponse, Message, Part, Role,
    Task, FALLBACK_ERROR_ID,
};
use crate::registry::HandlerRegistry;
use crate::request_span;
use crate::transport::{HandlerTransport, HealthStatus, TASKS_SEND_PATH};
use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn, Instrument};

/// Name of the text part holding the aggregated answer
pub const RESPONSE_PART: &str = "aggregated-response";

/// Name of the data part holding routing metadata
pub const METADATA_PART: &str = "orchestration-metadata";

/// Longest response preview stored by the persistence port
const PERSISTED_PREVIEW_CHARS: usize = 500;

/// Everything produced while routing one request
#[derive(Debug, Clone)]
pub struct RouteOutcome {
    pub task: Task,
    pub message: Message,
    pub classification: ClassificationResult,
    pub results: Vec<AgentResult>,
    pub aggregation: Aggregation,
    pub trace: TraceSnapshot,
}

/// Health of one registered handler
#[derive(Debug, Clone, Serialize)]
pub struct HandlerHealth {
    pub key: String,
    pub name: String,
    pub url: Option<String>,
    pub specialties: Vec<String>,
    pub status: HealthStatus,
    pub in_process: bool,
}

/// Aggregate health across all handlers
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OverallHealth {
    Healthy,
    Degraded,
    Unhealthy,
}

impl OverallHealth {
    /// Healthy when every handler is; unhealthy when no remote handler is
    pub fn from_handlers(handlers: &[HandlerHealth]) -> Self {
        let remote: Vec<&HandlerHealth> = handlers.iter().filter(|h| !h.in_process).collect();
        let healthy = remote
            .iter()
            .filter(|h| h.status == HealthStatus::Healthy)
            .count();

        if healthy == remote.len() {
            OverallHealth::Healthy
        } else if healthy == 0 {
            OverallHealth::Unhealthy
        } else {
            OverallHealth::Degraded
        }
    }
}

pub struct Orchestrator {
    config: OrchestratorConfig,
    registry: Arc<HandlerRegistry>,
    llm: Arc<dyn LlmProvider>,
    transport: Arc<dyn HandlerTransport>,
    classifier: IntentClassifier,
    delegation: DelegationProcessor,
    aggregator: ResponseAggregator,
    persistence: BestEffort,
}

impl Orchestrator {
    /// Orchestrator with heuristic-only classification and no persistence
    pub fn new(
        config: OrchestratorConfig,
        llm: Arc<dyn LlmProvider>,
        transport: Arc<dyn HandlerTransport>,
    ) -> Self {
        let registry = Arc::new(HandlerRegistry::from_config(&config));
        let generalist = Arc::new(GeneralistHandler::new(llm.clone(), config.llm.model.clone()));

        Self {
            classifier: IntentClassifier::new(registry.clone(), config.classifier.clone()),
            delegation: DelegationProcessor::new(
                registry.clone(),
                transport.clone(),
                generalist,
                config.delegation.timeout(),
                config.delegation.max_hops,
            ),
            aggregator: ResponseAggregator::new(&config.escalation),
            persistence: BestEffort::noop(),
            registry,
            llm,
            transport,
            config,
        }
    }

    pub fn with_semantic(mut self, semantic: Arc<dyn SemanticClassifier>) -> Self {
        self.classifier = self.classifier.with_semantic(semantic);
        self
    }

    /// Use the configured LLM provider as the semantic classifier
    pub fn with_llm_semantic(self) -> Self {
        let semantic = LlmSemanticClassifier::new(
            self.llm.clone(),
            self.config.llm.model.clone(),
            &self.registry,
        )
        .with_sampling(self.config.llm.temperature, self.config.llm.max_tokens);
        self.with_semantic(Arc::new(semantic))
    }

    pub fn with_knowledge(mut self, knowledge: Arc<dyn KnowledgeRetriever>) -> Self {
        self.classifier = self.classifier.with_knowledge(knowledge);
        self
    }

    pub fn with_persistence(mut self, persistence: Arc<dyn PersistencePort>) -> Self {
        self.persistence = BestEffort::new(persistence);
        self.delegation = self.delegation.with_persistence(self.persistence.clone());
        self
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Classify `text` without consulting any handler
    pub async fn classify(&self, text: &str) -> ClassificationResult {
        let mut trace = TraceRecorder::new(self.config.orchestrator.id.clone());
        self.classifier.classify(text, &mut trace).await
    }

    /// Handle one decoded JSON-RPC payload
    pub async fn handle_request(&self, payload: &Value) -> JsonRpcResponse {
        metrics().request_received();

        let request = match validate_task_request(payload) {
            Ok(request) => request,
            Err(failure) => {
                metrics().request_rejected();
                warn!(
                    request_id = ?failure.request_id,
                    violations = ?failure.violations,
                    "Rejected invalid request"
                );
                return failure.to_response();
            }
        };

        let params = request.params;
        let span = request_span!(request_id = %request.id, task_id = %params.task.id);
        match self
            .route_task(&params.task, &params.message)
            .instrument(span)
            .await
        {
            Ok(outcome) => JsonRpcResponse::success(request.id, outcome.task, outcome.message),
            Err(e) => {
                metrics().request_failed();
                error!(request_id = %request.id, error = %e, "Routing failed");
                e.to_response(&request.id)
            }
        }
    }

    /// Handle a raw request body
    pub async fn handle_raw(&self, body: &[u8]) -> JsonRpcResponse {
        match serde_json::from_slice::<Value>(body) {
            Ok(payload) => self.handle_request(&payload).await,
            Err(e) => {
                metrics().request_received();
                metrics().request_rejected();
                warn!(error = %e, "Rejected unparseable request");
                OrchestratorError::parse(e.to_string()).to_response(FALLBACK_ERROR_ID)
            }
        }
    }

    /// Route a validated task through classification, delegation and aggregation
    pub async fn route_task(
        &self,
        task: &Task,
        message: &Message,
    ) -> OrchestratorResult<RouteOutcome> {
        let started = Instant::now();
        let text = message.text(" ");
        let mut trace = TraceRecorder::new(self.config.orchestrator.id.clone());
        info!(task_id = %task.id, "Routing task");

        let classification = self.classifier.classify(&text, &mut trace).await;
        self.record_request(task, &text, &classification).await;

        let results = self
            .delegation
            .process(&classification, task, message, &text, &mut trace)
            .await;

        let aggregation = self.aggregator.aggregate(
            &results,
            classification.agents.len(),
            classification.confidence,
            &self.registry,
        )?;
        trace.complete();
        let snapshot = trace.snapshot();

        let metadata = orchestration_metadata(&classification, &results, &aggregation, &snapshot);
        let response_message = Message::new(
            vec![
                Part::named_text(aggregation.text.clone(), RESPONSE_PART),
                Part::data(metadata, Some(METADATA_PART.to_string())),
            ],
            Role::Agent,
        );
        let response_task = task.with_state(aggregation.state);

        self.record_outcome(task, &results, &aggregation).await;

        let elapsed = started.elapsed();
        metrics().request_completed(elapsed, aggregation.escalate);
        info!(
            task_id = %task.id,
            state = %aggregation.state.as_str(),
            consulted = results.len(),
            success_rate = aggregation.success_rate,
            elapsed_ms = elapsed.as_millis() as u64,
            "Task routed"
        );

        Ok(RouteOutcome {
            task: response_task,
            message: response_message,
            classification,
            results,
            aggregation,
            trace: snapshot,
        })
    }

    /// Probe every handler; the in-process handler is always healthy
    pub async fn handler_health(&self) -> Vec<HandlerHealth> {
        let probes = self.registry.handlers().iter().map(|handler| async move {
            let status = match &handler.url {
                Some(url) => self.transport.check_health(url).await,
                None => HealthStatus::Healthy,
            };
            HandlerHealth {
                key: handler.key.clone(),
                name: handler.name.clone(),
                url: handler.url.clone(),
                specialties: handler.specialties.clone(),
                status,
                in_process: handler.url.is_none(),
            }
        });
        join_all(probes).await
    }

    /// Discovery document for this orchestrator
    pub fn agent_card(&self) -> AgentCard {
        let section = &self.config.orchestrator;
        AgentCard::new(&section.name, &section.description, &section.contact)
            .with_url(format!(
                "http://{}:{}{}",
                self.config.server.host, self.config.server.port, TASKS_SEND_PATH
            ))
            .with_specialties(self.registry.keys().map(str::to_string).collect())
    }

    async fn record_request(
        &self,
        task: &Task,
        text: &str,
        classification: &ClassificationResult,
    ) {
        let mut metadata = Map::new();
        metadata.insert(
            "requiresMultipleAgents".to_string(),
            json!(classification.requires_multiple_agents),
        );
        metadata.insert(
            "agentConfidences".to_string(),
            json!(classification.agent_confidences),
        );
        self.persistence
            .create_task(TaskRecord {
                task_id: task.id.clone(),
                initial_query: text.to_string(),
                primary_handler: classification.primary_agent().to_string(),
                assigned_handlers: classification.agents.clone(),
                classification_method: classification.method.as_str().to_string(),
                classification_confidence: classification.confidence,
                classification_reasoning: classification.reasoning.clone(),
                metadata,
            })
            .await;

        let mut metadata = Map::new();
        metadata.insert("classification".to_string(), json!(classification));
        self.persistence
            .log_message(MessageRecord {
                task_id: task.id.clone(),
                message_id: generate_task_id(),
                content: text.to_string(),
                message_type: MessageType::UserQuery,
                sender_type: SenderType::User,
                metadata,
            })
            .await;
    }

    async fn record_outcome(&self, task: &Task, results: &[AgentResult], aggregation: &Aggregation) {
        self.persistence
            .update_task_status(
                &task.id,
                TaskStatusUpdate {
                    status: if aggregation.escalate {
                        FinalStatus::RequiresEscalation
                    } else {
                        FinalStatus::Completed
                    },
                    success_rate: aggregation.success_rate,
                    handlers_consulted: results.len(),
                    successful_handlers: aggregation.successful,
                    failed_handlers: aggregation.failed,
                    escalated: aggregation.escalate,
                    single_handler: aggregation.single_handler,
                    response_length: aggregation.text.chars().count(),
                    completed_at: Utc::now(),
                },
            )
            .await;

        let mut metadata = Map::new();
        metadata.insert("escalated".to_string(), json!(aggregation.escalate));
        metadata.insert("successRate".to_string(), json!(aggregation.success_rate));
        metadata.insert("agentsConsulted".to_string(), json!(results.len()));
        self.persistence
            .log_message(MessageRecord {
                task_id: task.id.clone(),
                message_id: generate_task_id(),
                content: aggregation.text.chars().take(PERSISTED_PREVIEW_CHARS).collect(),
                message_type: MessageType::OrchestratorResponse,
                sender_type: SenderType::Orchestrator,
                metadata,
            })
            .await;
    }
}

/// Data part describing how the answer was produced
fn orchestration_metadata(
    classification: &ClassificationResult,
    results: &[AgentResult],
    aggregation: &Aggregation,
    trace: &TraceSnapshot,
) -> Map<String, Value> {
    let single_agent_mode = classification.agents.len() == 1;
    let active_agent = results
        .first()
        .filter(|r| single_agent_mode && r.success)
        .map(|r| r.agent.clone());

    let agent_sequence: Vec<Value> = results
        .iter()
        .map(|r| json!({ "agent": r.agent, "order": r.order, "success": r.success }))
        .collect();

    let delegation_chain: Vec<Value> = results
        .iter()
        .filter_map(|r| {
            let from = r.delegated_from.as_ref()?;
            let reason = results
                .iter()
                .find(|f| &f.agent == from)
                .and_then(|f| f.delegation_reason.clone());
            Some(json!({ "from": from, "to": r.agent, "reason": reason }))
        })
        .collect();

    let consulted: Vec<&str> = results.iter().map(|r| r.agent.as_str()).collect();
    let successful: Vec<&str> = results
        .iter()
        .filter(|r| r.success)
        .map(|r| r.agent.as_str())
        .collect();
    let failed: Vec<&str> = results
        .iter()
        .filter(|r| !r.success)
        .map(|r| r.agent.as_str())
        .collect();

    let metadata = json!({
        "classification_confidence": classification.confidence,
        "classification_method": classification.method.as_str(),
        "classification_reasoning": classification.reasoning,
        "agent_confidences": classification.agent_confidences,
        "requires_multiple_agents": classification.requires_multiple_agents,
        "success_rate": aggregation.success_rate,
        "agents_consulted": consulted,
        "successful_agents": successful,
        "failed_agents": failed,
        "escalate": aggregation.escalate,
        "active_agent": active_agent,
        "single_agent_mode": single_agent_mode,
        "sequential_mode": true,
        "agent_sequence": agent_sequence,
        "delegation_chain": delegation_chain,
        "thinking_panel": trace,
        "timestamp": Utc::now().to_rfc3339(),
    });

    match metadata {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ErrorCode, TaskSendRequest, TaskState};
    use crate::testing::mocks::{MockHandlerTransport, MockLlmProvider, RecordingPersistence};

    const LEGAL_URL: &str = "http://localhost:5003/a2a/tasks/send";
    const FINANCE_URL: &str = "http://localhost:5004/a2a/tasks/send";

    fn orchestrator(transport: Arc<MockHandlerTransport>) -> Orchestrator {
        Orchestrator::new(
            OrchestratorConfig::test_config(),
            Arc::new(MockLlmProvider::single_response("Hello! How can I help?")),
            transport,
        )
    }

    fn request(text: &str) -> Value {
        serde_json::to_value(TaskSendRequest::with_id(
            "req-1",
            Task::new(),
            Message::user_text(text),
        ))
        .unwrap()
    }

    #[tokio::test]
    async fn test_explicit_request_returns_single_handler_verbatim() {
        let transport = Arc::new(MockHandlerTransport::new());
        transport
            .respond(LEGAL_URL, "The NDA is mutual and enforceable.")
            .await;
        let orchestrator = orchestrator(transport.clone());

        let response = orchestrator
            .handle_request(&request("Please ask the legal agent to review my NDA"))
            .await;

        let result = response.result.expect("success response");
        assert_eq!(response.id, "req-1");
        assert_eq!(result.task.state, TaskState::Completed);
        assert_eq!(result.message.text(" "), "The NDA is mutual and enforceable.");

        let metadata = result.message.data_part(METADATA_PART).unwrap();
        assert_eq!(metadata["classification_method"], "explicit");
        assert_eq!(metadata["active_agent"], "legal");
        assert_eq!(metadata["single_agent_mode"], true);
        assert_eq!(metadata["thinking_panel"]["active"], false);
        assert_eq!(transport.calls().await.len(), 1);
    }

    #[tokio::test]
    async fn test_greeting_uses_generic_handler_in_process() {
        let transport = Arc::new(MockHandlerTransport::new());
        let outcome = orchestrator(transport.clone())
            .route_task(&Task::new(), &Message::user_text("hello"))
            .await
            .unwrap();

        assert_eq!(outcome.classification.agents, vec!["general"]);
        assert_eq!(outcome.message.text(" "), "Hello! How can I help?");
        assert!(!outcome.aggregation.escalate);
        assert!(transport.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_request_never_reaches_handlers() {
        let transport = Arc::new(MockHandlerTransport::new());
        let payload = json!({
            "jsonrpc": "2.0",
            "id": "bad-1",
            "method": "tasks/send",
            "params": { "message": { "role": "user", "parts": [{ "type": "text", "text": "hi" }] } }
        });

        let response = orchestrator(transport.clone()).handle_request(&payload).await;

        assert_eq!(response.id, "bad-1");
        assert_eq!(response.error_code(), Some(ErrorCode::ValidationFailed.code()));
        assert!(transport.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_unparseable_body_is_parse_error() {
        let response = orchestrator(Arc::new(MockHandlerTransport::new()))
            .handle_raw(b"{not json")
            .await;

        assert_eq!(response.id, FALLBACK_ERROR_ID);
        assert_eq!(response.error_code(), Some(ErrorCode::ParseError.code()));
    }

    #[tokio::test]
    async fn test_all_handlers_failing_escalates() {
        let transport = Arc::new(MockHandlerTransport::new());
        let outcome = orchestrator(transport)
            .route_task(
                &Task::new(),
                &Message::user_text("Talk to finance about our EBITDA multiple"),
            )
            .await
            .unwrap();

        assert_eq!(outcome.task.state, TaskState::InputRequired);
        assert!(outcome.aggregation.escalate);
        assert!(outcome.message.text(" ").starts_with("## Escalation Required"));
        let metadata = outcome.message.data_part(METADATA_PART).unwrap();
        assert_eq!(metadata["failed_agents"], json!(["finance"]));
        assert_eq!(metadata["active_agent"], Value::Null);
    }

    #[tokio::test]
    async fn test_persistence_sees_request_lifecycle() {
        let transport = Arc::new(MockHandlerTransport::new());
        transport.respond(FINANCE_URL, "Cash flow is strong.").await;
        let recording = Arc::new(RecordingPersistence::new());
        let orchestrator = orchestrator(transport).with_persistence(recording.clone());
        let task = Task::new();

        orchestrator
            .route_task(&task, &Message::user_text("Ask the finance agent about cash flow"))
            .await
            .unwrap();

        let tasks = recording.tasks().await;
        assert_eq!(tasks[0].task_id, task.id);
        assert_eq!(tasks[0].primary_handler, "finance");
        assert_eq!(tasks[0].classification_method, "explicit");

        let types: Vec<_> = recording
            .messages()
            .await
            .into_iter()
            .map(|m| m.message_type)
            .collect();
        assert_eq!(
            types,
            vec![
                MessageType::UserQuery,
                MessageType::AgentResponse,
                MessageType::OrchestratorResponse
            ]
        );

        let updates = recording.status_updates().await;
        assert_eq!(updates[0].1.status, FinalStatus::Completed);
        assert_eq!(updates[0].1.handlers_consulted, 1);
    }

    #[tokio::test]
    async fn test_handler_health_and_overall_status() {
        let transport = Arc::new(MockHandlerTransport::new());
        transport.set_health(LEGAL_URL, HealthStatus::Unreachable).await;
        let health = orchestrator(transport).handler_health().await;

        assert_eq!(health.len(), 4);
        let general = health.iter().find(|h| h.key == "general").unwrap();
        assert!(general.in_process);
        assert_eq!(general.status, HealthStatus::Healthy);
        assert_eq!(OverallHealth::from_handlers(&health), OverallHealth::Degraded);
    }

    #[test]
    fn test_overall_health_unhealthy_when_no_remote_handler_is_up() {
        let down = |key: &str, in_process: bool, status| HandlerHealth {
            key: key.to_string(),
            name: key.to_string(),
            url: None,
            specialties: vec![],
            status,
            in_process,
        };
        let handlers = [
            down("legal", false, HealthStatus::Unreachable),
            down("general", true, HealthStatus::Healthy),
        ];
        assert_eq!(OverallHealth::from_handlers(&handlers), OverallHealth::Unhealthy);
    }

    #[test]
    fn test_agent_card_advertises_handlers() {
        let card = orchestrator(Arc::new(MockHandlerTransport::new())).agent_card();

        assert_eq!(card.name, "Generalist Orchestrator");
        assert_eq!(card.url.as_deref(), Some("http://0.0.0.0:5001/a2a/tasks/send"));
        assert_eq!(card.specialties, vec!["revenue", "legal", "finance", "general"]);
        assert!(card.supports_tasks_send());
    }
}
