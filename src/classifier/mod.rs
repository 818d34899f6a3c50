//! Intent classification
//!
//! Decides which handlers a request goes to, trying cheap tiers first:
//!
//! 1. explicit requests for a handler by name
//! 2. basic conversational messages, answered by the generic handler
//! 3. semantic classification through a [`SemanticClassifier`]
//! 4. weighted keyword heuristics, alone or combined with tier 3
//!
//! Classification never fails: a semantic tier error degrades to the
//! heuristic tier, and an empty selection degrades to the generic handler.

pub mod rules;
pub mod semantic;

pub use semantic::{LlmSemanticClassifier, SemanticClassificationOutput};

use crate::classification_span;
use crate::config::ClassifierSection;
use crate::knowledge::{KnowledgeRetriever, CLASSIFIER_DOMAIN};
use crate::llm::provider::LlmError;
use crate::observability::metrics::metrics;
use crate::observability::trace::{StepStatus, TraceRecorder, TraceStatus};
use crate::registry::HandlerRegistry;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn, Instrument};

const SEMANTIC_DEFAULT_CONFIDENCE: f64 = 0.5;
const SEMANTIC_DEFAULT_REASONING: &str = "AI semantic analysis with sequential thinking";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationMethod {
    Explicit,
    AiSequential,
    Hybrid,
    Regex,
    RegexBasic,
    BasicDetection,
}

impl ClassificationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClassificationMethod::Explicit => "explicit",
            ClassificationMethod::AiSequential => "ai_sequential",
            ClassificationMethod::Hybrid => "hybrid",
            ClassificationMethod::Regex => "regex",
            ClassificationMethod::RegexBasic => "regex_basic",
            ClassificationMethod::BasicDetection => "basic_detection",
        }
    }
}

impl std::fmt::Display for ClassificationMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Routing decision for one request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClassificationResult {
    /// Handler keys in consultation order; never empty
    pub agents: Vec<String>,
    pub confidence: f64,
    pub reasoning: String,
    pub method: ClassificationMethod,
    pub agent_confidences: BTreeMap<String, f64>,
    pub requires_multiple_agents: bool,
}

impl ClassificationResult {
    fn single(agent: &str, confidence: f64, reasoning: impl Into<String>, method: ClassificationMethod) -> Self {
        let confidence = confidence.clamp(0.0, 1.0);
        Self {
            agents: vec![agent.to_string()],
            confidence,
            reasoning: reasoning.into(),
            method,
            agent_confidences: BTreeMap::from([(agent.to_string(), confidence)]),
            requires_multiple_agents: false,
        }
    }

    pub fn primary_agent(&self) -> &str {
        self.agents.first().map(String::as_str).unwrap_or_default()
    }
}

/// Reply of the semantic classification service
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SemanticClassification {
    pub agents: Vec<String>,
    pub agent_confidences: BTreeMap<String, f64>,
    pub overall_confidence: Option<f64>,
    pub reasoning: Option<String>,
    pub requires_multiple_agents: bool,
}

#[derive(Debug, Clone, Error)]
pub enum ClassificationError {
    #[error("Semantic classifier unavailable: {0}")]
    Unavailable(String),
    #[error("Invalid classifier output: {0}")]
    InvalidOutput(String),
    #[error(transparent)]
    Llm(#[from] LlmError),
}

/// External semantic classification service
#[async_trait]
pub trait SemanticClassifier: Send + Sync {
    /// Per-handler confidences for `text`, optionally informed by `context`
    async fn classify(
        &self,
        text: &str,
        context: &[String],
    ) -> Result<SemanticClassification, ClassificationError>;
}

/// Semantic verdict after filtering to accepted, registered handlers
struct AcceptedSemantic {
    agents: Vec<String>,
    agent_confidences: BTreeMap<String, f64>,
    best: f64,
    confidence: f64,
    reasoning: String,
}

/// Tiered classifier; cheap to share between concurrent requests
pub struct IntentClassifier {
    registry: Arc<HandlerRegistry>,
    settings: ClassifierSection,
    semantic: Option<Arc<dyn SemanticClassifier>>,
    knowledge: Option<Arc<dyn KnowledgeRetriever>>,
}

impl IntentClassifier {
    pub fn new(registry: Arc<HandlerRegistry>, settings: ClassifierSection) -> Self {
        Self {
            registry,
            settings,
            semantic: None,
            knowledge: None,
        }
    }

    pub fn with_semantic(mut self, semantic: Arc<dyn SemanticClassifier>) -> Self {
        self.semantic = Some(semantic);
        self
    }

    pub fn with_knowledge(mut self, knowledge: Arc<dyn KnowledgeRetriever>) -> Self {
        self.knowledge = Some(knowledge);
        self
    }

    pub async fn classify(&self, text: &str, trace: &mut TraceRecorder) -> ClassificationResult {
        let span = classification_span!(chars = text.chars().count());
        let result = self.classify_tiers(text, trace).instrument(span).await;
        metrics().classification(result.method.as_str());
        trace.set_confidence(result.confidence);
        info!(
            agents = ?result.agents,
            confidence = result.confidence,
            method = %result.method,
            "Intent classified"
        );
        result
    }

    async fn classify_tiers(&self, text: &str, trace: &mut TraceRecorder) -> ClassificationResult {
        let generic = self.registry.generic_key();

        trace.add_step(
            "Checking for explicit agent requests in user query...",
            StepStatus::Completed,
        );
        if let Some(handler) = rules::detect_explicit(text, &self.registry) {
            trace.add_step(
                format!("Found explicit request for {handler} agent"),
                StepStatus::Completed,
            );
            return ClassificationResult::single(
                handler,
                1.0,
                format!("User explicitly requested {handler} agent"),
                ClassificationMethod::Explicit,
            );
        }
        trace.add_step(
            "No explicit agent found, analyzing query semantically...",
            StepStatus::Completed,
        );

        if rules::is_basic_message(text) {
            trace.add_step(
                "Basic conversational message detected - skipping knowledge retrieval",
                StepStatus::Completed,
            );
            return ClassificationResult::single(
                generic,
                self.settings.default_confidence,
                "Basic conversational message - no business expertise or knowledge retrieval needed",
                ClassificationMethod::BasicDetection,
            );
        }

        let Some(semantic) = &self.semantic else {
            debug!("No semantic classifier configured");
            trace.add_step(
                "Semantic classification unavailable, using regex patterns...",
                StepStatus::Completed,
            );
            return self.classify_heuristic(text);
        };

        trace.add_step(
            "Consulting AI for semantic intent classification...",
            StepStatus::Completed,
        );
        let context = self.gather_context(text, trace).await;

        trace.set_status(TraceStatus::Retrieving);
        trace.add_step(
            "Performing AI-enhanced semantic classification...",
            StepStatus::Active,
        );

        match semantic.classify(text, &context).await {
            Ok(classification) => {
                let accepted = self.accept_semantic(classification);
                if accepted.best >= self.settings.confident_threshold {
                    trace.add_step(
                        format!(
                            "AI classification confident ({:.2}): {}",
                            accepted.best,
                            accepted.agents.join(", ")
                        ),
                        StepStatus::Completed,
                    );
                    let requires_multiple_agents = accepted.agents.len() > 1;
                    return ClassificationResult {
                        agents: accepted.agents,
                        confidence: accepted.confidence,
                        reasoning: accepted.reasoning,
                        method: ClassificationMethod::AiSequential,
                        agent_confidences: accepted.agent_confidences,
                        requires_multiple_agents,
                    };
                }

                trace.add_step(
                    format!(
                        "AI confidence {:.2} below threshold, using regex fallback",
                        accepted.best
                    ),
                    StepStatus::Completed,
                );
                let hybrid = self.combine(accepted, self.score_heuristic(text));
                trace.add_step(
                    format!("Hybrid classification complete: {}", hybrid.agents.join(", ")),
                    StepStatus::Completed,
                );
                hybrid
            }
            Err(e) => {
                warn!(error = %e, "Semantic classification failed, using regex fallback");
                let mut metadata = Map::new();
                metadata.insert("error".to_string(), json!(e.to_string()));
                trace.add_step_with_metadata(
                    "AI classification failed, falling back to regex patterns...",
                    StepStatus::Error,
                    metadata,
                );
                self.classify_heuristic(text)
            }
        }
    }

    /// Knowledge snippets for the semantic prompt; empty when retrieval fails
    async fn gather_context(&self, text: &str, trace: &mut TraceRecorder) -> Vec<String> {
        let Some(knowledge) = &self.knowledge else {
            return Vec::new();
        };

        trace.add_step(
            "Gathering relevant context from knowledge base...",
            StepStatus::Active,
        );
        trace.set_status(TraceStatus::Searching);

        match knowledge
            .retrieve(text, CLASSIFIER_DOMAIN, self.settings.knowledge_max_results)
            .await
        {
            Ok(result) if !result.items.is_empty() => {
                let mut metadata = Map::new();
                metadata.insert("resultsCount".to_string(), json!(result.items.len()));
                metadata.insert("confidence".to_string(), json!(result.confidence));
                trace.add_step_with_metadata(
                    format!(
                        "Found {} relevant context items (confidence: {:.2})",
                        result.items.len(),
                        result.confidence
                    ),
                    StepStatus::Completed,
                    metadata,
                );
                trace.add_sources(result.trace_sources());
                if let Some(memory) = result.memory.clone() {
                    trace.add_memory_insights(memory);
                }
                result.context_snippets()
            }
            Ok(_) => {
                trace.add_step(
                    "No relevant context found in knowledge base",
                    StepStatus::Completed,
                );
                Vec::new()
            }
            Err(e) => {
                warn!(error = %e, "Knowledge retrieval failed during classification");
                let mut metadata = Map::new();
                metadata.insert("error".to_string(), json!(e.to_string()));
                trace.add_step_with_metadata(
                    "Knowledge retrieval failed, proceeding with basic classification",
                    StepStatus::Error,
                    metadata,
                );
                Vec::new()
            }
        }
    }

    fn accept_semantic(&self, classification: SemanticClassification) -> AcceptedSemantic {
        let threshold = self.settings.accept_threshold;
        let mut agents = Vec::new();
        let mut agent_confidences = BTreeMap::new();

        for agent in classification.agents {
            let Some(confidence) = classification.agent_confidences.get(&agent).copied() else {
                continue;
            };
            let confidence = confidence.clamp(0.0, 1.0);
            if confidence >= threshold
                && self.registry.contains(&agent)
                && !agents.contains(&agent)
            {
                agent_confidences.insert(agent.clone(), confidence);
                agents.push(agent);
            }
        }

        let mut reasoning = classification
            .reasoning
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| SEMANTIC_DEFAULT_REASONING.to_string());

        if agents.is_empty() {
            let generic = self.registry.generic_key().to_string();
            agent_confidences.insert(generic.clone(), self.settings.default_confidence);
            agents.push(generic);
            reasoning.push_str(" (defaulted to general conversation)");
        }

        let best = agent_confidences.values().copied().fold(0.0, f64::max);
        let confidence = classification
            .overall_confidence
            .unwrap_or(SEMANTIC_DEFAULT_CONFIDENCE)
            .clamp(0.0, 1.0);

        AcceptedSemantic {
            agents,
            agent_confidences,
            best,
            confidence,
            reasoning,
        }
    }

    fn combine(&self, ai: AcceptedSemantic, regex: ClassificationResult) -> ClassificationResult {
        let specialist_matched = regex.agents.iter().any(|a| !self.registry.is_generic(a));
        let agents = if specialist_matched {
            regex.agents.clone()
        } else {
            ai.agents.clone()
        };

        let agent_confidences: BTreeMap<String, f64> = agents
            .iter()
            .map(|agent| {
                let from_ai = ai.agent_confidences.get(agent).copied().unwrap_or(0.0);
                let from_regex = regex.agent_confidences.get(agent).copied().unwrap_or(0.0);
                (agent.clone(), from_ai.max(from_regex))
            })
            .collect();

        ClassificationResult {
            requires_multiple_agents: agents.len() > 1,
            agents,
            confidence: ai.confidence.max(regex.confidence).clamp(0.0, 1.0),
            reasoning: format!(
                "Hybrid classification: {} + {}",
                ai.reasoning, regex.reasoning
            ),
            method: ClassificationMethod::Hybrid,
            agent_confidences,
        }
    }

    /// Deterministic classification using only the heuristic tier
    pub fn classify_heuristic(&self, text: &str) -> ClassificationResult {
        if rules::is_basic_message(text) {
            return ClassificationResult::single(
                self.registry.generic_key(),
                self.settings.default_confidence,
                "Basic conversational message - no business expertise needed",
                ClassificationMethod::RegexBasic,
            );
        }
        self.score_heuristic(text)
    }

    fn score_heuristic(&self, text: &str) -> ClassificationResult {
        let scores = rules::score_handlers(text, &self.registry);
        if scores.is_empty() {
            return ClassificationResult::single(
                self.registry.generic_key(),
                self.settings.default_confidence,
                "Regex pattern matching",
                ClassificationMethod::Regex,
            );
        }

        let confidence = scores.iter().map(|(_, w)| *w).fold(0.0, f64::max);
        ClassificationResult {
            agents: scores.iter().map(|(agent, _)| agent.clone()).collect(),
            confidence: confidence.clamp(0.0, 1.0),
            reasoning: "Regex pattern matching".to_string(),
            method: ClassificationMethod::Regex,
            requires_multiple_agents: scores.len() > 1,
            agent_confidences: scores.into_iter().collect(),
        }
    }
}
