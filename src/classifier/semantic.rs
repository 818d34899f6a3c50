//! LLM-backed semantic classification
//!
//! The model sees the handler catalog, optional knowledge context, and the
//! user query, and answers with per-handler confidences. The reply shape is
//! described by [`SemanticClassificationOutput`]; OpenAI receives it as a
//! JSON schema via `response_format`, other providers get it in the prompt.

use crate::classifier::{ClassificationError, SemanticClassification, SemanticClassifier};
use crate::llm::provider::{
    ChatMessage, CompletionRequest, JsonSchemaDefinition, LlmProvider, ResponseFormat,
};
use crate::registry::{HandlerDescriptor, HandlerRegistry};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

const SYSTEM_PROMPT: &str = "You are an intelligent intent classifier for a business marketplace. \
Decide which specialist handlers should answer the user's query and reply with JSON only.";

/// Structured reply expected from the model
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SemanticClassificationOutput {
    /// Handler keys, most relevant first
    pub agents: Vec<String>,

    /// Confidence in [0, 1] per handler key
    #[serde(default)]
    pub agent_confidences: BTreeMap<String, f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overall_confidence: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,

    #[serde(default)]
    pub requires_multiple_agents: bool,

    /// Intermediate reasoning steps, for observability only
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub thinking_steps: Vec<String>,
}

impl SemanticClassificationOutput {
    pub fn json_schema() -> serde_json::Value {
        let schema = schemars::schema_for!(SemanticClassificationOutput);
        serde_json::to_value(schema).unwrap_or_default()
    }
}

impl From<SemanticClassificationOutput> for SemanticClassification {
    fn from(output: SemanticClassificationOutput) -> Self {
        Self {
            agents: output.agents,
            agent_confidences: output.agent_confidences,
            overall_confidence: output.overall_confidence,
            reasoning: output.reasoning,
            requires_multiple_agents: output.requires_multiple_agents,
        }
    }
}

/// [`SemanticClassifier`] over an [`LlmProvider`]
pub struct LlmSemanticClassifier {
    provider: Arc<dyn LlmProvider>,
    model: String,
    temperature: f32,
    max_tokens: u32,
    specialists: Vec<HandlerDescriptor>,
    generic_key: String,
}

impl LlmSemanticClassifier {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        model: impl Into<String>,
        registry: &HandlerRegistry,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.1,
            max_tokens: 800,
            specialists: registry.specialists().cloned().collect(),
            generic_key: registry.generic_key().to_string(),
        }
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    fn format_catalog(&self) -> String {
        self.specialists
            .iter()
            .enumerate()
            .map(|(i, handler)| {
                let specialties = if handler.specialties.is_empty() {
                    "general expertise".to_string()
                } else {
                    handler.specialties.join(", ")
                };
                format!(
                    "{}. {} (key: \"{}\") - {}",
                    i + 1,
                    handler.name.to_uppercase(),
                    handler.key,
                    specialties
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn format_context(context: &[String]) -> String {
        if context.is_empty() {
            return String::new();
        }
        let items: Vec<String> = context
            .iter()
            .enumerate()
            .map(|(i, snippet)| format!("{}. {}...", i + 1, snippet))
            .collect();
        format!("\n\nRELEVANT CONTEXT FROM KNOWLEDGE BASE:\n{}\n", items.join("\n"))
    }

    fn build_prompt(&self, text: &str, context: &[String]) -> String {
        format!(
            r#"BASIC CONVERSATIONAL MESSAGES (greetings, small talk, acknowledgements, questions about the platform) need no specialist: answer with the "{generic}" handler and a confidence between 0.3 and 0.5.

AVAILABLE SPECIALIST HANDLERS (only for business-specific queries):
{catalog}{context}

Think step by step:
STEP 1 - Is this a basic conversational message? If so, classify as "{generic}".
STEP 2 - Break the query into its core components and key business terms.
STEP 3 - Map each component to the handler whose specialties cover it; decide whether several handlers are needed.
STEP 4 - Assess a confidence in [0, 1] for every handler you select.
STEP 5 - Give the final classification with your reasoning.

Respond with a JSON object:
{{"agents": ["key"], "agentConfidences": {{"key": 0.0}}, "overallConfidence": 0.0, "reasoning": "...", "requiresMultipleAgents": false, "thinkingSteps": ["..."]}}

USER QUERY: "{text}""#,
            generic = self.generic_key,
            catalog = self.format_catalog(),
            context = Self::format_context(context),
            text = text,
        )
    }

    fn build_completion_request(&self, text: &str, context: &[String]) -> CompletionRequest {
        let mut request = CompletionRequest::new(
            self.model.clone(),
            vec![
                ChatMessage::system(SYSTEM_PROMPT),
                ChatMessage::user(self.build_prompt(text, context)),
            ],
        )
        .with_sampling(self.temperature, self.max_tokens);

        if self.provider.name() == "openai" {
            request.response_format = Some(ResponseFormat::JsonSchema {
                json_schema: JsonSchemaDefinition {
                    name: "intent_classification".to_string(),
                    strict: None,
                    schema: SemanticClassificationOutput::json_schema(),
                },
            });
        }

        request
    }
}

/// The JSON object inside a model reply
///
/// Prefers a fenced ```` ```json ```` block, otherwise the span from the first
/// `{` to the last `}`.
pub fn extract_json(content: &str) -> Option<&str> {
    if let Some(start) = content.find("```json") {
        let body = &content[start + "```json".len()..];
        if let Some(end) = body.find("```") {
            return Some(body[..end].trim());
        }
    }

    let start = content.find('{')?;
    let end = content.rfind('}')?;
    (end > start).then(|| &content[start..=end])
}

pub fn parse_output(content: &str) -> Result<SemanticClassificationOutput, ClassificationError> {
    let json = extract_json(content).ok_or_else(|| {
        ClassificationError::InvalidOutput("no JSON object in model reply".to_string())
    })?;

    serde_json::from_str(json).map_err(|e| {
        warn!(error = %e, response = %content, "Failed to parse semantic classification");
        ClassificationError::InvalidOutput(format!("Failed to parse classification: {e}"))
    })
}

#[async_trait]
impl SemanticClassifier for LlmSemanticClassifier {
    async fn classify(
        &self,
        text: &str,
        context: &[String],
    ) -> Result<SemanticClassification, ClassificationError> {
        let request = self.build_completion_request(text, context);
        debug!(
            model = %self.model,
            context_items = context.len(),
            "Requesting semantic classification"
        );

        let response = self.provider.complete(request).await?;
        let content = response.content.ok_or_else(|| {
            ClassificationError::InvalidOutput("No content in LLM response".to_string())
        })?;

        let output = parse_output(&content)?;
        info!(
            agents = ?output.agents,
            overall_confidence = ?output.overall_confidence,
            "Parsed semantic classification"
        );

        Ok(output.into())
    }
}
