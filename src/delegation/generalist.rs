//! In-process generic handler
//!
//! Answers general queries and small talk directly through the LLM provider
//! instead of a remote handler.

use crate::llm::provider::{ChatMessage, CompletionRequest, LlmError, LlmProvider};
use std::sync::Arc;
use tracing::debug;

const SYSTEM_PROMPT: &str = "You are the Generalist Agent, part of a larger system of specialist \
agents (Finance, Legal, Revenue). Handle general queries, provide helpful information, manage \
simple tasks, and engage in small talk. Be helpful, concise, and clear. If you cannot fulfill a \
request, explain why and suggest what you can do.";

const FALLBACK_PROMPT: &str = "Hello, how can I help you today?";

pub struct GeneralistHandler {
    provider: Arc<dyn LlmProvider>,
    model: String,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

impl GeneralistHandler {
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = Some(temperature);
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Reply to `text`; an empty query is answered as a greeting
    pub async fn respond(&self, text: &str) -> Result<String, LlmError> {
        let prompt = if text.trim().is_empty() {
            FALLBACK_PROMPT
        } else {
            text
        };

        let mut request = CompletionRequest::new(
            self.model.clone(),
            vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(prompt)],
        );
        request.temperature = self.temperature;
        request.max_tokens = self.max_tokens;

        debug!(model = %self.model, "Generalist handling request");
        let response = self.provider.complete(request).await?;

        response
            .content
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| LlmError::InvalidResponse("Generalist returned no content".to_string()))
    }
}
