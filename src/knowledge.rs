//! Knowledge retrieval port
//!
//! Retrieval only enriches the semantic classification prompt and the trace.
//! Its failure never affects routing beyond a trace step.

use crate::observability::trace::{MemoryInsights, TraceSource};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Characters of each item included in the classification prompt
pub const SNIPPET_CHARS: usize = 200;

/// Domain tag used when retrieving context for classification
pub const CLASSIFIER_DOMAIN: &str = "orchestrator";

#[derive(Debug, Clone, Error, PartialEq)]
pub enum KnowledgeError {
    #[error("Knowledge service unavailable: {0}")]
    Unavailable(String),
    #[error("Knowledge query failed: {0}")]
    QueryFailed(String),
}

/// One ranked retrieval hit
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KnowledgeItem {
    pub content: String,
    pub score: f64,
    #[serde(default)]
    pub source_metadata: Map<String, Value>,
}

/// Per-backend breakdown of a retrieval
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KnowledgeSource {
    /// Backend kind, e.g. "vector" or "search"
    pub kind: String,
    pub name: String,
    /// Backend-specific confidence, when it reports one
    #[serde(default)]
    pub confidence: Option<f64>,
    pub results_count: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct KnowledgeResult {
    /// Hits, best first
    pub items: Vec<KnowledgeItem>,
    pub sources: Vec<KnowledgeSource>,
    pub confidence: f64,
    pub response_time_ms: Option<u64>,
    pub memory: Option<MemoryInsights>,
}

impl KnowledgeResult {
    /// Prompt context: the first [`SNIPPET_CHARS`] characters of each item
    pub fn context_snippets(&self) -> Vec<String> {
        self.items
            .iter()
            .map(|item| item.content.chars().take(SNIPPET_CHARS).collect())
            .collect()
    }

    /// Sources with at least one hit, in the shape the trace records
    pub fn trace_sources(&self) -> Vec<TraceSource> {
        self.sources
            .iter()
            .filter(|s| s.results_count > 0)
            .map(|s| TraceSource {
                kind: s.kind.clone(),
                name: s.name.clone(),
                confidence: s.confidence.or(Some(self.confidence)),
                results_count: Some(s.results_count),
                response_time_ms: self.response_time_ms,
            })
            .collect()
    }
}

/// Vector/knowledge retrieval service
#[async_trait]
pub trait KnowledgeRetriever: Send + Sync {
    async fn retrieve(
        &self,
        text: &str,
        domain_tag: &str,
        max_results: usize,
    ) -> Result<KnowledgeResult, KnowledgeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result() -> KnowledgeResult {
        KnowledgeResult {
            items: vec![
                KnowledgeItem {
                    content: "x".repeat(500),
                    score: 0.9,
                    source_metadata: Map::new(),
                },
                KnowledgeItem {
                    content: "EBITDA multiples for SaaS".to_string(),
                    score: 0.7,
                    source_metadata: Map::new(),
                },
            ],
            sources: vec![
                KnowledgeSource {
                    kind: "vector".to_string(),
                    name: "Knowledge Base".to_string(),
                    confidence: None,
                    results_count: 2,
                },
                KnowledgeSource {
                    kind: "search".to_string(),
                    name: "Real-time Search".to_string(),
                    confidence: Some(0.6),
                    results_count: 0,
                },
            ],
            confidence: 0.8,
            response_time_ms: Some(42),
            memory: None,
        }
    }

    #[test]
    fn test_context_snippets_are_truncated() {
        let snippets = result().context_snippets();

        assert_eq!(snippets[0].chars().count(), SNIPPET_CHARS);
        assert_eq!(snippets[1], "EBITDA multiples for SaaS");
    }

    #[test]
    fn test_trace_sources_skip_empty_backends() {
        let sources = result().trace_sources();

        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].kind, "vector");
        assert_eq!(sources[0].results_count, Some(2));
        assert_eq!(sources[0].confidence, Some(0.8));
        assert_eq!(sources[0].response_time_ms, Some(42));
    }
}
