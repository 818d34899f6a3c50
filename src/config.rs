//! Orchestrator configuration
//!
//! Loaded from a TOML file. Secrets are never stored in the file; the file
//! names the environment variables that hold them and they are resolved at
//! runtime.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Key of the in-process generic handler unless configured otherwise
pub const DEFAULT_GENERIC_HANDLER: &str = "general";

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrchestratorConfig {
    pub orchestrator: OrchestratorSection,
    #[serde(default)]
    pub server: ServerSection,
    pub llm: LlmSection,
    #[serde(default)]
    pub classifier: ClassifierSection,
    #[serde(default)]
    pub delegation: DelegationSection,
    #[serde(default)]
    pub escalation: EscalationSection,
    #[serde(default)]
    pub transport: TransportSection,
    /// Handler table, in declaration order
    #[serde(default)]
    pub handlers: Vec<HandlerConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrchestratorSection {
    /// Identifier used in logs and interaction records
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(default = "default_contact")]
    pub contact: String,
    /// Handler that runs in-process and absorbs unclassified requests
    #[serde(default = "default_generic_handler")]
    pub generic_handler: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LlmSection {
    /// Provider name, currently "openai"
    pub provider: String,
    pub model: String,
    /// Environment variable containing the API key
    pub api_key_env: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_llm_temperature")]
    pub temperature: f32,
    #[serde(default = "default_llm_max_tokens")]
    pub max_tokens: u32,
}

/// Classifier thresholds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClassifierSection {
    /// Minimum semantic confidence for a handler to be accepted
    #[serde(default = "default_accept_threshold")]
    pub accept_threshold: f64,
    /// Semantic confidence at which the heuristic tier is skipped
    #[serde(default = "default_confident_threshold")]
    pub confident_threshold: f64,
    /// Confidence assigned when falling back to the generic handler
    #[serde(default = "default_generic_confidence")]
    pub default_confidence: f64,
    #[serde(default = "default_knowledge_max_results")]
    pub knowledge_max_results: usize,
}

impl Default for ClassifierSection {
    fn default() -> Self {
        Self {
            accept_threshold: default_accept_threshold(),
            confident_threshold: default_confident_threshold(),
            default_confidence: default_generic_confidence(),
            knowledge_max_results: default_knowledge_max_results(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DelegationSection {
    /// Per-call handler timeout in milliseconds
    #[serde(default = "default_handler_timeout_ms")]
    pub timeout_ms: u64,
    /// Upper bound on consultations per request
    #[serde(default = "default_max_hops")]
    pub max_hops: usize,
}

impl Default for DelegationSection {
    fn default() -> Self {
        Self {
            timeout_ms: default_handler_timeout_ms(),
            max_hops: default_max_hops(),
        }
    }
}

impl DelegationSection {
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EscalationSection {
    #[serde(default = "default_generic_confidence")]
    pub confidence_threshold: f64,
    #[serde(default = "default_success_rate_threshold")]
    pub success_rate_threshold: f64,
}

impl Default for EscalationSection {
    fn default() -> Self {
        Self {
            confidence_threshold: default_generic_confidence(),
            success_rate_threshold: default_success_rate_threshold(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TransportSection {
    /// Environment variable holding the bearer token sent to handlers
    #[serde(default)]
    pub auth_token_env: Option<String>,
}

/// One entry of the handler table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HandlerConfig {
    /// Routing key, e.g. "legal"
    pub key: String,
    /// Display name, e.g. "Legal Agent"
    pub name: String,
    /// `tasks/send` endpoint; absent for the in-process generic handler
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub specialties: Vec<String>,
}

fn default_contact() -> String {
    "n/a".to_string()
}

fn default_generic_handler() -> String {
    DEFAULT_GENERIC_HANDLER.to_string()
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5001
}

fn default_llm_temperature() -> f32 {
    0.1
}

fn default_llm_max_tokens() -> u32 {
    800
}

fn default_accept_threshold() -> f64 {
    0.3
}

fn default_confident_threshold() -> f64 {
    0.7
}

fn default_generic_confidence() -> f64 {
    0.4
}

fn default_knowledge_max_results() -> usize {
    3
}

fn default_handler_timeout_ms() -> u64 {
    30_000
}

fn default_max_hops() -> usize {
    16
}

fn default_success_rate_threshold() -> f64 {
    0.5
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),
    #[error("Invalid handler key: {0}")]
    InvalidHandlerKey(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl OrchestratorConfig {
    /// Load and validate configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: OrchestratorConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field consistency of the handler table and thresholds
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = std::collections::HashSet::new();
        for handler in &self.handlers {
            validate_handler_key(&handler.key)?;
            if !seen.insert(handler.key.as_str()) {
                return Err(ConfigError::InvalidConfig(format!(
                    "Handler '{}' is declared more than once",
                    handler.key
                )));
            }

            let is_generic = handler.key == self.orchestrator.generic_handler;
            match (&handler.url, is_generic) {
                (Some(_), true) => {
                    return Err(ConfigError::InvalidConfig(format!(
                        "Generic handler '{}' runs in-process and must not have a url",
                        handler.key
                    )));
                }
                (None, false) => {
                    return Err(ConfigError::InvalidConfig(format!(
                        "Handler '{}' requires a url",
                        handler.key
                    )));
                }
                (Some(url), false) => {
                    url::Url::parse(url).map_err(|e| {
                        ConfigError::InvalidConfig(format!(
                            "Handler '{}' has an invalid url '{url}': {e}",
                            handler.key
                        ))
                    })?;
                }
                (None, true) => {}
            }
        }

        if !seen.contains(self.orchestrator.generic_handler.as_str()) {
            return Err(ConfigError::InvalidConfig(format!(
                "Generic handler '{}' is not declared in [[handlers]]",
                self.orchestrator.generic_handler
            )));
        }

        let thresholds = [
            ("classifier.accept_threshold", self.classifier.accept_threshold),
            (
                "classifier.confident_threshold",
                self.classifier.confident_threshold,
            ),
            (
                "classifier.default_confidence",
                self.classifier.default_confidence,
            ),
            (
                "escalation.confidence_threshold",
                self.escalation.confidence_threshold,
            ),
            (
                "escalation.success_rate_threshold",
                self.escalation.success_rate_threshold,
            ),
        ];
        for (name, value) in thresholds {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidConfig(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }

        if self.delegation.max_hops == 0 {
            return Err(ConfigError::InvalidConfig(
                "delegation.max_hops must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// LLM API key from its environment variable
    pub fn get_llm_api_key(&self) -> Result<String, ConfigError> {
        std::env::var(&self.llm.api_key_env)
            .map_err(|_| ConfigError::EnvVarNotFound(self.llm.api_key_env.clone()))
    }

    /// Bearer token for handler calls, when one is configured and set
    pub fn get_auth_token(&self) -> Option<String> {
        self.transport
            .auth_token_env
            .as_ref()
            .and_then(|name| std::env::var(name).ok())
    }

    /// Configuration matching the stock handler set, used by tests
    #[cfg(test)]
    pub fn test_config() -> Self {
        toml::from_str(SAMPLE_CONFIG).expect("Test config should parse")
    }
}

/// Validate handler key format (`[a-zA-Z0-9._-]+`)
fn validate_handler_key(key: &str) -> Result<(), ConfigError> {
    let valid_chars = key
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-');

    if key.is_empty() || !valid_chars {
        return Err(ConfigError::InvalidHandlerKey(format!(
            "Handler key '{key}' must match pattern [a-zA-Z0-9._-]+"
        )));
    }

    Ok(())
}

/// Sample configuration with the stock handler set
pub const SAMPLE_CONFIG: &str = r#"
[orchestrator]
id = "orchestrator"
name = "Generalist Orchestrator"
description = "Routes business questions to revenue, legal and finance specialists"
contact = "hello@example.com"

[server]
port = 5001

[llm]
provider = "openai"
model = "gpt-4o-mini"
api_key_env = "OPENAI_API_KEY"

[delegation]
timeout_ms = 30000

[[handlers]]
key = "revenue"
name = "Revenue Agent"
url = "http://localhost:5002/a2a/tasks/send"
specialties = ["growth", "revenue", "business", "sales", "optimization", "strategy", "marketplace"]

[[handlers]]
key = "legal"
name = "Legal Agent"
url = "http://localhost:5003/a2a/tasks/send"
specialties = ["compliance", "contracts", "nda", "regulations", "due-diligence"]

[[handlers]]
key = "finance"
name = "Finance Agent"
url = "http://localhost:5004/a2a/tasks/send"
specialties = ["ebitda", "multiples", "tax", "financial-analysis", "cash-flow"]

[[handlers]]
key = "general"
name = "Generalist Agent"
specialties = ["smalltalk", "faq", "task-management", "knowledge"]
"#;
