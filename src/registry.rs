//! Handler registry
//!
//! The fixed, ordered table of handlers the router can consult. Built once
//! from configuration and read-only afterwards, so it is shared by reference
//! across concurrent requests.

use crate::config::{HandlerConfig, OrchestratorConfig};
use serde::Serialize;

/// One consultable handler
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HandlerDescriptor {
    pub key: String,
    pub name: String,
    /// `tasks/send` endpoint; `None` for the in-process generic handler
    pub url: Option<String>,
    pub specialties: Vec<String>,
}

impl HandlerDescriptor {
    pub fn is_remote(&self) -> bool {
        self.url.is_some()
    }
}

impl From<&HandlerConfig> for HandlerDescriptor {
    fn from(config: &HandlerConfig) -> Self {
        Self {
            key: config.key.clone(),
            name: config.name.clone(),
            url: config.url.clone(),
            specialties: config.specialties.clone(),
        }
    }
}

/// Ordered handler table with a designated generic handler
///
/// # Examples
/// ```
/// use a2a_orchestrator::config::{OrchestratorConfig, SAMPLE_CONFIG};
/// use a2a_orchestrator::registry::HandlerRegistry;
///
/// let config = OrchestratorConfig::from_toml_str(SAMPLE_CONFIG).unwrap();
/// let registry = HandlerRegistry::from_config(&config);
///
/// assert_eq!(registry.generic_key(), "general");
/// assert_eq!(registry.display_name("legal"), "Legal Agent");
/// assert!(!registry.contains("marketing"));
/// ```
#[derive(Debug, Clone)]
pub struct HandlerRegistry {
    handlers: Vec<HandlerDescriptor>,
    generic_key: String,
}

impl HandlerRegistry {
    pub fn new(handlers: Vec<HandlerDescriptor>, generic_key: impl Into<String>) -> Self {
        Self {
            handlers,
            generic_key: generic_key.into(),
        }
    }

    pub fn from_config(config: &OrchestratorConfig) -> Self {
        Self::new(
            config.handlers.iter().map(HandlerDescriptor::from).collect(),
            config.orchestrator.generic_handler.clone(),
        )
    }

    pub fn get(&self, key: &str) -> Option<&HandlerDescriptor> {
        self.handlers.iter().find(|h| h.key == key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Handlers in declaration order
    pub fn handlers(&self) -> &[HandlerDescriptor] {
        &self.handlers
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.handlers.iter().map(|h| h.key.as_str())
    }

    /// Handlers other than the generic one, in declaration order
    pub fn specialists(&self) -> impl Iterator<Item = &HandlerDescriptor> {
        self.handlers.iter().filter(move |h| h.key != self.generic_key)
    }

    pub fn generic_key(&self) -> &str {
        &self.generic_key
    }

    pub fn is_generic(&self, key: &str) -> bool {
        key == self.generic_key
    }

    /// Position of a handler in the table, used to order findings
    pub fn position(&self, key: &str) -> Option<usize> {
        self.handlers.iter().position(|h| h.key == key)
    }

    /// Display name, falling back to the key for unknown handlers
    pub fn display_name(&self, key: &str) -> String {
        self.get(key)
            .map(|h| h.name.clone())
            .unwrap_or_else(|| key.to_string())
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
