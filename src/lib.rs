//! A2A orchestrator
//!
//! Routes agent-to-agent `tasks/send` requests to specialist handlers and
//! merges their answers into one response.
//!
//! # Overview
//!
//! - Protocol types, JSON-RPC envelope and request validation
//! - Tiered intent classification (explicit, basic, semantic, heuristic)
//! - Sequential handler consultation with response-driven delegation
//! - Sentence-level aggregation with escalation to a human
//! - Per-request decision trace returned with every answer
//!
//! # Quick Start
//!
//! ```rust
//! use a2a_orchestrator::classifier::IntentClassifier;
//! use a2a_orchestrator::config::{OrchestratorConfig, SAMPLE_CONFIG};
//! use a2a_orchestrator::registry::HandlerRegistry;
//! use std::sync::Arc;
//!
//! let config = OrchestratorConfig::from_toml_str(SAMPLE_CONFIG).unwrap();
//! let classifier = IntentClassifier::new(
//!     Arc::new(HandlerRegistry::from_config(&config)),
//!     config.classifier.clone(),
//! );
//!
//! let result = classifier.classify_heuristic("Please review this NDA before we sign");
//! assert_eq!(result.agents, vec!["legal"]);
//! ```

pub mod aggregation;
pub mod classifier;
pub mod config;
pub mod delegation;
pub mod error;
pub mod knowledge;
pub mod llm;
pub mod observability;
pub mod orchestrator;
pub mod persistence;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod testing;
pub mod transport;

pub use classifier::{ClassificationMethod, ClassificationResult, IntentClassifier};
pub use config::OrchestratorConfig;
pub use error::{OrchestratorError, OrchestratorResult};
pub use orchestrator::{Orchestrator, RouteOutcome};
pub use protocol::*;
pub use transport::{HandlerTransport, HttpTransport};
