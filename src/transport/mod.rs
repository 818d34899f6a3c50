//! Handler transport
//!
//! The router reaches remote handlers only through [`HandlerTransport`], so
//! delegation can run against an in-memory mock as easily as over HTTP.

use crate::protocol::{AgentCard, Message, Task, TaskSendResult, AGENT_CARD_PATH};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub mod http;

pub use http::{HttpTransport, TaskSubscription};

/// Path suffix every handler serves `tasks/send` under
pub const TASKS_SEND_PATH: &str = "/a2a/tasks/send";

/// Path of the handler health probe
pub const HEALTH_PATH: &str = "/health";

#[derive(Debug, Clone, Error, PartialEq)]
pub enum TransportError {
    #[error("Request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("HTTP error {status}: {message}")]
    HttpStatus { status: u16, message: String },
    #[error("Network error: {0}")]
    Network(String),
    #[error("Invalid A2A response: {0}")]
    InvalidResponse(String),
    /// The handler answered with a JSON-RPC error object
    #[error("Remote error {code}: {message}")]
    Remote { code: i32, message: String },
    #[error("Subscription error: {0}")]
    Subscription(String),
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl TransportError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout { .. })
    }
}

/// Result of a health probe
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
    Unreachable,
}

/// Request/response channel to remote handlers
#[async_trait]
pub trait HandlerTransport: Send + Sync {
    /// Send one `tasks/send` request and wait at most `timeout` for the reply
    async fn send_task(
        &self,
        url: &str,
        task: &Task,
        message: &Message,
        timeout: Duration,
    ) -> Result<TaskSendResult, TransportError>;

    /// Fetch the discovery document served under `base_url`
    async fn fetch_agent_card(&self, base_url: &str) -> Result<AgentCard, TransportError>;

    /// Probe the health endpoint that belongs to a `tasks/send` URL
    async fn check_health(&self, url: &str) -> HealthStatus;
}

/// Health URL for a handler's `tasks/send` URL
///
/// ```
/// use a2a_orchestrator::transport::health_url;
///
/// assert_eq!(
///     health_url("http://localhost:5003/a2a/tasks/send"),
///     "http://localhost:5003/health"
/// );
/// ```
pub fn health_url(tasks_send_url: &str) -> String {
    match tasks_send_url.strip_suffix(TASKS_SEND_PATH) {
        Some(base) => format!("{base}{HEALTH_PATH}"),
        None => tasks_send_url.replace(TASKS_SEND_PATH, HEALTH_PATH),
    }
}

/// Discovery URL for a handler base URL
pub fn discovery_url(base_url: &str) -> Result<String, TransportError> {
    let base =
        url::Url::parse(base_url).map_err(|e| TransportError::InvalidUrl(format!("{base_url}: {e}")))?;
    base.join(AGENT_CARD_PATH)
        .map(|u| u.to_string())
        .map_err(|e| TransportError::InvalidUrl(format!("{base_url}: {e}")))
}

/// Subscription URL for a task on a streaming endpoint
pub fn subscription_url(url: &str, task_id: &str) -> Result<String, TransportError> {
    let mut parsed =
        url::Url::parse(url).map_err(|e| TransportError::InvalidUrl(format!("{url}: {e}")))?;
    parsed.query_pairs_mut().append_pair("taskId", task_id);
    Ok(parsed.to_string())
}
