//! Crate-level error type and its JSON-RPC mapping
//!
//! Layer errors (transport, LLM, classification, configuration) convert into
//! [`OrchestratorError`], which maps onto the canonical protocol error codes.
//! Messages leaving the process are sanitized first.

use crate::classifier::ClassificationError;
use crate::config::ConfigError;
use crate::llm::provider::LlmError;
use crate::protocol::{ErrorCode, JsonRpcError, JsonRpcResponse, ValidationFailure};
use crate::transport::TransportError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;
use thiserror::Error;

/// Message returned to callers for any internal fault
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal processing error";

const MAX_ERROR_MESSAGE_LEN: usize = 500;

/// Main error type for orchestration operations
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationFailure),

    #[error("Method not found: {method}")]
    MethodNotFound { method: String },

    #[error("Parse error: {message}")]
    Parse { message: String },

    #[error("Classification error: {0}")]
    Classification(#[from] ClassificationError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("LLM provider error: {0}")]
    Llm(#[from] LlmError),

    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl OrchestratorError {
    /// Protocol error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            OrchestratorError::Validation(failure) => failure.code,
            OrchestratorError::MethodNotFound { .. } => ErrorCode::MethodNotFound,
            OrchestratorError::Parse { .. } => ErrorCode::ParseError,
            OrchestratorError::Classification(_)
            | OrchestratorError::Transport(_)
            | OrchestratorError::Llm(_)
            | OrchestratorError::Internal { .. }
            | OrchestratorError::Config(_) => ErrorCode::InternalError,
        }
    }

    /// Convert to a protocol error object
    ///
    /// Validation failures keep their violation list; internal faults use a
    /// fixed message with the sanitized cause in `data.details`.
    pub fn to_rpc_error(&self) -> JsonRpcError {
        match self {
            OrchestratorError::Validation(failure) => failure.to_rpc_error(),
            OrchestratorError::MethodNotFound { method } => JsonRpcError::new(
                ErrorCode::MethodNotFound,
                sanitize_error_message(&format!("Method not found: {method}")),
            ),
            OrchestratorError::Parse { message } => JsonRpcError::new(
                ErrorCode::ParseError,
                "Parse error",
            )
            .with_data(json!({ "details": sanitize_error_message(message) })),
            other => JsonRpcError::new(ErrorCode::InternalError, INTERNAL_ERROR_MESSAGE)
                .with_data(json!({ "details": sanitize_error_message(&other.to_string()) })),
        }
    }

    /// Complete error response addressed to `request_id`
    pub fn to_response(&self, request_id: &str) -> JsonRpcResponse {
        JsonRpcResponse::failure(request_id, self.to_rpc_error())
    }

    /// Create parse error
    pub fn parse<S: Into<String>>(message: S) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    /// Create method-not-found error
    pub fn method_not_found<S: Into<String>>(method: S) -> Self {
        Self::MethodNotFound {
            method: method.into(),
        }
    }

    /// Create internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

static SECRET_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(password|token|key|secret)[=:]\s*\S+").expect("secret pattern is valid")
});

static SECRET_PATH_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/[a-zA-Z0-9._/-]+/(secrets?|\.ssh|\.aws|\.config)/[a-zA-Z0-9._/-]+")
        .expect("secret path pattern is valid")
});

/// Sanitize error messages before they leave the process
///
/// Redacts `key=value` secrets and credential paths and caps the length at
/// 500 bytes.
pub fn sanitize_error_message(message: &str) -> String {
    let redacted = SECRET_PATTERN.replace_all(message, "${1}=***");
    let mut sanitized = SECRET_PATH_PATTERN
        .replace_all(&redacted, "/***REDACTED***/")
        .to_string();

    if sanitized.len() > MAX_ERROR_MESSAGE_LEN {
        let truncate_suffix = "...[truncated]";
        let mut cut = MAX_ERROR_MESSAGE_LEN - truncate_suffix.len();
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        sanitized.truncate(cut);
        sanitized.push_str(truncate_suffix);
    }

    sanitized
}

/// Result type for orchestration operations
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;
