//! JSON-RPC 2.0 envelope for the `tasks/send` method
//!
//! Requests always carry `method: "tasks/send"`. Responses carry exactly one
//! of `result` or `error`; the error codes are fixed integers shared with every
//! handler implementation.

use crate::protocol::messages::{Message, Task};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};

/// JSON-RPC protocol version string
pub const JSONRPC_VERSION: &str = "2.0";

/// The only method this protocol defines
pub const TASKS_SEND: &str = "tasks/send";

static REQUEST_COUNTER: AtomicU64 = AtomicU64::new(0);

/// `tasks/send` request envelope
///
/// # Examples
/// ```
/// use a2a_orchestrator::protocol::{Message, Task, TaskSendRequest, TASKS_SEND};
///
/// let request = TaskSendRequest::new(Task::new(), Message::user_text("hello"));
/// assert_eq!(request.method, TASKS_SEND);
/// assert_eq!(request.jsonrpc, "2.0");
/// assert!(request.id.starts_with("a2a-"));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskSendRequest {
    pub jsonrpc: String,
    pub id: String,
    pub method: String,
    pub params: TaskSendParams,
}

impl TaskSendRequest {
    /// Build a request with a generated id
    pub fn new(task: Task, message: Message) -> Self {
        Self::with_id(generate_request_id(), task, message)
    }

    pub fn with_id(id: impl Into<String>, task: Task, message: Message) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: id.into(),
            method: TASKS_SEND.to_string(),
            params: TaskSendParams { task, message },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskSendParams {
    pub task: Task,
    pub message: Message,
}

/// Successful `tasks/send` payload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskSendResult {
    pub task: Task,
    pub message: Message,
}

/// JSON-RPC response envelope
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<TaskSendResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: impl Into<String>, task: Task, message: Message) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: id.into(),
            result: Some(TaskSendResult { task, message }),
            error: None,
        }
    }

    pub fn failure(id: impl Into<String>, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: id.into(),
            result: None,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.result.is_some() && self.error.is_none()
    }

    /// Protocol error code, if this is an error response
    pub fn error_code(&self) -> Option<i32> {
        self.error.as_ref().map(|e| e.code)
    }
}

/// JSON-RPC error object
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Known error code, if the integer is part of the canonical table
    pub fn kind(&self) -> Option<ErrorCode> {
        ErrorCode::from_code(self.code)
    }
}

/// Canonical error code table
///
/// The integer values are fixed for interoperability with every handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    InternalError,
    ValidationFailed,
    TaskNotFound,
    Unauthorized,
    RateLimited,
}

impl ErrorCode {
    pub const ALL: [ErrorCode; 9] = [
        ErrorCode::ParseError,
        ErrorCode::InvalidRequest,
        ErrorCode::MethodNotFound,
        ErrorCode::InvalidParams,
        ErrorCode::InternalError,
        ErrorCode::ValidationFailed,
        ErrorCode::TaskNotFound,
        ErrorCode::Unauthorized,
        ErrorCode::RateLimited,
    ];

    pub fn code(&self) -> i32 {
        match self {
            ErrorCode::ParseError => -32700,
            ErrorCode::InvalidRequest => -32600,
            ErrorCode::MethodNotFound => -32601,
            ErrorCode::InvalidParams => -32602,
            ErrorCode::InternalError => -32603,
            ErrorCode::ValidationFailed => -32000,
            ErrorCode::TaskNotFound => -32001,
            ErrorCode::Unauthorized => -32002,
            ErrorCode::RateLimited => -32003,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.code() == code)
    }

    /// Constant-style name, e.g. `VALIDATION_FAILED`
    pub fn name(&self) -> &'static str {
        match self {
            ErrorCode::ParseError => "PARSE_ERROR",
            ErrorCode::InvalidRequest => "INVALID_REQUEST",
            ErrorCode::MethodNotFound => "METHOD_NOT_FOUND",
            ErrorCode::InvalidParams => "INVALID_PARAMS",
            ErrorCode::InternalError => "INTERNAL_ERROR",
            ErrorCode::ValidationFailed => "VALIDATION_FAILED",
            ErrorCode::TaskNotFound => "TASK_NOT_FOUND",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::RateLimited => "RATE_LIMITED",
        }
    }
}

/// Generate a JSON-RPC request id of the form `a2a-<millis>-<seq>`
pub fn generate_request_id() -> String {
    let seq = REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed) % 1000;
    format!("a2a-{}-{seq}", chrono::Utc::now().timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_code_values_are_fixed() {
        let expected = [
            (ErrorCode::ParseError, -32700),
            (ErrorCode::InvalidRequest, -32600),
            (ErrorCode::MethodNotFound, -32601),
            (ErrorCode::InvalidParams, -32602),
            (ErrorCode::InternalError, -32603),
            (ErrorCode::ValidationFailed, -32000),
            (ErrorCode::TaskNotFound, -32001),
            (ErrorCode::Unauthorized, -32002),
            (ErrorCode::RateLimited, -32003),
        ];

        for (code, value) in expected {
            assert_eq!(code.code(), value, "{}", code.name());
            assert_eq!(ErrorCode::from_code(value), Some(code));
        }
        assert_eq!(ErrorCode::from_code(-1), None);
    }

    #[test]
    fn test_request_serialization_shape() {
        let task = Task {
            id: "task-1".to_string(),
            parent_id: None,
            agent_id: None,
            state: crate::protocol::TaskState::Submitted,
        };
        let request = TaskSendRequest::with_id("req-1", task, Message::user_text("hi"));
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(
            value,
            json!({
                "jsonrpc": "2.0",
                "id": "req-1",
                "method": "tasks/send",
                "params": {
                    "task": {"id": "task-1", "state": "submitted"},
                    "message": {"parts": [{"type": "text", "text": "hi"}], "role": "user"}
                }
            })
        );
    }

    #[test]
    fn test_success_response_has_no_error() {
        let response = JsonRpcResponse::success("r", Task::new(), Message::agent_text("ok"));
        let value = serde_json::to_value(&response).unwrap();

        assert!(response.is_success());
        assert!(value.get("error").is_none());
        assert!(value.get("result").is_some());
    }

    #[test]
    fn test_failure_response_has_no_result() {
        let error = JsonRpcError::new(ErrorCode::ValidationFailed, "bad")
            .with_data(json!({"validation_errors": ["x"]}));
        let response = JsonRpcResponse::failure("r", error);
        let value = serde_json::to_value(&response).unwrap();

        assert!(!response.is_success());
        assert_eq!(response.error_code(), Some(-32000));
        assert_eq!(value["error"]["code"], -32000);
        assert_eq!(value["error"]["data"]["validation_errors"][0], "x");
        assert!(value.get("result").is_none());
    }

    #[test]
    fn test_unknown_remote_error_code_still_decodes() {
        let response: JsonRpcResponse = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": "x",
            "error": {"code": -32099, "message": "custom"}
        }))
        .unwrap();

        let error = response.error.unwrap();
        assert_eq!(error.code, -32099);
        assert_eq!(error.kind(), None);
    }

    #[test]
    fn test_request_ids_are_prefixed() {
        let a = generate_request_id();
        let b = generate_request_id();
        assert!(a.starts_with("a2a-"));
        assert_ne!(a, b);
    }
}
