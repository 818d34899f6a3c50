//! Envelope validation for inbound requests and handler responses
//!
//! Validation is fail-closed: a payload either decodes into the typed
//! envelope or produces a [`ValidationFailure`] listing every violated
//! constraint. Nothing in here panics on bad input.

use crate::protocol::envelope::{
    ErrorCode, JsonRpcError, JsonRpcResponse, TaskSendRequest, JSONRPC_VERSION, TASKS_SEND,
};
use crate::protocol::messages::{Message, Part};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use once_cell::sync::Lazy;
use serde_json::{json, Value};

/// Request id used in error responses when the payload carried none
pub const FALLBACK_ERROR_ID: &str = "validation-error";

/// JSON Schema for a `tasks/send` request
static TASK_REQUEST_SCHEMA: Lazy<Value> = Lazy::new(|| {
    json!({
        "type": "object",
        "required": ["jsonrpc", "id", "method", "params"],
        "properties": {
            "jsonrpc": {"const": JSONRPC_VERSION},
            "id": {"type": "string", "minLength": 1},
            "method": {"const": TASKS_SEND},
            "params": {
                "type": "object",
                "required": ["task", "message"],
                "properties": {
                    "task": {"$ref": "#/definitions/task"},
                    "message": {"$ref": "#/definitions/message"}
                }
            }
        },
        "definitions": {
            "task": {
                "type": "object",
                "required": ["id"],
                "additionalProperties": false,
                "properties": {
                    "id": {"type": "string", "minLength": 1},
                    "parentId": {"type": "string"},
                    "agentId": {"type": "string"},
                    "state": {"enum": ["submitted", "working", "input-required", "completed", "failed"]}
                }
            },
            "message": {
                "type": "object",
                "required": ["parts", "role"],
                "additionalProperties": false,
                "properties": {
                    "role": {"enum": ["user", "agent", "task"]},
                    "parts": {
                        "type": "array",
                        "minItems": 1,
                        "items": {"$ref": "#/definitions/part"}
                    }
                }
            },
            "part": {
                "type": "object",
                "required": ["type"],
                "properties": {"type": {"enum": ["text", "data", "file"]}},
                "oneOf": [
                    {
                        "required": ["type", "text"],
                        "additionalProperties": false,
                        "properties": {
                            "type": {"const": "text"},
                            "text": {"type": "string"},
                            "name": {"type": "string"}
                        }
                    },
                    {
                        "required": ["type", "data"],
                        "additionalProperties": false,
                        "properties": {
                            "type": {"const": "data"},
                            "data": {"type": "object"},
                            "name": {"type": "string"}
                        }
                    },
                    {
                        "required": ["type", "file"],
                        "additionalProperties": false,
                        "properties": {
                            "type": {"const": "file"},
                            "name": {"type": "string"},
                            "file": {
                                "type": "object",
                                "required": ["content", "mimetype"],
                                "additionalProperties": false,
                                "properties": {
                                    "content": {"type": "string"},
                                    "mimetype": {"type": "string", "minLength": 1},
                                    "name": {"type": "string"}
                                }
                            }
                        }
                    }
                ]
            }
        }
    })
});

static TASK_REQUEST_VALIDATOR: Lazy<Result<jsonschema::Validator, String>> = Lazy::new(|| {
    jsonschema::validator_for(&TASK_REQUEST_SCHEMA)
        .map_err(|e| format!("Schema compilation error: {e}"))
});

/// A rejected payload
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationFailure {
    pub code: ErrorCode,
    pub message: String,
    /// Every violated constraint, in discovery order
    pub violations: Vec<String>,
    /// The payload's `id`, when it had a usable one
    pub request_id: Option<String>,
}

impl ValidationFailure {
    fn validation(violations: Vec<String>, request_id: Option<String>) -> Self {
        Self {
            code: ErrorCode::ValidationFailed,
            message: "Invalid A2A request format".to_string(),
            violations,
            request_id,
        }
    }

    fn method_not_found(method: &str, request_id: Option<String>) -> Self {
        Self {
            code: ErrorCode::MethodNotFound,
            message: format!("Method not found: {method}"),
            violations: vec![format!("unsupported method '{method}'")],
            request_id,
        }
    }

    /// JSON-RPC error object carrying the violation list
    pub fn to_rpc_error(&self) -> JsonRpcError {
        JsonRpcError::new(self.code, self.message.clone())
            .with_data(json!({ "validation_errors": self.violations }))
    }

    /// Complete error response for this failure
    pub fn to_response(&self) -> JsonRpcResponse {
        let id = self
            .request_id
            .clone()
            .unwrap_or_else(|| FALLBACK_ERROR_ID.to_string());
        JsonRpcResponse::failure(id, self.to_rpc_error())
    }
}

impl std::fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.message, self.violations.join("; "))
    }
}

impl std::error::Error for ValidationFailure {}

/// Validate and decode an inbound `tasks/send` request
///
/// # Examples
/// ```
/// use a2a_orchestrator::protocol::{validate_task_request, ErrorCode};
/// use serde_json::json;
///
/// let missing_task = json!({
///     "jsonrpc": "2.0",
///     "id": "1",
///     "method": "tasks/send",
///     "params": {"message": {"role": "user", "parts": [{"type": "text", "text": "hi"}]}}
/// });
///
/// let failure = validate_task_request(&missing_task).unwrap_err();
/// assert_eq!(failure.code, ErrorCode::ValidationFailed);
/// assert_eq!(failure.request_id.as_deref(), Some("1"));
/// ```
pub fn validate_task_request(payload: &Value) -> Result<TaskSendRequest, ValidationFailure> {
    let request_id = payload
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string);

    // Unknown methods are rejected before any schema work
    if let Some(method) = payload.get("method").and_then(Value::as_str) {
        if method != TASKS_SEND {
            return Err(ValidationFailure::method_not_found(method, request_id));
        }
    }

    let validator = TASK_REQUEST_VALIDATOR
        .as_ref()
        .map_err(|e| ValidationFailure::validation(vec![e.clone()], request_id.clone()))?;

    validator.validate(payload).map_err(|errors| {
        let violations: Vec<String> = errors
            .map(|e| format!("At '{}': {}", e.instance_path, e))
            .collect();
        ValidationFailure::validation(violations, request_id.clone())
    })?;

    let request: TaskSendRequest = serde_json::from_value(payload.clone())
        .map_err(|e| ValidationFailure::validation(vec![e.to_string()], request_id.clone()))?;

    let violations = message_violations(&request.params.message, "/params/message");
    if !violations.is_empty() {
        return Err(ValidationFailure::validation(violations, request_id));
    }

    Ok(request)
}

/// Validate and decode a handler's response envelope
///
/// Enforces exactly one of `result` / `error`.
pub fn validate_task_response(payload: &Value) -> Result<JsonRpcResponse, ValidationFailure> {
    let request_id = payload
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_string);

    let response: JsonRpcResponse = serde_json::from_value(payload.clone())
        .map_err(|e| ValidationFailure::validation(vec![e.to_string()], request_id.clone()))?;

    let mut violations = Vec::new();
    if response.jsonrpc != JSONRPC_VERSION {
        violations.push(format!(
            "At '/jsonrpc': expected \"{JSONRPC_VERSION}\", got \"{}\"",
            response.jsonrpc
        ));
    }
    match (&response.result, &response.error) {
        (Some(_), Some(_)) => {
            violations.push("response carries both 'result' and 'error'".to_string())
        }
        (None, None) => {
            violations.push("response carries neither 'result' nor 'error'".to_string())
        }
        (Some(result), None) => {
            violations.extend(message_violations(&result.message, "/result/message"))
        }
        (None, Some(_)) => {}
    }

    if violations.is_empty() {
        Ok(response)
    } else {
        Err(ValidationFailure::validation(violations, request_id))
    }
}

/// Constraints serde cannot express: non-empty parts and base64 file bodies
fn message_violations(message: &Message, path: &str) -> Vec<String> {
    let mut violations = Vec::new();

    if message.parts.is_empty() {
        violations.push(format!("At '{path}/parts': message must contain at least one part"));
    }

    for (index, part) in message.parts.iter().enumerate() {
        if let Part::File(file) = part {
            if STANDARD.decode(file.file.content.as_bytes()).is_err() {
                violations.push(format!(
                    "At '{path}/parts/{index}/file/content': content is not valid base64"
                ));
            }
        }
    }

    violations
}
