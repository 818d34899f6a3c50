//! HTTP implementation of the handler transport

use crate::protocol::{
    validate_task_response, AgentCard, JsonRpcResponse, Message, StreamEvent, StreamEventType,
    Task, TaskSendRequest, TaskSendResult, TaskState,
};
use crate::transport::{
    discovery_url, health_url, subscription_url, HandlerTransport, HealthStatus, TransportError,
};
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);
const SUBSCRIPTION_BUFFER: usize = 32;

/// `reqwest` based transport
///
/// One client is shared by every call; the per-call timeout is applied both
/// to the request and to the surrounding future, which is dropped on expiry.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    auth_token: Option<String>,
}

impl HttpTransport {
    pub fn new(auth_token: Option<String>) -> Result<Self, TransportError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;

        Ok(Self { client, auth_token })
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn post_envelope(
        &self,
        url: &str,
        request: &TaskSendRequest,
        timeout: Duration,
    ) -> Result<TaskSendResult, TransportError> {
        let response = self
            .authorize(self.client.post(url).timeout(timeout).json(request))
            .send()
            .await
            .map_err(|e| map_reqwest_error(e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            // Handlers report protocol errors with a non-2xx status and a JSON-RPC body
            if let Ok(envelope) = serde_json::from_str::<JsonRpcResponse>(&body) {
                if let Some(error) = envelope.error {
                    return Err(TransportError::Remote {
                        code: error.code,
                        message: error.message,
                    });
                }
            }
            return Err(TransportError::HttpStatus {
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("unknown").to_string(),
            });
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| map_reqwest_error(e, timeout))?;
        decode_task_response(&payload)
    }

    /// Subscribe to server-pushed updates for `task_id`
    ///
    /// Events arrive on the returned subscription until a terminal event,
    /// a stream error, or [`TaskSubscription::close`].
    pub async fn subscribe_to_task(
        &self,
        url: &str,
        task_id: &str,
    ) -> Result<TaskSubscription, TransportError> {
        let target = subscription_url(url, task_id)?;
        let response = self
            .authorize(
                self.client
                    .get(&target)
                    .header(reqwest::header::ACCEPT, "text/event-stream"),
            )
            .send()
            .await
            .map_err(|e| TransportError::Subscription(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::HttpStatus {
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("unknown").to_string(),
            });
        }

        let (sender, receiver) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let task_id = task_id.to_string();
        let handle = tokio::spawn(async move {
            let mut events = response.bytes_stream().eventsource();

            while let Some(event) = events.next().await {
                let item = match event {
                    Ok(event) if event.data.trim().is_empty() => continue,
                    Ok(event) => decode_stream_event(&event.data, &task_id),
                    Err(e) => Err(TransportError::Subscription(e.to_string())),
                };

                let stop = match &item {
                    Ok(event) => event.is_terminal(),
                    Err(_) => true,
                };
                if sender.send(item).await.is_err() || stop {
                    break;
                }
            }
            debug!(task_id = %task_id, "Task subscription closed");
        });

        Ok(TaskSubscription { receiver, handle })
    }
}

#[async_trait]
impl HandlerTransport for HttpTransport {
    async fn send_task(
        &self,
        url: &str,
        task: &Task,
        message: &Message,
        timeout: Duration,
    ) -> Result<TaskSendResult, TransportError> {
        let request = TaskSendRequest::new(task.clone(), message.clone());
        debug!(url = %url, request_id = %request.id, task_id = %task.id, "Sending task");

        match tokio::time::timeout(timeout, self.post_envelope(url, &request, timeout)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout {
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }

    async fn fetch_agent_card(&self, base_url: &str) -> Result<AgentCard, TransportError> {
        let target = discovery_url(base_url)?;
        let response = self
            .authorize(
                self.client
                    .get(&target)
                    .header(reqwest::header::ACCEPT, "application/json"),
            )
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::HttpStatus {
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("unknown").to_string(),
            });
        }

        response
            .json()
            .await
            .map_err(|e| TransportError::InvalidResponse(e.to_string()))
    }

    async fn check_health(&self, url: &str) -> HealthStatus {
        let target = health_url(url);
        match self.client.get(&target).timeout(HEALTH_TIMEOUT).send().await {
            Ok(response) if response.status().is_success() => HealthStatus::Healthy,
            Ok(response) => {
                debug!(url = %target, status = %response.status(), "Handler unhealthy");
                HealthStatus::Unhealthy
            }
            Err(e) => {
                warn!(url = %target, error = %e, "Handler unreachable");
                HealthStatus::Unreachable
            }
        }
    }
}

/// Live task subscription
///
/// Dropping the subscription stops the background reader.
pub struct TaskSubscription {
    receiver: mpsc::Receiver<Result<StreamEvent, TransportError>>,
    handle: JoinHandle<()>,
}

impl TaskSubscription {
    /// Next event, or `None` once the stream has ended
    pub async fn next(&mut self) -> Option<Result<StreamEvent, TransportError>> {
        self.receiver.recv().await
    }

    pub fn close(self) {
        self.handle.abort();
    }
}

impl Drop for TaskSubscription {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn map_reqwest_error(error: reqwest::Error, timeout: Duration) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout {
            timeout_ms: timeout.as_millis() as u64,
        }
    } else if error.is_decode() {
        TransportError::InvalidResponse(error.to_string())
    } else {
        TransportError::Network(error.to_string())
    }
}

/// Validate a handler reply and unwrap its result
fn decode_task_response(payload: &Value) -> Result<TaskSendResult, TransportError> {
    let envelope = validate_task_response(payload)
        .map_err(|failure| TransportError::InvalidResponse(failure.violations.join("; ")))?;

    if let Some(error) = envelope.error {
        return Err(TransportError::Remote {
            code: error.code,
            message: error.message,
        });
    }

    envelope
        .result
        .ok_or_else(|| TransportError::InvalidResponse("response has no result".to_string()))
}

/// Decode one SSE `data:` payload
///
/// Handlers push either a [`StreamEvent`] or a full JSON-RPC response whose
/// task state drives the event type.
fn decode_stream_event(data: &str, task_id: &str) -> Result<StreamEvent, TransportError> {
    if let Ok(event) = serde_json::from_str::<StreamEvent>(data) {
        return Ok(event);
    }

    let payload: Value = serde_json::from_str(data)
        .map_err(|e| TransportError::Subscription(format!("undecodable event: {e}")))?;
    let result = decode_task_response(&payload)?;

    let event_type = match result.task.state {
        TaskState::Completed => StreamEventType::Completed,
        TaskState::Failed => StreamEventType::Failed,
        _ => StreamEventType::Message,
    };
    let mut event = StreamEvent::new(event_type, task_id);
    event.state = Some(result.task.state);
    event.message = Some(result.message);
    Ok(event)
}
