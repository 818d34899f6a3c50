//! HTTP transport against a live mock handler
//!
//! Exercises the reqwest transport end to end: envelope decoding, error
//! mapping, timeouts, auth, discovery, health probes and subscriptions.


use a2a_orchestrator::protocol::{Message, StreamEventType, Task, TaskState};
use a2a_orchestrator::transport::{HandlerTransport, HealthStatus, HttpTransport, TransportError};
use a2a_orchestrator::Orchestrator;
use a2a_orchestrator::testing::mocks::MockLlmProvider;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use test_helpers::*;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TIMEOUT: Duration = Duration::from_secs(2);

fn tasks_send_url(server: &MockServer) -> String {
    format!("{}/a2a/tasks/send", server.uri())
}

#[tokio::test]
async fn test_send_task_decodes_successful_reply() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/a2a/tasks/send"))
        .respond_with(ResponseTemplate::new(200).set_body_json(handler_reply("Contract looks fine.")))
        .mount(&server)
        .await;

    let transport = HttpTransport::new(None).unwrap();
    let result = transport
        .send_task(
            &tasks_send_url(&server),
            &Task::new(),
            &Message::user_text("review this"),
            TIMEOUT,
        )
        .await
        .unwrap();

    assert_eq!(result.task.state, TaskState::Completed);
    assert_eq!(result.message.text("\n"), "Contract looks fine.");
}

#[tokio::test]
async fn test_send_task_carries_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/a2a/tasks/send"))
        .and(header("Authorization", "Bearer handler-secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(handler_reply("ok")))
        .expect(1)
        .mount(&server)
        .await;

    let transport = HttpTransport::new(Some("handler-secret".to_string())).unwrap();
    let result = transport
        .send_task(
            &tasks_send_url(&server),
            &Task::new(),
            &Message::user_text("hi"),
            TIMEOUT,
        )
        .await;

    assert!(result.is_ok());
}

#[tokio::test]
async fn test_send_task_posts_json_rpc_envelope() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/a2a/tasks/send"))
        .respond_with(ResponseTemplate::new(200).set_body_json(handler_reply("ok")))
        .mount(&server)
        .await;

    let task = Task::new();
    HttpTransport::new(None)
        .unwrap()
        .send_task(
            &tasks_send_url(&server),
            &task,
            &Message::user_text("what is our churn?"),
            TIMEOUT,
        )
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["jsonrpc"], "2.0");
    assert_eq!(body["method"], "tasks/send");
    assert_eq!(body["params"]["task"]["id"], json!(task.id));
    assert_eq!(
        body["params"]["message"]["parts"][0]["text"],
        "what is our churn?"
    );
}

#[tokio::test]
async fn test_remote_json_rpc_error_is_surfaced() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/a2a/tasks/send"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": "r1",
            "error": { "code": -32003, "message": "Too many requests" }
        })))
        .mount(&server)
        .await;

    let err = HttpTransport::new(None)
        .unwrap()
        .send_task(
            &tasks_send_url(&server),
            &Task::new(),
            &Message::user_text("hi"),
            TIMEOUT,
        )
        .await
        .unwrap_err();

    assert_eq!(
        err,
        TransportError::Remote {
            code: -32003,
            message: "Too many requests".to_string()
        }
    );
}

#[tokio::test]
async fn test_server_error_status_without_envelope() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/a2a/tasks/send"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let err = HttpTransport::new(None)
        .unwrap()
        .send_task(
            &tasks_send_url(&server),
            &Task::new(),
            &Message::user_text("hi"),
            TIMEOUT,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, TransportError::HttpStatus { status: 500, .. }));
}

#[tokio::test]
async fn test_malformed_reply_is_invalid_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/a2a/tasks/send"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "hello": "world" })))
        .mount(&server)
        .await;

    let err = HttpTransport::new(None)
        .unwrap()
        .send_task(
            &tasks_send_url(&server),
            &Task::new(),
            &Message::user_text("hi"),
            TIMEOUT,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, TransportError::InvalidResponse(_)));
}

#[tokio::test]
async fn test_slow_handler_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/a2a/tasks/send"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(handler_reply("late"))
                .set_delay(Duration::from_millis(800)),
        )
        .mount(&server)
        .await;

    let err = HttpTransport::new(None)
        .unwrap()
        .send_task(
            &tasks_send_url(&server),
            &Task::new(),
            &Message::user_text("hi"),
            Duration::from_millis(100),
        )
        .await
        .unwrap_err();

    assert_eq!(err, TransportError::Timeout { timeout_ms: 100 });
    assert_eq!(err.to_string(), "Request timed out after 100ms");
}

#[tokio::test]
async fn test_fetch_agent_card_from_well_known_path() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/.well-known/agent.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "Legal Agent",
            "description": "Contracts and compliance",
            "contact": "legal@example.com",
            "capabilities": { "tasks/send": { "streaming": false } }
        })))
        .mount(&server)
        .await;

    let card = HttpTransport::new(None)
        .unwrap()
        .fetch_agent_card(&tasks_send_url(&server))
        .await
        .unwrap();

    assert_eq!(card.name, "Legal Agent");
    assert!(card.supports_tasks_send());
}

#[tokio::test]
async fn test_fetch_agent_card_missing_is_http_error() {
    let server = MockServer::start().await;

    let err = HttpTransport::new(None)
        .unwrap()
        .fetch_agent_card(&server.uri())
        .await
        .unwrap_err();

    assert!(matches!(err, TransportError::HttpStatus { status: 404, .. }));
}

#[tokio::test]
async fn test_health_probe_outcomes() {
    let healthy = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "ok" })))
        .mount(&healthy)
        .await;
    let unhealthy = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&unhealthy)
        .await;

    let transport = HttpTransport::new(None).unwrap();

    assert_eq!(
        transport.check_health(&tasks_send_url(&healthy)).await,
        HealthStatus::Healthy
    );
    assert_eq!(
        transport.check_health(&tasks_send_url(&unhealthy)).await,
        HealthStatus::Unhealthy
    );
    assert_eq!(
        transport
            .check_health("http://127.0.0.1:9/a2a/tasks/send")
            .await,
        HealthStatus::Unreachable
    );
}

#[tokio::test]
async fn test_subscription_delivers_events_until_terminal() {
    let server = MockServer::start().await;
    let body = concat!(
        "data: {\"type\":\"status\",\"taskId\":\"t-7\",\"timestamp\":\"2024-01-01T00:00:00Z\",\"state\":\"working\"}\n\n",
        "data: {\"type\":\"completed\",\"taskId\":\"t-7\",\"timestamp\":\"2024-01-01T00:00:01Z\",\"state\":\"completed\"}\n\n",
        "data: {\"type\":\"status\",\"taskId\":\"t-7\",\"timestamp\":\"2024-01-01T00:00:02Z\"}\n\n",
    );
    Mock::given(method("GET"))
        .and(path("/a2a/tasks/subscribe"))
        .and(query_param("taskId", "t-7"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(body),
        )
        .mount(&server)
        .await;

    let transport = HttpTransport::new(None).unwrap();
    let mut subscription = transport
        .subscribe_to_task(&format!("{}/a2a/tasks/subscribe", server.uri()), "t-7")
        .await
        .unwrap();

    let first = subscription.next().await.unwrap().unwrap();
    assert_eq!(first.event_type, StreamEventType::Status);
    assert_eq!(first.state, Some(TaskState::Working));

    let second = subscription.next().await.unwrap().unwrap();
    assert_eq!(second.event_type, StreamEventType::Completed);

    // Nothing is delivered after the terminal event
    assert!(subscription.next().await.is_none());
}

#[tokio::test]
async fn test_orchestrator_routes_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/legal/a2a/tasks/send"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(handler_reply("The indemnity clause is capped.")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let orchestrator = Orchestrator::new(
        config_for_server(&server.uri()),
        Arc::new(MockLlmProvider::single_response("Hello!")),
        Arc::new(HttpTransport::new(None).unwrap()),
    );

    let response = orchestrator
        .handle_request(&task_request("req-http", "talk to legal agent about indemnity"))
        .await;

    assert!(response.is_success());
    let result = response.result.unwrap();
    assert_eq!(result.message.text(""), "The indemnity clause is capped.");
    assert_eq!(result.task.state, TaskState::Completed);
}

#[tokio::test]
async fn test_orchestrator_reports_unreachable_handler_as_failure() {
    let server = MockServer::start().await;

    let orchestrator = Orchestrator::new(
        config_for_server(&server.uri()),
        Arc::new(MockLlmProvider::single_response("Hello!")),
        Arc::new(HttpTransport::new(None).unwrap()),
    );

    let outcome = orchestrator
        .route_task(&Task::new(), &Message::user_text("talk to legal agent"))
        .await
        .unwrap();

    assert_eq!(outcome.results.len(), 1);
    assert!(!outcome.results[0].success);
    assert!(outcome.aggregation.escalate);
}
