//! HTTP surface
//!
//! Thin warp layer over [`Orchestrator`]: the JSON-RPC `tasks/send`
//! endpoint, the discovery document, health, the handler table and metrics.

use crate::observability::metrics::metrics;
use crate::orchestrator::{Orchestrator, OverallHealth};
use crate::protocol::ErrorCode;
use bytes::Bytes;
use chrono::Utc;
use serde_json::json;
use std::convert::Infallible;
use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

/// Largest accepted request body
const MAX_BODY_BYTES: u64 = 1024 * 1024;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Invalid listen address {0}")]
    InvalidAddress(String),
    #[error("Failed to bind {addr}: {message}")]
    Bind { addr: SocketAddr, message: String },
}

/// Listen address from the configured host and port
pub fn listen_addr(host: &str, port: u16) -> Result<SocketAddr, ServerError> {
    let ip = if host == "localhost" {
        IpAddr::V4(Ipv4Addr::LOCALHOST)
    } else {
        host.parse()
            .map_err(|_| ServerError::InvalidAddress(format!("{host}:{port}")))?
    };
    Ok(SocketAddr::new(ip, port))
}

/// All routes, ready to serve or to drive with `warp::test`
pub fn routes(
    orchestrator: Arc<Orchestrator>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    let with_orchestrator = warp::any().map(move || orchestrator.clone());

    // POST /a2a/tasks/send - JSON-RPC task endpoint
    let tasks_send = warp::path!("a2a" / "tasks" / "send")
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::bytes())
        .and(with_orchestrator.clone())
        .and_then(handle_tasks_send);

    // GET /.well-known/agent.json - discovery document
    let agent_card = warp::path!(".well-known" / "agent.json")
        .and(warp::get())
        .and(with_orchestrator.clone())
        .map(|orchestrator: Arc<Orchestrator>| warp::reply::json(&orchestrator.agent_card()));

    // GET /health - aggregate handler health
    let health = warp::path!("health")
        .and(warp::get())
        .and(with_orchestrator.clone())
        .and_then(handle_health);

    // GET /agents - handler table with per-handler health
    let agents = warp::path!("agents")
        .and(warp::get())
        .and(with_orchestrator)
        .and_then(handle_agents);

    // GET /metrics - counters and timings
    let metrics_route = warp::path!("metrics")
        .and(warp::get())
        .map(|| warp::reply::json(&metrics().get_metrics()));

    tasks_send
        .or(agent_card)
        .or(health)
        .or(agents)
        .or(metrics_route)
        .with(
            warp::cors()
                .allow_any_origin()
                .allow_methods(vec!["GET", "POST"])
                .allow_headers(vec!["content-type", "authorization"]),
        )
}

/// Serve until `shutdown` resolves
pub async fn serve(
    orchestrator: Arc<Orchestrator>,
    addr: SocketAddr,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), ServerError> {
    let (bound, server) = warp::serve(routes(orchestrator))
        .try_bind_with_graceful_shutdown(addr, shutdown)
        .map_err(|e| ServerError::Bind {
            addr,
            message: e.to_string(),
        })?;

    info!(addr = %bound, "Orchestrator listening");
    server.await;
    info!("Server stopped");
    Ok(())
}

async fn handle_tasks_send(
    body: Bytes,
    orchestrator: Arc<Orchestrator>,
) -> Result<impl Reply, Infallible> {
    let response = orchestrator.handle_raw(&body).await;
    let status = match response.error_code().and_then(ErrorCode::from_code) {
        None => StatusCode::OK,
        Some(ErrorCode::InternalError) => StatusCode::INTERNAL_SERVER_ERROR,
        Some(_) => StatusCode::BAD_REQUEST,
    };
    Ok(warp::reply::with_status(warp::reply::json(&response), status))
}

async fn handle_health(orchestrator: Arc<Orchestrator>) -> Result<impl Reply, Infallible> {
    let handlers = orchestrator.handler_health().await;
    let overall = OverallHealth::from_handlers(&handlers);
    let status = if overall == OverallHealth::Unhealthy {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    let body = json!({
        "status": overall,
        "service": orchestrator.config().orchestrator.id,
        "timestamp": Utc::now().to_rfc3339(),
        "handlers": handlers
            .iter()
            .map(|h| (h.key.clone(), json!(h.status)))
            .collect::<serde_json::Map<_, _>>(),
    });
    Ok(warp::reply::with_status(warp::reply::json(&body), status))
}

async fn handle_agents(orchestrator: Arc<Orchestrator>) -> Result<impl Reply, Infallible> {
    let handlers = orchestrator.handler_health().await;
    let body = json!({
        "total": handlers.len(),
        "generic_handler": orchestrator.registry().generic_key(),
        "agents": handlers,
    });
    Ok(warp::reply::json(&body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OrchestratorConfig;
    use crate::protocol::{JsonRpcResponse, Message, Task, TaskSendRequest};
    use crate::testing::mocks::{MockHandlerTransport, MockLlmProvider};
    use crate::transport::HealthStatus;
    use serde_json::Value;

    const LEGAL_URL: &str = "http://localhost:5003/a2a/tasks/send";

    fn orchestrator(transport: Arc<MockHandlerTransport>) -> Arc<Orchestrator> {
        Arc::new(Orchestrator::new(
            OrchestratorConfig::test_config(),
            Arc::new(MockLlmProvider::single_response("Hi!")),
            transport,
        ))
    }

    #[tokio::test]
    async fn test_tasks_send_success_is_200() {
        let transport = Arc::new(MockHandlerTransport::new());
        transport.respond(LEGAL_URL, "Signed off.").await;
        let request =
            TaskSendRequest::with_id("r1", Task::new(), Message::user_text("talk to legal please"));

        let response = warp::test::request()
            .method("POST")
            .path("/a2a/tasks/send")
            .json(&request)
            .reply(&routes(orchestrator(transport)))
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        let body: JsonRpcResponse = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body.id, "r1");
        assert!(body.is_success());
    }

    #[tokio::test]
    async fn test_invalid_payload_is_400() {
        let response = warp::test::request()
            .method("POST")
            .path("/a2a/tasks/send")
            .body(r#"{"jsonrpc":"2.0","id":"x","method":"tasks/send","params":{}}"#)
            .reply(&routes(orchestrator(Arc::new(MockHandlerTransport::new()))))
            .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: JsonRpcResponse = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body.error_code(), Some(ErrorCode::ValidationFailed.code()));
    }

    #[tokio::test]
    async fn test_agent_card_route() {
        let response = warp::test::request()
            .path("/.well-known/agent.json")
            .reply(&routes(orchestrator(Arc::new(MockHandlerTransport::new()))))
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        let card: Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(card["name"], "Generalist Orchestrator");
    }

    #[tokio::test]
    async fn test_health_reports_degraded_handler() {
        let transport = Arc::new(MockHandlerTransport::new());
        transport.set_health(LEGAL_URL, HealthStatus::Unhealthy).await;

        let response = warp::test::request()
            .path("/health")
            .reply(&routes(orchestrator(transport)))
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body["status"], "degraded");
        assert_eq!(body["handlers"]["legal"], "unhealthy");
        assert_eq!(body["handlers"]["general"], "healthy");
    }

    #[tokio::test]
    async fn test_agents_route_lists_registry() {
        let response = warp::test::request()
            .path("/agents")
            .reply(&routes(orchestrator(Arc::new(MockHandlerTransport::new()))))
            .await;

        let body: Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body["total"], 4);
        assert_eq!(body["agents"][0]["key"], "revenue");
        assert_eq!(body["generic_handler"], "general");
    }

    #[test]
    fn test_listen_addr() {
        assert_eq!(listen_addr("127.0.0.1", 5001).unwrap().port(), 5001);
        assert!(listen_addr("localhost", 80).unwrap().ip().is_loopback());
        assert!(listen_addr("not a host", 5001).is_err());
    }
}
