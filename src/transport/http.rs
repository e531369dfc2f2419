//! HTTP JSON-RPC transport (spec.md §6): a single POST endpoint plus a
//! `/health` route. Grounded on the teacher's `gateway::mod::build_router`
//! (axum `Router::with_state`, handlers taking `State<...>` + `Json<...>`
//! extractors) and `health_handler`. Session identity on this channel is a
//! `Session-Id` request header (spec.md §6); contextd doesn't need to
//! track HTTP sessions server-side since every branch/tool call already
//! carries its own `session_id`/`project_path`, so the header is only
//! logged, mirroring how the teacher logs a webhook's signature header
//! before it is verified.

use super::{handle_request, JsonRpcRequest, JsonRpcResponse};
use crate::branch::BranchManager;
use crate::dispatch::Dispatcher;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Clone)]
struct HttpApiState {
    dispatcher: Arc<Dispatcher>,
    branches: BranchManager,
    metrics_handle: Option<PrometheusHandle>,
}

/// Build the router without binding a socket, so tests can drive it with
/// `tower::ServiceExt::oneshot` the same way the teacher's gateway tests do.
/// `metrics_handle` is `None` when the process-wide Prometheus recorder
/// couldn't be installed (e.g. a second call in the same process, as
/// happens across this module's own tests) — `/metrics` then reports 503
/// rather than panicking.
pub fn build_router(
    dispatcher: Arc<Dispatcher>,
    branches: BranchManager,
    metrics_handle: Option<PrometheusHandle>,
) -> Router {
    let state = HttpApiState {
        dispatcher,
        branches,
        metrics_handle,
    };
    Router::new()
        .route("/rpc", post(rpc_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Bind `addr` and serve `router` until the process is shut down.
pub async fn serve(addr: SocketAddr, router: Router) -> std::io::Result<()> {
    info!(%addr, "http transport listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await
}

async fn rpc_handler(
    State(state): State<HttpApiState>,
    headers: HeaderMap,
    Json(request): Json<JsonRpcRequest>,
) -> impl IntoResponse {
    if let Some(session_id) = headers.get("session-id").and_then(|v| v.to_str().ok()) {
        debug!(session_id, method = %request.method, "http json-rpc request");
    }
    let response: JsonRpcResponse = handle_request(&state.dispatcher, request).await;
    (StatusCode::OK, Json(response))
}

async fn health_handler(State(state): State<HttpApiState>) -> impl IntoResponse {
    let health = state.branches.health().await;
    let status = if health.is_shutdown {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (status, Json(health))
}

async fn metrics_handler(State(state): State<HttpApiState>) -> impl IntoResponse {
    match &state.metrics_handle {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (StatusCode::SERVICE_UNAVAILABLE, String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::branch::BranchManagerConfig;
    use crate::registry::ToolRegistry;
    use crate::security::SecretScrubber;
    use crate::storage::fakes::{FakeEmbeddingProvider, InMemoryVectorStore};
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    async fn router() -> Router {
        let registry = Arc::new(ToolRegistry::new());
        crate::dispatch::catalogue::populate_defaults(&registry).await.unwrap();
        let branches = BranchManager::new(BranchManagerConfig::default(), Arc::new(SecretScrubber::new()));
        let dispatcher = Arc::new(Dispatcher::new(
            registry,
            branches.clone(),
            Arc::new(InMemoryVectorStore::new()),
            Arc::new(FakeEmbeddingProvider),
            Arc::new(SecretScrubber::new()),
            "contextd",
            "0.1.0",
        ));
        build_router(dispatcher, branches, None)
    }

    #[tokio::test]
    async fn health_reports_ok_before_shutdown() {
        let app = router().await;
        let req = Request::builder()
            .method("GET")
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = axum::body::to_bytes(resp.into_body(), 4096).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["healthy"], true);
        assert_eq!(json["is_shutdown"], false);
    }

    #[tokio::test]
    async fn rpc_endpoint_dispatches_a_tool_call() {
        let app = router().await;
        let payload = serde_json::json!({
            "id": 1,
            "method": "tool_search",
            "params": {"query": "memory"},
        });
        let req = Request::builder()
            .method("POST")
            .uri("/rpc")
            .header("content-type", "application/json")
            .header("session-id", "sess-1")
            .body(Body::from(payload.to_string()))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = axum::body::to_bytes(resp.into_body(), 8192).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(json["error"].is_null());
        assert!(json["result"]["count"].as_u64().unwrap() > 0);
    }

    #[tokio::test]
    async fn rpc_endpoint_surfaces_errors_with_200_and_error_body() {
        let app = router().await;
        let payload = serde_json::json!({"id": 1, "method": "nope", "params": {}});
        let req = Request::builder()
            .method("POST")
            .uri("/rpc")
            .header("content-type", "application/json")
            .body(Body::from(payload.to_string()))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = axum::body::to_bytes(resp.into_body(), 4096).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["code"], -32002);
    }

    #[tokio::test]
    async fn metrics_endpoint_reports_unavailable_without_a_handle() {
        let app = router().await;
        let req = Request::builder()
            .method("GET")
            .uri("/metrics")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
