//! JSON-RPC 2.0 transport surface (spec.md §6): stdio, one request per
//! line, and HTTP, a single POST endpoint. Both channels parse the same
//! envelope and funnel into the same `Dispatcher`; this module owns only
//! the envelope (request parsing, response framing, error-code mapping)
//! shared between `stdio` and `http`.

pub mod http;
pub mod stdio;

use crate::dispatch::Dispatcher;
use crate::errors::ContextdError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const JSONRPC_VERSION: &str = "2.0";

/// The reserved method that returns the session handshake (spec.md §6)
/// instead of being routed to the dispatcher as a tool name.
const HANDSHAKE_METHOD: &str = "handshake";

/// A JSON-RPC 2.0 request. `method` doubles as the tool name for every
/// method other than the reserved `"handshake"`.
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    #[allow(dead_code)]
    #[serde(default)]
    pub jsonrpc: Option<String>,
    #[serde(default)]
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    jsonrpc: &'static str,
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcErrorBody>,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcErrorBody {
    code: i64,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

/// Parse one raw request body, dispatch it, and frame the response. Used by
/// `stdio`, which hands this a single line.
pub async fn handle_raw(dispatcher: &Dispatcher, raw: &str) -> JsonRpcResponse {
    match serde_json::from_str::<JsonRpcRequest>(raw) {
        Ok(request) => handle_request(dispatcher, request).await,
        Err(e) => JsonRpcResponse {
            jsonrpc: JSONRPC_VERSION,
            id: Value::Null,
            result: None,
            error: Some(JsonRpcErrorBody {
                code: -32700,
                message: format!("parse error: {e}"),
                data: None,
            }),
        },
    }
}

/// Dispatch an already-parsed request. Used directly by `http`, whose
/// extractor parses the body for us.
pub async fn handle_request(dispatcher: &Dispatcher, request: JsonRpcRequest) -> JsonRpcResponse {
    let id = request.id.clone();

    let outcome = if request.method == HANDSHAKE_METHOD {
        Ok(serde_json::to_value(dispatcher.handshake().await).expect("Handshake always serialises"))
    } else {
        dispatcher.dispatch(&request.method, request.params).await
    };

    match outcome {
        Ok(result) => JsonRpcResponse {
            jsonrpc: JSONRPC_VERSION,
            id,
            result: Some(result),
            error: None,
        },
        Err(e) => JsonRpcResponse {
            jsonrpc: JSONRPC_VERSION,
            id,
            result: None,
            error: Some(error_body(&e)),
        },
    }
}

/// Map a typed error to a JSON-RPC error code and the spec's error-kind
/// token (spec.md §7). Standard JSON-RPC codes are used where they fit
/// (`invalid_input` -> Invalid params); everything else gets a code in the
/// reserved server-error range, with the kind carried in `data.kind` since
/// JSON-RPC has no room for a richer taxonomy in `code` alone.
fn error_body(e: &ContextdError) -> JsonRpcErrorBody {
    let (code, kind) = match e {
        ContextdError::InvalidInput { .. } => (-32602, "invalid_input"),
        ContextdError::InvalidTenant(_) => (-32001, "invalid_tenant"),
        ContextdError::NotFound(_) => (-32002, "not_found"),
        ContextdError::Conflict(_) => (-32003, "conflict"),
        ContextdError::DepthExceeded { .. } => (-32004, "depth_exceeded"),
        ContextdError::BudgetExceeded { .. } => (-32005, "budget_exceeded"),
        ContextdError::Timeout(_) => (-32006, "timeout"),
        ContextdError::AuthError(_) => (-32007, "auth_error"),
        ContextdError::StorageError(_) => (-32008, "storage_error"),
        ContextdError::Internal(_) => (-32603, "internal_error"),
    };
    JsonRpcErrorBody {
        code,
        message: e.user_message(),
        data: Some(serde_json::json!({ "kind": kind })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::branch::{BranchManager, BranchManagerConfig};
    use crate::registry::ToolRegistry;
    use crate::security::SecretScrubber;
    use crate::storage::fakes::{FakeEmbeddingProvider, InMemoryVectorStore};
    use std::sync::Arc;

    async fn dispatcher() -> Dispatcher {
        let registry = Arc::new(ToolRegistry::new());
        crate::dispatch::catalogue::populate_defaults(&registry).await.unwrap();
        let branches = BranchManager::new(BranchManagerConfig::default(), Arc::new(SecretScrubber::new()));
        Dispatcher::new(
            registry,
            branches,
            Arc::new(InMemoryVectorStore::new()),
            Arc::new(FakeEmbeddingProvider),
            Arc::new(SecretScrubber::new()),
            "contextd",
            "0.1.0",
        )
    }

    #[tokio::test]
    async fn malformed_json_yields_parse_error() {
        let d = dispatcher().await;
        let resp = handle_raw(&d, "not json").await;
        assert_eq!(resp.id, Value::Null);
        assert_eq!(resp.error.unwrap().code, -32700);
    }

    #[tokio::test]
    async fn handshake_method_bypasses_the_registry() {
        let d = dispatcher().await;
        let resp = handle_raw(&d, r#"{"jsonrpc":"2.0","id":1,"method":"handshake"}"#).await;
        assert_eq!(resp.id, Value::from(1));
        let result = resp.result.unwrap();
        assert!(result["tools"].is_array());
        assert_eq!(result["server_info"]["name"], "contextd");
    }

    #[tokio::test]
    async fn unknown_tool_name_maps_to_not_found_code() {
        let d = dispatcher().await;
        let resp = handle_raw(&d, r#"{"id":"x","method":"nope","params":{}}"#).await;
        let error = resp.error.unwrap();
        assert_eq!(error.code, -32002);
        assert_eq!(error.data.unwrap()["kind"], "not_found");
    }

    #[tokio::test]
    async fn successful_call_carries_result_and_no_error() {
        let d = dispatcher().await;
        let resp = handle_raw(&d, r#"{"id":7,"method":"tool_search","params":{"query":"memory"}}"#).await;
        assert!(resp.error.is_none());
        assert!(resp.result.unwrap()["count"].as_u64().unwrap() > 0);
    }
}
