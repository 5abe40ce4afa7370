//! JSON-RPC 2.0 shell (`POST /rpc`).

use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;
use relay_core::GatewayError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::server::{AppState, context_from_headers};

#[derive(Debug, Deserialize)]
pub(crate) struct JsonRpcRequest {
    #[serde(default)]
    jsonrpc: Option<String>,
    method: String,
    #[serde(default)]
    params: Value,
    #[serde(default)]
    id: Value,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonRpcError {
    code: i32,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonRpcResponse {
    jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
    id: Value,
}

impl JsonRpcResponse {
    pub(crate) fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            result: Some(result),
            error: None,
            id,
        }
    }

    pub(crate) fn failure(id: Value, error: &GatewayError) -> Self {
        Self {
            jsonrpc: "2.0",
            result: None,
            error: Some(JsonRpcError {
                code: error.code(),
                message: error.to_string(),
                data: error.detail(),
            }),
            id,
        }
    }

    fn protocol_error(id: Value, code: i32, message: &str) -> Self {
        Self {
            jsonrpc: "2.0",
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.to_string(),
                data: None,
            }),
            id,
        }
    }
}

/// `POST /rpc` handler.
pub(crate) async fn handle(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<JsonRpcResponse> {
    if body.is_array() {
        return Json(JsonRpcResponse::protocol_error(
            Value::Null,
            -32600,
            "batch requests are not supported",
        ));
    }

    let request: JsonRpcRequest = match serde_json::from_value(body) {
        Ok(request) => request,
        Err(e) => {
            return Json(JsonRpcResponse::protocol_error(
                Value::Null,
                -32600,
                &format!("invalid request: {e}"),
            ));
        },
    };
    if request.jsonrpc.as_deref() != Some("2.0") {
        return Json(JsonRpcResponse::protocol_error(
            request.id,
            -32600,
            "jsonrpc must be \"2.0\"",
        ));
    }

    let ctx = context_from_headers(&state.gateway, &headers);
    match state
        .procedures
        .dispatch(state.gateway.clone(), ctx, &request.method, request.params)
        .await
    {
        Ok(result) => Json(JsonRpcResponse::success(request.id, result)),
        Err(e) => Json(JsonRpcResponse::failure(request.id, &e)),
    }
}
