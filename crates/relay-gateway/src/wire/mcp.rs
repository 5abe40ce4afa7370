//! MCP shell (`POST /mcp`).
//!
//! Speaks MCP's JSON-RPC framing: `initialize`, `ping`, `tools/list`,
//! `tools/call`, `resources/list`, `resources/read`. Tools are the
//! procedure registry verbatim - procedure `ai.generateText` surfaces as
//! tool `ai_generateText` (MCP tool names cannot contain dots). Resources
//! are workspace files, as in the `mcp.*` procedures. Prompt templates
//! are out of scope.

use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};

use super::jsonrpc::JsonRpcResponse;
use crate::procedures::mcp_ns;
use crate::server::{AppState, context_from_headers};

const PROTOCOL_VERSION: &str = "2024-11-05";

/// `POST /mcp` handler.
pub(crate) async fn handle(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let method = body.get("method").and_then(Value::as_str).unwrap_or_default();
    let id = body.get("id").cloned();
    let params = body.get("params").cloned().unwrap_or(Value::Null);

    // Notifications get no response body.
    let Some(id) = id else {
        return StatusCode::ACCEPTED.into_response();
    };

    let result = match method {
        "initialize" => Ok(json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": { "tools": {}, "resources": {} },
            "serverInfo": {
                "name": "relay-gateway",
                "version": env!("CARGO_PKG_VERSION"),
            },
        })),
        "ping" => Ok(json!({})),
        "tools/list" => Ok(tools_list(&state)),
        "tools/call" => return tools_call(state, headers, id, params).await,
        "resources/list" => resources_list(&state),
        "resources/read" => resources_read(state.clone(), headers.clone(), params).await,
        other => {
            let response = json!({
                "jsonrpc": "2.0",
                "error": { "code": -32601, "message": format!("method not found: {other}") },
                "id": id,
            });
            return Json(response).into_response();
        },
    };

    match result {
        Ok(result) => Json(JsonRpcResponse::success(id, result)).into_response(),
        Err(e) => Json(JsonRpcResponse::failure(id, &e)).into_response(),
    }
}

/// Procedure name → MCP tool name.
fn tool_name(procedure: &str) -> String {
    procedure.replace('.', "_")
}

/// MCP tool name → procedure name (namespaces carry no underscores, so
/// only the first underscore is the namespace separator).
fn procedure_name(tool: &str) -> String {
    tool.replacen('_', ".", 1)
}

fn tools_list(state: &AppState) -> Value {
    let tools: Vec<Value> = state
        .procedures
        .iter()
        .map(|p| {
            json!({
                "name": tool_name(p.name),
                "description": p.description,
                "inputSchema": { "type": "object" },
            })
        })
        .collect();
    json!({ "tools": tools })
}

async fn tools_call(state: AppState, headers: HeaderMap, id: Value, params: Value) -> Response {
    let tool = params
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);

    let ctx = context_from_headers(&state.gateway, &headers);
    let outcome = state
        .procedures
        .dispatch(state.gateway.clone(), ctx, &procedure_name(&tool), arguments)
        .await;

    // Tool failures are reported in-band, not as protocol errors.
    let result = match outcome {
        Ok(value) => json!({
            "content": [{
                "type": "text",
                "text": serde_json::to_string(&value).unwrap_or_default(),
            }],
            "isError": false,
        }),
        Err(e) => json!({
            "content": [{ "type": "text", "text": e.to_string() }],
            "isError": true,
        }),
    };
    Json(JsonRpcResponse::success(id, result)).into_response()
}

fn resources_list(state: &AppState) -> Result<Value, relay_core::GatewayError> {
    let resources: Vec<Value> = mcp_ns::collect_resources(&state.gateway)?
        .into_iter()
        .map(|r| {
            json!({
                "uri": r.uri,
                "name": r.name,
                "mimeType": r.mime_type,
            })
        })
        .collect();
    Ok(json!({ "resources": resources }))
}

async fn resources_read(
    state: AppState,
    headers: HeaderMap,
    params: Value,
) -> Result<Value, relay_core::GatewayError> {
    let uri = params.get("uri").and_then(Value::as_str).unwrap_or_default();
    let ctx = context_from_headers(&state.gateway, &headers);
    state
        .procedures
        .dispatch(
            state.gateway.clone(),
            ctx,
            "mcp.readResource",
            json!({ "uri": uri }),
        )
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_name_round_trip() {
        assert_eq!(tool_name("ai.generateText"), "ai_generateText");
        assert_eq!(procedure_name("ai_generateText"), "ai.generateText");
        // Only the namespace separator translates back.
        assert_eq!(procedure_name("auth_storeUserKey"), "auth.storeUserKey");
    }
}
