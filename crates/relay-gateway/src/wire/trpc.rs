//! Typed-procedure RPC shell (`POST /trpc/{proc}`, `GET /trpc/{proc}?input=…`).
//!
//! SDK clients speak a tRPC-style envelope: inputs may arrive bare or
//! wrapped as `{"json": …}` (superset-JSON escapes); outputs come back as
//! `{"result": {"data": {"json": …}}}`. Mutations go over POST, queries
//! over GET; using the wrong verb is itself an error.

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use relay_core::GatewayError;
use serde_json::{Value, json};
use std::collections::HashMap;

use super::http_status;
use crate::server::{AppState, context_from_headers};

/// Unwrap the optional `{"json": …}` envelope.
fn unwrap_envelope(value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.len() == 1 && map.contains_key("json") => {
            map.remove("json").unwrap_or(Value::Null)
        },
        other => other,
    }
}

fn success(value: Value) -> Response {
    Json(json!({ "result": { "data": { "json": value } } })).into_response()
}

fn failure(error: &GatewayError) -> Response {
    let status =
        StatusCode::from_u16(http_status(error)).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = Json(json!({
        "error": {
            "json": {
                "message": error.to_string(),
                "code": error.code(),
                "data": {
                    "code": error.kind(),
                    "httpStatus": status.as_u16(),
                    "detail": error.detail(),
                },
            }
        }
    }));
    (status, body).into_response()
}

async fn run(
    state: AppState,
    headers: HeaderMap,
    procedure: String,
    input: Value,
    is_mutation_call: bool,
) -> Response {
    let Some(descriptor) = state.procedures.get(&procedure) else {
        return failure(&GatewayError::InvalidArgument(format!(
            "unknown procedure: {procedure}"
        )));
    };
    if descriptor.mutation != is_mutation_call {
        let expected = if descriptor.mutation { "POST" } else { "GET" };
        return failure(&GatewayError::InvalidArgument(format!(
            "{procedure} must be called with {expected}"
        )));
    }

    let ctx = context_from_headers(&state.gateway, &headers);
    match state
        .procedures
        .dispatch(state.gateway.clone(), ctx, &procedure, input)
        .await
    {
        Ok(result) => success(result),
        Err(e) => failure(&e),
    }
}

/// `POST /trpc/{proc}` - mutations.
pub(crate) async fn handle_mutation(
    State(state): State<AppState>,
    Path(procedure): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let input = if body.is_empty() {
        Value::Null
    } else {
        match serde_json::from_slice(&body) {
            Ok(value) => unwrap_envelope(value),
            Err(e) => {
                return failure(&GatewayError::InvalidArgument(format!("invalid JSON body: {e}")));
            },
        }
    };
    run(state, headers, procedure, input, true).await
}

/// `GET /trpc/{proc}?input=…` - queries.
pub(crate) async fn handle_query(
    State(state): State<AppState>,
    Path(procedure): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let input = match params.get("input") {
        None => Value::Null,
        Some(raw) => match serde_json::from_str(raw) {
            Ok(value) => unwrap_envelope(value),
            Err(e) => {
                return failure(&GatewayError::InvalidArgument(format!(
                    "invalid input parameter: {e}"
                )));
            },
        },
    };
    run(state, headers, procedure, input, false).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unwrap_envelope() {
        assert_eq!(
            unwrap_envelope(json!({"json": {"a": 1}})),
            json!({"a": 1})
        );
        // Bare inputs pass through.
        assert_eq!(unwrap_envelope(json!({"a": 1})), json!({"a": 1}));
        // A two-key object keeps its "json" member.
        assert_eq!(
            unwrap_envelope(json!({"json": 1, "meta": 2})),
            json!({"json": 1, "meta": 2})
        );
    }
}
