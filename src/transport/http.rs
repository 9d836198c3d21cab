// ABOUTME: Streamable HTTP transport — single endpoint handling POST/GET/DELETE
// ABOUTME: JSON-RPC 2.0 over HTTP with SSE streaming for batches and server-initiated notifications
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! Streamable HTTP transport.
//!
//! One route, three methods:
//! - `POST` dispatches a JSON-RPC message or batch, authenticating via `Authorization: Bearer`
//!   or `?api_key=`. A request carrying `Mcp-Session-Id` is routed to that existing session;
//!   otherwise a new one is created and the id is returned in the response header.
//! - `GET` opens a long-lived SSE stream for server-initiated notifications on an existing
//!   session.
//! - `DELETE` closes the referenced session.

use crate::constants::sessions as session_limits;
use crate::errors::{AppError, AppResult};
use crate::jsonrpc::{JsonRpcRequest, JsonRpcResponse};
use crate::middleware::RawApiKey;
use crate::transport::session::SessionManager;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, MethodRouter};
use axum::{Json, Router};
use futures_util::stream::Stream;
use serde_json::Value;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

const SESSION_HEADER: &str = "mcp-session-id";
const PROJECT_OVERRIDE_HEADER: &str = "x-project-id";

/// Build the `{prefix}/mcp/v1` route, mounted under the server's root router.
#[must_use]
pub fn router(manager: Arc<SessionManager>, path: &str) -> Router {
    Router::new().route(path, mcp_method_router()).with_state(manager)
}

fn mcp_method_router() -> MethodRouter<Arc<SessionManager>> {
    get(handle_get).post(handle_post).delete(handle_delete)
}

fn session_header_value(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get(HeaderName::from_static(SESSION_HEADER))
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
}

fn project_override_header(headers: &HeaderMap) -> AppResult<Option<Uuid>> {
    let Some(raw) = headers.get(HeaderName::from_static(PROJECT_OVERRIDE_HEADER)) else {
        return Ok(None);
    };
    let raw = raw.to_str().map_err(|_| AppError::invalid_input("X-Project-Id is not valid UTF-8"))?;
    Ok(Some(Uuid::parse_str(raw).map_err(|_| AppError::invalid_input("X-Project-Id is not a valid UUID"))?))
}

fn accepts_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get(axum::http::header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.contains("text/event-stream"))
}

/// `POST {prefix}/mcp/v1`: dispatch a single JSON-RPC message or a batch array.
async fn handle_post(
    State(manager): State<Arc<SessionManager>>,
    RawApiKey(raw_key): RawApiKey,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<Response, AppError> {
    let payload: Value =
        serde_json::from_slice(&body).map_err(|e| AppError::invalid_input(format!("invalid JSON-RPC payload: {e}")))?;
    let is_batch = payload.is_array();
    let messages: Vec<JsonRpcRequest> = match payload {
        Value::Array(items) => items
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<_, _>>()
            .map_err(|e| AppError::invalid_input(format!("invalid JSON-RPC message in batch: {e}")))?,
        other => vec![serde_json::from_value(other)
            .map_err(|e| AppError::invalid_input(format!("invalid JSON-RPC message: {e}")))?],
    };

    let session_id = match session_header_value(&headers) {
        Some(id) => id,
        None => {
            let api_key = manager.authenticate(&raw_key).await?;
            let project_override = project_override_header(&headers)?;
            manager.create_session(&api_key, project_override).await?
        }
    };

    let active = manager.acquire(session_id).await?;
    let mut responses: Vec<JsonRpcResponse> = Vec::with_capacity(messages.len());
    for message in messages {
        if let Some(response) = active.mcp.dispatch(message).await {
            responses.push(response);
        }
    }
    drop(active);

    let mut headers_out = HeaderMap::new();
    headers_out.insert(
        HeaderName::from_static(SESSION_HEADER),
        session_id.to_string().parse().unwrap_or_else(|_| "".parse().expect("ascii uuid is valid header value")),
    );

    if responses.is_empty() {
        return Ok((StatusCode::ACCEPTED, headers_out).into_response());
    }

    if accepts_event_stream(&headers) {
        let stream = futures_util::stream::iter(responses.into_iter().map(|response| {
            let data = serde_json::to_string(&response).unwrap_or_else(|_| "{}".to_owned());
            Ok::<_, Infallible>(Event::default().data(data))
        }));
        return Ok((headers_out, Sse::new(stream).keep_alive(KeepAlive::new())).into_response());
    }

    let body = if is_batch { Value::Array(responses.iter().map(|r| serde_json::to_value(r).unwrap_or(Value::Null)).collect()) } else {
        serde_json::to_value(&responses[0]).unwrap_or(Value::Null)
    };
    Ok((headers_out, Json(body)).into_response())
}

/// `GET {prefix}/mcp/v1`: a long-lived SSE stream for server-initiated notifications.
///
/// Sends one `session` event, then an `initialized` notification, then a `: keepalive` comment
/// every [`session_limits::SSE_KEEPALIVE_SECS`] seconds until the session is closed.
async fn handle_get(
    State(manager): State<Arc<SessionManager>>,
    headers: HeaderMap,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let session_id = session_header_value(&headers).ok_or_else(|| AppError::session_not_found("missing Mcp-Session-Id"))?;
    manager.acquire(session_id).await?;

    let stream = async_stream::stream! {
        yield Ok::<_, Infallible>(
            Event::default().event("session").data(serde_json::json!({ "sessionId": session_id }).to_string()),
        );
        yield Ok(
            Event::default()
                .event("notification")
                .data(serde_json::json!({ "jsonrpc": "2.0", "method": "initialized" }).to_string()),
        );

        loop {
            tokio::time::sleep(Duration::from_secs(session_limits::SSE_KEEPALIVE_SECS)).await;
            if manager.state_of(session_id) == crate::transport::session::SessionState::Closed {
                break;
            }
        }
    };

    Ok(Sse::new(stream)
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(session_limits::SSE_KEEPALIVE_SECS)).text("keepalive")))
}

/// `DELETE {prefix}/mcp/v1`: close the session named by `Mcp-Session-Id`.
async fn handle_delete(State(manager): State<Arc<SessionManager>>, headers: HeaderMap) -> Result<StatusCode, AppError> {
    let session_id = session_header_value(&headers).ok_or_else(|| AppError::session_not_found("missing Mcp-Session-Id"))?;
    if manager.close(session_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Ok(StatusCode::NOT_FOUND)
    }
}
