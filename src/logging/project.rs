// ABOUTME: Project-aware logging utilities for structured, contextual logging
// ABOUTME: Provides logging helpers that automatically include project and agent context
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use tracing::Span;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Context for an upstream system API call
pub struct UpstreamApiContext<'a> {
    /// Project the call is scoped to
    pub project_id: Uuid,
    /// System the call was made against (e.g. "github", "salesforce")
    pub system: &'a str,
    /// Upstream endpoint path
    pub endpoint: &'a str,
    /// HTTP method used
    pub method: &'a str,
    /// Whether the call succeeded
    pub success: bool,
    /// Call duration in milliseconds
    pub duration_ms: u64,
    /// HTTP status code if available
    pub status_code: Option<u16>,
}

/// Project-aware logging utilities
pub struct ProjectLogger;

impl ProjectLogger {
    /// Log a tool call with project context
    pub fn log_tool_call(project_id: Uuid, agent_id: Uuid, tool_name: &str, success: bool, duration_ms: u64) {
        info!(
            project_id = %project_id,
            agent_id = %agent_id,
            tool_name = %tool_name,
            success = %success,
            duration_ms = %duration_ms,
            event_type = "tool_call",
            "tool call completed"
        );
    }

    /// Log an authentication event with project context
    pub fn log_auth_event(
        project_id: Option<Uuid>,
        auth_method: &str,
        success: bool,
        error_details: Option<&str>,
    ) {
        if success {
            info!(
                project_id = ?project_id,
                auth_method = %auth_method,
                success = %success,
                event_type = "authentication",
                "authentication successful"
            );
        } else {
            warn!(
                project_id = ?project_id,
                auth_method = %auth_method,
                success = %success,
                error_details = ?error_details,
                event_type = "authentication",
                "authentication failed"
            );
        }
    }

    /// Log an HTTP request with project context
    pub fn log_http_request(
        project_id: Option<Uuid>,
        method: &str,
        path: &str,
        status_code: u16,
        duration_ms: u64,
    ) {
        if status_code < 400 {
            info!(
                project_id = ?project_id,
                http_method = %method,
                http_path = %path,
                http_status = %status_code,
                duration_ms = %duration_ms,
                event_type = "http_request",
                "HTTP request completed"
            );
        } else {
            warn!(
                project_id = ?project_id,
                http_method = %method,
                http_path = %path,
                http_status = %status_code,
                duration_ms = %duration_ms,
                event_type = "http_request",
                "HTTP request failed"
            );
        }
    }

    /// Log a database operation with project context
    pub fn log_database_operation(
        project_id: Option<Uuid>,
        operation: &str,
        table: &str,
        success: bool,
        duration_ms: u64,
        rows_affected: Option<usize>,
    ) {
        debug!(
            project_id = ?project_id,
            db_operation = %operation,
            db_table = %table,
            success = %success,
            duration_ms = %duration_ms,
            rows_affected = ?rows_affected,
            event_type = "database_operation",
            "database operation completed"
        );
    }

    /// Log a permission-denial security event with project context
    pub fn log_permission_denied(project_id: Uuid, agent_id: Uuid, tool_name: &str, reason: &str) {
        warn!(
            project_id = %project_id,
            agent_id = %agent_id,
            tool_name = %tool_name,
            reason = %reason,
            event_type = "permission_denied",
            "tool call denied by permission layer"
        );
    }

    /// Log an upstream system API call with project context
    pub fn log_upstream_api_call(context: &UpstreamApiContext) {
        debug!(
            project_id = %context.project_id,
            system = %context.system,
            api_endpoint = %context.endpoint,
            api_method = %context.method,
            success = %context.success,
            duration_ms = %context.duration_ms,
            status_code = ?context.status_code,
            event_type = "upstream_api_call",
            "upstream API call completed"
        );
    }
}

/// Record project context in current span
pub fn record_project_context(project_id: Uuid, agent_id: Uuid, auth_method: &str) {
    let span = Span::current();
    span.record("project_id", project_id.to_string())
        .record("agent_id", agent_id.to_string())
        .record("auth_method", auth_method);
}

/// Record request context in current span
pub fn record_request_context(request_id: &str, method: &str, path: &str) {
    let span = Span::current();
    span.record("request_id", request_id)
        .record("http_method", method)
        .record("http_path", path);
}

/// Create a project-aware span for operations
#[macro_export]
macro_rules! project_span {
    (info, $name:expr, $project_id:expr, $agent_id:expr) => {
        tracing::info_span!(
            $name,
            project_id = %$project_id,
            agent_id = %$agent_id,
            duration_ms = tracing::field::Empty,
            success = tracing::field::Empty,
        )
    };
    (debug, $name:expr, $project_id:expr, $agent_id:expr) => {
        tracing::debug_span!(
            $name,
            project_id = %$project_id,
            agent_id = %$agent_id,
            duration_ms = tracing::field::Empty,
            success = tracing::field::Empty,
        )
    };
}
