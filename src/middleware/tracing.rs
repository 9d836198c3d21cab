// ABOUTME: Request tracing middleware for correlation and structured logging
// ABOUTME: Generates request IDs and creates spans for all HTTP requests with project context

use tracing::Span;
use uuid::Uuid;

/// Request context that flows through the entire request lifecycle
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Correlation ID for this request, either forwarded from `x-request-id` or generated
    pub request_id: String,
    /// Project the request resolved to, once authenticated
    pub project_id: Option<Uuid>,
    /// Agent identity the request resolved to, once authenticated
    pub agent_id: Option<Uuid>,
    /// How the request authenticated (e.g. "api_key")
    pub auth_method: Option<String>,
}

impl RequestContext {
    /// Create a new request context with a generated request ID
    #[must_use]
    pub fn new() -> Self {
        Self {
            request_id: format!("req_{}", Uuid::new_v4().simple()),
            project_id: None,
            agent_id: None,
            auth_method: None,
        }
    }

    /// Create a request context, reusing an inbound `x-request-id` header if present
    #[must_use]
    pub fn from_header(request_id: Option<String>) -> Self {
        Self {
            request_id: request_id.unwrap_or_else(|| format!("req_{}", Uuid::new_v4().simple())),
            project_id: None,
            agent_id: None,
            auth_method: None,
        }
    }

    /// Attach resolved authentication identity to the context
    #[must_use]
    pub fn with_auth(mut self, project_id: Uuid, agent_id: Uuid, auth_method: String) -> Self {
        self.project_id = Some(project_id);
        self.agent_id = Some(agent_id);
        self.auth_method = Some(auth_method);
        self
    }

    /// Record this context's fields in the current tracing span
    pub fn record_in_span(&self) {
        let span = Span::current();
        span.record("request_id", &self.request_id);

        if let Some(project_id) = &self.project_id {
            span.record("project_id", project_id.to_string());
        }
        if let Some(agent_id) = &self.agent_id {
            span.record("agent_id", agent_id.to_string());
        }
        if let Some(auth_method) = &self.auth_method {
            span.record("auth_method", auth_method);
        }
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Create a tracing span for HTTP requests
#[must_use]
pub fn create_request_span(method: &str, path: &str) -> tracing::Span {
    tracing::info_span!(
        "http_request",
        method = %method,
        path = %path,
        request_id = tracing::field::Empty,
        project_id = tracing::field::Empty,
        agent_id = tracing::field::Empty,
        auth_method = tracing::field::Empty,
        status_code = tracing::field::Empty,
        duration_ms = tracing::field::Empty,
    )
}

/// Create a tracing span for MCP JSON-RPC dispatch
#[must_use]
pub fn create_mcp_span(method: &str) -> tracing::Span {
    tracing::info_span!(
        "mcp_dispatch",
        method = %method,
        request_id = tracing::field::Empty,
        project_id = tracing::field::Empty,
        agent_id = tracing::field::Empty,
        tool_name = tracing::field::Empty,
        duration_ms = tracing::field::Empty,
        success = tracing::field::Empty,
    )
}

/// Create a tracing span for database operations
#[must_use]
pub fn create_database_span(operation: &str, table: &str) -> tracing::Span {
    tracing::debug_span!(
        "database_operation",
        operation = %operation,
        table = %table,
        request_id = tracing::field::Empty,
        project_id = tracing::field::Empty,
        duration_ms = tracing::field::Empty,
        rows_affected = tracing::field::Empty,
    )
}
