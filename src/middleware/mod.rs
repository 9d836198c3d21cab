// ABOUTME: HTTP middleware for request tracing, authentication, and context propagation
// ABOUTME: Provides request ID generation, span creation, and project context for structured logging

pub mod auth;
pub mod cors;
pub mod tracing;

// API key extraction
pub use auth::RawApiKey;

// CORS configuration
pub use cors::setup_cors;

// Request tracing and context management
pub use tracing::{create_database_span, create_mcp_span, create_request_span, RequestContext};
