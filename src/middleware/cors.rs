// ABOUTME: CORS middleware configuration for HTTP API endpoints
// ABOUTME: Provides Cross-Origin Resource Sharing setup for web client access

use crate::config::environment::SecurityConfig;
use tower_http::cors::{AllowOrigin, CorsLayer};

/// Build a `tower_http` CORS layer from the configured allowed origins
///
/// Allows cross-origin requests with standard headers plus the gateway's own
/// `Mcp-Session-Id` and API key headers.
#[must_use]
pub fn setup_cors(security: &SecurityConfig) -> CorsLayer {
    let origin = if security.cors_origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        let origins = security
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect::<Vec<_>>();
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([
            http::Method::GET,
            http::Method::POST,
            http::Method::DELETE,
            http::Method::OPTIONS,
        ])
        .allow_headers([
            http::header::CONTENT_TYPE,
            http::header::AUTHORIZATION,
            http::header::ACCEPT,
            http::HeaderName::from_static("mcp-session-id"),
            http::HeaderName::from_static("x-api-key"),
        ])
}
