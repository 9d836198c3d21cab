// ABOUTME: API key extraction for the Streamable HTTP transport
// ABOUTME: Pulls the raw key out of the Authorization header or ?api_key= query param

use crate::errors::AppError;
use crate::utils::auth::extract_bearer_token_from_option;
use axum::extract::{FromRequestParts, Query};
use axum::http::request::Parts;
use serde::Deserialize;

#[derive(Deserialize)]
struct ApiKeyQuery {
    api_key: Option<String>,
}

/// Raw, unverified API key extracted from an inbound request.
///
/// Verification against the API key store happens in the MCP dispatch layer, which
/// needs the project/agent it resolves to rather than a boolean pass/fail.
#[derive(Debug, Clone)]
pub struct RawApiKey(pub String);

impl<S> FromRequestParts<S> for RawApiKey
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());

        if let Ok(token) = extract_bearer_token_from_option(header) {
            return Ok(Self(token.to_string()));
        }

        let Query(query) = Query::<ApiKeyQuery>::from_request_parts(parts, state)
            .await
            .map_err(|_| AppError::auth_required())?;

        query
            .api_key
            .map(Self)
            .ok_or_else(AppError::auth_required)
    }
}
