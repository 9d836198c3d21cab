// ABOUTME: OAuth2 password grant helper shared by the credential store and action executor
// ABOUTME: Exchanges username/password for a bearer token against a configurable token endpoint
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use crate::constants::credentials::REFRESH_SAFETY_MARGIN_SECS;
use crate::errors::{AppError, AppResult};
use crate::utils::http_client::oauth_client;
use chrono::{DateTime, Utc};
use serde_json::Value;

/// Result of a successful OAuth2 password-grant token exchange
#[derive(Debug, Clone)]
pub struct PasswordGrantToken {
    /// Bearer access token to attach to subsequent requests
    pub access_token: String,
    /// Absolute expiry, already adjusted by the refresh safety margin
    pub expires_at: DateTime<Utc>,
}

/// Which JSON fields in the token endpoint's response carry the access token and its lifetime
#[derive(Debug, Clone)]
pub struct TokenFieldNames {
    /// Field holding the bearer token, default `"access_token"`
    pub access_token: String,
    /// Field holding the token lifetime in seconds, default `"expires_in"`
    pub expires_in: String,
}

impl Default for TokenFieldNames {
    fn default() -> Self {
        Self {
            access_token: "access_token".into(),
            expires_in: "expires_in".into(),
        }
    }
}

/// Perform an OAuth2 `grant_type=password` token exchange.
///
/// Posts `application/x-www-form-urlencoded` form data per RFC 6749 §4.3 and parses the
/// response using the interface's configured field names, applying a safety margin to
/// the reported expiry so callers refresh slightly before the upstream actually expires it.
///
/// # Errors
///
/// Returns an error if the HTTP request fails, the endpoint returns a non-success
/// status, or the response body is missing the configured access-token field.
pub async fn password_grant(
    token_url: &str,
    username: &str,
    password: &str,
    fields: &TokenFieldNames,
) -> AppResult<PasswordGrantToken> {
    let client = oauth_client();

    let response = client
        .post(token_url)
        .form(&[
            ("grant_type", "password"),
            ("username", username),
            ("password", password),
        ])
        .send()
        .await
        .map_err(|e| AppError::external_auth_failed(format!("token request failed: {e}")))?;

    if !response.status().is_success() {
        let status = response.status();
        return Err(AppError::external_auth_failed(format!(
            "token endpoint returned {status}"
        )));
    }

    let body: Value = response
        .json()
        .await
        .map_err(|e| AppError::external_auth_failed(format!("invalid token response: {e}")))?;

    let access_token = body
        .get(&fields.access_token)
        .and_then(Value::as_str)
        .ok_or_else(|| {
            AppError::external_auth_failed(format!(
                "token response missing '{}' field",
                fields.access_token
            ))
        })?
        .to_string();

    let expires_in = body
        .get(&fields.expires_in)
        .and_then(Value::as_i64)
        .unwrap_or(3600);

    let expires_at = Utc::now()
        + chrono::Duration::seconds((expires_in - REFRESH_SAFETY_MARGIN_SECS).max(0));

    Ok(PasswordGrantToken {
        access_token,
        expires_at,
    })
}

/// Whether a cached token is still usable, i.e. its (already margin-adjusted) expiry is in the future
#[must_use]
pub fn is_token_valid(expires_at: DateTime<Utc>) -> bool {
    Utc::now() < expires_at
}
