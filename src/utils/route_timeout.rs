// ABOUTME: Configurable timeout utilities for route handlers to prevent hanging operations
// ABOUTME: Provides timeout wrappers for database and upstream API operations
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use crate::errors::AppError;
use std::future::Future;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::time::timeout;

/// Timeout durations applied to route handler operations
#[derive(Debug, Clone)]
pub struct RouteTimeoutConfig {
    /// Timeout for database queries
    pub database_timeout_secs: u64,
    /// Timeout for outbound calls to upstream systems (the action executor)
    pub upstream_api_timeout_secs: u64,
    /// Timeout for SSE event delivery
    pub sse_event_timeout_secs: u64,
}

impl Default for RouteTimeoutConfig {
    fn default() -> Self {
        Self {
            database_timeout_secs: 10,
            upstream_api_timeout_secs: 30,
            sse_event_timeout_secs: 15,
        }
    }
}

static ROUTE_TIMEOUT_CONFIG: OnceLock<RouteTimeoutConfig> = OnceLock::new();

/// Initialize route timeout configuration
///
/// Must be called once at server startup before any route handlers use timeouts.
///
/// # Panics
/// Panics if called more than once (configuration cannot be changed after initialization)
pub fn initialize_route_timeouts(config: RouteTimeoutConfig) {
    assert!(
        ROUTE_TIMEOUT_CONFIG.set(config).is_ok(),
        "Route timeout configuration already initialized"
    );
}

fn get_config() -> &'static RouteTimeoutConfig {
    static DEFAULT_CONFIG: OnceLock<RouteTimeoutConfig> = OnceLock::new();
    ROUTE_TIMEOUT_CONFIG
        .get()
        .unwrap_or_else(|| DEFAULT_CONFIG.get_or_init(RouteTimeoutConfig::default))
}

/// Execute a database operation with the configured timeout
///
/// # Errors
///
/// Returns an error if the operation times out or the operation itself fails
pub async fn with_database_timeout<F, T, E>(operation: F) -> Result<T, anyhow::Error>
where
    F: Future<Output = Result<T, E>>,
    E: Into<anyhow::Error>,
{
    let config = get_config();
    let duration = Duration::from_secs(config.database_timeout_secs);

    (timeout(duration, operation).await).map_or_else(
        |_| {
            Err(AppError::internal(format!(
                "database operation timed out after {}s",
                config.database_timeout_secs
            ))
            .into())
        },
        |result| result.map_err(Into::into),
    )
}

/// Execute a call to an upstream system with the configured timeout
///
/// # Errors
///
/// Returns an error if the operation times out or the operation itself fails
pub async fn with_upstream_api_timeout<F, T, E>(operation: F) -> Result<T, anyhow::Error>
where
    F: Future<Output = Result<T, E>>,
    E: Into<anyhow::Error>,
{
    let config = get_config();
    let duration = Duration::from_secs(config.upstream_api_timeout_secs);

    (timeout(duration, operation).await).map_or_else(
        |_| {
            Err(AppError::internal(format!(
                "upstream API operation timed out after {}s",
                config.upstream_api_timeout_secs
            ))
            .into())
        },
        |result| result.map_err(Into::into),
    )
}

/// Execute an SSE event delivery with the configured timeout
///
/// # Errors
///
/// Returns an error if the operation times out or the operation itself fails
pub async fn with_sse_timeout<F, T, E>(operation: F) -> Result<T, anyhow::Error>
where
    F: Future<Output = Result<T, E>>,
    E: Into<anyhow::Error>,
{
    let config = get_config();
    let duration = Duration::from_secs(config.sse_event_timeout_secs);

    (timeout(duration, operation).await).map_or_else(
        |_| {
            Err(AppError::internal(format!(
                "SSE event operation timed out after {}s",
                config.sse_event_timeout_secs
            ))
            .into())
        },
        |result| result.map_err(Into::into),
    )
}

/// Database timeout duration for manual timeout handling
#[must_use]
pub fn database_timeout_duration() -> Duration {
    Duration::from_secs(get_config().database_timeout_secs)
}

/// Upstream API timeout duration for manual timeout handling
#[must_use]
pub fn upstream_api_timeout_duration() -> Duration {
    Duration::from_secs(get_config().upstream_api_timeout_secs)
}
