// ABOUTME: Server health monitoring and system status checks for operational visibility
// ABOUTME: Provides health endpoints backed by database and cache connectivity checks
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Health check endpoints and monitoring utilities

use crate::cache::factory::Cache;
use crate::constants::protocol;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;
use tracing::{error, info};

/// Overall health status
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Overall service status
    pub status: HealthStatus,
    /// Service information
    pub service: ServiceInfo,
    /// Individual component checks
    pub checks: Vec<ComponentHealth>,
    /// Response timestamp (unix seconds)
    pub timestamp: u64,
    /// Response time in milliseconds
    pub response_time_ms: u64,
}

/// Service information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInfo {
    /// Service name
    pub name: String,
    /// Service version
    pub version: String,
    /// Environment (development, staging, production)
    pub environment: String,
    /// Service uptime in seconds
    pub uptime_seconds: u64,
}

/// Individual component health status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    /// Component name
    pub name: String,
    /// Component status
    pub status: HealthStatus,
    /// Status description
    pub message: String,
    /// Check duration in milliseconds
    pub duration_ms: u64,
}

/// Anything that can report its own connectivity health, implemented by the database store
#[async_trait::async_trait]
pub trait HealthCheckable: Send + Sync {
    /// Verify the backing store is reachable and responsive
    ///
    /// # Errors
    ///
    /// Returns an error describing why the backend is unreachable
    async fn health_check(&self) -> anyhow::Result<()>;
}

/// Health checker for the gateway server
pub struct HealthChecker {
    start_time: Instant,
    database: Arc<dyn HealthCheckable>,
    cache: Arc<Cache>,
    environment: String,
    cached_status: RwLock<Option<(HealthResponse, Instant)>>,
    cache_ttl: Duration,
}

impl HealthChecker {
    /// Create a new health checker
    #[must_use]
    pub fn new(database: Arc<dyn HealthCheckable>, cache: Arc<Cache>, environment: String) -> Self {
        Self {
            start_time: Instant::now(),
            database,
            cache,
            environment,
            cached_status: RwLock::new(None),
            cache_ttl: Duration::from_secs(30),
        }
    }

    fn service_info(&self) -> ServiceInfo {
        ServiceInfo {
            name: protocol::SERVER_NAME.into(),
            version: protocol::SERVER_VERSION.into(),
            environment: self.environment.clone(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// Perform a basic health check (fast, suitable for load balancer probes)
    #[must_use]
    pub fn basic_health(&self) -> HealthResponse {
        let start = Instant::now();
        HealthResponse {
            status: HealthStatus::Healthy,
            service: self.service_info(),
            checks: vec![ComponentHealth {
                name: "service".into(),
                status: HealthStatus::Healthy,
                message: "service is running".into(),
                duration_ms: 0,
            }],
            timestamp: unix_now(),
            response_time_ms: elapsed_ms(start),
        }
    }

    /// Perform a comprehensive health check of every backing dependency
    pub async fn comprehensive_health(&self) -> HealthResponse {
        let start = Instant::now();

        {
            let cached = self.cached_status.read().await;
            if let Some((response, cached_at)) = cached.as_ref() {
                if cached_at.elapsed() < self.cache_ttl {
                    return response.clone();
                }
            }
        }

        info!("performing comprehensive health check");

        let checks = vec![self.check_database().await, self.check_cache().await];

        let status = if checks.iter().any(|c| c.status == HealthStatus::Unhealthy) {
            HealthStatus::Unhealthy
        } else if checks.iter().any(|c| c.status == HealthStatus::Degraded) {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        let response = HealthResponse {
            status,
            service: self.service_info(),
            checks,
            timestamp: unix_now(),
            response_time_ms: elapsed_ms(start),
        };

        *self.cached_status.write().await = Some((response.clone(), Instant::now()));
        response
    }

    async fn check_database(&self) -> ComponentHealth {
        let start = Instant::now();
        match self.database.health_check().await {
            Ok(()) => ComponentHealth {
                name: "database".into(),
                status: HealthStatus::Healthy,
                message: "database is accessible".into(),
                duration_ms: elapsed_ms(start),
            },
            Err(e) => {
                error!("database health check failed: {}", e);
                ComponentHealth {
                    name: "database".into(),
                    status: HealthStatus::Unhealthy,
                    message: format!("database check failed: {e}"),
                    duration_ms: elapsed_ms(start),
                }
            }
        }
    }

    async fn check_cache(&self) -> ComponentHealth {
        let start = Instant::now();
        match self.cache.health_check().await {
            Ok(()) => ComponentHealth {
                name: "cache".into(),
                status: HealthStatus::Healthy,
                message: "cache is responsive".into(),
                duration_ms: elapsed_ms(start),
            },
            Err(e) => ComponentHealth {
                name: "cache".into(),
                status: HealthStatus::Degraded,
                message: format!("cache check failed: {e}"),
                duration_ms: elapsed_ms(start),
            },
        }
    }

    /// Readiness probe: service is ready only if the database is reachable
    pub async fn readiness(&self) -> HealthResponse {
        let mut response = self.basic_health();
        let db_check = self.check_database().await;
        response.status = if db_check.status == HealthStatus::Healthy {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        };
        response.checks.push(db_check);
        response
    }

    /// Liveness probe: service is alive if the process is responding at all
    #[must_use]
    pub fn liveness(&self) -> HealthResponse {
        self.basic_health()
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Axum routes for `/health`, `/ready`, and `/live`
pub mod routes {
    use super::{HealthChecker, HealthStatus};
    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use axum::routing::get;
    use axum::{Json, Router};
    use std::sync::Arc;

    async fn health_handler(State(checker): State<Arc<HealthChecker>>) -> impl IntoResponse {
        let response = checker.comprehensive_health().await;
        let status = match response.status {
            HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
            HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        };
        (status, Json(response))
    }

    async fn readiness_handler(State(checker): State<Arc<HealthChecker>>) -> impl IntoResponse {
        let response = checker.readiness().await;
        let status = match response.status {
            HealthStatus::Healthy => StatusCode::OK,
            _ => StatusCode::SERVICE_UNAVAILABLE,
        };
        (status, Json(response))
    }

    async fn liveness_handler(State(checker): State<Arc<HealthChecker>>) -> impl IntoResponse {
        Json(checker.liveness())
    }

    /// Build the health check router, mounted under the server's root router
    #[must_use]
    pub fn router(checker: Arc<HealthChecker>) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/ready", get(readiness_handler))
            .route("/live", get(liveness_handler))
            .with_state(checker)
    }
}
