// ABOUTME: Gateway server entry point — wires config, database, gateway state, and transports
// ABOUTME: Serves Streamable HTTP + health endpoints; `--stdio` switches to the stdio transport
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use anyhow::{Context, Result};
use std::sync::Arc;
use toolgate_mcp_server::cache::factory::Cache;
use toolgate_mcp_server::config::environment::ServerConfig;
use toolgate_mcp_server::credentials::CredentialStore;
use toolgate_mcp_server::db::DbPool;
use toolgate_mcp_server::health::{routes, HealthChecker};
use toolgate_mcp_server::mcp::GatewayState;
use toolgate_mcp_server::middleware::setup_cors;
use toolgate_mcp_server::transport::{http, session::SessionManager, stdio};
use toolgate_mcp_server::utils::route_timeout::{initialize_route_timeouts, RouteTimeoutConfig};
use tower_http::trace::TraceLayer;

#[tokio::main]
async fn main() -> Result<()> {
    let config = ServerConfig::from_env().context("failed to load configuration")?;
    config.validate().context("invalid configuration")?;
    toolgate_mcp_server::logging::init_from_env().context("failed to initialize logging")?;
    tracing::info!("{}", config.summary());

    initialize_route_timeouts(RouteTimeoutConfig::default());

    let db = DbPool::connect(&config.database).await.context("failed to connect to database")?;
    let credentials = CredentialStore::new(db.clone());
    let state = Arc::new(GatewayState::new(db.clone(), credentials));

    if std::env::args().any(|a| a == "--stdio") {
        let api_key = std::env::var("MCP_API_KEY").context("MCP_API_KEY is required for --stdio")?;
        let manager = Arc::new(SessionManager::new(state, config.session));
        return stdio::run(manager, &api_key).await.map_err(|e| anyhow::anyhow!("{e}"));
    }

    let manager = Arc::new(SessionManager::new(state, config.session));
    let cache = Arc::new(Cache::from_env().await.context("failed to initialize cache")?);
    let health_checker = Arc::new(HealthChecker::new(Arc::new(db), cache, config.environment.to_string()));

    let app = axum::Router::new()
        .merge(http::router(manager, "/mcp/v1"))
        .merge(routes::router(health_checker))
        .layer(setup_cors(&config.security))
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.http_port))
        .await
        .with_context(|| format!("failed to bind {}", config.http_port))?;
    tracing::info!(port = config.http_port, "listening");
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
