// ABOUTME: Main library entry point for the toolgate MCP gateway
// ABOUTME: Exposes third-party API systems as MCP tools behind layered, auditable permissions
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

// Crate-level attributes:
// - recursion_limit: Increased from default 128 to 256 for complex derive macros
//   (serde, thiserror) on deeply nested types like the catalog/registry models
// - deny(unsafe_code): Zero-tolerance unsafe policy
#![recursion_limit = "256"]
#![deny(unsafe_code)]

//! # Toolgate MCP Gateway
//!
//! A multi-tenant Model Context Protocol (MCP) gateway that exposes third-party API
//! systems — anything describable as a base URL, an auth scheme, and a set of
//! HTTP actions — as MCP tools to AI agents, behind layered per-agent/per-project/
//! per-user permission policies and a full audit trail.
//!
//! ## Architecture
//!
//! - **Catalog** ([`catalog`]): systems, resources, actions, projects, capability packs
//! - **Registry** ([`registry`]): materializes the tool set an `(account, project)` pair sees
//! - **Permissions** ([`permissions`], [`category`]): the seven-step per-call decision algorithm
//! - **Executor** ([`executor`]): dispatches catalog actions as HTTP calls, with auto-pagination
//! - **Audit** ([`audit`]): records reasoning, arguments, and outcomes for every call
//! - **MCP core** ([`mcp`]): the JSON-RPC method dispatch table tying the above together
//! - **Transport** ([`transport`]): Streamable HTTP and stdio framing over the MCP core
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use toolgate_mcp_server::config::environment::ServerConfig;
//! use toolgate_mcp_server::errors::AppResult;
//!
//! #[tokio::main]
//! async fn main() -> AppResult<()> {
//!     let config = ServerConfig::from_env()?;
//!     println!("toolgate configured with port: HTTP={}", config.http_port);
//!     Ok(())
//! }
//! ```

/// Audit logger and the audit tool family
pub mod audit;

/// Cache abstraction layer, used for upstream OAuth2 token caching
pub mod cache;

/// Catalog store: systems, interfaces, resources, actions, projects, capability packs
pub mod catalog;

/// Category resolver: classifies tools and intersects policy layers
pub mod category;

/// Configuration management and persistence
pub mod config;

/// Application constants and safety-cap values
pub mod constants;

/// Upstream credential storage, OAuth2 token refresh
pub mod credentials;

/// Database pool, migrations, and row models
pub mod db;

/// Unified error handling system with standard error codes and HTTP responses
pub mod errors;

/// Action executor: dispatches catalog actions as HTTP calls
pub mod executor;

/// Health checks and readiness probes
pub mod health;

/// Unified JSON-RPC 2.0 foundation for the HTTP and stdio transports
pub mod jsonrpc;

/// Production logging and structured output
pub mod logging;

/// MCP Server Core: JSON-RPC method dispatch over the catalog/permissions/executor/audit stack
pub mod mcp;

/// HTTP middleware for request tracing, auth, and CORS
pub mod middleware;

/// Permission checker: the seven-step decision algorithm gating every tool call
pub mod permissions;

/// Tool registry: materializes system/business/context/audit tools per `(account, project)`
pub mod registry;

/// Streamable HTTP and stdio transports over the MCP Server Core
pub mod transport;

/// Utility functions and helpers (HTTP client, route timeouts, UUID helpers)
pub mod utils;

/// Test utilities for creating consistent test data
#[cfg(any(test, feature = "testing"))]
pub mod test_utils;
