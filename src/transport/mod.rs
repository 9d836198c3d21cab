// ABOUTME: Transport layer — Streamable HTTP and stdio framing over the MCP Server Core
// ABOUTME: Owns session lifecycle; the transports themselves only frame and route bytes
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

/// Streamable HTTP transport: POST/GET/DELETE on a single MCP endpoint.
pub mod http;

/// Session manager: authentication, lifecycle, and per-session dispatch serialization.
pub mod session;

/// Length-prefixed JSON-RPC framing over stdin/stdout, one session per process.
pub mod stdio;

pub use session::{ActiveSession, SessionManager, SessionState};
