// ABOUTME: MCP bridge client connecting stdio-speaking agents to a running gateway over HTTP
// ABOUTME: Stateless aside from the session id: reads JSON-RPC lines from stdin, forwards them, prints responses
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! Bridge client.
//!
//! Some MCP clients only speak stdio. This binary adapts that to a gateway running the
//! Streamable HTTP transport: it reads one JSON-RPC message per line from stdin, POSTs it
//! to the server with the configured API key, remembers the `Mcp-Session-Id` the server
//! hands back, and prints the JSON-RPC response to stdout.

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::Value;
use std::env;
use std::io::{self, BufRead, Write};
use tracing::{debug, error, info};

#[derive(Parser)]
#[command(name = "toolgate-mcp-client")]
#[command(about = "Bridges a stdio MCP client to a toolgate gateway over HTTP")]
struct Args {
    /// Gateway base URL
    #[arg(long, default_value = "http://localhost:8080")]
    server_url: String,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.debug { "debug" } else { "warn" };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let api_key = env::var("MCP_API_KEY").context("MCP_API_KEY environment variable is required")?;
    let client = reqwest::Client::new();
    let endpoint = format!("{}/mcp/v1", args.server_url.trim_end_matches('/'));

    info!(server = %args.server_url, "toolgate bridge client starting");

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut session_id: Option<String> = None;

    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let request: Value = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                error!("invalid JSON-RPC request: {e}");
                continue;
            }
        };

        debug!("forwarding: {request}");
        match forward(&client, &endpoint, &api_key, session_id.as_deref(), &request).await {
            Ok((response, new_session_id)) => {
                if new_session_id.is_some() {
                    session_id = new_session_id;
                }
                if let Some(response) = response {
                    let serialized = serde_json::to_string(&response)?;
                    writeln!(stdout, "{serialized}")?;
                    stdout.flush()?;
                }
            }
            Err(e) => error!("request failed: {e}"),
        }
    }

    Ok(())
}

/// POST one JSON-RPC message and return its response (`None` for a notification, which the
/// server acknowledges with a bare 202) plus any `Mcp-Session-Id` the server assigned.
async fn forward(
    client: &reqwest::Client,
    endpoint: &str,
    api_key: &str,
    session_id: Option<&str>,
    request: &Value,
) -> Result<(Option<Value>, Option<String>)> {
    let mut builder = client.post(endpoint).bearer_auth(api_key).json(request);
    if let Some(id) = session_id {
        builder = builder.header("Mcp-Session-Id", id);
    }

    let response = builder.send().await.context("sending request to gateway")?;
    let new_session_id =
        response.headers().get("mcp-session-id").and_then(|v| v.to_str().ok()).map(str::to_owned);

    if response.status() == reqwest::StatusCode::ACCEPTED {
        return Ok((None, new_session_id));
    }
    if !response.status().is_success() {
        anyhow::bail!("gateway returned {}", response.status());
    }

    let body: Value = response.json().await.context("parsing gateway response")?;
    Ok((Some(body), new_session_id))
}
