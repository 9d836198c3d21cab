// ABOUTME: Stdio transport — length-prefixed JSON-RPC frames over stdin/stdout
// ABOUTME: One process, one session: authenticates once at startup, then frames forever
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! Stdio transport.
//!
//! Frames are `Content-Length: N\r\n\r\n` followed by exactly `N` bytes of UTF-8 JSON, the
//! same framing LSP-style tools use. One session backs the whole process lifetime; it is
//! created at startup from the `MCP_API_KEY` the caller supplies and torn down on EOF.

use crate::errors::{AppError, AppResult};
use crate::jsonrpc::JsonRpcRequest;
use crate::transport::session::SessionManager;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};

const CONTENT_LENGTH_HEADER: &str = "content-length";

/// Run the stdio loop to completion: authenticate once, then frame requests/responses over
/// stdin/stdout until the input stream closes.
pub async fn run(manager: Arc<SessionManager>, raw_key: &str) -> AppResult<()> {
    let api_key = manager.authenticate(raw_key).await?;
    let session_id = manager.create_session(&api_key, None).await?;

    let stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();
    let mut reader = BufReader::new(stdin);

    loop {
        let Some(body) = read_frame(&mut reader).await? else {
            break;
        };

        let request: JsonRpcRequest = match serde_json::from_slice(&body) {
            Ok(request) => request,
            Err(_) => continue,
        };

        let active = manager.acquire(session_id).await?;
        let response = active.mcp.dispatch(request).await;
        drop(active);

        if let Some(response) = response {
            write_frame(&mut stdout, &response).await?;
        }
    }

    manager.close(session_id).await?;
    Ok(())
}

/// Read one `Content-Length` header block followed by its body. Returns `Ok(None)` on clean EOF
/// before any header bytes are read.
async fn read_frame<R: AsyncBufReadExt + Unpin>(reader: &mut R) -> AppResult<Option<Vec<u8>>> {
    let mut content_length: Option<usize> = None;
    let mut saw_any_header = false;

    loop {
        let mut line = String::new();
        let bytes_read = reader
            .read_line(&mut line)
            .await
            .map_err(|e| AppError::internal(format!("stdio read failed: {e}")))?;

        if bytes_read == 0 {
            return if saw_any_header {
                Err(AppError::internal("stdio stream closed mid-frame"))
            } else {
                Ok(None)
            };
        }

        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            break;
        }

        saw_any_header = true;
        if let Some((name, value)) = trimmed.split_once(':') {
            if name.trim().eq_ignore_ascii_case(CONTENT_LENGTH_HEADER) {
                content_length = value
                    .trim()
                    .parse()
                    .map_err(|_| AppError::invalid_input("invalid Content-Length header"))?;
            }
        }
    }

    let length = content_length.ok_or_else(|| AppError::invalid_input("missing Content-Length header"))?;
    let mut body = vec![0_u8; length];
    reader
        .read_exact(&mut body)
        .await
        .map_err(|e| AppError::internal(format!("stdio body read failed: {e}")))?;
    Ok(Some(body))
}

async fn write_frame<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    response: &crate::jsonrpc::JsonRpcResponse,
) -> AppResult<()> {
    let body = serde_json::to_vec(response).map_err(|e| AppError::internal(format!("response serialization failed: {e}")))?;
    let header = format!("Content-Length: {}\r\n\r\n", body.len());
    writer
        .write_all(header.as_bytes())
        .await
        .map_err(|e| AppError::internal(format!("stdio write failed: {e}")))?;
    writer.write_all(&body).await.map_err(|e| AppError::internal(format!("stdio write failed: {e}")))?;
    writer.flush().await.map_err(|e| AppError::internal(format!("stdio flush failed: {e}")))?;
    Ok(())
}
