// ABOUTME: Audit logger — sanitization, summarization, and the Begin/SetResult/SetError/SetRollback contract
// ABOUTME: Also implements the audit tool family (explain_action, get_related_actions, rollback_action, query_audit)
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! Audit logger.
//!
//! Every tool call opens an audit entry with [`AuditLogger::begin`], then closes it with
//! exactly one of [`AuditLogger::set_result`] or [`AuditLogger::set_error`] — the caller is
//! responsible for calling one of these even on a panic-free early return, so the entry
//! never sits in `Pending` forever. Parameters and results are sanitized and summarized
//! before they ever reach storage; nothing downstream of this module should have to redact
//! secrets again.

use crate::constants::audit as audit_limits;
use crate::db::models::{AuditEntry, AuditStatus, AuditToolType};
use crate::db::DbPool;
use crate::errors::{AppError, AppResult};
use chrono::Utc;
use rand::RngCore;
use serde_json::{Map, Value};
use sqlx::Row;
use uuid::Uuid;

/// Redact sensitive keys and truncate long strings from a parameter/result map before storage.
#[must_use]
pub fn sanitize(value: &Value) -> Value {
    sanitize_depth(value, 0)
}

fn sanitize_depth(value: &Value, depth: usize) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::new();
            for (k, v) in map {
                if is_sensitive_key(k) {
                    out.insert(k.clone(), Value::String("[REDACTED]".into()));
                } else {
                    out.insert(k.clone(), sanitize_depth(v, depth + 1));
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(|v| sanitize_depth(v, depth + 1)).collect()),
        Value::String(s) if s.len() > audit_limits::MAX_PARAM_STRING_LEN => {
            Value::String(format!("{}... [truncated]", truncate_at_char_boundary(s, audit_limits::MAX_PARAM_STRING_LEN)))
        }
        other => other.clone(),
    }
}

/// Truncate `s` to at most `max_bytes` bytes, rounding down to the nearest `char` boundary so
/// a multi-byte character straddling the cut point is dropped whole rather than splitting it
/// (which would panic on a raw byte-index slice).
fn truncate_at_char_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

fn is_sensitive_key(key: &str) -> bool {
    let lower = key.to_lowercase();
    audit_limits::SENSITIVE_KEY_SUBSTRINGS
        .iter()
        .any(|needle| lower.contains(needle))
}

/// Summarize a result payload for storage: depth-limited, item-count-limited, with long
/// strings and lists collapsed to a preview rather than stored in full.
#[must_use]
pub fn summarize(value: &Value) -> Value {
    summarize_depth(value, 0)
}

fn summarize_depth(value: &Value, depth: usize) -> Value {
    if depth >= audit_limits::MAX_RESULT_DEPTH {
        return Value::String("[max depth reached]".into());
    }
    match value {
        Value::Object(map) => {
            let mut out = Map::new();
            for (k, v) in map.iter().take(audit_limits::MAX_RESULT_ITEMS) {
                if is_sensitive_key(k) {
                    out.insert(k.clone(), Value::String("[REDACTED]".into()));
                } else {
                    out.insert(k.clone(), summarize_depth(v, depth + 1));
                }
            }
            if map.len() > audit_limits::MAX_RESULT_ITEMS {
                out.insert("_truncated_keys".into(), Value::from(map.len() - audit_limits::MAX_RESULT_ITEMS));
            }
            Value::Object(out)
        }
        Value::Array(items) => {
            let sample: Vec<Value> = items.iter().take(3).map(|v| summarize_depth(v, depth + 1)).collect();
            serde_json::json!({ "type": "list", "count": items.len(), "sample": sample })
        }
        Value::String(s) if s.len() > audit_limits::MAX_RESULT_STRING_LEN => {
            serde_json::json!({
                "type": "string",
                "length": s.len(),
                "preview": truncate_at_char_boundary(s, audit_limits::MAX_RESULT_STRING_LEN),
            })
        }
        other => other.clone(),
    }
}

/// Generate an 8-character lowercase-hex correlation id.
#[must_use]
pub fn new_correlation_id() -> String {
    let mut bytes = [0u8; 4];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Logs tool invocations and their outcomes to the audit table.
pub struct AuditLogger {
    db: DbPool,
}

impl AuditLogger {
    /// Construct a logger over the given database pool.
    #[must_use]
    pub const fn new(db: DbPool) -> Self {
        Self { db }
    }

    /// Open a new audit entry in `Pending` status for a tool call that is about to execute.
    /// `correlation_id` ties related calls together; pass `None` to mint a fresh one.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    #[allow(clippy::too_many_arguments)]
    pub async fn begin(
        &self,
        account_id: Uuid,
        project_id: Uuid,
        api_key_id: Uuid,
        agent_id: Option<Uuid>,
        tool_name: &str,
        tool_type: AuditToolType,
        parameters: &Value,
        reasoning_summary: Option<&str>,
        reasoning_detail: Option<&str>,
        correlation_id: Option<String>,
    ) -> AppResult<Uuid> {
        let id = Uuid::new_v4();
        let correlation_id = correlation_id.unwrap_or_else(new_correlation_id);
        let sanitized = sanitize(parameters);
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO audit_entries (id, account_id, project_id, api_key_id, agent_id, \
             tool_name, tool_type, parameters_json, reasoning_summary, reasoning_detail, \
             correlation_id, status, is_reversible, rolled_back, started_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'pending', 0, 0, ?)",
        )
        .bind(id.to_string())
        .bind(account_id.to_string())
        .bind(project_id.to_string())
        .bind(api_key_id.to_string())
        .bind(agent_id.map(|a| a.to_string()))
        .bind(tool_name)
        .bind(tool_type_str(tool_type))
        .bind(sanitized.to_string())
        .bind(reasoning_summary)
        .bind(reasoning_detail)
        .bind(&correlation_id)
        .bind(now.to_rfc3339())
        .execute(self.db.raw())
        .await?;

        Ok(id)
    }

    /// Close an audit entry as successful, recording a summarized result.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn set_result(
        &self,
        entry_id: Uuid,
        result: &Value,
        rollback_data: Option<&Value>,
    ) -> AppResult<()> {
        let summary = summarize(result);
        let completed_at = Utc::now();
        sqlx::query(
            "UPDATE audit_entries SET status = 'success', result_summary_json = ?, \
             is_reversible = ?, rollback_data_json = ?, completed_at = ?, \
             duration_ms = CAST((julianday(?) - julianday(started_at)) * 86400000 AS INTEGER) \
             WHERE id = ?",
        )
        .bind(summary.to_string())
        .bind(i64::from(rollback_data.is_some()))
        .bind(rollback_data.map(Value::to_string))
        .bind(completed_at.to_rfc3339())
        .bind(completed_at.to_rfc3339())
        .bind(entry_id.to_string())
        .execute(self.db.raw())
        .await?;
        Ok(())
    }

    /// Close an audit entry as failed.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn set_error(&self, entry_id: Uuid, error: &str) -> AppResult<()> {
        let completed_at = Utc::now();
        sqlx::query(
            "UPDATE audit_entries SET status = 'error', error = ?, completed_at = ?, \
             duration_ms = CAST((julianday(?) - julianday(started_at)) * 86400000 AS INTEGER) \
             WHERE id = ?",
        )
        .bind(error)
        .bind(completed_at.to_rfc3339())
        .bind(completed_at.to_rfc3339())
        .bind(entry_id.to_string())
        .execute(self.db.raw())
        .await?;
        Ok(())
    }

    /// Mark `entry_id` rolled back by `rollback_entry_id`, but only if it has not already
    /// been rolled back. Returns `true` if this call performed the transition, `false` if
    /// another call had already rolled it back (the conditional-update resolution to
    /// cross-session rollback races).
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails or `entry_id` does not exist.
    pub async fn set_rollback(&self, entry_id: Uuid, rollback_entry_id: Uuid) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE audit_entries SET rolled_back = 1, rolled_back_at = ?, rollback_audit_id = ? \
             WHERE id = ? AND rolled_back = 0 AND is_reversible = 1",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(rollback_entry_id.to_string())
        .bind(entry_id.to_string())
        .execute(self.db.raw())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Fetch a single audit entry by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry does not exist or the row cannot be decoded.
    pub async fn get(&self, entry_id: Uuid) -> AppResult<AuditEntry> {
        let row = sqlx::query(AUDIT_SELECT)
            .bind(entry_id.to_string())
            .fetch_optional(self.db.raw())
            .await?
            .ok_or_else(|| AppError::not_found("audit entry"))?;
        row_to_entry(&row)
    }

    /// Fetch audit entries sharing `correlation_id`, most recent first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn related(&self, correlation_id: &str, limit: i64) -> AppResult<Vec<AuditEntry>> {
        let rows = sqlx::query(&format!(
            "{AUDIT_SELECT_PREFIX} WHERE correlation_id = ? ORDER BY started_at DESC LIMIT ?"
        ))
        .bind(correlation_id)
        .bind(limit)
        .fetch_all(self.db.raw())
        .await?;
        rows.iter().map(row_to_entry).collect()
    }

    /// Query audit entries for a project, most recent first, capped at `limit` (â‰¤100).
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn query(&self, project_id: Uuid, tool_name: Option<&str>, limit: i64) -> AppResult<Vec<AuditEntry>> {
        let limit = limit.clamp(1, 100);
        let rows = if let Some(tool_name) = tool_name {
            sqlx::query(&format!(
                "{AUDIT_SELECT_PREFIX} WHERE project_id = ? AND tool_name = ? ORDER BY started_at DESC LIMIT ?"
            ))
            .bind(project_id.to_string())
            .bind(tool_name)
            .bind(limit)
            .fetch_all(self.db.raw())
            .await?
        } else {
            sqlx::query(&format!(
                "{AUDIT_SELECT_PREFIX} WHERE project_id = ? ORDER BY started_at DESC LIMIT ?"
            ))
            .bind(project_id.to_string())
            .bind(limit)
            .fetch_all(self.db.raw())
            .await?
        };
        rows.iter().map(row_to_entry).collect()
    }
}

const AUDIT_SELECT_PREFIX: &str = "SELECT id, account_id, project_id, api_key_id, agent_id, tool_name, \
    tool_type, parameters_json, reasoning_summary, reasoning_detail, correlation_id, status, \
    result_summary_json, error, is_reversible, rollback_data_json, rolled_back, rolled_back_at, rollback_audit_id, \
    started_at, completed_at, duration_ms FROM audit_entries";
const AUDIT_SELECT: &str = "SELECT id, account_id, project_id, api_key_id, agent_id, tool_name, \
    tool_type, parameters_json, reasoning_summary, reasoning_detail, correlation_id, status, \
    result_summary_json, error, is_reversible, rollback_data_json, rolled_back, rolled_back_at, rollback_audit_id, \
    started_at, completed_at, duration_ms FROM audit_entries WHERE id = ?";

fn tool_type_str(tool_type: AuditToolType) -> &'static str {
    match tool_type {
        AuditToolType::System => "system",
        AuditToolType::Business => "business",
        AuditToolType::Context => "context",
        AuditToolType::Resource => "resource",
        AuditToolType::Audit => "audit",
    }
}

fn parse_tool_type(s: &str) -> AuditToolType {
    match s {
        "business" => AuditToolType::Business,
        "context" => AuditToolType::Context,
        "resource" => AuditToolType::Resource,
        "audit" => AuditToolType::Audit,
        _ => AuditToolType::System,
    }
}

fn parse_status(s: &str) -> AuditStatus {
    match s {
        "success" => AuditStatus::Success,
        "error" => AuditStatus::Error,
        _ => AuditStatus::Pending,
    }
}

fn row_to_entry(row: &sqlx::sqlite::SqliteRow) -> AppResult<AuditEntry> {
    let id: String = row.try_get("id")?;
    let account_id: String = row.try_get("account_id")?;
    let project_id: String = row.try_get("project_id")?;
    let api_key_id: String = row.try_get("api_key_id")?;
    let agent_id: Option<String> = row.try_get("agent_id")?;
    let tool_type_raw: String = row.try_get("tool_type")?;
    let status_raw: String = row.try_get("status")?;
    let parameters_json: String = row.try_get("parameters_json")?;
    let result_summary_json: Option<String> = row.try_get("result_summary_json")?;
    let rollback_data_json: Option<String> = row.try_get("rollback_data_json")?;
    let rolled_back_at: Option<String> = row.try_get("rolled_back_at")?;
    let rollback_audit_id: Option<String> = row.try_get("rollback_audit_id")?;
    let started_at: String = row.try_get("started_at")?;
    let completed_at: Option<String> = row.try_get("completed_at")?;

    Ok(AuditEntry {
        id: Uuid::parse_str(&id)?,
        account_id: Uuid::parse_str(&account_id)?,
        project_id: Uuid::parse_str(&project_id)?,
        api_key_id: Uuid::parse_str(&api_key_id)?,
        agent_id: agent_id.map(|s| Uuid::parse_str(&s)).transpose()?,
        tool_name: row.try_get("tool_name")?,
        tool_type: parse_tool_type(&tool_type_raw),
        parameters: serde_json::from_str(&parameters_json)?,
        reasoning_summary: row.try_get("reasoning_summary")?,
        reasoning_detail: row.try_get("reasoning_detail")?,
        correlation_id: row.try_get("correlation_id")?,
        status: parse_status(&status_raw),
        result_summary: result_summary_json.map(|s| serde_json::from_str(&s)).transpose()?,
        error: row.try_get("error")?,
        is_reversible: row.try_get::<i64, _>("is_reversible")? != 0,
        rollback_data: rollback_data_json.map(|s| serde_json::from_str(&s)).transpose()?,
        rolled_back: row.try_get::<i64, _>("rolled_back")? != 0,
        rolled_back_at: rolled_back_at
            .map(|s| chrono::DateTime::parse_from_rfc3339(&s).map(|dt| dt.with_timezone(&Utc)))
            .transpose()?,
        rollback_audit_id: rollback_audit_id.map(|s| Uuid::parse_str(&s)).transpose()?,
        started_at: chrono::DateTime::parse_from_rfc3339(&started_at)?.with_timezone(&Utc),
        completed_at: completed_at
            .map(|s| chrono::DateTime::parse_from_rfc3339(&s).map(|dt| dt.with_timezone(&Utc)))
            .transpose()?,
        duration_ms: row.try_get("duration_ms")?,
    })
}

/// Audit tool family: `explain_action`, `get_related_actions`, `rollback_action`, `query_audit`.
pub mod tools {
    use super::{AuditLogger, AuditToolType};
    use crate::constants::audit::RELATED_REASONING_PREVIEW_LEN;
    use crate::errors::{AppError, AppResult};
    use serde_json::Value;
    use uuid::Uuid;

    /// `explain_action`: return the full reasoning and outcome recorded for one audit entry.
    ///
    /// # Errors
    ///
    /// Returns an error if `audit_id` is not a valid UUID or does not exist.
    pub async fn explain_action(logger: &AuditLogger, audit_id: &str) -> AppResult<Value> {
        let id = Uuid::parse_str(audit_id).map_err(|e| AppError::invalid_input(e.to_string()))?;
        let entry = logger.get(id).await?;
        Ok(serde_json::to_value(entry)?)
    }

    /// `get_related_actions`: return other calls sharing `correlation_id`, with a preview of
    /// each entry's reasoning.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn get_related_actions(
        logger: &AuditLogger,
        correlation_id: &str,
        limit: i64,
    ) -> AppResult<Value> {
        let entries = logger.related(correlation_id, limit.clamp(1, 100)).await?;
        let previews: Vec<Value> = entries
            .into_iter()
            .map(|e| {
                let reasoning_preview = e.reasoning_summary.as_deref().map(|s| {
                    s.chars().take(RELATED_REASONING_PREVIEW_LEN).collect::<String>()
                });
                serde_json::json!({
                    "id": e.id,
                    "tool_name": e.tool_name,
                    "status": e.status,
                    "reasoning_preview": reasoning_preview,
                    "started_at": e.started_at,
                })
            })
            .collect();
        Ok(Value::Array(previews))
    }

    /// `rollback_action`: preview (or, with `confirm = true`, execute) rolling back a prior
    /// call. Execution only flips the row's `rolled_back`/`rollback_audit_id` fields and
    /// records a `rollback:<tool>` audit entry — the gateway does not itself know how to
    /// invoke an inverse upstream operation, so callers that need the change actually undone
    /// must issue that call themselves.
    ///
    /// # Errors
    ///
    /// Returns an error if `audit_id` does not exist or is not reversible.
    pub async fn rollback_action(
        logger: &AuditLogger,
        account_id: Uuid,
        project_id: Uuid,
        api_key_id: Uuid,
        audit_id: &str,
        confirm: bool,
    ) -> AppResult<Value> {
        let id = Uuid::parse_str(audit_id).map_err(|e| AppError::invalid_input(e.to_string()))?;
        let entry = logger.get(id).await?;

        if !entry.is_reversible {
            return Err(AppError::invalid_input("this call is not marked reversible"));
        }
        if entry.rolled_back {
            return Ok(serde_json::json!({
                "already_rolled_back": true,
                "rollback_audit_id": entry.rollback_audit_id,
            }));
        }

        if !confirm {
            return Ok(serde_json::json!({
                "preview": true,
                "tool_name": entry.tool_name,
                "parameters": entry.parameters,
                "result_summary": entry.result_summary,
                "rollback_data": entry.rollback_data,
                "message": "pass confirm=true to execute the rollback",
            }));
        }

        let rollback_tool_name = format!("rollback:{}", entry.tool_name);
        let rollback_entry_id = logger
            .begin(
                account_id,
                project_id,
                api_key_id,
                entry.agent_id,
                &rollback_tool_name,
                AuditToolType::Audit,
                &serde_json::json!({ "original_audit_id": entry.id }),
                Some("rollback requested via rollback_action"),
                None,
                Some(entry.correlation_id.clone()),
            )
            .await?;

        let applied = logger.set_rollback(entry.id, rollback_entry_id).await?;
        if !applied {
            logger
                .set_error(rollback_entry_id, "entry was already rolled back by another caller")
                .await?;
            return Ok(serde_json::json!({ "already_rolled_back": true }));
        }

        logger
            .set_result(rollback_entry_id, &serde_json::json!({ "rolled_back": entry.id }), None)
            .await?;

        Ok(serde_json::json!({
            "rolled_back": true,
            "rollback_audit_id": rollback_entry_id,
        }))
    }

    /// `query_audit`: list recent audit entries for a project, optionally filtered by tool name.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn query_audit(
        logger: &AuditLogger,
        project_id: Uuid,
        tool_name: Option<&str>,
        limit: i64,
    ) -> AppResult<Value> {
        let entries = logger.query(project_id, tool_name, limit).await?;
        Ok(serde_json::to_value(entries)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_redacts_sensitive_keys() {
        let input = serde_json::json!({ "password": "hunter2", "username": "alice" });
        let out = sanitize(&input);
        assert_eq!(out["password"], Value::String("[REDACTED]".into()));
        assert_eq!(out["username"], Value::String("alice".into()));
    }

    #[test]
    fn sanitize_is_idempotent() {
        let input = serde_json::json!({ "api_key": "secret", "nested": { "token": "abc" } });
        let once = sanitize(&input);
        let twice = sanitize(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn summarize_collapses_long_lists_to_sample() {
        let items: Vec<Value> = (0..50).map(Value::from).collect();
        let out = summarize(&Value::Array(items));
        assert_eq!(out["type"], "list");
        assert_eq!(out["count"], 50);
        assert_eq!(out["sample"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn correlation_id_is_eight_hex_chars() {
        let id = new_correlation_id();
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn sanitize_truncation_does_not_split_a_multibyte_char() {
        // Each "漢" is 3 bytes; padding lands the truncation boundary mid-character.
        let s = "a".repeat(audit_limits::MAX_PARAM_STRING_LEN - 1) + "漢漢漢";
        let input = serde_json::json!({ "reasoning": s });
        let out = sanitize(&input); // must not panic
        assert!(out["reasoning"].as_str().unwrap().ends_with("... [truncated]"));
    }

    #[test]
    fn summarize_truncation_does_not_split_a_multibyte_char() {
        let s = "a".repeat(audit_limits::MAX_RESULT_STRING_LEN - 1) + "漢漢漢";
        let out = summarize(&Value::String(s)); // must not panic
        assert_eq!(out["type"], "string");
    }

    #[test]
    fn truncate_at_char_boundary_rounds_down() {
        let s = "ab漢"; // 'a'=1, 'b'=1, '漢'=3 bytes, total 5 bytes
        assert_eq!(truncate_at_char_boundary(s, 4), "ab");
        assert_eq!(truncate_at_char_boundary(s, 5), "ab漢");
        assert_eq!(truncate_at_char_boundary(s, 100), "ab漢");
    }
}
