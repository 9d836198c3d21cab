// ABOUTME: Test fixtures for building an in-memory, migrated database and common catalog rows
// ABOUTME: Gated behind `test`/`testing` so these helpers never ship in release builds
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! Shared test fixtures.
//!
//! Every integration test needs the same starting point: a fresh, migrated `SQLite`
//! database and a handful of rows (an account, a system with a query-key interface, a
//! resource/action, a project). These helpers build that without each test hand-rolling
//! the same inserts.

use crate::config::environment::{DatabaseConfig, DatabaseUrl};
use crate::db::DbPool;
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

/// Open a fresh in-memory database with migrations applied.
///
/// # Panics
///
/// Panics if the connection or migration fails — a broken test database is a test bug,
/// not a condition tests should handle gracefully.
pub async fn test_db() -> DbPool {
    let config = DatabaseConfig { url: DatabaseUrl::Memory, auto_migrate: true };
    DbPool::connect(&config).await.expect("in-memory test database should connect and migrate")
}

/// Insert a bare account row and return its id.
///
/// # Panics
///
/// Panics if the insert fails.
pub async fn seed_account(db: &DbPool) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO accounts (id, name, slug, created_at) VALUES (?, ?, ?, ?)")
        .bind(id.to_string())
        .bind("Test Account")
        .bind(format!("test-{id}"))
        .bind(Utc::now().to_rfc3339())
        .execute(db.raw())
        .await
        .expect("account insert should succeed");
    id
}

/// Insert a system with a query-param API-key interface, one resource, and one GET action
/// returning a top-level array. Returns `(system_id, resource_id, action_id)`.
///
/// # Panics
///
/// Panics if any insert fails.
pub async fn seed_system_with_action(db: &DbPool, account_id: Uuid) -> (Uuid, Uuid, Uuid) {
    let system_id = Uuid::new_v4();
    let resource_id = Uuid::new_v4();
    let action_id = Uuid::new_v4();
    let now = Utc::now().to_rfc3339();

    sqlx::query(
        "INSERT INTO systems (id, account_id, name, alias, base_url, created_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(system_id.to_string())
    .bind(account_id.to_string())
    .bind("GitHub")
    .bind("github")
    .bind("https://api.github.com")
    .bind(&now)
    .execute(db.raw())
    .await
    .expect("system insert should succeed");

    let auth = json!({"type": "api_key", "header": "token", "in_query": true});
    sqlx::query("INSERT INTO interfaces (id, system_id, auth_json, created_at) VALUES (?, ?, ?, ?)")
        .bind(Uuid::new_v4().to_string())
        .bind(system_id.to_string())
        .bind(auth.to_string())
        .bind(&now)
        .execute(db.raw())
        .await
        .expect("interface insert should succeed");

    sqlx::query("INSERT INTO resources (id, system_id, name, alias, created_at) VALUES (?, ?, ?, ?, ?)")
        .bind(resource_id.to_string())
        .bind(system_id.to_string())
        .bind("Issues")
        .bind("issues")
        .bind(&now)
        .execute(db.raw())
        .await
        .expect("resource insert should succeed");

    sqlx::query(
        "INSERT INTO actions (id, resource_id, name, alias, method, path, headers_json, \
         parameters_schema_json, output_schema_json, pagination_json, examples_json, is_mcp_enabled) \
         VALUES (?, ?, ?, ?, 'GET', ?, '{}', ?, NULL, NULL, NULL, 1)",
    )
    .bind(action_id.to_string())
    .bind(resource_id.to_string())
    .bind("List issues")
    .bind("list")
    .bind("/repos/{owner}/{repo}/issues")
    .bind(json!({"type": "object", "properties": {"owner": {"type": "string"}, "repo": {"type": "string"}}}).to_string())
    .execute(db.raw())
    .await
    .expect("action insert should succeed");

    (system_id, resource_id, action_id)
}

/// Insert a bare project row scoped to `account_id` and return its id.
///
/// # Panics
///
/// Panics if the insert fails.
pub async fn seed_project(db: &DbPool, account_id: Uuid, slug: &str) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO projects (id, account_id, slug, name, external_mappings_json, \
         allowed_categories_json, created_at) VALUES (?, ?, ?, ?, '{}', NULL, ?)",
    )
    .bind(id.to_string())
    .bind(account_id.to_string())
    .bind(slug)
    .bind(slug)
    .bind(Utc::now().to_rfc3339())
    .execute(db.raw())
    .await
    .expect("project insert should succeed");
    id
}

/// Insert an API key row bound to a project, with the given fallback mode, and return its id.
///
/// # Panics
///
/// Panics if the insert fails.
pub async fn seed_api_key(db: &DbPool, account_id: Uuid, project_id: Uuid, mode: &str) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO api_keys (id, account_id, project_id, key_prefix, key_hash, \
         agent_profile_id, is_admin, fallback_mode, fallback_allowed_tools_json, \
         fallback_blocked_tools_json, created_at, last_used_at, is_active) \
         VALUES (?, ?, ?, ?, ?, NULL, 0, ?, NULL, NULL, ?, NULL, 1)",
    )
    .bind(id.to_string())
    .bind(account_id.to_string())
    .bind(project_id.to_string())
    .bind("ak_test_12")
    .bind("test-hash")
    .bind(mode)
    .bind(Utc::now().to_rfc3339())
    .execute(db.raw())
    .await
    .expect("api key insert should succeed");
    id
}
