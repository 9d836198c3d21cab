// ABOUTME: Database pool initialization and migration runner for the gateway's catalog schema
// ABOUTME: Wraps a single `sqlx::SqlitePool`; the `postgres` feature swaps the backend later
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! Database pool and schema management.
//!
//! The gateway's entire catalog, permission, credential, and audit model lives in one
//! `sqlx` pool. [`DbPool`] is a thin newtype so call sites depend on this module rather
//! than on `sqlx::SqlitePool` directly, keeping a future `postgres` backend swap localized.

pub mod models;

use crate::config::environment::DatabaseConfig;
use crate::errors::{AppError, AppResult};
use crate::health::HealthCheckable;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;

/// The gateway's database connection pool.
#[derive(Debug, Clone)]
pub struct DbPool {
    pool: SqlitePool,
}

impl DbPool {
    /// Open a connection pool for the configured database and run migrations if requested.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or migrations fail.
    pub async fn connect(config: &DatabaseConfig) -> AppResult<Self> {
        let connection_string = config.url.to_connection_string();
        let options = SqliteConnectOptions::from_str(&connection_string)
            .map_err(|e| AppError::database(format!("invalid database URL: {e}")))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(if config.url.is_memory() { 1 } else { 10 })
            .connect_with(options)
            .await
            .map_err(|e| AppError::database(format!("failed to connect: {e}")))?;

        let db = Self { pool };
        if config.auto_migrate {
            db.migrate().await?;
        }
        Ok(db)
    }

    /// Run pending migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if a migration fails to apply.
    pub async fn migrate(&self) -> AppResult<()> {
        sqlx::migrate!("src/db/migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("migration failed: {e}")))
    }

    /// Borrow the underlying `sqlx` pool for use by store modules.
    #[must_use]
    pub const fn raw(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl HealthCheckable for DbPool {
    async fn health_check(&self) -> anyhow::Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
