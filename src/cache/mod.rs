// ABOUTME: Cache abstraction layer for OAuth2 token caching with per-project isolation
// ABOUTME: Pluggable backend support following the `DatabaseProvider` pattern
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

pub mod factory;
pub mod memory;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Cache provider trait for pluggable backend implementations
#[async_trait::async_trait]
pub trait CacheProvider: Send + Sync + Clone {
    /// Create new cache instance with configuration
    ///
    /// # Errors
    ///
    /// Returns an error if cache initialization fails
    async fn new(config: CacheConfig) -> Result<Self>
    where
        Self: Sized;

    /// Store value in cache with TTL
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or storage fails
    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &CacheKey,
        value: &T,
        ttl: Duration,
    ) -> Result<()>;

    /// Retrieve value from cache
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization fails
    async fn get<T: for<'de> Deserialize<'de>>(&self, key: &CacheKey) -> Result<Option<T>>;

    /// Remove single cache entry
    ///
    /// # Errors
    ///
    /// Returns an error if invalidation fails
    async fn invalidate(&self, key: &CacheKey) -> Result<()>;

    /// Remove all cache entries matching pattern (e.g. `project:*:system:42:*`)
    ///
    /// # Errors
    ///
    /// Returns an error if pattern invalidation fails
    async fn invalidate_pattern(&self, pattern: &str) -> Result<u64>;

    /// Check if key exists in cache
    ///
    /// # Errors
    ///
    /// Returns an error if existence check fails
    async fn exists(&self, key: &CacheKey) -> Result<bool>;

    /// Get remaining TTL for key
    ///
    /// # Errors
    ///
    /// Returns an error if TTL check fails
    async fn ttl(&self, key: &CacheKey) -> Result<Option<Duration>>;

    /// Verify cache backend is healthy
    ///
    /// # Errors
    ///
    /// Returns an error if health check fails
    async fn health_check(&self) -> Result<()>;

    /// Clear all cache entries (for testing/admin)
    ///
    /// # Errors
    ///
    /// Returns an error if clear operation fails
    async fn clear_all(&self) -> Result<()>;
}

/// Cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of entries before LRU eviction
    pub max_entries: usize,
    /// Cleanup interval for expired entries
    pub cleanup_interval: Duration,
    /// Enable background cleanup task (should be false in tests to avoid runtime conflicts)
    pub enable_background_cleanup: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: crate::constants::cache::DEFAULT_MAX_ENTRIES,
            cleanup_interval: Duration::from_secs(
                crate::constants::cache::DEFAULT_CLEANUP_INTERVAL_SECS,
            ),
            enable_background_cleanup: true,
        }
    }
}

/// Structured cache key scoped to a project's connection to a system
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Project the cached credential belongs to
    pub project_id: Uuid,
    /// System (third-party API) the credential authenticates against
    pub system_id: Uuid,
    /// Specific resource being cached
    pub resource: CacheResource,
}

impl CacheKey {
    /// Create new cache key
    #[must_use]
    pub const fn new(project_id: Uuid, system_id: Uuid, resource: CacheResource) -> Self {
        Self {
            project_id,
            system_id,
            resource,
        }
    }

    /// Pattern for invalidating every cached entry for a project/system pair
    #[must_use]
    pub fn system_pattern(project_id: Uuid, system_id: Uuid) -> String {
        format!("project:{project_id}:system:{system_id}:*")
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "project:{}:system:{}:{}",
            self.project_id, self.system_id, self.resource
        )
    }
}

/// Cache resource types
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheResource {
    /// Cached OAuth2 access token for a credential row
    AccessToken {
        /// Credential row this token was minted for
        credential_id: Uuid,
    },
}

impl CacheResource {
    /// Recommended TTL for this resource type
    #[must_use]
    pub const fn recommended_ttl(&self) -> Duration {
        match self {
            Self::AccessToken { .. } => {
                Duration::from_secs(crate::constants::cache::DEFAULT_TOKEN_TTL_SECS)
            }
        }
    }
}

impl fmt::Display for CacheResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AccessToken { credential_id } => write!(f, "access_token:{credential_id}"),
        }
    }
}
