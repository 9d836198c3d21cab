// ABOUTME: Session lifecycle: authentication, mode resolution, capacity caps, idle eviction
// ABOUTME: Session map is a dashmap::DashMap, giving per-session-serialized semantics without a global lock
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! Session Manager.
//!
//! Owns every live [`McpSession`], keyed by its id. A session is created once an API key
//! authenticates and torn down on idle timeout or an explicit `DELETE`. Dispatch on a given
//! session is serialized through an owned lock handed out by [`SessionManager::acquire`] —
//! concurrent requests against the same `Mcp-Session-Id` queue rather than race.

use crate::config::environment::SessionConfig;
use crate::constants::key_prefixes;
use crate::db::models::{ApiKeyRecord, AgentMode, Session};
use crate::errors::{AppError, AppResult};
use crate::mcp::{load_agent_profile, load_api_key_by_prefix, GatewayState, McpSession};
use chrono::Utc;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// Lifecycle state of one session, gated by the Session Manager rather than the session itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, no request has completed on it yet
    New,
    /// At least one request has completed within the idle window
    Active,
    /// No activity for longer than the configured idle timeout; a sweep candidate
    Idle,
    /// Removed from the map; any handle still held is stale
    Closed,
}

struct SessionEntry {
    mcp: Arc<McpSession>,
    api_key_id: Uuid,
    last_activity_unix: AtomicI64,
    call_lock: Arc<Mutex<()>>,
}

impl SessionEntry {
    fn touch(&self) {
        self.last_activity_unix.store(Utc::now().timestamp(), Ordering::Relaxed);
    }

    fn idle_for(&self) -> i64 {
        Utc::now().timestamp() - self.last_activity_unix.load(Ordering::Relaxed)
    }
}

/// A session handle checked out for the duration of one dispatch. Holding it serializes every
/// other caller against the same session id until it is dropped.
pub struct ActiveSession {
    /// The checked-out session
    pub mcp: Arc<McpSession>,
    _guard: OwnedMutexGuard<()>,
}

/// Process-wide session table plus the capacity/eviction policy guarding it.
pub struct SessionManager {
    state: Arc<GatewayState>,
    config: SessionConfig,
    sessions: DashMap<Uuid, SessionEntry>,
}

impl SessionManager {
    /// Build an empty session table over the shared gateway state.
    #[must_use]
    pub fn new(state: Arc<GatewayState>, config: SessionConfig) -> Self {
        Self { state, config, sessions: DashMap::new() }
    }

    /// Verify a raw, client-presented key against the `api_keys` table: the first
    /// [`key_prefixes::LOOKUP_PREFIX_LEN`] characters key the lookup, then `SHA-256(raw_key)`
    /// must equal the stored hash. On success, `last_used_at` is updated.
    ///
    /// # Errors
    ///
    /// Returns `AppError::auth_invalid` if the key is malformed, unknown, revoked, or its hash
    /// does not match.
    pub async fn authenticate(&self, raw_key: &str) -> AppResult<ApiKeyRecord> {
        if raw_key.len() < key_prefixes::LOOKUP_PREFIX_LEN {
            return Err(AppError::auth_invalid("malformed API key"));
        }
        let prefix = &raw_key[..key_prefixes::LOOKUP_PREFIX_LEN];
        let record = load_api_key_by_prefix(&self.state.db, prefix)
            .await?
            .ok_or_else(|| AppError::auth_invalid("unknown API key"))?;

        if !record.is_active {
            return Err(AppError::auth_invalid("API key has been revoked"));
        }

        let mut hasher = Sha256::new();
        hasher.update(raw_key.as_bytes());
        let computed_hash = format!("{:x}", hasher.finalize());
        if computed_hash != record.key_hash {
            return Err(AppError::auth_invalid("invalid API key"));
        }

        sqlx::query("UPDATE api_keys SET last_used_at = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(record.id.to_string())
            .execute(self.state.db.raw())
            .await?;

        Ok(record)
    }

    /// Create a new session for an authenticated API key.
    ///
    /// Mode resolution: the key's bound `AgentProfile` mode if one exists, else the key's own
    /// fallback mode. `project_id` defaults to the key's bound project; `project_override` (read
    /// from an `X-Project-Id` header) is honored only for admin keys — a non-admin key sending
    /// the header is a rejected privilege-escalation attempt, not a silently-ignored one.
    ///
    /// # Errors
    ///
    /// Returns `AppError::permission_denied` if a non-admin key supplies `project_override`,
    /// `AppError::invalid_input` if the key has no bound project and none was supplied, and
    /// `AppError::session_limit_reached` if capacity remains exhausted after an eviction sweep.
    pub async fn create_session(
        &self,
        api_key: &ApiKeyRecord,
        project_override: Option<Uuid>,
    ) -> AppResult<Uuid> {
        let project_id = match project_override {
            Some(pid) if api_key.is_admin => pid,
            Some(_) => {
                return Err(AppError::permission_denied(
                    "X-Project-Id override requires an admin API key",
                ))
            }
            None => api_key
                .project_id
                .ok_or_else(|| AppError::invalid_input("API key has no bound project"))?,
        };

        self.sweep_idle();
        self.ensure_capacity(api_key.id)?;

        let agent_profile = match api_key.agent_profile_id {
            Some(id) => Some(load_agent_profile(&self.state.db, id).await?),
            None => None,
        };
        let mode = agent_profile.as_ref().map_or(api_key.fallback_mode, |p| p.mode);

        let session = Session {
            id: Uuid::new_v4(),
            account_id: api_key.account_id,
            project_id,
            api_key_id: api_key.id,
            mode,
            agent_id: None,
            created_at: Utc::now(),
            last_activity: Utc::now(),
        };

        sqlx::query(
            "INSERT INTO sessions (id, account_id, project_id, api_key_id, mode, agent_id, \
             created_at, last_activity) VALUES (?, ?, ?, ?, ?, NULL, ?, ?)",
        )
        .bind(session.id.to_string())
        .bind(session.account_id.to_string())
        .bind(session.project_id.to_string())
        .bind(session.api_key_id.to_string())
        .bind(mode_str(mode))
        .bind(session.created_at.to_rfc3339())
        .bind(session.last_activity.to_rfc3339())
        .execute(self.state.db.raw())
        .await?;

        let id = session.id;
        let entry = SessionEntry {
            mcp: Arc::new(McpSession::new(self.state.clone(), session)),
            api_key_id: api_key.id,
            last_activity_unix: AtomicI64::new(Utc::now().timestamp()),
            call_lock: Arc::new(Mutex::new(())),
        };
        self.sessions.insert(id, entry);
        Ok(id)
    }

    /// Check out a session for exclusive use, bumping its last-activity timestamp. Holding the
    /// returned [`ActiveSession`] blocks any other concurrent dispatch against the same id.
    ///
    /// # Errors
    ///
    /// Returns `AppError::session_not_found` if the id is unknown or was evicted.
    pub async fn acquire(&self, id: Uuid) -> AppResult<ActiveSession> {
        let (mcp, lock) = {
            let entry = self.sessions.get(&id).ok_or_else(|| AppError::session_not_found("unknown session"))?;
            (entry.mcp.clone(), entry.call_lock.clone())
        };
        let guard = lock.lock_owned().await;
        if let Some(entry) = self.sessions.get(&id) {
            entry.touch();
        }
        Ok(ActiveSession { mcp, _guard: guard })
    }

    /// Close a session, removing it from both the in-memory table and the persisted row.
    ///
    /// Returns `true` if a session with this id was found and removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the persisted row deletion fails.
    pub async fn close(&self, id: Uuid) -> AppResult<bool> {
        let found = self.sessions.remove(&id).is_some();
        if found {
            sqlx::query("DELETE FROM sessions WHERE id = ?").bind(id.to_string()).execute(self.state.db.raw()).await?;
        }
        Ok(found)
    }

    /// Evict every session idle for longer than the configured timeout.
    ///
    /// Triggered opportunistically on each session-creation request rather than by a dedicated
    /// background task — sufficient per the idle-eviction design, since a server that never
    /// receives new sessions has no capacity pressure to relieve.
    pub fn sweep_idle(&self) {
        let timeout = i64::try_from(self.config.idle_timeout_secs).unwrap_or(i64::MAX);
        let expired: Vec<Uuid> =
            self.sessions.iter().filter(|e| e.idle_for() >= timeout).map(|e| *e.key()).collect();
        for id in expired {
            self.sessions.remove(&id);
        }
    }

    fn ensure_capacity(&self, api_key_id: Uuid) -> AppResult<()> {
        if self.sessions.len() >= self.config.max_total_sessions {
            return Err(AppError::session_limit_reached("server session limit reached"));
        }
        let for_key = self.sessions.iter().filter(|e| e.api_key_id == api_key_id).count();
        if for_key >= self.config.max_sessions_per_key {
            return Err(AppError::session_limit_reached("per-key session limit reached"));
        }
        Ok(())
    }

    /// Current state of a session, for diagnostics and the `GET` long-poll handler.
    #[must_use]
    pub fn state_of(&self, id: Uuid) -> SessionState {
        let Some(entry) = self.sessions.get(&id) else { return SessionState::Closed };
        let timeout = i64::try_from(self.config.idle_timeout_secs).unwrap_or(i64::MAX);
        if entry.idle_for() >= timeout {
            SessionState::Idle
        } else {
            SessionState::Active
        }
    }
}

fn mode_str(mode: AgentMode) -> &'static str {
    match mode {
        AgentMode::Power => "power",
        AgentMode::Safe => "safe",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::CredentialStore;
    use crate::test_utils::{seed_account, seed_api_key, seed_project, test_db};

    async fn manager_with_config(config: SessionConfig) -> (SessionManager, ApiKeyRecord) {
        let db = test_db().await;
        let account_id = seed_account(&db).await;
        let project_id = seed_project(&db, account_id, "acme").await;
        let key_id = seed_api_key(&db, account_id, project_id, "power").await;
        let state = Arc::new(GatewayState::new(db.clone(), CredentialStore::new(db)));
        let api_key = load_api_key_by_prefix(&state.db, "ak_test_12").await.unwrap().expect("seeded key");
        assert_eq!(api_key.id, key_id);
        (SessionManager::new(state, config), api_key)
    }

    #[tokio::test]
    async fn create_session_then_acquire_round_trips() {
        let (manager, api_key) = manager_with_config(SessionConfig {
            idle_timeout_secs: 1800,
            max_total_sessions: 10,
            max_sessions_per_key: 10,
        })
        .await;

        let id = manager.create_session(&api_key, None).await.unwrap();
        assert_eq!(manager.state_of(id), SessionState::Active);

        let active = manager.acquire(id).await.unwrap();
        assert_eq!(active.mcp.session.id, id);
        drop(active);

        assert!(manager.close(id).await.unwrap());
        assert_eq!(manager.state_of(id), SessionState::Closed);
    }

    #[tokio::test]
    async fn per_key_session_cap_is_enforced() {
        let (manager, api_key) = manager_with_config(SessionConfig {
            idle_timeout_secs: 1800,
            max_total_sessions: 100,
            max_sessions_per_key: 1,
        })
        .await;

        manager.create_session(&api_key, None).await.unwrap();
        let err = manager.create_session(&api_key, None).await.unwrap_err();
        assert_eq!(err.http_status(), axum::http::StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn non_admin_project_override_is_rejected() {
        let (manager, api_key) = manager_with_config(SessionConfig {
            idle_timeout_secs: 1800,
            max_total_sessions: 10,
            max_sessions_per_key: 10,
        })
        .await;

        let result = manager.create_session(&api_key, Some(Uuid::new_v4())).await;
        assert!(result.is_err());
    }
}
