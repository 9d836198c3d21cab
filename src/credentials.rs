// ABOUTME: Credential store — project-scoped-with-shared-fallback secret resolution and OAuth2 refresh
// ABOUTME: Refresh writes are serialized per-credential; last-writer-wins across processes is acceptable
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! Credential store.
//!
//! Resolves the secret an action executor needs to authenticate to an upstream system:
//! a project-scoped credential shadows the account-wide shared one. Also owns the OAuth2
//! password-grant refresh path, persisting the refreshed token back to the same row.

use crate::db::models::{Credential, InterfaceAuth};
use crate::db::DbPool;
use crate::errors::{AppError, AppResult};
use crate::utils::oauth::{password_grant, PasswordGrantToken, TokenFieldNames};
use dashmap::DashMap;
use serde_json::Value;
use sqlx::Row;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Why a credential lookup failed.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CredentialError {
    /// No credential exists for this (account, system, project) combination, shared or scoped
    #[error("no credential configured for this system")]
    NotFound,
    /// A credential exists but its access token has expired and cannot be refreshed
    #[error("credential has expired")]
    Expired,
}

impl From<CredentialError> for AppError {
    fn from(e: CredentialError) -> Self {
        match e {
            CredentialError::NotFound => Self::not_found("credential"),
            CredentialError::Expired => Self::external_auth_failed(e.to_string()),
        }
    }
}

/// Resolves and refreshes credentials for upstream systems.
pub struct CredentialStore {
    db: DbPool,
    refresh_locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl CredentialStore {
    /// Construct a credential store over the given database pool.
    #[must_use]
    pub fn new(db: DbPool) -> Self {
        Self {
            db,
            refresh_locks: DashMap::new(),
        }
    }

    /// Resolve the credential to use for `system_id`, preferring a credential scoped to
    /// `project_id` and falling back to the account-wide shared one.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::NotFound`] if neither a scoped nor a shared credential exists.
    pub async fn get(
        &self,
        account_id: Uuid,
        system_id: Uuid,
        project_id: Uuid,
    ) -> Result<Credential, CredentialError> {
        if let Some(scoped) = self
            .fetch(account_id, system_id, Some(project_id))
            .await
            .map_err(|_| CredentialError::NotFound)?
        {
            return Ok(scoped);
        }
        self.fetch(account_id, system_id, None)
            .await
            .map_err(|_| CredentialError::NotFound)?
            .ok_or(CredentialError::NotFound)
    }

    async fn fetch(
        &self,
        account_id: Uuid,
        system_id: Uuid,
        project_id: Option<Uuid>,
    ) -> AppResult<Option<Credential>> {
        let row = match project_id {
            Some(pid) => {
                sqlx::query(
                    "SELECT id, account_id, system_id, project_id, data_json, expires_at, \
                     custom_settings_json, created_at, updated_at FROM credentials \
                     WHERE account_id = ? AND system_id = ? AND project_id = ?",
                )
                .bind(account_id.to_string())
                .bind(system_id.to_string())
                .bind(pid.to_string())
                .fetch_optional(self.db.raw())
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT id, account_id, system_id, project_id, data_json, expires_at, \
                     custom_settings_json, created_at, updated_at FROM credentials \
                     WHERE account_id = ? AND system_id = ? AND project_id IS NULL",
                )
                .bind(account_id.to_string())
                .bind(system_id.to_string())
                .fetch_optional(self.db.raw())
                .await?
            }
        };
        row.as_ref().map(row_to_credential).transpose()
    }

    /// Ensure the given credential's access token is valid, refreshing it via OAuth2 password
    /// grant if it has expired (or is within the safety margin of expiring) and the system's
    /// interface uses [`InterfaceAuth::OAuth2Password`]. Returns the credential to use, which
    /// may be the refreshed row.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::Expired`] if the token has expired and the interface does not
    /// support password-grant refresh (e.g. a static bearer token or OAuth2 authorization-code
    /// credential, which this gateway does not refresh on its own).
    pub async fn ensure_fresh(
        &self,
        credential: Credential,
        auth: &InterfaceAuth,
    ) -> Result<Credential, CredentialError> {
        let InterfaceAuth::OAuth2Password {
            token_url,
            token_field,
            expires_field,
        } = auth
        else {
            return Ok(credential);
        };

        let still_valid = credential
            .expires_at
            .is_some_and(|exp| chrono::Utc::now() < exp);
        if still_valid {
            return Ok(credential);
        }

        let lock = Arc::clone(
            self.refresh_locks
                .entry(credential.id)
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        );
        let _guard = lock.lock().await;

        // Re-read: another task may have refreshed this row while we waited for the lock.
        let current = self
            .fetch(credential.account_id, credential.system_id, credential.project_id)
            .await
            .map_err(|_| CredentialError::NotFound)?
            .unwrap_or(credential);

        if current
            .expires_at
            .is_some_and(|exp| chrono::Utc::now() < exp)
        {
            return Ok(current);
        }

        let username = current
            .data
            .get("username")
            .and_then(Value::as_str)
            .ok_or(CredentialError::Expired)?;
        let password = current
            .data
            .get("password")
            .and_then(Value::as_str)
            .ok_or(CredentialError::Expired)?;

        let fields = TokenFieldNames {
            access_token: token_field.clone(),
            expires_in: expires_field.clone(),
        };
        let token: PasswordGrantToken = password_grant(token_url, username, password, &fields)
            .await
            .map_err(|_| CredentialError::Expired)?;

        self.persist_refresh(current.id, &token)
            .await
            .map_err(|_| CredentialError::Expired)
    }

    async fn persist_refresh(
        &self,
        credential_id: Uuid,
        token: &PasswordGrantToken,
    ) -> AppResult<Credential> {
        let now = chrono::Utc::now();
        sqlx::query(
            "UPDATE credentials SET data_json = json_set(data_json, '$.access_token', ?), \
             expires_at = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&token.access_token)
        .bind(token.expires_at.to_rfc3339())
        .bind(now.to_rfc3339())
        .bind(credential_id.to_string())
        .execute(self.db.raw())
        .await?;

        let row = sqlx::query(
            "SELECT id, account_id, system_id, project_id, data_json, expires_at, \
             custom_settings_json, created_at, updated_at FROM credentials WHERE id = ?",
        )
        .bind(credential_id.to_string())
        .fetch_one(self.db.raw())
        .await?;
        row_to_credential(&row)
    }

    /// Build the header (name, value) pairs an outbound request should carry for this
    /// credential. Never logs or returns the raw secret alongside any other context — callers
    /// must not propagate the result into logs.
    ///
    /// Follows the credential's own populated fields in a fixed precedence, independent of the
    /// interface's static auth-type tag: OAuth bearer token, then a plain bearer token, then an
    /// api key (header name from `credential.custom_settings.api_key_header`, default
    /// `X-API-Key`), then HTTP Basic. An api key that this interface places in the query string
    /// (`ApiKey { in_query: true, .. }`) is skipped here — `auth_query_params` carries it instead,
    /// so it isn't sent twice. A credential with none of these fields populated yields no headers;
    /// this is not an error, since `InterfaceAuth::None` and session-cookie systems legitimately
    /// have nothing to attach.
    #[must_use]
    pub fn auth_headers(auth: &InterfaceAuth, credential: &Credential) -> Vec<(String, String)> {
        if let Some(token) = credential.data.get("access_token").and_then(Value::as_str) {
            return vec![("Authorization".into(), format!("Bearer {token}"))];
        }
        if let Some(token) = credential.data.get("token").and_then(Value::as_str) {
            return vec![("Authorization".into(), format!("Bearer {token}"))];
        }
        let api_key_goes_in_query = matches!(auth, InterfaceAuth::ApiKey { in_query: true, .. });
        if !api_key_goes_in_query {
            if let Some(key) = credential.data.get("api_key").and_then(Value::as_str) {
                let header = credential
                    .custom_settings
                    .get("api_key_header")
                    .and_then(Value::as_str)
                    .unwrap_or("X-API-Key");
                return vec![(header.to_string(), key.to_string())];
            }
        }
        let username = credential.data.get("username").and_then(Value::as_str);
        let password = credential.data.get("password").and_then(Value::as_str);
        if let (Some(username), Some(password)) = (username, password) {
            let encoded = crate::utils::auth::basic_auth_header(username, password);
            return vec![("Authorization".into(), encoded)];
        }
        if let Some(token) = credential.data.get("session_token").and_then(Value::as_str) {
            return vec![("Cookie".into(), token.to_string())];
        }
        Vec::new()
    }

    /// Query-string parameters an outbound request should carry, for auth schemes that sit
    /// in the query string rather than a header (`ApiKey { in_query: true, .. }`).
    #[must_use]
    pub fn auth_query_params(
        auth: &InterfaceAuth,
        credential: &Credential,
    ) -> Vec<(String, String)> {
        match auth {
            InterfaceAuth::ApiKey { header, in_query: true } => credential
                .data
                .get("api_key")
                .and_then(Value::as_str)
                .map(|key| vec![(header.clone(), key.to_string())])
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }
}

fn row_to_credential(row: &sqlx::sqlite::SqliteRow) -> AppResult<Credential> {
    let id: String = row.try_get("id")?;
    let account_id: String = row.try_get("account_id")?;
    let system_id: String = row.try_get("system_id")?;
    let project_id: Option<String> = row.try_get("project_id")?;
    let data_json: String = row.try_get("data_json")?;
    let expires_at: Option<String> = row.try_get("expires_at")?;
    let custom_settings_json: String = row.try_get("custom_settings_json")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(Credential {
        id: Uuid::parse_str(&id)?,
        account_id: Uuid::parse_str(&account_id)?,
        system_id: Uuid::parse_str(&system_id)?,
        project_id: project_id.map(|s| Uuid::parse_str(&s)).transpose()?,
        data: serde_json::from_str(&data_json)?,
        expires_at: expires_at
            .map(|s| chrono::DateTime::parse_from_rfc3339(&s).map(|dt| dt.with_timezone(&chrono::Utc)))
            .transpose()?,
        custom_settings: serde_json::from_str(&custom_settings_json)?,
        created_at: chrono::DateTime::parse_from_rfc3339(&created_at)?.with_timezone(&chrono::Utc),
        updated_at: chrono::DateTime::parse_from_rfc3339(&updated_at)?.with_timezone(&chrono::Utc),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn credential_with(data: Value) -> Credential {
        Credential {
            id: Uuid::new_v4(),
            account_id: Uuid::new_v4(),
            system_id: Uuid::new_v4(),
            project_id: None,
            data,
            expires_at: None,
            custom_settings: Value::Null,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn bearer_auth_headers_use_access_token() {
        let credential = credential_with(serde_json::json!({"access_token": "tok123"}));
        let headers = CredentialStore::auth_headers(&InterfaceAuth::Bearer, &credential);
        assert_eq!(headers, vec![("Authorization".to_string(), "Bearer tok123".to_string())]);
    }

    #[test]
    fn oauth_bearer_token_takes_precedence_over_plain_token() {
        let credential = credential_with(serde_json::json!({"access_token": "oauth1", "token": "plain1"}));
        let headers = CredentialStore::auth_headers(&InterfaceAuth::None, &credential);
        assert_eq!(headers, vec![("Authorization".to_string(), "Bearer oauth1".to_string())]);
    }

    #[test]
    fn api_key_uses_default_header_name_absent_custom_settings() {
        let credential = credential_with(serde_json::json!({"api_key": "secret"}));
        let auth = InterfaceAuth::ApiKey { header: "ignored".into(), in_query: false };
        let headers = CredentialStore::auth_headers(&auth, &credential);
        assert_eq!(headers, vec![("X-API-Key".to_string(), "secret".to_string())]);
    }

    #[test]
    fn api_key_header_name_comes_from_custom_settings() {
        let mut credential = credential_with(serde_json::json!({"api_key": "secret"}));
        credential.custom_settings = serde_json::json!({"api_key_header": "X-Vendor-Key"});
        let headers = CredentialStore::auth_headers(&InterfaceAuth::None, &credential);
        assert_eq!(headers, vec![("X-Vendor-Key".to_string(), "secret".to_string())]);
    }

    #[test]
    fn api_key_placed_in_query_is_not_also_sent_as_a_header() {
        let credential = credential_with(serde_json::json!({"api_key": "secret"}));
        let auth = InterfaceAuth::ApiKey { header: "key".into(), in_query: true };
        assert!(CredentialStore::auth_headers(&auth, &credential).is_empty());
    }

    #[test]
    fn basic_auth_falls_back_when_no_token_or_api_key_present() {
        let credential = credential_with(serde_json::json!({"username": "u", "password": "p"}));
        let headers = CredentialStore::auth_headers(&InterfaceAuth::Basic, &credential);
        assert_eq!(headers.len(), 1);
        assert_eq!(headers[0].0, "Authorization");
        assert!(headers[0].1.starts_with("Basic "));
    }

    #[test]
    fn credential_with_no_populated_fields_yields_no_headers() {
        let credential = credential_with(serde_json::json!({}));
        assert!(CredentialStore::auth_headers(&InterfaceAuth::Bearer, &credential).is_empty());
    }
}
