// ABOUTME: Action executor — turns a catalog Action plus caller arguments into an HTTP round-trip
// ABOUTME: Auto-injects project path parameters, resolves credentials, dispatches, never throws on upstream failure
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! Action executor.
//!
//! Consumes a [`crate::registry::ToolHandler::SystemAction`]/`BusinessTool` and the caller's
//! argument map, and performs the HTTP call the underlying [`crate::db::models::Action`]
//! describes: auto-injecting the project's mapped path parameter, substituting remaining
//! `{name}` placeholders, acquiring (and refreshing) the upstream credential, and dispatching
//! with the appropriate query/body encoding. Upstream failures are reported as data
//! ([`CallResult`]), never as a propagated error — only request-shape problems that are the
//! caller's fault (missing path parameter, no credential configured) return `Err`.

pub mod pagination;

use crate::catalog::CatalogSnapshot;
use crate::credentials::CredentialStore;
use crate::db::models::{Action, BusinessTool, HttpMethod, Project, System};
use crate::errors::{AppError, AppResult};
use crate::utils::http_client::shared_client;
use serde_json::{Map, Value};
use std::time::Duration;
use uuid::Uuid;

/// Per-call timeout for a single (non-paginated) page.
const SINGLE_PAGE_TIMEOUT: Duration = Duration::from_secs(30);
/// Per-page timeout while auto-paginating.
const PAGINATED_PAGE_TIMEOUT: Duration = Duration::from_secs(60);

/// The outcome of dispatching one HTTP request to an upstream system. Upstream/transport
/// failures are data, not an `Err` — the executor never throws past a prepared call.
#[derive(Debug, Clone)]
pub enum CallResult {
    /// The upstream call succeeded and returned (or was wrapped into) a JSON value
    Success(Value),
    /// The upstream system responded with an HTTP status `>= 400`
    UpstreamError {
        /// HTTP status code returned
        status_code: u16,
        /// Human-readable error summary
        error: String,
        /// Parsed error body, if the response was JSON
        error_data: Option<Value>,
    },
    /// The request could not be sent or the response could not be read
    Transport(String),
    /// The request exceeded its timeout budget
    Timeout,
}

impl CallResult {
    /// Render this outcome as the JSON value returned to the calling agent.
    #[must_use]
    pub fn into_value(self) -> Value {
        match self {
            Self::Success(v) => v,
            Self::UpstreamError { status_code, error, error_data } => serde_json::json!({
                "success": false,
                "error": error,
                "status_code": status_code,
                "error_data": error_data,
            }),
            Self::Transport(message) => serde_json::json!({ "success": false, "error": message }),
            Self::Timeout => serde_json::json!({ "success": false, "error": "request timed out" }),
        }
    }
}

/// A fully-resolved HTTP request, ready to dispatch (and re-dispatch with different
/// page/size query values, for auto-pagination).
pub(crate) struct PreparedCall {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    pub body_as_form: bool,
}

/// Dispatches catalog actions as HTTP calls on behalf of a resolved `(account, project)`.
pub struct ActionExecutor {
    credentials: CredentialStore,
}

impl ActionExecutor {
    /// Construct an executor over the given credential store.
    #[must_use]
    pub const fn new(credentials: CredentialStore) -> Self {
        Self { credentials }
    }

    /// Execute a system action tool call.
    ///
    /// # Errors
    ///
    /// Returns an error if a required path parameter is missing, no credential is configured
    /// for the system, or the system/interface/action cannot be found in `catalog`. Upstream
    /// HTTP failures are reported via [`CallResult`], not `Err`.
    #[allow(clippy::too_many_arguments)]
    pub async fn call_system_action(
        &self,
        catalog: &CatalogSnapshot,
        account_id: Uuid,
        project: &Project,
        action_id: Uuid,
        system_alias: &str,
        injected_param: Option<&str>,
        arguments: Value,
        fetch_all_pages: bool,
    ) -> AppResult<CallResult> {
        let action = catalog
            .actions
            .get(&action_id)
            .ok_or_else(|| AppError::not_found("action"))?;
        let system = catalog
            .system_by_alias(system_alias)
            .ok_or_else(|| AppError::not_found("system"))?;

        let prepared = self
            .prepare(catalog, account_id, project, system, action, system_alias, injected_param, arguments)
            .await?;

        if fetch_all_pages && action.method.is_query_only() {
            if let Some(pagination) = &action.pagination {
                return pagination::fetch_all_pages(prepared, pagination).await;
            }
        }

        let timeout = if action.pagination.is_some() { PAGINATED_PAGE_TIMEOUT } else { SINGLE_PAGE_TIMEOUT };
        Ok(dispatch_once(prepared, timeout).await)
    }

    /// Execute a business tool call: maps the caller's business-facing fields onto the
    /// wrapped action's API fields, fills in the tool's defaults for anything the caller
    /// omitted, dispatches, then maps the response back through `output_field_mapping`.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`Self::call_system_action`].
    #[allow(clippy::too_many_arguments)]
    pub async fn call_business_tool(
        &self,
        catalog: &CatalogSnapshot,
        account_id: Uuid,
        project: &Project,
        tool: &BusinessTool,
        system_alias: &str,
        injected_param: Option<&str>,
        arguments: Value,
    ) -> AppResult<CallResult> {
        let action = catalog
            .actions
            .get(&tool.action_id)
            .ok_or_else(|| AppError::not_found("action"))?;
        let system = catalog
            .system_by_alias(system_alias)
            .ok_or_else(|| AppError::not_found("system"))?;

        let mapped_arguments = apply_business_mapping(tool, arguments);
        let prepared = self
            .prepare(catalog, account_id, project, system, action, system_alias, injected_param, mapped_arguments)
            .await?;

        let timeout = if action.pagination.is_some() { PAGINATED_PAGE_TIMEOUT } else { SINGLE_PAGE_TIMEOUT };
        let result = dispatch_once(prepared, timeout).await;
        Ok(remap_business_output(tool, result))
    }

    #[allow(clippy::too_many_arguments)]
    async fn prepare(
        &self,
        catalog: &CatalogSnapshot,
        account_id: Uuid,
        project: &Project,
        system: &System,
        action: &Action,
        system_alias: &str,
        injected_param: Option<&str>,
        arguments: Value,
    ) -> AppResult<PreparedCall> {
        let mut args = match arguments {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => return Err(AppError::invalid_input(format!("expected an object of arguments, got {other}"))),
        };

        if let Some(param) = injected_param {
            if !args.contains_key(param) {
                if let Some(mapped) = project.external_mappings.get(system_alias) {
                    args.insert(param.to_string(), Value::String(mapped.clone()));
                }
            }
        }

        let path = substitute_path(&action.path, &mut args)?;
        let url = format!("{}{}", system.base_url.trim_end_matches('/'), path);

        let interface = catalog
            .interfaces
            .get(&system.id)
            .ok_or_else(|| AppError::config(format!("system '{system_alias}' has no interface configured")))?;
        let credential = self.credentials.get(account_id, system.id, project.id).await?;
        let credential = self.credentials.ensure_fresh(credential, &interface.auth).await?;

        let mut headers: Vec<(String, String)> = action.headers.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        headers.extend(CredentialStore::auth_headers(&interface.auth, &credential));
        let mut query = CredentialStore::auth_query_params(&interface.auth, &credential);

        let content_type_is_json = action
            .headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("content-type"))
            .map_or(true, |(_, v)| v.to_lowercase().contains("json"));

        if action.method.is_query_only() {
            query.extend(args.into_iter().map(|(k, v)| (k, value_to_query_string(&v))));
            Ok(PreparedCall { method: action.method, url, headers, query, body: None, body_as_form: false })
        } else {
            let body = match args.remove("data") {
                Some(data) => data,
                None => Value::Object(args),
            };
            Ok(PreparedCall {
                method: action.method,
                url,
                headers,
                query,
                body: Some(body),
                body_as_form: !content_type_is_json,
            })
        }
    }
}

/// Extract the `{name}` placeholders from a path template, in order of first appearance.
fn path_placeholders(path: &str) -> Vec<&str> {
    let mut names = Vec::new();
    let mut rest = path;
    while let Some(start) = rest.find('{') {
        let Some(end) = rest[start..].find('}') else { break };
        names.push(&rest[start + 1..start + end]);
        rest = &rest[start + end + 1..];
    }
    names
}

/// Replace every `{name}` in `path` with the stringified (and percent-encoded) value of the
/// matching key, popped from `args`. Any placeholder left unfilled is a validation error.
fn substitute_path(path: &str, args: &mut Map<String, Value>) -> AppResult<String> {
    let mut result = path.to_string();
    for name in path_placeholders(path) {
        let placeholder = format!("{{{name}}}");
        let Some(value) = args.remove(name) else {
            return Err(AppError::invalid_input(format!("missing path parameter '{name}'")));
        };
        let encoded = urlencoding::encode(&value_to_query_string(&value)).into_owned();
        result = result.replacen(&placeholder, &encoded, 1);
    }
    Ok(result)
}

fn value_to_query_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn apply_business_mapping(tool: &BusinessTool, arguments: Value) -> Value {
    let caller_args = match arguments {
        Value::Object(map) => map,
        _ => Map::new(),
    };

    let mut mapped = Map::new();
    if let Value::Object(defaults) = &tool.default_parameters {
        for (k, v) in defaults {
            mapped.insert(k.clone(), v.clone());
        }
    }

    for (business_field, value) in caller_args {
        let api_field = tool.input_field_mapping.get(&business_field).cloned().unwrap_or(business_field);
        mapped.insert(api_field, value);
    }

    Value::Object(mapped)
}

fn remap_business_output(tool: &BusinessTool, result: CallResult) -> CallResult {
    let CallResult::Success(Value::Object(mut body)) = result else {
        return result;
    };
    if tool.output_field_mapping.is_empty() {
        return CallResult::Success(Value::Object(body));
    }

    let mut remapped = Map::new();
    for (api_field, business_field) in &tool.output_field_mapping {
        if let Some(value) = body.remove(api_field) {
            remapped.insert(business_field.clone(), value);
        }
    }
    for (k, v) in body {
        remapped.entry(k).or_insert(v);
    }
    CallResult::Success(Value::Object(remapped))
}

pub(crate) async fn dispatch_once(prepared: PreparedCall, timeout: Duration) -> CallResult {
    let client = shared_client();
    let mut request = client.request(
        match prepared.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
            HttpMethod::Head => reqwest::Method::HEAD,
            HttpMethod::Options => reqwest::Method::OPTIONS,
        },
        prepared.url,
    )
    .timeout(timeout);

    for (name, value) in &prepared.headers {
        request = request.header(name, value);
    }
    if !prepared.query.is_empty() {
        request = request.query(&prepared.query);
    }
    if let Some(body) = &prepared.body {
        request = if prepared.body_as_form { request.form(body) } else { request.json(body) };
    }

    let response = match request.send().await {
        Ok(r) => r,
        Err(e) if e.is_timeout() => return CallResult::Timeout,
        Err(e) => return CallResult::Transport(e.to_string()),
    };

    let status = response.status();
    let bytes = match response.bytes().await {
        Ok(b) => b,
        Err(e) => return CallResult::Transport(e.to_string()),
    };
    let parsed: Option<Value> = serde_json::from_slice(&bytes).ok();

    if status.as_u16() >= 400 {
        let error = parsed
            .as_ref()
            .and_then(|v| v.get("error").or_else(|| v.get("message")))
            .and_then(Value::as_str)
            .map_or_else(|| format!("upstream returned {status}"), str::to_string);
        return CallResult::UpstreamError { status_code: status.as_u16(), error, error_data: parsed };
    }

    match parsed {
        Some(v) => CallResult::Success(v),
        None => {
            let text = String::from_utf8_lossy(&bytes).into_owned();
            CallResult::Success(serde_json::json!({ "text": text }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_placeholders_extracts_in_order() {
        let names = path_placeholders("/projects/{project_id}/issues/{issue_id}");
        assert_eq!(names, vec!["project_id", "issue_id"]);
    }

    #[test]
    fn substitute_path_fills_and_removes_args() {
        let mut args = Map::new();
        args.insert("project_id".into(), Value::String("PROJ".into()));
        args.insert("issue_id".into(), Value::from(42));
        let path = substitute_path("/projects/{project_id}/issues/{issue_id}", &mut args).unwrap();
        assert_eq!(path, "/projects/PROJ/issues/42");
        assert!(args.is_empty());
    }

    #[test]
    fn substitute_path_errors_on_missing_param() {
        let mut args = Map::new();
        let err = substitute_path("/projects/{project_id}", &mut args).unwrap_err();
        assert!(err.message.contains("project_id"));
    }

    #[test]
    fn business_mapping_applies_defaults_then_caller_overrides() {
        let tool = BusinessTool {
            id: Uuid::new_v4(),
            pack_id: Uuid::new_v4(),
            tool_name: "open_ticket".into(),
            action_id: Uuid::new_v4(),
            description: String::new(),
            default_parameters: serde_json::json!({ "priority": "low" }),
            input_field_mapping: [("summary".to_string(), "title".to_string())].into_iter().collect(),
            output_field_mapping: std::collections::HashMap::new(),
            is_mcp_enabled: true,
        };
        let mapped = apply_business_mapping(&tool, serde_json::json!({ "summary": "it's broken" }));
        assert_eq!(mapped["title"], "it's broken");
        assert_eq!(mapped["priority"], "low");
    }
}
