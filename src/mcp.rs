// ABOUTME: MCP Server Core — JSON-RPC method dispatch wiring catalog, permissions, executor, and audit
// ABOUTME: One `McpSession` per live session; `GatewayState` holds the process-wide shared services
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! MCP Server Core.
//!
//! Dispatches the seven methods a session speaks: `initialize`, `initialized`, `tools/list`,
//! `tools/call`, `resources/list`, `resources/read`, `ping`. Every tool call runs the same
//! pipeline regardless of transport: materialize the registry, load the caller's permission
//! inputs, check, audit, dispatch, audit again. Notifications (requests with no `id`) never
//! produce a response, even on error.

use crate::audit::{tools as audit_tools, AuditLogger};
use crate::catalog::{CatalogSnapshot, CatalogStore};
use crate::constants::{jsonrpc_errors, protocol};
use crate::credentials::CredentialStore;
use crate::db::models::{
    AgentMode, AgentProfile, ApiKeyRecord, AuditToolType, HttpMethod, Project, Session,
};
use crate::db::DbPool;
use crate::errors::AppError;
use crate::executor::ActionExecutor;
use crate::jsonrpc::{JsonRpcRequest, JsonRpcResponse};
use crate::permissions::{PermissionChecker, PermissionContext};
use crate::registry::{ToolDescriptor, ToolHandler, ToolRegistry};
use serde_json::{json, Value};
use sqlx::Row;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Process-wide gateway services, shared across every account and session.
pub struct GatewayState {
    /// Database pool backing every store below
    pub db: DbPool,
    /// Catalog of systems/resources/actions/projects, cached per account
    pub catalog: CatalogStore,
    /// Materialized tool sets, cached per `(account, project)`
    pub registry: ToolRegistry,
    /// Dispatches catalog actions as HTTP calls
    pub executor: ActionExecutor,
    /// Audit log
    pub audit: AuditLogger,
}

impl GatewayState {
    /// Construct the shared state over a database pool and credential store.
    #[must_use]
    pub fn new(db: DbPool, credentials: CredentialStore) -> Self {
        Self {
            catalog: CatalogStore::new(db.clone()),
            registry: ToolRegistry::new(),
            executor: ActionExecutor::new(credentials),
            audit: AuditLogger::new(db.clone()),
            db,
        }
    }
}

/// Caller-asserted reasoning/intent, carried across calls within one session via `set_context`.
#[derive(Debug, Clone, Default)]
struct ReasoningContext {
    agent_id: Option<Uuid>,
    reasoning: Option<String>,
    intent: Option<String>,
    correlation_id: Option<String>,
}

/// One live MCP session: the resolved `(account, project, api_key, mode)` it was created with,
/// plus the mutable reasoning context `set_context` writes into.
pub struct McpSession {
    state: Arc<GatewayState>,
    /// The session row this instance speaks for
    pub session: Session,
    reasoning: Mutex<ReasoningContext>,
}

/// A dispatch failure: either a structural `AppError` (mapped through its own JSON-RPC code)
/// or an explicit JSON-RPC code/message pair for the two cases the method table hardcodes
/// (unknown method, unknown tool, permission denied).
enum DispatchError {
    App(AppError),
    Rpc { code: i32, message: String },
}

impl From<AppError> for DispatchError {
    fn from(err: AppError) -> Self {
        Self::App(err)
    }
}

impl McpSession {
    /// Wrap a resolved session row with the shared gateway state.
    #[must_use]
    pub fn new(state: Arc<GatewayState>, session: Session) -> Self {
        Self { state, session, reasoning: Mutex::new(ReasoningContext::default()) }
    }

    /// Dispatch one JSON-RPC request. Returns `None` for notifications (no `id`), regardless
    /// of whether the method succeeded.
    pub async fn dispatch(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let id = request.id.clone();
        let params = request.params.clone().unwrap_or(Value::Null);

        let result = match request.method.as_str() {
            "initialize" => handle_initialize(&params),
            "initialized" => Ok(Value::Null),
            "ping" => Ok(json!({})),
            "tools/list" => self.handle_tools_list().await,
            "tools/call" => self.handle_tools_call(&params).await,
            "resources/list" => handle_resources_list(&self.state, &self.session).await,
            "resources/read" => handle_resources_read(&self.state, &self.session, &params).await,
            other => Err(DispatchError::Rpc {
                code: jsonrpc_errors::METHOD_NOT_FOUND as i32,
                message: format!("method '{other}' not found"),
            }),
        };

        if id.is_none() {
            return None;
        }

        Some(match result {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err(DispatchError::Rpc { code, message }) => JsonRpcResponse::error(id, code, message),
            Err(DispatchError::App(err)) => {
                let code = i32::try_from(err.jsonrpc_code()).unwrap_or(jsonrpc_errors::INTERNAL_ERROR as i32);
                JsonRpcResponse::error(id, code, err.sanitized_message())
            }
        })
    }

    async fn handle_tools_list(&self) -> Result<Value, DispatchError> {
        let catalog = self.state.catalog.snapshot(self.session.account_id).await?;
        let project = catalog
            .projects
            .get(&self.session.project_id)
            .cloned()
            .ok_or_else(|| AppError::not_found("project"))?;
        let registry_snapshot =
            self.state.registry.materialize(self.session.account_id, Some(&project), &catalog);

        let api_key = load_api_key(&self.state.db, self.session.api_key_id).await?;
        let agent_profile = match api_key.agent_profile_id {
            Some(id) => Some(load_agent_profile(&self.state.db, id).await?),
            None => None,
        };
        let mode = agent_profile.as_ref().map_or(api_key.fallback_mode, |p| p.mode);
        let agent_policy_categories = match &agent_profile {
            Some(p) => load_agent_policy_categories(&self.state.db, p.id).await?,
            None => None,
        };
        let project_policy_categories =
            load_project_policy_categories(&self.state.db, self.session.account_id, &project.slug).await?;
        let agent_id = {
            let guard = self.reasoning.lock().await;
            guard.agent_id.or(self.session.agent_id)
        };
        let user_policy_categories = match agent_id {
            Some(id) => load_user_policy_categories(&self.state.db, self.session.account_id, &id.to_string()).await?,
            None => None,
        };

        let resolver = catalog.category_resolver();
        let effective = combined_effective_categories(&[
            agent_profile.as_ref().and_then(|p| p.categories.as_deref()),
            project.allowed_categories.as_deref(),
            agent_policy_categories.as_deref(),
            project_policy_categories.as_deref(),
            user_policy_categories.as_deref(),
        ]);

        let include_write = mode == AgentMode::Power;
        let (allowed_patterns, blocked_patterns): (Option<&[String]>, Option<&[String]>) = match &agent_profile {
            Some(p) => (None, Some(p.exclude_tools.as_slice())),
            None => (api_key.fallback_allowed_tools.as_deref(), api_key.fallback_blocked_tools.as_deref()),
        };

        let tools = ToolRegistry::list(
            &registry_snapshot,
            include_write,
            allowed_patterns,
            blocked_patterns,
            &resolver,
            effective.as_ref(),
        );
        let tools_json: Vec<Value> = tools.iter().map(|t| tool_descriptor_json(t)).collect();
        Ok(json!({ "tools": tools_json }))
    }

    async fn handle_tools_call(&self, params: &Value) -> Result<Value, DispatchError> {
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| AppError::invalid_input("missing 'name'"))?;
        let mut arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));

        let catalog = self.state.catalog.snapshot(self.session.account_id).await?;
        let project = catalog
            .projects
            .get(&self.session.project_id)
            .cloned()
            .ok_or_else(|| AppError::not_found("project"))?;
        let registry_snapshot =
            self.state.registry.materialize(self.session.account_id, Some(&project), &catalog);
        let Some(descriptor) = registry_snapshot.tools.get(name) else {
            return Err(DispatchError::Rpc {
                code: jsonrpc_errors::INTERNAL_ERROR as i32,
                message: format!("unknown tool '{name}'"),
            });
        };

        let api_key = load_api_key(&self.state.db, self.session.api_key_id).await?;
        let agent_profile = match api_key.agent_profile_id {
            Some(id) => Some(load_agent_profile(&self.state.db, id).await?),
            None => None,
        };
        let mode = agent_profile.as_ref().map_or(api_key.fallback_mode, |p| p.mode);
        let agent_policy_categories = match &agent_profile {
            Some(p) => load_agent_policy_categories(&self.state.db, p.id).await?,
            None => None,
        };
        let project_policy_categories =
            load_project_policy_categories(&self.state.db, self.session.account_id, &project.slug).await?;

        let (reasoning_summary, reasoning_detail, correlation_id, context_agent_id) = {
            let guard = self.reasoning.lock().await;
            (guard.reasoning.clone(), guard.intent.clone(), guard.correlation_id.clone(), guard.agent_id)
        };
        let agent_id = context_agent_id.or(self.session.agent_id);
        let user_policy_categories = match agent_id {
            Some(id) => load_user_policy_categories(&self.state.db, self.session.account_id, &id.to_string()).await?,
            None => None,
        };

        let resolver = catalog.category_resolver();
        let checker = PermissionChecker::new(&resolver);
        let decision = checker.check(&PermissionContext {
            tool_name: &descriptor.name,
            http_method: descriptor.http_method,
            is_resource_read: false,
            agent_profile: agent_profile.as_ref(),
            api_key: &api_key,
            project: &project,
            project_policy_categories: project_policy_categories.as_deref(),
            user_policy_categories: user_policy_categories.as_deref(),
            agent_policy_categories: agent_policy_categories.as_deref(),
            mode,
        });
        if !decision.allowed {
            return Err(DispatchError::Rpc { code: jsonrpc_errors::INTERNAL_ERROR as i32, message: decision.reason });
        }

        let fetch_all_pages = arguments.get("fetch_all_pages").and_then(Value::as_bool).unwrap_or(false);
        if let Value::Object(map) = &mut arguments {
            map.remove("fetch_all_pages");
        }

        let entry_id = self
            .state
            .audit
            .begin(
                self.session.account_id,
                self.session.project_id,
                self.session.api_key_id,
                agent_id,
                &descriptor.name,
                descriptor.audit_tool_type,
                &arguments,
                reasoning_summary.as_deref(),
                reasoning_detail.as_deref(),
                correlation_id,
            )
            .await?;

        let outcome = self
            .dispatch_tool(&catalog, &project, descriptor, arguments, fetch_all_pages)
            .await;

        match outcome {
            Ok(value) => {
                let rollback_data = infer_rollback_data(descriptor, &value);
                self.state.audit.set_result(entry_id, &value, rollback_data.as_ref()).await?;
                Ok(value)
            }
            Err(err) => {
                self.state.audit.set_error(entry_id, &err.message).await?;
                Err(err.into())
            }
        }
    }

    async fn dispatch_tool(
        &self,
        catalog: &CatalogSnapshot,
        project: &Project,
        descriptor: &ToolDescriptor,
        arguments: Value,
        fetch_all_pages: bool,
    ) -> crate::errors::AppResult<Value> {
        match &descriptor.handler {
            ToolHandler::SystemAction { action_id, system_alias, injected_param } => {
                let result = self
                    .state
                    .executor
                    .call_system_action(
                        catalog,
                        self.session.account_id,
                        project,
                        *action_id,
                        system_alias,
                        injected_param.as_deref(),
                        arguments,
                        fetch_all_pages,
                    )
                    .await?;
                Ok(result.into_value())
            }
            ToolHandler::BusinessTool { tool_id, system_alias, injected_param, .. } => {
                let tool = catalog
                    .business_tool_by_id(*tool_id)
                    .ok_or_else(|| AppError::not_found("business tool"))?;
                let result = self
                    .state
                    .executor
                    .call_business_tool(
                        catalog,
                        self.session.account_id,
                        project,
                        tool,
                        system_alias,
                        injected_param.as_deref(),
                        arguments,
                    )
                    .await?;
                Ok(result.into_value())
            }
            ToolHandler::SetContext => {
                let mut guard = self.reasoning.lock().await;
                if let Some(id) = arguments.get("agent_id").and_then(Value::as_str) {
                    guard.agent_id = Some(Uuid::parse_str(id)?);
                }
                if let Some(r) = arguments.get("reasoning").and_then(Value::as_str) {
                    guard.reasoning = Some(r.to_string());
                }
                if let Some(i) = arguments.get("intent").and_then(Value::as_str) {
                    guard.intent = Some(i.to_string());
                }
                if let Some(c) = arguments.get("correlation_id").and_then(Value::as_str) {
                    guard.correlation_id = Some(c.to_string());
                }
                Ok(json!({ "ok": true }))
            }
            ToolHandler::GetContext => {
                let guard = self.reasoning.lock().await;
                Ok(json!({
                    "agent_id": guard.agent_id,
                    "reasoning": guard.reasoning,
                    "intent": guard.intent,
                    "correlation_id": guard.correlation_id,
                }))
            }
            ToolHandler::ExplainAction => {
                let audit_id = arguments
                    .get("audit_id")
                    .and_then(Value::as_str)
                    .ok_or_else(|| AppError::invalid_input("missing 'audit_id'"))?;
                audit_tools::explain_action(&self.state.audit, audit_id).await
            }
            ToolHandler::GetRelatedActions => {
                let correlation_id = arguments
                    .get("correlation_id")
                    .and_then(Value::as_str)
                    .ok_or_else(|| AppError::invalid_input("missing 'correlation_id'"))?;
                let limit = arguments.get("limit").and_then(Value::as_i64).unwrap_or(20);
                audit_tools::get_related_actions(&self.state.audit, correlation_id, limit).await
            }
            ToolHandler::RollbackAction => {
                let audit_id = arguments
                    .get("audit_id")
                    .and_then(Value::as_str)
                    .ok_or_else(|| AppError::invalid_input("missing 'audit_id'"))?;
                let confirm = arguments.get("confirm").and_then(Value::as_bool).unwrap_or(false);
                audit_tools::rollback_action(
                    &self.state.audit,
                    self.session.account_id,
                    self.session.project_id,
                    self.session.api_key_id,
                    audit_id,
                    confirm,
                )
                .await
            }
            ToolHandler::QueryAudit => {
                let tool_name = arguments.get("tool_name").and_then(Value::as_str);
                let limit = arguments.get("limit").and_then(Value::as_i64).unwrap_or(20);
                audit_tools::query_audit(&self.state.audit, self.session.project_id, tool_name, limit).await
            }
        }
    }
}

fn handle_initialize(params: &Value) -> Result<Value, DispatchError> {
    let requested = params.get("protocolVersion").and_then(Value::as_str);
    let version = requested
        .filter(|v| protocol::SUPPORTED_VERSIONS.contains(v))
        .unwrap_or(protocol::SUPPORTED_VERSIONS[0]);
    Ok(json!({
        "protocolVersion": version,
        "serverInfo": { "name": protocol::SERVER_NAME, "version": protocol::SERVER_VERSION },
        "capabilities": { "tools": {}, "resources": {} },
    }))
}

async fn handle_resources_list(state: &GatewayState, session: &Session) -> Result<Value, DispatchError> {
    let catalog = state.catalog.snapshot(session.account_id).await?;
    let project = catalog.projects.get(&session.project_id).ok_or_else(|| AppError::not_found("project"))?;
    let enabled: Option<HashSet<Uuid>> = catalog
        .project_integrations
        .get(&project.id)
        .map(|integrations| integrations.iter().map(|i| i.system_id).collect());

    let mut resources = vec![json!({
        "uri": "systems://",
        "name": "systems",
        "description": "Every system available to this project",
    })];
    for system in catalog.systems.values() {
        if let Some(allowed) = &enabled {
            if !allowed.contains(&system.id) {
                continue;
            }
        }
        resources.push(json!({
            "uri": format!("systems://{}", system.alias),
            "name": system.name,
            "description": format!("Resources and actions on {}", system.name),
        }));
        resources.push(json!({
            "uri": format!("systems://{}/schema", system.alias),
            "name": format!("{} parameter schemas", system.name),
            "description": "Parameter schemas for this system's actions",
        }));
    }
    Ok(json!({ "resources": resources }))
}

async fn handle_resources_read(
    state: &GatewayState,
    session: &Session,
    params: &Value,
) -> Result<Value, DispatchError> {
    let uri = params.get("uri").and_then(Value::as_str).ok_or_else(|| AppError::invalid_input("missing 'uri'"))?;
    let catalog = state.catalog.snapshot(session.account_id).await?;
    let project = catalog
        .projects
        .get(&session.project_id)
        .cloned()
        .ok_or_else(|| AppError::not_found("project"))?;

    let body = read_systems_resource(&catalog, &project, uri)?;

    let entry_id = state
        .audit
        .begin(
            session.account_id,
            session.project_id,
            session.api_key_id,
            session.agent_id,
            uri,
            AuditToolType::Resource,
            &json!({ "uri": uri }),
            None,
            None,
            None,
        )
        .await?;
    state.audit.set_result(entry_id, &body, None).await?;

    Ok(json!({
        "contents": [{ "uri": uri, "mimeType": "application/json", "text": body.to_string() }],
    }))
}

fn read_systems_resource(catalog: &CatalogSnapshot, project: &Project, uri: &str) -> crate::errors::AppResult<Value> {
    if uri == "systems://" {
        let enabled: Option<HashSet<Uuid>> = catalog
            .project_integrations
            .get(&project.id)
            .map(|integrations| integrations.iter().map(|i| i.system_id).collect());
        let systems: Vec<Value> = catalog
            .systems
            .values()
            .filter(|s| enabled.as_ref().is_none_or(|e| e.contains(&s.id)))
            .map(|s| json!({ "alias": s.alias, "name": s.name }))
            .collect();
        return Ok(json!({ "systems": systems }));
    }

    let rest = uri.strip_prefix("systems://").ok_or_else(|| AppError::invalid_input(format!("unrecognized resource uri '{uri}'")))?;
    let (alias, suffix) = rest.split_once('/').unwrap_or((rest, ""));
    let system = catalog.system_by_alias(alias).ok_or_else(|| AppError::not_found("system"))?;

    if suffix == "schema" {
        let mut schemas = Vec::new();
        for resource in catalog.resources_for_system(system.id) {
            for action in catalog.actions_for_resource(resource.id) {
                schemas.push(json!({
                    "action": format!("{}_{}", resource.alias, action.alias),
                    "method": action.method.as_str(),
                    "parameters_schema": action.parameters_schema,
                }));
            }
        }
        return Ok(json!({ "system": system.alias, "schemas": schemas }));
    }

    let resources: Vec<Value> = catalog
        .resources_for_system(system.id)
        .into_iter()
        .map(|r| {
            let actions: Vec<Value> = catalog
                .actions_for_resource(r.id)
                .into_iter()
                .map(|a| json!({ "name": a.name, "alias": a.alias, "method": a.method.as_str() }))
                .collect();
            json!({ "resource": r.alias, "actions": actions })
        })
        .collect();
    Ok(json!({ "system": system.alias, "resources": resources }))
}

fn tool_descriptor_json(descriptor: &ToolDescriptor) -> Value {
    json!({
        "name": descriptor.name,
        "description": descriptor.description,
        "inputSchema": descriptor.input_schema,
        "outputSchema": descriptor.output_schema,
        "examples": descriptor.examples,
    })
}

/// A POST call whose response carries a top-level `id`/`ID`/`uuid` is treated as "created a
/// thing" and becomes reversible by recording enough to (manually) delete it later. The
/// gateway has no generic inverse-operation knowledge beyond this heuristic.
fn infer_rollback_data(descriptor: &ToolDescriptor, result: &Value) -> Option<Value> {
    if descriptor.http_method != Some(HttpMethod::Post) {
        return None;
    }
    let created_id =
        result.get("id").or_else(|| result.get("ID")).or_else(|| result.get("uuid"))?;
    Some(json!({ "type": "delete_created", "tool": descriptor.name, "created_id": created_id }))
}

fn combined_effective_categories(layers: &[Option<&[String]>]) -> Option<HashSet<String>> {
    let mut effective: Option<HashSet<String>> = None;
    for layer in layers.iter().flatten() {
        let layer_set: HashSet<String> = layer.iter().cloned().collect();
        effective = Some(match effective {
            None => layer_set,
            Some(current) => current.intersection(&layer_set).cloned().collect(),
        });
    }
    effective
}

fn parse_mode(s: &str) -> AgentMode {
    if s == "power" {
        AgentMode::Power
    } else {
        AgentMode::Safe
    }
}

pub(crate) async fn load_api_key(db: &DbPool, id: Uuid) -> crate::errors::AppResult<ApiKeyRecord> {
    let row = sqlx::query(
        "SELECT id, account_id, project_id, key_prefix, key_hash, agent_profile_id, is_admin, \
         fallback_mode, fallback_allowed_tools_json, fallback_blocked_tools_json, created_at, \
         last_used_at, is_active FROM api_keys WHERE id = ?",
    )
    .bind(id.to_string())
    .fetch_optional(db.raw())
    .await?
    .ok_or_else(|| AppError::not_found("api key"))?;
    parse_api_key_row(&row)
}

/// Looked up by the client's authentication prefix (first 10 chars of the presented key); the
/// caller still must verify `SHA-256(full_key) == key_hash` before trusting the result.
pub(crate) async fn load_api_key_by_prefix(
    db: &DbPool,
    prefix: &str,
) -> crate::errors::AppResult<Option<ApiKeyRecord>> {
    let row = sqlx::query(
        "SELECT id, account_id, project_id, key_prefix, key_hash, agent_profile_id, is_admin, \
         fallback_mode, fallback_allowed_tools_json, fallback_blocked_tools_json, created_at, \
         last_used_at, is_active FROM api_keys WHERE key_prefix = ?",
    )
    .bind(prefix)
    .fetch_optional(db.raw())
    .await?;
    row.as_ref().map(parse_api_key_row).transpose()
}

fn parse_api_key_row(row: &sqlx::sqlite::SqliteRow) -> crate::errors::AppResult<ApiKeyRecord> {
    let row_id: String = row.try_get("id")?;
    let account_id: String = row.try_get("account_id")?;
    let project_id: Option<String> = row.try_get("project_id")?;
    let agent_profile_id: Option<String> = row.try_get("agent_profile_id")?;
    let fallback_mode_raw: String = row.try_get("fallback_mode")?;
    let fallback_allowed_tools_json: Option<String> = row.try_get("fallback_allowed_tools_json")?;
    let fallback_blocked_tools_json: Option<String> = row.try_get("fallback_blocked_tools_json")?;
    let created_at: String = row.try_get("created_at")?;
    let last_used_at: Option<String> = row.try_get("last_used_at")?;

    Ok(ApiKeyRecord {
        id: Uuid::parse_str(&row_id)?,
        account_id: Uuid::parse_str(&account_id)?,
        project_id: project_id.map(|s| Uuid::parse_str(&s)).transpose()?,
        key_prefix: row.try_get("key_prefix")?,
        key_hash: row.try_get("key_hash")?,
        agent_profile_id: agent_profile_id.map(|s| Uuid::parse_str(&s)).transpose()?,
        is_admin: row.try_get::<i64, _>("is_admin")? != 0,
        fallback_mode: parse_mode(&fallback_mode_raw),
        fallback_allowed_tools: fallback_allowed_tools_json.map(|s| serde_json::from_str(&s)).transpose()?,
        fallback_blocked_tools: fallback_blocked_tools_json.map(|s| serde_json::from_str(&s)).transpose()?,
        created_at: chrono::DateTime::parse_from_rfc3339(&created_at)?.with_timezone(&chrono::Utc),
        last_used_at: last_used_at
            .map(|s| chrono::DateTime::parse_from_rfc3339(&s).map(|dt| dt.with_timezone(&chrono::Utc)))
            .transpose()?,
        is_active: row.try_get::<i64, _>("is_active")? != 0,
    })
}

pub(crate) async fn load_agent_profile(db: &DbPool, id: Uuid) -> crate::errors::AppResult<AgentProfile> {
    let row = sqlx::query(
        "SELECT id, account_id, name, categories_json, include_tools_json, exclude_tools_json, mode \
         FROM agent_profiles WHERE id = ?",
    )
    .bind(id.to_string())
    .fetch_optional(db.raw())
    .await?
    .ok_or_else(|| AppError::not_found("agent profile"))?;

    let row_id: String = row.try_get("id")?;
    let account_id: String = row.try_get("account_id")?;
    let categories_json: Option<String> = row.try_get("categories_json")?;
    let include_tools_json: String = row.try_get("include_tools_json")?;
    let exclude_tools_json: String = row.try_get("exclude_tools_json")?;
    let mode_raw: String = row.try_get("mode")?;

    Ok(AgentProfile {
        id: Uuid::parse_str(&row_id)?,
        account_id: Uuid::parse_str(&account_id)?,
        name: row.try_get("name")?,
        categories: categories_json.map(|s| serde_json::from_str(&s)).transpose()?,
        include_tools: serde_json::from_str(&include_tools_json)?,
        exclude_tools: serde_json::from_str(&exclude_tools_json)?,
        mode: parse_mode(&mode_raw),
    })
}

async fn load_agent_policy_categories(
    db: &DbPool,
    agent_profile_id: Uuid,
) -> crate::errors::AppResult<Option<Vec<String>>> {
    let row = sqlx::query("SELECT categories_json FROM agent_policies WHERE agent_profile_id = ?")
        .bind(agent_profile_id.to_string())
        .fetch_optional(db.raw())
        .await?;
    let Some(row) = row else { return Ok(None) };
    let categories_json: Option<String> = row.try_get("categories_json")?;
    Ok(categories_json.map(|s| serde_json::from_str(&s)).transpose()?)
}

async fn load_project_policy_categories(
    db: &DbPool,
    account_id: Uuid,
    project_slug: &str,
) -> crate::errors::AppResult<Option<Vec<String>>> {
    let rows = sqlx::query("SELECT project_identifier, categories_json FROM project_policies WHERE account_id = ?")
        .bind(account_id.to_string())
        .fetch_all(db.raw())
        .await?;
    for row in rows {
        let pattern: String = row.try_get("project_identifier")?;
        if crate::category::glob_match(&pattern, project_slug) {
            let categories_json: Option<String> = row.try_get("categories_json")?;
            return Ok(categories_json.map(|s| serde_json::from_str(&s)).transpose()?);
        }
    }
    Ok(None)
}

async fn load_user_policy_categories(
    db: &DbPool,
    account_id: Uuid,
    external_user_id: &str,
) -> crate::errors::AppResult<Option<Vec<String>>> {
    let row = sqlx::query("SELECT categories_json FROM user_policies WHERE account_id = ? AND external_user_id = ?")
        .bind(account_id.to_string())
        .bind(external_user_id)
        .fetch_optional(db.raw())
        .await?;
    let Some(row) = row else { return Ok(None) };
    let categories_json: Option<String> = row.try_get("categories_json")?;
    Ok(categories_json.map(|s| serde_json::from_str(&s)).transpose()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combined_effective_categories_is_identity_with_no_layers() {
        assert_eq!(combined_effective_categories(&[None, None]), None);
    }

    #[test]
    fn combined_effective_categories_intersects_present_layers() {
        let a = vec!["read".to_string(), "write".to_string()];
        let b = vec!["write".to_string()];
        let effective = combined_effective_categories(&[Some(&a), None, Some(&b)]);
        assert_eq!(effective, Some(HashSet::from(["write".to_string()])));
    }

    #[test]
    fn infer_rollback_data_only_applies_to_post_with_id() {
        let descriptor = |method: Option<HttpMethod>| ToolDescriptor {
            name: "github_issues_create".into(),
            description: String::new(),
            llm_hints: None,
            input_schema: json!({}),
            output_schema: None,
            examples: None,
            audit_tool_type: AuditToolType::System,
            http_method: method,
            handler: ToolHandler::SetContext,
        };

        assert!(infer_rollback_data(&descriptor(Some(HttpMethod::Get)), &json!({"id": "1"})).is_none());
        assert!(infer_rollback_data(&descriptor(Some(HttpMethod::Post)), &json!({"name": "x"})).is_none());
        let data = infer_rollback_data(&descriptor(Some(HttpMethod::Post)), &json!({"id": "42"})).unwrap();
        assert_eq!(data["created_id"], "42");
    }
}
