// ABOUTME: Tool registry — materializes system/business/context/audit tools for an (account, project) pair
// ABOUTME: Cached per pair; callers must invalidate after a catalog/policy/integration write
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! Tool registry.
//!
//! On first use for an `(account, project)` pair, builds an in-memory map of every tool the
//! pair can see, keyed by sanitized name: system tools generated from enabled actions,
//! business tools generated from capability packs, the two context tools, and the four
//! audit tools. `tools/list` filters this map through [`ToolRegistry::list`]; `tools/call`
//! looks a single entry up by name and hands its [`ToolHandler`] to the executor.

use crate::catalog::CatalogSnapshot;
use crate::category::{glob_match, CategoryResolver};
use crate::constants::auto_injection::PROJECT_PARAM_NAMES;
use crate::constants::tool_names::MAX_LENGTH;
use crate::db::models::{Action, AuditToolType, HttpMethod, Project, Resource, System};
use dashmap::DashMap;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

/// What invoking a tool actually does once permission has been granted.
#[derive(Debug, Clone)]
pub enum ToolHandler {
    /// Dispatch the referenced action, auto-injecting `injected_param` from the project's
    /// external mapping for `system_alias` if it is `Some`.
    SystemAction {
        /// Action to dispatch
        action_id: Uuid,
        /// System the action belongs to (needed to look up the project's external mapping)
        system_alias: String,
        /// Path placeholder eligible for auto-injection, if one was found
        injected_param: Option<String>,
    },
    /// Dispatch the wrapped action with the business tool's default values and field mappings applied.
    BusinessTool {
        /// Business tool row
        tool_id: Uuid,
        /// The action it wraps
        action_id: Uuid,
        /// System the wrapped action belongs to
        system_alias: String,
        /// Path placeholder eligible for auto-injection, if one was found
        injected_param: Option<String>,
    },
    /// `set_context`
    SetContext,
    /// `get_context`
    GetContext,
    /// `explain_action`
    ExplainAction,
    /// `get_related_actions`
    GetRelatedActions,
    /// `rollback_action`
    RollbackAction,
    /// `query_audit`
    QueryAudit,
}

/// Everything a client needs to see a tool exists and decide whether/how to call it.
#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    /// Sanitized, globally-unique-within-scope tool name
    pub name: String,
    /// Human + LLM-facing description
    pub description: String,
    /// Optional free-form hints surfaced to the calling model (e.g. usage tips)
    pub llm_hints: Option<Value>,
    /// JSON Schema describing accepted arguments
    pub input_schema: Value,
    /// JSON Schema describing the shape of a successful result, if known
    pub output_schema: Option<Value>,
    /// Example invocations, if any
    pub examples: Option<Value>,
    /// Classification used for audit logging and category matching
    pub audit_tool_type: AuditToolType,
    /// The HTTP method backing this tool, for system/business tools (`None` for context/audit tools)
    pub http_method: Option<HttpMethod>,
    /// Dispatch target
    pub handler: ToolHandler,
}

/// A materialized tool set for one `(account, project)` pair.
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    /// All tools, keyed by sanitized name
    pub tools: HashMap<String, ToolDescriptor>,
}

/// Builds and caches [`RegistrySnapshot`]s.
pub struct ToolRegistry {
    cache: DashMap<(Uuid, Option<Uuid>), Arc<RegistrySnapshot>>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    /// Construct an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self { cache: DashMap::new() }
    }

    /// Drop every cached snapshot for `account_id`. Call after any write to that account's
    /// categories, mappings, policies, integrations, actions, or business tools.
    pub fn invalidate(&self, account_id: Uuid) {
        self.cache.retain(|key, _| key.0 != account_id);
    }

    /// Materialize (or return the cached) tool set for `(account_id, project)`.
    #[must_use]
    pub fn materialize(
        &self,
        account_id: Uuid,
        project: Option<&Project>,
        catalog: &CatalogSnapshot,
    ) -> Arc<RegistrySnapshot> {
        let key = (account_id, project.map(|p| p.id));
        if let Some(existing) = self.cache.get(&key) {
            return Arc::clone(&existing);
        }

        let snapshot = Arc::new(build_snapshot(project, catalog));
        self.cache.insert(key, Arc::clone(&snapshot));
        snapshot
    }

    /// Filter a snapshot's tools for `tools/list`. `effective` is the category resolver's
    /// output for the caller; `allowed_patterns`/`blocked_patterns` come from the caller's
    /// agent profile or API key fallback lists.
    #[must_use]
    pub fn list<'a>(
        snapshot: &'a RegistrySnapshot,
        include_write: bool,
        allowed_patterns: Option<&[String]>,
        blocked_patterns: Option<&[String]>,
        categories: &CategoryResolver,
        effective: Option<&HashSet<String>>,
    ) -> Vec<&'a ToolDescriptor> {
        snapshot
            .tools
            .values()
            .filter(|t| {
                if !include_write && t.http_method.is_some_and(|m| !m.is_query_only()) {
                    return false;
                }
                if let Some(blocked) = blocked_patterns {
                    if matches_any(blocked, &t.name) {
                        return false;
                    }
                }
                if let Some(allowed) = allowed_patterns {
                    if !matches_any(allowed, &t.name) {
                        return false;
                    }
                }
                categories.is_tool_allowed(&t.name, effective)
            })
            .collect()
    }
}

fn matches_any(patterns: &[String], tool_name: &str) -> bool {
    patterns.iter().any(|p| glob_match(p, tool_name))
}

fn build_snapshot(project: Option<&Project>, catalog: &CatalogSnapshot) -> RegistrySnapshot {
    let mut tools = HashMap::new();

    for descriptor in context_tools() {
        tools.insert(descriptor.name.clone(), descriptor);
    }
    for descriptor in audit_tools() {
        tools.insert(descriptor.name.clone(), descriptor);
    }

    let enabled_system_ids: Option<HashSet<Uuid>> = project.map(|p| {
        catalog
            .project_integrations
            .get(&p.id)
            .map(|integrations| integrations.iter().map(|i| i.system_id).collect())
            .unwrap_or_default()
    });

    for system in catalog.systems.values() {
        if let Some(enabled) = &enabled_system_ids {
            if !enabled.contains(&system.id) {
                continue;
            }
        }
        for resource in catalog.resources_for_system(system.id) {
            for action in catalog.actions_for_resource(resource.id) {
                if !action.is_mcp_enabled {
                    continue;
                }
                let descriptor = build_system_tool(system, resource, action, project);
                tools.insert(descriptor.name.clone(), descriptor);
            }
        }
    }

    for pack in catalog.capability_packs.values() {
        let Some(pack_tools) = catalog.business_tools.get(&pack.id) else {
            continue;
        };
        for tool in pack_tools {
            if !tool.is_mcp_enabled {
                continue;
            }
            let Some(action) = catalog.actions.get(&tool.action_id) else {
                continue;
            };
            let Some(resource) = catalog.resources.get(&action.resource_id) else {
                continue;
            };
            let Some(system) = catalog.systems.get(&resource.system_id) else {
                continue;
            };
            let descriptor = build_business_tool(pack.alias.as_str(), tool, system, action, project);
            tools.insert(descriptor.name.clone(), descriptor);
        }
    }

    RegistrySnapshot { tools }
}

fn build_system_tool(
    system: &System,
    resource: &Resource,
    action: &Action,
    project: Option<&Project>,
) -> ToolDescriptor {
    let name = sanitize_tool_name(&format!("{}_{}_{}", system.alias, resource.alias, action.alias));
    let injected_param = find_injected_param(system.alias.as_str(), &action.path, project);
    let input_schema = match &injected_param {
        Some(param) => strip_schema_property(&action.parameters_schema, param),
        None => action.parameters_schema.clone(),
    };

    ToolDescriptor {
        name,
        description: format!("{} {} on {}", action.method.as_str(), resource.name, system.name),
        llm_hints: None,
        input_schema,
        output_schema: action.output_schema.clone(),
        examples: action.examples.clone(),
        audit_tool_type: AuditToolType::System,
        http_method: Some(action.method),
        handler: ToolHandler::SystemAction {
            action_id: action.id,
            system_alias: system.alias.clone(),
            injected_param,
        },
    }
}

fn build_business_tool(
    pack_alias: &str,
    tool: &crate::db::models::BusinessTool,
    system: &System,
    action: &Action,
    project: Option<&Project>,
) -> ToolDescriptor {
    let name = sanitize_tool_name(&format!("{pack_alias}_{}", tool.tool_name));
    let injected_param = find_injected_param(system.alias.as_str(), &action.path, project);
    let input_schema = match &injected_param {
        Some(param) => strip_schema_property(&action.parameters_schema, param),
        None => action.parameters_schema.clone(),
    };

    ToolDescriptor {
        name,
        description: tool.description.clone(),
        llm_hints: None,
        input_schema,
        output_schema: action.output_schema.clone(),
        examples: None,
        audit_tool_type: AuditToolType::Business,
        http_method: Some(action.method),
        handler: ToolHandler::BusinessTool {
            tool_id: tool.id,
            action_id: action.id,
            system_alias: system.alias.clone(),
            injected_param,
        },
    }
}

/// The path placeholder (if any) eligible for auto-injection from the project's external
/// mapping for this system, per the recognized project-param name set, in priority order.
fn find_injected_param(system_alias: &str, path: &str, project: Option<&Project>) -> Option<String> {
    let project = project?;
    if !project.external_mappings.contains_key(system_alias) {
        return None;
    }
    PROJECT_PARAM_NAMES
        .iter()
        .find(|name| path.contains(&format!("{{{name}}}")))
        .map(|name| (*name).to_string())
}

/// Remove `param` from a JSON Schema's `properties` and `required` lists, if present.
fn strip_schema_property(schema: &Value, param: &str) -> Value {
    let mut schema = schema.clone();
    if let Some(obj) = schema.as_object_mut() {
        if let Some(properties) = obj.get_mut("properties").and_then(Value::as_object_mut) {
            properties.remove(param);
        }
        if let Some(required) = obj.get_mut("required").and_then(Value::as_array_mut) {
            required.retain(|v| v.as_str() != Some(param));
        }
    }
    schema
}

/// Deterministic tool-name sanitization: non-`[A-Za-z0-9_]` to `_`, collapse runs, trim edges,
/// lowercase, clamp to [`MAX_LENGTH`].
#[must_use]
pub fn sanitize_tool_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_was_underscore = false;
    for ch in raw.chars() {
        let mapped = if ch.is_ascii_alphanumeric() || ch == '_' { ch } else { '_' };
        if mapped == '_' {
            if last_was_underscore {
                continue;
            }
            last_was_underscore = true;
        } else {
            last_was_underscore = false;
        }
        out.push(mapped);
    }
    let trimmed = out.trim_matches('_').to_lowercase();
    trimmed.chars().take(MAX_LENGTH).collect()
}

fn context_tools() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor {
            name: "set_context".into(),
            description: "Record the reasoning/intent for subsequent tool calls in this session".into(),
            llm_hints: None,
            input_schema: json!({
                "type": "object",
                "properties": {
                    "agent_id": {"type": "string"},
                    "reasoning": {"type": "string"},
                    "intent": {"type": "string"},
                    "correlation_id": {"type": "string"},
                },
            }),
            output_schema: None,
            examples: None,
            audit_tool_type: AuditToolType::Context,
            http_method: None,
            handler: ToolHandler::SetContext,
        },
        ToolDescriptor {
            name: "get_context".into(),
            description: "Return the reasoning/intent currently recorded for this session".into(),
            llm_hints: None,
            input_schema: json!({"type": "object", "properties": {}}),
            output_schema: None,
            examples: None,
            audit_tool_type: AuditToolType::Context,
            http_method: None,
            handler: ToolHandler::GetContext,
        },
    ]
}

fn audit_tools() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor {
            name: "explain_action".into(),
            description: "Explain a prior tool call: its reasoning, arguments, and outcome".into(),
            llm_hints: None,
            input_schema: json!({
                "type": "object",
                "properties": {"audit_id": {"type": "string"}},
                "required": ["audit_id"],
            }),
            output_schema: None,
            examples: None,
            audit_tool_type: AuditToolType::Audit,
            http_method: None,
            handler: ToolHandler::ExplainAction,
        },
        ToolDescriptor {
            name: "get_related_actions".into(),
            description: "List other tool calls sharing a correlation id, most recent first".into(),
            llm_hints: None,
            input_schema: json!({
                "type": "object",
                "properties": {
                    "correlation_id": {"type": "string"},
                    "limit": {"type": "integer", "default": 20},
                },
                "required": ["correlation_id"],
            }),
            output_schema: None,
            examples: None,
            audit_tool_type: AuditToolType::Audit,
            http_method: None,
            handler: ToolHandler::GetRelatedActions,
        },
        ToolDescriptor {
            name: "rollback_action".into(),
            description: "Preview (confirm=false) or execute (confirm=true) rolling back a prior call".into(),
            llm_hints: None,
            input_schema: json!({
                "type": "object",
                "properties": {
                    "audit_id": {"type": "string"},
                    "confirm": {"type": "boolean", "default": false},
                },
                "required": ["audit_id"],
            }),
            output_schema: None,
            examples: None,
            audit_tool_type: AuditToolType::Audit,
            http_method: Some(HttpMethod::Post),
            handler: ToolHandler::RollbackAction,
        },
        ToolDescriptor {
            name: "query_audit".into(),
            description: "Query recent audit entries for this project, optionally by tool name".into(),
            llm_hints: None,
            input_schema: json!({
                "type": "object",
                "properties": {
                    "tool_name": {"type": "string"},
                    "limit": {"type": "integer", "default": 20, "maximum": 100},
                },
            }),
            output_schema: None,
            examples: None,
            audit_tool_type: AuditToolType::Audit,
            http_method: None,
            handler: ToolHandler::QueryAudit,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_collapses_and_trims() {
        assert_eq!(sanitize_tool_name("GitHub--Issues::List!!"), "github_issues_list");
    }

    #[test]
    fn sanitize_clamps_to_max_length() {
        let long = "a".repeat(200);
        assert_eq!(sanitize_tool_name(&long).len(), MAX_LENGTH);
    }

    #[test]
    fn injected_param_found_and_schema_stripped() {
        let mut mappings = HashMap::new();
        mappings.insert("jira".to_string(), "PROJ-7".to_string());
        let project = Project {
            id: Uuid::new_v4(),
            account_id: Uuid::new_v4(),
            slug: "acme".into(),
            name: "Acme".into(),
            external_mappings: mappings,
            allowed_categories: None,
            created_at: chrono::Utc::now(),
        };
        let path = "/rest/api/3/project/{projectIdOrKey}/issues";
        let param = find_injected_param("jira", path, Some(&project));
        assert_eq!(param.as_deref(), Some("projectIdOrKey"));

        let schema = json!({
            "type": "object",
            "properties": {"projectIdOrKey": {"type": "string"}, "summary": {"type": "string"}},
            "required": ["projectIdOrKey", "summary"],
        });
        let stripped = strip_schema_property(&schema, "projectIdOrKey");
        assert!(!stripped["properties"].as_object().unwrap().contains_key("projectIdOrKey"));
        assert_eq!(stripped["required"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn no_injection_without_project_mapping() {
        let project = Project {
            id: Uuid::new_v4(),
            account_id: Uuid::new_v4(),
            slug: "acme".into(),
            name: "Acme".into(),
            external_mappings: HashMap::new(),
            allowed_categories: None,
            created_at: chrono::Utc::now(),
        };
        let path = "/rest/api/3/project/{projectIdOrKey}/issues";
        assert_eq!(find_injected_param("jira", path, Some(&project)), None);
    }
}
