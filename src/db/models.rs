// ABOUTME: Domain entity types for the gateway's multi-tenant catalog and permission model
// ABOUTME: Pure data structs; row<->entity conversion lives in the store modules that query them
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// A tenant. Every other row in the system belongs to exactly one account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Primary key
    pub id: Uuid,
    /// Display name
    pub name: String,
    /// Unique, URL-safe slug
    pub slug: String,
    /// When this account was provisioned
    pub created_at: DateTime<Utc>,
    /// Soft-disable without deleting history
    pub is_active: bool,
}

/// A third-party API the gateway can expose tools against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct System {
    /// Primary key
    pub id: Uuid,
    /// Owning account
    pub account_id: Uuid,
    /// Display name
    pub name: String,
    /// Short alias used in generated tool/resource names
    pub alias: String,
    /// Base URL actions are resolved against
    pub base_url: String,
    /// When this system was registered
    pub created_at: DateTime<Utc>,
}

/// Authentication scheme attached to a system's interface.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InterfaceAuth {
    /// A static key sent as a named header (or query parameter)
    ApiKey {
        /// Header (or query parameter) name the key is sent under
        header: String,
        /// Whether `header` names a header or a query parameter
        #[serde(default)]
        in_query: bool,
    },
    /// A static bearer token, supplied via the credential store
    Bearer,
    /// HTTP basic auth, username/password supplied via the credential store
    Basic,
    /// OAuth2 authorization-code grant (token refresh is out of scope; credentials
    /// are expected to already hold a valid access/refresh token pair)
    OAuth2,
    /// OAuth2 resource-owner password-credentials grant
    OAuth2Password {
        /// Token endpoint URL
        token_url: String,
        /// Response JSON field carrying the access token
        #[serde(default = "default_token_field")]
        token_field: String,
        /// Response JSON field carrying the expiry, in seconds
        #[serde(default = "default_expires_field")]
        expires_field: String,
    },
    /// Opaque session cookie/token managed entirely by the upstream system
    Session,
    /// No authentication
    None,
}

fn default_token_field() -> String {
    "access_token".into()
}

fn default_expires_field() -> String {
    "expires_in".into()
}

/// A system's single configured interface (auth + transport details).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interface {
    /// Primary key
    pub id: Uuid,
    /// System this interface belongs to
    pub system_id: Uuid,
    /// Authentication scheme
    pub auth: InterfaceAuth,
    /// When this interface was configured
    pub created_at: DateTime<Utc>,
}

/// A logical grouping of actions within a system (e.g. "issues", "repositories").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    /// Primary key
    pub id: Uuid,
    /// Owning system
    pub system_id: Uuid,
    /// Display name
    pub name: String,
    /// Short alias used in generated tool names
    pub alias: String,
    /// When this resource was registered
    pub created_at: DateTime<Utc>,
}

/// HTTP method an action dispatches with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    /// GET
    Get,
    /// POST
    Post,
    /// PUT
    Put,
    /// PATCH
    Patch,
    /// DELETE
    Delete,
    /// HEAD
    Head,
    /// OPTIONS
    Options,
}

impl HttpMethod {
    /// True for methods whose parameters are sent as query parameters rather than a body
    #[must_use]
    pub const fn is_query_only(self) -> bool {
        matches!(self, Self::Get | Self::Head | Self::Options)
    }

    /// Parse from a free-form string (case-insensitive), defaulting to GET on unrecognized input
    #[must_use]
    pub fn parse_or_get(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "POST" => Self::Post,
            "PUT" => Self::Put,
            "PATCH" => Self::Patch,
            "DELETE" => Self::Delete,
            "HEAD" => Self::Head,
            "OPTIONS" => Self::Options,
            _ => Self::Get,
        }
    }

    /// Render as the canonical uppercase HTTP method string
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
        }
    }
}

/// Auto-pagination configuration attached to an action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationSpec {
    /// Query parameter carrying the page number
    #[serde(default = "default_page_param")]
    pub page_param: String,
    /// Query parameter carrying the page size
    #[serde(default = "default_size_param")]
    pub size_param: String,
    /// Page size requested when the caller doesn't specify one
    #[serde(default = "default_page_size")]
    pub default_size: usize,
    /// Largest page size the upstream system accepts
    #[serde(default = "default_max_size")]
    pub max_size: usize,
    /// First page number (1-indexed APIs vs 0-indexed APIs)
    #[serde(default = "default_start_page")]
    pub start_page: u32,
    /// Response JSON pointer (dot path) to the array of items, if not top-level
    pub data_field: Option<String>,
    /// Response field signaling the total page count
    #[serde(default = "default_total_pages_field")]
    pub total_pages_field: String,
    /// Response field signaling "this is the last page"
    #[serde(default = "default_last_page_field")]
    pub last_page_field: String,
    /// Largest number of pages this action will fetch before stopping
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    /// Largest number of items this action will accumulate before stopping
    #[serde(default = "default_max_items")]
    pub max_items: usize,
    /// Wall-clock budget, in seconds, this action's auto-pagination may spend
    #[serde(default = "default_max_time_seconds")]
    pub max_time_seconds: u64,
}

fn default_page_param() -> String {
    "page".into()
}
fn default_size_param() -> String {
    "pageSize".into()
}
fn default_page_size() -> usize {
    crate::constants::pagination::DEFAULT_PAGE_SIZE
}
fn default_max_size() -> usize {
    crate::constants::pagination::DEFAULT_MAX_SIZE
}
fn default_start_page() -> u32 {
    crate::constants::pagination::DEFAULT_START_PAGE
}
fn default_total_pages_field() -> String {
    "totalPages".into()
}
fn default_last_page_field() -> String {
    "last".into()
}
fn default_max_pages() -> u32 {
    crate::constants::pagination::DEFAULT_MAX_PAGES
}
fn default_max_items() -> usize {
    crate::constants::pagination::DEFAULT_MAX_ITEMS
}
fn default_max_time_seconds() -> u64 {
    crate::constants::pagination::DEFAULT_MAX_TIME_SECS
}

/// A single callable operation against a system, surfaced as an MCP tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    /// Primary key
    pub id: Uuid,
    /// Owning resource
    pub resource_id: Uuid,
    /// Display name
    pub name: String,
    /// Short alias used in the generated tool name
    pub alias: String,
    /// HTTP method
    pub method: HttpMethod,
    /// Path template, e.g. `/projects/{project_id}/issues/{issue_id}`
    pub path: String,
    /// Static headers sent with every call
    pub headers: HashMap<String, String>,
    /// JSON Schema describing accepted parameters
    pub parameters_schema: Value,
    /// JSON Schema describing the shape of a successful response, if known
    pub output_schema: Option<Value>,
    /// Auto-pagination configuration, if this action supports `fetch_all_pages`
    pub pagination: Option<PaginationSpec>,
    /// Example invocations surfaced in tool documentation
    pub examples: Option<Value>,
    /// Whether this action is currently exposed as an MCP tool
    pub is_mcp_enabled: bool,
}

/// A logical scoping unit inside an account (a specific customer, workspace, or environment).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    /// Primary key
    pub id: Uuid,
    /// Owning account
    pub account_id: Uuid,
    /// Unique (per account) slug
    pub slug: String,
    /// Display name
    pub name: String,
    /// Mapping from recognized path-parameter names to this project's upstream identifiers
    pub external_mappings: HashMap<String, String>,
    /// If set, restricts this project to a fixed set of tool categories regardless of agent/user policy
    pub allowed_categories: Option<Vec<String>>,
    /// When this project was created
    pub created_at: DateTime<Utc>,
}

/// Where a project's credential for a given system should be read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialSource {
    /// Use the account-wide shared credential
    Account,
    /// Use a credential scoped to this specific project
    Project,
}

/// Declares that a project is wired up to call a given system, and where its credential lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectIntegration {
    /// Primary key
    pub id: Uuid,
    /// Project this integration belongs to
    pub project_id: Uuid,
    /// System being integrated
    pub system_id: Uuid,
    /// Credential scope
    pub credential_source: CredentialSource,
}

/// Execution mode an API key/session operates under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentMode {
    /// Read-only; write actions against `system_write`-categorized tools are denied
    Safe,
    /// Full access, subject to the usual category/profile/policy checks
    Power,
}

/// A caller-presented credential granting access to the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyRecord {
    /// Primary key
    pub id: Uuid,
    /// Owning account
    pub account_id: Uuid,
    /// Project this key is bound to, if any (an unbound key may target any project via `X-Project-Id`)
    pub project_id: Option<Uuid>,
    /// First `LOOKUP_PREFIX_LEN` characters of the plaintext key, used for O(1) DB lookup
    pub key_prefix: String,
    /// SHA-256 hash (hex) of the full plaintext key
    pub key_hash: String,
    /// Agent profile this key inherits categories/tool filters/mode from, if any
    pub agent_profile_id: Option<Uuid>,
    /// When true, bypasses project-override header restriction and bypasses category gating
    pub is_admin: bool,
    /// Fallback mode used when `agent_profile_id` is absent
    pub fallback_mode: AgentMode,
    /// Fallback tool allow-list used when `agent_profile_id` is absent (`None` = no restriction)
    pub fallback_allowed_tools: Option<Vec<String>>,
    /// Fallback tool block-list used when `agent_profile_id` is absent
    pub fallback_blocked_tools: Option<Vec<String>>,
    /// When this key was issued
    pub created_at: DateTime<Utc>,
    /// Last time this key successfully authenticated
    pub last_used_at: Option<DateTime<Utc>>,
    /// Soft revocation flag
    pub is_active: bool,
}

/// A named bundle of category/tool restrictions an API key (or session) can inherit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentProfile {
    /// Primary key
    pub id: Uuid,
    /// Owning account
    pub account_id: Uuid,
    /// Display name
    pub name: String,
    /// Tool categories this profile is restricted to (`None` = no restriction)
    pub categories: Option<Vec<String>>,
    /// Tools explicitly allowed regardless of category membership
    pub include_tools: Vec<String>,
    /// Tools explicitly denied regardless of category membership
    pub exclude_tools: Vec<String>,
    /// Execution mode
    pub mode: AgentMode,
}

/// Risk classification of a tool category, surfaced to agents/operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    /// Read-only, low blast radius
    Low,
    /// Writes with limited blast radius
    Medium,
    /// Destructive or hard-to-reverse
    High,
}

/// A named classification tools are grouped under (e.g. "issue_management").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCategory {
    /// Primary key
    pub id: Uuid,
    /// Owning account
    pub account_id: Uuid,
    /// Display name, referenced by policies/profiles
    pub name: String,
    /// Risk classification
    pub risk_level: RiskLevel,
}

/// A glob pattern matching generated tool names to a category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCategoryMapping {
    /// Primary key
    pub id: Uuid,
    /// Owning account
    pub account_id: Uuid,
    /// `fnmatch`-style glob pattern, matched against the generated tool name
    pub pattern: String,
    /// Category a matching tool belongs to
    pub category_id: Uuid,
}

/// Category restriction attached to an agent profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentPolicy {
    /// Primary key
    pub id: Uuid,
    /// Agent profile this policy restricts
    pub agent_profile_id: Uuid,
    /// Allowed categories (`None` = no restriction, `Some(vec![])` = nothing allowed)
    pub categories: Option<Vec<String>>,
}

/// Category restriction attached to a project (or a glob of projects).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectPolicy {
    /// Primary key
    pub id: Uuid,
    /// Owning account
    pub account_id: Uuid,
    /// Glob pattern matched against project slugs
    pub project_identifier: String,
    /// Allowed categories (`None` = no restriction, `Some(vec![])` = nothing allowed)
    pub categories: Option<Vec<String>>,
}

/// Category restriction attached to a specific end user (referenced by `ApiKeyRecord` indirectly
/// through whatever identity the caller asserts).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPolicy {
    /// Primary key
    pub id: Uuid,
    /// Owning account
    pub account_id: Uuid,
    /// External user identifier this policy restricts
    pub external_user_id: String,
    /// Allowed categories (`None` = no restriction, `Some(vec![])` = nothing allowed)
    pub categories: Option<Vec<String>>,
}

/// A stored secret used to authenticate to an upstream system on behalf of an account/project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    /// Primary key
    pub id: Uuid,
    /// Owning account
    pub account_id: Uuid,
    /// System this credential authenticates against
    pub system_id: Uuid,
    /// Project this credential is scoped to; `None` means it is the account-wide shared credential
    pub project_id: Option<Uuid>,
    /// Plaintext secret payload (API key, bearer token, username/password, OAuth2 tokens, ...)
    pub data: Value,
    /// Expiry of the current access token, if time-limited
    pub expires_at: Option<DateTime<Utc>>,
    /// Free-form settings (e.g. `api_key_header` override)
    pub custom_settings: Value,
    /// When this credential was first stored
    pub created_at: DateTime<Utc>,
    /// When this credential's secret data was last updated
    pub updated_at: DateTime<Utc>,
}

/// Lifecycle status of an audit entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    /// The call is still executing
    Pending,
    /// The call completed successfully
    Success,
    /// The call failed
    Error,
}

/// The kind of thing an audit entry records a call against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditToolType {
    /// A system action tool (`{system}_{resource}_{action}`)
    System,
    /// A business tool from a capability pack
    Business,
    /// `set_context`/`get_context`
    Context,
    /// An `resources/read` call
    Resource,
    /// An audit tool (`rollback_action`, etc.)
    Audit,
}

/// One row in the audit log: a single tool invocation with its reasoning and outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Primary key
    pub id: Uuid,
    /// Owning account
    pub account_id: Uuid,
    /// Project the call was made against
    pub project_id: Uuid,
    /// API key that authenticated the call
    pub api_key_id: Uuid,
    /// Agent identifier, if the caller asserted one via `set_context`
    pub agent_id: Option<Uuid>,
    /// Tool name exactly as invoked
    pub tool_name: String,
    /// Tool family
    pub tool_type: AuditToolType,
    /// Sanitized input parameters
    pub parameters: Value,
    /// Caller-supplied reasoning summary (why this call is being made)
    pub reasoning_summary: Option<String>,
    /// Caller-supplied reasoning detail (longer-form justification)
    pub reasoning_detail: Option<String>,
    /// Correlates this entry with others in the same logical operation
    pub correlation_id: String,
    /// Outcome status
    pub status: AuditStatus,
    /// Summarized result payload (truncated/redacted), present once `status != Pending`
    pub result_summary: Option<Value>,
    /// Error message, present only when `status == Error`
    pub error: Option<String>,
    /// Whether this call is eligible for rollback
    pub is_reversible: bool,
    /// Data needed to undo this call (e.g. `{type, system, created_id}`), present iff reversible
    pub rollback_data: Option<Value>,
    /// Whether this call has since been rolled back
    pub rolled_back: bool,
    /// When this call was rolled back, present iff `rolled_back`
    pub rolled_back_at: Option<DateTime<Utc>>,
    /// The audit entry id of the `rollback:<tool>` call that rolled this one back
    pub rollback_audit_id: Option<Uuid>,
    /// When the call began
    pub started_at: DateTime<Utc>,
    /// When the call finished, present once `status != Pending`
    pub completed_at: Option<DateTime<Utc>>,
    /// Wall-clock duration in milliseconds, present once `status != Pending`
    pub duration_ms: Option<i64>,
}

/// A named bundle of business tools, namespaced onto generated tool names as `{pack_alias}_*`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityPack {
    /// Primary key
    pub id: Uuid,
    /// Owning account
    pub account_id: Uuid,
    /// Display name
    pub name: String,
    /// Short alias used as the tool name prefix
    pub alias: String,
}

/// A business-level tool that wraps a single system action with default values and field mappings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusinessTool {
    /// Primary key
    pub id: Uuid,
    /// Owning capability pack
    pub pack_id: Uuid,
    /// Tool name within the pack, combined as `{pack_alias}_{tool_name}`
    pub tool_name: String,
    /// The system action this tool wraps
    pub action_id: Uuid,
    /// Human + LLM description
    pub description: String,
    /// Parameter values supplied automatically when the caller omits them
    pub default_parameters: Value,
    /// Maps business-facing field names to the wrapped action's API field names
    pub input_field_mapping: HashMap<String, String>,
    /// Maps the wrapped action's API response field names back to business-facing field names
    pub output_field_mapping: HashMap<String, String>,
    /// Whether this business tool is currently exposed as an MCP tool
    pub is_mcp_enabled: bool,
}

/// A live MCP session, tracked independently of its transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Session identifier, sent back as `Mcp-Session-Id`
    pub id: Uuid,
    /// Owning account
    pub account_id: Uuid,
    /// Project this session is scoped to
    pub project_id: Uuid,
    /// API key that created this session
    pub api_key_id: Uuid,
    /// Execution mode resolved at session creation
    pub mode: AgentMode,
    /// Agent identifier, set by `set_context` after creation
    pub agent_id: Option<Uuid>,
    /// When this session was created
    pub created_at: DateTime<Utc>,
    /// Last time this session processed a request
    pub last_activity: DateTime<Utc>,
}
