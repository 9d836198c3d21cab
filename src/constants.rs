// ABOUTME: Constants module with domain-separated organization
// ABOUTME: Groups application constants by domain rather than one flat list
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! Constants module
//!
//! Organizes gateway constants by domain: API key formats, session limits,
//! pagination safety caps, JSON-RPC error codes, and cache defaults.

/// API key format constants
pub mod key_prefixes {
    /// Live API key prefix
    pub const LIVE: &str = "ak_live_";
    /// Number of random bytes encoded after the prefix
    pub const RANDOM_BYTES: usize = 32;
    /// Length of the stored key prefix used for lookup
    pub const LOOKUP_PREFIX_LEN: usize = 10;
}

/// HTTP transport session limits
pub mod sessions {
    /// Idle session timeout in seconds (30 minutes)
    pub const IDLE_TIMEOUT_SECS: u64 = 1800;
    /// Maximum sessions across the whole server
    pub const MAX_TOTAL_SESSIONS: usize = 1000;
    /// Maximum concurrent sessions per API key
    pub const MAX_SESSIONS_PER_KEY: usize = 10;
    /// SSE keepalive comment interval in seconds
    pub const SSE_KEEPALIVE_SECS: u64 = 15;
}

/// Auto-pagination safety caps for the action executor
pub mod pagination {
    /// Default maximum pages fetched per auto-paginated call
    pub const DEFAULT_MAX_PAGES: u32 = 50;
    /// Default maximum items collected per auto-paginated call
    pub const DEFAULT_MAX_ITEMS: usize = 10_000;
    /// Default wall-clock budget for auto-pagination in seconds
    pub const DEFAULT_MAX_TIME_SECS: u64 = 120;
    /// Consecutive empty pages before giving up
    pub const DEFAULT_MAX_EMPTY_PAGES: u32 = 3;
    /// Default page size requested from upstream APIs
    pub const DEFAULT_PAGE_SIZE: usize = 100;
    /// Upper bound a single page request may set `size_param` to
    pub const DEFAULT_MAX_SIZE: usize = 100;
    /// First page number when the upstream API's pagination is 1-indexed
    pub const DEFAULT_START_PAGE: u32 = 1;
}

/// Credential refresh constants
pub mod credentials {
    /// Refresh the access token this many seconds before it expires
    pub const REFRESH_SAFETY_MARGIN_SECS: i64 = 300;
}

/// Audit log sanitization and summarization limits
pub mod audit {
    /// Max length of a string parameter value before truncation
    pub const MAX_PARAM_STRING_LEN: usize = 1000;
    /// Max length of a string result preview before truncation
    pub const MAX_RESULT_STRING_LEN: usize = 500;
    /// Max depth when truncating nested result objects
    pub const MAX_RESULT_DEPTH: usize = 3;
    /// Max top-level items kept when truncating a result object
    pub const MAX_RESULT_ITEMS: usize = 20;
    /// Max reasoning characters surfaced in `get_related_actions`
    pub const RELATED_REASONING_PREVIEW_LEN: usize = 200;
    /// Substrings that mark a parameter key as sensitive (case-insensitive)
    pub const SENSITIVE_KEY_SUBSTRINGS: &[&str] = &[
        "password",
        "token",
        "api_key",
        "secret",
        "credential",
        "auth",
        "authorization",
        "cookie",
        "session",
    ];
}

/// In-memory cache defaults
pub mod cache {
    /// Maximum cached entries before LRU eviction kicks in
    pub const DEFAULT_MAX_ENTRIES: usize = 10_000;
    /// Background cleanup sweep interval in seconds
    pub const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 60;
    /// Default TTL for a cached OAuth2 access token, in seconds
    pub const DEFAULT_TOKEN_TTL_SECS: u64 = 3600;
}

/// JSON-RPC 2.0 reserved and MCP-specific error codes
pub mod jsonrpc_errors {
    /// Invalid JSON was received
    pub const PARSE_ERROR: i64 = -32700;
    /// The JSON sent is not a valid request object
    pub const INVALID_REQUEST: i64 = -32600;
    /// The method does not exist / is not available
    pub const METHOD_NOT_FOUND: i64 = -32601;
    /// Invalid method parameter(s)
    pub const INVALID_PARAMS: i64 = -32602;
    /// Internal JSON-RPC error
    pub const INTERNAL_ERROR: i64 = -32603;
    /// Gateway-specific: authentication or session error
    pub const SERVER_ERROR: i64 = -32000;
    /// Gateway-specific: permission denied for a tool/resource
    pub const PERMISSION_DENIED: i64 = -32001;
    /// Gateway-specific: upstream system call failed
    pub const UPSTREAM_ERROR: i64 = -32002;
}

/// MCP protocol identifiers
pub mod protocol {
    /// Supported protocol versions, most preferred first
    pub const SUPPORTED_VERSIONS: &[&str] = &["2025-06-18", "2024-11-05"];
    /// Name advertised in `serverInfo`
    pub const SERVER_NAME: &str = "toolgate-mcp-gateway";
    /// Version advertised in `serverInfo`
    pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");
}

/// Tool name sanitization
pub mod tool_names {
    /// Maximum length of a sanitized tool name exposed to agents
    pub const MAX_LENGTH: usize = 64;
}

/// Path-parameter auto-injection
pub mod auto_injection {
    /// Placeholder names recognized as "the project identifier" for a system, in priority order
    pub const PROJECT_PARAM_NAMES: &[&str] = &[
        "project_id",
        "projectId",
        "project_key",
        "projectKey",
        "projectIdOrKey",
        "project",
        "workspace_id",
        "workspaceId",
        "repo",
        "repository",
        "repo_slug",
    ];
}
