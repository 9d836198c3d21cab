// ABOUTME: Permission checker — the seven-step decision algorithm gating every tool call
// ABOUTME: Returns a structured (allowed, reason) pair; reasons are safe to surface to the caller
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! Permission checker.
//!
//! Runs, in order, for every tool invocation:
//! 1. Blocked-pattern check (agent profile's `exclude_tools`, or the API key's fallback
//!    block-list when there is no profile) — an explicit block always wins.
//! 2. Agent profile check — an explicit `include_tools` match allows immediately；
//!    otherwise the profile's `categories` restriction, if non-empty, must pass (an empty
//!    list is no restriction, same as `None`).
//! 3. Project's `allowed_categories` override, if non-empty, must also pass.
//! 4. Category resolver fallback — the intersection of agent/project/user policy layers.
//! 5. Resource reads and `system_read`-classified tools are always allowed once the above
//!    pass (read access is not gated by execution mode).
//! 6. `system_write`-classified tools require `AgentMode::Power`, and (absent a profile)
//!    must match the API key's fallback allow-list if one is configured.
//! 7. Anything reaching this point without being denied is allowed.

use crate::category::CategoryResolver;
use crate::db::models::{AgentMode, AgentProfile, ApiKeyRecord, HttpMethod, Project};
use std::collections::HashSet;

/// Everything the permission checker needs to decide on one tool call.
pub struct PermissionContext<'a> {
    /// The exact tool name being invoked
    pub tool_name: &'a str,
    /// The HTTP method backing this tool, if it is a system action tool
    pub http_method: Option<HttpMethod>,
    /// Whether this call is a `resources/read` (always read-only)
    pub is_resource_read: bool,
    /// The caller's agent profile, if its API key is bound to one
    pub agent_profile: Option<&'a AgentProfile>,
    /// The caller's API key (for fallback mode/tool-list when no profile is bound)
    pub api_key: &'a ApiKeyRecord,
    /// The project this call targets
    pub project: &'a Project,
    /// Categories allowed by a project-identifier policy matching this project, if any
    pub project_policy_categories: Option<&'a [String]>,
    /// Categories allowed by a user policy matching the caller's asserted identity, if any
    pub user_policy_categories: Option<&'a [String]>,
    /// Categories allowed by an agent policy attached to the agent profile, if any
    pub agent_policy_categories: Option<&'a [String]>,
    /// Resolved execution mode (from the profile, or the key's fallback)
    pub mode: AgentMode,
}

/// Outcome of a permission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    /// Whether the call is allowed
    pub allowed: bool,
    /// Human-readable reason, safe to return to the caller
    pub reason: String,
}

impl Decision {
    fn allow(reason: impl Into<String>) -> Self {
        Self { allowed: true, reason: reason.into() }
    }

    fn deny(reason: impl Into<String>) -> Self {
        Self { allowed: false, reason: reason.into() }
    }
}

/// Evaluates the seven-step permission algorithm against a category resolver.
pub struct PermissionChecker<'a> {
    categories: &'a CategoryResolver,
}

impl<'a> PermissionChecker<'a> {
    /// Construct a checker bound to the account's category resolver.
    #[must_use]
    pub const fn new(categories: &'a CategoryResolver) -> Self {
        Self { categories }
    }

    /// Decide whether `ctx.tool_name` may be invoked.
    #[must_use]
    pub fn check(&self, ctx: &PermissionContext<'_>) -> Decision {
        // Step 1: blocked-pattern check
        if let Some(reason) = self.blocked_by_pattern(ctx) {
            return Decision::deny(reason);
        }

        // Step 2: agent profile check
        if let Some(profile) = ctx.agent_profile {
            if matches_any(&profile.include_tools, ctx.tool_name) {
                return Decision::allow("explicitly included by agent profile");
            }
            if let Some(categories) = non_empty(profile.categories.as_deref()) {
                let effective = Some(categories);
                if !self.categories.is_tool_allowed(ctx.tool_name, effective.as_ref()) {
                    return Decision::deny("not in agent profile's allowed categories");
                }
            }
        }

        // Step 3: project's allowed_categories override
        if let Some(categories) = non_empty(ctx.project.allowed_categories.as_deref()) {
            let effective = Some(categories);
            if !self.categories.is_tool_allowed(ctx.tool_name, effective.as_ref()) {
                return Decision::deny("blocked by project's allowed_categories restriction");
            }
        }

        // Step 4: category resolver fallback — intersect agent/project/user policy layers
        let effective = CategoryResolver::effective_policy(
            ctx.agent_policy_categories,
            ctx.project_policy_categories,
            ctx.user_policy_categories,
        );
        if !self.categories.is_tool_allowed(ctx.tool_name, effective.as_ref()) {
            return Decision::deny("blocked by category policy");
        }

        // Step 5: resource reads and read-only system actions are always allowed from here
        if ctx.is_resource_read || ctx.http_method.is_some_and(HttpMethod::is_query_only) {
            return Decision::allow("read access is always allowed once category checks pass");
        }

        // Step 6: writes require power mode (+ fallback allow-list match when unprofiled)
        if ctx.http_method.is_some_and(|m| !m.is_query_only()) {
            if ctx.mode != AgentMode::Power {
                return Decision::deny(
                    "write actions require Power mode; this session is running in Safe mode",
                );
            }
            if ctx.agent_profile.is_none() {
                if let Some(allowed) = ctx.api_key.fallback_allowed_tools.as_deref() {
                    if !matches_any(allowed, ctx.tool_name) {
                        return Decision::deny(
                            "tool is not in this API key's fallback allowed_tools list",
                        );
                    }
                }
            }
        }

        // Step 7: nothing denied the call
        Decision::allow("allowed")
    }

    fn blocked_by_pattern(&self, ctx: &PermissionContext<'_>) -> Option<String> {
        if let Some(profile) = ctx.agent_profile {
            if matches_any(&profile.exclude_tools, ctx.tool_name) {
                return Some("explicitly excluded by agent profile".into());
            }
        } else if let Some(blocked) = ctx.api_key.fallback_blocked_tools.as_deref() {
            if matches_any(blocked, ctx.tool_name) {
                return Some("blocked by this API key's fallback blocked_tools list".into());
            }
        }
        None
    }
}

fn matches_any(patterns: &[String], tool_name: &str) -> bool {
    patterns.iter().any(|p| crate::category::glob_match(p, tool_name))
}

/// An empty category list means "no restriction from this layer", same as `None` — only a
/// non-empty list actually restricts.
fn non_empty(categories: Option<&[String]>) -> Option<HashSet<String>> {
    let categories = categories?;
    if categories.is_empty() {
        return None;
    }
    Some(categories.iter().cloned().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn project(allowed_categories: Option<Vec<String>>) -> Project {
        Project {
            id: Uuid::new_v4(),
            account_id: Uuid::new_v4(),
            slug: "acme".into(),
            name: "Acme".into(),
            external_mappings: Default::default(),
            allowed_categories,
            created_at: chrono::Utc::now(),
        }
    }

    fn api_key(mode: AgentMode) -> ApiKeyRecord {
        ApiKeyRecord {
            id: Uuid::new_v4(),
            account_id: Uuid::new_v4(),
            project_id: None,
            key_prefix: "ak_live_12".into(),
            key_hash: "hash".into(),
            agent_profile_id: None,
            is_admin: false,
            fallback_mode: mode,
            fallback_allowed_tools: None,
            fallback_blocked_tools: None,
            created_at: chrono::Utc::now(),
            last_used_at: None,
            is_active: true,
        }
    }

    #[test]
    fn safe_mode_denies_write_with_power_substring_in_reason() {
        let resolver = CategoryResolver::new(vec![], vec![]);
        let checker = PermissionChecker::new(&resolver);
        let key = api_key(AgentMode::Safe);
        let proj = project(None);
        let ctx = PermissionContext {
            tool_name: "github_issues_create",
            http_method: Some(HttpMethod::Post),
            is_resource_read: false,
            agent_profile: None,
            api_key: &key,
            project: &proj,
            project_policy_categories: None,
            user_policy_categories: None,
            agent_policy_categories: None,
            mode: AgentMode::Safe,
        };
        let decision = checker.check(&ctx);
        assert!(!decision.allowed);
        assert!(decision.reason.contains("Power"));
    }

    #[test]
    fn read_actions_always_allowed_absent_category_restriction() {
        let resolver = CategoryResolver::new(vec![], vec![]);
        let checker = PermissionChecker::new(&resolver);
        let key = api_key(AgentMode::Safe);
        let proj = project(None);
        let ctx = PermissionContext {
            tool_name: "github_issues_list",
            http_method: Some(HttpMethod::Get),
            is_resource_read: false,
            agent_profile: None,
            api_key: &key,
            project: &proj,
            project_policy_categories: None,
            user_policy_categories: None,
            agent_policy_categories: None,
            mode: AgentMode::Safe,
        };
        assert!(checker.check(&ctx).allowed);
    }

    #[test]
    fn power_mode_with_fallback_allow_list_requires_match() {
        let resolver = CategoryResolver::new(vec![], vec![]);
        let checker = PermissionChecker::new(&resolver);
        let mut key = api_key(AgentMode::Power);
        key.fallback_allowed_tools = Some(vec!["github_issues_create".into()]);
        let proj = project(None);
        let ctx = PermissionContext {
            tool_name: "github_repos_delete",
            http_method: Some(HttpMethod::Delete),
            is_resource_read: false,
            agent_profile: None,
            api_key: &key,
            project: &proj,
            project_policy_categories: None,
            user_policy_categories: None,
            agent_policy_categories: None,
            mode: AgentMode::Power,
        };
        assert!(!checker.check(&ctx).allowed);
    }

    #[test]
    fn project_allowed_categories_override_blocks_uncategorized_tool() {
        let resolver = CategoryResolver::new(vec![], vec![]);
        let checker = PermissionChecker::new(&resolver);
        let key = api_key(AgentMode::Safe);
        let proj = project(Some(vec!["issue_read".into()]));
        let ctx = PermissionContext {
            tool_name: "github_issues_list",
            http_method: Some(HttpMethod::Get),
            is_resource_read: false,
            agent_profile: None,
            api_key: &key,
            project: &proj,
            project_policy_categories: None,
            user_policy_categories: None,
            agent_policy_categories: None,
            mode: AgentMode::Safe,
        };
        assert!(!checker.check(&ctx).allowed);
    }

    #[test]
    fn empty_project_allowed_categories_is_no_restriction() {
        let resolver = CategoryResolver::new(vec![], vec![]);
        let checker = PermissionChecker::new(&resolver);
        let key = api_key(AgentMode::Safe);
        let proj = project(Some(vec![]));
        let ctx = PermissionContext {
            tool_name: "github_issues_list",
            http_method: Some(HttpMethod::Get),
            is_resource_read: false,
            agent_profile: None,
            api_key: &key,
            project: &proj,
            project_policy_categories: None,
            user_policy_categories: None,
            agent_policy_categories: None,
            mode: AgentMode::Safe,
        };
        assert!(checker.check(&ctx).allowed);
    }
}
