// ABOUTME: Category resolver — classifies tool names and intersects agent/project/user policy layers
// ABOUTME: Null means "no restriction" at every layer; default-deny applies once any layer restricts
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! Category resolver.
//!
//! Three independent policy layers (agent, project, user) each express either "no
//! restriction" (`None`, or an empty list — the two are equivalent) or a non-empty set of
//! allowed categories. The effective policy is their intersection, with "no restriction"
//! acting as the identity element. A tool with no category mapping is blocked whenever the
//! effective policy is restricted at all — categorization failure must never silently grant
//! access.

use crate::db::models::{ToolCategory, ToolCategoryMapping};
use std::collections::HashSet;
use uuid::Uuid;

/// Classifies tool names into categories via glob patterns, and resolves the effective
/// category restriction for a call.
pub struct CategoryResolver {
    mappings: Vec<ToolCategoryMapping>,
    categories: Vec<ToolCategory>,
}

impl CategoryResolver {
    /// Build a resolver from an account's configured categories and glob mappings.
    #[must_use]
    pub const fn new(categories: Vec<ToolCategory>, mappings: Vec<ToolCategoryMapping>) -> Self {
        Self { mappings, categories }
    }

    /// The category names a tool belongs to, matched by `fnmatch`-style glob against its name.
    /// A tool may belong to more than one category if multiple patterns match.
    #[must_use]
    pub fn categories_for_tool(&self, tool_name: &str) -> HashSet<String> {
        let matching_category_ids: HashSet<Uuid> = self
            .mappings
            .iter()
            .filter(|m| glob_match(&m.pattern, tool_name))
            .map(|m| m.category_id)
            .collect();

        self.categories
            .iter()
            .filter(|c| matching_category_ids.contains(&c.id))
            .map(|c| c.name.clone())
            .collect()
    }

    /// Intersect the agent, project, and user policy layers. `None` and `Some(&[])` are both
    /// the identity element (no restriction from that layer); a non-empty `Some(set)` restricts
    /// to that set.
    #[must_use]
    pub fn effective_policy(
        agent: Option<&[String]>,
        project: Option<&[String]>,
        user: Option<&[String]>,
    ) -> Option<HashSet<String>> {
        intersect_all(&[agent, project, user])
    }

    /// Whether `tool_name` is allowed under the effective category policy.
    ///
    /// A `None` effective policy allows everything. A restricted policy allows only tools
    /// whose categories intersect it; an uncategorized tool is denied whenever the policy
    /// is restricted at all, even if the restriction set is non-empty (default-deny).
    #[must_use]
    pub fn is_tool_allowed(&self, tool_name: &str, effective: Option<&HashSet<String>>) -> bool {
        let Some(allowed) = effective else {
            return true;
        };
        let tool_categories = self.categories_for_tool(tool_name);
        !tool_categories.is_empty() && tool_categories.iter().any(|c| allowed.contains(c))
    }
}

fn intersect_all(layers: &[Option<&[String]>]) -> Option<HashSet<String>> {
    let mut effective: Option<HashSet<String>> = None;
    for layer in layers.iter().flatten().filter(|layer| !layer.is_empty()) {
        let layer_set: HashSet<String> = layer.iter().cloned().collect();
        effective = Some(match effective {
            None => layer_set,
            Some(current) => current.intersection(&layer_set).cloned().collect(),
        });
    }
    effective
}

/// `fnmatch`-style glob match (`*` and `?` wildcards), used for both tool-category mappings
/// and project-identifier policy patterns.
#[must_use]
pub fn glob_match(pattern: &str, text: &str) -> bool {
    glob::Pattern::new(pattern).is_ok_and(|p| p.matches(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn category(id: Uuid, name: &str) -> ToolCategory {
        ToolCategory {
            id,
            account_id: Uuid::new_v4(),
            name: name.into(),
            risk_level: crate::db::models::RiskLevel::Low,
        }
    }

    fn mapping(pattern: &str, category_id: Uuid) -> ToolCategoryMapping {
        ToolCategoryMapping {
            id: Uuid::new_v4(),
            account_id: Uuid::new_v4(),
            pattern: pattern.into(),
            category_id,
        }
    }

    #[test]
    fn null_layers_mean_no_restriction() {
        assert_eq!(CategoryResolver::effective_policy(None, None, None), None);
    }

    #[test]
    fn intersection_is_commutative() {
        let a = vec!["read".to_string(), "write".to_string()];
        let b = vec!["write".to_string(), "admin".to_string()];
        let ab = CategoryResolver::effective_policy(Some(&a), Some(&b), None);
        let ba = CategoryResolver::effective_policy(Some(&b), Some(&a), None);
        assert_eq!(ab, ba);
        assert_eq!(ab, Some(HashSet::from(["write".to_string()])));
    }

    #[test]
    fn empty_layer_is_no_restriction() {
        let empty: Vec<String> = vec![];
        let effective = CategoryResolver::effective_policy(Some(&empty), None, None);
        assert_eq!(effective, None);
    }

    #[test]
    fn empty_layer_does_not_override_a_restricting_layer() {
        let empty: Vec<String> = vec![];
        let restricted = vec!["read".to_string()];
        let effective = CategoryResolver::effective_policy(Some(&empty), Some(&restricted), None);
        assert_eq!(effective, Some(HashSet::from(["read".to_string()])));
    }

    #[test]
    fn uncategorized_tool_denied_under_restriction_default_deny() {
        let resolver = CategoryResolver::new(vec![], vec![]);
        let restricted = Some(HashSet::from(["read".to_string()]));
        assert!(!resolver.is_tool_allowed("mystery_tool", restricted.as_ref()));
    }

    #[test]
    fn uncategorized_tool_allowed_when_unrestricted() {
        let resolver = CategoryResolver::new(vec![], vec![]);
        assert!(resolver.is_tool_allowed("mystery_tool", None));
    }

    #[test]
    fn glob_mapping_classifies_tool() {
        let cat_id = Uuid::new_v4();
        let resolver = CategoryResolver::new(
            vec![category(cat_id, "issue_read")],
            vec![mapping("github_issues_*", cat_id)],
        );
        let categories = resolver.categories_for_tool("github_issues_list");
        assert!(categories.contains("issue_read"));

        let restricted = Some(HashSet::from(["issue_read".to_string()]));
        assert!(resolver.is_tool_allowed("github_issues_list", restricted.as_ref()));
        assert!(!resolver.is_tool_allowed("github_issues_list", Some(&HashSet::from(["other".to_string()]))));
    }
}
