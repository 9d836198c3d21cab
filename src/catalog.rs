// ABOUTME: Catalog store — read-heavy access to systems, interfaces, resources, actions, and projects
// ABOUTME: Caches a per-account snapshot in memory; writers must call `invalidate` after mutating rows
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! Catalog store.
//!
//! Every other component (category resolver, permission checker, tool registry, action
//! executor) reads systems/resources/actions/projects through here rather than issuing
//! its own queries. Catalog rows change rarely relative to how often they're read, so a
//! snapshot is cached per account and invalidated explicitly by whatever wrote the row.

use crate::db::models::{
    Action, BusinessTool, CapabilityPack, HttpMethod, Interface, InterfaceAuth, PaginationSpec,
    Project, ProjectIntegration, Resource, RiskLevel, System, ToolCategory, ToolCategoryMapping,
};
use crate::db::DbPool;
use crate::errors::{AppError, AppResult};
use dashmap::DashMap;
use serde_json::Value;
use sqlx::Row;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Everything the catalog knows about one account, loaded in a handful of queries.
#[derive(Debug, Clone, Default)]
pub struct CatalogSnapshot {
    /// Systems registered to this account, keyed by id
    pub systems: HashMap<Uuid, System>,
    /// Interfaces, keyed by their system's id
    pub interfaces: HashMap<Uuid, Interface>,
    /// Resources, keyed by id
    pub resources: HashMap<Uuid, Resource>,
    /// Actions, keyed by id
    pub actions: HashMap<Uuid, Action>,
    /// Projects, keyed by id
    pub projects: HashMap<Uuid, Project>,
    /// Project integrations, keyed by project id
    pub project_integrations: HashMap<Uuid, Vec<ProjectIntegration>>,
    /// Capability packs registered to this account, keyed by id
    pub capability_packs: HashMap<Uuid, CapabilityPack>,
    /// Business tools, keyed by their pack's id
    pub business_tools: HashMap<Uuid, Vec<BusinessTool>>,
    /// Tool categories configured for this account
    pub tool_categories: Vec<ToolCategory>,
    /// Glob pattern -> category mappings configured for this account
    pub tool_category_mappings: Vec<ToolCategoryMapping>,
}

impl CatalogSnapshot {
    /// Resources belonging to a system
    #[must_use]
    pub fn resources_for_system(&self, system_id: Uuid) -> Vec<&Resource> {
        self.resources
            .values()
            .filter(|r| r.system_id == system_id)
            .collect()
    }

    /// Actions belonging to a resource
    #[must_use]
    pub fn actions_for_resource(&self, resource_id: Uuid) -> Vec<&Action> {
        self.actions
            .values()
            .filter(|a| a.resource_id == resource_id)
            .collect()
    }

    /// Find a system by its alias
    #[must_use]
    pub fn system_by_alias(&self, alias: &str) -> Option<&System> {
        self.systems.values().find(|s| s.alias == alias)
    }

    /// Find a project by its slug
    #[must_use]
    pub fn project_by_slug(&self, slug: &str) -> Option<&Project> {
        self.projects.values().find(|p| p.slug == slug)
    }

    /// Find a business tool by its id, searching across every capability pack.
    #[must_use]
    pub fn business_tool_by_id(&self, id: Uuid) -> Option<&BusinessTool> {
        self.business_tools.values().flatten().find(|t| t.id == id)
    }

    /// Build a category resolver from this snapshot's categories and mappings.
    #[must_use]
    pub fn category_resolver(&self) -> crate::category::CategoryResolver {
        crate::category::CategoryResolver::new(
            self.tool_categories.clone(),
            self.tool_category_mappings.clone(),
        )
    }
}

/// Catalog store backed by the gateway database, with a per-account in-memory snapshot cache.
pub struct CatalogStore {
    db: DbPool,
    cache: DashMap<Uuid, Arc<CatalogSnapshot>>,
}

impl CatalogStore {
    /// Construct a catalog store over the given database pool.
    #[must_use]
    pub fn new(db: DbPool) -> Self {
        Self {
            db,
            cache: DashMap::new(),
        }
    }

    /// Drop the cached snapshot for an account so the next read reloads from the database.
    ///
    /// Call this after any write to that account's systems, interfaces, resources, actions,
    /// or projects.
    pub fn invalidate(&self, account_id: Uuid) {
        self.cache.remove(&account_id);
    }

    /// Load (or return the cached) snapshot for an account.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the underlying queries fail.
    pub async fn snapshot(&self, account_id: Uuid) -> AppResult<Arc<CatalogSnapshot>> {
        if let Some(existing) = self.cache.get(&account_id) {
            return Ok(Arc::clone(&existing));
        }

        let snapshot = Arc::new(self.load_snapshot(account_id).await?);
        self.cache.insert(account_id, Arc::clone(&snapshot));
        Ok(snapshot)
    }

    async fn load_snapshot(&self, account_id: Uuid) -> AppResult<CatalogSnapshot> {
        let pool = self.db.raw();
        let account_str = account_id.to_string();

        let system_rows = sqlx::query(
            "SELECT id, account_id, name, alias, base_url, created_at FROM systems WHERE account_id = ?",
        )
        .bind(&account_str)
        .fetch_all(pool)
        .await?;

        let mut systems = HashMap::new();
        let mut interfaces = HashMap::new();
        let mut resources = HashMap::new();
        let mut actions = HashMap::new();

        for row in system_rows {
            let system = row_to_system(&row)?;
            let system_id = system.id;
            systems.insert(system_id, system);

            if let Some(interface) = self.load_interface(system_id).await? {
                interfaces.insert(system_id, interface);
            }

            let resource_rows = sqlx::query(
                "SELECT id, system_id, name, alias, created_at FROM resources WHERE system_id = ?",
            )
            .bind(system_id.to_string())
            .fetch_all(pool)
            .await?;

            for resource_row in resource_rows {
                let resource = row_to_resource(&resource_row)?;
                let resource_id = resource.id;
                resources.insert(resource_id, resource);

                let action_rows = sqlx::query(
                    "SELECT id, resource_id, name, alias, method, path, headers_json, \
                     parameters_schema_json, output_schema_json, pagination_json, examples_json, \
                     is_mcp_enabled FROM actions WHERE resource_id = ?",
                )
                .bind(resource_id.to_string())
                .fetch_all(pool)
                .await?;

                for action_row in action_rows {
                    let action = row_to_action(&action_row)?;
                    actions.insert(action.id, action);
                }
            }
        }

        let project_rows = sqlx::query(
            "SELECT id, account_id, slug, name, external_mappings_json, allowed_categories_json, \
             created_at FROM projects WHERE account_id = ?",
        )
        .bind(&account_str)
        .fetch_all(pool)
        .await?;

        let mut projects = HashMap::new();
        let mut project_integrations = HashMap::new();

        for row in project_rows {
            let project = row_to_project(&row)?;
            let project_id = project.id;
            projects.insert(project_id, project);

            let integration_rows = sqlx::query(
                "SELECT id, project_id, system_id, credential_source FROM project_integrations \
                 WHERE project_id = ?",
            )
            .bind(project_id.to_string())
            .fetch_all(pool)
            .await?;

            let integrations = integration_rows
                .iter()
                .map(row_to_integration)
                .collect::<AppResult<Vec<_>>>()?;
            project_integrations.insert(project_id, integrations);
        }

        let pack_rows = sqlx::query("SELECT id, account_id, name, alias FROM capability_packs WHERE account_id = ?")
            .bind(&account_str)
            .fetch_all(pool)
            .await?;

        let mut capability_packs = HashMap::new();
        let mut business_tools = HashMap::new();

        for row in pack_rows {
            let pack = row_to_pack(&row)?;
            let pack_id = pack.id;
            capability_packs.insert(pack_id, pack);

            let tool_rows = sqlx::query(
                "SELECT id, pack_id, tool_name, action_id, description, default_parameters_json, \
                 input_field_mapping_json, output_field_mapping_json, is_mcp_enabled \
                 FROM business_tools WHERE pack_id = ?",
            )
            .bind(pack_id.to_string())
            .fetch_all(pool)
            .await?;

            let tools = tool_rows.iter().map(row_to_business_tool).collect::<AppResult<Vec<_>>>()?;
            business_tools.insert(pack_id, tools);
        }

        let category_rows = sqlx::query("SELECT id, account_id, name, risk_level FROM tool_categories WHERE account_id = ?")
            .bind(&account_str)
            .fetch_all(pool)
            .await?;
        let tool_categories = category_rows.iter().map(row_to_category).collect::<AppResult<Vec<_>>>()?;

        let mapping_rows = sqlx::query(
            "SELECT id, account_id, pattern, category_id FROM tool_category_mappings WHERE account_id = ?",
        )
        .bind(&account_str)
        .fetch_all(pool)
        .await?;
        let tool_category_mappings = mapping_rows.iter().map(row_to_mapping).collect::<AppResult<Vec<_>>>()?;

        Ok(CatalogSnapshot {
            systems,
            interfaces,
            resources,
            actions,
            projects,
            project_integrations,
            capability_packs,
            business_tools,
            tool_categories,
            tool_category_mappings,
        })
    }

    async fn load_interface(&self, system_id: Uuid) -> AppResult<Option<Interface>> {
        let row = sqlx::query("SELECT id, system_id, auth_json, created_at FROM interfaces WHERE system_id = ?")
            .bind(system_id.to_string())
            .fetch_optional(self.db.raw())
            .await?;
        row.as_ref().map(row_to_interface).transpose()
    }
}

fn uuid_col(row: &sqlx::sqlite::SqliteRow, name: &str) -> AppResult<Uuid> {
    let raw: String = row.try_get(name)?;
    Uuid::parse_str(&raw).map_err(|e| AppError::database(format!("bad uuid in {name}: {e}")))
}

fn timestamp_col(
    row: &sqlx::sqlite::SqliteRow,
    name: &str,
) -> AppResult<chrono::DateTime<chrono::Utc>> {
    let raw: String = row.try_get(name)?;
    chrono::DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .map_err(|e| AppError::database(format!("bad timestamp in {name}: {e}")))
}

fn json_col(row: &sqlx::sqlite::SqliteRow, name: &str) -> AppResult<Value> {
    let raw: String = row.try_get(name)?;
    serde_json::from_str(&raw).map_err(|e| AppError::database(format!("bad json in {name}: {e}")))
}

fn optional_json_col<T: serde::de::DeserializeOwned>(
    row: &sqlx::sqlite::SqliteRow,
    name: &str,
) -> AppResult<Option<T>> {
    let raw: Option<String> = row.try_get(name)?;
    raw.map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(|e| AppError::database(format!("bad json in {name}: {e}")))
}

fn row_to_system(row: &sqlx::sqlite::SqliteRow) -> AppResult<System> {
    Ok(System {
        id: uuid_col(row, "id")?,
        account_id: uuid_col(row, "account_id")?,
        name: row.try_get("name")?,
        alias: row.try_get("alias")?,
        base_url: row.try_get("base_url")?,
        created_at: timestamp_col(row, "created_at")?,
    })
}

fn row_to_interface(row: &sqlx::sqlite::SqliteRow) -> AppResult<Interface> {
    let auth: InterfaceAuth = serde_json::from_value(json_col(row, "auth_json")?)
        .map_err(|e| AppError::database(format!("bad auth_json: {e}")))?;
    Ok(Interface {
        id: uuid_col(row, "id")?,
        system_id: uuid_col(row, "system_id")?,
        auth,
        created_at: timestamp_col(row, "created_at")?,
    })
}

fn row_to_resource(row: &sqlx::sqlite::SqliteRow) -> AppResult<Resource> {
    Ok(Resource {
        id: uuid_col(row, "id")?,
        system_id: uuid_col(row, "system_id")?,
        name: row.try_get("name")?,
        alias: row.try_get("alias")?,
        created_at: timestamp_col(row, "created_at")?,
    })
}

fn row_to_action(row: &sqlx::sqlite::SqliteRow) -> AppResult<Action> {
    let method_str: String = row.try_get("method")?;
    let headers: HashMap<String, String> = optional_json_col(row, "headers_json")?.unwrap_or_default();
    let pagination: Option<PaginationSpec> = optional_json_col(row, "pagination_json")?;

    Ok(Action {
        id: uuid_col(row, "id")?,
        resource_id: uuid_col(row, "resource_id")?,
        name: row.try_get("name")?,
        alias: row.try_get("alias")?,
        method: HttpMethod::parse_or_get(&method_str),
        path: row.try_get("path")?,
        headers,
        parameters_schema: json_col(row, "parameters_schema_json")?,
        output_schema: optional_json_col(row, "output_schema_json")?,
        pagination,
        examples: optional_json_col(row, "examples_json")?,
        is_mcp_enabled: row.try_get::<i64, _>("is_mcp_enabled")? != 0,
    })
}

fn row_to_project(row: &sqlx::sqlite::SqliteRow) -> AppResult<Project> {
    let external_mappings: HashMap<String, String> =
        optional_json_col(row, "external_mappings_json")?.unwrap_or_default();
    Ok(Project {
        id: uuid_col(row, "id")?,
        account_id: uuid_col(row, "account_id")?,
        slug: row.try_get("slug")?,
        name: row.try_get("name")?,
        external_mappings,
        allowed_categories: optional_json_col(row, "allowed_categories_json")?,
        created_at: timestamp_col(row, "created_at")?,
    })
}

fn row_to_integration(row: &sqlx::sqlite::SqliteRow) -> AppResult<ProjectIntegration> {
    let source_str: String = row.try_get("credential_source")?;
    let credential_source = match source_str.as_str() {
        "project" => crate::db::models::CredentialSource::Project,
        _ => crate::db::models::CredentialSource::Account,
    };
    Ok(ProjectIntegration {
        id: uuid_col(row, "id")?,
        project_id: uuid_col(row, "project_id")?,
        system_id: uuid_col(row, "system_id")?,
        credential_source,
    })
}

fn row_to_pack(row: &sqlx::sqlite::SqliteRow) -> AppResult<CapabilityPack> {
    Ok(CapabilityPack {
        id: uuid_col(row, "id")?,
        account_id: uuid_col(row, "account_id")?,
        name: row.try_get("name")?,
        alias: row.try_get("alias")?,
    })
}

fn row_to_business_tool(row: &sqlx::sqlite::SqliteRow) -> AppResult<BusinessTool> {
    Ok(BusinessTool {
        id: uuid_col(row, "id")?,
        pack_id: uuid_col(row, "pack_id")?,
        tool_name: row.try_get("tool_name")?,
        action_id: uuid_col(row, "action_id")?,
        description: row.try_get("description")?,
        default_parameters: json_col(row, "default_parameters_json")?,
        input_field_mapping: optional_json_col(row, "input_field_mapping_json")?.unwrap_or_default(),
        output_field_mapping: optional_json_col(row, "output_field_mapping_json")?.unwrap_or_default(),
        is_mcp_enabled: row.try_get::<i64, _>("is_mcp_enabled")? != 0,
    })
}

fn row_to_category(row: &sqlx::sqlite::SqliteRow) -> AppResult<ToolCategory> {
    let risk_str: String = row.try_get("risk_level")?;
    let risk_level = match risk_str.as_str() {
        "medium" => RiskLevel::Medium,
        "high" => RiskLevel::High,
        _ => RiskLevel::Low,
    };
    Ok(ToolCategory {
        id: uuid_col(row, "id")?,
        account_id: uuid_col(row, "account_id")?,
        name: row.try_get("name")?,
        risk_level,
    })
}

fn row_to_mapping(row: &sqlx::sqlite::SqliteRow) -> AppResult<ToolCategoryMapping> {
    Ok(ToolCategoryMapping {
        id: uuid_col(row, "id")?,
        account_id: uuid_col(row, "account_id")?,
        pattern: row.try_get("pattern")?,
        category_id: uuid_col(row, "category_id")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_resources_for_system_filters_correctly() {
        let mut snapshot = CatalogSnapshot::default();
        let system_a = Uuid::new_v4();
        let system_b = Uuid::new_v4();
        let resource = Resource {
            id: Uuid::new_v4(),
            system_id: system_a,
            name: "issues".into(),
            alias: "issues".into(),
            created_at: chrono::Utc::now(),
        };
        snapshot.resources.insert(resource.id, resource);

        assert_eq!(snapshot.resources_for_system(system_a).len(), 1);
        assert_eq!(snapshot.resources_for_system(system_b).len(), 0);
    }
}
