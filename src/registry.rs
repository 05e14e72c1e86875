//! Role Template Registry
//!
//! Holds the fixed catalog of role templates loaded once at startup. Entries
//! are handed out as `Arc<RoleTemplate>` so users share, rather than own,
//! their role.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::authz::{AccessTier, DelegationPolicy, Permission};
use crate::errors::{AuthzError, AuthzResult};
use crate::models::role::{RoleDefinition, RoleTemplate};

/// Well-known role ids of the built-in registry
pub mod roles {
    pub const GLOBAL_ADMIN: &str = "global_admin";
    pub const SYSTEM_ADMIN: &str = "system_admin";
    pub const MANAGER_XO: &str = "manager_xo";
    pub const COMPANY_COMMANDER: &str = "company_commander";
    pub const STAFF: &str = "staff";
    pub const STATION_LEADER: &str = "station_leader";
    pub const READONLY_RECRUITER: &str = "readonly_recruiter";
}

#[derive(Debug, Clone, Default)]
pub struct RoleRegistry {
    roles: BTreeMap<String, Arc<RoleTemplate>>,
    delegation_policy: DelegationPolicy,
}

impl RoleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delegation_policy(mut self, policy: DelegationPolicy) -> Self {
        self.delegation_policy = policy;
        self
    }

    /// Add a template. Ids are unique for the lifetime of the registry.
    pub fn register(&mut self, role: RoleTemplate) -> AuthzResult<Arc<RoleTemplate>> {
        if self.roles.contains_key(role.id()) {
            return Err(AuthzError::DuplicateRole(role.id().to_string()));
        }
        let role = Arc::new(role);
        self.roles.insert(role.id().to_string(), Arc::clone(&role));
        Ok(role)
    }

    pub fn lookup(&self, role_id: &str) -> Option<Arc<RoleTemplate>> {
        self.roles.get(role_id).cloned()
    }

    /// Like [`lookup`](Self::lookup), but a missing id is an error.
    pub fn require(&self, role_id: &str) -> AuthzResult<Arc<RoleTemplate>> {
        self.lookup(role_id)
            .ok_or_else(|| AuthzError::unknown_role(role_id))
    }

    pub fn roles(&self) -> impl Iterator<Item = &Arc<RoleTemplate>> {
        self.roles.values()
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    pub fn delegation_policy(&self) -> &DelegationPolicy {
        &self.delegation_policy
    }

    /// The registry every deployment starts from.
    pub fn builtin() -> Self {
        use Permission::*;

        let everything_but_reserved = Permission::ALL
            .iter()
            .copied()
            .filter(|p| !matches!(p, SystemAdmin | ManageIntegrations));

        let templates = [
            RoleTemplate::new(
                roles::GLOBAL_ADMIN,
                "Global Administrator",
                "Owns the platform; unrestricted access across every unit",
                AccessTier::Global,
                Permission::ALL,
            ),
            RoleTemplate::new(
                roles::SYSTEM_ADMIN,
                "System Administrator",
                "Administers a battalion's users and data",
                AccessTier::Admin,
                everything_but_reserved.collect::<Vec<_>>(),
            ),
            RoleTemplate::new(
                roles::MANAGER_XO,
                "Manager / XO",
                "Battalion-level management with budget approval",
                AccessTier::Manager,
                [
                    ViewAllDashboards, ViewAnalytics, ExportData, UploadData, EditData,
                    CreateReports, ManageProjects, ManageEvents, ManageTwg, ApproveBudget,
                ],
            ),
            RoleTemplate::new(
                roles::COMPANY_COMMANDER,
                "Company Commander",
                "Leads one company; sees only its own unit's data",
                AccessTier::Manager,
                [
                    ViewOwnCompanyOnly, ViewAnalytics, ExportData, UploadData, EditData,
                    CreateReports, ManageEvents, ApproveBudget,
                ],
            ),
            RoleTemplate::new(
                roles::STAFF,
                "Staff",
                "Battalion staff section member",
                AccessTier::User,
                [ViewAllDashboards, ViewAnalytics, UploadData, EditData, CreateReports, ManageEvents],
            ),
            RoleTemplate::new(
                roles::STATION_LEADER,
                "Station Leader",
                "Runs a single recruiting station",
                AccessTier::User,
                [ViewOwnCompanyOnly, ViewAnalytics, UploadData, CreateReports],
            ),
            RoleTemplate::new(
                roles::READONLY_RECRUITER,
                "Recruiter (read-only)",
                "Views own unit dashboards",
                AccessTier::ReadOnly,
                [ViewOwnCompanyOnly],
            ),
        ];

        let mut registry = RoleRegistry::new();
        for template in templates {
            let registered = registry.register(template);
            debug_assert!(registered.is_ok(), "builtin role ids are unique");
        }
        registry
    }

    /// Parse a registry from its JSON configuration form.
    pub fn from_json(json: &str) -> AuthzResult<Self> {
        let de = &mut serde_json::Deserializer::from_str(json);
        let config: RegistryConfig = serde_path_to_error::deserialize(de).map_err(|err| {
            let path = err.path().to_string();
            AuthzError::invalid_config(format!("{path}: {}", err.into_inner()))
        })?;

        if config.roles.is_empty() {
            return Err(AuthzError::invalid_config("registry defines no roles"));
        }

        let mut registry = RoleRegistry::new();
        for raw in config.roles {
            let tier: AccessTier = raw.tier.parse().map_err(|_| {
                AuthzError::invalid_config(format!("role {}: unknown access tier {}", raw.id, raw.tier))
            })?;
            let permissions = raw
                .permissions
                .iter()
                .map(|name| name.parse::<Permission>())
                .collect::<AuthzResult<Vec<_>>>()?;
            registry.register(RoleTemplate::new(raw.id, raw.name, raw.description, tier, permissions))?;
        }

        if let Some(table) = config.delegation_policy {
            // entries layer over the defaults, they never replace them
            let mut policy = DelegationPolicy::default();
            for (name, raw_tier) in table {
                let permission: Permission = name.parse().map_err(|_| {
                    AuthzError::invalid_config(format!("delegation_policy.{name}: unknown permission"))
                })?;
                let tier: AccessTier = raw_tier.parse().map_err(|_| {
                    AuthzError::invalid_config(format!("delegation_policy.{name}: unknown access tier {raw_tier}"))
                })?;
                let floor = policy.minimum_for(permission);
                if tier < floor {
                    return Err(AuthzError::invalid_config(format!(
                        "delegation_policy.{name}: {tier} is below the minimum delegation tier {floor}"
                    )));
                }
                policy = policy.with_minimum(permission, tier);
            }
            registry.delegation_policy = policy;
        }

        Ok(registry)
    }

    pub fn load(path: impl AsRef<Path>) -> AuthzResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|err| {
            AuthzError::invalid_config(format!("failed to read {}: {err}", path.display()))
        })?;
        let registry = Self::from_json(&json)?;
        tracing::info!(
            path = %path.display(),
            roles = registry.len(),
            fingerprint = %registry.fingerprint(),
            "role registry loaded"
        );
        Ok(registry)
    }

    /// Canonical configuration form; `from_json(to_json())` yields an equal registry.
    pub fn to_config(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            roles: self.roles.values().map(|r| RoleDefinition::from(r.as_ref())).collect(),
            delegation_policy: self
                .delegation_policy
                .entries()
                .map(|(p, t)| (p.as_str().to_string(), t.as_str().to_string()))
                .collect(),
        }
    }

    /// SHA-256 over the canonical form, hex encoded.
    pub fn fingerprint(&self) -> String {
        let canonical = serde_json::to_vec(&self.to_config()).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(&canonical);
        hex::encode(hasher.finalize())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RegistryConfig {
    roles: Vec<RawRole>,
    #[serde(default)]
    delegation_policy: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRole {
    id: String,
    name: String,
    #[serde(default)]
    description: String,
    tier: String,
    #[serde(default)]
    permissions: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegistrySnapshot {
    pub roles: Vec<RoleDefinition>,
    pub delegation_policy: BTreeMap<String, String>,
}
