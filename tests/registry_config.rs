use std::io::Write;

use recruit_authz::config::AuthzConfig;
use recruit_authz::{AccessTier, AuthzError, Permission, RoleRegistry};

const ROLES_JSON: &str = r#"{
    "roles": [
        {"id": "brigade_admin", "name": "Brigade Admin", "tier": "tier-3-admin",
         "description": "Administers a brigade",
         "permissions": ["manage_users", "assign_roles", "view_all_dashboards", "approve_budget"]},
        {"id": "recruiter", "name": "Recruiter", "tier": "tier-0-readonly",
         "permissions": ["view_own_company_only"]}
    ],
    "delegation_policy": {
        "system_admin": "tier-4-global",
        "manage_integrations": "tier-4-global",
        "approve_budget": "tier-4-global"
    }
}"#;

#[test]
fn registry_loads_from_configured_path() -> anyhow::Result<()> {
    let mut file = tempfile::NamedTempFile::new()?;
    file.write_all(ROLES_JSON.as_bytes())?;

    let path = file.path().to_string_lossy().to_string();
    let config = AuthzConfig::from_lookup(|key| (key == "AUTHZ_ROLES_PATH").then(|| path.clone()))?;
    let registry = config.load_registry()?;

    assert_eq!(registry.len(), 2);
    let admin = registry.require("brigade_admin")?;
    assert_eq!(admin.tier(), AccessTier::Admin);
    assert_eq!(admin.description(), "Administers a brigade");
    assert!(registry.lookup("staff").is_none());
    assert!(registry.delegation_policy().is_reserved(Permission::ApproveBudget));
    Ok(())
}

#[test]
fn unknown_tier_is_a_config_error() {
    let json = r#"{"roles": [{"id": "x", "name": "X", "tier": "tier-9-cosmic"}]}"#;
    assert!(matches!(RoleRegistry::from_json(json), Err(AuthzError::InvalidConfig(_))));
}

#[test]
fn unknown_fields_are_rejected() {
    let json = r#"{"roles": [{"id": "x", "name": "X", "tier": "tier-1-user", "perms": []}]}"#;
    assert!(matches!(RoleRegistry::from_json(json), Err(AuthzError::InvalidConfig(_))));
}

#[test]
fn empty_registry_is_rejected() {
    assert!(matches!(RoleRegistry::from_json(r#"{"roles": []}"#), Err(AuthzError::InvalidConfig(_))));
}
