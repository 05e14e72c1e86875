use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::authz::Permission;
use crate::errors::AuthzResult;
use crate::events::Loggable;
use crate::models::role::RoleTemplate;
use crate::registry::RoleRegistry;

/// An authenticated principal as the policy engine sees it.
///
/// The role is shared with every other user holding it. `custom_permissions`
/// only ever adds to the role baseline and changes only through delegation.
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub position: Option<String>,
    pub unit: Option<String>,
    role: Arc<RoleTemplate>,
    custom_permissions: BTreeSet<Permission>,
    pub created_by: Option<Uuid>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deactivated_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn new(username: impl Into<String>, role: Arc<RoleTemplate>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            username: username.into(),
            position: None,
            unit: None,
            role,
            custom_permissions: BTreeSet::new(),
            created_by: None,
            version: 0,
            created_at: now,
            updated_at: now,
            deactivated_at: None,
        }
    }

    pub fn with_position(mut self, position: impl Into<String>) -> Self {
        self.position = Some(position.into());
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// Seed previously delegated permissions, e.g. when rebuilding a user from storage.
    pub fn with_custom_permissions(mut self, perms: impl IntoIterator<Item = Permission>) -> Self {
        self.custom_permissions = perms.into_iter().collect();
        self
    }

    pub fn with_created_by(mut self, admin_id: Uuid) -> Self {
        self.created_by = Some(admin_id);
        self
    }

    pub fn role(&self) -> &RoleTemplate {
        &self.role
    }

    pub fn role_handle(&self) -> Arc<RoleTemplate> {
        Arc::clone(&self.role)
    }

    pub fn custom_permissions(&self) -> &BTreeSet<Permission> {
        &self.custom_permissions
    }

    pub fn is_active(&self) -> bool {
        self.deactivated_at.is_none()
    }

    pub(crate) fn insert_custom(&mut self, permission: Permission) -> bool {
        self.custom_permissions.insert(permission)
    }

    pub(crate) fn remove_custom(&mut self, permission: Permission) -> bool {
        self.custom_permissions.remove(&permission)
    }

    /// Swap the role reference. Delegated permissions are left as they are.
    pub(crate) fn set_role(&mut self, role: Arc<RoleTemplate>) {
        self.role = role;
    }

    /// Rebuild a user from its stored form, resolving the role through the registry.
    pub fn from_record(record: UserRecord, registry: &RoleRegistry) -> AuthzResult<Self> {
        let role = registry.require(&record.role_id)?;
        Ok(Self {
            id: record.id,
            username: record.username,
            position: record.position,
            unit: record.unit,
            role,
            custom_permissions: record.custom_permissions,
            created_by: record.created_by,
            version: record.version,
            created_at: record.created_at,
            updated_at: record.updated_at,
            deactivated_at: record.deactivated_at,
        })
    }

    pub fn to_record(&self) -> UserRecord {
        UserRecord {
            id: self.id,
            username: self.username.clone(),
            position: self.position.clone(),
            unit: self.unit.clone(),
            role_id: self.role.id().to_string(),
            custom_permissions: self.custom_permissions.clone(),
            created_by: self.created_by,
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
            deactivated_at: self.deactivated_at,
        }
    }
}

/// Flat, storable form of a [`User`]: the role is referenced by id only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: Uuid,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    pub role_id: String,
    pub custom_permissions: BTreeSet<Permission>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<Uuid>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deactivated_at: Option<DateTime<Utc>>,
}

impl Loggable for UserRecord {
    fn entity_type() -> &'static str { "user" }
    fn subject_id(&self) -> Uuid { self.id }
}

/// Provisioning request for a new user.
#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub role_id: String,
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
}

impl NewUser {
    pub fn new(username: impl Into<String>, role_id: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            role_id: role_id.into(),
            position: None,
            unit: None,
        }
    }

    pub fn with_position(mut self, position: impl Into<String>) -> Self {
        self.position = Some(position.into());
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }
}

/// Read-only projection of a user for callers that render or log it.
#[derive(Debug, Clone, Serialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub username: String,
    pub role_id: String,
    pub tier: crate::authz::AccessTier,
    pub effective_permissions: BTreeSet<Permission>,
    pub scope: crate::authz::Scope,
    pub active: bool,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        UserSummary {
            id: user.id,
            username: user.username.clone(),
            role_id: user.role().id().to_string(),
            tier: user.role().tier(),
            effective_permissions: crate::authz::effective_permissions(user),
            scope: crate::authz::resolve_scope(user),
            active: user.is_active(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_round_trip_keeps_role_reference() {
        let registry = RoleRegistry::builtin();
        let staff = registry.require("staff").unwrap();
        let user = User::new("sgt.rivera", staff)
            .with_unit("Bravo Company")
            .with_custom_permissions([Permission::ManageTwg]);

        let record = user.to_record();
        assert_eq!(record.role_id, "staff");

        let rebuilt = User::from_record(record, &registry).unwrap();
        assert_eq!(rebuilt.id, user.id);
        assert_eq!(rebuilt.role().id(), "staff");
        assert!(rebuilt.custom_permissions().contains(&Permission::ManageTwg));
    }

    #[test]
    fn record_with_unregistered_role_fails() {
        let registry = RoleRegistry::builtin();
        let mut record = User::new("ghost", registry.require("staff").unwrap()).to_record();
        record.role_id = "astronaut".to_string();

        let err = User::from_record(record, &registry).unwrap_err();
        assert!(matches!(err, crate::errors::AuthzError::UnknownRole(id) if id == "astronaut"));
    }

    #[test]
    fn users_share_role_templates() {
        let registry = RoleRegistry::builtin();
        let a = User::new("a", registry.require("staff").unwrap());
        let b = User::new("b", registry.require("staff").unwrap());
        assert!(Arc::ptr_eq(&a.role_handle(), &b.role_handle()));
    }
}
