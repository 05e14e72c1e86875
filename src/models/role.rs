use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::authz::{AccessTier, Permission};

/// An immutable bundle of baseline permissions for one organizational position.
///
/// Templates are built once while the registry is assembled and then shared
/// behind an `Arc`; there are no mutators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleTemplate {
    id: String,
    name: String,
    description: String,
    tier: AccessTier,
    permissions: BTreeSet<Permission>,
}

impl RoleTemplate {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        tier: AccessTier,
        permissions: impl IntoIterator<Item = Permission>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            tier,
            permissions: permissions.into_iter().collect(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn tier(&self) -> AccessTier {
        self.tier
    }

    /// The role's baseline grant.
    pub fn permissions(&self) -> &BTreeSet<Permission> {
        &self.permissions
    }

    pub fn grants(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }
}

/// Role entry as written in registry configuration files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub tier: AccessTier,
    #[serde(default)]
    pub permissions: Vec<Permission>,
}

impl From<RoleDefinition> for RoleTemplate {
    fn from(def: RoleDefinition) -> Self {
        RoleTemplate::new(def.id, def.name, def.description, def.tier, def.permissions)
    }
}

impl From<&RoleTemplate> for RoleDefinition {
    fn from(role: &RoleTemplate) -> Self {
        RoleDefinition {
            id: role.id.clone(),
            name: role.name.clone(),
            description: role.description.clone(),
            tier: role.tier,
            permissions: role.permissions.iter().copied().collect(),
        }
    }
}
