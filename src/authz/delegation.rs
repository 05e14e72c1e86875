use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::evaluator::PolicyEvaluator;
use super::permission::Permission;
use super::tier::AccessTier;
use crate::errors::{AuthzError, AuthzResult};
use crate::models::user::User;

/// Permissions only tier-4 may ever delegate, whatever the table says.
pub const PLATFORM_RESERVED: [Permission; 2] = [Permission::SystemAdmin, Permission::ManageIntegrations];

/// Minimum tier required to delegate each permission.
///
/// Permissions missing from the table need only the base tier. Entries can
/// raise the bar for a permission, never lower it below the base, and
/// [`PLATFORM_RESERVED`] permissions never drop below tier-4.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelegationPolicy {
    base: AccessTier,
    minimums: BTreeMap<Permission, AccessTier>,
}

impl DelegationPolicy {
    /// Base tier only, no table entries. Platform-reserved floors still apply.
    pub fn empty() -> Self {
        Self {
            base: AccessTier::Admin,
            minimums: BTreeMap::new(),
        }
    }

    pub fn with_minimum(mut self, permission: Permission, tier: AccessTier) -> Self {
        self.minimums.insert(permission, tier);
        self
    }

    pub fn base_tier(&self) -> AccessTier {
        self.base
    }

    pub fn minimum_for(&self, permission: Permission) -> AccessTier {
        let floor = if PLATFORM_RESERVED.contains(&permission) {
            AccessTier::Global
        } else {
            self.base
        };

        self.minimums
            .get(&permission)
            .copied()
            .unwrap_or(floor)
            .max(floor)
    }

    /// Permissions that need more than the base tier.
    pub fn is_reserved(&self, permission: Permission) -> bool {
        self.minimum_for(permission) > self.base
    }

    pub fn entries(&self) -> impl Iterator<Item = (Permission, AccessTier)> + '_ {
        self.minimums.iter().map(|(p, t)| (*p, *t))
    }
}

impl Default for DelegationPolicy {
    fn default() -> Self {
        Self::empty()
            .with_minimum(Permission::SystemAdmin, AccessTier::Global)
            .with_minimum(Permission::ManageIntegrations, AccessTier::Global)
    }
}

/// Audit payload for one grant or revocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegationEvent {
    pub actor: Uuid,
    pub target: Uuid,
    pub permission: Permission,
    pub grant: bool,
    /// `false` when the call was a no-op (already granted / not present).
    pub changed: bool,
    pub occurred_at: DateTime<Utc>,
}

impl DelegationEvent {
    pub fn event_name(&self) -> &'static str {
        if self.grant {
            "permission.granted"
        } else {
            "permission.revoked"
        }
    }
}

/// Grant (`grant = true`) or revoke a delegated permission on `target`.
///
/// Revocation only touches `custom_permissions`. A permission that the target
/// has through its role baseline (and not also as a custom grant) is rejected
/// with [`AuthzError::CannotRevokeBasePermission`]. On any error `target` is
/// left untouched.
pub fn delegate(
    evaluator: &dyn PolicyEvaluator,
    delegator: &User,
    target: &mut User,
    permission: Permission,
    grant: bool,
    at: DateTime<Utc>,
) -> AuthzResult<DelegationEvent> {
    if !delegator.is_active() || !evaluator.can_delegate(delegator, permission) {
        tracing::warn!(
            actor_id = %delegator.id,
            target_id = %target.id,
            permission = %permission,
            grant,
            "delegation refused"
        );
        return Err(AuthzError::unauthorized(format!(
            "{} may not delegate {permission}",
            delegator.username
        )));
    }

    if !target.is_active() {
        return Err(AuthzError::UserDeactivated(target.id));
    }

    let changed = if grant {
        let inserted = target.insert_custom(permission);
        if inserted {
            target.created_by = Some(delegator.id);
        }
        inserted
    } else {
        if target.role().grants(permission) && !target.custom_permissions().contains(&permission) {
            return Err(AuthzError::CannotRevokeBasePermission {
                permission,
                role_id: target.role().id().to_string(),
            });
        }
        target.remove_custom(permission)
    };

    if changed {
        target.updated_at = at;
    }

    Ok(DelegationEvent {
        actor: delegator.id,
        target: target.id,
        permission,
        grant,
        changed,
        occurred_at: at,
    })
}
