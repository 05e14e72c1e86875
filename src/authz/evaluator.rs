use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::delegation::DelegationPolicy;
use super::permission::Permission;
use super::tier::AccessTier;
use crate::models::user::User;

/// Data-visibility breadth implied by a user's permissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Global,
    OwnUnitOnly,
    /// No dashboard access at all.
    Denied,
}

/// Union of the role baseline and the user's delegated permissions.
/// Tier-4 roles are omnipotent and always get the whole catalog.
pub fn effective_permissions(user: &User) -> BTreeSet<Permission> {
    if is_omnipotent(user) {
        return Permission::ALL.into_iter().collect();
    }

    user.role()
        .permissions()
        .union(user.custom_permissions())
        .copied()
        .collect()
}

/// Membership in [`effective_permissions`], without building the set.
pub fn has_permission(user: &User, permission: Permission) -> bool {
    is_omnipotent(user) || user.role().grants(permission) || user.custom_permissions().contains(&permission)
}

fn is_omnipotent(user: &User) -> bool {
    user.role().tier() == AccessTier::Global
}

pub fn has_tier_access(user: &User, required: AccessTier) -> bool {
    user.role().tier().at_least(required)
}

/// Must be called before querying dashboard data, so the query can be filtered.
pub fn resolve_scope(user: &User) -> Scope {
    if has_permission(user, Permission::ViewAllDashboards) {
        Scope::Global
    } else if has_permission(user, Permission::ViewOwnCompanyOnly) {
        Scope::OwnUnitOnly
    } else {
        Scope::Denied
    }
}

/// Policy evaluator trait for pluggable authorization logic.
///
/// Every method is a pure query: no storage access, no cached decisions.
pub trait PolicyEvaluator: Send + Sync {
    fn can_delegate(&self, delegator: &User, permission: Permission) -> bool;

    fn effective_permissions(&self, user: &User) -> BTreeSet<Permission> {
        effective_permissions(user)
    }

    fn has_permission(&self, user: &User, permission: Permission) -> bool {
        has_permission(user, permission)
    }

    fn has_tier_access(&self, user: &User, required: AccessTier) -> bool {
        has_tier_access(user, required)
    }

    fn resolve_scope(&self, user: &User) -> Scope {
        resolve_scope(user)
    }
}

/// Default policy engine
///
/// Delegation is a short-circuit conjunction:
/// 1. delegator tier >= base delegation tier (tier-3) -> else deny
/// 2. delegator effectively holds the permission -> else deny
/// 3. delegator tier >= the table minimum for that permission -> else deny
#[derive(Debug, Clone, Default)]
pub struct PolicyEngine {
    policy: DelegationPolicy,
}

impl PolicyEngine {
    pub fn new(policy: DelegationPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &DelegationPolicy {
        &self.policy
    }
}

impl PolicyEvaluator for PolicyEngine {
    fn can_delegate(&self, delegator: &User, permission: Permission) -> bool {
        let tier = delegator.role().tier();

        if !tier.at_least(self.policy.base_tier()) {
            tracing::debug!(
                user_id = %delegator.id,
                permission = %permission,
                tier = %tier,
                "delegation denied: tier too low"
            );
            return false;
        }

        if !has_permission(delegator, permission) {
            tracing::debug!(
                user_id = %delegator.id,
                permission = %permission,
                "delegation denied: delegator does not hold permission"
            );
            return false;
        }

        let required = self.policy.minimum_for(permission);
        if !tier.at_least(required) {
            tracing::debug!(
                user_id = %delegator.id,
                permission = %permission,
                required = %required,
                "delegation denied: reserved permission"
            );
            return false;
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{roles, RoleRegistry};

    fn user(role_id: &str) -> User {
        let registry = RoleRegistry::builtin();
        User::new(format!("{role_id}.user"), registry.require(role_id).unwrap())
    }

    #[test]
    fn effective_permissions_cover_role_and_custom() {
        let u = user(roles::STAFF).with_custom_permissions([Permission::ManageTwg]);
        let effective = effective_permissions(&u);

        assert!(effective.is_superset(u.role().permissions()));
        assert!(effective.contains(&Permission::ManageTwg));
        assert!(!effective.contains(&Permission::ManageUsers));
    }

    #[test]
    fn global_tier_gets_full_catalog_regardless_of_bundle() {
        let mut registry = RoleRegistry::new();
        let thin = registry
            .register(crate::models::RoleTemplate::new(
                "thin_global",
                "Thin Global",
                "",
                AccessTier::Global,
                [Permission::ViewAnalytics],
            ))
            .unwrap();
        let u = User::new("root", thin);

        assert_eq!(effective_permissions(&u).len(), Permission::ALL.len());
        assert!(has_permission(&u, Permission::SystemAdmin));
    }

    #[test]
    fn has_permission_agrees_with_effective_set() {
        for role in RoleRegistry::builtin().roles() {
            let u = User::new("member", role.clone()).with_custom_permissions([Permission::ManageFusion]);
            let effective = effective_permissions(&u);
            for permission in Permission::ALL {
                assert_eq!(has_permission(&u, permission), effective.contains(&permission));
            }
        }
    }

    #[test]
    fn tier_access_is_rank_comparison() {
        let manager = user(roles::MANAGER_XO);
        assert!(has_tier_access(&manager, AccessTier::ReadOnly));
        assert!(has_tier_access(&manager, AccessTier::Manager));
        assert!(!has_tier_access(&manager, AccessTier::Admin));
    }

    #[test]
    fn scope_resolution() {
        assert_eq!(resolve_scope(&user(roles::STAFF)), Scope::Global);
        assert_eq!(resolve_scope(&user(roles::READONLY_RECRUITER)), Scope::OwnUnitOnly);
        assert_eq!(resolve_scope(&user(roles::GLOBAL_ADMIN)), Scope::Global);

        let mut registry = RoleRegistry::new();
        let blind = registry
            .register(crate::models::RoleTemplate::new("blind", "Blind", "", AccessTier::User, std::iter::empty::<Permission>()))
            .unwrap();
        assert_eq!(resolve_scope(&User::new("nobody", blind)), Scope::Denied);
    }

    #[test]
    fn global_wins_over_own_unit() {
        let u = user(roles::STATION_LEADER).with_custom_permissions([Permission::ViewAllDashboards]);
        assert_eq!(resolve_scope(&u), Scope::Global);
    }

    #[test]
    fn low_tiers_never_delegate() {
        let engine = PolicyEngine::default();
        for role_id in [roles::READONLY_RECRUITER, roles::STAFF, roles::STATION_LEADER, roles::MANAGER_XO] {
            let u = user(role_id).with_custom_permissions(Permission::ALL);
            for permission in Permission::ALL {
                assert!(!engine.can_delegate(&u, permission), "{role_id} delegated {permission}");
            }
        }
    }

    #[test]
    fn tier_three_cannot_delegate_reserved_even_when_held() {
        let engine = PolicyEngine::default();
        let admin = user(roles::SYSTEM_ADMIN)
            .with_custom_permissions([Permission::SystemAdmin, Permission::ManageIntegrations]);

        assert!(has_permission(&admin, Permission::SystemAdmin));
        assert!(!engine.can_delegate(&admin, Permission::SystemAdmin));
        assert!(!engine.can_delegate(&admin, Permission::ManageIntegrations));
        assert!(engine.can_delegate(&admin, Permission::ManageUsers));
    }

    #[test]
    fn no_escalation_through_delegation() {
        let engine = PolicyEngine::default();
        for role in RoleRegistry::builtin().roles() {
            let u = User::new("member", role.clone());
            for permission in Permission::ALL {
                if engine.can_delegate(&u, permission) {
                    assert!(has_permission(&u, permission));
                }
            }
        }
    }

    #[test]
    fn global_admin_delegates_everything() {
        let engine = PolicyEngine::default();
        let root = user(roles::GLOBAL_ADMIN);
        for permission in Permission::ALL {
            assert!(engine.can_delegate(&root, permission));
        }
    }

    #[test]
    fn policy_table_is_data_driven() {
        let engine = PolicyEngine::new(
            DelegationPolicy::default().with_minimum(Permission::ApproveBudget, AccessTier::Global),
        );
        let admin = user(roles::SYSTEM_ADMIN);
        assert!(!engine.can_delegate(&admin, Permission::ApproveBudget));
        assert!(engine.can_delegate(&admin, Permission::ExportData));
    }
}
