//! Mutation surface: delegation and user lifecycle against a [`UserStore`].
//!
//! Each mutation is a read-modify-write. The target is reloaded, the pure
//! rule is applied, and the result is written back with a version check. Lost
//! races are retried a few times and then reported as `VersionConflict`.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::authz::{self, AccessTier, DelegationEvent, Permission, PolicyEngine, PolicyEvaluator};
use crate::errors::{AuthzError, AuthzResult};
use crate::events::{self, EventBus};
use crate::models::user::{NewUser, User, UserRecord};
use crate::registry::RoleRegistry;
use crate::store::UserStore;

const MAX_WRITE_ATTEMPTS: usize = 3;

pub struct AccessControl<S> {
    registry: Arc<RoleRegistry>,
    engine: PolicyEngine,
    store: S,
    event_bus: EventBus,
}

impl<S: UserStore> AccessControl<S> {
    /// The delegation table comes from the registry configuration.
    pub fn new(registry: Arc<RoleRegistry>, store: S, event_bus: EventBus) -> Self {
        let engine = PolicyEngine::new(registry.delegation_policy().clone());
        Self {
            registry,
            engine,
            store,
            event_bus,
        }
    }

    pub fn registry(&self) -> &RoleRegistry {
        &self.registry
    }

    pub fn engine(&self) -> &PolicyEngine {
        &self.engine
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn load_user(&self, id: Uuid) -> AuthzResult<User> {
        let record = self.store.get(id).await?.ok_or(AuthzError::UnknownUser(id))?;
        User::from_record(record, &self.registry)
    }

    pub async fn find_user(&self, username: &str) -> AuthzResult<Option<User>> {
        self.store
            .find_by_username(username)
            .await?
            .map(|record| User::from_record(record, &self.registry))
            .transpose()
    }

    /// Grant or revoke `permission` on the target, on behalf of `actor`.
    ///
    /// Authority is checked before the store is touched, so an unauthorized
    /// caller never causes a read.
    pub async fn delegate(
        &self,
        actor: &User,
        target_id: Uuid,
        permission: Permission,
        grant: bool,
    ) -> AuthzResult<DelegationEvent> {
        if !actor.is_active() || !self.engine.can_delegate(actor, permission) {
            tracing::warn!(
                actor_id = %actor.id,
                target_id = %target_id,
                permission = %permission,
                grant,
                "delegation refused"
            );
            return Err(AuthzError::unauthorized(format!(
                "{} may not delegate {permission}",
                actor.username
            )));
        }

        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let mut target = self.load_user(target_id).await?;
            let expected = target.version;

            let event = authz::delegate(&self.engine, actor, &mut target, permission, grant, Utc::now())?;
            if !event.changed {
                tracing::debug!(target_id = %target_id, permission = %permission, grant, "delegation was a no-op");
                events::publish(&self.event_bus, events::delegation_event(&event, self.engine.policy()));
                return Ok(event);
            }

            target.version = expected + 1;
            if self.store.update(&target.to_record(), expected).await? {
                tracing::info!(
                    actor_id = %actor.id,
                    target_id = %target_id,
                    permission = %permission,
                    grant,
                    "delegation applied"
                );
                events::publish(&self.event_bus, events::delegation_event(&event, self.engine.policy()));
                return Ok(event);
            }

            tracing::debug!(target_id = %target_id, attempt, "version conflict, retrying");
        }

        Err(AuthzError::VersionConflict(target_id))
    }

    /// Create a user. The actor needs `manage_users` and may not hand out a
    /// role above their own tier.
    pub async fn provision_user(&self, actor: &User, new_user: NewUser) -> AuthzResult<User> {
        self.require(actor, Permission::ManageUsers)?;
        let role = self.registry.require(&new_user.role_id)?;
        self.require_tier_for_role(actor, role.tier())?;

        let mut user = User::new(new_user.username, role).with_created_by(actor.id);
        user.position = new_user.position;
        user.unit = new_user.unit;

        self.store.insert(&user.to_record()).await?;
        tracing::info!(actor_id = %actor.id, user_id = %user.id, role = %user.role().id(), "user provisioned");
        events::log_activity(&self.event_bus, "provisioned", Some(actor.id), &user.to_record());
        Ok(user)
    }

    /// Create the very first administrator. Only allowed on an empty store.
    pub async fn bootstrap(&self, username: &str, role_id: &str) -> AuthzResult<User> {
        let role = self.registry.require(role_id)?;
        let user = User::new(username, role);
        if !self.store.insert_if_empty(&user.to_record()).await? {
            return Err(AuthzError::conflict("store already has users; use provision"));
        }
        tracing::info!(user_id = %user.id, role = %role_id, "bootstrap user created");
        events::log_activity(&self.event_bus, "provisioned", None, &user.to_record());
        Ok(user)
    }

    /// Point the target at a different role template.
    ///
    /// Delegated permissions are kept as they are; whether to prune them after
    /// a downgrade is left to the caller.
    pub async fn assign_role(&self, actor: &User, target_id: Uuid, role_id: &str) -> AuthzResult<User> {
        self.require(actor, Permission::AssignRoles)?;
        let role = self.registry.require(role_id)?;
        self.require_tier_for_role(actor, role.tier())?;

        let user = self
            .modify(target_id, |target| {
                if !target.is_active() {
                    return Err(AuthzError::UserDeactivated(target.id));
                }
                target.set_role(Arc::clone(&role));
                Ok(())
            })
            .await?;

        tracing::info!(actor_id = %actor.id, user_id = %target_id, role = %role_id, "role assigned");
        events::log_activity(&self.event_bus, "role_assigned", Some(actor.id), &user.to_record());
        Ok(user)
    }

    /// Soft-delete the target. Deactivating twice is a no-op.
    pub async fn deactivate_user(&self, actor: &User, target_id: Uuid) -> AuthzResult<User> {
        self.require(actor, Permission::ManageUsers)?;

        let current = self.load_user(target_id).await?;
        if !current.is_active() {
            return Ok(current);
        }

        let user = self
            .modify(target_id, |target| {
                target.deactivated_at.get_or_insert_with(Utc::now);
                Ok(())
            })
            .await?;

        tracing::info!(actor_id = %actor.id, user_id = %target_id, "user deactivated");
        events::log_activity(&self.event_bus, "deactivated", Some(actor.id), &user.to_record());
        Ok(user)
    }

    pub async fn list_users(&self) -> AuthzResult<Vec<User>> {
        self.store
            .list()
            .await?
            .into_iter()
            .map(|record: UserRecord| User::from_record(record, &self.registry))
            .collect()
    }

    fn require(&self, actor: &User, permission: Permission) -> AuthzResult<()> {
        if actor.is_active() && self.engine.has_permission(actor, permission) {
            Ok(())
        } else {
            tracing::warn!(actor_id = %actor.id, permission = %permission, "permission denied");
            Err(AuthzError::unauthorized(format!("{} lacks {permission}", actor.username)))
        }
    }

    fn require_tier_for_role(&self, actor: &User, role_tier: AccessTier) -> AuthzResult<()> {
        if self.engine.has_tier_access(actor, role_tier) {
            Ok(())
        } else {
            Err(AuthzError::unauthorized(format!(
                "{} may not hand out a {role_tier} role",
                actor.username
            )))
        }
    }

    async fn modify<F>(&self, target_id: Uuid, mut apply: F) -> AuthzResult<User>
    where
        F: FnMut(&mut User) -> AuthzResult<()>,
    {
        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let mut target = self.load_user(target_id).await?;
            let expected = target.version;
            apply(&mut target)?;
            target.version = expected + 1;
            target.updated_at = Utc::now();

            if self.store.update(&target.to_record(), expected).await? {
                return Ok(target);
            }
            tracing::debug!(target_id = %target_id, attempt, "version conflict, retrying");
        }
        Err(AuthzError::VersionConflict(target_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::init_event_bus;
    use crate::registry::roles;
    use crate::store::InMemoryUserStore;

    async fn setup() -> (AccessControl<Arc<InMemoryUserStore>>, User) {
        let (bus, _rx) = init_event_bus();
        let store = Arc::new(InMemoryUserStore::new());
        let ac = AccessControl::new(Arc::new(RoleRegistry::builtin()), store, bus);
        let root = ac.bootstrap("root", roles::GLOBAL_ADMIN).await.unwrap();
        (ac, root)
    }

    #[tokio::test]
    async fn bootstrap_only_on_empty_store() {
        let (ac, _root) = setup().await;
        let err = ac.bootstrap("again", roles::GLOBAL_ADMIN).await.unwrap_err();
        assert!(matches!(err, AuthzError::Conflict(_)));
    }

    #[tokio::test]
    async fn concurrent_bootstraps_create_one_admin() {
        let (bus, _rx) = init_event_bus();
        let store = Arc::new(InMemoryUserStore::new());
        let ac = AccessControl::new(Arc::new(RoleRegistry::builtin()), Arc::clone(&store), bus);

        let (first, second) = tokio::join!(
            ac.bootstrap("alpha", roles::GLOBAL_ADMIN),
            ac.bootstrap("bravo", roles::GLOBAL_ADMIN)
        );

        assert_eq!(first.is_ok() as u8 + second.is_ok() as u8, 1);
        let loser = if first.is_ok() { second } else { first };
        assert!(matches!(loser, Err(AuthzError::Conflict(_))));
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn provision_requires_manage_users() {
        let (ac, root) = setup().await;
        let staff = ac.provision_user(&root, NewUser::new("staffer", roles::STAFF)).await.unwrap();
        assert_eq!(staff.created_by, Some(root.id));

        let err = ac
            .provision_user(&staff, NewUser::new("other", roles::STAFF))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthzError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn cannot_provision_above_own_tier() {
        let (ac, root) = setup().await;
        let admin = ac.provision_user(&root, NewUser::new("admin", roles::SYSTEM_ADMIN)).await.unwrap();

        let err = ac
            .provision_user(&admin, NewUser::new("usurper", roles::GLOBAL_ADMIN))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthzError::Unauthorized(_)));

        ac.provision_user(&admin, NewUser::new("xo", roles::MANAGER_XO)).await.unwrap();
    }

    #[tokio::test]
    async fn assign_role_keeps_custom_permissions() {
        let (ac, root) = setup().await;
        let staff = ac.provision_user(&root, NewUser::new("staffer", roles::STAFF)).await.unwrap();
        ac.delegate(&root, staff.id, Permission::ManageFusion, true).await.unwrap();

        let demoted = ac.assign_role(&root, staff.id, roles::READONLY_RECRUITER).await.unwrap();
        assert_eq!(demoted.role().id(), roles::READONLY_RECRUITER);
        assert!(demoted.custom_permissions().contains(&Permission::ManageFusion));
        assert_eq!(demoted.version, 2);
    }

    #[tokio::test]
    async fn deactivate_is_idempotent_and_blocks_delegation() {
        let (ac, root) = setup().await;
        let staff = ac.provision_user(&root, NewUser::new("staffer", roles::STAFF)).await.unwrap();

        let first = ac.deactivate_user(&root, staff.id).await.unwrap();
        let second = ac.deactivate_user(&root, staff.id).await.unwrap();
        assert_eq!(first.deactivated_at, second.deactivated_at);
        assert_eq!(second.version, first.version);

        let err = ac.delegate(&root, staff.id, Permission::ManageTwg, true).await.unwrap_err();
        assert!(matches!(err, AuthzError::UserDeactivated(_)));
    }

    #[tokio::test]
    async fn unknown_target_is_reported() {
        let (ac, root) = setup().await;
        let err = ac.delegate(&root, Uuid::new_v4(), Permission::ManageTwg, true).await.unwrap_err();
        assert!(matches!(err, AuthzError::UnknownUser(_)));
    }
}
