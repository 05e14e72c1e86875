use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::UserStore;
use crate::errors::{AuthzError, AuthzResult};
use crate::models::user::UserRecord;

/// Process-local store. `set_available(false)` makes every call fail with
/// `StorageUnavailable`, which is how outages are exercised in tests.
#[derive(Debug)]
pub struct InMemoryUserStore {
    users: RwLock<HashMap<Uuid, UserRecord>>,
    available: AtomicBool,
}

impl Default for InMemoryUserStore {
    fn default() -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn ensure_available(&self) -> AuthzResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(AuthzError::storage_unavailable("in-memory store switched off"))
        }
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn get(&self, id: Uuid) -> AuthzResult<Option<UserRecord>> {
        self.ensure_available()?;
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> AuthzResult<Option<UserRecord>> {
        self.ensure_available()?;
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn list(&self) -> AuthzResult<Vec<UserRecord>> {
        self.ensure_available()?;
        let mut users: Vec<_> = self.users.read().await.values().cloned().collect();
        users.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(users)
    }

    async fn insert(&self, record: &UserRecord) -> AuthzResult<()> {
        self.ensure_available()?;
        let mut users = self.users.write().await;
        if users.contains_key(&record.id) {
            return Err(AuthzError::conflict(format!("user {} already exists", record.id)));
        }
        if users.values().any(|u| u.username == record.username) {
            return Err(AuthzError::conflict(format!("username {} is taken", record.username)));
        }
        users.insert(record.id, record.clone());
        Ok(())
    }

    async fn insert_if_empty(&self, record: &UserRecord) -> AuthzResult<bool> {
        self.ensure_available()?;
        let mut users = self.users.write().await;
        if !users.is_empty() {
            return Ok(false);
        }
        users.insert(record.id, record.clone());
        Ok(true)
    }

    async fn update(&self, record: &UserRecord, expected_version: i64) -> AuthzResult<bool> {
        self.ensure_available()?;
        let mut users = self.users.write().await;
        match users.get_mut(&record.id) {
            Some(current) if current.version == expected_version => {
                *current = record.clone();
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(AuthzError::UnknownUser(record.id)),
        }
    }
}
