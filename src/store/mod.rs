//! User store collaborator
//!
//! The core reads and writes flat [`UserRecord`]s through [`UserStore`]. Writes
//! are compare-and-swap on `version`, so a read-modify-write that races with
//! another writer is detected instead of silently overwriting it.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::AuthzResult;
use crate::models::user::UserRecord;

mod memory;
mod row_parsers;
mod sqlite;

pub use memory::InMemoryUserStore;
pub use sqlite::SqliteUserStore;

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get(&self, id: Uuid) -> AuthzResult<Option<UserRecord>>;

    async fn find_by_username(&self, username: &str) -> AuthzResult<Option<UserRecord>>;

    async fn list(&self) -> AuthzResult<Vec<UserRecord>>;

    /// Fails with `Conflict` when the id or username is taken.
    async fn insert(&self, record: &UserRecord) -> AuthzResult<()>;

    /// Insert only into an empty store, atomically with the emptiness check.
    /// Returns `false` and writes nothing when any user already exists.
    async fn insert_if_empty(&self, record: &UserRecord) -> AuthzResult<bool>;

    /// Replace the stored record only if its version is still `expected_version`.
    /// Returns `false` when another writer got there first. Callers bump
    /// `record.version` themselves.
    async fn update(&self, record: &UserRecord, expected_version: i64) -> AuthzResult<bool>;
}

#[async_trait]
impl<S: UserStore + ?Sized> UserStore for Arc<S> {
    async fn get(&self, id: Uuid) -> AuthzResult<Option<UserRecord>> {
        (**self).get(id).await
    }

    async fn find_by_username(&self, username: &str) -> AuthzResult<Option<UserRecord>> {
        (**self).find_by_username(username).await
    }

    async fn list(&self) -> AuthzResult<Vec<UserRecord>> {
        (**self).list().await
    }

    async fn insert(&self, record: &UserRecord) -> AuthzResult<()> {
        (**self).insert(record).await
    }

    async fn insert_if_empty(&self, record: &UserRecord) -> AuthzResult<bool> {
        (**self).insert_if_empty(record).await
    }

    async fn update(&self, record: &UserRecord, expected_version: i64) -> AuthzResult<bool> {
        (**self).update(record, expected_version).await
    }
}
