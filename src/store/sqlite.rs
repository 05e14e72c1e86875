use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Sqlite, SqlitePool};
use uuid::Uuid;

use super::row_parsers::{encode_permissions, user_record_from_row};
use super::UserStore;
use crate::errors::AuthzResult;
use crate::models::user::UserRecord;

const USER_COLUMNS: &str = "id, username, position, unit, role_id, custom_permissions, created_by, version, created_at, updated_at, deactivated_at";

/// Binds every column of `record` in `USER_COLUMNS` order.
fn bind_record<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    record: &'q UserRecord,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    query
        .bind(record.id.to_string())
        .bind(&record.username)
        .bind(&record.position)
        .bind(&record.unit)
        .bind(&record.role_id)
        .bind(encode_permissions(&record.custom_permissions))
        .bind(record.created_by.map(|id| id.to_string()))
        .bind(record.version)
        .bind(record.created_at.to_rfc3339())
        .bind(record.updated_at.to_rfc3339())
        .bind(record.deactivated_at.map(|at| at.to_rfc3339()))
}

#[derive(Debug, Clone)]
pub struct SqliteUserStore {
    pool: SqlitePool,
}

impl SqliteUserStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> AuthzResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .min_connections(1)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> AuthzResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl UserStore for SqliteUserStore {
    async fn get(&self, id: Uuid) -> AuthzResult<Option<UserRecord>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(user_record_from_row).transpose()
    }

    async fn find_by_username(&self, username: &str) -> AuthzResult<Option<UserRecord>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?"))
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(user_record_from_row).transpose()
    }

    async fn list(&self) -> AuthzResult<Vec<UserRecord>> {
        let rows = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY username"))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(user_record_from_row).collect()
    }

    async fn insert(&self, record: &UserRecord) -> AuthzResult<()> {
        let sql = format!("INSERT INTO users ({USER_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)");
        bind_record(sqlx::query(&sql), record).execute(&self.pool).await?;
        Ok(())
    }

    async fn insert_if_empty(&self, record: &UserRecord) -> AuthzResult<bool> {
        // single statement, so the emptiness check and the write cannot interleave
        let sql = format!(
            "INSERT INTO users ({USER_COLUMNS}) \
             SELECT ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ? \
             WHERE NOT EXISTS (SELECT 1 FROM users)"
        );
        let result = bind_record(sqlx::query(&sql), record).execute(&self.pool).await?;
        Ok(result.rows_affected() == 1)
    }

    async fn update(&self, record: &UserRecord, expected_version: i64) -> AuthzResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE users
               SET username = ?, position = ?, unit = ?, role_id = ?, custom_permissions = ?,
                   created_by = ?, version = ?, updated_at = ?, deactivated_at = ?
             WHERE id = ? AND version = ?
            "#,
        )
        .bind(&record.username)
        .bind(&record.position)
        .bind(&record.unit)
        .bind(&record.role_id)
        .bind(encode_permissions(&record.custom_permissions))
        .bind(record.created_by.map(|id| id.to_string()))
        .bind(record.version)
        .bind(record.updated_at.to_rfc3339())
        .bind(record.deactivated_at.map(|at| at.to_rfc3339()))
        .bind(record.id.to_string())
        .bind(expected_version)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }

        // Distinguish a lost race from a user that does not exist at all.
        match self.get(record.id).await? {
            Some(_) => Ok(false),
            None => Err(crate::errors::AuthzError::UnknownUser(record.id)),
        }
    }
}
