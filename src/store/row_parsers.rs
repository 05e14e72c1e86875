use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use crate::authz::Permission;
use crate::errors::{AuthzError, AuthzResult};
use crate::models::user::UserRecord;

pub(crate) fn parse_datetime(s: &str) -> AuthzResult<DateTime<Utc>> {
    let s = s.trim();

    // RFC3339 is what we write
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    // SQLite CURRENT_TIMESTAMP format, for rows written by hand
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return Ok(Utc.from_utc_datetime(&naive));
    }

    if let Ok(naive_date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        let ndt = naive_date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| AuthzError::corrupt("invalid datetime: date out of range"))?;
        return Ok(Utc.from_utc_datetime(&ndt));
    }

    Err(AuthzError::corrupt(format!("invalid datetime: {}", s)))
}

fn parse_opt_datetime(s: Option<String>) -> AuthzResult<Option<DateTime<Utc>>> {
    match s {
        Some(s) if !s.trim().is_empty() => Ok(Some(parse_datetime(&s)?)),
        _ => Ok(None),
    }
}

fn parse_uuid(s: &str) -> AuthzResult<Uuid> {
    Uuid::parse_str(s.trim()).map_err(|e| AuthzError::corrupt(format!("invalid uuid {}: {}", s, e)))
}

/// Stored as a JSON array of catalog names; unknown names are rejected.
pub(crate) fn parse_permissions(json: &str) -> AuthzResult<BTreeSet<Permission>> {
    let names: Vec<String> = serde_json::from_str(json)
        .map_err(|e| AuthzError::corrupt(format!("invalid custom_permissions: {}", e)))?;
    names.iter().map(|name| name.parse()).collect()
}

pub(crate) fn encode_permissions(perms: &BTreeSet<Permission>) -> String {
    let names: Vec<&str> = perms.iter().map(|p| p.as_str()).collect();
    serde_json::to_string(&names).unwrap_or_else(|_| "[]".to_string())
}

fn column<'r, T>(row: &'r SqliteRow, name: &str) -> AuthzResult<T>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(name)
        .map_err(|e| AuthzError::corrupt(format!("missing {}: {}", name, e)))
}

pub(crate) fn user_record_from_row(row: &SqliteRow) -> AuthzResult<UserRecord> {
    let id_s: String = column(row, "id")?;
    let created_by_s: Option<String> = column(row, "created_by")?;
    let perms_s: String = column(row, "custom_permissions")?;
    let created_at_s: String = column(row, "created_at")?;
    let updated_at_s: String = column(row, "updated_at")?;
    let deactivated_at_s: Option<String> = column(row, "deactivated_at")?;

    Ok(UserRecord {
        id: parse_uuid(&id_s)?,
        username: column(row, "username")?,
        position: column(row, "position")?,
        unit: column(row, "unit")?,
        role_id: column(row, "role_id")?,
        custom_permissions: parse_permissions(&perms_s)?,
        created_by: created_by_s.as_deref().map(parse_uuid).transpose()?,
        version: column(row, "version")?,
        created_at: parse_datetime(&created_at_s)?,
        updated_at: parse_datetime(&updated_at_s)?,
        deactivated_at: parse_opt_datetime(deactivated_at_s)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn datetime_formats() {
        assert!(parse_datetime("2026-10-18T09:30:00Z").is_ok());
        assert!(parse_datetime("2026-10-18 09:30:00").is_ok());
        assert!(parse_datetime("2026-10-18").is_ok());
        assert!(matches!(parse_datetime("yesterday"), Err(AuthzError::CorruptRecord(_))));
        assert_eq!(parse_opt_datetime(Some("  ".to_string())).unwrap(), None);
    }

    #[test]
    fn permissions_column_is_validated() {
        let perms = parse_permissions(r#"["manage_twg","upload_data"]"#).unwrap();
        assert_eq!(encode_permissions(&perms), r#"["upload_data","manage_twg"]"#);

        assert!(matches!(parse_permissions(r#"["fly"]"#), Err(AuthzError::UnknownPermission(_))));
        assert!(matches!(parse_permissions("not json"), Err(AuthzError::CorruptRecord(_))));
    }
}
