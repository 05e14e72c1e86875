use uuid::Uuid;

use crate::authz::Permission;

pub type AuthzResult<T> = Result<T, AuthzError>;

#[derive(thiserror::Error, Debug)]
pub enum AuthzError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("cannot revoke {permission}: it is part of role {role_id}")]
    CannotRevokeBasePermission { permission: Permission, role_id: String },
    #[error("duplicate role: {0}")]
    DuplicateRole(String),
    #[error("unknown role: {0}")]
    UnknownRole(String),
    #[error("unknown permission: {0}")]
    UnknownPermission(String),
    #[error("unknown user: {0}")]
    UnknownUser(Uuid),
    #[error("user {0} is deactivated")]
    UserDeactivated(Uuid),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("user {0} was modified concurrently")]
    VersionConflict(Uuid),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
    #[error("corrupt stored record: {0}")]
    CorruptRecord(String),
}

impl AuthzError {
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn unknown_role(role_id: impl Into<String>) -> Self {
        Self::UnknownRole(role_id.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    pub fn storage_unavailable(message: impl Into<String>) -> Self {
        Self::StorageUnavailable(message.into())
    }

    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::CorruptRecord(message.into())
    }

    /// Short machine-readable code, for callers that map errors onto a wire format.
    pub fn code(&self) -> &'static str {
        match self {
            AuthzError::Unauthorized(_) => "unauthorized",
            AuthzError::CannotRevokeBasePermission { .. } => "cannot_revoke_base_permission",
            AuthzError::DuplicateRole(_) => "duplicate_role",
            AuthzError::UnknownRole(_) => "unknown_role",
            AuthzError::UnknownPermission(_) => "unknown_permission",
            AuthzError::UnknownUser(_) => "unknown_user",
            AuthzError::UserDeactivated(_) => "user_deactivated",
            AuthzError::Conflict(_) => "conflict",
            AuthzError::VersionConflict(_) => "version_conflict",
            AuthzError::InvalidConfig(_) => "invalid_config",
            AuthzError::StorageUnavailable(_) => "storage_unavailable",
            AuthzError::CorruptRecord(_) => "corrupt_record",
        }
    }

    /// Whether retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AuthzError::StorageUnavailable(_) | AuthzError::VersionConflict(_)
        )
    }
}

impl From<sqlx::Error> for AuthzError {
    fn from(value: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &value {
            if db_err.is_unique_violation() {
                return Self::Conflict(db_err.message().to_string());
            }
        }
        Self::StorageUnavailable(value.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for AuthzError {
    fn from(value: sqlx::migrate::MigrateError) -> Self {
        Self::StorageUnavailable(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_distinct() {
        let errors = vec![
            AuthzError::unauthorized("no"),
            AuthzError::CannotRevokeBasePermission {
                permission: Permission::UploadData,
                role_id: "staff".to_string(),
            },
            AuthzError::DuplicateRole("staff".to_string()),
            AuthzError::unknown_role("ghost"),
            AuthzError::UnknownPermission("fly".to_string()),
            AuthzError::UnknownUser(Uuid::nil()),
            AuthzError::UserDeactivated(Uuid::nil()),
            AuthzError::conflict("taken"),
            AuthzError::VersionConflict(Uuid::nil()),
            AuthzError::invalid_config("bad"),
            AuthzError::storage_unavailable("down"),
            AuthzError::corrupt("bad row"),
        ];

        let codes: std::collections::HashSet<_> = errors.iter().map(|e| e.code()).collect();
        assert_eq!(codes.len(), errors.len());
        for error in &errors {
            assert!(!error.to_string().is_empty());
        }
    }

    #[test]
    fn only_storage_and_version_errors_are_transient() {
        assert!(AuthzError::storage_unavailable("down").is_transient());
        assert!(AuthzError::VersionConflict(Uuid::nil()).is_transient());
        assert!(!AuthzError::unauthorized("no").is_transient());
    }

    #[test]
    fn base_permission_message_names_role() {
        let err = AuthzError::CannotRevokeBasePermission {
            permission: Permission::ManageEvents,
            role_id: "staff".to_string(),
        };
        assert_eq!(err.to_string(), "cannot revoke manage_events: it is part of role staff");
    }
}
