use std::path::PathBuf;

use crate::errors::{AuthzError, AuthzResult};
use crate::registry::RoleRegistry;

const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Startup configuration, read once per process.
#[derive(Debug, Clone)]
pub struct AuthzConfig {
    pub database_url: Option<String>,
    /// JSON registry file; the builtin registry is used when unset.
    pub roles_path: Option<PathBuf>,
    pub max_connections: u32,
}

impl AuthzConfig {
    pub fn from_env() -> AuthzResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AuthzResult<Self> {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let max_connections = non_empty("AUTHZ_DB_MAX_CONNECTIONS")
            .map(|val| val.parse::<u32>())
            .unwrap_or(Ok(DEFAULT_MAX_CONNECTIONS))
            .map_err(|_| AuthzError::invalid_config("AUTHZ_DB_MAX_CONNECTIONS must be a positive integer"))?;
        if max_connections == 0 {
            return Err(AuthzError::invalid_config("AUTHZ_DB_MAX_CONNECTIONS must be a positive integer"));
        }

        Ok(Self {
            database_url: non_empty("DATABASE_URL"),
            roles_path: non_empty("AUTHZ_ROLES_PATH").map(PathBuf::from),
            max_connections,
        })
    }

    pub fn database_url(&self) -> AuthzResult<&str> {
        self.database_url
            .as_deref()
            .ok_or_else(|| AuthzError::invalid_config("DATABASE_URL not set"))
    }

    pub fn load_registry(&self) -> AuthzResult<RoleRegistry> {
        match &self.roles_path {
            Some(path) => RoleRegistry::load(path),
            None => {
                let registry = RoleRegistry::builtin();
                tracing::info!(fingerprint = %registry.fingerprint(), "using builtin role registry");
                Ok(registry)
            }
        }
    }
}

/// Load `.env` from the working directory, falling back to the crate directory.
pub fn load_env() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    let crate_env = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
    let _ = dotenvy::from_path(crate_env);
}
