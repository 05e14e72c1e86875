pub mod authz;
pub mod config;
pub mod errors;
pub mod events;
pub mod models;
pub mod registry;
pub mod service;
pub mod store;

// Re-export commonly used items for tests and embedding services
pub use authz::{AccessTier, Permission, PolicyEngine, PolicyEvaluator, Scope};
pub use errors::{AuthzError, AuthzResult};
pub use models::{NewUser, User};
pub use registry::RoleRegistry;
pub use service::AccessControl;
