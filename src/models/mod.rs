pub mod role;
pub mod user;

pub use role::{RoleDefinition, RoleTemplate};
pub use user::{NewUser, User, UserRecord, UserSummary};
