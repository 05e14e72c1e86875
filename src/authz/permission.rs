use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::AuthzError;

/// A grantable capability. The catalog is closed: every permission the
/// dashboard knows about is a variant here, and parsing anything else fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    ViewAllDashboards,
    ViewOwnCompanyOnly,
    ViewAnalytics,
    ExportData,
    UploadData,
    EditData,
    DeleteData,
    CreateReports,
    ManageProjects,
    ManageEvents,
    ManageTwg,
    ManageFusion,
    ApproveBudget,
    ManageUsers,
    AssignRoles,
    ViewAuditLog,
    /// Reserved for tier-4 delegation.
    ManageIntegrations,
    /// Reserved for tier-4 delegation.
    SystemAdmin,
}

impl Permission {
    /// The full catalog, in declaration order.
    pub const ALL: [Permission; 18] = [
        Permission::ViewAllDashboards,
        Permission::ViewOwnCompanyOnly,
        Permission::ViewAnalytics,
        Permission::ExportData,
        Permission::UploadData,
        Permission::EditData,
        Permission::DeleteData,
        Permission::CreateReports,
        Permission::ManageProjects,
        Permission::ManageEvents,
        Permission::ManageTwg,
        Permission::ManageFusion,
        Permission::ApproveBudget,
        Permission::ManageUsers,
        Permission::AssignRoles,
        Permission::ViewAuditLog,
        Permission::ManageIntegrations,
        Permission::SystemAdmin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::ViewAllDashboards => "view_all_dashboards",
            Permission::ViewOwnCompanyOnly => "view_own_company_only",
            Permission::ViewAnalytics => "view_analytics",
            Permission::ExportData => "export_data",
            Permission::UploadData => "upload_data",
            Permission::EditData => "edit_data",
            Permission::DeleteData => "delete_data",
            Permission::CreateReports => "create_reports",
            Permission::ManageProjects => "manage_projects",
            Permission::ManageEvents => "manage_events",
            Permission::ManageTwg => "manage_twg",
            Permission::ManageFusion => "manage_fusion",
            Permission::ApproveBudget => "approve_budget",
            Permission::ManageUsers => "manage_users",
            Permission::AssignRoles => "assign_roles",
            Permission::ViewAuditLog => "view_audit_log",
            Permission::ManageIntegrations => "manage_integrations",
            Permission::SystemAdmin => "system_admin",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = AuthzError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Permission::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == value)
            .ok_or_else(|| AuthzError::UnknownPermission(value.to_string()))
    }
}
