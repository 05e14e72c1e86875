use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Severity of an audit event; the audit collaborator keys retention off it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Authority changes: keep indefinitely
    Critical,
    /// Ordinary grants and provisioning (default)
    Important,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Important => "important",
        }
    }
}

impl Default for Severity {
    fn default() -> Self {
        Severity::Important
    }
}

/// Entities whose lifecycle changes are reported as audit events.
pub trait Loggable: Serialize + Send + Sync {
    /// Prefix of event names, e.g. "user" in "user.deactivated"
    fn entity_type() -> &'static str;

    fn subject_id(&self) -> Uuid;

    fn severity(&self) -> Severity {
        Severity::Important
    }

    /// Changes to who holds which authority are always critical.
    fn severity_for_action(&self, action: &str) -> Severity {
        match action {
            "role_assigned" | "deactivated" => Severity::Critical,
            _ => self.severity(),
        }
    }
}
