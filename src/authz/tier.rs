use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::AuthzError;

/// Coarse rank of a role. Ordering follows declaration order, so the derived
/// `Ord` and [`AccessTier::rank`] always agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AccessTier {
    #[serde(rename = "tier-0-readonly")]
    ReadOnly,
    #[serde(rename = "tier-1-user")]
    User,
    #[serde(rename = "tier-2-manager")]
    Manager,
    #[serde(rename = "tier-3-admin")]
    Admin,
    #[serde(rename = "tier-4-global")]
    Global,
}

impl AccessTier {
    pub const ALL: [AccessTier; 5] = [
        AccessTier::ReadOnly,
        AccessTier::User,
        AccessTier::Manager,
        AccessTier::Admin,
        AccessTier::Global,
    ];

    pub fn rank(&self) -> u8 {
        match self {
            AccessTier::ReadOnly => 0,
            AccessTier::User => 1,
            AccessTier::Manager => 2,
            AccessTier::Admin => 3,
            AccessTier::Global => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AccessTier::ReadOnly => "tier-0-readonly",
            AccessTier::User => "tier-1-user",
            AccessTier::Manager => "tier-2-manager",
            AccessTier::Admin => "tier-3-admin",
            AccessTier::Global => "tier-4-global",
        }
    }

    /// `true` when this tier ranks at or above `required`.
    pub fn at_least(&self, required: AccessTier) -> bool {
        self.rank() >= required.rank()
    }
}

impl fmt::Display for AccessTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessTier {
    type Err = AuthzError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        AccessTier::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == value)
            .ok_or_else(|| AuthzError::invalid_config(format!("unknown access tier: {value}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranks_are_strictly_increasing() {
        for pair in AccessTier::ALL.windows(2) {
            assert!(pair[0].rank() < pair[1].rank());
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn at_least_is_reflexive_and_ordered() {
        assert!(AccessTier::Admin.at_least(AccessTier::Admin));
        assert!(AccessTier::Global.at_least(AccessTier::Admin));
        assert!(!AccessTier::Manager.at_least(AccessTier::Admin));
    }

    #[test]
    fn parses_wire_names() {
        assert_eq!("tier-2-manager".parse::<AccessTier>().unwrap(), AccessTier::Manager);
        assert!("tier-5-cosmic".parse::<AccessTier>().is_err());

        let json = serde_json::to_string(&AccessTier::Global).unwrap();
        assert_eq!(json, "\"tier-4-global\"");
    }
}
