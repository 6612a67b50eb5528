//! Team role hierarchy - ranked, closed set of roles.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Roles a member can hold within a provider, from most to least privileged.
///
/// The ordering is total and fixed at compile time; a lower rank means more
/// privilege. Role checks are always of the form "does the actor's role sit
/// at or above this floor", see [`TeamRole::permits`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TeamRole {
    Owner,
    Admin,
    Manager,
    Staff,
    Viewer,
}

/// Raised when a stored role code does not decode to a known role.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown role code: {0}")]
pub struct UnknownRoleError(pub String);

impl TeamRole {
    /// Privilege rank, 1 (owner) through 5 (viewer).
    pub const fn rank(self) -> u8 {
        match self {
            TeamRole::Owner => 1,
            TeamRole::Admin => 2,
            TeamRole::Manager => 3,
            TeamRole::Staff => 4,
            TeamRole::Viewer => 5,
        }
    }

    /// True when this role sits at or above the given floor.
    pub const fn permits(self, floor: TeamRole) -> bool {
        self.rank() <= floor.rank()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TeamRole::Owner => "owner",
            TeamRole::Admin => "admin",
            TeamRole::Manager => "manager",
            TeamRole::Staff => "staff",
            TeamRole::Viewer => "viewer",
        }
    }
}

impl std::fmt::Display for TeamRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TeamRole {
    type Err = UnknownRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owner" => Ok(TeamRole::Owner),
            "admin" => Ok(TeamRole::Admin),
            "manager" => Ok(TeamRole::Manager),
            "staff" => Ok(TeamRole::Staff),
            "viewer" => Ok(TeamRole::Viewer),
            other => Err(UnknownRoleError(other.to_string())),
        }
    }
}
