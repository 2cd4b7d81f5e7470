//! Role and account-status enumerations.
//!
//! `Role` is the closed set of realm roles this system recognizes. A user
//! holds exactly one effective role; the priority order in [`Role::PRIORITY`]
//! decides which of several token claims wins.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// The closed role enumeration, highest privilege first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Manager,
    Engineer,
    User,
}

impl Role {
    /// Fixed priority order used to pick the single effective role from a set
    /// of token claims: admin > manager > engineer > user.
    pub const PRIORITY: [Role; 4] = [Role::Admin, Role::Manager, Role::Engineer, Role::User];

    /// The stored/wire representation of the role.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Manager => "manager",
            Role::Engineer => "engineer",
            Role::User => "user",
        }
    }

    /// Parse a single raw claim value. Claims are matched case-insensitively;
    /// anything outside the enumeration is `None`.
    #[must_use]
    pub fn from_claim(claim: &str) -> Option<Role> {
        match claim.to_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "manager" => Some(Role::Manager),
            "engineer" => Some(Role::Engineer),
            "user" => Some(Role::User),
            _ => None,
        }
    }

    /// Whether a user with this role may hold a department assignment.
    /// Only managers and engineers belong to a department.
    #[must_use]
    pub fn may_hold_department(&self) -> bool {
        matches!(self, Role::Manager | Role::Engineer)
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing a role or status value fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl FromStr for Role {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::from_claim(s).ok_or_else(|| ParseEnumError {
            kind: "role",
            value: s.to_string(),
        })
    }
}

/// Account status: active accounts can log in, locked accounts cannot.
/// Both states are reachable from each other; there is no terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Locked,
}

impl AccountStatus {
    /// The stored/wire representation of the status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Locked => "locked",
        }
    }
}

impl Display for AccountStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(AccountStatus::Active),
            "locked" => Ok(AccountStatus::Locked),
            other => Err(ParseEnumError {
                kind: "status",
                value: other.to_string(),
            }),
        }
    }
}
