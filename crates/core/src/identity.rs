//! Caller identity and authorization.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Account role.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Regular account: may mutate only packages it owns.
    User,
    /// Admin account: may mutate any package and read analytics.
    Admin,
}

impl Role {
    /// Parse from string.
    pub fn parse(s: &str) -> crate::Result<Self> {
        match s {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            _ => Err(crate::Error::InvalidRole(s.to_string())),
        }
    }

    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A resolved caller identity, produced by the access gate.
///
/// Carries everything the package operations need for authorization; handlers
/// never inspect credentials directly.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Identity {
    /// Account identifier.
    pub user_id: Uuid,
    /// Account handle, for display and audit rows.
    pub username: String,
    /// Account role.
    pub role: Role,
}

impl Identity {
    /// Whether this caller may mutate (delete, rollback) a package owned by `owner_id`.
    ///
    /// The single authorization predicate for all package mutation paths.
    pub fn can_mutate(&self, owner_id: Uuid) -> bool {
        self.role == Role::Admin || self.user_id == owner_id
    }

    /// Whether this caller holds the admin role.
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}
