//! Role and role-set types for school access control.
//!
//! Roles arrive as custom claims on the identity token. A user may hold any
//! number of roles; authorization asks whether the user's set shares at
//! least one role with the set a view allows.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// School role carried in the identity token's role claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// School administrator.
    Admin,
    /// Teaching staff (professors).
    Teacher,
    /// Enrolled student.
    Student,
    /// Explicit "no role" marker.
    None,
}

impl Role {
    /// All roles, in declaration order.
    pub const ALL: [Role; 4] = [Role::Admin, Role::Teacher, Role::Student, Role::None];

    /// Returns the claim string for this role.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Teacher => "teacher",
            Self::Student => "student",
            Self::None => "none",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a claim string names no known role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownRole(pub String);

impl fmt::Display for UnknownRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown role: {}", self.0)
    }
}

impl std::error::Error for UnknownRole {}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        Role::ALL
            .into_iter()
            .find(|role| role.as_str() == normalized)
            .ok_or_else(|| UnknownRole(s.to_string()))
    }
}

/// Set of roles held by a session.
///
/// Membership is unordered and duplicate-free. The empty set is valid and is
/// what newly signed-up accounts hold until roles are assigned out of band.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleSet {
    roles: BTreeSet<Role>,
}

impl RoleSet {
    /// Creates an empty role set (no role-gated access).
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Creates a role set from any collection of roles.
    #[must_use]
    pub fn from_roles(roles: impl IntoIterator<Item = Role>) -> Self {
        Self {
            roles: roles.into_iter().collect(),
        }
    }

    /// Builds a role set from claim strings, skipping names that are not roles.
    #[must_use]
    pub fn from_claim_values<S: AsRef<str>>(values: &[S]) -> Self {
        let mut roles = BTreeSet::new();
        for value in values {
            match value.as_ref().parse::<Role>() {
                Ok(role) => {
                    roles.insert(role);
                }
                Err(e) => tracing::debug!(error = %e, "ignoring unrecognized role claim"),
            }
        }
        Self { roles }
    }

    /// Returns true if the set holds the given role.
    #[must_use]
    pub fn contains(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    /// Returns true if at least one of `allowed` is in this set.
    #[must_use]
    pub fn intersects(&self, allowed: &[Role]) -> bool {
        allowed.iter().any(|role| self.roles.contains(role))
    }

    /// Returns true if the set holds no roles.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    /// Returns the number of roles held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.roles.len()
    }

    /// Iterates over the held roles in a stable order.
    pub fn iter(&self) -> impl Iterator<Item = Role> + '_ {
        self.roles.iter().copied()
    }
}

impl FromIterator<Role> for RoleSet {
    fn from_iter<I: IntoIterator<Item = Role>>(iter: I) -> Self {
        Self::from_roles(iter)
    }
}

impl fmt::Display for RoleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.roles.iter().map(Role::as_str).collect();
        write!(f, "[{}]", names.join(", "))
    }
}
