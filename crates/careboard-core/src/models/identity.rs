//! Identity models: roles and users.
//!
//! Authentication lives outside this crate. A [`User`] here is the
//! already-authenticated caller, carrying only what authorization needs.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Clinical or administrative role of a user.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Doctor,
    Nurse,
    Admin,
}

/// Returned when a role name is not one of the known roles.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Unknown role: {0}")]
pub struct UnknownRole(pub String);

impl Role {
    /// All roles, in the order they are seeded.
    pub const ALL: [Role; 3] = [Role::Doctor, Role::Nurse, Role::Admin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Doctor => "doctor",
            Role::Nurse => "nurse",
            Role::Admin => "admin",
        }
    }

    /// Whether this role staffs patients (nurse or doctor).
    pub fn is_clinical(&self) -> bool {
        matches!(self, Role::Doctor | Role::Nurse)
    }
}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "doctor" => Ok(Role::Doctor),
            "nurse" => Ok(Role::Nurse),
            "admin" => Ok(Role::Admin),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An authenticated user as seen by the core.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    /// UUID
    pub id: String,
    /// Login email (unique)
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    /// Role, if one has been granted by an admin
    pub role: Option<Role>,
    /// Home geocode used as the default care board
    pub primary_geocode_id: Option<String>,
    /// Creation timestamp
    pub created_at: String,
}

impl User {
    /// Create a new user with the given role.
    pub fn new(email: String, first_name: String, last_name: String, role: Option<Role>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            email,
            first_name,
            last_name,
            role,
            primary_geocode_id: None,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Display name ("First Last").
    pub fn name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.role == Some(role)
    }
}
