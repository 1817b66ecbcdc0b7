//! User records and raw quota tables.

use std::collections::BTreeMap;

use fleet_id::UserName;
use serde::{Deserialize, Serialize};

/// Scheduling privilege class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    #[default]
    Internal,
    /// External users cannot select a priority; their tasks run at AUTO.
    External,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Internal => "internal",
            Self::External => "external",
        }
    }
}

/// A quota owner: a person, a shared group, or a role account.
///
/// Group and role quotas are stored as `User` rows named after the group or
/// role; a person inherits from the rows listed in `groups` and from the row
/// named after its role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub user_name: UserName,

    #[serde(default)]
    pub role: UserRole,

    /// Shared quota owners this user inherits from.
    #[serde(default)]
    pub groups: Vec<UserName>,

    /// Raw quota table keyed by resource string, e.g. `node-a100-HIGH`.
    #[serde(default)]
    pub quota: BTreeMap<String, i64>,
}

impl User {
    pub fn is_internal(&self) -> bool {
        self.role == UserRole::Internal
    }
}
