//! Team identity and descriptor types.
//!
//! A team is a bounded execution scope: one task graph, one dependency
//! matrix, one worker pool, one artifact namespace. The heavy machinery
//! lives in the orchestration layer; this module holds the plain data
//! shared across it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a team.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TeamId(pub Uuid);

impl TeamId {
    /// Create a new unique team identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Return first 8 characters of the UUID for display.
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for TeamId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TeamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status of a team.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeamStatus {
    Active,
    Terminated,
}

impl std::fmt::Display for TeamStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TeamStatus::Active => write!(f, "active"),
            TeamStatus::Terminated => write!(f, "terminated"),
        }
    }
}

/// External view of a team.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamDescriptor {
    pub id: TeamId,
    pub created_at: DateTime<Utc>,
    pub status: TeamStatus,
}
