//! Task data model for the team task graph.
//!
//! Tasks are the schedulable units of work assigned to workers. Each task
//! tracks its status, owner, outstanding dependencies, and timing.

use crate::orchestration::worker::WorkerId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use uuid::Uuid;

/// Unique identifier for a task within a team.
///
/// Uses UUID v4 for generation and provides a short form display
/// for human-readable output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub Uuid);

impl TaskId {
    /// Create a new unique task identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Return first 8 characters of the UUID for display.
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Kind of a dependency edge between two tasks.
///
/// A `Required` dependency must succeed before the dependent may run;
/// if it fails, the dependent is skipped. An `Optional` dependency may
/// fail without blocking the dependent, which then runs with a
/// partial-input flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyKind {
    Required,
    Optional,
}

impl Default for DependencyKind {
    fn default() -> Self {
        Self::Required
    }
}

impl std::fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DependencyKind::Required => write!(f, "required"),
            DependencyKind::Optional => write!(f, "optional"),
        }
    }
}

/// Terminal result of a task.
///
/// Every task reaches exactly one of these; none may be reverted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "result")]
pub enum Outcome {
    /// The worker completed the unit of work.
    Succeeded,
    /// The worker reported the unit could not complete.
    Failed {
        /// Why the task failed.
        reason: String,
    },
    /// The engine decided the task must not run.
    Skipped {
        /// Why the task was skipped.
        reason: String,
    },
}

impl Outcome {
    /// Create a failed outcome from any displayable reason.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }

    /// Create a skipped outcome from any displayable reason.
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped {
            reason: reason.into(),
        }
    }

    /// The reason attached to this outcome, if not succeeded.
    pub fn reason(&self) -> Option<&str> {
        match self {
            Outcome::Succeeded => None,
            Outcome::Failed { reason } | Outcome::Skipped { reason } => Some(reason),
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Succeeded => write!(f, "succeeded"),
            Outcome::Failed { reason } => write!(f, "failed: {}", reason),
            Outcome::Skipped { reason } => write!(f, "skipped: {}", reason),
        }
    }
}

/// Task status in its lifecycle.
///
/// Transitions are monotonic: `Pending -> Running -> Finished`, or
/// `Pending -> Finished` for skips. Terminal states never revert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "outcome")]
pub enum TaskStatus {
    /// Created, not yet assigned.
    Pending,
    /// Assigned to a worker and executing.
    Running,
    /// Reached a terminal outcome.
    Finished(Outcome),
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Finished(outcome) => write!(f, "{}", outcome),
        }
    }
}

/// A single task in the team graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier for this task.
    pub id: TaskId,
    /// Human-readable subject for the task.
    pub subject: String,
    /// Detailed description of what the task should accomplish.
    pub description: String,
    /// Current lifecycle status.
    pub status: TaskStatus,
    /// Worker currently or last assigned to this task.
    pub owner: Option<WorkerId>,
    /// Dependencies not yet resolved. Terminal transitions of other tasks
    /// remove their ids from this set; readiness means the set is empty.
    pub blocked_by: BTreeSet<TaskId>,
    /// Creation order within the team, used for FIFO scheduling.
    pub seq: u64,
    /// When the task was created.
    pub created_at: DateTime<Utc>,
    /// When the task started execution.
    pub started_at: Option<DateTime<Utc>>,
    /// When the task reached a terminal state.
    pub finished_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Create a new pending task.
    pub fn new(subject: &str, description: &str, seq: u64, blocked_by: BTreeSet<TaskId>) -> Self {
        Self {
            id: TaskId::new(),
            subject: subject.to_string(),
            description: description.to_string(),
            status: TaskStatus::Pending,
            owner: None,
            blocked_by,
            seq,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    /// Check if the task has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, TaskStatus::Finished(_))
    }

    /// Check if the task is pending.
    pub fn is_pending(&self) -> bool {
        matches!(self.status, TaskStatus::Pending)
    }

    /// Check if the task is pending with no outstanding dependencies.
    pub fn is_ready(&self) -> bool {
        self.is_pending() && self.blocked_by.is_empty()
    }

    /// The terminal outcome, if the task has one.
    pub fn outcome(&self) -> Option<&Outcome> {
        match &self.status {
            TaskStatus::Finished(outcome) => Some(outcome),
            _ => None,
        }
    }
}

/// External view of a task, handed to worker executors and serialized
/// into manifests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub subject: String,
    pub description: String,
    pub status: TaskStatus,
    pub owner: Option<WorkerId>,
    pub blocked_by: Vec<TaskId>,
    pub dependency_kinds: BTreeMap<TaskId, DependencyKind>,
}
