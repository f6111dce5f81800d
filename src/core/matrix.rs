//! Dependency matrix: the required/optional kind of every declared edge.
//!
//! The `blocked_by` set on a task only tracks *unresolved* dependencies;
//! once a dependency reaches a terminal state it disappears from the set.
//! The matrix is the static record of what each task declared, and is what
//! the scheduler consults to decide failure propagation and partial input.

use crate::core::task::{DependencyKind, TaskId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Side-table mapping each task to the kind of each declared dependency.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DependencyMatrix {
    kinds: HashMap<TaskId, BTreeMap<TaskId, DependencyKind>>,
}

impl DependencyMatrix {
    /// Create a new empty matrix.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the declared dependencies of a task.
    pub fn insert(&mut self, task: TaskId, dependencies: &[(TaskId, DependencyKind)]) {
        let entry = self.kinds.entry(task).or_default();
        for (dep, kind) in dependencies {
            entry.insert(*dep, *kind);
        }
    }

    /// All declared dependencies of a task with their kinds.
    pub fn kinds_for(&self, task: &TaskId) -> Option<&BTreeMap<TaskId, DependencyKind>> {
        self.kinds.get(task)
    }

    /// The kind of a single declared dependency edge.
    pub fn kind(&self, task: &TaskId, dep: &TaskId) -> Option<DependencyKind> {
        self.kinds.get(task).and_then(|deps| deps.get(dep)).copied()
    }

    /// Ids of the task's `required` dependencies.
    pub fn required_deps(&self, task: &TaskId) -> Vec<TaskId> {
        self.deps_of_kind(task, DependencyKind::Required)
    }

    /// Ids of the task's `optional` dependencies.
    pub fn optional_deps(&self, task: &TaskId) -> Vec<TaskId> {
        self.deps_of_kind(task, DependencyKind::Optional)
    }

    /// Ids of every declared dependency of the task, required first.
    pub fn all_deps(&self, task: &TaskId) -> Vec<TaskId> {
        let mut deps = self.required_deps(task);
        deps.extend(self.optional_deps(task));
        deps
    }

    /// Number of tasks with at least one recorded dependency entry.
    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    /// Check if the matrix is empty.
    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    fn deps_of_kind(&self, task: &TaskId, kind: DependencyKind) -> Vec<TaskId> {
        self.kinds
            .get(task)
            .map(|deps| {
                deps.iter()
                    .filter(|(_, k)| **k == kind)
                    .map(|(dep, _)| *dep)
                    .collect()
            })
            .unwrap_or_default()
    }
}
