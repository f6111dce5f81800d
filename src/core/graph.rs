//! Task graph for dependency management.
//!
//! This module provides the TaskGraph structure that represents a team's
//! tasks and their dependency edges as a directed graph, and owns the
//! validity of every task state transition. Because a task can only
//! declare dependencies on tasks that already exist, the graph is acyclic
//! by construction.

use crate::core::matrix::DependencyMatrix;
use crate::core::task::{DependencyKind, Outcome, Task, TaskId, TaskRecord, TaskStatus};
use crate::error::{Error, Result};
use crate::orchestration::worker::WorkerId;
use chrono::Utc;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{BTreeSet, HashMap};

/// The team's task dependency graph.
///
/// Nodes are tasks, edges are dependencies annotated with their kind.
/// An edge from A to B means B declared a dependency on A. All mutation
/// goes through methods that enforce the task lifecycle: transitions are
/// monotonic and terminal states never revert.
pub struct TaskGraph {
    /// The underlying directed graph.
    graph: DiGraph<Task, DependencyKind>,
    /// Index mapping from TaskId to NodeIndex for fast lookups.
    index: HashMap<TaskId, NodeIndex>,
    /// Creation counter, used for FIFO scheduling order.
    next_seq: u64,
}

impl TaskGraph {
    /// Create a new empty TaskGraph.
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            index: HashMap::new(),
            next_seq: 0,
        }
    }

    /// Create a task with the given dependencies.
    ///
    /// Each dependency must name a task already present in this graph,
    /// and no dependency may be listed twice. The new task starts
    /// `pending` with its `blocked_by` set equal to the dependency ids.
    ///
    /// # Errors
    /// - `UnknownDependency` if a dependency id is not in the graph
    /// - `DuplicateDependency` if the same id is listed more than once
    pub fn create_task(
        &mut self,
        subject: &str,
        description: &str,
        dependencies: &[(TaskId, DependencyKind)],
    ) -> Result<TaskId> {
        let mut blocked_by = BTreeSet::new();
        for (dep, _) in dependencies {
            if !self.index.contains_key(dep) {
                return Err(Error::UnknownDependency {
                    subject: subject.to_string(),
                    dep: *dep,
                });
            }
            if !blocked_by.insert(*dep) {
                return Err(Error::DuplicateDependency {
                    subject: subject.to_string(),
                    dep: *dep,
                });
            }
        }

        let task = Task::new(subject, description, self.next_seq, blocked_by);
        self.next_seq += 1;
        let id = task.id;
        let node = self.graph.add_node(task);
        self.index.insert(id, node);

        for (dep, kind) in dependencies {
            // Checked above; the dependency node must exist.
            if let Some(&dep_node) = self.index.get(dep) {
                self.graph.add_edge(dep_node, node, *kind);
            }
        }

        Ok(id)
    }

    /// Transition a task from `pending` to `running` under the given worker.
    ///
    /// # Errors
    /// `InvalidTransition` if the task is not pending, still has
    /// outstanding dependencies, or does not exist.
    pub fn mark_running(&mut self, id: &TaskId, worker: WorkerId) -> Result<()> {
        let task = self.task_mut(id)?;
        if !task.is_pending() {
            return Err(Error::InvalidTransition {
                task: *id,
                from: task.status.to_string(),
                to: "running".to_string(),
            });
        }
        if !task.blocked_by.is_empty() {
            return Err(Error::InvalidTransition {
                task: *id,
                from: format!("pending ({} unresolved dependencies)", task.blocked_by.len()),
                to: "running".to_string(),
            });
        }
        task.status = TaskStatus::Running;
        task.owner = Some(worker);
        task.started_at = Some(Utc::now());
        Ok(())
    }

    /// Transition a task to a terminal outcome.
    ///
    /// Atomically removes the task id from every dependent's `blocked_by`
    /// set, so readiness can be recomputed without revisiting history.
    /// Returns the ids of the dependents whose sets were touched.
    ///
    /// # Errors
    /// `InvalidTransition` if the task is already terminal.
    pub fn mark_terminal(&mut self, id: &TaskId, outcome: Outcome) -> Result<Vec<TaskId>> {
        let node = self.node(id)?;
        {
            let task = self.task_mut(id)?;
            if task.is_terminal() {
                return Err(Error::InvalidTransition {
                    task: *id,
                    from: task.status.to_string(),
                    to: outcome.to_string(),
                });
            }
            task.status = TaskStatus::Finished(outcome);
            task.finished_at = Some(Utc::now());
        }

        let dependents: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(node, petgraph::Direction::Outgoing)
            .collect();

        let mut touched = Vec::new();
        for dep_node in dependents {
            if let Some(dependent) = self.graph.node_weight_mut(dep_node) {
                if dependent.blocked_by.remove(id) {
                    touched.push(dependent.id);
                }
            }
        }
        Ok(touched)
    }

    /// All pending tasks with no outstanding dependencies, FIFO by
    /// creation order, ties broken by lexical id order.
    pub fn ready_set(&self) -> Vec<TaskId> {
        let mut ready: Vec<&Task> = self
            .graph
            .node_weights()
            .filter(|task| task.is_ready())
            .collect();
        ready.sort_by_key(|task| (task.seq, task.id));
        ready.iter().map(|task| task.id).collect()
    }

    /// Get a reference to a task by its ID.
    pub fn task(&self, id: &TaskId) -> Option<&Task> {
        self.index
            .get(id)
            .and_then(|&node| self.graph.node_weight(node))
    }

    /// All tasks that depend on the given task.
    pub fn dependents_of(&self, id: &TaskId) -> Vec<TaskId> {
        if let Some(&node) = self.index.get(id) {
            self.graph
                .neighbors_directed(node, petgraph::Direction::Outgoing)
                .filter_map(|n| self.graph.node_weight(n))
                .map(|task| task.id)
                .collect()
        } else {
            Vec::new()
        }
    }

    /// Check if every task in the graph is terminal.
    pub fn all_terminal(&self) -> bool {
        self.graph.node_weights().all(|task| task.is_terminal())
    }

    /// Number of tasks in the graph.
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    /// Check if the graph is empty.
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Check if the graph contains a task.
    pub fn contains(&self, id: &TaskId) -> bool {
        self.index.contains_key(id)
    }

    /// Iterate over all tasks in creation order.
    pub fn tasks(&self) -> Vec<&Task> {
        let mut tasks: Vec<&Task> = self.graph.node_weights().collect();
        tasks.sort_by_key(|task| task.seq);
        tasks
    }

    /// Build the external record view of a task, joining in the
    /// dependency kinds from the matrix.
    pub fn record(&self, id: &TaskId, matrix: &DependencyMatrix) -> Result<TaskRecord> {
        let task = self.task(id).ok_or(Error::UnknownTask(*id))?;
        Ok(TaskRecord {
            id: task.id,
            subject: task.subject.clone(),
            description: task.description.clone(),
            status: task.status.clone(),
            owner: task.owner,
            blocked_by: task.blocked_by.iter().copied().collect(),
            dependency_kinds: matrix.kinds_for(id).cloned().unwrap_or_default(),
        })
    }

    fn node(&self, id: &TaskId) -> Result<NodeIndex> {
        self.index.get(id).copied().ok_or(Error::UnknownTask(*id))
    }

    fn task_mut(&mut self, id: &TaskId) -> Result<&mut Task> {
        let node = self.node(id)?;
        self.graph
            .node_weight_mut(node)
            .ok_or(Error::UnknownTask(*id))
    }
}

impl Default for TaskGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TaskGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskGraph")
            .field("tasks", &self.graph.node_count())
            .field("dependencies", &self.graph.edge_count())
            .finish()
    }
}
