//! Team plan files: the JSON input the CLI turns into a team.
//!
//! A plan names its tasks and declares dependencies between them by
//! name; the shell command lives in the task description. Registration
//! resolves names to task ids in dependency order, so a valid plan may
//! list its tasks in any order but must be free of cycles.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use crate::core::task::{DependencyKind, TaskId};
use crate::error::{Error, Result};
use crate::orchestration::coordinator::TeamCoordinator;

/// One dependency declared in a plan, by task name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanDependency {
    /// Name of the task depended on.
    pub task: String,
    /// Required unless the plan says otherwise.
    #[serde(default)]
    pub kind: DependencyKind,
}

/// One task in a plan file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanTask {
    /// Unique name within the plan; becomes the task subject.
    pub name: String,
    /// Shell command to run; becomes the task description.
    pub command: String,
    /// Dependencies on other plan tasks, by name.
    #[serde(default)]
    pub depends_on: Vec<PlanDependency>,
}

/// A complete plan file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamPlan {
    /// Optional human-readable plan name.
    #[serde(default)]
    pub name: Option<String>,
    /// The tasks to register, in any order.
    pub tasks: Vec<PlanTask>,
}

impl TeamPlan {
    /// Parse a plan from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Load and parse a plan file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    /// Serialize the plan back to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Static checks: every name unique, every dependency reference
    /// known, no duplicate or self references, no cycles.
    pub fn validate(&self) -> Result<()> {
        self.registration_order().map(|_| ())
    }

    /// Register every task into the coordinator, dependencies first.
    ///
    /// Returns the mapping from plan names to assigned task ids.
    pub async fn register(
        &self,
        coordinator: &mut TeamCoordinator,
    ) -> Result<BTreeMap<String, TaskId>> {
        let order = self.registration_order()?;
        let mut ids: BTreeMap<String, TaskId> = BTreeMap::new();
        for index in order {
            let task = &self.tasks[index];
            let deps: Vec<(TaskId, DependencyKind)> = task
                .depends_on
                .iter()
                .map(|dep| (ids[dep.task.as_str()], dep.kind))
                .collect();
            let id = coordinator
                .add_task(&task.name, &task.command, &deps)
                .await?;
            ids.insert(task.name.clone(), id);
        }
        Ok(ids)
    }

    /// Indices of `tasks` in an order where every dependency precedes
    /// its dependents.
    ///
    /// # Errors
    /// `Plan` for duplicate names, unknown or duplicate or self
    /// references, and dependency cycles.
    fn registration_order(&self) -> Result<Vec<usize>> {
        if self.tasks.is_empty() {
            return Err(Error::Plan("plan has no tasks".to_string()));
        }

        let mut by_name: HashMap<&str, usize> = HashMap::new();
        for (index, task) in self.tasks.iter().enumerate() {
            if task.name.trim().is_empty() {
                return Err(Error::Plan("task with empty name".to_string()));
            }
            if by_name.insert(task.name.as_str(), index).is_some() {
                return Err(Error::Plan(format!("duplicate task name: {}", task.name)));
            }
        }

        for task in &self.tasks {
            let mut seen: HashSet<&str> = HashSet::new();
            for dep in &task.depends_on {
                if !by_name.contains_key(dep.task.as_str()) {
                    return Err(Error::Plan(format!(
                        "task {} depends on unknown task: {}",
                        task.name, dep.task
                    )));
                }
                if dep.task == task.name {
                    return Err(Error::Plan(format!(
                        "task {} depends on itself",
                        task.name
                    )));
                }
                if !seen.insert(dep.task.as_str()) {
                    return Err(Error::Plan(format!(
                        "task {} lists dependency {} twice",
                        task.name, dep.task
                    )));
                }
            }
        }

        // Kahn's algorithm; whatever remains at the end is cyclic.
        let mut indegree: Vec<usize> = self
            .tasks
            .iter()
            .map(|task| task.depends_on.len())
            .collect();
        let mut dependents: HashMap<usize, Vec<usize>> = HashMap::new();
        for (index, task) in self.tasks.iter().enumerate() {
            for dep in &task.depends_on {
                dependents
                    .entry(by_name[dep.task.as_str()])
                    .or_default()
                    .push(index);
            }
        }

        let mut queue: Vec<usize> = indegree
            .iter()
            .enumerate()
            .filter(|(_, &count)| count == 0)
            .map(|(index, _)| index)
            .collect();
        let mut order = Vec::with_capacity(self.tasks.len());
        while let Some(index) = queue.pop() {
            order.push(index);
            for &dependent in dependents.get(&index).map(Vec::as_slice).unwrap_or(&[]) {
                indegree[dependent] -= 1;
                if indegree[dependent] == 0 {
                    queue.push(dependent);
                }
            }
        }

        if order.len() != self.tasks.len() {
            let stuck: Vec<&str> = indegree
                .iter()
                .enumerate()
                .filter(|(_, &count)| count > 0)
                .map(|(index, _)| self.tasks[index].name.as_str())
                .collect();
            return Err(Error::Plan(format!(
                "dependency cycle involving: {}",
                stuck.join(", ")
            )));
        }
        Ok(order)
    }
}
