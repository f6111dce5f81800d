//! Scheduler: turns the ready set into worker assignments and decides
//! the fate of tasks blocked on failed dependencies.
//!
//! On every state change the scheduler propagates skips to a fixed
//! point, then assigns ready tasks to idle workers, FIFO by creation
//! order with ties broken by lexical task id. A pending task with any
//! `required` dependency that failed (or was itself skipped) is skipped
//! immediately, without waiting for its remaining dependencies; failed
//! `optional` dependencies only set the partial-input flag on the
//! eventual assignment.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

use crate::artifact::ArtifactKey;
use crate::clog_debug;
use crate::core::graph::TaskGraph;
use crate::core::matrix::DependencyMatrix;
use crate::core::task::{Outcome, TaskId};
use crate::core::team::TeamId;
use crate::error::Result;
use crate::log::Scope;
use crate::orchestration::executor::Assignment;
use crate::orchestration::pool::WorkerPool;
use crate::orchestration::worker::WorkerId;

/// Events emitted by the scheduler for task lifecycle changes.
///
/// These events let external observers follow progress without polling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerEvent {
    /// A task was handed to a worker.
    TaskAssigned {
        task: TaskId,
        worker: WorkerId,
        /// True when advisory inputs are missing.
        partial_input: bool,
    },
    /// A task reached a terminal outcome reported by a worker or the
    /// supervisor.
    TaskFinished { task: TaskId, outcome: Outcome },
    /// A task was skipped by failure propagation or team abort.
    TaskSkipped { task: TaskId, reason: String },
    /// Every task in the graph is terminal.
    AllTasksTerminal,
}

/// Drives scheduling decisions over one team's task graph.
pub struct Scheduler {
    team: TeamId,
    graph: Arc<RwLock<TaskGraph>>,
    matrix: Arc<RwLock<DependencyMatrix>>,
    event_tx: mpsc::Sender<SchedulerEvent>,
    /// Artifact refs reported by succeeded tasks, keyed by producer.
    outputs: HashMap<TaskId, Vec<ArtifactKey>>,
}

impl Scheduler {
    /// Create a new scheduler over the team's graph and matrix.
    pub fn new(
        team: TeamId,
        graph: Arc<RwLock<TaskGraph>>,
        matrix: Arc<RwLock<DependencyMatrix>>,
        event_tx: mpsc::Sender<SchedulerEvent>,
    ) -> Self {
        Self {
            team,
            graph,
            matrix,
            event_tx,
            outputs: HashMap::new(),
        }
    }

    /// Artifacts recorded for a succeeded task.
    pub fn outputs_of(&self, task: &TaskId) -> &[ArtifactKey] {
        self.outputs
            .get(task)
            .map(|refs| refs.as_slice())
            .unwrap_or(&[])
    }

    /// Check if every task in the graph is terminal.
    pub async fn all_terminal(&self) -> bool {
        self.graph.read().await.all_terminal()
    }

    /// Apply a reported terminal outcome, then propagate skips.
    ///
    /// The graph commit happens before any re-evaluation, so the state
    /// update happens-before re-scheduling.
    pub async fn handle_report(
        &mut self,
        task: TaskId,
        outcome: Outcome,
        artifacts: Vec<ArtifactKey>,
    ) -> Result<()> {
        {
            let mut graph = self.graph.write().await;
            graph.mark_terminal(&task, outcome.clone())?;
        }
        if matches!(outcome, Outcome::Succeeded) {
            self.outputs.insert(task, artifacts);
        }
        clog_debug!(scope: Scope::Task(task), "terminal: {}", outcome);
        self.emit(SchedulerEvent::TaskFinished { task, outcome });
        self.propagate().await?;
        self.emit_if_all_terminal().await;
        Ok(())
    }

    /// Skip every pending task with a required dependency that finished
    /// without succeeding, cascading until a fixed point.
    ///
    /// A skip is itself terminal, so each one may unblock or skip
    /// further downstream tasks; the loop re-scans until nothing changes.
    pub async fn propagate(&mut self) -> Result<Vec<(TaskId, String)>> {
        let mut skipped = Vec::new();
        loop {
            let candidate = self.find_doomed().await;
            let (task, reason) = match candidate {
                Some(found) => found,
                None => break,
            };
            {
                let mut graph = self.graph.write().await;
                graph.mark_terminal(&task, Outcome::skipped(&reason))?;
            }
            clog_debug!(scope: Scope::Task(task), "skipped: {}", reason);
            self.emit(SchedulerEvent::TaskSkipped {
                task,
                reason: reason.clone(),
            });
            skipped.push((task, reason));
        }
        Ok(skipped)
    }

    /// Skip every remaining pending task (team abort path).
    pub async fn skip_all_pending(&mut self, reason: &str) -> Result<Vec<TaskId>> {
        let pending: Vec<TaskId> = {
            let graph = self.graph.read().await;
            graph
                .tasks()
                .iter()
                .filter(|task| task.is_pending())
                .map(|task| task.id)
                .collect()
        };
        for task in &pending {
            let mut graph = self.graph.write().await;
            graph.mark_terminal(task, Outcome::skipped(reason))?;
        }
        for task in &pending {
            self.emit(SchedulerEvent::TaskSkipped {
                task: *task,
                reason: reason.to_string(),
            });
        }
        self.emit_if_all_terminal().await;
        Ok(pending)
    }

    /// Propagate skips, then assign ready tasks to idle workers.
    ///
    /// Returns the number of tasks dispatched.
    pub async fn dispatch(&mut self, pool: &mut WorkerPool) -> Result<usize> {
        self.propagate().await?;

        let ready = { self.graph.read().await.ready_set() };
        let idle = pool.idle_workers();
        let mut dispatched = 0;

        for (task, worker) in ready.into_iter().zip(idle.into_iter()) {
            let assignment = self.build_assignment(&task).await?;
            let partial_input = assignment.partial_input;
            {
                let mut graph = self.graph.write().await;
                graph.mark_running(&task, worker)?;
            }
            pool.assign(&worker, assignment).await?;
            clog_debug!(
                scope: Scope::Task(task),
                "assigned to worker {} (partial_input={})",
                worker.short(),
                partial_input
            );
            self.emit(SchedulerEvent::TaskAssigned {
                task,
                worker,
                partial_input,
            });
            dispatched += 1;
        }
        Ok(dispatched)
    }

    /// Build the assignment for a ready task: its record, the
    /// partial-input flag, and the artifact refs of its dependencies.
    async fn build_assignment(&self, task: &TaskId) -> Result<Assignment> {
        let graph = self.graph.read().await;
        let matrix = self.matrix.read().await;
        let record = graph.record(task, &matrix)?;

        // A task with zero required dependencies is never auto-skipped;
        // it runs with whatever optional artifacts exist, possibly none.
        let partial_input = matrix.optional_deps(task).iter().any(|dep| {
            matches!(
                graph.task(dep).and_then(|t| t.outcome()),
                Some(Outcome::Failed { .. }) | Some(Outcome::Skipped { .. })
            )
        });

        let inputs: Vec<ArtifactKey> = matrix
            .all_deps(task)
            .iter()
            .flat_map(|dep| self.outputs_of(dep).to_vec())
            .collect();

        Ok(Assignment {
            team: self.team,
            task: record,
            partial_input,
            inputs,
        })
    }

    /// Find one pending task whose required dependency finished without
    /// succeeding.
    async fn find_doomed(&self) -> Option<(TaskId, String)> {
        let graph = self.graph.read().await;
        let matrix = self.matrix.read().await;
        for task in graph.tasks() {
            if !task.is_pending() {
                continue;
            }
            for dep in matrix.required_deps(&task.id) {
                match graph.task(&dep).and_then(|t| t.outcome()) {
                    Some(Outcome::Failed { .. }) => {
                        return Some((
                            task.id,
                            format!("required dependency failed: {}", dep),
                        ));
                    }
                    Some(Outcome::Skipped { .. }) => {
                        return Some((
                            task.id,
                            format!("required dependency skipped: {}", dep),
                        ));
                    }
                    _ => {}
                }
            }
        }
        None
    }

    async fn emit_if_all_terminal(&self) {
        if self.all_terminal().await {
            self.emit(SchedulerEvent::AllTasksTerminal);
        }
    }

    /// Observers may be absent; never block scheduling on a full event
    /// channel.
    fn emit(&self, event: SchedulerEvent) {
        let _ = self.event_tx.try_send(event);
    }
}
