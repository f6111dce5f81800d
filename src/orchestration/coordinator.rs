//! Team coordinator: the single control point for a team's lifecycle.
//!
//! The coordinator creates the team (graph, matrix, pool, bus), registers
//! tasks with their dependency kinds, drives the scheduler by reacting to
//! bus notifications, sweeps for unresponsive workers, and runs the
//! shutdown handshake before marking the team terminated. Teardown always
//! yields a complete manifest: every task's final status, reason, and
//! artifact references, so partial completion stays inspectable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;

use crate::artifact::{ArtifactKey, ArtifactStore};
use crate::bus::{Notification, NotificationBus, NotificationKind, Recipient};
use crate::config::Config;
use crate::core::graph::TaskGraph;
use crate::core::matrix::DependencyMatrix;
use crate::core::task::{DependencyKind, Outcome, TaskId, TaskStatus};
use crate::core::team::{TeamDescriptor, TeamId, TeamStatus};
use crate::error::{Error, Result};
use crate::log::Scope;
use crate::orchestration::executor::TaskExecutor;
use crate::orchestration::pool::WorkerPool;
use crate::orchestration::scheduler::{Scheduler, SchedulerEvent};
use crate::orchestration::worker::WorkerId;
use crate::{clog, clog_debug, clog_warn};

/// Final account of one task in the teardown manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskReport {
    pub id: TaskId,
    pub subject: String,
    pub status: TaskStatus,
    pub owner: Option<WorkerId>,
    pub artifacts: Vec<ArtifactKey>,
}

/// Complete account of a team after teardown.
///
/// Artifacts referenced here outlive the team record; only the team's
/// control structures are destroyed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamManifest {
    pub team: TeamDescriptor,
    pub terminated_at: Option<DateTime<Utc>>,
    pub tasks: Vec<TaskReport>,
}

impl TeamManifest {
    /// Check if every task succeeded.
    pub fn fully_succeeded(&self) -> bool {
        self.tasks
            .iter()
            .all(|task| task.status == TaskStatus::Finished(Outcome::Succeeded))
    }

    /// Look up one task's report.
    pub fn task(&self, id: &TaskId) -> Option<&TaskReport> {
        self.tasks.iter().find(|task| task.id == *id)
    }
}

/// Handle for requesting a team-wide abort from outside the run loop.
///
/// Aborting is cooperative: in-flight tasks report `failed("aborted")`,
/// unstarted tasks become `skipped("team aborted")`, and the run loop
/// still finishes with a complete manifest.
#[derive(Clone)]
pub struct AbortHandle {
    cancel: CancellationToken,
}

impl AbortHandle {
    /// Request the abort.
    pub fn abort(&self) {
        self.cancel.cancel();
    }

    /// Check whether the abort has been requested.
    pub fn is_aborted(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Creates a team, drives it to completion, and tears it down.
pub struct TeamCoordinator {
    id: TeamId,
    created_at: DateTime<Utc>,
    terminated_at: Option<DateTime<Utc>>,
    config: Config,
    graph: Arc<RwLock<TaskGraph>>,
    matrix: Arc<RwLock<DependencyMatrix>>,
    bus: Arc<NotificationBus>,
    pool: WorkerPool,
    scheduler: Scheduler,
    executor: Arc<dyn TaskExecutor>,
    store: Arc<dyn ArtifactStore>,
    cancel: CancellationToken,
    events: Option<mpsc::Receiver<SchedulerEvent>>,
    manifest: Option<TeamManifest>,
}

impl TeamCoordinator {
    /// Create a new team with its own graph, matrix, pool, and bus.
    pub fn new(
        config: &Config,
        executor: Arc<dyn TaskExecutor>,
        store: Arc<dyn ArtifactStore>,
    ) -> Self {
        let id = TeamId::new();
        let graph = Arc::new(RwLock::new(TaskGraph::new()));
        let matrix = Arc::new(RwLock::new(DependencyMatrix::new()));
        let (event_tx, event_rx) = mpsc::channel(100);
        clog!(scope: Scope::Team(id), "created");
        Self {
            id,
            created_at: Utc::now(),
            terminated_at: None,
            config: config.clone(),
            graph: graph.clone(),
            matrix: matrix.clone(),
            bus: Arc::new(NotificationBus::new(config.inline_payload_cap)),
            pool: WorkerPool::new(config.max_workers, config.shutdown_retry_limit),
            scheduler: Scheduler::new(id, graph, matrix, event_tx),
            executor,
            store,
            cancel: CancellationToken::new(),
            events: Some(event_rx),
            manifest: None,
        }
    }

    /// The team id.
    pub fn id(&self) -> TeamId {
        self.id
    }

    /// The external descriptor of this team.
    pub fn descriptor(&self) -> TeamDescriptor {
        TeamDescriptor {
            id: self.id,
            created_at: self.created_at,
            status: if self.terminated_at.is_some() {
                TeamStatus::Terminated
            } else {
                TeamStatus::Active
            },
        }
    }

    /// The artifact store this team writes into.
    pub fn store(&self) -> Arc<dyn ArtifactStore> {
        self.store.clone()
    }

    /// Handle for aborting the team from another task.
    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle {
            cancel: self.cancel.clone(),
        }
    }

    /// Take the scheduler event stream for observation. Events are
    /// dropped, not queued, once the channel fills with no consumer.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<SchedulerEvent>> {
        self.events.take()
    }

    /// Register a task and its dependency kinds.
    ///
    /// # Errors
    /// - `TeamTerminated` once the team has been torn down
    /// - `UnknownDependency` / `DuplicateDependency` per the graph rules
    pub async fn add_task(
        &mut self,
        subject: &str,
        description: &str,
        dependencies: &[(TaskId, DependencyKind)],
    ) -> Result<TaskId> {
        if self.terminated_at.is_some() {
            return Err(Error::TeamTerminated(self.id));
        }
        let id = {
            let mut graph = self.graph.write().await;
            graph.create_task(subject, description, dependencies)?
        };
        self.matrix.write().await.insert(id, dependencies);
        clog_debug!(
            scope: Scope::Team(self.id),
            "task {} registered ({} deps)",
            id.short(),
            dependencies.len()
        );
        Ok(id)
    }

    /// Drive the team until every task is terminal, then tear it down.
    ///
    /// Calling `run` on an already-terminated team is a no-op that
    /// returns the existing manifest.
    pub async fn run(&mut self) -> Result<TeamManifest> {
        if let Some(manifest) = &self.manifest {
            return Ok(manifest.clone());
        }
        clog!(scope: Scope::Team(self.id), "run starting");

        let mut inbox = self.bus.register(Recipient::Coordinator).await;
        self.spawn_workers().await?;
        self.scheduler.dispatch(&mut self.pool).await?;

        let cancel = self.cancel.clone();
        let mut aborted = false;
        let sweep_every =
            (self.config.heartbeat_timeout() / 2).max(Duration::from_millis(10));
        let mut sweep = tokio::time::interval(sweep_every);
        sweep.tick().await; // first tick completes immediately

        while !self.scheduler.all_terminal().await {
            tokio::select! {
                note = inbox.recv() => match note {
                    Some(note) => self.handle_notification(note).await?,
                    None => break,
                },
                _ = sweep.tick() => self.sweep_stale().await?,
                _ = cancel.cancelled(), if !aborted => {
                    aborted = true;
                    self.handle_abort().await?;
                }
            }
        }

        self.teardown(&mut inbox).await?;
        self.terminated_at = Some(Utc::now());
        let manifest = self.build_manifest().await;
        clog!(
            scope: Scope::Team(self.id),
            "terminated ({} tasks)",
            manifest.tasks.len()
        );
        self.manifest = Some(manifest.clone());
        Ok(manifest)
    }

    /// React to one bus notification during the run loop.
    async fn handle_notification(&mut self, note: Notification) -> Result<()> {
        let worker = match note.sender {
            Recipient::Worker(id) => Some(id),
            Recipient::Coordinator => None,
        };
        if let Some(worker) = &worker {
            self.pool.record_seen(worker);
        }
        match note.kind {
            NotificationKind::Completion | NotificationKind::Failure => {
                let task = match note.task {
                    Some(task) => task,
                    None => return Ok(()),
                };
                if let Some(worker) = &worker {
                    let _ = self.pool.release(worker);
                }
                let outcome = if note.kind == NotificationKind::Completion {
                    Outcome::Succeeded
                } else {
                    Outcome::failed(&note.summary)
                };
                self.record_if_open(task, outcome, note.artifact_refs).await?;
                self.scheduler.dispatch(&mut self.pool).await?;
            }
            NotificationKind::ShutdownAck => {
                if let Some(worker) = &worker {
                    let _ = self.pool.handle_ack(worker);
                }
            }
            NotificationKind::Heartbeat
            | NotificationKind::Skip
            | NotificationKind::ShutdownRequest
            | NotificationKind::ShutdownReject => {}
        }
        Ok(())
    }

    /// Force-terminate workers that went silent past the heartbeat
    /// window, record their held tasks as failed, and refill the pool.
    async fn sweep_stale(&mut self) -> Result<()> {
        let window = self.config.heartbeat_timeout();
        for worker in self.pool.stale_workers(window) {
            clog_warn!(
                scope: Scope::Team(self.id),
                "worker {} unresponsive, terminating",
                worker.short()
            );
            let held = self.pool.force_terminate(&worker).await?;
            if let Some(task) = held {
                let outcome = self.unresponsive_outcome(&worker);
                self.record_if_open(task, outcome, vec![]).await?;
            }
            self.spawn_one()?;
        }
        self.scheduler.dispatch(&mut self.pool).await?;
        Ok(())
    }

    /// Team-wide abort: broadcast the control event and skip everything
    /// not yet started. In-flight tasks cancel cooperatively through the
    /// token and report `failed("aborted")` themselves.
    async fn handle_abort(&mut self) -> Result<()> {
        clog_warn!(scope: Scope::Team(self.id), "abort requested");
        let _ = self
            .bus
            .broadcast(Notification::shutdown_broadcast("team aborted"))
            .await;
        self.scheduler.skip_all_pending("team aborted").await?;
        Ok(())
    }

    /// Graceful shutdown handshake for every worker, bounded by the
    /// configured retry limit, with force termination past the bound or
    /// the handshake window.
    async fn teardown(&mut self, inbox: &mut mpsc::Receiver<Notification>) -> Result<()> {
        for worker in self.pool.worker_ids() {
            if !self.is_worker_terminated(&worker) {
                self.pool.request_shutdown(&worker).await?;
            }
        }

        let window = self.config.heartbeat_timeout();
        while !self.pool.all_terminated() {
            match tokio::time::timeout(window, inbox.recv()).await {
                Ok(Some(note)) => self.handle_teardown_notification(note).await?,
                Ok(None) => break,
                Err(_) => {
                    for worker in self.pool.worker_ids() {
                        if self.is_worker_terminated(&worker) {
                            continue;
                        }
                        clog_warn!(
                            scope: Scope::Team(self.id),
                            "worker {} missed the shutdown window",
                            worker.short()
                        );
                        let held = self.pool.force_terminate(&worker).await?;
                        if let Some(task) = held {
                            let outcome = self.unresponsive_outcome(&worker);
                            self.record_if_open(task, outcome, vec![]).await?;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// React to one bus notification during teardown.
    async fn handle_teardown_notification(&mut self, note: Notification) -> Result<()> {
        let worker = match note.sender {
            Recipient::Worker(id) => Some(id),
            Recipient::Coordinator => None,
        };
        if let Some(worker) = &worker {
            self.pool.record_seen(worker);
        }
        match note.kind {
            NotificationKind::ShutdownAck => {
                if let Some(worker) = &worker {
                    let _ = self.pool.handle_ack(worker);
                }
            }
            NotificationKind::ShutdownReject => {
                // The worker is mid-unit; the request is re-issued once
                // that unit's completion or failure arrives.
                if let Some(worker) = &worker {
                    clog_debug!(
                        scope: Scope::Team(self.id),
                        "worker {} rejected shutdown ({})",
                        worker.short(),
                        note.summary
                    );
                }
            }
            NotificationKind::Completion | NotificationKind::Failure => {
                let (worker, task) = match (worker, note.task) {
                    (Some(worker), Some(task)) => (worker, task),
                    _ => return Ok(()),
                };
                let _ = self.pool.release(&worker);
                let outcome = if note.kind == NotificationKind::Completion {
                    Outcome::Succeeded
                } else {
                    Outcome::failed(&note.summary)
                };
                self.record_if_open(task, outcome, note.artifact_refs).await?;
                if self.pool.should_retry_shutdown(&worker) {
                    self.pool.request_shutdown(&worker).await?;
                } else {
                    let held = self.pool.force_terminate(&worker).await?;
                    if let Some(task) = held {
                        let outcome = self.unresponsive_outcome(&worker);
                        self.record_if_open(task, outcome, vec![]).await?;
                    }
                }
            }
            NotificationKind::Heartbeat
            | NotificationKind::Skip
            | NotificationKind::ShutdownRequest => {}
        }
        Ok(())
    }

    /// Record a terminal outcome unless the task is already terminal.
    ///
    /// A late report for a task the supervisor already recorded (e.g. as
    /// unresponsive) is dropped rather than treated as a transition error.
    async fn record_if_open(
        &mut self,
        task: TaskId,
        outcome: Outcome,
        artifacts: Vec<ArtifactKey>,
    ) -> Result<()> {
        let open = {
            let graph = self.graph.read().await;
            graph.task(&task).map(|t| !t.is_terminal()).unwrap_or(false)
        };
        if open {
            self.scheduler.handle_report(task, outcome, artifacts).await?;
        }
        Ok(())
    }

    async fn spawn_workers(&mut self) -> Result<()> {
        let task_count = self.graph.read().await.len();
        let count = self.config.max_workers.min(task_count);
        for _ in 0..count {
            self.spawn_one()?;
        }
        clog_debug!(scope: Scope::Team(self.id), "spawned {} workers", count);
        Ok(())
    }

    /// The recorded reason for a task abandoned by a worker the
    /// supervisor had to force-terminate.
    fn unresponsive_outcome(&self, worker: &WorkerId) -> Outcome {
        Outcome::failed(
            Error::WorkerUnresponsive {
                worker: *worker,
                window_secs: self.config.heartbeat_timeout_secs,
            }
            .to_string(),
        )
    }

    fn spawn_one(&mut self) -> Result<WorkerId> {
        self.pool.spawn(
            self.bus.clone(),
            self.executor.clone(),
            self.store.clone(),
            self.cancel.clone(),
            self.config.heartbeat_interval(),
        )
    }

    fn is_worker_terminated(&self, worker: &WorkerId) -> bool {
        self.pool
            .get(worker)
            .map(|handle| handle.is_terminated())
            .unwrap_or(true)
    }

    async fn build_manifest(&self) -> TeamManifest {
        let graph = self.graph.read().await;
        let tasks = graph
            .tasks()
            .iter()
            .map(|task| TaskReport {
                id: task.id,
                subject: task.subject.clone(),
                status: task.status.clone(),
                owner: task.owner,
                artifacts: self.scheduler.outputs_of(&task.id).to_vec(),
            })
            .collect();
        TeamManifest {
            team: TeamDescriptor {
                id: self.id,
                created_at: self.created_at,
                status: TeamStatus::Terminated,
            },
            terminated_at: self.terminated_at,
            tasks,
        }
    }
}
