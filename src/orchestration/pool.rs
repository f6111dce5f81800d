//! Worker pool supervision.
//!
//! The `WorkerPool` owns the bounded set of workers for one team: it
//! spawns them, routes assignments, tracks the last signal seen from
//! each worker, and drives the graceful shutdown handshake with its
//! bounded retry policy.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::artifact::ArtifactStore;
use crate::bus::NotificationBus;
use crate::clog_debug;
use crate::core::task::TaskId;
use crate::error::{Error, Result};
use crate::log::Scope;
use crate::orchestration::executor::{Assignment, TaskExecutor};
use crate::orchestration::worker::{self, WorkerCommand, WorkerId, WorkerStatus};

/// Supervisor-side handle to one worker.
#[derive(Debug)]
pub struct WorkerHandle {
    /// Unique identifier for this worker.
    pub id: WorkerId,
    /// Current lifecycle status.
    pub status: WorkerStatus,
    /// When any signal (assignment reply, heartbeat, handshake reply)
    /// was last seen from this worker.
    pub last_seen: Instant,
    /// How many shutdown requests have been issued to this worker.
    pub shutdown_attempts: u32,
    cmd_tx: mpsc::Sender<WorkerCommand>,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    /// The task the worker currently holds, if any.
    pub fn task(&self) -> Option<TaskId> {
        match self.status {
            WorkerStatus::Active { task } => Some(task),
            _ => None,
        }
    }

    /// Check if the worker has terminated.
    pub fn is_terminated(&self) -> bool {
        matches!(self.status, WorkerStatus::Terminated)
    }
}

/// Manages the bounded pool of workers for one team.
pub struct WorkerPool {
    /// Workers indexed by their ID.
    workers: HashMap<WorkerId, WorkerHandle>,
    /// Maximum number of concurrent workers allowed.
    max_workers: usize,
    /// Shutdown re-issues allowed before force termination.
    shutdown_retry_limit: u32,
}

impl WorkerPool {
    /// Create a new pool with the given capacity and shutdown retry bound.
    pub fn new(max_workers: usize, shutdown_retry_limit: u32) -> Self {
        Self {
            workers: HashMap::new(),
            max_workers,
            shutdown_retry_limit,
        }
    }

    /// Spawn a new idle worker.
    ///
    /// # Errors
    /// `PoolExhausted` if the pool already holds `max_workers` live
    /// (non-terminated) workers.
    pub fn spawn(
        &mut self,
        bus: Arc<NotificationBus>,
        executor: Arc<dyn TaskExecutor>,
        store: Arc<dyn ArtifactStore>,
        cancel: CancellationToken,
        heartbeat_interval: Duration,
    ) -> Result<WorkerId> {
        if self.live_count() >= self.max_workers {
            return Err(Error::PoolExhausted {
                max: self.max_workers,
            });
        }
        let id = WorkerId::new();
        let (cmd_tx, join) =
            worker::spawn_worker(id, bus, executor, store, cancel, heartbeat_interval);
        self.workers.insert(
            id,
            WorkerHandle {
                id,
                status: WorkerStatus::Idle,
                last_seen: Instant::now(),
                shutdown_attempts: 0,
                cmd_tx,
                join,
            },
        );
        clog_debug!(scope: Scope::Worker(id), "spawned into the pool");
        Ok(id)
    }

    /// Hand an assignment to an idle worker.
    ///
    /// # Errors
    /// - `UnknownWorker` if the id is not in the pool or the worker died
    /// - `WorkerNotIdle` if the worker is not idle
    pub async fn assign(&mut self, id: &WorkerId, assignment: Assignment) -> Result<()> {
        let handle = self.handle_mut(id)?;
        if handle.status != WorkerStatus::Idle {
            return Err(Error::WorkerNotIdle(*id));
        }
        let task = assignment.task.id;
        if handle
            .cmd_tx
            .send(WorkerCommand::Assign(assignment))
            .await
            .is_err()
        {
            return Err(Error::UnknownWorker(*id));
        }
        handle.status = WorkerStatus::Active { task };
        handle.last_seen = Instant::now();
        Ok(())
    }

    /// Return a worker to idle after it reported a terminal outcome.
    pub fn release(&mut self, id: &WorkerId) -> Result<()> {
        let handle = self.handle_mut(id)?;
        if !handle.is_terminated() {
            handle.status = WorkerStatus::Idle;
        }
        handle.last_seen = Instant::now();
        Ok(())
    }

    /// Refresh the last-seen instant for a worker, if present.
    pub fn record_seen(&mut self, id: &WorkerId) {
        if let Some(handle) = self.workers.get_mut(id) {
            handle.last_seen = Instant::now();
        }
    }

    /// Issue (or re-issue) a shutdown request to a worker.
    ///
    /// Each call counts against the retry bound. The worker replies on
    /// the bus with an ack or a reject-with-reason.
    pub async fn request_shutdown(&mut self, id: &WorkerId) -> Result<()> {
        let handle = self.handle_mut(id)?;
        if handle.is_terminated() {
            return Ok(());
        }
        handle.shutdown_attempts += 1;
        if matches!(handle.status, WorkerStatus::Idle) {
            handle.status = WorkerStatus::ShutdownRequested;
        }
        if handle
            .cmd_tx
            .send(WorkerCommand::ShutdownRequest)
            .await
            .is_err()
        {
            // The worker loop is already gone; treat as acknowledged.
            handle.status = WorkerStatus::Terminated;
        }
        Ok(())
    }

    /// Record a worker's shutdown acknowledgement.
    pub fn handle_ack(&mut self, id: &WorkerId) -> Result<()> {
        let handle = self.handle_mut(id)?;
        handle.status = WorkerStatus::Terminated;
        handle.last_seen = Instant::now();
        Ok(())
    }

    /// Check whether another shutdown re-issue is within the bound.
    pub fn should_retry_shutdown(&self, id: &WorkerId) -> bool {
        self.workers
            .get(id)
            .map(|handle| handle.shutdown_attempts < self.shutdown_retry_limit)
            .unwrap_or(false)
    }

    /// Terminate a worker without a handshake.
    ///
    /// Returns the task the worker held, so the caller can record a
    /// failure for it.
    pub async fn force_terminate(&mut self, id: &WorkerId) -> Result<Option<TaskId>> {
        let handle = self.handle_mut(id)?;
        let held = handle.task();
        let _ = handle.cmd_tx.try_send(WorkerCommand::ForceTerminate);
        handle.join.abort();
        handle.status = WorkerStatus::Terminated;
        clog_debug!(scope: Scope::Worker(*id), "force-terminated");
        Ok(held)
    }

    /// Idle workers in deterministic (lexical id) order.
    pub fn idle_workers(&self) -> Vec<WorkerId> {
        let mut idle: Vec<WorkerId> = self
            .workers
            .values()
            .filter(|handle| handle.status == WorkerStatus::Idle)
            .map(|handle| handle.id)
            .collect();
        idle.sort();
        idle
    }

    /// Active workers with no signal for at least `window`.
    pub fn stale_workers(&self, window: Duration) -> Vec<WorkerId> {
        let mut stale: Vec<WorkerId> = self
            .workers
            .values()
            .filter(|handle| {
                matches!(handle.status, WorkerStatus::Active { .. })
                    && handle.last_seen.elapsed() >= window
            })
            .map(|handle| handle.id)
            .collect();
        stale.sort();
        stale
    }

    /// All worker ids in lexical order.
    pub fn worker_ids(&self) -> Vec<WorkerId> {
        let mut ids: Vec<WorkerId> = self.workers.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Get a worker handle by ID.
    pub fn get(&self, id: &WorkerId) -> Option<&WorkerHandle> {
        self.workers.get(id)
    }

    /// The task a worker currently holds, if any.
    pub fn task_of(&self, id: &WorkerId) -> Option<TaskId> {
        self.workers.get(id).and_then(|handle| handle.task())
    }

    /// Number of workers currently executing.
    pub fn active_count(&self) -> usize {
        self.workers
            .values()
            .filter(|handle| matches!(handle.status, WorkerStatus::Active { .. }))
            .count()
    }

    /// Number of workers not yet terminated.
    pub fn live_count(&self) -> usize {
        self.workers
            .values()
            .filter(|handle| !handle.is_terminated())
            .count()
    }

    /// Total workers ever spawned into the pool.
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    /// Check if the pool has no workers.
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Check if every worker has terminated.
    pub fn all_terminated(&self) -> bool {
        self.workers.values().all(|handle| handle.is_terminated())
    }

    /// Maximum concurrent workers allowed.
    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    fn handle_mut(&mut self, id: &WorkerId) -> Result<&mut WorkerHandle> {
        self.workers.get_mut(id).ok_or(Error::UnknownWorker(*id))
    }
}
