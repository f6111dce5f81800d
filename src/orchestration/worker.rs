//! Worker runtime: the tokio task that drives an executor.
//!
//! Each worker owns a command channel and loops over it: an `Assign`
//! command runs the executor to completion while emitting heartbeats,
//! a `ShutdownRequest` is acknowledged when idle and rejected with a
//! reason while a unit of work is in flight, and `ForceTerminate` ends
//! the loop unconditionally. Every terminal outcome is reported to the
//! coordinator as exactly one completion or failure notification.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::artifact::ArtifactStore;
use crate::bus::{Notification, NotificationBus, Recipient};
use crate::clog_debug;
use crate::core::task::TaskId;
use crate::log::Scope;
use crate::orchestration::executor::{Assignment, ExecutionOutcome, TaskExecutor};

/// Capacity of each worker's command channel.
const COMMAND_CAPACITY: usize = 16;

/// Unique identifier for a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(pub Uuid);

impl WorkerId {
    /// Create a new unique worker identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Return first 8 characters of the UUID for display.
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for WorkerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Worker lifecycle status, tracked by the supervisor.
///
/// `idle -> active` on assignment, `active -> idle` on a reported
/// outcome, `idle -> shutdown-requested` on a coordinator request,
/// `shutdown-requested -> terminated` on acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum WorkerStatus {
    Idle,
    Active { task: TaskId },
    ShutdownRequested,
    Terminated,
}

impl std::fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerStatus::Idle => write!(f, "idle"),
            WorkerStatus::Active { task } => write!(f, "active ({})", task.short()),
            WorkerStatus::ShutdownRequested => write!(f, "shutdown-requested"),
            WorkerStatus::Terminated => write!(f, "terminated"),
        }
    }
}

/// Commands the supervisor sends to a worker.
#[derive(Debug)]
pub enum WorkerCommand {
    /// Run one unit of work.
    Assign(Assignment),
    /// Wind down; acknowledged when idle, rejected mid-unit.
    ShutdownRequest,
    /// Stop immediately without a handshake.
    ForceTerminate,
}

/// Spawn a worker task, returning its command channel and join handle.
pub fn spawn_worker(
    id: WorkerId,
    bus: Arc<NotificationBus>,
    executor: Arc<dyn TaskExecutor>,
    store: Arc<dyn ArtifactStore>,
    cancel: CancellationToken,
    heartbeat_interval: Duration,
) -> (mpsc::Sender<WorkerCommand>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(COMMAND_CAPACITY);
    let handle = tokio::spawn(worker_loop(
        id,
        rx,
        bus,
        executor,
        store,
        cancel,
        heartbeat_interval,
    ));
    (tx, handle)
}

enum Flow {
    Continue,
    Stop,
}

async fn worker_loop(
    id: WorkerId,
    mut rx: mpsc::Receiver<WorkerCommand>,
    bus: Arc<NotificationBus>,
    executor: Arc<dyn TaskExecutor>,
    store: Arc<dyn ArtifactStore>,
    cancel: CancellationToken,
    heartbeat_interval: Duration,
) {
    clog_debug!(scope: Scope::Worker(id), "started");
    while let Some(command) = rx.recv().await {
        match command {
            WorkerCommand::Assign(assignment) => {
                let flow = run_assignment(
                    id,
                    assignment,
                    &mut rx,
                    &bus,
                    &executor,
                    &store,
                    &cancel,
                    heartbeat_interval,
                )
                .await;
                if matches!(flow, Flow::Stop) {
                    break;
                }
            }
            WorkerCommand::ShutdownRequest => {
                let _ = bus
                    .send(Recipient::Coordinator, Notification::shutdown_ack(id))
                    .await;
                break;
            }
            WorkerCommand::ForceTerminate => break,
        }
    }
    clog_debug!(scope: Scope::Worker(id), "stopped");
}

/// Drive one assignment to its terminal report.
///
/// The executor future is polled alongside the heartbeat ticker, the
/// team cancellation token, and the command channel, so a shutdown
/// request arriving mid-unit gets a reject-with-reason instead of
/// silence.
#[allow(clippy::too_many_arguments)]
async fn run_assignment(
    id: WorkerId,
    assignment: Assignment,
    rx: &mut mpsc::Receiver<WorkerCommand>,
    bus: &Arc<NotificationBus>,
    executor: &Arc<dyn TaskExecutor>,
    store: &Arc<dyn ArtifactStore>,
    cancel: &CancellationToken,
    heartbeat_interval: Duration,
) -> Flow {
    let me = Recipient::Worker(id);
    let task_id = assignment.task.id;
    let cap = bus.payload_cap();
    let mut exec = executor.execute(assignment, store.clone());
    let mut ticker = tokio::time::interval(heartbeat_interval);

    loop {
        tokio::select! {
            report = &mut exec => {
                let note = match report.outcome {
                    ExecutionOutcome::Succeeded { summary } => Notification::completion(
                        me,
                        task_id,
                        &bounded(&summary, cap),
                        report.artifacts,
                    ),
                    ExecutionOutcome::Failed { reason } => {
                        Notification::failure(me, task_id, &bounded(&reason, cap))
                    }
                };
                let _ = bus.send(Recipient::Coordinator, note).await;
                return Flow::Continue;
            }
            _ = ticker.tick() => {
                let _ = bus
                    .send(Recipient::Coordinator, Notification::heartbeat(id, Some(task_id)))
                    .await;
            }
            _ = cancel.cancelled() => {
                let _ = bus
                    .send(Recipient::Coordinator, Notification::failure(me, task_id, "aborted"))
                    .await;
                return Flow::Continue;
            }
            command = rx.recv() => match command {
                Some(WorkerCommand::ShutdownRequest) => {
                    let reason = format!("executing task {}", task_id.short());
                    let _ = bus
                        .send(Recipient::Coordinator, Notification::shutdown_reject(id, &reason))
                        .await;
                }
                Some(WorkerCommand::ForceTerminate) | None => return Flow::Stop,
                Some(WorkerCommand::Assign(other)) => {
                    // A worker holds at most one task; this is a supervisor bug.
                    let _ = bus
                        .send(
                            Recipient::Coordinator,
                            Notification::failure(
                                me,
                                other.task.id,
                                "worker already executing another task",
                            ),
                        )
                        .await;
                }
            }
        }
    }
}

/// Truncate a summary to the bus payload cap on a char boundary.
fn bounded(s: &str, cap: usize) -> String {
    if s.len() <= cap {
        return s.to_string();
    }
    let mut end = cap;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}
