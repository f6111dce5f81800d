use thiserror::Error;

use crate::core::task::TaskId;
use crate::core::team::TeamId;
use crate::orchestration::worker::WorkerId;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("No home directory")]
    NoHomeDir,

    #[error("Unknown task: {0}")]
    UnknownTask(TaskId),

    #[error("Unknown dependency {dep} for task \"{subject}\"")]
    UnknownDependency { subject: String, dep: TaskId },

    #[error("Duplicate dependency {dep} for task \"{subject}\"")]
    DuplicateDependency { subject: String, dep: TaskId },

    #[error("Invalid transition for task {task}: {from} -> {to}")]
    InvalidTransition {
        task: TaskId,
        from: String,
        to: String,
    },

    #[error("Notification payload is {size} bytes (cap: {cap})")]
    PayloadTooLarge { size: usize, cap: usize },

    #[error("Recipient not registered: {0}")]
    UnknownRecipient(String),

    #[error("Artifact already exists: {0}")]
    ArtifactExists(String),

    #[error("Artifact not found: {0}")]
    ArtifactNotFound(String),

    #[error("Worker pool is full (max: {max})")]
    PoolExhausted { max: usize },

    #[error("Worker not found: {0}")]
    UnknownWorker(WorkerId),

    #[error("Worker {0} is not idle")]
    WorkerNotIdle(WorkerId),

    #[error("worker {worker} unresponsive: no signal within {window_secs}s")]
    WorkerUnresponsive { worker: WorkerId, window_secs: u64 },

    #[error("Team already terminated: {0}")]
    TeamTerminated(TeamId),

    #[error("Plan error: {0}")]
    Plan(String),
}

pub type Result<T> = std::result::Result<T, Error>;
