//! The executor seam: the opaque work a worker runs.
//!
//! The engine does not know what a task computes. It hands the executor
//! an [`Assignment`] (the task record, a partial-input flag, and the
//! artifact refs of its dependencies) plus the artifact store, and
//! expects exactly one [`ExecutionReport`] back. Retry policy, if any,
//! is the executor's own concern before it reports a terminal outcome.

use futures::future::BoxFuture;
use serde_json::json;
use std::sync::Arc;

use crate::artifact::{ArtifactDocument, ArtifactKey, ArtifactStore};
use crate::core::task::TaskRecord;
use crate::core::team::TeamId;

/// One unit of work handed to a worker's executor.
#[derive(Debug, Clone)]
pub struct Assignment {
    /// The team the task belongs to; artifact keys are scoped by it.
    pub team: TeamId,
    /// External view of the task, including its dependency kinds.
    pub task: TaskRecord,
    /// True when at least one optional dependency finished without
    /// succeeding, so some advisory inputs are missing.
    pub partial_input: bool,
    /// Artifacts produced by the task's succeeded dependencies.
    pub inputs: Vec<ArtifactKey>,
}

/// Terminal result of one executed assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Succeeded { summary: String },
    Failed { reason: String },
}

/// What an executor reports back. Exactly one per assignment.
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub outcome: ExecutionOutcome,
    /// Artifacts the executor wrote under the task's namespace.
    pub artifacts: Vec<ArtifactKey>,
}

impl ExecutionReport {
    /// Successful report with a short summary.
    pub fn succeeded(summary: &str) -> Self {
        Self {
            outcome: ExecutionOutcome::Succeeded {
                summary: summary.to_string(),
            },
            artifacts: Vec::new(),
        }
    }

    /// Failed report with a reason.
    pub fn failed(reason: &str) -> Self {
        Self {
            outcome: ExecutionOutcome::Failed {
                reason: reason.to_string(),
            },
            artifacts: Vec::new(),
        }
    }

    /// Attach produced artifact refs to the report.
    pub fn with_artifacts(mut self, artifacts: Vec<ArtifactKey>) -> Self {
        self.artifacts = artifacts;
        self
    }
}

/// Opaque task logic driven by a worker.
pub trait TaskExecutor: Send + Sync {
    /// Execute one assignment. The future runs outside every engine lock.
    fn execute(
        &self,
        assignment: Assignment,
        store: Arc<dyn ArtifactStore>,
    ) -> BoxFuture<'static, ExecutionReport>;
}

type ExecutorFn =
    dyn Fn(Assignment, Arc<dyn ArtifactStore>) -> BoxFuture<'static, ExecutionReport> + Send + Sync;

/// Closure-backed executor for tests and embedding.
pub struct FnExecutor {
    f: Box<ExecutorFn>,
}

impl FnExecutor {
    /// Wrap a closure returning a boxed execution future.
    pub fn new(
        f: impl Fn(Assignment, Arc<dyn ArtifactStore>) -> BoxFuture<'static, ExecutionReport>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self { f: Box::new(f) }
    }
}

impl TaskExecutor for FnExecutor {
    fn execute(
        &self,
        assignment: Assignment,
        store: Arc<dyn ArtifactStore>,
    ) -> BoxFuture<'static, ExecutionReport> {
        (self.f)(assignment, store)
    }
}

/// Executor that runs the task description as a shell command.
///
/// Stdout is captured into a `stdout.json` artifact under the task's
/// namespace; the exit code decides the outcome.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellExecutor;

impl ShellExecutor {
    /// Create a new shell executor.
    pub fn new() -> Self {
        Self
    }
}

impl TaskExecutor for ShellExecutor {
    fn execute(
        &self,
        assignment: Assignment,
        store: Arc<dyn ArtifactStore>,
    ) -> BoxFuture<'static, ExecutionReport> {
        Box::pin(async move {
            let command = assignment.task.description.clone();
            let output = tokio::process::Command::new("sh")
                .arg("-c")
                .arg(&command)
                .output()
                .await;

            let output = match output {
                Ok(output) => output,
                Err(err) => return ExecutionReport::failed(&format!("spawn failed: {}", err)),
            };

            if !output.status.success() {
                let code = output
                    .status
                    .code()
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "signal".to_string());
                let stderr = clip(&String::from_utf8_lossy(&output.stderr), 512);
                return ExecutionReport::failed(&format!("exit code {}: {}", code, stderr));
            }

            let key = ArtifactKey::new(assignment.team, assignment.task.id, "stdout.json");
            let doc = ArtifactDocument::new(
                "process-output",
                assignment.task.id,
                vec![json!({
                    "stream": "stdout",
                    "text": String::from_utf8_lossy(&output.stdout),
                })],
            );
            let written = doc
                .to_bytes()
                .and_then(|bytes| store.put(&key, "application/json", &bytes));
            match written {
                Ok(_) => ExecutionReport::succeeded("exit code 0").with_artifacts(vec![key]),
                Err(err) => ExecutionReport::failed(&format!("artifact write failed: {}", err)),
            }
        })
    }
}

/// Truncate a string to at most `max` bytes on a char boundary.
fn clip(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.trim_end().to_string();
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}
