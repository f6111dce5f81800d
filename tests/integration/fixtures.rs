//! Test fixtures for integration tests.
//!
//! Provides a scripted executor that records every assignment it
//! receives, plus small helpers for reading manifests. Scripts map task
//! subjects to behaviors, so tests can fail, delay, or hang individual
//! tasks while the rest of the team proceeds.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;

use crew::artifact::{ArtifactDocument, ArtifactKey, ArtifactStore};
use crew::orchestration::{
    Assignment, ExecutionReport, FnExecutor, TaskExecutor, TeamManifest,
};
use crew::{Config, Outcome, TaskId, TaskStatus};

/// Every assignment handed to the scripted executor, in arrival order.
pub type Recorder = Arc<Mutex<Vec<Assignment>>>;

/// What the scripted executor does with one task, keyed by subject.
#[derive(Debug, Clone, Copy)]
pub enum Behavior {
    /// Write an output artifact and report success.
    Succeed,
    /// Sleep, then succeed. Used to force interleavings.
    SucceedAfter(Duration),
    /// Report failure with the given reason.
    Fail(&'static str),
    /// Never return. Used to simulate a wedged worker.
    Hang,
}

/// Config with short timeouts so failure paths resolve quickly.
pub fn quick_config() -> Config {
    Config {
        max_workers: 2,
        shutdown_retry_limit: 3,
        heartbeat_timeout_secs: 5,
        heartbeat_interval_secs: 1,
        ..Default::default()
    }
}

/// Config in which workers never heartbeat, so an executing worker
/// looks silent and trips the staleness sweep.
pub fn silent_worker_config(max_workers: usize) -> Config {
    Config {
        max_workers,
        shutdown_retry_limit: 3,
        heartbeat_timeout_secs: 1,
        heartbeat_interval_secs: 3600,
        ..Default::default()
    }
}

/// Build an executor that follows the given script and records every
/// assignment it receives. Unscripted subjects succeed.
pub fn scripted_executor(
    script: HashMap<&'static str, Behavior>,
) -> (Arc<dyn TaskExecutor>, Recorder) {
    let recorder: Recorder = Arc::new(Mutex::new(Vec::new()));
    let log = recorder.clone();
    let script = Arc::new(script);

    let executor = FnExecutor::new(move |assignment, store| {
        let script = script.clone();
        let log = log.clone();
        Box::pin(async move {
            log.lock().unwrap().push(assignment.clone());
            let behavior = script
                .get(assignment.task.subject.as_str())
                .copied()
                .unwrap_or(Behavior::Succeed);
            match behavior {
                Behavior::Succeed => write_output(&assignment, &store),
                Behavior::SucceedAfter(delay) => {
                    tokio::time::sleep(delay).await;
                    write_output(&assignment, &store)
                }
                Behavior::Fail(reason) => ExecutionReport::failed(reason),
                Behavior::Hang => {
                    futures::future::pending::<()>().await;
                    unreachable!("pending future resolved")
                }
            }
        })
    });
    (Arc::new(executor), recorder)
}

/// Executor where every task succeeds and writes one artifact.
pub fn succeeding_executor() -> (Arc<dyn TaskExecutor>, Recorder) {
    scripted_executor(HashMap::new())
}

fn write_output(assignment: &Assignment, store: &Arc<dyn ArtifactStore>) -> ExecutionReport {
    let key = ArtifactKey::new(assignment.team, assignment.task.id, "out.json");
    let doc = ArtifactDocument::new(
        "test-output",
        assignment.task.id,
        vec![json!({"subject": assignment.task.subject})],
    );
    match doc
        .to_bytes()
        .and_then(|bytes| store.put(&key, "application/json", &bytes))
    {
        Ok(_) => ExecutionReport::succeeded("done").with_artifacts(vec![key]),
        Err(err) => ExecutionReport::failed(&err.to_string()),
    }
}

/// The assignments recorded for one task.
pub fn assignments_for(recorder: &Recorder, task: &TaskId) -> Vec<Assignment> {
    recorder
        .lock()
        .unwrap()
        .iter()
        .filter(|assignment| assignment.task.id == *task)
        .cloned()
        .collect()
}

/// The final status of one task in a manifest.
pub fn status_of(manifest: &TeamManifest, task: &TaskId) -> TaskStatus {
    manifest
        .task(task)
        .unwrap_or_else(|| panic!("task {} missing from manifest", task))
        .status
        .clone()
}

/// The skip reason recorded for a task; panics if it was not skipped.
pub fn skip_reason(manifest: &TeamManifest, task: &TaskId) -> String {
    match status_of(manifest, task) {
        TaskStatus::Finished(Outcome::Skipped { reason }) => reason,
        other => panic!("expected task {} skipped, got {}", task, other),
    }
}

/// The failure reason recorded for a task; panics if it did not fail.
pub fn failure_reason(manifest: &TeamManifest, task: &TaskId) -> String {
    match status_of(manifest, task) {
        TaskStatus::Finished(Outcome::Failed { reason }) => reason,
        other => panic!("expected task {} failed, got {}", task, other),
    }
}

/// Check that a task succeeded.
pub fn succeeded(manifest: &TeamManifest, task: &TaskId) -> bool {
    status_of(manifest, task) == TaskStatus::Finished(Outcome::Succeeded)
}
