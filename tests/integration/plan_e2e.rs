//! End-to-end plan execution through the shell executor.
//!
//! These tests drive the same path the CLI takes: parse a JSON plan,
//! register it into a team running `ShellExecutor` over a filesystem
//! artifact store, and inspect the manifest and the artifacts on disk.

use std::sync::Arc;

use tempfile::TempDir;

use crew::artifact::{ArtifactDocument, ArtifactStore, FsArtifactStore};
use crew::orchestration::{ShellExecutor, TeamCoordinator};
use crew::plan::TeamPlan;
use crew::Error;

use crate::fixtures::{quick_config, skip_reason, succeeded};

fn fs_store() -> (TempDir, Arc<FsArtifactStore>) {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(FsArtifactStore::new(dir.path()).unwrap());
    (dir, store)
}

#[tokio::test]
async fn test_shell_plan_end_to_end() {
    let plan = TeamPlan::from_json(
        r#"{
            "name": "pipeline",
            "tasks": [
                {"name": "greet", "command": "echo hello"},
                {"name": "check", "command": "test -n ok",
                 "depends_on": [{"task": "greet"}]}
            ]
        }"#,
    )
    .unwrap();
    plan.validate().unwrap();

    let (_dir, store) = fs_store();
    let mut coordinator = TeamCoordinator::new(
        &quick_config(),
        Arc::new(ShellExecutor::new()),
        store.clone(),
    );
    let ids = plan.register(&mut coordinator).await.unwrap();

    let manifest = coordinator.run().await.unwrap();

    assert!(manifest.fully_succeeded());
    assert_eq!(manifest.tasks.len(), 2);

    // The greet task's stdout landed on disk as a structured artifact.
    let greet = manifest.task(&ids["greet"]).unwrap();
    assert_eq!(greet.artifacts.len(), 1);
    let payload = store.get(&greet.artifacts[0]).unwrap();
    let doc = ArtifactDocument::from_bytes(&payload).unwrap();
    assert_eq!(doc.doc_type, "process-output");
    assert!(doc.records[0]["text"].as_str().unwrap().contains("hello"));
    assert_eq!(doc.metadata.producer, ids["greet"]);
}

#[tokio::test]
async fn test_failing_command_skips_required_dependent() {
    let plan = TeamPlan::from_json(
        r#"{
            "tasks": [
                {"name": "boom", "command": "exit 7"},
                {"name": "after", "command": "true",
                 "depends_on": [{"task": "boom"}]},
                {"name": "anyway", "command": "true",
                 "depends_on": [{"task": "boom", "kind": "optional"}]}
            ]
        }"#,
    )
    .unwrap();

    let (_dir, store) = fs_store();
    let mut coordinator =
        TeamCoordinator::new(&quick_config(), Arc::new(ShellExecutor::new()), store);
    let ids = plan.register(&mut coordinator).await.unwrap();

    let manifest = coordinator.run().await.unwrap();

    assert!(!manifest.fully_succeeded());
    match &manifest.task(&ids["boom"]).unwrap().status {
        crew::TaskStatus::Finished(crew::Outcome::Failed { reason }) => {
            assert!(reason.contains("exit code 7"), "reason: {}", reason);
        }
        other => panic!("expected boom failed, got {}", other),
    }
    assert_eq!(
        skip_reason(&manifest, &ids["after"]),
        format!("required dependency failed: {}", ids["boom"])
    );
    assert!(succeeded(&manifest, &ids["anyway"]));
}

#[tokio::test]
async fn test_plan_cycle_rejected_before_any_execution() {
    let plan = TeamPlan::from_json(
        r#"{
            "tasks": [
                {"name": "a", "command": "true",
                 "depends_on": [{"task": "b"}]},
                {"name": "b", "command": "true",
                 "depends_on": [{"task": "a"}]}
            ]
        }"#,
    )
    .unwrap();

    assert!(matches!(plan.validate(), Err(Error::Plan(_))));

    let (_dir, store) = fs_store();
    let mut coordinator =
        TeamCoordinator::new(&quick_config(), Arc::new(ShellExecutor::new()), store);
    let result = plan.register(&mut coordinator).await;
    assert!(matches!(result, Err(Error::Plan(_))));
}

#[tokio::test]
async fn test_artifacts_namespaced_by_team() {
    let plan = TeamPlan::from_json(
        r#"{"tasks": [{"name": "solo", "command": "echo one"}]}"#,
    )
    .unwrap();

    let (_dir, store) = fs_store();
    let mut first =
        TeamCoordinator::new(&quick_config(), Arc::new(ShellExecutor::new()), store.clone());
    plan.register(&mut first).await.unwrap();
    let first_team = first.id();
    first.run().await.unwrap();

    let mut second =
        TeamCoordinator::new(&quick_config(), Arc::new(ShellExecutor::new()), store.clone());
    plan.register(&mut second).await.unwrap();
    let second_team = second.id();
    second.run().await.unwrap();

    // Each team wrote under its own namespace; neither clobbered the other.
    assert_eq!(store.list_team(&first_team).len(), 1);
    assert_eq!(store.list_team(&second_team).len(), 1);
    assert_ne!(
        store.list_team(&first_team)[0],
        store.list_team(&second_team)[0]
    );
}
