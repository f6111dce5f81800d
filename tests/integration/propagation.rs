//! Failure propagation through the dependency matrix.
//!
//! These tests drive whole teams end to end and verify the
//! required/optional rules: a failed required dependency skips its
//! dependents without running them, failed optional dependencies only
//! set the partial-input flag, and skips cascade downstream.

use std::collections::HashMap;
use std::sync::Arc;

use crew::artifact::MemoryArtifactStore;
use crew::orchestration::TeamCoordinator;
use crew::DependencyKind;

use crate::fixtures::{
    assignments_for, quick_config, scripted_executor, skip_reason, status_of, succeeded,
    Behavior,
};

/// Given `A`, `B` required-on `A`, `C` optional-on `A`, when `A` fails:
/// `B` is skipped and `C` still runs, flagged partial-input.
#[tokio::test]
async fn test_failed_required_skips_optional_still_runs() {
    let (executor, recorder) =
        scripted_executor(HashMap::from([("a", Behavior::Fail("broken input"))]));
    let store = Arc::new(MemoryArtifactStore::new());
    let mut coordinator = TeamCoordinator::new(&quick_config(), executor, store);

    let a = coordinator.add_task("a", "produce", &[]).await.unwrap();
    let b = coordinator
        .add_task("b", "consume", &[(a, DependencyKind::Required)])
        .await
        .unwrap();
    let c = coordinator
        .add_task("c", "enrich", &[(a, DependencyKind::Optional)])
        .await
        .unwrap();

    let manifest = coordinator.run().await.unwrap();

    assert_eq!(
        skip_reason(&manifest, &b),
        format!("required dependency failed: {}", a)
    );
    assert!(succeeded(&manifest, &c));

    // b never reached a worker; c did, with the partial-input flag and
    // no inputs, since its only dependency produced nothing.
    assert!(assignments_for(&recorder, &b).is_empty());
    let c_runs = assignments_for(&recorder, &c);
    assert_eq!(c_runs.len(), 1);
    assert!(c_runs[0].partial_input);
    assert!(c_runs[0].inputs.is_empty());
}

/// A skip is terminal and propagates: a chain below a failure is
/// skipped link by link, each naming its own reason.
#[tokio::test]
async fn test_skip_cascades_down_a_chain() {
    let (executor, recorder) =
        scripted_executor(HashMap::from([("a", Behavior::Fail("boom"))]));
    let store = Arc::new(MemoryArtifactStore::new());
    let mut coordinator = TeamCoordinator::new(&quick_config(), executor, store);

    let a = coordinator.add_task("a", "first", &[]).await.unwrap();
    let b = coordinator
        .add_task("b", "second", &[(a, DependencyKind::Required)])
        .await
        .unwrap();
    let c = coordinator
        .add_task("c", "third", &[(b, DependencyKind::Required)])
        .await
        .unwrap();

    let manifest = coordinator.run().await.unwrap();

    assert_eq!(
        skip_reason(&manifest, &b),
        format!("required dependency failed: {}", a)
    );
    assert_eq!(
        skip_reason(&manifest, &c),
        format!("required dependency skipped: {}", b)
    );
    assert!(assignments_for(&recorder, &b).is_empty());
    assert!(assignments_for(&recorder, &c).is_empty());
}

/// A task whose declared dependencies are all optional is never
/// auto-skipped, however many of them fail.
#[tokio::test]
async fn test_zero_required_dependencies_always_runs() {
    let (executor, recorder) = scripted_executor(HashMap::from([
        ("a", Behavior::Fail("down")),
        ("b", Behavior::Fail("also down")),
    ]));
    let store = Arc::new(MemoryArtifactStore::new());
    let mut coordinator = TeamCoordinator::new(&quick_config(), executor, store);

    let a = coordinator.add_task("a", "feed one", &[]).await.unwrap();
    let b = coordinator.add_task("b", "feed two", &[]).await.unwrap();
    let c = coordinator
        .add_task(
            "c",
            "best effort",
            &[(a, DependencyKind::Optional), (b, DependencyKind::Optional)],
        )
        .await
        .unwrap();

    let manifest = coordinator.run().await.unwrap();

    assert!(succeeded(&manifest, &c));
    let c_runs = assignments_for(&recorder, &c);
    assert_eq!(c_runs.len(), 1);
    assert!(c_runs[0].partial_input);
}

/// Safety: a task never starts before every required dependency has
/// succeeded, and its assignment carries the dependency's artifacts.
#[tokio::test]
async fn test_execution_waits_for_required_success() {
    let (executor, recorder) = scripted_executor(HashMap::from([(
        "a",
        Behavior::SucceedAfter(std::time::Duration::from_millis(50)),
    )]));
    let store = Arc::new(MemoryArtifactStore::new());
    let mut coordinator = TeamCoordinator::new(&quick_config(), executor, store);

    let a = coordinator.add_task("a", "slow", &[]).await.unwrap();
    let b = coordinator
        .add_task("b", "downstream", &[(a, DependencyKind::Required)])
        .await
        .unwrap();

    let manifest = coordinator.run().await.unwrap();

    assert!(manifest.fully_succeeded());
    let order: Vec<_> = recorder
        .lock()
        .unwrap()
        .iter()
        .map(|assignment| assignment.task.id)
        .collect();
    assert_eq!(order, vec![a, b]);

    let b_runs = assignments_for(&recorder, &b);
    assert!(!b_runs[0].partial_input);
    assert_eq!(b_runs[0].inputs.len(), 1);
    assert_eq!(b_runs[0].inputs[0].producer, a);
}

/// Mixed kinds on one task: the failed optional edge alone leaves it
/// pending; the failed required edge then dooms it.
#[tokio::test]
async fn test_required_failure_wins_over_optional() {
    let (executor, _recorder) = scripted_executor(HashMap::from([
        ("required-feed", Behavior::Fail("primary down")),
        ("optional-feed", Behavior::Fail("advisory down")),
    ]));
    let store = Arc::new(MemoryArtifactStore::new());
    let mut coordinator = TeamCoordinator::new(&quick_config(), executor, store);

    let req = coordinator
        .add_task("required-feed", "must have", &[])
        .await
        .unwrap();
    let opt = coordinator
        .add_task("optional-feed", "nice to have", &[])
        .await
        .unwrap();
    let sink = coordinator
        .add_task(
            "sink",
            "combine",
            &[
                (req, DependencyKind::Required),
                (opt, DependencyKind::Optional),
            ],
        )
        .await
        .unwrap();

    let manifest = coordinator.run().await.unwrap();

    assert_eq!(
        skip_reason(&manifest, &sink),
        format!("required dependency failed: {}", req)
    );
    assert!(matches!(
        status_of(&manifest, &opt),
        crew::TaskStatus::Finished(crew::Outcome::Failed { .. })
    ));
}
