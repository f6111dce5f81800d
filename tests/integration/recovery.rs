//! Unresponsive-worker detection and replacement.
//!
//! Workers that go silent past the heartbeat window are treated as a
//! failure of whatever task they held, never as a silent hang: the task
//! is recorded failed, dependents are evaluated by the usual kind rule,
//! the worker is force-terminated, and the pool is refilled so the rest
//! of the team keeps making progress.

use std::collections::HashMap;
use std::sync::Arc;

use crew::artifact::MemoryArtifactStore;
use crew::orchestration::TeamCoordinator;
use crew::{DependencyKind, TeamStatus};

use crate::fixtures::{
    assignments_for, failure_reason, scripted_executor, silent_worker_config, skip_reason,
    succeeded, Behavior,
};

/// Scenario: the worker holding `x` goes silent past the timeout. `x`
/// is recorded failed, its required dependent is skipped, its optional
/// dependent runs with partial input, and a replacement worker finishes
/// the remaining independent task.
#[tokio::test]
async fn test_unresponsive_worker_fails_held_task() {
    let (executor, recorder) =
        scripted_executor(HashMap::from([("x", Behavior::Hang)]));
    let store = Arc::new(MemoryArtifactStore::new());
    let mut coordinator =
        TeamCoordinator::new(&silent_worker_config(1), executor, store);

    let x = coordinator.add_task("x", "wedges", &[]).await.unwrap();
    let required = coordinator
        .add_task("needs-x", "hard dependent", &[(x, DependencyKind::Required)])
        .await
        .unwrap();
    let optional = coordinator
        .add_task("wants-x", "soft dependent", &[(x, DependencyKind::Optional)])
        .await
        .unwrap();
    let other = coordinator.add_task("other", "independent", &[]).await.unwrap();

    let manifest = coordinator.run().await.unwrap();

    let reason = failure_reason(&manifest, &x);
    assert!(reason.contains("unresponsive"), "reason: {}", reason);
    assert!(reason.contains("1s"), "reason: {}", reason);
    assert_eq!(
        skip_reason(&manifest, &required),
        format!("required dependency failed: {}", x)
    );
    assert!(succeeded(&manifest, &optional));
    assert!(succeeded(&manifest, &other));
    assert_eq!(manifest.team.status, TeamStatus::Terminated);

    // The required dependent never ran; the optional one ran flagged.
    assert!(assignments_for(&recorder, &required).is_empty());
    let optional_runs = assignments_for(&recorder, &optional);
    assert_eq!(optional_runs.len(), 1);
    assert!(optional_runs[0].partial_input);
}

/// Two workers, one wedged: the healthy worker's tasks are unaffected
/// and the manifest attributes the single failure correctly.
#[tokio::test]
async fn test_healthy_workers_unaffected_by_stale_peer() {
    let (executor, _recorder) =
        scripted_executor(HashMap::from([("wedged", Behavior::Hang)]));
    let store = Arc::new(MemoryArtifactStore::new());
    let mut coordinator =
        TeamCoordinator::new(&silent_worker_config(2), executor, store);

    let wedged = coordinator.add_task("wedged", "hangs", &[]).await.unwrap();
    let mut healthy = Vec::new();
    for i in 0..3 {
        healthy.push(
            coordinator
                .add_task(&format!("fine-{}", i), "quick", &[])
                .await
                .unwrap(),
        );
    }

    let manifest = coordinator.run().await.unwrap();

    assert!(failure_reason(&manifest, &wedged).contains("unresponsive"));
    for task in &healthy {
        assert!(succeeded(&manifest, task));
    }
}
