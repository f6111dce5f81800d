//! Concurrent completion correctness.
//!
//! Two independent tasks completing at once must not corrupt the ready
//! set: the shared dependent is scheduled exactly once, completion order
//! does not change the final result, and acyclic graphs always drain.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crew::artifact::MemoryArtifactStore;
use crew::orchestration::{SchedulerEvent, TeamCoordinator};
use crew::{DependencyKind, TaskStatus};

use crate::fixtures::{
    assignments_for, quick_config, scripted_executor, succeeded, succeeding_executor, Behavior,
};

/// Independent `A` and `B`, `D` required on both, two workers. Both
/// finish concurrently; `D` is assigned to exactly one worker, once.
#[tokio::test]
async fn test_diamond_dependent_scheduled_exactly_once() {
    let (executor, recorder) = scripted_executor(HashMap::from([
        ("a", Behavior::SucceedAfter(Duration::from_millis(30))),
        ("b", Behavior::SucceedAfter(Duration::from_millis(30))),
    ]));
    let store = Arc::new(MemoryArtifactStore::new());
    let mut coordinator = TeamCoordinator::new(&quick_config(), executor, store);

    let a = coordinator.add_task("a", "left", &[]).await.unwrap();
    let b = coordinator.add_task("b", "right", &[]).await.unwrap();
    let d = coordinator
        .add_task(
            "d",
            "join",
            &[(a, DependencyKind::Required), (b, DependencyKind::Required)],
        )
        .await
        .unwrap();
    let mut events = coordinator.take_events().unwrap();

    let manifest = coordinator.run().await.unwrap();

    assert!(manifest.fully_succeeded());
    assert_eq!(assignments_for(&recorder, &d).len(), 1);

    let mut d_assignments = 0;
    let mut d_workers = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let SchedulerEvent::TaskAssigned { task, worker, .. } = event {
            if task == d {
                d_assignments += 1;
                d_workers.push(worker);
            }
        }
    }
    assert_eq!(d_assignments, 1);
    assert_eq!(d_workers.len(), 1);
}

/// Liveness: a layered graph with mixed dependency kinds drains to
/// all-terminal with fewer workers than tasks.
#[tokio::test]
async fn test_layered_graph_drains_to_terminal() {
    let (executor, _recorder) = succeeding_executor();
    let store = Arc::new(MemoryArtifactStore::new());
    let mut coordinator = TeamCoordinator::new(&quick_config(), executor, store);

    let mut previous: Vec<crew::TaskId> = Vec::new();
    for layer in 0..4 {
        let mut current = Vec::new();
        for slot in 0..3 {
            let deps: Vec<_> = previous
                .iter()
                .enumerate()
                .map(|(index, id)| {
                    let kind = if index % 2 == 0 {
                        DependencyKind::Required
                    } else {
                        DependencyKind::Optional
                    };
                    (*id, kind)
                })
                .collect();
            let id = coordinator
                .add_task(&format!("t{}-{}", layer, slot), "layer work", &deps)
                .await
                .unwrap();
            current.push(id);
        }
        previous = current;
    }

    let manifest = coordinator.run().await.unwrap();

    assert_eq!(manifest.tasks.len(), 12);
    assert!(manifest.fully_succeeded());
    assert!(manifest
        .tasks
        .iter()
        .all(|task| matches!(task.status, TaskStatus::Finished(_))));
}

/// Commutativity: whichever of two independent producers finishes
/// first, the joined dependent ends in the same state with the same
/// inputs.
#[tokio::test]
async fn test_completion_order_does_not_change_result() {
    for (slow_task, fast_task) in [("a", "b"), ("b", "a")] {
        let (executor, recorder) = scripted_executor(HashMap::from([
            (slow_task, Behavior::SucceedAfter(Duration::from_millis(60))),
            (fast_task, Behavior::SucceedAfter(Duration::from_millis(5))),
        ]));
        let store = Arc::new(MemoryArtifactStore::new());
        let mut coordinator = TeamCoordinator::new(&quick_config(), executor, store);

        let a = coordinator.add_task("a", "left", &[]).await.unwrap();
        let b = coordinator.add_task("b", "right", &[]).await.unwrap();
        let d = coordinator
            .add_task(
                "d",
                "join",
                &[(a, DependencyKind::Required), (b, DependencyKind::Required)],
            )
            .await
            .unwrap();

        let manifest = coordinator.run().await.unwrap();

        assert!(manifest.fully_succeeded());
        assert!(succeeded(&manifest, &d));
        let d_runs = assignments_for(&recorder, &d);
        assert_eq!(d_runs.len(), 1);
        // Both producers' artifacts arrive regardless of finish order.
        assert_eq!(d_runs[0].inputs.len(), 2);
        assert!(!d_runs[0].partial_input);
    }
}

/// More ready tasks than workers: every task still runs exactly once.
#[tokio::test]
async fn test_oversubscribed_pool_runs_each_task_once() {
    let (executor, recorder) = succeeding_executor();
    let store = Arc::new(MemoryArtifactStore::new());
    let mut coordinator = TeamCoordinator::new(&quick_config(), executor, store);

    let mut ids = Vec::new();
    for i in 0..8 {
        ids.push(
            coordinator
                .add_task(&format!("task-{}", i), "independent", &[])
                .await
                .unwrap(),
        );
    }

    let manifest = coordinator.run().await.unwrap();

    assert!(manifest.fully_succeeded());
    for id in &ids {
        assert_eq!(assignments_for(&recorder, id).len(), 1);
    }
}
