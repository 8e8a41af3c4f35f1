//! Ownership arbiter tests: exclusivity, forced transfer, liveness
//! revalidation, and the out-of-band exit path.

mod common;

use std::sync::Arc;
use std::time::Duration;

use dragoman::domain::models::LeaseHolder;

#[tokio::test]
async fn grants_vacant_lease_and_launches_runtime() {
    let tmp = tempfile::tempdir().unwrap();
    let (control, lifecycle, arbiter) = common::arbiter_fixture(tmp.path(), "1.0.0");

    let granted = arbiter
        .acquire(LeaseHolder::BatchTranslator, true, false)
        .await
        .unwrap();

    assert!(granted);
    assert_eq!(
        arbiter.current_owner().await,
        Some(LeaseHolder::BatchTranslator)
    );
    assert!(arbiter.held_since().await.is_some());
    assert!(lifecycle.is_alive().await);
    assert_eq!(control.spawn_count(), 1);
}

#[tokio::test]
async fn denies_non_owner_while_lease_is_held() {
    let tmp = tempfile::tempdir().unwrap();
    let (control, _lifecycle, arbiter) = common::arbiter_fixture(tmp.path(), "1.0.0");

    assert!(arbiter
        .acquire(LeaseHolder::BatchTranslator, true, false)
        .await
        .unwrap());
    assert!(!arbiter
        .acquire(LeaseHolder::InteractiveChat, true, false)
        .await
        .unwrap());

    assert_eq!(
        arbiter.current_owner().await,
        Some(LeaseHolder::BatchTranslator)
    );
    assert!(!arbiter.is_available_to(LeaseHolder::InteractiveChat).await);
    assert!(arbiter.is_available_to(LeaseHolder::BatchTranslator).await);
    // The denied requester must not have spawned a second runtime.
    assert_eq!(control.spawn_count(), 1);
}

#[tokio::test]
async fn reacquire_by_owner_is_idempotent() {
    let tmp = tempfile::tempdir().unwrap();
    let (control, _lifecycle, arbiter) = common::arbiter_fixture(tmp.path(), "1.0.0");

    for _ in 0..3 {
        assert!(arbiter
            .acquire(LeaseHolder::BatchTranslator, true, false)
            .await
            .unwrap());
    }
    assert_eq!(control.spawn_count(), 1);
}

#[tokio::test]
async fn reacquire_relaunches_after_silent_runtime_death() {
    let tmp = tempfile::tempdir().unwrap();
    let (control, lifecycle, arbiter) = common::arbiter_fixture(tmp.path(), "1.0.0");

    assert!(arbiter
        .acquire(LeaseHolder::BatchTranslator, true, false)
        .await
        .unwrap());
    let handle = lifecycle.current_handle_id().await.unwrap();

    // The process dies without anyone calling release, and without the exit
    // monitor running.
    let dead = dragoman::domain::models::RuntimeHandle {
        id: handle,
        pid: None,
    };
    control.close_externally(&dead);

    // The owner's re-acquire transparently relaunches instead of failing.
    assert!(arbiter
        .acquire(LeaseHolder::BatchTranslator, true, false)
        .await
        .unwrap());
    assert_eq!(control.spawn_count(), 2);
    assert!(lifecycle.is_alive().await);
}

#[tokio::test]
async fn force_release_tears_down_holder_before_regrant() {
    let tmp = tempfile::tempdir().unwrap();
    let (control, _lifecycle, arbiter) = common::arbiter_fixture(tmp.path(), "1.0.0");
    let mut transitions = arbiter.subscribe();

    assert!(arbiter
        .acquire(LeaseHolder::BatchTranslator, true, false)
        .await
        .unwrap());
    assert!(arbiter
        .acquire(LeaseHolder::InteractiveChat, true, true)
        .await
        .unwrap());

    assert_eq!(
        arbiter.current_owner().await,
        Some(LeaseHolder::InteractiveChat)
    );
    // The evicted owner's runtime was killed before the new grant.
    assert_eq!(control.killed().len(), 1);
    assert_eq!(control.spawn_count(), 2);

    // Transition order: vacant -> batch, batch -> vacant, vacant -> chat.
    let first = transitions.recv().await.unwrap();
    assert_eq!(first.previous, None);
    assert_eq!(first.next, Some(LeaseHolder::BatchTranslator));
    let second = transitions.recv().await.unwrap();
    assert_eq!(second.previous, Some(LeaseHolder::BatchTranslator));
    assert_eq!(second.next, None);
    let third = transitions.recv().await.unwrap();
    assert_eq!(third.previous, None);
    assert_eq!(third.next, Some(LeaseHolder::InteractiveChat));
}

#[tokio::test]
async fn release_by_non_owner_is_a_no_op() {
    let tmp = tempfile::tempdir().unwrap();
    let (control, _lifecycle, arbiter) = common::arbiter_fixture(tmp.path(), "1.0.0");

    assert!(arbiter
        .acquire(LeaseHolder::BatchTranslator, true, false)
        .await
        .unwrap());
    arbiter.release(LeaseHolder::InteractiveChat).await;

    assert_eq!(
        arbiter.current_owner().await,
        Some(LeaseHolder::BatchTranslator)
    );
    assert!(control.killed().is_empty());
}

#[tokio::test]
async fn release_by_owner_vacates_and_closes() {
    let tmp = tempfile::tempdir().unwrap();
    let (control, lifecycle, arbiter) = common::arbiter_fixture(tmp.path(), "1.0.0");

    assert!(arbiter
        .acquire(LeaseHolder::BatchTranslator, true, false)
        .await
        .unwrap());
    arbiter.release(LeaseHolder::BatchTranslator).await;

    assert_eq!(arbiter.current_owner().await, None);
    assert!(!lifecycle.is_alive().await);
    assert_eq!(control.killed().len(), 1);
}

#[tokio::test]
async fn launch_failure_leaves_lease_vacant() {
    let tmp = tempfile::tempdir().unwrap();
    let (control, _lifecycle, arbiter) = common::arbiter_fixture(tmp.path(), "1.0.0");
    control.set_fail_spawn(true);

    let granted = arbiter
        .acquire(LeaseHolder::BatchTranslator, true, false)
        .await
        .unwrap();

    assert!(!granted);
    assert_eq!(arbiter.current_owner().await, None);

    // No retry by the arbiter; a later explicit attempt may succeed.
    control.set_fail_spawn(false);
    assert!(arbiter
        .acquire(LeaseHolder::BatchTranslator, true, false)
        .await
        .unwrap());
}

#[tokio::test]
async fn out_of_band_exit_vacates_the_lease() {
    let tmp = tempfile::tempdir().unwrap();
    let (control, lifecycle, arbiter) = common::arbiter_fixture(tmp.path(), "1.0.0");
    arbiter.spawn_exit_monitor();
    let mut transitions = arbiter.subscribe();

    assert!(arbiter
        .acquire(LeaseHolder::BatchTranslator, true, false)
        .await
        .unwrap());
    // Drain the grant transition.
    let _ = transitions.recv().await.unwrap();

    let handle = lifecycle.current_handle_id().await.unwrap();
    control.close_externally(&dragoman::domain::models::RuntimeHandle {
        id: handle,
        pid: None,
    });

    // The monitor folds the exit into the lease under the same gate as
    // acquire/release.
    let vacated = tokio::time::timeout(Duration::from_secs(2), transitions.recv())
        .await
        .expect("exit notification must vacate the lease")
        .unwrap();
    assert!(vacated.is_vacated());
    assert_eq!(arbiter.current_owner().await, None);
}

#[tokio::test]
async fn force_release_all_clears_any_holder() {
    let tmp = tempfile::tempdir().unwrap();
    let (_control, lifecycle, arbiter) = common::arbiter_fixture(tmp.path(), "1.0.0");

    // No holder: a no-op.
    arbiter.force_release_all().await;
    assert_eq!(arbiter.current_owner().await, None);

    assert!(arbiter
        .acquire(LeaseHolder::InteractiveChat, true, false)
        .await
        .unwrap());
    arbiter.force_release_all().await;
    assert_eq!(arbiter.current_owner().await, None);
    assert!(!lifecycle.is_alive().await);
}

#[tokio::test]
async fn concurrent_interleavings_never_double_grant() {
    let tmp = tempfile::tempdir().unwrap();
    let (_control, _lifecycle, arbiter) = common::arbiter_fixture(tmp.path(), "1.0.0");

    // Drain transitions concurrently so the broadcast channel never lags.
    let mut rx = arbiter.subscribe();
    let collector = tokio::spawn(async move {
        let mut transitions = Vec::new();
        while let Ok(t) = rx.recv().await {
            transitions.push(t);
        }
        transitions
    });

    let mut tasks = Vec::new();
    for holder in [LeaseHolder::BatchTranslator, LeaseHolder::InteractiveChat] {
        for _ in 0..2 {
            let arbiter = Arc::clone(&arbiter);
            tasks.push(tokio::spawn(async move {
                for _ in 0..10 {
                    if arbiter.acquire(holder, true, true).await.unwrap() {
                        tokio::task::yield_now().await;
                        arbiter.release(holder).await;
                    }
                }
            }));
        }
    }
    for task in tasks {
        task.await.unwrap();
    }

    drop(arbiter);
    let transitions = collector.await.unwrap();

    // Serialized mutations form an unbroken ownership chain: each
    // transition starts from exactly the state the previous one left, so at
    // no instant were two holders granted.
    assert!(!transitions.is_empty());
    assert_eq!(transitions[0].previous, None);
    for pair in transitions.windows(2) {
        assert_eq!(
            pair[0].next, pair[1].previous,
            "ownership chain must be gapless: {pair:?}"
        );
    }
}
