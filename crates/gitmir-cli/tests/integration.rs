use gitmir_core::models::mirror::{LastStatus, Mirror};
use gitmir_core::models::sync_attempt::{OutcomeKind, StageKind, TriggerKind};
use gitmir_db::store::Store;

#[tokio::test]
async fn test_full_pipeline_in_memory() {
    let store = Store::open_memory().unwrap();

    // 1. Register a mirror.
    let mut mirror = Mirror::new(
        "acme-widgets".to_string(),
        "https://github.com/acme/widgets.git".to_string(),
        String::new(),
        "widgets".to_string(),
    );
    mirror.sync_interval_seconds = Some(1800);
    store.upsert_mirror(mirror.clone()).await.unwrap();

    let mirrors = store.list_mirrors(false).await.unwrap();
    assert_eq!(mirrors.len(), 1);
    assert_eq!(mirrors[0].name, "acme-widgets");
    assert_eq!(mirrors[0].last_status, LastStatus::Never);

    let found = store.get_mirror_by_name("acme-widgets".to_string()).await.unwrap().unwrap();
    assert_eq!(found.id, mirror.id);

    // 2. Begin a sync: lease acquired, mirror flips to running.
    let (attempt, previous_status) = store
        .begin_sync(mirror.id.clone(), TriggerKind::Manual, "cli-test".to_string(), 300)
        .await
        .unwrap()
        .expect("lease should be free");
    assert_eq!(previous_status, LastStatus::Never);

    let running = store.get_mirror(mirror.id.clone()).await.unwrap().unwrap();
    assert_eq!(running.last_status, LastStatus::Running);

    // A second concurrent attempt is coalesced, not queued.
    let contended = store
        .begin_sync(mirror.id.clone(), TriggerKind::Manual, "cli-test-2".to_string(), 300)
        .await
        .unwrap();
    assert!(contended.is_none());

    // 3. Finalize as a success.
    store
        .finalize_sync(
            mirror.id.clone(),
            "cli-test".to_string(),
            attempt.id,
            StageKind::Done,
            OutcomeKind::Success,
            previous_status,
            None,
            None,
            4096,
            3,
        )
        .await
        .unwrap();

    let synced = store.get_mirror(mirror.id.clone()).await.unwrap().unwrap();
    assert_eq!(synced.last_status, LastStatus::Success);
    assert!(synced.last_success_at.is_some());

    // 4. History reflects the finished attempt.
    let history = store.recent_history(Some(mirror.id.clone()), 10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].outcome, Some(OutcomeKind::Success));
    assert_eq!(history[0].bytes_transferred, 4096);
    assert_eq!(history[0].refs_updated, 3);

    // 5. Lease was released by finalize, so a fresh sync can begin.
    let (attempt2, previous_status2) = store
        .begin_sync(mirror.id.clone(), TriggerKind::Scheduled, "cli-test".to_string(), 300)
        .await
        .unwrap()
        .expect("lease should be released after finalize");
    assert_eq!(previous_status2, LastStatus::Success);

    // 6. A failed finalize downgrades status and records the error.
    store
        .finalize_sync(
            mirror.id.clone(),
            "cli-test".to_string(),
            attempt2.id,
            StageKind::Push,
            OutcomeKind::Failed,
            previous_status2,
            Some(gitmir_core::models::sync_attempt::ErrorClass::DownstreamAuth),
            Some("401 unauthorized".to_string()),
            0,
            0,
        )
        .await
        .unwrap();

    let failed = store.get_mirror(mirror.id.clone()).await.unwrap().unwrap();
    assert_eq!(failed.last_status, LastStatus::Failed);
    assert_eq!(failed.last_error_summary.as_deref(), Some("401 unauthorized"));

    // 7. Removing the mirror clears it from listings.
    store.delete_mirror(mirror.id.clone()).await.unwrap();
    assert!(store.get_mirror(mirror.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_cancelled_attempt_restores_previous_status() {
    let store = Store::open_memory().unwrap();
    let mirror = Mirror::new(
        "acme-widgets".to_string(),
        "https://github.com/acme/widgets.git".to_string(),
        "acme-org".to_string(),
        "widgets".to_string(),
    );
    store.upsert_mirror(mirror.clone()).await.unwrap();

    let (attempt, previous_status) = store
        .begin_sync(mirror.id.clone(), TriggerKind::Scheduled, "cli-test".to_string(), 300)
        .await
        .unwrap()
        .unwrap();

    store
        .finalize_sync(
            mirror.id.clone(),
            "cli-test".to_string(),
            attempt.id,
            StageKind::Fetch,
            OutcomeKind::Cancelled,
            previous_status,
            None,
            None,
            0,
            0,
        )
        .await
        .unwrap();

    let reverted = store.get_mirror(mirror.id).await.unwrap().unwrap();
    assert_eq!(reverted.last_status, LastStatus::Never);
}
