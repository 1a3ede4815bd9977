use std::path::Path;
use std::time::Duration;

use gitmir_core::models::sync_attempt::{OutcomeKind, StageKind};
use gitmir_core::models::mirror::Mirror;
use gitmir_sync::{CancellationToken, SyncContext, SyncEngine};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn run_git(dir: &Path, args: &[&str]) {
    let status = tokio::process::Command::new("git")
        .args(args)
        .current_dir(dir)
        .status()
        .await
        .unwrap();
    assert!(status.success(), "git {:?} failed", args);
}

/// Drives `ensure_remote`, `fetch`, and `ensure_downstream` against a real
/// local upstream repo and a mocked Gitea server. `push` targets the same
/// mock server, which has no smart-HTTP git backend, so the pipeline is
/// expected to fail there with a classified (not generic) error — this
/// still exercises every stage up through the one that needs a real Gitea
/// instance to complete.
#[tokio::test]
async fn test_pipeline_reaches_push_against_real_upstream() {
    let upstream_dir = tempfile::tempdir().unwrap();
    run_git(upstream_dir.path(), &["init", "--bare", "--initial-branch=main"]).await;

    let scratch = tempfile::tempdir().unwrap();
    run_git(scratch.path(), &["clone", upstream_dir.path().to_str().unwrap(), "work"]).await;
    let work_dir = scratch.path().join("work");
    tokio::fs::write(work_dir.join("README.md"), b"hello").await.unwrap();
    run_git(&work_dir, &["add", "README.md"]).await;
    run_git(
        &work_dir,
        &[
            "-c", "user.email=test@example.com",
            "-c", "user.name=test",
            "commit", "-m", "initial",
        ],
    )
    .await;
    run_git(&work_dir, &["push", "origin", "HEAD:refs/heads/main"]).await;

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/repos/acme/widgets"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let clone_root = tempfile::tempdir().unwrap();
    let mirror = Mirror::new(
        "acme-widgets".to_string(),
        upstream_dir.path().to_string_lossy().to_string(),
        "acme".to_string(),
        "widgets".to_string(),
    );

    let ctx = SyncContext {
        mirror,
        clone_root: clone_root.path().to_path_buf(),
        service_user: "mirror-bot".to_string(),
        downstream_base: server.uri(),
        downstream_token: "unused".to_string(),
        fetch_timeout: Duration::from_secs(20),
        push_timeout: Duration::from_secs(20),
        retry_max: 0,
    };

    let engine = SyncEngine::new();
    let cancel = CancellationToken::new();
    let outcome = engine.run(&ctx, &cancel).await;

    assert_eq!(outcome.stage_reached, StageKind::Push);
    assert_ne!(outcome.outcome, OutcomeKind::Success);
    assert!(outcome.error_class.is_some());

    let local_dir = ctx.clone_root.join(ctx.mirror.id.0.to_string());
    assert!(local_dir.join("HEAD").exists(), "clone should have produced a bare repo");
}

#[tokio::test]
async fn test_cancellation_before_first_stage_short_circuits() {
    let clone_root = tempfile::tempdir().unwrap();
    let mirror = Mirror::new(
        "acme-widgets".to_string(),
        "https://example.invalid/acme/widgets.git".to_string(),
        "acme".to_string(),
        "widgets".to_string(),
    );

    let ctx = SyncContext {
        mirror,
        clone_root: clone_root.path().to_path_buf(),
        service_user: "mirror-bot".to_string(),
        downstream_base: "https://example.invalid".to_string(),
        downstream_token: "unused".to_string(),
        fetch_timeout: Duration::from_secs(5),
        push_timeout: Duration::from_secs(5),
        retry_max: 0,
    };

    let engine = SyncEngine::new();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = engine.run(&ctx, &cancel).await;
    assert_eq!(outcome.outcome, OutcomeKind::Cancelled);
    assert_eq!(outcome.stage_reached, StageKind::EnsureRemote);
}
