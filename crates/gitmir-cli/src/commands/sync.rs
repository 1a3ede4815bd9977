use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use gitmir_core::config::Config;
use gitmir_core::models::mirror::Mirror;
use gitmir_core::models::sync_attempt::TriggerKind;
use gitmir_db::store::Store;
use gitmir_sync::{CancellationToken, SyncContext, SyncEngine};

#[derive(Args)]
pub struct SyncArgs {
    /// Mirror name, or "all" to sync every enabled mirror
    target: String,
}

pub async fn run(args: SyncArgs) -> anyhow::Result<()> {
    let config = Arc::new(Config::from_env()?);
    let store = Store::open(std::path::Path::new(&config.store_dsn))?;

    let mirrors = if args.target == "all" {
        store.list_mirrors(true).await?
    } else {
        let mirror = store
            .get_mirror_by_name(args.target.clone())
            .await?
            .ok_or_else(|| anyhow::anyhow!("mirror '{}' not found", args.target))?;
        vec![mirror]
    };

    if mirrors.is_empty() {
        println!("No mirrors to sync.");
        return Ok(());
    }

    // Bounded concurrency, same shape as the sync engine's own fork-sync
    // fan-out: a shared `Semaphore` gates how many syncs run at once.
    let semaphore = Arc::new(Semaphore::new(config.max_concurrent_syncs));
    let holder_id = format!("cli-{}", uuid::Uuid::now_v7());

    let mut set = JoinSet::new();
    for mirror in mirrors {
        let store = store.clone();
        let config = config.clone();
        let semaphore = semaphore.clone();
        let holder_id = holder_id.clone();
        set.spawn(async move {
            let _permit = semaphore.acquire_owned().await;
            sync_one(&store, &config, mirror, &holder_id).await
        });
    }

    while let Some(result) = set.join_next().await {
        match result {
            Ok(Ok(summary)) => println!("{summary}"),
            Ok(Err(e)) => eprintln!("sync failed: {e}"),
            Err(e) => eprintln!("sync task panicked: {e}"),
        }
    }

    Ok(())
}

async fn sync_one(store: &Store, config: &Config, mirror: Mirror, holder_id: &str) -> anyhow::Result<String> {
    let lease_ttl = config.sync_timeout_seconds as i64 + 300;
    let name = mirror.name.clone();
    let mirror_id = mirror.id.clone();

    let (attempt, previous_status) = match store
        .begin_sync(mirror_id.clone(), TriggerKind::Manual, holder_id.to_string(), lease_ttl)
        .await?
    {
        Some(pair) => pair,
        None => return Ok(format!("{name}: already running, skipped")),
    };

    let ctx = SyncContext {
        mirror,
        clone_root: config.local_clone_root.clone(),
        service_user: config.downstream_user.clone(),
        downstream_base: config.downstream_url.to_string(),
        downstream_token: config.downstream_token.clone(),
        fetch_timeout: Duration::from_secs(config.sync_timeout_seconds),
        push_timeout: Duration::from_secs(config.sync_timeout_seconds),
        retry_max: config.retry_max,
    };

    let engine = SyncEngine::new();
    let cancel = CancellationToken::new();
    let outcome = engine.run(&ctx, &cancel).await;

    let summary = format!(
        "{name}: {} (stage={}, bytes={}, refs={})",
        outcome.outcome, outcome.stage_reached, outcome.bytes_transferred, outcome.refs_updated
    );

    store
        .finalize_sync(
            mirror_id,
            holder_id.to_string(),
            attempt.id,
            outcome.stage_reached,
            outcome.outcome,
            previous_status,
            outcome.error_class,
            outcome.error_detail,
            outcome.bytes_transferred,
            outcome.refs_updated,
        )
        .await?;

    Ok(summary)
}
