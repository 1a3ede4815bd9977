use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, Mutex, Semaphore};
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use gitmir_core::cancel::CancellationToken;
use gitmir_core::config::Config;
use gitmir_core::models::mirror::{LastStatus, MirrorId};
use gitmir_core::models::sync_attempt::{OutcomeKind, StageKind, TriggerKind};
use gitmir_db::store::Store;
use gitmir_sync::{SyncContext, SyncEngine};

use crate::planner::is_due;

/// How often the planner re-scans mirrors for due syncs.
const TICK_INTERVAL: Duration = Duration::from_secs(30);
/// Added to `sync_timeout_seconds` to get a lease TTL generous enough that a
/// crashed worker's lease expires well after the sync itself would have
/// timed out (spec.md §4.2).
const LEASE_MARGIN_SECS: i64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    Started,
    /// The mirror's lease is already held by a live sync — coalesced rather
    /// than queued, per spec.md §4.2.
    AlreadyRunning,
    NotFound,
}

/// Decides when each mirror should run and caps total parallelism.
///
/// The Planner and Worker pool of spec.md §4.2 collapse into one tick loop
/// plus a semaphore here: the loop *is* the planner, and each due mirror
/// spawns a task gated on `permits`, which *is* the worker pool's
/// concurrency cap (the same bound-via-`Semaphore` shape the sync engine's
/// own fork-sync fan-out uses).
pub struct Scheduler {
    store: Store,
    config: Arc<Config>,
    permits: Arc<Semaphore>,
    holder_id: String,
    shutdown_tx: broadcast::Sender<()>,
    cancel: CancellationToken,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(store: Store, config: Arc<Config>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let permits = Arc::new(Semaphore::new(config.max_concurrent_syncs));
        Self {
            store,
            permits,
            holder_id: format!("scheduler-{}", uuid::Uuid::now_v7()),
            config,
            shutdown_tx,
            cancel: CancellationToken::new(),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Shared with callers that need to trip cancellation from outside (a
    /// SIGTERM handler, say) without going through `shutdown`.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Runs the planner tick loop until `shutdown` is called or the
    /// cancellation token trips. Returns once every in-flight worker has
    /// drained.
    #[instrument(skip(self))]
    pub async fn run(&self) {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        loop {
            tokio::select! {
                _ = tokio::time::sleep(TICK_INTERVAL) => {
                    self.tick().await;
                }
                _ = self.cancel.cancelled() => {
                    info!("scheduler cancellation received");
                    break;
                }
                _ = shutdown_rx.recv() => {
                    info!("scheduler shutdown requested");
                    break;
                }
            }
        }
        self.drain().await;
    }

    async fn tick(&self) {
        let mirrors = match self.store.list_mirrors(true).await {
            Ok(mirrors) => mirrors,
            Err(e) => {
                warn!(error = %e, "failed to list mirrors for scheduling");
                return;
            }
        };

        for mirror in mirrors {
            // A mirror stuck on `running` with no live lease means a worker
            // crashed before finalizing — re-submit it as a Retry trigger
            // rather than waiting out the remainder of its interval.
            if mirror.last_status == LastStatus::Running {
                let lease = self.store.get_lease(mirror.id.clone()).await.ok().flatten();
                let lease_alive = lease.map(|l| !l.is_expired(Utc::now())).unwrap_or(false);
                if !lease_alive {
                    self.spawn_sync(mirror.id, TriggerKind::Retry).await;
                    continue;
                }
            }

            let interval = self.config.effective_interval(mirror.sync_interval_seconds);
            if is_due(&mirror, interval) {
                self.spawn_sync(mirror.id, TriggerKind::Scheduled).await;
            }
        }
    }

    /// Entry point for the external trigger surface: bypasses `enabled` and
    /// the due check, but still obeys the lease.
    #[instrument(skip(self))]
    pub async fn trigger(&self, mirror_id: MirrorId) -> anyhow::Result<TriggerOutcome> {
        if self.store.get_mirror(mirror_id.clone()).await?.is_none() {
            return Ok(TriggerOutcome::NotFound);
        }
        Ok(self.spawn_sync(mirror_id, TriggerKind::Manual).await)
    }

    async fn spawn_sync(&self, mirror_id: MirrorId, trigger: TriggerKind) -> TriggerOutcome {
        let lease_ttl = self.config.sync_timeout_seconds as i64 + LEASE_MARGIN_SECS;

        let (attempt, previous_status) = match self
            .store
            .begin_sync(mirror_id.clone(), trigger, self.holder_id.clone(), lease_ttl)
            .await
        {
            Ok(Some(pair)) => pair,
            Ok(None) => return TriggerOutcome::AlreadyRunning,
            Err(e) => {
                warn!(error = %e, mirror_id = %mirror_id, "begin_sync failed");
                return TriggerOutcome::AlreadyRunning;
            }
        };

        let mirror = match self.store.get_mirror(mirror_id.clone()).await {
            Ok(Some(mirror)) => mirror,
            _ => {
                let _ = self
                    .store
                    .finalize_sync(
                        mirror_id,
                        self.holder_id.clone(),
                        attempt.id,
                        StageKind::Init,
                        OutcomeKind::Failed,
                        previous_status,
                        None,
                        Some("mirror vanished before sync started".to_string()),
                        0,
                        0,
                    )
                    .await;
                return TriggerOutcome::NotFound;
            }
        };

        let permits = self.permits.clone();
        let store = self.store.clone();
        let config = self.config.clone();
        let holder_id = self.holder_id.clone();
        let cancel = self.cancel.clone();

        let handle = tokio::spawn(async move {
            let _permit = permits.acquire_owned().await;

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
            let outcome = engine.run(&ctx, &cancel).await;

            if let Err(e) = store
                .finalize_sync(
                    mirror_id,
                    holder_id,
                    attempt.id,
                    outcome.stage_reached,
                    outcome.outcome,
                    previous_status,
                    outcome.error_class,
                    outcome.error_detail,
                    outcome.bytes_transferred,
                    outcome.refs_updated,
                )
                .await
            {
                warn!(error = %e, "failed to finalize sync attempt");
            }
        });

        self.handles.lock().await.push(handle);
        TriggerOutcome::Started
    }

    async fn drain(&self) {
        let mut handles = self.handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
    }

    /// Trips cancellation, stops the planner loop, and waits for every
    /// spawned worker to finish (cooperatively cancelled mid-stage, or
    /// already done).
    #[instrument(skip(self))]
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let _ = self.shutdown_tx.send(());
        self.drain().await;
        info!("scheduler shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gitmir_core::models::mirror::Mirror;
    use url::Url;

    fn test_config() -> Arc<Config> {
        Arc::new(Config {
            upstream_base: None,
            upstream_token: None,
            downstream_url: Url::parse("http://127.0.0.1:9").unwrap(),
            downstream_token: "tok".to_string(),
            downstream_user: "mirror-bot".to_string(),
            default_sync_interval_seconds: 3600,
            sync_timeout_seconds: 5,
            max_concurrent_syncs: 2,
            retry_max: 0,
            local_clone_root: std::env::temp_dir(),
            store_dsn: "memory".to_string(),
            log_level: "info".to_string(),
            log_file: None,
            timezone: "UTC".to_string(),
        })
    }

    #[tokio::test]
    async fn test_trigger_nonexistent_mirror_is_not_found() {
        let store = Store::open_memory().unwrap();
        let scheduler = Scheduler::new(store, test_config());
        let outcome = scheduler.trigger(MirrorId::new()).await.unwrap();
        assert_eq!(outcome, TriggerOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_manual_trigger_coalesces_with_running_sync() {
        let store = Store::open_memory().unwrap();
        let mirror = Mirror::new(
            "acme-widgets".to_string(),
            "https://example.invalid/acme/widgets.git".to_string(),
            String::new(),
            "widgets".to_string(),
        );
        store.upsert_mirror(mirror.clone()).await.unwrap();

        let scheduler = Scheduler::new(store.clone(), test_config());
        let first = scheduler.trigger(mirror.id.clone()).await.unwrap();
        assert_eq!(first, TriggerOutcome::Started);

        let second = scheduler.trigger(mirror.id.clone()).await.unwrap();
        assert_eq!(second, TriggerOutcome::AlreadyRunning);

        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_drains_in_flight_workers() {
        let store = Store::open_memory().unwrap();
        let mirror = Mirror::new(
            "acme-widgets".to_string(),
            "https://example.invalid/acme/widgets.git".to_string(),
            String::new(),
            "widgets".to_string(),
        );
        store.upsert_mirror(mirror.clone()).await.unwrap();

        let scheduler = Scheduler::new(store.clone(), test_config());
        scheduler.trigger(mirror.id.clone()).await.unwrap();
        scheduler.shutdown().await;

        let updated = store.get_mirror(mirror.id).await.unwrap().unwrap();
        assert_ne!(updated.last_status, LastStatus::Running);
    }
}
