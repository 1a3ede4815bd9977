//! Async-friendly handle onto the metadata store.
//!
//! `rusqlite::Connection` is `!Sync`, and this is a long-running service with
//! several workers touching the store concurrently (unlike a short-lived CLI
//! invocation), so every operation is funneled through a single [`std::sync::Mutex`]
//! and run on the blocking thread pool via `spawn_blocking`.

use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use rusqlite::Connection;
use uuid::Uuid;

use gitmir_core::models::lease::Lease;
use gitmir_core::models::mirror::{LastStatus, Mirror, MirrorId};
use gitmir_core::models::sync_attempt::{
    ErrorClass, OutcomeKind, StageKind, SyncAttempt, TriggerKind,
};

use crate::ops;

#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let conn = crate::open_db(path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_memory() -> anyhow::Result<Self> {
        let conn = crate::open_memory_db()?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<F, T>(&self, f: F) -> anyhow::Result<T>
    where
        F: FnOnce(&Connection) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().expect("metadata store mutex poisoned");
            f(&guard)
        })
        .await?
    }

    pub async fn upsert_mirror(&self, mirror: Mirror) -> anyhow::Result<()> {
        self.with_conn(move |conn| ops::upsert_mirror(conn, &mirror)).await
    }

    pub async fn get_mirror(&self, id: MirrorId) -> anyhow::Result<Option<Mirror>> {
        self.with_conn(move |conn| ops::get_mirror(conn, &id)).await
    }

    pub async fn get_mirror_by_name(&self, name: String) -> anyhow::Result<Option<Mirror>> {
        self.with_conn(move |conn| ops::get_mirror_by_name(conn, &name)).await
    }

    pub async fn list_mirrors(&self, enabled_only: bool) -> anyhow::Result<Vec<Mirror>> {
        self.with_conn(move |conn| ops::list_mirrors(conn, enabled_only)).await
    }

    pub async fn delete_mirror(&self, id: MirrorId) -> anyhow::Result<()> {
        self.with_conn(move |conn| ops::delete_mirror(conn, &id)).await
    }

    pub async fn recent_history(
        &self,
        mirror_id: Option<MirrorId>,
        limit: u32,
    ) -> anyhow::Result<Vec<SyncAttempt>> {
        self.with_conn(move |conn| ops::recent_history(conn, mirror_id.as_ref(), limit))
            .await
    }

    pub async fn get_lease(&self, mirror_id: MirrorId) -> anyhow::Result<Option<Lease>> {
        self.with_conn(move |conn| ops::get_lease(conn, &mirror_id)).await
    }

    /// Acquire the mirror's lease and open a new [`SyncAttempt`] in one
    /// transaction. Returns `Ok(None)` if the lease is already held by
    /// another (non-expired) holder — the caller treats this as
    /// `already_running` and skips the sync rather than erroring.
    pub async fn begin_sync(
        &self,
        mirror_id: MirrorId,
        trigger: TriggerKind,
        holder_id: String,
        lease_ttl_secs: i64,
    ) -> anyhow::Result<Option<(SyncAttempt, LastStatus)>> {
        self.with_conn(move |conn| {
            let now = Utc::now();
            let tx = conn.unchecked_transaction()?;

            if !ops::acquire_lease(&tx, &mirror_id, &holder_id, now, lease_ttl_secs)? {
                return Ok(None);
            }

            let mut mirror = ops::get_mirror(&tx, &mirror_id)?
                .ok_or_else(|| anyhow::anyhow!("mirror {} vanished mid-transaction", mirror_id))?;
            let previous_status = mirror.last_status;
            mirror.last_status = LastStatus::Running;
            mirror.last_attempt_at = Some(now);
            mirror.updated_at = now;
            ops::upsert_mirror(&tx, &mirror)?;

            let attempt = SyncAttempt::begin(mirror_id, trigger);
            ops::begin_attempt(&tx, &attempt)?;

            tx.commit()?;
            Ok(Some((attempt, previous_status)))
        })
        .await
    }

    /// Finalize a sync attempt, release the lease, and update the mirror's
    /// rollup status — all in one transaction so a crash between steps never
    /// leaves the mirror stuck on `running` with a dangling lease.
    ///
    /// `previous_status` is the status the mirror carried before this attempt
    /// began (as returned by [`Store::begin_sync`]); a cancelled attempt
    /// restores it rather than recording `failed`.
    #[allow(clippy::too_many_arguments)]
    pub async fn finalize_sync(
        &self,
        mirror_id: MirrorId,
        holder_id: String,
        attempt_id: Uuid,
        stage_reached: StageKind,
        outcome: OutcomeKind,
        previous_status: LastStatus,
        error_class: Option<ErrorClass>,
        error_detail: Option<String>,
        bytes_transferred: u64,
        refs_updated: u32,
    ) -> anyhow::Result<()> {
        self.with_conn(move |conn| {
            let now = Utc::now();
            let tx = conn.unchecked_transaction()?;

            ops::finalize_attempt(
                &tx,
                &attempt_id,
                now,
                stage_reached,
                outcome,
                error_class,
                error_detail.as_deref(),
                bytes_transferred,
                refs_updated,
            )?;
            ops::release_lease(&tx, &mirror_id, &holder_id)?;

            if let Some(mut mirror) = ops::get_mirror(&tx, &mirror_id)? {
                mirror.last_status = match outcome {
                    OutcomeKind::Success => LastStatus::Success,
                    OutcomeKind::Cancelled => previous_status,
                    OutcomeKind::Failed | OutcomeKind::Timeout => LastStatus::Failed,
                };
                if matches!(outcome, OutcomeKind::Success) {
                    mirror.last_success_at = Some(now);
                    mirror.last_error_summary = None;
                } else if !matches!(outcome, OutcomeKind::Cancelled) {
                    mirror.last_error_summary = error_detail;
                }
                mirror.updated_at = now;
                ops::upsert_mirror(&tx, &mirror)?;
            }

            tx.commit()?;
            Ok(())
        })
        .await
    }
}
