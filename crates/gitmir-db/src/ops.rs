//! Synchronous, row-mapping CRUD over a single `rusqlite::Connection`.
//! Callers needing concurrency safety go through [`crate::store::Store`],
//! which serializes access and wraps the transactional invariants.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use gitmir_core::models::lease::Lease;
use gitmir_core::models::mirror::{LastStatus, Mirror, MirrorId};
use gitmir_core::models::sync_attempt::{
    ErrorClass, OutcomeKind, StageKind, SyncAttempt, TriggerKind,
};

fn parse_dt(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn fmt_dt(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn opt_dt(dt: &Option<DateTime<Utc>>) -> Option<String> {
    dt.as_ref().map(fmt_dt)
}

// ── Mirrors ──

pub fn upsert_mirror(conn: &Connection, mirror: &Mirror) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO mirrors (id, name, upstream_url, downstream_owner, downstream_name, enabled, sync_interval_seconds, last_attempt_at, last_success_at, last_status, last_error_summary, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
         ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            upstream_url = excluded.upstream_url,
            downstream_owner = excluded.downstream_owner,
            downstream_name = excluded.downstream_name,
            enabled = excluded.enabled,
            sync_interval_seconds = excluded.sync_interval_seconds,
            last_attempt_at = excluded.last_attempt_at,
            last_success_at = excluded.last_success_at,
            last_status = excluded.last_status,
            last_error_summary = excluded.last_error_summary,
            updated_at = excluded.updated_at",
        params![
            mirror.id.0.to_string(),
            mirror.name,
            mirror.upstream_url,
            mirror.downstream_owner,
            mirror.downstream_name,
            mirror.enabled as i32,
            mirror.sync_interval_seconds.map(|v| v as i64),
            opt_dt(&mirror.last_attempt_at),
            opt_dt(&mirror.last_success_at),
            mirror.last_status.to_string(),
            mirror.last_error_summary,
            fmt_dt(&mirror.created_at),
            fmt_dt(&mirror.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_mirror(conn: &Connection, id: &MirrorId) -> anyhow::Result<Option<Mirror>> {
    let mut stmt = conn.prepare(SELECT_MIRROR_COLUMNS)?;
    let mirror = stmt
        .query_row(params![id.0.to_string()], row_to_mirror)
        .optional()?;
    Ok(mirror)
}

pub fn get_mirror_by_name(conn: &Connection, name: &str) -> anyhow::Result<Option<Mirror>> {
    let sql = "SELECT id, name, upstream_url, downstream_owner, downstream_name, enabled, sync_interval_seconds, last_attempt_at, last_success_at, last_status, last_error_summary, created_at, updated_at
         FROM mirrors WHERE name = ?1";
    let mut stmt = conn.prepare(sql)?;
    let mirror = stmt.query_row(params![name], row_to_mirror).optional()?;
    Ok(mirror)
}

pub fn list_mirrors(conn: &Connection, enabled_only: bool) -> anyhow::Result<Vec<Mirror>> {
    let sql = if enabled_only {
        "SELECT id, name, upstream_url, downstream_owner, downstream_name, enabled, sync_interval_seconds, last_attempt_at, last_success_at, last_status, last_error_summary, created_at, updated_at
         FROM mirrors WHERE enabled = 1 ORDER BY name"
    } else {
        "SELECT id, name, upstream_url, downstream_owner, downstream_name, enabled, sync_interval_seconds, last_attempt_at, last_success_at, last_status, last_error_summary, created_at, updated_at
         FROM mirrors ORDER BY name"
    };
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([], row_to_mirror)?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

pub fn delete_mirror(conn: &Connection, id: &MirrorId) -> anyhow::Result<()> {
    conn.execute(
        "DELETE FROM mirrors WHERE id = ?1",
        params![id.0.to_string()],
    )?;
    Ok(())
}

const SELECT_MIRROR_COLUMNS: &str = "SELECT id, name, upstream_url, downstream_owner, downstream_name, enabled, sync_interval_seconds, last_attempt_at, last_success_at, last_status, last_error_summary, created_at, updated_at
         FROM mirrors WHERE id = ?1";

fn row_to_mirror(row: &rusqlite::Row) -> rusqlite::Result<Mirror> {
    let id_str: String = row.get(0)?;
    let name: String = row.get(1)?;
    let upstream_url: String = row.get(2)?;
    let downstream_owner: String = row.get(3)?;
    let downstream_name: String = row.get(4)?;
    let enabled: i32 = row.get(5)?;
    let sync_interval_seconds: Option<i64> = row.get(6)?;
    let last_attempt_str: Option<String> = row.get(7)?;
    let last_success_str: Option<String> = row.get(8)?;
    let last_status_str: String = row.get(9)?;
    let last_error_summary: Option<String> = row.get(10)?;
    let created_str: String = row.get(11)?;
    let updated_str: String = row.get(12)?;

    Ok(Mirror {
        id: MirrorId::from_uuid(Uuid::parse_str(&id_str).unwrap_or_default()),
        name,
        upstream_url,
        downstream_owner,
        downstream_name,
        enabled: enabled != 0,
        sync_interval_seconds: sync_interval_seconds.map(|v| v as u64),
        last_attempt_at: last_attempt_str.map(|s| parse_dt(&s)),
        last_success_at: last_success_str.map(|s| parse_dt(&s)),
        last_status: last_status_str.parse().unwrap_or(LastStatus::Never),
        last_error_summary,
        created_at: parse_dt(&created_str),
        updated_at: parse_dt(&updated_str),
    })
}

// ── Sync attempts ──

pub fn begin_attempt(conn: &Connection, attempt: &SyncAttempt) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO sync_attempts (id, mirror_id, started_at, finished_at, trigger, outcome, stage_reached, error_class, error_detail, bytes_transferred, refs_updated)
         VALUES (?1, ?2, ?3, NULL, ?4, NULL, ?5, NULL, NULL, 0, 0)",
        params![
            attempt.id.to_string(),
            attempt.mirror_id.0.to_string(),
            fmt_dt(&attempt.started_at),
            attempt.trigger.to_string(),
            attempt.stage_reached.to_string(),
        ],
    )?;
    Ok(())
}

/// Finalize a previously-begun attempt. Idempotent: a second call is a
/// silent no-op if the row is already finalized (`finished_at IS NOT NULL`),
/// matching spec.md §4.5's "may be called at most once" by construction.
#[allow(clippy::too_many_arguments)]
pub fn finalize_attempt(
    conn: &Connection,
    attempt_id: &Uuid,
    finished_at: DateTime<Utc>,
    stage_reached: StageKind,
    outcome: OutcomeKind,
    error_class: Option<ErrorClass>,
    error_detail: Option<&str>,
    bytes_transferred: u64,
    refs_updated: u32,
) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE sync_attempts SET
            finished_at = ?1,
            stage_reached = ?2,
            outcome = ?3,
            error_class = ?4,
            error_detail = ?5,
            bytes_transferred = ?6,
            refs_updated = ?7
         WHERE id = ?8 AND finished_at IS NULL",
        params![
            fmt_dt(&finished_at),
            stage_reached.to_string(),
            outcome.to_string(),
            error_class.map(|c| c.to_string()),
            error_detail,
            bytes_transferred as i64,
            refs_updated as i64,
            attempt_id.to_string(),
        ],
    )?;
    Ok(())
}

pub fn recent_history(
    conn: &Connection,
    mirror_id: Option<&MirrorId>,
    limit: u32,
) -> anyhow::Result<Vec<SyncAttempt>> {
    let mut stmt = if mirror_id.is_some() {
        conn.prepare(
            "SELECT id, mirror_id, started_at, finished_at, trigger, outcome, stage_reached, error_class, error_detail, bytes_transferred, refs_updated
             FROM sync_attempts WHERE mirror_id = ?1 ORDER BY started_at DESC LIMIT ?2",
        )?
    } else {
        conn.prepare(
            "SELECT id, mirror_id, started_at, finished_at, trigger, outcome, stage_reached, error_class, error_detail, bytes_transferred, refs_updated
             FROM sync_attempts ORDER BY started_at DESC LIMIT ?1",
        )?
    };

    let rows = if let Some(id) = mirror_id {
        stmt.query_map(params![id.0.to_string(), limit], row_to_attempt)?
            .filter_map(|r| r.ok())
            .collect()
    } else {
        stmt.query_map(params![limit], row_to_attempt)?
            .filter_map(|r| r.ok())
            .collect()
    };
    Ok(rows)
}

fn row_to_attempt(row: &rusqlite::Row) -> rusqlite::Result<SyncAttempt> {
    let id_str: String = row.get(0)?;
    let mirror_id_str: String = row.get(1)?;
    let started_str: String = row.get(2)?;
    let finished_str: Option<String> = row.get(3)?;
    let trigger_str: String = row.get(4)?;
    let outcome_str: Option<String> = row.get(5)?;
    let stage_str: String = row.get(6)?;
    let error_class_str: Option<String> = row.get(7)?;
    let error_detail: Option<String> = row.get(8)?;
    let bytes: i64 = row.get(9)?;
    let refs: i64 = row.get(10)?;

    Ok(SyncAttempt {
        id: Uuid::parse_str(&id_str).unwrap_or_default(),
        mirror_id: MirrorId::from_uuid(Uuid::parse_str(&mirror_id_str).unwrap_or_default()),
        started_at: parse_dt(&started_str),
        finished_at: finished_str.map(|s| parse_dt(&s)),
        trigger: trigger_str.parse().unwrap_or(TriggerKind::Manual),
        outcome: outcome_str.and_then(|s| s.parse().ok()),
        stage_reached: stage_str.parse().unwrap_or(StageKind::Init),
        error_class: error_class_str.and_then(|s| s.parse().ok()),
        error_detail,
        bytes_transferred: bytes as u64,
        refs_updated: refs as u32,
    })
}

// ── Leases ──

/// Atomically acquire a lease, stealing an expired one if present. Returns
/// `true` if the lease was acquired.
pub fn acquire_lease(
    conn: &Connection,
    mirror_id: &MirrorId,
    holder_id: &str,
    now: DateTime<Utc>,
    ttl_secs: i64,
) -> anyhow::Result<bool> {
    let expires_at = now + chrono::Duration::seconds(ttl_secs);

    let existing: Option<String> = conn
        .query_row(
            "SELECT expires_at FROM mirror_leases WHERE mirror_id = ?1",
            params![mirror_id.0.to_string()],
            |row| row.get(0),
        )
        .optional()?;

    match existing {
        Some(expires_str) if parse_dt(&expires_str) > now => Ok(false),
        Some(_) => {
            conn.execute(
                "UPDATE mirror_leases SET holder_id = ?1, acquired_at = ?2, expires_at = ?3 WHERE mirror_id = ?4",
                params![holder_id, fmt_dt(&now), fmt_dt(&expires_at), mirror_id.0.to_string()],
            )?;
            Ok(true)
        }
        None => {
            conn.execute(
                "INSERT INTO mirror_leases (mirror_id, holder_id, acquired_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
                params![mirror_id.0.to_string(), holder_id, fmt_dt(&now), fmt_dt(&expires_at)],
            )?;
            Ok(true)
        }
    }
}

pub fn release_lease(conn: &Connection, mirror_id: &MirrorId, holder_id: &str) -> anyhow::Result<()> {
    conn.execute(
        "DELETE FROM mirror_leases WHERE mirror_id = ?1 AND holder_id = ?2",
        params![mirror_id.0.to_string(), holder_id],
    )?;
    Ok(())
}

pub fn get_lease(conn: &Connection, mirror_id: &MirrorId) -> anyhow::Result<Option<Lease>> {
    let row = conn
        .query_row(
            "SELECT mirror_id, holder_id, acquired_at, expires_at FROM mirror_leases WHERE mirror_id = ?1",
            params![mirror_id.0.to_string()],
            |row| {
                let mirror_id_str: String = row.get(0)?;
                let holder_id: String = row.get(1)?;
                let acquired_str: String = row.get(2)?;
                let expires_str: String = row.get(3)?;
                Ok((mirror_id_str, holder_id, acquired_str, expires_str))
            },
        )
        .optional()?;

    Ok(row.map(|(mirror_id_str, holder_id, acquired_str, expires_str)| Lease {
        mirror_id: MirrorId::from_uuid(Uuid::parse_str(&mirror_id_str).unwrap_or_default()),
        holder_id,
        acquired_at: parse_dt(&acquired_str),
        expires_at: parse_dt(&expires_str),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::open_memory_db;

    fn sample_mirror() -> Mirror {
        Mirror::new(
            "acme-widgets".to_string(),
            "https://github.com/acme/widgets.git".to_string(),
            String::new(),
            "widgets".to_string(),
        )
    }

    #[test]
    fn test_mirror_crud() {
        let conn = open_memory_db().unwrap();
        let mirror = sample_mirror();
        upsert_mirror(&conn, &mirror).unwrap();

        let found = get_mirror(&conn, &mirror.id).unwrap().unwrap();
        assert_eq!(found.name, "acme-widgets");
        assert_eq!(found.last_status, LastStatus::Never);

        let by_name = get_mirror_by_name(&conn, "acme-widgets").unwrap().unwrap();
        assert_eq!(by_name.id, mirror.id);

        let all = list_mirrors(&conn, false).unwrap();
        assert_eq!(all.len(), 1);

        delete_mirror(&conn, &mirror.id).unwrap();
        assert!(get_mirror(&conn, &mirror.id).unwrap().is_none());
    }

    #[test]
    fn test_mirror_unique_owner_name() {
        let conn = open_memory_db().unwrap();
        let m1 = Mirror::new("one".into(), "https://x/a.git".into(), "org".into(), "repo".into());
        let mut m2 = Mirror::new("two".into(), "https://x/b.git".into(), "org".into(), "repo".into());
        m2.id = gitmir_core::models::mirror::MirrorId::new();
        upsert_mirror(&conn, &m1).unwrap();
        let err = upsert_mirror(&conn, &m2);
        assert!(err.is_err());
    }

    #[test]
    fn test_attempt_lifecycle_is_append_only() {
        let conn = open_memory_db().unwrap();
        let mirror = sample_mirror();
        upsert_mirror(&conn, &mirror).unwrap();

        let attempt = SyncAttempt::begin(mirror.id.clone(), TriggerKind::Manual);
        begin_attempt(&conn, &attempt).unwrap();

        finalize_attempt(
            &conn,
            &attempt.id,
            Utc::now(),
            StageKind::Done,
            OutcomeKind::Success,
            None,
            None,
            128,
            2,
        )
        .unwrap();

        let history = recent_history(&conn, Some(&mirror.id), 10).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].outcome, Some(OutcomeKind::Success));

        // Second finalize is a no-op: the first outcome survives untouched.
        finalize_attempt(
            &conn,
            &attempt.id,
            Utc::now(),
            StageKind::Init,
            OutcomeKind::Failed,
            Some(ErrorClass::Unknown),
            Some("should not apply"),
            0,
            0,
        )
        .unwrap();

        let history = recent_history(&conn, Some(&mirror.id), 10).unwrap();
        assert_eq!(history[0].outcome, Some(OutcomeKind::Success));
        assert_eq!(history[0].error_detail, None);
    }

    #[test]
    fn test_lease_at_most_one() {
        let conn = open_memory_db().unwrap();
        let mirror = sample_mirror();
        upsert_mirror(&conn, &mirror).unwrap();

        let now = Utc::now();
        assert!(acquire_lease(&conn, &mirror.id, "worker-1", now, 60).unwrap());
        assert!(!acquire_lease(&conn, &mirror.id, "worker-2", now, 60).unwrap());

        release_lease(&conn, &mirror.id, "worker-1").unwrap();
        assert!(acquire_lease(&conn, &mirror.id, "worker-2", now, 60).unwrap());
    }

    #[test]
    fn test_expired_lease_can_be_stolen() {
        let conn = open_memory_db().unwrap();
        let mirror = sample_mirror();
        upsert_mirror(&conn, &mirror).unwrap();

        let past = Utc::now() - chrono::Duration::seconds(120);
        assert!(acquire_lease(&conn, &mirror.id, "worker-1", past, 1).unwrap());

        let now = Utc::now();
        assert!(acquire_lease(&conn, &mirror.id, "worker-2", now, 60).unwrap());
        let lease = get_lease(&conn, &mirror.id).unwrap().unwrap();
        assert_eq!(lease.holder_id, "worker-2");
    }
}
