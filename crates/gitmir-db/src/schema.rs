//! SQL statements for creating the mirror metadata schema.

pub const CREATE_SCHEMA_VERSION: &str = "
CREATE TABLE IF NOT EXISTS schema_version (
    version     INTEGER PRIMARY KEY,
    applied_at  TEXT NOT NULL
)";

pub const CREATE_MIRRORS: &str = "
CREATE TABLE IF NOT EXISTS mirrors (
    id                      TEXT PRIMARY KEY,
    name                    TEXT NOT NULL,
    upstream_url            TEXT NOT NULL,
    downstream_owner        TEXT NOT NULL DEFAULT '',
    downstream_name         TEXT NOT NULL,
    enabled                 INTEGER NOT NULL DEFAULT 1,
    sync_interval_seconds   INTEGER,
    last_attempt_at         TEXT,
    last_success_at         TEXT,
    last_status             TEXT NOT NULL DEFAULT 'never',
    last_error_summary      TEXT,
    created_at              TEXT NOT NULL,
    updated_at               TEXT NOT NULL,
    UNIQUE (downstream_owner, downstream_name)
)";

pub const CREATE_SYNC_ATTEMPTS: &str = "
CREATE TABLE IF NOT EXISTS sync_attempts (
    id                  TEXT PRIMARY KEY,
    mirror_id           TEXT NOT NULL,
    started_at          TEXT NOT NULL,
    finished_at         TEXT,
    trigger             TEXT NOT NULL,
    outcome             TEXT,
    stage_reached       TEXT NOT NULL DEFAULT 'init',
    error_class         TEXT,
    error_detail        TEXT,
    bytes_transferred   INTEGER NOT NULL DEFAULT 0,
    refs_updated        INTEGER NOT NULL DEFAULT 0,
    FOREIGN KEY (mirror_id) REFERENCES mirrors(id) ON DELETE CASCADE
)";

pub const CREATE_SYNC_ATTEMPTS_MIRROR_IDX: &str = "
CREATE INDEX IF NOT EXISTS idx_sync_attempts_mirror
    ON sync_attempts (mirror_id, started_at DESC)";

pub const CREATE_MIRROR_LEASES: &str = "
CREATE TABLE IF NOT EXISTS mirror_leases (
    mirror_id       TEXT PRIMARY KEY,
    holder_id       TEXT NOT NULL,
    acquired_at     TEXT NOT NULL,
    expires_at      TEXT NOT NULL,
    FOREIGN KEY (mirror_id) REFERENCES mirrors(id) ON DELETE CASCADE
)";

/// All table/index creation statements in order.
pub const ALL_TABLES: &[&str] = &[
    CREATE_SCHEMA_VERSION,
    CREATE_MIRRORS,
    CREATE_SYNC_ATTEMPTS,
    CREATE_SYNC_ATTEMPTS_MIRROR_IDX,
    CREATE_MIRROR_LEASES,
];
