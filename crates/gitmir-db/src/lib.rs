pub mod migration;
pub mod ops;
pub mod schema;
pub mod store;

use std::path::Path;

use rusqlite::Connection;

/// Open (creating if needed) the metadata store at `path` and run pending migrations.
pub fn open_db(path: &Path) -> anyhow::Result<Connection> {
    let conn = Connection::open(path)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    migration::run_migrations(&conn)?;
    Ok(conn)
}

/// In-memory store for tests: fresh schema, no file on disk.
pub fn open_memory_db() -> anyhow::Result<Connection> {
    let conn = Connection::open_in_memory()?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    migration::run_migrations(&conn)?;
    Ok(conn)
}
