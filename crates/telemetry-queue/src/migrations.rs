//! Queue database migrations.
//!
//! Migrations are run in order and tracked in the `migrations` table.

use crate::StoreResult;
use rusqlite::Connection;
use tracing::{debug, info};

/// Current schema version.
pub const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations.
pub fn run_migrations(conn: &Connection) -> StoreResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    let current_version: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM migrations",
        [],
        |row| row.get(0),
    )?;

    if current_version >= CURRENT_VERSION {
        debug!(current_version, "Queue schema up to date");
        return Ok(());
    }

    info!(current_version, target_version = CURRENT_VERSION, "Running migrations");

    if current_version < 1 {
        migrate_v1_event_queue(conn)?;
    }
    if current_version < 2 {
        migrate_v2_legacy_imports(conn)?;
    }

    info!("Migrations complete");
    Ok(())
}

fn record_migration(conn: &Connection, version: i32, name: &str) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO migrations (version, name) VALUES (?1, ?2)",
        rusqlite::params![version, name],
    )?;
    debug!(version, name, "Migration applied");
    Ok(())
}

/// V1: the event queue.
///
/// AUTOINCREMENT keeps ids monotonic even after the newest rows are deleted.
fn migrate_v1_event_queue(conn: &Connection) -> StoreResult<()> {
    info!("Applying migration v1: event queue");

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS event_queue (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            payload TEXT NOT NULL,
            byte_len INTEGER NOT NULL CHECK (byte_len >= 0),
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        ",
    )?;

    record_migration(conn, 1, "event_queue")
}

/// V2: one row per imported legacy queue file.
fn migrate_v2_legacy_imports(conn: &Connection) -> StoreResult<()> {
    info!("Applying migration v2: legacy imports");

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS legacy_imports (
            source TEXT PRIMARY KEY,
            imported INTEGER NOT NULL,
            skipped INTEGER NOT NULL,
            imported_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        ",
    )?;

    record_migration(conn, 2, "legacy_imports")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_exists(conn: &Connection, name: &str) -> bool {
        conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [name],
            |row| row.get::<_, i64>(0),
        )
        .unwrap()
            == 1
    }

    #[test]
    fn test_migrations_create_tables() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        assert!(table_exists(&conn, "event_queue"));
        assert!(table_exists(&conn, "legacy_imports"));
    }

    #[test]
    fn test_migrations_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let applied: i64 = conn
            .query_row("SELECT COUNT(*) FROM migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(applied, i64::from(CURRENT_VERSION));
    }

    #[test]
    fn test_ids_not_reused_after_delete() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        conn.execute("INSERT INTO event_queue (payload, byte_len) VALUES ('{}', 2)", [])
            .unwrap();
        conn.execute("INSERT INTO event_queue (payload, byte_len) VALUES ('{}', 2)", [])
            .unwrap();
        conn.execute("DELETE FROM event_queue", []).unwrap();
        conn.execute("INSERT INTO event_queue (payload, byte_len) VALUES ('{}', 2)", [])
            .unwrap();

        let id: i64 = conn
            .query_row("SELECT id FROM event_queue", [], |row| row.get(0))
            .unwrap();
        assert_eq!(id, 3);
    }
}
