//! Database schema migrations for the offline session store.
//!
//! Migrations are versioned and applied automatically when opening the store.
//! The `schema_version` table tracks the current migration version.

use rusqlite::{Connection, Result as SqliteResult};

/// Current schema version.
///
/// Increment this when adding new migrations.
pub const SCHEMA_VERSION: i32 = 3;

/// Apply all pending migrations to bring the database to the current schema version.
///
/// # Errors
/// Returns an error if migration fails.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    create_schema_version_table(conn)?;

    let current_version = get_schema_version(conn);

    if current_version < 1 {
        migrate_v1(conn)?;
    }
    if current_version < 2 {
        migrate_v2(conn)?;
    }
    if current_version < 3 {
        migrate_v3(conn)?;
    }

    Ok(())
}

fn create_schema_version_table(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )
}

/// Returns 0 if no version is set (initial database).
pub fn get_schema_version(conn: &Connection) -> i32 {
    conn.query_row("SELECT version FROM schema_version", [], |row| {
        row.get::<_, i32>(0)
    })
    .unwrap_or_else(|e| {
        if !matches!(e, rusqlite::Error::QueryReturnedNoRows) {
            tracing::warn!(error = %e, "failed to read schema_version");
        }
        0
    })
}

fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

/// Migration v1: append-only session log, sync log and kv cursor table.
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS sessions (
            seq         INTEGER PRIMARY KEY AUTOINCREMENT,
            id          TEXT NOT NULL UNIQUE,
            pattern_id  TEXT NOT NULL,
            payload     TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS sync_log (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id  TEXT NOT NULL,
            outcome     TEXT NOT NULL,
            detail      TEXT NOT NULL DEFAULT '',
            at          TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS kv (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_sync_log_session ON sync_log(session_id, outcome);",
    )?;
    set_schema_version(&tx, 1)?;
    tx.commit()
}

/// Migration v2: derived per-session sync view.
///
/// `failures` counts rejections since the most recent requeue of that session.
fn migrate_v2(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(
        "CREATE VIEW IF NOT EXISTS session_sync_view AS
         SELECT
            s.seq,
            s.id,
            s.payload,
            EXISTS (
                SELECT 1 FROM sync_log l
                WHERE l.session_id = s.id AND l.outcome = 'synced'
            ) AS synced,
            (
                SELECT COUNT(*) FROM sync_log l
                WHERE l.session_id = s.id
                  AND l.outcome = 'rejected'
                  AND l.id > COALESCE((
                      SELECT MAX(r.id) FROM sync_log r
                      WHERE r.session_id = s.id AND r.outcome = 'requeued'
                  ), 0)
            ) AS failures
         FROM sessions s;",
    )?;
    set_schema_version(&tx, 2)?;
    tx.commit()
}

/// Migration v3: expose `created_at` on the sync view so queue order follows
/// creation time. A spilled session written late keeps its original place.
fn migrate_v3(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(
        "DROP VIEW IF EXISTS session_sync_view;

        CREATE VIEW session_sync_view AS
         SELECT
            s.seq,
            s.id,
            s.payload,
            s.created_at,
            EXISTS (
                SELECT 1 FROM sync_log l
                WHERE l.session_id = s.id AND l.outcome = 'synced'
            ) AS synced,
            (
                SELECT COUNT(*) FROM sync_log l
                WHERE l.session_id = s.id
                  AND l.outcome = 'rejected'
                  AND l.id > COALESCE((
                      SELECT MAX(r.id) FROM sync_log r
                      WHERE r.session_id = s.id AND r.outcome = 'requeued'
                  ), 0)
            ) AS failures
         FROM sessions s;

        CREATE INDEX IF NOT EXISTS idx_sessions_created ON sessions(created_at, seq);",
    )?;
    set_schema_version(&tx, 3)?;
    tx.commit()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrate_fresh_database() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), SCHEMA_VERSION);
    }

    #[test]
    fn migrate_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), SCHEMA_VERSION);
        let views: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'view' AND name = 'session_sync_view'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(views, 1);
    }

    #[test]
    fn migrate_from_v2_adds_created_at() {
        let conn = Connection::open_in_memory().unwrap();
        create_schema_version_table(&conn).unwrap();
        migrate_v1(&conn).unwrap();
        migrate_v2(&conn).unwrap();
        conn.execute_batch(
            "INSERT INTO sessions (id, pattern_id, payload, created_at)
             VALUES ('old', 'box', '{}', '2025-02-25T12:00:00.000000Z');",
        )
        .unwrap();

        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), 3);
        let created: String = conn
            .query_row(
                "SELECT created_at FROM session_sync_view WHERE id = 'old'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(created, "2025-02-25T12:00:00.000000Z");
    }

    #[test]
    fn view_counts_failures_since_requeue() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        conn.execute_batch(
            "INSERT INTO sessions (id, pattern_id, payload, created_at) VALUES ('a', 'box', '{}', 'now');
             INSERT INTO sync_log (session_id, outcome, at) VALUES ('a', 'rejected', 'now');
             INSERT INTO sync_log (session_id, outcome, at) VALUES ('a', 'rejected', 'now');
             INSERT INTO sync_log (session_id, outcome, at) VALUES ('a', 'requeued', 'now');
             INSERT INTO sync_log (session_id, outcome, at) VALUES ('a', 'rejected', 'now');",
        )
        .unwrap();
        let (synced, failures): (bool, i64) = conn
            .query_row(
                "SELECT synced, failures FROM session_sync_view WHERE id = 'a'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert!(!synced);
        assert_eq!(failures, 1);
    }
}
