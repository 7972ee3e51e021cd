//! Database schema and migrations
//!
//! Uses SQLite with embedded migrations managed via PRAGMA user_version.

use rusqlite::Connection;

use crate::error::Result;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// SQL migrations, indexed by version number
const MIGRATIONS: &[&str] = &[
    // Version 1: Initial schema
    r#"
    CREATE TABLE IF NOT EXISTS call_sessions (
        call_id                 TEXT PRIMARY KEY,
        phone_number            TEXT NOT NULL,
        direction               TEXT NOT NULL,
        status                  TEXT NOT NULL,
        answered_by             TEXT,
        response_text           TEXT,
        response_classification TEXT,
        duration_seconds        INTEGER,
        notes                   TEXT,
        amd_resolved            INTEGER NOT NULL DEFAULT 0,
        fallback_notified       INTEGER NOT NULL DEFAULT 0,
        created_at              DATETIME NOT NULL,
        updated_at              DATETIME NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_call_sessions_created_at
        ON call_sessions(created_at DESC);
    CREATE INDEX IF NOT EXISTS idx_call_sessions_phone_number
        ON call_sessions(phone_number);
    CREATE INDEX IF NOT EXISTS idx_call_sessions_status
        ON call_sessions(status);
    "#,
];

/// Run any pending migrations on the connection.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let current: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    for (index, migration) in MIGRATIONS.iter().enumerate() {
        let version = (index + 1) as i32;
        if version <= current {
            continue;
        }

        tracing::info!(version, "Applying database migration");
        conn.execute_batch(migration)?;
        conn.pragma_update(None, "user_version", version)?;
    }

    Ok(())
}
