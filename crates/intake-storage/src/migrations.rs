//! Database schema migrations.
//!
//! Applies the fixed base schema: patients (parent records), sessions, and
//! session_messages. Topic tables are not created here; they are owned by
//! the schema evolver and appear on demand, driven by the field catalog.

use rusqlite::Connection;
use tracing::info;

use intake_core::error::IntakeError;

/// Run all pending database migrations.
pub fn run_migrations(conn: &Connection) -> Result<(), IntakeError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| IntakeError::Storage(format!("Failed to create migrations table: {}", e)))?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| IntakeError::Storage(format!("Failed to query migration version: {}", e)))?;

    if current_version < 1 {
        apply_v1(conn)?;
        info!("Applied migration v1: base_schema");
    }

    Ok(())
}

/// Version 1: parent records, sessions, and the append-only message log.
fn apply_v1(conn: &Connection) -> Result<(), IntakeError> {
    conn.execute_batch(
        "
        -- Parent records: one row per subject, shared across topic tables.
        CREATE TABLE IF NOT EXISTS patients (
            id          TEXT PRIMARY KEY NOT NULL,
            created_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
            updated_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );

        -- Durable conversation sessions.
        CREATE TABLE IF NOT EXISTS sessions (
            id               TEXT PRIMARY KEY NOT NULL,
            patient_id       TEXT REFERENCES patients(id),
            current_topic    TEXT NOT NULL,
            completed_topics TEXT NOT NULL DEFAULT '[]',
            extracted        TEXT NOT NULL DEFAULT '{}',
            created_at       INTEGER NOT NULL,
            updated_at       INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_sessions_patient
            ON sessions (patient_id)
            WHERE patient_id IS NOT NULL;

        CREATE INDEX IF NOT EXISTS idx_sessions_updated
            ON sessions (updated_at DESC);

        -- Append-only message log; insertion order is significant.
        CREATE TABLE IF NOT EXISTS session_messages (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id  TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
            role        TEXT NOT NULL
                        CHECK (role IN ('user', 'assistant')),
            content     TEXT NOT NULL DEFAULT '',
            timestamp   INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_session_messages_session
            ON session_messages (session_id, id ASC);

        INSERT OR IGNORE INTO schema_migrations (version, name) VALUES (1, 'base_schema');
        ",
    )
    .map_err(|e| IntakeError::Storage(format!("Failed to apply migration v1: {}", e)))?;

    Ok(())
}
