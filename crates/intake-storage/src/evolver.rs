//! Catalog-driven schema evolution for topic tables.
//!
//! Guarantees that a topic's destination table exists and carries every
//! catalog column before a write is attempted. Columns are only ever added,
//! never dropped or retyped. All DDL is guarded so that concurrent
//! invocations for the same table are harmless.

use std::sync::Arc;

use rusqlite::Connection;
use tracing::{debug, info, warn};

use intake_core::catalog::TopicCatalog;
use intake_core::error::IntakeError;

use crate::db::Database;

/// What a schema-evolution pass did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaOutcome {
    /// The table was created from scratch with the full catalog.
    Created,
    /// The table existed; this many missing columns were added.
    Altered(usize),
    /// The table already covered the catalog. Zero DDL executed.
    Unchanged,
}

/// Ensures topic tables cover their field catalogs.
pub struct SchemaEvolver {
    db: Arc<Database>,
}

impl SchemaEvolver {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Ensure the topic's table exists with every catalog column.
    ///
    /// Failures are logged and swallowed: schema evolution must never abort
    /// the pipeline. A subsequent write may then fail at the write step,
    /// which is handled separately.
    pub fn ensure_table(&self, topic: &TopicCatalog) {
        match self.db.with_conn(|conn| ensure_table(conn, topic)) {
            Ok(SchemaOutcome::Created) => {
                info!(table = topic.table, "Created topic table");
            }
            Ok(SchemaOutcome::Altered(n)) => {
                info!(table = topic.table, added = n, "Added missing topic columns");
            }
            Ok(SchemaOutcome::Unchanged) => {
                debug!(table = topic.table, "Topic table schema up to date");
            }
            Err(e) => {
                warn!(table = topic.table, error = %e, "Schema evolution failed; continuing");
            }
        }
    }
}

/// Core check-then-evolve step, exposed for direct use and tests.
pub fn ensure_table(conn: &Connection, topic: &TopicCatalog) -> Result<SchemaOutcome, IntakeError> {
    let existed = table_exists(conn, topic.table)?;

    if !existed {
        create_table(conn, topic)?;
        return Ok(SchemaOutcome::Created);
    }

    let existing = existing_columns(conn, topic.table)?;
    let mut added = 0usize;
    for field in topic.safe_fields() {
        if existing.iter().any(|c| c == field.name) {
            continue;
        }
        let sql = format!(
            "ALTER TABLE {} ADD COLUMN {} TEXT NOT NULL DEFAULT ''",
            topic.table, field.name
        );
        match conn.execute(&sql, []) {
            Ok(_) => added += 1,
            // A concurrent evolver may have won the race; tolerate it.
            Err(e) if e.to_string().contains("duplicate column name") => {
                debug!(table = topic.table, column = field.name, "Column already added");
            }
            Err(e) => {
                return Err(IntakeError::Storage(format!(
                    "Failed to add column {}.{}: {}",
                    topic.table, field.name, e
                )));
            }
        }
    }

    if added == 0 {
        Ok(SchemaOutcome::Unchanged)
    } else {
        Ok(SchemaOutcome::Altered(added))
    }
}

fn create_table(conn: &Connection, topic: &TopicCatalog) -> Result<(), IntakeError> {
    let mut columns = String::new();
    for field in topic.safe_fields() {
        columns.push_str(&format!(
            "            {} TEXT NOT NULL DEFAULT '',\n",
            field.name
        ));
    }

    // Identifiers are validated against the catalog; only parameters come
    // from user input, and this statement has none.
    let sql = format!(
        "CREATE TABLE IF NOT EXISTS {} (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            patient_id  TEXT NOT NULL UNIQUE REFERENCES patients(id),
{}            created_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
            updated_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        )",
        topic.table, columns
    );

    conn.execute(&sql, []).map_err(|e| {
        IntakeError::Storage(format!("Failed to create table {}: {}", topic.table, e))
    })?;
    Ok(())
}

/// Whether a table exists in the schema.
pub fn table_exists(conn: &Connection, table: &str) -> Result<bool, IntakeError> {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            rusqlite::params![table],
            |row| row.get(0),
        )
        .map_err(|e| IntakeError::Storage(e.to_string()))?;
    Ok(count > 0)
}

/// Enumerate the live column names of a table.
pub fn existing_columns(conn: &Connection, table: &str) -> Result<Vec<String>, IntakeError> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({})", table))
        .map_err(|e| IntakeError::Storage(e.to_string()))?;

    let rows = stmt
        .query_map([], |row| row.get::<_, String>(1))
        .map_err(|e| IntakeError::Storage(e.to_string()))?;

    let mut columns = Vec::new();
    for row in rows {
        columns.push(row.map_err(|e| IntakeError::Storage(e.to_string()))?);
    }
    Ok(columns)
}
