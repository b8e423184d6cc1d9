//! Per-topic upsert writer.
//!
//! Writes a field map into a topic table keyed by the parent record id.
//! Keys are validated against the topic's catalog, values are normalized,
//! and an all-empty map is skipped entirely so empty turns never create or
//! churn rows.

use std::sync::Arc;

use chrono::Utc;
use rusqlite::OptionalExtension;
use tracing::{debug, warn};

use intake_core::catalog::{is_safe_identifier, TopicCatalog};
use intake_core::error::IntakeError;
use intake_core::FieldMap;

use crate::db::Database;
use crate::session::ensure_patient_row;

/// Distinguishes a real write from a skipped empty one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// A row was inserted or updated.
    Written,
    /// Every normalized value was empty; zero database mutation.
    NothingToDo,
}

/// Normalize a value before persistence.
///
/// Destination columns are loosely typed text intended to capture free-form
/// conversational content; placeholder junk collapses to the empty string.
pub fn normalize_value(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty()
        || trimmed.eq_ignore_ascii_case("null")
        || trimmed.eq_ignore_ascii_case("undefined")
    {
        return String::new();
    }
    trimmed.to_string()
}

/// Writes field maps into topic tables.
pub struct RecordWriter {
    db: Arc<Database>,
}

impl RecordWriter {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert-or-update the topic row for `patient_id`.
    ///
    /// Only keys that are safe identifiers and members of the topic catalog
    /// are accepted; everything else is dropped with a warning. Columns
    /// absent from `fields` keep their prior stored values.
    pub fn upsert(
        &self,
        topic: &TopicCatalog,
        patient_id: &str,
        fields: &FieldMap,
    ) -> Result<WriteOutcome, IntakeError> {
        let accepted = filter_fields(topic, fields);

        if accepted.iter().all(|(_, v)| v.is_empty()) {
            debug!(table = topic.table, patient_id, "All values empty; skipping write");
            return Ok(WriteOutcome::NothingToDo);
        }

        let now = Utc::now().timestamp();
        self.db.with_conn(|conn| {
            ensure_patient_row(conn, patient_id)?;

            let existing: Option<i64> = conn
                .query_row(
                    &format!("SELECT id FROM {} WHERE patient_id = ?1", topic.table),
                    rusqlite::params![patient_id],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|e| IntakeError::Storage(e.to_string()))?;

            match existing {
                Some(row_id) => {
                    let assignments: Vec<String> = accepted
                        .iter()
                        .enumerate()
                        .map(|(i, (name, _))| format!("{} = ?{}", name, i + 1))
                        .collect();
                    let sql = format!(
                        "UPDATE {} SET {}, updated_at = ?{} WHERE id = ?{}",
                        topic.table,
                        assignments.join(", "),
                        accepted.len() + 1,
                        accepted.len() + 2,
                    );
                    let mut params: Vec<&dyn rusqlite::ToSql> =
                        accepted.iter().map(|(_, v)| v as &dyn rusqlite::ToSql).collect();
                    params.push(&now);
                    params.push(&row_id);
                    conn.execute(&sql, params.as_slice()).map_err(|e| {
                        IntakeError::Storage(format!("Failed to update {}: {}", topic.table, e))
                    })?;
                }
                None => {
                    let columns: Vec<&str> =
                        accepted.iter().map(|(name, _)| name.as_str()).collect();
                    let placeholders: Vec<String> =
                        (0..accepted.len()).map(|i| format!("?{}", i + 2)).collect();
                    let sql = format!(
                        "INSERT INTO {} (patient_id, {}, created_at, updated_at)
                         VALUES (?1, {}, ?{}, ?{})",
                        topic.table,
                        columns.join(", "),
                        placeholders.join(", "),
                        accepted.len() + 2,
                        accepted.len() + 3,
                    );
                    let mut params: Vec<&dyn rusqlite::ToSql> = vec![&patient_id];
                    for (_, v) in &accepted {
                        params.push(v as &dyn rusqlite::ToSql);
                    }
                    params.push(&now);
                    params.push(&now);
                    conn.execute(&sql, params.as_slice()).map_err(|e| {
                        IntakeError::Storage(format!("Failed to insert into {}: {}", topic.table, e))
                    })?;
                }
            }
            Ok(WriteOutcome::Written)
        })
    }
}

/// Keep only safe, catalog-known keys, with normalized values.
fn filter_fields(topic: &TopicCatalog, fields: &FieldMap) -> Vec<(String, String)> {
    let mut accepted = Vec::new();
    for (name, value) in fields {
        if !is_safe_identifier(name) {
            warn!(field = %name, table = topic.table, "Dropping unsafe field name");
            continue;
        }
        if !topic.contains(name) {
            // Not an error: the caller passes per-topic slices of a larger map.
            continue;
        }
        accepted.push((name.clone(), normalize_value(value)));
    }
    accepted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evolver;
    use intake_core::catalog::Catalog;

    fn setup(topic: &TopicCatalog) -> (Arc<Database>, RecordWriter) {
        let db = Arc::new(Database::in_memory().unwrap());
        db.with_conn(|conn| evolver::ensure_table(conn, topic))
            .unwrap();
        (Arc::clone(&db), RecordWriter::new(db))
    }

    fn read_field(db: &Database, table: &str, patient: &str, column: &str) -> String {
        db.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {} FROM {} WHERE patient_id = ?1", column, table),
                rusqlite::params![patient],
                |row| row.get(0),
            )
            .map_err(|e| IntakeError::Storage(e.to_string()))
        })
        .unwrap()
    }

    fn row_count(db: &Database, table: &str) -> i64 {
        db.with_conn(|conn| {
            conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                row.get(0)
            })
            .map_err(|e| IntakeError::Storage(e.to_string()))
        })
        .unwrap()
    }

    #[test]
    fn test_normalize_value() {
        assert_eq!(normalize_value("  metformin "), "metformin");
        assert_eq!(normalize_value(""), "");
        assert_eq!(normalize_value("   "), "");
        assert_eq!(normalize_value("null"), "");
        assert_eq!(normalize_value("NULL"), "");
        assert_eq!(normalize_value("undefined"), "");
        assert_eq!(normalize_value("Undefined"), "");
        assert_eq!(normalize_value("no"), "no");
    }

    #[test]
    fn test_insert_then_update() {
        let catalog = Catalog::builtin();
        let topic = catalog.topic("medical_history").unwrap();
        let (db, writer) = setup(topic);

        let mut fields = FieldMap::new();
        fields.insert("diabetes".into(), "yes".into());
        let outcome = writer.upsert(topic, "p-1", &fields).unwrap();
        assert_eq!(outcome, WriteOutcome::Written);
        assert_eq!(row_count(&db, topic.table), 1);
        assert_eq!(read_field(&db, topic.table, "p-1", "diabetes"), "yes");

        let mut fields = FieldMap::new();
        fields.insert("hypertension".into(), "no".into());
        writer.upsert(topic, "p-1", &fields).unwrap();

        // Still one row; prior column preserved; new column set.
        assert_eq!(row_count(&db, topic.table), 1);
        assert_eq!(read_field(&db, topic.table, "p-1", "diabetes"), "yes");
        assert_eq!(read_field(&db, topic.table, "p-1", "hypertension"), "no");
    }

    #[test]
    fn test_all_empty_map_skips_write() {
        let catalog = Catalog::builtin();
        let topic = catalog.topic("allergies").unwrap();
        let (db, writer) = setup(topic);

        let mut fields = FieldMap::new();
        fields.insert("drug_allergies".into(), "".into());
        fields.insert("food_allergies".into(), "null".into());
        fields.insert("other_allergies".into(), "undefined".into());

        let outcome = writer.upsert(topic, "p-1", &fields).unwrap();
        assert_eq!(outcome, WriteOutcome::NothingToDo);
        assert_eq!(row_count(&db, topic.table), 0);
    }

    #[test]
    fn test_empty_map_skips_write() {
        let catalog = Catalog::builtin();
        let topic = catalog.topic("allergies").unwrap();
        let (db, writer) = setup(topic);

        let outcome = writer.upsert(topic, "p-1", &FieldMap::new()).unwrap();
        assert_eq!(outcome, WriteOutcome::NothingToDo);
        assert_eq!(row_count(&db, topic.table), 0);
    }

    #[test]
    fn test_unknown_and_unsafe_keys_dropped() {
        let catalog = Catalog::builtin();
        let topic = catalog.topic("medical_history").unwrap();
        let (db, writer) = setup(topic);

        let mut fields = FieldMap::new();
        fields.insert("diabetes".into(), "yes".into());
        fields.insert("not_in_catalog".into(), "value".into());
        fields.insert("evil; DROP TABLE patients".into(), "value".into());

        let outcome = writer.upsert(topic, "p-1", &fields).unwrap();
        assert_eq!(outcome, WriteOutcome::Written);
        assert_eq!(read_field(&db, topic.table, "p-1", "diabetes"), "yes");
        // Schema untouched by the injection attempt.
        assert_eq!(row_count(&db, "patients"), 1);
    }

    #[test]
    fn test_only_unknown_keys_is_noop() {
        let catalog = Catalog::builtin();
        let topic = catalog.topic("medical_history").unwrap();
        let (db, writer) = setup(topic);

        let mut fields = FieldMap::new();
        fields.insert("phone".into(), "555-1234".into()); // belongs to contact

        let outcome = writer.upsert(topic, "p-1", &fields).unwrap();
        assert_eq!(outcome, WriteOutcome::NothingToDo);
        assert_eq!(row_count(&db, topic.table), 0);
    }

    #[test]
    fn test_distinct_patients_get_distinct_rows() {
        let catalog = Catalog::builtin();
        let topic = catalog.topic("contact").unwrap();
        let (db, writer) = setup(topic);

        let mut fields = FieldMap::new();
        fields.insert("phone".into(), "111".into());
        writer.upsert(topic, "p-1", &fields).unwrap();

        let mut fields = FieldMap::new();
        fields.insert("phone".into(), "222".into());
        writer.upsert(topic, "p-2", &fields).unwrap();

        assert_eq!(row_count(&db, topic.table), 2);
        assert_eq!(read_field(&db, topic.table, "p-1", "phone"), "111");
        assert_eq!(read_field(&db, topic.table, "p-2", "phone"), "222");
    }

    #[test]
    fn test_partial_empty_values_still_write_nonempty() {
        let catalog = Catalog::builtin();
        let topic = catalog.topic("medications").unwrap();
        let (db, writer) = setup(topic);

        let mut fields = FieldMap::new();
        fields.insert("current_medications".into(), "metformin".into());
        fields.insert("anticoagulants".into(), "null".into());

        let outcome = writer.upsert(topic, "p-1", &fields).unwrap();
        assert_eq!(outcome, WriteOutcome::Written);
        assert_eq!(
            read_field(&db, topic.table, "p-1", "current_medications"),
            "metformin"
        );
        assert_eq!(read_field(&db, topic.table, "p-1", "anticoagulants"), "");
    }
}
