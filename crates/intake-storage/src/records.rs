//! Parent-record repository.
//!
//! Reads the authoritative persisted field map for one patient across every
//! topic table. This is the merge base for each turn: it must come from the
//! store itself, not from the session's cached snapshot, because the record
//! may have been updated through another channel since the snapshot was
//! written.

use std::sync::Arc;

use rusqlite::OptionalExtension;

use intake_core::catalog::Catalog;
use intake_core::error::IntakeError;
use intake_core::FieldMap;

use crate::db::Database;
use crate::evolver::{existing_columns, table_exists};
use crate::session::ensure_patient_row;

/// Repository for parent records shared across topic tables.
pub struct PatientRepository {
    db: Arc<Database>,
}

impl PatientRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Create the parent row if it does not exist yet.
    pub fn ensure(&self, patient_id: &str) -> Result<(), IntakeError> {
        self.db.with_conn(|conn| ensure_patient_row(conn, patient_id))
    }

    /// Whether a parent record exists.
    pub fn exists(&self, patient_id: &str) -> Result<bool, IntakeError> {
        self.db.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM patients WHERE id = ?1",
                    rusqlite::params![patient_id],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|e| IntakeError::Storage(e.to_string()))?;
            Ok(found.is_some())
        })
    }

    /// Read the complete persisted field map for a patient.
    ///
    /// Walks every catalog topic; tables that do not exist yet are skipped
    /// (they simply contribute no fields), as are columns that predate the
    /// current catalog. Empty stored values are omitted: absence means
    /// "not known".
    pub fn read_fields(&self, patient_id: &str, catalog: &Catalog) -> Result<FieldMap, IntakeError> {
        self.db.with_conn(|conn| {
            let mut map = FieldMap::new();

            for topic in catalog.topics() {
                if !table_exists(conn, topic.table)? {
                    continue;
                }
                let live = existing_columns(conn, topic.table)?;
                let columns: Vec<&str> = topic
                    .safe_fields()
                    .map(|f| f.name)
                    .filter(|name| live.iter().any(|c| c == name))
                    .collect();
                if columns.is_empty() {
                    continue;
                }

                let sql = format!(
                    "SELECT {} FROM {} WHERE patient_id = ?1",
                    columns.join(", "),
                    topic.table
                );
                let row: Option<Vec<String>> = conn
                    .query_row(&sql, rusqlite::params![patient_id], |row| {
                        let mut values = Vec::with_capacity(columns.len());
                        for i in 0..columns.len() {
                            values.push(row.get::<_, String>(i)?);
                        }
                        Ok(values)
                    })
                    .optional()
                    .map_err(|e| IntakeError::Storage(e.to_string()))?;

                if let Some(values) = row {
                    for (name, value) in columns.iter().zip(values) {
                        if !value.is_empty() {
                            map.insert((*name).to_string(), value);
                        }
                    }
                }
            }

            Ok(map)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evolver;
    use crate::writer::RecordWriter;

    fn setup() -> (Arc<Database>, PatientRepository, RecordWriter, Catalog) {
        let db = Arc::new(Database::in_memory().unwrap());
        let patients = PatientRepository::new(Arc::clone(&db));
        let writer = RecordWriter::new(Arc::clone(&db));
        (db, patients, writer, Catalog::builtin())
    }

    #[test]
    fn test_ensure_and_exists() {
        let (_db, patients, _writer, _catalog) = setup();
        assert!(!patients.exists("p-1").unwrap());
        patients.ensure("p-1").unwrap();
        assert!(patients.exists("p-1").unwrap());
        // Idempotent.
        patients.ensure("p-1").unwrap();
        assert!(patients.exists("p-1").unwrap());
    }

    #[test]
    fn test_read_fields_no_tables_yet() {
        let (_db, patients, _writer, catalog) = setup();
        patients.ensure("p-1").unwrap();
        let map = patients.read_fields("p-1", &catalog).unwrap();
        assert!(map.is_empty());
    }

    #[test]
    fn test_read_fields_across_topics() {
        let (db, patients, writer, catalog) = setup();

        let medical = catalog.topic("medical_history").unwrap();
        let contact = catalog.topic("contact").unwrap();
        for topic in [medical, contact] {
            db.with_conn(|conn| evolver::ensure_table(conn, topic))
                .unwrap();
        }

        let mut fields = FieldMap::new();
        fields.insert("diabetes".into(), "yes".into());
        writer.upsert(medical, "p-1", &fields).unwrap();

        let mut fields = FieldMap::new();
        fields.insert("phone".into(), "555".into());
        writer.upsert(contact, "p-1", &fields).unwrap();

        let map = patients.read_fields("p-1", &catalog).unwrap();
        assert_eq!(map.get("diabetes").unwrap(), "yes");
        assert_eq!(map.get("phone").unwrap(), "555");
        // Empty columns are absent, not "known empty".
        assert!(!map.contains_key("hypertension"));
    }

    #[test]
    fn test_read_fields_other_patient_isolated() {
        let (db, patients, writer, catalog) = setup();
        let contact = catalog.topic("contact").unwrap();
        db.with_conn(|conn| evolver::ensure_table(conn, contact))
            .unwrap();

        let mut fields = FieldMap::new();
        fields.insert("phone".into(), "555".into());
        writer.upsert(contact, "p-1", &fields).unwrap();

        let map = patients.read_fields("p-2", &catalog).unwrap();
        assert!(map.is_empty());
    }

    #[test]
    fn test_read_fields_errors_without_patient_column() {
        let (db, patients, _writer, catalog) = setup();

        // A topic table lacking the patient_id key column is unreadable;
        // callers handle the error (the pipeline falls back to its cached
        // snapshot).
        db.with_conn(|conn| {
            conn.execute(
                "CREATE TABLE intake_personal (id INTEGER PRIMARY KEY, first_name TEXT)",
                [],
            )
            .map_err(|e| IntakeError::Storage(e.to_string()))?;
            Ok(())
        })
        .unwrap();

        assert!(patients.read_fields("p-1", &catalog).is_err());
    }

    #[test]
    fn test_read_fields_tolerates_missing_columns() {
        let (db, patients, _writer, catalog) = setup();

        // An older table lacking most of the current catalog.
        db.with_conn(|conn| {
            conn.execute(
                "CREATE TABLE intake_contact (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    patient_id TEXT NOT NULL UNIQUE REFERENCES patients(id),
                    phone TEXT NOT NULL DEFAULT ''
                )",
                [],
            )
            .map_err(|e| IntakeError::Storage(e.to_string()))?;
            ensure_patient_row(conn, "p-1")?;
            conn.execute(
                "INSERT INTO intake_contact (patient_id, phone) VALUES ('p-1', '777')",
                [],
            )
            .map_err(|e| IntakeError::Storage(e.to_string()))?;
            Ok(())
        })
        .unwrap();

        let map = patients.read_fields("p-1", &catalog).unwrap();
        assert_eq!(map.get("phone").unwrap(), "777");
        assert!(!map.contains_key("email"));
    }
}
