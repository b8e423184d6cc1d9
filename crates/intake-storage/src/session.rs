//! Durable session store.
//!
//! Sessions live in SQLite, never in a process-local map, so they survive
//! restarts and can be shared across service instances. The store has no
//! merge semantics of its own: `replace_extracted` is a full replace, and
//! callers are expected to merge before writing.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

use intake_core::error::IntakeError;
use intake_core::{FieldMap, Message, MessageRole, Session, SessionSummary};

use crate::db::Database;

/// Repository for conversation sessions and their message logs.
pub struct SessionRepository {
    db: Arc<Database>,
}

impl SessionRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Create a new session with an empty message list and empty snapshot.
    ///
    /// All-or-nothing: either the full row is inserted or an error is
    /// returned; no partial sessions.
    pub fn create_session(
        &self,
        patient_id: Option<&str>,
        initial_topic: &str,
    ) -> Result<Session, IntakeError> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        self.db.with_conn(|conn| {
            if let Some(pid) = patient_id {
                ensure_patient_row(conn, pid)?;
            }
            conn.execute(
                "INSERT INTO sessions (id, patient_id, current_topic, completed_topics, extracted, created_at, updated_at)
                 VALUES (?1, ?2, ?3, '[]', '{}', ?4, ?4)",
                rusqlite::params![id.to_string(), patient_id, initial_topic, now.timestamp()],
            )
            .map_err(|e| IntakeError::Storage(format!("Failed to create session: {}", e)))?;
            Ok(())
        })?;

        Ok(Session {
            id,
            patient_id: patient_id.map(str::to_string),
            messages: Vec::new(),
            current_topic: initial_topic.to_string(),
            completed_topics: Vec::new(),
            extracted: FieldMap::new(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Fetch a session with its full ordered message log.
    pub fn get_session(&self, id: Uuid) -> Result<Option<Session>, IntakeError> {
        self.db.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, patient_id, current_topic, completed_topics, extracted, created_at, updated_at
                     FROM sessions WHERE id = ?1",
                    rusqlite::params![id.to_string()],
                    row_to_session_shell,
                )
                .optional()
                .map_err(|e| IntakeError::Storage(e.to_string()))?;

            let mut session = match row {
                Some(s) => s?,
                None => return Ok(None),
            };
            session.messages = load_messages(conn, id)?;
            Ok(Some(session))
        })
    }

    /// Append a message to the session log. Pure append: existing entries
    /// are never touched.
    pub fn append_message(
        &self,
        id: Uuid,
        role: MessageRole,
        content: &str,
    ) -> Result<Session, IntakeError> {
        let now = Utc::now();
        self.db.with_conn(|conn| {
            require_session(conn, id)?;
            conn.execute(
                "INSERT INTO session_messages (session_id, role, content, timestamp)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![id.to_string(), role.as_str(), content, now.timestamp()],
            )
            .map_err(|e| IntakeError::Storage(format!("Failed to append message: {}", e)))?;
            touch_session(conn, id, now)?;
            Ok(())
        })?;

        self.must_get(id)
    }

    /// Replace the session's extracted-field snapshot.
    ///
    /// Full replace, not a merge. Callers perform merging themselves and
    /// pass the final map.
    pub fn replace_extracted(&self, id: Uuid, map: &FieldMap) -> Result<Session, IntakeError> {
        let snapshot = serde_json::to_string(map)?;
        let now = Utc::now();
        self.db.with_conn(|conn| {
            require_session(conn, id)?;
            conn.execute(
                "UPDATE sessions SET extracted = ?2, updated_at = ?3 WHERE id = ?1",
                rusqlite::params![id.to_string(), snapshot, now.timestamp()],
            )
            .map_err(|e| IntakeError::Storage(format!("Failed to replace snapshot: {}", e)))?;
            Ok(())
        })?;

        self.must_get(id)
    }

    /// Point the session at a new topic.
    pub fn set_current_topic(&self, id: Uuid, topic: &str) -> Result<(), IntakeError> {
        let now = Utc::now();
        self.db.with_conn(|conn| {
            require_session(conn, id)?;
            conn.execute(
                "UPDATE sessions SET current_topic = ?2, updated_at = ?3 WHERE id = ?1",
                rusqlite::params![id.to_string(), topic, now.timestamp()],
            )
            .map_err(|e| IntakeError::Storage(format!("Failed to set topic: {}", e)))?;
            Ok(())
        })
    }

    /// Record a topic as completed (no-op if already recorded).
    pub fn complete_topic(&self, id: Uuid, topic: &str) -> Result<(), IntakeError> {
        let now = Utc::now();
        self.db.with_conn(|conn| {
            let raw: String = conn
                .query_row(
                    "SELECT completed_topics FROM sessions WHERE id = ?1",
                    rusqlite::params![id.to_string()],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|e| IntakeError::Storage(e.to_string()))?
                .ok_or(IntakeError::SessionNotFound(id))?;

            let mut completed: Vec<String> = serde_json::from_str(&raw).unwrap_or_default();
            if completed.iter().any(|t| t == topic) {
                return Ok(());
            }
            completed.push(topic.to_string());

            conn.execute(
                "UPDATE sessions SET completed_topics = ?2, updated_at = ?3 WHERE id = ?1",
                rusqlite::params![
                    id.to_string(),
                    serde_json::to_string(&completed)?,
                    now.timestamp()
                ],
            )
            .map_err(|e| IntakeError::Storage(format!("Failed to complete topic: {}", e)))?;
            Ok(())
        })
    }

    /// Attach a parent record to a previously anonymous session.
    pub fn set_patient(&self, id: Uuid, patient_id: &str) -> Result<(), IntakeError> {
        let now = Utc::now();
        self.db.with_conn(|conn| {
            require_session(conn, id)?;
            ensure_patient_row(conn, patient_id)?;
            conn.execute(
                "UPDATE sessions SET patient_id = ?2, updated_at = ?3 WHERE id = ?1",
                rusqlite::params![id.to_string(), patient_id, now.timestamp()],
            )
            .map_err(|e| IntakeError::Storage(format!("Failed to set patient: {}", e)))?;
            Ok(())
        })
    }

    /// List all sessions as summaries, most recently updated first.
    pub fn list_sessions(&self) -> Result<Vec<SessionSummary>, IntakeError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT s.id, s.patient_id, s.current_topic, s.created_at, s.updated_at,
                            (SELECT COUNT(*) FROM session_messages m WHERE m.session_id = s.id)
                     FROM sessions s
                     ORDER BY s.updated_at DESC",
                )
                .map_err(|e| IntakeError::Storage(e.to_string()))?;

            let rows = stmt
                .query_map([], |row| {
                    let id_str: String = row.get(0)?;
                    let patient_id: Option<String> = row.get(1)?;
                    let current_topic: String = row.get(2)?;
                    let created_at: i64 = row.get(3)?;
                    let updated_at: i64 = row.get(4)?;
                    let message_count: i64 = row.get(5)?;
                    Ok((id_str, patient_id, current_topic, created_at, updated_at, message_count))
                })
                .map_err(|e| IntakeError::Storage(e.to_string()))?;

            let mut summaries = Vec::new();
            for row in rows {
                let (id_str, patient_id, current_topic, created_at, updated_at, message_count) =
                    row.map_err(|e| IntakeError::Storage(e.to_string()))?;
                summaries.push(SessionSummary {
                    id: Uuid::parse_str(&id_str)
                        .map_err(|e| IntakeError::Storage(format!("Invalid UUID: {}", e)))?,
                    patient_id,
                    current_topic,
                    message_count: message_count as usize,
                    created_at: epoch_to_utc(created_at),
                    updated_at: epoch_to_utc(updated_at),
                });
            }
            Ok(summaries)
        })
    }

    fn must_get(&self, id: Uuid) -> Result<Session, IntakeError> {
        self.get_session(id)?
            .ok_or(IntakeError::SessionNotFound(id))
    }
}

/// Insert the parent record row if it does not exist yet.
pub(crate) fn ensure_patient_row(conn: &Connection, patient_id: &str) -> Result<(), IntakeError> {
    conn.execute(
        "INSERT OR IGNORE INTO patients (id) VALUES (?1)",
        rusqlite::params![patient_id],
    )
    .map_err(|e| IntakeError::Storage(format!("Failed to ensure patient row: {}", e)))?;
    Ok(())
}

fn require_session(conn: &Connection, id: Uuid) -> Result<(), IntakeError> {
    let exists: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM sessions WHERE id = ?1",
            rusqlite::params![id.to_string()],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| IntakeError::Storage(e.to_string()))?;
    if exists.is_none() {
        return Err(IntakeError::SessionNotFound(id));
    }
    Ok(())
}

fn touch_session(conn: &Connection, id: Uuid, now: DateTime<Utc>) -> Result<(), IntakeError> {
    conn.execute(
        "UPDATE sessions SET updated_at = ?2 WHERE id = ?1",
        rusqlite::params![id.to_string(), now.timestamp()],
    )
    .map_err(|e| IntakeError::Storage(format!("Failed to touch session: {}", e)))?;
    Ok(())
}

fn load_messages(conn: &Connection, id: Uuid) -> Result<Vec<Message>, IntakeError> {
    let mut stmt = conn
        .prepare(
            "SELECT role, content, timestamp FROM session_messages
             WHERE session_id = ?1 ORDER BY id ASC",
        )
        .map_err(|e| IntakeError::Storage(e.to_string()))?;

    let rows = stmt
        .query_map(rusqlite::params![id.to_string()], |row| {
            let role: String = row.get(0)?;
            let content: String = row.get(1)?;
            let timestamp: i64 = row.get(2)?;
            Ok((role, content, timestamp))
        })
        .map_err(|e| IntakeError::Storage(e.to_string()))?;

    let mut messages = Vec::new();
    for row in rows {
        let (role, content, timestamp) = row.map_err(|e| IntakeError::Storage(e.to_string()))?;
        messages.push(Message {
            role: MessageRole::parse(&role),
            content,
            timestamp: epoch_to_utc(timestamp),
        });
    }
    Ok(messages)
}

fn row_to_session_shell(row: &rusqlite::Row<'_>) -> rusqlite::Result<Result<Session, IntakeError>> {
    let id_str: String = row.get(0)?;
    let patient_id: Option<String> = row.get(1)?;
    let current_topic: String = row.get(2)?;
    let completed_raw: String = row.get(3)?;
    let extracted_raw: String = row.get(4)?;
    let created_at: i64 = row.get(5)?;
    let updated_at: i64 = row.get(6)?;

    Ok((|| {
        Ok(Session {
            id: Uuid::parse_str(&id_str)
                .map_err(|e| IntakeError::Storage(format!("Invalid UUID: {}", e)))?,
            patient_id,
            messages: Vec::new(),
            current_topic,
            completed_topics: serde_json::from_str(&completed_raw).unwrap_or_default(),
            extracted: serde_json::from_str(&extracted_raw).unwrap_or_default(),
            created_at: epoch_to_utc(created_at),
            updated_at: epoch_to_utc(updated_at),
        })
    })())
}

fn epoch_to_utc(epoch: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(epoch, 0).single().unwrap_or_default()
}
