//! Pipeline orchestrator: ties session store, extraction, merge, schema
//! evolution, and topic writes together for one conversational turn.

use std::sync::Arc;

use tracing::{debug, info, warn};

use intake_core::catalog::Catalog;
use intake_core::config::PipelineConfig;
use intake_core::{FieldMap, MessageRole, Session, SessionSummary, TurnOutcome, TurnRequest};
use intake_extract::{ExtractionEngine, ReplyEngine};
use intake_storage::{
    normalize_value, Database, PatientRepository, RecordWriter, SchemaEvolver, SessionRepository,
    WriteOutcome,
};

use crate::error::PipelineError;
use crate::locks::SessionLocks;
use crate::merge::merge;
use crate::topics;

/// Central coordinator for conversational intake turns.
///
/// Each turn: append message → extract over the full transcript → merge
/// with freshly read persisted truth → evolve schema and upsert each topic
/// table with data → replace the session snapshot → reply. Failures in
/// extraction, merge-base reads, schema evolution, and topic writes are
/// contained; the conversation always proceeds.
pub struct IntakePipeline {
    sessions: SessionRepository,
    patients: PatientRepository,
    evolver: SchemaEvolver,
    writer: RecordWriter,
    extraction: Arc<dyn ExtractionEngine>,
    replies: Arc<dyn ReplyEngine>,
    catalog: Catalog,
    locks: SessionLocks,
    config: PipelineConfig,
}

impl IntakePipeline {
    pub fn new(
        db: Arc<Database>,
        extraction: Arc<dyn ExtractionEngine>,
        replies: Arc<dyn ReplyEngine>,
        catalog: Catalog,
        config: PipelineConfig,
    ) -> Self {
        Self {
            sessions: SessionRepository::new(Arc::clone(&db)),
            patients: PatientRepository::new(Arc::clone(&db)),
            evolver: SchemaEvolver::new(Arc::clone(&db)),
            writer: RecordWriter::new(db),
            extraction,
            replies,
            catalog,
            locks: SessionLocks::new(),
            config,
        }
    }

    /// Process one inbound turn.
    ///
    /// Turns for the same session id are serialized in arrival order; turns
    /// for distinct sessions run concurrently. The per-session guard spans
    /// the whole turn, including the extraction round trip; the database
    /// lock is never held across an await.
    pub async fn handle_turn(&self, request: TurnRequest) -> Result<TurnOutcome, PipelineError> {
        let message = request.message.trim();
        if message.is_empty() {
            return Err(PipelineError::EmptyMessage);
        }
        if message.chars().count() > self.config.max_message_length {
            return Err(PipelineError::MessageTooLong(self.config.max_message_length));
        }

        let resolved = self.resolve_session(&request)?;
        let lock = self.locks.handle(resolved.id);
        let guard = lock.lock().await;

        // Re-read under the guard: an earlier queued turn may have changed
        // the session while this one waited.
        let session = self
            .sessions
            .get_session(resolved.id)?
            .ok_or(PipelineError::SessionNotFound(resolved.id))?;

        let session = self
            .sessions
            .append_message(session.id, MessageRole::User, message)?;

        let extracted = self
            .extraction
            .extract(&session.messages, request.language, &self.catalog)
            .await;
        debug!(session = %session.id, fields = extracted.len(), "Transcript extraction done");

        let persisted = self.merge_base(&session);
        let merged = merge(&persisted, &extracted);

        let tables_written = match session.patient_id.as_deref() {
            Some(patient_id) => self.write_topics(patient_id, &merged),
            None => {
                debug!(session = %session.id, "Anonymous session; deferring topic writes");
                Vec::new()
            }
        };

        // The merged map becomes the baseline for the next turn. If this
        // fails the turn still completes; the next merge base read heals it.
        let mut session = match self.sessions.replace_extracted(session.id, &merged) {
            Ok(updated) => updated,
            Err(e) => {
                warn!(session = %session.id, error = %e, "Failed to update session snapshot");
                session
            }
        };

        if self.config.auto_advance_topics {
            self.advance_topics(&mut session, &merged);
        }

        let pending = match self.catalog.topic(&session.current_topic) {
            Some(topic) => topics::pending_fields(topic, &merged),
            None => Vec::new(),
        };
        let assistant_reply = self
            .replies
            .reply(
                &session.messages,
                request.language,
                &session.current_topic,
                &pending,
            )
            .await;

        let session = self
            .sessions
            .append_message(session.id, MessageRole::Assistant, &assistant_reply)?;

        drop(guard);
        drop(lock);
        self.locks.release(resolved.id);

        Ok(TurnOutcome {
            session,
            assistant_reply,
            tables_written,
        })
    }

    /// Fetch a session by id.
    pub fn get_session(&self, id: uuid::Uuid) -> Result<Option<Session>, PipelineError> {
        Ok(self.sessions.get_session(id)?)
    }

    /// List all sessions as summaries.
    pub fn list_sessions(&self) -> Result<Vec<SessionSummary>, PipelineError> {
        Ok(self.sessions.list_sessions()?)
    }

    // -- Private helpers --

    /// Resolve an existing session or create a new one. An explicit unknown
    /// session id is the caller's error; a missing id starts a fresh
    /// (possibly anonymous) conversation.
    fn resolve_session(&self, request: &TurnRequest) -> Result<Session, PipelineError> {
        match request.session_id {
            Some(id) => {
                let session = self
                    .sessions
                    .get_session(id)?
                    .ok_or(PipelineError::SessionNotFound(id))?;
                if session.patient_id.is_none() {
                    if let Some(patient_id) = request.patient_id.as_deref() {
                        self.sessions.set_patient(id, patient_id)?;
                        return Ok(self
                            .sessions
                            .get_session(id)?
                            .ok_or(PipelineError::SessionNotFound(id))?);
                    }
                }
                Ok(session)
            }
            None => Ok(self.sessions.create_session(
                request.patient_id.as_deref(),
                self.catalog.first_topic(),
            )?),
        }
    }

    /// Read the merge base fresh from the authoritative store; fall back to
    /// the session's cached snapshot if the read fails.
    fn merge_base(&self, session: &Session) -> FieldMap {
        match session.patient_id.as_deref() {
            Some(patient_id) => match self.patients.read_fields(patient_id, &self.catalog) {
                Ok(map) => map,
                Err(e) => {
                    warn!(
                        session = %session.id,
                        error = %e,
                        "Persisted record unreadable; using session snapshot as merge base"
                    );
                    session.extracted.clone()
                }
            },
            None => session.extracted.clone(),
        }
    }

    /// Evolve schema and upsert every topic table with non-empty data in
    /// the merged map. A failure on one table does not stop the others.
    fn write_topics(&self, patient_id: &str, merged: &FieldMap) -> Vec<String> {
        let mut written = Vec::new();
        for topic in self.catalog.topics() {
            let slice: FieldMap = merged
                .iter()
                .filter(|(name, _)| topic.contains(name))
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect();
            if slice.values().all(|v| normalize_value(v).is_empty()) {
                continue;
            }

            self.evolver.ensure_table(topic);
            match self.writer.upsert(topic, patient_id, &slice) {
                Ok(WriteOutcome::Written) => written.push(topic.table.to_string()),
                Ok(WriteOutcome::NothingToDo) => {}
                Err(e) => {
                    warn!(
                        table = topic.table,
                        error = %e,
                        "Topic write failed; continuing with remaining tables"
                    );
                }
            }
        }
        written
    }

    /// Move the session's topic pointer past topics whose catalog fields
    /// are all present in the merged map.
    fn advance_topics(&self, session: &mut Session, merged: &FieldMap) {
        let (next, completed) = topics::advance(&self.catalog, &session.current_topic, merged);
        for topic in &completed {
            if let Err(e) = self.sessions.complete_topic(session.id, topic) {
                warn!(session = %session.id, topic, error = %e, "Failed to record topic completion");
            } else if !session.completed_topics.iter().any(|t| t == topic) {
                session.completed_topics.push((*topic).to_string());
            }
        }
        if next != session.current_topic {
            match self.sessions.set_current_topic(session.id, next) {
                Ok(()) => {
                    info!(session = %session.id, topic = next, "Advanced to next topic");
                    session.current_topic = next.to_string();
                }
                Err(e) => {
                    warn!(session = %session.id, error = %e, "Failed to advance topic");
                }
            }
        }
    }
}
