//! Shared domain types for the intake pipeline.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A flat mapping from canonical field name to a value serialized as text.
///
/// Absence of a key means "not known", never "known empty". A `BTreeMap`
/// keeps iteration order deterministic for SQL generation and tests.
pub type FieldMap = BTreeMap<String, String>;

/// Conversation language for extraction and replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Es,
    En,
}

impl Default for Language {
    fn default() -> Self {
        Language::Es
    }
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Es => "es",
            Language::En => "en",
        }
    }
}

/// Who authored a message in the transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }

    /// Parse a stored role string; unknown values default to `User`.
    pub fn parse(s: &str) -> Self {
        match s {
            "assistant" => MessageRole::Assistant,
            _ => MessageRole::User,
        }
    }
}

/// One message in a conversation. Immutable once appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// The durable record of one ongoing conversation.
///
/// `extracted` is the snapshot of the merged field map as of the last
/// completed turn; it becomes the fallback merge base when the
/// authoritative store cannot be read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    /// Parent record id, `None` while the conversation is still anonymous.
    pub patient_id: Option<String>,
    pub messages: Vec<Message>,
    pub current_topic: String,
    pub completed_topics: Vec<String>,
    pub extracted: FieldMap,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Lightweight session listing entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: Uuid,
    pub patient_id: Option<String>,
    pub current_topic: String,
    pub message_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One inbound conversational turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRequest {
    pub session_id: Option<Uuid>,
    pub patient_id: Option<String>,
    pub message: String,
    #[serde(default)]
    pub language: Language,
}

/// Result of processing one turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnOutcome {
    pub session: Session,
    pub assistant_reply: String,
    /// Topic tables actually written this turn (partial success is normal).
    pub tables_written: Vec<String>,
}
