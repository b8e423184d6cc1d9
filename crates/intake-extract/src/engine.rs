//! Engine traits: the contract between the pipeline and the external
//! text-generation service.
//!
//! Both traits are infallible by design. Extraction failure means an empty
//! map; reply failure means a canned fallback. The conversation must never
//! block on a backend failure.

use async_trait::async_trait;

use intake_core::catalog::Catalog;
use intake_core::{FieldMap, Language, Message};

/// Produces a flat field map from a complete conversation transcript.
///
/// Recomputed over the whole transcript on every turn: the underlying call
/// is stateless between invocations, and supplying only the newest turn
/// would silently forget facts stated earlier.
#[async_trait]
pub trait ExtractionEngine: Send + Sync {
    async fn extract(
        &self,
        transcript: &[Message],
        language: Language,
        catalog: &Catalog,
    ) -> FieldMap;
}

/// Produces the assistant's next conversational reply.
///
/// The prompt design behind this lives outside the pipeline; only the
/// contract matters here. `pending_fields` lists the current topic's fields
/// not yet present in the merged map, which is the mechanism that prevents
/// re-asking settled questions.
#[async_trait]
pub trait ReplyEngine: Send + Sync {
    async fn reply(
        &self,
        transcript: &[Message],
        language: Language,
        current_topic: &str,
        pending_fields: &[&str],
    ) -> String;
}

/// Render the catalog guidance included in extraction prompts: canonical
/// field names grouped by topic, so output keys align with the catalog
/// without the engine needing schema awareness.
pub fn render_catalog_hint(catalog: &Catalog) -> String {
    let mut hint = String::new();
    for topic in catalog.topics() {
        hint.push_str(topic.topic);
        hint.push_str(": ");
        hint.push_str(&topic.field_names().join(", "));
        hint.push('\n');
    }
    hint
}

/// Render a transcript as plain labeled lines for prompt inclusion.
pub fn render_transcript(transcript: &[Message]) -> String {
    let mut text = String::new();
    for message in transcript {
        text.push_str(message.role.as_str());
        text.push_str(": ");
        text.push_str(&message.content);
        text.push('\n');
    }
    text
}

/// The reply used when the generation call fails: the conversation proceeds
/// even when the backend does not.
pub fn fallback_reply(language: Language) -> &'static str {
    match language {
        Language::Es => "Disculpa, ¿podrías repetir eso, por favor?",
        Language::En => "Sorry, could you say that again, please?",
    }
}
