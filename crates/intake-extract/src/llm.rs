//! Chat-completions client and the LLM-backed engine implementations.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use intake_core::catalog::Catalog;
use intake_core::config::LlmConfig;
use intake_core::{FieldMap, Language, Message};

use crate::engine::{
    fallback_reply, render_catalog_hint, render_transcript, ExtractionEngine, ReplyEngine,
};
use crate::error::ExtractError;
use crate::parser::parse_field_map;

/// Thin client for an OpenAI-style chat-completions endpoint.
pub struct LlmClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
    temperature: f64,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

impl LlmClient {
    /// Build a client from config, reading the API key from the configured
    /// environment variable.
    pub fn from_config(config: &LlmConfig) -> Result<Self, ExtractError> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| ExtractError::MissingApiKey(config.api_key_env.clone()))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key,
            temperature: config.extraction_temperature,
        })
    }

    /// One completion round trip: system prompt + user payload in, raw
    /// assistant text out.
    pub async fn complete(&self, system: &str, user: &str) -> Result<String, ExtractError> {
        let body = json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
        });

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExtractError::Status(status.as_u16()));
        }

        let completion: CompletionResponse = response.json().await?;
        completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|content| !content.is_empty())
            .ok_or(ExtractError::EmptyResponse)
    }
}

/// LLM-backed implementation of both engine traits.
pub struct LlmEngine {
    client: LlmClient,
}

impl LlmEngine {
    pub fn new(client: LlmClient) -> Self {
        Self { client }
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, ExtractError> {
        Ok(Self::new(LlmClient::from_config(config)?))
    }
}

#[async_trait]
impl ExtractionEngine for LlmEngine {
    async fn extract(
        &self,
        transcript: &[Message],
        language: Language,
        catalog: &Catalog,
    ) -> FieldMap {
        let system = format!(
            "You extract structured intake data from a conversation transcript. \
             Respond with exactly one JSON object and nothing else. Keys must be \
             canonical field names from this catalog (omit anything not stated \
             by the user):\n{}\nConversation language: {}.",
            render_catalog_hint(catalog),
            language.as_str(),
        );
        let user = render_transcript(transcript);

        match self.client.complete(&system, &user).await {
            Ok(raw) => {
                let map = parse_field_map(&raw);
                debug!(fields = map.len(), "Extraction completed");
                map
            }
            Err(e) => {
                warn!(error = %e, "Extraction call failed; no new fields this turn");
                FieldMap::new()
            }
        }
    }
}

#[async_trait]
impl ReplyEngine for LlmEngine {
    async fn reply(
        &self,
        transcript: &[Message],
        language: Language,
        current_topic: &str,
        pending_fields: &[&str],
    ) -> String {
        let system = format!(
            "You are a warm, concise clinical intake assistant. Reply in '{}'. \
             The current intake topic is '{}'. Ask only about information that \
             is still missing: {}. Never re-ask for information the patient \
             already provided. Ask at most two questions per message.",
            language.as_str(),
            current_topic,
            if pending_fields.is_empty() {
                "nothing; acknowledge and move the conversation forward".to_string()
            } else {
                pending_fields.join(", ")
            },
        );
        let user = render_transcript(transcript);

        match self.client.complete(&system, &user).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "Reply call failed; using fallback");
                fallback_reply(language).to_string()
            }
        }
    }
}
