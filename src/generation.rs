//! Text-generation service client.
//!
//! A single stateless request/response call: instructions plus input text in,
//! generated text out. Failures here are handler-level, never retried by the
//! processing loop, and never take the process down. The request carries a
//! timeout even though the upstream service contract has none; an unbounded
//! stall would otherwise freeze the whole loop.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::GenerationConfig;
use crate::error::{AyayeError, Result};

/// Trait for the text-generation service.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Run one generation: returns the output text or fails.
    async fn generate(&self, instructions: &str, input: &str) -> Result<String>;
}

#[derive(Serialize)]
struct GenerationRequest<'a> {
    model: &'a str,
    instructions: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct GenerationResponse {
    /// Convenience field some gateways set directly
    #[serde(default)]
    output_text: Option<String>,
    /// Structured output as the OpenAI responses API returns it
    #[serde(default)]
    output: Vec<OutputItem>,
}

#[derive(Deserialize)]
struct OutputItem {
    #[serde(default)]
    content: Vec<ContentPart>,
}

#[derive(Deserialize)]
struct ContentPart {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    text: String,
}

impl GenerationResponse {
    fn into_text(self) -> Option<String> {
        if let Some(text) = self.output_text {
            return Some(text);
        }
        let text: String = self
            .output
            .into_iter()
            .flat_map(|item| item.content)
            .filter(|part| part.kind == "output_text")
            .map(|part| part.text)
            .collect();
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

/// OpenAI-compatible generation client.
pub struct OpenAiGenerator {
    http: reqwest::Client,
    url: String,
    model: String,
    api_key: String,
}

impl OpenAiGenerator {
    /// Build a client from configuration, loading the API key from the
    /// mounted credential file.
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let api_key = config.load_api_key()?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AyayeError::generation_transport("cannot build HTTP client", e))?;
        Ok(Self {
            http,
            url: format!("{}/v1/responses", config.url.trim_end_matches('/')),
            model: config.model.clone(),
            api_key,
        })
    }
}

#[async_trait]
impl Generator for OpenAiGenerator {
    async fn generate(&self, instructions: &str, input: &str) -> Result<String> {
        let request = GenerationRequest {
            model: &self.model,
            instructions,
            input,
        };

        let response = self
            .http
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AyayeError::generation_transport("generation request failed", e))?
            .error_for_status()
            .map_err(|e| AyayeError::generation_transport("generation request rejected", e))?;

        let body: GenerationResponse = response
            .json()
            .await
            .map_err(|e| AyayeError::generation_transport("generation response bad body", e))?;

        body.into_text()
            .ok_or_else(|| AyayeError::generation("generation response had no output text"))
    }
}
