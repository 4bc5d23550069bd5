//! Language-model and speech-to-text clients.
//!
//! [`LlmClient`] is the opaque text-completion seam: components hand it a
//! system prompt and a user prompt and get raw text back. [`Transcriber`]
//! turns an uploaded audio file into text for the voice chat path. Both are
//! constructed once at startup and injected as `Arc<dyn …>`, which is also
//! what lets the test suite substitute deterministic doubles.
//!
//! [`OpenAiClient`] implements both traits against the OpenAI API with the
//! same retry discipline as the embedding client: 429/5xx/network errors are
//! retried with exponential backoff, other 4xx fail immediately.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::time::Duration;

use crate::config::LlmConfig;

/// Opaque hosted text-completion function.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send one system + user prompt pair, return the model's raw text.
    async fn complete(&self, system: &str, user: &str) -> Result<String>;
}

/// Speech-to-text for the voice chat endpoint.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: Vec<u8>, filename: &str) -> Result<String>;
}

/// OpenAI-backed chat completion and transcription client.
pub struct OpenAiClient {
    model: String,
    transcription_model: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAiClient {
    /// # Errors
    ///
    /// Returns an error if `OPENAI_API_KEY` is not in the environment.
    pub fn new(config: &LlmConfig) -> Result<Self> {
        if std::env::var("OPENAI_API_KEY").is_err() {
            bail!("OPENAI_API_KEY environment variable not set");
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model: config.model.clone(),
            transcription_model: config.transcription_model.clone(),
            max_retries: config.max_retries,
            client,
        })
    }

    fn api_key(&self) -> Result<String> {
        std::env::var("OPENAI_API_KEY").map_err(|_| anyhow::anyhow!("OPENAI_API_KEY not set"))
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let api_key = self.api_key()?;

        let body = serde_json::json!({
            "model": self.model,
            "temperature": 0,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post("https://api.openai.com/v1/chat/completions")
                .header("Authorization", format!("Bearer {}", api_key))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        return parse_completion_response(&json);
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(anyhow::anyhow!(
                            "OpenAI completion error {}: {}",
                            status,
                            body_text
                        ));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    bail!("OpenAI completion error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Completion failed after retries")))
    }
}

#[async_trait]
impl Transcriber for OpenAiClient {
    async fn transcribe(&self, audio: Vec<u8>, filename: &str) -> Result<String> {
        let api_key = self.api_key()?;

        let part = reqwest::multipart::Part::bytes(audio).file_name(filename.to_string());
        let form = reqwest::multipart::Form::new()
            .text("model", self.transcription_model.clone())
            .part("file", part);

        let response = self
            .client
            .post("https://api.openai.com/v1/audio/transcriptions")
            .header("Authorization", format!("Bearer {}", api_key))
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("OpenAI transcription error {}: {}", status, body_text);
        }

        let json: serde_json::Value = response.json().await?;
        json.get("text")
            .and_then(|t| t.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("Invalid transcription response: missing text"))
    }
}

/// Extract `choices[0].message.content` from a chat-completions response.
fn parse_completion_response(json: &serde_json::Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|t| t.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| anyhow::anyhow!("Invalid completion response: missing message content"))
}
