//! Hosted audio-transcription backend (Whisper-style multipart API).

use std::path::Path;

use async_trait::async_trait;

use lt_types::{BackendError, LatticeResult, ParameterAssignment};

use crate::backend::{Backend, TaskInput};
use crate::chat_api::DEFAULT_API_BASE;

const API_KEY_VARIABLE: &str = "OPENAI_API_KEY";

/// Transcription backend speaking the `/v1/audio/transcriptions` protocol.
#[derive(Debug)]
pub struct WhisperApiBackend {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl WhisperApiBackend {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            name: "whisper-api".to_string(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn from_env() -> LatticeResult<Self> {
        let api_key = std::env::var(API_KEY_VARIABLE).map_err(|_| BackendError::MissingCredential {
            backend: "whisper-api".to_string(),
            variable: API_KEY_VARIABLE.to_string(),
        })?;
        let base_url =
            std::env::var("OPENAI_API_BASE").unwrap_or_else(|_| DEFAULT_API_BASE.to_string());
        Ok(Self::new(base_url, api_key))
    }

    async fn transcribe_one(
        &self,
        assignment: &ParameterAssignment,
        path: &Path,
    ) -> LatticeResult<String> {
        let model = assignment.require_str("model")?.to_string();
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("audio")
            .to_string();

        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name);
        let mut form = reqwest::multipart::Form::new()
            .text("model", model)
            .part("file", part);
        if let Some(temperature) = assignment.get("temperature").and_then(|v| v.as_f64()) {
            form = form.text("temperature", temperature.to_string());
        }

        let url = format!("{}/v1/audio/transcriptions", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| BackendError::Request {
                backend: self.name.clone(),
                message: format!("HTTP request failed: {e}"),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(BackendError::Request {
                backend: self.name.clone(),
                message: format!("HTTP {status}: {detail}"),
            }
            .into());
        }

        let json: serde_json::Value = response.json().await.map_err(|e| {
            BackendError::UnexpectedResponse {
                backend: self.name.clone(),
                message: format!("response is not JSON: {e}"),
            }
        })?;
        let text = json
            .get("text")
            .and_then(|text| text.as_str())
            .ok_or_else(|| BackendError::UnexpectedResponse {
                backend: self.name.clone(),
                message: "missing text field".to_string(),
            })?;
        Ok(text.trim().to_string())
    }
}

#[async_trait]
impl Backend for WhisperApiBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(
        &self,
        assignment: &ParameterAssignment,
        inputs: &[TaskInput],
    ) -> LatticeResult<Vec<String>> {
        tracing::info!(inputs = inputs.len(), "transcribing audio");

        let mut predictions = Vec::with_capacity(inputs.len());
        for input in inputs {
            let TaskInput::Audio(path) = input else {
                return Err(BackendError::Generation {
                    backend: self.name.clone(),
                    message: "transcription backend received a non-audio input".to_string(),
                }
                .into());
            };
            predictions.push(self.transcribe_one(assignment, path).await?);
        }
        Ok(predictions)
    }
}
