//! Hosted chat-completion API backend (OpenAI-style wire format).

use async_trait::async_trait;

use lt_types::{BackendError, LatticeResult, ParameterAssignment};

use crate::backend::{resolve_prompt, Backend, GenerationSettings, PromptCatalog, TaskInput};

pub const DEFAULT_API_BASE: &str = "https://api.openai.com";
const API_KEY_VARIABLE: &str = "OPENAI_API_KEY";

/// Chat backend speaking the `/v1/chat/completions` protocol.
#[derive(Debug)]
pub struct ChatApiBackend {
    name: String,
    base_url: String,
    api_key: String,
    prompts: PromptCatalog,
    client: reqwest::Client,
}

impl ChatApiBackend {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        prompts: PromptCatalog,
    ) -> Self {
        Self {
            name: "chat-api".to_string(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            prompts,
            client: reqwest::Client::new(),
        }
    }

    /// Build from the environment: `OPENAI_API_KEY` must be set,
    /// `OPENAI_API_BASE` optionally overrides the endpoint.
    pub fn from_env(prompts: PromptCatalog) -> LatticeResult<Self> {
        let api_key = std::env::var(API_KEY_VARIABLE).map_err(|_| BackendError::MissingCredential {
            backend: "chat-api".to_string(),
            variable: API_KEY_VARIABLE.to_string(),
        })?;
        let base_url =
            std::env::var("OPENAI_API_BASE").unwrap_or_else(|_| DEFAULT_API_BASE.to_string());
        Ok(Self::new(base_url, api_key, prompts))
    }

    fn build_messages(
        &self,
        template: &str,
        history: &lt_types::ChatHistory,
        settings: &GenerationSettings,
    ) -> Vec<serde_json::Value> {
        let mut messages = vec![serde_json::json!({
            "role": "system",
            "content": template,
        })];
        for message in &history.window(settings.context_window()).messages {
            messages.push(serde_json::json!({
                "role": message.role.to_string(),
                "content": message.content,
            }));
        }
        messages
    }

    async fn complete_one(
        &self,
        settings: &GenerationSettings,
        messages: Vec<serde_json::Value>,
    ) -> LatticeResult<String> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = serde_json::json!({
            "model": settings.model,
            "messages": messages,
            "temperature": settings.temperature,
            "max_tokens": settings.max_tokens,
            "top_p": settings.top_p,
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
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

        let content = json
            .get("choices")
            .and_then(|choices| choices.get(0))
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(|content| content.as_str())
            .ok_or_else(|| BackendError::UnexpectedResponse {
                backend: self.name.clone(),
                message: "missing choices[0].message.content".to_string(),
            })?;
        Ok(content.to_string())
    }
}

#[async_trait]
impl Backend for ChatApiBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(
        &self,
        assignment: &ParameterAssignment,
        inputs: &[TaskInput],
    ) -> LatticeResult<Vec<String>> {
        let settings = GenerationSettings::from_assignment(assignment)?;
        let template = resolve_prompt(&self.prompts, assignment)?;
        tracing::info!(
            model = %settings.model,
            inputs = inputs.len(),
            "requesting chat completions"
        );

        let mut predictions = Vec::with_capacity(inputs.len());
        for input in inputs {
            let TaskInput::Chat(history) = input else {
                return Err(BackendError::Generation {
                    backend: self.name.clone(),
                    message: "chat backend received a non-chat input".to_string(),
                }
                .into());
            };
            let messages = self.build_messages(template, history, &settings);
            predictions.push(self.complete_one(&settings, messages).await?);
        }
        Ok(predictions)
    }
}
