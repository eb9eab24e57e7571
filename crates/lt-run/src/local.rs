//! Self-hosted inference backends: text-generation-inference and vLLM.
//!
//! Both speak to a completion-style endpoint, so the conversation is
//! rendered to a flat text prompt ending with an `assistant:` cue.

use async_trait::async_trait;

use lt_types::{BackendError, ChatHistory, LatticeResult, ParameterAssignment};

use crate::backend::{resolve_prompt, Backend, GenerationSettings, PromptCatalog, TaskInput};

fn completion_prompt(
    template: &str,
    history: &ChatHistory,
    settings: &GenerationSettings,
) -> String {
    let context = history.window(settings.context_window()).render();
    format!("{template}\n\n{context}\nassistant:")
}

fn expect_chat<'a>(input: &'a TaskInput, backend: &str) -> LatticeResult<&'a ChatHistory> {
    match input {
        TaskInput::Chat(history) => Ok(history),
        TaskInput::Audio(_) => Err(BackendError::Generation {
            backend: backend.to_string(),
            message: "chat backend received a non-chat input".to_string(),
        }
        .into()),
    }
}

// ---- text-generation-inference ----

/// Backend for a HuggingFace text-generation-inference server.
#[derive(Debug)]
pub struct TgiBackend {
    name: String,
    base_url: String,
    prompts: PromptCatalog,
    client: reqwest::Client,
}

impl TgiBackend {
    pub fn new(base_url: impl Into<String>, prompts: PromptCatalog) -> Self {
        Self {
            name: "tgi".to_string(),
            base_url: base_url.into(),
            prompts,
            client: reqwest::Client::new(),
        }
    }

    async fn generate_one(
        &self,
        settings: &GenerationSettings,
        prompt: String,
    ) -> LatticeResult<String> {
        // TGI rejects temperature 0.0; zero means greedy decoding instead.
        let parameters = if settings.temperature > 0.0 {
            serde_json::json!({
                "temperature": settings.temperature,
                "top_p": settings.top_p,
                "max_new_tokens": settings.max_tokens,
                "do_sample": true,
            })
        } else {
            serde_json::json!({
                "max_new_tokens": settings.max_tokens,
                "do_sample": false,
            })
        };
        let body = serde_json::json!({
            "inputs": prompt,
            "parameters": parameters,
        });

        let url = format!("{}/generate", self.base_url);
        let response = self
            .client
            .post(&url)
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
        let text = json
            .get("generated_text")
            .and_then(|text| text.as_str())
            .ok_or_else(|| BackendError::UnexpectedResponse {
                backend: self.name.clone(),
                message: "missing generated_text".to_string(),
            })?;
        Ok(text.trim().to_string())
    }
}

#[async_trait]
impl Backend for TgiBackend {
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
        tracing::info!(model = %settings.model, inputs = inputs.len(), "generating via tgi");

        let mut predictions = Vec::with_capacity(inputs.len());
        for input in inputs {
            let history = expect_chat(input, &self.name)?;
            let prompt = completion_prompt(template, history, &settings);
            predictions.push(self.generate_one(&settings, prompt).await?);
        }
        Ok(predictions)
    }
}

// ---- vLLM ----

/// Backend for a vLLM server exposing the OpenAI-compatible completions API.
#[derive(Debug)]
pub struct VllmBackend {
    name: String,
    base_url: String,
    prompts: PromptCatalog,
    client: reqwest::Client,
}

impl VllmBackend {
    pub fn new(base_url: impl Into<String>, prompts: PromptCatalog) -> Self {
        Self {
            name: "vllm".to_string(),
            base_url: base_url.into(),
            prompts,
            client: reqwest::Client::new(),
        }
    }

    async fn complete_one(
        &self,
        settings: &GenerationSettings,
        prompt: String,
    ) -> LatticeResult<String> {
        let body = serde_json::json!({
            "model": settings.model,
            "prompt": prompt,
            "temperature": settings.temperature,
            "top_p": settings.top_p,
            "max_tokens": settings.max_tokens,
        });

        let url = format!("{}/v1/completions", self.base_url);
        let response = self
            .client
            .post(&url)
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
        let text = json
            .get("choices")
            .and_then(|choices| choices.get(0))
            .and_then(|choice| choice.get("text"))
            .and_then(|text| text.as_str())
            .ok_or_else(|| BackendError::UnexpectedResponse {
                backend: self.name.clone(),
                message: "missing choices[0].text".to_string(),
            })?;
        Ok(text.trim().to_string())
    }
}

#[async_trait]
impl Backend for VllmBackend {
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
        tracing::info!(model = %settings.model, inputs = inputs.len(), "generating via vllm");

        let mut predictions = Vec::with_capacity(inputs.len());
        for input in inputs {
            let history = expect_chat(input, &self.name)?;
            let prompt = completion_prompt(template, history, &settings);
            predictions.push(self.complete_one(&settings, prompt).await?);
        }
        Ok(predictions)
    }
}
