//! Backend capability interface and shared generation settings.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use lt_types::{ChatHistory, ConfigError, LatticeResult, ParameterAssignment};

/// One unit of work handed to a backend.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskInput {
    Chat(ChatHistory),
    Audio(PathBuf),
}

/// Capability interface over generation backends: one implementation per
/// backend family, selected by explicit configuration. The core never
/// inspects what is behind this trait.
#[async_trait]
pub trait Backend: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;

    /// Produce exactly one prediction per input, in input order. Any
    /// failure surfaces with the backend name and diagnostic attached;
    /// the caller decides what to persist.
    async fn invoke(
        &self,
        assignment: &ParameterAssignment,
        inputs: &[TaskInput],
    ) -> LatticeResult<Vec<String>>;
}

/// Sampling parameters shared by all generation backends, pulled out of a
/// parameter assignment with type checking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationSettings {
    pub model: String,
    pub temperature: f64,
    pub max_tokens: i64,
    pub top_p: f64,
    /// Number of trailing conversation messages sent as context.
    pub context_length: i64,
}

impl GenerationSettings {
    pub fn from_assignment(assignment: &ParameterAssignment) -> LatticeResult<Self> {
        Ok(Self {
            model: assignment.require_str("model")?.to_string(),
            temperature: assignment.require_f64("temperature")?,
            max_tokens: assignment.require_i64("max_tokens")?,
            top_p: assignment.require_f64("top_p")?,
            context_length: assignment.require_i64("context_length")?,
        })
    }

    pub fn context_window(&self) -> usize {
        self.context_length.max(0) as usize
    }
}

/// Named prompt templates available to a sweep. Assignments carry the
/// template name (so fingerprints stay readable); backends resolve it to
/// the actual system-prompt text here.
#[derive(Debug, Clone, Default)]
pub struct PromptCatalog {
    prompts: HashMap<String, String>,
}

impl PromptCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prompt(mut self, name: impl Into<String>, template: impl Into<String>) -> Self {
        self.prompts.insert(name.into(), template.into());
        self
    }

    pub fn resolve(&self, name: &str) -> LatticeResult<&str> {
        self.prompts
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| {
                ConfigError::UnknownPreset {
                    kind: "prompt".to_string(),
                    name: name.to_string(),
                }
                .into()
            })
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.prompts.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// The system prompt for an assignment, via its `prompt` dimension.
pub(crate) fn resolve_prompt<'a>(
    catalog: &'a PromptCatalog,
    assignment: &ParameterAssignment,
) -> LatticeResult<&'a str> {
    catalog.resolve(assignment.require_str("prompt")?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_assignment() -> ParameterAssignment {
        ParameterAssignment::new()
            .with("model", "gpt-3.5-turbo")
            .with("prompt", "standard")
            .with("temperature", 0.3)
            .with("max_tokens", 100)
            .with("top_p", 1.0)
            .with("context_length", 4)
    }

    #[test]
    fn settings_pull_typed_values() {
        let settings = GenerationSettings::from_assignment(&full_assignment()).unwrap();
        assert_eq!(settings.model, "gpt-3.5-turbo");
        assert_eq!(settings.temperature, 0.3);
        assert_eq!(settings.max_tokens, 100);
        assert_eq!(settings.context_window(), 4);
    }

    #[test]
    fn settings_reject_missing_and_mistyped_values() {
        let missing = ParameterAssignment::new().with("model", "m");
        assert!(GenerationSettings::from_assignment(&missing).is_err());

        let mistyped = full_assignment().with("temperature", "hot");
        let err = GenerationSettings::from_assignment(&mistyped).unwrap_err();
        match err {
            lt_types::LatticeError::Config(ConfigError::WrongValueType { name, .. }) => {
                assert_eq!(name, "temperature");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn integer_temperature_widens_to_float() {
        let assignment = full_assignment().with("temperature", 1);
        let settings = GenerationSettings::from_assignment(&assignment).unwrap();
        assert_eq!(settings.temperature, 1.0);
    }

    #[test]
    fn prompt_catalog_resolves_by_name() {
        let catalog = PromptCatalog::new().with_prompt("standard", "You are helpful.");
        assert_eq!(catalog.resolve("standard").unwrap(), "You are helpful.");

        let err = catalog.resolve("missing").unwrap_err();
        match err {
            lt_types::LatticeError::Config(ConfigError::UnknownPreset { kind, name }) => {
                assert_eq!((kind.as_str(), name.as_str()), ("prompt", "missing"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
