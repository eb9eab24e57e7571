//! Built-in model and prompt presets. CLI flags refer to presets by their
//! short name; assignments carry the resolved values.

use lt_run::PromptCatalog;
use lt_types::{ConfigError, LatticeResult};

/// A short CLI name for a fully qualified model id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelPreset {
    pub name: &'static str,
    pub model_id: &'static str,
}

/// A named system-prompt template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptPreset {
    pub name: &'static str,
    pub template: &'static str,
}

const CHAT_MODELS: &[ModelPreset] = &[
    ModelPreset {
        name: "gpt-4o-mini",
        model_id: "gpt-4o-mini-2024-07-18",
    },
    ModelPreset {
        name: "gpt-4o",
        model_id: "gpt-4o-2024-08-06",
    },
    ModelPreset {
        name: "llama-3-8b",
        model_id: "meta-llama/Meta-Llama-3-8B-Instruct",
    },
    ModelPreset {
        name: "mistral-7b",
        model_id: "mistralai/Mistral-7B-Instruct-v0.2",
    },
];

const TRANSCRIPTION_MODELS: &[ModelPreset] = &[
    ModelPreset {
        name: "whisper-1",
        model_id: "whisper-1",
    },
    ModelPreset {
        name: "whisper-large-v3",
        model_id: "whisper-large-v3",
    },
];

const PROMPTS: &[PromptPreset] = &[
    PromptPreset {
        name: "concise",
        template: "You are a concise assistant. Answer the question directly, \
                   without preamble or filler.",
    },
    PromptPreset {
        name: "detailed",
        template: "You are a careful assistant. Work through the question step \
                   by step, then state the final answer on its own line.",
    },
    PromptPreset {
        name: "persona",
        template: "You are a friendly support agent. Stay in character, keep \
                   replies short, and never invent facts you were not given.",
    },
];

pub fn chat_models() -> &'static [ModelPreset] {
    CHAT_MODELS
}

pub fn transcription_models() -> &'static [ModelPreset] {
    TRANSCRIPTION_MODELS
}

pub fn prompts() -> &'static [PromptPreset] {
    PROMPTS
}

fn find_model(
    presets: &'static [ModelPreset],
    name: &str,
) -> LatticeResult<&'static ModelPreset> {
    presets.iter().find(|preset| preset.name == name).ok_or_else(|| {
        ConfigError::UnknownPreset {
            kind: "model".to_string(),
            name: name.to_string(),
        }
        .into()
    })
}

pub fn chat_model(name: &str) -> LatticeResult<&'static ModelPreset> {
    find_model(CHAT_MODELS, name)
}

pub fn transcription_model(name: &str) -> LatticeResult<&'static ModelPreset> {
    find_model(TRANSCRIPTION_MODELS, name)
}

pub fn prompt(name: &str) -> LatticeResult<&'static PromptPreset> {
    PROMPTS.iter().find(|preset| preset.name == name).ok_or_else(|| {
        ConfigError::UnknownPreset {
            kind: "prompt".to_string(),
            name: name.to_string(),
        }
        .into()
    })
}

/// Catalog mapping every built-in prompt name to its template text.
pub fn prompt_catalog() -> PromptCatalog {
    PROMPTS.iter().fold(PromptCatalog::new(), |catalog, preset| {
        catalog.with_prompt(preset.name, preset.template)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_resolve_by_name() {
        assert_eq!(chat_model("gpt-4o").unwrap().model_id, "gpt-4o-2024-08-06");
        assert_eq!(prompt("concise").unwrap().name, "concise");
        assert!(chat_model("gpt-2").is_err());
        assert!(prompt("sarcastic").is_err());
    }

    #[test]
    fn catalog_covers_every_prompt_preset() {
        let catalog = prompt_catalog();
        for preset in prompts() {
            assert_eq!(catalog.resolve(preset.name).unwrap(), preset.template);
        }
    }
}
