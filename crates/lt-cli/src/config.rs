//! Sweep configuration assembled from CLI options and the preset
//! registries. Everything is explicit: options come in, a validated config
//! comes out, and nothing is read from process-global state afterwards.

use std::path::{Path, PathBuf};

use tracing::debug;

use lt_optimizer::{CompositeSearchSpace, DimensionKind, SearchSpace};
use lt_run::{DataFormat, DatasetSpec};
use lt_types::{config_error, ConfigError, LatticeResult};

use crate::presets;

const DEFAULT_TEMPERATURE: f64 = 0.0;
const DEFAULT_MAX_TOKENS: i64 = 256;
const DEFAULT_TOP_P: f64 = 1.0;
const DEFAULT_CONTEXT_LENGTH: i64 = 8;

const TEMPERATURE_CHOICES: [f64; 4] = [0.0, 0.3, 0.7, 1.0];
const CONTEXT_LENGTH_CHOICES: [i64; 4] = [2, 4, 8, 16];

const SYNTHETIC_SEED: u64 = 17;
const SYNTHETIC_EXAMPLES: usize = 32;

/// Where chat completions are generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InferenceMethod {
    /// Hosted chat-completions API, credentials from the environment.
    Api,
    /// Local text-generation-inference server.
    Tgi,
    /// Local vLLM server speaking the completions protocol.
    Vllm,
}

impl InferenceMethod {
    pub fn default_base_url(self) -> Option<&'static str> {
        match self {
            Self::Api => None,
            Self::Tgi => Some("http://localhost:8080"),
            Self::Vllm => Some("http://localhost:8000"),
        }
    }
}

/// Raw `lattice chat` options, straight from the command line.
#[derive(Debug, Clone)]
pub struct ChatSweepOptions {
    pub models: Vec<String>,
    pub single_model: Option<String>,
    pub prompts: Vec<String>,
    pub single_prompt: Option<String>,
    pub experiments: Vec<String>,
    pub inference_method: InferenceMethod,
    pub backend_url: Option<String>,
    pub results_dir: PathBuf,
    pub num_trials: Option<usize>,
    pub data_file: Option<PathBuf>,
    pub split: String,
    pub data_column: String,
    pub label_column: String,
    pub skip_prediction: bool,
    pub skip_report: bool,
}

/// A resolved, validated chat sweep: presets expanded to concrete values,
/// experiments expanded to search spaces.
#[derive(Debug, Clone)]
pub struct ChatSweepConfig {
    pub space: CompositeSearchSpace,
    pub inference_method: InferenceMethod,
    pub backend_url: Option<String>,
    pub results_dir: PathBuf,
    pub num_trials: Option<usize>,
    pub dataset: DatasetSpec,
    pub run_prediction: bool,
    pub run_report: bool,
}

pub fn chat_config(options: &ChatSweepOptions) -> LatticeResult<ChatSweepConfig> {
    if options.skip_prediction && options.skip_report {
        return Err(ConfigError::ConflictingOptions {
            message: "--skip-prediction together with --skip-report leaves nothing to do"
                .to_string(),
        }
        .into());
    }

    let space = chat_space(
        &options.models,
        options.single_model.as_deref(),
        &options.prompts,
        options.single_prompt.as_deref(),
        &options.experiments,
    )?;

    Ok(ChatSweepConfig {
        space,
        inference_method: options.inference_method,
        backend_url: options.backend_url.clone(),
        results_dir: options.results_dir.clone(),
        num_trials: options.num_trials,
        dataset: dataset_spec(options)?,
        run_prediction: !options.skip_prediction,
        run_report: !options.skip_report,
    })
}

/// Expand experiment names into one composite space. `--single-model` and
/// `--single-prompt` narrow every sub-space by pinning that axis after the
/// fact, so the remaining dimensions keep their declaration order.
pub fn chat_space(
    models: &[String],
    single_model: Option<&str>,
    prompts: &[String],
    single_prompt: Option<&str>,
    experiments: &[String],
) -> LatticeResult<CompositeSearchSpace> {
    let model_ids = resolve_chat_models(models)?;
    let prompt_names = resolve_prompts(prompts)?;

    let experiments: Vec<&str> = if experiments.is_empty() {
        vec!["model"]
    } else {
        experiments.iter().map(String::as_str).collect()
    };

    let mut space = CompositeSearchSpace::new();
    for experiment in &experiments {
        let mut sub = experiment_space(experiment, &model_ids, &prompt_names)?;
        if let Some(name) = single_model {
            let preset = presets::chat_model(name)?;
            sub.replace_dimension("model", DimensionKind::constant(preset.model_id))?;
        }
        if let Some(name) = single_prompt {
            let preset = presets::prompt(name)?;
            sub.replace_dimension("prompt", DimensionKind::constant(preset.name))?;
        }
        space = space.add_space(sub);
    }
    space.validate()?;
    debug!(
        experiments = ?experiments,
        grid = ?space.grid_size(),
        "assembled chat search space"
    );
    Ok(space)
}

/// The search space for one named experiment. Each experiment varies
/// exactly one axis and pins every other dimension to its default, and
/// dimensions are declared in a fixed order so equivalent sweeps enumerate
/// identically across runs.
pub fn experiment_space(
    name: &str,
    model_ids: &[String],
    prompt_names: &[String],
) -> LatticeResult<SearchSpace> {
    let first_model = model_ids
        .first()
        .ok_or_else(|| config_error!("at least one model preset is required"))?;
    let first_prompt = prompt_names
        .first()
        .ok_or_else(|| config_error!("at least one prompt preset is required"))?;

    let mut space = SearchSpace::new()
        .add_constant("model", first_model.as_str())
        .add_constant("prompt", first_prompt.as_str())
        .add_constant("temperature", DEFAULT_TEMPERATURE)
        .add_constant("max_tokens", DEFAULT_MAX_TOKENS)
        .add_constant("top_p", DEFAULT_TOP_P)
        .add_constant("context_length", DEFAULT_CONTEXT_LENGTH);

    match name {
        "model" => space.replace_dimension(
            "model",
            DimensionKind::categorical(model_ids.iter().map(String::as_str)),
        )?,
        "prompt" => space.replace_dimension(
            "prompt",
            DimensionKind::categorical(prompt_names.iter().map(String::as_str)),
        )?,
        "temperature" => space.replace_dimension(
            "temperature",
            DimensionKind::categorical(TEMPERATURE_CHOICES),
        )?,
        "context-length" => space.replace_dimension(
            "context_length",
            DimensionKind::categorical(CONTEXT_LENGTH_CHOICES),
        )?,
        other => {
            return Err(ConfigError::UnknownExperiment {
                name: other.to_string(),
            }
            .into())
        }
    }
    Ok(space)
}

fn resolve_chat_models(names: &[String]) -> LatticeResult<Vec<String>> {
    if names.is_empty() {
        return Ok(presets::chat_models()
            .iter()
            .map(|preset| preset.model_id.to_string())
            .collect());
    }
    names
        .iter()
        .map(|name| presets::chat_model(name).map(|preset| preset.model_id.to_string()))
        .collect()
}

fn resolve_prompts(names: &[String]) -> LatticeResult<Vec<String>> {
    if names.is_empty() {
        return Ok(presets::prompts()
            .iter()
            .map(|preset| preset.name.to_string())
            .collect());
    }
    names
        .iter()
        .map(|name| presets::prompt(name).map(|preset| preset.name.to_string()))
        .collect()
}

fn dataset_spec(options: &ChatSweepOptions) -> LatticeResult<DatasetSpec> {
    let (source, format) = match &options.data_file {
        Some(path) => (path.clone(), format_for(path)?),
        None => (
            PathBuf::from("synthetic"),
            DataFormat::Synthetic {
                seed: SYNTHETIC_SEED,
                examples: SYNTHETIC_EXAMPLES,
            },
        ),
    };
    Ok(DatasetSpec {
        source,
        split: options.split.clone(),
        data_column: options.data_column.clone(),
        label_column: options.label_column.clone(),
        format,
    })
}

fn format_for(path: &Path) -> LatticeResult<DataFormat> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => Ok(DataFormat::Json),
        Some("jsonl") => Ok(DataFormat::JsonLines),
        Some("csv") => Ok(DataFormat::Csv),
        _ => Err(config_error!(
            "cannot infer dataset format for {} (expected .json, .jsonl or .csv)",
            path.display()
        )),
    }
}

/// Raw `lattice transcribe` options.
#[derive(Debug, Clone)]
pub struct TranscribeSweepOptions {
    pub models: Vec<String>,
    pub audio_dir: PathBuf,
    pub results_dir: PathBuf,
    pub num_trials: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct TranscribeSweepConfig {
    pub space: CompositeSearchSpace,
    pub audio_dir: PathBuf,
    pub results_dir: PathBuf,
    pub num_trials: Option<usize>,
}

pub fn transcribe_config(
    options: &TranscribeSweepOptions,
) -> LatticeResult<TranscribeSweepConfig> {
    let model_ids: Vec<String> = if options.models.is_empty() {
        presets::transcription_models()
            .iter()
            .map(|preset| preset.model_id.to_string())
            .collect()
    } else {
        options
            .models
            .iter()
            .map(|name| presets::transcription_model(name).map(|p| p.model_id.to_string()))
            .collect::<LatticeResult<_>>()?
    };

    let space = SearchSpace::new()
        .add_categorical("model", model_ids.iter().map(String::as_str))
        .add_constant("temperature", DEFAULT_TEMPERATURE);
    space.validate()?;

    Ok(TranscribeSweepConfig {
        space: space.into(),
        audio_dir: options.audio_dir.clone(),
        results_dir: options.results_dir.clone(),
        num_trials: options.num_trials,
    })
}
