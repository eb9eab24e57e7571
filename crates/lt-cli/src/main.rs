//! `lattice`: crash-safe, resumable experiment sweeps over model, prompt,
//! and sampling-parameter grids, memoized in a results directory.

mod config;
mod presets;
mod sweep;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::config::{ChatSweepOptions, InferenceMethod, TranscribeSweepOptions};

#[derive(Parser)]
#[command(name = "lattice")]
#[command(about = "Resumable experiment sweeps with filesystem memoization", long_about = None)]
#[command(arg_required_else_help = true)]
struct Cli {
    #[arg(long, short, global = true, help = "Enable debug logging")]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Run a chat-completion sweep")]
    Chat {
        #[arg(
            long,
            value_delimiter = ',',
            help = "Model presets to sweep (default: every chat preset)"
        )]
        models: Vec<String>,

        #[arg(long, help = "Pin every experiment to one model preset")]
        single_model: Option<String>,

        #[arg(
            long,
            value_delimiter = ',',
            help = "Prompt presets to sweep (default: every prompt preset)"
        )]
        prompts: Vec<String>,

        #[arg(long, help = "Pin every experiment to one prompt preset")]
        single_prompt: Option<String>,

        #[arg(
            long,
            value_delimiter = ',',
            help = "Experiments to run: model, prompt, temperature, context-length"
        )]
        experiments: Vec<String>,

        #[arg(
            long,
            value_enum,
            default_value = "api",
            help = "Where chat completions are generated"
        )]
        inference_method: InferenceArg,

        #[arg(long, help = "Base URL for the tgi/vllm backends")]
        backend_url: Option<String>,

        #[arg(long, default_value = "results", help = "Directory holding run artifacts")]
        results_dir: PathBuf,

        #[arg(long, help = "Cap the number of completed trials")]
        num_trials: Option<usize>,

        #[arg(
            long,
            help = "Evaluation dataset (.json, .jsonl or .csv); synthetic when omitted"
        )]
        data_file: Option<PathBuf>,

        #[arg(long, default_value = "eval", help = "Split name for the normalized data cache")]
        split: String,

        #[arg(long, default_value = "messages", help = "Column holding the conversation")]
        data_column: String,

        #[arg(long, default_value = "label", help = "Column holding the reference reply")]
        label_column: String,

        #[arg(long, help = "Skip the prediction phase; only score and report")]
        skip_prediction: bool,

        #[arg(long, help = "Skip report assembly")]
        skip_report: bool,
    },

    #[command(about = "Run an audio-transcription sweep")]
    Transcribe {
        #[arg(
            long,
            value_delimiter = ',',
            help = "Transcription model presets to sweep (default: every preset)"
        )]
        models: Vec<String>,

        #[arg(long, help = "Directory of audio files, with .txt reference transcripts")]
        audio_dir: PathBuf,

        #[arg(long, default_value = "results", help = "Directory holding run artifacts")]
        results_dir: PathBuf,

        #[arg(long, help = "Cap the number of completed trials")]
        num_trials: Option<usize>,
    },

    #[command(about = "Summarize artifact state under a results directory")]
    Status {
        #[arg(long, default_value = "results", help = "Directory holding run artifacts")]
        results_dir: PathBuf,
    },

    #[command(about = "Rebuild report.json from completed artifacts")]
    Report {
        #[arg(
            long,
            value_delimiter = ',',
            help = "Model presets the sweep was run with, for run naming"
        )]
        models: Vec<String>,

        #[arg(
            long,
            value_delimiter = ',',
            help = "Prompt presets the sweep was run with, for run naming"
        )]
        prompts: Vec<String>,

        #[arg(
            long,
            value_delimiter = ',',
            help = "Experiments the sweep was run with, for run naming"
        )]
        experiments: Vec<String>,

        #[arg(long, default_value = "results", help = "Directory holding run artifacts")]
        results_dir: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum InferenceArg {
    /// Hosted chat-completions API
    Api,
    /// Local text-generation-inference server
    Tgi,
    /// Local vLLM server
    Vllm,
}

impl From<InferenceArg> for InferenceMethod {
    fn from(arg: InferenceArg) -> Self {
        match arg {
            InferenceArg::Api => InferenceMethod::Api,
            InferenceArg::Tgi => InferenceMethod::Tgi,
            InferenceArg::Vllm => InferenceMethod::Vllm,
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(default_level.into())
                .from_env_lossy(),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Chat {
            models,
            single_model,
            prompts,
            single_prompt,
            experiments,
            inference_method,
            backend_url,
            results_dir,
            num_trials,
            data_file,
            split,
            data_column,
            label_column,
            skip_prediction,
            skip_report,
        } => {
            let options = ChatSweepOptions {
                models,
                single_model,
                prompts,
                single_prompt,
                experiments,
                inference_method: inference_method.into(),
                backend_url,
                results_dir,
                num_trials,
                data_file,
                split,
                data_column,
                label_column,
                skip_prediction,
                skip_report,
            };
            let config = config::chat_config(&options)?;
            sweep::run_chat(&config).await?;
        }
        Commands::Transcribe {
            models,
            audio_dir,
            results_dir,
            num_trials,
        } => {
            let options = TranscribeSweepOptions {
                models,
                audio_dir,
                results_dir,
                num_trials,
            };
            let config = config::transcribe_config(&options)?;
            sweep::run_transcribe(&config).await?;
        }
        Commands::Status { results_dir } => {
            sweep::show_status(&results_dir)?;
        }
        Commands::Report {
            models,
            prompts,
            experiments,
            results_dir,
        } => {
            let space = config::chat_space(&models, None, &prompts, None, &experiments)?;
            sweep::write_report(&results_dir, &space)?;
        }
    }
    Ok(())
}
