//! Sweep drivers. A sweep is three phases over one results directory:
//! predict (claim absent entries, invoke the backend, persist outputs),
//! score (memoize the metric next to each completed output), and report.
//! Every phase is resumable because state lives only in the artifacts.

use std::path::Path;
use std::sync::Arc;

use tracing::{error, info, warn};

use lt_cache::{
    claimed_count, fingerprint, read_lock_payload, scan_entries, ArtifactStore, CacheEntry,
    CacheReport, EntryState, FsStore,
};
use lt_optimizer::{CompositeSearchSpace, ExhaustiveOptimizer};
use lt_report::{assemble_runs, composite_parameters_to_name, SweepReport};
use lt_run::{
    chat_inputs, contexts, labels, load_dataset, load_transcription_examples, Backend,
    ChatApiBackend, RunExecutor, TaskInput, TgiBackend, VllmBackend, WhisperApiBackend,
};
use lt_score::{cached_metric, ChrF, WordErrorRate};
use lt_types::{config_error, LatticeError, LatticeResult, Metric};

use crate::config::{ChatSweepConfig, InferenceMethod, TranscribeSweepConfig};
use crate::presets;

/// Everything one sweep invocation needs besides the backend and metric.
struct SweepTask<'a> {
    space: &'a CompositeSearchSpace,
    results_dir: &'a Path,
    num_trials: Option<usize>,
    inputs: Vec<TaskInput>,
    contexts: Vec<String>,
    labels: Vec<String>,
    run_prediction: bool,
    run_report: bool,
}

pub async fn run_chat(config: &ChatSweepConfig) -> LatticeResult<()> {
    let store: Arc<dyn ArtifactStore> = Arc::new(FsStore::new());
    let examples = load_dataset(store.as_ref(), &config.results_dir, &config.dataset)?;

    let backend = chat_backend(config)?;
    let metric: Arc<dyn Metric> = Arc::new(ChrF::default());
    let task = SweepTask {
        space: &config.space,
        results_dir: &config.results_dir,
        num_trials: config.num_trials,
        inputs: chat_inputs(&examples),
        contexts: contexts(&examples),
        labels: labels(&examples),
        run_prediction: config.run_prediction,
        run_report: config.run_report,
    };
    drive(store, backend.as_ref(), metric, task).await
}

pub async fn run_transcribe(config: &TranscribeSweepConfig) -> LatticeResult<()> {
    let store: Arc<dyn ArtifactStore> = Arc::new(FsStore::new());
    let examples = load_transcription_examples(&config.audio_dir)?;
    if examples.is_empty() {
        return Err(config_error!(
            "no audio files under {}",
            config.audio_dir.display()
        ));
    }

    let backend = WhisperApiBackend::from_env()?;
    let metric: Arc<dyn Metric> = Arc::new(WordErrorRate);
    let task = SweepTask {
        space: &config.space,
        results_dir: &config.results_dir,
        num_trials: config.num_trials,
        inputs: examples
            .iter()
            .map(|(path, _)| TaskInput::Audio(path.clone()))
            .collect(),
        contexts: examples
            .iter()
            .map(|(path, _)| path.display().to_string())
            .collect(),
        labels: examples.iter().map(|(_, label)| label.clone()).collect(),
        run_prediction: true,
        run_report: true,
    };
    drive(store, &backend, metric, task).await
}

fn chat_backend(config: &ChatSweepConfig) -> LatticeResult<Box<dyn Backend>> {
    let catalog = presets::prompt_catalog();
    let override_url = config.backend_url.clone();
    let backend: Box<dyn Backend> = match config.inference_method {
        InferenceMethod::Api => {
            if override_url.is_some() {
                warn!("--backend-url is ignored for the api method; set OPENAI_API_BASE instead");
            }
            Box::new(ChatApiBackend::from_env(catalog)?)
        }
        InferenceMethod::Tgi => Box::new(TgiBackend::new(
            resolve_base_url(override_url, config.inference_method),
            catalog,
        )),
        InferenceMethod::Vllm => Box::new(VllmBackend::new(
            resolve_base_url(override_url, config.inference_method),
            catalog,
        )),
    };
    Ok(backend)
}

fn resolve_base_url(override_url: Option<String>, method: InferenceMethod) -> String {
    override_url
        .or_else(|| method.default_base_url().map(str::to_string))
        .unwrap_or_default()
}

async fn drive(
    store: Arc<dyn ArtifactStore>,
    backend: &dyn Backend,
    metric: Arc<dyn Metric>,
    task: SweepTask<'_>,
) -> LatticeResult<()> {
    let mut optimizer = ExhaustiveOptimizer::new(
        task.space.clone(),
        task.results_dir,
        Arc::clone(&store),
        Arc::clone(&metric),
    )?;
    if let Some(num_trials) = task.num_trials {
        optimizer = optimizer.with_num_trials(num_trials);
    }

    if task.run_prediction {
        info!(
            backend = backend.name(),
            metric = metric.name(),
            grid = ?optimizer.grid_size(),
            budget = ?task.num_trials,
            examples = task.inputs.len(),
            "starting prediction phase"
        );
        let executor = RunExecutor::new(Arc::clone(&store), task.results_dir);

        while !optimizer.is_complete(true)? {
            let Some(assignment) = optimizer.get_parameters()? else {
                break;
            };
            let name = composite_parameters_to_name(&assignment, optimizer.space());
            match executor.execute(backend, &assignment, &task.inputs).await {
                Ok(Some(predictions)) => {
                    let entry = CacheEntry::new(task.results_dir, fingerprint(&assignment)?);
                    let score = cached_metric(store.as_ref(), &entry, || {
                        optimizer.calculate_metric(&task.contexts, &task.labels, &predictions)
                    })?;
                    info!(run = %name, score, "trial finished");
                }
                Ok(None) => {
                    info!(run = %name, "trial skipped, claimed elsewhere or failed before");
                }
                Err(LatticeError::Backend(e)) => {
                    error!(run = %name, error = %e, "trial failed, marker recorded");
                }
                Err(e) => return Err(e),
            }
        }

        let stats = executor.stats();
        info!(
            invocations = stats.invocations,
            cache_hits = stats.cache_hits,
            skips = stats.skips,
            failures = stats.failures,
            "prediction phase finished"
        );
        if let Some(num_trials) = task.num_trials {
            let completed = claimed_count(store.as_ref(), task.results_dir, false)?;
            if completed < num_trials {
                warn!(
                    completed,
                    requested = num_trials,
                    "sweep ended short of the trial budget"
                );
            }
        }
    }

    // With --skip-prediction this pass is the whole job; after a prediction
    // phase it only catches entries left unscored by an older interrupted
    // sweep.
    let scored = score_unscored(
        store.as_ref(),
        task.results_dir,
        metric.as_ref(),
        &task.contexts,
        &task.labels,
    )?;
    if scored > 0 {
        info!(scored, "scoring pass finished");
    }

    if task.run_report {
        emit_report(store.as_ref(), task.results_dir, task.space)?;
    }
    Ok(())
}

/// Score completed entries that have no metric artifact yet. Outputs whose
/// length does not match the current dataset are left alone rather than
/// scored against the wrong labels.
fn score_unscored(
    store: &dyn ArtifactStore,
    results_dir: &Path,
    metric: &dyn Metric,
    contexts: &[String],
    labels: &[String],
) -> LatticeResult<usize> {
    let mut scored = 0;
    for (fp, state) in scan_entries(store, results_dir)? {
        if state != EntryState::Completed {
            continue;
        }
        let entry = CacheEntry::new(results_dir, fp);
        let predictions = entry.read_output(store)?;
        if predictions.len() != labels.len() {
            warn!(
                fingerprint = %entry.fingerprint(),
                predictions = predictions.len(),
                labels = labels.len(),
                "output does not match the current dataset, not scoring"
            );
            continue;
        }
        cached_metric(store, &entry, || metric.score(contexts, labels, &predictions))?;
        scored += 1;
    }
    Ok(scored)
}

fn emit_report(
    store: &dyn ArtifactStore,
    results_dir: &Path,
    space: &CompositeSearchSpace,
) -> LatticeResult<()> {
    let runs = assemble_runs(store, results_dir, space)?;
    if runs.is_empty() {
        warn!(dir = %results_dir.display(), "no completed runs to report");
        return Ok(());
    }
    let report = SweepReport::new(runs);
    report.write(store, results_dir)?;
    println!("{}", report.render_table());
    Ok(())
}

/// `lattice report`: rebuild `report.json` from artifacts alone.
pub fn write_report(results_dir: &Path, space: &CompositeSearchSpace) -> LatticeResult<()> {
    let store = FsStore::new();
    emit_report(&store, results_dir, space)
}

/// `lattice status`: per-state counts plus detail lines for claims and
/// failures, all derived from artifact presence.
pub fn show_status(results_dir: &Path) -> LatticeResult<()> {
    let store = FsStore::new();
    let report = CacheReport::scan(&store, results_dir)?;
    println!("{}: {report}", results_dir.display());

    for (fp, state) in scan_entries(&store, results_dir)? {
        let entry = CacheEntry::new(results_dir, fp);
        match state {
            EntryState::InProgress => match read_lock_payload(&store, &entry)? {
                Some(payload) => println!(
                    "  in progress: {} held by {} (pid {}) since {}",
                    entry.fingerprint(),
                    payload.owner,
                    payload.pid,
                    payload.acquired_at
                ),
                None => println!(
                    "  in progress: {} (unreadable lock payload)",
                    entry.fingerprint()
                ),
            },
            EntryState::Failed => {
                let diagnostic = entry.failure_diagnostic(&store)?.unwrap_or_default();
                let first_line = diagnostic.lines().next().unwrap_or("no diagnostic");
                println!("  failed: {} ({first_line})", entry.fingerprint());
            }
            _ => {}
        }
    }
    Ok(())
}
