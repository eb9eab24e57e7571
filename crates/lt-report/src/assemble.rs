//! Assembling completed entries into a reporting-ready collection.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use lt_cache::{scan_entries, ArtifactStore, CacheEntry, EntryState};
use lt_optimizer::CompositeSearchSpace;
use lt_types::{CacheError, CompletedRun, LatticeResult};

use crate::naming::composite_parameters_to_name;

/// Load every completed entry in a results directory as a [`CompletedRun`],
/// sorted by display name. Failed and in-progress entries are excluded;
/// scored entries carry their metric value.
pub fn assemble_runs(
    store: &dyn ArtifactStore,
    results_dir: &Path,
    space: &CompositeSearchSpace,
) -> LatticeResult<Vec<CompletedRun>> {
    let mut runs = Vec::new();
    for (fingerprint, state) in scan_entries(store, results_dir)? {
        if !state.is_completed() {
            continue;
        }
        let entry = CacheEntry::new(results_dir, fingerprint);
        let parameters = entry.read_params(store)?;
        let predictions = entry.read_output(store)?;
        let name = composite_parameters_to_name(&parameters, space);

        let mut run = CompletedRun::new(parameters, predictions, name);
        if state == EntryState::Scored {
            let metric_path = entry.metric_path();
            let text = store.read_to_string(&metric_path)?;
            let value = text.trim().parse::<f64>().map_err(|e| {
                CacheError::CorruptArtifact {
                    path: metric_path.display().to_string(),
                    message: e.to_string(),
                }
            })?;
            run = run.with_metric(value);
        }
        runs.push(run);
    }
    runs.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(runs)
}

/// The final product of a sweep: every completed run, ready for a
/// downstream visualization step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepReport {
    pub sweep_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub runs: Vec<CompletedRun>,
}

impl SweepReport {
    pub fn new(runs: Vec<CompletedRun>) -> Self {
        Self {
            sweep_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            runs,
        }
    }

    /// Serialize to `<results>/report.json`, returning the path written.
    pub fn write(&self, store: &dyn ArtifactStore, results_dir: &Path) -> LatticeResult<PathBuf> {
        let path = results_dir.join("report.json");
        store.write_atomic(&path, serde_json::to_string_pretty(self)?.as_bytes())?;
        info!(path = %path.display(), runs = self.runs.len(), "report written");
        Ok(path)
    }

    /// Plain-text table for console output.
    pub fn render_table(&self) -> String {
        let name_width = self
            .runs
            .iter()
            .map(|run| run.name.len())
            .max()
            .unwrap_or(0)
            .max("name".len());

        let mut out = format!("{:<name_width$}  {:>10}  {:>12}\n", "name", "metric", "predictions");
        for run in &self.runs {
            let metric = match run.metric {
                Some(value) => format!("{value:.4}"),
                None => "-".to_string(),
            };
            out.push_str(&format!(
                "{:<name_width$}  {:>10}  {:>12}\n",
                run.name,
                metric,
                run.predictions.len()
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lt_cache::{fingerprint, MemoryStore};
    use lt_optimizer::SearchSpace;
    use lt_types::ParameterAssignment;

    fn space() -> CompositeSearchSpace {
        SearchSpace::new()
            .add_categorical("model", ["m1", "m2"])
            .add_categorical("temperature", [0.0, 1.0])
            .into()
    }

    fn seed_entry(
        store: &dyn ArtifactStore,
        dir: &Path,
        model: &str,
        temperature: f64,
        metric: Option<f64>,
    ) -> ParameterAssignment {
        let assignment = ParameterAssignment::new()
            .with("model", model)
            .with("temperature", temperature);
        let entry = CacheEntry::new(dir, fingerprint(&assignment).unwrap());
        entry.write_params(store, &assignment).unwrap();
        entry
            .write_output(store, &[format!("{model} says hi")])
            .unwrap();
        if let Some(value) = metric {
            store
                .write_atomic(&entry.metric_path(), format!("{value}\n").as_bytes())
                .unwrap();
        }
        assignment
    }

    #[test]
    fn runs_are_sorted_by_name_and_exclude_unfinished_entries() {
        let store = MemoryStore::new();
        let dir = Path::new("/results");

        seed_entry(&store, dir, "m2", 0.0, None);
        seed_entry(&store, dir, "m1", 1.0, Some(0.5));

        // One failed and one in-progress entry, both invisible to reporting
        let failed = ParameterAssignment::new().with("model", "m1").with("temperature", 0.0);
        CacheEntry::new(dir, fingerprint(&failed).unwrap())
            .mark_failed(&store, "boom")
            .unwrap();
        let claimed = ParameterAssignment::new().with("model", "m2").with("temperature", 1.0);
        store
            .write_atomic(
                &CacheEntry::new(dir, fingerprint(&claimed).unwrap()).lock_path(),
                b"{}",
            )
            .unwrap();

        let runs = assemble_runs(&store, dir, &space()).unwrap();
        let names: Vec<&str> = runs.iter().map(|run| run.name.as_str()).collect();
        assert_eq!(names, vec!["model=m1 temperature=1", "model=m2 temperature=0"]);
        assert_eq!(runs[0].metric, Some(0.5));
        assert_eq!(runs[1].metric, None);
    }

    #[test]
    fn report_round_trips_through_json() {
        let store = MemoryStore::new();
        let dir = Path::new("/results");
        seed_entry(&store, dir, "m1", 0.0, Some(0.25));

        let report = SweepReport::new(assemble_runs(&store, dir, &space()).unwrap());
        let path = report.write(&store, dir).unwrap();
        assert_eq!(path, dir.join("report.json"));

        let text = store.read_to_string(&path).unwrap();
        let restored: SweepReport = serde_json::from_str(&text).unwrap();
        assert_eq!(restored.sweep_id, report.sweep_id);
        assert_eq!(restored.runs.len(), 1);
        assert_eq!(restored.runs[0].metric, Some(0.25));
    }

    #[test]
    fn table_lists_each_run() {
        let store = MemoryStore::new();
        let dir = Path::new("/results");
        seed_entry(&store, dir, "m1", 0.0, Some(0.1234));
        seed_entry(&store, dir, "m2", 1.0, None);

        let report = SweepReport::new(assemble_runs(&store, dir, &space()).unwrap());
        let table = report.render_table();
        assert!(table.contains("model=m1 temperature=0"));
        assert!(table.contains("0.1234"));
        assert!(table.lines().count() >= 3);
    }
}
