//! Artifact layout and state of a single cache entry.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use lt_types::{CacheError, LatticeResult, ParameterAssignment};

use crate::fingerprint::{canonical_text, Fingerprint};
use crate::store::ArtifactStore;

pub const PARAMS_EXT: &str = "params";
pub const OUTPUT_EXT: &str = "output";
pub const METRIC_EXT: &str = "metric";
pub const LOCK_EXT: &str = "lock";
pub const FAIL_EXT: &str = "fail";

/// Observable state of a cache entry, derived purely from which artifacts
/// exist. Output presence alone decides completion: a leftover lock next to
/// an output is still a completed entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryState {
    Absent,
    InProgress,
    Completed,
    Scored,
    Failed,
}

impl EntryState {
    /// Completed entries, scored or not.
    pub fn is_completed(self) -> bool {
        matches!(self, Self::Completed | Self::Scored)
    }

    /// Entries that count as claimed for budget purposes.
    pub fn is_claimed(self, include_in_progress: bool) -> bool {
        self.is_completed() || (include_in_progress && self == Self::InProgress)
    }
}

/// The on-disk artifact set addressed by one fingerprint.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    root: PathBuf,
    fingerprint: Fingerprint,
}

impl CacheEntry {
    pub fn new<P: AsRef<Path>>(results_dir: P, fingerprint: Fingerprint) -> Self {
        let root = results_dir.as_ref().join(fingerprint.as_hex());
        Self { root, fingerprint }
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    pub fn params_path(&self) -> PathBuf {
        self.root.with_extension(PARAMS_EXT)
    }

    pub fn output_path(&self) -> PathBuf {
        self.root.with_extension(OUTPUT_EXT)
    }

    pub fn metric_path(&self) -> PathBuf {
        self.root.with_extension(METRIC_EXT)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.root.with_extension(LOCK_EXT)
    }

    pub fn fail_path(&self) -> PathBuf {
        self.root.with_extension(FAIL_EXT)
    }

    pub fn state(&self, store: &dyn ArtifactStore) -> EntryState {
        if store.exists(&self.output_path()) {
            if store.exists(&self.metric_path()) {
                EntryState::Scored
            } else {
                EntryState::Completed
            }
        } else if store.exists(&self.fail_path()) {
            EntryState::Failed
        } else if store.exists(&self.lock_path()) {
            EntryState::InProgress
        } else {
            EntryState::Absent
        }
    }

    /// Write the terminal failure marker with its diagnostic payload.
    /// Entries in this state are never re-attempted and never reported.
    pub fn mark_failed(&self, store: &dyn ArtifactStore, diagnostic: &str) -> LatticeResult<()> {
        debug!(fingerprint = %self.fingerprint, "writing failure marker");
        store.write_atomic(&self.fail_path(), diagnostic.as_bytes())
    }

    /// Read back the failure diagnostic, if the entry failed.
    pub fn failure_diagnostic(&self, store: &dyn ArtifactStore) -> LatticeResult<Option<String>> {
        if store.exists(&self.fail_path()) {
            Ok(Some(store.read_to_string(&self.fail_path())?))
        } else {
            Ok(None)
        }
    }

    /// Persist the canonical parameter record for this entry. If a record
    /// already exists it must match byte-for-byte; a mismatch means two
    /// distinct assignments resolved to one fingerprint root, which is a
    /// fatal integrity violation.
    pub fn write_params(
        &self,
        store: &dyn ArtifactStore,
        assignment: &ParameterAssignment,
    ) -> LatticeResult<()> {
        let canonical = canonical_text(assignment)?;
        if store.exists(&self.params_path()) {
            return self.verify_params_text(store, &canonical);
        }
        store.write_atomic(&self.params_path(), canonical.as_bytes())
    }

    /// Check a stored parameter record against an incoming assignment.
    pub fn verify_params(
        &self,
        store: &dyn ArtifactStore,
        assignment: &ParameterAssignment,
    ) -> LatticeResult<()> {
        let canonical = canonical_text(assignment)?;
        self.verify_params_text(store, &canonical)
    }

    fn verify_params_text(&self, store: &dyn ArtifactStore, canonical: &str) -> LatticeResult<()> {
        let existing = store.read_to_string(&self.params_path())?;
        if existing != canonical {
            return Err(CacheError::Collision {
                fingerprint: self.fingerprint.as_hex().to_string(),
                existing,
                incoming: canonical.to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Load the parameter record stored for this entry.
    pub fn read_params(&self, store: &dyn ArtifactStore) -> LatticeResult<ParameterAssignment> {
        let text = store.read_to_string(&self.params_path())?;
        serde_json::from_str(&text).map_err(|e| {
            CacheError::CorruptArtifact {
                path: self.params_path().display().to_string(),
                message: e.to_string(),
            }
            .into()
        })
    }

    /// Load the predictions stored for this entry.
    pub fn read_output(&self, store: &dyn ArtifactStore) -> LatticeResult<Vec<String>> {
        let text = store.read_to_string(&self.output_path())?;
        serde_json::from_str(&text).map_err(|e| {
            CacheError::CorruptArtifact {
                path: self.output_path().display().to_string(),
                message: e.to_string(),
            }
            .into()
        })
    }

    /// Atomically persist predictions; the single source of truth for
    /// completion, never mutated once written.
    pub fn write_output(
        &self,
        store: &dyn ArtifactStore,
        predictions: &[String],
    ) -> LatticeResult<()> {
        let serialized = serde_json::to_string(predictions)?;
        store.write_atomic(&self.output_path(), serialized.as_bytes())
    }
}

/// Scan a results directory and report every known entry with its state,
/// ordered by fingerprint. Temp files and foreign names are ignored.
pub fn scan_entries(
    store: &dyn ArtifactStore,
    results_dir: &Path,
) -> LatticeResult<Vec<(Fingerprint, EntryState)>> {
    let mut seen = std::collections::BTreeSet::new();
    for path in store.list(results_dir)? {
        let (Some(stem), Some(ext)) = (
            path.file_stem().and_then(|s| s.to_str()),
            path.extension().and_then(|s| s.to_str()),
        ) else {
            continue;
        };
        if !matches!(ext, PARAMS_EXT | OUTPUT_EXT | METRIC_EXT | LOCK_EXT | FAIL_EXT) {
            continue;
        }
        if Fingerprint::from_stem(stem).is_some() {
            seen.insert(stem.to_string());
        }
    }

    let mut entries = Vec::with_capacity(seen.len());
    for hex in seen {
        let fingerprint = match Fingerprint::from_stem(&hex) {
            Some(fp) => fp,
            None => continue,
        };
        let entry = CacheEntry::new(results_dir, fingerprint.clone());
        entries.push((fingerprint, entry.state(store)));
    }
    Ok(entries)
}

/// Count entries that are claimed toward a trial budget.
pub fn claimed_count(
    store: &dyn ArtifactStore,
    results_dir: &Path,
    include_in_progress: bool,
) -> LatticeResult<usize> {
    Ok(scan_entries(store, results_dir)?
        .iter()
        .filter(|(_, state)| state.is_claimed(include_in_progress))
        .count())
}

/// Per-state entry counts for a results directory. Everything here is
/// derived from artifact presence, so sweep health is diagnosable without
/// any live process state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheReport {
    pub completed: usize,
    pub scored: usize,
    pub in_progress: usize,
    pub failed: usize,
}

impl CacheReport {
    pub fn scan(store: &dyn ArtifactStore, results_dir: &Path) -> LatticeResult<Self> {
        let mut report = Self::default();
        for (_, state) in scan_entries(store, results_dir)? {
            match state {
                EntryState::Completed => report.completed += 1,
                EntryState::Scored => report.scored += 1,
                EntryState::InProgress => report.in_progress += 1,
                EntryState::Failed => report.failed += 1,
                EntryState::Absent => {}
            }
        }
        Ok(report)
    }

    pub fn total_completed(&self) -> usize {
        self.completed + self.scored
    }

    pub fn total(&self) -> usize {
        self.completed + self.scored + self.in_progress + self.failed
    }
}

impl std::fmt::Display for CacheReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "completed: {} ({} scored), in progress: {}, failed: {}",
            self.total_completed(),
            self.scored,
            self.in_progress,
            self.failed
        )
    }
}
