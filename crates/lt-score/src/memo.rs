//! Metric memoization alongside the prediction artifacts.

use lt_cache::{ArtifactStore, CacheEntry};
use lt_types::{CacheError, LatticeResult};

/// Return the stored metric for an entry, computing and persisting it on
/// first use. The metric artifact is a plain-text scalar so it stays
/// greppable next to the other artifacts. An existing file that does not
/// parse is corrupt, not a cue to recompute.
pub fn cached_metric<F>(
    store: &dyn ArtifactStore,
    entry: &CacheEntry,
    compute: F,
) -> LatticeResult<f64>
where
    F: FnOnce() -> LatticeResult<f64>,
{
    let path = entry.metric_path();
    if store.exists(&path) {
        let text = store.read_to_string(&path)?;
        return text.trim().parse::<f64>().map_err(|e| {
            CacheError::CorruptArtifact {
                path: path.display().to_string(),
                message: e.to_string(),
            }
            .into()
        });
    }

    let value = compute()?;
    store.write_atomic(&path, format!("{value}\n").as_bytes())?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lt_cache::{fingerprint, MemoryStore};
    use lt_types::ParameterAssignment;
    use std::cell::Cell;
    use std::path::Path;

    fn test_entry() -> CacheEntry {
        let assignment = ParameterAssignment::new().with("model", "m1");
        CacheEntry::new(Path::new("/results"), fingerprint(&assignment).unwrap())
    }

    #[test]
    fn computes_once_then_reads_the_artifact() {
        let store = MemoryStore::new();
        let entry = test_entry();
        let calls = Cell::new(0);

        let compute = || {
            calls.set(calls.get() + 1);
            Ok(0.75)
        };
        assert_eq!(cached_metric(&store, &entry, compute).unwrap(), 0.75);
        assert_eq!(calls.get(), 1);

        // Second call is served from the artifact
        let compute = || {
            calls.set(calls.get() + 1);
            Ok(0.0)
        };
        assert_eq!(cached_metric(&store, &entry, compute).unwrap(), 0.75);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn artifact_is_plain_text() {
        let store = MemoryStore::new();
        let entry = test_entry();
        cached_metric(&store, &entry, || Ok(0.5)).unwrap();

        let text = store.read_to_string(&entry.metric_path()).unwrap();
        assert_eq!(text.trim(), "0.5");
    }

    #[test]
    fn preexisting_value_wins_over_compute() {
        let store = MemoryStore::new();
        let entry = test_entry();
        store.write_atomic(&entry.metric_path(), b"0.25\n").unwrap();

        let value = cached_metric(&store, &entry, || panic!("should not compute")).unwrap();
        assert_eq!(value, 0.25);
    }

    #[test]
    fn unparsable_metric_artifact_is_corrupt() {
        let store = MemoryStore::new();
        let entry = test_entry();
        store
            .write_atomic(&entry.metric_path(), b"not a number")
            .unwrap();

        let err = cached_metric(&store, &entry, || Ok(1.0)).unwrap_err();
        match err {
            lt_types::LatticeError::Cache(CacheError::CorruptArtifact { .. }) => {}
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
