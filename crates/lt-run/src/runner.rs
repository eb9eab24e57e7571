//! Cached execution of a single sweep run.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use lt_cache::{fingerprint, ArtifactStore, CacheEntry, CacheLock};
use lt_types::{LatticeResult, ParameterAssignment, SweepStats};

use crate::backend::{Backend, TaskInput};

/// Executes one parameter assignment against the cache: serve a hit, skip a
/// failed or claimed entry, or claim the entry and produce it. After any
/// terminal attempt exactly one of the output and failure artifacts exists.
#[derive(Debug)]
pub struct RunExecutor {
    store: Arc<dyn ArtifactStore>,
    results_dir: PathBuf,
    stats: RwLock<SweepStats>,
}

impl RunExecutor {
    pub fn new(store: Arc<dyn ArtifactStore>, results_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            results_dir: results_dir.into(),
            stats: RwLock::new(SweepStats::default()),
        }
    }

    pub fn stats(&self) -> SweepStats {
        *self.stats.read()
    }

    /// `Ok(Some(predictions))` on a hit or a fresh production,
    /// `Ok(None)` when the entry is someone else's (claimed) or terminally
    /// failed, `Err` on backend failure after the failure marker is
    /// persisted.
    pub async fn execute(
        &self,
        backend: &dyn Backend,
        assignment: &ParameterAssignment,
        inputs: &[TaskInput],
    ) -> LatticeResult<Option<Vec<String>>> {
        let entry = CacheEntry::new(&self.results_dir, fingerprint(assignment)?);
        let store = self.store.as_ref();

        if store.exists(&entry.output_path()) {
            return self.serve_hit(&entry, assignment).map(Some);
        }

        if store.exists(&entry.fail_path()) {
            self.stats.write().skips += 1;
            debug!(fingerprint = %entry.fingerprint(), "entry failed previously, skipping");
            return Ok(None);
        }

        let Some(lock) = CacheLock::try_acquire(self.store.clone(), &entry)? else {
            self.stats.write().skips += 1;
            return Ok(None);
        };

        // The entry may have completed between the state check and the
        // claim; an existing output is never rewritten.
        if store.exists(&entry.output_path()) {
            lock.release()?;
            return self.serve_hit(&entry, assignment).map(Some);
        }

        entry.write_params(store, assignment)?;

        info!(
            fingerprint = %entry.fingerprint(),
            backend = backend.name(),
            inputs = inputs.len(),
            "invoking backend"
        );
        match backend.invoke(assignment, inputs).await {
            Ok(predictions) => {
                entry.write_output(store, &predictions)?;
                lock.release()?;
                self.stats.write().invocations += 1;
                Ok(Some(predictions))
            }
            Err(error) => {
                self.stats.write().failures += 1;
                let diagnostic = format!("{error}\n{error:?}\n");
                if let Err(mark_error) = entry.mark_failed(store, &diagnostic) {
                    warn!(
                        fingerprint = %entry.fingerprint(),
                        error = %mark_error,
                        "failed to write failure marker"
                    );
                }
                // The lock guard drops with the error, removing the lock artifact
                Err(error)
            }
        }
    }

    fn serve_hit(
        &self,
        entry: &CacheEntry,
        assignment: &ParameterAssignment,
    ) -> LatticeResult<Vec<String>> {
        let store = self.store.as_ref();
        entry.verify_params(store, assignment)?;
        let predictions = entry.read_output(store)?;
        self.stats.write().cache_hits += 1;
        debug!(fingerprint = %entry.fingerprint(), "cache hit");
        Ok(predictions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use lt_cache::MemoryStore;
    use lt_types::{BackendError, CacheError, ChatHistory, ChatMessage, LatticeError};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    struct MockBackend {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl Backend for MockBackend {
        fn name(&self) -> &str {
            "mock"
        }

        async fn invoke(
            &self,
            assignment: &ParameterAssignment,
            inputs: &[TaskInput],
        ) -> LatticeResult<Vec<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(BackendError::Generation {
                    backend: "mock".to_string(),
                    message: "synthetic failure".to_string(),
                }
                .into());
            }
            let model = assignment.get("model").unwrap().to_string();
            Ok(inputs.iter().map(|_| model.clone()).collect())
        }
    }

    fn assignment() -> ParameterAssignment {
        ParameterAssignment::new().with("model", "m1").with("temperature", 0.0)
    }

    fn inputs() -> Vec<TaskInput> {
        vec![TaskInput::Chat(ChatHistory::new(vec![ChatMessage::user(
            "hi",
        )]))]
    }

    fn executor() -> (Arc<dyn ArtifactStore>, RunExecutor) {
        let store: Arc<dyn ArtifactStore> = Arc::new(MemoryStore::new());
        let executor = RunExecutor::new(store.clone(), "/results");
        (store, executor)
    }

    fn entry_for(assignment: &ParameterAssignment) -> CacheEntry {
        CacheEntry::new("/results", fingerprint(assignment).unwrap())
    }

    #[tokio::test]
    async fn miss_invokes_backend_and_persists_artifacts() {
        let (store, executor) = executor();
        let backend = MockBackend::default();

        let predictions = executor
            .execute(&backend, &assignment(), &inputs())
            .await
            .unwrap()
            .expect("fresh entry should produce output");
        assert_eq!(predictions, vec!["m1".to_string()]);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);

        let entry = entry_for(&assignment());
        assert!(store.exists(&entry.output_path()));
        assert!(store.exists(&entry.params_path()));
        assert!(!store.exists(&entry.lock_path()));
        assert!(!store.exists(&entry.fail_path()));
        assert_eq!(executor.stats().invocations, 1);
    }

    #[tokio::test]
    async fn hit_serves_stored_output_without_invoking() {
        let (_store, executor) = executor();
        let backend = MockBackend::default();

        let first = executor
            .execute(&backend, &assignment(), &inputs())
            .await
            .unwrap();
        let second = executor
            .execute(&backend, &assignment(), &inputs())
            .await
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);

        let stats = executor.stats();
        assert_eq!(stats.invocations, 1);
        assert_eq!(stats.cache_hits, 1);
    }

    #[tokio::test]
    async fn contention_is_a_skip_not_an_error() {
        let (store, executor) = executor();
        let backend = MockBackend::default();

        // Another worker holds the claim
        let entry = entry_for(&assignment());
        assert!(store.create_exclusive(&entry.lock_path(), b"{}").unwrap());

        let outcome = executor
            .execute(&backend, &assignment(), &inputs())
            .await
            .unwrap();
        assert!(outcome.is_none());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
        assert_eq!(executor.stats().skips, 1);
        // The foreign lock is left alone
        assert!(store.exists(&entry.lock_path()));
    }

    #[tokio::test]
    async fn backend_failure_is_terminal() {
        let (store, executor) = executor();
        let failing = MockBackend {
            fail: true,
            ..Default::default()
        };

        let err = executor
            .execute(&failing, &assignment(), &inputs())
            .await
            .unwrap_err();
        assert!(matches!(err, LatticeError::Backend(_)));

        let entry = entry_for(&assignment());
        assert!(store.exists(&entry.fail_path()));
        assert!(!store.exists(&entry.output_path()));
        assert!(!store.exists(&entry.lock_path()));
        let diagnostic = entry
            .failure_diagnostic(store.as_ref())
            .unwrap()
            .expect("diagnostic should be stored");
        assert!(diagnostic.contains("synthetic failure"));

        // A later pass skips the entry without touching the backend
        let outcome = executor
            .execute(&failing, &assignment(), &inputs())
            .await
            .unwrap();
        assert!(outcome.is_none());
        assert_eq!(failing.calls.load(Ordering::SeqCst), 1);
        assert_eq!(executor.stats().failures, 1);
    }

    #[tokio::test]
    async fn mismatched_stored_params_abort_with_collision() {
        let (store, executor) = executor();
        let backend = MockBackend::default();

        // Forge an entry whose stored parameters disagree with the
        // assignment that fingerprints to the same root
        let entry = entry_for(&assignment());
        store
            .write_atomic(&entry.params_path(), br#"{"model":"other"}"#)
            .unwrap();
        entry
            .write_output(store.as_ref(), &["stale".to_string()])
            .unwrap();

        let err = executor
            .execute(&backend, &assignment(), &inputs())
            .await
            .unwrap_err();
        match err {
            LatticeError::Cache(CacheError::Collision { .. }) => {}
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }
}
