//! Exclusive claims on cache entries.
//!
//! A claim is a single create-exclusive write of the lock artifact. There
//! is no check-then-create window: whoever creates the file owns the entry,
//! everyone else observes contention and moves on.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use lt_types::LatticeResult;

use crate::entry::CacheEntry;
use crate::store::ArtifactStore;

/// Diagnostic payload written into the lock artifact. Never used for
/// correctness decisions, only for inspecting who holds a claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockPayload {
    pub owner: Uuid,
    pub pid: u32,
    pub acquired_at: DateTime<Utc>,
}

impl LockPayload {
    pub fn current() -> Self {
        Self {
            owner: Uuid::new_v4(),
            pid: std::process::id(),
            acquired_at: Utc::now(),
        }
    }
}

/// Guard for an acquired claim. Release is explicit on the success path;
/// Drop is the safety net that keeps an early return or panic from
/// wedging the entry for other workers on a shared store.
///
/// A process that dies without running Drop leaves the lock artifact
/// behind. That is deliberate: the claim may cover an arbitrarily long
/// backend call, so nothing expires it. Leftover locks are surfaced by
/// scans and removed by hand.
#[derive(Debug)]
pub struct CacheLock {
    store: Arc<dyn ArtifactStore>,
    path: PathBuf,
    payload: LockPayload,
    released: bool,
}

impl CacheLock {
    /// Try to claim an entry. `Ok(None)` means another worker holds the
    /// claim; that is an ordinary skip signal, not an error.
    pub fn try_acquire(
        store: Arc<dyn ArtifactStore>,
        entry: &CacheEntry,
    ) -> LatticeResult<Option<Self>> {
        let path = entry.lock_path();
        let payload = LockPayload::current();
        let serialized = serde_json::to_vec(&payload)?;
        if !store.create_exclusive(&path, &serialized)? {
            debug!(fingerprint = %entry.fingerprint(), "entry already claimed, skipping");
            return Ok(None);
        }
        debug!(fingerprint = %entry.fingerprint(), owner = %payload.owner, "claimed entry");
        Ok(Some(Self {
            store,
            path,
            payload,
            released: false,
        }))
    }

    pub fn payload(&self) -> &LockPayload {
        &self.payload
    }

    /// Release the claim, removing the lock artifact.
    pub fn release(mut self) -> LatticeResult<()> {
        self.released = true;
        debug!(path = %self.path.display(), "releasing claim");
        self.store.remove(&self.path)
    }
}

impl Drop for CacheLock {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.store.remove(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to remove lock artifact");
        }
    }
}

/// Inspect the payload of a lock artifact, if one exists. Unparsable
/// payloads read as `None` rather than failing a scan.
pub fn read_lock_payload(
    store: &dyn ArtifactStore,
    entry: &CacheEntry,
) -> LatticeResult<Option<LockPayload>> {
    let path = entry.lock_path();
    if !store.exists(&path) {
        return Ok(None);
    }
    let bytes = store.read(&path)?;
    Ok(serde_json::from_slice(&bytes).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::fingerprint;
    use crate::store::{FsStore, MemoryStore};
    use lt_types::ParameterAssignment;
    use std::path::Path;

    fn test_entry(dir: &Path) -> CacheEntry {
        let assignment = ParameterAssignment::new().with("model", "m1");
        CacheEntry::new(dir, fingerprint(&assignment).unwrap())
    }

    #[test]
    fn acquire_then_contend_then_release() {
        let store: Arc<dyn ArtifactStore> = Arc::new(MemoryStore::new());
        let entry = test_entry(Path::new("/results"));

        let lock = CacheLock::try_acquire(store.clone(), &entry)
            .unwrap()
            .expect("first claim should succeed");
        assert!(store.exists(&entry.lock_path()));

        // Second claim observes contention, not an error
        assert!(CacheLock::try_acquire(store.clone(), &entry)
            .unwrap()
            .is_none());

        lock.release().unwrap();
        assert!(!store.exists(&entry.lock_path()));

        // Entry is claimable again after release
        assert!(CacheLock::try_acquire(store.clone(), &entry)
            .unwrap()
            .is_some());
    }

    #[test]
    fn drop_removes_lock_artifact() {
        let store: Arc<dyn ArtifactStore> = Arc::new(MemoryStore::new());
        let entry = test_entry(Path::new("/results"));

        {
            let _lock = CacheLock::try_acquire(store.clone(), &entry)
                .unwrap()
                .unwrap();
            assert!(store.exists(&entry.lock_path()));
        }
        assert!(!store.exists(&entry.lock_path()));
    }

    #[test]
    fn payload_identifies_the_owner() {
        let store: Arc<dyn ArtifactStore> = Arc::new(MemoryStore::new());
        let entry = test_entry(Path::new("/results"));

        let lock = CacheLock::try_acquire(store.clone(), &entry)
            .unwrap()
            .unwrap();
        let stored = read_lock_payload(store.as_ref(), &entry)
            .unwrap()
            .expect("payload should be readable while held");
        assert_eq!(&stored, lock.payload());
        assert_eq!(stored.pid, std::process::id());

        lock.release().unwrap();
        assert!(read_lock_payload(store.as_ref(), &entry)
            .unwrap()
            .is_none());
    }

    #[test]
    fn leftover_lock_reads_as_contention() {
        // Simulated dead worker: lock artifact exists, nobody releases it.
        let store: Arc<dyn ArtifactStore> = Arc::new(MemoryStore::new());
        let entry = test_entry(Path::new("/results"));
        store.write_atomic(&entry.lock_path(), b"{}").unwrap();

        assert!(CacheLock::try_acquire(store.clone(), &entry)
            .unwrap()
            .is_none());

        // Manual cleanup makes the entry claimable again
        store.remove(&entry.lock_path()).unwrap();
        assert!(CacheLock::try_acquire(store, &entry).unwrap().is_some());
    }

    #[test]
    fn concurrent_claims_elect_exactly_one_winner() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn ArtifactStore> = Arc::new(FsStore::new());
        let entry = test_entry(dir.path());

        let (tx, rx) = crossbeam_channel::unbounded();
        let barrier = Arc::new(std::sync::Barrier::new(8));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            let entry = entry.clone();
            let tx = tx.clone();
            let barrier = barrier.clone();
            handles.push(std::thread::spawn(move || {
                barrier.wait();
                let outcome = CacheLock::try_acquire(store, &entry).unwrap();
                tx.send(outcome.is_some()).unwrap();
                // No guard drops until every thread has attempted
                barrier.wait();
            }));
        }
        drop(tx);

        let winners = rx.iter().filter(|won| *won).count();
        assert_eq!(winners, 1);
        for handle in handles {
            handle.join().unwrap();
        }
    }
}
