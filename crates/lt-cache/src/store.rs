//! The storage seam all artifact reads and writes flow through.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use dashmap::DashMap;

use lt_types::{CacheError, LatticeResult};

/// Storage interface for cache artifacts.
///
/// Everything the sweep persists goes through this trait, so the
/// filesystem layout can later be swapped for a key-value store without
/// touching optimizer or executor logic. Implementations must guarantee:
/// `write_atomic` never exposes partially written content, and
/// `create_exclusive` is atomic across processes sharing the store.
pub trait ArtifactStore: Send + Sync + std::fmt::Debug {
    fn exists(&self, path: &Path) -> bool;

    /// Read an artifact; missing paths are a `CacheError::MissingArtifact`.
    fn read(&self, path: &Path) -> LatticeResult<Vec<u8>>;

    /// Replace the artifact at `path`, all-or-nothing.
    fn write_atomic(&self, path: &Path, bytes: &[u8]) -> LatticeResult<()>;

    /// Create `path` only if it does not already exist. Returns `false`
    /// when another writer got there first; this is the primitive lock
    /// acquisition is built on, so check-then-create is never acceptable.
    fn create_exclusive(&self, path: &Path, bytes: &[u8]) -> LatticeResult<bool>;

    /// Remove an artifact; removing a missing artifact is not an error.
    fn remove(&self, path: &Path) -> LatticeResult<()>;

    /// List artifact paths directly under `dir`, sorted; a missing
    /// directory lists as empty.
    fn list(&self, dir: &Path) -> LatticeResult<Vec<PathBuf>>;

    fn read_to_string(&self, path: &Path) -> LatticeResult<String> {
        let bytes = self.read(path)?;
        String::from_utf8(bytes).map_err(|e| {
            CacheError::CorruptArtifact {
                path: path.display().to_string(),
                message: format!("not valid UTF-8: {e}"),
            }
            .into()
        })
    }
}

/// Filesystem-backed artifact store: the production implementation.
#[derive(Debug, Default)]
pub struct FsStore;

impl FsStore {
    pub fn new() -> Self {
        Self
    }

    fn ensure_parent(path: &Path) -> LatticeResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }
}

impl ArtifactStore for FsStore {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn read(&self, path: &Path) -> LatticeResult<Vec<u8>> {
        match fs::read(path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(CacheError::MissingArtifact {
                path: path.display().to_string(),
            }
            .into()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_atomic(&self, path: &Path, bytes: &[u8]) -> LatticeResult<()> {
        Self::ensure_parent(path)?;
        let ts = Utc::now().timestamp_micros();
        let pid = std::process::id();
        let name = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("artifact");
        let tmp = path.with_file_name(format!(".{name}.tmp.{pid}.{ts}"));
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&tmp, path)?;
        if let Some(parent) = path.parent() {
            if let Ok(dir) = fs::File::open(parent) {
                let _ = dir.sync_all();
            }
        }
        Ok(())
    }

    fn create_exclusive(&self, path: &Path, bytes: &[u8]) -> LatticeResult<bool> {
        Self::ensure_parent(path)?;
        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
        {
            Ok(mut file) => {
                file.write_all(bytes)?;
                file.sync_all()?;
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn remove(&self, path: &Path) -> LatticeResult<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self, dir: &Path) -> LatticeResult<Vec<PathBuf>> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                paths.push(entry.path());
            }
        }
        paths.sort();
        Ok(paths)
    }
}

/// In-memory artifact store keyed by path. Used in tests and as the
/// reference semantics for any future key-value backed implementation.
#[derive(Debug, Default)]
pub struct MemoryStore {
    files: DashMap<PathBuf, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            files: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl ArtifactStore for MemoryStore {
    fn exists(&self, path: &Path) -> bool {
        self.files.contains_key(path)
    }

    fn read(&self, path: &Path) -> LatticeResult<Vec<u8>> {
        self.files
            .get(path)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| {
                CacheError::MissingArtifact {
                    path: path.display().to_string(),
                }
                .into()
            })
    }

    fn write_atomic(&self, path: &Path, bytes: &[u8]) -> LatticeResult<()> {
        self.files.insert(path.to_path_buf(), bytes.to_vec());
        Ok(())
    }

    fn create_exclusive(&self, path: &Path, bytes: &[u8]) -> LatticeResult<bool> {
        // The entry API holds the shard lock, making insert-if-absent atomic.
        match self.files.entry(path.to_path_buf()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Ok(false),
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(bytes.to_vec());
                Ok(true)
            }
        }
    }

    fn remove(&self, path: &Path) -> LatticeResult<()> {
        self.files.remove(path);
        Ok(())
    }

    fn list(&self, dir: &Path) -> LatticeResult<Vec<PathBuf>> {
        let mut paths: Vec<PathBuf> = self
            .files
            .iter()
            .map(|entry| entry.key().clone())
            .filter(|path| path.parent() == Some(dir))
            .collect();
        paths.sort();
        Ok(paths)
    }
}
