//! On-disk record store.
//!
//! One file per key in the cache directory. File names are the canonical
//! key escaped to be filesystem-safe; contents are a bincode envelope
//! carrying every record field. Writes land in a `.tmp` sibling first and
//! are renamed into place, so a reader can never observe a torn record;
//! at worst a file fails to decode and reads as absence.
//!
//! All file operations run on the blocking thread pool behind a semaphore
//! that bounds concurrent I/O.
//!
//! A sidecar file (`schema.version`) holds the migration marker. Because
//! `.` is escaped in record file names, the sidecar and in-flight `.tmp`
//! files can never collide with a record.

use std::io;
use std::path::{Path, PathBuf};

use tokio::sync::Semaphore;
use tracing::debug;

use crate::key::{file_name_to_key, key_to_file_name};
use crate::record::Record;

/// Name of the schema-version sidecar file.
const VERSION_FILE: &str = "schema.version";

/// Suffix for in-flight write files.
const TMP_SUFFIX: &str = ".tmp";

/// Default bound on concurrent blocking file operations.
pub const DEFAULT_MAX_CONCURRENT_IO: usize = 64;

/// Byte-level key → record store rooted at a cache directory.
#[derive(Debug)]
pub struct DiskStore {
    root: PathBuf,
    io: Semaphore,
}

impl DiskStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub async fn open(root: PathBuf) -> io::Result<Self> {
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self {
            root,
            io: Semaphore::new(DEFAULT_MAX_CONCURRENT_IO),
        })
    }

    /// The cache directory this store writes into.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, canonical: &str) -> PathBuf {
        self.root.join(key_to_file_name(canonical))
    }

    /// Run a blocking file operation under the I/O bound.
    async fn run_blocking<T, F>(&self, op: F) -> io::Result<T>
    where
        F: FnOnce() -> io::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let _permit = self
            .io
            .acquire()
            .await
            .map_err(|_| io::Error::other("i/o semaphore closed"))?;
        tokio::task::spawn_blocking(op)
            .await
            .map_err(|e| io::Error::other(e.to_string()))?
    }

    /// Write a record, replacing any existing one under the same key.
    ///
    /// The write goes to a temporary sibling and is renamed into place.
    pub async fn save(&self, canonical: &str, record: &Record) -> io::Result<()> {
        let path = self.record_path(canonical);
        let bytes = bincode::serialize(record).map_err(|e| io::Error::other(e.to_string()))?;
        self.run_blocking(move || {
            let tmp = tmp_path(&path);
            std::fs::write(&tmp, &bytes)?;
            std::fs::rename(&tmp, &path)
        })
        .await
    }

    /// Read a record back. A missing or undecodable file is an absence,
    /// not an error.
    pub async fn retrieve(&self, canonical: &str) -> io::Result<Option<Record>> {
        let path = self.record_path(canonical);
        let key = canonical.to_string();
        self.run_blocking(move || {
            let bytes = match std::fs::read(&path) {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
                Err(e) => return Err(e),
            };
            match bincode::deserialize::<Record>(&bytes) {
                Ok(record) => Ok(Some(record)),
                Err(e) => {
                    debug!(key = %key, error = %e, "Undecodable record treated as absent");
                    Ok(None)
                }
            }
        })
        .await
    }

    /// Delete a record. Idempotent; returns the bytes freed (0 if the key
    /// was absent).
    pub async fn evict(&self, canonical: &str) -> io::Result<u64> {
        let path = self.record_path(canonical);
        self.run_blocking(move || {
            let size = match std::fs::metadata(&path) {
                Ok(meta) => meta.len(),
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
                Err(e) => return Err(e),
            };
            match std::fs::remove_file(&path) {
                Ok(()) => Ok(size),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
                Err(e) => Err(e),
            }
        })
        .await
    }

    /// Delete every record (and any stray temporary file). The
    /// schema-version sidecar survives.
    pub async fn evict_all(&self) -> io::Result<usize> {
        let root = self.root.clone();
        self.run_blocking(move || {
            let mut removed = 0;
            for entry in std::fs::read_dir(&root)? {
                let entry = entry?;
                let name = entry.file_name();
                let name = name.to_string_lossy();
                if name == VERSION_FILE {
                    continue;
                }
                if std::fs::remove_file(entry.path()).is_ok() && !name.ends_with(TMP_SUFFIX) {
                    removed += 1;
                }
            }
            Ok(removed)
        })
        .await
    }

    /// Snapshot of all stored canonical keys. May be stale with respect to
    /// concurrent writes. Foreign files in the directory are skipped.
    pub async fn all_keys(&self) -> io::Result<Vec<String>> {
        let root = self.root.clone();
        self.run_blocking(move || {
            let mut keys = Vec::new();
            for entry in std::fs::read_dir(&root)? {
                let entry = entry?;
                // The sidecar and `.tmp` files contain a literal `.` and
                // fail to decode, so this also filters them out.
                if let Some(key) = file_name_to_key(&entry.file_name().to_string_lossy()) {
                    keys.push(key);
                }
            }
            Ok(keys)
        })
        .await
    }

    /// Total bytes of stored records.
    pub async fn stored_bytes(&self) -> io::Result<u64> {
        let root = self.root.clone();
        self.run_blocking(move || {
            let mut total = 0;
            for entry in std::fs::read_dir(&root)? {
                let entry = entry?;
                if file_name_to_key(&entry.file_name().to_string_lossy()).is_some() {
                    total += entry.metadata().map(|m| m.len()).unwrap_or(0);
                }
            }
            Ok(total)
        })
        .await
    }

    /// Best-effort estimate of disk usage in megabytes.
    pub async fn stored_mb(&self) -> f64 {
        self.stored_bytes().await.unwrap_or(0) as f64 / (1024.0 * 1024.0)
    }

    /// Read the schema-version marker. Missing or unreadable markers read
    /// as version 0.
    pub async fn read_version(&self) -> u32 {
        let path = self.root.join(VERSION_FILE);
        self.run_blocking(move || {
            Ok(std::fs::read_to_string(&path)
                .ok()
                .and_then(|text| text.trim().parse().ok())
                .unwrap_or(0))
        })
        .await
        .unwrap_or(0)
    }

    /// Persist the schema-version marker.
    pub async fn write_version(&self, version: u32) -> io::Result<()> {
        let path = self.root.join(VERSION_FILE);
        self.run_blocking(move || {
            let tmp = tmp_path(&path);
            std::fs::write(&tmp, format!("{version}\n"))?;
            std::fs::rename(&tmp, &path)
        })
        .await
    }
}

/// Unique temporary sibling for an in-flight write. Concurrent writers to
/// the same key each get their own temp file; whichever rename lands last
/// wins.
fn tmp_path(path: &Path) -> PathBuf {
    use std::sync::atomic::{AtomicU64, Ordering};
    static WRITE_SEQ: AtomicU64 = AtomicU64::new(0);

    let seq = WRITE_SEQ.fetch_add(1, Ordering::Relaxed);
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".{seq}{TMP_SUFFIX}"));
    path.with_file_name(name)
}
