//! Storage backends for the persisted tiers.
//!
//! A backend stores opaque blobs under a namespace string, the way a browser's
//! `sessionStorage`/`localStorage` stores strings under a key. The tier layer
//! above decides what goes in the blob.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Quota exceeded: blob of {size} bytes exceeds {quota} bytes")]
    QuotaExceeded { size: usize, quota: usize },

    #[error("Session and persistent tiers share the directory {}", .0.display())]
    SharedLocation(PathBuf),
}

/// Blob storage keyed by namespace.
pub trait StorageBackend: Send {
    /// Short name for logging.
    fn name(&self) -> &'static str;

    /// Read the blob stored under `namespace`, if any.
    fn load(&self, namespace: &str) -> Result<Option<String>, StorageError>;

    /// Replace the blob stored under `namespace`.
    fn save(&mut self, namespace: &str, blob: &str) -> Result<(), StorageError>;

    /// Drop the blob stored under `namespace`. Missing blobs are not an error.
    fn clear(&mut self, namespace: &str) -> Result<(), StorageError>;
}

/// In-process backend with an optional size quota.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    blobs: HashMap<String, String>,
    quota: Option<usize>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject any blob larger than `quota` bytes.
    pub fn with_quota(quota: usize) -> Self {
        Self {
            blobs: HashMap::new(),
            quota: Some(quota),
        }
    }
}

impl StorageBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn load(&self, namespace: &str) -> Result<Option<String>, StorageError> {
        Ok(self.blobs.get(namespace).cloned())
    }

    fn save(&mut self, namespace: &str, blob: &str) -> Result<(), StorageError> {
        if let Some(quota) = self.quota {
            if blob.len() > quota {
                return Err(StorageError::QuotaExceeded {
                    size: blob.len(),
                    quota,
                });
            }
        }
        self.blobs.insert(namespace.to_string(), blob.to_string());
        Ok(())
    }

    fn clear(&mut self, namespace: &str) -> Result<(), StorageError> {
        self.blobs.remove(namespace);
        Ok(())
    }
}

/// File backend: one `<namespace>.json` file per namespace in a directory.
#[derive(Debug)]
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    /// Open a backend rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Whether both backends write into the same directory.
    pub fn same_location(&self, other: &FileBackend) -> Result<bool, StorageError> {
        Ok(std::fs::canonicalize(&self.dir)? == std::fs::canonicalize(&other.dir)?)
    }

    fn blob_path(&self, namespace: &str) -> PathBuf {
        self.dir.join(format!("{namespace}.json"))
    }
}

impl StorageBackend for FileBackend {
    fn name(&self) -> &'static str {
        "file"
    }

    fn load(&self, namespace: &str) -> Result<Option<String>, StorageError> {
        let path = self.blob_path(namespace);
        match std::fs::read_to_string(&path) {
            Ok(blob) => Ok(Some(blob)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&mut self, namespace: &str, blob: &str) -> Result<(), StorageError> {
        let path = self.blob_path(namespace);

        // Write-then-rename so a crash never leaves a half-written blob.
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, blob)?;
        std::fs::rename(&tmp, &path)?;

        debug!(path = %path.display(), size = blob.len(), "Wrote blob");
        Ok(())
    }

    fn clear(&mut self, namespace: &str) -> Result<(), StorageError> {
        let path = self.blob_path(namespace);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                debug!(path = %path.display(), "Deleted blob");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
