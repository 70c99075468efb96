//! Persistence Seams
//!
//! The core never owns storage. It talks to a [`JobStore`] for generation
//! records and a [`FileStore`] for archived artifacts. Both are async traits
//! so embedding applications can plug in a database or object store.
//!
//! Reference implementations:
//! - [`InMemoryJobStore`] backed by a `DashMap`
//! - [`MemoryFileStore`] keeping bytes in memory
//! - [`LocalFileStore`] writing under a root directory

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;

use crate::job::{GenerationJob, InvalidTransition, JobId, JobUpdate};

/// Storage failure
#[derive(Debug, Error)]
pub enum StoreError {
    /// No record with this id
    #[error("job {0} not found")]
    NotFound(JobId),

    /// Update would move a record backwards
    #[error(transparent)]
    Rejected(#[from] InvalidTransition),

    /// Filesystem failure
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path being written
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },
}

// =============================================================================
// Job Store
// =============================================================================

/// Generation record persistence
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new record
    async fn insert(&self, job: &GenerationJob) -> Result<(), StoreError>;

    /// Apply a partial update to an existing record
    async fn update_by_id(&self, id: &JobId, update: JobUpdate) -> Result<(), StoreError>;
}

/// Job store held in memory
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: DashMap<JobId, GenerationJob>,
    updates: DashMap<JobId, usize>,
}

impl InMemoryJobStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a record
    #[must_use]
    pub fn get(&self, id: &JobId) -> Option<GenerationJob> {
        self.jobs.get(id).map(|entry| entry.value().clone())
    }

    /// Number of successful updates applied to a record
    #[must_use]
    pub fn update_count(&self, id: &JobId) -> usize {
        self.updates.get(id).map_or(0, |n| *n)
    }

    /// Number of records
    #[must_use]
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Whether the store holds no records
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn insert(&self, job: &GenerationJob) -> Result<(), StoreError> {
        self.jobs.insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn update_by_id(&self, id: &JobId, update: JobUpdate) -> Result<(), StoreError> {
        let mut entry = self
            .jobs
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        entry.apply_update(update)?;
        drop(entry);
        *self.updates.entry(id.clone()).or_insert(0) += 1;
        Ok(())
    }
}

// =============================================================================
// File Store
// =============================================================================

/// Artifact file storage
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Store `bytes` as `name` under the logical directory `path`
    ///
    /// Returns a URL the stored file can be fetched from.
    async fn upload(&self, name: &str, path: &str, bytes: Vec<u8>) -> Result<String, StoreError>;
}

/// File store held in memory
#[derive(Debug, Default)]
pub struct MemoryFileStore {
    files: DashMap<String, Vec<u8>>,
}

impl MemoryFileStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes stored at a URL returned by `upload`
    #[must_use]
    pub fn get(&self, url: &str) -> Option<Vec<u8>> {
        self.files.get(url).map(|entry| entry.value().clone())
    }
}

#[async_trait]
impl FileStore for MemoryFileStore {
    async fn upload(&self, name: &str, path: &str, bytes: Vec<u8>) -> Result<String, StoreError> {
        let url = format!("memory://{}/{name}", path.trim_matches('/'));
        self.files.insert(url.clone(), bytes);
        Ok(url)
    }
}

/// File store writing below a root directory
#[derive(Clone, Debug)]
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    /// Create a store rooted at `root` (created on first upload)
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn upload(&self, name: &str, path: &str, bytes: Vec<u8>) -> Result<String, StoreError> {
        let dir = self.root.join(path.trim_matches('/'));
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| StoreError::Io {
                path: dir.clone(),
                source,
            })?;

        // Names come from provider metadata; keep only the final component
        let file_name = Path::new(name)
            .file_name()
            .map_or_else(|| "artifact".into(), |n| n.to_string_lossy().into_owned());
        let target = dir.join(file_name);
        tokio::fs::write(&target, &bytes)
            .await
            .map_err(|source| StoreError::Io {
                path: target.clone(),
                source,
            })?;

        tracing::debug!(path = %target.display(), size = bytes.len(), "Stored artifact");
        Ok(format!("file://{}", target.display()))
    }
}
