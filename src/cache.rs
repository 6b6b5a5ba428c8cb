// src/cache.rs

//! Offline page-image cache.
//!
//! Entries are keyed by `(partition, unit)` rather than by URL, so membership
//! of an edition is a directory (or map) lookup instead of a string match.
//! [`ResourceCache`] layers the read-through policy on top of any
//! [`PageCache`] backend.

use crate::editions::{Edition, EditionRegistry};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::future::join_all;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid cache partition: {0:?}")]
    InvalidPartition(String),
}

/// Identifies one cached page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageKey {
    pub partition: String,
    pub unit: u16,
}

impl PageKey {
    pub fn new(partition: &str, unit: u16) -> Self {
        Self {
            partition: partition.to_owned(),
            unit,
        }
    }
}

/// Storage for fetched page images.
///
/// `put` must be all-or-nothing: a reader never sees a partially written entry.
#[async_trait]
pub trait PageCache: Send + Sync {
    async fn get(&self, key: &PageKey) -> Result<Option<Bytes>, CacheError>;
    async fn contains(&self, key: &PageKey) -> Result<bool, CacheError>;
    async fn put(&self, key: &PageKey, data: Bytes) -> Result<(), CacheError>;
    /// Returns whether an entry was removed.
    async fn delete(&self, key: &PageKey) -> Result<bool, CacheError>;
    /// All entries stored under a partition, in no particular order.
    async fn keys(&self, partition: &str) -> Result<Vec<PageKey>, CacheError>;

    async fn count(&self, partition: &str) -> Result<usize, CacheError> {
        Ok(self.keys(partition).await?.len())
    }
}

/// One directory per partition, one file per page named by its 3-digit number.
#[derive(Debug, Clone)]
pub struct DiskCache {
    root: PathBuf,
}

impl DiskCache {
    /// Opens the cache rooted at `root`, creating the directory if needed.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn partition_dir(&self, partition: &str) -> Result<PathBuf, CacheError> {
        if partition.is_empty()
            || partition == "."
            || partition == ".."
            || partition.contains(['/', '\\'])
        {
            return Err(CacheError::InvalidPartition(partition.to_owned()));
        }
        Ok(self.root.join(partition))
    }

    fn entry_path(&self, key: &PageKey) -> Result<PathBuf, CacheError> {
        Ok(self.partition_dir(&key.partition)?.join(format!("{:03}", key.unit)))
    }

    /// Temporary file a page is written to before being renamed into place.
    fn temporary_path(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_owned();
        name.push(".part");
        PathBuf::from(name)
    }
}

#[async_trait]
impl PageCache for DiskCache {
    async fn get(&self, key: &PageKey) -> Result<Option<Bytes>, CacheError> {
        match tokio::fs::read(self.entry_path(key)?).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn contains(&self, key: &PageKey) -> Result<bool, CacheError> {
        match tokio::fs::metadata(self.entry_path(key)?).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, key: &PageKey, data: Bytes) -> Result<(), CacheError> {
        let path = self.entry_path(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let temp = Self::temporary_path(&path);
        if let Err(e) = tokio::fs::write(&temp, &data).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e.into());
        }
        tokio::fs::rename(&temp, &path).await?;
        Ok(())
    }

    async fn delete(&self, key: &PageKey) -> Result<bool, CacheError> {
        match tokio::fs::remove_file(self.entry_path(key)?).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn keys(&self, partition: &str) -> Result<Vec<PageKey>, CacheError> {
        let dir = self.partition_dir(partition)?;
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            // Leftover `.part` files and foreign names don't parse and are skipped.
            let unit = entry
                .file_name()
                .to_str()
                .and_then(|name| name.parse::<u16>().ok());
            if let Some(unit) = unit {
                keys.push(PageKey::new(partition, unit));
            }
        }
        Ok(keys)
    }
}

/// Process-local cache, mainly for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<PageKey, Bytes>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[async_trait]
impl PageCache for MemoryCache {
    async fn get(&self, key: &PageKey) -> Result<Option<Bytes>, CacheError> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn contains(&self, key: &PageKey) -> Result<bool, CacheError> {
        Ok(self.entries.lock().await.contains_key(key))
    }

    async fn put(&self, key: &PageKey, data: Bytes) -> Result<(), CacheError> {
        self.entries.lock().await.insert(key.clone(), data);
        Ok(())
    }

    async fn delete(&self, key: &PageKey) -> Result<bool, CacheError> {
        Ok(self.entries.lock().await.remove(key).is_some())
    }

    async fn keys(&self, partition: &str) -> Result<Vec<PageKey>, CacheError> {
        Ok(self
            .entries
            .lock()
            .await
            .keys()
            .filter(|k| k.partition == partition)
            .cloned()
            .collect())
    }
}

/// Where a page can be loaded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageSource {
    /// Bytes already on this device.
    Cached(Bytes),
    /// Remote URL the caller fetches itself.
    Remote(String),
}

impl PageSource {
    pub fn is_cached(&self) -> bool {
        matches!(self, PageSource::Cached(_))
    }
}

/// Cache-first page resolution over an optional backend.
///
/// Without a backend every lookup degrades to the remote URL.
#[derive(Clone)]
pub struct ResourceCache {
    registry: EditionRegistry,
    backend: Option<Arc<dyn PageCache>>,
}

impl ResourceCache {
    pub fn new(registry: EditionRegistry, backend: Arc<dyn PageCache>) -> Self {
        Self {
            registry,
            backend: Some(backend),
        }
    }

    pub fn without_cache(registry: EditionRegistry) -> Self {
        Self {
            registry,
            backend: None,
        }
    }

    pub fn registry(&self) -> &EditionRegistry {
        &self.registry
    }

    pub fn backend(&self) -> Option<&Arc<dyn PageCache>> {
        self.backend.as_ref()
    }

    pub fn edition(&self, edition_id: Option<&str>) -> &Edition {
        self.registry.get(edition_id)
    }

    /// Cached bytes for a page if present, otherwise its remote URL.
    ///
    /// Never fetches and never fails; storage errors fall back to the URL.
    pub async fn resolve(&self, unit: u16, edition_id: Option<&str>) -> PageSource {
        let edition = self.edition(edition_id);
        let url = edition.page_url(unit);
        let Some(backend) = &self.backend else {
            return PageSource::Remote(url);
        };

        match backend.get(&PageKey::new(&edition.partition, unit)).await {
            Ok(Some(data)) => PageSource::Cached(data),
            Ok(None) => PageSource::Remote(url),
            Err(e) => {
                warn!(edition = %edition.id, unit, error = %e, "cache lookup failed, using network");
                PageSource::Remote(url)
            }
        }
    }

    /// Number of cached pages of an edition. Zero when no cache is available.
    pub async fn cached_count(&self, edition_id: Option<&str>) -> usize {
        let edition = self.edition(edition_id);
        let Some(backend) = &self.backend else {
            return 0;
        };
        match backend.count(&edition.partition).await {
            Ok(n) => n,
            Err(e) => {
                warn!(edition = %edition.id, error = %e, "failed to count cached pages");
                0
            }
        }
    }

    /// Whether the edition's partition holds at least `total_units` entries.
    pub async fn is_fully_cached(&self, edition_id: Option<&str>) -> bool {
        let edition = self.edition(edition_id);
        self.cached_count(Some(&edition.id)).await >= usize::from(edition.total_units)
    }

    /// Deletes every cached page of an edition and returns how many were removed.
    ///
    /// All deletions are awaited before returning. On failure the entries that
    /// were removed stay removed and the first error is returned.
    pub async fn delete_all(&self, edition_id: Option<&str>) -> Result<usize, CacheError> {
        let edition = self.edition(edition_id);
        let Some(backend) = &self.backend else {
            return Ok(0);
        };

        let keys = backend.keys(&edition.partition).await?;
        let results = join_all(keys.iter().map(|key| backend.delete(key))).await;

        let mut removed = 0;
        let mut first_error = None;
        for result in results {
            match result {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        debug!(edition = %edition.id, removed, "cleared cached pages");

        match first_error {
            Some(e) => Err(e),
            None => Ok(removed),
        }
    }
}
