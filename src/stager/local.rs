//! Filesystem-backed stager.
//!
//! The library directory stands in for object storage: a key is a relative
//! path under `source_dir`, and staging copies it to the same relative path
//! under `cache_dir`.

use super::{ContentStager, StagingError};
use async_trait::async_trait;
use channelcast_common::paths::resolve_key;
use channelcast_media::is_fragmented;
use dashmap::DashMap;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tokio::sync::Mutex;

/// Prefix searched for a `moof` box when validating staged content.
pub const FRAGMENT_PROBE_BYTES: usize = 4 * 1024 * 1024;

/// Copies assets from a library directory into a local cache directory.
pub struct LocalStager {
    source_dir: PathBuf,
    cache_dir: PathBuf,
    /// One lock per key so concurrent stagings of a key perform one copy.
    /// Entries live only while a staging of that key is running or waiting.
    in_flight: DashMap<String, Arc<Mutex<()>>>,
}

impl LocalStager {
    pub fn new(source_dir: impl Into<PathBuf>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_dir: source_dir.into(),
            cache_dir: cache_dir.into(),
            in_flight: DashMap::new(),
        }
    }

    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn source_path(&self, key: &str) -> Result<PathBuf, StagingError> {
        resolve_key(&self.source_dir, key).ok_or_else(|| StagingError::InvalidKey(key.to_string()))
    }

    fn local_path(&self, key: &str) -> Result<PathBuf, StagingError> {
        resolve_key(&self.cache_dir, key).ok_or_else(|| StagingError::InvalidKey(key.to_string()))
    }

    fn key_lock(&self, key: &str) -> Arc<Mutex<()>> {
        self.in_flight
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the lock for `key` once nobody else holds or waits on it.
    fn release_key(&self, key: &str) {
        self.in_flight
            .remove_if(key, |_, lock| Arc::strong_count(lock) == 1);
    }

    async fn stage(&self, key: &str, source: PathBuf, dest: &Path) -> Result<(), StagingError> {
        if tokio::fs::try_exists(dest).await.unwrap_or(false) {
            tracing::trace!(key = %key, "Asset already local");
            return Ok(());
        }

        tracing::info!(key = %key, path = ?dest, "Staging asset");

        let key_owned = key.to_string();
        let dest_owned = dest.to_path_buf();
        let bytes = tokio::task::spawn_blocking(move || copy_validated(&key_owned, &source, &dest_owned))
            .await
            .map_err(|e| StagingError::Task {
                key: key.to_string(),
                reason: e.to_string(),
            })??;

        tracing::info!(key = %key, bytes = bytes, "Asset staged");
        Ok(())
    }
}

#[async_trait]
impl ContentStager for LocalStager {
    async fn ensure_local(&self, key: &str) -> Result<PathBuf, StagingError> {
        let source = self.source_path(key)?;
        let dest = self.local_path(key)?;

        let lock = self.key_lock(key);
        let result = {
            let _guard = lock.lock().await;
            self.stage(key, source, &dest).await
        };
        drop(lock);
        self.release_key(key);

        result.map(|()| dest)
    }

    fn is_local(&self, key: &str) -> bool {
        self.local_path(key).map(|p| p.is_file()).unwrap_or(false)
    }

    async fn evict(&self, key: &str) -> Result<(), StagingError> {
        let dest = self.local_path(key)?;
        match tokio::fs::remove_file(&dest).await {
            Ok(()) => {
                tracing::info!(key = %key, "Evicted local copy");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StagingError::io(key, e)),
        }
    }
}

/// Copy `source` to `dest` through a temporary file in the destination
/// directory, after checking the source is fragmented MP4.
fn copy_validated(key: &str, source: &Path, dest: &Path) -> Result<u64, StagingError> {
    let mut input = File::open(source).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => StagingError::NotFound(key.to_string()),
        _ => StagingError::io(key, e),
    })?;

    let mut prefix = Vec::with_capacity(64 * 1024);
    (&mut input)
        .take(FRAGMENT_PROBE_BYTES as u64)
        .read_to_end(&mut prefix)
        .map_err(|e| StagingError::io(key, e))?;
    if !is_fragmented(&prefix) {
        return Err(StagingError::NotFragmented {
            key: key.to_string(),
            probe: FRAGMENT_PROBE_BYTES,
        });
    }
    input
        .seek(SeekFrom::Start(0))
        .map_err(|e| StagingError::io(key, e))?;

    let parent = dest.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent).map_err(|e| StagingError::io(key, e))?;

    let mut tmp = NamedTempFile::new_in(parent).map_err(|e| StagingError::io(key, e))?;
    let bytes = io::copy(&mut input, tmp.as_file_mut()).map_err(|e| StagingError::io(key, e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| StagingError::io(key, e))?;
    tmp.persist(dest)
        .map_err(|e| StagingError::io(key, e.error))?;

    Ok(bytes)
}
