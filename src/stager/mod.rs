//! Content staging: turning asset keys into local, playable files.
//!
//! The scheduler only ever plays local files. A [`ContentStager`] guarantees
//! that a local copy of an asset exists before rotation, can answer cheaply
//! whether one already does, and removes copies once a video has finished.

mod local;

pub use local::LocalStager;

use async_trait::async_trait;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failure to produce or remove a local copy. Never fatal to the scheduler.
#[derive(Debug, Error)]
pub enum StagingError {
    /// Key is empty, absolute, or escapes the storage root.
    #[error("Invalid asset key: {0:?}")]
    InvalidKey(String),

    /// No source content exists for the key.
    #[error("Asset not found in library: {0}")]
    NotFound(String),

    /// Source content is not fragmented MP4.
    #[error("Asset {key} is not fragmented MP4 (no moof within {probe} bytes)")]
    NotFragmented { key: String, probe: usize },

    #[error("I/O error staging {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: io::Error,
    },

    /// The blocking copy task panicked or was cancelled.
    #[error("Staging task for {key} failed: {reason}")]
    Task { key: String, reason: String },
}

impl StagingError {
    /// Whether retrying the same key cannot succeed without the library
    /// changing.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::InvalidKey(_) | Self::NotFound(_) | Self::NotFragmented { .. }
        )
    }

    pub(crate) fn io(key: &str, source: io::Error) -> Self {
        Self::Io {
            key: key.to_string(),
            source,
        }
    }
}

/// Makes assets available as local files.
///
/// Implementations must be idempotent: `ensure_local` on an already-local key
/// returns the existing path, and `evict` on an absent key succeeds.
#[async_trait]
pub trait ContentStager: Send + Sync {
    /// Guarantee a playable local copy of `key` exists and return its path.
    ///
    /// May block for as long as the transfer takes.
    async fn ensure_local(&self, key: &str) -> Result<PathBuf, StagingError>;

    /// Whether `key` already has a local copy. Must not block.
    fn is_local(&self, key: &str) -> bool;

    /// Remove the local copy of `key`, if any.
    async fn evict(&self, key: &str) -> Result<(), StagingError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permanent_errors() {
        assert!(StagingError::NotFound("a.mp4".into()).is_permanent());
        assert!(StagingError::NotFragmented {
            key: "a.mp4".into(),
            probe: 16
        }
        .is_permanent());
        assert!(!StagingError::io("a.mp4", io::Error::other("disk")).is_permanent());
    }
}
