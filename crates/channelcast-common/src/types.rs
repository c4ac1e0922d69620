//! Core domain types: video assets and channels.

use crate::{AssetId, ChannelId, Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A pre-recorded video that can be scheduled on a channel.
///
/// Assets are immutable once created; a different duration means a
/// different asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoAsset {
    /// Asset identity.
    pub id: AssetId,
    /// Display title.
    pub title: String,
    /// Total duration in seconds. Always positive and finite.
    pub duration_secs: f64,
    /// Storage key the content stager resolves to a local file.
    pub key: String,
    /// Local playable copy, once staged.
    #[serde(skip)]
    pub local_path: Option<PathBuf>,
}

impl VideoAsset {
    /// Create an asset, validating its duration and storage key.
    pub fn new(
        id: impl Into<AssetId>,
        title: impl Into<String>,
        duration_secs: f64,
        key: impl Into<String>,
    ) -> Result<Self> {
        let id = id.into();
        let key = key.into();

        if !(duration_secs.is_finite() && duration_secs > 0.0) {
            return Err(Error::invalid_input(format!(
                "asset {id}: duration must be positive, got {duration_secs}"
            )));
        }
        if key.trim().is_empty() {
            return Err(Error::invalid_input(format!("asset {id}: empty storage key")));
        }

        Ok(Self {
            id,
            title: title.into(),
            duration_secs,
            key,
            local_path: None,
        })
    }

    /// Copy of this asset pointing at a staged local file.
    #[must_use]
    pub fn with_local_path(&self, path: impl AsRef<Path>) -> Self {
        Self {
            local_path: Some(path.as_ref().to_path_buf()),
            ..self.clone()
        }
    }
}

/// A channel and its rotation order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    /// Channel number.
    pub id: ChannelId,
    /// Display name.
    pub name: String,
    /// Optional blurb shown in the guide.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Ordered playlist; order is rotation order.
    pub playlist: Vec<AssetId>,
}

impl Channel {
    pub fn new(id: ChannelId, name: impl Into<String>, playlist: Vec<AssetId>) -> Self {
        Self {
            id,
            name: name.into(),
            description: None,
            playlist,
        }
    }
}
