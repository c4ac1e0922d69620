//! TOML manifest catalog.
//!
//! ```toml
//! [[channels]]
//! number = 1
//! name = "News"
//!
//! [[channels.videos]]
//! id = "vid001"
//! title = "Morning Headlines"
//! key = "channel_1/headlines.mp4"
//! duration = 180.0
//! ```
//!
//! Videos without a duration have it read from the source file's movie
//! header.

use super::{Catalog, CatalogSource};
use anyhow::{Context, Result};
use async_trait::async_trait;
use channelcast_common::paths::resolve_key;
use channelcast_common::{AssetId, Channel, ChannelId, VideoAsset};
use channelcast_media::extract_init_segment;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;

/// Bytes read from a source file when probing its duration.
const DURATION_PROBE_BYTES: u64 = 4 * 1024 * 1024;

#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(default)]
    channels: Vec<ManifestChannel>,
}

#[derive(Debug, Deserialize)]
struct ManifestChannel {
    number: u32,
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    videos: Vec<ManifestVideo>,
}

#[derive(Debug, Deserialize)]
struct ManifestVideo {
    id: String,
    title: String,
    key: String,
    #[serde(default)]
    duration: Option<f64>,
}

/// Catalog loaded from a manifest file, with content under `source_dir`.
pub struct ManifestCatalog {
    manifest: PathBuf,
    source_dir: PathBuf,
}

impl ManifestCatalog {
    pub fn new(manifest: impl Into<PathBuf>, source_dir: impl Into<PathBuf>) -> Self {
        Self {
            manifest: manifest.into(),
            source_dir: source_dir.into(),
        }
    }

    pub fn manifest_path(&self) -> &Path {
        &self.manifest
    }

    async fn resolve_duration(&self, video: &ManifestVideo) -> Option<f64> {
        if let Some(duration) = video.duration.filter(|d| d.is_finite() && *d > 0.0) {
            return Some(duration);
        }

        let path = resolve_key(&self.source_dir, &video.key)?;
        match probe_duration(&path).await {
            Ok(Some(duration)) => {
                tracing::debug!(asset = %video.id, duration = duration, "Probed duration");
                Some(duration)
            }
            Ok(None) => None,
            Err(e) => {
                tracing::debug!(asset = %video.id, path = ?path, "Duration probe failed: {:#}", e);
                None
            }
        }
    }
}

#[async_trait]
impl CatalogSource for ManifestCatalog {
    async fn load(&self) -> Result<Catalog> {
        let content = tokio::fs::read_to_string(&self.manifest)
            .await
            .with_context(|| format!("Failed to read manifest: {:?}", self.manifest))?;
        let manifest: Manifest = toml::from_str(&content)
            .with_context(|| format!("Failed to parse manifest: {:?}", self.manifest))?;

        let mut catalog = Catalog::new();
        let mut durations: HashMap<String, f64> = HashMap::new();

        for entry in manifest.channels {
            let Some(id) = ChannelId::new(entry.number) else {
                tracing::warn!(name = %entry.name, "Skipping channel with number 0");
                continue;
            };

            let mut playlist = Vec::with_capacity(entry.videos.len());
            for video in &entry.videos {
                let asset_id = AssetId::from(video.id.as_str());
                if catalog.asset(&asset_id).is_some() {
                    playlist.push(asset_id);
                    continue;
                }

                let duration = match durations.get(&video.key) {
                    Some(d) => Some(*d),
                    None => self.resolve_duration(video).await,
                };
                let Some(duration) = duration else {
                    tracing::warn!(channel = %id, asset = %video.id, "Skipping video with unknown duration");
                    continue;
                };
                durations.insert(video.key.clone(), duration);

                match VideoAsset::new(asset_id.clone(), video.title.clone(), duration, video.key.clone()) {
                    Ok(asset) => {
                        catalog.insert_asset(asset);
                        playlist.push(asset_id);
                    }
                    Err(e) => {
                        tracing::warn!(channel = %id, asset = %video.id, "Skipping invalid video: {}", e);
                    }
                }
            }

            let mut channel = Channel::new(id, entry.name, playlist);
            channel.description = entry.description;
            catalog.insert_channel(channel);
        }

        Ok(catalog)
    }
}

/// Movie duration announced by the init segment of the file at `path`.
async fn probe_duration(path: &Path) -> Result<Option<f64>> {
    let file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("Failed to open {:?}", path))?;
    let mut prefix = Vec::new();
    file.take(DURATION_PROBE_BYTES)
        .read_to_end(&mut prefix)
        .await
        .with_context(|| format!("Failed to read {:?}", path))?;

    let init = extract_init_segment(&prefix)?;
    Ok(init.duration_secs())
}
