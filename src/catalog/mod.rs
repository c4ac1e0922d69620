//! The channel catalog: which channels exist and what each one plays.
//!
//! A [`Catalog`] is an immutable snapshot. A [`CatalogSource`] produces
//! snapshots and [`spawn_refresh_task`] periodically hands fresh ones to the
//! scheduler.

mod manifest;

pub use manifest::ManifestCatalog;

use crate::scheduler::Scheduler;
use async_trait::async_trait;
use channelcast_common::{AssetId, Channel, ChannelId, VideoAsset};
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Channels, their playlists, and every asset they reference.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    channels: BTreeMap<ChannelId, Channel>,
    assets: HashMap<AssetId, VideoAsset>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an asset. An asset already present under the same id is kept.
    pub fn insert_asset(&mut self, asset: VideoAsset) {
        self.assets.entry(asset.id.clone()).or_insert(asset);
    }

    /// Add or replace a channel. Playlist entries without a matching asset
    /// are dropped.
    pub fn insert_channel(&mut self, mut channel: Channel) {
        channel.playlist.retain(|id| self.assets.contains_key(id));
        self.channels.insert(channel.id, channel);
    }

    pub fn channel(&self, id: ChannelId) -> Option<&Channel> {
        self.channels.get(&id)
    }

    pub fn channels(&self) -> impl Iterator<Item = &Channel> {
        self.channels.values()
    }

    pub fn asset(&self, id: &AssetId) -> Option<&VideoAsset> {
        self.assets.get(id)
    }

    pub fn assets(&self) -> impl Iterator<Item = &VideoAsset> {
        self.assets.values()
    }

    /// Playlist of `channel` in rotation order.
    pub fn playlist(&self, channel: ChannelId) -> &[AssetId] {
        self.channels
            .get(&channel)
            .map(|c| c.playlist.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

/// Read-only provider of catalog snapshots.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn load(&self) -> anyhow::Result<Catalog>;
}

/// Reload the catalog every `interval` and apply it to `scheduler`.
///
/// The first reload happens one interval after spawning; load failures keep
/// the previous catalog.
pub fn spawn_refresh_task(
    source: Arc<dyn CatalogSource>,
    scheduler: Scheduler,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match source.load().await {
                Ok(catalog) => {
                    tracing::info!(
                        channels = catalog.channels.len(),
                        assets = catalog.assets.len(),
                        "Catalog refreshed"
                    );
                    scheduler.apply_catalog(catalog, Utc::now());
                }
                Err(e) => {
                    tracing::warn!("Catalog refresh failed, keeping previous catalog: {:#}", e);
                }
            }
        }
    })
}
