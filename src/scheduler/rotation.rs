//! Next-video selection.

use crate::catalog::Catalog;
use channelcast_common::{AssetId, ChannelId, VideoAsset};
use rand::seq::IteratorRandom;

/// Pick the video that follows `current` on `channel`.
///
/// The entry after `current` in the playlist, wrapping to the first entry
/// after the last one. When `current` is not in the playlist (for example it
/// was removed from the catalog) the first entry is used. Only an empty
/// playlist falls back to an arbitrary catalog asset.
pub fn pick_next(catalog: &Catalog, channel: ChannelId, current: &AssetId) -> Option<VideoAsset> {
    let playlist = catalog.playlist(channel);

    if playlist.is_empty() {
        return catalog.assets().choose(&mut rand::thread_rng()).cloned();
    }

    let index = playlist
        .iter()
        .position(|id| id == current)
        .map(|i| (i + 1) % playlist.len())
        .unwrap_or(0);

    catalog.asset(&playlist[index]).cloned()
}

/// First video a new channel plays.
pub fn pick_first(catalog: &Catalog, channel: ChannelId) -> Option<VideoAsset> {
    match catalog.playlist(channel).first() {
        Some(id) => catalog.asset(id).cloned(),
        None => catalog.assets().choose(&mut rand::thread_rng()).cloned(),
    }
}
