use channelcast_common::{AssetId, ChannelId, VideoAsset};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// The authoritative "what is on, since when" for one channel.
#[derive(Debug, Clone)]
pub struct ChannelPlaybackState {
    pub channel: ChannelId,
    pub current: VideoAsset,
    /// When `current` began for every viewer. Never moves backwards.
    pub started_at: DateTime<Utc>,
    /// Cached pick for the next rotation.
    pub next: Option<VideoAsset>,
}

impl ChannelPlaybackState {
    pub fn new(channel: ChannelId, current: VideoAsset, started_at: DateTime<Utc>) -> Self {
        Self {
            channel,
            current,
            started_at,
            next: None,
        }
    }

    /// Seconds since `started_at`; negative if `now` is earlier.
    pub fn elapsed_secs(&self, now: DateTime<Utc>) -> f64 {
        elapsed_secs(self.started_at, now)
    }

    /// Playback offset clamped to `[0, duration]`.
    pub fn position_secs(&self, now: DateTime<Utc>) -> f64 {
        self.elapsed_secs(now).clamp(0.0, self.current.duration_secs)
    }

    /// Replace the current video, starting it at `now`.
    pub(crate) fn advance(&mut self, video: VideoAsset, next: Option<VideoAsset>, now: DateTime<Utc>) {
        self.current = video;
        self.next = next;
        self.restart(now);
    }

    /// Restart the current video at `now`.
    pub(crate) fn restart(&mut self, now: DateTime<Utc>) {
        self.started_at = self.started_at.max(now);
    }
}

pub(crate) fn elapsed_secs(started_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    (now - started_at).num_milliseconds() as f64 / 1000.0
}

/// Textual "now playing" readout for a channel.
#[derive(Debug, Clone, Serialize)]
pub struct NowPlaying {
    pub channel_number: ChannelId,
    pub channel_name: String,
    pub asset_id: AssetId,
    pub title: String,
    /// Seconds into the video, clamped to `[0, duration]`.
    pub current_time: f64,
    pub duration: f64,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssetSummary {
    pub id: AssetId,
    pub title: String,
    pub duration: f64,
}

impl From<&VideoAsset> for AssetSummary {
    fn from(asset: &VideoAsset) -> Self {
        Self {
            id: asset.id.clone(),
            title: asset.title.clone(),
            duration: asset.duration_secs,
        }
    }
}

/// One row of the channel guide.
#[derive(Debug, Clone, Serialize)]
pub struct GuideEntry {
    pub channel_number: ChannelId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Whether the channel has a running broadcaster.
    pub live: bool,
    pub current: Option<AssetSummary>,
    pub started_at: Option<DateTime<Utc>>,
    pub current_time: Option<f64>,
    pub next: Option<AssetSummary>,
}
