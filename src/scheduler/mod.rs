//! Playlist scheduling.
//!
//! The [`Scheduler`] owns every channel's playback state and, on a fixed
//! tick, decides per channel whether to bring its broadcaster up, recover a
//! stalled source, prefetch the next video, or rotate to it.
//!
//! Scheduler state and broadcaster sessions are separate lock domains. A
//! tick copies what it needs out of the scheduler lock, releases it, does
//! its staging and broadcaster work, then re-locks to commit.

mod rotation;
mod state;

pub use rotation::{pick_first, pick_next};
pub use state::{AssetSummary, ChannelPlaybackState, GuideEntry, NowPlaying};

use crate::broadcast::{BroadcastError, Broadcaster};
use crate::catalog::Catalog;
use crate::config::{BroadcastConfig, SchedulerConfig};
use crate::stager::ContentStager;
use channelcast_common::{AssetId, ChannelId, VideoAsset};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Drives rotation for every channel. Cheap to clone.
#[derive(Clone)]
pub struct Scheduler {
    state: Arc<Mutex<SchedulerState>>,
    stager: Arc<dyn ContentStager>,
    config: SchedulerConfig,
    broadcast: BroadcastConfig,
}

#[derive(Default)]
struct SchedulerState {
    catalog: Catalog,
    channels: BTreeMap<ChannelId, ChannelPlaybackState>,
    broadcasters: HashMap<ChannelId, Broadcaster>,
    /// Assets with a prefetch in flight.
    prefetching: HashSet<AssetId>,
}

/// One channel's view for a single tick, copied out of the lock.
struct TickPlan {
    channel: ChannelId,
    current: VideoAsset,
    started_at: DateTime<Utc>,
    next: Option<VideoAsset>,
    broadcaster: Option<Broadcaster>,
}

/// Result of trying to put an offline channel on air.
enum BringUp {
    Done,
    /// Try the same video again next tick.
    Retry,
    /// The current video cannot be played; move past it.
    Skip,
}

impl Scheduler {
    pub fn new(
        stager: Arc<dyn ContentStager>,
        config: SchedulerConfig,
        broadcast: BroadcastConfig,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(SchedulerState::default())),
            stager,
            config,
            broadcast,
        }
    }

    /// Install a new catalog snapshot.
    ///
    /// Existing channels keep their current video and start time. New
    /// channels start on their first playlist entry at `now` and get a
    /// broadcaster on the next tick. Channels missing from `catalog` are
    /// dropped and their broadcasters stopped.
    pub fn apply_catalog(&self, catalog: Catalog, now: DateTime<Utc>) {
        let stopped: Vec<Broadcaster> = {
            let mut guard = self.state.lock();
            let state = &mut *guard;

            let removed: Vec<ChannelId> = state
                .channels
                .keys()
                .chain(state.broadcasters.keys())
                .filter(|id| catalog.channel(**id).is_none())
                .copied()
                .collect();
            for id in &removed {
                if state.channels.remove(id).is_some() {
                    tracing::info!(channel = %id, "Channel removed from catalog");
                }
            }

            for channel in catalog.channels() {
                match state.channels.get_mut(&channel.id) {
                    Some(playback) => {
                        playback.next = pick_next(&catalog, channel.id, &playback.current.id);
                    }
                    None => {
                        let Some(first) = pick_first(&catalog, channel.id) else {
                            tracing::debug!(channel = %channel.id, "Channel has no videos");
                            continue;
                        };
                        let mut playback = ChannelPlaybackState::new(channel.id, first, now);
                        playback.next = pick_next(&catalog, channel.id, &playback.current.id);
                        tracing::info!(
                            channel = %channel.id,
                            asset = %playback.current.id,
                            "Channel scheduled"
                        );
                        state.channels.insert(channel.id, playback);
                    }
                }
            }

            state.catalog = catalog;
            removed
                .iter()
                .filter_map(|id| state.broadcasters.remove(id))
                .collect()
        };

        for broadcaster in stopped {
            broadcaster.shutdown();
        }
    }

    /// Run one scheduling pass at `now`.
    pub async fn tick_at(&self, now: DateTime<Utc>) {
        let plans = self.plan();
        futures::future::join_all(plans.into_iter().map(|plan| self.tick_channel(plan, now))).await;
    }

    /// Tick every `tick_secs` until the task is dropped.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(Duration::from_secs(self.config.tick_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            self.tick_at(Utc::now()).await;
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Stop every broadcaster.
    pub fn shutdown(&self) {
        let broadcasters: Vec<Broadcaster> = self.state.lock().broadcasters.drain().map(|(_, b)| b).collect();
        for broadcaster in broadcasters {
            broadcaster.shutdown();
        }
    }

    pub fn broadcaster(&self, channel: ChannelId) -> Option<Broadcaster> {
        self.state.lock().broadcasters.get(&channel).cloned()
    }

    pub fn playback_state(&self, channel: ChannelId) -> Option<ChannelPlaybackState> {
        self.state.lock().channels.get(&channel).cloned()
    }

    pub fn channel_ids(&self) -> Vec<ChannelId> {
        self.state.lock().channels.keys().copied().collect()
    }

    /// What `channel` is playing at `now`.
    pub fn now_playing(&self, channel: ChannelId, now: DateTime<Utc>) -> Option<NowPlaying> {
        let state = self.state.lock();
        let playback = state.channels.get(&channel)?;
        let channel_name = state
            .catalog
            .channel(channel)
            .map(|c| c.name.clone())
            .unwrap_or_default();

        Some(NowPlaying {
            channel_number: channel,
            channel_name,
            asset_id: playback.current.id.clone(),
            title: playback.current.title.clone(),
            current_time: playback.position_secs(now),
            duration: playback.current.duration_secs,
            started_at: playback.started_at,
        })
    }

    /// Every catalog channel with its current and next video.
    pub fn guide(&self, now: DateTime<Utc>) -> Vec<GuideEntry> {
        let state = self.state.lock();
        state
            .catalog
            .channels()
            .map(|channel| {
                let playback = state.channels.get(&channel.id);
                GuideEntry {
                    channel_number: channel.id,
                    name: channel.name.clone(),
                    description: channel.description.clone(),
                    live: state.broadcasters.contains_key(&channel.id),
                    current: playback.map(|p| AssetSummary::from(&p.current)),
                    started_at: playback.map(|p| p.started_at),
                    current_time: playback.map(|p| p.position_secs(now)),
                    next: playback.and_then(|p| p.next.as_ref()).map(AssetSummary::from),
                }
            })
            .collect()
    }

    fn plan(&self) -> Vec<TickPlan> {
        let state = self.state.lock();
        state
            .channels
            .values()
            .map(|playback| TickPlan {
                channel: playback.channel,
                current: playback.current.clone(),
                started_at: playback.started_at,
                next: playback
                    .next
                    .clone()
                    .or_else(|| pick_next(&state.catalog, playback.channel, &playback.current.id)),
                broadcaster: state.broadcasters.get(&playback.channel).cloned(),
            })
            .collect()
    }

    async fn tick_channel(&self, plan: TickPlan, now: DateTime<Utc>) {
        let Some(broadcaster) = plan.broadcaster.clone() else {
            self.recover_offline(plan, now).await;
            return;
        };

        if broadcaster.source().is_fatal() {
            tracing::warn!(
                channel = %plan.channel,
                asset = %plan.current.id,
                "Broadcaster stalled, rotating early"
            );
            self.rotate(&plan, &broadcaster, now).await;
            return;
        }

        let elapsed = state::elapsed_secs(plan.started_at, now);
        let progress = elapsed / plan.current.duration_secs;

        if progress >= self.config.prefetch_threshold {
            if let Some(next) = &plan.next {
                self.prefetch(plan.channel, next);
            }
        }

        if elapsed >= plan.current.duration_secs {
            self.rotate(&plan, &broadcaster, now).await;
        }
    }

    /// Bring an offline channel up, moving past videos that cannot be
    /// played. Tries each playlist entry at most once per tick.
    async fn recover_offline(&self, mut plan: TickPlan, now: DateTime<Utc>) {
        let attempts = self.state.lock().catalog.playlist(plan.channel).len().max(1);
        for _ in 0..attempts {
            match self.bring_up(&plan, now).await {
                BringUp::Done | BringUp::Retry => return,
                BringUp::Skip => match self.skip_offline(&plan, now) {
                    Some(next) => plan = next,
                    None => return,
                },
            }
        }
    }

    /// Stage the current video and start the channel's broadcaster.
    ///
    /// A failure is worth retrying on the same video unless it can never
    /// succeed or the video's slot is already over.
    async fn bring_up(&self, plan: &TickPlan, now: DateTime<Utc>) -> BringUp {
        let channel = plan.channel;
        let current = &plan.current;
        let overran = state::elapsed_secs(plan.started_at, now) >= current.duration_secs;

        let path = match self.stager.ensure_local(&current.key).await {
            Ok(path) => path,
            Err(e) => {
                let skip = overran || e.is_permanent();
                tracing::warn!(
                    channel = %channel,
                    asset = %current.id,
                    error = %e,
                    skip = skip,
                    "Staging failed, channel stays offline"
                );
                return if skip { BringUp::Skip } else { BringUp::Retry };
            }
        };

        let broadcaster = match Broadcaster::start(channel, &path, &self.broadcast).await {
            Ok(broadcaster) => broadcaster,
            Err(e) => {
                let skip = overran || matches!(e, BroadcastError::Demux { .. });
                tracing::error!(
                    channel = %channel,
                    asset = %current.id,
                    error = %e,
                    skip = skip,
                    "Failed to start broadcaster"
                );
                self.evict_unused(current, Some(channel)).await;
                return if skip { BringUp::Skip } else { BringUp::Retry };
            }
        };

        let stale = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            match state.channels.get_mut(&channel) {
                Some(playback) if !state.broadcasters.contains_key(&channel) => {
                    if playback.current.id == current.id {
                        playback.current = current.with_local_path(&path);
                        playback.restart(now);
                    }
                    state.broadcasters.insert(channel, broadcaster);
                    None
                }
                _ => Some(broadcaster),
            }
        };

        match stale {
            Some(broadcaster) => broadcaster.shutdown(),
            None => tracing::info!(channel = %channel, asset = %current.id, "Channel on air"),
        }
        BringUp::Done
    }

    /// Advance an offline channel past its current video.
    ///
    /// Returns the plan for the new current video, or `None` if the channel
    /// changed meanwhile or has nothing else to play.
    fn skip_offline(&self, plan: &TickPlan, now: DateTime<Utc>) -> Option<TickPlan> {
        let channel = plan.channel;
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if state.broadcasters.contains_key(&channel) {
            return None;
        }
        let playback = state.channels.get_mut(&channel)?;
        if playback.current.id != plan.current.id {
            return None;
        }

        let next = plan
            .next
            .clone()
            .or_else(|| pick_next(&state.catalog, channel, &plan.current.id))?;
        if next.id == plan.current.id {
            return None;
        }
        let upcoming = pick_next(&state.catalog, channel, &next.id);
        playback.advance(next.clone(), upcoming.clone(), now);

        tracing::warn!(
            channel = %channel,
            asset = %next.id,
            previous = %plan.current.id,
            "Skipped unplayable video"
        );
        Some(TickPlan {
            channel,
            current: next,
            started_at: playback.started_at,
            next: upcoming,
            broadcaster: None,
        })
    }

    /// Switch to the next video once it is staged.
    ///
    /// Staging failures leave the current video playing; the next tick
    /// retries.
    async fn rotate(&self, plan: &TickPlan, broadcaster: &Broadcaster, now: DateTime<Utc>) {
        let channel = plan.channel;
        let Some(next) = plan.next.clone() else {
            tracing::debug!(channel = %channel, "Nothing to rotate to");
            return;
        };

        let path = match self.stager.ensure_local(&next.key).await {
            Ok(path) => path,
            Err(e) => {
                tracing::warn!(
                    channel = %channel,
                    asset = %next.id,
                    error = %e,
                    "Staging next video failed, current video continues"
                );
                return;
            }
        };

        if let Err(e) = broadcaster.switch_source(&path).await {
            tracing::error!(channel = %channel, asset = %next.id, error = %e, "Switch failed");
            self.evict_unused(&next, None).await;
            return;
        }

        {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            if let Some(playback) = state.channels.get_mut(&channel) {
                let upcoming = pick_next(&state.catalog, channel, &next.id);
                playback.advance(next.with_local_path(&path), upcoming, now);
            }
        }

        tracing::info!(
            channel = %channel,
            asset = %next.id,
            previous = %plan.current.id,
            "Rotated"
        );

        if plan.current.id != next.id {
            self.schedule_eviction(plan.current.clone());
        }
    }

    /// Start staging `next` in the background unless it is local or already
    /// being staged.
    fn prefetch(&self, channel: ChannelId, next: &VideoAsset) {
        if self.stager.is_local(&next.key) {
            return;
        }
        if !self.state.lock().prefetching.insert(next.id.clone()) {
            return;
        }

        tracing::info!(channel = %channel, asset = %next.id, "Prefetching next video");

        let this = self.clone();
        let next = next.clone();
        tokio::spawn(async move {
            match this.stager.ensure_local(&next.key).await {
                Ok(path) => tracing::debug!(asset = %next.id, path = ?path, "Prefetch complete"),
                Err(e) => tracing::warn!(asset = %next.id, error = %e, "Prefetch failed"),
            }
            this.state.lock().prefetching.remove(&next.id);
        });
    }

    /// Evict `finished` after the grace delay, unless a channel is playing it
    /// by then.
    fn schedule_eviction(&self, finished: VideoAsset) {
        let this = self.clone();
        let grace = Duration::from_secs(self.config.eviction_grace_secs);
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            this.evict_unused(&finished, None).await;
        });
    }

    /// Whether a channel other than `except` is playing `asset`.
    fn on_air_elsewhere(&self, asset: &AssetId, except: Option<ChannelId>) -> bool {
        self.state
            .lock()
            .channels
            .values()
            .any(|playback| Some(playback.channel) != except && playback.current.id == *asset)
    }

    /// Evict `asset` unless a channel other than `except` is playing it.
    async fn evict_unused(&self, asset: &VideoAsset, except: Option<ChannelId>) {
        if self.on_air_elsewhere(&asset.id, except) {
            tracing::debug!(asset = %asset.id, "Skipping eviction, still on air");
            return;
        }
        self.evict_now(asset).await;
    }

    async fn evict_now(&self, asset: &VideoAsset) {
        if let Err(e) = self.stager.evict(&asset.key).await {
            tracing::warn!(asset = %asset.id, error = %e, "Eviction failed");
        }
    }
}
