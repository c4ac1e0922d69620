//! Shared test harness for integration tests.
//!
//! Provides an fMP4 fixture builder, a [`Library`] of fixture files on disk
//! with a counting [`ContentStager`] in front of it, and fast broadcast and
//! scheduler configurations.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use channelcast::broadcast::ViewerSink;
use channelcast::catalog::Catalog;
use channelcast::config::{BroadcastConfig, SchedulerConfig};
use channelcast::stager::{ContentStager, LocalStager, StagingError};
use channelcast_common::{AssetId, Channel, ChannelId, VideoAsset};
use parking_lot::Mutex;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Serialize one box with a compact header.
pub fn boxed(atom: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut out = ((payload.len() + 8) as u32).to_be_bytes().to_vec();
    out.extend_from_slice(atom);
    out.extend_from_slice(payload);
    out
}

/// A synthetic fragmented MP4 file.
///
/// Every `moof` payload starts with the file's tag byte followed by the
/// fragment index, so tests can tell which file a fragment came from.
#[derive(Debug, Clone)]
pub struct Fixture {
    pub tag: u8,
    pub init: Vec<u8>,
    pub fragments: Vec<Vec<u8>>,
}

impl Fixture {
    pub fn new(tag: u8, fragments: usize) -> Self {
        Self::with_duration(tag, fragments, 1000, 10_000)
    }

    pub fn with_duration(tag: u8, fragments: usize, timescale: u32, duration: u32) -> Self {
        let mut mvhd = vec![0u8; 12];
        mvhd.extend_from_slice(&timescale.to_be_bytes());
        mvhd.extend_from_slice(&duration.to_be_bytes());
        mvhd.extend_from_slice(&[0u8; 80]);

        let mut moov = boxed(b"mvhd", &mvhd);
        moov.extend(boxed(b"free", &[tag; 16]));

        let mut init = boxed(b"ftyp", b"iso6\0\0\0\0iso6cmfc");
        init.extend(boxed(b"moov", &moov));

        let fragments = (0..fragments)
            .map(|i| {
                let mut moof_payload = vec![tag, i as u8];
                moof_payload.extend_from_slice(&[0u8; 14]);
                let mut fragment = boxed(b"moof", &moof_payload);
                fragment.extend(boxed(b"mdat", &vec![tag; 2048]));
                fragment
            })
            .collect();

        Self {
            tag,
            init,
            fragments,
        }
    }

    pub fn bytes(&self) -> Vec<u8> {
        let mut data = self.init.clone();
        for fragment in &self.fragments {
            data.extend_from_slice(fragment);
        }
        data
    }

    /// Valid init segment and first fragment, then a box with an impossible size.
    pub fn corrupt_bytes(&self) -> Vec<u8> {
        let mut data = self.init.clone();
        if let Some(first) = self.fragments.first() {
            data.extend_from_slice(first);
        }
        data.extend_from_slice(&[0, 0, 0, 3, b'm', b'o', b'o', b'f']);
        data.extend_from_slice(&[0u8; 64]);
        data
    }

    pub fn write(&self, path: &Path) -> PathBuf {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, self.bytes()).unwrap();
        path.to_path_buf()
    }
}

/// A file with no `moof` box at all.
pub fn progressive_bytes() -> Vec<u8> {
    let mut data = boxed(b"ftyp", b"isom");
    data.extend(boxed(b"moov", &[0u8; 32]));
    data.extend(boxed(b"mdat", &[0u8; 512]));
    data
}

/// Tag byte and fragment index of a fragment sent to a viewer.
pub fn fragment_origin(bytes: &[u8]) -> Option<(u8, u8)> {
    (bytes.len() > 10 && &bytes[4..8] == b"moof").then(|| (bytes[8], bytes[9]))
}

/// Broadcast settings fast enough for tests: ~10 MB/s in 5ms ticks.
pub fn fast_broadcast() -> BroadcastConfig {
    BroadcastConfig {
        target_bitrate_kbps: 80_000,
        pacing_tick_ms: 5,
        reopen_backoff_ms: 20,
        switch_probe_bytes: 64 * 1024,
        viewer_buffer: 4096,
    }
}

pub fn fast_scheduler() -> SchedulerConfig {
    SchedulerConfig {
        tick_secs: 1,
        prefetch_threshold: 0.8,
        eviction_grace_secs: 0,
    }
}

/// Fixture files under a temporary library directory, staged into a
/// temporary cache directory.
pub struct Library {
    pub dir: TempDir,
    pub stager: Arc<CountingStager>,
}

impl Library {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let stager = Arc::new(CountingStager::new(LocalStager::new(
            dir.path().join("library"),
            dir.path().join("cache"),
        )));
        Self { dir, stager }
    }

    pub fn source_dir(&self) -> PathBuf {
        self.dir.path().join("library")
    }

    /// Write `fixture` to the library under `key`.
    pub fn add(&self, key: &str, fixture: &Fixture) -> PathBuf {
        fixture.write(&self.source_dir().join(key))
    }

    pub fn add_raw(&self, key: &str, bytes: &[u8]) -> PathBuf {
        let path = self.source_dir().join(key);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, bytes).unwrap();
        path
    }

    /// Where the stager keeps its local copy of `key`.
    pub fn cache_path(&self, key: &str) -> PathBuf {
        self.dir.path().join("cache").join(key)
    }

    pub fn stager(&self) -> Arc<dyn ContentStager> {
        self.stager.clone()
    }
}

/// Stager that records how often each key was requested.
pub struct CountingStager {
    inner: LocalStager,
    ensure_calls: Mutex<HashMap<String, usize>>,
    evict_calls: Mutex<HashMap<String, usize>>,
}

impl CountingStager {
    pub fn new(inner: LocalStager) -> Self {
        Self {
            inner,
            ensure_calls: Mutex::new(HashMap::new()),
            evict_calls: Mutex::new(HashMap::new()),
        }
    }

    pub fn ensure_count(&self, key: &str) -> usize {
        self.ensure_calls.lock().get(key).copied().unwrap_or(0)
    }

    pub fn evict_count(&self, key: &str) -> usize {
        self.evict_calls.lock().get(key).copied().unwrap_or(0)
    }
}

#[async_trait]
impl ContentStager for CountingStager {
    async fn ensure_local(&self, key: &str) -> Result<PathBuf, StagingError> {
        *self.ensure_calls.lock().entry(key.to_string()).or_default() += 1;
        self.inner.ensure_local(key).await
    }

    fn is_local(&self, key: &str) -> bool {
        self.inner.is_local(key)
    }

    async fn evict(&self, key: &str) -> Result<(), StagingError> {
        *self.evict_calls.lock().entry(key.to_string()).or_default() += 1;
        self.inner.evict(key).await
    }
}

pub fn channel(number: u32) -> ChannelId {
    ChannelId::new(number).unwrap()
}

pub fn asset(id: &str, duration: f64) -> VideoAsset {
    VideoAsset::new(id, format!("Title {id}"), duration, format!("{id}.mp4")).unwrap()
}

/// Catalog with one channel playing `videos` in order.
pub fn single_channel_catalog(number: u32, videos: &[VideoAsset]) -> Catalog {
    let mut catalog = Catalog::new();
    for video in videos {
        catalog.insert_asset(video.clone());
    }
    catalog.insert_channel(Channel::new(
        channel(number),
        format!("Channel {number}"),
        videos.iter().map(|v| v.id.clone()).collect::<Vec<AssetId>>(),
    ));
    catalog
}

/// A viewer sink and the receiver a connection would drain.
pub fn viewer(buffer: usize) -> (ViewerSink, mpsc::Receiver<bytes::Bytes>, CancellationToken) {
    let done = CancellationToken::new();
    let (sink, rx) = ViewerSink::channel(buffer, done.clone());
    (sink, rx, done)
}

/// Poll `check` until it holds or `timeout` passes.
pub async fn wait_for(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
