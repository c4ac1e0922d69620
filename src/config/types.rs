use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub catalog: CatalogConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub broadcast: BroadcastConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl ServerConfig {
    /// Apply command-line overrides; absent flags keep the file's values.
    pub fn override_with(&mut self, host: Option<String>, port: Option<u16>) {
        if let Some(host) = host {
            self.host = host;
        }
        if let Some(port) = port {
            self.port = port;
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Where video content lives.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Directory holding the published library; asset keys are relative to it.
    #[serde(default = "default_source_dir")]
    pub source_dir: PathBuf,

    /// Directory for staged local copies.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            source_dir: default_source_dir(),
            cache_dir: default_cache_dir(),
        }
    }
}

fn default_source_dir() -> PathBuf {
    PathBuf::from("./library")
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("./videos")
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CatalogConfig {
    /// TOML manifest listing channels and their playlists.
    #[serde(default = "default_manifest")]
    pub manifest: PathBuf,

    /// Seconds between catalog reloads. Zero disables refresh.
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            manifest: default_manifest(),
            refresh_interval_secs: default_refresh_interval(),
        }
    }
}

fn default_manifest() -> PathBuf {
    PathBuf::from("./channels.toml")
}

fn default_refresh_interval() -> u64 {
    15 * 60
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,

    /// Fraction of the current video after which the next one is staged.
    #[serde(default = "default_prefetch_threshold")]
    pub prefetch_threshold: f64,

    /// Delay before a finished video's local copy is evicted.
    #[serde(default = "default_eviction_grace")]
    pub eviction_grace_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_secs: default_tick_secs(),
            prefetch_threshold: default_prefetch_threshold(),
            eviction_grace_secs: default_eviction_grace(),
        }
    }
}

fn default_tick_secs() -> u64 {
    5
}

fn default_prefetch_threshold() -> f64 {
    0.8
}

fn default_eviction_grace() -> u64 {
    2
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BroadcastConfig {
    /// Aggregate output rate per channel, in kilobits per second.
    #[serde(default = "default_bitrate")]
    pub target_bitrate_kbps: u64,

    #[serde(default = "default_pacing_tick")]
    pub pacing_tick_ms: u64,

    /// Sleep between attempts to reopen a missing or stalled source.
    #[serde(default = "default_reopen_backoff")]
    pub reopen_backoff_ms: u64,

    /// Bytes read from a new source to find its init segment.
    #[serde(default = "default_switch_probe")]
    pub switch_probe_bytes: usize,

    /// Fragments queued per viewer before it is dropped as too slow.
    #[serde(default = "default_viewer_buffer")]
    pub viewer_buffer: usize,
}

impl BroadcastConfig {
    pub fn bytes_per_sec(&self) -> u64 {
        self.target_bitrate_kbps * 1000 / 8
    }
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            target_bitrate_kbps: default_bitrate(),
            pacing_tick_ms: default_pacing_tick(),
            reopen_backoff_ms: default_reopen_backoff(),
            switch_probe_bytes: default_switch_probe(),
            viewer_buffer: default_viewer_buffer(),
        }
    }
}

fn default_bitrate() -> u64 {
    2000
}

fn default_pacing_tick() -> u64 {
    50
}

fn default_reopen_backoff() -> u64 {
    1000
}

fn default_switch_probe() -> usize {
    4 * 1024 * 1024
}

fn default_viewer_buffer() -> usize {
    64
}
