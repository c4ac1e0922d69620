mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = [
        "./channelcast.toml",
        "~/.config/channelcast/config.toml",
        "/etc/channelcast/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if config.server.port == 0 {
        anyhow::bail!("Server port cannot be 0");
    }

    let threshold = config.scheduler.prefetch_threshold;
    if !(threshold > 0.0 && threshold <= 1.0) {
        anyhow::bail!(
            "scheduler.prefetch_threshold must be in (0, 1], got {}",
            threshold
        );
    }
    if config.scheduler.tick_secs == 0 {
        anyhow::bail!("scheduler.tick_secs cannot be 0");
    }

    if config.broadcast.target_bitrate_kbps == 0 {
        anyhow::bail!("broadcast.target_bitrate_kbps cannot be 0");
    }
    if config.broadcast.pacing_tick_ms == 0 {
        anyhow::bail!("broadcast.pacing_tick_ms cannot be 0");
    }
    if config.broadcast.viewer_buffer == 0 {
        anyhow::bail!("broadcast.viewer_buffer cannot be 0");
    }

    if !config.storage.source_dir.exists() {
        tracing::warn!("Source directory does not exist: {:?}", config.storage.source_dir);
    }

    Ok(())
}
