mod cli;

use channelcast::{
    catalog::{self, CatalogSource, ManifestCatalog},
    config,
    scheduler::Scheduler,
    server::{self, AppContext},
    stager::LocalStager,
};
use channelcast_media::FragmentDemuxer;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use cli::{Cli, Commands};
use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;
use std::time::Duration;

async fn start_server(
    host: Option<String>,
    port: Option<u16>,
    config_path: Option<&std::path::Path>,
) -> Result<()> {
    let mut config = config::load_config_or_default(config_path)?;

    config.server.override_with(host, port);
    config::validate_config(&config)?;

    tracing::info!("Starting channelcast");
    tracing::info!(
        "Server will listen on {}:{}",
        config.server.host,
        config.server.port
    );

    let stager = Arc::new(LocalStager::new(
        &config.storage.source_dir,
        &config.storage.cache_dir,
    ));
    tokio::fs::create_dir_all(&config.storage.cache_dir)
        .await
        .with_context(|| format!("Failed to create cache dir {:?}", config.storage.cache_dir))?;

    let source: Arc<dyn CatalogSource> = Arc::new(ManifestCatalog::new(
        &config.catalog.manifest,
        &config.storage.source_dir,
    ));
    let initial = source.load().await.context("Failed to load channel catalog")?;
    tracing::info!("Loaded {} channels", initial.channels().count());

    let scheduler = Scheduler::new(
        stager,
        config.scheduler.clone(),
        config.broadcast.clone(),
    );
    scheduler.apply_catalog(initial, Utc::now());

    let scheduler_handle = scheduler.clone().spawn();
    let refresh_handle = (config.catalog.refresh_interval_secs > 0).then(|| {
        catalog::spawn_refresh_task(
            source.clone(),
            scheduler.clone(),
            Duration::from_secs(config.catalog.refresh_interval_secs),
        )
    });

    let ctx = AppContext::new(scheduler.clone(), config);
    let server_result = server::start_server(ctx).await;

    tracing::info!("Shutting down...");
    scheduler_handle.abort();
    if let Some(handle) = refresh_handle {
        handle.abort();
    }
    scheduler.shutdown();

    server_result
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "channelcast=trace,channelcast_media=debug,tower_http=debug".to_string()
        } else {
            "channelcast=debug,channelcast_media=info,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    match cli.command {
        Commands::Start { host, port } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(start_server(host, port, cli.config.as_deref()))
        }
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Probe { file, json } => probe_file(&file, json),
        Commands::Version => {
            println!("channelcast {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn probe_file(file: &std::path::Path, json: bool) -> Result<()> {
    let reader = File::open(file).with_context(|| format!("Failed to open {:?}", file))?;
    let summary = FragmentDemuxer::new(BufReader::new(reader))
        .summarize()
        .with_context(|| format!("Failed to demux {:?}", file))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("File: {}", file.display());
    println!("Init segment: {} bytes", summary.init_size);
    println!("Fragments: {}", summary.fragment_count);
    println!("Fragment bytes: {}", summary.fragment_bytes);
    println!("Largest fragment: {} bytes", summary.largest_fragment);
    match summary.duration_secs {
        Some(duration) => {
            let secs = duration as u64;
            println!(
                "Duration: {:02}:{:02}:{:02} ({:.3}s)",
                secs / 3600,
                (secs / 60) % 60,
                secs % 60,
                duration
            );
        }
        None => println!("Duration: unknown"),
    }

    Ok(())
}

fn validate_config(path: Option<&std::path::Path>) -> Result<()> {
    match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            println!("  Server: {}:{}", config.server.host, config.server.port);
            println!("  Library: {:?}", config.storage.source_dir);
            println!("  Cache: {:?}", config.storage.cache_dir);
            println!("  Manifest: {:?}", config.catalog.manifest);
            println!(
                "  Broadcast: {} kbps, {} ms ticks",
                config.broadcast.target_bitrate_kbps, config.broadcast.pacing_tick_ms
            );
        }
        None => {
            println!("No config file specified, using defaults");
            let config = config::Config::default();
            println!("Default config:");
            println!("  Server: {}:{}", config.server.host, config.server.port);
        }
    }

    Ok(())
}
