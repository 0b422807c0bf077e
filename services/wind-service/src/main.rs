//! Wind vector query service.
//!
//! Answers "what is the wind at this place and time" for a moving vehicle:
//! - Keeps the newest forecast distribution downloaded and decoded locally
//! - Serves queries from a cached interpolation model, rebuilding it from
//!   local tables or fetching directly from the server when needed
//! - HTTP API for queries, status and Prometheus metrics

mod config;
mod server;

use std::path::PathBuf;
use std::sync::Arc;

use acquisition::{
    focus_channel, CommandDecoder, DecodeLoop, DirectFetcher, DistributionSource, DownloadLoop,
    HttpDistributionSource, PartDecoder, StatusBoard,
};
use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;
use wind_cache::{Dispatcher, NoRemote, RemoteFallback, WindCache};
use wind_common::StorageLayout;

use config::ServiceConfig;
use server::AppState;

#[derive(Parser, Debug)]
#[command(name = "wind-service")]
#[command(about = "Wind vector queries backed by periodically downloaded forecasts")]
struct Args {
    /// YAML configuration file
    #[arg(short, long, env = "WIND_CONFIG")]
    config: Option<PathBuf>,

    /// Storage root holding gribFiles/ and csvFiles/ (overrides config)
    #[arg(long, env = "WIND_STORAGE_ROOT")]
    storage_root: Option<PathBuf>,

    /// Port for the HTTP API (overrides config)
    #[arg(long, env = "WIND_PORT")]
    port: Option<u16>,

    /// Do not run the background download and decode loops
    #[arg(long)]
    no_acquisition: bool,

    /// Never query the distribution server directly
    #[arg(long)]
    no_remote: bool,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true)
        .json()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = match &args.config {
        Some(path) => ServiceConfig::load(path)?,
        None => {
            info!("No config file given, using defaults");
            ServiceConfig::default()
        }
    };
    if let Some(root) = args.storage_root {
        config.storage.root = root;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if args.no_acquisition {
        config.acquisition.enabled = false;
    }
    if args.no_remote {
        config.server.remote_fallback = false;
    }

    info!(
        storage = %config.storage.root.display(),
        port = config.server.port,
        acquisition = config.acquisition.enabled,
        remote_fallback = config.server.remote_fallback,
        interpolation = config.cache.interpolation.name(),
        "Starting wind service"
    );

    let layout = StorageLayout::new(&config.storage.root);
    layout
        .create_dirs()
        .with_context(|| format!("Failed to create storage under {}", config.storage.root.display()))?;

    let prometheus = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")?;

    let status = StatusBoard::new();
    let (focus, focus_reader) = focus_channel(config.initial_focus);

    let source: Arc<dyn DistributionSource> = Arc::new(
        HttpDistributionSource::new(&config.acquisition).context("Failed to create distribution source")?,
    );
    let decoder: Arc<dyn PartDecoder> =
        Arc::new(CommandDecoder::new(config.acquisition.decoder_program.clone()));

    let remote: Box<dyn RemoteFallback> = if config.server.remote_fallback {
        Box::new(DirectFetcher::new(
            source.clone(),
            decoder.clone(),
            config.acquisition.clone(),
            config.cache.clone(),
        ))
    } else {
        Box::new(NoRemote)
    };
    let cache = WindCache::new(layout.clone(), config.cache.clone());
    let dispatcher = Dispatcher::new(cache, remote);
    let stats = dispatcher.stats();

    // Each loop has its own token so either can be stopped alone
    let download_cancel = CancellationToken::new();
    let decode_cancel = CancellationToken::new();
    let mut loops = Vec::new();

    if config.acquisition.enabled {
        let download = DownloadLoop::new(
            source.clone(),
            layout.clone(),
            config.acquisition.clone(),
            status.clone(),
        );
        let decode = DecodeLoop::new(
            decoder.clone(),
            layout.clone(),
            config.acquisition.clone(),
            download.phase_receiver(),
            focus_reader,
            status.clone(),
        );

        loops.push(tokio::spawn(download.run(download_cancel.clone())));
        loops.push(tokio::spawn(decode.run(decode_cancel.clone())));
    } else {
        warn!("Acquisition disabled, serving from existing local data only");
    }

    let state = Arc::new(AppState {
        dispatcher: Mutex::new(dispatcher),
        stats,
        status,
        focus,
        prometheus,
    });

    let port = config.server.port;
    tokio::spawn(async move {
        if let Err(e) = server::run_server(state, port).await {
            tracing::error!(error = %e, "Query server failed");
        }
    });

    tokio::signal::ctrl_c().await.ok();
    info!("Received shutdown signal");

    download_cancel.cancel();
    decode_cancel.cancel();
    for handle in loops {
        if let Err(e) = handle.await {
            warn!(error = %e, "Acquisition task ended abnormally");
        }
    }

    info!("Wind service stopped");
    Ok(())
}
