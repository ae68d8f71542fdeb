//! CLI entry point for gs-hotload.
//!
//! Watches a directory for the interchange file written by a reconstruction
//! tool, converts it into a renderer-ready splat asset, persists the
//! buffers and activates the result without a restart.
//!
//! # Usage
//!
//! ```bash
//! gs-hotload [OPTIONS] <COMMAND>
//!
//! # Watch ./Auto for output.ply and hot-reload on every write
//! gs-hotload watch --dir ./Auto
//!
//! # Watch with a config file and a custom store root
//! gs-hotload --config hotload.json --store ./Resources watch
//!
//! # Cold-load a persisted asset and print its summary
//! gs-hotload load --name output
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use gs_core::{Asset, AssetHeader, Config, WatchConfig};
use gs_pipeline::{
    ActiveAssetSlot, Activator, AssetStore, BufferLengths, PipelineBuilder, RenderTarget,
    StatsSnapshot, activation_channel,
};
use gs_ply::PlyConverter;
use gs_watcher::TrackedNameFilter;
use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Pending activations the render context may fall behind by.
const ACTIVATION_CAPACITY: usize = 4;

// =============================================================================
// CLI ARGUMENT TYPES
// =============================================================================

/// Hot-reloads Gaussian-splat scenes written by an external reconstruction
/// tool.
#[derive(Parser)]
#[command(name = "gs-hotload", version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Command to execute.
    #[command(subcommand)]
    command: Commands,

    /// Path to a JSON configuration file.
    ///
    /// Missing fields fall back to defaults; command-line flags override
    /// file values.
    #[arg(short, long, global = true, env = "GS_HOTLOAD_CONFIG")]
    config: Option<Utf8PathBuf>,

    /// Root directory for persisted asset buffers.
    #[arg(long, global = true, env = "GS_HOTLOAD_STORE")]
    store: Option<Utf8PathBuf>,

    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Watch a directory and hot-reload the tracked file.
    Watch(WatchArgs),

    /// Load a persisted asset the way a cold start does and print a summary.
    Load {
        /// Asset name (the input file stem, e.g. `output`).
        #[arg(short, long)]
        name: String,
    },
}

/// Options for `watch`.
#[derive(clap::Args)]
struct WatchArgs {
    /// Directory the reconstruction tool writes into.
    #[arg(short, long, env = "GS_HOTLOAD_WATCH_DIR")]
    dir: Option<Utf8PathBuf>,

    /// Tracked file name, matched case-insensitively. Repeatable.
    #[arg(short, long = "track", value_name = "NAME")]
    track: Vec<String>,

    /// Do not import files already present at startup.
    #[arg(long)]
    skip_existing: bool,

    /// Watch subdirectories too.
    #[arg(long)]
    recursive: bool,

    /// Also import auxiliary metadata (camera list).
    #[arg(long)]
    include_aux: bool,

    /// Interval between size polls, in milliseconds.
    #[arg(long, env = "GS_HOTLOAD_POLL_MS")]
    poll_ms: Option<u64>,

    /// Consecutive equal size reads required before importing.
    #[arg(long)]
    threshold: Option<u32>,

    /// Give up on a file that keeps changing after this many milliseconds.
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Render loop frame interval, in milliseconds.
    #[arg(long, default_value_t = 16)]
    frame_ms: u64,
}

// =============================================================================
// INITIALIZATION FUNCTIONS
// =============================================================================

/// Initializes the tracing subscriber for logging.
///
/// Respects the `RUST_LOG` environment variable if set. Otherwise, uses
/// `debug` level if `--verbose` is set, or `info` level by default.
/// `notify` is filtered to `warn`.
fn init_tracing(verbose: bool, no_color: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if verbose { "debug" } else { "info" };
        EnvFilter::new(format!("{level},notify=warn"))
    });

    // Check if colors should be disabled (flag or NO_COLOR env var)
    let use_ansi = !no_color && std::env::var("NO_COLOR").is_err();

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_ansi(use_ansi))
        .with(filter)
        .init();
}

/// Loads the configuration file, if any, and applies global overrides.
fn base_config(cli: &Cli) -> color_eyre::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => {
            info!(path = %path, "Loading configuration");
            Config::from_file(path)?
        }
        None => Config::default(),
    };
    if let Some(store) = &cli.store {
        config.store.root.clone_from(store);
    }
    Ok(config)
}

/// Applies `watch` flags on top of `config` and validates the result.
fn watch_config(mut config: Config, args: &WatchArgs) -> color_eyre::Result<Config> {
    if let Some(dir) = &args.dir {
        config.watch.watch_dir.clone_from(dir);
    }
    if !args.track.is_empty() {
        config.watch.tracked_names = args.track.iter().cloned().collect();
    }
    if args.skip_existing {
        config.watch.process_existing_on_start = false;
    }
    if args.recursive {
        config.watch.recursive = true;
    }
    if args.include_aux {
        config.import.include_aux_metadata = true;
    }
    if let Some(ms) = args.poll_ms {
        config.stability.poll_interval_ms = ms;
    }
    if let Some(threshold) = args.threshold {
        config.stability.threshold = threshold;
    }
    if let Some(ms) = args.timeout_ms {
        config.stability.timeout_ms = ms;
    }
    config.validate()?;
    Ok(config)
}

/// Cancels `token` on Ctrl-C, or SIGTERM on Unix.
fn spawn_shutdown_listener(token: CancellationToken) {
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown requested");
        token.cancel();
    });
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable; listening for Ctrl-C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

// =============================================================================
// RENDER TARGET
// =============================================================================

/// Stand-in renderer that logs every injected asset.
struct LoggingRenderTarget;

impl RenderTarget for LoggingRenderTarget {
    fn inject(&self, asset: Arc<Asset>) {
        let bounds = asset.header.bounds;
        info!(
            name = asset.name(),
            splats = asset.splat_count(),
            bytes = asset.buffers.total_len(),
            cameras = asset.header.cameras.len(),
            min = ?bounds.min,
            max = ?bounds.max,
            "Renderer received asset"
        );
    }
}

// =============================================================================
// COMMAND IMPLEMENTATIONS
// =============================================================================

/// Summary printed when `watch` exits.
#[derive(Serialize)]
struct WatchSummary {
    generation: u64,
    active: Option<String>,
    stats: StatsSnapshot,
}

/// The observer-side filter: only the tracked names leave the watch thread.
fn source_filter(config: &WatchConfig) -> TrackedNameFilter {
    TrackedNameFilter::new(&config.tracked_names)
}

/// Runs the watcher, the pipeline driver and a fixed-rate frame loop that
/// performs activations, until Ctrl-C or SIGTERM.
async fn run_watch(config: Config, frame_ms: u64) -> color_eyre::Result<()> {
    info!(
        dir = %config.watch.watch_dir,
        store = %config.store.root,
        "Starting hot-reload pipeline"
    );

    let cancel = CancellationToken::new();
    let slot = Arc::new(ActiveAssetSlot::new());
    let (sender, mut activations) = activation_channel(ACTIVATION_CAPACITY);
    let mut activator = Activator::with_target(Arc::clone(&slot), LoggingRenderTarget);

    let pipeline = PipelineBuilder::new(config)
        .converter(PlyConverter::new())
        .activations(sender)
        .cancel_token(cancel.clone())
        .build()?;
    let watcher = pipeline.watch(source_filter(&pipeline.config().watch)).await?;

    spawn_shutdown_listener(cancel.clone());

    let mut driver = tokio::spawn(async move {
        let mut watcher = watcher;
        pipeline.run(watcher.events()).await;
        (pipeline, watcher)
    });

    // The frame loop owns the render target; activations only happen here.
    let mut frame = tokio::time::interval(Duration::from_millis(frame_ms.max(1)));
    frame.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let (pipeline, watcher) = loop {
        tokio::select! {
            joined = &mut driver => break joined?,
            _ = frame.tick() => {
                activations.drain(&mut activator);
            }
        }
    };
    activations.close();

    if let Err(e) = watcher.shutdown().await {
        warn!(error = %e, "Watcher did not shut down cleanly");
    }

    let summary = WatchSummary {
        generation: slot.generation(),
        active: slot.asset().map(|a| a.name().to_owned()),
        stats: pipeline.stats(),
    };
    let json = serde_json::to_string_pretty(&summary)?;
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    writeln!(handle, "{json}")?;

    Ok(())
}

/// Summary printed by `load`.
#[derive(Serialize)]
struct AssetSummary<'a> {
    header: &'a AssetHeader,
    buffer_bytes: BufferLengths,
    total_bytes: usize,
}

/// Loads a persisted asset through the store and prints its summary.
fn run_load(config: &Config, name: &str) -> color_eyre::Result<()> {
    let store = AssetStore::from_config(&config.store);
    info!(root = %store.root(), name, "Loading persisted asset");

    let asset = match store.load(name) {
        Ok(asset) => asset,
        Err(e) if e.is_not_found() => {
            return Err(color_eyre::eyre::eyre!(
                "no asset named '{name}' under {}",
                store.root()
            ));
        }
        Err(e) => return Err(e.into()),
    };

    let summary = AssetSummary {
        header: &asset.header,
        buffer_bytes: BufferLengths::of(&asset.buffers),
        total_bytes: asset.buffers.total_len(),
    };
    let json = serde_json::to_string_pretty(&summary)?;
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    writeln!(handle, "{json}")?;

    Ok(())
}

// =============================================================================
// MAIN ENTRY POINT
// =============================================================================

/// Application entry point.
#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    // 1. Install color-eyre FIRST (before any potential panics)
    color_eyre::install()?;

    // 2. Parse CLI arguments
    let cli = Cli::parse();

    // 3. Initialize tracing (handles --no-color for log output)
    init_tracing(cli.verbose, cli.no_color);

    // 4. Route to appropriate command
    let config = base_config(&cli)?;
    match &cli.command {
        Commands::Watch(args) => {
            let frame_ms = args.frame_ms;
            run_watch(watch_config(config, args)?, frame_ms).await
        }
        Commands::Load { name } => run_load(&config, name),
    }
}
