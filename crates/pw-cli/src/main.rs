//! CLI entry point for pollwatch.
//!
//! Watches files and directories by polling and prints one line per detected
//! change until interrupted.
//!
//! # Usage
//!
//! ```bash
//! pollwatch [OPTIONS] <PATHS>...
//!
//! # Poll two directories every 250ms
//! pollwatch --interval-ms 250 ./inbox ./outbox
//!
//! # JSON lines, including directory events and permission changes
//! pollwatch --format json --include-dirs --chmod /srv/data
//!
//! # Paths and settings from a config file
//! pollwatch --config pollwatch.json
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

use std::io::Write;

use camino::Utf8PathBuf;
use clap::{Parser, ValueEnum};
use color_eyre::eyre::{WrapErr, bail, eyre};
use pw_core::Config;
use pw_watcher::{FileEvent, Watcher};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// CLI ARGUMENT TYPES
// =============================================================================

/// Polling file watcher.
///
/// Re-lists the given files and directories on a fixed interval and reports
/// creations, removals, modifications, renames and moves. Directories are
/// watched one level deep.
#[derive(Parser, Debug)]
#[command(name = "pollwatch", version, about, long_about = None)]
struct Cli {
    /// Files or directories to watch.
    ///
    /// Added to any paths listed in the config file.
    paths: Vec<Utf8PathBuf>,

    /// Poll interval in milliseconds.
    #[arg(short, long, env = "POLLWATCH_INTERVAL_MS")]
    interval_ms: Option<u64>,

    /// JSON config file.
    #[arg(short, long, env = "POLLWATCH_CONFIG")]
    config: Option<Utf8PathBuf>,

    /// Report permission-only changes.
    #[arg(long)]
    chmod: bool,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Also print events for directories.
    #[arg(long)]
    include_dirs: bool,

    /// Enable verbose logging (debug level).
    #[arg(short, long)]
    verbose: bool,

    /// Disable colored output.
    #[arg(long)]
    no_color: bool,
}

/// Event output format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// `<LABEL> <path>[ -> <destination>]`.
    Text,
    /// One JSON object per line.
    Json,
}

// =============================================================================
// INITIALIZATION FUNCTIONS
// =============================================================================

/// Initializes the tracing subscriber for logging.
///
/// Respects the `RUST_LOG` environment variable if set. Otherwise, uses
/// `debug` level if `--verbose` is set, or `info` level by default.
/// Logs go to stderr so stdout carries only events.
fn init_tracing(verbose: bool, no_color: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if verbose { "debug" } else { "info" };
        EnvFilter::new(level)
    });

    // Check if colors should be disabled (flag or NO_COLOR env var)
    let use_ansi = !no_color && std::env::var("NO_COLOR").is_err();

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .with_ansi(use_ansi)
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();
}

/// Builds a [`Config`] from the config file and CLI arguments.
///
/// Flags override file values, which override defaults.
///
/// # Errors
///
/// Returns an error if the config file cannot be loaded, a setting is
/// invalid, or no path to watch was given.
fn build_config(cli: &Cli) -> color_eyre::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => {
            Config::load(path).wrap_err_with(|| format!("Failed to load config {path}"))?
        }
        None => Config::default(),
    };

    if let Some(interval_ms) = cli.interval_ms {
        config.watch.interval_ms = interval_ms;
    }
    if cli.chmod {
        config.watch.detect_chmod = true;
    }
    config.paths.extend(cli.paths.iter().cloned());

    config.watch.validate()?;
    if config.paths.is_empty() {
        bail!("No paths to watch: pass at least one path or list them in --config");
    }

    Ok(config)
}

// =============================================================================
// OUTPUT HELPERS
// =============================================================================

/// One event as printed in JSON mode.
#[derive(Debug, serde::Serialize)]
struct EventRecord<'a> {
    path: &'a str,
    name: Option<&'a str>,
    op: String,
    destination: Option<&'a str>,
    is_dir: bool,
    size: Option<u64>,
}

impl<'a> From<&'a FileEvent> for EventRecord<'a> {
    fn from(event: &'a FileEvent) -> Self {
        Self {
            path: event.path.as_str(),
            name: event.file_name(),
            op: event.op.label(),
            destination: event.destination().map(camino::Utf8Path::as_str),
            is_dir: event.is_dir_event(),
            size: event.meta.map(|meta| meta.len),
        }
    }
}

/// Renders one event as a single output line, without the newline.
fn render_event(event: &FileEvent, format: OutputFormat) -> color_eyre::Result<String> {
    match format {
        OutputFormat::Text => Ok(match event.destination() {
            Some(destination) => format!("{} {} -> {destination}", event.op, event.path),
            None => format!("{} {}", event.op, event.path),
        }),
        OutputFormat::Json => serde_json::to_string(&EventRecord::from(event))
            .map_err(|e| eyre!("Failed to serialize event: {}", e)),
    }
}

fn print_event(
    event: &FileEvent,
    format: OutputFormat,
    include_dirs: bool,
) -> color_eyre::Result<()> {
    if !include_dirs && event.is_dir_event() {
        return Ok(());
    }
    let line = render_event(event, format)?;
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    writeln!(handle, "{line}")?;
    Ok(())
}

// =============================================================================
// COMMAND IMPLEMENTATION
// =============================================================================

/// Resolves when Ctrl-C, or SIGTERM on Unix, is received.
async fn shutdown_signal() -> color_eyre::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                info!("Received Ctrl-C, shutting down");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl-C, shutting down");
    }

    Ok(())
}

/// Watches the configured paths until a shutdown signal arrives.
///
/// # Errors
///
/// Returns an error if a path cannot be registered, the watcher fails to
/// start, or stdout cannot be written.
async fn run_watch(
    config: &Config,
    format: OutputFormat,
    include_dirs: bool,
) -> color_eyre::Result<()> {
    let watcher = Watcher::with_config(&config.watch);
    for path in &config.paths {
        watcher
            .add(path)
            .wrap_err_with(|| format!("Cannot watch {path}"))?;
    }

    let mut events = watcher
        .take_events()
        .ok_or_else(|| eyre!("Event stream already taken"))?;
    let mut errors = watcher
        .take_errors()
        .ok_or_else(|| eyre!("Error stream already taken"))?;
    watcher.start(config.watch.interval())?;
    info!(
        paths = config.paths.len(),
        interval_ms = config.watch.interval_ms,
        "Watching"
    );

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = &mut shutdown => {
                result?;
                break;
            }
            Some(event) = events.recv() => print_event(&event, format, include_dirs)?,
            Some(err) = errors.recv() => warn!(error = %err, "Scan error"),
            else => break,
        }
    }

    watcher.close().await;
    while let Some(event) = events.recv().await {
        print_event(&event, format, include_dirs)?;
    }

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

    // 4. Merge config file and flags
    let config = build_config(&cli)?;

    run_watch(&config, cli.format, cli.include_dirs).await
}
