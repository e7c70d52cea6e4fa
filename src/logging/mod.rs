use std::fs::OpenOptions;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

/// Level used when `debug` is off
pub const DEFAULT_LEVEL: LevelFilter = LevelFilter::INFO;

/// Install the plugin's JSON subscriber.
///
/// Stdout carries the CNI result, so logs go to stderr unless a log file is
/// configured. `RUST_LOG` takes precedence over the configured level.
pub fn init(debug: bool, log_file: Option<&Path>) -> Result<()> {
    // One subscriber per process; later calls keep the first
    if tracing::dispatcher::has_been_set() {
        return Ok(());
    }
    let level = if debug { LevelFilter::DEBUG } else { DEFAULT_LEVEL };

    let writer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .append(true)
                .create(true)
                .mode(0o600)
                .open(path)
                .with_context(|| format!("could not write to file {:?}", path))?;
            BoxMakeWriter::new(Mutex::new(file))
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };

    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_current_span(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to set default subscriber: {}", e))
}

/// Human-readable subscriber for the control tool
pub fn init_cli(verbose: bool) -> Result<()> {
    let level = if verbose { LevelFilter::DEBUG } else { DEFAULT_LEVEL };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to set default subscriber: {}", e))
}
