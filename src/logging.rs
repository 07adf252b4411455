//! Diagnostic logging setup.
//!
//! Console output filtered by `RUST_LOG` (default `info`), optionally with
//! a daily-rolling file appender. Call once at startup from whatever front
//! end embeds the pipeline; library code only emits `tracing` events.

use std::path::Path;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Console-only logging.
pub fn init() -> Result<()> {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_target(true))
        .try_init()
        .context("failed to initialise logging")?;
    Ok(())
}

/// Console logging plus a daily-rolling `vitals.log` in `log_dir`.
///
/// The returned guard must be held for as long as logging is wanted;
/// dropping it flushes and stops the background writer.
pub fn init_with_dir(log_dir: &Path) -> Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("failed to create log directory {}", log_dir.display()))?;

    let appender = tracing_appender::rolling::daily(log_dir, "vitals.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_target(true))
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .try_init()
        .context("failed to initialise logging")?;

    Ok(guard)
}
