//! Tracing setup for the worker.
//!
//! # Separation of Concerns
//!
//! - **stderr layer**: dev diagnostics filtered by `RUST_LOG` (default `info`), compact format.
//! - **job log layer**: product output appended to the job's `log.txt` without ANSI colors.
//!   Callers prune the log (see [`crate::io::job_log`]) before calling [`init`], since the
//!   layer keeps the file open for appending.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the global subscriber, optionally teeing events into `job_log`.
///
/// # Example
/// ```bash
/// RUST_LOG=agent=debug agent run --workspace ./jobs/123
/// ```
pub fn init(job_log: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = match job_log {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("open job log {}", path.display()))?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .with(file_layer)
        .try_init()
        .context("install tracing subscriber")?;
    Ok(())
}
