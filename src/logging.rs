//! Subscriber setup for the binary.
//!
//! Logs go to stderr so JSON results on stdout stay machine-readable.
//! `RUST_LOG` wins over the `--log-level` default.

use anyhow::{anyhow, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub fn init_logging(default_level: &str, log_only: bool) -> Result<()> {
    let filter = std::env::var("RUST_LOG")
        .ok()
        .map(EnvFilter::new)
        .unwrap_or_else(|| EnvFilter::new(default_directive(default_level)));

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_ansi(!log_only);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| anyhow!("Failed to install log subscriber: {e}"))
}

/// Directive applied to this crate only; dependencies stay at `warn`.
fn default_directive(level: &str) -> String {
    format!("warn,trackmatch={}", level.trim().to_ascii_lowercase())
}
