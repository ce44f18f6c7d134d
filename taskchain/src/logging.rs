//! Process-wide tracing setup.
//!
//! Run artifacts (checkpoints, answers, `backend.log`) live in the run
//! directory and are written regardless of `RUST_LOG`. This module only
//! controls diagnostics on stderr.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`; defaults to `info` so step progress is visible.
///
/// # Example
/// ```bash
/// RUST_LOG=taskchain=debug taskchain run --task task.json
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
