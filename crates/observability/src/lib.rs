//! `stocktrail-observability` — process-wide tracing setup.
//!
//! The ledger engine emits `tracing` events (movement commits, compare-and-set
//! retries, batch summaries); embedding applications and tests call [`init`]
//! once at startup to collect them.

use tracing_subscriber::EnvFilter;

/// Initialize tracing for the process.
///
/// JSON log lines with timestamps, filtered through `RUST_LOG` (defaults to
/// `info`). Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .try_init();
}
