//! Process-wide tracing initialization, in the style of the teacher's
//! `main.rs` `tracing_subscriber::fmt()` setup.

use tracing_subscriber::EnvFilter;

/// Initialize the global `tracing` subscriber from `log_level` (a bare
/// level such as `"info"`), falling back to `RUST_LOG` when set. Safe to
/// call once per process; a second call is a no-op error that callers may
/// ignore.
pub fn init(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
