//! Convenience tracing-subscriber setup.
//!
//! A library shouldn't install a global subscriber on its own, but tests and
//! any host binary want a one-line way to get the same `fmt` layout the
//! original application used. `init` is that one line; calling it more than
//! once is harmless (the second call's error is swallowed).

use tracing_subscriber::EnvFilter;

/// Installs a `tracing_subscriber::fmt` subscriber honoring `RUST_LOG`,
/// defaulting to `info` when unset.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
