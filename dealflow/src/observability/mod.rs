//! Tracing bootstrap.
//!
//! The engine logs through `tracing` everywhere; this module wires a
//! subscriber for binaries and tests that want console output. Libraries
//! embedding dealflow typically install their own subscriber and skip this.

use tracing_subscriber::{fmt, EnvFilter};

/// Installs a console subscriber honoring `RUST_LOG`, defaulting to `info`
/// for dealflow targets.
///
/// Safe to call more than once: later calls are no-ops.
pub fn init() {
    init_with_filter("info,dealflow=info");
}

/// Installs a console subscriber with an explicit filter directive.
///
/// Safe to call more than once: later calls are no-ops.
pub fn init_with_filter(directives: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(directives));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
