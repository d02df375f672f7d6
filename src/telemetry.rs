//! Ambient telemetry.
//!
//! `tracing`/`tracing-subscriber` global subscriber initialization, shared
//! by the library and the demo binary. Distributed trace export (OTLP) is
//! intentionally not carried here — see DESIGN.md.

use tracing_subscriber::{fmt, EnvFilter};

/// Install a global `tracing` subscriber driven by `RUST_LOG`
/// (default `info`), compact-formatted for terminals.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// Same as `init`, but emits newline-delimited JSON — for production
/// deployments behind a log shipper.
pub fn init_json() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().json().with_env_filter(filter).try_init();
}
