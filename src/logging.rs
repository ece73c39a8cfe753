//! Opt-in `tracing` subscriber initialization for embedders and binaries.
//!
//! `sldg` itself never installs a global subscriber — a library must leave
//! that decision to its caller. This module offers the convenience anyway,
//! the way `knhk-cli`'s `tracing::init_tracing()` does for its own binary,
//! simplified here to a plain `EnvFilter` + format layer since this crate
//! carries no OpenTelemetry exporter.

/// Reads `SLDG_LOG` (falling back to `info`) and installs a
/// `tracing_subscriber` formatting layer as the global default.
///
/// Recognizes `error`/`warn`/`info`/`debug`/`trace` (and the `1`/`true`/`yes`
/// and `0`/`false`/`no` aliases `knhk-cli` accepts for `KNHK_TRACE`) in
/// addition to full `EnvFilter` directive syntax (e.g. `sldg=debug`).
/// Returns an error string rather than panicking if a subscriber is already
/// installed.
#[cfg(feature = "logging")]
pub fn init_tracing() -> Result<(), String> {
    use tracing_subscriber::EnvFilter;

    let raw = std::env::var("SLDG_LOG").unwrap_or_else(|_| "info".to_string());
    let directive = match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => "debug",
        "0" | "false" | "no" => "error",
        other => other,
    };
    let filter = EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| e.to_string())
}

#[cfg(not(feature = "logging"))]
pub fn init_tracing() -> Result<(), String> {
    Ok(())
}
