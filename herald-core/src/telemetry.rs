//! Tracing bootstrap for embedding processes.

use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber from `LOG_LEVEL`.
///
/// Accepted levels: `fatal`, `error`, `warn`, `info`, `debug`, `trace`
/// (default `info`; `fatal` maps to `error`). Safe to call more than once;
/// later calls are no-ops.
pub fn init_tracing() {
    let level = match std::env::var("LOG_LEVEL").as_deref() {
        Ok("fatal") | Ok("error") => "error",
        Ok("warn") => "warn",
        Ok("debug") => "debug",
        Ok("trace") => "trace",
        _ => "info",
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(level))
        .try_init();
}
