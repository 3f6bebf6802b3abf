use std::path::Path;

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::utils::Result;

/// Keeps the non-blocking file writers alive for the life of the process; dropping
/// either guard stops that sink from flushing.
pub struct LoggingGuards {
    _app: WorkerGuard,
    _stream: WorkerGuard,
}

/// Sets up console logging plus the two per-file sinks described in the spec:
/// `app.log` for INFO-and-above pipeline events, `stream.log` for every surviving
/// line emitted by external tools (tagged via the `stream_log` target).
pub fn setup_logging(level: &str, workspace: &Path, colored: bool) -> Result<LoggingGuards> {
    std::fs::create_dir_all(workspace)?;

    let level = parse_level(level);

    let console_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy()
        .add_directive("stream_log=off".parse().unwrap());
    let console_layer = fmt::layer()
        .with_target(false)
        .with_ansi(colored)
        .with_filter(console_filter);

    let app_appender = tracing_appender::rolling::never(workspace, "app.log");
    let (app_writer, app_guard) = tracing_appender::non_blocking(app_appender);
    let app_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy()
        .add_directive("stream_log=off".parse().unwrap());
    let app_layer = fmt::layer()
        .with_ansi(false)
        .with_writer(app_writer)
        .with_filter(app_filter);

    let stream_appender = tracing_appender::rolling::never(workspace, "stream.log");
    let (stream_writer, stream_guard) = tracing_appender::non_blocking(stream_appender);
    let stream_filter = EnvFilter::new("stream_log=debug");
    let stream_layer = fmt::layer()
        .with_ansi(false)
        .with_target(false)
        .with_writer(stream_writer)
        .with_filter(stream_filter);

    tracing_subscriber::registry()
        .with(console_layer)
        .with(app_layer)
        .with(stream_layer)
        .try_init()
        .map_err(|e| crate::utils::Error::validation(format!("logging already initialised: {e}")))?;

    Ok(LoggingGuards {
        _app: app_guard,
        _stream: stream_guard,
    })
}

fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}
