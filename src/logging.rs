use crate::config::AppConfig;
use crate::tracker::error::TrackerError;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Crates whose debug output drowns the tracker's own events.
const QUIET_TARGETS: [&str; 5] = ["tungstenite", "tokio_tungstenite", "hyper", "reqwest", "rustls"];

/// Map the configured rotation name; anything unknown keeps a single file.
fn rotation(name: &str) -> Rotation {
    match name.to_ascii_lowercase().as_str() {
        "minutely" => Rotation::MINUTELY,
        "hourly" => Rotation::HOURLY,
        "daily" => Rotation::DAILY,
        _ => Rotation::NEVER,
    }
}

/// Default filter when `RUST_LOG` is unset: the configured level for the
/// tracker, `warn` for transport crates.
fn default_directives(level: &str) -> String {
    let mut directives = vec![level.to_string(), format!("tx_tracker={}", level)];
    directives.extend(QUIET_TARGETS.iter().map(|t| format!("{}=warn", t)));
    directives.join(",")
}

/// Install the global subscriber: rolling file output (text or JSON) plus a
/// stdout layer. Keep the guard alive for the process lifetime or buffered
/// file output is lost.
pub fn init_logging(config: &AppConfig) -> Result<WorkerGuard, TrackerError> {
    let appender = RollingFileAppender::builder()
        .rotation(rotation(&config.rotation))
        .filename_prefix(&config.log_file)
        .build(&config.log_dir)
        .map_err(|e| TrackerError::Config(format!("log file in {}: {}", config.log_dir, e)))?;
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(&config.log_level)));
    let stdout_layer = fmt::layer().with_target(false).with_ansi(true);
    let registry = tracing_subscriber::registry().with(filter).with(stdout_layer);

    if config.use_json {
        // One flat object per event so network/tx_id/height are top-level keys
        let file_layer = fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(false)
            .with_target(true)
            .with_writer(non_blocking);
        registry.with(file_layer).init();
    } else {
        let file_layer = fmt::layer()
            .with_target(true)
            .with_writer(non_blocking)
            .with_ansi(false);
        registry.with(file_layer).init();
    }

    Ok(guard)
}
