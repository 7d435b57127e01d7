//! Logging bootstrap for Pulse services
//!
//! Console output always uses the bracketed format below. File output is
//! optional, rolls daily through `tracing-appender`, and can be JSON.
//!
//! ```text
//! 2026-01-01T00:00:00.000000Z [INFO] Event consumer started
//! ```
//!
//! `RUST_LOG` overrides the configured level. HTTP access lines use the
//! `api_access` target and triggered alerts use the `alert` target, so either
//! can be routed or silenced independently.

use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::Writer, FmtContext, FormatEvent, FormatFields},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Target used by [`http_request_logger`]
pub const API_ACCESS_TARGET: &str = "api_access";

/// Target used for triggered alerts
pub const ALERT_TARGET: &str = "alert";

fn format_level(level: &Level) -> &'static str {
    match *level {
        Level::TRACE => "[TRACE]",
        Level::DEBUG => "[DEBUG]",
        Level::INFO => "[INFO]",
        Level::WARN => "[WARN]",
        Level::ERROR => "[ERROR]",
    }
}

/// Event formatter that outputs: `timestamp [LEVEL] message fields`
pub struct BracketedLevelFormat;

impl<S, N> FormatEvent<S, N> for BracketedLevelFormat
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let now = chrono::Utc::now();
        write!(writer, "{} ", now.format("%Y-%m-%dT%H:%M:%S%.6fZ"))?;

        let level = *event.metadata().level();
        if writer.has_ansi_escapes() {
            let color = match level {
                Level::TRACE => "\x1b[35m",
                Level::DEBUG => "\x1b[34m",
                Level::INFO => "\x1b[32m",
                Level::WARN => "\x1b[33m",
                Level::ERROR => "\x1b[31m",
            };
            write!(writer, "{}{}\x1b[0m ", color, format_level(&level))?;
        } else {
            write!(writer, "{} ", format_level(&level))?;
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

// Keeps the non-blocking file writer alive for the life of the process
static FILE_GUARD: OnceLock<Mutex<Option<WorkerGuard>>> = OnceLock::new();

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Service name, used as the log file prefix
    pub service_name: String,
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,
    /// Directory for log files
    pub log_dir: PathBuf,
    /// Write a daily rolling log file in addition to the console
    pub enable_file: bool,
    /// JSON format for the file layer
    pub enable_json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "pulse".to_string(),
            level: "info".to_string(),
            log_dir: PathBuf::from("logs"),
            enable_file: false,
            enable_json: false,
        }
    }
}

/// Build the filter: `RUST_LOG` wins, otherwise the configured level with
/// `api_access` pinned to info
pub fn build_filter(config: &LogConfig) -> EnvFilter {
    match std::env::var("RUST_LOG") {
        Ok(env_str) if !env_str.trim().is_empty() => EnvFilter::new(env_str),
        _ => EnvFilter::new(format!(
            "{},{}=info,sqlx=warn",
            config.level, API_ACCESS_TARGET
        )),
    }
}

/// Initialize the global subscriber
pub fn init_with_config(config: LogConfig) -> Result<(), Box<dyn std::error::Error>> {
    let console_layer = fmt::layer()
        .with_ansi(true)
        .event_format(BracketedLevelFormat)
        .boxed();

    let file_layer = if config.enable_file {
        std::fs::create_dir_all(&config.log_dir)?;
        let appender = tracing_appender::rolling::daily(
            &config.log_dir,
            format!("{}.log", config.service_name),
        );
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);

        let slot = FILE_GUARD.get_or_init(|| Mutex::new(None));
        match slot.lock() {
            Ok(mut slot) => *slot = Some(guard),
            Err(poisoned) => {
                eprintln!("Warning: FILE_GUARD lock was poisoned, recovering...");
                *poisoned.into_inner() = Some(guard);
            },
        }

        let layer = if config.enable_json {
            fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_level(true)
                .with_target(true)
                .boxed()
        } else {
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .event_format(BracketedLevelFormat)
                .boxed()
        };
        Some(layer)
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(build_filter(&config))
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    tracing::info!(
        "Logging: {} (file: {}, json: {})",
        config.service_name,
        config.enable_file,
        config.enable_json
    );
    Ok(())
}

/// Console-only logging at the given level
pub fn init(level: &str) -> Result<(), Box<dyn std::error::Error>> {
    init_with_config(LogConfig {
        level: level.to_string(),
        ..Default::default()
    })
}

// ============================================================================
// HTTP access log middleware
// ============================================================================

/// Truncate a body for logging, marking how much was dropped
fn truncate_body(body: &str, max_length: usize) -> String {
    if body.len() <= max_length {
        return body.to_string();
    }
    let mut cut = max_length;
    while !body.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}[truncated {} bytes]", &body[..cut], body.len() - cut)
}

/// Axum middleware logging every request on the `api_access` target
///
/// Request bodies of modifying methods are captured only at DEBUG level.
#[cfg(feature = "axum")]
pub async fn http_request_logger(
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    use axum::body::Body;
    use std::time::Instant;
    use tracing::{debug, info, level_enabled};

    const MAX_BODY_LENGTH: usize = 500;

    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let start = Instant::now();
    let is_write = matches!(method.as_str(), "POST" | "PUT" | "PATCH" | "DELETE");

    let (req, body_str) = if is_write && level_enabled!(Level::DEBUG) {
        let (parts, body) = req.into_parts();
        match axum::body::to_bytes(body, usize::MAX).await {
            Ok(bytes) => {
                let body_str = match std::str::from_utf8(&bytes) {
                    Ok(s) => truncate_body(s, MAX_BODY_LENGTH),
                    Err(_) => "<binary data>".to_string(),
                };
                (
                    axum::extract::Request::from_parts(parts, Body::from(bytes)),
                    Some(body_str),
                )
            },
            Err(e) => {
                tracing::warn!("Failed to read request body: {}", e);
                let req = axum::extract::Request::from_parts(parts, Body::empty());
                return next.run(req).await;
            },
        }
    } else {
        (req, None)
    };

    let response = next.run(req).await;
    let status = response.status().as_u16();
    let duration_ms = start.elapsed().as_millis();

    match body_str {
        Some(body) => debug!(
            target: "api_access",
            method = %method,
            path = %path,
            status,
            duration_ms = %duration_ms,
            request_body = %body,
            "HTTP request"
        ),
        None => info!(
            target: "api_access",
            method = %method,
            path = %path,
            status,
            duration_ms = %duration_ms,
            "HTTP request"
        ),
    }

    response
}
