use crate::config::LogLevel;
use anyhow::anyhow;
use std::{io::IsTerminal, sync::OnceLock};
use tracing_subscriber::{
    EnvFilter,
    fmt::{format::FmtSpan, time::LocalTime},
    prelude::*,
};

struct LoggingGuard {
    _file_appender: Option<tracing_appender::non_blocking::WorkerGuard>,
}

static LOGGING_GUARD: OnceLock<Option<LoggingGuard>> = OnceLock::new();

/// Installs the global subscriber. Only the first call has any effect.
pub fn setup_logging(level: LogLevel, cwd: &str, log_file: Option<String>) {
    LOGGING_GUARD.get_or_init(|| {
        setup_logging_inner(level, cwd, log_file).unwrap_or_else(|e| {
            eprintln!("Failed to setup logging: {e}");
            None
        })
    });
}

fn default_directives(level: LogLevel) -> String {
    format!("warn,regioncheck={level},regioncheck_lib={level}")
}

fn setup_logging_inner(
    level: LogLevel,
    cwd: &str,
    log_file: Option<String>,
) -> anyhow::Result<Option<LoggingGuard>> {
    let default_log_level = default_directives(level);
    let filter = EnvFilter::try_from_default_env()
        .inspect(|f| {
            eprintln!("using env log level: {f}");
        })
        .inspect_err(|_| {
            if let Ok(log_level) = std::env::var("RUST_LOG") {
                eprintln!("Failed to parse log level from environment: {log_level}");
                eprintln!("Using default log level: {default_log_level}");
            }
        })
        .unwrap_or(EnvFilter::new(default_log_level));

    let (appender, guard) = if let Some(log_file) = log_file {
        let path_buf = std::path::PathBuf::from(&log_file);
        let log_path = if path_buf.is_absolute() {
            log_file
        } else {
            format!("{cwd}/{log_file}")
        };
        let writer = std::fs::File::options()
            .create(true)
            .append(true)
            .open(log_path)?;
        let (non_blocking, guard) =
            tracing_appender::non_blocking::NonBlockingBuilder::default()
                .buffered_lines_limit(16_000)
                .lossy(true)
                .thread_name("regioncheck-logger-appender")
                .finish(writer);
        (Some(non_blocking), Some(guard))
    } else {
        (None, None)
    };

    let timer = LocalTime::new(time::macros::format_description!(
        "[year repr:last_two]-[month]-[day] [hour]:[minute]:[second]:[subsecond]"
    ));

    let log_to_file_layer = appender.map(|x| {
        tracing_subscriber::fmt::Layer::new()
            .with_span_events(FmtSpan::CLOSE)
            .with_timer(timer.clone())
            .with_ansi(false)
            .compact()
            .with_file(true)
            .with_line_number(true)
            .with_level(true)
            .with_writer(x)
    });
    let log_stderr_layer = tracing_subscriber::fmt::Layer::new()
        .with_timer(timer)
        .with_ansi(std::io::stderr().is_terminal())
        .compact()
        .with_target(cfg!(debug_assertions))
        .with_file(true)
        .with_line_number(true)
        .with_level(true)
        .with_writer(std::io::stderr);

    let subscriber = tracing_subscriber::registry()
        .with(filter) // Global filter
        .with(log_to_file_layer)
        .with(log_stderr_layer);

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|x| anyhow!("setup logging error: {}", x))?;

    Ok(Some(LoggingGuard {
        _file_appender: guard,
    }))
}
