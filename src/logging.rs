use crate::models::LoggingSettings;
use anyhow::{Context, Result};
use camino::Utf8Path;
use std::fs;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Log filter: `RUST_LOG` wins, otherwise `debug` or `info` depending on debug mode
fn env_filter(debug_mode: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if debug_mode {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    })
}

fn ensure_log_dir(log_dir: &Utf8Path) -> Result<()> {
    if !log_dir.exists() {
        fs::create_dir_all(log_dir)
            .with_context(|| format!("Failed to create log directory: {}", log_dir))?;
    }
    Ok(())
}

/// Initialize logging with a daily rotating file and optional console output.
///
/// Log files are named `<log_prefix>.<date>` inside `log_dir`, which callers
/// resolve against the configuration directory (see [`ConfigManager::log_dir`](crate::config::ConfigManager::log_dir)).
///
/// # Returns
/// A guard that must be held for the duration of the program to keep file
/// logging active
pub fn init_logging(settings: &LoggingSettings, log_dir: &Utf8Path, log_prefix: &str) -> Result<WorkerGuard> {
    ensure_log_dir(log_dir)?;

    let file_appender = rolling::daily(log_dir, log_prefix);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false) // No ANSI codes in log files
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    let console_layer = settings
        .console_output
        .then(|| tracing_subscriber::fmt::layer().with_ansi(true).with_target(false));

    tracing_subscriber::registry()
        .with(env_filter(settings.debug_mode))
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .context("A global tracing subscriber is already installed")?;

    tracing::info!(
        "Logging initialized: dir={}, prefix={}, debug={}, console={}",
        log_dir,
        log_prefix,
        settings.debug_mode,
        settings.console_output
    );

    Ok(guard)
}
