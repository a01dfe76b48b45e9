//! Tracing setup
//!
//! Logs go to stdout and to `~/.sous/logs/sous-debug.log`, both with local
//! timestamps. `RUST_LOG` overrides the default `info` filter.

use std::path::PathBuf;
use tracing_subscriber::prelude::*;

use crate::config;

const LOG_FILE_NAME: &str = "sous-debug.log";

/// Format timestamps using the system's local time via chrono
struct LocalTimer;

impl tracing_subscriber::fmt::time::FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"))
    }
}

/// Directory holding the debug log
pub fn log_dir() -> PathBuf {
    config::get_config_dir().join("logs")
}

fn env_filter() -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
}

/// Install the global subscriber
///
/// Falls back to stdout only when the log file cannot be opened. Calling
/// this more than once leaves the first subscriber in place.
pub fn init() {
    let log_dir = log_dir();
    let _ = std::fs::create_dir_all(&log_dir);
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join(LOG_FILE_NAME))
        .ok();

    let result = if let Some(file) = log_file {
        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::sync::Mutex::new(file))
            .with_timer(LocalTimer)
            .with_ansi(false);
        let stdout_layer = tracing_subscriber::fmt::layer().with_timer(LocalTimer);
        tracing_subscriber::registry()
            .with(env_filter())
            .with(stdout_layer)
            .with(file_layer)
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(env_filter())
            .with(tracing_subscriber::fmt::layer().with_timer(LocalTimer))
            .try_init()
    };

    match result {
        Ok(()) => tracing::info!("Logging to {}", log_dir.join(LOG_FILE_NAME).display()),
        Err(e) => tracing::debug!("Tracing subscriber already installed: {}", e),
    }
}
