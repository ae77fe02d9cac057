//! Log subscriber setup for the `tag-sync` binary.

use std::{fs::OpenOptions, sync::Mutex};

use serde::Deserialize;
use tracing_subscriber::EnvFilter;

/// Level used when neither `RUST_LOG` nor the config sets one.
pub const DEFAULT_LOG_LEVEL: &str = "warn";

/// `[log]` table.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Filter directive, e.g. `"info"` or `"tag_sync=debug"`.
    pub level: String,
    /// Append log output to this file instead of stderr.
    pub file_name: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            file_name: None,
        }
    }
}

/// Picks the filter: `RUST_LOG` wins, then the configured level, then the
/// default. An invalid configured level is reported through the second
/// value.
pub fn env_filter(config: &LogConfig) -> (EnvFilter, Option<String>) {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return (filter, None);
    }
    match EnvFilter::try_new(&config.level) {
        Ok(filter) => (filter, None),
        Err(e) => (
            EnvFilter::new(DEFAULT_LOG_LEVEL),
            Some(format!(
                "failed to parse log level `{}`, default will be used: {e}",
                config.level
            )),
        ),
    }
}

/// Installs the global `fmt` subscriber.
///
/// If `file_name` cannot be opened, logs go to stderr and a warning is
/// logged once the subscriber is up.
pub fn init_logging(config: &LogConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let (filter, mut warning) = env_filter(config);

    let file = match config.file_name.as_deref() {
        Some(path) => match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => Some(file),
            Err(e) => {
                warning = Some(format!("failed to log to file {path}, using stderr: {e}"));
                None
            }
        },
        None => None,
    };

    match file {
        Some(file) => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .try_init()?,
        None => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init()?,
    }

    if let Some(warning) = warning {
        tracing::warn!("{warning}");
    }
    Ok(())
}
