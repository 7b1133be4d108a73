//! Tracing subscriber setup driven by the `[logging]` config section.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

/// Overrides `logging.level` when set.
pub const LOG_ENV: &str = "PHOTOCAT_LOG";

const LOG_FILE_PREFIX: &str = "photocat.log";

// Dropping the guard stops the file writer thread.
static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogBackend {
    Journald,
    /// Daily rolling files named `photocat.log.<date>` in this directory.
    File(PathBuf),
}

/// Filter directive in effect: the environment wins over the config.
fn filter_directive(config: &LoggingConfig, env: Option<String>) -> String {
    env.filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| config.level.clone())
}

fn build_filter(directive: &str) -> EnvFilter {
    EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber. Call once, after the config is loaded.
pub fn init(config: &LoggingConfig) -> Result<LogBackend> {
    let directive = filter_directive(config, std::env::var(LOG_ENV).ok());

    #[cfg(target_os = "linux")]
    {
        if let Some(layer) = config.journald.then(tracing_journald::layer).and_then(Result::ok) {
            tracing_subscriber::registry()
                .with(build_filter(&directive))
                .with(layer.with_syslog_identifier("photocat".to_string()))
                .try_init()
                .context("A global subscriber is already installed")?;
            tracing::debug!("Logging to journald with filter {:?}", directive);
            return Ok(LogBackend::Journald);
        }
    }

    let dir = config.directory.clone().unwrap_or_else(default_log_dir);
    init_file(&dir, &directive)?;
    Ok(LogBackend::File(dir))
}

fn init_file(dir: &Path, directive: &str) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Cannot create log directory {}", dir.display()))?;

    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX));
    if FILE_GUARD.set(guard).is_err() {
        anyhow::bail!("File logging is already initialized");
    }

    tracing_subscriber::registry()
        .with(build_filter(directive))
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .try_init()
        .context("A global subscriber is already installed")?;
    tracing::debug!("Logging to {} with filter {:?}", dir.display(), directive);
    Ok(())
}

pub fn default_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("photocat")
        .join("logs")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_overrides_config_level() {
        let config = LoggingConfig {
            level: "warn".into(),
            ..LoggingConfig::default()
        };
        assert_eq!(filter_directive(&config, None), "warn");
        assert_eq!(filter_directive(&config, Some("  ".into())), "warn");
        assert_eq!(
            filter_directive(&config, Some("photocat::album=debug".into())),
            "photocat::album=debug"
        );
    }
}
