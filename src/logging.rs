//! Logging initialization for embedding applications and tests

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter applied when `RUST_LOG` is unset: engine modules at debug,
/// everything else at info.
const DEFAULT_FILTER: &str = "info,portage=debug";

/// Default log directory, next to the engine's config files.
/// Overridden by the `PORTAGE_LOG_DIR` environment variable.
pub fn default_log_dir() -> Option<PathBuf> {
    resolve_log_dir(std::env::var("PORTAGE_LOG_DIR").ok().as_deref())
}

fn resolve_log_dir(env_override: Option<&str>) -> Option<PathBuf> {
    match env_override {
        Some(raw) => {
            let trimmed = raw.trim();
            // An explicitly empty override disables file logging
            if trimmed.is_empty() {
                None
            } else {
                Some(PathBuf::from(trimmed))
            }
        }
        None => crate::config::config_dir().map(|d| d.join("logs")),
    }
}

/// Initialize logging with optional daily-rotating file output.
/// Returns a guard that must be kept alive for the duration of the program.
pub fn init_logging(log_dir: Option<PathBuf>) -> Option<WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(&dir, "portage.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .compact();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .with(file_layer)
        .init();

    guard
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_override_wins_over_config_dir() {
        assert_eq!(
            resolve_log_dir(Some("/var/log/transfers")),
            Some(PathBuf::from("/var/log/transfers"))
        );
        assert_eq!(
            resolve_log_dir(Some("  /var/log/transfers  ")),
            Some(PathBuf::from("/var/log/transfers"))
        );
    }

    #[test]
    fn empty_override_disables_file_logging() {
        assert_eq!(resolve_log_dir(Some("")), None);
        assert_eq!(resolve_log_dir(Some("   ")), None);
    }

    #[test]
    fn without_override_the_config_dir_is_used() {
        let dir = resolve_log_dir(None);
        if let Some(dir) = dir {
            assert!(dir.ends_with("logs"));
        }
    }
}
