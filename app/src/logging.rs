//! File logging. The terminal belongs to the TUI, so events go to a daily
//! rolling file under `<config dir>/logs` instead of stderr.

use std::error::Error;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

pub const DEFAULT_FILTER: &str =
    "info,dbadmin=debug,dbadmin_core=debug,dbadmin_adapters=debug,dbadmin_tui=debug";
const LOG_FILE_PREFIX: &str = "dbadmin.log";

/// Installs the global subscriber. `RUST_LOG` wins over [`DEFAULT_FILTER`].
/// Keep the returned guard alive until exit or buffered lines are lost.
pub fn init(log_dir: &Path) -> Result<WorkerGuard, Box<dyn Error>> {
    std::fs::create_dir_all(log_dir)?;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true),
        )
        .try_init()?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use tracing_subscriber::EnvFilter;

    use super::{init, DEFAULT_FILTER};

    #[test]
    fn default_filter_parses() {
        let filter = EnvFilter::try_new(DEFAULT_FILTER);
        assert!(filter.is_ok());
    }

    #[test]
    fn init_creates_log_directory() {
        let temp = tempfile::tempdir().expect("temp dir");
        let log_dir = temp.path().join("logs");

        let guard = init(&log_dir).expect("logging should initialize");
        tracing::info!("logging initialized");
        drop(guard);

        assert!(log_dir.is_dir());
    }
}
