//! Usage: Process-wide tracing setup (stderr, optional daily log file, `log` bridge).

use crate::shared::error::{AppError, AppResult};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_FILTER: &str = "acc_forms_dashboard_lib=info,acc_forms_dashboard=info,warn";
const LOG_FILE_PREFIX: &str = "acc-forms-dashboard.log";

/// Keeps the file writer flushing; hold it for the life of the process.
#[must_use = "dropping the guard stops the log file writer"]
pub struct LoggingGuard {
    _file: Option<WorkerGuard>,
}

pub fn init(log_dir: Option<&Path>) -> AppResult<LoggingGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let (file_layer, file_guard) = match log_dir {
        Some(dir) => {
            let (writer, guard) = daily_file_writer(dir)?;
            let layer = fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(file_layer);

    tracing::subscriber::set_global_default(subscriber).map_err(|e| {
        AppError::new("SYSTEM_ERROR", format!("failed to install tracing subscriber: {e}"))
            .with_source(e)
    })?;

    // A second bridge install is harmless; the first one wins.
    if let Err(err) = tracing_log::LogTracer::init() {
        tracing::debug!("log bridge already installed: {err}");
    }

    if let Some(dir) = log_dir {
        tracing::info!(dir = %dir.display(), "file logging enabled");
    }
    Ok(LoggingGuard { _file: file_guard })
}

fn daily_file_writer(
    dir: &Path,
) -> AppResult<(tracing_appender::non_blocking::NonBlocking, WorkerGuard)> {
    std::fs::create_dir_all(dir).map_err(|e| {
        AppError::new(
            "SYSTEM_ERROR",
            format!("failed to create log dir {}: {e}", dir.display()),
        )
        .with_source(e)
    })?;
    let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
    Ok(tracing_appender::non_blocking(appender))
}
