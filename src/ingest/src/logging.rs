use std::path::Path;

use anyhow::{Context, Result};
use tracing_appender::rolling;
use tracing_subscriber::{
    fmt::{self, time::SystemTime},
    prelude::*,
    EnvFilter,
};

use crate::constants::LOG_FILE_NAME;

/// Installs the global subscriber. Writes to `<log_dir>/ingest.log` when a directory is
/// given, otherwise to stdout.
pub fn setup_logging(log_level: &str, log_dir: Option<&Path>) -> Result<()> {
    // Capture all levels from log_level and up
    let filter = EnvFilter::try_new(log_level)
        .with_context(|| format!("invalid log level `{}`", log_level))?;

    match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create log directory {:?}", dir))?;
            let file_appender = rolling::never(dir, LOG_FILE_NAME);

            let file_layer = fmt::layer()
                .with_file(true)
                .with_line_number(true)
                .with_thread_ids(true)
                .with_thread_names(true)
                .with_target(true)
                .with_level(true)
                .with_timer(SystemTime)
                .with_ansi(false)
                .with_writer(file_appender);

            let subscriber = tracing_subscriber::registry().with(filter).with(file_layer);
            tracing::subscriber::set_global_default(subscriber)
                .context("Failed to set tracing subscriber")?;

            tracing::info!(
                "Logging system initialized. Writing to {:?}",
                dir.join(LOG_FILE_NAME)
            );
        }
        None => {
            let stdout_layer = fmt::layer()
                .with_file(true)
                .with_line_number(true)
                .with_thread_ids(true)
                .with_thread_names(true)
                .with_target(true)
                .with_level(true)
                .with_timer(SystemTime)
                .with_writer(std::io::stdout);

            let subscriber = tracing_subscriber::registry()
                .with(filter)
                .with(stdout_layer);
            tracing::subscriber::set_global_default(subscriber)
                .context("Failed to set tracing subscriber")?;

            tracing::info!("Logging system initialized. Writing to stdout");
        }
    }

    Ok(())
}
