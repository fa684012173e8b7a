use std::path::Path;

use anyhow::{Context, Result};
use time::{OffsetDateTime, macros::format_description};
use tokio::io::AsyncWriteExt;
use tracing::{Level, warn};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::fmt;

use crate::{
    error::StorageError,
    storage::{self, StorageLocation, WriteMode},
};

/// Append-only error report log kept next to the backups.
///
/// An explicit capability rather than process-wide state: whoever wants run
/// failures recorded hands one of these to the orchestrator. Appending is
/// best-effort and never fails the caller.
pub struct ReportLog {
    location: Box<dyn StorageLocation>,
}

impl ReportLog {
    pub const FILE_NAME: &'static str = "errors.log";

    pub fn new(location: Box<dyn StorageLocation>) -> Self {
        Self { location }
    }

    /// Appends a timestamped line. Failures are swallowed after a warning;
    /// losing a report line must never fail the run that produced it.
    pub async fn append(&self, message: &str) {
        if let Err(e) = self.try_append(message).await {
            warn!(error = %e, "Failed to append to error report log");
        }
    }

    async fn try_append(&self, message: &str) -> Result<(), StorageError> {
        if !self.location.exists(Self::FILE_NAME).await? {
            self.location.create_file(Self::FILE_NAME, "application/octet-stream").await?;
        }
        let fmt = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
        let now = OffsetDateTime::now_utc();
        let timestamp = now.format(&fmt).unwrap_or_else(|_| "0000-00-00 00:00:00".into());
        let mut writer = self.location.open_write(Self::FILE_NAME, WriteMode::Append).await?;
        writer.write_all(format!("[{timestamp}] {message}\n").as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Reads the whole report log back, e.g. for display in the UI.
    pub async fn read_all(&self) -> Result<String, StorageError> {
        storage::read_to_string(self.location.as_ref(), Self::FILE_NAME).await
    }
}

/// Initializes rolling-file tracing output. The returned guard must be kept
/// alive for the lifetime of the process.
pub fn init_file_logging(logs_dir: &Path) -> Result<WorkerGuard> {
    std::fs::create_dir_all(logs_dir).context("Failed to create logs directory")?;
    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .max_log_files(10)
        .filename_prefix("rootbak")
        .filename_suffix("log")
        .build(logs_dir)
        .context("Failed to initialize file appender")?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_max_level(Level::DEBUG)
        .with_ansi(false)
        .event_format(fmt::format().pretty())
        .with_writer(non_blocking)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set global subscriber")?;
    Ok(guard)
}
