use std::{fs::create_dir_all, io, path::PathBuf};

use thiserror::Error;
use tracing::{Level, subscriber::set_global_default};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{layer::SubscriberExt, registry};

/// Options for the global logger.
#[derive(Debug, Clone)]
pub struct LoggerOptions {
    /// The directory the rolling log files are written to.
    pub directory: PathBuf,

    /// The most verbose level that is recorded.
    pub level: Level,

    /// How many daily log files to keep.
    pub max_log_files: usize,
}

impl Default for LoggerOptions {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("./logs"),
            level: Level::INFO,
            max_log_files: 90,
        }
    }
}

/// Holds the non-blocking writer guards. Buffered lines are flushed when this is dropped.
#[must_use = "dropping the guards stops the log writers"]
pub struct LoggerGuards {
    _guards: Vec<WorkerGuard>,
}

/// Create and set the global loggers.
pub fn init_logger(options: &LoggerOptions) -> Result<LoggerGuards, LoggerError> {
    create_dir_all(&options.directory).map_err(LoggerError::CreateDirectory)?;

    let filter = tracing_subscriber::filter::Targets::new().with_default(options.level);

    // File layer
    let (file_guard, file_layer) = {
        let appender = RollingFileAppender::builder()
            .filename_prefix("atlassian-backup")
            .filename_suffix("log")
            .rotation(Rotation::DAILY)
            .max_log_files(options.max_log_files)
            .build(&options.directory)?;

        let (writer, guard) = tracing_appender::non_blocking(appender);

        let layer = tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(false);

        (guard, layer)
    };

    // Std layer
    let (std_guard, std_layer) = {
        let (writer, guard) = tracing_appender::non_blocking(io::stdout());

        let layer = tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_ansi(true)
            .with_target(false);

        (guard, layer)
    };

    let registry = registry().with(file_layer).with(std_layer).with(filter);
    set_global_default(registry)?;

    Ok(LoggerGuards {
        _guards: vec![file_guard, std_guard],
    })
}

#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("Failed to create rolling appender:\n{0}")]
    CreateRollingAppender(#[from] tracing_appender::rolling::InitError),

    #[error("Failed to create log directory:\n{0}")]
    CreateDirectory(#[source] io::Error),

    #[error("A global logger was already set:\n{0}")]
    SetGlobal(#[from] tracing::subscriber::SetGlobalDefaultError),
}
