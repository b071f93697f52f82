//! # Atlassian backup
//! Runs a single backup operation per invocation.
//!

use std::process::ExitCode;

use atlassian_backup::{
    cli::{Cli, Operation},
    config::{Config, LoadConfigError, SaveConfigError, ValidateConfigError},
    download::{DownloadError, download_backups},
    export::{LocateError, TriggerError, locate_exports, trigger_exports},
    retention::{
        PruneLocalError, PruneRemoteError, UploadError, prune_local, prune_remote, upload_backups,
    },
    session::{Session, SessionError},
    storage::{S3Store, StoreError},
};
use chrono::Local;
use clap::{Parser, error::ErrorKind};
use shared::{LoggerOptions, init_logger};
use thiserror::Error;
use tracing::{Level, error, info};

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(error) => {
            if matches!(
                error.kind(),
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion
            ) {
                error.exit();
            }

            let _ = error.print();
            return ExitCode::FAILURE;
        }
    };

    let logger_options = LoggerOptions {
        directory: cli.log_directory.clone(),
        level: if cli.verbose { Level::DEBUG } else { Level::INFO },
        ..LoggerOptions::default()
    };
    let _logger = match init_logger(&logger_options) {
        Ok(guards) => guards,
        Err(error) => {
            eprintln!("Could not start the logger: {error}");
            return ExitCode::FAILURE;
        }
    };

    let operation = cli.operation();
    match run(&cli, operation) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            error!("{operation:?} failed: {error}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli, operation: Operation) -> Result<(), RunError> {
    match operation {
        Operation::WriteConfig => {
            Config::default().save_toml(&cli.config)?;
            info!("Wrote default config to {:?}", cli.config);
        }

        Operation::Init => {
            let config = load_config(cli, operation)?;
            let session = Session::new(&config.atlassian)?;
            trigger_exports(&session)?;
        }

        Operation::Download => {
            let config = load_config(cli, operation)?;
            let session = Session::new(&config.atlassian)?;
            download_backups(
                &session,
                &config.local_backup_directory,
                Local::now().naive_local(),
            )?;
        }

        Operation::GetLink => {
            let config = load_config(cli, operation)?;
            let session = Session::new(&config.atlassian)?;
            locate_exports(&session)?;
        }

        Operation::Upload => {
            let config = load_config(cli, operation)?;
            let store = S3Store::new(&config.storage)?;
            upload_backups(
                &store,
                &config.local_backup_directory,
                &config.storage.prefix,
            )?;
        }

        Operation::DeleteLocal => {
            let config = load_config(cli, operation)?;
            let store = S3Store::new(&config.storage)?;
            prune_local(&store, &config.local_backup_directory)?;
        }

        Operation::DeleteS3 => {
            let config = load_config(cli, operation)?;
            let store = S3Store::new(&config.storage)?;
            prune_remote(&store, config.storage.max_files)?;
        }
    }

    Ok(())
}

/// Load the config and check the sections the operation uses.
fn load_config(cli: &Cli, operation: Operation) -> Result<Config, RunError> {
    let config = Config::load(&cli.config)?;

    if operation.needs_atlassian() {
        config.validate_atlassian()?;
    }
    if operation.needs_storage() {
        config.validate_storage()?;
    }

    Ok(config)
}

#[derive(Debug, Error)]
enum RunError {
    #[error("Could not load config: {0}")]
    LoadConfig(#[from] LoadConfigError),

    #[error("Could not write config: {0}")]
    SaveConfig(#[from] SaveConfigError),

    #[error("Invalid config: {0}")]
    ValidateConfig(#[from] ValidateConfigError),

    #[error("{0}")]
    Session(#[from] SessionError),

    #[error("Could not create the storage client: {0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Trigger(#[from] TriggerError),

    #[error("{0}")]
    Locate(#[from] LocateError),

    #[error("{0}")]
    Download(#[from] DownloadError),

    #[error("{0}")]
    Upload(#[from] UploadError),

    #[error("{0}")]
    PruneRemote(#[from] PruneRemoteError),

    #[error("{0}")]
    PruneLocal(#[from] PruneLocalError),
}
