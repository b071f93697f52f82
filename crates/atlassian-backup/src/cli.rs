//! Command line arguments.
//!

use std::path::PathBuf;

use clap::{ArgGroup, Parser};

/// Export Confluence and Jira cloud backups and keep an offsite copy in S3.
#[derive(Debug, Parser)]
#[command(version, about)]
#[command(group(ArgGroup::new("operation").required(true).multiple(false)))]
pub struct Cli {
    /// Start a cloud export of Confluence and Jira.
    #[arg(long, group = "operation")]
    pub init: bool,

    /// Download the latest exports, unless already downloaded today.
    #[arg(long, group = "operation")]
    pub download: bool,

    /// Upload every local archive to the bucket.
    #[arg(long, group = "operation")]
    pub upload: bool,

    /// Delete local archives that have a copy in the bucket.
    #[arg(long, group = "operation")]
    pub delete_local: bool,

    /// Delete all but the newest backups in the bucket.
    #[arg(long = "delete-s3", group = "operation")]
    pub delete_s3: bool,

    /// Print the download links of the latest exports.
    #[arg(long, group = "operation")]
    pub get_link: bool,

    /// Write a default config file.
    #[arg(long, group = "operation")]
    pub write_config: bool,

    /// The config file.
    #[arg(long, default_value = "./config.toml")]
    pub config: PathBuf,

    /// The directory log files are written to.
    #[arg(long, default_value = "./logs")]
    pub log_directory: PathBuf,

    /// Log debug messages.
    #[arg(long, short)]
    pub verbose: bool,
}

/// A single operation selected on the command line.
#[derive(Hash, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    /// Start the cloud exports.
    Init,
    /// Download the latest exports.
    Download,
    /// Upload local archives.
    Upload,
    /// Delete local archives that are mirrored remotely.
    DeleteLocal,
    /// Prune old remote backups.
    DeleteS3,
    /// Log the latest export links.
    GetLink,
    /// Write a default config file.
    WriteConfig,
}

impl Operation {
    /// Whether the operation talks to the Atlassian site.
    pub fn needs_atlassian(&self) -> bool {
        matches!(self, Self::Init | Self::Download | Self::GetLink)
    }

    /// Whether the operation talks to the bucket.
    pub fn needs_storage(&self) -> bool {
        matches!(self, Self::Upload | Self::DeleteLocal | Self::DeleteS3)
    }
}

impl Cli {
    /// The selected operation.
    ///
    /// The argument group guarantees exactly one flag is set.
    pub fn operation(&self) -> Operation {
        let selected = [
            (self.init, Operation::Init),
            (self.download, Operation::Download),
            (self.upload, Operation::Upload),
            (self.delete_local, Operation::DeleteLocal),
            (self.delete_s3, Operation::DeleteS3),
            (self.get_link, Operation::GetLink),
        ];

        selected
            .into_iter()
            .find_map(|(set, operation)| set.then_some(operation))
            .unwrap_or(Operation::WriteConfig)
    }
}

#[cfg(test)]
mod tests {
    use clap::{CommandFactory, error::ErrorKind};

    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(core::iter::once("atlassian-backup").chain(args.iter().copied()))
    }

    #[test]
    fn command_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn every_flag_maps_to_an_operation() {
        let cases = [
            ("--init", Operation::Init),
            ("--download", Operation::Download),
            ("--upload", Operation::Upload),
            ("--delete-local", Operation::DeleteLocal),
            ("--delete-s3", Operation::DeleteS3),
            ("--get-link", Operation::GetLink),
            ("--write-config", Operation::WriteConfig),
        ];

        for (flag, operation) in cases {
            assert_eq!(parse(&[flag]).unwrap().operation(), operation, "{flag}");
        }
    }

    #[test]
    fn an_operation_is_required() {
        let error = parse(&[]).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn operations_are_exclusive() {
        let error = parse(&["--download", "--upload"]).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::ArgumentConflict);
    }

    #[test]
    fn unknown_flag_is_rejected() {
        let error = parse(&["--restore"]).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::UnknownArgument);
    }

    #[test]
    fn config_path() {
        let cli = parse(&["--upload", "--config", "/etc/atlassian-backup.toml"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("/etc/atlassian-backup.toml"));
        assert!(!cli.verbose);
    }

    #[test]
    fn operation_requirements() {
        assert!(Operation::Download.needs_atlassian());
        assert!(!Operation::Download.needs_storage());
        assert!(Operation::DeleteS3.needs_storage());
        assert!(!Operation::WriteConfig.needs_atlassian());
        assert!(!Operation::WriteConfig.needs_storage());
    }
}
