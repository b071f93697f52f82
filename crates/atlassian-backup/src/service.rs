//! The Atlassian cloud services that are backed up.
//!

use core::fmt;

use chrono::NaiveDateTime;

/// An Atlassian cloud service with a backup export.
#[derive(Hash, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Service {
    /// The Confluence wiki.
    Confluence,

    /// The Jira issue tracker.
    Jira,
}

impl Service {
    /// Every service, in the order they are processed.
    pub const ALL: [Self; 2] = [Self::Confluence, Self::Jira];

    /// The prefix of this service's local archive file names.
    pub fn file_prefix(&self) -> &'static str {
        match self {
            Self::Confluence => "confluence_backup",
            Self::Jira => "jira_backup",
        }
    }

    /// The endpoint that starts a cloud export.
    pub fn run_backup_endpoint(&self) -> &'static str {
        match self {
            Self::Confluence => "/wiki/rest/obm/1.0/runbackup",
            Self::Jira => "/rest/backup/1/export/runbackup",
        }
    }

    /// The field of the progress response holding the export's path.
    pub fn progress_field(&self) -> &'static str {
        match self {
            Self::Confluence => "fileName",
            Self::Jira => "result",
        }
    }

    /// The prefix the located path starts with.
    pub fn located_path_prefix(&self) -> &'static str {
        match self {
            Self::Confluence => "temp/",
            Self::Jira => "export/download/",
        }
    }

    /// The path a located export is downloaded from, relative to the base url.
    pub fn download_endpoint(&self) -> &'static str {
        match self {
            Self::Confluence => "/wiki/download/",
            Self::Jira => "/plugins/servlet/",
        }
    }

    /// Classify a located path by the service that produced it.
    pub fn classify(path: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|service| path.starts_with(service.located_path_prefix()))
    }

    /// The absolute url to download a located export from.
    pub fn download_url(&self, base_url: &str, path: &str) -> String {
        format!(
            "{}{}{}",
            base_url.trim_end_matches('/'),
            self.download_endpoint(),
            path.trim_start_matches('/')
        )
    }

    /// The local archive file name for a download started at `timestamp`.
    pub fn archive_file_name(&self, timestamp: NaiveDateTime) -> String {
        format!(
            "{}-{}.zip",
            self.file_prefix(),
            timestamp.format("%Y%m%d_%H%M%S")
        )
    }

    /// The file name prefix shared by every archive of this service taken on the same day.
    pub fn same_day_prefix(&self, timestamp: NaiveDateTime) -> String {
        format!("{}-{}", self.file_prefix(), timestamp.format("%Y%m%d"))
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Confluence => write!(f, "Confluence"),
            Self::Jira => write!(f, "Jira"),
        }
    }
}
