//! Download located exports into the local backup directory.
//!

use std::{
    fs::{self, File, OpenOptions},
    io::{self, BufWriter, ErrorKind, Read, Write},
    path::{Path, PathBuf},
};

use chrono::NaiveDateTime;
use reqwest::StatusCode;
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    context::Context,
    export::{LocateError, locate_exports},
    progress::Progress,
    service::Service,
    session::Session,
};

const CHUNK_SIZE: usize = 8 * 1024;
const PARTIAL_EXTENSION: &str = "part";

/// What happened to a service's archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// The archive was written to `path`.
    Downloaded {
        /// The archive's path.
        path: PathBuf,
        /// The archive's size.
        bytes: u64,
    },

    /// An archive from the same day already exists, nothing was requested.
    AlreadyDownloaded {
        /// The name of the existing archive.
        existing: String,
    },
}

/// The outcome for every service, in processing order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadReport {
    /// The services and their outcomes.
    pub archives: Vec<(Service, DownloadOutcome)>,
}

/// Locate the latest exports and download any that have not been downloaded today.
///
/// Archives are named with `now`, which is also the day used for same day suppression.
pub fn download_backups(
    session: &Session,
    directory: &Path,
    now: NaiveDateTime,
) -> Result<DownloadReport, DownloadError> {
    let descriptor = locate_exports(session)?;

    fs::create_dir_all(directory).map_err(|e| DownloadError::Io(e, "create backup directory"))?;
    let local_files =
        list_file_names(directory).map_err(|e| DownloadError::Io(e, "read backup directory"))?;

    let mut report = DownloadReport::default();
    for path in descriptor.paths() {
        let service =
            Service::classify(path).ok_or_else(|| DownloadError::UnknownPath(path.to_string()))?;
        let context = Context::new("Download").with_service(service);

        let same_day_prefix = service.same_day_prefix(now);
        // Unfinished downloads do not count as today's backup.
        if let Some(existing) = local_files
            .iter()
            .filter(|file_name| !is_partial(file_name))
            .find(|file_name| file_name.starts_with(&same_day_prefix))
        {
            info!("{context}Today's backup is already downloaded: {existing}");
            report.archives.push((
                service,
                DownloadOutcome::AlreadyDownloaded {
                    existing: existing.clone(),
                },
            ));
            continue;
        }

        let file_name = service.archive_file_name(now);
        let url = service.download_url(session.base_url(), path);
        let output_path = directory.join(&file_name);

        info!("{context}Downloading {file_name}");
        let bytes = fetch_archive(session, context, &url, &output_path)?;
        info!("{context}Downloaded {file_name}");

        report.archives.push((
            service,
            DownloadOutcome::Downloaded {
                path: output_path,
                bytes,
            },
        ));
    }

    info!(
        "{}All backup files are in {directory:?}",
        Context::new("Download")
    );

    Ok(report)
}

/// The names of the regular files in a directory.
pub fn list_file_names(directory: &Path) -> io::Result<Vec<String>> {
    let mut file_names = Vec::new();

    for entry in fs::read_dir(directory)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            file_names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }

    Ok(file_names)
}

fn fetch_archive(
    session: &Session,
    context: Context,
    url: &str,
    output_path: &Path,
) -> Result<u64, DownloadError> {
    let mut response = session
        .get_url(url)
        .send()
        .map_err(DownloadError::Request)?;

    let status = response.status();
    if !status.is_success() {
        return Err(DownloadError::Status {
            url: url.to_string(),
            status,
        });
    }

    let file_name = output_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut progress = Progress::new(context, file_name, response.content_length());

    let (partial, file) = PartialFile::create(output_path)?;
    {
        let mut writer = BufWriter::new(file);
        let mut buffer = [0u8; CHUNK_SIZE];

        loop {
            let bytes_read = match response.read(&mut buffer) {
                Ok(0) => break,
                Ok(bytes_read) => bytes_read,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(DownloadError::Io(e, "read archive body")),
            };

            writer
                .write_all(&buffer[..bytes_read])
                .map_err(|e| DownloadError::Io(e, "write archive"))?;
            progress.advance(u64::try_from(bytes_read).unwrap_or(u64::MAX));
        }

        writer
            .into_inner()
            .map_err(|e| DownloadError::Io(e.into_error(), "flush archive"))?
            .sync_all()
            .map_err(|e| DownloadError::Io(e, "sync archive"))?;
    }
    partial.commit()?;

    Ok(progress.finish())
}

/// A file being written next to its final path, removed unless committed.
struct PartialFile {
    partial_path: PathBuf,
    final_path: PathBuf,
    committed: bool,
}

impl PartialFile {
    fn create(final_path: &Path) -> Result<(Self, File), DownloadError> {
        let mut partial_path = final_path.as_os_str().to_owned();
        partial_path.push(".");
        partial_path.push(PARTIAL_EXTENSION);
        let partial_path = PathBuf::from(partial_path);

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&partial_path)
            .map_err(|e| DownloadError::Io(e, "create archive"))?;

        let partial = Self {
            partial_path,
            final_path: final_path.to_path_buf(),
            committed: false,
        };

        Ok((partial, file))
    }

    fn commit(mut self) -> Result<(), DownloadError> {
        fs::rename(&self.partial_path, &self.final_path)
            .map_err(|e| DownloadError::Io(e, "rename archive"))?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if self.committed {
            return;
        }

        if let Err(e) = fs::remove_file(&self.partial_path) {
            warn!("Could not remove partial file {:?}: {e}", self.partial_path);
        }
    }
}

/// Whether a file name belongs to an unfinished download.
pub fn is_partial(file_name: &str) -> bool {
    Path::new(file_name)
        .extension()
        .is_some_and(|extension| extension == PARTIAL_EXTENSION)
}

#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("Failed to locate the exports: {0}")]
    Locate(#[from] LocateError),

    #[error("Located path '{0}' does not belong to a known service")]
    UnknownPath(String),

    #[error("Failed to request the archive: {0}")]
    Request(#[source] reqwest::Error),

    #[error("Archive request {url} returned {status}")]
    Status { url: String, status: StatusCode },

    #[error("Failed to {1}: {0}")]
    Io(#[source] io::Error, &'static str),
}
