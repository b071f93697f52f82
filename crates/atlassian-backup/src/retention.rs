//! Keep the offsite copies current and prune stale ones.
//!

use std::{
    collections::HashSet,
    fs,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::{info, warn};

use crate::{
    context::Context,
    download::{is_partial, list_file_names},
    progress::Progress,
    storage::{ObjectStore, RemoteObject, StoreError, object_key},
};

/// Upload every archive in the local directory under `prefix`.
///
/// Returns the keys that were uploaded.
pub fn upload_backups<S: ObjectStore + ?Sized>(
    store: &S,
    directory: &Path,
    prefix: &str,
) -> Result<Vec<String>, UploadError> {
    let context = Context::new("Upload");

    let local_files =
        list_file_names(directory).map_err(|e| UploadError::Io(e, "read backup directory"))?;

    if local_files.is_empty() {
        info!("{context}No files found in {directory:?}");
        return Ok(Vec::new());
    }

    let mut uploaded = Vec::with_capacity(local_files.len());
    for file_name in local_files {
        if is_partial(&file_name) {
            warn!("{context}Skipping unfinished download {file_name}");
            continue;
        }

        let path = directory.join(&file_name);
        let file_size = fs::metadata(&path)
            .map_err(|e| UploadError::Io(e, "get file metadata"))?
            .len();
        let key = object_key(prefix, &file_name);

        info!("{context}Uploading {file_name} to {key}");
        let mut progress = Progress::new(context, file_name.as_str(), Some(file_size));
        store
            .upload_file(&key, &path, &mut progress)
            .map_err(|e| UploadError::Store(file_name.clone(), e))?;
        progress.finish();

        info!("{context}Upload finished: {key}");
        uploaded.push(key);
    }

    Ok(uploaded)
}

/// The objects of a listing, split by what retention does with them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionPlan {
    /// Objects that are not backups, left alone.
    pub placeholders: Vec<RemoteObject>,
    /// The newest backups, oldest first.
    pub kept: Vec<RemoteObject>,
    /// Every older backup, oldest first.
    pub expired: Vec<RemoteObject>,
}

/// Split a listing into the newest `max_files` backups and the rest.
pub fn plan_retention(objects: Vec<RemoteObject>, max_files: usize) -> RetentionPlan {
    let (placeholders, mut backups): (Vec<_>, Vec<_>) =
        objects.into_iter().partition(RemoteObject::is_placeholder);

    // Oldest first, keys break ties so the split is stable.
    backups.sort_by(|a, b| {
        a.last_modified
            .cmp(&b.last_modified)
            .then_with(|| a.key.cmp(&b.key))
    });

    let expired_count = backups.len().saturating_sub(max_files);
    let kept = backups.split_off(expired_count);

    RetentionPlan {
        placeholders,
        kept,
        expired: backups,
    }
}

/// Delete every backup in the bucket except the `max_files` most recently modified.
///
/// Returns the deleted keys.
pub fn prune_remote<S: ObjectStore + ?Sized>(
    store: &S,
    max_files: usize,
) -> Result<Vec<String>, PruneRemoteError> {
    let context = Context::new("Prune Remote");

    let objects = store.list_objects()?;
    if objects.is_empty() {
        return Err(PruneRemoteError::EmptyBucket);
    }

    info!(
        "{context}Bucket contains {} objects:\n{}",
        objects.len(),
        objects
            .iter()
            .map(|object| format!("{} ({}, {} bytes)", object.key, object.last_modified, object.size))
            .collect::<Vec<_>>()
            .join("\n")
    );

    let plan = plan_retention(objects, max_files);

    for placeholder in &plan.placeholders {
        info!("{context}Skipping placeholder {}", placeholder.key);
    }

    let mut deleted = Vec::with_capacity(plan.expired.len());
    for object in plan.expired {
        store.delete_object(&object.key)?;
        info!("{context}Deleted {}", object.key);
        deleted.push(object.key);
    }

    info!(
        "{context}Kept {} backups, deleted {}",
        plan.kept.len(),
        deleted.len()
    );

    Ok(deleted)
}

/// The local files that were deleted and kept by local pruning.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalPruneReport {
    /// Files that have an offsite copy and were deleted.
    pub deleted: Vec<PathBuf>,
    /// Files without an offsite copy.
    pub retained: Vec<String>,
}

/// Delete every local file whose name matches an object in the bucket.
pub fn prune_local<S: ObjectStore + ?Sized>(
    store: &S,
    directory: &Path,
) -> Result<LocalPruneReport, PruneLocalError> {
    let context = Context::new("Prune Local");

    let remote_names: HashSet<String> = store
        .list_objects()?
        .iter()
        .filter(|object| !object.is_placeholder())
        .map(|object| object.file_name().to_string())
        .collect();

    let local_files =
        list_file_names(directory).map_err(|e| PruneLocalError::Io(e, "read backup directory"))?;

    let mut report = LocalPruneReport::default();
    for file_name in local_files {
        if !remote_names.contains(&file_name) {
            info!("{context}No remote copy of {file_name}, keeping it");
            report.retained.push(file_name);
            continue;
        }

        let path = directory.join(&file_name);
        match fs::remove_file(&path) {
            Ok(()) => {
                info!("{context}Deleted {path:?}");
                report.deleted.push(path);
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!("{context}{path:?} was removed by something else");
            }
            Err(e) => return Err(PruneLocalError::Io(e, "delete local file")),
        }
    }

    Ok(report)
}

#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Failed to {1}: {0}")]
    Io(#[source] io::Error, &'static str),

    #[error("Failed to upload {0}: {1}")]
    Store(String, #[source] StoreError),
}

#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum PruneRemoteError {
    #[error("Failed to access the bucket: {0}")]
    Store(#[from] StoreError),

    #[error("The bucket is empty")]
    EmptyBucket,
}

#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum PruneLocalError {
    #[error("Failed to list the bucket: {0}")]
    Store(#[from] StoreError),

    #[error("Failed to {1}: {0}")]
    Io(#[source] io::Error, &'static str),
}
