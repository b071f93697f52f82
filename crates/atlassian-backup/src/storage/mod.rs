//! Object storage for offsite copies.
//!

use std::{io, path::Path};

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::progress::Progress;

mod memory;
mod s3;

pub use memory::MemoryStore;
pub use s3::S3Store;

/// An object in the bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    /// The full object key, `<prefix>/<file name>`.
    pub key: String,
    /// When the object was last modified.
    pub last_modified: DateTime<Utc>,
    /// The object size in bytes.
    pub size: u64,
}

impl RemoteObject {
    /// The last segment of the key.
    pub fn file_name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }

    /// Whether this is a placeholder rather than a backup, e.g. `.DS_Store` or a folder marker.
    pub fn is_placeholder(&self) -> bool {
        self.key.ends_with('/') || self.file_name().starts_with('.')
    }
}

/// Join a key prefix and a file name.
pub fn object_key(prefix: &str, file_name: &str) -> String {
    format!("{}/{}", prefix.trim_matches('/'), file_name)
}

/// A bucket that backups are kept in.
pub trait ObjectStore {
    /// Upload a local file to `key`, advancing `progress` as bytes are sent.
    fn upload_file(&self, key: &str, path: &Path, progress: &mut Progress)
    -> Result<(), StoreError>;

    /// List every object in the bucket.
    fn list_objects(&self) -> Result<Vec<RemoteObject>, StoreError>;

    /// Delete the object at `key`.
    fn delete_object(&self, key: &str) -> Result<(), StoreError>;
}

#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to {1}: {0}")]
    Io(#[source] io::Error, &'static str),

    #[error("Failed to start the storage runtime: {0}")]
    Runtime(#[source] io::Error),

    #[error("Storage request {operation} failed: {message}")]
    Request {
        operation: &'static str,
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object(key: &str) -> RemoteObject {
        RemoteObject {
            key: key.to_string(),
            last_modified: DateTime::<Utc>::UNIX_EPOCH,
            size: 0,
        }
    }

    #[test]
    fn file_names() {
        assert_eq!(
            object("atlassian_backups/jira_backup-20240122_072522.zip").file_name(),
            "jira_backup-20240122_072522.zip"
        );
        assert_eq!(object("loose.zip").file_name(), "loose.zip");
    }

    #[test]
    fn placeholders() {
        assert!(object("atlassian_backups/.DS_Store").is_placeholder());
        assert!(object("atlassian_backups/").is_placeholder());
        assert!(!object("atlassian_backups/jira_backup-20240122_072522.zip").is_placeholder());
    }

    #[test]
    fn keys() {
        assert_eq!(object_key("atlassian_backups", "a.zip"), "atlassian_backups/a.zip");
        assert_eq!(object_key("/atlassian_backups/", "a.zip"), "atlassian_backups/a.zip");
    }
}
