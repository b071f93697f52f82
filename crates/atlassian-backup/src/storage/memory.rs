use std::{
    collections::BTreeMap,
    fs::File,
    io::{BufReader, Read},
    path::Path,
    sync::{Mutex, MutexGuard, PoisonError},
};

use chrono::{DateTime, Utc};

use crate::progress::Progress;

use super::{ObjectStore, RemoteObject, StoreError};

#[derive(Debug, Clone)]
struct StoredObject {
    contents: Vec<u8>,
    last_modified: DateTime<Utc>,
}

/// A bucket held in memory.
///
/// Uploaded objects are stamped with the current time, `insert` allows explicit dates.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<String, StoredObject>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Put an object with a given modified date.
    pub fn insert(&self, key: impl Into<String>, contents: Vec<u8>, last_modified: DateTime<Utc>) {
        self.objects().insert(
            key.into(),
            StoredObject {
                contents,
                last_modified,
            },
        );
    }

    /// The contents of an object, if it exists.
    pub fn contents(&self, key: &str) -> Option<Vec<u8>> {
        self.objects().get(key).map(|object| object.contents.clone())
    }

    /// The keys of every object, in order.
    pub fn keys(&self) -> Vec<String> {
        self.objects().keys().cloned().collect()
    }

    fn objects(&self) -> MutexGuard<'_, BTreeMap<String, StoredObject>> {
        self.objects.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ObjectStore for MemoryStore {
    fn upload_file(
        &self,
        key: &str,
        path: &Path,
        progress: &mut Progress,
    ) -> Result<(), StoreError> {
        let file = File::open(path).map_err(|e| StoreError::Io(e, "open file for upload"))?;
        let mut reader = BufReader::new(file);

        let mut contents = Vec::new();
        let mut buffer = [0u8; 8 * 1024];
        loop {
            let bytes_read = reader
                .read(&mut buffer)
                .map_err(|e| StoreError::Io(e, "read file for upload"))?;
            if bytes_read == 0 {
                break;
            }

            contents.extend_from_slice(&buffer[..bytes_read]);
            progress.advance(u64::try_from(bytes_read).unwrap_or(u64::MAX));
        }

        self.insert(key, contents, Utc::now());

        Ok(())
    }

    fn list_objects(&self) -> Result<Vec<RemoteObject>, StoreError> {
        let objects = self
            .objects()
            .iter()
            .map(|(key, object)| RemoteObject {
                key: key.clone(),
                last_modified: object.last_modified,
                size: u64::try_from(object.contents.len()).unwrap_or(u64::MAX),
            })
            .collect();

        Ok(objects)
    }

    fn delete_object(&self, key: &str) -> Result<(), StoreError> {
        // Deleting a missing key succeeds, as it does in S3.
        self.objects().remove(key);
        Ok(())
    }
}
