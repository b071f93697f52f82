use std::{
    fs::File,
    io::{BufReader, Read},
    path::Path,
};

use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    Client,
    error::DisplayErrorContext,
    primitives::ByteStream,
    types::{CompletedMultipartUpload, CompletedPart},
};
use chrono::{DateTime, Utc};
use tokio::runtime::{Builder, Runtime};
use tracing::{debug, warn};

use crate::{config::StorageConfig, progress::Progress};

use super::{ObjectStore, RemoteObject, StoreError};

/// Files larger than this are sent as a multipart upload of parts this size.
const PART_SIZE: u64 = 8 * 1024 * 1024;

/// An S3 compatible bucket.
///
/// The SDK is async, requests are driven to completion on a private single threaded runtime.
pub struct S3Store {
    runtime: Runtime,
    client: Client,
    bucket: String,
}

impl S3Store {
    /// Create a client for the configured bucket using the configured static credentials.
    pub fn new(config: &StorageConfig) -> Result<Self, StoreError> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(StoreError::Runtime)?;

        let credentials = Credentials::new(
            config.access_key.clone(),
            config.secret_key.clone(),
            None,
            None,
            "atlassian-backup-config",
        );

        let sdk_config = runtime.block_on(
            aws_config::defaults(BehaviorVersion::latest())
                .region(Region::new(config.region.clone()))
                .credentials_provider(credentials)
                .load(),
        );

        let mut s3_config_builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        if let Some(endpoint) = &config.endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }
        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let client = Client::from_conf(s3_config_builder.build());

        Ok(Self {
            runtime,
            client,
            bucket: config.bucket.clone(),
        })
    }

    async fn put_whole_file(
        &self,
        key: &str,
        reader: &mut impl Read,
        progress: &mut Progress,
    ) -> Result<(), StoreError> {
        let mut contents = Vec::new();
        reader
            .read_to_end(&mut contents)
            .map_err(|e| StoreError::Io(e, "read file for upload"))?;
        let length = u64::try_from(contents.len()).unwrap_or(u64::MAX);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(contents))
            .send()
            .await
            .map_err(|e| request_error("PutObject", e))?;

        progress.advance(length);

        Ok(())
    }

    async fn put_multipart(
        &self,
        key: &str,
        reader: &mut impl Read,
        progress: &mut Progress,
    ) -> Result<(), StoreError> {
        let created = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| request_error("CreateMultipartUpload", e))?;

        let upload_id = match created.upload_id() {
            Some(upload_id) => upload_id.to_string(),
            None => {
                return Err(StoreError::Request {
                    operation: "CreateMultipartUpload",
                    message: "no upload id was returned".to_string(),
                });
            }
        };

        match self.upload_parts(key, &upload_id, reader, progress).await {
            Ok(parts) => {
                self.client
                    .complete_multipart_upload()
                    .bucket(&self.bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .multipart_upload(
                        CompletedMultipartUpload::builder()
                            .set_parts(Some(parts))
                            .build(),
                    )
                    .send()
                    .await
                    .map_err(|e| request_error("CompleteMultipartUpload", e))?;

                Ok(())
            }
            Err(error) => {
                // Abandoned parts are billed until the upload is aborted.
                if let Err(abort_error) = self
                    .client
                    .abort_multipart_upload()
                    .bucket(&self.bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .send()
                    .await
                {
                    warn!(
                        "Could not abort multipart upload of {key}: {}",
                        DisplayErrorContext(&abort_error)
                    );
                }

                Err(error)
            }
        }
    }

    async fn upload_parts(
        &self,
        key: &str,
        upload_id: &str,
        reader: &mut impl Read,
        progress: &mut Progress,
    ) -> Result<Vec<CompletedPart>, StoreError> {
        let mut parts = Vec::new();
        let mut part_number: i32 = 1;

        loop {
            let mut part = Vec::new();
            reader
                .by_ref()
                .take(PART_SIZE)
                .read_to_end(&mut part)
                .map_err(|e| StoreError::Io(e, "read file part for upload"))?;

            if part.is_empty() {
                break;
            }
            let length = u64::try_from(part.len()).unwrap_or(u64::MAX);

            let uploaded = self
                .client
                .upload_part()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(ByteStream::from(part))
                .send()
                .await
                .map_err(|e| request_error("UploadPart", e))?;

            parts.push(
                CompletedPart::builder()
                    .set_e_tag(uploaded.e_tag().map(str::to_string))
                    .part_number(part_number)
                    .build(),
            );

            debug!("Uploaded part {part_number} of {key}");
            progress.advance(length);
            part_number += 1;
        }

        Ok(parts)
    }
}

impl ObjectStore for S3Store {
    fn upload_file(
        &self,
        key: &str,
        path: &Path,
        progress: &mut Progress,
    ) -> Result<(), StoreError> {
        let file = File::open(path).map_err(|e| StoreError::Io(e, "open file for upload"))?;
        let file_size = file
            .metadata()
            .map_err(|e| StoreError::Io(e, "get file metadata"))?
            .len();
        let mut reader = BufReader::new(file);

        if file_size <= PART_SIZE {
            self.runtime
                .block_on(self.put_whole_file(key, &mut reader, progress))
        } else {
            self.runtime
                .block_on(self.put_multipart(key, &mut reader, progress))
        }
    }

    fn list_objects(&self) -> Result<Vec<RemoteObject>, StoreError> {
        self.runtime.block_on(async {
            let mut objects = Vec::new();
            let mut pages = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .into_paginator()
                .send();

            while let Some(page) = pages.next().await {
                let page = page.map_err(|e| request_error("ListObjectsV2", e))?;

                for object in page.contents() {
                    let Some(key) = object.key() else {
                        continue;
                    };

                    let Some(last_modified) = object.last_modified().and_then(|date| {
                        DateTime::<Utc>::from_timestamp(date.secs(), date.subsec_nanos())
                    }) else {
                        warn!("Object '{key}' has no usable last modified date, skipping it");
                        continue;
                    };

                    objects.push(RemoteObject {
                        key: key.to_string(),
                        last_modified,
                        size: object
                            .size()
                            .and_then(|size| u64::try_from(size).ok())
                            .unwrap_or(0),
                    });
                }
            }

            Ok::<_, StoreError>(objects)
        })
    }

    fn delete_object(&self, key: &str) -> Result<(), StoreError> {
        self.runtime.block_on(async {
            self.client
                .delete_object()
                .bucket(&self.bucket)
                .key(key)
                .send()
                .await
                .map_err(|e| request_error("DeleteObject", e))?;

            Ok::<_, StoreError>(())
        })
    }
}

fn request_error<E: core::error::Error>(operation: &'static str, error: E) -> StoreError {
    StoreError::Request {
        operation,
        message: DisplayErrorContext(&error).to_string(),
    }
}
