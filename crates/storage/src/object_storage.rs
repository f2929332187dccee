//! Checksum-verified object transfers over any `StorageClient`.
//!
//! This module provides the high-level operations the storage engine uses:
//!
//! - Existence and metadata probes where absence is a normal result
//! - Listings that page through truncated results transparently
//! - Uploads that switch to concurrent multipart above the part size,
//!   tag the object with its uncompressed size and part size, and verify
//!   the resulting ETag against the local file
//! - Downloads that reuse the part size recorded at upload time so the
//!   composite checksum can be reproduced
//! - Prefix deletion
//!
//! No retries happen here; a failed request fails the operation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};

use rusty_archival_common::{
    TaskLogger, MIB, PART_SIZE_METADATA_KEY, UNCOMPRESSED_SIZE_METADATA_KEY,
};

use crate::checksum::ChecksumResult;
use crate::error::StorageError;
use crate::parts::{generate_parts, needs_multipart, optimal_part_size, PartInfo};
use crate::progress::TransferProgressLogger;
use crate::traits::{
    CompletedPart, ObjectInfo, ObjectMetadata, ObjectPage, StorageClient, TransferProgressCallback,
};
use crate::types::{
    DownloadOptions, DownloadOutcome, OverwritePolicy, UploadOptions, UploadOutcome,
};

/// Suffix format for preserved copies of overwritten objects.
const PRESERVED_SUFFIX_FORMAT: &str = "%Y-%m-%d.%H-%M-%S-%3f";

/// High-level object operations using any StorageClient implementation.
pub struct ObjectStorage<C: StorageClient> {
    /// The backend client, shared with task-scoped copies.
    client: Arc<C>,
    /// Logger bound to the `storage` component.
    logger: TaskLogger,
}

impl<C: StorageClient> ObjectStorage<C> {
    /// Create a new object storage layer.
    ///
    /// # Arguments
    /// * `client` - Backend client
    /// * `logger` - Parent logger; a `storage` child is derived from it
    pub fn new(client: C, logger: &TaskLogger) -> Self {
        Self {
            client: Arc::new(client),
            logger: logger.for_component("storage"),
        }
    }

    /// A copy sharing this backend that logs with `logger`'s identifiers.
    ///
    /// # Arguments
    /// * `logger` - Parent logger; a `storage` child is derived from it
    pub fn with_logger(&self, logger: &TaskLogger) -> Self {
        Self {
            client: Arc::clone(&self.client),
            logger: logger.for_component("storage"),
        }
    }

    /// The backend client.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Logger bound to the `storage` component.
    pub fn logger(&self) -> &TaskLogger {
        &self.logger
    }

    pub async fn bucket_exists(&self, bucket: &str) -> Result<bool, StorageError> {
        self.client.bucket_exists(bucket).await
    }

    pub async fn create_bucket(&self, bucket: &str) -> Result<(), StorageError> {
        self.client.create_bucket(bucket).await?;
        self.logger.info(format!("Created bucket {}", bucket));
        Ok(())
    }

    pub async fn list_buckets(&self) -> Result<Vec<String>, StorageError> {
        self.client.list_buckets().await
    }

    /// Metadata of an object, or None if it doesn't exist.
    pub async fn object_metadata(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<Option<ObjectMetadata>, StorageError> {
        self.client.head_object_with_metadata(bucket, key).await
    }

    pub async fn object_exists(&self, bucket: &str, key: &str) -> Result<bool, StorageError> {
        Ok(self.object_metadata(bucket, key).await?.is_some())
    }

    /// Size of an object, or None if it doesn't exist.
    pub async fn object_size(&self, bucket: &str, key: &str) -> Result<Option<u64>, StorageError> {
        Ok(self.object_metadata(bucket, key).await?.map(|m| m.size))
    }

    /// Value of a user metadata tag. Tag names are case-insensitive.
    ///
    /// # Returns
    /// None if the object or the tag doesn't exist.
    pub async fn object_metadata_tag(
        &self,
        bucket: &str,
        key: &str,
        tag: &str,
    ) -> Result<Option<String>, StorageError> {
        let metadata: Option<ObjectMetadata> = self.object_metadata(bucket, key).await?;
        Ok(metadata.and_then(|m| metadata_tag(&m, tag)))
    }

    /// Every object under `prefix`, following continuation tokens.
    pub async fn list_object_infos(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> Result<Vec<ObjectInfo>, StorageError> {
        let mut objects: Vec<ObjectInfo> = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let page: ObjectPage = self
                .client
                .list_objects_page(bucket, prefix, continuation_token.as_deref())
                .await?;
            objects.extend(page.objects);

            match page.next_token {
                Some(token) => continuation_token = Some(token),
                None => break,
            }
        }

        Ok(objects)
    }

    /// Keys of every object under `prefix`.
    pub async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StorageError> {
        let objects: Vec<ObjectInfo> = self.list_object_infos(bucket, prefix).await?;
        Ok(objects.into_iter().map(|o| o.key).collect())
    }

    /// Key and size of every object under `prefix`.
    pub async fn list_objects_with_size(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> Result<Vec<(String, u64)>, StorageError> {
        let objects: Vec<ObjectInfo> = self.list_object_infos(bucket, prefix).await?;
        Ok(objects.into_iter().map(|o| (o.key, o.size)).collect())
    }

    /// Key and unquoted ETag of every object under `prefix`.
    pub async fn list_objects_with_etag(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> Result<Vec<(String, String)>, StorageError> {
        let objects: Vec<ObjectInfo> = self.list_object_infos(bucket, prefix).await?;
        Ok(objects
            .into_iter()
            .map(|o| {
                let etag: String = o
                    .etag
                    .map(|e| e.trim_matches('"').to_string())
                    .unwrap_or_default();
                (o.key, etag)
            })
            .collect())
    }

    /// "Directories" directly under `prefix`, using `/` as the delimiter.
    pub async fn list_directories(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> Result<Vec<String>, StorageError> {
        self.client.list_common_prefixes(bucket, prefix, "/").await
    }

    /// Upload a local file and verify the stored object's checksum.
    ///
    /// An existing object at `key` is deleted first, or preserved under a
    /// timestamp-suffixed key when the overwrite policy asks for it. Files
    /// larger than the part size go through a concurrent multipart upload.
    ///
    /// # Arguments
    /// * `local_path` - File to upload
    /// * `bucket` - Destination bucket
    /// * `key` - Destination key
    /// * `options` - Part size, metadata and overwrite settings
    ///
    /// # Errors
    /// Returns `StorageError::ChecksumMismatch` if the transfer succeeded but
    /// the object's ETag does not match the local file.
    pub async fn upload(
        &self,
        local_path: &Path,
        bucket: &str,
        key: &str,
        options: &UploadOptions,
    ) -> Result<UploadOutcome, StorageError> {
        let size: u64 = tokio::fs::metadata(local_path)
            .await
            .map_err(|e| StorageError::io(local_path.display().to_string(), e))?
            .len();
        let part_size_mib: u64 = options.part_size_mib.max(1);
        let part_size_bytes: u64 = part_size_mib * MIB;

        let preserved_as: Option<String> = self.clear_existing(bucket, key, options).await?;

        let mut metadata: HashMap<String, String> = HashMap::new();
        if let Some(uncompressed) = options.uncompressed_size {
            metadata.insert(
                UNCOMPRESSED_SIZE_METADATA_KEY.to_string(),
                uncompressed.to_string(),
            );
        }
        metadata.insert(PART_SIZE_METADATA_KEY.to_string(), part_size_mib.to_string());

        let progress: TransferProgressLogger = TransferProgressLogger::new(&self.logger, size);
        let progress_cb: &TransferProgressCallback = &progress;

        self.logger.info(format!(
            "Uploading {} ({}) to s3://{}/{}",
            local_path.display(),
            rusty_archival_common::human_readable_bytes(size),
            bucket,
            key
        ));

        let (etag, parts): (String, usize) = if needs_multipart(size, part_size_bytes) {
            let part_size: u64 = optimal_part_size(size, part_size_bytes);
            let parts: Vec<PartInfo> = generate_parts(size, part_size);
            let count: usize = parts.len();
            let etag: String = self
                .upload_multipart(
                    local_path,
                    bucket,
                    key,
                    &metadata,
                    parts,
                    options.max_concurrency,
                    progress_cb,
                )
                .await?;
            (etag, count)
        } else {
            let etag: String = self
                .client
                .put_object_from_file(bucket, key, local_path, &metadata, Some(progress_cb))
                .await?;
            (etag, 1)
        };

        let checksum: ChecksumResult = self
            .verify_checksum(local_path, key, &etag, part_size_bytes)
            .await?;

        self.logger.event_info(format!(
            "Uploaded s3://{}/{} ({} parts, checksum {})",
            bucket, key, parts, checksum
        ));

        Ok(UploadOutcome {
            key: key.to_string(),
            bytes: size,
            parts,
            checksum,
            preserved_as,
        })
    }

    /// Download an object into `destination_dir` and verify its checksum.
    ///
    /// The part size recorded at upload time is read back from the object's
    /// metadata so a composite ETag can be reproduced locally. The file is
    /// named after the last segment of `key`.
    ///
    /// # Errors
    /// Returns `StorageError::NotFound` for a missing object and
    /// `StorageError::ChecksumMismatch` for a corrupted transfer. The partial
    /// file is removed on failure.
    pub async fn download(
        &self,
        bucket: &str,
        key: &str,
        destination_dir: &Path,
        options: &DownloadOptions,
    ) -> Result<DownloadOutcome, StorageError> {
        let metadata: ObjectMetadata = self
            .object_metadata(bucket, key)
            .await?
            .ok_or_else(|| StorageError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })?;

        let file_name: &str = key.rsplit('/').next().unwrap_or(key);
        if file_name.is_empty() {
            return Err(StorageError::Other {
                message: format!("Cannot download prefix-like key {} as a file", key),
            });
        }

        tokio::fs::create_dir_all(destination_dir)
            .await
            .map_err(|e| StorageError::io(destination_dir.display().to_string(), e))?;
        let target: PathBuf = destination_dir.join(file_name);

        let part_size_bytes: u64 = self.recorded_part_size_mib(key, &metadata, options) * MIB;
        let part_size: u64 = optimal_part_size(metadata.size, part_size_bytes);

        let progress: TransferProgressLogger =
            TransferProgressLogger::new(&self.logger, metadata.size);
        let progress_cb: &TransferProgressCallback = &progress;

        self.logger.info(format!(
            "Downloading s3://{}/{} ({}) to {}",
            bucket,
            key,
            rusty_archival_common::human_readable_bytes(metadata.size),
            target.display()
        ));

        let result: Result<ChecksumResult, StorageError> = async {
            if needs_multipart(metadata.size, part_size) {
                self.download_ranges(
                    bucket,
                    key,
                    &target,
                    metadata.size,
                    part_size,
                    options.max_concurrency,
                    progress_cb,
                )
                .await?;
            } else {
                self.client
                    .get_object_to_file(bucket, key, &target, Some(progress_cb))
                    .await?;
            }

            let etag: &str = metadata.etag.as_deref().ok_or_else(|| StorageError::Other {
                message: format!("Object {} has no ETag to verify against", key),
            })?;
            self.verify_checksum(&target, key, etag, part_size_bytes).await
        }
        .await;

        match result {
            Ok(checksum) => {
                self.logger.event_info(format!(
                    "Downloaded s3://{}/{} to {} (checksum {})",
                    bucket,
                    key,
                    target.display(),
                    checksum
                ));
                Ok(DownloadOutcome {
                    path: target,
                    bytes: metadata.size,
                    checksum,
                })
            }
            Err(err) => {
                if let Err(e) = tokio::fs::remove_file(&target).await {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        self.logger.warn(format!(
                            "Failed to remove partial download {}: {}",
                            target.display(),
                            e
                        ));
                    }
                }
                Err(err)
            }
        }
    }

    /// Delete one object.
    pub async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        self.client.delete_object(bucket, key).await?;
        self.logger.info(format!("Deleted s3://{}/{}", bucket, key));
        Ok(())
    }

    /// Delete every object under `prefix`.
    ///
    /// # Returns
    /// Number of objects deleted.
    pub async fn delete_prefix(&self, bucket: &str, prefix: &str) -> Result<usize, StorageError> {
        let keys: Vec<String> = self.list_objects(bucket, prefix).await?;
        for key in &keys {
            self.client.delete_object(bucket, key).await?;
            tracing::debug!(bucket, key = %key, "deleted object");
        }
        self.logger.info(format!(
            "Deleted {} objects under s3://{}/{}",
            keys.len(),
            bucket,
            prefix
        ));
        Ok(keys.len())
    }

    /// Remove or preserve an object already stored at `key`.
    ///
    /// # Returns
    /// The key a preserved copy was written to.
    async fn clear_existing(
        &self,
        bucket: &str,
        key: &str,
        options: &UploadOptions,
    ) -> Result<Option<String>, StorageError> {
        let Some(existing) = self.object_metadata(bucket, key).await? else {
            return Ok(None);
        };

        let preserved_as: Option<String> = match options.overwrite_policy {
            OverwritePolicy::Overwrite => None,
            OverwritePolicy::PreserveExisting => {
                let target: String = preserved_key(key, existing.last_modified_ms);
                if existing.size > options.copy_threshold {
                    self.multipart_copy(bucket, key, &target, &existing, options)
                        .await?;
                } else {
                    self.client.copy_object(bucket, key, &target).await?;
                }
                self.logger.info(format!(
                    "Preserved existing s3://{}/{} as {}",
                    bucket, key, target
                ));
                Some(target)
            }
        };

        self.client.delete_object(bucket, key).await?;
        Ok(preserved_as)
    }

    /// Server-side copy of a large object, part by part.
    async fn multipart_copy(
        &self,
        bucket: &str,
        source_key: &str,
        destination_key: &str,
        source: &ObjectMetadata,
        options: &UploadOptions,
    ) -> Result<(), StorageError> {
        let part_size: u64 = optimal_part_size(source.size, options.part_size_mib.max(1) * MIB);
        let parts: Vec<PartInfo> = generate_parts(source.size, part_size);
        let upload_id: String = self
            .client
            .create_multipart_upload(bucket, destination_key, &source.user_metadata)
            .await?;

        let results: Vec<Result<CompletedPart, StorageError>> = stream::iter(parts)
            .map(|part| {
                let upload_id: &str = &upload_id;
                async move {
                    let etag: String = self
                        .client
                        .upload_part_copy(
                            bucket,
                            source_key,
                            destination_key,
                            upload_id,
                            part.number,
                            part.offset,
                            part.offset + part.length - 1,
                        )
                        .await?;
                    Ok(CompletedPart {
                        part_number: part.number,
                        etag,
                    })
                }
            })
            .buffer_unordered(options.max_concurrency.max(1))
            .collect()
            .await;

        self.finish_multipart(bucket, destination_key, &upload_id, results)
            .await
            .map(|_| ())
    }

    /// Upload `parts` of a file concurrently and assemble them.
    #[allow(clippy::too_many_arguments)]
    async fn upload_multipart(
        &self,
        local_path: &Path,
        bucket: &str,
        key: &str,
        metadata: &HashMap<String, String>,
        parts: Vec<PartInfo>,
        max_concurrency: usize,
        progress: &TransferProgressCallback,
    ) -> Result<String, StorageError> {
        let upload_id: String = self
            .client
            .create_multipart_upload(bucket, key, metadata)
            .await?;
        tracing::debug!(bucket, key, upload_id = %upload_id, parts = parts.len(), "multipart upload started");

        let results: Vec<Result<CompletedPart, StorageError>> = stream::iter(parts)
            .map(|part| {
                let upload_id: &str = &upload_id;
                async move {
                    let etag: String = self
                        .client
                        .upload_part_from_file(
                            bucket,
                            key,
                            upload_id,
                            part.number,
                            local_path,
                            part.offset,
                            part.length,
                            Some(progress),
                        )
                        .await?;
                    Ok(CompletedPart {
                        part_number: part.number,
                        etag,
                    })
                }
            })
            .buffer_unordered(max_concurrency.max(1))
            .collect()
            .await;

        self.finish_multipart(bucket, key, &upload_id, results).await
    }

    /// Complete a multipart upload, or abort it if any part failed.
    async fn finish_multipart(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        results: Vec<Result<CompletedPart, StorageError>>,
    ) -> Result<String, StorageError> {
        let completed: Result<Vec<CompletedPart>, StorageError> = results.into_iter().collect();
        let outcome: Result<String, StorageError> = match completed {
            Ok(mut parts) => {
                parts.sort_by_key(|p| p.part_number);
                self.client
                    .complete_multipart_upload(bucket, key, upload_id, &parts)
                    .await
            }
            Err(err) => Err(err),
        };

        if outcome.is_err() {
            if let Err(abort_err) = self
                .client
                .abort_multipart_upload(bucket, key, upload_id)
                .await
            {
                self.logger.warn(format!(
                    "Failed to abort multipart upload {} for {}: {}",
                    upload_id, key, abort_err
                ));
            }
        }
        outcome
    }

    /// Fetch an object in ranges into a pre-sized file.
    #[allow(clippy::too_many_arguments)]
    async fn download_ranges(
        &self,
        bucket: &str,
        key: &str,
        target: &Path,
        size: u64,
        part_size: u64,
        max_concurrency: usize,
        progress: &TransferProgressCallback,
    ) -> Result<(), StorageError> {
        let file: tokio::fs::File = tokio::fs::File::create(target)
            .await
            .map_err(|e| StorageError::io(target.display().to_string(), e))?;
        file.set_len(size)
            .await
            .map_err(|e| StorageError::io(target.display().to_string(), e))?;
        drop(file);

        let results: Vec<Result<(), StorageError>> = stream::iter(generate_parts(size, part_size))
            .map(|part| async move {
                self.client
                    .get_object_range_to_file(
                        bucket,
                        key,
                        target,
                        part.offset,
                        part.length,
                        Some(progress),
                    )
                    .await
            })
            .buffer_unordered(max_concurrency.max(1))
            .collect()
            .await;

        results.into_iter().collect()
    }

    /// Part size in MiB recorded on the object, or the configured default.
    fn recorded_part_size_mib(
        &self,
        key: &str,
        metadata: &ObjectMetadata,
        options: &DownloadOptions,
    ) -> u64 {
        let default: u64 = options.default_part_size_mib.max(1);
        match metadata_tag(metadata, PART_SIZE_METADATA_KEY) {
            Some(value) => match value.trim().parse::<u64>() {
                Ok(mib) if mib > 0 => mib,
                _ => {
                    self.logger.error(format!(
                        "Invalid {} tag '{}' on {}; using {} MiB",
                        PART_SIZE_METADATA_KEY, value, key, default
                    ));
                    default
                }
            },
            None => {
                self.logger.debug(format!(
                    "No {} tag on {}; using {} MiB",
                    PART_SIZE_METADATA_KEY, key, default
                ));
                default
            }
        }
    }

    /// Compare the local file against an ETag.
    async fn verify_checksum(
        &self,
        local_path: &Path,
        key: &str,
        etag: &str,
        part_size_bytes: u64,
    ) -> Result<ChecksumResult, StorageError> {
        let remote: ChecksumResult = ChecksumResult::from_etag(etag);
        let path: PathBuf = local_path.to_path_buf();
        let expected: ChecksumResult = remote.clone();
        let local: ChecksumResult = tokio::task::spawn_blocking(move || {
            ChecksumResult::local_for(&path, &expected, part_size_bytes)
        })
        .await
        .map_err(|e| StorageError::Other {
            message: format!("Checksum task failed: {}", e),
        })??;

        if local != remote {
            let err: StorageError = StorageError::ChecksumMismatch {
                key: key.to_string(),
                local: local.to_string(),
                remote: remote.to_string(),
            };
            self.logger.event_error(&err);
            return Err(err);
        }
        Ok(local)
    }
}

/// Case-insensitive lookup of a user metadata tag.
fn metadata_tag(metadata: &ObjectMetadata, tag: &str) -> Option<String> {
    metadata
        .user_metadata
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(tag))
        .map(|(_, value)| value.clone())
}

/// Key an overwritten object is preserved under: `<key>.<yyyy-MM-dd.HH-mm-ss-SSS>`
/// from its last-modified time in UTC.
pub fn preserved_key(key: &str, last_modified_ms: Option<i64>) -> String {
    let timestamp: DateTime<Utc> = last_modified_ms
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .unwrap_or_else(Utc::now);
    format!("{}.{}", key, timestamp.format(PRESERVED_SUFFIX_FORMAT))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preserved_key_uses_utc_millis() {
        // 2024-03-05T06:07:08.009Z
        let ms: i64 = 1_709_618_828_009;
        assert_eq!(
            preserved_key("archives/run.tar.gz", Some(ms)),
            "archives/run.tar.gz.2024-03-05.06-07-08-009"
        );
    }

    #[test]
    fn test_metadata_tag_is_case_insensitive() {
        let mut metadata: ObjectMetadata = ObjectMetadata::default();
        metadata
            .user_metadata
            .insert("PartSize".to_string(), "16".to_string());
        assert_eq!(metadata_tag(&metadata, "partsize"), Some("16".to_string()));
        assert_eq!(metadata_tag(&metadata, "uncompressedsize"), None);
    }
}
