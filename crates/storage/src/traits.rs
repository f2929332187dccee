//! Storage traits/interfaces for object storage operations.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use rusty_archival_common::ProgressCallback;

use crate::error::StorageError;
use crate::types::TransferProgress;

/// Progress callback for object transfers.
pub type TransferProgressCallback = dyn ProgressCallback<TransferProgress>;

/// Information about an object from list operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    /// Object key.
    pub key: String,
    /// Object size in bytes.
    pub size: u64,
    /// Last modified timestamp (Unix epoch milliseconds).
    pub last_modified_ms: Option<i64>,
    /// ETag as reported by the backend, surrounding quotes included.
    pub etag: Option<String>,
}

/// Object metadata from a head request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectMetadata {
    /// Object size in bytes.
    pub size: u64,
    /// Last modified timestamp (Unix epoch milliseconds).
    pub last_modified_ms: Option<i64>,
    /// ETag as reported by the backend.
    pub etag: Option<String>,
    /// User-defined metadata, keys lowercased.
    pub user_metadata: HashMap<String, String>,
}

/// One page of a listing.
#[derive(Debug, Clone, Default)]
pub struct ObjectPage {
    /// Objects in this page.
    pub objects: Vec<ObjectInfo>,
    /// Token for the next page, `None` when the listing is exhausted.
    pub next_token: Option<String>,
}

/// A finished part of a multipart upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPart {
    /// One-based part number.
    pub part_number: u32,
    /// ETag returned for the part.
    pub etag: String,
}

/// Low-level object storage operations - implemented by each backend.
///
/// Absence is never an error for probes: `head_object_with_metadata`
/// returns `None` and `bucket_exists` returns `false`.
#[async_trait]
pub trait StorageClient: Send + Sync {
    /// List all buckets visible to the caller.
    async fn list_buckets(&self) -> Result<Vec<String>, StorageError>;

    /// Create a bucket.
    async fn create_bucket(&self, bucket: &str) -> Result<(), StorageError>;

    /// Check whether a bucket exists.
    async fn bucket_exists(&self, bucket: &str) -> Result<bool, StorageError>;

    /// Fetch object metadata. Returns None if the object doesn't exist.
    async fn head_object_with_metadata(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<Option<ObjectMetadata>, StorageError>;

    /// Fetch one page of objects under `prefix`.
    async fn list_objects_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation_token: Option<&str>,
    ) -> Result<ObjectPage, StorageError>;

    /// List the common prefixes directly under `prefix` for a delimiter.
    async fn list_common_prefixes(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: &str,
    ) -> Result<Vec<String>, StorageError>;

    /// Upload a whole file as one object.
    ///
    /// # Returns
    /// The ETag of the new object.
    async fn put_object_from_file(
        &self,
        bucket: &str,
        key: &str,
        file_path: &Path,
        metadata: &HashMap<String, String>,
        progress: Option<&TransferProgressCallback>,
    ) -> Result<String, StorageError>;

    /// Start a multipart upload.
    ///
    /// # Returns
    /// The upload id.
    async fn create_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        metadata: &HashMap<String, String>,
    ) -> Result<String, StorageError>;

    /// Upload a byte range of a file as one part.
    ///
    /// # Returns
    /// The ETag of the part.
    #[allow(clippy::too_many_arguments)]
    async fn upload_part_from_file(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
        file_path: &Path,
        offset: u64,
        length: u64,
        progress: Option<&TransferProgressCallback>,
    ) -> Result<String, StorageError>;

    /// Copy an inclusive byte range of an existing object as one part.
    #[allow(clippy::too_many_arguments)]
    async fn upload_part_copy(
        &self,
        bucket: &str,
        source_key: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
        first_byte: u64,
        last_byte: u64,
    ) -> Result<String, StorageError>;

    /// Complete a multipart upload from its parts, in part-number order.
    ///
    /// # Returns
    /// The ETag of the assembled object.
    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<String, StorageError>;

    /// Abort a multipart upload and discard its parts.
    async fn abort_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<(), StorageError>;

    /// Server-side copy of a whole object, keeping its metadata.
    async fn copy_object(
        &self,
        bucket: &str,
        source_key: &str,
        destination_key: &str,
    ) -> Result<(), StorageError>;

    /// Download an object to a file, replacing it.
    async fn get_object_to_file(
        &self,
        bucket: &str,
        key: &str,
        file_path: &Path,
        progress: Option<&TransferProgressCallback>,
    ) -> Result<(), StorageError>;

    /// Download a byte range of an object into an existing file at the same offset.
    async fn get_object_range_to_file(
        &self,
        bucket: &str,
        key: &str,
        file_path: &Path,
        offset: u64,
        length: u64,
        progress: Option<&TransferProgressCallback>,
    ) -> Result<(), StorageError>;

    /// Delete an object. Deleting a missing object succeeds.
    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StorageError>;
}
