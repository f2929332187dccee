//! In-memory `StorageClient` with S3 ETag semantics.
//!
//! Single-request objects get the quoted hex MD5 of their content as ETag;
//! multipart objects get `md5(concat(part md5s))-N`. Listings are paginated
//! with a configurable page size, and every request is counted so tests can
//! assert that a transfer did or did not happen.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::SeekFrom;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use md5::{Digest, Md5};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use rusty_archival_common::MIB;

use crate::error::StorageError;
use crate::traits::{
    CompletedPart, ObjectInfo, ObjectMetadata, ObjectPage, StorageClient, TransferProgressCallback,
};
use crate::types::{OperationType, TransferProgress};

/// Default number of keys per listing page.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Granularity of progress reports.
const PROGRESS_SLICE: usize = MIB as usize;

/// Requests served, by kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestCounts {
    pub head: u64,
    pub list: u64,
    pub put: u64,
    pub upload_part: u64,
    pub copy: u64,
    pub get: u64,
    pub delete: u64,
}

/// Failure injected into the next upload that would store an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadFault {
    /// Reject the request with a 500 service error.
    Reject,
    /// Store the object with one byte flipped, as if damaged in transit.
    Corrupt,
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    etag: String,
    user_metadata: HashMap<String, String>,
    last_modified_ms: i64,
}

#[derive(Debug)]
struct PendingUpload {
    bucket: String,
    key: String,
    user_metadata: HashMap<String, String>,
    parts: BTreeMap<u32, Vec<u8>>,
}

#[derive(Debug, Default)]
struct MemoryState {
    buckets: BTreeMap<String, BTreeMap<String, StoredObject>>,
    uploads: HashMap<String, PendingUpload>,
    counts: RequestCounts,
    next_upload_id: u64,
    upload_fault: Option<UploadFault>,
}

/// In-memory object store. Clones share the same state.
#[derive(Debug, Clone)]
pub struct MemoryStorageClient {
    state: Arc<Mutex<MemoryState>>,
    page_size: usize,
}

impl Default for MemoryStorageClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorageClient {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState::default())),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Set the listing page size (minimum 1).
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Create a bucket if it doesn't exist.
    pub fn with_bucket(self, bucket: &str) -> Self {
        self.lock().buckets.entry(bucket.to_string()).or_default();
        self
    }

    /// Store an object directly, bypassing request counters.
    pub fn insert_object(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        user_metadata: HashMap<String, String>,
    ) {
        let etag: String = quoted_md5(&data);
        self.lock()
            .buckets
            .entry(bucket.to_string())
            .or_default()
            .insert(
                key.to_string(),
                StoredObject {
                    data,
                    etag,
                    user_metadata,
                    last_modified_ms: now_ms(),
                },
            );
    }

    /// Content of an object, if present.
    pub fn object_bytes(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.lock()
            .buckets
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .map(|object| object.data.clone())
    }

    /// Stored ETag of an object, quotes included.
    pub fn object_etag(&self, bucket: &str, key: &str) -> Option<String> {
        self.lock()
            .buckets
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .map(|object| object.etag.clone())
    }

    /// Flip one byte of an object's content without updating its ETag.
    ///
    /// # Returns
    /// `false` if the object doesn't exist or is empty.
    pub fn corrupt_object(&self, bucket: &str, key: &str) -> bool {
        let mut state = self.lock();
        match state
            .buckets
            .get_mut(bucket)
            .and_then(|objects| objects.get_mut(key))
        {
            Some(object) if !object.data.is_empty() => {
                flip_middle_byte(&mut object.data);
                true
            }
            _ => false,
        }
    }

    /// Make the next single-part put or multipart completion fail.
    pub fn fail_next_upload(&self, fault: UploadFault) {
        self.lock().upload_fault = Some(fault);
    }

    /// Multipart uploads neither completed nor aborted.
    pub fn pending_upload_count(&self) -> usize {
        self.lock().uploads.len()
    }

    /// Snapshot of the request counters.
    pub fn request_counts(&self) -> RequestCounts {
        self.lock().counts
    }

    /// Number of GET requests served, whole-object and ranged.
    pub fn get_request_count(&self) -> u64 {
        self.lock().counts.get
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn quoted_md5(data: &[u8]) -> String {
    format!("\"{}\"", hex::encode(Md5::digest(data)))
}

fn no_such_bucket(bucket: &str) -> StorageError {
    StorageError::ServiceError {
        message: format!("The specified bucket does not exist: {}", bucket),
        status: Some(404),
        code: Some("NoSuchBucket".to_string()),
        request_id: None,
        retryable: false,
    }
}

fn no_such_upload(upload_id: &str) -> StorageError {
    StorageError::ServiceError {
        message: format!("The specified upload does not exist: {}", upload_id),
        status: Some(404),
        code: Some("NoSuchUpload".to_string()),
        request_id: None,
        retryable: false,
    }
}

fn internal_error() -> StorageError {
    StorageError::ServiceError {
        message: "We encountered an internal error. Please try again.".to_string(),
        status: Some(500),
        code: Some("InternalError".to_string()),
        request_id: None,
        retryable: false,
    }
}

fn flip_middle_byte(data: &mut [u8]) {
    if !data.is_empty() {
        let middle: usize = data.len() / 2;
        data[middle] ^= 0xff;
    }
}

fn not_found(bucket: &str, key: &str) -> StorageError {
    StorageError::NotFound {
        bucket: bucket.to_string(),
        key: key.to_string(),
    }
}

/// Report `length` bytes in slices.
fn report(
    progress: Option<&TransferProgressCallback>,
    operation: OperationType,
    key: &str,
    length: usize,
) -> Result<(), StorageError> {
    let Some(callback) = progress else {
        return Ok(());
    };
    let mut remaining: usize = length;
    while remaining > 0 {
        let slice: usize = remaining.min(PROGRESS_SLICE);
        remaining -= slice;
        let update: TransferProgress = TransferProgress {
            operation,
            key: key.to_string(),
            bytes: slice as u64,
        };
        if !callback.on_progress(&update) {
            return Err(StorageError::Cancelled);
        }
    }
    Ok(())
}

async fn read_range(path: &Path, offset: u64, length: u64) -> Result<Vec<u8>, StorageError> {
    let mut file: tokio::fs::File = tokio::fs::File::open(path)
        .await
        .map_err(|e| StorageError::io(path.display().to_string(), e))?;
    file.seek(SeekFrom::Start(offset))
        .await
        .map_err(|e| StorageError::io(path.display().to_string(), e))?;

    let mut buffer: Vec<u8> = vec![0u8; length as usize];
    file.read_exact(&mut buffer)
        .await
        .map_err(|e| StorageError::io(path.display().to_string(), e))?;
    Ok(buffer)
}

#[async_trait]
impl StorageClient for MemoryStorageClient {
    async fn list_buckets(&self) -> Result<Vec<String>, StorageError> {
        let mut state = self.lock();
        state.counts.list += 1;
        Ok(state.buckets.keys().cloned().collect())
    }

    async fn create_bucket(&self, bucket: &str) -> Result<(), StorageError> {
        let mut state = self.lock();
        state.counts.put += 1;
        if state.buckets.contains_key(bucket) {
            return Err(StorageError::ServiceError {
                message: format!("Bucket already exists: {}", bucket),
                status: Some(409),
                code: Some("BucketAlreadyOwnedByYou".to_string()),
                request_id: None,
                retryable: false,
            });
        }
        state.buckets.insert(bucket.to_string(), BTreeMap::new());
        Ok(())
    }

    async fn bucket_exists(&self, bucket: &str) -> Result<bool, StorageError> {
        let mut state = self.lock();
        state.counts.head += 1;
        Ok(state.buckets.contains_key(bucket))
    }

    async fn head_object_with_metadata(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<Option<ObjectMetadata>, StorageError> {
        let mut state = self.lock();
        state.counts.head += 1;
        Ok(state
            .buckets
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .map(|object| ObjectMetadata {
                size: object.data.len() as u64,
                last_modified_ms: Some(object.last_modified_ms),
                etag: Some(object.etag.clone()),
                user_metadata: object.user_metadata.clone(),
            }))
    }

    async fn list_objects_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation_token: Option<&str>,
    ) -> Result<ObjectPage, StorageError> {
        let mut state = self.lock();
        state.counts.list += 1;
        let objects: &BTreeMap<String, StoredObject> =
            state.buckets.get(bucket).ok_or_else(|| no_such_bucket(bucket))?;

        let mut matching = objects
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .filter(|(key, _)| continuation_token.map_or(true, |token| key.as_str() > token));

        let page: Vec<ObjectInfo> = matching
            .by_ref()
            .take(self.page_size)
            .map(|(key, object)| ObjectInfo {
                key: key.clone(),
                size: object.data.len() as u64,
                last_modified_ms: Some(object.last_modified_ms),
                etag: Some(object.etag.clone()),
            })
            .collect();

        let next_token: Option<String> = if matching.next().is_some() {
            page.last().map(|o| o.key.clone())
        } else {
            None
        };

        Ok(ObjectPage {
            objects: page,
            next_token,
        })
    }

    async fn list_common_prefixes(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: &str,
    ) -> Result<Vec<String>, StorageError> {
        let mut state = self.lock();
        state.counts.list += 1;
        let objects: &BTreeMap<String, StoredObject> =
            state.buckets.get(bucket).ok_or_else(|| no_such_bucket(bucket))?;

        let prefixes: BTreeSet<String> = objects
            .keys()
            .filter_map(|key| {
                let rest: &str = key.strip_prefix(prefix)?;
                let index: usize = rest.find(delimiter)?;
                Some(format!("{}{}", prefix, &rest[..index + delimiter.len()]))
            })
            .collect();
        Ok(prefixes.into_iter().collect())
    }

    async fn put_object_from_file(
        &self,
        bucket: &str,
        key: &str,
        file_path: &Path,
        metadata: &HashMap<String, String>,
        progress: Option<&TransferProgressCallback>,
    ) -> Result<String, StorageError> {
        let mut data: Vec<u8> = tokio::fs::read(file_path)
            .await
            .map_err(|e| StorageError::io(file_path.display().to_string(), e))?;
        report(progress, OperationType::Uploading, key, data.len())?;

        let mut state = self.lock();
        state.counts.put += 1;
        match state.upload_fault.take() {
            Some(UploadFault::Reject) => return Err(internal_error()),
            Some(UploadFault::Corrupt) => flip_middle_byte(&mut data),
            None => {}
        }
        let objects: &mut BTreeMap<String, StoredObject> = state
            .buckets
            .get_mut(bucket)
            .ok_or_else(|| no_such_bucket(bucket))?;

        let etag: String = quoted_md5(&data);
        objects.insert(
            key.to_string(),
            StoredObject {
                data,
                etag: etag.clone(),
                user_metadata: metadata.clone(),
                last_modified_ms: now_ms(),
            },
        );
        Ok(etag)
    }

    async fn create_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        metadata: &HashMap<String, String>,
    ) -> Result<String, StorageError> {
        let mut state = self.lock();
        state.counts.put += 1;
        if !state.buckets.contains_key(bucket) {
            return Err(no_such_bucket(bucket));
        }
        state.next_upload_id += 1;
        let upload_id: String = format!("upload-{}", state.next_upload_id);
        state.uploads.insert(
            upload_id.clone(),
            PendingUpload {
                bucket: bucket.to_string(),
                key: key.to_string(),
                user_metadata: metadata.clone(),
                parts: BTreeMap::new(),
            },
        );
        Ok(upload_id)
    }

    async fn upload_part_from_file(
        &self,
        _bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
        file_path: &Path,
        offset: u64,
        length: u64,
        progress: Option<&TransferProgressCallback>,
    ) -> Result<String, StorageError> {
        let data: Vec<u8> = read_range(file_path, offset, length).await?;
        report(progress, OperationType::Uploading, key, data.len())?;

        let mut state = self.lock();
        state.counts.upload_part += 1;
        let upload: &mut PendingUpload = state
            .uploads
            .get_mut(upload_id)
            .ok_or_else(|| no_such_upload(upload_id))?;
        let etag: String = quoted_md5(&data);
        upload.parts.insert(part_number, data);
        Ok(etag)
    }

    async fn upload_part_copy(
        &self,
        bucket: &str,
        source_key: &str,
        _key: &str,
        upload_id: &str,
        part_number: u32,
        first_byte: u64,
        last_byte: u64,
    ) -> Result<String, StorageError> {
        let mut state = self.lock();
        state.counts.copy += 1;
        let source: &StoredObject = state
            .buckets
            .get(bucket)
            .and_then(|objects| objects.get(source_key))
            .ok_or_else(|| not_found(bucket, source_key))?;

        let end: usize = (last_byte as usize + 1).min(source.data.len());
        let data: Vec<u8> = source.data[(first_byte as usize).min(end)..end].to_vec();
        let etag: String = quoted_md5(&data);

        let upload: &mut PendingUpload = state
            .uploads
            .get_mut(upload_id)
            .ok_or_else(|| no_such_upload(upload_id))?;
        upload.parts.insert(part_number, data);
        Ok(etag)
    }

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<String, StorageError> {
        let mut state = self.lock();
        state.counts.put += 1;
        let fault: Option<UploadFault> = state.upload_fault.take();
        if fault == Some(UploadFault::Reject) {
            return Err(internal_error());
        }
        let upload: PendingUpload = state
            .uploads
            .remove(upload_id)
            .ok_or_else(|| no_such_upload(upload_id))?;
        if upload.bucket != bucket || upload.key != key {
            return Err(no_such_upload(upload_id));
        }

        let mut chunks: Vec<Vec<u8>> = Vec::with_capacity(parts.len());
        for part in parts {
            let bytes: &Vec<u8> = upload.parts.get(&part.part_number).ok_or_else(|| {
                StorageError::ServiceError {
                    message: format!("Part {} was never uploaded", part.part_number),
                    status: Some(400),
                    code: Some("InvalidPart".to_string()),
                    request_id: None,
                    retryable: false,
                }
            })?;
            if quoted_md5(bytes) != part.etag {
                return Err(StorageError::ServiceError {
                    message: format!("ETag mismatch for part {}", part.part_number),
                    status: Some(400),
                    code: Some("InvalidPart".to_string()),
                    request_id: None,
                    retryable: false,
                });
            }
            chunks.push(bytes.clone());
        }
        if let (Some(UploadFault::Corrupt), Some(first)) = (fault, chunks.first_mut()) {
            flip_middle_byte(first);
        }

        let mut data: Vec<u8> = Vec::new();
        let mut digests: Vec<u8> = Vec::with_capacity(parts.len() * 16);
        for chunk in &chunks {
            digests.extend_from_slice(&Md5::digest(chunk));
            data.extend_from_slice(chunk);
        }
        let etag: String = format!(
            "\"{}-{}\"",
            hex::encode(Md5::digest(&digests)),
            parts.len()
        );
        let objects: &mut BTreeMap<String, StoredObject> = state
            .buckets
            .get_mut(bucket)
            .ok_or_else(|| no_such_bucket(bucket))?;
        objects.insert(
            key.to_string(),
            StoredObject {
                data,
                etag: etag.clone(),
                user_metadata: upload.user_metadata,
                last_modified_ms: now_ms(),
            },
        );
        Ok(etag)
    }

    async fn abort_multipart_upload(
        &self,
        _bucket: &str,
        _key: &str,
        upload_id: &str,
    ) -> Result<(), StorageError> {
        let mut state = self.lock();
        state.counts.delete += 1;
        state
            .uploads
            .remove(upload_id)
            .map(|_| ())
            .ok_or_else(|| no_such_upload(upload_id))
    }

    async fn copy_object(
        &self,
        bucket: &str,
        source_key: &str,
        destination_key: &str,
    ) -> Result<(), StorageError> {
        let mut state = self.lock();
        state.counts.copy += 1;
        let objects: &mut BTreeMap<String, StoredObject> = state
            .buckets
            .get_mut(bucket)
            .ok_or_else(|| no_such_bucket(bucket))?;
        let mut copy: StoredObject = objects
            .get(source_key)
            .cloned()
            .ok_or_else(|| not_found(bucket, source_key))?;
        copy.last_modified_ms = now_ms();
        objects.insert(destination_key.to_string(), copy);
        Ok(())
    }

    async fn get_object_to_file(
        &self,
        bucket: &str,
        key: &str,
        file_path: &Path,
        progress: Option<&TransferProgressCallback>,
    ) -> Result<(), StorageError> {
        let data: Vec<u8> = {
            let mut state = self.lock();
            state.counts.get += 1;
            state
                .buckets
                .get(bucket)
                .and_then(|objects| objects.get(key))
                .map(|object| object.data.clone())
                .ok_or_else(|| not_found(bucket, key))?
        };

        tokio::fs::write(file_path, &data)
            .await
            .map_err(|e| StorageError::io(file_path.display().to_string(), e))?;
        report(progress, OperationType::Downloading, key, data.len())
    }

    async fn get_object_range_to_file(
        &self,
        bucket: &str,
        key: &str,
        file_path: &Path,
        offset: u64,
        length: u64,
        progress: Option<&TransferProgressCallback>,
    ) -> Result<(), StorageError> {
        let data: Vec<u8> = {
            let mut state = self.lock();
            state.counts.get += 1;
            let object: &StoredObject = state
                .buckets
                .get(bucket)
                .and_then(|objects| objects.get(key))
                .ok_or_else(|| not_found(bucket, key))?;
            let start: usize = (offset as usize).min(object.data.len());
            let end: usize = (offset.saturating_add(length) as usize).min(object.data.len());
            object.data[start..end].to_vec()
        };

        let mut file: tokio::fs::File = tokio::fs::OpenOptions::new()
            .write(true)
            .open(file_path)
            .await
            .map_err(|e| StorageError::io(file_path.display().to_string(), e))?;
        file.seek(SeekFrom::Start(offset))
            .await
            .map_err(|e| StorageError::io(file_path.display().to_string(), e))?;
        file.write_all(&data)
            .await
            .map_err(|e| StorageError::io(file_path.display().to_string(), e))?;
        file.flush()
            .await
            .map_err(|e| StorageError::io(file_path.display().to_string(), e))?;
        report(progress, OperationType::Downloading, key, data.len())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        let mut state = self.lock();
        state.counts.delete += 1;
        let objects: &mut BTreeMap<String, StoredObject> = state
            .buckets
            .get_mut(bucket)
            .ok_or_else(|| no_such_bucket(bucket))?;
        objects.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pagination_returns_every_key_once() {
        let client: MemoryStorageClient = MemoryStorageClient::new()
            .with_page_size(2)
            .with_bucket("b");
        for i in 0..5 {
            client.insert_object("b", &format!("p/{}", i), vec![i as u8], HashMap::new());
        }
        client.insert_object("b", "other", vec![9], HashMap::new());

        let mut keys: Vec<String> = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let page: ObjectPage = client
                .list_objects_page("b", "p/", token.as_deref())
                .await
                .unwrap();
            assert!(page.objects.len() <= 2);
            keys.extend(page.objects.into_iter().map(|o| o.key));
            match page.next_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }
        assert_eq!(keys, vec!["p/0", "p/1", "p/2", "p/3", "p/4"]);
        assert_eq!(client.request_counts().list, 3);
    }

    #[tokio::test]
    async fn test_common_prefixes() {
        let client: MemoryStorageClient = MemoryStorageClient::new().with_bucket("b");
        for key in ["a/x/1", "a/x/2", "a/y/1", "a/z", "b/q"] {
            client.insert_object("b", key, vec![], HashMap::new());
        }
        let prefixes: Vec<String> = client.list_common_prefixes("b", "a/", "/").await.unwrap();
        assert_eq!(prefixes, vec!["a/x/", "a/y/"]);
    }

    #[tokio::test]
    async fn test_multipart_etag_is_composite() {
        let dir: tempfile::TempDir = tempfile::tempdir().unwrap();
        let path: std::path::PathBuf = dir.path().join("f");
        std::fs::write(&path, b"aaaabbbbcc").unwrap();

        let client: MemoryStorageClient = MemoryStorageClient::new().with_bucket("b");
        let upload_id: String = client
            .create_multipart_upload("b", "k", &HashMap::new())
            .await
            .unwrap();
        let mut parts: Vec<CompletedPart> = Vec::new();
        for (number, offset, length) in [(1u32, 0u64, 4u64), (2, 4, 4), (3, 8, 2)] {
            let etag: String = client
                .upload_part_from_file("b", "k", &upload_id, number, &path, offset, length, None)
                .await
                .unwrap();
            parts.push(CompletedPart {
                part_number: number,
                etag,
            });
        }
        let etag: String = client
            .complete_multipart_upload("b", "k", &upload_id, &parts)
            .await
            .unwrap();

        let mut digests: Vec<u8> = Vec::new();
        for chunk in [&b"aaaa"[..], &b"bbbb"[..], &b"cc"[..]] {
            digests.extend_from_slice(&Md5::digest(chunk));
        }
        assert_eq!(etag, format!("\"{}-3\"", hex::encode(Md5::digest(&digests))));
        assert_eq!(client.object_bytes("b", "k").unwrap(), b"aaaabbbbcc");
        assert_eq!(client.pending_upload_count(), 0);
    }

    #[tokio::test]
    async fn test_upload_fault_applies_once() {
        let dir: tempfile::TempDir = tempfile::tempdir().unwrap();
        let path: std::path::PathBuf = dir.path().join("f");
        std::fs::write(&path, b"payload").unwrap();

        let client: MemoryStorageClient = MemoryStorageClient::new().with_bucket("b");
        client.fail_next_upload(UploadFault::Reject);
        let rejected = client
            .put_object_from_file("b", "k", &path, &HashMap::new(), None)
            .await;
        assert!(matches!(
            rejected,
            Err(StorageError::ServiceError { status: Some(500), .. })
        ));
        assert!(client.object_bytes("b", "k").is_none());

        client.fail_next_upload(UploadFault::Corrupt);
        let etag: String = client
            .put_object_from_file("b", "k", &path, &HashMap::new(), None)
            .await
            .unwrap();
        assert_ne!(etag, quoted_md5(b"payload"));
        assert_eq!(client.object_etag("b", "k").unwrap(), etag);

        let etag: String = client
            .put_object_from_file("b", "k", &path, &HashMap::new(), None)
            .await
            .unwrap();
        assert_eq!(etag, quoted_md5(b"payload"));
    }
}
