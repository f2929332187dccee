//! AWS SDK S3 client implementation.

use std::collections::HashMap;
use std::io::SeekFrom;
use std::path::Path;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::provider::ProvideCredentials;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::primitives::{ByteStream, Length};
use aws_sdk_s3::types::{
    BucketLocationConstraint, CompletedMultipartUpload, CreateBucketConfiguration,
};
use aws_sdk_s3::Client as S3Client;
use tokio::fs::File;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};

use rusty_archival_storage::{
    CompletedPart, ObjectInfo, ObjectMetadata, ObjectPage, OperationType, StorageClient,
    StorageError, StorageSettings, TransferProgress, TransferProgressCallback, DEFAULT_REGION,
};

use crate::error::{credentials_error, from_sdk, status_of};

/// Provider name attached to static credentials.
const CREDENTIALS_PROVIDER_NAME: &str = "rusty-archival";

/// StorageClient implementation using AWS SDK for Rust.
///
/// Works against AWS S3 and S3-compatible services. A custom endpoint
/// switches the client to path-style addressing.
pub struct CrtStorageClient {
    /// The underlying S3 client.
    s3_client: S3Client,
    /// Region, used as location constraint when creating buckets.
    region: String,
}

impl CrtStorageClient {
    /// Create a new client.
    ///
    /// Static credentials from `settings` take precedence over the ambient
    /// credential chain. Credentials are resolved once up front so a
    /// misconfigured environment fails here rather than on the first request.
    ///
    /// # Arguments
    /// * `settings` - Region, endpoint, addressing style and credentials
    ///
    /// # Errors
    /// Returns `StorageError::InvalidConfig` if no credentials can be resolved.
    pub async fn new(settings: StorageSettings) -> Result<Self, StorageError> {
        let config_loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(settings.region.clone()));

        let config_loader = if let Some(ref creds) = settings.credentials {
            let credentials: Credentials = Credentials::new(
                &creds.access_key_id,
                &creds.secret_access_key,
                creds.session_token.clone(),
                None,
                CREDENTIALS_PROVIDER_NAME,
            );
            config_loader.credentials_provider(credentials)
        } else {
            config_loader
        };

        let sdk_config = config_loader.load().await;

        let provider = sdk_config
            .credentials_provider()
            .ok_or_else(|| credentials_error("no credentials provider configured"))?;
        provider
            .provide_credentials()
            .await
            .map_err(credentials_error)?;

        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(settings.path_style());
        if let Some(ref endpoint) = settings.endpoint_url {
            builder = builder.endpoint_url(endpoint);
        }

        tracing::debug!(
            region = %settings.region,
            endpoint = ?settings.endpoint_url,
            path_style = settings.path_style(),
            "created S3 client"
        );

        Ok(Self {
            s3_client: S3Client::from_conf(builder.build()),
            region: settings.region,
        })
    }

    /// Create a client from an existing S3Client.
    ///
    /// # Arguments
    /// * `s3_client` - Pre-configured S3 client
    /// * `region` - Region used when creating buckets
    pub fn from_client(s3_client: S3Client, region: impl Into<String>) -> Self {
        Self {
            s3_client,
            region: region.into(),
        }
    }
}

/// `x-amz-copy-source` value for an object, percent-encoding the key.
fn copy_source(bucket: &str, key: &str) -> String {
    let mut encoded: String = String::with_capacity(key.len());
    for byte in key.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                encoded.push(byte as char)
            }
            _ => encoded.push_str(&format!("%{:02X}", byte)),
        }
    }
    format!("{}/{}", bucket, encoded)
}

/// HTTP range header for `length` bytes starting at `offset`.
fn byte_range(offset: u64, length: u64) -> String {
    format!("bytes={}-{}", offset, offset + length.max(1) - 1)
}

fn report(
    progress: Option<&TransferProgressCallback>,
    operation: OperationType,
    key: &str,
    bytes: u64,
) -> Result<(), StorageError> {
    match progress {
        Some(callback) => {
            let update: TransferProgress = TransferProgress {
                operation,
                key: key.to_string(),
                bytes,
            };
            if callback.on_progress(&update) {
                Ok(())
            } else {
                Err(StorageError::Cancelled)
            }
        }
        None => Ok(()),
    }
}

fn to_millis(timestamp: Option<&aws_sdk_s3::primitives::DateTime>) -> Option<i64> {
    timestamp.and_then(|dt| dt.to_millis().ok())
}

/// Stream a GET body into `file`, reporting each chunk.
async fn write_body(
    mut body: ByteStream,
    file: &mut File,
    file_path: &Path,
    key: &str,
    progress: Option<&TransferProgressCallback>,
) -> Result<(), StorageError> {
    while let Some(chunk) = body.try_next().await.map_err(|e| StorageError::NetworkError {
        message: e.to_string(),
        retryable: true,
    })? {
        file.write_all(&chunk)
            .await
            .map_err(|e| StorageError::io(file_path.display().to_string(), e))?;
        report(progress, OperationType::Downloading, key, chunk.len() as u64)?;
    }

    file.flush()
        .await
        .map_err(|e| StorageError::io(file_path.display().to_string(), e))
}

#[async_trait]
impl StorageClient for CrtStorageClient {
    async fn list_buckets(&self) -> Result<Vec<String>, StorageError> {
        let output = self.s3_client.list_buckets().send().await.map_err(from_sdk)?;
        Ok(output
            .buckets()
            .iter()
            .filter_map(|b| b.name().map(str::to_string))
            .collect())
    }

    async fn create_bucket(&self, bucket: &str) -> Result<(), StorageError> {
        let mut request = self.s3_client.create_bucket().bucket(bucket);
        if self.region != DEFAULT_REGION {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }
        request.send().await.map_err(from_sdk)?;
        Ok(())
    }

    async fn bucket_exists(&self, bucket: &str) -> Result<bool, StorageError> {
        match self.s3_client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(true),
            Err(err) => {
                let not_found: bool = status_of(&err) == Some(404)
                    || err.as_service_error().is_some_and(|e| e.is_not_found());
                if not_found {
                    Ok(false)
                } else {
                    Err(from_sdk(err))
                }
            }
        }
    }

    async fn head_object_with_metadata(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<Option<ObjectMetadata>, StorageError> {
        match self.s3_client.head_object().bucket(bucket).key(key).send().await {
            Ok(output) => {
                let user_metadata: HashMap<String, String> = output
                    .metadata()
                    .map(|m| {
                        m.iter()
                            .map(|(k, v)| (k.to_ascii_lowercase(), v.clone()))
                            .collect()
                    })
                    .unwrap_or_default();

                Ok(Some(ObjectMetadata {
                    size: output.content_length().map(|l| l as u64).unwrap_or(0),
                    last_modified_ms: to_millis(output.last_modified()),
                    etag: output.e_tag().map(|s| s.to_string()),
                    user_metadata,
                }))
            }
            Err(err) => {
                let not_found: bool = status_of(&err) == Some(404)
                    || err.as_service_error().is_some_and(|e| e.is_not_found());
                if not_found {
                    Ok(None)
                } else {
                    Err(from_sdk(err))
                }
            }
        }
    }

    async fn list_objects_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation_token: Option<&str>,
    ) -> Result<ObjectPage, StorageError> {
        let response = self
            .s3_client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(prefix)
            .set_continuation_token(continuation_token.map(str::to_string))
            .send()
            .await
            .map_err(from_sdk)?;

        let objects: Vec<ObjectInfo> = response
            .contents()
            .iter()
            .map(|obj| ObjectInfo {
                key: obj.key().unwrap_or_default().to_string(),
                size: obj.size().map(|s| s as u64).unwrap_or(0),
                last_modified_ms: to_millis(obj.last_modified()),
                etag: obj.e_tag().map(|s| s.to_string()),
            })
            .collect();

        let next_token: Option<String> = if response.is_truncated() == Some(true) {
            response.next_continuation_token().map(str::to_string)
        } else {
            None
        };

        Ok(ObjectPage {
            objects,
            next_token,
        })
    }

    async fn list_common_prefixes(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: &str,
    ) -> Result<Vec<String>, StorageError> {
        let mut prefixes: Vec<String> = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let response = self
                .s3_client
                .list_objects_v2()
                .bucket(bucket)
                .prefix(prefix)
                .delimiter(delimiter)
                .set_continuation_token(continuation_token.take())
                .send()
                .await
                .map_err(from_sdk)?;

            prefixes.extend(
                response
                    .common_prefixes()
                    .iter()
                    .filter_map(|p| p.prefix().map(str::to_string)),
            );

            match response.next_continuation_token() {
                Some(token) if response.is_truncated() == Some(true) => {
                    continuation_token = Some(token.to_string())
                }
                _ => break,
            }
        }

        Ok(prefixes)
    }

    async fn put_object_from_file(
        &self,
        bucket: &str,
        key: &str,
        file_path: &Path,
        metadata: &HashMap<String, String>,
        progress: Option<&TransferProgressCallback>,
    ) -> Result<String, StorageError> {
        let body: ByteStream = ByteStream::from_path(file_path)
            .await
            .map_err(|e| StorageError::IoError {
                path: file_path.display().to_string(),
                message: e.to_string(),
            })?;
        let length: u64 = body.size_hint().0;

        let output = self
            .s3_client
            .put_object()
            .bucket(bucket)
            .key(key)
            .set_metadata(Some(metadata.clone()))
            .body(body)
            .send()
            .await
            .map_err(from_sdk)?;

        report(progress, OperationType::Uploading, key, length)?;
        Ok(output.e_tag().unwrap_or_default().to_string())
    }

    async fn create_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        metadata: &HashMap<String, String>,
    ) -> Result<String, StorageError> {
        let output = self
            .s3_client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .set_metadata(Some(metadata.clone()))
            .send()
            .await
            .map_err(from_sdk)?;

        output
            .upload_id()
            .map(str::to_string)
            .ok_or_else(|| StorageError::Other {
                message: format!("No upload id returned for {}", key),
            })
    }

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
    ) -> Result<String, StorageError> {
        let body: ByteStream = ByteStream::read_from()
            .path(file_path)
            .offset(offset)
            .length(Length::Exact(length))
            .build()
            .await
            .map_err(|e| StorageError::IoError {
                path: file_path.display().to_string(),
                message: e.to_string(),
            })?;

        let output = self
            .s3_client
            .upload_part()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number as i32)
            .body(body)
            .send()
            .await
            .map_err(from_sdk)?;

        report(progress, OperationType::Uploading, key, length)?;
        output
            .e_tag()
            .map(str::to_string)
            .ok_or_else(|| StorageError::Other {
                message: format!("No ETag returned for part {} of {}", part_number, key),
            })
    }

    async fn upload_part_copy(
        &self,
        bucket: &str,
        source_key: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
        first_byte: u64,
        last_byte: u64,
    ) -> Result<String, StorageError> {
        let output = self
            .s3_client
            .upload_part_copy()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number as i32)
            .copy_source(copy_source(bucket, source_key))
            .copy_source_range(format!("bytes={}-{}", first_byte, last_byte))
            .send()
            .await
            .map_err(from_sdk)?;

        output
            .copy_part_result()
            .and_then(|r| r.e_tag())
            .map(str::to_string)
            .ok_or_else(|| StorageError::Other {
                message: format!("No ETag returned for copied part {} of {}", part_number, key),
            })
    }

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<String, StorageError> {
        let completed: Vec<aws_sdk_s3::types::CompletedPart> = parts
            .iter()
            .map(|part| {
                aws_sdk_s3::types::CompletedPart::builder()
                    .part_number(part.part_number as i32)
                    .e_tag(&part.etag)
                    .build()
            })
            .collect();

        let output = self
            .s3_client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(completed))
                    .build(),
            )
            .send()
            .await
            .map_err(from_sdk)?;

        Ok(output.e_tag().unwrap_or_default().to_string())
    }

    async fn abort_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<(), StorageError> {
        self.s3_client
            .abort_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(from_sdk)?;
        Ok(())
    }

    async fn copy_object(
        &self,
        bucket: &str,
        source_key: &str,
        destination_key: &str,
    ) -> Result<(), StorageError> {
        self.s3_client
            .copy_object()
            .bucket(bucket)
            .key(destination_key)
            .copy_source(copy_source(bucket, source_key))
            .send()
            .await
            .map_err(from_sdk)?;
        Ok(())
    }

    async fn get_object_to_file(
        &self,
        bucket: &str,
        key: &str,
        file_path: &Path,
        progress: Option<&TransferProgressCallback>,
    ) -> Result<(), StorageError> {
        let response = self
            .s3_client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| {
                if status_of(&err) == Some(404) {
                    StorageError::NotFound {
                        bucket: bucket.to_string(),
                        key: key.to_string(),
                    }
                } else {
                    from_sdk(err)
                }
            })?;

        let mut file: File = File::create(file_path)
            .await
            .map_err(|e| StorageError::io(file_path.display().to_string(), e))?;

        write_body(response.body, &mut file, file_path, key, progress).await
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
        let response = self
            .s3_client
            .get_object()
            .bucket(bucket)
            .key(key)
            .range(byte_range(offset, length))
            .send()
            .await
            .map_err(|err| {
                if status_of(&err) == Some(404) {
                    StorageError::NotFound {
                        bucket: bucket.to_string(),
                        key: key.to_string(),
                    }
                } else {
                    from_sdk(err)
                }
            })?;

        let mut file: File = tokio::fs::OpenOptions::new()
            .write(true)
            .open(file_path)
            .await
            .map_err(|e| StorageError::io(file_path.display().to_string(), e))?;

        file.seek(SeekFrom::Start(offset))
            .await
            .map_err(|e| StorageError::io(file_path.display().to_string(), e))?;

        write_body(response.body, &mut file, file_path, key, progress).await
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        self.s3_client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(from_sdk)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crt_client_implements_storage_client() {
        fn assert_storage_client<T: StorageClient>() {}
        assert_storage_client::<CrtStorageClient>();
    }

    #[test]
    fn test_copy_source_encodes_key() {
        assert_eq!(
            copy_source("bucket", "runs/42/out file+1.tar.gz"),
            "bucket/runs/42/out%20file%2B1.tar.gz"
        );
        assert_eq!(copy_source("b", "plain/key.txt"), "b/plain/key.txt");
    }

    #[test]
    fn test_byte_range_is_inclusive() {
        assert_eq!(byte_range(0, 8), "bytes=0-7");
        assert_eq!(byte_range(8, 2), "bytes=8-9");
    }
}
