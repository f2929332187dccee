//! Shared data structures for storage operations.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use rusty_archival_common::{DEFAULT_PART_SIZE_MIB, MULTIPART_COPY_THRESHOLD};

use crate::checksum::ChecksumResult;

/// Default region when none is configured.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Configuration settings for the backend client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Region name.
    pub region: String,
    /// Custom endpoint for S3-compatible services.
    pub endpoint_url: Option<String>,
    /// Use path-style addressing. Always on when `endpoint_url` is set.
    pub force_path_style: bool,
    /// Static credentials; the ambient credential chain is used when absent.
    pub credentials: Option<AwsCredentials>,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            region: DEFAULT_REGION.into(),
            endpoint_url: None,
            force_path_style: false,
            credentials: None,
        }
    }
}

impl StorageSettings {
    /// Whether path-style addressing should be used.
    pub fn path_style(&self) -> bool {
        self.force_path_style || self.endpoint_url.is_some()
    }
}

/// Static credentials.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    #[serde(default)]
    pub session_token: Option<String>,
}

impl std::fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Progress update for transfer operations.
///
/// `bytes` is the increment since the previous update for the same
/// operation, so updates from concurrent parts can simply be summed.
#[derive(Debug, Clone)]
pub struct TransferProgress {
    /// Current operation type.
    pub operation: OperationType,
    /// Object key being transferred.
    pub key: String,
    /// Bytes transferred since the previous update.
    pub bytes: u64,
}

/// Type of operation in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationType {
    Uploading,
    Downloading,
    Copying,
}

/// What happens to an object already stored under the upload key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverwritePolicy {
    /// Delete the existing object.
    #[default]
    Overwrite,
    /// Copy the existing object to a timestamp-suffixed key, then delete it.
    PreserveExisting,
}

/// Number of workers used when no concurrency is configured.
pub fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Options for upload operations.
#[derive(Debug, Clone)]
pub struct UploadOptions {
    /// Multipart threshold and part size, in MiB.
    pub part_size_mib: u64,
    /// Uncompressed payload size recorded in the object metadata.
    pub uncompressed_size: Option<u64>,
    /// Handling of an existing object at the key.
    pub overwrite_policy: OverwritePolicy,
    /// Objects larger than this are preserved with a multipart copy.
    pub copy_threshold: u64,
    /// Maximum concurrent part uploads.
    pub max_concurrency: usize,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            part_size_mib: DEFAULT_PART_SIZE_MIB,
            uncompressed_size: None,
            overwrite_policy: OverwritePolicy::default(),
            copy_threshold: MULTIPART_COPY_THRESHOLD,
            max_concurrency: default_concurrency(),
        }
    }
}

impl UploadOptions {
    /// Create options with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the part size in MiB.
    pub fn with_part_size_mib(mut self, part_size_mib: u64) -> Self {
        self.part_size_mib = part_size_mib;
        self
    }

    /// Record the uncompressed payload size.
    pub fn with_uncompressed_size(mut self, size: u64) -> Self {
        self.uncompressed_size = Some(size);
        self
    }

    /// Set the overwrite policy.
    pub fn with_overwrite_policy(mut self, policy: OverwritePolicy) -> Self {
        self.overwrite_policy = policy;
        self
    }

    /// Set the multipart copy threshold in bytes.
    pub fn with_copy_threshold(mut self, threshold: u64) -> Self {
        self.copy_threshold = threshold;
        self
    }

    /// Set maximum concurrency for part uploads.
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }
}

/// Options for download operations.
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    /// Part size in MiB used when the object carries no part-size tag.
    pub default_part_size_mib: u64,
    /// Maximum concurrent ranged downloads.
    pub max_concurrency: usize,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            default_part_size_mib: DEFAULT_PART_SIZE_MIB,
            max_concurrency: default_concurrency(),
        }
    }
}

impl DownloadOptions {
    /// Create options with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the fallback part size in MiB.
    pub fn with_default_part_size_mib(mut self, part_size_mib: u64) -> Self {
        self.default_part_size_mib = part_size_mib;
        self
    }

    /// Set maximum concurrency for ranged downloads.
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }
}

/// Result of a verified upload.
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    /// Key of the uploaded object.
    pub key: String,
    /// Bytes transferred.
    pub bytes: u64,
    /// Number of parts; 1 for a single-request upload.
    pub parts: usize,
    /// Checksum shared by the local file and the remote object.
    pub checksum: ChecksumResult,
    /// Key the previous object was preserved under, if any.
    pub preserved_as: Option<String>,
}

/// Result of a verified download.
#[derive(Debug, Clone)]
pub struct DownloadOutcome {
    /// Local file written.
    pub path: PathBuf,
    /// Bytes transferred.
    pub bytes: u64,
    /// Checksum shared by the local file and the remote object.
    pub checksum: ChecksumResult,
}
