//! Object storage abstraction for rusty-archival.
//!
//! This crate provides a backend-agnostic interface for moving archives to and
//! from S3-compatible object storage. Backends implement [`StorageClient`];
//! [`ObjectStorage`] builds the verified operations on top of it:
//!
//! - **Probes and listings** - existence, size and metadata tags; paginated
//!   object and directory listings
//! - **Uploads** - single-request or concurrent multipart transfer, metadata
//!   tagging, optional preservation of an overwritten object, and ETag
//!   verification against the local file
//! - **Downloads** - single or ranged concurrent transfer verified with the
//!   part size recorded at upload time
//!
//! [`MemoryStorageClient`] is an in-process backend with S3 ETag semantics.

mod checksum;
mod error;
mod memory;
mod object_storage;
mod parts;
mod progress;
mod traits;
mod types;

pub use checksum::ChecksumResult;
pub use error::StorageError;
pub use memory::{MemoryStorageClient, RequestCounts, UploadFault, DEFAULT_PAGE_SIZE};
pub use object_storage::{preserved_key, ObjectStorage};
pub use parts::{expected_part_count, generate_parts, needs_multipart, optimal_part_size, PartInfo};
pub use progress::TransferProgressLogger;
pub use traits::{
    CompletedPart, ObjectInfo, ObjectMetadata, ObjectPage, StorageClient, TransferProgressCallback,
};
pub use types::{
    default_concurrency, AwsCredentials, DownloadOptions, DownloadOutcome, OperationType,
    OverwritePolicy, StorageSettings, TransferProgress, UploadOptions, UploadOutcome,
    DEFAULT_REGION,
};
