//! AWS SDK S3 backend for rusty-archival storage.
//!
//! This crate provides a `StorageClient` implementation using the AWS SDK for Rust.
//! It works against AWS S3 and S3-compatible services reachable through a
//! custom endpoint.
//!
//! # Example
//!
//! ```ignore
//! use rusty_archival_common::TaskLogger;
//! use rusty_archival_storage::{ObjectStorage, StorageSettings, UploadOptions};
//! use rusty_archival_storage_crt::CrtStorageClient;
//!
//! let settings = StorageSettings::default();
//! let client = CrtStorageClient::new(settings).await?;
//! let storage = ObjectStorage::new(client, &TaskLogger::new("example"));
//! storage.upload(path, "my-bucket", "runs/run-1.tar.gz", &UploadOptions::new()).await?;
//! ```

mod client;
mod error;

pub use client::CrtStorageClient;
