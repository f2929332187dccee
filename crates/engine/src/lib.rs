//! Storage engine for rusty-archival.
//!
//! Executes storage tasks (upload, download, delete, list) against an
//! S3-compatible object store. Directories are wrapped as BagIt bags,
//! verified and archived before upload, and restored the same way on
//! download.
//!
//! # Example
//!
//! ```ignore
//! use rusty_archival_engine::{EngineConfig, StorageEngine, StorageTask, SystemSpaceProbe};
//! use rusty_archival_storage_crt::CrtStorageClient;
//!
//! let config = EngineConfig::load(Path::new("archival.json"))?;
//! let client = CrtStorageClient::new(config.storage.clone()).await?;
//! let engine = StorageEngine::new(client, SystemSpaceProbe::new(), config, &logger)?;
//!
//! let task = StorageTask::from_json(&std::fs::read_to_string("task.json")?)?;
//! if !engine.run(&task).await {
//!     std::process::exit(1);
//! }
//! ```

mod config;
mod engine;
mod error;
mod location;
mod space;
mod task;

pub use config::EngineConfig;
pub use engine::StorageEngine;
pub use error::{EngineError, TaskError};
pub use location::{RemotePath, StorageProvider};
pub use space::{preflight, FixedSpaceProbe, SpaceProbe, SystemSpaceProbe};
pub use task::{StorageAction, StorageTask, STORAGE_TASK_TYPE};
