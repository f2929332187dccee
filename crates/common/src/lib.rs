//! Shared types and utilities for rusty-archival.
//!
//! This crate provides common functionality used across all rusty-archival crates:
//! - Manifest and transfer hash computation
//! - Archiver configuration (bag layout, algorithm, compression)
//! - Context-carrying task logger
//! - Generic progress callback trait and step tracking
//! - Path and size utilities
//! - Shared constants and error types

pub mod config;
pub mod constants;
pub mod error;
pub mod hash;
pub mod logging;
pub mod path_utils;
pub mod progress;
pub mod size;

// Re-export commonly used items at crate root
pub use config::{ArchiverConfig, BagLayout, Compression};
pub use constants::*;
pub use error::{PathError, UnknownAlgorithmError};
pub use hash::{hash_bytes, hash_file, hash_reader, HashAlgorithm, StreamingHasher};
pub use logging::{ContextTag, LogContext, TaskLogger, EVENT_TARGET};
pub use path_utils::{
    is_hidden, is_within_root, lexical_normalize, relative_posix_path, resolve_within_root,
    to_posix_path,
};
pub use progress::{progress_fn, FnProgress, NoOpProgress, ProgressCallback, ProgressStep, StepTracker};
pub use size::{directory_size, human_readable_bytes};
