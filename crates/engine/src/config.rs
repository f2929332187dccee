//! Engine configuration.
//!
//! Loaded from a JSON file where every field is optional:
//!
//! ```json
//! {
//!   "storage": { "region": "us-west-2", "endpoint_url": "http://localhost:9000" },
//!   "archiver": { "bag_layout": "standard", "hash_algorithm": "sha256" },
//!   "part_size_mib": 16,
//!   "overwrite_policy": "preserve_existing"
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use rusty_archival_common::{
    ArchiverConfig, DEFAULT_PART_SIZE_MIB, DEFAULT_UNCOMPRESSED_SIZE_MULTIPLIER,
    MULTIPART_COPY_THRESHOLD, SPACE_HEADROOM_BYTES,
};
use rusty_archival_storage::{
    default_concurrency, DownloadOptions, OverwritePolicy, StorageSettings, UploadOptions,
};

use crate::error::EngineError;

/// Everything the storage engine needs besides its collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Backend region, endpoint and credentials.
    pub storage: StorageSettings,
    /// Bag layout, manifest algorithm and compression.
    pub archiver: ArchiverConfig,
    /// Multipart threshold and part size, in MiB.
    pub part_size_mib: u64,
    /// Concurrent part transfers; the processor count when absent.
    pub max_concurrency: Option<usize>,
    /// Handling of an object already stored under an upload key.
    pub overwrite_policy: OverwritePolicy,
    /// Objects above this size are preserved with a multipart copy.
    pub copy_threshold_bytes: u64,
    /// Free space kept in reserve on top of every preflight.
    pub space_headroom_bytes: u64,
    /// Assumed expansion of an archive without an uncompressed-size tag.
    pub uncompressed_size_multiplier: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            storage: StorageSettings::default(),
            archiver: ArchiverConfig::default(),
            part_size_mib: DEFAULT_PART_SIZE_MIB,
            max_concurrency: None,
            overwrite_policy: OverwritePolicy::default(),
            copy_threshold_bytes: MULTIPART_COPY_THRESHOLD,
            space_headroom_bytes: SPACE_HEADROOM_BYTES,
            uncompressed_size_multiplier: DEFAULT_UNCOMPRESSED_SIZE_MULTIPLIER,
        }
    }
}

impl EngineConfig {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a configuration file.
    ///
    /// # Errors
    /// Returns `EngineError::Config` if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let content: String = std::fs::read_to_string(path).map_err(|e| EngineError::Config {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        serde_json::from_str(&content).map_err(|e| EngineError::Config {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Set the storage settings.
    pub fn with_storage(mut self, storage: StorageSettings) -> Self {
        self.storage = storage;
        self
    }

    /// Set the archiver configuration.
    pub fn with_archiver(mut self, archiver: ArchiverConfig) -> Self {
        self.archiver = archiver;
        self
    }

    /// Set the part size in MiB.
    pub fn with_part_size_mib(mut self, part_size_mib: u64) -> Self {
        self.part_size_mib = part_size_mib;
        self
    }

    /// Set the overwrite policy.
    pub fn with_overwrite_policy(mut self, policy: OverwritePolicy) -> Self {
        self.overwrite_policy = policy;
        self
    }

    /// Set the free-space headroom in bytes.
    pub fn with_space_headroom(mut self, bytes: u64) -> Self {
        self.space_headroom_bytes = bytes;
        self
    }

    /// Set the fallback uncompressed-size multiplier.
    pub fn with_uncompressed_size_multiplier(mut self, multiplier: u64) -> Self {
        self.uncompressed_size_multiplier = multiplier;
        self
    }

    fn concurrency(&self) -> usize {
        self.max_concurrency.unwrap_or_else(default_concurrency).max(1)
    }

    /// Upload options for a payload of `uncompressed_size` bytes.
    pub fn upload_options(&self, uncompressed_size: u64) -> UploadOptions {
        UploadOptions::new()
            .with_part_size_mib(self.part_size_mib)
            .with_uncompressed_size(uncompressed_size)
            .with_overwrite_policy(self.overwrite_policy)
            .with_copy_threshold(self.copy_threshold_bytes)
            .with_max_concurrency(self.concurrency())
    }

    /// Download options.
    pub fn download_options(&self) -> DownloadOptions {
        DownloadOptions::new()
            .with_default_part_size_mib(self.part_size_mib)
            .with_max_concurrency(self.concurrency())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusty_archival_common::{BagLayout, HashAlgorithm, GIB};

    #[test]
    fn test_defaults() {
        let config: EngineConfig = EngineConfig::default();
        assert_eq!(config.part_size_mib, 8);
        assert_eq!(config.space_headroom_bytes, GIB);
        assert_eq!(config.uncompressed_size_multiplier, 2);
        assert_eq!(config.storage.region, "us-east-1");
    }

    #[test]
    fn test_load_partial_file() {
        let dir: tempfile::TempDir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                "storage": {"endpoint_url": "http://localhost:9000"},
                "archiver": {"bag_layout": "standard", "hash_algorithm": "sha256"},
                "part_size_mib": 16,
                "overwrite_policy": "preserve_existing"
            }"#,
        )
        .unwrap();

        let config: EngineConfig = EngineConfig::load(&path).unwrap();
        assert!(config.storage.path_style());
        assert_eq!(config.storage.region, "us-east-1");
        assert_eq!(config.archiver.bag_layout, BagLayout::Standard);
        assert_eq!(config.archiver.hash_algorithm, HashAlgorithm::Sha256);
        assert_eq!(config.overwrite_policy, OverwritePolicy::PreserveExisting);

        let upload: UploadOptions = config.upload_options(42);
        assert_eq!(upload.part_size_mib, 16);
        assert_eq!(upload.uncompressed_size, Some(42));
        assert_eq!(config.download_options().default_part_size_mib, 16);
    }

    #[test]
    fn test_load_errors() {
        let dir: tempfile::TempDir = tempfile::tempdir().unwrap();
        assert!(matches!(
            EngineConfig::load(&dir.path().join("missing.json")),
            Err(EngineError::Config { .. })
        ));

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "{ part_size_mib: }").unwrap();
        assert!(matches!(EngineConfig::load(&bad), Err(EngineError::Config { .. })));
    }
}
