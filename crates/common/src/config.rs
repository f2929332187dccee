//! Archiver configuration shared by the bag manager, archive codec and engine.

use serde::{Deserialize, Serialize};

use crate::hash::HashAlgorithm;

/// Where bag metadata lives relative to the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BagLayout {
    /// Payload stays in place; metadata goes under `<bag>/.bagit/`.
    #[default]
    DotFile,
    /// Payload moves under `<bag>/data/`; metadata sits at the bag root.
    Standard,
}

/// Container format produced when boxing a bag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    /// Plain tar stream.
    Tar,
    /// Gzip-compressed tar stream.
    #[default]
    Gzip,
}

impl Compression {
    /// File extension appended to the archived directory name.
    pub fn extension(&self) -> &'static str {
        match self {
            Compression::Tar => ".tar",
            Compression::Gzip => ".tar.gz",
        }
    }
}

/// Immutable configuration for wrapping, verifying and boxing directories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiverConfig {
    /// Bag metadata layout.
    pub bag_layout: BagLayout,
    /// Checksum algorithm for manifests.
    pub hash_algorithm: HashAlgorithm,
    /// Whether dot-files are listed in (and verified against) the payload manifest.
    pub include_hidden_files: bool,
    /// Archive container format.
    pub compression: Compression,
}

impl Default for ArchiverConfig {
    fn default() -> Self {
        Self {
            bag_layout: BagLayout::DotFile,
            hash_algorithm: HashAlgorithm::Md5,
            include_hidden_files: true,
            compression: Compression::Gzip,
        }
    }
}

impl ArchiverConfig {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the bag layout.
    pub fn with_bag_layout(mut self, layout: BagLayout) -> Self {
        self.bag_layout = layout;
        self
    }

    /// Set the manifest checksum algorithm.
    pub fn with_hash_algorithm(mut self, algorithm: HashAlgorithm) -> Self {
        self.hash_algorithm = algorithm;
        self
    }

    /// Include or exclude hidden files from manifests.
    pub fn with_hidden_files(mut self, include: bool) -> Self {
        self.include_hidden_files = include;
        self
    }

    /// Set the archive compression.
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }
}
