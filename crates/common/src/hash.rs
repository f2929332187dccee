//! Hash computation utilities for bag manifests and transfer checksums.

use std::fmt;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use digest::Digest;
use md5::Md5;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Sha256, Sha512};

use crate::constants::HASH_BUFFER_SIZE;
use crate::error::UnknownAlgorithmError;

/// Checksum algorithms supported for bag manifests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    #[default]
    Md5,
    Sha1,
    Sha256,
    Sha512,
}

impl HashAlgorithm {
    /// Every supported algorithm, in manifest detection order.
    pub const ALL: [HashAlgorithm; 4] = [
        HashAlgorithm::Md5,
        HashAlgorithm::Sha1,
        HashAlgorithm::Sha256,
        HashAlgorithm::Sha512,
    ];

    /// Lowercase name used in BagIt file names (`md5`, `sha256`, ...).
    pub fn name(&self) -> &'static str {
        match self {
            HashAlgorithm::Md5 => "md5",
            HashAlgorithm::Sha1 => "sha1",
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha512 => "sha512",
        }
    }

    /// Payload manifest file name, e.g. `manifest-md5.txt`.
    pub fn manifest_file_name(&self) -> String {
        format!("manifest-{}.txt", self.name())
    }

    /// Tag manifest file name, e.g. `tagmanifest-md5.txt`.
    pub fn tag_manifest_file_name(&self) -> String {
        format!("tagmanifest-{}.txt", self.name())
    }

    /// Length of the hex-encoded digest.
    pub fn hex_len(&self) -> usize {
        match self {
            HashAlgorithm::Md5 => 32,
            HashAlgorithm::Sha1 => 40,
            HashAlgorithm::Sha256 => 64,
            HashAlgorithm::Sha512 => 128,
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HashAlgorithm {
    type Err = UnknownAlgorithmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s.trim().to_ascii_lowercase().replace('-', "");
        match normalized.as_str() {
            "md5" => Ok(HashAlgorithm::Md5),
            "sha1" => Ok(HashAlgorithm::Sha1),
            "sha256" => Ok(HashAlgorithm::Sha256),
            "sha512" => Ok(HashAlgorithm::Sha512),
            _ => Err(UnknownAlgorithmError {
                name: s.to_string(),
            }),
        }
    }
}

/// Streaming hasher over any supported algorithm.
///
/// Use this when hashing data incrementally, such as a file read in
/// fixed-size blocks.
pub enum StreamingHasher {
    Md5(Md5),
    Sha1(Sha1),
    Sha256(Sha256),
    Sha512(Sha512),
}

impl StreamingHasher {
    /// Create a new streaming hasher for the given algorithm.
    pub fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Md5 => StreamingHasher::Md5(Md5::new()),
            HashAlgorithm::Sha1 => StreamingHasher::Sha1(Sha1::new()),
            HashAlgorithm::Sha256 => StreamingHasher::Sha256(Sha256::new()),
            HashAlgorithm::Sha512 => StreamingHasher::Sha512(Sha512::new()),
        }
    }

    /// Update the hasher with additional data.
    ///
    /// # Arguments
    /// * `data` - Bytes to add to the hash computation
    pub fn update(&mut self, data: &[u8]) {
        match self {
            StreamingHasher::Md5(h) => h.update(data),
            StreamingHasher::Sha1(h) => h.update(data),
            StreamingHasher::Sha256(h) => h.update(data),
            StreamingHasher::Sha512(h) => h.update(data),
        }
    }

    /// Finalize and return the raw digest bytes.
    pub fn finalize(self) -> Vec<u8> {
        match self {
            StreamingHasher::Md5(h) => h.finalize().to_vec(),
            StreamingHasher::Sha1(h) => h.finalize().to_vec(),
            StreamingHasher::Sha256(h) => h.finalize().to_vec(),
            StreamingHasher::Sha512(h) => h.finalize().to_vec(),
        }
    }

    /// Finalize and return the digest as a lowercase hex string.
    pub fn finalize_hex(self) -> String {
        hex::encode(self.finalize())
    }
}

/// Compute the hex digest of a byte slice.
///
/// # Arguments
/// * `algorithm` - Digest to use
/// * `data` - Bytes to hash
pub fn hash_bytes(algorithm: HashAlgorithm, data: &[u8]) -> String {
    let mut hasher: StreamingHasher = StreamingHasher::new(algorithm);
    hasher.update(data);
    hasher.finalize_hex()
}

/// Feed everything a reader yields into a new hasher.
///
/// # Arguments
/// * `algorithm` - Digest to use
/// * `reader` - Source of bytes, read until EOF
///
/// # Errors
/// Returns error if reading fails.
pub fn hash_reader<R: Read>(
    algorithm: HashAlgorithm,
    reader: &mut R,
) -> Result<StreamingHasher, std::io::Error> {
    let mut hasher: StreamingHasher = StreamingHasher::new(algorithm);
    let mut buffer: Vec<u8> = vec![0u8; HASH_BUFFER_SIZE];

    loop {
        let bytes_read: usize = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hasher)
}

/// Compute the hex digest of a file.
///
/// Reads the file in chunks to avoid loading entire file into memory.
///
/// # Arguments
/// * `algorithm` - Digest to use
/// * `path` - Path to the file to hash
///
/// # Errors
/// Returns error if file cannot be read.
pub fn hash_file(algorithm: HashAlgorithm, path: &Path) -> Result<String, std::io::Error> {
    let mut file: std::fs::File = std::fs::File::open(path)?;
    Ok(hash_reader(algorithm, &mut file)?.finalize_hex())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_known_digests() {
        assert_eq!(
            hash_bytes(HashAlgorithm::Md5, b"hello world"),
            "5eb63bbbe01eeed093cb22bb8f5acdc3"
        );
        assert_eq!(
            hash_bytes(HashAlgorithm::Sha1, b"hello world"),
            "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed"
        );
        assert_eq!(
            hash_bytes(HashAlgorithm::Sha256, b"hello world"),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_hex_len_matches_digest() {
        for algorithm in HashAlgorithm::ALL {
            assert_eq!(hash_bytes(algorithm, b"abc").len(), algorithm.hex_len());
        }
    }

    #[test]
    fn test_streaming_incremental() {
        let mut hasher: StreamingHasher = StreamingHasher::new(HashAlgorithm::Sha512);
        hasher.update(b"hello ");
        hasher.update(b"world");
        assert_eq!(
            hasher.finalize_hex(),
            hash_bytes(HashAlgorithm::Sha512, b"hello world")
        );
    }

    #[test]
    fn test_hash_file() {
        let dir: tempfile::TempDir = tempfile::tempdir().unwrap();
        let file_path: std::path::PathBuf = dir.path().join("test.txt");

        let mut file: std::fs::File = std::fs::File::create(&file_path).unwrap();
        file.write_all(b"hello world").unwrap();
        drop(file);

        let file_hash: String = hash_file(HashAlgorithm::Md5, &file_path).unwrap();
        assert_eq!(file_hash, "5eb63bbbe01eeed093cb22bb8f5acdc3");
    }

    #[test]
    fn test_hash_file_not_found() {
        let result: Result<String, std::io::Error> =
            hash_file(HashAlgorithm::Md5, Path::new("/nonexistent/file.txt"));
        assert!(result.is_err());
    }

    #[test]
    fn test_algorithm_names() {
        assert_eq!(HashAlgorithm::Sha256.manifest_file_name(), "manifest-sha256.txt");
        assert_eq!(
            HashAlgorithm::Sha512.tag_manifest_file_name(),
            "tagmanifest-sha512.txt"
        );
        assert_eq!("SHA-256".parse::<HashAlgorithm>(), Ok(HashAlgorithm::Sha256));
        assert!("crc32".parse::<HashAlgorithm>().is_err());
    }
}
