//! Reading and writing BagIt manifest files.
//!
//! A manifest line is `<hex digest>  <path>`. Paths are POSIX-style and
//! relative to the bag root (payload manifests) or to the metadata directory
//! (tag manifests). `%`, CR and LF inside a path are percent-encoded.

use std::fs;
use std::io::Write;
use std::path::Path;

use rusty_archival_common::HashAlgorithm;

use crate::error::BagError;

/// One line of a manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    /// Lowercase hex digest.
    pub checksum: String,
    /// Decoded POSIX relative path.
    pub path: String,
}

/// A payload or tag manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    /// Algorithm the checksums were computed with.
    pub algorithm: HashAlgorithm,
    /// Entries in file order.
    pub entries: Vec<ManifestEntry>,
}

impl Manifest {
    /// Create an empty manifest.
    pub fn new(algorithm: HashAlgorithm) -> Self {
        Self {
            algorithm,
            entries: Vec::new(),
        }
    }

    /// Append an entry.
    pub fn push(&mut self, path: impl Into<String>, checksum: impl Into<String>) {
        self.entries.push(ManifestEntry {
            checksum: checksum.into(),
            path: path.into(),
        });
    }

    /// Parse a manifest file.
    ///
    /// # Arguments
    /// * `path` - Manifest file
    /// * `algorithm` - Algorithm named by the file
    ///
    /// # Errors
    /// Returns `BagError::InvalidManifest` for a malformed line.
    pub fn read(path: &Path, algorithm: HashAlgorithm) -> Result<Self, BagError> {
        let content: String =
            fs::read_to_string(path).map_err(|e| BagError::io(path.display().to_string(), e))?;

        let mut manifest: Manifest = Manifest::new(algorithm);
        for (index, raw_line) in content.lines().enumerate() {
            let line: &str = raw_line.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }

            let invalid = |message: &str| BagError::InvalidManifest {
                path: path.display().to_string(),
                line: index + 1,
                message: message.to_string(),
            };

            let (checksum, rest) = line
                .split_once([' ', '\t'])
                .ok_or_else(|| invalid("expected '<checksum> <path>'"))?;
            let encoded_path: &str = rest.trim_start_matches([' ', '\t']);
            if encoded_path.is_empty() {
                return Err(invalid("missing path"));
            }
            if checksum.len() != algorithm.hex_len()
                || !checksum.chars().all(|c| c.is_ascii_hexdigit())
            {
                return Err(invalid("checksum is not a hex digest of the expected length"));
            }

            manifest.push(decode_path(encoded_path), checksum.to_ascii_lowercase());
        }

        Ok(manifest)
    }

    /// Write the manifest, replacing any existing file.
    pub fn write(&self, path: &Path) -> Result<(), BagError> {
        let mut file: fs::File =
            fs::File::create(path).map_err(|e| BagError::io(path.display().to_string(), e))?;
        for entry in &self.entries {
            writeln!(file, "{}  {}", entry.checksum, encode_path(&entry.path))
                .map_err(|e| BagError::io(path.display().to_string(), e))?;
        }
        file.sync_all()
            .map_err(|e| BagError::io(path.display().to_string(), e))?;
        Ok(())
    }

    /// Whether the manifest lists `path`.
    pub fn contains(&self, path: &str) -> bool {
        self.entries.iter().any(|entry| entry.path == path)
    }
}

/// Percent-encode the characters that would break the line format.
pub fn encode_path(path: &str) -> String {
    path.replace('%', "%25")
        .replace('\n', "%0A")
        .replace('\r', "%0D")
}

/// Reverse [`encode_path`].
pub fn decode_path(encoded: &str) -> String {
    encoded
        .replace("%0A", "\n")
        .replace("%0a", "\n")
        .replace("%0D", "\r")
        .replace("%0d", "\r")
        .replace("%25", "%")
}

#[cfg(test)]
mod tests {
    use super::*;

    const MD5_A: &str = "0cc175b9c0f1b6a831c399e269772661";

    #[test]
    fn test_write_read_with_special_characters() {
        let dir: tempfile::TempDir = tempfile::tempdir().unwrap();
        let path: std::path::PathBuf = dir.path().join("manifest-md5.txt");

        let mut manifest: Manifest = Manifest::new(HashAlgorithm::Md5);
        manifest.push("data/plain.txt", MD5_A);
        manifest.push("data/with space and 100%.txt", MD5_A);
        manifest.push("data/line\nbreak.txt", MD5_A);
        manifest.write(&path).unwrap();

        let raw: String = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("data/with space and 100%25.txt"));
        assert!(raw.contains("data/line%0Abreak.txt"));
        assert_eq!(raw.lines().count(), 3);

        let parsed: Manifest = Manifest::read(&path, HashAlgorithm::Md5).unwrap();
        assert_eq!(parsed, manifest);
    }

    #[test]
    fn test_read_tolerates_tabs_and_crlf() {
        let dir: tempfile::TempDir = tempfile::tempdir().unwrap();
        let path: std::path::PathBuf = dir.path().join("manifest-md5.txt");
        fs::write(&path, format!("{}\tdata/a.txt\r\n\r\n", MD5_A.to_uppercase())).unwrap();

        let parsed: Manifest = Manifest::read(&path, HashAlgorithm::Md5).unwrap();
        assert_eq!(parsed.entries.len(), 1);
        assert_eq!(parsed.entries[0].path, "data/a.txt");
        assert_eq!(parsed.entries[0].checksum, MD5_A);
    }

    #[test]
    fn test_read_rejects_malformed_lines() {
        let dir: tempfile::TempDir = tempfile::tempdir().unwrap();
        let path: std::path::PathBuf = dir.path().join("manifest-md5.txt");

        fs::write(&path, "justonetoken\n").unwrap();
        assert!(matches!(
            Manifest::read(&path, HashAlgorithm::Md5),
            Err(BagError::InvalidManifest { line: 1, .. })
        ));

        fs::write(&path, format!("{}  data/a\nabc  data/b\n", MD5_A)).unwrap();
        assert!(matches!(
            Manifest::read(&path, HashAlgorithm::Md5),
            Err(BagError::InvalidManifest { line: 2, .. })
        ));
    }
}
