//! Reconciliation of local file digests with backend ETags.
//!
//! S3-compatible backends report the MD5 of the object for single-request
//! uploads and `md5(concat(part md5s))-N` for multipart uploads. A `-` in the
//! ETag is taken to mean the multipart form; this is a contract with
//! S3-compatible backends, not a property of ETags in general.

use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use md5::{Digest, Md5};
use rusty_archival_common::HASH_BUFFER_SIZE;

use crate::error::StorageError;
use crate::parts::{generate_parts, optimal_part_size, PartInfo};

/// A checksum in the backend's ETag scheme.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChecksumResult {
    /// Hex MD5 of the whole content.
    Plain(String),
    /// Hex MD5 of the concatenated raw part digests, plus the part count.
    Composite { digest: String, parts: usize },
}

impl ChecksumResult {
    /// Interpret an ETag as reported by the backend.
    ///
    /// Surrounding quotes are ignored and the hex digest is lowercased.
    pub fn from_etag(etag: &str) -> Self {
        let trimmed: &str = etag.trim().trim_matches('"');
        if let Some((digest, parts)) = trimmed.split_once('-') {
            if let Ok(parts) = parts.parse::<usize>() {
                return ChecksumResult::Composite {
                    digest: digest.to_ascii_lowercase(),
                    parts,
                };
            }
        }
        ChecksumResult::Plain(trimmed.to_ascii_lowercase())
    }

    /// Whether this is a multipart checksum.
    pub fn is_composite(&self) -> bool {
        matches!(self, ChecksumResult::Composite { .. })
    }

    /// Part count; 1 for a plain checksum.
    pub fn part_count(&self) -> usize {
        match self {
            ChecksumResult::Plain(_) => 1,
            ChecksumResult::Composite { parts, .. } => *parts,
        }
    }

    /// Plain MD5 of a whole file.
    pub fn plain_of_file(path: &Path) -> Result<Self, StorageError> {
        let len: u64 = file_len(path)?;
        let digest: [u8; 16] = md5_of_range(path, 0, len)?;
        Ok(ChecksumResult::Plain(hex::encode(digest)))
    }

    /// Composite checksum of a file split into `part_size` parts.
    ///
    /// # Arguments
    /// * `path` - Local file
    /// * `part_size` - Part size in bytes, as used by the multipart transfer
    pub fn composite_of_file(path: &Path, part_size: u64) -> Result<Self, StorageError> {
        let len: u64 = file_len(path)?;
        let parts: Vec<PartInfo> = generate_parts(len, part_size);

        let mut concatenated: Vec<u8> = Vec::with_capacity(parts.len() * 16);
        for part in &parts {
            concatenated.extend_from_slice(&md5_of_range(path, part.offset, part.length)?);
        }

        Ok(ChecksumResult::Composite {
            digest: hex::encode(Md5::digest(&concatenated)),
            parts: parts.len(),
        })
    }

    /// Local checksum computed in the same scheme as `remote`.
    ///
    /// # Arguments
    /// * `path` - Local file
    /// * `remote` - Checksum derived from the backend's ETag
    /// * `part_size` - Part size in bytes the object was transferred with
    pub fn local_for(
        path: &Path,
        remote: &ChecksumResult,
        part_size: u64,
    ) -> Result<Self, StorageError> {
        match remote {
            ChecksumResult::Plain(_) => Self::plain_of_file(path),
            ChecksumResult::Composite { .. } => {
                let len: u64 = file_len(path)?;
                Self::composite_of_file(path, optimal_part_size(len, part_size))
            }
        }
    }
}

impl fmt::Display for ChecksumResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChecksumResult::Plain(digest) => f.write_str(digest),
            ChecksumResult::Composite { digest, parts } => write!(f, "{}-{}", digest, parts),
        }
    }
}

fn file_len(path: &Path) -> Result<u64, StorageError> {
    std::fs::metadata(path)
        .map(|m| m.len())
        .map_err(|e| StorageError::io(path.display().to_string(), e))
}

fn md5_of_range(path: &Path, offset: u64, length: u64) -> Result<[u8; 16], StorageError> {
    let io_err = |e: std::io::Error| StorageError::io(path.display().to_string(), e);

    let mut file: File = File::open(path).map_err(io_err)?;
    file.seek(SeekFrom::Start(offset)).map_err(io_err)?;
    let mut reader = BufReader::with_capacity(HASH_BUFFER_SIZE, file).take(length);

    let mut hasher: Md5 = Md5::new();
    let mut buffer: Vec<u8> = vec![0u8; HASH_BUFFER_SIZE];
    loop {
        let read: usize = reader.read(&mut buffer).map_err(io_err)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hasher.finalize().into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn write_file(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
        let path: PathBuf = dir.join(name);
        std::fs::write(&path, data).unwrap();
        path
    }

    #[test]
    fn test_from_etag() {
        assert_eq!(
            ChecksumResult::from_etag("\"D41D8CD98F00B204E9800998ECF8427E\""),
            ChecksumResult::Plain("d41d8cd98f00b204e9800998ecf8427e".into())
        );
        assert_eq!(
            ChecksumResult::from_etag("\"9b2cf535f27731c974343645a3985328-7\""),
            ChecksumResult::Composite {
                digest: "9b2cf535f27731c974343645a3985328".into(),
                parts: 7
            }
        );
        assert!(!ChecksumResult::from_etag("abc-xyz").is_composite());
    }

    #[test]
    fn test_plain_matches_md5() {
        let dir: tempfile::TempDir = tempfile::tempdir().unwrap();
        let path: PathBuf = write_file(dir.path(), "a", b"hello world");
        assert_eq!(
            ChecksumResult::plain_of_file(&path).unwrap().to_string(),
            "5eb63bbbe01eeed093cb22bb8f5acdc3"
        );
    }

    #[test]
    fn test_composite_concatenates_part_digests() {
        let dir: tempfile::TempDir = tempfile::tempdir().unwrap();
        let data: Vec<u8> = (0..250u32).map(|i| (i % 251) as u8).collect();
        let path: PathBuf = write_file(dir.path(), "b", &data);

        let mut concatenated: Vec<u8> = Vec::new();
        for chunk in data.chunks(100) {
            concatenated.extend_from_slice(&Md5::digest(chunk));
        }
        let expected: String = format!("{}-3", hex::encode(Md5::digest(&concatenated)));

        let composite: ChecksumResult = ChecksumResult::composite_of_file(&path, 100).unwrap();
        assert_eq!(composite.part_count(), 3);
        assert_eq!(composite.to_string(), expected);
    }

    #[test]
    fn test_local_for_follows_remote_scheme() {
        let dir: tempfile::TempDir = tempfile::tempdir().unwrap();
        let path: PathBuf = write_file(dir.path(), "c", &[1u8; 64]);

        let plain_remote: ChecksumResult = ChecksumResult::from_etag("\"ignored\"");
        let local: ChecksumResult = ChecksumResult::local_for(&path, &plain_remote, 16).unwrap();
        assert_eq!(local, ChecksumResult::plain_of_file(&path).unwrap());

        let composite_remote: ChecksumResult = ChecksumResult::from_etag("\"ignored-4\"");
        let local: ChecksumResult =
            ChecksumResult::local_for(&path, &composite_remote, 16).unwrap();
        assert_eq!(local.part_count(), 4);
    }
}
