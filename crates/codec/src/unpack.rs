//! Extracting tar and gzip-tar archives.

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use rusty_archival_common::{resolve_within_root, to_posix_path};

use crate::container::{detect_container_type, ContainerType};
use crate::error::ArchiveError;

/// Summary of an extraction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnpackSummary {
    /// Number of files written.
    pub files: u64,
    /// Top-level names created under the output directory.
    pub top_level: BTreeSet<String>,
}

/// Extract an uncompressed tar archive into `output_dir`.
///
/// Directory entries are skipped; parent directories are created on demand
/// from each file's path.
///
/// # Arguments
/// * `archive` - Tar file to read
/// * `output_dir` - Destination directory
///
/// # Errors
/// Fails on the first I/O error, unsafe member path, or parent directory
/// that cannot be created.
pub fn unpack(archive: &Path, output_dir: &Path) -> Result<UnpackSummary, ArchiveError> {
    let file: File =
        File::open(archive).map_err(|e| ArchiveError::io(archive.display().to_string(), e))?;
    extract_stream(BufReader::new(file), archive, output_dir)
}

/// Extract a gzip-compressed tar archive into `output_dir`.
pub fn decompress(archive: &Path, output_dir: &Path) -> Result<UnpackSummary, ArchiveError> {
    let file: File =
        File::open(archive).map_err(|e| ArchiveError::io(archive.display().to_string(), e))?;
    extract_stream(GzDecoder::new(BufReader::new(file)), archive, output_dir)
}

/// Extract an archive, choosing tar or gzip-tar from its content.
///
/// # Errors
/// Returns `ArchiveError::Unsupported` when the content is neither.
pub fn unarchive(archive: &Path, output_dir: &Path) -> Result<UnpackSummary, ArchiveError> {
    match detect_container_type(archive)? {
        ContainerType::Tar => unpack(archive, output_dir),
        ContainerType::GzipTar => decompress(archive, output_dir),
        detected @ ContainerType::Unsupported => Err(ArchiveError::Unsupported {
            path: archive.display().to_string(),
            detected,
        }),
    }
}

/// Archive suffixes, longest first.
const ARCHIVE_SUFFIXES: [&str; 3] = [".tar.gz", ".tgz", ".tar"];

/// Whether a file name follows the archive naming convention.
pub fn is_archive_name(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| ARCHIVE_SUFFIXES.iter().any(|suffix| n.ends_with(*suffix)))
        .unwrap_or(false)
}

/// Strip the archive extension from a file name: `sample.tar.gz` becomes `sample`.
///
/// Only a trailing `.tar.gz`, `.tgz` or `.tar` is removed. Other names,
/// and names that are nothing but an extension, are returned unchanged.
pub fn strip_archive_extension(name: &str) -> &str {
    ARCHIVE_SUFFIXES
        .iter()
        .find_map(|suffix| name.strip_suffix(*suffix))
        .filter(|stem| !stem.is_empty())
        .unwrap_or(name)
}

fn extract_stream<R: Read>(
    reader: R,
    archive_path: &Path,
    output_dir: &Path,
) -> Result<UnpackSummary, ArchiveError> {
    let archive_name: String = archive_path.display().to_string();
    let mut archive: tar::Archive<R> = tar::Archive::new(reader);
    let mut summary: UnpackSummary = UnpackSummary::default();

    let entries = archive
        .entries()
        .map_err(|e| ArchiveError::io(archive_name.clone(), e))?;

    for entry in entries {
        let mut entry: tar::Entry<'_, R> =
            entry.map_err(|e| ArchiveError::io(archive_name.clone(), e))?;

        let entry_type: tar::EntryType = entry.header().entry_type();
        if entry_type.is_dir() {
            continue;
        }

        let member: PathBuf = entry
            .path()
            .map_err(|e| ArchiveError::io(archive_name.clone(), e))?
            .into_owned();
        let member_name: String = to_posix_path(&member).map_err(|_| ArchiveError::UnsafeEntry {
            entry: member.display().to_string(),
        })?;

        if !entry_type.is_file() {
            log::warn!("Skipping non-regular archive entry: {}", member_name);
            continue;
        }

        let target: PathBuf =
            resolve_within_root(&member_name, output_dir).map_err(|_| ArchiveError::UnsafeEntry {
                entry: member_name.clone(),
            })?;
        if target == output_dir {
            return Err(ArchiveError::UnsafeEntry { entry: member_name });
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| ArchiveError::CreateDirectory {
                path: parent.display().to_string(),
                message: e.to_string(),
            })?;
        }

        let mut output: File = File::create(&target)
            .map_err(|e| ArchiveError::io(target.display().to_string(), e))?;
        io::copy(&mut entry, &mut output)
            .map_err(|e| ArchiveError::io(target.display().to_string(), e))?;

        if let Some(first) = member_name.split('/').next() {
            summary.top_level.insert(first.to_string());
        }
        summary.files += 1;
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_archive_name() {
        assert!(is_archive_name(Path::new("/x/sample.tar")));
        assert!(is_archive_name(Path::new("sample.tar.gz")));
        assert!(is_archive_name(Path::new("sample.tgz")));
        assert!(!is_archive_name(Path::new("sample.gz")));
        assert!(!is_archive_name(Path::new("notes.txt")));
    }

    #[test]
    fn test_strip_archive_extension() {
        assert_eq!(strip_archive_extension("sample.tar.gz"), "sample");
        assert_eq!(strip_archive_extension("sample.tar"), "sample");
        assert_eq!(strip_archive_extension("sample.tgz"), "sample");
        assert_eq!(strip_archive_extension("notes.txt"), "notes.txt");
        assert_eq!(strip_archive_extension(".tar"), ".tar");
        assert_eq!(strip_archive_extension("report.tarot"), "report.tarot");
        assert_eq!(strip_archive_extension("notes.tar.txt"), "notes.tar.txt");
        assert_eq!(strip_archive_extension("run.tar.tar.gz"), "run.tar");
    }
}
