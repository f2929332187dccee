//! Writing tar and gzip-tar archives.
//!
//! Entries are written by a single `tar::Builder`, one file at a time, so the
//! output stream is never shared between writers. GNU headers are used
//! throughout: member sizes beyond the 8 GiB octal limit are stored in
//! base-256, and names longer than 100 bytes (including non-ASCII names) are
//! written as GNU long-name records.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use rusty_archival_common::Compression;
use tar::{Builder, HeaderMode};

use crate::error::ArchiveError;

/// Summary of a finished pack operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackSummary {
    /// Number of file entries written.
    pub files: u64,
    /// Sum of the payload bytes written.
    pub bytes: u64,
}

/// Write an uncompressed tar archive of `inputs` to `output`.
///
/// Each input is stored under its own file name; directories are walked
/// recursively and only their regular files become entries.
///
/// # Arguments
/// * `output` - Archive file to create (truncated if it exists)
/// * `inputs` - Files or directories to include
///
/// # Errors
/// Any I/O failure aborts the whole operation. A partially written output
/// file is left for the caller to discard.
pub fn pack(output: &Path, inputs: &[PathBuf]) -> Result<PackSummary, ArchiveError> {
    let writer: BufWriter<File> = create_output(output)?;
    let mut builder: Builder<BufWriter<File>> = Builder::new(writer);

    let summary: PackSummary = append_inputs(&mut builder, inputs)?;

    let mut writer: BufWriter<File> = builder
        .into_inner()
        .map_err(|e| ArchiveError::io(output.display().to_string(), e))?;
    writer
        .flush()
        .map_err(|e| ArchiveError::io(output.display().to_string(), e))?;

    Ok(summary)
}

/// Write a gzip-compressed tar archive of `inputs` to `output`.
///
/// Same layout as [`pack`], with the tar stream passed through gzip.
pub fn compress(output: &Path, inputs: &[PathBuf]) -> Result<PackSummary, ArchiveError> {
    let writer: BufWriter<File> = create_output(output)?;
    let encoder: GzEncoder<BufWriter<File>> =
        GzEncoder::new(writer, flate2::Compression::default());
    let mut builder: Builder<GzEncoder<BufWriter<File>>> = Builder::new(encoder);

    let summary: PackSummary = append_inputs(&mut builder, inputs)?;

    let encoder: GzEncoder<BufWriter<File>> = builder
        .into_inner()
        .map_err(|e| ArchiveError::io(output.display().to_string(), e))?;
    let mut writer: BufWriter<File> = encoder
        .finish()
        .map_err(|e| ArchiveError::io(output.display().to_string(), e))?;
    writer
        .flush()
        .map_err(|e| ArchiveError::io(output.display().to_string(), e))?;

    Ok(summary)
}

/// Pack or compress depending on the configured compression.
pub fn archive(
    output: &Path,
    inputs: &[PathBuf],
    compression: Compression,
) -> Result<PackSummary, ArchiveError> {
    match compression {
        Compression::Tar => pack(output, inputs),
        Compression::Gzip => compress(output, inputs),
    }
}

/// Archive path for a directory: `<dir>.tar` or `<dir>.tar.gz` next to it.
pub fn archive_path_for(directory: &Path, compression: Compression) -> PathBuf {
    let mut name: std::ffi::OsString = directory
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "archive".into());
    name.push(compression.extension());
    directory.with_file_name(name)
}

fn create_output(output: &Path) -> Result<BufWriter<File>, ArchiveError> {
    let file: File =
        File::create(output).map_err(|e| ArchiveError::io(output.display().to_string(), e))?;
    Ok(BufWriter::new(file))
}

fn append_inputs<W: Write>(
    builder: &mut Builder<W>,
    inputs: &[PathBuf],
) -> Result<PackSummary, ArchiveError> {
    if inputs.is_empty() {
        return Err(ArchiveError::EmptyInput);
    }

    builder.mode(HeaderMode::Complete);
    builder.follow_symlinks(true);

    let mut summary: PackSummary = PackSummary::default();
    for input in inputs {
        let name: &std::ffi::OsStr = input.file_name().ok_or_else(|| ArchiveError::IoError {
            path: input.display().to_string(),
            message: "input has no file name".to_string(),
        })?;
        append_recursive(builder, input, Path::new(name), &mut summary)?;
    }

    Ok(summary)
}

fn append_recursive<W: Write>(
    builder: &mut Builder<W>,
    path: &Path,
    entry_name: &Path,
    summary: &mut PackSummary,
) -> Result<(), ArchiveError> {
    let metadata: fs::Metadata =
        fs::metadata(path).map_err(|e| ArchiveError::io(path.display().to_string(), e))?;

    if metadata.is_file() {
        builder
            .append_path_with_name(path, entry_name)
            .map_err(|e| ArchiveError::io(path.display().to_string(), e))?;
        summary.files += 1;
        summary.bytes += metadata.len();
    } else if metadata.is_dir() {
        let mut children: Vec<PathBuf> = fs::read_dir(path)
            .map_err(|e| ArchiveError::io(path.display().to_string(), e))?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<Result<Vec<PathBuf>, std::io::Error>>()
            .map_err(|e| ArchiveError::io(path.display().to_string(), e))?;
        children.sort();

        for child in children {
            let Some(child_name) = child.file_name() else {
                continue;
            };
            append_recursive(builder, &child, &entry_name.join(child_name), summary)?;
        }
    } else {
        log::warn!("Skipping unsupported entry type: {}", path.display());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archive_path_for() {
        let dir: &Path = Path::new("/work/sample");
        assert_eq!(
            archive_path_for(dir, Compression::Gzip),
            PathBuf::from("/work/sample.tar.gz")
        );
        assert_eq!(
            archive_path_for(dir, Compression::Tar),
            PathBuf::from("/work/sample.tar")
        );
    }

    #[test]
    fn test_pack_empty_input() {
        let dir: tempfile::TempDir = tempfile::tempdir().unwrap();
        let result = pack(&dir.path().join("out.tar"), &[]);
        assert!(matches!(result, Err(ArchiveError::EmptyInput)));
    }

    #[test]
    fn test_pack_missing_input() {
        let dir: tempfile::TempDir = tempfile::tempdir().unwrap();
        let result = pack(
            &dir.path().join("out.tar"),
            &[dir.path().join("does-not-exist")],
        );
        assert!(matches!(result, Err(ArchiveError::IoError { .. })));
    }

    #[test]
    fn test_pack_counts_files() {
        let dir: tempfile::TempDir = tempfile::tempdir().unwrap();
        let src: PathBuf = dir.path().join("src");
        fs::create_dir_all(src.join("nested").join("empty")).unwrap();
        fs::write(src.join("a.txt"), b"aaa").unwrap();
        fs::write(src.join("nested").join("b.txt"), b"bb").unwrap();

        let summary: PackSummary = compress(&dir.path().join("out.tar.gz"), &[src]).unwrap();
        assert_eq!(summary, PackSummary { files: 2, bytes: 5 });
    }
}
