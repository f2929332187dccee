//! Wrapping a directory into a bag and unwrapping it again.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use walkdir::WalkDir;

use rusty_archival_common::{
    hash_file, is_hidden, relative_posix_path, ArchiverConfig, BagLayout, HashAlgorithm,
    BAG_PAYLOAD_DIR, DOT_BAGIT_DIR,
};

use crate::error::BagError;
use crate::layout::{is_bag, is_partial_bag, BagStructure, BAGIT_TXT, BAG_INFO_TXT};
use crate::manifest::Manifest;

/// Agent recorded in `bag-info.txt`.
const SOFTWARE_AGENT: &str = concat!("rusty-archival/", env!("CARGO_PKG_VERSION"));

/// Result of wrapping a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrapSummary {
    /// Layout the bag was written in.
    pub layout: BagLayout,
    /// Number of payload files listed in the manifest.
    pub files: u64,
    /// Total bytes of listed payload files.
    pub bytes: u64,
}

/// A payload file found on disk.
pub(crate) struct PayloadFile {
    pub(crate) absolute: PathBuf,
    /// POSIX path relative to the bag root.
    pub(crate) manifest_path: String,
    pub(crate) size: u64,
}

/// Wrap `dir` into a bag in place.
///
/// A directory that is already a bag, or partially wrapped, is unwrapped
/// first so that wrapping is repeatable.
///
/// # Arguments
/// * `dir` - Directory to wrap
/// * `config` - Layout, algorithm and hidden-file policy
///
/// # Returns
/// Counts of the files recorded in the payload manifest.
///
/// # Errors
/// Returns `BagError::NotADirectory` if `dir` is not a directory, or the
/// first I/O or hashing failure.
pub fn wrap(dir: &Path, config: &ArchiverConfig) -> Result<WrapSummary, BagError> {
    if !dir.is_dir() {
        return Err(BagError::NotADirectory {
            path: dir.display().to_string(),
        });
    }

    if is_bag(dir) || is_partial_bag(dir) {
        log::debug!("{} is already wrapped; unwrapping first", dir.display());
        unwrap(dir)?;
    }

    let structure: BagStructure = BagStructure::new(dir, config.bag_layout);
    match config.bag_layout {
        BagLayout::Standard => move_into_payload_dir(dir)?,
        BagLayout::DotFile => {
            let metadata_dir: PathBuf = structure.metadata_dir();
            fs::create_dir_all(&metadata_dir)
                .map_err(|e| BagError::io(metadata_dir.display().to_string(), e))?;
        }
    }

    let files: Vec<PayloadFile> = collect_payload(&structure, config.include_hidden_files)?;
    let algorithm: HashAlgorithm = config.hash_algorithm;

    let checksums: Vec<String> = files
        .par_iter()
        .map(|file| {
            hash_file(algorithm, &file.absolute)
                .map_err(|e| BagError::io(file.absolute.display().to_string(), e))
        })
        .collect::<Result<Vec<String>, BagError>>()?;

    let mut manifest: Manifest = Manifest::new(algorithm);
    for (file, checksum) in files.iter().zip(checksums) {
        manifest.push(file.manifest_path.clone(), checksum);
    }

    let summary: WrapSummary = WrapSummary {
        layout: config.bag_layout,
        files: files.len() as u64,
        bytes: files.iter().map(|f| f.size).sum(),
    };

    write_metadata(&structure, &manifest, &summary)?;

    log::info!(
        "Wrapped {} ({} files, {} bytes, {})",
        dir.display(),
        summary.files,
        summary.bytes,
        algorithm
    );
    Ok(summary)
}

/// Move every top-level entry of `dir` under `data/` through a temporary
/// sibling so an existing `data` entry can be moved as well.
fn move_into_payload_dir(dir: &Path) -> Result<(), BagError> {
    let staging: PathBuf = dir.join(format!(".{}", uuid::Uuid::new_v4()));
    fs::create_dir(&staging).map_err(|e| BagError::io(staging.display().to_string(), e))?;

    let entries: fs::ReadDir =
        fs::read_dir(dir).map_err(|e| BagError::io(dir.display().to_string(), e))?;
    for entry in entries {
        let entry: fs::DirEntry = entry.map_err(|e| BagError::io(dir.display().to_string(), e))?;
        let source: PathBuf = entry.path();
        if source == staging {
            continue;
        }
        let target: PathBuf = staging.join(entry.file_name());
        fs::rename(&source, &target)
            .map_err(|e| BagError::io(source.display().to_string(), e))?;
    }

    let payload_dir: PathBuf = dir.join(BAG_PAYLOAD_DIR);
    fs::rename(&staging, &payload_dir)
        .map_err(|e| BagError::io(payload_dir.display().to_string(), e))?;
    Ok(())
}

/// Walk the payload directory in name order, skipping bag metadata and,
/// unless `include_hidden`, dot-files.
pub(crate) fn collect_payload(
    structure: &BagStructure,
    include_hidden: bool,
) -> Result<Vec<PayloadFile>, BagError> {
    let payload_dir: PathBuf = structure.payload_dir();
    let metadata_dir: PathBuf = structure.metadata_dir();
    let skip_metadata: bool = structure.layout == BagLayout::DotFile;

    let mut files: Vec<PayloadFile> = Vec::new();
    let walker = WalkDir::new(&payload_dir)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !(skip_metadata && entry.path() == metadata_dir));

    for entry in walker {
        let entry: walkdir::DirEntry =
            entry.map_err(|e| BagError::io(payload_dir.display().to_string(), e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative: &Path = entry
            .path()
            .strip_prefix(&payload_dir)
            .unwrap_or(entry.path());
        if !include_hidden && is_hidden(relative) {
            log::debug!("Skipping hidden payload file {}", relative.display());
            continue;
        }

        let manifest_path: String = relative_posix_path(entry.path(), &structure.root)?;
        let size: u64 = entry
            .metadata()
            .map_err(|e| BagError::io(entry.path().display().to_string(), e.into()))?
            .len();

        files.push(PayloadFile {
            absolute: entry.path().to_path_buf(),
            manifest_path,
            size,
        });
    }

    Ok(files)
}

fn write_metadata(
    structure: &BagStructure,
    manifest: &Manifest,
    summary: &WrapSummary,
) -> Result<(), BagError> {
    let metadata_dir: PathBuf = structure.metadata_dir();
    let algorithm: HashAlgorithm = manifest.algorithm;

    let bagit_txt: PathBuf = metadata_dir.join(BAGIT_TXT);
    write_text(
        &bagit_txt,
        "BagIt-Version: 1.0\nTag-File-Character-Encoding: UTF-8\n",
    )?;

    let bag_info: String = format!(
        "Bagging-Date: {}\nPayload-Oxum: {}.{}\nBag-Software-Agent: {}\n",
        chrono::Local::now().format("%Y-%m-%d"),
        summary.bytes,
        summary.files,
        SOFTWARE_AGENT
    );
    let bag_info_txt: PathBuf = metadata_dir.join(BAG_INFO_TXT);
    write_text(&bag_info_txt, &bag_info)?;

    let manifest_path: PathBuf = structure.manifest_path(algorithm);
    manifest.write(&manifest_path)?;

    let mut tag_manifest: Manifest = Manifest::new(algorithm);
    for tag_file in [&bagit_txt, &bag_info_txt, &manifest_path] {
        let checksum: String = hash_file(algorithm, tag_file)
            .map_err(|e| BagError::io(tag_file.display().to_string(), e))?;
        tag_manifest.push(relative_posix_path(tag_file, &metadata_dir)?, checksum);
    }
    tag_manifest.write(&structure.tag_manifest_path(algorithm))?;

    Ok(())
}

fn write_text(path: &Path, content: &str) -> Result<(), BagError> {
    fs::write(path, content).map_err(|e| BagError::io(path.display().to_string(), e))
}

/// Restore a bag directory to its pre-wrap shape.
///
/// Dot-file bags lose their `.bagit` directory. Standard bags lose their
/// metadata files and have the contents of `data/` moved back to the root.
/// A regular file, or a directory without bag metadata, is left untouched.
///
/// Every entry is attempted even after a failure; the first failure is
/// returned.
pub fn unwrap(dir: &Path) -> Result<(), BagError> {
    if dir.is_file() {
        return Ok(());
    }
    if !dir.is_dir() {
        return Err(BagError::NotADirectory {
            path: dir.display().to_string(),
        });
    }

    let dot_bagit: PathBuf = dir.join(DOT_BAGIT_DIR);
    if dot_bagit.is_dir() {
        return fs::remove_dir_all(&dot_bagit)
            .map_err(|e| BagError::io(dot_bagit.display().to_string(), e));
    }

    let payload_dir: PathBuf = dir.join(BAG_PAYLOAD_DIR);
    if !dir.join(BAGIT_TXT).is_file() || !payload_dir.is_dir() {
        return Ok(());
    }

    let mut first_error: Option<BagError> = None;
    let mut record = |err: BagError| {
        log::warn!("{}", err);
        if first_error.is_none() {
            first_error = Some(err);
        }
    };

    let structure: BagStructure = BagStructure::new(dir, BagLayout::Standard);
    let mut metadata_files: Vec<PathBuf> =
        vec![dir.join(BAGIT_TXT), dir.join(BAG_INFO_TXT)];
    for algorithm in HashAlgorithm::ALL {
        metadata_files.push(structure.manifest_path(algorithm));
        metadata_files.push(structure.tag_manifest_path(algorithm));
    }
    for path in metadata_files {
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => record(BagError::io(path.display().to_string(), e)),
        }
    }

    let staging: PathBuf = dir.join(format!(".{}", uuid::Uuid::new_v4()));
    if let Err(e) = fs::rename(&payload_dir, &staging) {
        record(BagError::io(payload_dir.display().to_string(), e));
        return first_error.map_or(Ok(()), Err);
    }

    match fs::read_dir(&staging) {
        Ok(entries) => {
            for entry in entries {
                let entry: fs::DirEntry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        record(BagError::io(staging.display().to_string(), e));
                        continue;
                    }
                };
                let target: PathBuf = dir.join(entry.file_name());
                if let Err(e) = remove_existing(&target) {
                    record(BagError::io(target.display().to_string(), e));
                    continue;
                }
                if let Err(e) = fs::rename(entry.path(), &target) {
                    record(BagError::io(entry.path().display().to_string(), e));
                }
            }
        }
        Err(e) => record(BagError::io(staging.display().to_string(), e)),
    }

    if let Err(e) = fs::remove_dir(&staging) {
        record(BagError::io(staging.display().to_string(), e));
    }

    match first_error {
        Some(err) => Err(err),
        None => {
            log::info!("Unwrapped {}", dir.display());
            Ok(())
        }
    }
}

fn remove_existing(path: &Path) -> io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
