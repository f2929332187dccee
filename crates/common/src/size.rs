//! On-disk size accounting and human-readable byte counts.

use std::path::Path;

use walkdir::WalkDir;

use crate::error::PathError;

/// Total size of the regular files at or below `path`.
///
/// A regular file yields its own length. Symlinks are followed so the result
/// matches what an archive of the directory would contain.
///
/// # Arguments
/// * `path` - File or directory to measure
///
/// # Errors
/// Returns error if the path or any entry below it cannot be read.
pub fn directory_size(path: &Path) -> Result<u64, PathError> {
    let metadata: std::fs::Metadata =
        std::fs::metadata(path).map_err(|e| PathError::from_io(path.display().to_string(), e))?;
    if metadata.is_file() {
        return Ok(metadata.len());
    }

    let mut total: u64 = 0;
    for entry in WalkDir::new(path).follow_links(true) {
        let entry: walkdir::DirEntry = entry.map_err(|e| PathError::IoError {
            path: e
                .path()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| path.display().to_string()),
            message: e.to_string(),
        })?;
        if entry.file_type().is_file() {
            let len: u64 = entry
                .metadata()
                .map_err(|e| PathError::IoError {
                    path: entry.path().display().to_string(),
                    message: e.to_string(),
                })?
                .len();
            total = total.saturating_add(len);
        }
    }

    Ok(total)
}

/// Format a byte count with SI (base 1000) units, e.g. `1.5 MB`.
pub fn human_readable_bytes(bytes: u64) -> String {
    const UNIT: f64 = 1000.0;
    const PREFIXES: [char; 6] = ['k', 'M', 'G', 'T', 'P', 'E'];

    if bytes < 1000 {
        return format!("{} B", bytes);
    }

    let mut value: f64 = bytes as f64;
    let mut index: usize = 0;
    value /= UNIT;
    while value >= UNIT && index < PREFIXES.len() - 1 {
        value /= UNIT;
        index += 1;
    }

    format!("{:.1} {}B", value, PREFIXES[index])
}
