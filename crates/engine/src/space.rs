//! Free-space probing and preflight checks.

use std::path::{Path, PathBuf};

use sysinfo::{Disk, Disks};

use rusty_archival_common::{human_readable_bytes, TaskLogger};

use crate::error::EngineError;

/// Reports usable space on the filesystem holding a path.
pub trait SpaceProbe: Send + Sync {
    /// Bytes available to the current user on the filesystem holding `path`.
    ///
    /// `path` need not exist yet; its nearest existing ancestor is used.
    fn available_space(&self, path: &Path) -> Result<u64, EngineError>;
}

/// Probe backed by the operating system's disk list.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemSpaceProbe;

impl SystemSpaceProbe {
    pub fn new() -> Self {
        Self
    }
}

impl SpaceProbe for SystemSpaceProbe {
    fn available_space(&self, path: &Path) -> Result<u64, EngineError> {
        let existing: PathBuf = nearest_existing(path)?;
        let canonical: PathBuf = existing
            .canonicalize()
            .map_err(|e| EngineError::io(existing.display().to_string(), e))?;

        let disks: Disks = Disks::new_with_refreshed_list();
        disks
            .list()
            .iter()
            .filter(|disk| canonical.starts_with(disk.mount_point()))
            .max_by_key(|disk: &&Disk| disk.mount_point().components().count())
            .map(|disk| disk.available_space())
            .ok_or_else(|| {
                EngineError::precondition(format!(
                    "No mounted filesystem found for {}",
                    canonical.display()
                ))
            })
    }
}

/// Probe that always reports the same amount of free space.
#[derive(Debug, Clone, Copy)]
pub struct FixedSpaceProbe {
    available: u64,
}

impl FixedSpaceProbe {
    pub fn new(available: u64) -> Self {
        Self { available }
    }

    /// A probe that never refuses.
    pub fn unlimited() -> Self {
        Self::new(u64::MAX)
    }
}

impl SpaceProbe for FixedSpaceProbe {
    fn available_space(&self, _path: &Path) -> Result<u64, EngineError> {
        Ok(self.available)
    }
}

/// Fail unless `required` bytes are free on the filesystem holding `path`.
///
/// # Errors
/// Returns `EngineError::InsufficientSpace` when the probe reports less.
pub fn preflight<P: SpaceProbe + ?Sized>(
    probe: &P,
    path: &Path,
    required: u64,
    logger: &TaskLogger,
) -> Result<(), EngineError> {
    let available: u64 = probe.available_space(path)?;
    logger.trace(format!(
        "Space check on {}: required {}, available {}",
        path.display(),
        human_readable_bytes(required),
        human_readable_bytes(available)
    ));

    if required > available {
        return Err(EngineError::InsufficientSpace {
            path: path.display().to_string(),
            required: human_readable_bytes(required),
            available: human_readable_bytes(available),
        });
    }
    Ok(())
}

fn nearest_existing(path: &Path) -> Result<PathBuf, EngineError> {
    let absolute: PathBuf = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|e| EngineError::io(path.display().to_string(), e))?
            .join(path)
    };

    absolute
        .ancestors()
        .find(|candidate| candidate.exists())
        .map(Path::to_path_buf)
        .ok_or_else(|| EngineError::precondition(format!("No existing ancestor for {}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preflight_refuses_when_short() {
        let logger: TaskLogger = TaskLogger::new("test");
        let probe: FixedSpaceProbe = FixedSpaceProbe::new(1000);

        assert!(preflight(&probe, Path::new("/tmp"), 1000, &logger).is_ok());
        assert!(matches!(
            preflight(&probe, Path::new("/tmp"), 1001, &logger),
            Err(EngineError::InsufficientSpace { .. })
        ));
    }

    #[test]
    fn test_nearest_existing_walks_up() {
        let dir: tempfile::TempDir = tempfile::tempdir().unwrap();
        let missing: PathBuf = dir.path().join("a").join("b");
        assert_eq!(nearest_existing(&missing).unwrap(), dir.path());
    }
}
