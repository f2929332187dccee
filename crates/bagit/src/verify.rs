//! Completeness and checksum verification of bags.
//!
//! Checksums are recomputed on a dedicated rayon pool in batches of at most
//! [`VERIFY_BATCH_SIZE`] files. Each batch finishes before the next one
//! starts, and the first failure recorded in a batch ends verification.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use rayon::{ThreadPool, ThreadPoolBuilder};

use rusty_archival_common::{hash_file, resolve_within_root, HashAlgorithm, VERIFY_BATCH_SIZE};

use crate::error::BagError;
use crate::layout::{BagStructure, BAGIT_TXT};
use crate::manifest::Manifest;
use crate::wrap::{collect_payload, PayloadFile};

/// One checksum to recompute.
#[derive(Debug, Clone)]
struct ChecksumJob {
    absolute: PathBuf,
    /// Path as written in the manifest.
    listed: String,
    algorithm: HashAlgorithm,
    expected: String,
}

impl ChecksumJob {
    fn run(&self) -> Result<(), BagError> {
        let actual: String = hash_file(self.algorithm, &self.absolute)
            .map_err(|e| BagError::io(self.absolute.display().to_string(), e))?;
        if actual != self.expected {
            return Err(BagError::CorruptChecksum {
                path: self.listed.clone(),
                algorithm: self.algorithm,
                expected: self.expected.clone(),
                actual,
            });
        }
        Ok(())
    }
}

/// Verifies bags against their manifests.
pub struct BagVerifier {
    pool: ThreadPool,
    include_hidden: bool,
}

impl BagVerifier {
    /// Create a verifier with one worker per available processor.
    ///
    /// # Arguments
    /// * `include_hidden` - Whether dot-files must appear in the payload manifest
    pub fn new(include_hidden: bool) -> Result<Self, BagError> {
        let threads: usize = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self::with_threads(threads, include_hidden)
    }

    /// Create a verifier with a fixed number of workers.
    pub fn with_threads(threads: usize, include_hidden: bool) -> Result<Self, BagError> {
        let pool: ThreadPool = ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .thread_name(|index| format!("bag-verify-{}", index))
            .build()
            .map_err(|e| BagError::Verification {
                message: format!("cannot start verification workers: {}", e),
            })?;
        Ok(Self {
            pool,
            include_hidden,
        })
    }

    /// Run the completeness check followed by the checksum check.
    ///
    /// # Errors
    /// Returns `BagError::NotABag` when `dir` has no bag metadata, otherwise
    /// the first completeness or checksum failure.
    pub fn verify(&self, dir: &Path) -> Result<(), BagError> {
        let structure: BagStructure = BagStructure::detect(dir).ok_or_else(|| BagError::NotABag {
            path: dir.display().to_string(),
        })?;
        self.check_complete(&structure)?;
        self.check_valid(&structure)
    }

    /// Check that mandatory files exist and that the payload and manifests
    /// list the same files.
    pub fn check_complete(&self, structure: &BagStructure) -> Result<(), BagError> {
        let incomplete = |reason: String| BagError::Incomplete {
            path: structure.root.display().to_string(),
            reason,
        };

        let metadata_dir: PathBuf = structure.metadata_dir();
        if !metadata_dir.join(BAGIT_TXT).is_file() {
            return Err(incomplete(format!("missing {}", BAGIT_TXT)));
        }
        if !structure.payload_dir().is_dir() {
            return Err(incomplete("missing payload directory".to_string()));
        }

        let algorithms: Vec<HashAlgorithm> = structure.payload_algorithms();
        if algorithms.is_empty() {
            return Err(incomplete("no payload manifest".to_string()));
        }

        let mut listed: HashSet<String> = HashSet::new();
        for algorithm in algorithms {
            let manifest: Manifest = Manifest::read(&structure.manifest_path(algorithm), algorithm)?;
            for entry in manifest.entries {
                let absolute: PathBuf = resolve_within_root(&entry.path, &structure.root)?;
                if !absolute.is_file() {
                    return Err(incomplete(format!(
                        "{} lists missing file {}",
                        algorithm.manifest_file_name(),
                        entry.path
                    )));
                }
                listed.insert(entry.path);
            }
        }

        let payload: Vec<PayloadFile> = collect_payload(structure, self.include_hidden)?;
        if let Some(unlisted) = payload.iter().find(|f| !listed.contains(&f.manifest_path)) {
            return Err(incomplete(format!(
                "payload file {} is not in any manifest",
                unlisted.manifest_path
            )));
        }

        for algorithm in structure.tag_algorithms() {
            let tags: Manifest = Manifest::read(&structure.tag_manifest_path(algorithm), algorithm)?;
            for entry in tags.entries {
                let absolute: PathBuf = resolve_within_root(&entry.path, &metadata_dir)?;
                if !absolute.is_file() {
                    return Err(incomplete(format!(
                        "{} lists missing file {}",
                        algorithm.tag_manifest_file_name(),
                        entry.path
                    )));
                }
            }
        }

        Ok(())
    }

    /// Recompute every payload checksum, then every tag checksum.
    pub fn check_valid(&self, structure: &BagStructure) -> Result<(), BagError> {
        let metadata_dir: PathBuf = structure.metadata_dir();
        let mut jobs: Vec<ChecksumJob> = Vec::new();

        for algorithm in structure.payload_algorithms() {
            let manifest: Manifest = Manifest::read(&structure.manifest_path(algorithm), algorithm)?;
            for entry in manifest.entries {
                jobs.push(ChecksumJob {
                    absolute: resolve_within_root(&entry.path, &structure.root)?,
                    listed: entry.path,
                    algorithm,
                    expected: entry.checksum,
                });
            }
        }
        for algorithm in structure.tag_algorithms() {
            let tags: Manifest = Manifest::read(&structure.tag_manifest_path(algorithm), algorithm)?;
            for entry in tags.entries {
                jobs.push(ChecksumJob {
                    absolute: resolve_within_root(&entry.path, &metadata_dir)?,
                    listed: entry.path,
                    algorithm,
                    expected: entry.checksum,
                });
            }
        }

        log::debug!(
            "Verifying {} checksums in {}",
            jobs.len(),
            structure.root.display()
        );
        for batch in jobs.chunks(VERIFY_BATCH_SIZE) {
            self.run_batch(batch)?;
        }
        Ok(())
    }

    fn run_batch(&self, batch: &[ChecksumJob]) -> Result<(), BagError> {
        let failures: Mutex<Vec<BagError>> = Mutex::new(Vec::new());

        self.pool.scope(|scope| {
            for job in batch {
                let failures: &Mutex<Vec<BagError>> = &failures;
                scope.spawn(move |_| {
                    if let Err(err) = job.run() {
                        failures
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .push(err);
                    }
                });
            }
        });

        let failures: Vec<BagError> = failures.into_inner().unwrap_or_else(PoisonError::into_inner);
        match failures.into_iter().next() {
            Some(first) => Err(first),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use rusty_archival_common::{ArchiverConfig, BagLayout};

    use crate::wrap::wrap;

    #[test]
    fn test_verify_plain_directory_is_not_a_bag() {
        let dir: tempfile::TempDir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"a").unwrap();
        let verifier: BagVerifier = BagVerifier::with_threads(2, true).unwrap();
        assert!(matches!(verifier.verify(dir.path()), Err(BagError::NotABag { .. })));
    }

    #[test]
    fn test_tampered_tag_file_is_detected() {
        let dir: tempfile::TempDir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"a").unwrap();
        let config: ArchiverConfig = ArchiverConfig::new().with_bag_layout(BagLayout::Standard);
        wrap(dir.path(), &config).unwrap();

        let verifier: BagVerifier = BagVerifier::with_threads(2, true).unwrap();
        verifier.verify(dir.path()).unwrap();

        fs::write(dir.path().join("bag-info.txt"), b"Payload-Oxum: 9.9\n").unwrap();
        match verifier.verify(dir.path()) {
            Err(BagError::CorruptChecksum { path, .. }) => assert_eq!(path, "bag-info.txt"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_manifest_escaping_root_is_rejected() {
        let dir: tempfile::TempDir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"a").unwrap();
        wrap(dir.path(), &ArchiverConfig::default()).unwrap();

        let manifest_path: PathBuf = dir.path().join(".bagit").join("manifest-md5.txt");
        let mut manifest: Manifest = Manifest::read(&manifest_path, HashAlgorithm::Md5).unwrap();
        manifest.push("../outside.txt", "0cc175b9c0f1b6a831c399e269772661");
        manifest.write(&manifest_path).unwrap();

        let verifier: BagVerifier = BagVerifier::with_threads(1, true).unwrap();
        assert!(matches!(verifier.verify(dir.path()), Err(BagError::Path(_))));
    }
}
