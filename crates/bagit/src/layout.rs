//! Structural detection of bags on disk.

use std::fs;
use std::path::{Path, PathBuf};

use rusty_archival_common::{BagLayout, HashAlgorithm, BAG_PAYLOAD_DIR, DOT_BAGIT_DIR};

/// BagIt declaration file name.
pub const BAGIT_TXT: &str = "bagit.txt";

/// Bag info file name.
pub const BAG_INFO_TXT: &str = "bag-info.txt";

/// Where a bag's metadata and payload live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BagStructure {
    /// Bag root directory.
    pub root: PathBuf,
    /// Detected layout.
    pub layout: BagLayout,
}

impl BagStructure {
    /// Describe a bag root with a known layout.
    pub fn new(root: &Path, layout: BagLayout) -> Self {
        Self {
            root: root.to_path_buf(),
            layout,
        }
    }

    /// Detect the layout of an existing bag from its metadata location.
    ///
    /// A `.bagit` directory selects the dot-file layout; a root-level
    /// `bagit.txt` selects the standard layout.
    pub fn detect(root: &Path) -> Option<Self> {
        if root.join(DOT_BAGIT_DIR).is_dir() {
            Some(Self::new(root, BagLayout::DotFile))
        } else if root.join(BAGIT_TXT).is_file() {
            Some(Self::new(root, BagLayout::Standard))
        } else {
            None
        }
    }

    /// Directory holding `bagit.txt`, manifests and tag manifests.
    pub fn metadata_dir(&self) -> PathBuf {
        match self.layout {
            BagLayout::DotFile => self.root.join(DOT_BAGIT_DIR),
            BagLayout::Standard => self.root.clone(),
        }
    }

    /// Directory whose files form the payload.
    pub fn payload_dir(&self) -> PathBuf {
        match self.layout {
            BagLayout::DotFile => self.root.clone(),
            BagLayout::Standard => self.root.join(BAG_PAYLOAD_DIR),
        }
    }

    /// Payload manifest path for an algorithm.
    pub fn manifest_path(&self, algorithm: HashAlgorithm) -> PathBuf {
        self.metadata_dir().join(algorithm.manifest_file_name())
    }

    /// Tag manifest path for an algorithm.
    pub fn tag_manifest_path(&self, algorithm: HashAlgorithm) -> PathBuf {
        self.metadata_dir().join(algorithm.tag_manifest_file_name())
    }

    /// Algorithms for which a payload manifest exists.
    pub fn payload_algorithms(&self) -> Vec<HashAlgorithm> {
        HashAlgorithm::ALL
            .into_iter()
            .filter(|algorithm| self.manifest_path(*algorithm).is_file())
            .collect()
    }

    /// Algorithms for which a tag manifest exists.
    pub fn tag_algorithms(&self) -> Vec<HashAlgorithm> {
        HashAlgorithm::ALL
            .into_iter()
            .filter(|algorithm| self.tag_manifest_path(*algorithm).is_file())
            .collect()
    }

    /// Whether this bag has every mandatory metadata file plus a matching
    /// manifest/tag-manifest pair.
    pub fn has_complete_metadata(&self) -> bool {
        let metadata_dir: PathBuf = self.metadata_dir();
        self.payload_dir().is_dir()
            && metadata_dir.join(BAGIT_TXT).is_file()
            && metadata_dir.join(BAG_INFO_TXT).is_file()
            && HashAlgorithm::ALL.into_iter().any(|algorithm| {
                self.manifest_path(algorithm).is_file() && self.tag_manifest_path(algorithm).is_file()
            })
    }
}

/// Whether a file name is one of the metadata files a standard bag keeps at its root.
pub fn is_metadata_file_name(name: &str) -> bool {
    name == BAGIT_TXT
        || name == BAG_INFO_TXT
        || HashAlgorithm::ALL.into_iter().any(|algorithm| {
            name == algorithm.manifest_file_name() || name == algorithm.tag_manifest_file_name()
        })
}

/// Whether `dir` is a complete bag in either layout.
pub fn is_bag(dir: &Path) -> bool {
    if !dir.is_dir() {
        return false;
    }
    let dot_file: BagStructure = BagStructure::new(dir, BagLayout::DotFile);
    if dot_file.metadata_dir().is_dir() {
        return dot_file.has_complete_metadata();
    }
    BagStructure::new(dir, BagLayout::Standard).has_complete_metadata()
}

/// Whether `dir` is a partially wrapped bag.
///
/// A dot-file bag is partial as soon as its `.bagit` directory exists. A
/// standard bag is partial when it has `bagit.txt` and a `data/` directory and
/// nothing else at its root besides bag metadata files.
pub fn is_partial_bag(dir: &Path) -> bool {
    if !dir.is_dir() {
        return false;
    }
    if dir.join(DOT_BAGIT_DIR).is_dir() {
        return true;
    }
    if !dir.join(BAGIT_TXT).is_file() || !dir.join(BAG_PAYLOAD_DIR).is_dir() {
        return false;
    }

    let Ok(entries) = fs::read_dir(dir) else {
        return false;
    };
    for entry in entries {
        let Ok(entry) = entry else {
            return false;
        };
        let name: String = entry.file_name().to_string_lossy().into_owned();
        if name == BAG_PAYLOAD_DIR {
            continue;
        }
        let is_file: bool = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
        if !is_file || !is_metadata_file_name(&name) {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(path: PathBuf) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn test_plain_directory_is_not_a_bag() {
        let dir: tempfile::TempDir = tempfile::tempdir().unwrap();
        write(dir.path().join("a.txt"));
        write(dir.path().join("data").join("b.txt"));
        assert!(!is_bag(dir.path()));
        assert!(!is_partial_bag(dir.path()));
        assert!(BagStructure::detect(dir.path()).is_none());
    }

    #[test]
    fn test_standard_complete_requires_manifest_pair() {
        let dir: tempfile::TempDir = tempfile::tempdir().unwrap();
        write(dir.path().join("data").join("b.txt"));
        write(dir.path().join(BAGIT_TXT));
        write(dir.path().join(BAG_INFO_TXT));
        write(dir.path().join("manifest-sha256.txt"));
        assert!(!is_bag(dir.path()));

        write(dir.path().join("tagmanifest-md5.txt"));
        assert!(!is_bag(dir.path()));

        write(dir.path().join("tagmanifest-sha256.txt"));
        assert!(is_bag(dir.path()));
        assert!(is_partial_bag(dir.path()));
    }

    #[test]
    fn test_standard_partial_rejects_extra_entries() {
        let dir: tempfile::TempDir = tempfile::tempdir().unwrap();
        write(dir.path().join("data").join("b.txt"));
        write(dir.path().join(BAGIT_TXT));
        assert!(is_partial_bag(dir.path()));

        write(dir.path().join("stray.txt"));
        assert!(!is_partial_bag(dir.path()));
    }

    #[test]
    fn test_dot_file_detection() {
        let dir: tempfile::TempDir = tempfile::tempdir().unwrap();
        write(dir.path().join("payload.txt"));
        fs::create_dir(dir.path().join(DOT_BAGIT_DIR)).unwrap();
        assert!(is_partial_bag(dir.path()));
        assert!(!is_bag(dir.path()));

        let metadata: PathBuf = dir.path().join(DOT_BAGIT_DIR);
        write(metadata.join(BAGIT_TXT));
        write(metadata.join(BAG_INFO_TXT));
        write(metadata.join("manifest-md5.txt"));
        write(metadata.join("tagmanifest-md5.txt"));
        assert!(is_bag(dir.path()));

        let structure: BagStructure = BagStructure::detect(dir.path()).unwrap();
        assert_eq!(structure.layout, BagLayout::DotFile);
        assert_eq!(structure.payload_dir(), dir.path());
        assert_eq!(structure.payload_algorithms(), vec![HashAlgorithm::Md5]);
    }

    #[test]
    fn test_metadata_file_names() {
        assert!(is_metadata_file_name("bagit.txt"));
        assert!(is_metadata_file_name("tagmanifest-sha512.txt"));
        assert!(!is_metadata_file_name("tag-manifest-sha512.txt"));
        assert!(!is_metadata_file_name("notes.txt"));
    }
}
