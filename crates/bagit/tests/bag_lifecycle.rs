//! Wrap, verify and unwrap cycles on real directories.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use rusty_archival_bagit::{is_bag, is_partial_bag, BagError, BagManager};
use rusty_archival_common::{ArchiverConfig, BagLayout, HashAlgorithm, TaskLogger};
use walkdir::WalkDir;

fn create_payload(root: &Path) {
    fs::create_dir_all(root.join("nested").join("deeper")).unwrap();
    fs::write(root.join("a.txt"), b"alpha").unwrap();
    fs::write(root.join("nested").join("b.bin"), vec![3u8; 2048]).unwrap();
    fs::write(root.join("nested").join("deeper").join("c.txt"), b"charlie").unwrap();
    fs::write(root.join(".hidden"), b"secret").unwrap();
}

/// Relative path -> contents for every file under `root`.
fn snapshot(root: &Path) -> BTreeMap<String, Vec<u8>> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let rel: String = e
                .path()
                .strip_prefix(root)
                .unwrap()
                .to_string_lossy()
                .replace('\\', "/");
            (rel, fs::read(e.path()).unwrap())
        })
        .collect()
}

fn manager(layout: BagLayout, algorithm: HashAlgorithm) -> BagManager {
    let config: ArchiverConfig = ArchiverConfig::new()
        .with_bag_layout(layout)
        .with_hash_algorithm(algorithm);
    BagManager::new(config, &TaskLogger::new("test")).unwrap()
}

#[test]
fn test_roundtrip_both_layouts() {
    for layout in [BagLayout::Standard, BagLayout::DotFile] {
        let dir: tempfile::TempDir = tempfile::tempdir().unwrap();
        create_payload(dir.path());
        let before: BTreeMap<String, Vec<u8>> = snapshot(dir.path());

        let bags: BagManager = manager(layout, HashAlgorithm::Sha256);
        bags.wrap(dir.path()).unwrap();
        assert!(bags.is_bag(dir.path()), "{:?}", layout);
        assert!(bags.verify(dir.path()), "{:?}", layout);

        bags.unwrap(dir.path()).unwrap();
        assert!(!is_bag(dir.path()));
        assert_eq!(snapshot(dir.path()), before, "{:?}", layout);
    }
}

#[test]
fn test_mutated_payload_fails_verification() {
    for layout in [BagLayout::Standard, BagLayout::DotFile] {
        let dir: tempfile::TempDir = tempfile::tempdir().unwrap();
        create_payload(dir.path());
        let bags: BagManager = manager(layout, HashAlgorithm::Md5);
        bags.wrap(dir.path()).unwrap();

        let target: PathBuf = match layout {
            BagLayout::Standard => dir.path().join("data").join("nested").join("b.bin"),
            BagLayout::DotFile => dir.path().join("nested").join("b.bin"),
        };
        let mut bytes: Vec<u8> = fs::read(&target).unwrap();
        bytes[100] ^= 0xff;
        fs::write(&target, bytes).unwrap();

        assert!(!bags.verify(dir.path()));
        assert!(matches!(
            bags.try_verify(dir.path()),
            Err(BagError::CorruptChecksum { .. })
        ));
    }
}

#[test]
fn test_wrap_is_idempotent() {
    let dir: tempfile::TempDir = tempfile::tempdir().unwrap();
    create_payload(dir.path());
    let before: BTreeMap<String, Vec<u8>> = snapshot(dir.path());

    let standard: BagManager = manager(BagLayout::Standard, HashAlgorithm::Md5);
    standard.wrap(dir.path()).unwrap();
    standard.wrap(dir.path()).unwrap();
    assert!(standard.verify(dir.path()));
    assert!(!dir.path().join("data").join("data").exists());

    // Re-wrapping under the other layout normalizes first.
    let dot_file: BagManager = manager(BagLayout::DotFile, HashAlgorithm::Sha1);
    dot_file.wrap(dir.path()).unwrap();
    assert!(dot_file.verify(dir.path()));
    assert!(!dir.path().join("data").exists());

    dot_file.unwrap(dir.path()).unwrap();
    assert_eq!(snapshot(dir.path()), before);
}

#[test]
fn test_partial_bag_is_rewrapped() {
    let dir: tempfile::TempDir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("data")).unwrap();
    fs::write(dir.path().join("data").join("payload.txt"), b"p").unwrap();
    fs::write(dir.path().join("bagit.txt"), b"BagIt-Version: 1.0\n").unwrap();
    assert!(is_partial_bag(dir.path()));
    assert!(!is_bag(dir.path()));

    let bags: BagManager = manager(BagLayout::Standard, HashAlgorithm::Md5);
    bags.wrap(dir.path()).unwrap();
    assert!(bags.verify(dir.path()));
    assert!(dir.path().join("data").join("payload.txt").is_file());
}

#[test]
fn test_unwrap_leaves_plain_directory_with_data_dir_untouched() {
    let dir: tempfile::TempDir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("data")).unwrap();
    fs::write(dir.path().join("data").join("keep.txt"), b"k").unwrap();
    fs::write(dir.path().join("notes.txt"), b"n").unwrap();
    let before: BTreeMap<String, Vec<u8>> = snapshot(dir.path());

    let bags: BagManager = manager(BagLayout::Standard, HashAlgorithm::Md5);
    bags.unwrap(dir.path()).unwrap();
    assert_eq!(snapshot(dir.path()), before);
}

#[test]
fn test_hidden_files_excluded_from_manifest() {
    let dir: tempfile::TempDir = tempfile::tempdir().unwrap();
    create_payload(dir.path());
    let config: ArchiverConfig = ArchiverConfig::new()
        .with_bag_layout(BagLayout::DotFile)
        .with_hidden_files(false);
    let bags: BagManager = BagManager::new(config, &TaskLogger::new("test")).unwrap();
    bags.wrap(dir.path()).unwrap();

    let manifest: String =
        fs::read_to_string(dir.path().join(".bagit").join("manifest-md5.txt")).unwrap();
    assert!(!manifest.contains(".hidden"));
    assert_eq!(manifest.lines().count(), 3);

    // Unlisted hidden files neither fail completeness nor validity.
    assert!(bags.verify(dir.path()));
    fs::write(dir.path().join(".hidden"), b"changed").unwrap();
    assert!(bags.verify(dir.path()));
}

#[test]
fn test_large_bag_reports_corrupted_file() {
    let dir: tempfile::TempDir = tempfile::tempdir().unwrap();
    for i in 0..250 {
        fs::write(dir.path().join(format!("file-{:03}.txt", i)), format!("content {}", i)).unwrap();
    }
    let bags: BagManager = manager(BagLayout::Standard, HashAlgorithm::Md5);
    bags.wrap(dir.path()).unwrap();
    assert!(bags.verify(dir.path()));

    fs::write(dir.path().join("data").join("file-173.txt"), b"tampered").unwrap();
    match bags.try_verify(dir.path()) {
        Err(BagError::CorruptChecksum {
            path, algorithm, ..
        }) => {
            assert_eq!(path, "data/file-173.txt");
            assert_eq!(algorithm, HashAlgorithm::Md5);
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn test_missing_and_extra_files_are_incomplete() {
    let dir: tempfile::TempDir = tempfile::tempdir().unwrap();
    create_payload(dir.path());
    let bags: BagManager = manager(BagLayout::Standard, HashAlgorithm::Md5);
    bags.wrap(dir.path()).unwrap();

    fs::write(dir.path().join("data").join("extra.txt"), b"extra").unwrap();
    assert!(matches!(
        bags.try_verify(dir.path()),
        Err(BagError::Incomplete { .. })
    ));

    fs::remove_file(dir.path().join("data").join("extra.txt")).unwrap();
    fs::remove_file(dir.path().join("data").join("a.txt")).unwrap();
    assert!(matches!(
        bags.try_verify(dir.path()),
        Err(BagError::Incomplete { .. })
    ));
    assert!(!bags.verify(dir.path()));
}
