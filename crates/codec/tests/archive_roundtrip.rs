//! Pack/unpack behavior against real files on disk.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use rusty_archival_codec::{
    compress, decompress, detect_container_type, pack, unarchive, unpack, ArchiveError,
    ContainerType, UnpackSummary,
};

fn create_tree(root: &Path) -> PathBuf {
    let src: PathBuf = root.join("sample");
    fs::create_dir_all(src.join("nested").join("deeper")).unwrap();
    fs::write(src.join("a.txt"), b"alpha").unwrap();
    fs::write(src.join("nested").join("b.bin"), vec![7u8; 4096]).unwrap();
    fs::write(src.join("nested").join("deeper").join("c.txt"), b"charlie").unwrap();
    src
}

fn assert_same_file(a: &Path, b: &Path) {
    assert_eq!(fs::read(a).unwrap(), fs::read(b).unwrap(), "{}", b.display());
}

#[test]
fn test_pack_unpack_roundtrip() {
    let dir: tempfile::TempDir = tempfile::tempdir().unwrap();
    let src: PathBuf = create_tree(dir.path());
    let archive: PathBuf = dir.path().join("sample.tar");
    let out: PathBuf = dir.path().join("out");

    pack(&archive, &[src.clone()]).unwrap();
    assert_eq!(detect_container_type(&archive).unwrap(), ContainerType::Tar);

    let summary: UnpackSummary = unpack(&archive, &out).unwrap();
    assert_eq!(summary.files, 3);
    assert_eq!(summary.top_level.iter().collect::<Vec<_>>(), vec!["sample"]);

    assert_same_file(&src.join("a.txt"), &out.join("sample").join("a.txt"));
    assert_same_file(
        &src.join("nested").join("b.bin"),
        &out.join("sample").join("nested").join("b.bin"),
    );
    assert_same_file(
        &src.join("nested").join("deeper").join("c.txt"),
        &out.join("sample").join("nested").join("deeper").join("c.txt"),
    );
}

#[test]
fn test_compress_decompress_roundtrip() {
    let dir: tempfile::TempDir = tempfile::tempdir().unwrap();
    let src: PathBuf = create_tree(dir.path());
    let archive: PathBuf = dir.path().join("sample.tar.gz");
    let out: PathBuf = dir.path().join("out");

    compress(&archive, &[src.clone()]).unwrap();
    assert_eq!(detect_container_type(&archive).unwrap(), ContainerType::GzipTar);

    let summary: UnpackSummary = decompress(&archive, &out).unwrap();
    assert_eq!(summary.files, 3);
    assert_same_file(&src.join("a.txt"), &out.join("sample").join("a.txt"));
}

#[test]
fn test_unarchive_ignores_extension() {
    let dir: tempfile::TempDir = tempfile::tempdir().unwrap();
    let src: PathBuf = create_tree(dir.path());
    // Gzip content behind a plain .tar name.
    let archive: PathBuf = dir.path().join("misnamed.tar");
    let out: PathBuf = dir.path().join("out");

    compress(&archive, &[src]).unwrap();
    let summary: UnpackSummary = unarchive(&archive, &out).unwrap();
    assert_eq!(summary.files, 3);
    assert!(out.join("sample").join("nested").join("b.bin").is_file());
}

#[test]
fn test_unarchive_rejects_unsupported() {
    let dir: tempfile::TempDir = tempfile::tempdir().unwrap();
    let bogus: PathBuf = dir.path().join("bogus.tar.gz");
    fs::write(&bogus, vec![b'x'; 2048]).unwrap();

    let result = unarchive(&bogus, &dir.path().join("out"));
    assert!(matches!(
        result,
        Err(ArchiveError::Unsupported {
            detected: ContainerType::Unsupported,
            ..
        })
    ));
    assert!(!dir.path().join("out").exists());
}

#[test]
fn test_multiple_inputs_and_single_file() {
    let dir: tempfile::TempDir = tempfile::tempdir().unwrap();
    let src: PathBuf = create_tree(dir.path());
    let loose: PathBuf = dir.path().join("loose.txt");
    fs::write(&loose, b"loose").unwrap();
    let archive: PathBuf = dir.path().join("multi.tar");
    let out: PathBuf = dir.path().join("out");

    pack(&archive, &[src, loose]).unwrap();
    let summary: UnpackSummary = unpack(&archive, &out).unwrap();
    assert_eq!(summary.files, 4);
    assert_eq!(summary.top_level.len(), 2);
    assert_eq!(fs::read(out.join("loose.txt")).unwrap(), b"loose");
}

#[test]
fn test_long_and_non_ascii_names() {
    let dir: tempfile::TempDir = tempfile::tempdir().unwrap();
    let src: PathBuf = dir.path().join("names");
    let long_dir: String = "d".repeat(120);
    fs::create_dir_all(src.join(&long_dir)).unwrap();
    fs::write(src.join(&long_dir).join("f".repeat(90)), b"long").unwrap();
    fs::write(src.join("résumé-数据.txt"), b"unicode").unwrap();

    let archive: PathBuf = dir.path().join("names.tar.gz");
    let out: PathBuf = dir.path().join("out");
    compress(&archive, &[src]).unwrap();
    unarchive(&archive, &out).unwrap();

    assert_eq!(
        fs::read(out.join("names").join(&long_dir).join("f".repeat(90))).unwrap(),
        b"long"
    );
    assert_eq!(
        fs::read(out.join("names").join("résumé-数据.txt")).unwrap(),
        b"unicode"
    );
}

#[test]
fn test_empty_directories_are_not_materialized() {
    let dir: tempfile::TempDir = tempfile::tempdir().unwrap();
    let src: PathBuf = dir.path().join("src");
    fs::create_dir_all(src.join("empty")).unwrap();
    fs::write(src.join("kept.txt"), b"k").unwrap();

    let archive: PathBuf = dir.path().join("src.tar");
    let out: PathBuf = dir.path().join("out");
    pack(&archive, &[src]).unwrap();
    unpack(&archive, &out).unwrap();

    assert!(out.join("src").join("kept.txt").is_file());
    assert!(!out.join("src").join("empty").exists());
}

#[test]
fn test_directory_entries_are_skipped() {
    let dir: tempfile::TempDir = tempfile::tempdir().unwrap();
    let archive: PathBuf = dir.path().join("dirs.tar");

    {
        let file: fs::File = fs::File::create(&archive).unwrap();
        let mut builder: tar::Builder<fs::File> = tar::Builder::new(file);

        let mut dir_header: tar::Header = tar::Header::new_gnu();
        dir_header.set_entry_type(tar::EntryType::Directory);
        dir_header.set_path("top/only-dir/").unwrap();
        dir_header.set_size(0);
        dir_header.set_mode(0o755);
        dir_header.set_cksum();
        builder.append(&dir_header, &[][..]).unwrap();

        let data: &[u8] = b"payload";
        let mut file_header: tar::Header = tar::Header::new_gnu();
        file_header.set_path("top/sub/file.txt").unwrap();
        file_header.set_size(data.len() as u64);
        file_header.set_mode(0o644);
        file_header.set_cksum();
        builder.append(&file_header, data).unwrap();
        builder.into_inner().unwrap().flush().unwrap();
    }

    let out: PathBuf = dir.path().join("out");
    let summary: UnpackSummary = unpack(&archive, &out).unwrap();
    assert_eq!(summary.files, 1);
    assert!(out.join("top").join("sub").join("file.txt").is_file());
    assert!(!out.join("top").join("only-dir").exists());
}

#[test]
fn test_rejects_parent_traversal() {
    let dir: tempfile::TempDir = tempfile::tempdir().unwrap();
    let archive: PathBuf = dir.path().join("evil.tar");

    {
        let file: fs::File = fs::File::create(&archive).unwrap();
        let mut builder: tar::Builder<fs::File> = tar::Builder::new(file);
        let data: &[u8] = b"gotcha";
        let mut header: tar::Header = tar::Header::new_gnu();
        let name: &[u8] = b"../evil.txt";
        header.as_old_mut().name[..name.len()].copy_from_slice(name);
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append(&header, data).unwrap();
        builder.into_inner().unwrap().flush().unwrap();
    }

    let out: PathBuf = dir.path().join("out");
    let result = unpack(&archive, &out);
    assert!(matches!(result, Err(ArchiveError::UnsafeEntry { .. })));
    assert!(!dir.path().join("evil.txt").exists());
}

#[test]
fn test_parent_directory_creation_failure() {
    let dir: tempfile::TempDir = tempfile::tempdir().unwrap();
    let src: PathBuf = create_tree(dir.path());
    let archive: PathBuf = dir.path().join("sample.tar");
    pack(&archive, &[src]).unwrap();

    // A regular file where the output directory tree should go.
    let out: PathBuf = dir.path().join("out");
    fs::create_dir_all(&out).unwrap();
    fs::write(out.join("sample"), b"in the way").unwrap();

    let result = unpack(&archive, &out);
    assert!(matches!(result, Err(ArchiveError::CreateDirectory { .. })));
}
