//! Integration tests for streaming archive extraction.

mod common;

use airlock_server::extract::{ExtractError, extract, extract_file};
use common::fixtures::{Entry, build_bundle};
use std::io::Cursor;
use tempfile::tempdir;

#[tokio::test]
async fn extracts_every_regular_file_byte_identical() {
    let bundle = build_bundle(&[
        Entry::File("top.txt", b"top-level"),
        Entry::File("nested/deep/blob.bin", &[0u8, 1, 2, 3, 255]),
        Entry::File("nested/other.txt", b"sibling"),
    ]);

    let dest = tempdir().unwrap();
    let summary = extract(Cursor::new(bundle), dest.path()).await.unwrap();

    assert_eq!(summary.files_written, 3);
    assert_eq!(summary.entries_skipped, 0);
    assert_eq!(std::fs::read(dest.path().join("top.txt")).unwrap(), b"top-level");
    assert_eq!(
        std::fs::read(dest.path().join("nested/deep/blob.bin")).unwrap(),
        vec![0u8, 1, 2, 3, 255]
    );
    assert_eq!(
        std::fs::read(dest.path().join("nested/other.txt")).unwrap(),
        b"sibling"
    );
}

#[tokio::test]
async fn non_file_entries_produce_no_filesystem_objects() {
    let bundle = build_bundle(&[
        Entry::Dir("explicit-dir/"),
        Entry::Symlink("link", "top.txt"),
        Entry::File("top.txt", b"content"),
    ]);

    let dest = tempdir().unwrap();
    let summary = extract(Cursor::new(bundle), dest.path()).await.unwrap();

    assert_eq!(summary.files_written, 1);
    assert_eq!(summary.entries_skipped, 2);
    assert!(dest.path().join("top.txt").is_file());
    // Directories are only created lazily from file paths, and symlinks are
    // never materialized.
    assert!(!dest.path().join("explicit-dir").exists());
    assert!(!dest.path().join("link").exists());
}

#[tokio::test]
async fn parent_directories_created_lazily_and_shared() {
    // No directory entries at all; both files share a parent chain.
    let bundle = build_bundle(&[
        Entry::File("a/b/c/first", b"1"),
        Entry::File("a/b/c/second", b"2"),
        Entry::File("a/b/third", b"3"),
    ]);

    let dest = tempdir().unwrap();
    let summary = extract(Cursor::new(bundle), dest.path()).await.unwrap();

    assert_eq!(summary.files_written, 3);
    assert_eq!(std::fs::read(dest.path().join("a/b/c/second")).unwrap(), b"2");
}

#[tokio::test]
async fn corrupt_stream_rejects() {
    let dest = tempdir().unwrap();
    let err = extract(Cursor::new(b"definitely not gzip".to_vec()), dest.path())
        .await
        .unwrap_err();
    assert!(matches!(err, ExtractError::Archive(_)));
}

#[tokio::test]
async fn truncated_stream_rejects_and_leaves_partial_tree() {
    let bundle = build_bundle(&[
        Entry::File("keep/first", b"written before the corruption point"),
        Entry::File("keep/second", b"never fully arrives"),
    ]);
    let truncated = bundle[..bundle.len() / 2].to_vec();

    let dest = tempdir().unwrap();
    let result = extract(Cursor::new(truncated), dest.path()).await;

    assert!(result.is_err());
    // No implicit cleanup: whatever was written stays for the caller.
}

#[tokio::test]
async fn traversal_entry_paths_are_rejected() {
    let bundle = build_bundle(&[Entry::File("../escape.txt", b"nope")]);

    let dest = tempdir().unwrap();
    let err = extract(Cursor::new(bundle), dest.path()).await.unwrap_err();
    assert!(matches!(err, ExtractError::UnsafePath(_)));
    assert!(!dest.path().parent().unwrap().join("escape.txt").exists());
}

#[tokio::test]
async fn extract_file_reads_from_disk() {
    let bundle = build_bundle(&[Entry::File("only.txt", b"from-disk")]);
    let scratch = tempdir().unwrap();
    let archive_path = scratch.path().join("bundle.tar.gz");
    std::fs::write(&archive_path, &bundle).unwrap();

    let dest = tempdir().unwrap();
    let summary = extract_file(&archive_path, dest.path()).await.unwrap();

    assert_eq!(summary.files_written, 1);
    assert_eq!(
        std::fs::read(dest.path().join("only.txt")).unwrap(),
        b"from-disk"
    );
}

#[tokio::test]
async fn missing_archive_file_is_open_error() {
    let dest = tempdir().unwrap();
    let err = extract_file(&dest.path().join("nope.tar.gz"), dest.path())
        .await
        .unwrap_err();
    assert!(matches!(err, ExtractError::Open(_)));
}
