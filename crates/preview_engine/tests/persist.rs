use std::fs;

use preview_engine::{ensure_dir, AtomicFileWriter};
use tempfile::TempDir;

#[test]
fn creates_missing_output_dir() {
    let temp = TempDir::new().unwrap();
    let new_dir = temp.path().join("out");
    assert!(!new_dir.exists());
    ensure_dir(&new_dir).unwrap();
    assert!(new_dir.is_dir());
}

#[test]
fn atomic_write_replaces_existing() {
    let temp = TempDir::new().unwrap();
    let writer = AtomicFileWriter::new(temp.path().to_path_buf());

    let first = writer.write("0001_thumb.jpg", b"hello").unwrap();
    assert_eq!(first.file_name().unwrap(), "0001_thumb.jpg");
    assert_eq!(fs::read(&first).unwrap(), b"hello");

    let second = writer.write("0001_thumb.jpg", b"world").unwrap();
    assert_eq!(first, second);
    assert_eq!(fs::read(&second).unwrap(), b"world");
    assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 1);
}

#[test]
fn no_partial_file_on_error() {
    let temp = TempDir::new().unwrap();
    let file_path = temp.path().join("not_a_dir");
    fs::write(&file_path, "x").unwrap();

    let writer = AtomicFileWriter::new(file_path.clone());
    let result = writer.write("summary.json", b"{}");
    assert!(result.is_err());
    assert!(!file_path.with_file_name("summary.json").exists());
}
