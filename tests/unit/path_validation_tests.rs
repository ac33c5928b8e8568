use std::path::Path;

use acp_bridge::handler::fs::{validate_path, write_text_file};
use acp_bridge::AppError;

fn canonical_tempdir() -> (tempfile::TempDir, std::path::PathBuf) {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = temp.path().canonicalize().expect("canonicalize root");
    (temp, root)
}

#[test]
fn allows_path_inside_root() {
    let (_temp, root) = canonical_tempdir();

    let validated = validate_path(&root, Path::new("src/lib.rs")).expect("path valid");

    assert!(validated.starts_with(&root));
    assert!(validated.ends_with(Path::new("src/lib.rs")));
}

#[test]
fn allows_absolute_path_inside_root() {
    let (_temp, root) = canonical_tempdir();
    let candidate = root.join("notes.md");

    let validated = validate_path(&root, &candidate).expect("path valid");

    assert_eq!(validated, candidate);
}

#[test]
fn rejects_traversal() {
    let (_temp, root) = canonical_tempdir();
    assert!(validate_path(&root, Path::new("../secret.txt")).is_err());
}

#[test]
fn rejects_deep_traversal() {
    let (_temp, root) = canonical_tempdir();
    assert!(validate_path(&root, Path::new("src/../../secret.txt")).is_err());
}

#[test]
fn rejects_absolute_path_outside_root() {
    let (_temp, root) = canonical_tempdir();
    assert!(validate_path(&root, Path::new("/etc/passwd")).is_err());
}

#[test]
fn allows_dot_segment() {
    let (_temp, root) = canonical_tempdir();

    let validated = validate_path(&root, Path::new("./src/main.rs")).expect("path valid");

    assert!(validated.starts_with(&root));
}

#[cfg(unix)]
#[test]
fn rejects_symlink_escaping_root() {
    let (_temp, root) = canonical_tempdir();
    let (_outside_temp, outside) = canonical_tempdir();
    std::fs::write(outside.join("secret.txt"), "s").expect("write");
    std::os::unix::fs::symlink(&outside, root.join("link")).expect("symlink");

    let result = validate_path(&root, Path::new("link/secret.txt"));

    assert!(result.is_err());
}

#[test]
fn new_file_resolves_below_root() {
    let (_temp, root) = canonical_tempdir();

    let validated = validate_path(&root, Path::new("new/dir/file.txt")).expect("path valid");

    assert_eq!(validated, root.join("new/dir/file.txt"));
}

/// A file that does not exist yet under a directory symlinked outside the
/// root is rejected, and a write through it leaves nothing outside.
#[cfg(unix)]
#[tokio::test]
async fn rejects_new_file_under_symlinked_directory() {
    let (_temp, root) = canonical_tempdir();
    let (_outside_temp, outside) = canonical_tempdir();
    std::os::unix::fs::symlink(&outside, root.join("link")).expect("symlink");

    assert!(validate_path(&root, Path::new("link/escaped.txt")).is_err());
    assert!(validate_path(&root, Path::new("link/sub/escaped.txt")).is_err());

    let result = write_text_file(&root, &root.join("link/escaped.txt"), "x").await;

    assert!(matches!(result, Err(AppError::PathViolation(_))));
    assert!(!outside.join("escaped.txt").exists());
}

#[cfg(unix)]
#[tokio::test]
async fn rejects_write_through_dangling_symlink() {
    let (_temp, root) = canonical_tempdir();
    let (_outside_temp, outside) = canonical_tempdir();
    std::os::unix::fs::symlink(outside.join("target.txt"), root.join("dangling"))
        .expect("symlink");

    let result = write_text_file(&root, &root.join("dangling"), "x").await;

    assert!(matches!(result, Err(AppError::PathViolation(_))));
    assert!(!outside.join("target.txt").exists());
}
