//! File requests from the agent, confined to the session working directory.
//!
//! Paths are normalised lexically, `..` segments that climb above the root
//! are rejected, and the deepest existing part of the path is canonicalised
//! so a symlink cannot lead outside the root, even for files not yet created.

use std::path::{Component, Path, PathBuf};

use tracing::debug;

use crate::{AppError, Result};

/// Validate that `candidate` resides within `root`.
///
/// Relative candidates are resolved against `root`. Returns the resolved
/// absolute path on success.
///
/// # Errors
///
/// Returns `AppError::PathViolation` if:
/// - The root cannot be canonicalized.
/// - The candidate path contains `..` segments that escape the root.
/// - The resolved path does not start with the root.
/// - The path, or its deepest existing ancestor, resolves through a symlink
///   to a location outside the root.
pub fn validate_path(root: &Path, candidate: impl AsRef<Path>) -> Result<PathBuf> {
    let root = root
        .canonicalize()
        .map_err(|err| AppError::PathViolation(format!("session root invalid: {err}")))?;

    let candidate = candidate.as_ref();
    let joined = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        root.join(candidate)
    };

    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::ParentDir => {
                if !normalized.pop() {
                    return Err(AppError::PathViolation(
                        "path attempts to escape session root".into(),
                    ));
                }
            }
            Component::CurDir => {}
            Component::RootDir | Component::Prefix(_) => normalized.push(component),
            Component::Normal(part) => normalized.push(part),
        }
    }

    if !normalized.starts_with(&root) {
        return Err(AppError::PathViolation("path outside session root".into()));
    }

    let (existing, rest) = deepest_existing(&normalized);
    let canonical = existing
        .canonicalize()
        .map_err(|err| AppError::PathViolation(format!("cannot resolve path: {err}")))?;

    if !canonical.starts_with(&root) {
        return Err(AppError::PathViolation(
            "symlink target escapes session root".into(),
        ));
    }

    if rest.as_os_str().is_empty() {
        Ok(canonical)
    } else {
        Ok(canonical.join(rest))
    }
}

/// Split `path` into its deepest existing ancestor (possibly itself) and the
/// components below it that do not exist yet. A dangling symlink counts as
/// existing, so canonicalising it fails.
fn deepest_existing(path: &Path) -> (&Path, PathBuf) {
    let mut existing = path;
    let mut missing = Vec::new();
    while std::fs::symlink_metadata(existing).is_err() {
        let (Some(parent), Some(name)) = (existing.parent(), existing.file_name()) else {
            break;
        };
        missing.push(name);
        existing = parent;
    }
    (existing, missing.into_iter().rev().collect())
}

/// Read a text file, optionally starting at 1-based `line` and returning at
/// most `limit` lines.
///
/// # Errors
///
/// - `AppError::PathViolation` from [`validate_path`].
/// - `AppError::Io` if the file cannot be read.
pub async fn read_text_file(
    root: &Path,
    path: &Path,
    line: Option<u32>,
    limit: Option<u32>,
) -> Result<String> {
    let resolved = validate_path(root, path)?;
    let content = tokio::fs::read_to_string(&resolved)
        .await
        .map_err(|err| AppError::Io(format!("cannot read {}: {err}", resolved.display())))?;

    debug!(path = %resolved.display(), bytes = content.len(), "fs: read text file");

    if line.is_none() && limit.is_none() {
        return Ok(content);
    }

    let skip = line.map_or(0, |l| l.saturating_sub(1) as usize);
    let take = limit.map_or(usize::MAX, |l| l as usize);
    Ok(content
        .split_inclusive('\n')
        .skip(skip)
        .take(take)
        .collect())
}

/// Write `content` to a text file, creating missing parent directories.
///
/// # Errors
///
/// - `AppError::PathViolation` from [`validate_path`].
/// - `AppError::Io` if a directory or the file cannot be written.
pub async fn write_text_file(root: &Path, path: &Path, content: &str) -> Result<()> {
    let resolved = validate_path(root, path)?;

    if let Some(parent) = resolved.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|err| AppError::Io(format!("cannot create {}: {err}", parent.display())))?;
    }

    // A link swapped in while the directories were created must not redirect the write.
    let resolved = validate_path(root, &resolved)?;

    tokio::fs::write(&resolved, content)
        .await
        .map_err(|err| AppError::Io(format!("cannot write {}: {err}", resolved.display())))?;

    debug!(path = %resolved.display(), bytes = content.len(), "fs: wrote text file");
    Ok(())
}
