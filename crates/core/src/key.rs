//! Object key naming
//!
//! Maps a local file below an upload root to a remote object key. The
//! computation is purely lexical: the filesystem is never consulted, so
//! `..` components are resolved textually and anything that escapes the
//! root is rejected.

use std::path::{Component, Path};

use crate::error::{Error, Result};

/// Compute the object key for `file` uploaded from `root` under `prefix`.
///
/// Only the platform's own separators split segments, so a `\` in a Unix
/// file name stays part of that name. Empty and `.` segments are dropped.
/// The result never starts with `/` and never contains `..`.
///
/// # Errors
/// Returns [`Error::InvalidPath`] if `file` is not strictly below `root`,
/// or if `prefix` contains a `.` or `..` segment.
pub fn compute_key(root: &Path, file: &Path, prefix: &str) -> Result<String> {
    let root_path = LexicalPath::parse(root);
    let file_path = LexicalPath::parse(file);

    if root_path.anchor != file_path.anchor
        || !file_path.segments.starts_with(&root_path.segments)
    {
        return Err(Error::InvalidPath(format!(
            "{} is not inside {}",
            file.display(),
            root.display()
        )));
    }

    let relative = &file_path.segments[root_path.segments.len()..];
    if relative.is_empty() {
        return Err(Error::InvalidPath(format!(
            "{} has no path relative to the upload root",
            file.display()
        )));
    }
    if relative.iter().any(|s| s == "..") {
        return Err(Error::InvalidPath(format!(
            "{} escapes {}",
            file.display(),
            root.display()
        )));
    }

    let mut segments = prefix_segments(prefix)?;
    segments.extend(relative.iter().map(String::as_str));
    Ok(segments.join("/"))
}

/// Normalize a key prefix: drop empty segments and surrounding slashes.
///
/// Returns an empty string for an empty (or all-slash) prefix.
pub fn normalize_prefix(prefix: &str) -> Result<String> {
    Ok(prefix_segments(prefix)?.join("/"))
}

/// Key used for a single file when the caller gives none: its file name
/// under `prefix`.
pub fn default_key(file: &Path, prefix: &str) -> Result<String> {
    let name = file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| Error::InvalidPath(format!("{} has no file name", file.display())))?;

    let mut segments = prefix_segments(prefix)?;
    segments.push(&name);
    Ok(segments.join("/"))
}

/// Check a caller-supplied key: non-empty, no leading `/`, no `.` or `..`
/// segments.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::InvalidPath("object key is empty".into()));
    }
    if key.starts_with('/') {
        return Err(Error::InvalidPath(format!(
            "object key '{key}' starts with '/'"
        )));
    }
    if key.split('/').any(|s| s == "." || s == "..") {
        return Err(Error::InvalidPath(format!(
            "object key '{key}' contains a relative segment"
        )));
    }
    Ok(())
}

fn prefix_segments(prefix: &str) -> Result<Vec<&str>> {
    let segments: Vec<&str> = prefix.split('/').filter(|s| !s.is_empty()).collect();
    if segments.iter().any(|s| *s == "." || *s == "..") {
        return Err(Error::InvalidPath(format!(
            "prefix '{prefix}' contains a relative segment"
        )));
    }
    Ok(segments)
}

/// A path reduced to its normal segments, with `.` and `..` resolved
struct LexicalPath {
    /// Drive prefix and root marker, e.g. `C:/` on Windows or `/` on Unix
    anchor: String,
    segments: Vec<String>,
}

impl LexicalPath {
    fn parse(path: &Path) -> Self {
        let mut anchor = String::new();
        let mut segments: Vec<String> = Vec::new();

        for component in path.components() {
            match component {
                Component::Prefix(prefix) => {
                    anchor.push_str(&prefix.as_os_str().to_string_lossy());
                }
                Component::RootDir => anchor.push('/'),
                Component::CurDir => {}
                Component::ParentDir => match segments.last() {
                    Some(last) if last != ".." => {
                        segments.pop();
                    }
                    // `/..` is `/`
                    None if !anchor.is_empty() => {}
                    _ => segments.push("..".to_string()),
                },
                Component::Normal(name) => segments.push(name.to_string_lossy().into_owned()),
            }
        }

        Self { anchor, segments }
    }
}
