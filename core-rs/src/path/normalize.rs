//! Path normalization for the remote store
//!
//! Every remote call passes through [`assert_disk_path`]; this module is
//! the single chokepoint that makes path handling auditable. Canonical
//! form: leading `/`, single-`/` separators, no scheme artifact, no
//! whitespace touching a separator, no `..` and no `:` in any segment.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::errors::{DiskError, Result};

/// Characters the remote store cannot accept inside a single segment.
static FORBIDDEN: Lazy<Regex> = Lazy::new(|| Regex::new(r#"[/\\:*?"<>|]"#).unwrap());

/// Normalize a raw path to canonical form.
///
/// Fails with `PathSyntax` on empty/whitespace-only input or a `:` inside
/// a segment, and with `PathTraversal` on any `..` segment. Idempotent:
/// `normalize(normalize(p)) == normalize(p)`.
///
/// # Examples
///
/// ```
/// use photodisk_core::path::normalize;
///
/// assert_eq!(normalize(" /disk:/Фото / R1 / ").unwrap(), "/Фото/R1");
/// assert!(normalize("/a/../b").is_err());
/// ```
pub fn normalize(path: &str) -> Result<String> {
    assert_disk_path(path, "normalize")
}

/// [`normalize`] with a caller-supplied stage tag carried in every error.
///
/// # Examples
///
/// ```
/// use photodisk_core::path::assert_disk_path;
///
/// let err = assert_disk_path("/a/../b", "uploadBytes").unwrap_err();
/// assert!(err.to_string().contains("[uploadBytes]"));
/// ```
pub fn assert_disk_path(path: &str, stage: &str) -> Result<String> {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return Err(DiskError::PathSyntax {
            stage: stage.to_string(),
            path: path.to_string(),
            reason: "empty or whitespace-only".to_string(),
        });
    }

    let forward = trimmed.replace('\\', "/");

    // Strip the host-scheme artifact some clients prepend ("disk:/a" or
    // "/disk:/a").
    let stripped = forward
        .strip_prefix("disk:")
        .or_else(|| forward.strip_prefix("/disk:"))
        .unwrap_or(&forward);

    let mut segments: Vec<&str> = Vec::new();
    for raw in stripped.split('/') {
        let seg = raw.trim();
        if seg.is_empty() {
            continue;
        }
        if seg == ".." {
            return Err(DiskError::PathTraversal {
                stage: stage.to_string(),
                path: path.to_string(),
            });
        }
        if seg.contains(':') {
            return Err(DiskError::PathSyntax {
                stage: stage.to_string(),
                path: path.to_string(),
                reason: format!("segment '{}' contains ':'", seg),
            });
        }
        segments.push(seg);
    }

    if segments.is_empty() {
        return Ok("/".to_string());
    }
    Ok(format!("/{}", segments.join("/")))
}

/// Make a string safe to use as a single path segment.
///
/// Substitutes the class `[/\:*?"<>|]` with `_`, removes `..` runs, and
/// truncates to 255 bytes on a char boundary.
pub fn sanitize_segment(s: &str) -> String {
    let replaced = FORBIDDEN.replace_all(s, "_");
    let stripped = replaced.replace("..", "");
    truncate_bytes(stripped.trim(), 255)
}

/// [`sanitize_segment`] that keeps the last `.` extension intact.
pub fn sanitize_filename(name: &str) -> String {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => {
            let ext = sanitize_segment(ext);
            let stem = sanitize_segment(stem);
            let stem_max = 255usize.saturating_sub(ext.len() + 1);
            format!("{}.{}", truncate_bytes(&stem, stem_max), ext)
        }
        _ => sanitize_segment(name),
    }
}

/// Join a normalized directory with one sanitized child segment.
pub fn join(dir: &str, segment: &str) -> String {
    if dir == "/" {
        format!("/{}", segment)
    } else {
        format!("{}/{}", dir, segment)
    }
}

fn truncate_bytes(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}
