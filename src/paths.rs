//! URL path normalization shared by the static shortcut and the backend adapter.

use std::path::{Path, PathBuf};

/// Normalize a URL path into safe segments.
///
/// Empty and `.` segments are dropped and `..` pops the previous segment,
/// never rising above the root. Segments carrying a backslash or NUL are
/// rejected outright since they could be reinterpreted by the host filesystem.
pub fn normalize_segments(url_path: &str) -> Option<Vec<&str>> {
    let mut segments = Vec::new();
    for segment in url_path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s if s.contains('\\') || s.contains('\0') => return None,
            s => segments.push(s),
        }
    }
    Some(segments)
}

/// Join a normalized URL path under `root`.
pub fn join_under(root: &Path, url_path: &str) -> Option<PathBuf> {
    let segments = normalize_segments(url_path)?;
    let mut path = root.to_path_buf();
    path.extend(segments);
    Some(path)
}

/// Split `path?query` into its two halves.
pub fn split_query(url: &str) -> (&str, &str) {
    url.split_once('?').unwrap_or((url, ""))
}
