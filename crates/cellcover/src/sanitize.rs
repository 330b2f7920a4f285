//! Helpers for sanitizing data before it enters log lines and span fields.

use std::path::Path;

/// Returns only the filename component of a path (no directory).
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}

/// Masks the query string of a URL. CDN links carry signed tokens there.
///
/// - `https://cdn.ttapi.io/a.png?sig=xyz` → `https://cdn.ttapi.io/a.png?****`
/// - `https://cdn.ttapi.io/a.png` → unchanged
pub fn redact_url(url: &str) -> String {
    match url.split_once('?') {
        Some((base, _)) => format!("{}?****", base),
        None => url.to_string(),
    }
}
