use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;

/// Longest base name (without extension) kept on disk.
pub const MAX_STEM_LEN: usize = 100;

lazy_static! {
    static ref UNSAFE_CHARS: Regex = Regex::new(r"[^A-Za-z0-9._-]").expect("valid regex");
}

/// Reduce a client-supplied filename to a safe single path component.
///
/// Directory parts are dropped, `..` and every character outside
/// `[A-Za-z0-9._-]` become `_`, and the stem is capped at [`MAX_STEM_LEN`].
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or_default();
    let replaced = base.replace("..", "_");
    let cleaned = UNSAFE_CHARS.replace_all(&replaced, "_");
    let cleaned = cleaned.trim_matches(|c: char| c == '.' || c == '_');

    let (stem, ext) = match cleaned.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => (stem, Some(ext)),
        _ => (cleaned, None),
    };

    let mut stem: String = stem.chars().take(MAX_STEM_LEN).collect();
    if stem.is_empty() {
        stem.push_str("upload");
    }

    match ext {
        Some(ext) => format!("{}.{}", stem, ext),
        None => stem,
    }
}

/// Unique on-disk name: a microsecond timestamp prefix plus the sanitized name.
pub fn storage_name(original: &str, now: DateTime<Utc>) -> String {
    format!("{}_{}", now.format("%Y%m%d_%H%M%S_%6f"), sanitize_filename(original))
}
