//! Path parsing and segment sanitization
//!
//! Logical paths are dot-separated segment sequences. Segments only contain
//! `[A-Za-z0-9_-]`; anything else is sanitized before touching the backend,
//! so a path's joined key is safe to use as an ordered byte-string key.

/// Sanitize one path segment.
///
/// Every run of characters outside `[A-Za-z0-9_-]` collapses to a single
/// `_`. An empty segment becomes the literal segment `null`.
pub fn sanitize_segment(segment: &str) -> String {
    if segment.is_empty() {
        return "null".to_string();
    }
    let mut out = String::with_capacity(segment.len());
    let mut in_run = false;
    for c in segment.chars() {
        if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
            out.push(c);
            in_run = false;
        } else if !in_run {
            out.push('_');
            in_run = true;
        }
    }
    out
}

/// Parse a dotted path string into sanitized segments.
///
/// Runs of consecutive dots collapse before splitting, so `"a..b"` parses
/// the same as `"a.b"`. The result is never empty: `""` parses to
/// `["null"]`.
pub fn parse_path(path: &str) -> Vec<String> {
    let mut collapsed = String::with_capacity(path.len());
    let mut last_dot = false;
    for c in path.chars() {
        if c == '.' {
            if !last_dot {
                collapsed.push('.');
            }
            last_dot = true;
        } else {
            collapsed.push(c);
            last_dot = false;
        }
    }
    collapsed.split('.').map(sanitize_segment).collect()
}

/// Join segments into the flat storage key.
pub fn path_key(segments: &[String]) -> String {
    segments.join(".")
}
