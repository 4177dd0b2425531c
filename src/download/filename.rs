//! Filename extraction and sanitization for downloads and release folders.
//!
//! Characters that are illegal or troublesome in file names are replaced by
//! visually similar Unicode characters instead of being stripped, so artist
//! and release names stay readable on disk.

use std::path::{Component, Path};

use url::Url;

/// Lookalike substitutions applied anywhere in a name.
pub const UNICODE_CHARS_REPLACEMENTS: [(char, char); 9] = [
    (':', '꞉'),
    ('/', '／'),
    ('\\', '⧹'),
    ('"', '＂'),
    ('*', '⋆'),
    ('<', '＜'),
    ('>', '＞'),
    ('?', '？'),
    ('|', '∣'),
];

/// Lookalike substitutions applied to the last character only.
///
/// Windows accepts periods and spaces inside names but not at their end.
pub const TRAILING_CHAR_REPLACEMENTS: [(char, char); 2] = [('.', '․'), (' ', '\u{2002}')];

/// Replaces filesystem-hostile characters by Unicode lookalikes.
///
/// The lookalike set and the replaced set are disjoint, so applying the
/// function twice yields the same result as applying it once.
#[must_use]
pub fn replace_invalid_chars_by_unicode(name: &str) -> String {
    let mut result: String = name
        .chars()
        .map(|c| {
            UNICODE_CHARS_REPLACEMENTS
                .iter()
                .find(|(old, _)| *old == c)
                .map_or(c, |(_, new)| *new)
        })
        .collect();

    if let Some(last) = result.chars().last()
        && let Some((_, new)) = TRAILING_CHAR_REPLACEMENTS
            .iter()
            .find(|(old, _)| *old == last)
    {
        result.pop();
        result.push(*new);
    }
    result
}

/// Parses Content-Disposition header to extract filename.
///
/// Handles both:
/// - `attachment; filename="example.zip"`
/// - `attachment; filename=example.zip`
/// - `attachment; filename*=UTF-8''example.zip` (RFC 5987)
pub(crate) fn parse_content_disposition(header: &str) -> Option<String> {
    // RFC 5987 form wins when both are present
    if let Some(pos) = header.find("filename*=") {
        let value = header[pos + 10..].trim();
        // Format: charset'language'encoded_value
        if let Some(quote_pos) = value.find("''") {
            let encoded = &value[quote_pos + 2..];
            let end = encoded.find(';').unwrap_or(encoded.len());
            let encoded_name = encoded[..end].trim().trim_matches('"');
            if let Ok(decoded) = urlencoding::decode(encoded_name) {
                return Some(decoded.into_owned());
            }
        }
    }

    if let Some(pos) = header.find("filename=") {
        let value = header[pos + 9..].trim();

        if let Some(stripped) = value.strip_prefix('"') {
            if let Some(end) = stripped.find('"') {
                return Some(stripped[..end].to_string());
            }
        } else {
            let end = value.find(';').unwrap_or(value.len());
            let filename = value[..end].trim();
            if !filename.is_empty() {
                return Some(filename.to_string());
            }
        }
    }

    None
}

/// Sanitizes a remote-suggested filename so it is a single safe path segment.
pub(crate) fn sanitize_filename(name: &str) -> String {
    let sanitized: String = replace_invalid_chars_by_unicode(name)
        .chars()
        .map(|c| if c.is_control() { '_' } else { c })
        .collect();

    if sanitized.is_empty() {
        return "_".to_string();
    }

    if is_safe_filename_segment(&sanitized) {
        sanitized
    } else {
        sanitized
            .chars()
            .map(|c| if c == '.' { '_' } else { c })
            .collect()
    }
}

fn is_safe_filename_segment(name: &str) -> bool {
    !Path::new(name).components().any(|component| {
        matches!(
            component,
            Component::CurDir | Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    })
}

/// Fallback filename derived from the last URL path segment.
pub(crate) fn fallback_filename_from_url(url: &Url) -> String {
    if let Some(mut segments) = url.path_segments()
        && let Some(last) = segments.next_back()
        && !last.is_empty()
    {
        let decoded = urlencoding::decode(last).map_or_else(|_| last.to_string(), |d| d.into_owned());
        return sanitize_filename(&decoded);
    }

    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    format!("download_{timestamp}.bin")
}
