//! Extraction of the JSON blob the storefront embeds in its pages.
//!
//! Fan and download pages carry their state in the `data-blob` attribute of
//! an element with `id="pagedata"`, HTML-escaped.

use std::sync::LazyLock;

use regex::{Captures, Regex};

/// Opening tag of the element with `id="pagedata"`.
#[allow(clippy::expect_used)]
static PAGEDATA_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<[a-z]+\s[^>]*\bid\s*=\s*["']pagedata["'][^>]*>"#)
        .expect("pagedata regex is valid") // Static pattern, safe to panic
});

#[allow(clippy::expect_used)]
static DATA_BLOB_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)\bdata-blob\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
        .expect("data-blob regex is valid") // Static pattern, safe to panic
});

#[allow(clippy::expect_used)]
static TITLE_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("title regex is valid") // Static pattern, safe to panic
});

#[allow(clippy::expect_used)]
static HTML_ENTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(#[xX][0-9a-fA-F]{1,6}|#[0-9]{1,7}|[a-zA-Z]{2,8});")
        .expect("entity regex is valid") // Static pattern, safe to panic
});

/// Returns the decoded `data-blob` of the `#pagedata` element, if any.
pub(crate) fn extract_data_blob(html: &str) -> Option<String> {
    let tag = PAGEDATA_TAG.find(html)?;
    let captures = DATA_BLOB_ATTR.captures(tag.as_str())?;
    let raw = captures.get(1).or_else(|| captures.get(2))?.as_str();
    Some(html_unescape(raw))
}

/// Returns the trimmed, decoded text of the page `<title>`.
pub(crate) fn extract_title(html: &str) -> Option<String> {
    let captures = TITLE_TAG.captures(html)?;
    let title = html_unescape(captures.get(1)?.as_str().trim());
    let title = title.split_whitespace().collect::<Vec<_>>().join(" ");
    (!title.is_empty()).then_some(title)
}

/// Decodes named and numeric character references in one pass.
///
/// Unknown named references are left untouched.
pub(crate) fn html_unescape(value: &str) -> String {
    HTML_ENTITY
        .replace_all(value, |caps: &Captures<'_>| {
            let entity = &caps[1];
            let decoded = if let Some(hex) = entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
            {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = entity.strip_prefix('#') {
                dec.parse::<u32>().ok().and_then(char::from_u32)
            } else {
                match entity {
                    "quot" => Some('"'),
                    "amp" => Some('&'),
                    "lt" => Some('<'),
                    "gt" => Some('>'),
                    "apos" => Some('\''),
                    "nbsp" => Some('\u{00a0}'),
                    _ => None,
                }
            };
            decoded.map_or_else(|| caps[0].to_string(), |c| c.to_string())
        })
        .into_owned()
}
