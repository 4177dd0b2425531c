//! Cookie file parsers.
//!
//! Two export formats are understood:
//! - the Netscape HTTP cookie file (7 TAB-separated fields per line), as
//!   written by curl, yt-dlp or the "cookies.txt" browser extensions;
//! - a JSON array of `{"Name raw": .., "Content raw": ..}` records, as
//!   written by the "Cookie Quick Manager" Firefox add-on.
//!
//! [`load_credentials_from_file`] picks the right parser and turns the result
//! into a [`CredentialSet`].

use std::collections::BTreeMap;
use std::fmt;
use std::io::BufRead;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use super::CredentialSet;
use crate::Error;

/// Prefix curl puts in front of the domain of `HttpOnly` cookies.
const HTTP_ONLY_PREFIX: &str = "#HttpOnly_";

/// A single parsed cookie from a Netscape-format cookie file.
///
/// The value field is intentionally redacted in Debug output to prevent
/// accidental logging of sensitive cookie data.
#[derive(Clone)]
pub struct CookieLine {
    /// The domain the cookie belongs to (e.g., `.bandcamp.com`).
    pub domain: String,
    /// Unix timestamp for expiry (0 = session cookie).
    pub expires: u64,
    /// Cookie name.
    pub name: String,
    /// Cookie value (sensitive, never log).
    value: String,
}

impl CookieLine {
    /// Returns the cookie value.
    ///
    /// Cookie values are sensitive; avoid logging the return value.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl fmt::Debug for CookieLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CookieLine")
            .field("domain", &self.domain)
            .field("expires", &self.expires)
            .field("name", &self.name)
            .field("value", &"[REDACTED]")
            .finish()
    }
}

/// Errors that can occur while parsing a cookie file.
#[derive(Debug, thiserror::Error)]
pub enum CookieError {
    /// A line in the cookie file has an invalid format.
    #[error("line {line_number}: {reason}")]
    InvalidLine {
        /// 1-based line number in the cookie file.
        line_number: usize,
        /// Description of what was wrong.
        reason: String,
    },

    /// I/O error reading the cookie file.
    #[error("failed to read cookie file: {0}")]
    Io(#[from] std::io::Error),

    /// No valid cookies found in the file.
    #[error("no valid cookies found in file ({malformed_count} lines failed to parse)")]
    NoCookiesFound {
        /// Number of malformed lines encountered.
        malformed_count: usize,
    },

    /// The JSON form is not an array of cookie records.
    #[error("not well formed: {0}")]
    MalformedJson(#[from] serde_json::Error),

    /// A JSON cookie record lacks one of its two mandatory fields.
    #[error("missing '{field}' field in cookie number {record}")]
    MissingField {
        /// `Name raw` or `Content raw`.
        field: &'static str,
        /// 1-based index of the record in the array.
        record: usize,
    },
}

/// Result of parsing a cookie file, including successfully parsed cookies
/// and any warnings about malformed lines.
#[derive(Debug)]
pub struct ParseResult {
    /// Successfully parsed cookies.
    pub cookies: Vec<CookieLine>,
    /// Warnings for malformed lines (line number and reason).
    pub warnings: Vec<(usize, String)>,
}

impl ParseResult {
    /// Collapses the parsed cookies into a name to value map.
    ///
    /// When a name appears several times the last occurrence wins.
    #[must_use]
    pub fn into_map(self) -> BTreeMap<String, String> {
        self.cookies
            .into_iter()
            .map(|cookie| (cookie.name, cookie.value))
            .collect()
    }
}

/// Parses a Netscape-format cookie file from a buffered reader.
///
/// Each non-comment, non-blank line must contain exactly 7 TAB-separated fields:
/// `domain`, `tailmatch`, `path`, `secure`, `expires`, `name`, `value`.
/// Only the domain, expiry, name and value are kept.
///
/// Lines starting with `#` and blank lines are skipped, except for curl's
/// `#HttpOnly_` domain prefix which marks a regular cookie line.
///
/// # Errors
///
/// Returns [`CookieError::Io`] on read failure, or
/// [`CookieError::NoCookiesFound`] when the file yields zero valid cookies.
/// Individual malformed lines are collected as warnings (partial success).
#[instrument(level = "debug", skip(reader))]
pub fn parse_netscape_cookies(reader: impl BufRead) -> Result<ParseResult, CookieError> {
    let mut cookies = Vec::new();
    let mut warnings = Vec::new();

    for (idx, line_result) in reader.lines().enumerate() {
        let line_number = idx + 1;
        let line = line_result?;
        let line = line.trim_end();

        if line.is_empty() {
            continue;
        }

        let line = match line.strip_prefix(HTTP_ONLY_PREFIX) {
            Some(rest) => rest,
            None if line.starts_with('#') => continue,
            None => line,
        };

        match parse_cookie_line(line, line_number) {
            Ok(cookie) => {
                debug!(
                    line = line_number,
                    domain = %cookie.domain,
                    name = %cookie.name,
                    "parsed cookie"
                );
                cookies.push(cookie);
            }
            Err(e) => {
                warn!(line = line_number, reason = %e, "skipping malformed cookie line");
                warnings.push((line_number, e.to_string()));
            }
        }
    }

    if cookies.is_empty() {
        return Err(CookieError::NoCookiesFound {
            malformed_count: warnings.len(),
        });
    }

    Ok(ParseResult { cookies, warnings })
}

/// Parses a single cookie line into a `CookieLine`.
fn parse_cookie_line(line: &str, line_number: usize) -> Result<CookieLine, CookieError> {
    let fields: Vec<&str> = line.split('\t').collect();

    if fields.len() != 7 {
        return Err(CookieError::InvalidLine {
            line_number,
            reason: format!("expected 7 TAB-separated fields, found {}", fields.len()),
        });
    }

    let name = fields[5].to_string();
    if name.is_empty() {
        return Err(CookieError::InvalidLine {
            line_number,
            reason: "cookie name field is empty".to_string(),
        });
    }

    // Browser exports sometimes write fractional or negative expiries
    let expires = fields[4].parse::<u64>().unwrap_or_else(|_| {
        debug!(line = line_number, "unreadable expires field, treating as session cookie");
        0
    });

    Ok(CookieLine {
        domain: fields[0].to_string(),
        expires,
        name,
        value: fields[6].to_string(),
    })
}

#[derive(Debug, Deserialize)]
struct JsonCookieRecord {
    #[serde(rename = "Name raw")]
    name_raw: Option<String>,
    #[serde(rename = "Content raw")]
    content_raw: Option<String>,
}

/// Parses the JSON cookie export format.
///
/// # Errors
///
/// Returns [`CookieError::MalformedJson`] if the document is not an array of
/// objects, and [`CookieError::MissingField`] if a record has an empty or
/// missing `Name raw` / `Content raw`.
pub fn parse_json_cookies(data: &str) -> Result<BTreeMap<String, String>, CookieError> {
    let records: Vec<JsonCookieRecord> = serde_json::from_str(data)?;
    let mut content = BTreeMap::new();
    for (idx, record) in records.into_iter().enumerate() {
        let record_number = idx + 1;
        let value = record
            .content_raw
            .filter(|value| !value.is_empty())
            .ok_or(CookieError::MissingField {
                field: "Content raw",
                record: record_number,
            })?;
        let name = record
            .name_raw
            .filter(|name| !name.is_empty())
            .ok_or(CookieError::MissingField {
                field: "Name raw",
                record: record_number,
            })?;
        content.insert(name, value);
    }
    Ok(content)
}

fn looks_like_json(path: &Path, data: &str) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
        || data.trim_start().starts_with(['[', '{'])
}

/// Loads a user-supplied cookies file into a credential set.
///
/// The JSON parser is used for `.json` files and for content that starts with
/// `[` or `{`; anything else is read as a Netscape cookie file.
///
/// # Errors
///
/// Returns [`Error::Configuration`] naming the file when it does not exist,
/// cannot be read, or holds no usable cookies.
#[instrument(level = "debug")]
pub fn load_credentials_from_file(path: &Path) -> Result<CredentialSet, Error> {
    if !path.exists() {
        return Err(Error::Configuration(format!(
            "Cookies file '{}' cannot be found.",
            path.display()
        )));
    }
    let data = std::fs::read_to_string(path).map_err(|e| {
        Error::Configuration(format!(
            "Cookies file '{}' cannot be read: {e}",
            path.display()
        ))
    })?;

    let parsed = if looks_like_json(path, &data) {
        parse_json_cookies(&data)
    } else {
        parse_netscape_cookies(data.as_bytes()).map(ParseResult::into_map)
    };
    let content = parsed.map_err(|e| {
        Error::Configuration(format!(
            "Cookies file '{}' is not well formed: {e}",
            path.display()
        ))
    })?;

    info!(path = %path.display(), cookies = content.len(), "loaded cookies file");
    Ok(CredentialSet::new(path.display().to_string(), content))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Cursor;

    use tempfile::TempDir;

    fn cursor(s: &str) -> Cursor<&[u8]> {
        Cursor::new(s.as_bytes())
    }

    #[test]
    fn test_parse_netscape_cookies_valid_file() {
        let input = "\
# Netscape HTTP Cookie File
.bandcamp.com\tTRUE\t/\tFALSE\t0\tsession\tabc123
.bandcamp.com\tTRUE\t/\tTRUE\t1700000000\tidentity\txyz789
";
        let result = parse_netscape_cookies(cursor(input)).unwrap();
        assert_eq!(result.cookies.len(), 2);
        assert!(result.warnings.is_empty());

        assert_eq!(result.cookies[0].domain, ".bandcamp.com");
        assert_eq!(result.cookies[0].expires, 0);
        assert_eq!(result.cookies[0].name, "session");
        assert_eq!(result.cookies[0].value(), "abc123");
        assert_eq!(result.cookies[1].expires, 1_700_000_000);
    }

    #[test]
    fn test_parse_netscape_cookies_http_only_prefix() {
        let input = "#HttpOnly_.bandcamp.com\tTRUE\t/\tTRUE\t0\tidentity\tsecret\n";
        let result = parse_netscape_cookies(cursor(input)).unwrap();
        assert_eq!(result.cookies.len(), 1);
        assert_eq!(result.cookies[0].domain, ".bandcamp.com");
        assert_eq!(result.cookies[0].name, "identity");
    }

    #[test]
    fn test_parse_netscape_cookies_malformed_lines_with_line_numbers() {
        let input = "\
# Header
.good.com\tTRUE\t/\tFALSE\t0\tname\tvalue
bad line without tabs
.also-good.com\tTRUE\t/\tFALSE\t0\tother\tval
";
        let result = parse_netscape_cookies(cursor(input)).unwrap();
        assert_eq!(result.cookies.len(), 2, "should parse 2 valid cookies");
        assert_eq!(result.warnings.len(), 1, "should have 1 warning");
        assert_eq!(result.warnings[0].0, 3, "warning should be for line 3");
        assert!(
            result.warnings[0]
                .1
                .contains("expected 7 TAB-separated fields"),
            "warning should mention field count"
        );
    }

    #[test]
    fn test_parse_netscape_cookies_only_comments_is_error() {
        let input = "# Netscape HTTP Cookie File\n# comment\n";
        let result = parse_netscape_cookies(cursor(input));
        assert!(matches!(
            result,
            Err(CookieError::NoCookiesFound { malformed_count: 0 })
        ));
    }

    #[test]
    fn test_parse_netscape_cookies_all_malformed_returns_error() {
        let input = "bad line one\nanother bad line\n";
        let err = parse_netscape_cookies(cursor(input)).unwrap_err();
        assert!(
            matches!(err, CookieError::NoCookiesFound { malformed_count: 2 }),
            "expected NoCookiesFound with 2 malformed, got: {err}"
        );
    }

    #[test]
    fn test_parse_netscape_cookies_empty_name_rejected() {
        let input = ".example.com\tTRUE\t/\tFALSE\t0\t\tvalue\n";
        assert!(parse_netscape_cookies(cursor(input)).is_err());
    }

    #[test]
    fn test_parse_netscape_cookies_unreadable_expiry_is_session() {
        let input = ".bandcamp.com\tTRUE\t/\tFALSE\t1.7e9\tname\tvalue\n";
        let result = parse_netscape_cookies(cursor(input)).unwrap();
        assert_eq!(result.cookies[0].expires, 0);
    }

    #[test]
    fn test_parse_netscape_cookies_crlf_line_endings() {
        let input = "# Header\r\n.example.com\tTRUE\t/\tFALSE\t0\tname\tvalue\r\n";
        let result = parse_netscape_cookies(cursor(input)).unwrap();
        assert_eq!(result.cookies[0].value(), "value");
    }

    #[test]
    fn test_into_map_last_occurrence_wins() {
        let input = "\
.bandcamp.com\tTRUE\t/\tFALSE\t0\tsession\told
.bandcamp.com\tTRUE\t/\tFALSE\t0\tsession\tnew
";
        let map = parse_netscape_cookies(cursor(input)).unwrap().into_map();
        assert_eq!(map.len(), 1);
        assert_eq!(map["session"], "new");
    }

    #[test]
    fn test_cookie_line_debug_redacts_value() {
        let cookie = CookieLine {
            domain: ".bandcamp.com".to_string(),
            expires: 0,
            name: "identity".to_string(),
            value: "super_secret_token".to_string(),
        };
        let debug_str = format!("{cookie:?}");
        assert!(debug_str.contains("[REDACTED]"));
        assert!(!debug_str.contains("super_secret_token"));
    }

    #[test]
    fn test_parse_json_cookies_valid() {
        let data = r#"[
            {"Name raw": "identity", "Content raw": "abc", "Host raw": "https://.bandcamp.com/"},
            {"Name raw": "session", "Content raw": "def"}
        ]"#;
        let map = parse_json_cookies(data).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map["identity"], "abc");
    }

    #[test]
    fn test_parse_json_cookies_missing_content_names_record() {
        let data = r#"[{"Name raw": "a", "Content raw": "1"}, {"Name raw": "b"}]"#;
        let err = parse_json_cookies(data).unwrap_err();
        assert_eq!(err.to_string(), "missing 'Content raw' field in cookie number 2");
    }

    #[test]
    fn test_parse_json_cookies_empty_name_is_missing() {
        let data = r#"[{"Name raw": "", "Content raw": "1"}]"#;
        let err = parse_json_cookies(data).unwrap_err();
        assert!(matches!(
            err,
            CookieError::MissingField {
                field: "Name raw",
                record: 1
            }
        ));
    }

    #[test]
    fn test_parse_json_cookies_object_is_malformed() {
        let err = parse_json_cookies(r#"{"cookies": []}"#).unwrap_err();
        assert!(matches!(err, CookieError::MalformedJson(_)));
    }

    #[test]
    fn test_load_credentials_missing_file_names_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nope.json");
        let err = load_credentials_from_file(&path).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert!(err.to_string().contains("nope.json"), "got: {err}");
    }

    #[test]
    fn test_load_credentials_detects_json_by_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cookies.txt");
        std::fs::write(&path, r#"[{"Name raw": "identity", "Content raw": "abc"}]"#).unwrap();
        let credentials = load_credentials_from_file(&path).unwrap();
        assert_eq!(credentials.len(), 1);
        assert_eq!(credentials.source(), path.display().to_string());
    }

    #[test]
    fn test_load_credentials_netscape() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cookies.txt");
        std::fs::write(
            &path,
            "# Netscape HTTP Cookie File\n.bandcamp.com\tTRUE\t/\tTRUE\t0\tidentity\tabc\n",
        )
        .unwrap();
        let credentials = load_credentials_from_file(&path).unwrap();
        assert_eq!(credentials.cookie_header(), "identity=abc");
    }

    #[test]
    fn test_load_credentials_garbage_is_configuration_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cookies.txt");
        std::fs::write(&path, "this is not a cookie file\n").unwrap();
        let err = load_credentials_from_file(&path).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert!(err.to_string().contains("cookies.txt"));
    }
}
