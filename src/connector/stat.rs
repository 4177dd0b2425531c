//! Stat-download resolution helpers.
//!
//! The storefront hands out unsigned `/download/` links. Asking the matching
//! `/statdownload/` endpoint returns a JavaScript callback whose JSON argument
//! carries the signed, short-lived link.

use std::sync::LazyLock;

use rand::Rng;
use regex::Regex;
use url::Url;

use super::model::StatDownload;
use super::pagedata::html_unescape;
use crate::Error;

#[allow(clippy::expect_used)]
static CALLBACK_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"if\s*\(\s*window\.Downloads\s*\)\s*\{\s*Downloads\.statResult\s*\(\s*")
        .expect("stat prefix regex is valid") // Static pattern, safe to panic
});

#[allow(clippy::expect_used)]
static CALLBACK_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s*\)\s*\};?").expect("stat suffix regex is valid") // Static pattern, safe to panic
});

/// Builds the stat-download URL for an unsigned download link.
///
/// # Errors
///
/// Returns [`Error::Parse`] if `download_url` is not a valid URL.
pub(crate) fn stat_download_url(download_url: &str, force_https: bool) -> Result<String, Error> {
    let mut url = Url::parse(download_url)
        .map_err(|e| Error::parse(download_url, format!("invalid download URL: {e}")))?;

    let path = url.path().replacen("/download/", "/statdownload/", 1);
    url.set_path(&path);
    if force_https && url.scheme() == "http" {
        // Only fails for special/non-special scheme swaps, never http -> https.
        let _ = url.set_scheme("https");
    }

    let nonce: u32 = rand::thread_rng().r#gen();
    url.query_pairs_mut()
        .append_pair(".vrs", "1")
        .append_pair(".rand", &nonce.to_string());
    Ok(url.into())
}

/// Extracts the signed link from a stat-download response body.
///
/// Returns `Ok(None)` when the payload parses but holds no `download_url`.
///
/// # Errors
///
/// Returns [`Error::Parse`] when no JSON object can be found in `body`.
pub(crate) fn parse_stat_response(url: &str, body: &str) -> Result<Option<String>, Error> {
    let unwrapped = CALLBACK_PREFIX.replace_all(body, "");
    let unwrapped = CALLBACK_SUFFIX.replace_all(&unwrapped, "");

    let json = match (unwrapped.find('{'), unwrapped.rfind('}')) {
        (Some(start), Some(end)) if start < end => &unwrapped[start..=end],
        _ => return Err(Error::parse(url, "no JSON payload in stat-download response")),
    };

    let parsed: StatDownload = serde_json::from_str(json)
        .or_else(|_| serde_json::from_str(&html_unescape(json)))
        .map_err(|e| Error::parse(url, format!("invalid stat-download payload: {e}")))?;
    Ok(parsed.download_url.filter(|link| !link.is_empty()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_stat_download_url_rewrites_path_and_scheme() {
        let stat = stat_download_url(
            "http://popplers5.bandcamp.com/download/album?enc=flac&id=123&sig=abc",
            true,
        )
        .unwrap();
        let parsed = Url::parse(&stat).unwrap();
        assert_eq!(parsed.scheme(), "https");
        assert_eq!(parsed.path(), "/statdownload/album");
        let pairs: Vec<(String, String)> = parsed.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("enc".to_string(), "flac".to_string())));
        assert!(pairs.contains(&(".vrs".to_string(), "1".to_string())));
        assert!(pairs.iter().any(|(k, _)| k == ".rand"));
    }

    #[test]
    fn test_stat_download_url_keeps_scheme_when_not_forced() {
        let stat = stat_download_url("http://127.0.0.1:8080/download/track?id=9", false).unwrap();
        assert!(stat.starts_with("http://127.0.0.1:8080/statdownload/track?id=9&.vrs=1&.rand="));
    }

    #[test]
    fn test_stat_download_url_rejects_garbage() {
        assert!(matches!(
            stat_download_url("not a url", true),
            Err(Error::Parse { .. })
        ));
    }

    #[test]
    fn test_parse_stat_response_callback_wrapper() {
        let body = r#"if ( window.Downloads ) { Downloads.statResult ( {"result":"ok","download_url":"https://signed/1"} ) };"#;
        assert_eq!(
            parse_stat_response("u", body).unwrap().as_deref(),
            Some("https://signed/1")
        );
    }

    #[test]
    fn test_parse_stat_response_inside_html() {
        let body = "<html><body>if (window.Downloads) { Downloads.statResult({&quot;download_url&quot;:&quot;https://signed/2&quot;}) };</body></html>";
        assert_eq!(
            parse_stat_response("u", body).unwrap().as_deref(),
            Some("https://signed/2")
        );
    }

    #[test]
    fn test_parse_stat_response_without_signed_url() {
        let body = r#"{"result":"err","url":"https://unsigned"}"#;
        assert_eq!(parse_stat_response("u", body).unwrap(), None);
    }

    #[test]
    fn test_parse_stat_response_no_json() {
        assert!(matches!(
            parse_stat_response("u", "Service unavailable"),
            Err(Error::Parse { .. })
        ));
    }
}
