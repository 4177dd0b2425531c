//! Storefront payloads and the release metadata derived from them.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer};
use tracing::warn;

use crate::config::AudioFormat;

// ==================== Fan page ====================

/// Data blob of the account's collection page.
#[derive(Debug, Deserialize)]
pub(crate) struct FanPageBlob {
    pub fan_data: FanData,
    pub collection_data: CollectionData,
    #[serde(default)]
    pub hidden_data: Option<CollectionData>,
    #[serde(default)]
    pub item_cache: ItemCache,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FanData {
    #[serde(deserialize_with = "string_or_number")]
    pub fan_id: Option<String>,
}

/// First page of a collection plus its pagination cursor.
#[derive(Debug, Deserialize)]
pub(crate) struct CollectionData {
    #[serde(default)]
    pub batch_size: u64,
    #[serde(default)]
    pub item_count: u64,
    #[serde(default)]
    pub last_token: Option<String>,
    #[serde(default)]
    pub redownload_urls: Option<HashMap<String, String>>,
}

/// Per-item summaries, split between visible and hidden items.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ItemCache {
    #[serde(default)]
    pub collection: HashMap<String, CachedItem>,
    #[serde(default)]
    pub hidden: HashMap<String, CachedItem>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CachedItem {
    #[serde(default, deserialize_with = "string_or_number")]
    pub sale_item_id: Option<String>,
    #[serde(default)]
    pub band_name: Option<String>,
}

/// One page of `/api/fancollection/1/...`.
#[derive(Debug, Deserialize)]
pub(crate) struct CollectionPage {
    #[serde(default)]
    pub more_available: bool,
    #[serde(default)]
    pub last_token: Option<String>,
    #[serde(default)]
    pub redownload_urls: Option<HashMap<String, String>>,
}

// ==================== Download page ====================

/// Data blob of an item's download page.
#[derive(Debug, Deserialize)]
pub(crate) struct DownloadPageBlob {
    #[serde(default)]
    pub digital_items: Vec<DigitalItem>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DigitalItem {
    #[serde(default)]
    pub downloads: Option<HashMap<String, DownloadLink>>,
    #[serde(default)]
    pub package_release_date: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub download_type: Option<String>,
    #[serde(default)]
    pub download_type_str: Option<String>,
    #[serde(default)]
    pub item_type: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub art_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DownloadLink {
    #[serde(default)]
    pub url: Option<String>,
}

/// Payload of the stat-download endpoint, once unwrapped.
#[derive(Debug, Deserialize)]
pub(crate) struct StatDownload {
    #[serde(default)]
    pub download_url: Option<String>,
}

/// Accepts `"123"`, `123` or `null`.
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Unsigned(u64),
        Signed(i64),
    }

    Ok(
        Option::<Raw>::deserialize(deserializer)?.map(|raw| match raw {
            Raw::Text(s) => s,
            Raw::Unsigned(n) => n.to_string(),
            Raw::Signed(n) => n.to_string(),
        }),
    )
}

// ==================== Release metadata ====================

/// Everything the orchestrator needs to know about one purchased item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseMetadata {
    /// Release title.
    pub title: String,
    /// Artist credited on the release.
    pub artist: String,
    /// Band or label the item was bought from, when the collection lists it.
    pub band_name: Option<String>,
    /// Release date; in the future for pre-orders.
    pub release_date: Option<DateTime<Utc>>,
    /// Single tracks come as one audio file instead of an archive.
    pub is_single_track: bool,
    /// Artwork identifier.
    pub art_id: Option<String>,
    downloads: HashMap<String, String>,
}

impl ReleaseMetadata {
    pub(crate) fn from_digital_item(item: DigitalItem, band_name: Option<String>) -> Self {
        let release_date = item.package_release_date.as_deref().and_then(|raw| {
            let parsed = parse_release_date(raw);
            if parsed.is_none() {
                warn!(date = raw, title = %item.title, "unrecognized release date");
            }
            parsed
        });
        let is_single_track = item.download_type.as_deref() == Some("t")
            || item.download_type_str.as_deref() == Some("track")
            || item.item_type.as_deref() == Some("track");
        let downloads = item
            .downloads
            .unwrap_or_default()
            .into_iter()
            .filter_map(|(format, link)| link.url.map(|url| (format, url)))
            .collect();

        Self {
            title: item.title,
            artist: item.artist,
            band_name,
            release_date,
            is_single_track,
            art_id: item.art_id,
            downloads,
        }
    }

    #[cfg(test)]
    pub(crate) fn for_tests(title: &str, artist: &str) -> Self {
        Self {
            title: title.to_string(),
            artist: artist.to_string(),
            band_name: None,
            release_date: None,
            is_single_track: false,
            art_id: None,
            downloads: HashMap::new(),
        }
    }

    /// Unsigned download link for `format`, if the item offers it.
    #[must_use]
    pub fn download_url(&self, format: AudioFormat) -> Option<&str> {
        self.downloads.get(format.as_str()).map(String::as_str)
    }

    /// Four-digit release year, `0000` when unknown.
    #[must_use]
    pub fn year(&self) -> String {
        self.release_date
            .map_or_else(|| "0000".to_string(), |date| date.format("%Y").to_string())
    }

    /// Whether the release date lies after `now`.
    #[must_use]
    pub fn is_preorder(&self, now: DateTime<Utc>) -> bool {
        self.release_date.is_some_and(|date| date > now)
    }
}

impl fmt::Display for ReleaseMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\" ({}) by {}", self.title, self.year(), self.artist)
    }
}

/// Parses dates such as `08 Jan 2021 00:00:00 GMT`.
pub(crate) fn parse_release_date(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    let without_zone = trimmed
        .strip_suffix("GMT")
        .or_else(|| trimmed.strip_suffix("UTC"))
        .unwrap_or(trimmed)
        .trim_end();
    NaiveDateTime::parse_from_str(without_zone, "%d %b %Y %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn item(json: &str) -> DigitalItem {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_parse_release_date() {
        let date = parse_release_date("08 Jan 2021 00:00:00 GMT").unwrap();
        assert_eq!(date, Utc.with_ymd_and_hms(2021, 1, 8, 0, 0, 0).unwrap());
        assert!(parse_release_date("08 jan 2021 10:20:30").is_some());
        assert!(parse_release_date("2021-01-08").is_none());
    }

    #[test]
    fn test_string_or_number_accepts_both() {
        let blob: FanPageBlob = serde_json::from_str(
            r#"{"fan_data":{"fan_id":123},"collection_data":{"batch_size":1,"item_count":1},
                "item_cache":{"collection":{"a1":{"sale_item_id":"77","band_name":"Band"}}}}"#,
        )
        .unwrap();
        assert_eq!(blob.fan_data.fan_id.as_deref(), Some("123"));
        assert_eq!(
            blob.item_cache.collection["a1"].sale_item_id.as_deref(),
            Some("77")
        );
        assert!(blob.hidden_data.is_none());
    }

    #[test]
    fn test_metadata_from_album() {
        let metadata = ReleaseMetadata::from_digital_item(
            item(
                r#"{"title":"Album","artist":"Artist","package_release_date":"01 Mar 2019 00:00:00 GMT",
                    "download_type":"a","item_type":"album","art_id":4242,
                    "downloads":{"flac":{"url":"https://x/download/album?id=1"},"mp3-v0":{"size_mb":"10"}}}"#,
            ),
            Some("Label".to_string()),
        );
        assert_eq!(metadata.year(), "2019");
        assert!(!metadata.is_single_track);
        assert_eq!(metadata.art_id.as_deref(), Some("4242"));
        assert_eq!(
            metadata.download_url(AudioFormat::Flac),
            Some("https://x/download/album?id=1")
        );
        assert_eq!(metadata.download_url(AudioFormat::Mp3V0), None);
        assert_eq!(metadata.to_string(), "\"Album\" (2019) by Artist");
    }

    #[test]
    fn test_metadata_single_track_and_unknown_year() {
        let metadata =
            ReleaseMetadata::from_digital_item(item(r#"{"title":"T","artist":"A","download_type_str":"track"}"#), None);
        assert!(metadata.is_single_track);
        assert_eq!(metadata.year(), "0000");
        assert!(!metadata.is_preorder(Utc::now()));
    }

    #[test]
    fn test_preorder_detection() {
        let metadata = ReleaseMetadata::from_digital_item(
            item(r#"{"title":"Soon","artist":"A","package_release_date":"01 Jan 2999 00:00:00 GMT"}"#),
            None,
        );
        assert!(metadata.is_preorder(Utc::now()));
    }
}
