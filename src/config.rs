//! Runtime configuration of a download run.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::Error;
use crate::download::{DEFAULT_BACKOFF, DEFAULT_MAX_RETRIES, RetryPolicy};

/// Default per-request timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 50_000;

/// Default number of parallel workers.
pub const DEFAULT_JOBS: usize = 4;

/// Upper bound on parallel workers.
pub const MAX_JOBS: usize = 64;

/// Name of the completion cache file inside the download folder.
pub const CACHE_FILE_NAME: &str = "bandcamp-collection-downloader.cache";

/// Default storefront origin.
pub const DEFAULT_BASE_URL: &str = "https://bandcamp.com";

/// Default artwork host.
pub const DEFAULT_ART_BASE_URL: &str = "https://f4.bcbits.com";

/// Audio formats offered by the storefront for purchased releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AudioFormat {
    /// FLAC
    Flac,
    /// WAV
    Wav,
    /// AAC (high quality)
    AacHi,
    /// MP3 320 kbps
    Mp3_320,
    /// AIFF
    AiffLossless,
    /// Ogg Vorbis
    #[default]
    Vorbis,
    /// MP3 V0
    Mp3V0,
    /// Apple Lossless
    Alac,
}

impl AudioFormat {
    /// Every format, in the order shown by `--help`.
    pub const ALL: [AudioFormat; 8] = [
        Self::Flac,
        Self::Wav,
        Self::AacHi,
        Self::Mp3_320,
        Self::AiffLossless,
        Self::Vorbis,
        Self::Mp3V0,
        Self::Alac,
    ];

    /// Key of the format in the storefront's `downloads` map.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Flac => "flac",
            Self::Wav => "wav",
            Self::AacHi => "aac-hi",
            Self::Mp3_320 => "mp3-320",
            Self::AiffLossless => "aiff-lossless",
            Self::Vorbis => "vorbis",
            Self::Mp3V0 => "mp3-v0",
            Self::Alac => "alac",
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AudioFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|format| format.as_str() == wanted)
            .ok_or_else(|| {
                let names: Vec<&str> = Self::ALL.iter().map(|f| f.as_str()).collect();
                format!(
                    "unknown audio format '{s}'. Possible values: {}",
                    names.join(", ")
                )
            })
    }
}

/// How release folders are grouped under the download folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FolderLayout {
    /// `<artist>/<year> - <title>`
    #[default]
    Artist,
    /// `<band or label>/<year> - <title>`, using the collection's band name.
    Band,
}

impl fmt::Display for FolderLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Artist => "artist",
            Self::Band => "band",
        })
    }
}

impl FromStr for FolderLayout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "artist" => Ok(Self::Artist),
            "band" => Ok(Self::Band),
            other => Err(format!(
                "unknown folder layout '{other}'. Possible values: artist, band"
            )),
        }
    }
}

/// Where the storefront lives. Overridden by tests to target a mock server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorefrontEndpoints {
    /// Origin of the fan pages and the collection API, without trailing slash.
    pub base_url: String,
    /// Origin of the artwork images, without trailing slash.
    pub art_base_url: String,
    /// Rewrite `http:` stat-download URLs to `https:`.
    pub force_https_stat: bool,
}

impl Default for StorefrontEndpoints {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            art_base_url: DEFAULT_ART_BASE_URL.to_string(),
            force_https_stat: true,
        }
    }
}

impl StorefrontEndpoints {
    /// Endpoints for a single origin serving pages, API and artwork.
    #[must_use]
    pub fn local(origin: &str) -> Self {
        let origin = origin.trim_end_matches('/').to_string();
        Self {
            base_url: origin.clone(),
            art_base_url: origin,
            force_https_stat: false,
        }
    }
}

/// Everything a run needs to know.
#[derive(Debug, Clone)]
pub struct DownloaderConfig {
    /// Storefront account whose collection is mirrored.
    pub account: String,
    /// Explicit cookies file; when absent Firefox profiles are searched.
    pub cookies_file: Option<PathBuf>,
    /// Requested audio format.
    pub audio_format: AudioFormat,
    /// Root folder of the mirror, also home of the completion cache.
    pub download_folder: PathBuf,
    /// Retries after the first attempt, for requests and releases alike.
    pub retries: u32,
    /// Pause between two attempts.
    pub retry_backoff: Duration,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Number of parallel workers; 1 processes items inline.
    pub jobs: usize,
    /// Leave hidden collection items out.
    pub skip_hidden: bool,
    /// Log and skip releases that still fail after retries.
    pub skip_failed_releases: bool,
    /// Decide everything but touch neither disk nor files.
    pub dry_run: bool,
    /// Folder grouping.
    pub folder_layout: FolderLayout,
    /// Only releases whose title contains this (case-insensitive).
    pub filter_title: Option<String>,
    /// Only releases whose artist contains this (case-insensitive).
    pub filter_artist: Option<String>,
    /// Firefox folder holding `profiles.ini`, overriding the platform default.
    pub firefox_dir: Option<PathBuf>,
    /// Storefront location.
    pub endpoints: StorefrontEndpoints,
    /// Draw progress bars on stderr.
    pub show_progress: bool,
}

impl DownloaderConfig {
    /// Creates a configuration with default settings for `account`.
    #[must_use]
    pub fn new(account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            cookies_file: None,
            audio_format: AudioFormat::default(),
            download_folder: PathBuf::from("."),
            retries: DEFAULT_MAX_RETRIES,
            retry_backoff: DEFAULT_BACKOFF,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            jobs: DEFAULT_JOBS,
            skip_hidden: false,
            skip_failed_releases: false,
            dry_run: false,
            folder_layout: FolderLayout::default(),
            filter_title: None,
            filter_artist: None,
            firefox_dir: None,
            endpoints: StorefrontEndpoints::default(),
            show_progress: true,
        }
    }

    /// Checks the values no type can rule out.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for an empty account name, zero or
    /// too many jobs, or a zero timeout.
    pub fn validate(&self) -> Result<(), Error> {
        if self.account.trim().is_empty() {
            return Err(Error::Configuration(
                "The Bandcamp account name must not be empty.".to_string(),
            ));
        }
        if !(1..=MAX_JOBS).contains(&self.jobs) {
            return Err(Error::Configuration(format!(
                "Invalid number of jobs: {}. Expected range: 1..={MAX_JOBS}",
                self.jobs
            )));
        }
        if self.timeout.is_zero() {
            return Err(Error::Configuration(
                "The timeout must be greater than zero.".to_string(),
            ));
        }
        Ok(())
    }

    /// Retry policy shared by every network operation and every release.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retries, self.retry_backoff)
    }

    /// Location of the completion cache.
    #[must_use]
    pub fn cache_path(&self) -> PathBuf {
        self.download_folder.join(CACHE_FILE_NAME)
    }

    /// Download folder, for display.
    #[must_use]
    pub fn download_folder(&self) -> &Path {
        &self.download_folder
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DownloaderConfig::new("someone");
        assert_eq!(config.audio_format, AudioFormat::Vorbis);
        assert_eq!(config.retries, 3);
        assert_eq!(config.timeout, Duration::from_millis(50_000));
        assert_eq!(config.jobs, 4);
        assert_eq!(config.folder_layout, FolderLayout::Artist);
        assert_eq!(config.endpoints.base_url, "https://bandcamp.com");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_audio_format_round_trips_every_name() {
        for format in AudioFormat::ALL {
            assert_eq!(format.as_str().parse::<AudioFormat>().unwrap(), format);
        }
        assert_eq!("FLAC".parse::<AudioFormat>().unwrap(), AudioFormat::Flac);
    }

    #[test]
    fn test_audio_format_rejects_unknown() {
        let err = "opus".parse::<AudioFormat>().unwrap_err();
        assert!(err.contains("opus"));
        assert!(err.contains("mp3-v0"));
    }

    #[test]
    fn test_folder_layout_parse() {
        assert_eq!("band".parse::<FolderLayout>().unwrap(), FolderLayout::Band);
        assert!("label".parse::<FolderLayout>().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = DownloaderConfig::new("  ");
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));

        config.account = "someone".to_string();
        config.jobs = 0;
        assert!(config.validate().is_err());

        config.jobs = 1;
        config.timeout = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cache_path_is_inside_download_folder() {
        let mut config = DownloaderConfig::new("someone");
        config.download_folder = PathBuf::from("/music");
        assert_eq!(
            config.cache_path(),
            PathBuf::from("/music/bandcamp-collection-downloader.cache")
        );
    }

    #[test]
    fn test_local_endpoints_strip_trailing_slash() {
        let endpoints = StorefrontEndpoints::local("http://127.0.0.1:9999/");
        assert_eq!(endpoints.base_url, "http://127.0.0.1:9999");
        assert!(!endpoints.force_https_stat);
    }
}
