//! Automatic credential discovery across local Firefox profiles.
//!
//! Every profile listed in `profiles.ini` that has a `cookies.sqlite` store
//! yields one candidate [`CredentialSet`] holding its storefront cookies.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use sqlx::Connection;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use tracing::{debug, info, instrument, warn};

use super::CredentialSet;
use crate::Error;

/// Cookie host whose cookies authenticate against the storefront.
pub const STOREFRONT_COOKIE_HOST: &str = ".bandcamp.com";

const PROFILES_INI: &str = "profiles.ini";
const COOKIES_DB: &str = "cookies.sqlite";

/// Expiry values above this are milliseconds rather than seconds.
const MILLISECOND_EXPIRY_THRESHOLD: i64 = 100_000_000_000;

/// One `[Profile*]` section of `profiles.ini`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileEntry {
    /// Section name, e.g. `Profile0`.
    pub section: String,
    /// Raw `Path` value.
    pub path: String,
    /// Whether `path` is relative to the Firefox directory.
    pub is_relative: bool,
}

impl ProfileEntry {
    /// Resolves the profile directory against the Firefox directory.
    #[must_use]
    pub fn resolve(&self, firefox_dir: &Path) -> PathBuf {
        if self.is_relative {
            firefox_dir.join(&self.path)
        } else {
            PathBuf::from(&self.path)
        }
    }
}

/// Returns the platform's Firefox configuration directory.
#[must_use]
pub fn default_firefox_dir() -> Option<PathBuf> {
    if cfg!(target_os = "windows") {
        dirs::config_dir().map(|dir| dir.join("Mozilla").join("Firefox"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir().map(|dir| dir.join("Firefox"))
    } else {
        dirs::home_dir().map(|dir| dir.join(".mozilla").join("firefox"))
    }
}

/// Parses the sections of `profiles.ini` that carry a `Path` key.
///
/// Sections are returned in file order. `IsRelative` defaults to true.
#[must_use]
pub fn parse_profiles_ini(text: &str) -> Vec<ProfileEntry> {
    let mut entries = Vec::new();
    let mut section: Option<String> = None;
    let mut path: Option<String> = None;
    let mut is_relative = true;

    let mut flush = |section: &Option<String>, path: &mut Option<String>, is_relative: &mut bool| {
        if let (Some(name), Some(value)) = (section, path.take()) {
            entries.push(ProfileEntry {
                section: name.clone(),
                path: value,
                is_relative: *is_relative,
            });
        }
        *is_relative = true;
    };

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            flush(&section, &mut path, &mut is_relative);
            section = Some(name.trim().to_string());
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        match key.trim() {
            "Path" => path = Some(value.trim().to_string()),
            "IsRelative" => is_relative = value.trim() != "0",
            _ => {}
        }
    }
    flush(&section, &mut path, &mut is_relative);
    entries
}

/// Collects one credential set per Firefox profile holding storefront cookies.
///
/// `firefox_dir` overrides the platform default location.
///
/// # Errors
///
/// Returns [`Error::Configuration`] when no Firefox directory can be
/// determined or it has no `profiles.ini`. Unreadable cookie stores are
/// skipped with a warning.
#[instrument(level = "debug")]
pub async fn discover_firefox_credentials(
    firefox_dir: Option<&Path>,
) -> Result<Vec<CredentialSet>, Error> {
    let firefox_dir = match firefox_dir {
        Some(dir) => dir.to_path_buf(),
        None => default_firefox_dir().ok_or_else(|| {
            Error::Configuration("Cannot determine the Firefox profiles folder.".to_string())
        })?,
    };

    let profiles_path = firefox_dir.join(PROFILES_INI);
    let profiles_text = match tokio::fs::read_to_string(&profiles_path).await {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::Configuration(format!(
                "No Firefox profiles.ini file could be found ({}).",
                profiles_path.display()
            )));
        }
        Err(e) => return Err(Error::io(profiles_path, e)),
    };

    let now = chrono::Utc::now().timestamp();
    let mut found = Vec::new();
    for profile in parse_profiles_ini(&profiles_text) {
        let cookies_path = profile.resolve(&firefox_dir).join(COOKIES_DB);
        if !cookies_path.is_file() {
            debug!(profile = %profile.section, path = %cookies_path.display(), "no cookie store");
            continue;
        }
        match read_cookie_store(&cookies_path, now).await {
            Ok(content) if content.is_empty() => {
                debug!(profile = %profile.section, "no storefront cookies in profile");
            }
            Ok(content) => {
                info!(
                    profile = %profile.section,
                    cookies = content.len(),
                    "found storefront cookies in Firefox profile"
                );
                found.push(CredentialSet::new(
                    cookies_path.display().to_string(),
                    content,
                ));
            }
            Err(e) => {
                warn!(profile = %profile.section, error = %e, "cannot read Firefox cookie store");
            }
        }
    }
    Ok(found)
}

/// Reads the storefront cookies of one `cookies.sqlite` file.
///
/// Firefox keeps the database locked while running, so the file (and its
/// write-ahead log, if any) is copied to a temporary folder first.
async fn read_cookie_store(path: &Path, now: i64) -> Result<BTreeMap<String, String>, Error> {
    let temp = tempfile::Builder::new()
        .prefix("bandcampCollectionDownloader")
        .tempdir()
        .map_err(|e| Error::io(std::env::temp_dir(), e))?;
    let copy = temp.path().join(COOKIES_DB);
    tokio::fs::copy(path, &copy)
        .await
        .map_err(|e| Error::io(path, e))?;
    let wal = path.with_extension("sqlite-wal");
    if wal.is_file() {
        tokio::fs::copy(&wal, temp.path().join(format!("{COOKIES_DB}-wal")))
            .await
            .map_err(|e| Error::io(&wal, e))?;
    }

    let options = SqliteConnectOptions::new().filename(&copy).read_only(true);
    let mut conn = SqliteConnection::connect_with(&options)
        .await
        .map_err(|e| sqlite_error(path, &e))?;

    let rows: Vec<(String, String, i64, String)> = sqlx::query_as(
        "SELECT name, value, expiry, originAttributes FROM moz_cookies WHERE host = ?",
    )
    .bind(STOREFRONT_COOKIE_HOST)
    .fetch_all(&mut conn)
    .await
    .map_err(|e| sqlite_error(path, &e))?;
    if let Err(e) = conn.close().await {
        debug!(path = %path.display(), error = %e, "closing cookie store copy failed");
    }

    let mut content = BTreeMap::new();
    for (name, value, expiry, origin_attributes) in rows {
        if origin_attributes.contains("userContextId") {
            debug!(name = %name, "skipping container cookie");
            continue;
        }
        if expiry_seconds(expiry) <= now {
            debug!(name = %name, "skipping expired cookie");
            continue;
        }
        content.insert(name, value);
    }
    Ok(content)
}

fn expiry_seconds(expiry: i64) -> i64 {
    if expiry > MILLISECOND_EXPIRY_THRESHOLD {
        expiry / 1000
    } else {
        expiry
    }
}

fn sqlite_error(path: &Path, error: &sqlx::Error) -> Error {
    Error::Configuration(format!(
        "Firefox cookie store '{}' cannot be read: {error}",
        path.display()
    ))
}
