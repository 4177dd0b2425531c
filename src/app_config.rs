//! Optional config file supplying CLI defaults.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use bandcamp_downloader::config::MAX_JOBS;
use bandcamp_downloader::{AudioFormat, FolderLayout};

/// Name of the folder holding the config file.
const APP_DIR: &str = "bandcamp-collection-downloader";

/// Defaults read from `config.toml`. Explicit CLI values win.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileConfig {
    /// Default root of the mirror.
    pub download_folder: Option<PathBuf>,
    /// Default audio format.
    pub audio_format: Option<AudioFormat>,
    /// Default retry count.
    pub retries: Option<u32>,
    /// Default per-request timeout in milliseconds.
    pub timeout_ms: Option<u64>,
    /// Default number of parallel workers.
    pub jobs: Option<usize>,
    /// Skip hidden collection items by default.
    pub skip_hidden: Option<bool>,
    /// Skip releases that keep failing by default.
    pub skip_failed_releases: Option<bool>,
    /// Default folder grouping.
    pub folder_layout: Option<FolderLayout>,
}

impl FileConfig {
    /// Validates config values against runtime and CLI constraints.
    pub fn validate(&self) -> Result<()> {
        if let Some(jobs) = self.jobs
            && !(1..=MAX_JOBS).contains(&jobs)
        {
            bail!("Invalid config value for `jobs`: {jobs}. Expected range: 1..={MAX_JOBS}");
        }
        if let Some(retries) = self.retries
            && retries > 100
        {
            bail!("Invalid config value for `retries`: {retries}. Expected range: 0..=100");
        }
        if let Some(timeout_ms) = self.timeout_ms
            && !(1..=3_600_000).contains(&timeout_ms)
        {
            bail!(
                "Invalid config value for `timeout_ms`: {timeout_ms}. Expected range: 1..=3600000"
            );
        }
        Ok(())
    }
}

/// Resolves default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/bandcamp-collection-downloader/config.toml`
/// 2. `$HOME/.config/bandcamp-collection-downloader/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(xdg_config_home).join(APP_DIR).join("config.toml"));
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join(APP_DIR)
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads the config file from the default path, if there is one.
pub fn load_default_file_config() -> Result<Option<FileConfig>> {
    match resolve_default_config_path() {
        Some(path) if path.exists() => load_file_config(&path).map(Some),
        _ => Ok(None),
    }
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let mut cfg = FileConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!(
                "Invalid config syntax on line {}: expected key = value",
                line_index + 1
            );
        };

        let key = raw_key.trim();
        let value = raw_value.trim();
        let context = || format!("Invalid `{key}` value on line {}", line_index + 1);

        match key {
            "download_folder" => {
                cfg.download_folder =
                    Some(PathBuf::from(parse_string_literal(value).with_context(context)?));
            }
            "audio_format" => {
                let parsed = parse_string_literal(value)
                    .and_then(|name| name.parse::<AudioFormat>().map_err(|e| anyhow!(e)))
                    .with_context(context)?;
                cfg.audio_format = Some(parsed);
            }
            "folder_layout" => {
                let parsed = parse_string_literal(value)
                    .and_then(|name| name.parse::<FolderLayout>().map_err(|e| anyhow!(e)))
                    .with_context(context)?;
                cfg.folder_layout = Some(parsed);
            }
            "retries" => {
                let parsed = parse_integer_u64(value).with_context(context)?;
                cfg.retries = Some(
                    u32::try_from(parsed).map_err(|_| anyhow!("retries out of range for u32"))?,
                );
            }
            "timeout_ms" => {
                cfg.timeout_ms = Some(parse_integer_u64(value).with_context(context)?);
            }
            "jobs" => {
                let parsed = parse_integer_u64(value).with_context(context)?;
                cfg.jobs =
                    Some(usize::try_from(parsed).map_err(|_| anyhow!("jobs out of range"))?);
            }
            "skip_hidden" => {
                cfg.skip_hidden = Some(parse_boolean(value).with_context(context)?);
            }
            "skip_failed_releases" => {
                cfg.skip_failed_releases = Some(parse_boolean(value).with_context(context)?);
            }
            unknown => {
                bail!(
                    "Unknown configuration key: '{}' on line {}",
                    unknown,
                    line_index + 1
                );
            }
        }
    }
    cfg.validate()?;
    Ok(cfg)
}

fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

fn parse_string_literal(raw_value: &str) -> Result<String> {
    if raw_value.len() < 2 || !raw_value.starts_with('"') || !raw_value.ends_with('"') {
        bail!("Expected double-quoted string");
    }
    Ok(raw_value[1..raw_value.len() - 1].to_string())
}

fn parse_integer_u64(raw_value: &str) -> Result<u64> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    let value = token.parse::<i128>()?;
    if value < 0 {
        bail!("Expected non-negative integer");
    }
    u64::try_from(value).map_err(|_| anyhow!("Integer value out of range for u64"))
}

fn parse_boolean(raw_value: &str) -> Result<bool> {
    match raw_value.trim() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => bail!("Expected 'true' or 'false'"),
    }
}
