//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use bandcamp_downloader::config::MAX_JOBS;
use bandcamp_downloader::{AudioFormat, FolderLayout};
use clap::Parser;

/// Download and keep in sync the releases of a Bandcamp collection.
///
/// Every run downloads the purchases of ACCOUNT that are not yet recorded in
/// the cache file of the download folder.
#[derive(Parser, Debug)]
#[command(name = "bandcamp-collection-downloader")]
#[command(author, version, about)]
pub struct Args {
    /// The Bandcamp account whose collection is downloaded
    #[arg(value_name = "ACCOUNT")]
    pub account: String,

    /// Cookies file exported from a logged-in browser session (JSON or Netscape)
    #[arg(short = 'c', long, value_name = "FILE")]
    pub cookies_file: Option<PathBuf>,

    /// Audio format to download [default: vorbis]
    #[arg(short = 'f', long, value_name = "FORMAT", value_parser = parse_audio_format)]
    pub audio_format: Option<AudioFormat>,

    /// Folder in which releases are downloaded [default: current folder]
    #[arg(short = 'd', long, value_name = "FOLDER")]
    pub download_folder: Option<PathBuf>,

    /// Retries after a failed request or release (0-100) [default: 3]
    #[arg(short = 'r', long, value_parser = clap::value_parser!(u32).range(0..=100))]
    pub retries: Option<u32>,

    /// Per-request timeout in milliseconds [default: 50000]
    #[arg(short = 't', long, value_name = "MS", value_parser = clap::value_parser!(u64).range(1..=3_600_000))]
    pub timeout: Option<u64>,

    /// Number of parallel download workers [default: 4]
    #[arg(short = 'j', long, value_parser = parse_jobs)]
    pub jobs: Option<usize>,

    /// Do not download hidden items of the collection
    #[arg(short = 's', long)]
    pub skip_hidden: bool,

    /// Log and skip releases that still fail after all retries
    #[arg(short = 'e', long)]
    pub skip_failed_releases: bool,

    /// Decide everything but write nothing to disk
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Group release folders by artist or by band/label [default: artist]
    #[arg(long, value_name = "LAYOUT", value_parser = parse_folder_layout)]
    pub folder_layout: Option<FolderLayout>,

    /// Only download releases whose title contains this text
    #[arg(long, value_name = "TEXT")]
    pub filter_title: Option<String>,

    /// Only download releases whose artist contains this text
    #[arg(long, value_name = "TEXT")]
    pub filter_artist: Option<String>,

    /// Firefox folder holding profiles.ini, used when no cookies file is given
    #[arg(long, value_name = "FOLDER")]
    pub firefox_dir: Option<PathBuf>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Print the full error chain on failure
    #[arg(long)]
    pub debug: bool,

    /// Storefront origin, for testing against a local server
    #[arg(long, hide = true, value_name = "URL")]
    pub storefront_url: Option<String>,
}

fn parse_audio_format(value: &str) -> Result<AudioFormat, String> {
    value.parse()
}

fn parse_folder_layout(value: &str) -> Result<FolderLayout, String> {
    value.parse()
}

fn parse_jobs(value: &str) -> Result<usize, String> {
    let jobs: usize = value
        .parse()
        .map_err(|_| format!("'{value}' is not a number"))?;
    if (1..=MAX_JOBS).contains(&jobs) {
        Ok(jobs)
    } else {
        Err(format!("{jobs} is not in 1..={MAX_JOBS}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_account_only_parses_successfully() {
        let args = Args::try_parse_from(["bcd", "someone"]).unwrap();
        assert_eq!(args.account, "someone");
        assert_eq!(args.verbose, 0);
        assert!(!args.quiet);
        assert!(!args.dry_run);
        assert!(args.audio_format.is_none());
        assert!(args.jobs.is_none());
    }

    #[test]
    fn test_cli_account_is_required() {
        let err = Args::try_parse_from(["bcd"]).unwrap_err();
        assert_eq!(
            err.kind(),
            clap::error::ErrorKind::MissingRequiredArgument
        );
    }

    #[test]
    fn test_cli_short_flags() {
        let args = Args::try_parse_from([
            "bcd", "someone", "-c", "cookies.json", "-f", "flac", "-d", "/music", "-r", "5",
            "-t", "1000", "-j", "2", "-s", "-e", "-n",
        ])
        .unwrap();
        assert_eq!(args.cookies_file, Some(PathBuf::from("cookies.json")));
        assert_eq!(args.audio_format, Some(AudioFormat::Flac));
        assert_eq!(args.download_folder, Some(PathBuf::from("/music")));
        assert_eq!(args.retries, Some(5));
        assert_eq!(args.timeout, Some(1000));
        assert_eq!(args.jobs, Some(2));
        assert!(args.skip_hidden);
        assert!(args.skip_failed_releases);
        assert!(args.dry_run);
    }

    #[test]
    fn test_cli_rejects_unknown_audio_format() {
        let err = Args::try_parse_from(["bcd", "someone", "-f", "opus"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
        assert!(err.to_string().contains("mp3-320"));
    }

    #[test]
    fn test_cli_jobs_range() {
        assert!(Args::try_parse_from(["bcd", "someone", "-j", "0"]).is_err());
        assert!(Args::try_parse_from(["bcd", "someone", "-j", "65"]).is_err());
        let args = Args::try_parse_from(["bcd", "someone", "-j", "64"]).unwrap();
        assert_eq!(args.jobs, Some(64));
    }

    #[test]
    fn test_cli_timeout_must_be_positive() {
        assert!(Args::try_parse_from(["bcd", "someone", "-t", "0"]).is_err());
    }

    #[test]
    fn test_cli_folder_layout() {
        let args = Args::try_parse_from(["bcd", "someone", "--folder-layout", "band"]).unwrap();
        assert_eq!(args.folder_layout, Some(FolderLayout::Band));
    }

    #[test]
    fn test_cli_verbose_flag_increments_count() {
        let args = Args::try_parse_from(["bcd", "someone", "-vv"]).unwrap();
        assert_eq!(args.verbose, 2);
    }

    #[test]
    fn test_cli_help_flag_shows_usage() {
        let err = Args::try_parse_from(["bcd", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }
}
