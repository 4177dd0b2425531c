//! CLI entry point for the Bandcamp collection downloader.

use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use bandcamp_downloader::{DownloaderConfig, Orchestrator, StorefrontEndpoints};
use clap::Parser;
use tracing::debug;

mod app_config;
mod cli;

use app_config::{FileConfig, load_default_file_config};
use cli::Args;

/// How the process ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProcessExit {
    Success,
    Partial,
    Failure,
}

impl From<ProcessExit> for ExitCode {
    fn from(exit: ProcessExit) -> Self {
        match exit {
            ProcessExit::Success => ExitCode::SUCCESS,
            ProcessExit::Failure => ExitCode::from(1),
            ProcessExit::Partial => ExitCode::from(2),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let show_debug = args.debug;
    match run(args).await {
        Ok(exit) => exit.into(),
        Err(err) => {
            if show_debug {
                eprintln!("ERROR: {err:?}");
            } else {
                eprintln!("ERROR: {err}");
            }
            ProcessExit::Failure.into()
        }
    }
}

async fn run(args: Args) -> Result<ProcessExit> {
    let file_config = load_default_file_config()?.unwrap_or_default();
    let config = build_config(args, file_config);

    let orchestrator = Orchestrator::new(config)?;
    let summary = orchestrator.run().await?;

    Ok(determine_exit_outcome(summary.completed(), summary.failed))
}

/// Merges the config file defaults with explicit CLI values.
fn build_config(args: Args, file: FileConfig) -> DownloaderConfig {
    let mut config = DownloaderConfig::new(args.account);
    config.cookies_file = args.cookies_file;
    if let Some(format) = args.audio_format.or(file.audio_format) {
        config.audio_format = format;
    }
    if let Some(folder) = args.download_folder.or(file.download_folder) {
        config.download_folder = folder;
    }
    if let Some(retries) = args.retries.or(file.retries) {
        config.retries = retries;
    }
    if let Some(timeout_ms) = args.timeout.or(file.timeout_ms) {
        config.timeout = Duration::from_millis(timeout_ms);
    }
    if let Some(jobs) = args.jobs.or(file.jobs) {
        config.jobs = jobs;
    }
    if let Some(layout) = args.folder_layout.or(file.folder_layout) {
        config.folder_layout = layout;
    }
    config.skip_hidden = args.skip_hidden || file.skip_hidden.unwrap_or(false);
    config.skip_failed_releases =
        args.skip_failed_releases || file.skip_failed_releases.unwrap_or(false);
    config.dry_run = args.dry_run;
    config.filter_title = args.filter_title;
    config.filter_artist = args.filter_artist;
    config.firefox_dir = args.firefox_dir;
    if let Some(origin) = args.storefront_url {
        config.endpoints = StorefrontEndpoints::local(&origin);
    }
    config.show_progress = !args.quiet;
    config
}

/// Maps completion and failure counts to the process exit outcome.
fn determine_exit_outcome(completed: usize, failed: usize) -> ProcessExit {
    if failed == 0 {
        ProcessExit::Success
    } else if completed > 0 {
        ProcessExit::Partial
    } else {
        ProcessExit::Failure
    }
}
