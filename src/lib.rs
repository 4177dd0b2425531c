//! Bandcamp collection downloader library
//!
//! Mirrors the purchases of a Bandcamp account to a local folder and keeps
//! the mirror in sync on later runs.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`auth`] - Cookie sources: cookies files and Firefox profiles
//! - [`connector`] - Authenticated session, collection catalog, download links
//! - [`cache`] - Append-only ledger of handled items
//! - [`release`] - Turning a download link into folders and files
//! - [`orchestrator`] - The run: credential fallback, worker pool, summary
//! - [`download`] - HTTP primitives, retry policy, progress bars
//! - [`config`] - Runtime settings

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod auth;
pub mod cache;
pub mod config;
pub mod connector;
pub mod download;
pub mod error;
pub mod orchestrator;
pub mod release;

mod user_agent;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use auth::{CredentialSet, load_credentials_from_file};
pub use cache::CompletionCache;
pub use config::{AudioFormat, DownloaderConfig, FolderLayout, StorefrontEndpoints};
pub use connector::{CollectionConnector, ConnectedCollection, ReleaseMetadata};
pub use download::{FailureType, HttpClient, RetryPolicy};
pub use error::Error;
pub use orchestrator::{Orchestrator, RunSummary};
pub use release::{DryIo, Materialization, RealIo, ReleaseIo, ReleaseMaterializer};
