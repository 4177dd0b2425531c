//! HTTP primitives, retry policy and filename helpers.
//!
//! This module provides the building blocks the connector and the release
//! materializer are written against:
//!
//! - [`HttpClient`]: GET / JSON POST returning status and body, and a
//!   streaming file download honoring `Content-Disposition`
//! - [`ProgressReporter`]: per-worker progress bars, passed explicitly
//! - [`RetryPolicy`]: fixed-backoff retry combinator
//! - [`replace_invalid_chars_by_unicode`]: filesystem-safe folder names

mod client;
mod error;
pub(crate) mod filename;
mod progress;
mod retry;

pub use client::{HttpClient, TextResponse};
pub use error::DownloadError;
pub use filename::{
    TRAILING_CHAR_REPLACEMENTS, UNICODE_CHARS_REPLACEMENTS, replace_invalid_chars_by_unicode,
};
pub use progress::{ProgressReporter, WorkerId};
pub use retry::{
    DEFAULT_BACKOFF, DEFAULT_MAX_RETRIES, FailureType, RetryDecision, RetryPolicy, Retryable,
};

// Note: we do NOT define module-local Result aliases.
// Use `Result<T, DownloadError>` explicitly in function signatures.
