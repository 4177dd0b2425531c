//! Crate-wide error taxonomy.
//!
//! Every fallible operation of the connector, cache, materializer and
//! orchestrator returns [`Error`]. Each variant classifies as transient
//! (worth retrying) or permanent, see [`Error::failure_type`].

use std::path::PathBuf;

use thiserror::Error;

use crate::download::{DownloadError, FailureType, Retryable};

/// Errors surfaced by the downloader core.
#[derive(Debug, Error)]
pub enum Error {
    /// Bad or missing credentials file, malformed cookie data, no usable links.
    #[error("{0}")]
    Configuration(String),

    /// Unknown account, or no credential candidate produced a working session.
    #[error("{0}")]
    Authentication(String),

    /// HTTP transfer failure (network, timeout, unexpected status).
    #[error(transparent)]
    Http(#[from] DownloadError),

    /// A path that must be a directory already exists as a regular file.
    #[error("the {kind} folder already exists as a regular file ({path})")]
    Conflict {
        /// Which folder of the layout collided: `download`, `artist` or `release`.
        kind: &'static str,
        /// The offending path.
        path: PathBuf,
    },

    /// Local filesystem failure.
    #[error("IO error on {path}: {source}")]
    Io {
        /// The path being operated on.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Archive could not be read or unpacked; usually a truncated transfer.
    #[error("could not extract archive {path}: {reason}")]
    Archive {
        /// Archive path.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// A storefront response did not have the expected shape.
    #[error("unexpected response from {url}: {reason}")]
    Parse {
        /// The URL whose body could not be understood.
        url: String,
        /// What was wrong with it.
        reason: String,
    },

    /// The item has no download for the requested audio format.
    #[error(
        "no URL found for item {sale_item_id} (maybe the release has no digital item, or the audio format {format} is not offered)"
    )]
    MissingDownload {
        /// Sale item id.
        sale_item_id: String,
        /// Requested audio format.
        format: String,
    },

    /// A retried operation kept failing.
    #[error("could not perform {operation} after {retries} retries: {last}")]
    RetriesExhausted {
        /// Human readable operation label.
        operation: String,
        /// Number of retries performed after the first attempt.
        retries: u32,
        /// The error of the final attempt.
        #[source]
        last: Box<Error>,
    },
}

impl Error {
    /// Creates an IO error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a parse error for a storefront response.
    pub fn parse(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Parse {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Classifies this error for the retry combinator.
    ///
    /// HTTP transfer failures and broken archives are transient. An exhausted
    /// retry is permanent so an enclosing retry does not start over.
    #[must_use]
    pub fn failure_type(&self) -> FailureType {
        match self {
            Self::Http(inner) => match inner {
                DownloadError::Network { .. }
                | DownloadError::Timeout { .. }
                | DownloadError::HttpStatus { .. } => FailureType::Transient,
                DownloadError::Io { .. }
                | DownloadError::InvalidUrl { .. }
                | DownloadError::ClientBuild { .. } => FailureType::Permanent,
            },
            Self::Archive { .. } => FailureType::Transient,
            Self::Configuration(_)
            | Self::Authentication(_)
            | Self::Conflict { .. }
            | Self::Io { .. }
            | Self::Parse { .. }
            | Self::MissingDownload { .. }
            | Self::RetriesExhausted { .. } => FailureType::Permanent,
        }
    }
}

impl Retryable for Error {
    fn failure_type(&self) -> FailureType {
        Error::failure_type(self)
    }

    fn exhausted(operation: &str, retries: u32, last: Self) -> Self {
        Self::RetriesExhausted {
            operation: operation.to_string(),
            retries,
            last: Box::new(last),
        }
    }
}
