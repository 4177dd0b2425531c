//! HTTP client wrapper for storefront requests and file downloads.
//!
//! This module provides the `HttpClient` struct: plain GET and JSON POST
//! requests that hand the status and body back to the caller, and a
//! streaming file download with progress reporting.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::Client;
use reqwest::header::{CONTENT_DISPOSITION, COOKIE};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, instrument};
use url::Url;

use super::error::DownloadError;
use super::filename::{fallback_filename_from_url, parse_content_disposition, sanitize_filename};
use super::progress::{ProgressReporter, WorkerId};
use crate::user_agent;

/// HTTP client shared by the connector and the release materializer.
///
/// This client is designed to be created once and reused for every request
/// of a run, taking advantage of connection pooling. Cookies are passed per
/// request as a ready-made `Cookie` header, so the same client can serve
/// several credential candidates.
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use std::time::Duration;
/// use bandcamp_downloader::download::{HttpClient, ProgressReporter};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = HttpClient::new(Duration::from_secs(50))?;
/// let progress = ProgressReporter::hidden();
/// let path = client
///     .download_to_file("https://f4.bcbits.com/img/a1_10", Path::new("."), Some("cover.jpg"), &progress, 0)
///     .await?;
/// println!("Downloaded to: {}", path.display());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

/// Status and body of a storefront response.
#[derive(Debug, Clone)]
pub struct TextResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body decoded as text.
    pub body: String,
}

impl TextResponse {
    /// Whether the status is in the 2xx range.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl HttpClient {
    /// Creates a client bounding connection setup and each read by `timeout`.
    ///
    /// The whole transfer is not bounded, so a large archive that keeps
    /// streaming never times out.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::ClientBuild`] if the TLS backend cannot be
    /// initialized.
    pub fn new(timeout: Duration) -> Result<Self, DownloadError> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .gzip(true)
            .user_agent(user_agent::default_user_agent())
            .build()
            .map_err(|source| DownloadError::ClientBuild { source })?;
        Ok(Self { client })
    }

    /// Sends a GET request and returns whatever status the server answered.
    ///
    /// # Errors
    ///
    /// Only transport failures (DNS, TLS, timeout, malformed URL) are errors;
    /// non-2xx statuses are returned to the caller.
    #[instrument(level = "debug", skip(self, cookie_header), fields(url = %url))]
    pub async fn get(
        &self,
        url: &str,
        cookie_header: Option<&str>,
    ) -> Result<TextResponse, DownloadError> {
        Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;
        let mut request = self.client.get(url);
        if let Some(cookies) = cookie_header {
            request = request.header(COOKIE, cookies);
        }
        let response = request
            .send()
            .await
            .map_err(|e| DownloadError::network(url, e))?;
        read_text(url, response).await
    }

    /// Sends a POST request with a JSON body.
    ///
    /// # Errors
    ///
    /// Same as [`HttpClient::get`].
    #[instrument(level = "debug", skip(self, body, cookie_header), fields(url = %url))]
    pub async fn post_json(
        &self,
        url: &str,
        body: &serde_json::Value,
        cookie_header: Option<&str>,
    ) -> Result<TextResponse, DownloadError> {
        Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;
        let mut request = self.client.post(url).json(body);
        if let Some(cookies) = cookie_header {
            request = request.header(COOKIE, cookies);
        }
        let response = request
            .send()
            .await
            .map_err(|e| DownloadError::network(url, e))?;
        read_text(url, response).await
    }

    /// Downloads a file from URL into `output_dir`.
    ///
    /// The filename is determined by:
    /// 1. `filename`, when given
    /// 2. Content-Disposition header (if present)
    /// 3. URL path (last segment)
    /// 4. Timestamp-based fallback
    ///
    /// An existing file with the same name is overwritten. On any failure
    /// after the file was created, the partial file is removed.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` if:
    /// - The URL is invalid
    /// - The request fails (network error, timeout)
    /// - The server returns a status outside 2xx/3xx
    /// - Writing to disk fails
    #[must_use = "download result contains the path to the downloaded file"]
    #[instrument(skip(self, progress), fields(url = %url))]
    pub async fn download_to_file(
        &self,
        url: &str,
        output_dir: &Path,
        filename: Option<&str>,
        progress: &ProgressReporter,
        worker: WorkerId,
    ) -> Result<PathBuf, DownloadError> {
        debug!("starting download");

        let parsed_url = Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| DownloadError::network(url, e))?;

        let status = response.status();
        if !(status.is_success() || status.is_redirection()) {
            return Err(DownloadError::http_status(url, status.as_u16()));
        }

        let file_name = match filename {
            Some(name) => sanitize_filename(name),
            None => extract_filename(&response, &parsed_url),
        };
        let file_path = output_dir.join(&file_name);
        debug!(path = %file_path.display(), "resolved output path");

        let mut file = File::create(&file_path)
            .await
            .map_err(|e| DownloadError::io(file_path.clone(), e))?;

        progress.start(worker, &file_name, response.content_length());
        let stream_result =
            stream_to_file(&mut file, response, url, &file_path, progress, worker).await;
        progress.finish(worker);

        let bytes_written = match stream_result {
            Ok(bytes) => bytes,
            Err(error) => {
                debug!(path = %file_path.display(), "cleaning up partial file after error");
                drop(file);
                let _ = tokio::fs::remove_file(&file_path).await;
                return Err(error);
            }
        };

        info!(
            path = %file_path.display(),
            bytes = bytes_written,
            "download complete"
        );
        Ok(file_path)
    }
}

async fn read_text(url: &str, response: reqwest::Response) -> Result<TextResponse, DownloadError> {
    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .map_err(|e| DownloadError::network(url, e))?;
    debug!(status, bytes = body.len(), "response received");
    Ok(TextResponse { status, body })
}

/// Streams response body to file, returning bytes written.
///
/// This is extracted to enable cleanup on error in the caller.
async fn stream_to_file(
    file: &mut File,
    response: reqwest::Response,
    url: &str,
    file_path: &Path,
    progress: &ProgressReporter,
    worker: WorkerId,
) -> Result<u64, DownloadError> {
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| DownloadError::network(url, e))?;

        writer
            .write_all(&chunk)
            .await
            .map_err(|e| DownloadError::io(file_path.to_path_buf(), e))?;

        bytes_written += chunk.len() as u64;
        progress.advance(worker, chunk.len() as u64);
    }

    writer
        .flush()
        .await
        .map_err(|e| DownloadError::io(file_path.to_path_buf(), e))?;

    Ok(bytes_written)
}

/// Extracts filename from Content-Disposition header or URL path.
fn extract_filename(response: &reqwest::Response, url: &Url) -> String {
    if let Some(filename) = response
        .headers()
        .get(CONTENT_DISPOSITION)
        .and_then(|cd| cd.to_str().ok())
        .and_then(parse_content_disposition)
    {
        return sanitize_filename(&filename);
    }
    fallback_filename_from_url(url)
}
