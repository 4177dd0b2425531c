//! Side-effect seam of the materializer and the completion cache.
//!
//! [`RealIo`] touches the disk and the network. [`DryIo`] only logs what it
//! would do while keeping enough state for the decision logic to behave as
//! in a real run.

use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use super::archive::extract_archive;
use crate::Error;
use crate::download::{HttpClient, ProgressReporter, WorkerId};

/// Filesystem and download operations used while materializing releases.
#[async_trait]
pub trait ReleaseIo: Send + Sync {
    /// Creates an empty file.
    async fn create_file(&self, path: &Path) -> Result<(), Error>;

    /// Appends `content` to an existing file in a single write.
    async fn append(&self, path: &Path, content: &str) -> Result<(), Error>;

    /// Creates a directory and its missing parents.
    async fn create_dir_all(&self, path: &Path) -> Result<(), Error>;

    /// Downloads `url` into `dir`, returning the written path.
    async fn download_file(
        &self,
        url: &str,
        dir: &Path,
        filename: Option<&str>,
        worker: WorkerId,
    ) -> Result<PathBuf, Error>;

    /// Deletes a file.
    async fn remove_file(&self, path: &Path) -> Result<(), Error>;

    /// Extracts a ZIP archive into `destination`.
    async fn unzip(&self, archive: &Path, destination: &Path) -> Result<(), Error>;

    /// Reads a text file line by line.
    async fn read_lines(&self, path: &Path) -> Result<Vec<String>, Error>;

    /// Whether anything exists at `path`.
    async fn exists(&self, path: &Path) -> bool;

    /// Whether `path` is a regular file.
    async fn is_file(&self, path: &Path) -> bool;

    /// Whether `path` is a directory.
    async fn is_dir(&self, path: &Path) -> bool;

    /// Entries of a directory.
    async fn list_dir(&self, path: &Path) -> Result<Vec<PathBuf>, Error>;
}

// ==================== RealIo ====================

/// The real thing.
#[derive(Debug, Clone)]
pub struct RealIo {
    client: HttpClient,
    progress: Arc<ProgressReporter>,
}

impl RealIo {
    /// Creates an IO backend downloading with `client`.
    #[must_use]
    pub fn new(client: HttpClient, progress: Arc<ProgressReporter>) -> Self {
        Self { client, progress }
    }
}

#[async_trait]
impl ReleaseIo for RealIo {
    async fn create_file(&self, path: &Path) -> Result<(), Error> {
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(|e| Error::io(path, e))?;
        Ok(())
    }

    async fn append(&self, path: &Path, content: &str) -> Result<(), Error> {
        let mut file = fs::OpenOptions::new()
            .append(true)
            .open(path)
            .await
            .map_err(|e| Error::io(path, e))?;
        file.write_all(content.as_bytes())
            .await
            .map_err(|e| Error::io(path, e))?;
        file.flush().await.map_err(|e| Error::io(path, e))
    }

    async fn create_dir_all(&self, path: &Path) -> Result<(), Error> {
        fs::create_dir_all(path)
            .await
            .map_err(|e| Error::io(path, e))
    }

    async fn download_file(
        &self,
        url: &str,
        dir: &Path,
        filename: Option<&str>,
        worker: WorkerId,
    ) -> Result<PathBuf, Error> {
        Ok(self
            .client
            .download_to_file(url, dir, filename, &self.progress, worker)
            .await?)
    }

    async fn remove_file(&self, path: &Path) -> Result<(), Error> {
        fs::remove_file(path)
            .await
            .map_err(|e| Error::io(path, e))
    }

    async fn unzip(&self, archive: &Path, destination: &Path) -> Result<(), Error> {
        let archive_path = archive.to_path_buf();
        let destination = destination.to_path_buf();
        tokio::task::spawn_blocking(move || extract_archive(&archive_path, &destination))
            .await
            .map_err(|e| Error::Archive {
                path: archive.to_path_buf(),
                reason: format!("extraction task failed: {e}"),
            })??;
        Ok(())
    }

    async fn read_lines(&self, path: &Path) -> Result<Vec<String>, Error> {
        read_lines_from_disk(path).await
    }

    async fn exists(&self, path: &Path) -> bool {
        fs::try_exists(path).await.unwrap_or(false)
    }

    async fn is_file(&self, path: &Path) -> bool {
        fs::metadata(path).await.is_ok_and(|m| m.is_file())
    }

    async fn is_dir(&self, path: &Path) -> bool {
        fs::metadata(path).await.is_ok_and(|m| m.is_dir())
    }

    async fn list_dir(&self, path: &Path) -> Result<Vec<PathBuf>, Error> {
        list_real_dir(path).await
    }
}

async fn read_lines_from_disk(path: &Path) -> Result<Vec<String>, Error> {
    let text = fs::read_to_string(path)
        .await
        .map_err(|e| Error::io(path, e))?;
    Ok(text.lines().map(str::to_string).collect())
}

async fn list_real_dir(path: &Path) -> Result<Vec<PathBuf>, Error> {
    let mut entries = Vec::new();
    let mut reader = fs::read_dir(path).await.map_err(|e| Error::io(path, e))?;
    while let Some(entry) = reader.next_entry().await.map_err(|e| Error::io(path, e))? {
        entries.push(entry.path());
    }
    entries.sort();
    Ok(entries)
}

// ==================== DryIo ====================

/// Logs every side effect instead of performing it.
///
/// Paths "created" during the run are remembered so later existence checks
/// see them. Reads still go to the real disk.
#[derive(Debug, Default)]
pub struct DryIo {
    files: Mutex<HashSet<PathBuf>>,
    dirs: Mutex<HashSet<PathBuf>>,
    downloads: AtomicUsize,
    extractions: AtomicUsize,
}

impl DryIo {
    /// Creates a dry-run backend with nothing simulated yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of simulated downloads.
    #[must_use]
    pub fn simulated_downloads(&self) -> usize {
        self.downloads.load(Ordering::Relaxed)
    }

    /// Number of simulated archive extractions.
    #[must_use]
    pub fn simulated_extractions(&self) -> usize {
        self.extractions.load(Ordering::Relaxed)
    }

    fn remember_file(&self, path: &Path) {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.to_path_buf());
    }

    fn simulated_file(&self, path: &Path) -> bool {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(path)
    }

    fn simulated_dir(&self, path: &Path) -> bool {
        self.dirs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(path)
    }

    async fn exists_or_error(&self, path: &Path) -> Result<(), Error> {
        if self.exists(path).await {
            Ok(())
        } else {
            Err(Error::io(
                path,
                std::io::Error::new(ErrorKind::NotFound, "would not exist at this point"),
            ))
        }
    }
}

#[async_trait]
impl ReleaseIo for DryIo {
    async fn create_file(&self, path: &Path) -> Result<(), Error> {
        info!("[dry run] would create file {}", path.display());
        self.remember_file(path);
        Ok(())
    }

    async fn append(&self, path: &Path, content: &str) -> Result<(), Error> {
        info!(
            "[dry run] would append \"{}\" to file {}",
            content.trim(),
            path.display()
        );
        self.exists_or_error(path).await
    }

    async fn create_dir_all(&self, path: &Path) -> Result<(), Error> {
        info!("[dry run] would create directories {}", path.display());
        let mut dirs = self.dirs.lock().unwrap_or_else(PoisonError::into_inner);
        for ancestor in path.ancestors().filter(|a| !a.as_os_str().is_empty()) {
            dirs.insert(ancestor.to_path_buf());
        }
        Ok(())
    }

    async fn download_file(
        &self,
        url: &str,
        dir: &Path,
        filename: Option<&str>,
        worker: WorkerId,
    ) -> Result<PathBuf, Error> {
        info!("[dry run] would download {url} into {}", dir.display());
        self.exists_or_error(dir).await?;
        let count = self.downloads.fetch_add(1, Ordering::Relaxed) + 1;
        let path = dir.join(filename.map_or_else(|| format!("dry-run-download-{count}"), str::to_string));
        debug!(worker, path = %path.display(), "simulated download");
        self.remember_file(&path);
        Ok(path)
    }

    async fn remove_file(&self, path: &Path) -> Result<(), Error> {
        info!("[dry run] would delete {}", path.display());
        self.exists_or_error(path).await?;
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(path);
        Ok(())
    }

    async fn unzip(&self, archive: &Path, destination: &Path) -> Result<(), Error> {
        info!(
            "[dry run] would unzip {} into {}",
            archive.display(),
            destination.display()
        );
        self.exists_or_error(archive).await?;
        self.exists_or_error(destination).await?;
        self.extractions.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn read_lines(&self, path: &Path) -> Result<Vec<String>, Error> {
        if fs::try_exists(path).await.unwrap_or(false) {
            read_lines_from_disk(path).await
        } else {
            self.exists_or_error(path).await?;
            Ok(Vec::new())
        }
    }

    async fn exists(&self, path: &Path) -> bool {
        fs::try_exists(path).await.unwrap_or(false)
            || self.simulated_file(path)
            || self.simulated_dir(path)
    }

    async fn is_file(&self, path: &Path) -> bool {
        fs::metadata(path).await.is_ok_and(|m| m.is_file()) || self.simulated_file(path)
    }

    async fn is_dir(&self, path: &Path) -> bool {
        fs::metadata(path).await.is_ok_and(|m| m.is_dir()) || self.simulated_dir(path)
    }

    async fn list_dir(&self, path: &Path) -> Result<Vec<PathBuf>, Error> {
        let mut entries = if fs::metadata(path).await.is_ok_and(|m| m.is_dir()) {
            list_real_dir(path).await?
        } else {
            Vec::new()
        };
        let files = self.files.lock().unwrap_or_else(PoisonError::into_inner);
        let dirs = self.dirs.lock().unwrap_or_else(PoisonError::into_inner);
        for simulated in files.iter().chain(dirs.iter()) {
            if simulated.parent() == Some(path) && !entries.contains(simulated) {
                entries.push(simulated.clone());
            }
        }
        entries.sort();
        Ok(entries)
    }
}
