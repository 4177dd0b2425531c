//! Release materialization: from a resolved download link to files on disk.
//!
//! Every side effect goes through [`ReleaseIo`], so the same decision logic
//! runs against the real disk ([`RealIo`]) or in dry-run mode ([`DryIo`]).

mod archive;
mod io;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, instrument};

pub use io::{DryIo, RealIo, ReleaseIo};

use crate::Error;
use crate::config::FolderLayout;
use crate::connector::ReleaseMetadata;
use crate::download::{WorkerId, replace_invalid_chars_by_unicode};

/// A release folder holding this many entries is considered complete; a
/// single entry may be an interrupted download.
const COMPLETE_FOLDER_ENTRIES: usize = 2;

/// File name of the artwork fetched next to single tracks.
pub const COVER_FILE_NAME: &str = "cover.jpg";

/// What to put on disk for one release.
#[derive(Debug, Clone)]
pub struct ReleaseRequest<'a> {
    /// Signed download link.
    pub download_url: &'a str,
    /// Artwork link, fetched for single tracks.
    pub cover_url: Option<&'a str>,
    /// Sanitized artist (or band) folder name.
    pub artist_folder: &'a str,
    /// Sanitized `<year> - <title>` folder name.
    pub release_folder: &'a str,
    /// Single tracks are plain audio files, everything else a ZIP archive.
    pub is_single_track: bool,
}

/// Outcome of [`ReleaseMaterializer::materialize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Materialization {
    /// Files were downloaded into the folder.
    Downloaded(PathBuf),
    /// The folder already held a complete release; nothing was downloaded.
    AlreadyPresent(PathBuf),
}

impl Materialization {
    /// Whether the release was already on disk.
    #[must_use]
    pub fn already_exists(&self) -> bool {
        matches!(self, Self::AlreadyPresent(_))
    }

    /// The release folder.
    #[must_use]
    pub fn folder(&self) -> &Path {
        match self {
            Self::Downloaded(path) | Self::AlreadyPresent(path) => path,
        }
    }
}

/// Artist and release folder paths after conflict checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseFolders {
    /// `<download>/<artist>`
    pub artist: PathBuf,
    /// `<download>/<artist>/<year> - <title>`
    pub release: PathBuf,
}

/// Sanitized `(artist, release)` folder names of a release.
#[must_use]
pub fn folder_names(metadata: &ReleaseMetadata, layout: FolderLayout) -> (String, String) {
    let group = match layout {
        FolderLayout::Artist => metadata.artist.as_str(),
        FolderLayout::Band => metadata
            .band_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&metadata.artist),
    };
    let release = format!(
        "{} - {}",
        metadata.year(),
        replace_invalid_chars_by_unicode(&metadata.title)
    );
    (replace_invalid_chars_by_unicode(group), release)
}

/// Puts releases on disk exactly once.
pub struct ReleaseMaterializer {
    io: Arc<dyn ReleaseIo>,
    download_folder: PathBuf,
}

impl std::fmt::Debug for ReleaseMaterializer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReleaseMaterializer")
            .field("download_folder", &self.download_folder)
            .finish_non_exhaustive()
    }
}

impl ReleaseMaterializer {
    /// Creates a materializer writing under `download_folder`.
    #[must_use]
    pub fn new(io: Arc<dyn ReleaseIo>, download_folder: impl Into<PathBuf>) -> Self {
        Self {
            io,
            download_folder: download_folder.into(),
        }
    }

    /// Computes the artist and release folders of a release.
    ///
    /// Folders that already exist under a different letter case are reused.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Conflict`] when the download, artist or release path
    /// exists as a regular file.
    pub async fn resolve_folders(
        &self,
        artist_folder: &str,
        release_folder: &str,
    ) -> Result<ReleaseFolders, Error> {
        let io = self.io.as_ref();
        let mut artist = self.download_folder.join(artist_folder);
        let mut release = artist.join(release_folder);

        for (kind, path) in [
            ("download", &self.download_folder),
            ("artist", &artist),
            ("release", &release),
        ] {
            if io.is_file(path).await {
                return Err(Error::Conflict {
                    kind,
                    path: path.clone(),
                });
            }
        }

        if io.is_dir(&self.download_folder).await
            && !io.is_dir(&artist).await
            && let Some(existing) =
                find_case_variant(io, &self.download_folder, artist_folder).await?
        {
            info!(
                "Using existing folder found with different case: {}",
                existing.display()
            );
            release = existing.join(release_folder);
            artist = existing;
        }

        if io.is_dir(&artist).await
            && !io.is_dir(&release).await
            && let Some(existing) = find_case_variant(io, &artist, release_folder).await?
        {
            info!(
                "Using existing folder found with different case: {}",
                existing.display()
            );
            release = existing;
        }

        Ok(ReleaseFolders { artist, release })
    }

    /// Downloads a release into its folder unless it is already there.
    ///
    /// Multi-track archives are extracted and then deleted, even when the
    /// extraction fails. Single tracks get the cover artwork alongside.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Conflict`] for a file in place of a folder, or any
    /// IO, HTTP or archive error of the steps.
    #[instrument(skip(self, request), fields(release = request.release_folder))]
    pub async fn materialize(
        &self,
        request: &ReleaseRequest<'_>,
        worker: WorkerId,
    ) -> Result<Materialization, Error> {
        let io = self.io.as_ref();
        let folders = self
            .resolve_folders(request.artist_folder, request.release_folder)
            .await?;

        if !io.exists(&folders.artist).await {
            io.create_dir_all(&folders.artist).await?;
        }
        if !io.exists(&folders.release).await {
            io.create_dir_all(&folders.release).await?;
        }

        let entries = io.list_dir(&folders.release).await?.len();
        if entries >= COMPLETE_FOLDER_ENTRIES {
            debug!(entries, folder = %folders.release.display(), "release folder already complete");
            return Ok(Materialization::AlreadyPresent(folders.release));
        }

        let payload = io
            .download_file(request.download_url, &folders.release, None, worker)
            .await?;

        if request.is_single_track {
            debug!("single track release, fetching the cover");
            if let Some(cover_url) = request.cover_url {
                io.download_file(cover_url, &folders.release, Some(COVER_FILE_NAME), worker)
                    .await?;
            }
        } else {
            debug!(archive = %payload.display(), "multi-track release, extracting");
            let extracted = io.unzip(&payload, &folders.release).await;
            let removed = io.remove_file(&payload).await;
            extracted?;
            removed?;
        }

        Ok(Materialization::Downloaded(folders.release))
    }
}

/// Finds a directory in `parent` named `name` up to letter case.
async fn find_case_variant(
    io: &dyn ReleaseIo,
    parent: &Path,
    name: &str,
) -> Result<Option<PathBuf>, Error> {
    let wanted = name.to_lowercase();
    for candidate in io.list_dir(parent).await? {
        let matches = candidate
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.to_lowercase() == wanted);
        if matches && io.is_dir(&candidate).await {
            return Ok(Some(candidate));
        }
    }
    Ok(None)
}
