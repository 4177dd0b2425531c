//! Completion cache: the append-only ledger of handled sale items.
//!
//! One line per item, `"<sale item id>| <description>"`. The file is re-read
//! on every [`CompletionCache::contents`] call so workers see each other's
//! additions; appends are serialized and written whole.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::Error;
use crate::release::ReleaseIo;

/// Separator between the id and the description of a cache line.
const SEPARATOR: char = '|';

/// Persisted set of sale item ids that need no further work.
pub struct CompletionCache {
    path: PathBuf,
    io: Arc<dyn ReleaseIo>,
    append_lock: Mutex<()>,
}

impl std::fmt::Debug for CompletionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionCache")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl CompletionCache {
    /// Opens the cache stored at `path`. Nothing is read until needed.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, io: Arc<dyn ReleaseIo>) -> Self {
        Self {
            path: path.into(),
            io,
            append_lock: Mutex::new(()),
        }
    }

    /// Location of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads every sale item id currently persisted.
    ///
    /// Blank lines and lines without a separator (a torn write) are skipped
    /// with a warning.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file exists but cannot be read.
    pub async fn contents(&self) -> Result<HashSet<String>, Error> {
        if !self.io.exists(&self.path).await {
            return Ok(HashSet::new());
        }
        let lines = self.io.read_lines(&self.path).await?;
        Ok(parse_lines(&self.path, &lines))
    }

    /// Whether `sale_item_id` is persisted.
    ///
    /// # Errors
    ///
    /// Same as [`CompletionCache::contents`].
    pub async fn contains(&self, sale_item_id: &str) -> Result<bool, Error> {
        Ok(self.contents().await?.contains(sale_item_id))
    }

    /// Appends one entry, creating the file first if needed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be created or written.
    pub async fn add(&self, sale_item_id: &str, description: &str) -> Result<(), Error> {
        let line = format!(
            "{sale_item_id}{SEPARATOR} {}\n",
            description.replace(['\n', '\r'], " ")
        );

        let _guard = self.append_lock.lock().await;
        if !self.io.exists(&self.path).await {
            self.io.create_file(&self.path).await?;
        }
        self.io.append(&self.path, &line).await?;
        debug!(sale_item_id, path = %self.path.display(), "cache entry added");
        Ok(())
    }
}

fn parse_lines(path: &Path, lines: &[String]) -> HashSet<String> {
    let mut ids = HashSet::with_capacity(lines.len());
    for (index, line) in lines.iter().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match line.split_once(SEPARATOR) {
            Some((id, _)) if !id.trim().is_empty() => {
                ids.insert(id.trim().to_string());
            }
            _ => warn!(
                path = %path.display(),
                line = index + 1,
                "ignoring malformed cache line"
            ),
        }
    }
    ids
}
