//! The download run: credentials, catalog, completion cache, worker pool.
//!
//! # Flow
//!
//! 1. Gather credential candidates: the cookies file if one is configured,
//!    otherwise every Firefox profile.
//! 2. Connect with each candidate in turn until one yields a catalog.
//! 3. Subtract the completion cache from the catalog.
//! 4. Hand the remaining items to `jobs` workers (inline when `jobs == 1`).
//!
//! Failures of one item never stop the others. Only missing credentials or
//! an unusable collection abort the run.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::Utc;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

use crate::Error;
use crate::auth::{CredentialSet, discover_firefox_credentials, load_credentials_from_file};
use crate::cache::CompletionCache;
use crate::config::{AudioFormat, DownloaderConfig, FolderLayout};
use crate::connector::{CollectionConnector, ConnectedCollection, ReleaseMetadata};
use crate::download::{HttpClient, ProgressReporter, RetryPolicy, WorkerId};
use crate::release::{
    DryIo, Materialization, RealIo, ReleaseIo, ReleaseMaterializer, ReleaseRequest, folder_names,
};

/// Description recorded in the cache for items that vanished from the store.
const UNKNOWN_DESCRIPTION: &str = "UNKNOWN";

/// What happened to one catalog item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Downloaded and recorded in the cache.
    Downloaded,
    /// Already on disk; recorded in the cache.
    AlreadyPresent,
    /// The download page is gone (refund, removal); recorded in the cache.
    Unavailable,
    /// Not released yet; retried on the next run.
    Preorder,
    /// Excluded by a title or artist filter.
    Filtered,
    /// Failed, but failures are configured to be skipped.
    Skipped,
}

/// Counts of a finished run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Items in the catalog.
    pub catalog: usize,
    /// Items skipped because the cache already lists them.
    pub cached: usize,
    /// Releases downloaded during this run.
    pub downloaded: usize,
    /// Releases found complete on disk.
    pub already_present: usize,
    /// Items whose download page is gone.
    pub unavailable: usize,
    /// Pre-orders left for a later run.
    pub preorder: usize,
    /// Items excluded by filters.
    pub filtered: usize,
    /// Failed items skipped on request.
    pub skipped: usize,
    /// Failed items.
    pub failed: usize,
    /// Archive extractions simulated by a dry run.
    pub simulated_extractions: usize,
}

impl RunSummary {
    /// Items that reached a settled state during this run.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.downloaded + self.already_present + self.unavailable
    }
}

/// Thread-safe counters filled by the workers.
#[derive(Debug, Default)]
struct RunStats {
    downloaded: AtomicUsize,
    already_present: AtomicUsize,
    unavailable: AtomicUsize,
    preorder: AtomicUsize,
    filtered: AtomicUsize,
    skipped: AtomicUsize,
    failed: AtomicUsize,
}

impl RunStats {
    fn record(&self, outcome: ItemOutcome) {
        let counter = match outcome {
            ItemOutcome::Downloaded => &self.downloaded,
            ItemOutcome::AlreadyPresent => &self.already_present,
            ItemOutcome::Unavailable => &self.unavailable,
            ItemOutcome::Preorder => &self.preorder,
            ItemOutcome::Filtered => &self.filtered,
            ItemOutcome::Skipped => &self.skipped,
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }

    fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }

    fn fill(&self, summary: &mut RunSummary) {
        summary.downloaded = self.downloaded.load(Ordering::SeqCst);
        summary.already_present = self.already_present.load(Ordering::SeqCst);
        summary.unavailable = self.unavailable.load(Ordering::SeqCst);
        summary.preorder = self.preorder.load(Ordering::SeqCst);
        summary.filtered = self.filtered.load(Ordering::SeqCst);
        summary.skipped = self.skipped.load(Ordering::SeqCst);
        summary.failed = self.failed.load(Ordering::SeqCst);
    }
}

/// Drives a whole download run.
pub struct Orchestrator {
    config: DownloaderConfig,
    client: HttpClient,
    io: Arc<dyn ReleaseIo>,
    dry_io: Option<Arc<DryIo>>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("account", &self.config.account)
            .field("dry_run", &self.dry_io.is_some())
            .finish_non_exhaustive()
    }
}

/// Everything a worker needs, shared between workers.
struct RunContext {
    collection: ConnectedCollection,
    cache: CompletionCache,
    materializer: ReleaseMaterializer,
    retry: RetryPolicy,
    stats: RunStats,
    audio_format: AudioFormat,
    folder_layout: FolderLayout,
    skip_failed: bool,
    filter_title: Option<String>,
    filter_artist: Option<String>,
    total: usize,
}

impl Orchestrator {
    /// Validates `config` and prepares the HTTP client and IO backend.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for invalid settings, or an HTTP
    /// error if the client cannot be built.
    pub fn new(config: DownloaderConfig) -> Result<Self, Error> {
        config.validate()?;
        let client = HttpClient::new(config.timeout)?;
        let progress = Arc::new(if config.show_progress {
            ProgressReporter::new()
        } else {
            ProgressReporter::hidden()
        });

        let dry_io = config.dry_run.then(|| Arc::new(DryIo::new()));
        let io: Arc<dyn ReleaseIo> = match &dry_io {
            Some(dry) => Arc::clone(dry) as Arc<dyn ReleaseIo>,
            None => Arc::new(RealIo::new(client.clone(), progress)),
        };

        Ok(Self {
            config,
            client,
            io,
            dry_io,
        })
    }

    /// Runs the whole pipeline and waits for every item.
    ///
    /// # Errors
    ///
    /// Only run-wide failures are errors: unreadable credentials, no
    /// candidate able to open the collection, or an unreadable cache.
    /// Per-item failures are counted in [`RunSummary::failed`].
    #[instrument(skip(self), fields(account = %self.config.account))]
    pub async fn run(&self) -> Result<RunSummary, Error> {
        info!("Target Bandcamp account: {}", self.config.account);
        info!(
            "Target download folder: {}",
            self.config.download_folder.display()
        );
        info!("Target audio format: {}", self.config.audio_format);

        let candidates = self.credential_candidates().await?;
        let collection = self.connect_with_any(&candidates).await?;

        let cache = CompletionCache::new(self.config.cache_path(), Arc::clone(&self.io));
        let cached_ids = cache.contents().await?;
        let to_download = pending_items(&collection.sale_item_ids(), &cached_ids);

        let mut summary = RunSummary {
            catalog: collection.len(),
            cached: collection.len() - to_download.len(),
            ..RunSummary::default()
        };
        if summary.cached > 0 {
            info!(
                "Ignoring {} already downloaded items (based on '{}').",
                summary.cached,
                cache.path().display()
            );
        }

        let context = Arc::new(RunContext {
            collection,
            cache,
            materializer: ReleaseMaterializer::new(
                Arc::clone(&self.io),
                self.config.download_folder.clone(),
            ),
            retry: self.config.retry_policy(),
            stats: RunStats::default(),
            audio_format: self.config.audio_format,
            folder_layout: self.config.folder_layout,
            skip_failed: self.config.skip_failed_releases,
            filter_title: self.config.filter_title.as_deref().map(str::to_lowercase),
            filter_artist: self.config.filter_artist.as_deref().map(str::to_lowercase),
            total: to_download.len(),
        });

        if self.config.jobs <= 1 {
            for (index, sale_item_id) in to_download.iter().enumerate() {
                context.handle(index + 1, sale_item_id, 0).await;
            }
        } else {
            run_pool(&context, to_download, self.config.jobs).await;
        }

        context.stats.fill(&mut summary);
        if let Some(dry) = &self.dry_io {
            summary.simulated_extractions = dry.simulated_extractions();
            info!(
                downloads = dry.simulated_downloads(),
                extractions = summary.simulated_extractions,
                "[dry run] finished without touching the disk"
            );
        }
        info!(
            downloaded = summary.downloaded,
            already_present = summary.already_present,
            unavailable = summary.unavailable,
            preorder = summary.preorder,
            filtered = summary.filtered,
            skipped = summary.skipped,
            failed = summary.failed,
            "run complete"
        );
        Ok(summary)
    }

    async fn credential_candidates(&self) -> Result<Vec<CredentialSet>, Error> {
        if let Some(path) = &self.config.cookies_file {
            info!("Loading provided cookies file: {}", path.display());
            Ok(vec![load_credentials_from_file(path)?])
        } else {
            info!("No provided cookies file, using Firefox cookies");
            discover_firefox_credentials(self.config.firefox_dir.as_deref()).await
        }
    }

    /// Tries each candidate until one opens the collection.
    ///
    /// An authentication failure (unknown account) is reported as such when
    /// no candidate works; other failures collapse into a generic error.
    async fn connect_with_any(
        &self,
        candidates: &[CredentialSet],
    ) -> Result<ConnectedCollection, Error> {
        let connector = CollectionConnector::new(
            self.client.clone(),
            self.config.endpoints.clone(),
            self.config.retry_policy(),
            self.config.account.clone(),
            self.config.skip_hidden,
        );

        let mut authentication_error = None;
        for candidate in candidates {
            info!("Trying cookies from: {}", candidate.source());
            match connector.connect(candidate).await {
                Ok(collection) => {
                    info!(
                        "Found \"{}\" with {} items.",
                        collection.page_name().unwrap_or(&self.config.account),
                        collection.len()
                    );
                    return Ok(collection);
                }
                Err(e) => {
                    warn!("Cookies from {} did not work: {e}", candidate.source());
                    if matches!(e, Error::Authentication(_)) {
                        authentication_error = Some(e);
                    }
                }
            }
        }

        Err(authentication_error.unwrap_or_else(|| {
            Error::Authentication(
                "Could not connect to the Bandcamp API with the provided cookies.".to_string(),
            )
        }))
    }
}

/// Catalog items absent from the cache, in catalog order.
fn pending_items(catalog: &[String], cached: &HashSet<String>) -> Vec<String> {
    catalog
        .iter()
        .filter(|id| !cached.contains(id.as_str()))
        .cloned()
        .collect()
}

/// Spawns `jobs` workers pulling from a shared queue and waits for them.
async fn run_pool(context: &Arc<RunContext>, items: Vec<String>, jobs: usize) {
    let queue: VecDeque<(usize, String)> = items
        .into_iter()
        .enumerate()
        .map(|(index, id)| (index + 1, id))
        .collect();
    let workers = jobs.min(queue.len());
    let queue = Arc::new(Mutex::new(queue));

    let mut tasks = JoinSet::new();
    for worker in 1..=workers {
        let context = Arc::clone(context);
        let queue = Arc::clone(&queue);
        tasks.spawn(async move {
            loop {
                let next = queue.lock().await.pop_front();
                let Some((index, sale_item_id)) = next else {
                    break;
                };
                context.handle(index, &sale_item_id, worker).await;
            }
            debug!(worker, "worker done");
        });
    }

    while let Some(joined) = tasks.join_next().await {
        // A panicking worker loses its current item only.
        if let Err(e) = joined {
            warn!(error = %e, "worker task panicked");
        }
    }
}

impl RunContext {
    /// Processes one item and records its outcome. Never fails.
    async fn handle(&self, index: usize, sale_item_id: &str, worker: WorkerId) {
        info!(worker, "Managing item {index}/{}", self.total);
        match self.process(sale_item_id, worker).await {
            Ok(outcome) => self.stats.record(outcome),
            Err(e) => {
                error!(sale_item_id, worker, "Could not download item: {e}");
                self.stats.record_failure();
            }
        }
    }

    #[instrument(skip(self))]
    async fn process(&self, sale_item_id: &str, worker: WorkerId) -> Result<ItemOutcome, Error> {
        let Some(metadata) = self.collection.retrieve_digital_item(sale_item_id).await? else {
            info!(
                "Sale item {sale_item_id} cannot be downloaded anymore (maybe a refund?); skipping"
            );
            self.cache.add(sale_item_id, UNKNOWN_DESCRIPTION).await?;
            return Ok(ItemOutcome::Unavailable);
        };

        let printable = metadata.to_string();
        info!("Found release {printable} (Bandcamp ID: {sale_item_id}).");

        if metadata.is_preorder(Utc::now()) {
            info!("{printable} is a preorder; skipping.");
            return Ok(ItemOutcome::Preorder);
        }
        if !self.matches_filters(&metadata) {
            debug!("{printable} does not match the filters; skipping.");
            return Ok(ItemOutcome::Filtered);
        }

        if metadata.download_url(self.audio_format).is_none() {
            let missing = Error::MissingDownload {
                sale_item_id: sale_item_id.to_string(),
                format: self.audio_format.to_string(),
            };
            if self.skip_failed {
                warn!("{missing}; skipping");
                return Ok(ItemOutcome::Skipped);
            }
            return Err(missing);
        }

        let (artist_folder, release_folder) = folder_names(&metadata, self.folder_layout);
        let cover_url = metadata
            .is_single_track
            .then(|| self.collection.cover_url(&metadata))
            .flatten();

        info!("Starting the download of {printable}.");
        let materialized = self
            .retry
            .run_or_ignore(&format!("download {printable}"), self.skip_failed, || {
                self.download_once(
                    sale_item_id,
                    &metadata,
                    &printable,
                    cover_url.as_deref(),
                    &artist_folder,
                    &release_folder,
                    worker,
                )
            })
            .await?;

        Ok(match materialized {
            None => ItemOutcome::Skipped,
            Some(done) if done.already_exists() => ItemOutcome::AlreadyPresent,
            Some(_) => ItemOutcome::Downloaded,
        })
    }

    /// One attempt: fresh signed link, materialization, cache entry.
    #[allow(clippy::too_many_arguments)]
    async fn download_once(
        &self,
        sale_item_id: &str,
        metadata: &ReleaseMetadata,
        printable: &str,
        cover_url: Option<&str>,
        artist_folder: &str,
        release_folder: &str,
        worker: WorkerId,
    ) -> Result<Materialization, Error> {
        let download_url = self
            .collection
            .retrieve_real_download_url(sale_item_id, self.audio_format)
            .await?
            .ok_or_else(|| Error::MissingDownload {
                sale_item_id: sale_item_id.to_string(),
                format: self.audio_format.to_string(),
            })?;

        let request = ReleaseRequest {
            download_url: &download_url,
            cover_url,
            artist_folder,
            release_folder,
            is_single_track: metadata.is_single_track,
        };
        let done = self.materializer.materialize(&request, worker).await?;
        if done.already_exists() {
            info!(folder = %done.folder().display(), "{printable} already exists on disk, skipping.");
        } else {
            info!(folder = %done.folder().display(), "{printable} successfully downloaded.");
        }

        if !self.cache.contains(sale_item_id).await? {
            self.cache.add(sale_item_id, printable).await?;
        }
        Ok(done)
    }

    fn matches_filters(&self, metadata: &ReleaseMetadata) -> bool {
        let title_ok = self
            .filter_title
            .as_deref()
            .is_none_or(|wanted| metadata.title.to_lowercase().contains(wanted));
        let artist_ok = self
            .filter_artist
            .as_deref()
            .is_none_or(|wanted| metadata.artist.to_lowercase().contains(wanted));
        title_ok && artist_ok
    }
}
