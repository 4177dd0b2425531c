//! Collection connector: one authenticated session against the storefront.
//!
//! Construction is two-phase. A [`CollectionConnector`] holds the settings;
//! [`CollectionConnector::connect`] fetches the account's collection page,
//! follows the pagination cursor, and returns a [`ConnectedCollection`] whose
//! catalog is complete. Per-item metadata is then resolved lazily and
//! memoized for the lifetime of the handle.

mod model;
mod pagedata;
mod stat;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::{Value, json};
use tracing::{debug, info, instrument, warn};
use url::Url;

pub use model::ReleaseMetadata;

use self::model::{CollectionData, CollectionPage, DownloadPageBlob, FanPageBlob, ItemCache};
use crate::Error;
use crate::auth::CredentialSet;
use crate::config::{AudioFormat, StorefrontEndpoints};
use crate::download::{DownloadError, HttpClient, RetryPolicy, TextResponse};

/// Query parameter of a redownload URL naming the sale item.
const SALE_ITEM_QUERY_KEY: &str = "sitem_id";

/// Settings of a storefront session, before it is established.
#[derive(Debug, Clone)]
pub struct CollectionConnector {
    client: HttpClient,
    endpoints: StorefrontEndpoints,
    retry: RetryPolicy,
    account: String,
    skip_hidden: bool,
}

/// An established session with a complete catalog.
#[derive(Debug)]
pub struct ConnectedCollection {
    client: HttpClient,
    endpoints: StorefrontEndpoints,
    retry: RetryPolicy,
    cookie_header: String,
    page_name: Option<String>,
    catalog: BTreeMap<String, String>,
    band_names: HashMap<String, String>,
    items: DashMap<String, Option<Arc<ReleaseMetadata>>>,
}

impl CollectionConnector {
    /// Creates a connector for `account`.
    #[must_use]
    pub fn new(
        client: HttpClient,
        endpoints: StorefrontEndpoints,
        retry: RetryPolicy,
        account: impl Into<String>,
        skip_hidden: bool,
    ) -> Self {
        Self {
            client,
            endpoints,
            retry,
            account: account.into(),
            skip_hidden,
        }
    }

    /// Authenticates with `credentials` and enumerates the whole collection.
    ///
    /// # Errors
    ///
    /// - [`Error::Authentication`] if the account does not exist
    /// - [`Error::Configuration`] if the first page lists no download link,
    ///   the usual symptom of stale or foreign cookies
    /// - [`Error::Parse`] if the page data blob is missing or malformed
    /// - HTTP errors once retries are exhausted
    #[instrument(skip(self, credentials), fields(account = %self.account, source = credentials.source()))]
    pub async fn connect(&self, credentials: &CredentialSet) -> Result<ConnectedCollection, Error> {
        let cookie_header = credentials.cookie_header();
        let page_url = format!("{}/{}", self.endpoints.base_url, self.account);

        let response = self
            .retry
            .run("fetch collection page", || async {
                let response = self.client.get(&page_url, Some(&cookie_header)).await?;
                if response.status == 404 {
                    return Err(Error::Authentication(format!(
                        "The Bandcamp user '{}' does not exist.",
                        self.account
                    )));
                }
                ensure_success(&page_url, response)
            })
            .await?;

        let blob = pagedata::extract_data_blob(&response.body)
            .ok_or_else(|| Error::parse(&page_url, "no page data blob in collection page"))?;
        let fan_page: FanPageBlob = serde_json::from_str(&blob)
            .map_err(|e| Error::parse(&page_url, format!("invalid collection data: {e}")))?;

        // First page mixes visible and hidden items.
        let mut catalog: BTreeMap<String, String> = fan_page
            .collection_data
            .redownload_urls
            .clone()
            .unwrap_or_default()
            .into_iter()
            .collect();
        if catalog.is_empty() {
            return Err(Error::Configuration(
                "No download links could be found in the collection page. This can be caused by an outdated or invalid cookies file."
                    .to_string(),
            ));
        }

        if self.skip_hidden {
            let hidden = hidden_sale_item_ids(&fan_page.item_cache);
            let before = catalog.len();
            catalog.retain(|_, url| !is_hidden(url, &hidden));
            debug!(removed = before - catalog.len(), "hidden items excluded");
        }

        let fan_id = fan_page
            .fan_data
            .fan_id
            .clone()
            .ok_or_else(|| Error::parse(&page_url, "collection data has no fan id"))?;

        if fan_page.collection_data.item_count > fan_page.collection_data.batch_size {
            let rest = self
                .paginate(&fan_id, &fan_page.collection_data, "collection_items", &cookie_header)
                .await?;
            catalog.extend(rest);
        }

        if !self.skip_hidden
            && let Some(hidden_data) = &fan_page.hidden_data
            && hidden_data.item_count > hidden_data.batch_size
        {
            let rest = self
                .paginate(&fan_id, hidden_data, "hidden_items", &cookie_header)
                .await?;
            catalog.extend(rest);
        }

        let page_name = pagedata::extract_title(&response.body);
        info!(items = catalog.len(), page = ?page_name, "collection enumerated");

        Ok(ConnectedCollection {
            client: self.client.clone(),
            endpoints: self.endpoints.clone(),
            retry: self.retry.clone(),
            cookie_header,
            page_name,
            catalog,
            band_names: band_names(&fan_page.item_cache),
            items: DashMap::new(),
        })
    }

    /// Follows the `older_than_token` cursor of one collection.
    #[instrument(skip(self, first_page, cookie_header), fields(collection = collection_name))]
    async fn paginate(
        &self,
        fan_id: &str,
        first_page: &CollectionData,
        collection_name: &str,
        cookie_header: &str,
    ) -> Result<HashMap<String, String>, Error> {
        let url = format!(
            "{}/api/fancollection/1/{collection_name}",
            self.endpoints.base_url
        );
        let fan_id_value = fan_id
            .parse::<u64>()
            .map_or_else(|_| Value::String(fan_id.to_string()), Value::from);

        let mut collected = HashMap::new();
        let mut token = first_page.last_token.clone().unwrap_or_default();
        let mut page_number = 1_u32;
        loop {
            page_number += 1;
            let body = json!({ "fan_id": fan_id_value, "older_than_token": token });
            let response = self
                .retry
                .run(&format!("fetch {collection_name} page {page_number}"), || async {
                    let response = self
                        .client
                        .post_json(&url, &body, Some(cookie_header))
                        .await?;
                    ensure_success(&url, response)
                })
                .await?;

            let page: CollectionPage = serde_json::from_str(&response.body)
                .map_err(|e| Error::parse(&url, format!("invalid collection page: {e}")))?;
            let added = page.redownload_urls.map_or(0, |urls| {
                let count = urls.len();
                collected.extend(urls);
                count
            });
            debug!(page = page_number, added, more = page.more_available, "collection page");

            if !page.more_available {
                break;
            }
            match page.last_token {
                Some(next) if next != token => token = next,
                _ => {
                    warn!(
                        collection = collection_name,
                        "pagination cursor did not advance, stopping"
                    );
                    break;
                }
            }
        }
        Ok(collected)
    }
}

impl ConnectedCollection {
    /// `<title>` of the collection page.
    #[must_use]
    pub fn page_name(&self) -> Option<&str> {
        self.page_name.as_deref()
    }

    /// Every sale item id of the catalog, sorted.
    #[must_use]
    pub fn sale_item_ids(&self) -> Vec<String> {
        self.catalog.keys().cloned().collect()
    }

    /// Number of items in the catalog.
    #[must_use]
    pub fn len(&self) -> usize {
        self.catalog.len()
    }

    /// Whether the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.catalog.is_empty()
    }

    /// Resolves the metadata of an item, fetching its download page once.
    ///
    /// `Ok(None)` means the page answered 404: the item is gone for good,
    /// usually after a refund. That outcome is memoized as well.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for an id outside the catalog,
    /// [`Error::Parse`] for an unreadable page, or the HTTP error once
    /// retries are exhausted.
    #[instrument(skip(self))]
    pub async fn retrieve_digital_item(
        &self,
        sale_item_id: &str,
    ) -> Result<Option<Arc<ReleaseMetadata>>, Error> {
        if let Some(known) = self.items.get(sale_item_id) {
            return Ok(known.value().clone());
        }

        let url = self.catalog.get(sale_item_id).ok_or_else(|| {
            Error::Configuration(format!("sale item {sale_item_id} is not in the collection"))
        })?;

        let resolved = self
            .retry
            .run(&format!("fetch download page of {sale_item_id}"), || {
                self.fetch_digital_item(sale_item_id, url)
            })
            .await?
            .map(Arc::new);

        // Concurrent first accesses may both fetch; the first insert wins.
        let entry = self
            .items
            .entry(sale_item_id.to_string())
            .or_insert(resolved);
        Ok(entry.value().clone())
    }

    async fn fetch_digital_item(
        &self,
        sale_item_id: &str,
        url: &str,
    ) -> Result<Option<ReleaseMetadata>, Error> {
        let response = self.client.get(url, Some(&self.cookie_header)).await?;
        if response.status == 404 {
            info!(sale_item_id, "download page is gone");
            return Ok(None);
        }
        let response = ensure_success(url, response)?;

        let blob = pagedata::extract_data_blob(&response.body)
            .ok_or_else(|| Error::parse(url, "no page data blob in download page"))?;
        let page: DownloadPageBlob = serde_json::from_str(&blob)
            .map_err(|e| Error::parse(url, format!("invalid download page data: {e}")))?;
        let item = page
            .digital_items
            .into_iter()
            .next()
            .ok_or_else(|| Error::parse(url, "download page lists no digital item"))?;

        let band_name = self.band_name_for(sale_item_id, url);
        Ok(Some(ReleaseMetadata::from_digital_item(item, band_name)))
    }

    /// Resolves a fresh, signed download link for `format`.
    ///
    /// `Ok(None)` when the item is gone, has no digital download, or does not
    /// offer `format`. The link is re-resolved on every call since signed
    /// links expire.
    ///
    /// # Errors
    ///
    /// Same as [`ConnectedCollection::retrieve_digital_item`], plus
    /// [`Error::Parse`] for an unreadable stat-download response.
    #[instrument(skip(self), fields(format = %format))]
    pub async fn retrieve_real_download_url(
        &self,
        sale_item_id: &str,
        format: AudioFormat,
    ) -> Result<Option<String>, Error> {
        let Some(metadata) = self.retrieve_digital_item(sale_item_id).await? else {
            return Ok(None);
        };
        let Some(download_url) = metadata.download_url(format) else {
            return Ok(None);
        };

        let stat_url = stat::stat_download_url(download_url, self.endpoints.force_https_stat)?;
        let response = self
            .retry
            .run(&format!("resolve download link of {sale_item_id}"), || async {
                let response = self
                    .client
                    .get(&stat_url, Some(&self.cookie_header))
                    .await?;
                ensure_success(&stat_url, response)
            })
            .await?;

        let signed = stat::parse_stat_response(&stat_url, &response.body)?;
        if signed.is_none() {
            debug!(sale_item_id, "no signed link, using the unsigned one");
        }
        Ok(Some(signed.unwrap_or_else(|| download_url.to_string())))
    }

    /// Artwork URL of an already resolved item.
    #[must_use]
    pub fn cover_url(&self, metadata: &ReleaseMetadata) -> Option<String> {
        metadata
            .art_id
            .as_deref()
            .map(|art_id| format!("{}/img/a{art_id}_10", self.endpoints.art_base_url))
    }

    fn band_name_for(&self, sale_item_id: &str, item_url: &str) -> Option<String> {
        sale_item_id_from_url(item_url)
            .and_then(|id| self.band_names.get(&id))
            .or_else(|| {
                let digits = sale_item_id.trim_start_matches(|c: char| !c.is_ascii_digit());
                self.band_names.get(digits)
            })
            .cloned()
    }
}

fn ensure_success(url: &str, response: TextResponse) -> Result<TextResponse, Error> {
    if response.is_success() {
        Ok(response)
    } else {
        Err(DownloadError::http_status(url, response.status).into())
    }
}

fn hidden_sale_item_ids(cache: &ItemCache) -> HashSet<String> {
    cache
        .hidden
        .values()
        .filter_map(|item| item.sale_item_id.clone())
        .collect()
}

fn band_names(cache: &ItemCache) -> HashMap<String, String> {
    cache
        .collection
        .values()
        .chain(cache.hidden.values())
        .filter_map(|item| Some((item.sale_item_id.clone()?, item.band_name.clone()?)))
        .collect()
}

fn sale_item_id_from_url(url: &str) -> Option<String> {
    Url::parse(url).ok().and_then(|parsed| {
        parsed
            .query_pairs()
            .find(|(key, _)| key == SALE_ITEM_QUERY_KEY)
            .map(|(_, value)| value.into_owned())
    })
}

/// Matches on the URL's sale item parameter, or on a plain substring when
/// the URL carries none.
fn is_hidden(url: &str, hidden: &HashSet<String>) -> bool {
    match sale_item_id_from_url(url) {
        Some(id) => hidden.contains(&id),
        None => hidden.iter().any(|id| url.contains(id.as_str())),
    }
}
