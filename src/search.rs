//! Search listing: the HTTP [`SearchSource`] and the paging walk over it.
//!
//! The listing service is an Elasticsearch-style endpoint:
//!
//! ```text
//! GET <api_url>?keys=<query>&page=<n>
//!
//! { "hits": { "total": { "value": 1545 },
//!             "hits": [ { "_source": { "ORIGIN_FILE_URI": "https://…/x.pdf",
//!                                      "ORIGIN_FILE_NAME": "x.pdf" } } ] } }
//! ```
//!
//! Many index entries point at the same file, so [`collect_items`] stops as
//! soon as a page contributes nothing new.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use docharvest_core::error::SearchError;
use docharvest_core::models::RemoteItem;
use docharvest_core::source::{SearchPage, SearchSource};
use rand::Rng;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SearchConfig;
use crate::progress::{ProgressEvent, ProgressReporter};

/// Filesystem-safe identifier for a remote file.
///
/// The URL's basename when it names a PDF, with `< > : " / \ | ? *`
/// replaced by `_`; otherwise the first 16 hex digits of the URL's SHA-256
/// plus `.pdf`.
pub fn safe_filename(url: &str) -> String {
    let path = reqwest::Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| url.split(['?', '#']).next().unwrap_or_default().to_string());
    let name = path.rsplit('/').next().unwrap_or_default();
    if !name.is_empty() && name.to_lowercase().ends_with(".pdf") {
        return name
            .chars()
            .map(|c| match c {
                '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
                c => c,
            })
            .collect();
    }
    let digest = Sha256::digest(url.as_bytes());
    format!("{}.pdf", &hex::encode(digest)[..16])
}

pub fn item_from_url(url: &str, title: Option<String>) -> RemoteItem {
    RemoteItem {
        id: safe_filename(url),
        title,
        url: url.to_string(),
        size_hint: None,
    }
}

/// Extract the PDF entries of one response body.
pub fn parse_search_page(json: &serde_json::Value) -> Result<SearchPage> {
    let hits = json
        .get("hits")
        .ok_or_else(|| anyhow!("Invalid search response: missing hits"))?;
    let total_hits = hits
        .get("total")
        .and_then(|t| t.get("value").or(Some(t)))
        .and_then(|v| v.as_u64());

    let items = hits
        .get("hits")
        .and_then(|h| h.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|hit| {
                    let src = hit.get("_source")?;
                    let uri = src.get("ORIGIN_FILE_URI")?.as_str()?;
                    if uri.is_empty() || !uri.to_lowercase().contains(".pdf") {
                        return None;
                    }
                    let title = src
                        .get("ORIGIN_FILE_NAME")
                        .and_then(|n| n.as_str())
                        .map(str::to_string);
                    Some(item_from_url(uri, title))
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(SearchPage { total_hits, items })
}

/// Map a listing response status to an error. 401 and 403 become
/// [`SearchError::Unauthorized`]; other non-2xx statuses a plain error.
pub fn check_search_status(status: reqwest::StatusCode) -> Result<()> {
    if status.is_success() {
        return Ok(());
    }
    let code = status.as_u16();
    if matches!(code, 401 | 403) {
        return Err(SearchError::Unauthorized(code).into());
    }
    bail!("search API HTTP {}", code)
}

/// `true` when `err` carries a [`SearchError`], through any added context.
pub fn is_fatal_search_error(err: &anyhow::Error) -> bool {
    err.downcast_ref::<SearchError>().is_some()
}

/// [`SearchSource`] over the multimedia search HTTP API.
///
/// Authentication is external: a session cookie obtained elsewhere can be
/// supplied through `search.cookie`.
pub struct HttpSearchSource {
    client: reqwest::Client,
    config: SearchConfig,
}

impl HttpSearchSource {
    pub fn new(config: &SearchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    async fn fetch_once(&self, query: &str, page: u64) -> Result<serde_json::Value> {
        let mut req = self
            .client
            .get(&self.config.api_url)
            .query(&[("keys", query.to_string()), ("page", page.to_string())])
            .header("Accept", "application/json");
        if let Some(cookie) = &self.config.cookie {
            req = req.header("Cookie", cookie);
        }
        let response = req.send().await?;
        check_search_status(response.status())?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl SearchSource for HttpSearchSource {
    fn page_size(&self) -> u64 {
        self.config.results_per_page
    }

    async fn fetch_page(&self, query: &str, page: u64) -> Result<SearchPage> {
        let mut last_err = None;
        for attempt in 1..=self.config.max_retries.max(1) {
            match self.fetch_once(query, page).await {
                Ok(json) => return parse_search_page(&json),
                Err(e) if is_fatal_search_error(&e) => {
                    warn!(query, page, error = %e, "search session rejected");
                    return Err(e);
                }
                Err(e) => {
                    warn!(query, page, attempt, error = %e, "search page failed");
                    last_err = Some(e);
                    if attempt < self.config.max_retries {
                        let delay = rand::thread_rng().gen_range(2000..=4000);
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                    }
                }
            }
        }
        Err(last_err.unwrap_or_else(|| anyhow!("search failed after retries")))
    }
}

/// Paging limits for [`collect_items`].
#[derive(Debug, Clone, Copy)]
pub struct CollectOptions {
    pub max_pages: u64,
    pub page_delay_min: Duration,
    pub page_delay_max: Duration,
}

impl CollectOptions {
    pub fn from_config(config: &SearchConfig) -> Self {
        Self {
            max_pages: config.max_pages,
            page_delay_min: Duration::from_millis(config.page_delay_min_ms),
            page_delay_max: Duration::from_millis(config.page_delay_max_ms),
        }
    }

    fn delay(&self) -> Duration {
        if self.page_delay_max <= self.page_delay_min {
            return self.page_delay_min;
        }
        rand::thread_rng().gen_range(self.page_delay_min..=self.page_delay_max)
    }
}

/// Walk the listing for `query` and return its unique items, sorted by URL.
///
/// A failure on page 1 is an error, as is a [`SearchError`] on any page.
/// Later pages otherwise end the walk early on error, on a page that adds
/// no new URL, or on cancellation.
pub async fn collect_items(
    source: &dyn SearchSource,
    query: &str,
    options: CollectOptions,
    cancel: &CancellationToken,
    progress: &dyn ProgressReporter,
) -> Result<Vec<RemoteItem>> {
    let first = source
        .fetch_page(query, 1)
        .await
        .with_context(|| format!("search for {:?} failed on the first page", query))?;

    let per_page = source.page_size().max(1);
    let pages = match first.total_hits {
        Some(total) => total.div_ceil(per_page).min(options.max_pages),
        None => options.max_pages,
    };
    info!(
        query,
        total_hits = first.total_hits,
        pages,
        max_pages = options.max_pages,
        "search started"
    );

    let mut by_url: BTreeMap<String, RemoteItem> = BTreeMap::new();
    for item in first.items {
        by_url.entry(item.url.clone()).or_insert(item);
    }
    progress.report(ProgressEvent::Searching {
        query: query.to_string(),
        page: 1,
        items: by_url.len() as u64,
        total_hits: first.total_hits,
    });

    for page in 2..=pages {
        if cancel.is_cancelled() {
            info!(query, page, "search cancelled");
            break;
        }
        tokio::select! {
            _ = cancel.cancelled() => {
                info!(query, page, "search cancelled");
                break;
            }
            _ = tokio::time::sleep(options.delay()) => {}
        }

        let result = match source.fetch_page(query, page).await {
            Ok(result) => result,
            Err(e) if is_fatal_search_error(&e) => {
                return Err(e.context(format!("search for {:?} failed on page {}", query, page)));
            }
            Err(e) => {
                warn!(query, page, error = %e, "search page error, stopping");
                break;
            }
        };
        let before = by_url.len();
        for item in result.items {
            by_url.entry(item.url.clone()).or_insert(item);
        }
        let added = by_url.len() - before;
        debug!(query, page, added, total = by_url.len(), "search page");
        progress.report(ProgressEvent::Searching {
            query: query.to_string(),
            page,
            items: by_url.len() as u64,
            total_hits: first.total_hits,
        });
        if added == 0 {
            info!(query, page, "page added no new items, stopping");
            break;
        }
    }

    info!(query, unique = by_url.len(), "search finished");
    Ok(by_url.into_values().collect())
}
