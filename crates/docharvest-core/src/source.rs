//! Collaborator traits injected into the acquisition pipeline.
//!
//! The pipeline never knows how a remote session is established or how
//! bytes travel over the wire. It is handed a [`SearchSource`] that yields
//! pages of [`RemoteItem`]s and a [`Fetcher`] that retrieves one item's
//! bytes. Concrete HTTP implementations live in the `docharvest` app crate;
//! tests supply in-memory fakes.
//!
//! Implementations must be `Send + Sync` to be shared across worker tasks.

use anyhow::Result;
use async_trait::async_trait;

use crate::error::FetchError;
use crate::models::RemoteItem;

/// One page of search results.
#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    /// Total number of index entries reported by the service, if known.
    pub total_hits: Option<u64>,
    pub items: Vec<RemoteItem>,
}

/// A paginated listing of remote documents for a query.
///
/// Pages are 1-indexed. Each call may suspend on network I/O and on
/// authentication state that is external to this crate.
#[async_trait]
pub trait SearchSource: Send + Sync {
    /// Number of results the service returns per page.
    fn page_size(&self) -> u64;

    /// Fetch a single page of results.
    async fn fetch_page(&self, query: &str, page: u64) -> Result<SearchPage>;
}

/// Retrieves the raw bytes of one remote item.
///
/// Implementations classify every failure as either
/// [`FetchError::Transient`] (the worker pool retries with backoff) or
/// [`FetchError::Permanent`] (the item fails immediately).
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, item: &RemoteItem) -> std::result::Result<Vec<u8>, FetchError>;
}
