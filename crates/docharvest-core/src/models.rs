//! Core data models used throughout docharvest.
//!
//! These types describe the items that flow through the acquisition
//! pipeline (search listing → fetch → extracted text) and the per-query
//! counters that end up in the run manifest.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A document advertised by the remote search listing.
///
/// Immutable once yielded by a [`SearchSource`](crate::source::SearchSource).
/// The `id` is stable across runs and safe to use as a filename; it is the
/// key of the [`FingerprintStore`](crate::fingerprint::FingerprintStore).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteItem {
    pub id: String,
    pub title: Option<String>,
    pub url: String,
    pub size_hint: Option<u64>,
}

/// Lifecycle state of a [`FetchRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum FetchStatus {
    Pending,
    InProgress,
    Succeeded,
    Failed { reason: String },
    /// Already present on disk before the run touched the network.
    Skipped,
}

impl FetchStatus {
    /// `true` once the record can no longer change during this run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FetchStatus::Succeeded | FetchStatus::Failed { .. } | FetchStatus::Skipped
        )
    }
}

/// Per-item bookkeeping for one download.
///
/// Created when a [`RemoteItem`] is selected for download. Only the
/// aggregation point of the download manager mutates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchRecord {
    pub item: RemoteItem,
    pub path: PathBuf,
    pub status: FetchStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl FetchRecord {
    pub fn new(item: RemoteItem, path: PathBuf) -> Self {
        Self {
            item,
            path,
            status: FetchStatus::Pending,
            attempts: 0,
            last_error: None,
            finished_at: None,
        }
    }
}

/// Plain text recovered from a fetched file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedDocument {
    /// Stable identifier (the file stem of the source file).
    pub id: String,
    pub path: PathBuf,
    pub text: String,
    pub byte_len: usize,
}

impl ExtractedDocument {
    pub fn new(id: impl Into<String>, path: impl Into<PathBuf>, text: String) -> Self {
        let byte_len = text.len();
        Self {
            id: id.into(),
            path: path.into(),
            text,
            byte_len,
        }
    }
}

/// Aggregate counters for one query, as written to the manifest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryStats {
    pub requested: u64,
    pub downloaded: u64,
    pub skipped: u64,
    pub failed: u64,
}

impl QueryStats {
    /// Fold a terminal status into the counters. Non-terminal states are ignored.
    pub fn record(&mut self, status: &FetchStatus) {
        match status {
            FetchStatus::Succeeded => self.downloaded += 1,
            FetchStatus::Skipped => self.skipped += 1,
            FetchStatus::Failed { .. } => self.failed += 1,
            FetchStatus::Pending | FetchStatus::InProgress => {}
        }
    }

    /// Items that reached a terminal state.
    pub fn settled(&self) -> u64 {
        self.downloaded + self.skipped + self.failed
    }
}
