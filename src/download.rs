//! Download manager: turns a list of [`RemoteItem`]s into files on disk.
//!
//! Items already recorded in the [`FingerprintStore`] are skipped without
//! touching the network. The rest go to a [`FetchPool`]; its events are
//! consumed here, at the only place that mutates [`FetchRecord`]s, the
//! store, or the counters. A success enters the store only after the file
//! has been verified on disk. The snapshot is saved every batch; a failed
//! batch save is logged and the events keep draining, and only the final
//! save after every worker has exited can fail the call.

use anyhow::Result;
use chrono::Utc;
use docharvest_core::fingerprint::FingerprintStore;
use docharvest_core::models::{FetchRecord, FetchStatus, QueryStats, RemoteItem};
use docharvest_core::source::Fetcher;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::fetch::{FetchEvent, FetchJob, FetchPool, RetryPolicy};
use crate::fingerprints::{self, is_complete};
use crate::layout::OutputLayout;
use crate::progress::{ProgressEvent, ProgressReporter};

/// Outcome of downloading one query's items.
#[derive(Debug, Clone)]
pub struct QueryReport {
    pub query: String,
    pub stats: QueryStats,
    pub records: Vec<FetchRecord>,
    /// `true` if cancellation left some items undispatched.
    pub cancelled: bool,
}

impl QueryReport {
    pub fn pending(&self) -> usize {
        self.records
            .iter()
            .filter(|r| !r.status.is_terminal())
            .count()
    }
}

pub struct DownloadManager {
    layout: OutputLayout,
    fetcher: Arc<dyn Fetcher>,
    policy: RetryPolicy,
    concurrency: usize,
    min_bytes: u64,
    batch_size: usize,
}

impl DownloadManager {
    pub fn new(
        layout: OutputLayout,
        fetcher: Arc<dyn Fetcher>,
        policy: RetryPolicy,
        concurrency: usize,
        min_bytes: u64,
    ) -> Self {
        Self {
            layout,
            fetcher,
            policy,
            concurrency: concurrency.max(1),
            min_bytes,
            batch_size: 25,
        }
    }

    /// Report progress every `batch_size` settled items.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub async fn download(
        &self,
        query: &str,
        items: Vec<RemoteItem>,
        store: &mut FingerprintStore,
        cancel: &CancellationToken,
        progress: &dyn ProgressReporter,
    ) -> Result<QueryReport> {
        let mut records: Vec<FetchRecord> = Vec::with_capacity(items.len());
        let mut index: HashMap<String, usize> = HashMap::new();
        for item in items {
            if index.contains_key(&item.id) {
                debug!(item_id = %item.id, url = %item.url, "duplicate identifier in listing, ignored");
                continue;
            }
            let path = self.layout.pdf_path(&item.id);
            index.insert(item.id.clone(), records.len());
            records.push(FetchRecord::new(item, path));
        }

        let mut stats = QueryStats {
            requested: records.len() as u64,
            ..Default::default()
        };

        let mut jobs = Vec::new();
        for record in records.iter_mut() {
            let id = record.item.id.as_str();
            let present = store.contains(id)
                || (is_complete(&record.path, self.min_bytes) && store.insert(id, &record.path));
            if present {
                record.status = FetchStatus::Skipped;
                stats.record(&record.status);
            } else {
                jobs.push(FetchJob {
                    item: record.item.clone(),
                    path: record.path.clone(),
                });
            }
        }

        let to_fetch = jobs.len() as u64;
        info!(
            query,
            requested = stats.requested,
            skipped = stats.skipped,
            to_fetch,
            "download started"
        );

        if !jobs.is_empty() {
            let (tx, mut rx) = mpsc::channel(self.concurrency * 2);
            let pool = FetchPool::spawn(
                jobs,
                Arc::clone(&self.fetcher),
                self.policy,
                self.concurrency,
                cancel.clone(),
                tx,
            );

            let mut settled = 0u64;
            while let Some(event) = rx.recv().await {
                match event {
                    FetchEvent::Started { id } => {
                        if let Some(&i) = index.get(&id) {
                            records[i].status = FetchStatus::InProgress;
                        }
                    }
                    FetchEvent::Finished { id, outcome } => {
                        let Some(&i) = index.get(&id) else {
                            warn!(item_id = %id, "event for unknown item");
                            continue;
                        };
                        let record = &mut records[i];
                        record.attempts = outcome.attempts;
                        record.finished_at = Some(Utc::now());
                        record.status = match outcome.result {
                            Ok(bytes) if is_complete(&record.path, self.min_bytes) => {
                                store.insert(id.as_str(), &record.path);
                                debug!(item_id = %id, bytes, attempts = outcome.attempts, "downloaded");
                                FetchStatus::Succeeded
                            }
                            Ok(bytes) => {
                                if let Err(e) = tokio::fs::remove_file(&record.path).await {
                                    warn!(item_id = %id, error = %e, "could not remove unverified file");
                                }
                                let reason = format!("verification failed ({} bytes written)", bytes);
                                record.last_error = Some(reason.clone());
                                FetchStatus::Failed { reason }
                            }
                            Err(e) => {
                                record.last_error = Some(e.reason().to_string());
                                FetchStatus::Failed {
                                    reason: e.reason().to_string(),
                                }
                            }
                        };
                        stats.record(&record.status);

                        settled += 1;
                        if settled % self.batch_size as u64 == 0 || settled == to_fetch {
                            progress.report(ProgressEvent::Downloading {
                                query: query.to_string(),
                                done: settled,
                                total: to_fetch,
                                downloaded: stats.downloaded,
                                skipped: stats.skipped,
                                failed: stats.failed,
                            });
                            if let Err(e) = fingerprints::save(&self.layout, store) {
                                warn!(query, error = %format!("{:#}", e), "fingerprint snapshot failed, continuing");
                            }
                        }
                    }
                }
            }
            pool.join().await;
        }

        let report = QueryReport {
            query: query.to_string(),
            stats,
            cancelled: cancel.is_cancelled(),
            records,
        };
        let pending = report.pending();
        if pending > 0 {
            warn!(query, pending, "download interrupted, items left pending");
        }
        fingerprints::save(&self.layout, store)?;
        info!(
            query,
            downloaded = stats.downloaded,
            skipped = stats.skipped,
            failed = stats.failed,
            "download finished"
        );
        Ok(report)
    }
}
