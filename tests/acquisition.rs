//! Integration tests for the acquisition half of the pipeline.
//!
//! A scripted in-memory `SearchSource` and `Fetcher` stand in for the
//! remote service, so every run is deterministic and offline.

use anyhow::{bail, Result};
use async_trait::async_trait;
use docharvest::config::Config;
use docharvest::download::DownloadManager;
use docharvest::extract::TextExtractor;
use docharvest::fetch::RetryPolicy;
use docharvest::layout::OutputLayout;
use docharvest::manifest::Manifest;
use docharvest::pipeline::{run_pipeline, RunOptions, RunSummary};
use docharvest::progress::NoProgress;
use docharvest::search::item_from_url;
use docharvest_core::error::{ExtractError, FetchError, SearchError};
use docharvest_core::fingerprint::FingerprintStore;
use docharvest_core::models::{ExtractedDocument, FetchStatus, RemoteItem};
use docharvest_core::source::{Fetcher, SearchPage, SearchSource};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

// ─── Fakes ──────────────────────────────────────────────────────────

fn items(n: usize) -> Vec<RemoteItem> {
    (0..n)
        .map(|i| item_from_url(&format!("https://example.test/files/doc{:02}.pdf", i), None))
        .collect()
}

fn body_for(id: &str) -> Vec<u8> {
    format!("document {} ", id).repeat(60).into_bytes()
}

#[derive(Clone, Copy)]
enum ListingFailure {
    Unavailable,
    Unauthorized,
}

/// Serves `items` ten per page. `fail` makes every page of one query an error.
struct FakeSource {
    items: Vec<RemoteItem>,
    fail: Option<(&'static str, ListingFailure)>,
}

#[async_trait]
impl SearchSource for FakeSource {
    fn page_size(&self) -> u64 {
        10
    }

    async fn fetch_page(&self, query: &str, page: u64) -> Result<SearchPage> {
        match self.fail {
            Some((q, ListingFailure::Unavailable)) if q == query => {
                bail!("search API HTTP 503")
            }
            Some((q, ListingFailure::Unauthorized)) if q == query => {
                return Err(SearchError::Unauthorized(403).into());
            }
            _ => {}
        }
        let start = ((page - 1) * 10) as usize;
        let end = (start + 10).min(self.items.len());
        Ok(SearchPage {
            total_hits: Some(self.items.len() as u64),
            items: self.items.get(start..end).unwrap_or_default().to_vec(),
        })
    }
}

#[derive(Default)]
struct FakeFetcher {
    transient: HashSet<String>,
    permanent: HashSet<String>,
    /// Ids answered with a 100-byte body.
    short: HashSet<String>,
    delay: Duration,
    cancel_after: Option<(usize, CancellationToken)>,
    calls: Mutex<HashMap<String, u32>>,
    total_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeFetcher {
    fn calls_for(&self, id: &str) -> u32 {
        self.calls.lock().unwrap().get(id).copied().unwrap_or(0)
    }

    fn total(&self) -> usize {
        self.total_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch(&self, item: &RemoteItem) -> std::result::Result<Vec<u8>, FetchError> {
        let n = self.total_calls.fetch_add(1, Ordering::SeqCst) + 1;
        *self.calls.lock().unwrap().entry(item.id.clone()).or_default() += 1;

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some((after, token)) = &self.cancel_after {
            if n == *after {
                token.cancel();
            }
        }

        if self.transient.contains(&item.id) {
            return Err(FetchError::Transient("HTTP 503".to_string()));
        }
        if self.permanent.contains(&item.id) {
            return Err(FetchError::Permanent("HTTP 404".to_string()));
        }
        if self.short.contains(&item.id) {
            return Ok(vec![b'x'; 100]);
        }
        Ok(body_for(&item.id))
    }
}

/// Treats the downloaded bytes as the document text.
struct RawText;

impl TextExtractor for RawText {
    fn extract(&self, path: &Path) -> std::result::Result<ExtractedDocument, ExtractError> {
        let text = std::fs::read_to_string(path)?;
        let id = path.file_stem().unwrap().to_string_lossy().into_owned();
        Ok(ExtractedDocument::new(id, path, text))
    }
}

// ─── Helpers ────────────────────────────────────────────────────────

fn test_config() -> Config {
    let mut cfg = Config::default();
    cfg.search.page_delay_min_ms = 0;
    cfg.search.page_delay_max_ms = 0;
    cfg.fetch.backoff_base_ms = 1;
    cfg.fetch.backoff_max_ms = 2;
    cfg
}

fn options(tmp: &TempDir, queries: &[&str]) -> RunOptions {
    RunOptions {
        queries: queries.iter().map(|q| q.to_string()).collect(),
        output: tmp.path().join("out"),
        text_only: false,
        dedupe: false,
    }
}

async fn run(
    cfg: &Config,
    opts: &RunOptions,
    source: &FakeSource,
    fetcher: &Arc<FakeFetcher>,
    cancel: &CancellationToken,
) -> RunSummary {
    let dyn_fetcher: Arc<dyn Fetcher> = fetcher.clone();
    run_pipeline(
        cfg,
        opts,
        source,
        dyn_fetcher,
        Arc::new(RawText),
        cancel,
        Arc::new(NoProgress),
    )
    .await
    .unwrap()
}

fn quick_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base: Duration::from_millis(1),
        max: Duration::from_millis(2),
        jitter: false,
        min_bytes: 500,
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[tokio::test]
async fn second_run_touches_nothing() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config();
    let opts = options(&tmp, &["passport"]);
    let source = FakeSource {
        items: items(25),
        fail: None,
    };

    let first = Arc::new(FakeFetcher::default());
    let summary = run(&cfg, &opts, &source, &first, &CancellationToken::new()).await;
    assert_eq!(summary.queries[0].stats.downloaded, 25);
    assert_eq!(first.total(), 25);
    assert!(!summary.has_failures());
    assert_eq!(summary.extraction.ok, 25);
    let snapshot = OutputLayout::new(&opts.output).fingerprints_path();
    let before = std::fs::read(&snapshot).unwrap();

    let second = Arc::new(FakeFetcher::default());
    let summary = run(&cfg, &opts, &source, &second, &CancellationToken::new()).await;
    assert_eq!(second.total(), 0);
    let stats = summary.queries[0].stats;
    assert_eq!((stats.downloaded, stats.skipped, stats.failed), (0, 25, 0));
    assert_eq!(summary.extraction.reused, 25);
    assert_eq!(std::fs::read(&snapshot).unwrap(), before);
}

#[tokio::test]
async fn resume_fetches_only_missing_items() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config();
    let opts = options(&tmp, &["passport"]);
    let all = items(12);

    let layout = OutputLayout::new(&opts.output);
    layout.ensure().unwrap();
    for item in &all[..5] {
        std::fs::write(layout.pdf_path(&item.id), body_for(&item.id)).unwrap();
    }
    // A truncated leftover does not count as present.
    std::fs::write(layout.pdf_path(&all[5].id), b"partial").unwrap();

    let source = FakeSource {
        items: all.clone(),
        fail: None,
    };
    let fetcher = Arc::new(FakeFetcher::default());
    let summary = run(&cfg, &opts, &source, &fetcher, &CancellationToken::new()).await;

    assert_eq!(fetcher.total(), 7);
    let stats = summary.queries[0].stats;
    assert_eq!((stats.requested, stats.skipped, stats.downloaded), (12, 5, 7));
    for item in &all[..5] {
        assert_eq!(fetcher.calls_for(&item.id), 0);
    }
    assert_eq!(
        std::fs::read(layout.pdf_path(&all[5].id)).unwrap(),
        body_for(&all[5].id)
    );
}

#[tokio::test]
async fn transient_failures_stop_at_the_attempt_limit() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config();
    let opts = options(&tmp, &["passport"]);
    let all = items(4);
    let flaky = all[1].id.clone();
    let missing = all[2].id.clone();

    let source = FakeSource {
        items: all,
        fail: None,
    };
    let fetcher = Arc::new(FakeFetcher {
        transient: HashSet::from([flaky.clone()]),
        permanent: HashSet::from([missing.clone()]),
        ..Default::default()
    });
    let summary = run(&cfg, &opts, &source, &fetcher, &CancellationToken::new()).await;

    assert_eq!(fetcher.calls_for(&flaky), 3);
    assert_eq!(fetcher.calls_for(&missing), 1);
    let stats = summary.queries[0].stats;
    assert_eq!((stats.downloaded, stats.failed), (2, 2));
    assert!(summary.has_failures());

    let layout = OutputLayout::new(&opts.output);
    assert!(!layout.pdf_path(&flaky).exists());
    assert!(!layout.pdf_path(&missing).exists());

    let manifest = Manifest::load(&layout).unwrap();
    let entry = manifest.get("passport").unwrap();
    assert_eq!(entry.stats, stats);
    let attempts: HashMap<_, _> = entry
        .failures
        .iter()
        .map(|f| (f.id.clone(), (f.attempts, f.reason.clone())))
        .collect();
    assert_eq!(attempts[&flaky], (3, "HTTP 503".to_string()));
    assert_eq!(attempts[&missing], (1, "HTTP 404".to_string()));
}

#[tokio::test]
async fn in_flight_fetches_never_exceed_concurrency() {
    let tmp = TempDir::new().unwrap();
    let layout = OutputLayout::new(tmp.path());
    layout.ensure().unwrap();

    let fetcher = Arc::new(FakeFetcher {
        delay: Duration::from_millis(10),
        ..Default::default()
    });
    let manager = DownloadManager::new(layout, fetcher.clone(), quick_policy(), 3, 500);
    let mut store = FingerprintStore::new();
    let report = manager
        .download(
            "q",
            items(20),
            &mut store,
            &CancellationToken::new(),
            &NoProgress,
        )
        .await
        .unwrap();

    assert_eq!(report.stats.downloaded, 20);
    assert_eq!(store.len(), 20);
    let peak = fetcher.max_in_flight.load(Ordering::SeqCst);
    assert!(peak <= 3, "peak in-flight {}", peak);
    assert!(peak >= 1);
}

#[tokio::test]
async fn duplicate_ids_in_a_listing_are_fetched_once() {
    let tmp = TempDir::new().unwrap();
    let layout = OutputLayout::new(tmp.path());
    layout.ensure().unwrap();

    let mut listing = items(3);
    // Same basename under a different URL.
    listing.push(item_from_url("https://mirror.test/doc00.pdf", None));

    let fetcher = Arc::new(FakeFetcher::default());
    let manager = DownloadManager::new(layout, fetcher.clone(), quick_policy(), 2, 500);
    let mut store = FingerprintStore::new();
    let report = manager
        .download("q", listing, &mut store, &CancellationToken::new(), &NoProgress)
        .await
        .unwrap();

    assert_eq!(report.stats.requested, 3);
    assert_eq!(fetcher.calls_for("doc00.pdf"), 1);
}

#[tokio::test]
async fn cancellation_stops_dispatch_and_a_rerun_resumes() {
    let tmp = TempDir::new().unwrap();
    let layout = OutputLayout::new(tmp.path());
    layout.ensure().unwrap();

    let cancel = CancellationToken::new();
    let fetcher = Arc::new(FakeFetcher {
        cancel_after: Some((3, cancel.clone())),
        ..Default::default()
    });
    let manager = DownloadManager::new(layout.clone(), fetcher.clone(), quick_policy(), 1, 500);
    let mut store = FingerprintStore::new();
    let report = manager
        .download("q", items(10), &mut store, &cancel, &NoProgress)
        .await
        .unwrap();

    assert!(report.cancelled);
    assert_eq!(report.stats.downloaded, 3);
    assert_eq!(report.pending(), 7);
    assert!(report
        .records
        .iter()
        .filter(|r| r.status == FetchStatus::Pending)
        .all(|r| !r.path.exists()));

    let again = Arc::new(FakeFetcher::default());
    let manager = DownloadManager::new(layout, again.clone(), quick_policy(), 1, 500);
    let report = manager
        .download(
            "q",
            items(10),
            &mut store,
            &CancellationToken::new(),
            &NoProgress,
        )
        .await
        .unwrap();
    assert_eq!(again.total(), 7);
    assert_eq!((report.stats.skipped, report.stats.downloaded), (3, 7));
}

#[tokio::test]
async fn failed_listing_does_not_stop_other_queries() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config();
    let opts = options(&tmp, &["broken", "passport"]);
    let source = FakeSource {
        items: items(3),
        fail: Some(("broken", ListingFailure::Unavailable)),
    };
    let fetcher = Arc::new(FakeFetcher::default());
    let summary = run(&cfg, &opts, &source, &fetcher, &CancellationToken::new()).await;
    assert!(summary.queries[0].error.is_some());
    assert_eq!(summary.queries[1].stats.downloaded, 3);
    assert!(summary.has_failures());
    assert_eq!(fetcher.total(), 3);

    let manifest = Manifest::load(&OutputLayout::new(&opts.output)).unwrap();
    assert!(manifest.get("broken").is_none());
    assert!(manifest.get("passport").is_some());
}

#[tokio::test]
async fn rejected_session_aborts_the_run() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config();
    let opts = options(&tmp, &["passport", "locked", "visa"]);
    let source = FakeSource {
        items: items(3),
        fail: Some(("locked", ListingFailure::Unauthorized)),
    };
    let fetcher = Arc::new(FakeFetcher::default());
    let dyn_fetcher: Arc<dyn Fetcher> = fetcher.clone();
    let err = run_pipeline(
        &cfg,
        &opts,
        &source,
        dyn_fetcher,
        Arc::new(RawText),
        &CancellationToken::new(),
        Arc::new(NoProgress),
    )
    .await
    .unwrap_err();

    assert_eq!(
        err.downcast_ref::<SearchError>(),
        Some(&SearchError::Unauthorized(403))
    );
    // The query before the rejection finished and was recorded; the one
    // after it never ran.
    assert_eq!(fetcher.total(), 3);
    let manifest = Manifest::load(&OutputLayout::new(&opts.output)).unwrap();
    assert_eq!(manifest.get("passport").unwrap().stats.downloaded, 3);
    assert!(manifest.get("locked").is_none());
    assert!(manifest.get("visa").is_none());
}

#[tokio::test]
async fn short_bodies_are_retried_and_never_land_in_place() {
    let tmp = TempDir::new().unwrap();
    let layout = OutputLayout::new(tmp.path());
    layout.ensure().unwrap();

    let all = items(3);
    let tiny = all[0].id.clone();
    let fetcher = Arc::new(FakeFetcher {
        short: HashSet::from([tiny.clone()]),
        ..Default::default()
    });
    let manager = DownloadManager::new(layout.clone(), fetcher.clone(), quick_policy(), 2, 500);
    let mut store = FingerprintStore::new();
    let report = manager
        .download("q", all, &mut store, &CancellationToken::new(), &NoProgress)
        .await
        .unwrap();

    assert_eq!(fetcher.calls_for(&tiny), 3);
    let record = report.records.iter().find(|r| r.item.id == tiny).unwrap();
    assert_eq!(record.attempts, 3);
    assert!(matches!(
        &record.status,
        FetchStatus::Failed { reason } if reason.starts_with("tiny response")
    ));
    assert!(!layout.pdf_path(&tiny).exists());
    assert!(!store.contains(&tiny));
    assert_eq!((report.stats.downloaded, report.stats.failed), (2, 1));
}

#[tokio::test]
async fn snapshot_failure_still_drains_every_fetch() {
    let tmp = TempDir::new().unwrap();
    let layout = OutputLayout::new(tmp.path());
    layout.ensure().unwrap();
    // A directory where the snapshot file belongs makes every save fail.
    std::fs::create_dir_all(layout.fingerprints_path()).unwrap();

    let all = items(6);
    let fetcher = Arc::new(FakeFetcher {
        delay: Duration::from_millis(5),
        ..Default::default()
    });
    let manager = DownloadManager::new(layout.clone(), fetcher.clone(), quick_policy(), 1, 500)
        .with_batch_size(1);
    let mut store = FingerprintStore::new();
    let result = manager
        .download("q", all.clone(), &mut store, &CancellationToken::new(), &NoProgress)
        .await;

    assert!(result.is_err());
    assert_eq!(fetcher.total(), 6);
    assert_eq!(store.len(), 6);
    for item in &all {
        assert!(layout.pdf_path(&item.id).exists());
    }
}

#[tokio::test]
async fn manifest_accumulates_across_runs() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config();
    let source = FakeSource {
        items: items(3),
        fail: None,
    };
    let fetcher = Arc::new(FakeFetcher::default());

    run(
        &cfg,
        &options(&tmp, &["passport"]),
        &source,
        &fetcher,
        &CancellationToken::new(),
    )
    .await;
    run(
        &cfg,
        &options(&tmp, &["visa"]),
        &source,
        &fetcher,
        &CancellationToken::new(),
    )
    .await;

    let manifest = Manifest::load(&OutputLayout::new(tmp.path().join("out"))).unwrap();
    assert_eq!(manifest.get("passport").unwrap().stats.downloaded, 3);
    let visa = manifest.get("visa").unwrap();
    assert_eq!((visa.stats.downloaded, visa.stats.skipped), (0, 3));
}

#[tokio::test]
async fn run_without_queries_needs_text_only() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config();
    let source = FakeSource {
        items: vec![],
        fail: None,
    };
    let fetcher: Arc<dyn Fetcher> = Arc::new(FakeFetcher::default());
    let mut opts = options(&tmp, &[]);
    let err = run_pipeline(
        &cfg,
        &opts,
        &source,
        fetcher.clone(),
        Arc::new(RawText),
        &CancellationToken::new(),
        Arc::new(NoProgress),
    )
    .await
    .unwrap_err();
    assert!(err.to_string().contains("no queries"));

    opts.text_only = true;
    let summary = run_pipeline(
        &cfg,
        &opts,
        &source,
        fetcher,
        Arc::new(RawText),
        &CancellationToken::new(),
        Arc::new(NoProgress),
    )
    .await
    .unwrap();
    assert!(summary.queries.is_empty());
    assert!(!summary.has_failures());
}
