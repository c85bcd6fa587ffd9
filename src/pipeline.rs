//! The full `run` pipeline: search → download → extract → dedupe.
//!
//! Queries run one after another. Each query's manifest entry and the
//! fingerprint snapshot are written as soon as that query settles, so an
//! interrupted run keeps everything it finished.
//!
//! A listing that fails is recorded against its query and the run moves
//! on, except when the service rejects the session: that aborts the whole
//! run, since every later query would be rejected too.

use anyhow::{bail, Result};
use docharvest_core::dedup::DedupParams;
use docharvest_core::models::QueryStats;
use docharvest_core::source::{Fetcher, SearchSource};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::dedupe::{dedupe_dir, DedupeReport};
use crate::download::DownloadManager;
use crate::extract::{extract_all, ExtractSummary, TextExtractor};
use crate::fetch::RetryPolicy;
use crate::fingerprints;
use crate::layout::OutputLayout;
use crate::manifest::{record_query, QueryEntry};
use crate::progress::{format_number, ProgressReporter};
use crate::search::{collect_items, is_fatal_search_error, CollectOptions};

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub queries: Vec<String>,
    pub output: PathBuf,
    /// Skip searching and downloading; extract and dedupe what is on disk.
    pub text_only: bool,
    pub dedupe: bool,
}

#[derive(Debug, Clone)]
pub struct QuerySummary {
    pub query: String,
    pub stats: QueryStats,
    /// Set when the listing itself failed; no items were attempted.
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub output: PathBuf,
    pub queries: Vec<QuerySummary>,
    pub pdfs_on_disk: usize,
    pub extraction: ExtractSummary,
    pub dedupe: Option<DedupeReport>,
    pub cancelled: bool,
}

impl RunSummary {
    /// `true` if any item, listing, or extraction failed.
    pub fn has_failures(&self) -> bool {
        self.extraction.failed > 0
            || self
                .queries
                .iter()
                .any(|q| q.error.is_some() || q.stats.failed > 0)
    }

    /// Human-readable results table for stdout.
    pub fn print(&self, out: &mut dyn Write) -> std::io::Result<()> {
        writeln!(out, "{}", "=".repeat(60))?;
        writeln!(out, "  RESULTS")?;
        writeln!(out, "{}", "=".repeat(60))?;
        for q in &self.queries {
            match &q.error {
                Some(e) => writeln!(out, "  {:<28} search failed: {}", q.query, e)?,
                None => writeln!(
                    out,
                    "  {:<28} dl={:<5} skip={:<5} fail={}",
                    q.query, q.stats.downloaded, q.stats.skipped, q.stats.failed
                )?,
            }
        }
        writeln!(out)?;
        writeln!(out, "  PDFs on disk:       {}", format_number(self.pdfs_on_disk as u64))?;
        writeln!(
            out,
            "  Texts created:      {} ({} reused, {} failed)",
            format_number(self.extraction.ok),
            format_number(self.extraction.reused),
            format_number(self.extraction.failed)
        )?;
        if let Some(report) = &self.dedupe {
            writeln!(out, "  Unique texts:       {}", format_number(report.unique as u64))?;
            writeln!(out, "  Duplicates removed: {}", format_number(report.removed as u64))?;
        }
        if self.cancelled {
            writeln!(out, "  (interrupted: rerun to resume)")?;
        }
        writeln!(out, "  Output:             {}", self.output.display())?;
        Ok(())
    }
}

/// Run the pipeline against the given collaborators.
pub async fn run_pipeline(
    config: &Config,
    options: &RunOptions,
    source: &dyn SearchSource,
    fetcher: Arc<dyn Fetcher>,
    extractor: Arc<dyn TextExtractor>,
    cancel: &CancellationToken,
    progress: Arc<dyn ProgressReporter>,
) -> Result<RunSummary> {
    if options.queries.is_empty() && !options.text_only {
        bail!("no queries given (use --text-only to process existing files)");
    }
    let dedup_params: DedupParams = config.dedup_params();
    dedup_params.validate()?;

    let layout = OutputLayout::new(&options.output);
    layout.ensure()?;
    info!(output = %layout.root().display(), queries = options.queries.len(), "run started");

    let mut store = fingerprints::load_verified(&layout, config.fetch.min_bytes)?;
    let mut queries = Vec::new();

    if !options.text_only {
        let manager = DownloadManager::new(
            layout.clone(),
            fetcher,
            RetryPolicy::from_config(&config.fetch),
            config.fetch.concurrency,
            config.fetch.min_bytes,
        )
        .with_batch_size(config.fetch.batch_size);
        let collect = CollectOptions::from_config(&config.search);

        for query in &options.queries {
            if cancel.is_cancelled() {
                warn!(query = %query, "cancelled before query started");
                break;
            }
            let items =
                match collect_items(source, query, collect, cancel, progress.as_ref()).await {
                    Ok(items) => items,
                    Err(e) if is_fatal_search_error(&e) => {
                        error!(query = %query, error = %format!("{:#}", e), "search session rejected, aborting run");
                        return Err(e.context("search service rejected the session"));
                    }
                    Err(e) => {
                        error!(query = %query, error = %format!("{:#}", e), "search failed");
                        queries.push(QuerySummary {
                            query: query.clone(),
                            stats: QueryStats::default(),
                            error: Some(format!("{:#}", e)),
                        });
                        continue;
                    }
                };

            let report = manager
                .download(query, items, &mut store, cancel, progress.as_ref())
                .await?;
            record_query(
                &layout,
                query,
                QueryEntry::from_records(report.stats, &report.records),
            )?;
            queries.push(QuerySummary {
                query: query.clone(),
                stats: report.stats,
                error: None,
            });
        }
    }

    let pdfs_on_disk = store.len();

    let extraction = if cancel.is_cancelled() {
        ExtractSummary::default()
    } else {
        let pdf_dir = layout.pdf_dir();
        let text_dir = layout.text_dir();
        let globs = config.extract.include_globs.clone();
        let progress = Arc::clone(&progress);
        tokio::task::spawn_blocking(move || {
            extract_all(extractor.as_ref(), &pdf_dir, &text_dir, &globs, progress.as_ref())
        })
        .await??
    };

    let dedupe = if options.dedupe && !cancel.is_cancelled() {
        let layout = layout.clone();
        let progress = Arc::clone(&progress);
        Some(
            tokio::task::spawn_blocking(move || {
                dedupe_dir(&layout, dedup_params, progress.as_ref())
            })
            .await??,
        )
    } else {
        None
    };

    let summary = RunSummary {
        output: layout.root().to_path_buf(),
        queries,
        pdfs_on_disk,
        extraction,
        dedupe,
        cancelled: cancel.is_cancelled(),
    };
    info!(
        failures = summary.has_failures(),
        cancelled = summary.cancelled,
        "run finished"
    );
    Ok(summary)
}
