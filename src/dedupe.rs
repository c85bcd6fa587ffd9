//! Deduplication of an extracted `texts/` directory.
//!
//! Reads every `*.txt` directly under `texts/` in file-name order (which is
//! the first-seen order), one file at a time: each text is signed and
//! dropped before the next is read. Each removed duplicate is then moved
//! into `texts/removed_duplicates/` and `texts/dedupe_report.json` is
//! written. Canonical survivors are never touched.

use anyhow::{Context, Result};
use docharvest_core::dedup::{DedupOutcome, DedupParams, Deduplicator, DuplicateCluster};
use docharvest_core::lsh::BandingParams;
use docharvest_core::models::ExtractedDocument;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::atomic::write_atomic_sync;
use crate::layout::OutputLayout;
use crate::progress::{ProgressEvent, ProgressReporter};

/// The `*.txt` files directly under `text_dir`, as `(id, path)` in file-name order.
pub fn text_files(text_dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut files = Vec::new();
    if !text_dir.is_dir() {
        return Ok(files);
    }
    for entry in WalkDir::new(text_dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry?;
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().and_then(|e| e.to_str()) != Some("txt")
        {
            continue;
        }
        let id = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        files.push((id, path.to_path_buf()));
    }
    Ok(files)
}

#[derive(Debug, Clone, Serialize)]
pub struct ClusterReport {
    pub canonical: String,
    pub members: Vec<String>,
    pub removed: Vec<String>,
}

impl From<&DuplicateCluster> for ClusterReport {
    fn from(c: &DuplicateCluster) -> Self {
        Self {
            canonical: c.canonical.clone(),
            members: c.members.clone(),
            removed: c.removed().map(str::to_string).collect(),
        }
    }
}

/// Contents of `dedupe_report.json`.
#[derive(Debug, Clone, Serialize)]
pub struct DedupeReport {
    pub threshold: f64,
    pub num_perm: usize,
    pub shingle_size: usize,
    pub banding: BandingParams,
    pub total: usize,
    pub considered: usize,
    pub excluded: Vec<String>,
    pub unique: usize,
    pub removed: usize,
    pub candidate_pairs: usize,
    pub confirmed_pairs: usize,
    pub clusters: Vec<ClusterReport>,
}

impl DedupeReport {
    fn new(params: &DedupParams, total: usize, outcome: &DedupOutcome, moved: usize) -> Self {
        Self {
            threshold: params.threshold,
            num_perm: params.num_perm,
            shingle_size: params.shingle_size,
            banding: outcome.banding,
            total,
            considered: outcome.considered,
            excluded: outcome.excluded.iter().map(|(id, _)| id.clone()).collect(),
            unique: total - moved,
            removed: moved,
            candidate_pairs: outcome.stats.candidates,
            confirmed_pairs: outcome.stats.confirmed,
            clusters: outcome.clusters.iter().map(ClusterReport::from).collect(),
        }
    }
}

/// Rename, falling back to copy + remove across filesystems.
fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    match std::fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(_) => {
            std::fs::copy(from, to)?;
            std::fs::remove_file(from)
        }
    }
}

/// Deduplicate `layout`'s text directory in place.
pub fn dedupe_dir(
    layout: &OutputLayout,
    params: DedupParams,
    progress: &dyn ProgressReporter,
) -> Result<DedupeReport> {
    let engine = Deduplicator::new(params.clone())?;
    let files = text_files(&layout.text_dir())?;
    progress.report(ProgressEvent::Deduplicating {
        documents: files.len() as u64,
    });
    info!(
        documents = files.len(),
        threshold = params.threshold,
        bands = engine.banding().bands,
        rows = engine.banding().rows,
        "deduplication started"
    );

    let mut session = engine.session();
    let mut paths: HashMap<String, PathBuf> = HashMap::with_capacity(files.len());
    for (id, path) in files {
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) => {
                warn!(file = %path.display(), error = %e, "unreadable text file skipped");
                continue;
            }
        };
        session.add(&ExtractedDocument::new(id.clone(), &path, text))?;
        paths.insert(id, path);
    }
    let total = session.len();

    let outcome = session.finish();
    for (id, reason) in &outcome.excluded {
        debug!(doc = %id, ?reason, "excluded from deduplication");
    }

    let removed_dir = layout.removed_dir();
    std::fs::create_dir_all(&removed_dir)
        .with_context(|| format!("Failed to create {}", removed_dir.display()))?;

    let mut moved = 0usize;
    for id in outcome.removed_ids() {
        let Some(src) = paths.get(id) else {
            continue;
        };
        let Some(name) = src.file_name() else {
            continue;
        };
        let dest = removed_dir.join(name);
        match move_file(src, &dest) {
            Ok(()) => moved += 1,
            Err(e) => warn!(doc = id, error = %e, "could not move duplicate"),
        }
    }

    let report = DedupeReport::new(&params, total, &outcome, moved);
    let json = serde_json::to_vec_pretty(&report)?;
    write_atomic_sync(&layout.report_path(), &json).context("Failed to write dedupe report")?;

    info!(
        clusters = report.clusters.len(),
        removed = report.removed,
        unique = report.unique,
        candidates = report.candidate_pairs,
        "deduplication finished"
    );
    Ok(report)
}
