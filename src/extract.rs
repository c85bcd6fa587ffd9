//! Text extraction from downloaded documents.
//!
//! Every file under `pdfs/` matching the include globs gets a sibling
//! `texts/<stem>.txt`. Existing non-empty text files are reused, so an
//! interrupted extraction resumes where it stopped. A file that cannot be
//! read is counted and skipped; it stays in `pdfs/`.

use anyhow::{Context, Result};
use docharvest_core::error::ExtractError;
use docharvest_core::models::ExtractedDocument;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::atomic::{is_part_file, write_atomic_sync};
use crate::progress::{ProgressEvent, ProgressReporter};

const PROGRESS_EVERY: u64 = 100;

/// Turns one document file into plain text.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, path: &Path) -> Result<ExtractedDocument, ExtractError>;
}

/// [`TextExtractor`] backed by `pdf-extract`.
pub struct PdfExtractor;

impl TextExtractor for PdfExtractor {
    fn extract(&self, path: &Path) -> Result<ExtractedDocument, ExtractError> {
        let bytes = std::fs::read(path)?;
        if !bytes.starts_with(b"%PDF") {
            return Err(ExtractError::Unsupported("missing %PDF header".to_string()));
        }
        // pdf-extract panics on some malformed inputs.
        let text = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(&bytes))
            .map_err(|_| ExtractError::Corrupt("parser panicked".to_string()))?
            .map_err(|e| ExtractError::Corrupt(e.to_string()))?;
        if text.trim().is_empty() {
            return Err(ExtractError::Empty);
        }
        Ok(ExtractedDocument::new(stem(path), path, text))
    }
}

fn stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = GlobBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .with_context(|| format!("Invalid include glob: {}", pattern))?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    pub ok: u64,
    pub failed: u64,
    pub reused: u64,
    /// `(file name, reason)` of every failure.
    pub failures: Vec<(String, String)>,
}

impl ExtractSummary {
    pub fn total(&self) -> u64 {
        self.ok + self.failed + self.reused
    }
}

/// Source files under `pdf_dir` matching `include_globs`, sorted.
pub fn discover(pdf_dir: &Path, include_globs: &[String]) -> Result<Vec<PathBuf>> {
    let include = build_globset(include_globs)?;
    let mut files = Vec::new();
    if !pdf_dir.is_dir() {
        return Ok(files);
    }
    for entry in WalkDir::new(pdf_dir).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() || is_part_file(entry.path()) {
            continue;
        }
        let rel = entry.path().strip_prefix(pdf_dir).unwrap_or(entry.path());
        if include.is_match(rel) {
            files.push(entry.path().to_path_buf());
        }
    }
    Ok(files)
}

/// Extract every matching file in `pdf_dir` into `txt_dir`.
pub fn extract_all(
    extractor: &dyn TextExtractor,
    pdf_dir: &Path,
    txt_dir: &Path,
    include_globs: &[String],
    progress: &dyn ProgressReporter,
) -> Result<ExtractSummary> {
    std::fs::create_dir_all(txt_dir)
        .with_context(|| format!("Failed to create {}", txt_dir.display()))?;
    let files = discover(pdf_dir, include_globs)?;
    let total = files.len() as u64;
    info!(files = total, "extraction started");

    let mut summary = ExtractSummary::default();
    for (n, file) in files.iter().enumerate() {
        let out = txt_dir.join(format!("{}.txt", stem(file)));
        let existing = std::fs::read_to_string(&out).unwrap_or_default();
        if !existing.trim().is_empty() {
            summary.reused += 1;
        } else {
            match extractor.extract(file) {
                Ok(doc) => {
                    write_atomic_sync(&out, doc.text.as_bytes())?;
                    debug!(file = %file.display(), bytes = doc.byte_len, "extracted");
                    summary.ok += 1;
                }
                Err(e) => {
                    let name = file
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    warn!(file = %name, error = %e, "extraction failed");
                    summary.failures.push((name, e.to_string()));
                    summary.failed += 1;
                }
            }
        }

        let done = n as u64 + 1;
        if done % PROGRESS_EVERY == 0 || done == total {
            progress.report(ProgressEvent::Extracting { done, total });
        }
    }

    info!(
        ok = summary.ok,
        reused = summary.reused,
        failed = summary.failed,
        "extraction finished"
    );
    Ok(summary)
}
