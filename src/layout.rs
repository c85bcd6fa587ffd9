//! On-disk layout of an output directory.
//!
//! ```text
//! <root>/
//!   pdfs/                       downloaded files, one per item id
//!   texts/                      extracted text, <stem>.txt
//!   texts/removed_duplicates/   near-duplicates moved aside
//!   texts/dedupe_report.json
//!   fingerprints.json           id -> path of every verified download
//!   manifest.json               per-query outcome
//! ```

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

pub const REMOVED_DIR: &str = "removed_duplicates";

#[derive(Debug, Clone)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn pdf_dir(&self) -> PathBuf {
        self.root.join("pdfs")
    }

    pub fn text_dir(&self) -> PathBuf {
        self.root.join("texts")
    }

    pub fn removed_dir(&self) -> PathBuf {
        self.text_dir().join(REMOVED_DIR)
    }

    pub fn fingerprints_path(&self) -> PathBuf {
        self.root.join("fingerprints.json")
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join("manifest.json")
    }

    pub fn report_path(&self) -> PathBuf {
        self.text_dir().join("dedupe_report.json")
    }

    /// Destination of a downloaded item.
    pub fn pdf_path(&self, id: &str) -> PathBuf {
        self.pdf_dir().join(id)
    }

    /// Create every directory the pipeline writes into.
    pub fn ensure(&self) -> Result<()> {
        for dir in [self.pdf_dir(), self.text_dir(), self.removed_dir()] {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
        }
        Ok(())
    }
}

/// Output root used when none is configured.
///
/// One query gives `<query>_results` with spaces replaced by `_`; several
/// share `multi_results`; a text-only run uses `scraped_output`.
pub fn default_output_dir(queries: &[String]) -> PathBuf {
    match queries {
        [] => PathBuf::from("scraped_output"),
        [query] => PathBuf::from(format!("{}_results", query.trim().replace(' ', "_"))),
        _ => PathBuf::from("multi_results"),
    }
}
