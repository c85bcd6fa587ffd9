//! `harvest status`: what a previous run left behind.

use anyhow::{bail, Result};
use std::io::Write;

use crate::fingerprints::is_complete;
use crate::layout::OutputLayout;
use crate::manifest::Manifest;
use crate::progress::format_number;

#[derive(Debug, Clone)]
pub struct StatusReport {
    pub manifest: Manifest,
    /// Entries in the fingerprint snapshot.
    pub fingerprints: usize,
    /// Snapshot entries whose file is still complete on disk.
    pub verified: usize,
    pub texts: usize,
    pub removed_duplicates: usize,
}

fn count_files(dir: &std::path::Path, ext: &str) -> usize {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter(|e| e.path().extension().and_then(|x| x.to_str()) == Some(ext))
                .count()
        })
        .unwrap_or(0)
}

pub fn collect_status(layout: &OutputLayout, min_bytes: u64) -> Result<StatusReport> {
    if !layout.root().is_dir() {
        bail!("output directory not found: {}", layout.root().display());
    }
    let manifest = Manifest::load(layout)?;

    let snapshot_path = layout.fingerprints_path();
    let (fingerprints, verified) = if snapshot_path.exists() {
        let raw = std::fs::read_to_string(&snapshot_path)?;
        let store: docharvest_core::fingerprint::FingerprintStore = serde_json::from_str(&raw)?;
        let verified = store
            .iter()
            .filter(|(_, path)| is_complete(path, min_bytes))
            .count();
        (store.len(), verified)
    } else {
        (0, 0)
    };

    Ok(StatusReport {
        manifest,
        fingerprints,
        verified,
        texts: count_files(&layout.text_dir(), "txt"),
        removed_duplicates: count_files(&layout.removed_dir(), "txt"),
    })
}

impl StatusReport {
    pub fn print(&self, out: &mut dyn Write) -> std::io::Result<()> {
        if self.manifest.queries.is_empty() {
            writeln!(out, "No queries recorded.")?;
        }
        for (query, entry) in &self.manifest.queries {
            writeln!(
                out,
                "{:<28} requested={} dl={} skip={} fail={}  ({})",
                query,
                entry.stats.requested,
                entry.stats.downloaded,
                entry.stats.skipped,
                entry.stats.failed,
                entry.updated_at.format("%Y-%m-%d %H:%M:%S UTC")
            )?;
            for f in &entry.failures {
                writeln!(out, "    failed {} after {} attempt(s): {}", f.id, f.attempts, f.reason)?;
            }
        }
        writeln!(out)?;
        writeln!(
            out,
            "fingerprints: {} ({} verified on disk)",
            format_number(self.fingerprints as u64),
            format_number(self.verified as u64)
        )?;
        writeln!(out, "texts:        {}", format_number(self.texts as u64))?;
        writeln!(
            out,
            "duplicates:   {}",
            format_number(self.removed_duplicates as u64)
        )?;
        Ok(())
    }
}
