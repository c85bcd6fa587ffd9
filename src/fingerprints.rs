//! Persistence of the [`FingerprintStore`] between runs.
//!
//! The snapshot is advisory: on load, every entry is checked against the
//! file it points to, and files already present in `pdfs/` are adopted even
//! if the snapshot never heard of them. What is on disk wins.

use anyhow::{Context, Result};
use docharvest_core::fingerprint::FingerprintStore;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::atomic::{is_part_file, write_atomic_sync};
use crate::layout::OutputLayout;

/// A download counts as present when it exists and is larger than `min_bytes`.
pub fn is_complete(path: &Path, min_bytes: u64) -> bool {
    if is_part_file(path) {
        return false;
    }
    match std::fs::metadata(path) {
        Ok(meta) => meta.is_file() && meta.len() > min_bytes,
        Err(_) => false,
    }
}

/// Load the snapshot, reconcile it with `pdfs/`, and delete stray `.part` files.
pub fn load_verified(layout: &OutputLayout, min_bytes: u64) -> Result<FingerprintStore> {
    let snapshot_path = layout.fingerprints_path();
    let mut store = if snapshot_path.exists() {
        let raw = std::fs::read_to_string(&snapshot_path)
            .with_context(|| format!("Failed to read {}", snapshot_path.display()))?;
        match serde_json::from_str::<FingerprintStore>(&raw) {
            Ok(store) => store,
            Err(e) => {
                warn!(path = %snapshot_path.display(), error = %e, "fingerprint snapshot unreadable, rebuilding from disk");
                FingerprintStore::new()
            }
        }
    } else {
        FingerprintStore::new()
    };

    let before = store.len();
    store.retain(|id, path| {
        let ok = is_complete(path, min_bytes);
        if !ok {
            debug!(item_id = id, "dropping fingerprint, file missing or incomplete");
        }
        ok
    });
    let dropped = before - store.len();

    let mut adopted = 0usize;
    let pdf_dir = layout.pdf_dir();
    if pdf_dir.is_dir() {
        let mut entries: Vec<_> = std::fs::read_dir(&pdf_dir)
            .with_context(|| format!("Failed to list {}", pdf_dir.display()))?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .collect();
        entries.sort();

        for path in entries {
            if is_part_file(&path) {
                match std::fs::remove_file(&path) {
                    Ok(()) => debug!(path = %path.display(), "removed stale partial download"),
                    Err(e) => warn!(path = %path.display(), error = %e, "could not remove partial download"),
                }
                continue;
            }
            let Some(id) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !store.contains(id) && is_complete(&path, min_bytes) && store.insert(id, &path) {
                adopted += 1;
            }
        }
    }

    info!(
        entries = store.len(),
        dropped, adopted, "fingerprint store loaded"
    );
    Ok(store)
}

pub fn save(layout: &OutputLayout, store: &FingerprintStore) -> Result<()> {
    let json = serde_json::to_vec_pretty(store)?;
    write_atomic_sync(&layout.fingerprints_path(), &json)
        .context("Failed to save fingerprint store")
}
