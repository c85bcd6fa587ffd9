//! `manifest.json`: the per-query record of what a run asked for and got.
//!
//! Entries are keyed by query. Writing a query's entry replaces only that
//! entry, so repeated runs over different queries accumulate in one file.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use docharvest_core::models::{FetchRecord, FetchStatus, QueryStats};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::atomic::write_atomic_sync;
use crate::layout::OutputLayout;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureEntry {
    pub id: String,
    pub url: String,
    pub reason: String,
    pub attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryEntry {
    #[serde(flatten)]
    pub stats: QueryStats,
    #[serde(default)]
    pub failures: Vec<FailureEntry>,
    pub updated_at: DateTime<Utc>,
}

impl QueryEntry {
    pub fn from_records(stats: QueryStats, records: &[FetchRecord]) -> Self {
        let failures = records
            .iter()
            .filter_map(|r| match &r.status {
                FetchStatus::Failed { reason } => Some(FailureEntry {
                    id: r.item.id.clone(),
                    url: r.item.url.clone(),
                    reason: reason.clone(),
                    attempts: r.attempts,
                }),
                _ => None,
            })
            .collect();
        Self {
            stats,
            failures,
            updated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    pub queries: BTreeMap<String, QueryEntry>,
}

impl Manifest {
    /// Missing file means an empty manifest.
    pub fn load(layout: &OutputLayout) -> Result<Self> {
        let path = layout.manifest_path();
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn merge(&mut self, query: &str, entry: QueryEntry) {
        self.queries.insert(query.to_string(), entry);
    }

    pub fn get(&self, query: &str) -> Option<&QueryEntry> {
        self.queries.get(query)
    }

    pub fn save(&self, layout: &OutputLayout) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        write_atomic_sync(&layout.manifest_path(), &json).context("Failed to write manifest")
    }
}

/// Re-read the manifest from disk, replace `query`'s entry and write it back.
pub fn record_query(layout: &OutputLayout, query: &str, entry: QueryEntry) -> Result<()> {
    let mut manifest = Manifest::load(layout)?;
    manifest.merge(query, entry);
    manifest.save(layout)
}
