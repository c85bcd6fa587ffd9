//! # docharvest
//!
//! Resumable bulk acquisition of documents from a paginated search service,
//! followed by text extraction and near-duplicate removal.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌────────────────┐   ┌───────────┐   ┌─────────────┐
//! │  Search  │──▶│ Download pool  │──▶│  Extract  │──▶│   Dedupe    │
//! │ (paged)  │   │ retry + resume │   │ pdf → txt │   │ MinHash+LSH │
//! └──────────┘   └───────┬────────┘   └───────────┘   └─────────────┘
//!                        │
//!              fingerprints.json + manifest.json
//! ```
//!
//! The algorithms (shingling, MinHash, LSH banding, clustering) and the
//! collaborator traits live in the I/O-free `docharvest-core` crate. This
//! crate provides the HTTP, filesystem and CLI layers.
//!
//! ## Quick Start
//!
//! ```bash
//! harvest run passport "birth certificate" -o out/
//! harvest status -o out/
//! harvest dedupe -o out/ --dedupe-threshold 0.9
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`search`] | HTTP search source and paging walk |
//! | [`fetch`] | HTTP fetcher, retry policy, worker pool |
//! | [`download`] | Skip/resume logic and outcome aggregation |
//! | [`fingerprints`] | Fingerprint snapshot load/verify/save |
//! | [`manifest`] | Per-query run manifest |
//! | [`extract`] | PDF text extraction |
//! | [`dedupe`] | Near-duplicate removal over `texts/` |
//! | [`pipeline`] | The end-to-end `run` command |
//! | [`progress`] | Progress reporting on stderr |

pub mod atomic;
pub mod config;
pub mod dedupe;
pub mod download;
pub mod extract;
pub mod fetch;
pub mod fingerprints;
pub mod layout;
pub mod logging;
pub mod manifest;
pub mod pipeline;
pub mod progress;
pub mod search;
pub mod status;
