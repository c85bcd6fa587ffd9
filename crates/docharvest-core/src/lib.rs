//! # docharvest core
//!
//! Shared, I/O-free logic for docharvest: the data model, error taxonomy,
//! collaborator traits for search and fetch, the resume fingerprint store,
//! and the MinHash/LSH near-duplicate engine.
//!
//! This crate contains no tokio, HTTP client, or filesystem access. The
//! `docharvest` app crate supplies those and drives the pipeline.

pub mod cluster;
pub mod dedup;
pub mod error;
pub mod fingerprint;
pub mod lsh;
pub mod minhash;
pub mod models;
pub mod shingle;
pub mod source;
