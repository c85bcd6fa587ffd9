//! Near-duplicate detection over a collection of extracted documents.
//!
//! # Algorithm
//!
//! 1. Shingle every document (see [`shingle`](crate::shingle)). Documents
//!    with fewer than `min_chars` trimmed characters, or with no shingles,
//!    are excluded and never clustered.
//! 2. Compute one MinHash signature per remaining document.
//! 3. Insert signatures into an [`LshIndex`] whose banding is derived from
//!    the threshold.
//! 4. Confirm candidate pairs by estimated Jaccard ≥ threshold and merge
//!    them with union-find.
//! 5. Within each cluster the first document (input order) survives.
//!
//! Documents can be fed one at a time through a [`DedupSession`]; only
//! signatures are retained, so the caller may drop each text once it has
//! been added. The engine is pure: moving files is left to the caller.

use serde::Serialize;

use crate::cluster::{resolve_clusters, ResolveStats};
use crate::error::DedupError;
use crate::lsh::{BandingParams, LshIndex};
use crate::minhash::{MinHashSignature, MinHasher};
use crate::models::ExtractedDocument;
use crate::shingle::shingles;

/// Tuning for a deduplication run.
#[derive(Debug, Clone, PartialEq)]
pub struct DedupParams {
    /// Minimum estimated Jaccard similarity for a confirmed duplicate.
    pub threshold: f64,
    /// Signature length.
    pub num_perm: usize,
    /// Tokens per shingle.
    pub shingle_size: usize,
    /// Seed of the hash family; fixed for a run.
    pub seed: u64,
    /// Documents with fewer trimmed characters are excluded.
    pub min_chars: usize,
}

impl Default for DedupParams {
    fn default() -> Self {
        Self {
            threshold: 0.95,
            num_perm: 512,
            shingle_size: 3,
            seed: 1,
            min_chars: 80,
        }
    }
}

impl DedupParams {
    pub fn validate(&self) -> Result<(), DedupError> {
        if !(self.threshold > 0.0 && self.threshold <= 1.0) {
            return Err(DedupError::InvalidParam(format!(
                "dedupe threshold must be in (0, 1], got {}",
                self.threshold
            )));
        }
        if self.num_perm == 0 {
            return Err(DedupError::InvalidParam("num_perm must be > 0".to_string()));
        }
        if self.shingle_size == 0 {
            return Err(DedupError::InvalidParam(
                "shingle_size must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// A confirmed group of near-duplicates, by document id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateCluster {
    pub canonical: String,
    pub members: Vec<String>,
}

impl DuplicateCluster {
    /// Members to relocate: everything except the canonical survivor.
    pub fn removed(&self) -> impl Iterator<Item = &str> {
        self.members
            .iter()
            .map(String::as_str)
            .filter(move |m| *m != self.canonical)
    }

    pub fn size(&self) -> usize {
        self.members.len()
    }
}

/// Why a document took no part in clustering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionReason {
    TooShort,
    NoShingles,
}

/// Result of [`Deduplicator::run`].
#[derive(Debug, Clone)]
pub struct DedupOutcome {
    pub banding: BandingParams,
    /// Documents that received a signature.
    pub considered: usize,
    pub excluded: Vec<(String, ExclusionReason)>,
    pub clusters: Vec<DuplicateCluster>,
    pub stats: ResolveStats,
}

impl DedupOutcome {
    pub fn removed_count(&self) -> usize {
        self.clusters.iter().map(|c| c.size() - 1).sum()
    }

    /// Ids of every relocated duplicate, in cluster order.
    pub fn removed_ids(&self) -> Vec<&str> {
        self.clusters.iter().flat_map(|c| c.removed()).collect()
    }
}

/// MinHash + LSH near-duplicate engine for a single run.
#[derive(Debug, Clone)]
pub struct Deduplicator {
    params: DedupParams,
    hasher: MinHasher,
    banding: BandingParams,
}

impl Deduplicator {
    pub fn new(params: DedupParams) -> Result<Self, DedupError> {
        params.validate()?;
        let banding = BandingParams::for_threshold(params.num_perm, params.threshold)?;
        let hasher = MinHasher::new(params.num_perm, params.seed);
        Ok(Self {
            params,
            hasher,
            banding,
        })
    }

    pub fn params(&self) -> &DedupParams {
        &self.params
    }

    pub fn banding(&self) -> BandingParams {
        self.banding
    }

    /// Signature of one document, or the reason it is excluded.
    pub fn signature(&self, doc: &ExtractedDocument) -> Result<MinHashSignature, ExclusionReason> {
        if doc.text.trim().chars().count() < self.params.min_chars {
            return Err(ExclusionReason::TooShort);
        }
        let set = shingles(&doc.text, self.params.shingle_size);
        self.hasher
            .signature(&set)
            .ok_or(ExclusionReason::NoShingles)
    }

    /// Start an incremental run.
    pub fn session(&self) -> DedupSession<'_> {
        DedupSession {
            engine: self,
            ids: Vec::new(),
            signatures: Vec::new(),
            excluded: Vec::new(),
            index: LshIndex::new(self.banding),
        }
    }

    /// Cluster `docs`; input order is the first-seen order.
    pub fn run(&self, docs: &[ExtractedDocument]) -> Result<DedupOutcome, DedupError> {
        let mut session = self.session();
        for doc in docs {
            session.add(doc)?;
        }
        Ok(session.finish())
    }
}

/// A run in progress: documents added so far, as signatures.
///
/// The order of [`add`](Self::add) calls is the first-seen order.
#[derive(Debug)]
pub struct DedupSession<'a> {
    engine: &'a Deduplicator,
    ids: Vec<String>,
    signatures: Vec<MinHashSignature>,
    excluded: Vec<(String, ExclusionReason)>,
    index: LshIndex,
}

impl DedupSession<'_> {
    /// Sign `doc` and index it. The document itself is not retained.
    pub fn add(&mut self, doc: &ExtractedDocument) -> Result<(), DedupError> {
        match self.engine.signature(doc) {
            Ok(sig) => {
                self.index.insert(self.ids.len(), &sig)?;
                self.ids.push(doc.id.clone());
                self.signatures.push(sig);
            }
            Err(reason) => self.excluded.push((doc.id.clone(), reason)),
        }
        Ok(())
    }

    /// Number of documents added, signed or excluded.
    pub fn len(&self) -> usize {
        self.ids.len() + self.excluded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Confirm candidates and build the clusters.
    pub fn finish(self) -> DedupOutcome {
        let signatures: Vec<&MinHashSignature> = self.signatures.iter().collect();
        let (ordinal_clusters, stats) = resolve_clusters(
            &signatures,
            &self.index.candidate_pairs(),
            self.engine.params.threshold,
        );

        let clusters = ordinal_clusters
            .into_iter()
            .map(|c| DuplicateCluster {
                canonical: self.ids[c.canonical].clone(),
                members: c.members.iter().map(|&m| self.ids[m].clone()).collect(),
            })
            .collect();

        DedupOutcome {
            banding: self.engine.banding,
            considered: self.ids.len(),
            excluded: self.excluded,
            clusters,
            stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str, text: String) -> ExtractedDocument {
        ExtractedDocument::new(id, format!("/texts/{}.txt", id), text)
    }

    fn words(range: std::ops::Range<usize>) -> Vec<String> {
        range.map(|i| format!("w{}", i)).collect()
    }

    #[test]
    fn invalid_params_rejected() {
        let bad = DedupParams {
            threshold: 1.2,
            ..Default::default()
        };
        assert!(Deduplicator::new(bad).is_err());
        let bad = DedupParams {
            shingle_size: 0,
            ..Default::default()
        };
        assert!(Deduplicator::new(bad).is_err());
    }

    #[test]
    fn exact_copies_cluster_and_first_survives() {
        let text = words(0..200).join(" ");
        let docs = vec![
            doc("b-first", text.clone()),
            doc("other", words(500..700).join(" ")),
            doc("a-second", text.to_uppercase()),
        ];
        let outcome = Deduplicator::new(DedupParams::default()).unwrap().run(&docs).unwrap();
        assert_eq!(outcome.clusters.len(), 1);
        assert_eq!(outcome.clusters[0].canonical, "b-first");
        assert_eq!(outcome.removed_ids(), vec!["a-second"]);
        assert_eq!(outcome.removed_count(), 1);
    }

    #[test]
    fn empty_and_short_documents_are_excluded() {
        let docs = vec![
            doc("empty", String::new()),
            doc("blank", "   \n\t  ".to_string()),
            doc("short", "tiny text".to_string()),
            doc("real", words(0..100).join(" ")),
        ];
        let outcome = Deduplicator::new(DedupParams::default()).unwrap().run(&docs).unwrap();
        assert_eq!(outcome.considered, 1);
        assert_eq!(outcome.excluded.len(), 3);
        assert!(outcome.clusters.is_empty());
    }

    #[test]
    fn zero_shingles_with_no_length_floor() {
        let params = DedupParams {
            min_chars: 0,
            ..Default::default()
        };
        let docs = vec![doc("empty", String::new()), doc("empty2", String::new())];
        let outcome = Deduplicator::new(params).unwrap().run(&docs).unwrap();
        assert_eq!(outcome.considered, 0);
        assert_eq!(
            outcome.excluded,
            vec![
                ("empty".to_string(), ExclusionReason::NoShingles),
                ("empty2".to_string(), ExclusionReason::NoShingles)
            ]
        );
        assert!(outcome.clusters.is_empty());
    }

    #[test]
    fn session_matches_batch_run() {
        let engine = Deduplicator::new(DedupParams::default()).unwrap();
        let docs = vec![
            doc("a", words(0..200).join(" ")),
            doc("short", "tiny".to_string()),
            doc("b", words(0..200).join("\n")),
            doc("c", words(900..1100).join(" ")),
        ];

        let mut session = engine.session();
        for d in &docs {
            session.add(d).unwrap();
        }
        assert_eq!(session.len(), 4);
        let streamed = session.finish();
        let batch = engine.run(&docs).unwrap();

        assert_eq!(streamed.clusters, batch.clusters);
        assert_eq!(streamed.excluded, batch.excluded);
        assert_eq!(streamed.considered, 3);
        assert_eq!(streamed.removed_ids(), vec!["b"]);
    }

    #[test]
    fn signatures_are_deterministic_within_a_run() {
        let engine = Deduplicator::new(DedupParams::default()).unwrap();
        let d = doc("x", words(0..300).join("  \n"));
        assert_eq!(engine.signature(&d).unwrap(), engine.signature(&d).unwrap());
    }
}
