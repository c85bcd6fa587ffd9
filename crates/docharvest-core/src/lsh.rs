//! LSH banding over MinHash signatures.
//!
//! A signature of length `H` is cut into `b` bands of `r` rows (`b·r = H`).
//! Each band slice is hashed to a bucket key; two documents become
//! candidates when they share a bucket in at least one band. For a pair
//! with Jaccard similarity `s` the candidate probability is
//! `1 − (1 − s^r)^b`, an S-curve whose midpoint sits near `(1/b)^(1/r)`.
//!
//! [`BandingParams::for_threshold`] picks, among all exact factorizations
//! of `H`, the one whose midpoint `(1/b)^(1/r)` is closest to the
//! configured threshold from below, so pairs right at the threshold are
//! candidates with high probability and false positives are left to
//! confirmation. For `H = 512, θ = 0.95` this is `b = 16, r = 32`
//! (midpoint ≈ 0.917); for `H = 128` it is `b = 8, r = 16` (≈ 0.878).
//!
//! Candidate generation links every bucket member to the bucket's first
//! member only, so a bucket of `k` documents yields `k − 1` pairs.

use std::collections::{BTreeSet, HashMap};

use serde::Serialize;

use crate::error::DedupError;
use crate::minhash::{fnv1a64, MinHashSignature};

/// Band layout of a signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BandingParams {
    pub bands: usize,
    pub rows: usize,
}

impl BandingParams {
    pub fn new(bands: usize, rows: usize) -> Result<Self, DedupError> {
        if bands == 0 || rows == 0 {
            return Err(DedupError::InvalidParam(
                "bands and rows must be >= 1".to_string(),
            ));
        }
        Ok(Self { bands, rows })
    }

    /// Choose `(b, r)` with `b·r = num_perm` whose 50% point is the highest
    /// one not above `threshold`.
    ///
    /// When every layout's midpoint exceeds `threshold` (tiny `num_perm`),
    /// the lowest midpoint is used instead.
    pub fn for_threshold(num_perm: usize, threshold: f64) -> Result<Self, DedupError> {
        if num_perm == 0 {
            return Err(DedupError::InvalidParam("num_perm must be >= 1".to_string()));
        }
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(DedupError::InvalidParam(format!(
                "threshold must be in (0, 1], got {}",
                threshold
            )));
        }

        let mut below: Option<BandingParams> = None;
        let mut above: Option<BandingParams> = None;
        for rows in 1..=num_perm {
            if num_perm % rows != 0 {
                continue;
            }
            let params = BandingParams {
                bands: num_perm / rows,
                rows,
            };
            let mid = params.midpoint();
            if mid <= threshold {
                if below.map_or(true, |b| mid >= b.midpoint()) {
                    below = Some(params);
                }
            } else if above.map_or(true, |a| mid < a.midpoint()) {
                above = Some(params);
            }
        }
        below
            .or(above)
            .ok_or_else(|| DedupError::InvalidParam("no banding layout found".to_string()))
    }

    pub fn signature_len(&self) -> usize {
        self.bands * self.rows
    }

    /// Approximate similarity at which the candidate probability crosses 50%.
    pub fn midpoint(&self) -> f64 {
        (1.0 / self.bands as f64).powf(1.0 / self.rows as f64)
    }

    /// Probability that a pair with Jaccard similarity `s` becomes a candidate.
    pub fn candidate_probability(&self, s: f64) -> f64 {
        1.0 - (1.0 - s.powi(self.rows as i32)).powi(self.bands as i32)
    }
}

/// Banded bucket index keyed by document ordinal.
///
/// Transient: rebuilt once per deduplication run.
#[derive(Debug)]
pub struct LshIndex {
    params: BandingParams,
    buckets: Vec<HashMap<u64, Vec<usize>>>,
}

impl LshIndex {
    pub fn new(params: BandingParams) -> Self {
        Self {
            params,
            buckets: (0..params.bands).map(|_| HashMap::new()).collect(),
        }
    }

    pub fn params(&self) -> BandingParams {
        self.params
    }

    /// Record `ordinal` under each of its band buckets.
    pub fn insert(&mut self, ordinal: usize, signature: &MinHashSignature) -> Result<(), DedupError> {
        if signature.len() != self.params.signature_len() {
            return Err(DedupError::InvalidParam(format!(
                "signature length {} does not match banding {}x{}",
                signature.len(),
                self.params.bands,
                self.params.rows
            )));
        }
        for (band, slice) in signature.values.chunks(self.params.rows).enumerate() {
            self.buckets[band]
                .entry(hash_band(band, slice))
                .or_default()
                .push(ordinal);
        }
        Ok(())
    }

    /// Candidate pairs `(lo, hi)`: each bucket member paired with the
    /// bucket's first member.
    ///
    /// Work is linear in bucket size. Two members that are only related
    /// to each other, and not to the first member, are linked through a
    /// band they share without it, if any.
    pub fn candidate_pairs(&self) -> BTreeSet<(usize, usize)> {
        let mut pairs = BTreeSet::new();
        for band in &self.buckets {
            for members in band.values() {
                let Some((&head, rest)) = members.split_first() else {
                    continue;
                };
                for &other in rest {
                    if other != head {
                        pairs.insert((head.min(other), head.max(other)));
                    }
                }
            }
        }
        pairs
    }
}

fn hash_band(band: usize, slice: &[u64]) -> u64 {
    let mut bytes = Vec::with_capacity(8 + slice.len() * 8);
    bytes.extend_from_slice(&(band as u64).to_le_bytes());
    for v in slice {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    fnv1a64(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::minhash::MinHasher;
    use std::collections::HashSet;

    #[test]
    fn default_threshold_layout() {
        let p = BandingParams::for_threshold(512, 0.95).unwrap();
        assert_eq!(p, BandingParams { bands: 16, rows: 32 });
        assert!(p.midpoint() <= 0.95);
        assert!(p.candidate_probability(0.96) > 0.99);

        let p = BandingParams::for_threshold(128, 0.95).unwrap();
        assert_eq!(p, BandingParams { bands: 8, rows: 16 });
    }

    #[test]
    fn midpoint_never_exceeds_threshold_when_avoidable() {
        for &(h, t) in &[(128, 0.5), (128, 0.8), (256, 0.9), (512, 0.95), (512, 0.99)] {
            let p = BandingParams::for_threshold(h, t).unwrap();
            assert!(p.midpoint() <= t, "layout {:?} for H={} θ={}", p, h, t);
        }
        // H = 1 has a single layout with midpoint 1.0.
        assert_eq!(
            BandingParams::for_threshold(1, 0.5).unwrap(),
            BandingParams { bands: 1, rows: 1 }
        );
    }

    #[test]
    fn layouts_always_cover_the_signature() {
        for &(h, t) in &[(128, 0.5), (128, 0.8), (200, 0.9), (97, 0.7), (1, 0.5)] {
            let p = BandingParams::for_threshold(h, t).unwrap();
            assert_eq!(p.signature_len(), h, "layout for H={} θ={}", h, t);
        }
    }

    #[test]
    fn lower_threshold_means_shorter_bands() {
        let strict = BandingParams::for_threshold(128, 0.95).unwrap();
        let loose = BandingParams::for_threshold(128, 0.5).unwrap();
        assert!(loose.rows < strict.rows);
    }

    #[test]
    fn invalid_threshold_rejected() {
        assert!(BandingParams::for_threshold(128, 0.0).is_err());
        assert!(BandingParams::for_threshold(128, 1.5).is_err());
        assert!(BandingParams::for_threshold(128, f64::NAN).is_err());
        assert!(BandingParams::for_threshold(0, 0.9).is_err());
    }

    #[test]
    fn s_curve_is_monotonic() {
        let p = BandingParams::new(4, 32).unwrap();
        assert!(p.candidate_probability(0.5) < 0.01);
        assert!(p.candidate_probability(0.99) > 0.99);
        assert!(p.candidate_probability(0.9) < p.candidate_probability(0.95));
    }

    #[test]
    fn identical_signatures_collide_in_every_band() {
        let p = BandingParams::new(4, 4).unwrap();
        let sig = MinHashSignature {
            values: (0..16).collect(),
        };
        let mut index = LshIndex::new(p);
        index.insert(0, &sig).unwrap();
        index.insert(1, &sig).unwrap();
        let pairs = index.candidate_pairs();
        assert_eq!(pairs, BTreeSet::from([(0, 1)]));
    }

    #[test]
    fn one_shared_band_is_enough() {
        let p = BandingParams::new(2, 2).unwrap();
        let mut index = LshIndex::new(p);
        index.insert(0, &MinHashSignature { values: vec![1, 2, 3, 4] }).unwrap();
        index.insert(1, &MinHashSignature { values: vec![9, 9, 3, 4] }).unwrap();
        index.insert(2, &MinHashSignature { values: vec![9, 8, 7, 6] }).unwrap();
        assert_eq!(index.candidate_pairs(), BTreeSet::from([(0, 1)]));
    }

    #[test]
    fn same_slice_in_different_bands_does_not_collide() {
        let p = BandingParams::new(2, 2).unwrap();
        let mut index = LshIndex::new(p);
        index.insert(0, &MinHashSignature { values: vec![1, 2, 0, 0] }).unwrap();
        index.insert(1, &MinHashSignature { values: vec![5, 5, 1, 2] }).unwrap();
        assert!(index.candidate_pairs().is_empty());
    }

    #[test]
    fn identical_signatures_yield_linear_candidates() {
        let p = BandingParams::new(4, 32).unwrap();
        let sig = MinHashSignature {
            values: (0..128).collect(),
        };
        let mut index = LshIndex::new(p);
        for ordinal in 0..2000 {
            index.insert(ordinal, &sig).unwrap();
        }
        let pairs = index.candidate_pairs();
        assert_eq!(pairs.len(), 1999);
        assert!(pairs.iter().all(|&(lo, _)| lo == 0));
    }

    #[test]
    fn wrong_signature_length_rejected() {
        let mut index = LshIndex::new(BandingParams::new(4, 32).unwrap());
        let err = index
            .insert(0, &MinHashSignature { values: vec![0; 64] })
            .unwrap_err();
        assert!(matches!(err, DedupError::InvalidParam(_)));
    }

    /// Calibration: pairs with true Jaccard exactly θ become candidates at
    /// roughly the rate the S-curve predicts. Each trial uses a fresh hash
    /// family, so trials are independent.
    #[test]
    fn candidate_rate_at_threshold_matches_s_curve() {
        let theta = 0.95;
        let params = BandingParams::for_threshold(128, theta).unwrap();
        // |A ∩ B| = 190, |A ∪ B| = 200 → J = 0.95
        let a: HashSet<String> = (0..195).map(|i| format!("shingle {}", i)).collect();
        let b: HashSet<String> = (5..200).map(|i| format!("shingle {}", i)).collect();

        let trials = 400;
        let mut hits = 0;
        for seed in 0..trials {
            let hasher = MinHasher::new(128, seed as u64);
            let mut index = LshIndex::new(params);
            index.insert(0, &hasher.signature(&a).unwrap()).unwrap();
            index.insert(1, &hasher.signature(&b).unwrap()).unwrap();
            if !index.candidate_pairs().is_empty() {
                hits += 1;
            }
        }
        let observed = hits as f64 / trials as f64;
        let expected = params.candidate_probability(theta);
        assert!(
            (observed - expected).abs() < 0.12,
            "observed candidate rate {} vs predicted {}",
            observed,
            expected
        );
    }
}
