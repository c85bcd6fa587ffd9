//! MinHash signatures for Jaccard similarity estimation.
//!
//! Each shingle is hashed once with 64-bit FNV-1a, then pushed through
//! `num_perm` universal hash functions `h_i(x) = (a_i·x + b_i) mod p` with
//! `p = 2^61 − 1`. The signature keeps the minimum of every function over
//! the shingle set. The coefficients are derived from a seed with an LCG,
//! so two [`MinHasher`]s built from the same `(num_perm, seed)` produce
//! comparable signatures and identical input always yields an identical
//! signature.

use std::collections::HashSet;

/// Mersenne prime 2^61 − 1.
const MERSENNE_61: u64 = (1 << 61) - 1;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Stable 64-bit FNV-1a. `std`'s `DefaultHasher` makes no stability promise.
pub(crate) fn fnv1a64(bytes: &[u8]) -> u64 {
    let mut state = FNV_OFFSET;
    for &b in bytes {
        state ^= b as u64;
        state = state.wrapping_mul(FNV_PRIME);
    }
    state
}

fn lcg_next(state: &mut u64) -> u64 {
    *state = state
        .wrapping_mul(6364136223846793005)
        .wrapping_add(1442695040888963407);
    *state
}

/// MinHash signature generator.
#[derive(Debug, Clone)]
pub struct MinHasher {
    /// `(a, b)` per hash function; `a` in `[1, p)`, `b` in `[0, p)`.
    coefficients: Vec<(u64, u64)>,
}

impl MinHasher {
    pub fn new(num_perm: usize, seed: u64) -> Self {
        let mut state = seed;
        let coefficients = (0..num_perm)
            .map(|_| {
                let a = (lcg_next(&mut state) >> 3) % (MERSENNE_61 - 1) + 1;
                let b = (lcg_next(&mut state) >> 3) % MERSENNE_61;
                (a, b)
            })
            .collect();
        Self { coefficients }
    }

    /// Signature length.
    pub fn num_perm(&self) -> usize {
        self.coefficients.len()
    }

    /// Signature of a shingle set, or `None` when the set is empty.
    pub fn signature(&self, shingles: &HashSet<String>) -> Option<MinHashSignature> {
        if shingles.is_empty() {
            return None;
        }
        let mut mins = vec![u64::MAX; self.coefficients.len()];
        for shingle in shingles {
            let x = fnv1a64(shingle.as_bytes()) % MERSENNE_61;
            for (min, &(a, b)) in mins.iter_mut().zip(&self.coefficients) {
                let h = ((a as u128 * x as u128 + b as u128) % MERSENNE_61 as u128) as u64;
                if h < *min {
                    *min = h;
                }
            }
        }
        Some(MinHashSignature { values: mins })
    }
}

/// Fixed-length MinHash signature of one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinHashSignature {
    pub values: Vec<u64>,
}

impl MinHashSignature {
    /// Estimated Jaccard similarity: the fraction of positions that agree.
    ///
    /// Signatures of different lengths are not comparable and score `0.0`.
    pub fn jaccard(&self, other: &Self) -> f64 {
        if self.values.len() != other.values.len() || self.values.is_empty() {
            return 0.0;
        }
        let matches = self
            .values
            .iter()
            .zip(&other.values)
            .filter(|(a, b)| a == b)
            .count();
        matches as f64 / self.values.len() as f64
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
