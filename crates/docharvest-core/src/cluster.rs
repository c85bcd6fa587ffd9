//! Candidate confirmation and duplicate clustering.
//!
//! Candidate pairs from the [`LshIndex`](crate::lsh::LshIndex) are
//! confirmed by comparing full signatures; confirmed edges are merged with
//! an array-backed union-find indexed by document ordinal. A pair whose
//! endpoints are already in the same set is not re-tested, so membership
//! is transitive without comparing every pair inside a cluster.
//!
//! The canonical survivor of a cluster is its lowest ordinal, i.e. the
//! document seen first.

use std::collections::{BTreeMap, BTreeSet};

use crate::minhash::MinHashSignature;

/// Disjoint-set forest with path halving and union by rank.
#[derive(Debug, Clone)]
pub struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    pub fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
            rank: vec![0; len],
        }
    }

    pub fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    /// Merge the sets of `a` and `b`. Returns `false` if they were already joined.
    pub fn union(&mut self, a: usize, b: usize) -> bool {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return false;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
        true
    }

    pub fn connected(&mut self, a: usize, b: usize) -> bool {
        self.find(a) == self.find(b)
    }
}

/// A group of near-duplicate documents, by ordinal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrdinalCluster {
    /// Lowest ordinal in the cluster; kept in place.
    pub canonical: usize,
    /// All members in ascending order, canonical included.
    pub members: Vec<usize>,
}

impl OrdinalCluster {
    /// Members other than the canonical survivor.
    pub fn duplicates(&self) -> impl Iterator<Item = usize> + '_ {
        self.members
            .iter()
            .copied()
            .filter(move |&m| m != self.canonical)
    }
}

/// Confirmation statistics for one resolution pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveStats {
    pub candidates: usize,
    pub compared: usize,
    pub confirmed: usize,
}

/// Confirm `candidates` against `threshold` and group the survivors.
///
/// `signatures[i]` is the signature of ordinal `i`. Only clusters with at
/// least two members are returned, ordered by canonical ordinal.
pub fn resolve_clusters(
    signatures: &[&MinHashSignature],
    candidates: &BTreeSet<(usize, usize)>,
    threshold: f64,
) -> (Vec<OrdinalCluster>, ResolveStats) {
    let mut uf = UnionFind::new(signatures.len());
    let mut stats = ResolveStats {
        candidates: candidates.len(),
        ..Default::default()
    };

    for &(a, b) in candidates {
        if uf.connected(a, b) {
            continue;
        }
        stats.compared += 1;
        if signatures[a].jaccard(signatures[b]) >= threshold {
            stats.confirmed += 1;
            uf.union(a, b);
        }
    }

    let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for ordinal in 0..signatures.len() {
        let root = uf.find(ordinal);
        groups.entry(root).or_default().push(ordinal);
    }

    let mut clusters: Vec<OrdinalCluster> = groups
        .into_values()
        .filter(|members| members.len() > 1)
        .map(|members| OrdinalCluster {
            canonical: members[0],
            members,
        })
        .collect();
    clusters.sort_by_key(|c| c.canonical);

    (clusters, stats)
}
