//! Text normalization and word shingling.
//!
//! Normalization lower-cases the text and collapses every run of
//! whitespace, so layout differences between two extractions of the same
//! document do not produce different shingles.
//!
//! A shingle is `k` consecutive tokens joined by a single space. A text
//! with fewer than `k` tokens (but at least one) yields a single shingle
//! made of all its tokens; an empty text yields no shingles.
//!
//! # Example
//!
//! ```rust
//! use docharvest_core::shingle::shingles;
//!
//! let set = shingles("The quick  brown\nFox", 3);
//! assert!(set.contains("the quick brown"));
//! assert!(set.contains("quick brown fox"));
//! assert_eq!(set.len(), 2);
//! ```

use std::collections::HashSet;

/// Lower-case and whitespace-collapse `text`.
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// The set of `k`-token shingles of the normalized `text`.
///
/// `k` of zero is treated as one.
pub fn shingles(text: &str, k: usize) -> HashSet<String> {
    let k = k.max(1);
    let normalized = normalize(text);
    let tokens: Vec<&str> = normalized.split(' ').filter(|t| !t.is_empty()).collect();

    if tokens.is_empty() {
        return HashSet::new();
    }
    if tokens.len() < k {
        return HashSet::from([tokens.join(" ")]);
    }

    tokens.windows(k).map(|w| w.join(" ")).collect()
}
