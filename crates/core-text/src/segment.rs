//! Boundary index shared by every offset conversion on a snapshot.
//!
//! Contract:
//! - Input: the snapshot text (any UTF-8 `&str`).
//! - Output: one `ScalarMark` per Unicode scalar boundary (including the end
//!   of text) recording the UTF-8 byte and UTF-16 code-unit position, plus the
//!   list of scalar indices that start a grapheme cluster (extended clusters,
//!   the same segmentation `unicode-segmentation` uses with `is_extended = true`).
//! - Guarantees: both tables are strictly increasing, start at zero and end at
//!   the text length, so every lookup is a binary search.
//! - Safety: never logs content; callers only log lengths.

use unicode_segmentation::UnicodeSegmentation;

/// Position of one scalar boundary in the other two code-unit spaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScalarMark {
    pub byte: usize,
    pub utf16: usize,
}

/// Precomputed scalar / UTF-16 / grapheme boundary tables for one text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundaryIndex {
    /// `scalars[i]` is the boundary before scalar `i`; the last entry is end of text.
    scalars: Vec<ScalarMark>,
    /// Scalar index of every grapheme boundary (first is 0, last is the scalar count).
    clusters: Vec<usize>,
}

impl BoundaryIndex {
    pub fn build(text: &str) -> Self {
        let mut scalars = Vec::with_capacity(text.len() + 1);
        let mut utf16 = 0usize;
        for (byte, ch) in text.char_indices() {
            scalars.push(ScalarMark { byte, utf16 });
            utf16 += ch.len_utf16();
        }
        scalars.push(ScalarMark {
            byte: text.len(),
            utf16,
        });

        let mut clusters = Vec::new();
        let mut scalar = 0usize;
        for g in text.graphemes(true) {
            clusters.push(scalar);
            scalar += g.chars().count();
        }
        clusters.push(scalar);

        Self { scalars, clusters }
    }

    pub fn scalar_len(&self) -> usize {
        self.scalars.len() - 1
    }

    pub fn utf16_len(&self) -> usize {
        self.scalars.last().map(|m| m.utf16).unwrap_or(0)
    }

    pub fn grapheme_len(&self) -> usize {
        self.clusters.len() - 1
    }

    pub fn byte_len(&self) -> usize {
        self.scalars.last().map(|m| m.byte).unwrap_or(0)
    }

    /// Marks for scalar boundary `scalar` (None when past the end).
    pub fn mark(&self, scalar: usize) -> Option<ScalarMark> {
        self.scalars.get(scalar).copied()
    }

    /// Scalar index whose boundary sits at `utf16`, or None when `utf16` splits a surrogate pair.
    pub fn scalar_at_utf16(&self, utf16: usize) -> Option<usize> {
        self.scalars.binary_search_by_key(&utf16, |m| m.utf16).ok()
    }

    /// Scalar index whose boundary sits at `byte`, or None when `byte` is inside a scalar.
    pub fn scalar_at_byte(&self, byte: usize) -> Option<usize> {
        self.scalars.binary_search_by_key(&byte, |m| m.byte).ok()
    }

    /// Scalar index starting grapheme `cluster`.
    pub fn scalar_at_cluster(&self, cluster: usize) -> Option<usize> {
        self.clusters.get(cluster).copied()
    }

    /// Grapheme index starting at `scalar`, or None when `scalar` is inside a cluster.
    pub fn cluster_at_scalar(&self, scalar: usize) -> Option<usize> {
        self.clusters.binary_search(&scalar).ok()
    }

    /// True when `scalar` is a grapheme boundary.
    pub fn is_cluster_boundary(&self, scalar: usize) -> bool {
        self.clusters.binary_search(&scalar).is_ok()
    }

    /// Largest grapheme boundary `<= scalar`.
    pub fn cluster_floor(&self, scalar: usize) -> usize {
        match self.clusters.binary_search(&scalar) {
            Ok(i) => self.clusters[i],
            Err(0) => 0,
            Err(i) => self.clusters[i - 1],
        }
    }
}
