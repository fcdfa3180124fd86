//! Read-orientation prediction against a locus graph.
//!
//! Before alignment, a read of unknown strand is classified as "as
//! sequenced" or "needs reverse-complementing" by scanning disjoint,
//! non-overlapping k-mers against a forward index and a
//! reverse-complement index built from the same graph. Whichever index
//! collects the majority of matches wins; a read with too few matches in
//! either direction is rejected as unalignable noise before the
//! expensive seed-and-extend pass ever runs.
use super::{reverse_complement, Graph};
use crate::graph::kmer_index::KmerIndex;

pub const ORIENTATION_KMER_LEN: usize = 10;
pub const MIN_KMER_MATCHES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    AsSequenced,
    ReverseComplement,
}

/// Holds the forward and reverse-complement k-mer indexes for one locus
/// graph, built once and reused across every read at that locus.
pub struct OrientationPredictor {
    forward: KmerIndex,
    reverse: KmerIndex,
    k: usize,
    min_matches: usize,
}

impl OrientationPredictor {
    pub fn new(graph: &Graph) -> Self {
        Self::with_params(graph, ORIENTATION_KMER_LEN, MIN_KMER_MATCHES)
    }

    pub fn with_params(graph: &Graph, k: usize, min_matches: usize) -> Self {
        let forward = KmerIndex::build(graph, k);
        let rc_graph = graph.reverse(true);
        let reverse = KmerIndex::build(&rc_graph, k);
        OrientationPredictor {
            forward,
            reverse,
            k,
            min_matches,
        }
    }

    /// Count non-overlapping k-mer matches against `index`, scanning
    /// greedily left to right: on a match, advance by `k`; on a miss,
    /// advance by 1.
    fn count_matches(&self, read: &[u8], index: &KmerIndex) -> usize {
        if read.len() < self.k {
            return 0;
        }
        let mut matches = 0;
        let mut pos = 0;
        while pos + self.k <= read.len() {
            let kmer = &read[pos..pos + self.k];
            if index.contains(kmer) {
                matches += 1;
                pos += self.k;
            } else {
                pos += 1;
            }
        }
        matches
    }

    /// Predict the orientation of `read` against this locus's graph, or
    /// `None` if neither direction clears the match threshold.
    pub fn predict(&self, read: &[u8]) -> Option<Orientation> {
        let forward_matches = self.count_matches(read, &self.forward);
        let reverse_matches = self.count_matches(read, &self.reverse);
        if forward_matches.max(reverse_matches) < self.min_matches {
            return None;
        }
        if forward_matches >= reverse_matches {
            Some(Orientation::AsSequenced)
        } else {
            Some(Orientation::ReverseComplement)
        }
    }

    /// Return `read` oriented as predicted, reverse-complementing it if
    /// necessary. `None` if the read could not be confidently oriented.
    pub fn orient(&self, read: &[u8]) -> Option<Vec<u8>> {
        match self.predict(read)? {
            Orientation::AsSequenced => Some(read.to_vec()),
            Orientation::ReverseComplement => Some(reverse_complement(read)),
        }
    }
}
