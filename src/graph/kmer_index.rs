//! k-mer index over every length-`k` path through a [`Graph`].
//!
//! Each starting position is a `(node, offset)` pair; the path starting
//! there is walked forward node by node until `k` bases have been
//! collected, crossing node boundaries along every combination of
//! successors. Reference sequence can be IUPAC-degenerate, so each raw
//! path is expanded into the Cartesian product of concrete nucleotide
//! sequences before insertion, exactly as the orientation predictor
//! expects to find only A/C/G/T in the index.
use std::collections::HashMap;

use super::{iupac_expansion, is_degenerate, Graph};

/// Maps a concrete `k`-mer to every `(node_id, offset)` start position in
/// the graph from which a walk of length `k` produces that sequence.
#[derive(Debug, Clone)]
pub struct KmerIndex {
    k: usize,
    index: HashMap<Vec<u8>, Vec<(usize, usize)>>,
}

impl KmerIndex {
    pub fn k(&self) -> usize {
        self.k
    }

    pub fn contains(&self, kmer: &[u8]) -> bool {
        self.index.contains_key(kmer)
    }

    pub fn sources(&self, kmer: &[u8]) -> &[(usize, usize)] {
        self.index.get(kmer).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Build the index of every `k`-mer reachable from a `(node, offset)`
    /// start position in `graph`.
    pub fn build(graph: &Graph, k: usize) -> KmerIndex {
        let mut index: HashMap<Vec<u8>, Vec<(usize, usize)>> = HashMap::new();
        for node_id in 0..graph.num_nodes() {
            for offset in 0..graph.node_len(node_id) {
                let mut walks = Vec::new();
                collect_walks(graph, node_id, offset, k, Vec::new(), &mut walks);
                for walk in walks {
                    for kmer in expand_degenerate(&walk) {
                        index.entry(kmer).or_default().push((node_id, offset));
                    }
                }
            }
        }
        KmerIndex { k, index }
    }
}

/// Depth-first walk collecting every length-`k` byte sequence reachable
/// from `(node_id, offset)`, following every successor at node boundaries.
fn collect_walks(
    graph: &Graph,
    node_id: usize,
    offset: usize,
    k: usize,
    prefix: Vec<u8>,
    out: &mut Vec<Vec<u8>>,
) {
    let seq = graph.node_seq(node_id);
    let remaining = k - prefix.len();
    let available = seq.len() - offset;
    if available >= remaining {
        let mut walk = prefix;
        walk.extend_from_slice(&seq[offset..offset + remaining]);
        out.push(walk);
        return;
    }
    let mut extended = prefix;
    extended.extend_from_slice(&seq[offset..]);
    for &succ in graph.successors(node_id) {
        collect_walks(graph, succ, 0, k, extended.clone(), out);
    }
}

/// Expand a raw walk that may contain IUPAC codes into every concrete
/// nucleotide sequence it denotes.
fn expand_degenerate(walk: &[u8]) -> Vec<Vec<u8>> {
    if !is_degenerate(walk) {
        return vec![walk.to_vec()];
    }
    let mut expansions: Vec<Vec<u8>> = vec![Vec::with_capacity(walk.len())];
    for &base in walk {
        let choices = iupac_expansion(base);
        let mut next = Vec::with_capacity(expansions.len() * choices.len());
        for prefix in &expansions {
            for &choice in choices {
                let mut seq = prefix.clone();
                seq.push(choice);
                next.push(seq);
            }
        }
        expansions = next;
    }
    expansions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Graph;

    fn str_locus_graph() -> Graph {
        let mut g = Graph::new();
        let left = g.add_node(b"AATTGG".to_vec());
        let repeat = g.add_node(b"CGG".to_vec());
        let right = g.add_node(b"ATTTCC".to_vec());
        g.add_edge(left, repeat, None).unwrap();
        g.add_edge(repeat, repeat, Some("repeat".to_string())).unwrap();
        g.add_edge(repeat, right, None).unwrap();
        g
    }

    #[test]
    fn every_kmer_in_a_node_is_indexed() {
        let g = str_locus_graph();
        let idx = KmerIndex::build(&g, 4);
        assert!(idx.contains(b"AATT"));
        assert!(idx.contains(b"ATTG"));
        assert_eq!(idx.sources(b"AATT"), &[(0, 0)]);
    }

    #[test]
    fn kmer_crossing_a_node_boundary_is_indexed() {
        let g = str_locus_graph();
        let idx = KmerIndex::build(&g, 4);
        // last 2 bases of left flank + first 2 of repeat node
        assert!(idx.contains(b"GGCG"));
    }

    #[test]
    fn self_loop_produces_repeated_motif_kmer() {
        let g = str_locus_graph();
        let idx = KmerIndex::build(&g, 6);
        // two full trips around the self-loop: CGGCGG
        assert!(idx.contains(b"CGGCGG"));
    }

    #[test]
    fn degenerate_base_expands_to_all_concrete_kmers() {
        let mut g = Graph::new();
        g.add_node(b"ANGT".to_vec());
        let idx = KmerIndex::build(&g, 4);
        assert!(idx.contains(b"AAGT"));
        assert!(idx.contains(b"ACGT"));
        assert!(idx.contains(b"AGGT"));
        assert!(idx.contains(b"ATGT"));
        assert!(!idx.contains(b"ANGT"));
    }
}
