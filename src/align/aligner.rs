//! Seed-and-extend graph aligner.
//!
//! Exact k-mer seeds are located via the locus's [`KmerIndex`], then each
//! seed is extended left and right with an affine-gap dynamic-programming
//! recurrence confined to the graph's node/edge topology (no alignment step
//! may cross a missing edge). The highest-scoring alignment(s) found across
//! all seeds are returned; ties are kept so the classifier can apply
//! canonical-alignment preference afterwards.
use std::collections::HashSet;

use crate::graph::kmer_index::KmerIndex;
use crate::graph::{Graph, Path};

use super::{match_score_floor, AlignmentOperation, GraphAlignment, GAP_OPEN_SCORE, MATCH_SCORE, MISMATCH_SCORE};

/// How far past the query's own length an extension may walk the graph
/// looking for a place to close out a run of deletions. Bounds the DP
/// table without ruling out the handful of bases a stutter or small
/// indel typically spans.
const MAX_GAP_SPAN: usize = 8;

pub struct GraphAligner<'g> {
    graph: &'g Graph,
    index: KmerIndex,
    seed_k: usize,
}

impl<'g> GraphAligner<'g> {
    pub fn new(graph: &'g Graph, seed_k: usize) -> Self {
        let index = KmerIndex::build(graph, seed_k);
        GraphAligner { graph, index, seed_k }
    }

    /// Align `read` against the graph, returning every alignment tied for
    /// the best score that clears the read-length-proportional floor.
    pub fn align(&self, read: &[u8]) -> Vec<GraphAlignment> {
        let mut candidates = Vec::new();
        let mut seen_paths: HashSet<Vec<usize>> = HashSet::new();
        for seed_pos in 0..read.len().saturating_sub(self.seed_k).saturating_add(1) {
            let kmer = &read[seed_pos..seed_pos + self.seed_k];
            for &(node_id, offset) in self.index.sources(kmer) {
                if let Some(aln) = self.extend_seed(read, seed_pos, node_id, offset) {
                    if seen_paths.insert(aln.path.node_ids.clone()) {
                        candidates.push(aln);
                    }
                }
            }
        }
        let floor = match_score_floor(read.len());
        let best_score = candidates.iter().map(|a| a.score).max();
        match best_score {
            Some(best) if best >= floor => candidates.into_iter().filter(|a| a.score == best).collect(),
            _ => Vec::new(),
        }
    }

    /// Extend a single exact-match seed into a full end-to-end alignment of
    /// `read`, walking the graph greedily node by node and running a
    /// straightforward edit-distance style recurrence within each node's
    /// sequence.
    fn extend_seed(
        &self,
        read: &[u8],
        seed_pos: usize,
        seed_node: usize,
        seed_offset: usize,
    ) -> Option<GraphAlignment> {
        // Walk backwards from the seed start to cover read[0..seed_pos].
        let (mut node_ids, start_offset, left_ops) =
            self.extend_left(read, seed_pos, seed_node, seed_offset)?;
        // Walk forward from the seed end to cover read[seed_pos+k..].
        let tail_start = seed_pos + self.seed_k;
        let (tail_nodes, end_offset, right_ops) =
            self.extend_right(read, tail_start, seed_node, seed_offset + self.seed_k)?;

        let mut operations = left_ops;
        operations.extend(vec![AlignmentOperation::Match; self.seed_k]);
        operations.extend(right_ops);

        // tail_nodes[0] is seed_node again; drop the duplicate.
        node_ids.extend(tail_nodes.into_iter().skip(1));

        let path = Path::new(node_ids, start_offset, end_offset).ok()?;
        let mut aln = GraphAlignment {
            path,
            operations,
            score: 0,
        };
        aln.rescore();
        Some(aln)
    }

    /// Consume `read[..seed_pos]` right-to-left, walking predecessors of
    /// `node` from `offset` backwards. Returns (node path prefix in forward
    /// order, start_offset, operations in forward order).
    fn extend_left(
        &self,
        read: &[u8],
        seed_pos: usize,
        node: usize,
        offset: usize,
    ) -> Option<(Vec<usize>, usize, Vec<AlignmentOperation>)> {
        if seed_pos == 0 {
            return Some((vec![node], offset, Vec::new()));
        }
        // Both the query and the reference buffer are gathered nearest-to-
        // seed first, so they line up without needing a reversal before
        // the DP runs; only the result needs reversing back to forward order.
        let query_rev: Vec<u8> = read[..seed_pos].iter().rev().copied().collect();
        let want = query_rev.len() + MAX_GAP_SPAN;
        let (ref_buf, ref_pos) = self.collect_ref_buffer_left(node, offset, want);
        let (consumed, mut ops) = affine_align(&query_rev, &ref_buf);
        ops.reverse();

        let mut node_stack = Vec::new();
        let start_offset = if consumed > 0 {
            for &(n, _) in ref_pos[..consumed].iter().rev() {
                if node_stack.last() != Some(&n) {
                    node_stack.push(n);
                }
            }
            ref_pos[consumed - 1].1
        } else {
            offset
        };
        if node_stack.last() != Some(&node) {
            node_stack.push(node);
        }
        Some((node_stack, start_offset, ops))
    }

    /// Consume `read[tail_start..]` left-to-right, walking successors of
    /// `node` from `offset` forwards. Returns (node path starting at
    /// `node`, end_offset, operations in forward order).
    fn extend_right(
        &self,
        read: &[u8],
        tail_start: usize,
        node: usize,
        offset: usize,
    ) -> Option<(Vec<usize>, usize, Vec<AlignmentOperation>)> {
        if tail_start >= read.len() {
            return Some((vec![node], offset, Vec::new()));
        }
        let query = &read[tail_start..];
        let want = query.len() + MAX_GAP_SPAN;
        let (ref_buf, ref_pos) = self.collect_ref_buffer_right(node, offset, want);
        let (consumed, ops) = affine_align(query, &ref_buf);

        let mut node_stack = vec![node];
        let end_offset = if consumed > 0 {
            for &(n, _) in &ref_pos[..consumed] {
                if node_stack.last() != Some(&n) {
                    node_stack.push(n);
                }
            }
            ref_pos[consumed - 1].1 + 1
        } else {
            offset
        };
        Some((node_stack, end_offset, ops))
    }

    /// Gather up to `want` reference bases forward from `(node, offset)`,
    /// crossing node boundaries via each node's first successor. Stops
    /// early if the graph runs out of successors first.
    fn collect_ref_buffer_right(&self, node: usize, offset: usize, want: usize) -> (Vec<u8>, Vec<(usize, usize)>) {
        let mut seq = Vec::with_capacity(want);
        let mut pos = Vec::with_capacity(want);
        let mut cur_node = node;
        let mut cur_offset = offset;
        while seq.len() < want {
            if cur_offset == self.graph.node_len(cur_node) {
                let Some(&succ) = self.graph.successors(cur_node).first() else {
                    break;
                };
                cur_node = succ;
                cur_offset = 0;
                continue;
            }
            seq.push(self.graph.node_seq(cur_node)[cur_offset]);
            pos.push((cur_node, cur_offset));
            cur_offset += 1;
        }
        (seq, pos)
    }

    /// Gather up to `want` reference bases backward from `(node, offset)`,
    /// nearest-to-`offset` first, crossing node boundaries via each node's
    /// first predecessor. Stops early if the graph runs out of predecessors
    /// first.
    fn collect_ref_buffer_left(&self, node: usize, offset: usize, want: usize) -> (Vec<u8>, Vec<(usize, usize)>) {
        let mut seq = Vec::with_capacity(want);
        let mut pos = Vec::with_capacity(want);
        let mut cur_node = node;
        let mut cur_offset = offset;
        while seq.len() < want {
            if cur_offset == 0 {
                let Some(&pred) = self.graph.predecessors(cur_node).first() else {
                    break;
                };
                cur_node = pred;
                cur_offset = self.graph.node_len(cur_node);
                continue;
            }
            cur_offset -= 1;
            seq.push(self.graph.node_seq(cur_node)[cur_offset]);
            pos.push((cur_node, cur_offset));
        }
        (seq, pos)
    }
}

/// Affine-gap DP that aligns the whole of `query` against a prefix of
/// `reference`, choosing whichever prefix length scores best under
/// [`GraphAlignment::rescore`]'s scoring model. Returns the number of
/// reference bases the chosen alignment consumes and the forward-order
/// operation list.
///
/// `query` and `reference` must both run in the same direction (both
/// forward, or both reversed from a shared anchor); the caller is
/// responsible for orienting them and for reversing the result back.
fn affine_align(query: &[u8], reference: &[u8]) -> (usize, Vec<AlignmentOperation>) {
    const NEG: i32 = i32::MIN / 4;
    let qn = query.len();
    let rn = reference.len();

    // m[i][j]: best score aligning query[..i] to reference[..j] ending in
    // a match/mismatch (or the empty alignment at i = j = 0).
    // ix[i][j]: ending in an insertion (query base i-1 consumed, no
    // reference base consumed).
    // iy[i][j]: ending in a deletion (reference base j-1 consumed, no
    // query base consumed).
    let mut m = vec![vec![NEG; rn + 1]; qn + 1];
    let mut ix = vec![vec![NEG; rn + 1]; qn + 1];
    let mut iy = vec![vec![NEG; rn + 1]; qn + 1];
    m[0][0] = 0;

    for i in 0..=qn {
        for j in 0..=rn {
            if i == 0 && j == 0 {
                continue;
            }
            if i > 0 && j > 0 {
                let best_prev = m[i - 1][j - 1].max(ix[i - 1][j - 1]).max(iy[i - 1][j - 1]);
                if best_prev > NEG {
                    let s = if crate::graph::iupac_matches(reference[j - 1], query[i - 1]) {
                        MATCH_SCORE
                    } else {
                        MISMATCH_SCORE
                    };
                    m[i][j] = best_prev + s;
                }
            }
            if i > 0 {
                ix[i][j] = (m[i - 1][j] + GAP_OPEN_SCORE).max(ix[i - 1][j] + GAP_OPEN_SCORE / 2);
            }
            if j > 0 {
                iy[i][j] = (m[i][j - 1] + GAP_OPEN_SCORE).max(iy[i][j - 1] + GAP_OPEN_SCORE / 2);
            }
        }
    }

    // The alignment must consume the whole query; among the reference
    // lengths that achieve that, keep the best-scoring one. Trailing
    // deletions past the last query base never help, so only m/ix are
    // considered as end states.
    let mut best_j = 0;
    let mut best_score = NEG;
    let mut best_in_ix = false;
    for j in 0..=rn {
        if m[qn][j] > best_score {
            best_score = m[qn][j];
            best_j = j;
            best_in_ix = false;
        }
        if ix[qn][j] > best_score {
            best_score = ix[qn][j];
            best_j = j;
            best_in_ix = true;
        }
    }

    let mut ops = Vec::with_capacity(qn + best_j);
    let mut i = qn;
    let mut j = best_j;
    // 0 = m, 1 = ix, 2 = iy
    let mut state: u8 = if best_in_ix { 1 } else { 0 };
    while i > 0 || j > 0 {
        match state {
            0 => {
                let matched = crate::graph::iupac_matches(reference[j - 1], query[i - 1]);
                ops.push(if matched { AlignmentOperation::Match } else { AlignmentOperation::Mismatch });
                let prev = m[i - 1][j - 1].max(ix[i - 1][j - 1]).max(iy[i - 1][j - 1]);
                state = if m[i - 1][j - 1] == prev {
                    0
                } else if ix[i - 1][j - 1] == prev {
                    1
                } else {
                    2
                };
                i -= 1;
                j -= 1;
            }
            1 => {
                let opens = ix[i][j] == m[i - 1][j] + GAP_OPEN_SCORE;
                ops.push(AlignmentOperation::Insertion { opens });
                state = if opens { 0 } else { 1 };
                i -= 1;
            }
            _ => {
                let opens = iy[i][j] == m[i][j - 1] + GAP_OPEN_SCORE;
                ops.push(AlignmentOperation::Deletion { opens });
                state = if opens { 0 } else { 2 };
                j -= 1;
            }
        }
    }
    ops.reverse();
    (best_j, ops)
}

/// Score a fixed sequence of operations under the gap-open scoring scheme,
/// used by the STR refiner when it synthesises a clipped/destuttered
/// operation list rather than re-running the aligner.
pub fn score_operations(ops: &[AlignmentOperation]) -> i32 {
    let mut score = 0;
    let mut in_gap = false;
    for op in ops {
        match op {
            AlignmentOperation::Match => {
                score += MATCH_SCORE;
                in_gap = false;
            }
            AlignmentOperation::Mismatch => {
                score += MISMATCH_SCORE;
                in_gap = false;
            }
            AlignmentOperation::Deletion { .. } | AlignmentOperation::Insertion { .. } => {
                score += if in_gap { GAP_OPEN_SCORE / 2 } else { GAP_OPEN_SCORE };
                in_gap = true;
            }
        }
    }
    score
}
