//! Alignment classifier: assigns a repeat-variant or small-variant label to
//! a graph alignment, and picks the canonical alignment among several
//! candidates for the same read.
use std::collections::HashSet;

use crate::graph::Graph;

use super::GraphAlignment;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepeatAlignmentLabel {
    Spans,
    FlanksLeft,
    LeftOf,
    FlanksRight,
    RightOf,
    InsideRepeat,
    Unalignable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmallVariantAlignmentLabel {
    Spans,
    UpstreamFlanking,
    DownstreamFlanking,
    Bypassing,
    Unrelated,
}

/// Classify a single alignment against the repeat node and its immediate
/// flank sets.
pub fn classify_repeat_alignment(
    graph: &Graph,
    alignment: &GraphAlignment,
    repeat_node: usize,
) -> RepeatAlignmentLabel {
    let left_flank_nodes: HashSet<usize> = graph
        .immediate_predecessors_excluding_self(repeat_node)
        .into_iter()
        .collect();
    let right_flank_nodes: HashSet<usize> = graph
        .immediate_successors_excluding_self(repeat_node)
        .into_iter()
        .collect();

    let visited: HashSet<usize> = alignment.path.node_ids.iter().copied().collect();
    let overlaps_left = visited.iter().any(|n| left_flank_nodes.contains(n));
    let overlaps_right = visited.iter().any(|n| right_flank_nodes.contains(n));
    let overlaps_repeat = visited.contains(&repeat_node);

    match (overlaps_left, overlaps_right, overlaps_repeat) {
        (true, true, _) => RepeatAlignmentLabel::Spans,
        (true, false, true) => RepeatAlignmentLabel::FlanksLeft,
        (true, false, false) => RepeatAlignmentLabel::LeftOf,
        (false, true, true) => RepeatAlignmentLabel::FlanksRight,
        (false, true, false) => RepeatAlignmentLabel::RightOf,
        (false, false, true) => RepeatAlignmentLabel::InsideRepeat,
        (false, false, false) => RepeatAlignmentLabel::Unalignable,
    }
}

/// Classify a single alignment against a small variant's node interval
/// `[first_variant_node, last_variant_node]`. Node ids are assumed to be
/// numbered in graph topological order, so a node's position relative to
/// the interval can be read off its id directly without requiring the
/// path to actually visit an interval node.
pub fn classify_small_variant_alignment(
    alignment: &GraphAlignment,
    first_variant_node: usize,
    last_variant_node: usize,
) -> SmallVariantAlignmentLabel {
    let nodes = &alignment.path.node_ids;
    let has_strictly_before = nodes.iter().any(|&n| n < first_variant_node);
    let has_strictly_after = nodes.iter().any(|&n| n > last_variant_node);
    let touches_interval = nodes
        .iter()
        .any(|&n| n >= first_variant_node && n <= last_variant_node);

    match (has_strictly_before, has_strictly_after, touches_interval) {
        (true, true, false) => SmallVariantAlignmentLabel::Bypassing,
        (true, true, true) => SmallVariantAlignmentLabel::Spans,
        (true, false, true) => SmallVariantAlignmentLabel::UpstreamFlanking,
        (false, true, true) => SmallVariantAlignmentLabel::DownstreamFlanking,
        (false, false, true) => SmallVariantAlignmentLabel::Unrelated,
        _ => SmallVariantAlignmentLabel::Unrelated,
    }
}

/// Pick the canonical alignment among several candidates for the same
/// read: prefer `inside_repeat`, then any `flanks_*` label, otherwise the
/// first candidate. Mirrors the upstream implementation's
/// last-match-wins loop exactly, including its loss of information when
/// multiple flanking candidates are present.
pub fn canonical_repeat_alignment<'a>(
    graph: &Graph,
    repeat_node: usize,
    candidates: &'a [GraphAlignment],
) -> Option<(&'a GraphAlignment, RepeatAlignmentLabel)> {
    if candidates.is_empty() {
        return None;
    }
    let mut chosen = (&candidates[0], classify_repeat_alignment(graph, &candidates[0], repeat_node));
    for aln in candidates {
        let label = classify_repeat_alignment(graph, aln, repeat_node);
        match label {
            RepeatAlignmentLabel::InsideRepeat => {
                chosen = (aln, label);
            }
            RepeatAlignmentLabel::FlanksLeft | RepeatAlignmentLabel::FlanksRight => {
                if !matches!(chosen.1, RepeatAlignmentLabel::InsideRepeat) {
                    chosen = (aln, label);
                }
            }
            _ => {}
        }
    }
    Some(chosen)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Path;

    fn str_locus_graph() -> Graph {
        let mut g = Graph::new();
        let left = g.add_node(b"AATT".to_vec());
        let repeat = g.add_node(b"CGG".to_vec());
        let right = g.add_node(b"ATTT".to_vec());
        g.add_edge(left, repeat, None).unwrap();
        g.add_edge(repeat, repeat, Some("repeat".to_string())).unwrap();
        g.add_edge(repeat, right, None).unwrap();
        g
    }

    fn aln(node_ids: Vec<usize>) -> GraphAlignment {
        let len = node_ids.len();
        GraphAlignment {
            path: Path::new(node_ids, 0, if len == 1 { 1 } else { 3 }).unwrap(),
            operations: Vec::new(),
            score: 0,
        }
    }

    #[test]
    fn spans_both_flanks() {
        let g = str_locus_graph();
        let a = aln(vec![0, 1, 2]);
        assert_eq!(classify_repeat_alignment(&g, &a, 1), RepeatAlignmentLabel::Spans);
    }

    #[test]
    fn flanks_left_only() {
        let g = str_locus_graph();
        let a = aln(vec![0, 1]);
        assert_eq!(classify_repeat_alignment(&g, &a, 1), RepeatAlignmentLabel::FlanksLeft);
    }

    #[test]
    fn inside_repeat_only() {
        let g = str_locus_graph();
        let a = aln(vec![1]);
        assert_eq!(classify_repeat_alignment(&g, &a, 1), RepeatAlignmentLabel::InsideRepeat);
    }

    #[test]
    fn left_of_without_repeat() {
        let g = str_locus_graph();
        let a = aln(vec![0]);
        assert_eq!(classify_repeat_alignment(&g, &a, 1), RepeatAlignmentLabel::LeftOf);
    }

    #[test]
    fn canonical_prefers_inside_repeat_over_flanking() {
        let g = str_locus_graph();
        let candidates = vec![aln(vec![0, 1]), aln(vec![1]), aln(vec![1, 2])];
        let (chosen, label) = canonical_repeat_alignment(&g, 1, &candidates).unwrap();
        assert_eq!(label, RepeatAlignmentLabel::InsideRepeat);
        assert_eq!(chosen.path.node_ids, vec![1]);
    }

    #[test]
    fn small_variant_spans_interval() {
        let a = aln(vec![0, 1, 2]);
        assert_eq!(
            classify_small_variant_alignment(&a, 1, 1),
            SmallVariantAlignmentLabel::Spans
        );
    }

    #[test]
    fn small_variant_bypassing_skips_interval_nodes() {
        let a = aln(vec![0, 2]);
        assert_eq!(
            classify_small_variant_alignment(&a, 1, 1),
            SmallVariantAlignmentLabel::Bypassing
        );
    }
}
