//! End-to-end scenarios wiring catalog decoding, graph alignment,
//! classification, refinement, statistics and genotyping together,
//! without touching a real BAM/CRAM archive (no fixture binaries ship
//! with this repo; see DESIGN.md for why).
use std::collections::HashMap;

use repeatgt::align::aligner::GraphAligner;
use repeatgt::align::classifier::canonical_repeat_alignment;
use repeatgt::align::str_refiner::{self, StrAlignType};
use repeatgt::genotyping::copy_number::{call_delta, BaselineCopyNumber};
use repeatgt::genotyping::small_variant;
use repeatgt::genotyping::str_genotyper::{bootstrap_ci, estimate_ml_genotype, MotifCountTable};
use repeatgt::graph::orientation::OrientationPredictor;
use repeatgt::graph::Graph;
use repeatgt::io::catalog::decode_catalog;
use repeatgt::locus::stats::LocusStatsAccumulator;
use repeatgt::region::ReferenceContigInfo;

fn repeat_locus_graph(left: &[u8], motif: &[u8], right: &[u8]) -> (Graph, usize) {
    let mut g = Graph::new();
    let left_node = g.add_node(left.to_vec());
    let repeat_node = g.add_node(motif.to_vec());
    let right_node = g.add_node(right.to_vec());
    g.add_edge(left_node, repeat_node, None).unwrap();
    g.add_edge(repeat_node, repeat_node, Some("repeat".to_string())).unwrap();
    g.add_edge(repeat_node, right_node, None).unwrap();
    (g, repeat_node)
}

/// Build a synthetic spanning read: some flank, N copies of the motif,
/// some more flank.
fn spanning_read(left: &[u8], motif: &[u8], right: &[u8], copies: usize) -> Vec<u8> {
    let mut out = left[left.len().saturating_sub(15)..].to_vec();
    for _ in 0..copies {
        out.extend_from_slice(motif);
    }
    out.extend_from_slice(&right[..right.len().min(15)]);
    out
}

fn genotype_from_reads(
    graph: &Graph,
    repeat_node: usize,
    motif_len: usize,
    reads: &[Vec<u8>],
    allele_count: usize,
) -> (i64, i64) {
    let aligner = GraphAligner::new(graph, 10);
    let orientation = OrientationPredictor::new(graph);

    let mut spanning: MotifCountTable = MotifCountTable::new();
    let mut flanking: MotifCountTable = MotifCountTable::new();
    let mut stats_acc = LocusStatsAccumulator::new();

    for read in reads {
        let Some(oriented) = orientation.orient(read) else { continue };
        let candidates = aligner.align(&oriented);
        if candidates.is_empty() {
            continue;
        }
        let Some((canonical, _label)) = canonical_repeat_alignment(graph, repeat_node, &candidates) else {
            continue;
        };
        stats_acc.add_flank_alignment(oriented.len());
        let observed_motifs = canonical.path.node_ids.iter().filter(|&&n| n == repeat_node).count();
        let Some(refined) = str_refiner::refine(graph, canonical, repeat_node, motif_len, observed_motifs) else {
            continue;
        };
        let count = refined.motif_count as i64;
        match refined.align_type {
            StrAlignType::Spanning => *spanning.entry(count).or_insert(0) += 1,
            StrAlignType::Flanking => *flanking.entry(count).or_insert(0) += 1,
            StrAlignType::InRepeat => {}
        }
    }

    let stats = stats_acc.finish(allele_count, left_flank_len(graph, repeat_node), right_flank_len(graph, repeat_node));
    let haploid_depth = stats.depth / allele_count as f64;
    estimate_ml_genotype(&spanning, &flanking, allele_count, haploid_depth, stats.mean_read_length, 0.05)
        .expect("genotype estimate")
}

fn left_flank_len(graph: &Graph, repeat_node: usize) -> usize {
    graph
        .immediate_predecessors_excluding_self(repeat_node)
        .into_iter()
        .map(|n| graph.node_len(n))
        .sum()
}

fn right_flank_len(graph: &Graph, repeat_node: usize) -> usize {
    graph
        .immediate_successors_excluding_self(repeat_node)
        .into_iter()
        .map(|n| graph.node_len(n))
        .sum()
}

#[test]
fn homozygous_str_locus_converges_on_the_true_allele() {
    let left = b"AAAACCCCGGGGTTTTAAAACCCCGGGG";
    let motif = b"CAG";
    let right = b"TTTTGGGGCCCCAAAATTTTGGGGCCCC";
    let (graph, repeat_node) = repeat_locus_graph(left, motif, right);

    let reads: Vec<Vec<u8>> = (0..20).map(|_| spanning_read(left, motif, right, 12)).collect();
    let (a1, a2) = genotype_from_reads(&graph, repeat_node, motif.len(), &reads, 2);
    assert_eq!((a1, a2), (12, 12));
}

#[test]
fn heterozygous_str_locus_recovers_both_alleles() {
    let left = b"AAAACCCCGGGGTTTTAAAACCCCGGGG";
    let motif = b"CAG";
    let right = b"TTTTGGGGCCCCAAAATTTTGGGGCCCC";
    let (graph, repeat_node) = repeat_locus_graph(left, motif, right);

    let mut reads: Vec<Vec<u8>> = (0..12).map(|_| spanning_read(left, motif, right, 10)).collect();
    reads.extend((0..12).map(|_| spanning_read(left, motif, right, 20)));

    let (a1, a2) = genotype_from_reads(&graph, repeat_node, motif.len(), &reads, 2);
    assert_eq!((a1, a2), (10, 20));
}

#[test]
fn bootstrap_ci_around_a_spanning_ml_estimate_brackets_it() {
    let (low, high) = bootstrap_ci(15, 30, 0.3, 150.0, false);
    assert!(low <= 15);
    assert!(high >= 15);
}

#[test]
fn smn_like_paralog_copy_number_delta_matches_the_expected_deletion() {
    let baselines = vec![
        BaselineCopyNumber { observed: Some(2), expected: 2 },
        BaselineCopyNumber { observed: None, expected: 2 },
    ];
    let delta = call_delta(1, &baselines);
    assert_eq!(delta, Some(-1));
}

#[test]
fn small_variant_presence_test_detects_a_het_deletion() {
    let (call, posterior) = small_variant::presence_test(40, 20, 2, 0.05);
    assert_eq!(call, 1);
    assert!(posterior > 0.5);
}

#[test]
fn decoded_catalog_entry_drives_the_same_aligner_pipeline() {
    let json = r#"{
        "LOCUS1": {
            "structure": "AAAACCCCGGGGTTTTAAAACCCCGGGG(CAG)*TTTTGGGGCCCCAAAATTTTGGGGCCCC",
            "reference_regions": ["chr1:1000-1020"],
            "target_regions": ["chr1:900-1120"],
            "offtarget_regions": [],
            "variant_types": ["common-repeat"]
        }
    }"#;
    let contigs = ReferenceContigInfo::new(vec!["chr1".to_string()], vec![1_000_000]).unwrap();
    let loci = decode_catalog(json, &contigs).unwrap();
    assert_eq!(loci.len(), 1);
    let (_, spec) = &loci[0];
    let repeat_node = spec.variants[0].repeat_node().unwrap();
    let motif_len = spec.variants[0].motif_length.unwrap();

    let left = b"AAAACCCCGGGGTTTTAAAACCCCGGGG";
    let motif = b"CAG";
    let right = b"TTTTGGGGCCCCAAAATTTTGGGGCCCC";
    let reads: Vec<Vec<u8>> = (0..16).map(|_| spanning_read(left, motif, right, 9)).collect();

    let (a1, a2) = genotype_from_reads(&spec.graph, repeat_node, motif_len, &reads, 2);
    assert_eq!((a1, a2), (9, 9));
}

#[test]
fn low_coverage_locus_yields_no_ml_estimate() {
    let spanning: MotifCountTable = HashMap::new();
    let flanking: MotifCountTable = HashMap::new();
    assert!(estimate_ml_genotype(&spanning, &flanking, 2, 30.0, 150.0, 0.05).is_none());
}
