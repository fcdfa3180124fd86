//! Locus analyzer: the state machine that drives one locus from raw reads
//! to findings.
//!
//! ```text
//! created -> collecting_reads -> aligning -> classifying -> refining -> stats -> genotyping -> findings_ready
//! ```
//! Transitions are linear. A locus with no reads, or zero mean read
//! length, skips directly to `findings_ready` with empty findings and the
//! low-depth filter set.
use std::collections::HashMap;

use anyhow::Result;
use log::{debug, trace};

use crate::align::aligner::GraphAligner;
use crate::align::classifier::{canonical_repeat_alignment, classify_small_variant_alignment, RepeatAlignmentLabel, SmallVariantAlignmentLabel};
use crate::align::str_refiner::{self, StrAlignType};
use crate::align::GraphAlignment;
use crate::filters::GenotypeFilter;
use crate::genotyping::copy_number::{self, BaselineCopyNumber};
use crate::genotyping::small_variant;
use crate::genotyping::str_genotyper::{self, Allele, MotifCountTable, RepeatGenotype};
use crate::graph::orientation::OrientationPredictor;
use crate::locus::findings::{LocusFindings, RepeatFindings, SmallVariantFindings, VariantFindings};
use crate::locus::spec::{LocusSpecification, VariantSubtype, VariantType};
use crate::locus::stats::{expected_allele_count, LocusStatsAccumulator};
use crate::reads::archive::ArchiveHandle;
use crate::reads::{pair_is_nearby, LinearAlignmentStats, Read, ReadPair};

pub const ORIENTATION_SEED_K: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalyzerState {
    Created,
    CollectingReads,
    Aligning,
    Classifying,
    Refining,
    Stats,
    Genotyping,
    FindingsReady,
}

pub struct LocusAnalyzer<'a> {
    pub spec: &'a LocusSpecification,
}

struct AlignedRead {
    candidates: Vec<GraphAlignment>,
    len: usize,
}

impl<'a> LocusAnalyzer<'a> {
    pub fn new(spec: &'a LocusSpecification) -> Self {
        LocusAnalyzer { spec }
    }

    pub fn analyze(&self, archive: &ArchiveHandle, sample_is_female: bool) -> Result<LocusFindings> {
        let variant_ids: Vec<String> = self.spec.variants.iter().map(|v| v.id.clone()).collect();
        let allele_count = expected_allele_count(self.spec.chromosome_type, sample_is_female);

        // collecting_reads
        let pairs = crate::reads::archive::collect_read_pairs(
            archive,
            &self.spec.target_regions,
            &self.spec.offtarget_regions,
        )?;
        if pairs.is_empty() {
            debug!("locus {}: no reads collected, skipping to findings_ready", self.spec.id);
            return Ok(LocusFindings::empty_with_low_depth(&variant_ids, allele_count));
        }

        // aligning
        let aligner = GraphAligner::new(&self.spec.graph, ORIENTATION_SEED_K);
        let orientation = OrientationPredictor::new(&self.spec.graph);
        let mut stats_acc = LocusStatsAccumulator::new();
        let aligned = self.align_all(&pairs, &aligner, &orientation, &mut stats_acc);
        if aligned.is_empty() {
            return Ok(LocusFindings::empty_with_low_depth(&variant_ids, allele_count));
        }

        // classifying + refining + genotyping
        let mut variants = HashMap::new();

        for variant in &self.spec.variants {
            match variant.subtype.variant_type() {
                VariantType::Repeat => {
                    variants.insert(
                        variant.id.clone(),
                        self.genotype_repeat_variant(variant, &aligned, &mut stats_acc, allele_count),
                    );
                }
                VariantType::SmallVariant => {
                    variants.insert(
                        variant.id.clone(),
                        self.genotype_small_variant(variant, &aligned, allele_count),
                    );
                }
            }
        }

        let (left, right) = self
            .spec
            .variants
            .iter()
            .find_map(|v| v.repeat_node())
            .map(|n| self.spec.flank_len(n))
            .unwrap_or((0, 0));
        let final_stats = stats_acc.finish(allele_count, left, right);

        Ok(LocusFindings { stats: final_stats, variants })
    }

    /// Cross-validates pairs (both mates must have at least one plausible
    /// alignment to this locus), accumulates fragment-length evidence for
    /// nearby complete pairs, and aligns every resulting read.
    fn align_all(
        &self,
        pairs: &HashMap<String, ReadPair>,
        aligner: &GraphAligner,
        orientation: &OrientationPredictor,
        stats_acc: &mut LocusStatsAccumulator,
    ) -> Vec<AlignedRead> {
        let mut out = Vec::new();
        for pair in pairs.values() {
            if let (Some((_, stats_a)), Some((_, stats_b))) = (&pair.first, &pair.second) {
                if pair_is_nearby(stats_a, stats_b) {
                    stats_acc.add_flank_pair(stats_a.region.start, stats_a.region.end, stats_b.region.start, stats_b.region.end);
                }
            }

            let mates: Vec<&(Read, LinearAlignmentStats)> = [&pair.first, &pair.second].into_iter().flatten().collect();
            let mut pair_alignments = Vec::new();
            for (read, _stats) in &mates {
                let Some(oriented) = orientation.orient(&read.sequence) else {
                    continue;
                };
                let candidates = aligner.align(&oriented);
                if !candidates.is_empty() {
                    pair_alignments.push(AlignedRead { candidates, len: oriented.len() });
                }
            }
            if mates.len() == 2 && pair_alignments.len() < 2 {
                // cross-validation: a pair where only one mate aligned
                // plausibly is dropped rather than analysed as singletons.
                continue;
            }
            out.extend(pair_alignments);
        }
        out
    }

    /// Classifies, refines, and genotypes one repeat variant against every
    /// aligned read, using `stats_acc` for the depth/coverage figures that
    /// gate whether a genotype is attempted at all.
    fn genotype_repeat_variant(
        &self,
        variant: &crate::locus::spec::VariantSpecification,
        aligned: &[AlignedRead],
        stats_acc: &mut LocusStatsAccumulator,
        allele_count: usize,
    ) -> VariantFindings {
        let repeat_node = variant.repeat_node().expect("repeat variant has a repeat node");
        let motif_length = variant.motif_length.unwrap_or(1).max(1);

        let mut spanning: MotifCountTable = MotifCountTable::new();
        let mut flanking: MotifCountTable = MotifCountTable::new();
        let mut inrepeat: MotifCountTable = MotifCountTable::new();
        let mut per_read_has_indel: Vec<(usize, bool)> = Vec::new();

        for read in aligned {
            trace!("locus {}: classifying {} candidate alignments", self.spec.id, read.candidates.len());
            let Some((canonical, label)) = canonical_repeat_alignment(&self.spec.graph, repeat_node, &read.candidates) else {
                continue;
            };
            match label {
                RepeatAlignmentLabel::Unalignable => continue,
                RepeatAlignmentLabel::Spans | RepeatAlignmentLabel::FlanksLeft | RepeatAlignmentLabel::FlanksRight => {
                    stats_acc.add_flank_alignment(read.len);
                }
                _ => {}
            }

            let observed_motifs = canonical
                .path
                .node_ids
                .iter()
                .filter(|&&n| n == repeat_node)
                .count();
            let Some(refined) = str_refiner::refine(&self.spec.graph, canonical, repeat_node, motif_length, observed_motifs) else {
                continue;
            };
            let motif_count = refined.motif_count as i64;
            per_read_has_indel.push((refined.motif_count, refined.indel_count > 0));
            match refined.align_type {
                StrAlignType::Spanning => *spanning.entry(motif_count).or_insert(0) += 1,
                StrAlignType::Flanking => *flanking.entry(motif_count).or_insert(0) += 1,
                StrAlignType::InRepeat => *inrepeat.entry(motif_count).or_insert(0) += 1,
            }
        }

        if str_refiner::indel_driven_filter_applies(&per_read_has_indel) {
            debug!("locus {} variant {}: indel-driven filter triggered, dropping indel-bearing reads", self.spec.id, variant.id);
            inrepeat.clear();
        }

        let (left_flank_len, right_flank_len) = self.spec.flank_len(repeat_node);
        let locus_stats = stats_acc.finish(allele_count, left_flank_len, right_flank_len);

        let mut filter = GenotypeFilter::PASS;
        let genotype = if locus_stats.depth < self.spec.params.min_locus_coverage || locus_stats.mean_read_length == 0.0 {
            filter.set(GenotypeFilter::LOW_DEPTH);
            None
        } else {
            let haploid_depth = locus_stats.depth / allele_count as f64;
            build_genotype(
                motif_length,
                &spanning,
                &flanking,
                allele_count,
                haploid_depth,
                locus_stats.mean_read_length,
                self.spec.params.error_rate,
            )
        };

        VariantFindings::Repeat(RepeatFindings {
            genotype,
            spanning_reads: spanning,
            flanking_reads: flanking,
            inrepeat_reads: inrepeat,
            filter,
        })
    }

    /// Classifies every aligned read against a small variant's ref/alt
    /// node pair and genotypes the ref/alt split directly; coverage is
    /// judged per-breakpoint rather than against the locus-wide depth
    /// figure a repeat variant uses.
    fn genotype_small_variant(
        &self,
        variant: &crate::locus::spec::VariantSpecification,
        aligned: &[AlignedRead],
        allele_count: usize,
    ) -> VariantFindings {
        let first_node = variant.first_node();
        let last_node = variant.last_node();
        let reference_node = variant.reference_node;
        let alt_node = variant.node_ids.iter().find(|&&n| Some(n) != reference_node).copied();

        let mut ref_supporting_reads = 0usize;
        let mut alt_supporting_reads = 0usize;
        let mut upstream_breakpoint_reads = 0usize;
        let mut downstream_breakpoint_reads = 0usize;

        for read in aligned {
            let Some(alignment) = read.candidates.first() else {
                continue;
            };
            let label = classify_small_variant_alignment(alignment, first_node, last_node);
            if matches!(label, SmallVariantAlignmentLabel::Unrelated) {
                continue;
            }
            match label {
                SmallVariantAlignmentLabel::UpstreamFlanking => upstream_breakpoint_reads += 1,
                SmallVariantAlignmentLabel::DownstreamFlanking => downstream_breakpoint_reads += 1,
                _ => {}
            }
            let visits_ref = reference_node.is_some_and(|n| alignment.path.node_ids.contains(&n));
            let visits_alt = alt_node.is_some_and(|n| alignment.path.node_ids.contains(&n));
            match (visits_ref, visits_alt) {
                (true, false) => ref_supporting_reads += 1,
                (false, true) => alt_supporting_reads += 1,
                _ => {}
            }
        }

        let mut filter = GenotypeFilter::PASS;
        let is_haploid = allele_count == 1;
        if !small_variant::breakpoint_passes_depth(
            upstream_breakpoint_reads,
            downstream_breakpoint_reads,
            self.spec.params.min_breakpoint_spanning_reads,
            is_haploid,
        ) {
            filter.set(GenotypeFilter::LOW_DEPTH);
        }

        let total_reads = ref_supporting_reads + alt_supporting_reads;
        let genotype = (total_reads > 0)
            .then(|| small_variant::genotype(ref_supporting_reads, alt_supporting_reads, allele_count, self.spec.params.error_rate));

        // SMN-like paralog loci additionally report a copy-number delta
        // against the expected germline ploidy; no linked baseline locus
        // is threaded through the catalog, so the presence-test call at
        // this locus is compared directly against the expected count.
        let copy_number_delta = if matches!(variant.subtype, VariantSubtype::Smn) && total_reads > 0 {
            let (observed_copy, _posterior) =
                small_variant::presence_test(total_reads, alt_supporting_reads, allele_count, self.spec.params.error_rate);
            copy_number::call_delta(observed_copy, &[BaselineCopyNumber { observed: None, expected: allele_count }])
        } else {
            None
        };

        VariantFindings::SmallVariant(SmallVariantFindings {
            genotype,
            ref_supporting_reads,
            alt_supporting_reads,
            copy_number_delta,
            filter,
        })
    }
}

fn build_genotype(
    motif_length: usize,
    spanning: &MotifCountTable,
    flanking: &MotifCountTable,
    allele_count: usize,
    haploid_depth: f64,
    mean_read_length: f64,
    error_rate: f64,
) -> Option<RepeatGenotype> {
    let (a1, a2) = str_genotyper::estimate_ml_genotype(spanning, flanking, allele_count, haploid_depth, mean_read_length, error_rate)?;
    let flanking_only = spanning.is_empty();
    let total_reads: usize = spanning.values().chain(flanking.values()).sum();
    let p = haploid_depth / mean_read_length.max(1.0);

    let (ci1_low, ci1_high) = str_genotyper::bootstrap_ci(a1, total_reads, p, mean_read_length, flanking_only);
    let alleles = if allele_count == 1 || a1 == a2 {
        vec![Allele { num_motifs: a1, ci_low: ci1_low, ci_high: ci1_high }]
    } else {
        let (ci2_low, ci2_high) = str_genotyper::bootstrap_ci(a2, total_reads, p, mean_read_length, flanking_only);
        vec![
            Allele { num_motifs: a1, ci_low: ci1_low, ci_high: ci1_high },
            Allele { num_motifs: a2, ci_low: ci2_low, ci_high: ci2_high },
        ]
    };

    Some(RepeatGenotype { motif_length, alleles })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Graph, Path};
    use crate::locus::spec::{ChromosomeType, GenotyperParams, VariantSpecification};
    use crate::region::GenomicRegion;
    use std::collections::HashMap as Map;

    fn str_locus_spec() -> LocusSpecification {
        let mut g = Graph::new();
        let left = g.add_node(b"AAAACCCCGGGGTTTTAAAACCCC".to_vec());
        let repeat = g.add_node(b"CAG".to_vec());
        let right = g.add_node(b"TTTTGGGGCCCCAAAATTTTGGGG".to_vec());
        g.add_edge(left, repeat, None).unwrap();
        g.add_edge(repeat, repeat, Some("repeat".to_string())).unwrap();
        g.add_edge(repeat, right, None).unwrap();

        LocusSpecification {
            id: "test_locus".into(),
            chromosome_type: ChromosomeType::Autosome,
            target_regions: vec![GenomicRegion::new(0, 0, 1000).unwrap()],
            offtarget_regions: vec![],
            graph: g,
            node_reference_projection: Map::new(),
            variants: vec![VariantSpecification {
                id: "v1".into(),
                subtype: VariantSubtype::CommonRepeat,
                reference_locus: GenomicRegion::new(0, 400, 420).unwrap(),
                node_ids: vec![1],
                reference_node: None,
                motif_length: Some(3),
            }],
            params: GenotyperParams::default(),
        }
    }

    #[test]
    fn build_genotype_returns_none_without_observations() {
        let spanning = MotifCountTable::new();
        let flanking = MotifCountTable::new();
        assert!(build_genotype(3, &spanning, &flanking, 2, 30.0, 150.0, 0.05).is_none());
    }

    #[test]
    fn analyzer_constructs_from_spec() {
        let spec = str_locus_spec();
        let analyzer = LocusAnalyzer::new(&spec);
        assert_eq!(analyzer.spec.id, "test_locus");
    }

    fn snv_locus_spec() -> (LocusSpecification, usize, usize, usize, usize) {
        let mut g = Graph::new();
        let left = g.add_node(b"AAAA".to_vec());
        let ref_node = g.add_node(b"C".to_vec());
        let alt_node = g.add_node(b"G".to_vec());
        let right = g.add_node(b"TTTT".to_vec());
        g.add_edge(left, ref_node, None).unwrap();
        g.add_edge(left, alt_node, None).unwrap();
        g.add_edge(ref_node, right, None).unwrap();
        g.add_edge(alt_node, right, None).unwrap();

        let spec = LocusSpecification {
            id: "snv_locus".into(),
            chromosome_type: ChromosomeType::Autosome,
            target_regions: vec![GenomicRegion::new(0, 0, 100).unwrap()],
            offtarget_regions: vec![],
            graph: g,
            node_reference_projection: Map::new(),
            variants: vec![VariantSpecification {
                id: "v1".into(),
                subtype: VariantSubtype::Deletion,
                reference_locus: GenomicRegion::new(0, 40, 41).unwrap(),
                node_ids: vec![ref_node, alt_node],
                reference_node: Some(ref_node),
                motif_length: None,
            }],
            params: GenotyperParams::default(),
        };
        (spec, left, ref_node, alt_node, right)
    }

    #[test]
    fn genotype_small_variant_tallies_ref_and_alt_support() {
        let (spec, left, ref_node, alt_node, right) = snv_locus_spec();
        let analyzer = LocusAnalyzer::new(&spec);
        let variant = &spec.variants[0];

        let ref_aln = GraphAlignment {
            path: Path::new(vec![left, ref_node, right], 0, 4).unwrap(),
            operations: Vec::new(),
            score: 0,
        };
        let alt_aln = GraphAlignment {
            path: Path::new(vec![left, alt_node, right], 0, 4).unwrap(),
            operations: Vec::new(),
            score: 0,
        };
        let aligned = vec![
            AlignedRead { candidates: vec![ref_aln.clone()], len: 9 },
            AlignedRead { candidates: vec![ref_aln], len: 9 },
            AlignedRead { candidates: vec![alt_aln.clone()], len: 9 },
            AlignedRead { candidates: vec![alt_aln], len: 9 },
        ];

        let findings = analyzer.genotype_small_variant(variant, &aligned, 2);
        let VariantFindings::SmallVariant(svf) = findings else {
            panic!("expected small-variant findings");
        };
        assert_eq!(svf.ref_supporting_reads, 2);
        assert_eq!(svf.alt_supporting_reads, 2);
        assert!(svf.genotype.is_some());
    }

    #[test]
    fn genotype_small_variant_leaves_bypassing_reads_untallied() {
        let (spec, left, _ref_node, _alt_node, right) = snv_locus_spec();
        let analyzer = LocusAnalyzer::new(&spec);
        let variant = &spec.variants[0];

        // A read that jumps straight from the left flank to the right
        // flank never visits either the ref or alt node, so it shouldn't
        // be counted as support for either allele.
        let bypassing = GraphAlignment {
            path: Path::new(vec![left, right], 0, 4).unwrap(),
            operations: Vec::new(),
            score: 0,
        };
        let aligned = vec![AlignedRead { candidates: vec![bypassing], len: 9 }];

        let findings = analyzer.genotype_small_variant(variant, &aligned, 2);
        let VariantFindings::SmallVariant(svf) = findings else {
            panic!("expected small-variant findings");
        };
        assert_eq!(svf.ref_supporting_reads, 0);
        assert_eq!(svf.alt_supporting_reads, 0);
        assert!(svf.genotype.is_none());
    }
}
