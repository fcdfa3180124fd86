//! Per-locus and per-variant findings, the output of the locus analyzer.
use std::collections::HashMap;

use crate::filters::GenotypeFilter;
use crate::genotyping::small_variant::SmallVariantGenotype;
use crate::genotyping::str_genotyper::RepeatGenotype;

#[derive(Debug, Clone, Copy, Default)]
pub struct LocusStats {
    pub allele_count: usize,
    pub mean_read_length: f64,
    pub median_fragment_length: f64,
    pub depth: f64,
}

/// Read counts broken down by evidence type, keyed by allele size in
/// motif units (repeat variants) or by `{ref, alt}` (small variants).
pub type CountTable = HashMap<i64, usize>;

/// Aggregate operations on a [`CountTable`] shared by the STR genotyper's
/// grid search and the VCF writer's `ADFL`/`ADSP`/`ADIR` emission.
pub trait CountTableExt {
    /// Total reads across every key.
    fn total(&self) -> usize;
    /// Add another table's counts into this one, key by key.
    fn merge(&mut self, other: &CountTable);
    /// Entries sorted by key ascending, for deterministic rendering.
    fn to_sorted_vec(&self) -> Vec<(i64, usize)>;
}

impl CountTableExt for CountTable {
    fn total(&self) -> usize {
        self.values().sum()
    }

    fn merge(&mut self, other: &CountTable) {
        for (&k, &v) in other {
            *self.entry(k).or_insert(0) += v;
        }
    }

    fn to_sorted_vec(&self) -> Vec<(i64, usize)> {
        let mut entries: Vec<(i64, usize)> = self.iter().map(|(&k, &v)| (k, v)).collect();
        entries.sort_unstable_by_key(|(k, _)| *k);
        entries
    }
}

#[derive(Debug, Clone, Default)]
pub struct RepeatFindings {
    pub genotype: Option<RepeatGenotype>,
    pub spanning_reads: CountTable,
    pub flanking_reads: CountTable,
    pub inrepeat_reads: CountTable,
    pub filter: GenotypeFilter,
}

#[derive(Debug, Clone, Default)]
pub struct SmallVariantFindings {
    pub genotype: Option<SmallVariantGenotype>,
    pub ref_supporting_reads: usize,
    pub alt_supporting_reads: usize,
    /// Paralog-adjusted copy-number delta (SMN-like loci only); `None`
    /// for ordinary deletion/insertion/swap variants.
    pub copy_number_delta: Option<i64>,
    pub filter: GenotypeFilter,
}

#[derive(Debug, Clone)]
pub enum VariantFindings {
    Repeat(RepeatFindings),
    SmallVariant(SmallVariantFindings),
}

impl VariantFindings {
    pub fn filter(&self) -> GenotypeFilter {
        match self {
            VariantFindings::Repeat(f) => f.filter,
            VariantFindings::SmallVariant(f) => f.filter,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LocusFindings {
    pub stats: LocusStats,
    pub variants: HashMap<String, VariantFindings>,
}

impl LocusFindings {
    /// The failure path: no reads collected, or zero mean read length.
    /// Produces empty findings with the low-depth filter set on every
    /// variant the locus specification names.
    pub fn empty_with_low_depth(variant_ids: &[String], allele_count: usize) -> Self {
        let mut variants = HashMap::new();
        for id in variant_ids {
            let mut filter = GenotypeFilter::PASS;
            filter.set(GenotypeFilter::LOW_DEPTH);
            variants.insert(
                id.clone(),
                VariantFindings::Repeat(RepeatFindings {
                    filter,
                    ..Default::default()
                }),
            );
        }
        LocusFindings {
            stats: LocusStats {
                allele_count,
                ..Default::default()
            },
            variants,
        }
    }
}

/// Run-wide aggregation: one [`LocusFindings`] per catalog entry, in
/// catalog order, plus the sample metadata the VCF writer's header needs.
#[derive(Debug, Clone)]
pub struct SampleFindings {
    pub sample_name: String,
    pub sample_is_female: bool,
    pub num_threads: usize,
    pub loci: Vec<(crate::locus::spec::LocusSpecification, LocusFindings)>,
}

impl SampleFindings {
    pub fn new(sample_name: String, sample_is_female: bool, num_threads: usize) -> Self {
        SampleFindings {
            sample_name,
            sample_is_female,
            num_threads,
            loci: Vec::new(),
        }
    }
}
