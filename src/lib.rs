//! # repeatgt
//!
//! Genotypes short tandem repeats and small structural variants from
//! paired-end alignments against a sequence-graph locus model.
pub mod align;
pub mod cli;
pub mod concurrency;
pub mod error;
pub mod filters;
pub mod genotyping;
pub mod graph;
pub mod io;
pub mod locus;
pub mod reads;
pub mod region;

use anyhow::{Context, Result};
use log::{debug, info};

use crate::io::reference::ReferenceFasta;
use crate::locus::analyzer::LocusAnalyzer;
use crate::locus::findings::{LocusFindings, SampleFindings};
use crate::locus::spec::LocusSpecification;
use crate::reads::archive::ArchiveHandle;

/// Decode the catalog, then genotype every locus across `num_threads`
/// workers, and write the collected findings as VCF to stdout.
///
/// Reads the catalog up front, hands loci out to a claimed work pool,
/// then emits output once every worker has joined.
pub fn run(
    alignment_path: &str,
    reference_path: Option<&str>,
    catalog_path: &str,
    sample_name: &str,
    sample_is_female: bool,
    num_threads: usize,
) -> Result<()> {
    let probe = ArchiveHandle::open(alignment_path, reference_path)
        .with_context(|| format!("opening alignment archive '{alignment_path}'"))?;
    let contigs = probe.contigs.clone();
    drop(probe);

    let catalog_json = std::fs::read_to_string(catalog_path)
        .with_context(|| format!("reading catalog '{catalog_path}'"))?;
    let loci = io::catalog::decode_catalog(&catalog_json, &contigs)?;
    info!("read {} loci from catalog", loci.len());

    let specs: Vec<LocusSpecification> = loci.into_iter().map(|(_, spec)| spec).collect();

    let results = concurrency::run_claimed(specs.len(), num_threads.max(1), |idx| {
        genotype_one_locus(&specs[idx], alignment_path, reference_path, sample_is_female)
    })?;

    let mut findings = SampleFindings::new(sample_name.to_string(), sample_is_female, num_threads.max(1));
    for (spec, result) in specs.into_iter().zip(results) {
        match result {
            Some(locus_findings) => findings.loci.push((spec, locus_findings)),
            None => debug!("locus {} produced no findings (worker cancelled)", spec.id),
        }
    }

    let reference = reference_path.map(ReferenceFasta::open).transpose()?;
    io::vcf::write(&findings, &contigs, reference.as_ref())?;
    Ok(())
}

fn genotype_one_locus(
    spec: &LocusSpecification,
    alignment_path: &str,
    reference_path: Option<&str>,
    sample_is_female: bool,
) -> Result<LocusFindings> {
    let archive = ArchiveHandle::open(alignment_path, reference_path)
        .with_context(|| format!("opening alignment archive for locus {}", spec.id))?;
    let analyzer = LocusAnalyzer::new(spec);
    analyzer
        .analyze(&archive, sample_is_female)
        .with_context(|| format!("analyzing locus {}", spec.id))
}

/// Open the reference FASTA once up front purely to validate it exists and
/// is indexed, surfacing a clear error before any worker thread starts.
pub fn validate_reference(reference_path: &str) -> Result<()> {
    ReferenceFasta::open(reference_path)?;
    Ok(())
}
