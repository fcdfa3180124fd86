//! VCF output: one record per emitted variant, written in `(contig_index,
//! start, end)` order after every worker has joined.
use anyhow::{Context, Result};
use rust_htslib::bcf::record::GenotypeAllele;
use rust_htslib::bcf::{Format, Header, Writer};

use crate::genotyping::str_genotyper::RepeatGenotype;
use crate::io::reference::ReferenceFasta;
use crate::locus::findings::{CountTable, CountTableExt, SampleFindings, VariantFindings};
use crate::locus::spec::{LocusSpecification, VariantSubtype};
use crate::region::{GenomicRegion, ReferenceContigInfo};

/// Always-present header lines. See [`VCF_REPEAT_INFO_LINES`],
/// [`VCF_REPEAT_FORMAT_LINES`] and [`VCF_SMN_FORMAT_LINES`] for the
/// per-variant-kind additions.
const VCF_CORE_INFO_LINES: &[&[u8]] = &[
    br#"##INFO=<ID=VARID,Number=1,Type=String,Description="Variant identifier">"#,
];

const VCF_CORE_FORMAT_LINES: &[&[u8]] = &[
    br#"##FORMAT=<ID=GT,Number=1,Type=String,Description="Genotype">"#,
    br#"##FORMAT=<ID=LC,Number=1,Type=Float,Description="Locus coverage depth estimate">"#,
];

const VCF_CORE_FILTER_LINES: &[&[u8]] = &[
    br#"##FILTER=<ID=PASS,Description="All filters passed">"#,
    br#"##FILTER=<ID=LowDepth,Description="Locus coverage was below the configured minimum">"#,
];

const VCF_REPEAT_INFO_LINES: &[&[u8]] = &[
    br#"##INFO=<ID=SVTYPE,Number=1,Type=String,Description="Type of structural variant">"#,
    br#"##INFO=<ID=END,Number=1,Type=Integer,Description="End position of the repeat region">"#,
    br#"##INFO=<ID=REF,Number=1,Type=Integer,Description="Reference allele size in motif units">"#,
    br#"##INFO=<ID=RL,Number=1,Type=Integer,Description="Reference region length">"#,
    br#"##INFO=<ID=RU,Number=1,Type=String,Description="Repeat unit">"#,
    br#"##INFO=<ID=REPID,Number=1,Type=String,Description="Repeat identifier">"#,
];

const VCF_REPEAT_FORMAT_LINES: &[&[u8]] = &[
    br#"##FORMAT=<ID=SO,Number=1,Type=String,Description="Type of reads that support the repeat genotype">"#,
    br#"##FORMAT=<ID=REPCN,Number=1,Type=String,Description="Genotyped allele sizes in motif units">"#,
    br#"##FORMAT=<ID=REPCI,Number=1,Type=String,Description="Confidence interval for REPCN">"#,
    br#"##FORMAT=<ID=ADFL,Number=1,Type=String,Description="Number of flanking reads consistent with each allele">"#,
    br#"##FORMAT=<ID=ADSP,Number=1,Type=String,Description="Number of spanning reads consistent with each allele">"#,
    br#"##FORMAT=<ID=ADIR,Number=1,Type=String,Description="Number of in-repeat reads consistent with each allele">"#,
];

const VCF_SMN_FORMAT_LINES: &[&[u8]] = &[
    br#"##FORMAT=<ID=AD,Number=2,Type=Integer,Description="Reference and alternate supporting read counts">"#,
    br#"##FORMAT=<ID=DST,Number=1,Type=Integer,Description="Distance to the nearest paralogous baseline locus">"#,
    br#"##FORMAT=<ID=RPL,Number=1,Type=Integer,Description="Reported paralog-adjusted copy number">"#,
];

fn make_header(contigs: &ReferenceContigInfo, sample_name: &str) -> Header {
    let mut header = Header::new();
    for (name, len) in contigs.names().iter().zip(contigs.lengths()) {
        header.push_record(format!(r#"##contig=<ID={name},length={len}>"#).as_bytes());
    }
    for line in VCF_CORE_INFO_LINES.iter().chain(VCF_REPEAT_INFO_LINES) {
        header.push_record(line);
    }
    for line in VCF_CORE_FORMAT_LINES
        .iter()
        .chain(VCF_REPEAT_FORMAT_LINES)
        .chain(VCF_SMN_FORMAT_LINES)
    {
        header.push_record(line);
    }
    for line in VCF_CORE_FILTER_LINES {
        header.push_record(line);
    }
    header.push_sample(sample_name.as_bytes());
    header
}

/// Fetch the true reference allele for a repeat region; falls back to `.`
/// when no reference FASTA was given rather than failing the run.
fn fetch_ref_allele(reference: Option<&ReferenceFasta>, contigs: &ReferenceContigInfo, region: &GenomicRegion) -> Result<Vec<u8>> {
    match reference {
        Some(fasta) => {
            let contig_name = contigs
                .contig_name(region.contig_id)
                .with_context(|| format!("unknown contig id {}", region.contig_id))?;
            fasta.fetch_uppercase(contig_name, region)
        }
        None => Ok(b".".to_vec()),
    }
}

fn render_table(table: &CountTable) -> String {
    table.to_sorted_vec().iter().map(|(k, v)| format!("{k}:{v}")).collect::<Vec<_>>().join(",")
}

fn repeat_alt_symbol(genotype: &RepeatGenotype, ref_size: i64) -> String {
    let distinct: Vec<i64> = genotype
        .alleles
        .iter()
        .map(|a| a.num_motifs)
        .filter(|&n| n != ref_size)
        .collect();
    if distinct.is_empty() {
        ".".to_string()
    } else {
        distinct.iter().map(|n| format!("<STR{n}>")).collect::<Vec<_>>().join(",")
    }
}

/// Write every locus's findings to an uncompressed VCF on stdout, sorted
/// by `(contig_index, start, end)` of each variant's reference locus.
///
/// `reference` is used to fetch the true reference allele for repeat
/// variants; when no reference FASTA was given the REF column falls back
/// to `.` rather than failing the whole run.
pub fn write(sample_findings: &SampleFindings, contigs: &ReferenceContigInfo, reference: Option<&ReferenceFasta>) -> Result<()> {
    let header = make_header(contigs, &sample_findings.sample_name);
    let mut writer = Writer::from_stdout(&header, true, Format::Vcf).context("opening VCF writer on stdout")?;

    let mut rows: Vec<(&LocusSpecification, &VariantSubtype, &str, &VariantFindings, f64)> = Vec::new();
    for (spec, findings) in &sample_findings.loci {
        for variant in &spec.variants {
            if let Some(vf) = findings.variants.get(&variant.id) {
                rows.push((spec, &variant.subtype, &variant.id, vf, findings.stats.depth));
            }
        }
    }
    rows.sort_by_key(|(spec, _, variant_id, _, _)| {
        let region = spec.variants.iter().find(|v| &v.id == variant_id).unwrap().reference_locus;
        (region.contig_id, region.start, region.end)
    });

    for (spec, subtype, variant_id, findings, depth) in rows {
        let variant = spec.variant(variant_id).expect("variant present in spec");
        let region = variant.reference_locus;
        let rid = writer
            .header()
            .name2rid(contigs.contig_name(region.contig_id).unwrap_or("").as_bytes())
            .with_context(|| format!("unknown contig id {}", region.contig_id))?;

        let mut record = writer.empty_record();
        record.set_rid(Some(rid));
        record.set_pos((region.start - 1).max(0));
        record.push_info_string(b"VARID", &[variant_id.as_bytes()])?;
        record.push_format_float(b"LC", &[depth as f32])?;

        match findings {
            VariantFindings::Repeat(rf) => {
                let ref_size = variant.motif_length.unwrap_or(0) as i64;
                record.push_info_string(b"SVTYPE", &[b"STR"])?;
                record.push_info_integer(b"END", &[region.end as i32])?;
                record.push_info_integer(b"REF", &[ref_size as i32])?;
                record.push_info_integer(b"RL", &[(region.end - region.start) as i32])?;
                record.push_info_string(b"REPID", &[variant_id.as_bytes()])?;

                let alleles = match &rf.genotype {
                    Some(g) => {
                        let ref_allele = fetch_ref_allele(reference, contigs, &region)?;
                        let alt = repeat_alt_symbol(g, ref_size);
                        vec![ref_allele, alt.into_bytes()]
                    }
                    None => vec![b".".to_vec(), b".".to_vec()],
                };
                let allele_refs: Vec<&[u8]> = alleles.iter().map(Vec::as_slice).collect();
                record.set_alleles(&allele_refs)?;

                let gt = match &rf.genotype {
                    Some(g) if g.alleles.len() == 2 => {
                        vec![GenotypeAllele::Unphased(1), GenotypeAllele::Unphased(1)]
                    }
                    Some(_) => vec![GenotypeAllele::Unphased(1)],
                    None => vec![GenotypeAllele::UnphasedMissing],
                };
                record.push_genotypes(&gt)?;

                let repcn = rf
                    .genotype
                    .as_ref()
                    .map(|g| g.alleles.iter().map(|a| a.num_motifs.to_string()).collect::<Vec<_>>().join("/"))
                    .unwrap_or_else(|| ".".to_string());
                record.push_format_string(b"REPCN", &[repcn.as_bytes()])?;

                let repci = rf
                    .genotype
                    .as_ref()
                    .map(|g| {
                        g.alleles
                            .iter()
                            .map(|a| format!("{}-{}", a.ci_low, a.ci_high))
                            .collect::<Vec<_>>()
                            .join("/")
                    })
                    .unwrap_or_else(|| ".".to_string());
                record.push_format_string(b"REPCI", &[repci.as_bytes()])?;

                record.push_format_string(b"ADFL", &[render_table(&rf.flanking_reads).as_bytes()])?;
                record.push_format_string(b"ADSP", &[render_table(&rf.spanning_reads).as_bytes()])?;
                record.push_format_string(b"ADIR", &[render_table(&rf.inrepeat_reads).as_bytes()])?;
                record.push_format_string(b"SO", &[if rf.spanning_reads.is_empty() { b"FLANKING".as_slice() } else { b"SPANNING".as_slice() }])?;
            }
            VariantFindings::SmallVariant(svf) => {
                record.set_alleles(&[b".", b"."])?;
                let gt = match &svf.genotype {
                    Some(g) if g.alleles.len() == 2 => vec![GenotypeAllele::Unphased(0), GenotypeAllele::Unphased(1)],
                    Some(_) => vec![GenotypeAllele::Unphased(0)],
                    None => vec![GenotypeAllele::UnphasedMissing],
                };
                record.push_genotypes(&gt)?;
                record.push_format_integer(b"AD", &[svf.ref_supporting_reads as i32, svf.alt_supporting_reads as i32])?;
                if matches!(subtype, VariantSubtype::Smn) {
                    // No baseline-locus distance is threaded through the catalog yet, so DST stays 0.
                    record.push_format_integer(b"DST", &[0])?;
                    record.push_format_integer(b"RPL", &[svf.copy_number_delta.unwrap_or(0) as i32])?;
                }
            }
        }

        let filter_name = findings.filter().to_string();
        let filter_id = writer.header().name_to_id(filter_name.as_bytes())?;
        record.set_filters(&[&filter_id])?;

        writer.write(&record)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genotyping::str_genotyper::Allele;

    #[test]
    fn repeat_alt_symbol_is_dot_when_homozygous_reference_sized() {
        let gt = RepeatGenotype {
            motif_length: 3,
            alleles: vec![
                Allele { num_motifs: 17, ci_low: 16, ci_high: 18 },
                Allele { num_motifs: 17, ci_low: 16, ci_high: 18 },
            ],
        };
        assert_eq!(repeat_alt_symbol(&gt, 17), ".");
    }

    #[test]
    fn repeat_alt_symbol_lists_distinct_expansions() {
        let gt = RepeatGenotype {
            motif_length: 3,
            alleles: vec![
                Allele { num_motifs: 17, ci_low: 16, ci_high: 18 },
                Allele { num_motifs: 40, ci_low: 38, ci_high: 42 },
            ],
        };
        assert_eq!(repeat_alt_symbol(&gt, 17), "<STR40>");
    }
}
