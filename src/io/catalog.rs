//! Variant catalog decoding: JSON input plus the `(X)*`/`(X)`/`(X|Y)`
//! structure-string grammar, materialised into a [`LocusSpecification`]
//! list.
//!
//! The structure grammar is simple enough not to need a parser-generator
//! or the `regex` crate: flat text runs become flanking nodes, and each
//! parenthesised segment becomes one or two variant nodes — starred
//! `(X)*` segments get a self-loop (repeat variants), bare `(X)` segments
//! get a single plain node, and branching `(ref|alt)` segments get two
//! sibling nodes, one marked as the reference allele. `decode_catalog`
//! requires every small-variant subtype to use the branching form, since
//! ref/alt read support can't be told apart otherwise.
use std::collections::HashMap;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::error::CoreError;
use crate::graph::Graph;
use crate::locus::spec::{
    ChromosomeType, GenotyperParams, LocusSpecification, VariantSpecification, VariantSubtype, VariantType,
};
use crate::region::{GenomicRegion, ReferenceContigInfo};

#[derive(Debug, Deserialize)]
struct CatalogEntry {
    structure: String,
    reference_regions: Vec<String>,
    target_regions: Vec<String>,
    #[serde(default)]
    offtarget_regions: Vec<String>,
    variant_types: Vec<String>,
    #[serde(default)]
    error_rate: Option<f64>,
    #[serde(default)]
    llr_threshold: Option<f64>,
    #[serde(default)]
    min_locus_coverage: Option<f64>,
}

/// Parse a variant subtype name from the catalog's `variant_types` entries.
fn parse_subtype(name: &str) -> Result<VariantSubtype> {
    match name {
        "common-repeat" => Ok(VariantSubtype::CommonRepeat),
        "rare-repeat" => Ok(VariantSubtype::RareRepeat),
        "deletion" => Ok(VariantSubtype::Deletion),
        "insertion" => Ok(VariantSubtype::Insertion),
        "swap" => Ok(VariantSubtype::Swap),
        "SMN" => Ok(VariantSubtype::Smn),
        other => Err(CoreError::malformed(format!("unknown variant subtype '{other}'"))),
    }
}

/// One bracketed segment of the parsed structure string: which graph
/// node(s) it produced, and which of those (if any) is the reference
/// allele. Starred `(X)*` segments produce a single self-looping repeat
/// node; bare `(X)` segments produce a single node with no reference
/// node of its own; branching `(X|Y)` segments produce two nodes, `X`
/// the reference allele and `Y` the alternate, both reachable from
/// whatever came before and both feeding into whatever comes next.
struct VariantNodeInfo {
    node_ids: Vec<usize>,
    reference_node: Option<usize>,
}

/// Parse the `(X)*`/`(X)`/`(X|Y)` structure grammar into a graph plus the
/// ordered list of variant segments (in the order their brackets appear).
///
/// `tails` tracks every node the next segment must connect from; it holds
/// one node after a flank or a starred/bare segment, and two after a
/// branching segment, so a later flank correctly merges both branches
/// back into a single path.
fn parse_structure(structure: &str) -> Result<(Graph, Vec<VariantNodeInfo>)> {
    let mut graph = Graph::new();
    let mut variant_nodes: Vec<VariantNodeInfo> = Vec::new();
    let mut tails: Vec<usize> = Vec::new();

    let mut chars = structure.chars().peekable();
    let mut plain_buf = String::new();

    let flush_plain = |graph: &mut Graph, tails: &mut Vec<usize>, buf: &mut String| -> Result<()> {
        if buf.is_empty() {
            return Ok(());
        }
        let node_id = graph.add_node(buf.as_bytes().to_vec());
        for &t in tails.iter() {
            graph.add_edge(t, node_id, None)?;
        }
        *tails = vec![node_id];
        buf.clear();
        Ok(())
    };

    while let Some(&c) = chars.peek() {
        match c {
            '(' => {
                flush_plain(&mut graph, &mut tails, &mut plain_buf)?;
                chars.next();
                let mut content = String::new();
                loop {
                    match chars.next() {
                        Some(')') => break,
                        Some(inner) => content.push(inner),
                        None => return Err(CoreError::malformed(format!("unterminated '(' in structure '{structure}'"))),
                    }
                }
                if content.is_empty() {
                    return Err(CoreError::malformed(format!("empty variant segment in structure '{structure}'")));
                }
                let starred = matches!(chars.peek(), Some('*'));
                if starred {
                    chars.next();
                }

                if let Some(bar) = content.find('|') {
                    if starred {
                        return Err(CoreError::malformed(format!(
                            "branching segment '({content})*' in structure '{structure}' cannot carry a repeat star"
                        )));
                    }
                    let ref_part = &content[..bar];
                    let alt_part = &content[bar + 1..];
                    if ref_part.is_empty() || alt_part.is_empty() {
                        return Err(CoreError::malformed(format!(
                            "branching segment '({content})' in structure '{structure}' needs both a ref and alt allele"
                        )));
                    }
                    if alt_part.contains('|') {
                        return Err(CoreError::malformed(format!(
                            "branching segment '({content})' in structure '{structure}' has more than one '|'"
                        )));
                    }
                    let ref_node = graph.add_node(ref_part.as_bytes().to_vec());
                    let alt_node = graph.add_node(alt_part.as_bytes().to_vec());
                    for &t in tails.iter() {
                        graph.add_edge(t, ref_node, None)?;
                        graph.add_edge(t, alt_node, None)?;
                    }
                    tails = vec![ref_node, alt_node];
                    variant_nodes.push(VariantNodeInfo {
                        node_ids: vec![ref_node, alt_node],
                        reference_node: Some(ref_node),
                    });
                } else {
                    let node_id = graph.add_node(content.as_bytes().to_vec());
                    for &t in tails.iter() {
                        graph.add_edge(t, node_id, None)?;
                    }
                    if starred {
                        graph.add_edge(node_id, node_id, Some("repeat".to_string()))?;
                    }
                    tails = vec![node_id];
                    variant_nodes.push(VariantNodeInfo {
                        node_ids: vec![node_id],
                        reference_node: None,
                    });
                }
            }
            _ => {
                plain_buf.push(c);
                chars.next();
            }
        }
    }
    flush_plain(&mut graph, &mut tails, &mut plain_buf)?;

    if variant_nodes.is_empty() {
        return Err(CoreError::malformed(format!("structure '{structure}' declares no variant nodes")));
    }
    Ok((graph, variant_nodes))
}

fn parse_region(s: &str, contigs: &ReferenceContigInfo) -> Result<GenomicRegion> {
    GenomicRegion::parse(s, |name| contigs.contig_id(name)).with_context(|| format!("parsing region '{s}'"))
}

fn chromosome_type(contig_name: &str) -> ChromosomeType {
    let stripped = contig_name.strip_prefix("chr").unwrap_or(contig_name);
    match stripped {
        "X" => ChromosomeType::ChrX,
        "Y" => ChromosomeType::ChrY,
        _ => ChromosomeType::Autosome,
    }
}

/// Decode the catalog JSON text into a list of `(locus_id,
/// LocusSpecification)`, using `contigs` to resolve region contig names.
pub fn decode_catalog(json: &str, contigs: &ReferenceContigInfo) -> Result<Vec<(String, LocusSpecification)>> {
    let raw: HashMap<String, CatalogEntry> = serde_json::from_str(json).context("parsing catalog JSON")?;
    let mut out = Vec::with_capacity(raw.len());

    for (locus_id, entry) in raw {
        let (graph, variant_infos) = parse_structure(&entry.structure)?;
        if entry.variant_types.len() != variant_infos.len() {
            return Err(CoreError::malformed(format!(
                "locus {locus_id}: {} variant_types but {} variant nodes in structure",
                entry.variant_types.len(),
                variant_infos.len()
            )));
        }

        let target_regions = entry
            .target_regions
            .iter()
            .map(|s| parse_region(s, contigs))
            .collect::<Result<Vec<_>>>()?;
        let offtarget_regions = entry
            .offtarget_regions
            .iter()
            .map(|s| parse_region(s, contigs))
            .collect::<Result<Vec<_>>>()?;
        let reference_regions = entry
            .reference_regions
            .iter()
            .map(|s| parse_region(s, contigs))
            .collect::<Result<Vec<_>>>()?;

        let chromosome_type = target_regions
            .first()
            .and_then(|r| contigs.contig_name(r.contig_id))
            .map(chromosome_type)
            .unwrap_or(ChromosomeType::Autosome);

        let mut variants = Vec::with_capacity(variant_infos.len());
        for (i, info) in variant_infos.iter().enumerate() {
            let subtype = parse_subtype(&entry.variant_types[i])?;
            let reference_locus = reference_regions
                .get(i)
                .copied()
                .with_context(|| format!("locus {locus_id}: missing reference_regions[{i}]"))?;
            if subtype.variant_type() == VariantType::SmallVariant && info.reference_node.is_none() {
                return Err(CoreError::malformed(format!(
                    "locus {locus_id}: small-variant segment {i} ('{}') must use a branching '(ref|alt)' structure",
                    entry.variant_types[i]
                )));
            }
            let motif_length = matches!(subtype, VariantSubtype::CommonRepeat | VariantSubtype::RareRepeat)
                .then(|| graph.node_len(info.node_ids[0]));
            variants.push(VariantSpecification {
                id: format!("{locus_id}_{i}"),
                subtype,
                reference_locus,
                node_ids: info.node_ids.clone(),
                reference_node: info.reference_node,
                motif_length,
            });
        }

        let params = GenotyperParams {
            error_rate: entry.error_rate.unwrap_or(0.05),
            min_locus_coverage: entry.min_locus_coverage.unwrap_or(10.0),
            llr_threshold: entry.llr_threshold.unwrap_or(0.69),
            min_breakpoint_spanning_reads: 10,
        };

        let spec = LocusSpecification {
            id: locus_id.clone(),
            chromosome_type,
            target_regions,
            offtarget_regions,
            graph,
            node_reference_projection: HashMap::new(),
            variants,
            params,
        };
        spec.validate()?;
        out.push((locus_id, spec));
    }

    out.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contigs() -> ReferenceContigInfo {
        ReferenceContigInfo::new(vec!["chr1".to_string()], vec![1_000_000]).unwrap()
    }

    #[test]
    fn parses_flank_repeat_flank_structure() {
        let (graph, variants) = parse_structure("AATT(CAG)*TTGG").unwrap();
        assert_eq!(graph.num_nodes(), 3);
        assert_eq!(variants.len(), 1);
        assert_eq!(variants[0].node_ids, vec![1]);
        assert!(variants[0].reference_node.is_none());
        assert!(graph.has_self_loop(1));
        assert_eq!(graph.node_seq(0), b"AATT");
        assert_eq!(graph.node_seq(1), b"CAG");
        assert_eq!(graph.node_seq(2), b"TTGG");
    }

    #[test]
    fn parses_branching_ref_alt_structure() {
        let (graph, variants) = parse_structure("AATT(AAAA|A)TTGG").unwrap();
        assert_eq!(graph.num_nodes(), 4);
        assert_eq!(variants.len(), 1);
        assert_eq!(variants[0].node_ids, vec![1, 2]);
        assert_eq!(variants[0].reference_node, Some(1));
        assert_eq!(graph.node_seq(1), b"AAAA");
        assert_eq!(graph.node_seq(2), b"A");
        // both branches must reach the trailing flank
        assert!(graph.immediate_predecessors_excluding_self(3).contains(&1));
        assert!(graph.immediate_predecessors_excluding_self(3).contains(&2));
    }

    #[test]
    fn rejects_structure_without_any_variant() {
        assert!(parse_structure("AATTGGCC").is_err());
    }

    #[test]
    fn rejects_branching_segment_with_a_repeat_star() {
        assert!(parse_structure("AATT(AAAA|A)*TTGG").is_err());
    }

    #[test]
    fn decode_rejects_small_variant_without_branching_structure() {
        let json = r#"{
            "LOCUS1": {
                "structure": "AATT(AAAA)TTGG",
                "reference_regions": ["chr1:1000-1020"],
                "target_regions": ["chr1:900-1120"],
                "offtarget_regions": [],
                "variant_types": ["deletion"]
            }
        }"#;
        assert!(decode_catalog(json, &contigs()).is_err());
    }

    #[test]
    fn decodes_small_variant_catalog_entry_with_branching_structure() {
        let json = r#"{
            "LOCUS1": {
                "structure": "AATT(AAAA|A)TTGG",
                "reference_regions": ["chr1:1000-1020"],
                "target_regions": ["chr1:900-1120"],
                "offtarget_regions": [],
                "variant_types": ["deletion"]
            }
        }"#;
        let loci = decode_catalog(json, &contigs()).unwrap();
        let (_, spec) = &loci[0];
        assert_eq!(spec.variants[0].node_ids, vec![1, 2]);
        assert_eq!(spec.variants[0].reference_node, Some(1));
        assert_eq!(spec.variants[0].motif_length, None);
    }

    #[test]
    fn decodes_full_catalog_entry() {
        let json = r#"{
            "LOCUS1": {
                "structure": "AATT(CAG)*TTGG",
                "reference_regions": ["chr1:1000-1020"],
                "target_regions": ["chr1:900-1120"],
                "offtarget_regions": [],
                "variant_types": ["common-repeat"]
            }
        }"#;
        let contigs = contigs();
        let loci = decode_catalog(json, &contigs).unwrap();
        assert_eq!(loci.len(), 1);
        let (id, spec) = &loci[0];
        assert_eq!(id, "LOCUS1");
        assert_eq!(spec.variants.len(), 1);
        assert_eq!(spec.variants[0].motif_length, Some(3));
    }
}
