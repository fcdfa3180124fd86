//! Locus and variant specification types, as decoded from the variant
//! catalog by the `io::catalog` collaborator.
use std::collections::HashMap;

use anyhow::{bail, Result};

use crate::error::CoreError;
use crate::graph::Graph;
use crate::region::GenomicRegion;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChromosomeType {
    Autosome,
    ChrX,
    ChrY,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariantType {
    Repeat,
    SmallVariant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariantSubtype {
    CommonRepeat,
    RareRepeat,
    Deletion,
    Insertion,
    Swap,
    Smn,
}

impl VariantSubtype {
    pub fn variant_type(&self) -> VariantType {
        match self {
            VariantSubtype::CommonRepeat | VariantSubtype::RareRepeat => VariantType::Repeat,
            _ => VariantType::SmallVariant,
        }
    }
}

#[derive(Debug, Clone)]
pub struct VariantSpecification {
    pub id: String,
    pub subtype: VariantSubtype,
    pub reference_locus: GenomicRegion,
    /// Contiguous, ordered node ids this variant occupies in the locus
    /// graph.
    pub node_ids: Vec<usize>,
    /// Deletion/insertion/swap/SMN variants designate one node as the
    /// reference allele; repeat variants leave this unset.
    pub reference_node: Option<usize>,
    pub motif_length: Option<usize>,
}

impl VariantSpecification {
    pub fn validate(&self) -> Result<()> {
        if self.node_ids.is_empty() {
            return Err(CoreError::malformed(format!("variant {} has no nodes", self.id)));
        }
        let mut sorted = self.node_ids.clone();
        sorted.sort_unstable();
        let contiguous = sorted.windows(2).all(|w| w[1] == w[0] + 1);
        if !contiguous {
            return Err(CoreError::malformed(format!(
                "variant {} node ids {:?} are not a contiguous range",
                self.id, self.node_ids
            )));
        }
        match self.subtype.variant_type() {
            VariantType::Repeat => {
                if self.node_ids.len() != 1 {
                    return Err(CoreError::malformed(format!(
                        "repeat variant {} must occupy exactly one node, got {}",
                        self.id,
                        self.node_ids.len()
                    )));
                }
            }
            VariantType::SmallVariant => {
                if self.node_ids.len() > 2 {
                    return Err(CoreError::malformed(format!(
                        "small variant {} must occupy one or two nodes, got {}",
                        self.id,
                        self.node_ids.len()
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn first_node(&self) -> usize {
        *self.node_ids.iter().min().unwrap()
    }

    pub fn last_node(&self) -> usize {
        *self.node_ids.iter().max().unwrap()
    }

    pub fn repeat_node(&self) -> Option<usize> {
        match self.subtype.variant_type() {
            VariantType::Repeat => Some(self.node_ids[0]),
            VariantType::SmallVariant => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GenotyperParams {
    pub error_rate: f64,
    pub min_locus_coverage: f64,
    pub llr_threshold: f64,
    pub min_breakpoint_spanning_reads: usize,
}

impl Default for GenotyperParams {
    fn default() -> Self {
        GenotyperParams {
            error_rate: 0.05,
            min_locus_coverage: 10.0,
            llr_threshold: 0.69,
            min_breakpoint_spanning_reads: 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LocusSpecification {
    pub id: String,
    pub chromosome_type: ChromosomeType,
    pub target_regions: Vec<GenomicRegion>,
    pub offtarget_regions: Vec<GenomicRegion>,
    pub graph: Graph,
    /// Which graph nodes correspond to which linear reference region.
    pub node_reference_projection: HashMap<usize, GenomicRegion>,
    pub variants: Vec<VariantSpecification>,
    pub params: GenotyperParams,
}

impl LocusSpecification {
    pub fn validate(&self) -> Result<()> {
        if self.target_regions.is_empty() {
            bail!("locus {} has no target regions", self.id);
        }
        for variant in &self.variants {
            variant.validate()?;
            for &node in &variant.node_ids {
                if node >= self.graph.num_nodes() {
                    return Err(CoreError::malformed(format!(
                        "locus {} variant {} references node {node} outside graph of {} nodes",
                        self.id,
                        variant.id,
                        self.graph.num_nodes()
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn variant(&self, id: &str) -> Option<&VariantSpecification> {
        self.variants.iter().find(|v| v.id == id)
    }

    pub fn flank_len(&self, repeat_node: usize) -> (usize, usize) {
        let left = self
            .graph
            .immediate_predecessors_excluding_self(repeat_node)
            .into_iter()
            .map(|n| self.graph.node_len(n))
            .sum();
        let right = self
            .graph
            .immediate_successors_excluding_self(repeat_node)
            .into_iter()
            .map(|n| self.graph.node_len(n))
            .sum();
        (left, right)
    }
}
