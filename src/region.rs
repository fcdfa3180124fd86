//! # Genomic regions and contig bookkeeping
//!
//! [`GenomicRegion`] is the 0-based half-open interval type used everywhere
//! a linear reference position is needed (target/off-target region lists,
//! mate-recovery lookups, VCF coordinates). [`ReferenceContigInfo`] mirrors
//! an alignment archive header's target list with the bidirectional
//! name<->index lookup, including "chr" prefix normalization.
use std::collections::HashMap;
use std::fmt;

use anyhow::{bail, Context, Result};

/// A 0-based, half-open interval `[start, end)` on a contig.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GenomicRegion {
    pub contig_id: i32,
    pub start: i64,
    pub end: i64,
}

impl GenomicRegion {
    pub fn new(contig_id: i32, start: i64, end: i64) -> Result<Self> {
        if start > end {
            bail!("region start ({start}) must not exceed end ({end})");
        }
        Ok(GenomicRegion {
            contig_id,
            start,
            end,
        })
    }

    pub fn len(&self) -> i64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Whether two regions on the same contig share at least one base.
    pub fn overlaps(&self, other: &GenomicRegion) -> bool {
        self.contig_id == other.contig_id && self.start < other.end && other.start < self.end
    }

    pub fn contains(&self, other: &GenomicRegion) -> bool {
        self.contig_id == other.contig_id && self.start <= other.start && other.end <= self.end
    }

    /// Signed distance between two regions on the same contig: 0 if they
    /// overlap, otherwise the gap between the nearer endpoints. Regions on
    /// different contigs are defined to be `i64::MAX` apart so mate-recovery
    /// distance checks can treat them uniformly.
    pub fn distance(&self, other: &GenomicRegion) -> i64 {
        if self.contig_id != other.contig_id {
            return i64::MAX;
        }
        if self.overlaps(other) {
            return 0;
        }
        if self.end <= other.start {
            other.start - self.end
        } else {
            self.start - other.end
        }
    }

    /// Parse the canonical `contig:start-end` encoding, using `resolver` to
    /// turn a contig name into an id.
    pub fn parse(s: &str, resolver: impl Fn(&str) -> Option<i32>) -> Result<Self> {
        let (name, range) = s
            .rsplit_once(':')
            .with_context(|| format!("region '{s}' is missing a ':'"))?;
        let (start, end) = range
            .split_once('-')
            .with_context(|| format!("region '{s}' is missing a '-' in its range"))?;
        let contig_id = resolver(name)
            .with_context(|| format!("unknown contig '{name}' in region '{s}'"))?;
        let start: i64 = start
            .parse()
            .with_context(|| format!("invalid start in region '{s}'"))?;
        let end: i64 = end
            .parse()
            .with_context(|| format!("invalid end in region '{s}'"))?;
        GenomicRegion::new(contig_id, start, end)
    }
}

/// Display requires a name; use [`ReferenceContigInfo::format_region`] to
/// render a [`GenomicRegion`] with its contig name rather than id.
impl fmt::Display for GenomicRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<contig {}>:{}-{}", self.contig_id, self.start, self.end)
    }
}

/// The ordered contig list from an alignment archive header, with a
/// bidirectional name<->index map. Built once per sample and immutable
/// afterwards.
#[derive(Debug, Clone)]
pub struct ReferenceContigInfo {
    names: Vec<String>,
    lengths: Vec<u64>,
    name_to_id: HashMap<String, i32>,
}

impl ReferenceContigInfo {
    pub fn new(names: Vec<String>, lengths: Vec<u64>) -> Result<Self> {
        if names.len() != lengths.len() {
            bail!(
                "contig name/length count mismatch: {} names, {} lengths",
                names.len(),
                lengths.len()
            );
        }
        let mut name_to_id = HashMap::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            name_to_id.insert(name.clone(), i as i32);
        }
        Ok(ReferenceContigInfo {
            names,
            lengths,
            name_to_id,
        })
    }

    pub fn num_contigs(&self) -> usize {
        self.names.len()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn lengths(&self) -> &[u64] {
        &self.lengths
    }

    pub fn contig_name(&self, id: i32) -> Option<&str> {
        self.names.get(id as usize).map(String::as_str)
    }

    pub fn contig_len(&self, id: i32) -> Option<u64> {
        self.lengths.get(id as usize).copied()
    }

    /// Look up a contig id by name, falling back to the "chr"-stripped or
    /// "chr"-prefixed spelling if the exact name is not present.
    pub fn contig_id(&self, name: &str) -> Option<i32> {
        if let Some(id) = self.name_to_id.get(name) {
            return Some(*id);
        }
        if let Some(stripped) = name.strip_prefix("chr") {
            if let Some(id) = self.name_to_id.get(stripped) {
                return Some(*id);
            }
        } else if let Some(id) = self.name_to_id.get(&format!("chr{name}")) {
            return Some(*id);
        }
        None
    }

    pub fn format_region(&self, region: &GenomicRegion) -> String {
        let name = self.contig_name(region.contig_id).unwrap_or("?");
        format!("{}:{}-{}", name, region.start, region.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlap_requires_same_contig() {
        let a = GenomicRegion::new(0, 10, 20).unwrap();
        let b = GenomicRegion::new(1, 10, 20).unwrap();
        assert!(!a.overlaps(&b));
    }

    #[test]
    fn overlap_half_open() {
        let a = GenomicRegion::new(0, 10, 20).unwrap();
        let b = GenomicRegion::new(0, 20, 30).unwrap();
        assert!(!a.overlaps(&b));
        let c = GenomicRegion::new(0, 19, 30).unwrap();
        assert!(a.overlaps(&c));
    }

    #[test]
    fn distance_across_contigs_is_max() {
        let a = GenomicRegion::new(0, 0, 10).unwrap();
        let b = GenomicRegion::new(6, 2_000_000, 2_000_010).unwrap();
        assert_eq!(a.distance(&b), i64::MAX);
    }

    #[test]
    fn distance_same_contig() {
        let a = GenomicRegion::new(0, 100, 200).unwrap();
        let b = GenomicRegion::new(0, 1300, 1400).unwrap();
        assert_eq!(a.distance(&b), 1100);
        assert_eq!(b.distance(&a), 1100);
    }

    #[test]
    fn contig_lookup_chr_normalization() {
        let info = ReferenceContigInfo::new(
            vec!["chr1".to_string(), "chrX".to_string()],
            vec![1000, 2000],
        )
        .unwrap();
        assert_eq!(info.contig_id("chr1"), Some(0));
        assert_eq!(info.contig_id("1"), Some(0));
        assert_eq!(info.contig_id("X"), Some(1));
        assert_eq!(info.contig_id("chrX"), Some(1));
        assert_eq!(info.contig_id("Y"), None);
    }

    #[test]
    fn region_round_trip() {
        let info =
            ReferenceContigInfo::new(vec!["chr1".to_string()], vec![1000]).unwrap();
        let region = GenomicRegion::new(0, 10, 20).unwrap();
        let encoded = info.format_region(&region);
        assert_eq!(encoded, "chr1:10-20");
        let decoded = GenomicRegion::parse(&encoded, |n| info.contig_id(n)).unwrap();
        assert_eq!(decoded, region);
    }
}
