//! Reference FASTA random access via `rust_htslib::faidx`.
use std::path::Path;

use anyhow::{Context, Result};
use rust_htslib::faidx;

use crate::region::GenomicRegion;

pub struct ReferenceFasta {
    reader: faidx::Reader,
}

impl ReferenceFasta {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let reader = faidx::Reader::from_path(path.as_ref())
            .with_context(|| format!("opening reference FASTA at {}", path.as_ref().display()))?;
        Ok(ReferenceFasta { reader })
    }

    /// Fetch `[start, end)` on `contig_name`, upper-cased. Missing `chr`
    /// prefixes are the caller's responsibility to resolve via
    /// [`crate::region::ReferenceContigInfo::contig_name`] before calling.
    pub fn fetch_uppercase(&self, contig_name: &str, region: &GenomicRegion) -> Result<Vec<u8>> {
        let seq = self
            .reader
            .fetch_seq(contig_name, region.start as usize, (region.end - 1).max(region.start) as usize)
            .with_context(|| format!("fetching {contig_name}:{}-{}", region.start, region.end))?;
        Ok(seq.iter().map(|b| b.to_ascii_uppercase()).collect())
    }
}
