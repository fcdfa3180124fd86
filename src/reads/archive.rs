//! Low-level access to the aligned-read archive (BAM/CRAM).
//!
//! `rust_htslib::bam::IndexedReader` segfaults on drop when reading CRAM
//! (not BAM) files, even in trivial cases. Functions here prefixed
//! `rhtslib_` are copied down from rust_htslib's private internals so the
//! archive can be driven through the raw `htslib` FFI without constructing
//! the struct that misbehaves.
use std::collections::HashMap;
use std::ffi;
use std::path::Path;

use anyhow::{bail, Context, Result};
use rust_htslib::bam::Record;
use rust_htslib::htslib;

use crate::region::{GenomicRegion, ReferenceContigInfo};

pub const LOWERCASE_QUALITY_THRESHOLD: u8 = 20;
const FLAG_SECONDARY: u16 = 0x100;
const FLAG_SUPPLEMENTARY: u16 = 0x800;

pub fn rhtslib_hts_open(path: &[u8], mode: &[u8]) -> Result<*mut htslib::htsFile> {
    let cpath = ffi::CString::new(path)?;
    let cmode = ffi::CString::new(mode)?;
    let ret = unsafe { htslib::hts_open(cpath.as_ptr(), cmode.as_ptr()) };
    if ret.is_null() {
        bail!("unable to open alignment archive");
    }
    Ok(ret)
}

#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub fn rhtslib_set_reference<P: AsRef<Path>>(htsfile: *mut htslib::htsFile, path: P) -> Result<()> {
    unsafe {
        rust_htslib::bam::set_fai_filename(htsfile, path).context("setting CRAM reference file")?;
    }
    Ok(())
}

#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub fn rhtslib_fetch_by_str(
    idx: *mut htslib::hts_idx_t,
    header: *mut htslib::sam_hdr_t,
    region: &[u8],
) -> Result<*mut htslib::hts_itr_t> {
    let rstr = ffi::CString::new(region)?;
    let itr = unsafe { htslib::sam_itr_querys(idx, header, rstr.as_ptr()) };
    if itr.is_null() {
        bail!("problem fetching reads from region '{}'", String::from_utf8_lossy(region));
    }
    Ok(itr)
}

#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub fn rhtslib_itr_next(htsfile: *mut htslib::htsFile, itr: *mut htslib::hts_itr_t, record: *mut htslib::bam1_t) -> i32 {
    unsafe {
        htslib::hts_itr_next(
            (*htsfile).fp.bgzf,
            itr,
            record as *mut ::std::os::raw::c_void,
            htsfile as *mut ::std::os::raw::c_void,
        )
    }
}

pub fn rhtslib_read(htsfile: *mut htslib::htsFile, itr: *mut htslib::hts_itr_t, record: &mut Record) -> Option<Result<()>> {
    match rhtslib_itr_next(htsfile, itr, &mut record.inner as *mut htslib::bam1_t) {
        -1 => None,
        -2 => Some(Err(anyhow::anyhow!("truncated BAM/CRAM record"))),
        -4 => Some(Err(anyhow::anyhow!("invalid BAM/CRAM record"))),
        _ => Some(Ok(())),
    }
}

/// A per-thread handle on the aligned-read archive, opened independently
/// by each worker so URL-backed archives don't race on index downloads.
pub struct ArchiveHandle {
    htsfile: *mut htslib::htsFile,
    idx: *mut htslib::hts_idx_t,
    header: *mut htslib::sam_hdr_t,
    pub contigs: ReferenceContigInfo,
}

unsafe impl Send for ArchiveHandle {}

impl ArchiveHandle {
    pub fn open(path: impl AsRef<Path>, reference_fasta: Option<impl AsRef<Path>>) -> Result<Self> {
        let path_bytes = rust_htslib::utils::path_as_bytes(path.as_ref(), true)?;
        let htsfile = rhtslib_hts_open(&path_bytes, b"r")?;
        if let Some(reference) = reference_fasta {
            rhtslib_set_reference(htsfile, reference)?;
        }
        let header = unsafe { htslib::sam_hdr_read(htsfile) };
        if header.is_null() {
            bail!("failed to read archive header");
        }
        let idx = unsafe {
            htslib::sam_index_load(
                htsfile,
                ffi::CString::new(path_bytes.clone())?.as_ptr(),
            )
        };
        if idx.is_null() {
            bail!("failed to load archive index");
        }
        let contigs = read_contig_list(header)?;
        Ok(ArchiveHandle { htsfile, idx, header, contigs })
    }

    /// Fetch every primary alignment belonging to a read pair (discards
    /// secondary/supplementary records) overlapping `region`.
    pub fn fetch_primary_pairs(&self, region: &GenomicRegion) -> Result<Vec<Record>> {
        let region_str = self.contigs.format_region(region);
        let itr = rhtslib_fetch_by_str(self.idx, self.header, region_str.as_bytes())?;
        let mut records = Vec::new();
        let mut record = Record::new();
        while let Some(res) = rhtslib_read(self.htsfile, itr, &mut record) {
            res?;
            let flag = record.flags();
            if flag & (FLAG_SECONDARY | FLAG_SUPPLEMENTARY) == 0 && flag & 0x1 != 0 {
                records.push(record.clone());
            }
        }
        unsafe { htslib::hts_itr_destroy(itr) };
        Ok(records)
    }

    /// Mate recovery: given a list of missing-mate positions, fetch each
    /// one in turn (batched by region pass is left to the caller), again
    /// skipping secondary/supplementary alignments.
    pub fn fetch_mate(&self, anchor: &GenomicRegion, qname: &str, want_first_in_pair: bool) -> Result<Option<Record>> {
        let records = self.fetch_primary_pairs(anchor)?;
        for record in records {
            let this_qname = String::from_utf8_lossy(record.qname());
            let is_first = record.flags() & 0x40 != 0;
            if this_qname == qname && is_first == want_first_in_pair {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }
}

impl Drop for ArchiveHandle {
    fn drop(&mut self) {
        unsafe {
            if !self.idx.is_null() {
                htslib::hts_idx_destroy(self.idx);
            }
            if !self.header.is_null() {
                htslib::sam_hdr_destroy(self.header);
            }
            if !self.htsfile.is_null() {
                htslib::hts_close(self.htsfile);
            }
        }
    }
}

fn read_contig_list(header: *mut htslib::sam_hdr_t) -> Result<ReferenceContigInfo> {
    let n = unsafe { htslib::sam_hdr_nref(header) };
    let mut names = Vec::with_capacity(n as usize);
    let mut lengths = Vec::with_capacity(n as usize);
    for tid in 0..n {
        let name_ptr = unsafe { htslib::sam_hdr_tid2name(header, tid) };
        let name = unsafe { ffi::CStr::from_ptr(name_ptr) }.to_string_lossy().into_owned();
        let len = unsafe { htslib::sam_hdr_tid2len(header, tid) };
        names.push(name);
        lengths.push(len as u64);
    }
    ReferenceContigInfo::new(names, lengths)
}

/// Convert a raw BAM record's 4-bit packed sequence and Phred+33 quality
/// string into a [`crate::reads::Read`], downcasing low-quality bases.
pub fn record_to_read(record: &Record, is_first_in_pair: bool) -> crate::reads::Read {
    let sequence = record.seq().as_bytes();
    let qualities = record.qual().to_vec();
    crate::reads::Read {
        id: crate::reads::ReadId {
            qname: String::from_utf8_lossy(record.qname()).into_owned(),
            is_first_in_pair,
        },
        sequence,
        qualities,
        mapq: record.mapq(),
    }
    .with_low_quality_bases_downcased(LOWERCASE_QUALITY_THRESHOLD)
}

pub fn record_to_linear_stats(record: &Record, contig_id: i32) -> Result<crate::reads::LinearAlignmentStats> {
    let start = record.pos();
    let end = record.cigar().end_pos();
    Ok(crate::reads::LinearAlignmentStats {
        region: GenomicRegion::new(contig_id, start, end)?,
        mate_contig_id: record.mtid(),
        mate_pos: record.mpos(),
        is_first_in_pair: record.flags() & 0x40 != 0,
    })
}

/// Run the target/off-target collection pass followed by mate recovery
/// for every incomplete pair, as described for the locus analyzer's
/// `collecting_reads` state.
pub fn collect_read_pairs(
    archive: &ArchiveHandle,
    target_regions: &[GenomicRegion],
    offtarget_regions: &[GenomicRegion],
) -> Result<HashMap<String, crate::reads::ReadPair>> {
    let mut pairs: HashMap<String, crate::reads::ReadPair> = HashMap::new();

    for region in target_regions.iter().chain(offtarget_regions.iter()) {
        for record in archive.fetch_primary_pairs(region)? {
            let is_first = record.flags() & 0x40 != 0;
            let read = record_to_read(&record, is_first);
            let stats = record_to_linear_stats(&record, region.contig_id)?;
            pairs.entry(read.id.qname.clone()).or_default().set(is_first, read, stats);
        }
    }

    let recovery_targets: Vec<(String, bool, GenomicRegion)> = pairs
        .iter()
        .filter(|(_, pair)| !pair.is_complete())
        .filter_map(|(qname, pair)| {
            let (_, stats) = pair.known_mate()?;
            if !stats.mate_is_far() {
                // The mate should already have been picked up by the
                // target/off-target region pass; no need to re-fetch it.
                return None;
            }
            Some((qname.clone(), !stats.is_first_in_pair, stats.mate_anchor()))
        })
        .collect();

    for (qname, want_first, anchor) in recovery_targets {
        if let Some(record) = archive.fetch_mate(&anchor, &qname, want_first)? {
            let read = record_to_read(&record, want_first);
            let stats = record_to_linear_stats(&record, anchor.contig_id)?;
            pairs.entry(qname).or_default().set(want_first, read, stats);
        }
    }

    Ok(pairs)
}
