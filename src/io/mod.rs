//! External collaborators: variant catalog decoding, reference FASTA
//! access, and VCF output. None of this touches the core analysis
//! pipeline directly; each module hands the core a plain data type
//! (`LocusSpecification`, a nucleotide slice, nothing).
pub mod catalog;
pub mod reference;
pub mod vcf;
