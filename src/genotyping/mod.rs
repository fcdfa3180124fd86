//! Genotyping: STR allele-size likelihood model, small-variant diploid
//! genotyper and presence tester, and the paralog copy-number caller.
pub mod copy_number;
pub mod small_variant;
pub mod str_genotyper;
