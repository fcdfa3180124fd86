//! # Genotype quality filter bitset
//!
//! `GenotypeFilter` tracks why a locus's findings might not be trustworthy.
//! Represented as a small bitset (rather than a `Vec<Enum>`) so it composes
//! cheaply across the many small checks that each may or may not set a bit.
use std::fmt;

/// One bit per filter reason. `PASS` is the empty set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GenotypeFilter(u8);

impl GenotypeFilter {
    pub const PASS: GenotypeFilter = GenotypeFilter(0);
    /// Coverage at the locus (or at a breakpoint) was below the configured
    /// minimum.
    pub const LOW_DEPTH: GenotypeFilter = GenotypeFilter(1 << 0);

    pub fn set(&mut self, bit: GenotypeFilter) {
        self.0 |= bit.0;
    }

    pub fn contains(&self, bit: GenotypeFilter) -> bool {
        self.0 & bit.0 == bit.0
    }

    pub fn is_pass(&self) -> bool {
        self.0 == 0
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.contains(GenotypeFilter::LOW_DEPTH) {
            names.push("LowDepth");
        }
        names
    }
}

impl fmt::Display for GenotypeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_pass() {
            write!(f, "PASS")
        } else {
            write!(f, "{}", self.names().join(";"))
        }
    }
}
