//! Locus statistics accumulator: empirical read length, fragment length,
//! and coverage depth from alignments landing on a repeat variant's
//! flanks.
use crate::locus::findings::LocusStats;
use crate::locus::spec::ChromosomeType;

#[derive(Debug, Default)]
pub struct LocusStatsAccumulator {
    read_lengths: Vec<usize>,
    fragment_lengths: Vec<i64>,
}

impl LocusStatsAccumulator {
    pub fn new() -> Self {
        LocusStatsAccumulator::default()
    }

    /// Call once per alignment whose path starts on the left- or
    /// right-flank node.
    pub fn add_flank_alignment(&mut self, read_len: usize) {
        self.read_lengths.push(read_len);
    }

    /// Call once per pair whose mates both start on the same flank node.
    /// `fragment_length` is the distance between outer endpoints:
    /// `max(read_end, mate_end) - min(read_start, mate_start)`.
    pub fn add_flank_pair(&mut self, read_start: i64, read_end: i64, mate_start: i64, mate_end: i64) {
        let fragment_length = read_end.max(mate_end) - read_start.min(mate_start);
        self.fragment_lengths.push(fragment_length);
    }

    pub fn read_count(&self) -> usize {
        self.read_lengths.len()
    }

    pub fn mean_read_length(&self) -> f64 {
        if self.read_lengths.is_empty() {
            0.0
        } else {
            self.read_lengths.iter().sum::<usize>() as f64 / self.read_lengths.len() as f64
        }
    }

    pub fn median_fragment_length(&self) -> f64 {
        if self.fragment_lengths.is_empty() {
            return 0.0;
        }
        let mut sorted = self.fragment_lengths.clone();
        sorted.sort_unstable();
        let mid = sorted.len() / 2;
        if sorted.len() % 2 == 0 {
            (sorted[mid - 1] + sorted[mid]) as f64 / 2.0
        } else {
            sorted[mid] as f64
        }
    }

    /// `d = meanReadLength * readCount / (leftFlankLen + rightFlankLen - meanReadLength)`.
    /// `{alleleCount, 0, 0, 0.0}` when no reads were observed.
    pub fn finish(&self, allele_count: usize, left_flank_len: usize, right_flank_len: usize) -> LocusStats {
        if self.read_count() == 0 {
            return LocusStats {
                allele_count,
                mean_read_length: 0.0,
                median_fragment_length: 0.0,
                depth: 0.0,
            };
        }
        let mean_read_length = self.mean_read_length();
        let denominator = (left_flank_len + right_flank_len) as f64 - mean_read_length;
        let depth = if denominator > 0.0 {
            mean_read_length * self.read_count() as f64 / denominator
        } else {
            0.0
        };
        LocusStats {
            allele_count,
            mean_read_length,
            median_fragment_length: self.median_fragment_length(),
            depth,
        }
    }
}

/// Expected allele count from chromosome type and sample sex.
pub fn expected_allele_count(chromosome_type: ChromosomeType, sample_is_female: bool) -> usize {
    match chromosome_type {
        ChromosomeType::ChrY => 1,
        ChromosomeType::ChrX => {
            if sample_is_female {
                2
            } else {
                1
            }
        }
        ChromosomeType::Autosome => 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_reads_yields_zeroed_stats() {
        let acc = LocusStatsAccumulator::new();
        let stats = acc.finish(2, 50, 50);
        assert_eq!(stats.allele_count, 2);
        assert_eq!(stats.mean_read_length, 0.0);
        assert_eq!(stats.depth, 0.0);
    }

    #[test]
    fn depth_formula_matches_spec() {
        let mut acc = LocusStatsAccumulator::new();
        for _ in 0..10 {
            acc.add_flank_alignment(100);
        }
        let stats = acc.finish(2, 60, 60);
        // d = 100*10 / (120-100) = 50
        assert_eq!(stats.depth, 50.0);
    }

    #[test]
    fn fragment_length_uses_outer_endpoints() {
        let mut acc = LocusStatsAccumulator::new();
        acc.add_flank_pair(100, 200, 150, 260);
        assert_eq!(acc.median_fragment_length(), 160.0);
    }

    #[test]
    fn chry_always_haploid() {
        assert_eq!(expected_allele_count(ChromosomeType::ChrY, true), 1);
        assert_eq!(expected_allele_count(ChromosomeType::ChrY, false), 1);
    }

    #[test]
    fn chrx_depends_on_sex() {
        assert_eq!(expected_allele_count(ChromosomeType::ChrX, true), 2);
        assert_eq!(expected_allele_count(ChromosomeType::ChrX, false), 1);
    }
}
