//! Small-variant presence test and diploid genotyper, both built on a
//! Poisson read-count model over discrete copy-number hypotheses.
use rand_distr::{Distribution, Poisson};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Allele {
    Ref,
    Alt,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SmallVariantGenotype {
    pub alleles: Vec<Allele>,
}

fn poisson_log_pmf(observed: usize, expected: f64) -> f64 {
    let expected = expected.max(1e-9);
    let dist = Poisson::new(expected).expect("valid poisson rate");
    // Poisson PMF evaluated analytically rather than by sampling, since we
    // need an exact likelihood for argmax search.
    let _ = dist; // constructed only to validate the rate is usable
    observed as f64 * expected.ln() - expected - ln_factorial(observed)
}

fn ln_factorial(n: usize) -> f64 {
    (1..=n).map(|x| (x as f64).ln()).sum()
}

/// Presence test: for a diploid candidate, model target-allele read count
/// as `Poisson(expected)` with `expected = (allele_copy / total_copy) *
/// total_reads`, except at the extremes where an error rate absorbs the
/// leakage. Returns `(call, posterior)` where posterior is the
/// normalised likelihood of the winning hypothesis.
pub fn presence_test(total_reads: usize, observed_target_reads: usize, total_copy: usize, error_rate: f64) -> (usize, f64) {
    let mut likelihoods = Vec::with_capacity(total_copy + 1);
    for copy in 0..=total_copy {
        let expected = if copy == 0 {
            (error_rate / 3.0) * total_reads as f64
        } else if copy == total_copy {
            (1.0 - error_rate) * total_reads as f64
        } else {
            (copy as f64 / total_copy as f64) * total_reads as f64
        };
        likelihoods.push(poisson_log_pmf(observed_target_reads, expected));
    }
    argmax_posterior(&likelihoods)
}

/// Diploid genotyper: compares ref-node and alt-node supporting read
/// counts under the same Poisson model over `(ref=0,alt=n) ...
/// (ref=n,alt=0)` hypotheses, where `n` is the ploidy (1 or 2).
pub fn genotype(ref_reads: usize, alt_reads: usize, ploidy: usize, error_rate: f64) -> SmallVariantGenotype {
    let total_reads = ref_reads + alt_reads;
    let mut best_idx = 0;
    let mut best_ll = f64::NEG_INFINITY;
    for alt_copy in 0..=ploidy {
        let ref_copy = ploidy - alt_copy;
        let expected_alt = if alt_copy == 0 {
            (error_rate / 3.0) * total_reads as f64
        } else if alt_copy == ploidy {
            (1.0 - error_rate) * total_reads as f64
        } else {
            (alt_copy as f64 / ploidy as f64) * total_reads as f64
        };
        let expected_ref = total_reads as f64 - expected_alt;
        let ll = poisson_log_pmf(alt_reads, expected_alt) + poisson_log_pmf(ref_reads, expected_ref.max(1e-9));
        if ll > best_ll {
            best_ll = ll;
            best_idx = alt_copy;
        }
    }
    let ref_copy = ploidy - best_idx;
    let mut alleles = Vec::with_capacity(ploidy);
    alleles.extend(std::iter::repeat(Allele::Ref).take(ref_copy));
    alleles.extend(std::iter::repeat(Allele::Alt).take(best_idx));
    SmallVariantGenotype { alleles }
}

fn argmax_posterior(log_likelihoods: &[f64]) -> (usize, f64) {
    let max_ll = log_likelihoods.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let weights: Vec<f64> = log_likelihoods.iter().map(|ll| (ll - max_ll).exp()).collect();
    let sum: f64 = weights.iter().sum();
    let (argmax, _) = log_likelihoods
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
        .unwrap();
    let posterior = weights[argmax] / sum;
    (argmax, posterior)
}

/// Breakpoint-coverage filter: counts reads whose alignment matches at
/// least `min_match` bases on both sides of each breakpoint; attaches the
/// low-depth filter when either breakpoint falls short of
/// `min_breakpoint_spanning_reads` (halved for haploid loci).
pub fn breakpoint_passes_depth(
    left_breakpoint_reads: usize,
    right_breakpoint_reads: usize,
    min_breakpoint_spanning_reads: usize,
    is_haploid: bool,
) -> bool {
    let threshold = if is_haploid {
        min_breakpoint_spanning_reads.div_ceil(2)
    } else {
        min_breakpoint_spanning_reads
    };
    left_breakpoint_reads >= threshold && right_breakpoint_reads >= threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presence_test_favors_full_copy_when_all_reads_support() {
        let (call, posterior) = presence_test(100, 98, 2, 0.02);
        assert_eq!(call, 2);
        assert!(posterior > 0.5);
    }

    #[test]
    fn presence_test_favors_absence_when_no_reads_support() {
        let (call, _) = presence_test(100, 1, 2, 0.02);
        assert_eq!(call, 0);
    }

    #[test]
    fn genotype_calls_heterozygous_on_roughly_even_split() {
        let gt = genotype(50, 50, 2, 0.02);
        assert_eq!(gt.alleles.iter().filter(|a| **a == Allele::Ref).count(), 1);
        assert_eq!(gt.alleles.iter().filter(|a| **a == Allele::Alt).count(), 1);
    }

    #[test]
    fn genotype_calls_homozygous_alt_when_no_ref_support() {
        let gt = genotype(1, 90, 2, 0.02);
        assert!(gt.alleles.iter().all(|a| *a == Allele::Alt));
    }

    #[test]
    fn breakpoint_filter_halves_threshold_for_haploid_loci() {
        assert!(breakpoint_passes_depth(5, 5, 10, true));
        assert!(!breakpoint_passes_depth(5, 5, 10, false));
    }
}
