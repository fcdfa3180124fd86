//! STR allele-size likelihood model: given empirical spanning and
//! flanking read-count tables keyed by motif count, searches diploid
//! allele-size candidates for the maximum-likelihood genotype and reports
//! a parametric-bootstrap confidence interval around it.
use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Binomial, Distribution, Poisson};

const D_MAX: i64 = 5;
const BOOTSTRAP_DRAWS: usize = 10_000;
const BOOTSTRAP_SEED: u64 = 42;

#[derive(Debug, Clone, PartialEq)]
pub struct Allele {
    pub num_motifs: i64,
    pub ci_low: i64,
    pub ci_high: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RepeatGenotype {
    pub motif_length: usize,
    /// One entry for a haploid call, two (sorted short <= long) for a
    /// diploid call.
    pub alleles: Vec<Allele>,
}

/// Observed read counts keyed by motif count.
pub type MotifCountTable = HashMap<i64, usize>;

/// The per-haplotype distribution of produced read motif counts, for a
/// haplotype of true size `haplotype_size`, truncated/normalised over
/// `0..=k_max`.
fn molecule_distribution(haplotype_size: i64, k_max: i64, error_rate: f64) -> Vec<f64> {
    let mut probs = Vec::with_capacity((k_max + 1) as usize);
    for k in 0..=k_max {
        let d = (k - haplotype_size).abs().min(D_MAX);
        probs.push(error_rate * (1.0 - error_rate).powi(d as i32));
    }
    let total: f64 = probs.iter().sum();
    if total > 0.0 {
        for p in &mut probs {
            *p /= total;
        }
    }
    probs
}

fn spanning_likelihood(k: i64, a1: i64, a2: i64, dist_a1: &[f64], dist_a2: &[f64], h: f64, read_len: f64) -> f64 {
    let _ = (a1, a2);
    let p_a1 = dist_a1.get(k as usize).copied().unwrap_or(0.0);
    let p_a2 = dist_a2.get(k as usize).copied().unwrap_or(0.0);
    0.5 * (h / read_len) * (p_a1 + p_a2)
}

fn flanking_likelihood(k: i64, dist_a1: &[f64], dist_a2: &[f64], h: f64, read_len: f64) -> f64 {
    let tail = |dist: &[f64]| -> f64 { dist.iter().enumerate().filter(|(i, _)| *i as i64 >= k).map(|(_, p)| p).sum() };
    0.5 * (h / read_len) * (tail(dist_a1) + tail(dist_a2))
}

struct Candidate {
    a1: i64,
    a2: i64,
    log_likelihood: f64,
}

/// Search diploid allele-size candidates and return the maximum-likelihood
/// genotype (no CI attached yet).
pub fn estimate_ml_genotype(
    spanning: &MotifCountTable,
    flanking: &MotifCountTable,
    allele_count: usize,
    haploid_depth: f64,
    mean_read_length: f64,
    error_rate: f64,
) -> Option<(i64, i64)> {
    let mut observed: Vec<i64> = spanning.keys().chain(flanking.keys()).copied().collect();
    if observed.is_empty() {
        return None;
    }
    observed.sort_unstable();
    observed.dedup();
    let lo = (*observed.first().unwrap() - D_MAX).max(0);
    let hi = *observed.last().unwrap() + D_MAX;
    let k_max = hi;

    let candidates: Vec<i64> = (lo..=hi).collect();
    let mut best: Option<Candidate> = None;

    for (i, &a1) in candidates.iter().enumerate() {
        let range: &[i64] = if allele_count == 1 { &candidates[i..=i] } else { &candidates[i..] };
        for &a2 in range {
            let dist_a1 = molecule_distribution(a1, k_max, error_rate);
            let dist_a2 = if a1 == a2 { dist_a1.clone() } else { molecule_distribution(a2, k_max, error_rate) };
            let mut log_likelihood = 0.0;
            for (&k, &count) in spanning {
                let l = spanning_likelihood(k, a1, a2, &dist_a1, &dist_a2, haploid_depth, mean_read_length);
                log_likelihood += (count as f64) * l.max(f64::MIN_POSITIVE).ln();
            }
            for (&k, &count) in flanking {
                let l = flanking_likelihood(k, &dist_a1, &dist_a2, haploid_depth, mean_read_length);
                log_likelihood += (count as f64) * l.max(f64::MIN_POSITIVE).ln();
            }
            if best.as_ref().map_or(true, |b| log_likelihood > b.log_likelihood) {
                best = Some(Candidate { a1, a2, log_likelihood });
            }
        }
    }

    best.map(|c| (c.a1.min(c.a2), c.a1.max(c.a2)))
}

/// Parametric bootstrap CI around `ml_estimate`, modelling in-repeat read
/// counts as `Binomial(ml_estimate, p)` (spanning) or `Poisson(read_count)`
/// (flanking-only), drawing `10000` samples at a fixed seed.
pub fn bootstrap_ci(ml_estimate: i64, read_count: usize, p: f64, read_length: f64, flanking_only: bool) -> (i64, i64) {
    let mut rng = StdRng::seed_from_u64(BOOTSTRAP_SEED);
    let mut offsets: Vec<f64> = Vec::with_capacity(BOOTSTRAP_DRAWS);

    if flanking_only {
        let lambda = (read_count as f64).max(1e-6);
        let dist = Poisson::new(lambda).expect("valid poisson rate");
        for _ in 0..BOOTSTRAP_DRAWS {
            let sample: f64 = dist.sample(&mut rng);
            offsets.push(ml_estimate as f64 - (sample / p.max(1e-9)));
        }
    } else {
        let n = ml_estimate.max(0) as u64;
        let p = p.clamp(1e-9, 1.0 - 1e-9);
        let dist = Binomial::new(n, p).expect("valid binomial parameters");
        for _ in 0..BOOTSTRAP_DRAWS {
            let sample = dist.sample(&mut rng) as f64;
            offsets.push(ml_estimate as f64 - (sample / p));
        }
    }

    offsets.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let lo_idx = ((offsets.len() as f64) * 0.025).floor() as usize;
    let hi_idx = (((offsets.len() as f64) * 0.975).ceil() as usize).min(offsets.len() - 1);
    let ci_low = (ml_estimate as f64 + offsets[lo_idx] + read_length).round() as i64;
    let ci_high = (ml_estimate as f64 + offsets[hi_idx] + read_length).round() as i64;
    (ci_low.min(ci_high), ci_low.max(ci_high))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn homozygous_spanning_evidence_converges_on_the_true_allele() {
        let mut spanning = MotifCountTable::new();
        spanning.insert(17, 40);
        let flanking = MotifCountTable::new();
        let (a1, a2) = estimate_ml_genotype(&spanning, &flanking, 2, 30.0, 150.0, 0.05).unwrap();
        assert_eq!(a1, 17);
        assert_eq!(a2, 17);
    }

    #[test]
    fn heterozygous_spanning_evidence_recovers_both_alleles() {
        let mut spanning = MotifCountTable::new();
        spanning.insert(12, 20);
        spanning.insert(30, 20);
        let flanking = MotifCountTable::new();
        let (a1, a2) = estimate_ml_genotype(&spanning, &flanking, 2, 30.0, 150.0, 0.05).unwrap();
        assert_eq!((a1, a2), (12, 30));
    }

    #[test]
    fn haploid_locus_searches_only_homozygous_candidates() {
        let mut spanning = MotifCountTable::new();
        spanning.insert(9, 25);
        let flanking = MotifCountTable::new();
        let (a1, a2) = estimate_ml_genotype(&spanning, &flanking, 1, 20.0, 150.0, 0.05).unwrap();
        assert_eq!(a1, a2);
    }

    #[test]
    fn bootstrap_ci_brackets_the_ml_estimate() {
        let (lo, hi) = bootstrap_ci(20, 30, 0.9, 150.0, false);
        assert!(lo <= hi);
    }

    #[test]
    fn no_observations_yields_no_estimate() {
        let spanning = MotifCountTable::new();
        let flanking = MotifCountTable::new();
        assert!(estimate_ml_genotype(&spanning, &flanking, 2, 30.0, 150.0, 0.05).is_none());
    }
}
