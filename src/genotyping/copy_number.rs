//! Copy-number caller for paralogous loci: compares a target copy number
//! against one or two baseline copy numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BaselineCopyNumber {
    pub observed: Option<usize>,
    pub expected: usize,
}

/// Returns `target - baseline` when the baseline calls agree with each
/// other (or are absent but consistent with the expected baseline), and
/// `None` otherwise ("no call").
pub fn call_delta(target: usize, baselines: &[BaselineCopyNumber]) -> Option<i64> {
    if baselines.is_empty() {
        return None;
    }
    let observed: Vec<usize> = baselines.iter().filter_map(|b| b.observed).collect();

    let consensus = match observed.len() {
        0 => baselines[0].expected,
        1 => observed[0],
        _ => {
            let first = observed[0];
            if observed.iter().all(|&o| o == first) {
                first
            } else {
                return None;
            }
        }
    };

    if observed.is_empty() {
        // no baseline calls at all: only safe if every baseline's expectation
        // agrees with the consensus we fell back to.
        if !baselines.iter().all(|b| b.expected == consensus) {
            return None;
        }
    }

    Some(target as i64 - consensus as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agreeing_baselines_produce_a_delta() {
        let baselines = vec![
            BaselineCopyNumber { observed: Some(2), expected: 2 },
            BaselineCopyNumber { observed: Some(2), expected: 2 },
        ];
        assert_eq!(call_delta(1, &baselines), Some(-1));
    }

    #[test]
    fn disagreeing_baselines_are_no_call() {
        let baselines = vec![
            BaselineCopyNumber { observed: Some(2), expected: 2 },
            BaselineCopyNumber { observed: Some(3), expected: 2 },
        ];
        assert_eq!(call_delta(1, &baselines), None);
    }

    #[test]
    fn missing_baseline_falls_back_to_expected_when_consistent() {
        let baselines = vec![BaselineCopyNumber { observed: None, expected: 2 }];
        assert_eq!(call_delta(1, &baselines), Some(-1));
    }

    #[test]
    fn smn_like_paralog_example() {
        // target CN=1, baseline CNs {2, none}, expected baseline CN=2.
        let baselines = vec![
            BaselineCopyNumber { observed: Some(2), expected: 2 },
            BaselineCopyNumber { observed: None, expected: 2 },
        ];
        assert_eq!(call_delta(1, &baselines), Some(-1));
    }
}
