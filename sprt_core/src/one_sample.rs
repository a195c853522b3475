use serde::{Deserialize, Serialize};

use crate::decision::{BranchState, composite_decision};
use crate::error::SprtResult;
use crate::params::{Alternative, BranchOutcome, CumulativeStat, Decision, TestParams};

#[derive(Clone, Copy, Debug)]
enum Branches {
    OneSided(BranchState),
    TwoSided {
        greater: BranchState,
        less: BranchState,
    },
}

/// Streaming one-sample SPRT.
///
/// Observations arrive one at a time through [`append`](Self::append).
/// Statistics keep accumulating after the test stops, but the decision
/// and the statistics at the moment of stopping are frozen.
#[derive(Clone, Debug)]
pub struct OneSampleSprt {
    params: TestParams,
    stat: CumulativeStat,
    stop_stat: CumulativeStat,
    decision: Decision,
    branches: Branches,
}

/// Frozen view of a finished (or still running) test, for reporting.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct OneSampleSummary {
    pub decision: Decision,
    pub success_count: u64,
    pub sample_size: u64,
    pub stop_success_count: u64,
    pub stop_sample_size: u64,
}

impl OneSampleSprt {
    pub fn new(params: TestParams) -> SprtResult<Self> {
        Self::with_initial(params, 0, 0)
    }

    /// Resume a test from recorded totals. The decision is re-evaluated
    /// only when the next observation arrives.
    pub fn with_initial(
        params: TestParams,
        initial_success_count: u64,
        initial_sample_size: u64,
    ) -> SprtResult<Self> {
        let stat = CumulativeStat::new(initial_success_count, initial_sample_size)?;
        let branches = match params.alternative {
            Alternative::TwoSided => {
                let (greater_pair, less_pair) = params.two_sided_pairs()?;
                Branches::TwoSided {
                    greater: BranchState::new(&greater_pair)?,
                    less: BranchState::new(&less_pair)?,
                }
            }
            _ => Branches::OneSided(BranchState::new(&params.one_sided_pair()?)?),
        };
        Ok(Self {
            params,
            stat,
            stop_stat: stat,
            decision: Decision::Continue,
            branches,
        })
    }

    pub fn append(&mut self, observation: bool) -> Decision {
        self.stat.push(observation);
        if self.decision.is_terminal() {
            return self.decision;
        }
        self.stop_stat = self.stat;
        self.evaluate()
    }

    pub fn append_batch(&mut self, observations: &[bool]) -> Decision {
        for &observation in observations {
            self.append(observation);
        }
        self.decision
    }

    fn evaluate(&mut self) -> Decision {
        let k = self.stat.success_count;
        let n = self.stat.sample_size;
        self.decision = match &mut self.branches {
            Branches::OneSided(branch) => match branch.observe(k, n) {
                BranchOutcome::Continuing => Decision::Continue,
                BranchOutcome::CrossedHigh => Decision::AcceptHigh,
                BranchOutcome::CrossedLow => Decision::AcceptLow,
            },
            Branches::TwoSided { greater, less } => {
                composite_decision(greater.observe(k, n), less.observe(k, n))
            }
        };
        self.decision
    }

    pub fn params(&self) -> &TestParams {
        &self.params
    }

    pub fn decision(&self) -> Decision {
        self.decision
    }

    /// Running statistic, including observations after stopping.
    pub fn stat(&self) -> CumulativeStat {
        self.stat
    }

    /// Statistic at the observation that decided the test.
    pub fn stop_stat(&self) -> CumulativeStat {
        self.stop_stat
    }

    /// Frozen branch outcomes (greater, less) of the two-sided composite;
    /// `None` for a one-sided test.
    pub fn branch_outcomes(&self) -> Option<(BranchOutcome, BranchOutcome)> {
        match &self.branches {
            Branches::OneSided(_) => None,
            Branches::TwoSided { greater, less } => Some((greater.outcome(), less.outcome())),
        }
    }

    pub fn summary(&self) -> OneSampleSummary {
        OneSampleSummary {
            decision: self.decision,
            success_count: self.stat.success_count,
            sample_size: self.stat.sample_size,
            stop_success_count: self.stop_stat.success_count,
            stop_sample_size: self.stop_stat.sample_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn greater_params() -> TestParams {
        TestParams::new(0.1, 0.02, 0.05, 0.2, Alternative::Greater).unwrap()
    }

    fn two_sided_params() -> TestParams {
        TestParams::new(0.1, 0.02, 0.05, 0.2, Alternative::TwoSided).unwrap()
    }

    fn run_stream(sprt: &mut OneSampleSprt, stream: impl Iterator<Item = bool>) -> u64 {
        let mut steps = 0;
        for x in stream {
            steps += 1;
            if sprt.append(x).is_terminal() {
                break;
            }
        }
        steps
    }

    #[test]
    fn test_all_ones_beats_alternating() {
        let mut all_ones = OneSampleSprt::new(greater_params()).unwrap();
        let ones_steps = run_stream(&mut all_ones, std::iter::repeat(true).take(1000));
        assert_eq!(all_ones.decision(), Decision::AcceptHigh);
        assert_eq!(ones_steps, 16);

        let mut alternating = OneSampleSprt::new(greater_params()).unwrap();
        let alt_steps =
            run_stream(&mut alternating, (0..1000).map(|i| i % 2 == 0));
        assert_eq!(alternating.decision(), Decision::AcceptHigh);
        assert_eq!(alt_steps, 35);
        assert!(ones_steps < alt_steps);
    }

    #[test]
    fn test_all_zeros_accepts_low() {
        let mut sprt = OneSampleSprt::new(greater_params()).unwrap();
        let steps = run_stream(&mut sprt, std::iter::repeat(false).take(1000));
        assert_eq!(sprt.decision(), Decision::AcceptLow);
        assert_eq!(steps, 70);
    }

    #[test]
    fn test_statistics_keep_running_after_stop() {
        let mut sprt = OneSampleSprt::new(greater_params()).unwrap();
        for _ in 0..16 {
            sprt.append(true);
        }
        assert_eq!(sprt.decision(), Decision::AcceptHigh);
        let stop = sprt.stop_stat();
        assert_eq!(stop.sample_size, 16);
        assert_eq!(stop.success_count, 16);

        // More data moves the running statistic but not the decision
        // or the stop statistic.
        for _ in 0..10 {
            assert_eq!(sprt.append(false), Decision::AcceptHigh);
        }
        assert_eq!(sprt.stat().sample_size, 26);
        assert_eq!(sprt.stop_stat(), stop);
    }

    #[test]
    fn test_append_batch_matches_single_appends() {
        let stream: Vec<bool> = (0..200).map(|i| i % 3 == 0).collect();
        let mut batched = OneSampleSprt::new(two_sided_params()).unwrap();
        batched.append_batch(&stream);

        let mut single = OneSampleSprt::new(two_sided_params()).unwrap();
        for &x in &stream {
            single.append(x);
        }
        assert_eq!(batched.decision(), single.decision());
        assert_eq!(batched.stop_stat(), single.stop_stat());
        assert_eq!(batched.stat(), single.stat());
    }

    #[test]
    fn test_two_sided_detects_rise() {
        let mut sprt = OneSampleSprt::new(two_sided_params()).unwrap();
        let mut decision = Decision::Continue;
        for _ in 0..100 {
            decision = sprt.append(true);
            if decision.is_terminal() {
                break;
            }
        }
        assert_eq!(decision, Decision::AcceptGreater);
    }

    #[test]
    fn test_two_sided_detects_drop() {
        let mut sprt = OneSampleSprt::new(two_sided_params()).unwrap();
        let mut decision = Decision::Continue;
        for _ in 0..1000 {
            decision = sprt.append(false);
            if decision.is_terminal() {
                break;
            }
        }
        assert_eq!(decision, Decision::AcceptLess);
    }

    #[test]
    fn test_two_sided_null_agreement() {
        // Held exactly at the baseline rate, both branches eventually cross
        // their null-direction boundaries and the composite accepts p = p0.
        let mut sprt = OneSampleSprt::new(two_sided_params()).unwrap();
        let mut decision = Decision::Continue;
        for i in 0..200_000u64 {
            decision = sprt.append(i % 10 == 0);
            if decision.is_terminal() {
                break;
            }
        }
        assert_eq!(decision, Decision::AcceptNull);
        let (greater, less) = sprt.branch_outcomes().unwrap();
        assert_eq!(greater, BranchOutcome::CrossedLow);
        assert_eq!(less, BranchOutcome::CrossedHigh);
    }

    #[test]
    fn test_with_initial_resumes() {
        let mut fresh = OneSampleSprt::new(greater_params()).unwrap();
        for _ in 0..10 {
            fresh.append(true);
        }
        let mut resumed = OneSampleSprt::with_initial(greater_params(), 10, 10).unwrap();
        for _ in 0..6 {
            fresh.append(true);
            resumed.append(true);
        }
        assert_eq!(fresh.decision(), Decision::AcceptHigh);
        assert_eq!(resumed.decision(), Decision::AcceptHigh);
        assert_eq!(fresh.stop_stat(), resumed.stop_stat());
        assert!(OneSampleSprt::with_initial(greater_params(), 5, 3).is_err());
    }
}
