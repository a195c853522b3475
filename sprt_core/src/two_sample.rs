use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::decision::{BranchState, composite_decision};
use crate::error::{SprtError, SprtResult};
use crate::params::{
    Alternative, Arm, BranchOutcome, CumulativeStat, Decision, HypothesisPair, TestParams,
};

/// Probability that the first arm wins an informative pair, when the
/// per-pair probabilities are p_low (first arm) and p_high (second arm).
/// Wald's reduction of the two-sample problem to a one-sample one.
pub fn transformed_prob(p_low: f64, p_high: f64) -> f64 {
    (1.0 - p_low) * p_high / ((1.0 - p_low) * p_high + p_low * (1.0 - p_high))
}

/// Minimum detectable effect of the paired one-sample problem, which is
/// centred at p0 = 1/2.
pub fn transformed_mde(p_low: f64, p_high: f64) -> f64 {
    (transformed_prob(p_low, p_high) - 0.5).abs()
}

/// Hypothesis pair of the paired one-sample problem for one branch
/// alternative. `alpha` is the budget for that branch (already halved by
/// the caller for the two-sided composite).
pub fn transformed_pair(
    params: &TestParams,
    branch: Alternative,
    alpha: f64,
) -> SprtResult<HypothesisPair> {
    match branch {
        Alternative::Greater => {
            let d_t = transformed_mde(params.p0, params.p0 + params.d);
            Ok(HypothesisPair {
                p_low: 0.5,
                p_high: 0.5 + d_t,
                alpha_low: params.beta,
                alpha_high: alpha,
            })
        }
        Alternative::Less => {
            let d_t = transformed_mde(params.p0 - params.d, params.p0);
            Ok(HypothesisPair {
                p_low: 0.5 - d_t,
                p_high: 0.5,
                alpha_low: alpha,
                alpha_high: params.beta,
            })
        }
        Alternative::TwoSided => Err(SprtError::InvalidArgument(
            "two-sided has no single transformed pair".to_string(),
        )),
    }
}

#[derive(Clone, Copy, Debug)]
enum Branches {
    OneSided(BranchState),
    TwoSided {
        greater: BranchState,
        less: BranchState,
    },
}

/// Streaming two-sample SPRT.
///
/// Arrivals from the two arms are paired in arrival order through a FIFO
/// buffer per arm; at most one buffer is non-empty at any time. A matched
/// pair (x, y) contributes to the paired statistic only when x != y, with
/// success meaning "first arm won the pair". Decision logic is the
/// one-sample machinery at the transformed parameters.
#[derive(Clone, Debug)]
pub struct TwoSampleSprt {
    params: TestParams,
    first: CumulativeStat,
    second: CumulativeStat,
    stop_first: CumulativeStat,
    stop_second: CumulativeStat,
    paired: CumulativeStat,
    first_buf: VecDeque<bool>,
    second_buf: VecDeque<bool>,
    decision: Decision,
    branches: Branches,
}

/// Frozen view of a two-sample test, for reporting.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct TwoSampleSummary {
    pub decision: Decision,
    pub first_success_count: u64,
    pub first_sample_size: u64,
    pub second_success_count: u64,
    pub second_sample_size: u64,
    pub stop_first_success_count: u64,
    pub stop_first_sample_size: u64,
    pub stop_second_success_count: u64,
    pub stop_second_sample_size: u64,
    pub paired_success_count: u64,
    pub paired_sample_size: u64,
}

impl TwoSampleSprt {
    pub fn new(params: TestParams) -> SprtResult<Self> {
        Self::with_initial(
            params,
            CumulativeStat::default(),
            CumulativeStat::default(),
            CumulativeStat::default(),
        )
    }

    /// Resume a test from recorded per-arm and paired totals.
    pub fn with_initial(
        params: TestParams,
        initial_first: CumulativeStat,
        initial_second: CumulativeStat,
        initial_paired: CumulativeStat,
    ) -> SprtResult<Self> {
        let branches = match params.alternative {
            Alternative::TwoSided => {
                let greater_pair =
                    transformed_pair(&params, Alternative::Greater, params.alpha / 2.0)?;
                let less_pair = transformed_pair(&params, Alternative::Less, params.alpha / 2.0)?;
                Branches::TwoSided {
                    greater: BranchState::new(&greater_pair)?,
                    less: BranchState::new(&less_pair)?,
                }
            }
            one_sided => Branches::OneSided(BranchState::new(&transformed_pair(
                &params,
                one_sided,
                params.alpha,
            )?)?),
        };
        Ok(Self {
            params,
            first: initial_first,
            second: initial_second,
            stop_first: initial_first,
            stop_second: initial_second,
            paired: initial_paired,
            first_buf: VecDeque::new(),
            second_buf: VecDeque::new(),
            decision: Decision::Continue,
            branches,
        })
    }

    pub fn append(&mut self, observation: bool, arm: Arm) -> Decision {
        match arm {
            Arm::First => self.first.push(observation),
            Arm::Second => self.second.push(observation),
        }
        if self.decision.is_terminal() {
            return self.decision;
        }
        self.stop_first = self.first;
        self.stop_second = self.second;

        // Match against the oldest unmatched observation from the other
        // arm, or wait for a future partner.
        let matched = match arm {
            Arm::First => match self.second_buf.pop_front() {
                Some(y) => Some((observation, y)),
                None => {
                    self.first_buf.push_back(observation);
                    None
                }
            },
            Arm::Second => match self.first_buf.pop_front() {
                Some(x) => Some((x, observation)),
                None => {
                    self.second_buf.push_back(observation);
                    None
                }
            },
        };
        let Some((x, y)) = matched else {
            return self.decision;
        };

        // Ties carry no information; the paired statistic only moves on
        // discordant pairs.
        if x != y {
            self.paired.push(x && !y);
        }
        self.evaluate()
    }

    /// Append all first-arm values, then all second-arm values, in order.
    pub fn append_lists(&mut self, first_values: &[bool], second_values: &[bool]) -> Decision {
        for &x in first_values {
            self.append(x, Arm::First);
        }
        for &y in second_values {
            self.append(y, Arm::Second);
        }
        self.decision
    }

    fn evaluate(&mut self) -> Decision {
        let k = self.paired.success_count;
        let n = self.paired.sample_size;
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

    pub fn first_stat(&self) -> CumulativeStat {
        self.first
    }

    pub fn second_stat(&self) -> CumulativeStat {
        self.second
    }

    pub fn stop_first_stat(&self) -> CumulativeStat {
        self.stop_first
    }

    pub fn stop_second_stat(&self) -> CumulativeStat {
        self.stop_second
    }

    /// Statistic over the paired (informative) stream.
    pub fn paired_stat(&self) -> CumulativeStat {
        self.paired
    }

    /// Observations awaiting a cross-arm partner, per arm.
    pub fn buffered(&self) -> (usize, usize) {
        (self.first_buf.len(), self.second_buf.len())
    }

    pub fn branch_outcomes(&self) -> Option<(BranchOutcome, BranchOutcome)> {
        match &self.branches {
            Branches::OneSided(_) => None,
            Branches::TwoSided { greater, less } => Some((greater.outcome(), less.outcome())),
        }
    }

    pub fn summary(&self) -> TwoSampleSummary {
        TwoSampleSummary {
            decision: self.decision,
            first_success_count: self.first.success_count,
            first_sample_size: self.first.sample_size,
            second_success_count: self.second.success_count,
            second_sample_size: self.second.sample_size,
            stop_first_success_count: self.stop_first.success_count,
            stop_first_sample_size: self.stop_first.sample_size,
            stop_second_success_count: self.stop_second.success_count,
            stop_second_sample_size: self.stop_second.sample_size,
            paired_success_count: self.paired.success_count,
            paired_sample_size: self.paired.sample_size,
        }
    }
}
