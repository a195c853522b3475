use rand::Rng;
use rand::distr::{Bernoulli, Distribution};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::batch::{
    TwoSidedCarry, evaluate_one_sided, evaluate_two_sample_one_sided,
    evaluate_two_sample_two_sided, evaluate_two_sided,
};
use crate::error::{SprtError, SprtResult};
use crate::params::{Alternative, Decision, TestParams};

/// Source of simulated Bernoulli draws. Injected so the drivers can be
/// fed deterministic data in tests.
pub trait BernoulliSource {
    /// A `trial_count` x `batch_size` matrix of draws at probability `p`.
    fn draw_matrix(
        &mut self,
        p: f64,
        trial_count: usize,
        batch_size: usize,
    ) -> SprtResult<Vec<Vec<bool>>>;
}

/// Default source over any [`rand::Rng`].
pub struct RngSource<R: Rng> {
    rng: R,
}

impl<R: Rng> RngSource<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }
}

impl RngSource<StdRng> {
    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> BernoulliSource for RngSource<R> {
    fn draw_matrix(
        &mut self,
        p: f64,
        trial_count: usize,
        batch_size: usize,
    ) -> SprtResult<Vec<Vec<bool>>> {
        let dist = Bernoulli::new(p)
            .map_err(|_| SprtError::InvalidArgument(format!("probability {p} outside [0, 1]")))?;
        Ok((0..trial_count)
            .map(|_| (0..batch_size).map(|_| dist.sample(&mut self.rng)).collect())
            .collect())
    }
}

/// Terminal results of a one-sample simulation cohort.
#[derive(Clone, Debug)]
pub struct OneSampleRun {
    pub duration: Vec<u64>,
    pub decision: Vec<Decision>,
    pub successes: Vec<u64>,
}

/// Terminal results of a two-sample simulation cohort.
#[derive(Clone, Debug)]
pub struct TwoSampleRun {
    pub duration: Vec<u64>,
    pub decision: Vec<Decision>,
    pub first_successes: Vec<u64>,
    pub second_successes: Vec<u64>,
}

fn check_simulation_args(p: f64, batch_size: usize) -> SprtResult<()> {
    if !(0.0..=1.0).contains(&p) {
        return Err(SprtError::InvalidArgument(format!(
            "true probability {p} outside [0, 1]"
        )));
    }
    if batch_size == 0 {
        return Err(SprtError::InvalidArgument(
            "batch size must be positive".to_string(),
        ));
    }
    Ok(())
}

/// Work queue of still-undecided trials: trial ids plus the per-trial
/// state carried between chunks, kept in parallel vectors.
struct Cohort {
    trials: Vec<usize>,
    carry: TwoSidedCarry,
    curve: Vec<f64>,
    first_totals: Vec<u64>,
    second_totals: Vec<u64>,
}

impl Cohort {
    fn new(trial_count: usize, two_sided: bool) -> Self {
        let carry = if two_sided {
            TwoSidedCarry {
                greater_curve: vec![0.0; trial_count],
                less_curve: vec![0.0; trial_count],
                greater_stop: vec![false; trial_count],
                less_stop: vec![false; trial_count],
            }
        } else {
            TwoSidedCarry::default()
        };
        Self {
            trials: (0..trial_count).collect(),
            carry,
            curve: if two_sided {
                Vec::new()
            } else {
                vec![0.0; trial_count]
            },
            first_totals: vec![0; trial_count],
            second_totals: vec![0; trial_count],
        }
    }

    fn len(&self) -> usize {
        self.trials.len()
    }

    fn is_empty(&self) -> bool {
        self.trials.is_empty()
    }
}

/// Monte Carlo driver for the one-sample test: draws fixed-size chunks
/// and evaluates them until every trial decides (or the optional chunk
/// cap is reached, in which case survivors are returned with `Continue`
/// and their elapsed duration).
pub fn run_one_sample<S: BernoulliSource + ?Sized>(
    source: &mut S,
    p: f64,
    trial_count: usize,
    batch_size: usize,
    params: &TestParams,
    max_chunks: Option<u64>,
) -> SprtResult<OneSampleRun> {
    check_simulation_args(p, batch_size)?;
    let two_sided = params.alternative == Alternative::TwoSided;

    let mut run = OneSampleRun {
        duration: vec![0; trial_count],
        decision: vec![Decision::Continue; trial_count],
        successes: vec![0; trial_count],
    };
    let mut cohort = Cohort::new(trial_count, two_sided);
    let mut elapsed = 0u64;
    let mut chunks = 0u64;

    while !cohort.is_empty() {
        let rows = source.draw_matrix(p, cohort.len(), batch_size)?;
        let (duration, decision, stat, next_carry, next_curve);
        if two_sided {
            let res = evaluate_two_sided(&rows, params, Some(&cohort.carry))?;
            duration = res.duration;
            decision = res.decision;
            stat = res.stat_at_stop;
            next_carry = res.carry;
            next_curve = Vec::new();
        } else {
            let res = evaluate_one_sided(&rows, params, Some(&cohort.curve))?;
            duration = res.duration;
            decision = res.decision;
            stat = res.stat_at_stop;
            next_carry = TwoSidedCarry::default();
            next_curve = res.final_curve;
        }

        let mut next = Cohort::new(0, two_sided);
        for slot in 0..cohort.len() {
            let trial = cohort.trials[slot];
            let totals = cohort.first_totals[slot] + stat[slot];
            if decision[slot].is_terminal() {
                run.duration[trial] = elapsed + duration[slot];
                run.decision[trial] = decision[slot];
                run.successes[trial] = totals;
            } else {
                next.trials.push(trial);
                next.first_totals.push(totals);
                if two_sided {
                    next.carry.greater_curve.push(next_carry.greater_curve[slot]);
                    next.carry.less_curve.push(next_carry.less_curve[slot]);
                    next.carry.greater_stop.push(next_carry.greater_stop[slot]);
                    next.carry.less_stop.push(next_carry.less_stop[slot]);
                } else {
                    next.curve.push(next_curve[slot]);
                }
            }
        }
        cohort = next;
        elapsed += batch_size as u64;
        chunks += 1;

        if let Some(cap) = max_chunks {
            if chunks >= cap && !cohort.is_empty() {
                for slot in 0..cohort.len() {
                    let trial = cohort.trials[slot];
                    run.duration[trial] = elapsed;
                    run.successes[trial] = cohort.first_totals[slot];
                }
                break;
            }
        }
    }
    Ok(run)
}

/// Monte Carlo driver for the two-sample test; both arms are drawn in
/// lockstep and consumed as simultaneous pairs.
pub fn run_two_sample<S: BernoulliSource + ?Sized>(
    source: &mut S,
    p_x: f64,
    p_y: f64,
    trial_count: usize,
    batch_size: usize,
    params: &TestParams,
    max_chunks: Option<u64>,
) -> SprtResult<TwoSampleRun> {
    check_simulation_args(p_x, batch_size)?;
    check_simulation_args(p_y, batch_size)?;
    let two_sided = params.alternative == Alternative::TwoSided;

    let mut run = TwoSampleRun {
        duration: vec![0; trial_count],
        decision: vec![Decision::Continue; trial_count],
        first_successes: vec![0; trial_count],
        second_successes: vec![0; trial_count],
    };
    let mut cohort = Cohort::new(trial_count, two_sided);
    let mut elapsed = 0u64;
    let mut chunks = 0u64;

    while !cohort.is_empty() {
        let x_rows = source.draw_matrix(p_x, cohort.len(), batch_size)?;
        let y_rows = source.draw_matrix(p_y, cohort.len(), batch_size)?;
        let (duration, decision, first_stat, second_stat, next_carry, next_curve);
        if two_sided {
            let res =
                evaluate_two_sample_two_sided(&x_rows, &y_rows, params, Some(&cohort.carry))?;
            duration = res.duration;
            decision = res.decision;
            first_stat = res.first_stat_at_stop;
            second_stat = res.second_stat_at_stop;
            next_carry = res.carry;
            next_curve = Vec::new();
        } else {
            let res =
                evaluate_two_sample_one_sided(&x_rows, &y_rows, params, Some(&cohort.curve))?;
            duration = res.duration;
            decision = res.decision;
            first_stat = res.first_stat_at_stop;
            second_stat = res.second_stat_at_stop;
            next_carry = TwoSidedCarry::default();
            next_curve = res.final_curve;
        }

        let mut next = Cohort::new(0, two_sided);
        for slot in 0..cohort.len() {
            let trial = cohort.trials[slot];
            let first_totals = cohort.first_totals[slot] + first_stat[slot];
            let second_totals = cohort.second_totals[slot] + second_stat[slot];
            if decision[slot].is_terminal() {
                run.duration[trial] = elapsed + duration[slot];
                run.decision[trial] = decision[slot];
                run.first_successes[trial] = first_totals;
                run.second_successes[trial] = second_totals;
            } else {
                next.trials.push(trial);
                next.first_totals.push(first_totals);
                next.second_totals.push(second_totals);
                if two_sided {
                    next.carry.greater_curve.push(next_carry.greater_curve[slot]);
                    next.carry.less_curve.push(next_carry.less_curve[slot]);
                    next.carry.greater_stop.push(next_carry.greater_stop[slot]);
                    next.carry.less_stop.push(next_carry.less_stop[slot]);
                } else {
                    next.curve.push(next_curve[slot]);
                }
            }
        }
        cohort = next;
        elapsed += batch_size as u64;
        chunks += 1;

        if let Some(cap) = max_chunks {
            if chunks >= cap && !cohort.is_empty() {
                for slot in 0..cohort.len() {
                    let trial = cohort.trials[slot];
                    run.duration[trial] = elapsed;
                    run.first_successes[trial] = cohort.first_totals[slot];
                    run.second_successes[trial] = cohort.second_totals[slot];
                }
                break;
            }
        }
    }
    Ok(run)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::one_sample::OneSampleSprt;

    fn greater_params() -> TestParams {
        TestParams::new(0.1, 0.02, 0.05, 0.2, Alternative::Greater).unwrap()
    }

    /// Cycles a fixed pattern, ignoring the requested probability.
    struct PatternSource {
        pattern: Vec<bool>,
        cursor: usize,
    }

    impl BernoulliSource for PatternSource {
        fn draw_matrix(
            &mut self,
            _p: f64,
            trial_count: usize,
            batch_size: usize,
        ) -> SprtResult<Vec<Vec<bool>>> {
            Ok((0..trial_count)
                .map(|_| {
                    (0..batch_size)
                        .map(|_| {
                            let x = self.pattern[self.cursor % self.pattern.len()];
                            self.cursor += 1;
                            x
                        })
                        .collect()
                })
                .collect())
        }
    }

    #[test]
    fn test_driver_duration_matches_incremental_on_stream() {
        // One trial fed a deterministic stream in chunks of 10 must stop
        // at the same step as the incremental machine on the same stream.
        let pattern: Vec<bool> = (0..7).map(|i| i % 2 == 0).collect();
        let mut source = PatternSource {
            pattern: pattern.clone(),
            cursor: 0,
        };
        let run = run_one_sample(&mut source, 0.5, 1, 10, &greater_params(), None).unwrap();

        let mut sprt = OneSampleSprt::new(greater_params()).unwrap();
        let mut steps = 0u64;
        let mut cursor = 0usize;
        while !sprt.decision().is_terminal() {
            steps += 1;
            sprt.append(pattern[cursor % pattern.len()]);
            cursor += 1;
        }
        assert_eq!(run.decision, vec![sprt.decision()]);
        assert_eq!(run.duration, vec![steps]);
        assert_eq!(run.successes, vec![sprt.stop_stat().success_count]);
    }

    #[test]
    fn test_chunk_cap_returns_survivors_as_continue() {
        // An exactly-alternating stream under a tiny effect never leaves
        // the continuation region quickly; cap the run and check the
        // survivors' shape.
        let params = TestParams::new(0.5, 0.001, 0.05, 0.2, Alternative::Greater).unwrap();
        let mut source = PatternSource {
            pattern: vec![true, false],
            cursor: 0,
        };
        let run = run_one_sample(&mut source, 0.5, 3, 50, &params, Some(4)).unwrap();
        for trial in 0..3 {
            assert_eq!(run.decision[trial], Decision::Continue);
            assert_eq!(run.duration[trial], 200);
            assert_eq!(run.successes[trial], 100);
        }
    }

    #[test]
    fn test_one_sample_error_rates_within_budget() {
        // At p = p0 the high-crossing (false positive) rate is bounded by
        // alpha; at p = p0 + d the low-crossing rate is bounded by beta.
        // Loose thresholds keep the seeded run far from flaking.
        let params = greater_params();
        let mut source = RngSource::seeded(1234);
        let trials = 300;
        let run = run_one_sample(&mut source, 0.1, trials, 200, &params, None).unwrap();
        let false_positives = run
            .decision
            .iter()
            .filter(|&&decision| decision == Decision::AcceptHigh)
            .count();
        assert!(
            (false_positives as f64) < 0.15 * trials as f64,
            "{false_positives} false positives in {trials} trials"
        );

        let run = run_one_sample(&mut source, 0.12, trials, 200, &params, None).unwrap();
        let misses = run
            .decision
            .iter()
            .filter(|&&decision| decision == Decision::AcceptLow)
            .count();
        assert!(
            (misses as f64) < 0.3 * trials as f64,
            "{misses} misses in {trials} trials"
        );
    }

    #[test]
    fn test_two_sided_null_rate_near_nominal() {
        // With the truth exactly at the baseline, the composite should
        // accept the null at roughly 1 - alpha; directional outcomes are
        // bounded by alpha. Asserted with wide Monte Carlo slack.
        let params = TestParams::new(0.1, 0.02, 0.05, 0.2, Alternative::TwoSided).unwrap();
        let mut source = RngSource::seeded(99);
        let trials = 200;
        let run = run_one_sample(&mut source, 0.1, trials, 500, &params, None).unwrap();
        let nulls = run
            .decision
            .iter()
            .filter(|&&decision| decision == Decision::AcceptNull)
            .count();
        assert!(
            (nulls as f64) > 0.85 * trials as f64,
            "only {nulls} null acceptances in {trials} trials"
        );
    }

    #[test]
    fn test_two_sample_detects_lift() {
        let mut source = RngSource::seeded(7);
        let trials = 100;
        let run =
            run_two_sample(&mut source, 0.14, 0.1, trials, 500, &greater_params(), None).unwrap();
        let highs = run
            .decision
            .iter()
            .filter(|&&decision| decision == Decision::AcceptHigh)
            .count();
        assert!(highs > trials * 9 / 10, "{highs} high crossings");
        // Per-arm totals track the stopping duration.
        for trial in 0..trials {
            assert!(run.first_successes[trial] <= run.duration[trial]);
            assert!(run.second_successes[trial] <= run.duration[trial]);
        }
    }

    #[test]
    fn test_invalid_probability_rejected() {
        let mut source = RngSource::seeded(1);
        assert!(run_one_sample(&mut source, 1.5, 1, 10, &greater_params(), None).is_err());
        assert!(run_one_sample(&mut source, 0.1, 1, 0, &greater_params(), None).is_err());
    }
}
