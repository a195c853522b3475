use itertools::izip;

use crate::decision::{BranchState, composite_decision};
use crate::error::{SprtError, SprtResult};
use crate::params::{Alternative, BranchOutcome, Decision, TestParams};
use crate::two_sample::transformed_pair;

/// Per-trial results of a one-sided batch evaluation.
///
/// `duration` is the first step (1-based) at which a boundary was
/// crossed, or the row length when no crossing happened within the
/// chunk; a `Continue` decision marks the latter. `final_curve` is the
/// curve value at the END of the chunk (not at the stopping step), so a
/// caller can feed it back as `initial_curve` to resume with more data.
#[derive(Clone, Debug, Default)]
pub struct OneSidedBatch {
    pub duration: Vec<u64>,
    pub decision: Vec<Decision>,
    pub stat_at_stop: Vec<u64>,
    pub final_curve: Vec<f64>,
}

/// Branch state carried across chunk boundaries of a two-sided
/// evaluation: per-trial curve offsets and per-branch stop flags.
#[derive(Clone, Debug, Default)]
pub struct TwoSidedCarry {
    pub greater_curve: Vec<f64>,
    pub less_curve: Vec<f64>,
    pub greater_stop: Vec<bool>,
    pub less_stop: Vec<bool>,
}

/// Per-trial results of a two-sided composite batch evaluation.
#[derive(Clone, Debug, Default)]
pub struct TwoSidedBatch {
    pub duration: Vec<u64>,
    pub decision: Vec<Decision>,
    pub stat_at_stop: Vec<u64>,
    pub carry: TwoSidedCarry,
}

/// Per-trial results of a two-sample one-sided batch evaluation.
/// Durations count raw pairs; the curve runs on the informative subset.
#[derive(Clone, Debug, Default)]
pub struct TwoSampleOneSidedBatch {
    pub duration: Vec<u64>,
    pub decision: Vec<Decision>,
    pub first_stat_at_stop: Vec<u64>,
    pub second_stat_at_stop: Vec<u64>,
    pub final_curve: Vec<f64>,
}

/// Per-trial results of a two-sample two-sided batch evaluation.
#[derive(Clone, Debug, Default)]
pub struct TwoSampleTwoSidedBatch {
    pub duration: Vec<u64>,
    pub decision: Vec<Decision>,
    pub first_stat_at_stop: Vec<u64>,
    pub second_stat_at_stop: Vec<u64>,
    pub carry: TwoSidedCarry,
}

fn check_carry_len(name: &str, len: usize, trials: usize) -> SprtResult<()> {
    if len != trials {
        return Err(SprtError::InvalidArgument(format!(
            "{name} has {len} entries for {trials} trials"
        )));
    }
    Ok(())
}

fn one_sided_decision(outcome: BranchOutcome) -> Decision {
    match outcome {
        BranchOutcome::Continuing => Decision::Continue,
        BranchOutcome::CrossedHigh => Decision::AcceptHigh,
        BranchOutcome::CrossedLow => Decision::AcceptLow,
    }
}

/// A still-running composite can only have stopped a branch on its
/// null-direction boundary, so a carried stop flag pins that outcome.
fn carried_outcome(stopped: bool, null_direction: BranchOutcome) -> BranchOutcome {
    if stopped {
        null_direction
    } else {
        BranchOutcome::Continuing
    }
}

/// Evaluate many independent one-sided trials over one chunk of raw
/// Bernoulli draws (one row per trial). The first strict boundary
/// crossing stops a trial; a high crossing takes priority if both
/// boundaries would first be crossed at the same step.
pub fn evaluate_one_sided(
    rows: &[Vec<bool>],
    params: &TestParams,
    initial_curve: Option<&[f64]>,
) -> SprtResult<OneSidedBatch> {
    let pair = params.one_sided_pair()?;
    if let Some(curves) = initial_curve {
        check_carry_len("initial_curve", curves.len(), rows.len())?;
    }

    let mut out = OneSidedBatch::default();
    for (trial, row) in rows.iter().enumerate() {
        let offset = initial_curve.map_or(0.0, |curves| curves[trial]);
        let mut branch = BranchState::carried(&pair, offset, BranchOutcome::Continuing)?;

        let mut successes = 0u64;
        let mut duration = row.len() as u64;
        let mut decision = Decision::Continue;
        let mut stat_at_stop = 0u64;
        for (step, &x) in row.iter().enumerate() {
            if x {
                successes += 1;
            }
            if decision == Decision::Continue {
                decision = one_sided_decision(branch.observe(successes, step as u64 + 1));
                if decision.is_terminal() {
                    duration = step as u64 + 1;
                    stat_at_stop = successes;
                }
            }
        }
        if decision == Decision::Continue {
            stat_at_stop = successes;
        }
        out.duration.push(duration);
        out.decision.push(decision);
        out.stat_at_stop.push(stat_at_stop);
        out.final_curve
            .push(branch.value_at(successes, row.len() as u64));
    }
    Ok(out)
}

/// Evaluate many independent two-sided composite trials over one chunk,
/// optionally resuming from carried per-branch curves and stop flags.
pub fn evaluate_two_sided(
    rows: &[Vec<bool>],
    params: &TestParams,
    carry: Option<&TwoSidedCarry>,
) -> SprtResult<TwoSidedBatch> {
    if params.alternative != Alternative::TwoSided {
        return Err(SprtError::InvalidArgument(format!(
            "two-sided evaluation called with alternative {}",
            params.alternative
        )));
    }
    let (greater_pair, less_pair) = params.two_sided_pairs()?;
    if let Some(carry) = carry {
        check_carry_len("greater_curve", carry.greater_curve.len(), rows.len())?;
        check_carry_len("less_curve", carry.less_curve.len(), rows.len())?;
        check_carry_len("greater_stop", carry.greater_stop.len(), rows.len())?;
        check_carry_len("less_stop", carry.less_stop.len(), rows.len())?;
    }

    let mut out = TwoSidedBatch::default();
    for (trial, row) in rows.iter().enumerate() {
        let (greater_offset, less_offset, greater_stopped, less_stopped) = match carry {
            Some(carry) => (
                carry.greater_curve[trial],
                carry.less_curve[trial],
                carry.greater_stop[trial],
                carry.less_stop[trial],
            ),
            None => (0.0, 0.0, false, false),
        };
        let mut greater = BranchState::carried(
            &greater_pair,
            greater_offset,
            carried_outcome(greater_stopped, BranchOutcome::CrossedLow),
        )?;
        let mut less = BranchState::carried(
            &less_pair,
            less_offset,
            carried_outcome(less_stopped, BranchOutcome::CrossedHigh),
        )?;

        let mut successes = 0u64;
        let mut duration = row.len() as u64;
        let mut decision = Decision::Continue;
        let mut stat_at_stop = 0u64;
        for (step, &x) in row.iter().enumerate() {
            if x {
                successes += 1;
            }
            if decision == Decision::Continue {
                let n = step as u64 + 1;
                decision =
                    composite_decision(greater.observe(successes, n), less.observe(successes, n));
                if decision.is_terminal() {
                    duration = step as u64 + 1;
                    stat_at_stop = successes;
                }
            }
        }
        if decision == Decision::Continue {
            stat_at_stop = successes;
        }
        let n = row.len() as u64;
        out.duration.push(duration);
        out.decision.push(decision);
        out.stat_at_stop.push(stat_at_stop);
        out.carry.greater_curve.push(greater.value_at(successes, n));
        out.carry.less_curve.push(less.value_at(successes, n));
        out.carry
            .greater_stop
            .push(greater_stopped || greater.outcome().is_stopped());
        out.carry
            .less_stop
            .push(less_stopped || less.outcome().is_stopped());
    }
    Ok(out)
}

fn check_row_pair(x_row: &[bool], y_row: &[bool], trial: usize) -> SprtResult<()> {
    if x_row.len() != y_row.len() {
        return Err(SprtError::InvalidArgument(format!(
            "trial {trial}: arm rows have unequal lengths {} and {}",
            x_row.len(),
            y_row.len()
        )));
    }
    Ok(())
}

/// Two-sample one-sided evaluation: each step consumes one simultaneous
/// pair (x, y); the curve advances only on informative (x != y) pairs,
/// at the transformed parameters.
pub fn evaluate_two_sample_one_sided(
    x_rows: &[Vec<bool>],
    y_rows: &[Vec<bool>],
    params: &TestParams,
    initial_curve: Option<&[f64]>,
) -> SprtResult<TwoSampleOneSidedBatch> {
    if !params.alternative.is_one_sided() {
        return Err(SprtError::InvalidArgument(
            "one-sided evaluation called with two-sided alternative".to_string(),
        ));
    }
    check_carry_len("y_rows", y_rows.len(), x_rows.len())?;
    if let Some(curves) = initial_curve {
        check_carry_len("initial_curve", curves.len(), x_rows.len())?;
    }
    let pair = transformed_pair(params, params.alternative, params.alpha)?;

    let mut out = TwoSampleOneSidedBatch::default();
    for (trial, (x_row, y_row)) in izip!(x_rows, y_rows).enumerate() {
        check_row_pair(x_row, y_row, trial)?;
        let offset = initial_curve.map_or(0.0, |curves| curves[trial]);
        let mut branch = BranchState::carried(&pair, offset, BranchOutcome::Continuing)?;

        let mut x_successes = 0u64;
        let mut y_successes = 0u64;
        let mut paired_successes = 0u64;
        let mut paired_size = 0u64;
        let mut duration = x_row.len() as u64;
        let mut decision = Decision::Continue;
        let mut first_at_stop = 0u64;
        let mut second_at_stop = 0u64;
        for (step, (&x, &y)) in izip!(x_row, y_row).enumerate() {
            if x {
                x_successes += 1;
            }
            if y {
                y_successes += 1;
            }
            if x != y {
                paired_size += 1;
                if x {
                    paired_successes += 1;
                }
            }
            if decision == Decision::Continue {
                decision = one_sided_decision(branch.observe(paired_successes, paired_size));
                if decision.is_terminal() {
                    duration = step as u64 + 1;
                    first_at_stop = x_successes;
                    second_at_stop = y_successes;
                }
            }
        }
        if decision == Decision::Continue {
            first_at_stop = x_successes;
            second_at_stop = y_successes;
        }
        out.duration.push(duration);
        out.decision.push(decision);
        out.first_stat_at_stop.push(first_at_stop);
        out.second_stat_at_stop.push(second_at_stop);
        out.final_curve
            .push(branch.value_at(paired_successes, paired_size));
    }
    Ok(out)
}

/// Two-sample two-sided evaluation with per-branch transformed effects
/// and carried branch state.
pub fn evaluate_two_sample_two_sided(
    x_rows: &[Vec<bool>],
    y_rows: &[Vec<bool>],
    params: &TestParams,
    carry: Option<&TwoSidedCarry>,
) -> SprtResult<TwoSampleTwoSidedBatch> {
    if params.alternative != Alternative::TwoSided {
        return Err(SprtError::InvalidArgument(format!(
            "two-sided evaluation called with alternative {}",
            params.alternative
        )));
    }
    check_carry_len("y_rows", y_rows.len(), x_rows.len())?;
    if let Some(carry) = carry {
        check_carry_len("greater_curve", carry.greater_curve.len(), x_rows.len())?;
        check_carry_len("less_curve", carry.less_curve.len(), x_rows.len())?;
        check_carry_len("greater_stop", carry.greater_stop.len(), x_rows.len())?;
        check_carry_len("less_stop", carry.less_stop.len(), x_rows.len())?;
    }
    let greater_pair = transformed_pair(params, Alternative::Greater, params.alpha / 2.0)?;
    let less_pair = transformed_pair(params, Alternative::Less, params.alpha / 2.0)?;

    let mut out = TwoSampleTwoSidedBatch::default();
    for (trial, (x_row, y_row)) in izip!(x_rows, y_rows).enumerate() {
        check_row_pair(x_row, y_row, trial)?;
        let (greater_offset, less_offset, greater_stopped, less_stopped) = match carry {
            Some(carry) => (
                carry.greater_curve[trial],
                carry.less_curve[trial],
                carry.greater_stop[trial],
                carry.less_stop[trial],
            ),
            None => (0.0, 0.0, false, false),
        };
        let mut greater = BranchState::carried(
            &greater_pair,
            greater_offset,
            carried_outcome(greater_stopped, BranchOutcome::CrossedLow),
        )?;
        let mut less = BranchState::carried(
            &less_pair,
            less_offset,
            carried_outcome(less_stopped, BranchOutcome::CrossedHigh),
        )?;

        let mut x_successes = 0u64;
        let mut y_successes = 0u64;
        let mut paired_successes = 0u64;
        let mut paired_size = 0u64;
        let mut duration = x_row.len() as u64;
        let mut decision = Decision::Continue;
        let mut first_at_stop = 0u64;
        let mut second_at_stop = 0u64;
        for (step, (&x, &y)) in izip!(x_row, y_row).enumerate() {
            if x {
                x_successes += 1;
            }
            if y {
                y_successes += 1;
            }
            if x != y {
                paired_size += 1;
                if x {
                    paired_successes += 1;
                }
            }
            if decision == Decision::Continue {
                decision = composite_decision(
                    greater.observe(paired_successes, paired_size),
                    less.observe(paired_successes, paired_size),
                );
                if decision.is_terminal() {
                    duration = step as u64 + 1;
                    first_at_stop = x_successes;
                    second_at_stop = y_successes;
                }
            }
        }
        if decision == Decision::Continue {
            first_at_stop = x_successes;
            second_at_stop = y_successes;
        }
        out.duration.push(duration);
        out.decision.push(decision);
        out.first_stat_at_stop.push(first_at_stop);
        out.second_stat_at_stop.push(second_at_stop);
        out.carry
            .greater_curve
            .push(greater.value_at(paired_successes, paired_size));
        out.carry
            .less_curve
            .push(less.value_at(paired_successes, paired_size));
        out.carry
            .greater_stop
            .push(greater_stopped || greater.outcome().is_stopped());
        out.carry
            .less_stop
            .push(less_stopped || less.outcome().is_stopped());
    }
    Ok(out)
}
