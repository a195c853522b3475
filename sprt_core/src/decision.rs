use crate::bounds::{LlrCurve, compute_boundaries};
use crate::error::SprtResult;
use crate::params::{BranchOutcome, Decision, HypothesisPair};

/// One one-sided test tracked against its own pair of boundaries.
///
/// The outcome freezes at the first crossing; later observations are
/// ignored. `offset` carries log-likelihood accumulated before the data
/// this state is evaluated on (used by the batch engines to resume a
/// trial across chunks).
#[derive(Clone, Copy, Debug)]
pub struct BranchState {
    curve: LlrCurve,
    low_bound: f64,
    high_bound: f64,
    offset: f64,
    outcome: BranchOutcome,
    last_value: f64,
}

impl BranchState {
    pub fn new(pair: &HypothesisPair) -> SprtResult<Self> {
        Self::carried(pair, 0.0, BranchOutcome::Continuing)
    }

    pub fn carried(
        pair: &HypothesisPair,
        offset: f64,
        outcome: BranchOutcome,
    ) -> SprtResult<Self> {
        let curve = LlrCurve::for_pair(pair)?;
        let (low_bound, high_bound) = compute_boundaries(pair.alpha_low, pair.alpha_high)?;
        Ok(Self {
            curve,
            low_bound,
            high_bound,
            offset,
            outcome,
            last_value: offset,
        })
    }

    pub fn value_at(&self, success_count: u64, sample_size: u64) -> f64 {
        self.offset + self.curve.eval(success_count, sample_size)
    }

    /// Re-evaluate the branch at the given cumulative statistic.
    /// Crossings are strict; equality with a boundary never decides.
    pub fn observe(&mut self, success_count: u64, sample_size: u64) -> BranchOutcome {
        if self.outcome == BranchOutcome::Continuing {
            let value = self.value_at(success_count, sample_size);
            self.last_value = value;
            if value > self.high_bound {
                self.outcome = BranchOutcome::CrossedHigh;
            } else if value < self.low_bound {
                self.outcome = BranchOutcome::CrossedLow;
            }
        }
        self.outcome
    }

    pub fn outcome(&self) -> BranchOutcome {
        self.outcome
    }

    /// Curve value at the most recent evaluation while the branch was
    /// still continuing; frozen alongside the outcome.
    pub fn last_value(&self) -> f64 {
        self.last_value
    }

    pub fn bounds(&self) -> (f64, f64) {
        (self.low_bound, self.high_bound)
    }
}

/// Composite decision of the two-sided test from the frozen outcomes of
/// its branches. The greater branch tests p0 against p0 + d, the less
/// branch p0 - d against p0; a branch crossing its null-direction
/// boundary is evidence for p = p0 only once the other branch has made
/// its own equality-direction crossing.
pub fn composite_decision(greater: BranchOutcome, less: BranchOutcome) -> Decision {
    use BranchOutcome::*;
    match (greater, less) {
        // A drop decides immediately, even against a same-step rise.
        (_, CrossedLow) => Decision::AcceptLess,
        (CrossedHigh, Continuing) | (CrossedHigh, CrossedHigh) => Decision::AcceptGreater,
        // Both branches agree on p = p0.
        (CrossedLow, CrossedHigh) => Decision::AcceptNull,
        // A single null-direction crossing is not decisive on its own.
        (CrossedLow, Continuing) | (Continuing, CrossedHigh) => Decision::Continue,
        (Continuing, Continuing) => Decision::Continue,
    }
}
