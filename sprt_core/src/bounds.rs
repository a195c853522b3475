use crate::error::{SprtError, SprtResult};
use crate::params::HypothesisPair;

/// Wald decision thresholds for the log-likelihood ratio.
///
/// `alpha_low` is the probability of crossing the low boundary when
/// p = p_high holds, `alpha_high` the probability of crossing the high
/// boundary when p = p_low holds.
pub fn compute_boundaries(alpha_low: f64, alpha_high: f64) -> SprtResult<(f64, f64)> {
    for (value, name) in [(alpha_low, "alpha_low"), (alpha_high, "alpha_high")] {
        if !(value > 0.0 && value < 1.0) {
            return Err(SprtError::InvalidArgument(format!(
                "{name} = {value} must lie in (0, 1)"
            )));
        }
    }
    let low_bound = (alpha_low / (1.0 - alpha_high)).ln();
    let high_bound = ((1.0 - alpha_low) / alpha_high).ln();
    Ok((low_bound, high_bound))
}

/// Bernoulli log-likelihood ratio of p = p_high against p = p_low, as a
/// pair of precomputed per-observation weights. Every engine evaluates
/// the curve through this product form so the streaming and batch paths
/// agree bit-for-bit.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct LlrCurve {
    w_success: f64,
    w_failure: f64,
}

impl LlrCurve {
    pub fn new(p_low: f64, p_high: f64) -> SprtResult<Self> {
        if !(p_low > 0.0 && p_high < 1.0 && p_low < p_high) {
            return Err(SprtError::InvalidArgument(format!(
                "hypothesis pair ({p_low}, {p_high}) must satisfy 0 < p_low < p_high < 1"
            )));
        }
        Ok(Self {
            w_success: (p_high / p_low).ln(),
            w_failure: ((1.0 - p_high) / (1.0 - p_low)).ln(),
        })
    }

    pub fn for_pair(pair: &HypothesisPair) -> SprtResult<Self> {
        Self::new(pair.p_low, pair.p_high)
    }

    /// Curve value for `success_count` successes over `sample_size` draws.
    pub fn eval(&self, success_count: u64, sample_size: u64) -> f64 {
        success_count as f64 * self.w_success
            + (sample_size - success_count) as f64 * self.w_failure
    }
}

/// One-shot curve evaluation; engines hold an [`LlrCurve`] instead.
pub fn compute_llr(
    success_count: u64,
    sample_size: u64,
    p_low: f64,
    p_high: f64,
) -> SprtResult<f64> {
    if success_count > sample_size {
        return Err(SprtError::InvalidArgument(format!(
            "success count {success_count} exceeds sample size {sample_size}"
        )));
    }
    Ok(LlrCurve::new(p_low, p_high)?.eval(success_count, sample_size))
}
