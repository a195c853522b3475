use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use crate::error::{SprtError, SprtResult};

/// Shape of the alternative hypothesis against p = p0.
#[derive(
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Debug,
    Display,
    Serialize,
    Deserialize,
    EnumString,
    IntoStaticStr,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum Alternative {
    Less,
    Greater,
    TwoSided,
}

impl Alternative {
    pub fn is_one_sided(&self) -> bool {
        !matches!(self, Alternative::TwoSided)
    }
}

/// Which variation a two-sample observation belongs to.
#[derive(
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Debug,
    Display,
    Serialize,
    Deserialize,
    EnumString,
    IntoStaticStr,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum Arm {
    First,
    Second,
}

/// Terminal outcome of a test, or `Continue` while more data is needed.
///
/// One-sided tests resolve to `AcceptLow`/`AcceptHigh` (which of the two
/// simple hypotheses was accepted); the two-sided composite resolves to
/// `AcceptGreater`/`AcceptLess`/`AcceptNull`.
#[derive(
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Debug,
    Display,
    Serialize,
    Deserialize,
    EnumString,
    IntoStaticStr,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum Decision {
    Continue,
    AcceptLow,
    AcceptHigh,
    AcceptGreater,
    AcceptLess,
    AcceptNull,
}

impl Decision {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Decision::Continue)
    }

    /// Numeric encoding used by the batch engines and result tables:
    /// 1 for a high crossing (any directional outcome of the composite),
    /// -1 for a low crossing (the null outcome of the composite), 0 while
    /// continuing.
    pub fn result_code(&self) -> i8 {
        match self {
            Decision::Continue => 0,
            Decision::AcceptHigh | Decision::AcceptGreater | Decision::AcceptLess => 1,
            Decision::AcceptLow | Decision::AcceptNull => -1,
        }
    }
}

/// First boundary crossed by one branch of the composite test.
/// Frozen at the first crossing, independent of the composite decision.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum BranchOutcome {
    Continuing,
    CrossedHigh,
    CrossedLow,
}

impl BranchOutcome {
    pub fn is_stopped(&self) -> bool {
        !matches!(self, BranchOutcome::Continuing)
    }
}

/// Design parameters of a Bernoulli SPRT.
#[derive(Clone, Copy, PartialEq, Debug, Serialize, Deserialize)]
pub struct TestParams {
    pub p0: f64,
    pub d: f64,
    pub alpha: f64,
    pub beta: f64,
    pub alternative: Alternative,
}

fn check_unit_open(value: f64, name: &str) -> SprtResult<()> {
    if value > 0.0 && value < 1.0 {
        Ok(())
    } else {
        Err(SprtError::InvalidArgument(format!(
            "{name} = {value} must lie in (0, 1)"
        )))
    }
}

impl TestParams {
    pub fn new(
        p0: f64,
        d: f64,
        alpha: f64,
        beta: f64,
        alternative: Alternative,
    ) -> SprtResult<Self> {
        check_unit_open(p0, "p0")?;
        check_unit_open(alpha, "alpha")?;
        check_unit_open(beta, "beta")?;
        if !(d > 0.0) {
            return Err(SprtError::InvalidArgument(format!(
                "effect size d = {d} must be positive"
            )));
        }
        let params = Self {
            p0,
            d,
            alpha,
            beta,
            alternative,
        };
        // The relevant shifted probabilities must stay inside (0, 1).
        match alternative {
            Alternative::Greater => check_unit_open(p0 + d, "p0 + d")?,
            Alternative::Less => check_unit_open(p0 - d, "p0 - d")?,
            Alternative::TwoSided => {
                check_unit_open(p0 + d, "p0 + d")?;
                check_unit_open(p0 - d, "p0 - d")?;
            }
        }
        Ok(params)
    }

    fn pair_for(&self, branch: Alternative, alpha: f64) -> SprtResult<HypothesisPair> {
        match branch {
            Alternative::Greater => Ok(HypothesisPair {
                p_low: self.p0,
                p_high: self.p0 + self.d,
                alpha_low: self.beta,
                alpha_high: alpha,
            }),
            Alternative::Less => Ok(HypothesisPair {
                p_low: self.p0 - self.d,
                p_high: self.p0,
                alpha_low: alpha,
                alpha_high: self.beta,
            }),
            Alternative::TwoSided => Err(SprtError::InvalidArgument(
                "two-sided has no single hypothesis pair".to_string(),
            )),
        }
    }

    /// The hypothesis pair of a one-sided test. Errors for `TwoSided`,
    /// which is run as two coupled one-sided tests instead.
    pub fn one_sided_pair(&self) -> SprtResult<HypothesisPair> {
        self.pair_for(self.alternative, self.alpha)
    }

    /// The (greater, less) branch pairs of the two-sided composite, with
    /// the alpha budget split between the branches.
    pub fn two_sided_pairs(&self) -> SprtResult<(HypothesisPair, HypothesisPair)> {
        let greater = self.pair_for(Alternative::Greater, self.alpha / 2.0)?;
        let less = self.pair_for(Alternative::Less, self.alpha / 2.0)?;
        Ok((greater, less))
    }
}

/// A derived one-sided testing problem: p = p_low against p = p_high,
/// with the error budget attached to each boundary.
#[derive(Clone, Copy, PartialEq, Debug, Serialize, Deserialize)]
pub struct HypothesisPair {
    pub p_low: f64,
    pub p_high: f64,
    pub alpha_low: f64,
    pub alpha_high: f64,
}

/// Running sufficient statistic of a Bernoulli stream.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default, Serialize, Deserialize)]
pub struct CumulativeStat {
    pub success_count: u64,
    pub sample_size: u64,
}

impl CumulativeStat {
    pub fn new(success_count: u64, sample_size: u64) -> SprtResult<Self> {
        if success_count > sample_size {
            return Err(SprtError::InvalidArgument(format!(
                "success count {success_count} exceeds sample size {sample_size}"
            )));
        }
        Ok(Self {
            success_count,
            sample_size,
        })
    }

    pub fn push(&mut self, observation: bool) {
        self.sample_size += 1;
        if observation {
            self.success_count += 1;
        }
    }

    pub fn rate(&self) -> f64 {
        if self.sample_size == 0 {
            0.0
        } else {
            self.success_count as f64 / self.sample_size as f64
        }
    }
}
