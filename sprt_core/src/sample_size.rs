//! Fixed-horizon and sequential sample-size estimators.
//!
//! The sequential formulas follow Wald's operating-characteristic
//! theory: the probability of accepting the low-side hypothesis at a
//! true probability `p` comes from the drift parameter `h` solving
//! `-1 + p*(p_high/p_low)^h + (1-p)*((1-p_low)/(1-p_high))^(-h) = 0`,
//! and the average sample number follows from the boundary values and
//! the per-observation log-likelihood increment.

use statrs::distribution::{ContinuousCDF, Normal};

use crate::bounds::compute_boundaries;
use crate::error::{SprtError, SprtResult};
use crate::params::{Alternative, TestParams};
use crate::two_sample::transformed_mde;

fn normal_quantile(q: f64) -> SprtResult<f64> {
    let normal = Normal::new(0.0, 1.0)
        .map_err(|e| SprtError::Numerical(format!("standard normal: {e}")))?;
    Ok(normal.inverse_cdf(q))
}

fn check_probability(p: f64) -> SprtResult<()> {
    if !(0.0..=1.0).contains(&p) {
        return Err(SprtError::InvalidArgument(format!(
            "probability {p} outside [0, 1]"
        )));
    }
    Ok(())
}

/// Fixed-horizon one-sample size for testing p = p_low against
/// p = p_high, by the normal approximation.
pub fn one_sided_classic_sample_size(
    p_low: f64,
    p_high: f64,
    alpha_low: f64,
    alpha_high: f64,
) -> SprtResult<u64> {
    check_probability(p_low)?;
    check_probability(p_high)?;
    let d = p_high - p_low;
    let summand_low = normal_quantile(1.0 - alpha_low)? * (p_low * (1.0 - p_low)).sqrt();
    let summand_high = normal_quantile(1.0 - alpha_high)? * (p_high * (1.0 - p_high)).sqrt();
    Ok(((summand_low + summand_high).powi(2) / (d * d)).ceil() as u64)
}

/// Fixed-horizon one-sample size for the test described by `params`.
/// The two-sided size is the larger of the two one-sided designs at
/// half the significance budget.
pub fn classic_sample_size(params: &TestParams) -> SprtResult<u64> {
    let TestParams { p0, d, alpha, beta, .. } = *params;
    match params.alternative {
        Alternative::Less => one_sided_classic_sample_size(p0 - d, p0, beta, alpha),
        Alternative::Greater => one_sided_classic_sample_size(p0, p0 + d, alpha, beta),
        Alternative::TwoSided => Ok(u64::max(
            one_sided_classic_sample_size(p0 - d, p0, beta, alpha / 2.0)?,
            one_sided_classic_sample_size(p0, p0 + d, alpha / 2.0, beta)?,
        )),
    }
}

/// Fixed-horizon per-arm size of the two-sample test, by the arcsine
/// variance-stabilizing effect size.
pub fn classic_two_sample_size(params: &TestParams) -> SprtResult<u64> {
    let one_sided = |p_low: f64, p_high: f64, alpha_low: f64, alpha_high: f64| {
        check_probability(p_low)?;
        check_probability(p_high)?;
        let quantile_factor = normal_quantile(1.0 - alpha_low)? + normal_quantile(1.0 - alpha_high)?;
        let effect_size = 2.0 * (p_high.sqrt().asin() - p_low.sqrt().asin());
        Ok((2.0 * quantile_factor.powi(2) / effect_size.powi(2)).ceil() as u64)
    };
    let TestParams { p0, d, alpha, beta, .. } = *params;
    match params.alternative {
        Alternative::Less => one_sided(p0 - d, p0, alpha, beta),
        Alternative::Greater => one_sided(p0, p0 + d, alpha, beta),
        Alternative::TwoSided => Ok(u64::max(
            one_sided(p0 - d, p0, alpha / 2.0, beta)?,
            one_sided(p0, p0 + d, alpha / 2.0, beta)?,
        )),
    }
}

fn check_hypothesis_pair(p_low: f64, p_high: f64) -> SprtResult<()> {
    if !(p_low > 0.0 && p_low < p_high && p_high < 1.0) {
        return Err(SprtError::InvalidArgument(format!(
            "hypothesis pair ({p_low}, {p_high}) must satisfy 0 < p_low < p_high < 1"
        )));
    }
    Ok(())
}

/// Probability at which the expected log-likelihood increment is zero;
/// the test runs longest near this point.
pub fn p_critical(p_low: f64, p_high: f64) -> SprtResult<f64> {
    check_hypothesis_pair(p_low, p_high)?;
    let log_success = (p_high / p_low).ln();
    let log_failure = ((1.0 - p_low) / (1.0 - p_high)).ln();
    Ok(log_failure / (log_success + log_failure))
}

fn bisect<F: Fn(f64) -> f64>(f: F, mut a: f64, mut b: f64, xtol: f64) -> SprtResult<f64> {
    let mut fa = f(a);
    let fb = f(b);
    if fa == 0.0 {
        return Ok(a);
    }
    if fb == 0.0 {
        return Ok(b);
    }
    if (fa < 0.0) == (fb < 0.0) {
        return Err(SprtError::Numerical(format!(
            "no sign change over bisection bracket [{a}, {b}]"
        )));
    }
    while b - a > xtol {
        let mid = 0.5 * (a + b);
        let fm = f(mid);
        if fm == 0.0 {
            return Ok(mid);
        }
        if (fa < 0.0) != (fm < 0.0) {
            b = mid;
        } else {
            a = mid;
            fa = fm;
        }
    }
    Ok(0.5 * (a + b))
}

/// Drift parameter h in [-1, 1] behind the operating characteristic at
/// a true probability `p` in [p_low, p_high]. Closed forms at the
/// endpoints and the critical point; bisection on the monotone branch
/// otherwise.
pub fn oc_root(p: f64, p_low: f64, p_high: f64) -> SprtResult<f64> {
    let p_crit = p_critical(p_low, p_high)?;
    let log_success = (p_high / p_low).ln();
    let log_failure = ((1.0 - p_low) / (1.0 - p_high)).ln();
    let helper =
        |h: f64| -1.0 + p * (p_high / p_low).powf(h) + (1.0 - p) * ((1.0 - p_low) / (1.0 - p_high)).powf(-h);
    // Stationary point of the transcendental; brackets the root on
    // either side.
    let h_crit = (((1.0 - p) * log_failure) / (p * log_success)).ln() / (log_failure + log_success);

    if p == p_low {
        Ok(1.0)
    } else if p > p_low && p < p_crit {
        bisect(helper, h_crit, 1.0, (p_crit - p) / 10_000.0)
    } else if p == p_crit {
        Ok(0.0)
    } else if p > p_crit && p < p_high {
        bisect(helper, -1.0, h_crit, (p - p_crit) / 10_000.0)
    } else if p == p_high {
        Ok(-1.0)
    } else {
        Err(SprtError::InvalidArgument(format!(
            "probability {p} outside [{p_low}, {p_high}]"
        )))
    }
}

/// Probability of accepting p = p_low when the truth is `p`.
pub fn operating_characteristic(
    p: f64,
    p_low: f64,
    p_high: f64,
    alpha_low: f64,
    alpha_high: f64,
) -> SprtResult<f64> {
    let p_crit = p_critical(p_low, p_high)?;
    let (low_bound, high_bound) = compute_boundaries(alpha_low, alpha_high)?;
    if p == p_crit {
        return Ok(high_bound / (high_bound - low_bound));
    }
    let h = oc_root(p, p_low, p_high)?;
    Ok(((high_bound * h).exp() - 1.0) / ((high_bound * h).exp() - (low_bound * h).exp()))
}

/// Expected stopping time of the one-sided test at a true probability
/// `p`. Near the critical point the first-order formula degenerates
/// (E[z] -> 0) and the second-moment form takes over.
pub fn one_sided_sequential_asn(
    p: f64,
    p_low: f64,
    p_high: f64,
    alpha_low: f64,
    alpha_high: f64,
) -> SprtResult<u64> {
    let (low_bound, high_bound) = compute_boundaries(alpha_low, alpha_high)?;
    let p_crit = p_critical(p_low, p_high)?;
    let oc = operating_characteristic(p, p_low, p_high, alpha_low, alpha_high)?;
    let log_success = (p_high / p_low).ln();
    let log_failure = ((1.0 - p_low) / (1.0 - p_high)).ln();

    let asn = if (p - p_crit).abs() < f64::min(1e-4, f64::min(p / 100.0, (1.0 - p) / 100.0)) {
        let e_z_sqr = p * log_success.powi(2) + (1.0 - p) * log_failure.powi(2);
        (oc * low_bound.powi(2) + (1.0 - oc) * high_bound.powi(2)) / e_z_sqr
    } else {
        let e_z = p * log_success - (1.0 - p) * log_failure;
        (oc * low_bound + (1.0 - oc) * high_bound) / e_z
    };
    Ok(asn.ceil() as u64)
}

/// Expected one-sample stopping time at a true probability `p`.
/// Two-sided composites have no closed ASN and are rejected.
pub fn sequential_asn(p: f64, params: &TestParams) -> SprtResult<u64> {
    let TestParams { p0, d, alpha, beta, .. } = *params;
    match params.alternative {
        Alternative::Less => one_sided_sequential_asn(p, p0 - d, p0, alpha, beta),
        Alternative::Greater => one_sided_sequential_asn(p, p0, p0 + d, beta, alpha),
        Alternative::TwoSided => Err(SprtError::InvalidArgument(
            "no closed-form average sample number for a two-sided composite".to_string(),
        )),
    }
}

fn golden_section_min<F: Fn(f64) -> f64>(f: F, mut a: f64, mut b: f64, xatol: f64) -> f64 {
    let inv_phi = (5.0_f64.sqrt() - 1.0) / 2.0;
    let mut c = b - inv_phi * (b - a);
    let mut d = a + inv_phi * (b - a);
    let mut fc = f(c);
    let mut fd = f(d);
    while b - a > xatol {
        if fc < fd {
            b = d;
            d = c;
            fd = fc;
            c = b - inv_phi * (b - a);
            fc = f(c);
        } else {
            a = c;
            c = d;
            fc = fd;
            d = a + inv_phi * (b - a);
            fd = f(d);
        }
    }
    0.5 * (a + b)
}

/// Worst-case expected stopping time of the one-sided test over true
/// probabilities in [p_low, p_high], and the probability attaining it.
pub fn max_one_sided_sequential_asn(
    p_low: f64,
    p_high: f64,
    alpha_low: f64,
    alpha_high: f64,
) -> SprtResult<(u64, f64)> {
    let p_crit = p_critical(p_low, p_high)?;
    let (low_bound, high_bound) = compute_boundaries(alpha_low, alpha_high)?;
    let log_success = (p_high / p_low).ln();
    let log_failure_inv = ((1.0 - p_high) / (1.0 - p_low)).ln();

    let f = |a: f64, b: f64, h: f64| {
        ((a * h).exp() - (b * h).exp())
            / (a * (1.0 - (b * h).exp()) + b * ((a * h).exp() - 1.0))
    };
    // ASN as a function of the drift parameter, negated for
    // minimization. Both the objective and the probability map have a
    // removable singularity at h = 0 with known limits.
    let helper = |h: f64| {
        if h.abs() < 1e-8 {
            -low_bound * high_bound / (log_success * log_failure_inv)
        } else {
            -f(log_success, log_failure_inv, h) / f(high_bound, low_bound, h)
        }
    };
    let p_of = |h: f64| {
        if h.abs() < 1e-8 {
            p_crit
        } else {
            (1.0 - (log_failure_inv * h).exp())
                / ((log_success * h).exp() - (log_failure_inv * h).exp())
        }
    };

    let h = golden_section_min(helper, -1.0, 1.0, 1e-5);
    Ok(((-helper(h)).ceil() as u64, p_of(h)))
}

/// Worst-case one-sample expected stopping time over the alternative's
/// probability band.
pub fn maximin_asn(params: &TestParams) -> SprtResult<(u64, f64)> {
    let TestParams { p0, d, alpha, beta, .. } = *params;
    match params.alternative {
        Alternative::Less => max_one_sided_sequential_asn(p0 - d, p0, alpha, beta),
        Alternative::Greater => max_one_sided_sequential_asn(p0, p0 + d, beta, alpha),
        Alternative::TwoSided => Err(SprtError::InvalidArgument(
            "no closed-form average sample number for a two-sided composite".to_string(),
        )),
    }
}

fn informative_pair_rate(params: &TestParams) -> f64 {
    let TestParams { p0, d, .. } = *params;
    let p_alt = match params.alternative {
        Alternative::Less => p0 - d,
        _ => p0 + d,
    };
    p0 * (1.0 - p_alt) + p_alt * (1.0 - p0)
}

fn transformed_params(params: &TestParams) -> SprtResult<TestParams> {
    let d_t = match params.alternative {
        Alternative::Less => transformed_mde(params.p0 - params.d, params.p0),
        _ => transformed_mde(params.p0, params.p0 + params.d),
    };
    TestParams::new(0.5, d_t, params.alpha, params.beta, params.alternative)
}

/// Expected per-arm stopping time of the two-sample test at a true
/// first-arm probability `p`: the one-sample ASN of the transformed
/// test, scaled up by the informative-pair rate. Unrounded.
pub fn two_sample_sequential_asn(p: f64, params: &TestParams) -> SprtResult<f64> {
    if params.alternative == Alternative::TwoSided {
        return Err(SprtError::InvalidArgument(
            "no closed-form average sample number for a two-sided composite".to_string(),
        ));
    }
    let shift = (p - params.p0).abs();
    let p_t = match params.alternative {
        Alternative::Greater => 0.5 + transformed_mde(params.p0, params.p0 + shift),
        _ => 0.5 - transformed_mde(params.p0 - shift, params.p0),
    };
    let asn = sequential_asn(p_t, &transformed_params(params)?)?;
    Ok(asn as f64 / informative_pair_rate(params))
}

/// Worst-case per-arm expected stopping time of the two-sample test.
/// Unrounded.
pub fn two_sample_maximin_asn(params: &TestParams) -> SprtResult<f64> {
    if params.alternative == Alternative::TwoSided {
        return Err(SprtError::InvalidArgument(
            "no closed-form average sample number for a two-sided composite".to_string(),
        ));
    }
    let (asn, _) = maximin_asn(&transformed_params(params)?)?;
    Ok(asn as f64 / informative_pair_rate(params))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(alternative: Alternative) -> TestParams {
        TestParams::new(0.1, 0.02, 0.05, 0.2, alternative).unwrap()
    }

    #[test]
    fn test_classic_one_sample_sizes() {
        assert_eq!(classic_sample_size(&params(Alternative::Greater)).unwrap(), 1471);
        assert_eq!(classic_sample_size(&params(Alternative::Less)).unwrap(), 1303);
        assert_eq!(classic_sample_size(&params(Alternative::TwoSided)).unwrap(), 1856);
    }

    #[test]
    fn test_classic_two_sample_sizes() {
        assert_eq!(classic_two_sample_size(&params(Alternative::Greater)).unwrap(), 3021);
        assert_eq!(classic_two_sample_size(&params(Alternative::TwoSided)).unwrap(), 3835);
    }

    #[test]
    fn test_p_critical_sits_between_thresholds() {
        let p_crit = p_critical(0.1, 0.12).unwrap();
        assert!((p_crit - 0.10973373522110133).abs() < 1e-12);
        assert!(p_crit > 0.1 && p_crit < 0.12);
    }

    #[test]
    fn test_degenerate_pairs_rejected() {
        // A collapsed or inverted pair is an error, never a NaN or a
        // silently converged midpoint.
        assert!(p_critical(0.3, 0.3).is_err());
        assert!(p_critical(0.12, 0.1).is_err());
        assert!(p_critical(0.0, 0.1).is_err());
        assert!(oc_root(0.3, 0.3, 0.3).is_err());
        assert!(operating_characteristic(0.3, 0.3, 0.3, 0.2, 0.05).is_err());
        assert!(one_sided_sequential_asn(0.3, 0.3, 0.3, 0.2, 0.05).is_err());
        assert!(max_one_sided_sequential_asn(0.3, 0.3, 0.2, 0.05).is_err());
    }

    #[test]
    fn test_bisect_requires_sign_change() {
        let err = bisect(|x| x * x + 1.0, -1.0, 1.0, 1e-6).unwrap_err();
        assert!(matches!(err, SprtError::Numerical(_)));
        // Exact zeros at a bracket edge short-circuit.
        assert_eq!(bisect(|x| x, 0.0, 1.0, 1e-6).unwrap(), 0.0);
    }

    #[test]
    fn test_oc_endpoints_match_budgets() {
        // With budgets (alpha_low, alpha_high) = (0.2, 0.05), the
        // acceptance probability for the low hypothesis is 1 - 0.05 at
        // p_low and 0.2 at p_high.
        let oc_low = operating_characteristic(0.1, 0.1, 0.12, 0.2, 0.05).unwrap();
        let oc_high = operating_characteristic(0.12, 0.1, 0.12, 0.2, 0.05).unwrap();
        assert!((oc_low - 0.95).abs() < 1e-12);
        assert!((oc_high - 0.2).abs() < 1e-12);

        let oc_mid = operating_characteristic(0.11, 0.1, 0.12, 0.2, 0.05).unwrap();
        assert!((oc_mid - 0.6268776660663302).abs() < 1e-5);
        assert!(oc_mid < oc_low && oc_mid > oc_high);
    }

    #[test]
    fn test_oc_root_closed_forms() {
        assert_eq!(oc_root(0.1, 0.1, 0.12).unwrap(), 1.0);
        assert_eq!(oc_root(0.12, 0.1, 0.12).unwrap(), -1.0);
        let p_crit = p_critical(0.1, 0.12).unwrap();
        assert_eq!(oc_root(p_crit, 0.1, 0.12).unwrap(), 0.0);
        assert!(oc_root(0.2, 0.1, 0.12).is_err());
    }

    #[test]
    fn test_sequential_asn_goldens() {
        let greater = params(Alternative::Greater);
        assert_eq!(sequential_asn(0.1, &greater).unwrap(), 674);
        assert_eq!(sequential_asn(0.12, &greater).unwrap(), 907);
        assert_eq!(sequential_asn(0.11, &greater).unwrap(), 1060);
        assert_eq!(sequential_asn(0.1, &params(Alternative::Less)).unwrap(), 530);
        assert!(sequential_asn(0.1, &params(Alternative::TwoSided)).is_err());
    }

    #[test]
    fn test_sequential_asn_continuous_at_critical_point() {
        // The quadratic near-critical form must agree with the linear
        // form just outside the switchover window.
        let greater = params(Alternative::Greater);
        let p_crit = p_critical(0.1, 0.12).unwrap();
        let at_crit = sequential_asn(p_crit, &greater).unwrap();
        let nearby = sequential_asn(p_crit + 2e-4, &greater).unwrap();
        assert_eq!(at_crit, 1055);
        assert!((at_crit as i64 - nearby as i64).abs() < 20);
    }

    #[test]
    fn test_maximin_dominates_pointwise_asn() {
        let greater = params(Alternative::Greater);
        let (max_asn, max_p) = maximin_asn(&greater).unwrap();
        assert_eq!(max_asn, 1076);
        assert!((max_p - 0.11206488290700269).abs() < 1e-6);
        for &p in &[0.1, 0.105, 0.11, 0.115, 0.12] {
            assert!(sequential_asn(p, &greater).unwrap() <= max_asn);
        }

        let (less_asn, less_p) = maximin_asn(&params(Alternative::Less)).unwrap();
        assert_eq!(less_asn, 914);
        assert!((less_p - 0.08654170493731149).abs() < 1e-6);
    }

    #[test]
    fn test_two_sample_asn_scales_by_informative_rate() {
        let greater = params(Alternative::Greater);
        // Inner transformed ASN of 257 informative pairs over an
        // informative rate of 0.196.
        let at_null = two_sample_sequential_asn(0.1, &greater).unwrap();
        assert!((at_null - 1311.2244897959183).abs() < 1e-6);
        let at_alt = two_sample_sequential_asn(0.12, &greater).unwrap();
        assert!((at_alt - 1867.3469387755101).abs() < 1e-6);

        let maximin = two_sample_maximin_asn(&greater).unwrap();
        assert!((maximin - 2168.3673469387754).abs() < 1e-6);
        assert!(maximin > at_null && maximin > at_alt);

        assert!(two_sample_sequential_asn(0.1, &params(Alternative::TwoSided)).is_err());
        assert!(two_sample_maximin_asn(&params(Alternative::TwoSided)).is_err());
    }
}
