//! Target-decoy statistics: p-values, pi0, q-values and PEPs.
//!
//! All functions take `(score, is_target)` pairs already ranked under the
//! score set's total order, highest score first.

use crate::kde::PepEstimator;

/// Which false-discovery-rate estimator applies at runtime. Mix-max and
/// target-decoy competition are mutually exclusive; the choice is made
/// once from the input structure and the user flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FdrMode {
    /// Mix-max: decoy counts scaled by pi0 and the target/decoy ratio.
    MixMax,
    /// Target-decoy competition counting: (decoys + 1) / targets.
    Tdc,
}

/// P-values for the target entries, in encounter order.
///
/// For each target, p = (decoys with a higher-or-equal score + 1) /
/// (#decoys + 1). Ties share the decoy count of their whole group.
pub fn p_values(combined: &[(f64, bool)]) -> Vec<f64> {
    let n_decoys = combined.iter().filter(|&&(_, t)| !t).count();
    let denom = (n_decoys + 1) as f64;

    let mut pvals = Vec::new();
    let mut decoys_seen = 0usize;
    let mut i = 0;
    while i < combined.len() {
        let mut j = i;
        while j < combined.len() && combined[j].0 == combined[i].0 {
            j += 1;
        }
        let group_decoys = combined[i..j].iter().filter(|&&(_, t)| !t).count();
        let geq = decoys_seen + group_decoys;
        for &(_, is_target) in &combined[i..j] {
            if is_target {
                pvals.push((geq as f64 + 1.0) / denom);
            }
        }
        decoys_seen = geq;
        i = j;
    }
    pvals
}

/// True when virtually all targets outrank all decoys, i.e. every target
/// p-value sits at the minimum attainable value. A null model with no
/// overlap carries no calibration information.
pub fn check_separation(pvals: &[f64], n_decoys: usize) -> bool {
    if pvals.is_empty() || n_decoys == 0 {
        return false;
    }
    let p_min = 1.0 / (n_decoys + 1) as f64;
    pvals.iter().all(|&p| p <= p_min + f64::EPSILON)
}

const PI0_LAMBDA_STEP: f64 = 0.05;
const PI0_LAMBDA_COUNT: usize = 19;

/// Estimate the proportion of incorrect target matches from the target
/// p-value distribution.
///
/// Storey's estimator pi0(lambda) = #{p > lambda} / (m * (1 - lambda)) is
/// evaluated on a lambda grid and smoothed with a cubic fit; the smoothed
/// value at the largest lambda is returned, clamped to [0, 1].
pub fn estimate_pi0(pvals: &[f64]) -> f64 {
    let m = pvals.len();
    if m == 0 {
        return 1.0;
    }

    let mut lambdas = Vec::with_capacity(PI0_LAMBDA_COUNT);
    let mut raw = Vec::with_capacity(PI0_LAMBDA_COUNT);
    for i in 1..=PI0_LAMBDA_COUNT {
        let lambda = PI0_LAMBDA_STEP * i as f64;
        let above = pvals.iter().filter(|&&p| p > lambda).count();
        lambdas.push(lambda);
        raw.push(above as f64 / (m as f64 * (1.0 - lambda)));
    }

    let smoothed = cubic_fit_at(&lambdas, &raw, *lambdas.last().unwrap());
    smoothed.unwrap_or_else(|| *raw.last().unwrap()).clamp(0.0, 1.0)
}

/// Least-squares cubic through (x, y), evaluated at `at`.
fn cubic_fit_at(x: &[f64], y: &[f64], at: f64) -> Option<f64> {
    let n = x.len();
    if n < 4 {
        return None;
    }
    // normal equations for the degree-3 Vandermonde system
    let mut xtx = vec![vec![0.0; 4]; 4];
    let mut xty = vec![0.0; 4];
    for (&xi, &yi) in x.iter().zip(y.iter()) {
        let powers = [1.0, xi, xi * xi, xi * xi * xi];
        for r in 0..4 {
            for c in 0..4 {
                xtx[r][c] += powers[r] * powers[c];
            }
            xty[r] += powers[r] * yi;
        }
    }
    let beta = crate::math::solve(xtx, xty)?;
    Some(beta[0] + beta[1] * at + beta[2] * at * at + beta[3] * at * at * at)
}

/// Q-values for every entry, in the given (descending) order.
///
/// The running FDR at prefix k is
/// - mix-max: `pi0 * (D_k + 1) * ratio / max(1, T_k)`
/// - TDC:     `(D_k + 1) / max(1, T_k)`
///
/// where `ratio` is the overall #targets / #decoys. The +1 pseudo-decoy is
/// dropped when `skip_decoys_plus_one` is set (too conservative for tiny
/// feature scans). A right-to-left pass takes the minimum FDR of any
/// prefix containing each element.
pub fn q_values(
    combined: &[(f64, bool)],
    mode: FdrMode,
    pi0: f64,
    ratio: f64,
    skip_decoys_plus_one: bool,
) -> Vec<f64> {
    let add = if skip_decoys_plus_one { 0.0 } else { 1.0 };
    let mut targets = 0usize;
    let mut decoys = 0usize;

    let mut fdrs = Vec::with_capacity(combined.len());
    for &(_, is_target) in combined {
        if is_target {
            targets += 1;
        } else {
            decoys += 1;
        }
        let d = decoys as f64 + add;
        let t = targets.max(1) as f64;
        let fdr = match mode {
            FdrMode::MixMax => pi0 * d * ratio / t,
            FdrMode::Tdc => d / t,
        };
        fdrs.push(fdr);
    }

    let mut q_min = 1.0f64;
    for fdr in fdrs.iter_mut().rev() {
        q_min = q_min.min(*fdr);
        *fdr = q_min;
    }
    fdrs
}

/// Posterior error probabilities for every entry, in the given
/// (descending) order. Falls back to 1.0 everywhere when the density fit
/// is impossible (single class or degenerate score range).
pub fn estimate_pep(combined: &[(f64, bool)], use_pi0: bool, pi0: f64) -> Vec<f64> {
    let scores: Vec<f64> = combined.iter().map(|&(s, _)| s).collect();
    let is_decoy: Vec<bool> = combined.iter().map(|&(_, t)| !t).collect();

    match PepEstimator::fit(&scores, &is_decoy, pi0, use_pi0) {
        Some(estimator) => scores
            .iter()
            .map(|&s| estimator.posterior_error(s))
            .collect(),
        None => {
            log::warn!("posterior error fit failed, reporting PEP = 1 for all PSMs");
            vec![1.0; combined.len()]
        }
    }
}
