//! Non-parametric posterior error probabilities.
//!
//! Kernel density estimates are fit separately to the target and decoy
//! score distributions; the decoy density models the null. PEPs are
//! evaluated on an even grid of scores and linearly interpolated, which
//! keeps the per-PSM cost flat regardless of sample size.

use crate::math::std;

pub struct Kde<'a> {
    sample: &'a [f64],
    pub bandwidth: f64,
    constant: f64,
}

impl<'a> Kde<'a> {
    /// Gaussian kernel with Silverman's rule-of-thumb bandwidth.
    pub fn new(sample: &'a [f64]) -> Self {
        let factor: f64 = 4.0 / 3.0;
        let exponent = 1.0 / 5.0;
        let sigma = std(sample);
        let bandwidth =
            (sigma * (factor / sample.len() as f64).powf(exponent)).max(f64::MIN_POSITIVE);
        let constant = (2.0 * std::f64::consts::PI).sqrt() * bandwidth * sample.len() as f64;
        Self {
            sample,
            bandwidth,
            constant,
        }
    }

    fn kernel(&self, x: f64) -> f64 {
        (-0.5 * x * x).exp()
    }

    pub fn pdf(&self, x: f64) -> f64 {
        let h = self.bandwidth;
        let sum: f64 = self.sample.iter().map(|xi| self.kernel((x - xi) / h)).sum();
        sum / self.constant
    }
}

/// Binned posterior-error estimator over a fitted score range.
pub struct PepEstimator {
    bins: Vec<f64>,
    min_score: f64,
    score_step: f64,
}

const DEFAULT_BINS: usize = 1000;

impl PepEstimator {
    /// Fit on (score, is_decoy) observations. `pi0` shrinks the null prior
    /// when `use_pi0` is set; otherwise the full decoy density is taken as
    /// the null. Returns None when either class is empty or the score
    /// range is degenerate.
    pub fn fit(scores: &[f64], is_decoy: &[bool], pi0: f64, use_pi0: bool) -> Option<Self> {
        debug_assert_eq!(scores.len(), is_decoy.len());
        let decoy_scores: Vec<f64> = scores
            .iter()
            .zip(is_decoy)
            .filter(|&(_, d)| *d)
            .map(|(s, _)| *s)
            .collect();
        let target_scores: Vec<f64> = scores
            .iter()
            .zip(is_decoy)
            .filter(|&(_, d)| !*d)
            .map(|(s, _)| *s)
            .collect();
        if decoy_scores.is_empty() || target_scores.is_empty() {
            return None;
        }

        let mut min_score = f64::MAX;
        let mut max_score = f64::MIN;
        for &s in scores {
            min_score = min_score.min(s);
            max_score = max_score.max(s);
        }
        if !(max_score - min_score).is_finite() || max_score <= min_score {
            return None;
        }
        let score_step = (max_score - min_score) / (DEFAULT_BINS - 1) as f64;

        let decoy = Kde::new(&decoy_scores);
        let target = Kde::new(&target_scores);
        let prior = if use_pi0 { pi0 } else { 1.0 };

        let mut bins: Vec<f64> = (0..DEFAULT_BINS)
            .map(|bin| {
                let score = bin as f64 * score_step + min_score;
                let null = decoy.pdf(score);
                let mixture = target.pdf(score);
                if mixture <= 0.0 {
                    1.0
                } else {
                    (prior * null / mixture).clamp(0.0, 1.0)
                }
            })
            .collect();

        // PEP must not decrease as the score drops: reverse cumulative max
        let init = *bins.last().unwrap();
        bins.iter_mut().rev().fold(init, |acc, x| {
            *x = acc.max(*x);
            *x
        });

        Some(Self {
            bins,
            min_score,
            score_step,
        })
    }

    /// Posterior error probability at `score`, linearly interpolated
    /// between the two surrounding bins.
    pub fn posterior_error(&self, score: f64) -> f64 {
        let bin_lo = self
            .bins
            .len()
            .saturating_sub(1)
            .min(((score - self.min_score) / self.score_step).floor().max(0.0) as usize);
        let bin_hi = self.bins.len().saturating_sub(1).min(bin_lo + 1);

        let lower = self.bins[bin_lo];
        let upper = self.bins[bin_hi];

        let bin_lo_score = bin_lo as f64 * self.score_step + self.min_score;
        let linear = ((score - bin_lo_score) / self.score_step).clamp(0.0, 1.0);
        (lower + (upper - lower) * linear).clamp(0.0, 1.0)
    }
}
