//! Description-of-correct features.
//!
//! Auxiliary features that model the systematic behavior of correct
//! matches: a retention-time prediction trained on confident targets and
//! the observed-vs-calculated mass agreement. When enabled, the first
//! ordinary feature holds the observed retention time and the second the
//! observed minus calculated mass, and three extra feature slots are
//! appended after the ordinary block.

use crate::psm::{Psm, PsmStore};

/// Number of appended feature slots.
pub const NUM_FEATURES: usize = 3;

const AMINO_ACIDS: &str = "ACDEFGHIKLMNPQRSTVWY";
const RIDGE: f64 = 1e-3;

/// Bit gates within the doc-type bitmask.
const DOC_MASS: u32 = 0x1;
const DOC_RETENTION: u32 = 0x2;

#[derive(Debug, Clone)]
pub struct DescriptionOfCorrect {
    doc_type: u32,
    klammer: bool,
    /// Column where the appended doc slots begin.
    num_ordinary: usize,
    model: Option<RetentionModel>,
    correct: Vec<(String, f64)>,
}

impl DescriptionOfCorrect {
    pub fn new(doc_type: u32, klammer: bool, num_ordinary: usize) -> Self {
        Self {
            doc_type,
            klammer,
            num_ordinary,
            model: None,
            correct: Vec::new(),
        }
    }

    pub fn clear(&mut self) {
        self.correct.clear();
    }

    /// Remember a confidently identified target for the next model fit.
    pub fn register_correct(&mut self, psm: &Psm) {
        self.correct.push((psm.sequence().to_string(), psm.ret_time));
    }

    pub fn train_correct(&mut self) {
        self.model = RetentionModel::fit(&self.correct, self.klammer);
        if self.model.is_none() {
            log::debug!(
                "retention model not trained ({} confident targets)",
                self.correct.len()
            );
        }
    }

    pub fn estimate_rt(&self, sequence: &str) -> Option<f64> {
        self.model.as_ref().map(|m| m.predict(sequence))
    }

    /// Fill the PSM's appended feature slots from the current model. With
    /// no trained model the prediction falls back to the observed value,
    /// leaving neutral features.
    pub fn set_features(&self, store: &mut PsmStore, psm_idx: usize) {
        let psm = &store.psms[psm_idx];
        let predicted = self
            .estimate_rt(psm.sequence())
            .unwrap_or(psm.ret_time);
        let rt = psm.ret_time;
        let exp_mass = psm.exp_mass;
        let calc_mass = psm.calc_mass;
        let Some(row_idx) = psm.features else {
            return;
        };

        store.psms[psm_idx].pred_ret_time = predicted;

        let mut slots = [0.0; NUM_FEATURES];
        if self.doc_type & DOC_RETENTION != 0 {
            slots[0] = (rt - predicted).abs();
            slots[1] = (rt - predicted).powi(2) / rt.abs().max(1.0);
        }
        if self.doc_type & DOC_MASS != 0 {
            slots[2] = (exp_mass - calc_mass).abs() / calc_mass.abs().max(1.0);
        }

        let row = store.arena.row_mut(row_idx);
        row[self.num_ordinary..self.num_ordinary + NUM_FEATURES].copy_from_slice(&slots);
    }
}

/// Linear retention-time regression over amino-acid composition.
///
/// Klammer et al., Anal. Chem. 2007: the dialect additionally embeds the
/// two residues at each terminus separately.
#[derive(Debug, Clone)]
pub struct RetentionModel {
    beta: Vec<f64>,
    klammer: bool,
    rt_min: f64,
    rt_max: f64,
}

impl RetentionModel {
    fn num_coefficients(klammer: bool) -> usize {
        let aa = AMINO_ACIDS.len();
        // composition + length + intercept, terminal blocks for Klammer
        if klammer {
            aa * 3 + 2
        } else {
            aa + 2
        }
    }

    fn embed(sequence: &str, klammer: bool) -> Vec<f64> {
        let aa = AMINO_ACIDS.len();
        let n = Self::num_coefficients(klammer);
        let mut embedding = vec![0.0; n];
        let len = sequence.len();
        for (pos, c) in sequence.chars().enumerate() {
            let Some(idx) = AMINO_ACIDS.find(c) else {
                continue;
            };
            embedding[idx] += 1.0;
            if klammer {
                if pos < 2 {
                    embedding[aa + idx] += 1.0;
                }
                if pos + 2 >= len {
                    embedding[2 * aa + idx] += 1.0;
                }
            }
        }
        embedding[n - 2] = len as f64;
        embedding[n - 1] = 1.0;
        embedding
    }

    /// Ridge-stabilized least squares on (sequence, observed RT) pairs.
    /// Fails when there are fewer observations than coefficients.
    pub fn fit(training: &[(String, f64)], klammer: bool) -> Option<Self> {
        let n = Self::num_coefficients(klammer);
        if training.len() < n {
            return None;
        }

        let mut rt_min = f64::INFINITY;
        let mut rt_max = f64::NEG_INFINITY;
        let mut xtx = vec![vec![0.0; n]; n];
        let mut xty = vec![0.0; n];
        for (sequence, rt) in training {
            rt_min = rt_min.min(*rt);
            rt_max = rt_max.max(*rt);
            let x = Self::embed(sequence, klammer);
            for r in 0..n {
                for c in 0..n {
                    xtx[r][c] += x[r] * x[c];
                }
                xty[r] += x[r] * rt;
            }
        }
        for (r, row) in xtx.iter_mut().enumerate() {
            row[r] += RIDGE;
        }

        let beta = crate::math::solve(xtx, xty)?;
        Some(Self {
            beta,
            klammer,
            rt_min,
            rt_max,
        })
    }

    /// Predicted retention time, clamped to just outside the training
    /// range to keep runaway extrapolations off the feature scale.
    pub fn predict(&self, sequence: &str) -> f64 {
        let x = Self::embed(sequence, self.klammer);
        let rt = crate::math::dot(&x, &self.beta);
        rt.clamp(self.rt_min - 10.0, self.rt_max + 10.0)
    }
}
