//! Outer modified finite Newton loop.

use crate::svm::cgls;
use crate::svm::data::{SvmInput, SvmOptions};
use crate::svm::line_search;

/// Loose first-pass tolerance; once the loose problem converges the loop
/// continues with the configured epsilon.
const BIG_EPSILON: f64 = 0.01;
const RELATIVE_STOP_EPS: f64 = 1e-9;

pub struct L2SvmMfn<'a> {
    input: &'a SvmInput,
    options: &'a SvmOptions,
}

impl<'a> L2SvmMfn<'a> {
    pub fn new(input: &'a SvmInput, options: &'a SvmOptions) -> Self {
        Self { input, options }
    }

    /// Returns (weights of length `row_len`, outputs of length `len`).
    pub fn train(&self) -> (Vec<f64>, Vec<f64>) {
        let m = self.input.len();
        let n = self.input.row_len();

        let mut weights = vec![0.0; n];
        let mut outputs = vec![0.0; m];

        let mut f_old = 0.0;
        let mut active_set = self.find_active_set(&outputs);
        let mut f = f_old + self.loss(&active_set, &outputs);

        let mut weights_bar = vec![0.0; n];
        let mut outputs_bar = vec![0.0; m];

        let mut epsilon = BIG_EPSILON;
        for iter in 0..self.options.mfn_iter_max {
            log::trace!(
                "svm iteration {} ({} active examples, objective {:.6})",
                iter + 1,
                active_set.len(),
                f
            );

            weights_bar.copy_from_slice(&weights);
            outputs_bar.copy_from_slice(&outputs);

            let cg_converged = cgls::solve(
                self.input,
                &active_set,
                &mut weights_bar,
                &mut outputs_bar,
                self.options.lambda,
                epsilon,
                self.options.cg_iter_max,
            );

            for (i, out) in outputs_bar.iter_mut().enumerate() {
                *out = crate::math::dot(self.input.row(i), &weights_bar);
            }

            let optimal = cg_converged && self.optimal(&active_set, &outputs_bar, epsilon);
            if optimal {
                if epsilon == BIG_EPSILON {
                    epsilon = self.options.epsilon;
                    log::trace!("loose pass converged, tightening epsilon to {}", epsilon);
                    continue;
                }
                weights.copy_from_slice(&weights_bar);
                outputs.copy_from_slice(&outputs_bar);
                log::trace!("svm converged (optimality) in {} iterations", iter + 1);
                break;
            }

            let alpha = line_search::search(
                self.input,
                &weights,
                &weights_bar,
                self.options.lambda,
                &outputs,
                &outputs_bar,
            );

            f_old = f;
            for (w, wb) in weights.iter_mut().zip(weights_bar.iter()) {
                *w = (1.0 - alpha) * *w + alpha * wb;
            }
            for (o, ob) in outputs.iter_mut().zip(outputs_bar.iter()) {
                *o = (1.0 - alpha) * *o + alpha * ob;
            }

            f = 0.5 * self.options.lambda * weights.iter().map(|&w| w * w).sum::<f64>();
            active_set = self.find_active_set(&outputs);
            f += self.loss(&active_set, &outputs);

            if (f - f_old).abs() < RELATIVE_STOP_EPS * f_old.abs() {
                log::trace!("svm converged (relative improvement) in {} iterations", iter + 1);
                break;
            }
        }

        (weights, outputs)
    }

    /// Examples with non-zero loss at the current outputs.
    fn find_active_set(&self, outputs: &[f64]) -> Vec<usize> {
        (0..self.input.len())
            .filter(|&i| self.input.label(i) * outputs[i] < 1.0)
            .collect()
    }

    fn loss(&self, active_set: &[usize], outputs: &[f64]) -> f64 {
        active_set
            .iter()
            .map(|&i| {
                let margin = 1.0 - self.input.label(i) * outputs[i];
                if margin > 0.0 {
                    0.5 * self.input.cost(i) * margin * margin
                } else {
                    0.0
                }
            })
            .sum()
    }

    /// KKT check: active examples within the margin, inactive ones outside.
    fn optimal(&self, active_set: &[usize], outputs: &[f64], epsilon: f64) -> bool {
        let mut in_active = vec![false; self.input.len()];
        for &i in active_set {
            in_active[i] = true;
            if self.input.label(i) * outputs[i] > 1.0 + epsilon {
                return false;
            }
        }
        for i in 0..self.input.len() {
            if !in_active[i] && self.input.label(i) * outputs[i] < 1.0 - epsilon {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noisy_input() -> SvmInput {
        let mut input = SvmInput::new(2);
        input.push(&[1.0, 1.0], 1.0, 1.0);
        input.push(&[1.2, 0.8], 1.0, 1.0);
        input.push(&[0.8, 1.2], 1.0, 1.0);
        input.push(&[-1.0, -1.0], -1.0, 1.0);
        input.push(&[-0.8, -1.2], -1.0, 1.0);
        input.push(&[0.1, -0.1], -1.0, 1.0);
        input
    }

    #[test]
    fn mostly_separates_noisy_classes() {
        let input = noisy_input();
        let (_, outputs) = L2SvmMfn::new(&input, &SvmOptions::default()).train();
        let correct = (0..input.len())
            .filter(|&i| input.label(i) * outputs[i] > 0.0)
            .count();
        assert!(correct >= 4, "classified {}/6 correctly", correct);
    }

    #[test]
    fn single_positive_example() {
        let mut input = SvmInput::new(2);
        input.push(&[1.0, 2.0], 1.0, 1.0);
        let (weights, outputs) = L2SvmMfn::new(&input, &SvmOptions::default()).train();
        assert_eq!(weights.len(), 3);
        assert!(outputs[0] > 0.0);
    }

    #[test]
    fn empty_input_yields_zero_weights() {
        let input = SvmInput::new(2);
        let (weights, outputs) = L2SvmMfn::new(&input, &SvmOptions::default()).train();
        assert_eq!(weights, vec![0.0; 3]);
        assert!(outputs.is_empty());
    }
}
