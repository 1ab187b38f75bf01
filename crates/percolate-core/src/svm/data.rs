//! Training input for the L2-SVM.

/// Labeled feature rows with per-example costs.
///
/// Rows are stored flattened with the bias term (1.0) appended as the last
/// element, so the solved weight vector has length `features + 1`.
#[derive(Debug, Clone)]
pub struct SvmInput {
    /// Row length including the bias slot.
    n: usize,
    rows: Vec<f64>,
    labels: Vec<f64>,
    cost: Vec<f64>,
    positives: usize,
    negatives: usize,
}

impl SvmInput {
    pub fn new(num_features: usize) -> Self {
        Self {
            n: num_features + 1,
            rows: Vec::new(),
            labels: Vec::new(),
            cost: Vec::new(),
            positives: 0,
            negatives: 0,
        }
    }

    pub fn with_capacity(num_features: usize, rows: usize) -> Self {
        let mut input = Self::new(num_features);
        input.rows.reserve(rows * input.n);
        input.labels.reserve(rows);
        input.cost.reserve(rows);
        input
    }

    /// Append one example. `label` is +1.0 or -1.0.
    pub fn push(&mut self, features: &[f64], label: f64, cost: f64) {
        debug_assert_eq!(features.len() + 1, self.n);
        self.rows.extend_from_slice(features);
        self.rows.push(1.0);
        self.labels.push(label);
        self.cost.push(cost);
        if label > 0.0 {
            self.positives += 1;
        } else {
            self.negatives += 1;
        }
    }

    /// Number of examples.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Row length including the bias slot.
    pub fn row_len(&self) -> usize {
        self.n
    }

    pub fn positives(&self) -> usize {
        self.positives
    }

    pub fn negatives(&self) -> usize {
        self.negatives
    }

    pub fn row(&self, i: usize) -> &[f64] {
        &self.rows[i * self.n..(i + 1) * self.n]
    }

    pub fn label(&self, i: usize) -> f64 {
        self.labels[i]
    }

    pub fn labels(&self) -> &[f64] {
        &self.labels
    }

    pub fn cost(&self, i: usize) -> f64 {
        self.cost[i]
    }

    /// Reassign costs by class without rebuilding the rows; used when a
    /// grid search sweeps (C+, C-) pairs over one training set.
    pub fn set_costs(&mut self, cpos: f64, cneg: f64) {
        for (cost, &label) in self.cost.iter_mut().zip(self.labels.iter()) {
            *cost = if label > 0.0 { cpos } else { cneg };
        }
    }
}

/// Solver tolerances; the defaults mirror the reference implementation of
/// the modified finite Newton method.
#[derive(Debug, Clone)]
pub struct SvmOptions {
    /// L2 regularization strength.
    pub lambda: f64,
    /// Convergence tolerance.
    pub epsilon: f64,
    /// Iteration cap for the conjugate-gradient subproblem.
    pub cg_iter_max: usize,
    /// Iteration cap for the outer Newton loop.
    pub mfn_iter_max: usize,
}

impl Default for SvmOptions {
    fn default() -> Self {
        Self {
            lambda: 1.0,
            epsilon: 1e-7,
            cg_iter_max: 10_000,
            mfn_iter_max: 50,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_appends_bias() {
        let mut input = SvmInput::new(2);
        input.push(&[3.0, 4.0], 1.0, 2.0);
        assert_eq!(input.row(0), &[3.0, 4.0, 1.0]);
        assert_eq!(input.row_len(), 3);
        assert_eq!(input.cost(0), 2.0);
        assert_eq!(input.positives(), 1);
        assert_eq!(input.negatives(), 0);
    }

    #[test]
    fn set_costs_by_class() {
        let mut input = SvmInput::new(1);
        input.push(&[1.0], 1.0, 0.0);
        input.push(&[-1.0], -1.0, 0.0);
        input.set_costs(10.0, 3.0);
        assert_eq!(input.cost(0), 10.0);
        assert_eq!(input.cost(1), 3.0);
    }
}
