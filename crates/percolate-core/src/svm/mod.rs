//! Linear L2-SVM trained with a modified finite Newton method.
//!
//! Solves `min_w 0.5*lambda*w'w + 0.5*sum_i C[i]*max(0, 1 - Y[i]*w'x[i])^2`
//! over feature rows with a bias term in the last slot. The outer Newton
//! loop alternates a conjugate-gradient least-squares subproblem on the
//! active set with an exact line search over loss breakpoints. The solver
//! is deterministic, never mutates its input rows, and an all-zero weight
//! vector is a legitimate (degenerate) result.

pub mod cgls;
pub mod data;
pub mod line_search;
pub mod solver;

pub use data::{SvmInput, SvmOptions};
pub use solver::L2SvmMfn;

/// Train on `input` with the costs currently set on it.
pub fn train(input: &SvmInput, options: &SvmOptions) -> (Vec<f64>, Vec<f64>) {
    L2SvmMfn::new(input, options).train()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn separable_problem_trains() {
        let mut input = SvmInput::new(2);
        input.push(&[2.0, 1.0], 1.0, 1.0);
        input.push(&[1.5, 2.0], 1.0, 1.0);
        input.push(&[-1.0, -2.0], -1.0, 1.0);
        input.push(&[-2.0, -1.0], -1.0, 1.0);

        let (weights, outputs) = train(&input, &SvmOptions::default());
        assert_eq!(weights.len(), 3);
        assert_eq!(outputs.len(), 4);
        assert!(outputs[0] > 0.0);
        assert!(outputs[1] > 0.0);
        assert!(outputs[2] < 0.0);
        assert!(outputs[3] < 0.0);
    }

    #[test]
    fn asymmetric_costs_change_the_model() {
        let mut input = SvmInput::new(2);
        input.push(&[1.0, 1.0], 1.0, 1.0);
        input.push(&[1.2, 0.8], 1.0, 1.0);
        input.push(&[-1.0, -1.0], -1.0, 1.0);
        input.push(&[0.1, -0.1], -1.0, 1.0);

        input.set_costs(10.0, 1.0);
        let (w_pos_heavy, _) = train(&input, &SvmOptions::default());
        input.set_costs(1.0, 10.0);
        let (w_neg_heavy, _) = train(&input, &SvmOptions::default());

        let diff: f64 = w_pos_heavy
            .iter()
            .zip(w_neg_heavy.iter())
            .map(|(a, b)| (a - b).abs())
            .sum();
        assert!(diff > 0.05, "cost asymmetry should move the separator");
    }

    #[test]
    fn training_is_deterministic() {
        let mut input = SvmInput::new(3);
        for i in 0..20 {
            let x = i as f64 / 10.0;
            let label = if i % 2 == 0 { 1.0 } else { -1.0 };
            input.push(&[x, label * x + 0.1, -x], label, 1.5);
        }
        let (w1, o1) = train(&input, &SvmOptions::default());
        let (w2, o2) = train(&input, &SvmOptions::default());
        assert_eq!(w1, w2);
        assert_eq!(o1, o2);
    }
}
