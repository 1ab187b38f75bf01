//! Exact line search along the Newton direction.
//!
//! The piecewise-quadratic objective has derivative breakpoints where
//! examples enter or leave the margin; walking them in order finds the
//! step that zeroes the directional derivative.

use crate::svm::data::SvmInput;

struct Delta {
    delta: f64,
    index: usize,
    sign: f64,
}

/// Step size alpha in [0, 1] for `w_new = (1-alpha)*w + alpha*w_bar`.
#[allow(clippy::too_many_arguments)]
pub fn search(
    input: &SvmInput,
    w: &[f64],
    w_bar: &[f64],
    lambda: f64,
    outputs: &[f64],
    outputs_bar: &[f64],
) -> f64 {
    let mut omega_l = 0.0;
    let mut omega_r = 0.0;
    for (wj, wbj) in w.iter().zip(w_bar.iter()) {
        let diff = wbj - wj;
        omega_l += wj * diff;
        omega_r += wbj * diff;
    }
    omega_l *= lambda;
    omega_r *= lambda;

    let mut left = omega_l;
    let mut right = omega_r;

    let mut deltas = Vec::new();
    for i in 0..input.len() {
        let label = input.label(i);
        let cost = input.cost(i);
        let diff = label * (outputs_bar[i] - outputs[i]);

        if label * outputs[i] < 1.0 {
            // inside the margin, loss active at alpha = 0
            let d2 = cost * (outputs_bar[i] - outputs[i]);
            left += (outputs[i] - label) * d2;
            right += (outputs_bar[i] - label) * d2;
            if diff > 0.0 {
                deltas.push(Delta {
                    delta: (1.0 - label * outputs[i]) / diff,
                    index: i,
                    sign: -1.0,
                });
            }
        } else if diff < 0.0 {
            deltas.push(Delta {
                delta: (1.0 - label * outputs[i]) / diff,
                index: i,
                sign: 1.0,
            });
        }
    }

    deltas.sort_by(|a, b| a.delta.total_cmp(&b.delta));

    for bp in &deltas {
        let derivative = left + bp.delta * (right - left);
        if derivative >= 0.0 {
            break;
        }
        let i = bp.index;
        let diff = bp.sign * input.cost(i) * (outputs_bar[i] - outputs[i]);
        left += diff * (outputs[i] - input.label(i));
        right += diff * (outputs_bar[i] - input.label(i));
    }

    if (right - left).abs() < 1e-12 {
        0.0
    } else {
        (-left / (right - left)).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn improving_direction_takes_a_step() {
        let mut input = SvmInput::new(2);
        input.push(&[1.0, 0.0], 1.0, 1.0);
        input.push(&[0.0, 1.0], -1.0, 1.0);

        let w = vec![0.1, 0.1, 0.0];
        let w_bar = vec![1.0, -1.0, 0.0];
        let o = vec![0.1, 0.1];
        let o_bar = vec![1.0, -1.0];

        let alpha = search(&input, &w, &w_bar, 0.1, &o, &o_bar);
        assert!((0.0..=1.0).contains(&alpha));
        assert!(alpha > 0.1, "good direction should get a real step");
    }

    #[test]
    fn worsening_direction_is_rejected() {
        let mut input = SvmInput::new(1);
        input.push(&[1.0], 1.0, 1.0);
        input.push(&[-1.0], -1.0, 1.0);

        let w = vec![1.0, 0.0];
        let w_bar = vec![-1.0, 0.0];
        let o = vec![1.0, -1.0];
        let o_bar = vec![-1.0, 1.0];

        let alpha = search(&input, &w, &w_bar, 1.0, &o, &o_bar);
        assert!(alpha < 0.5);
    }

    #[test]
    fn zero_direction_returns_zero() {
        let mut input = SvmInput::new(1);
        input.push(&[1.0], 1.0, 1.0);
        let w = vec![0.5, 0.0];
        let o = vec![1.0];
        let alpha = search(&input, &w, &w, 1.0, &o, &o);
        assert_eq!(alpha, 0.0);
    }
}
