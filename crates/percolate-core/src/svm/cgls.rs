//! Conjugate-gradient least-squares subproblem.
//!
//! Solves `min_w 0.5*lambda*w'w + 0.5*sum_{i in A} C[i]*(Y[i] - w'x[i])^2`
//! over the active set A, warm-started from the incoming weights and
//! outputs, which are updated in place.

use crate::svm::data::SvmInput;

/// Returns true when the residual dropped below tolerance, false when the
/// iteration cap was hit first.
pub fn solve(
    input: &SvmInput,
    active_set: &[usize],
    weights: &mut [f64],
    outputs: &mut [f64],
    lambda: f64,
    epsilon: f64,
    iter_max: usize,
) -> bool {
    let active = active_set.len();
    let n = input.row_len();
    if active == 0 {
        return true;
    }

    // z[i] = C[i]*(Y[i] - o[i]) over the active set
    let mut z = vec![0.0; active];
    for (i, &ex) in active_set.iter().enumerate() {
        z[i] = input.cost(ex) * (input.label(ex) - outputs[ex]);
    }

    // r = X'z - lambda*w
    let mut r = vec![0.0; n];
    for (i, &ex) in active_set.iter().enumerate() {
        for (rj, xj) in r.iter_mut().zip(input.row(ex)) {
            *rj += z[i] * xj;
        }
    }
    for (rj, wj) in r.iter_mut().zip(weights.iter()) {
        *rj -= lambda * wj;
    }

    let mut p = r.clone();
    let mut omega1: f64 = r.iter().map(|&x| x * x).sum();
    let mut omega_p = omega1;
    let epsilon2 = epsilon * epsilon;

    let mut q = vec![0.0; active];
    for _ in 0..iter_max {
        // q = X p over the active set
        for (i, &ex) in active_set.iter().enumerate() {
            q[i] = crate::math::dot(input.row(ex), &p);
        }

        let omega_q: f64 = active_set
            .iter()
            .enumerate()
            .map(|(i, &ex)| input.cost(ex) * q[i] * q[i])
            .sum();

        let gamma = omega1 / (lambda * omega_p + omega_q);

        for (wj, pj) in weights.iter_mut().zip(p.iter()) {
            *wj += gamma * pj;
        }
        for (i, &ex) in active_set.iter().enumerate() {
            outputs[ex] += gamma * q[i];
            z[i] -= gamma * input.cost(ex) * q[i];
        }

        r.fill(0.0);
        for (i, &ex) in active_set.iter().enumerate() {
            for (rj, xj) in r.iter_mut().zip(input.row(ex)) {
                *rj += z[i] * xj;
            }
        }
        for (rj, wj) in r.iter_mut().zip(weights.iter()) {
            *rj -= lambda * wj;
        }

        let omega1_new: f64 = r.iter().map(|&x| x * x).sum();
        let omega_z: f64 = z.iter().map(|&x| x * x).sum();
        if omega1_new < epsilon2 * omega_z {
            return true;
        }

        let beta = omega1_new / omega1;
        for (pj, rj) in p.iter_mut().zip(r.iter()) {
            *pj = rj + beta * *pj;
        }
        omega1 = omega1_new;
        omega_p = p.iter().map(|&x| x * x).sum();
    }

    false
}
