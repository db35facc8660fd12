//! Polynomial evaluation and root finding.
//!
//! Coefficients are stored highest degree first: `[a0, a1, ..., an]` is
//! `a0·zⁿ + a1·zⁿ⁻¹ + ... + an`.

use rustfft::num_complex::Complex64;

const MAX_ITERATIONS: usize = 500;
const TOLERANCE: f64 = 1e-12;
const POLISH_ITERATIONS: usize = 80;

/// Evaluate with Horner's rule
pub fn eval(coeffs: &[f64], z: Complex64) -> Complex64 {
    coeffs
        .iter()
        .fold(Complex64::new(0.0, 0.0), |acc, &c| acc * z + c)
}

/// Evaluate the polynomial and its first derivative
pub fn eval_with_derivative(coeffs: &[f64], z: Complex64) -> (Complex64, Complex64) {
    let mut y = Complex64::new(0.0, 0.0);
    let mut dy = Complex64::new(0.0, 0.0);
    for &c in coeffs {
        dy = dy * z + y;
        y = y * z + c;
    }
    (y, dy)
}

/// All complex roots, by Durand-Kerner iteration followed by Newton polishing.
///
/// Leading zero coefficients are ignored. A polynomial of degree `n` yields
/// `n` roots in no particular order.
pub fn roots(coeffs: &[f64]) -> Vec<Complex64> {
    let start = match coeffs.iter().position(|c| *c != 0.0) {
        Some(i) => i,
        None => return Vec::new(),
    };
    let lead = coeffs[start];
    let monic: Vec<f64> = coeffs[start..].iter().map(|c| c / lead).collect();
    let n = monic.len() - 1;
    if n == 0 {
        return Vec::new();
    }

    // Distinct starting points off the real axis
    let seed = Complex64::new(0.4, 0.9);
    let mut roots: Vec<Complex64> = (0..n).map(|k| seed.powu(k as u32)).collect();

    for _ in 0..MAX_ITERATIONS {
        let mut max_step: f64 = 0.0;
        for i in 0..n {
            let mut denom = Complex64::new(1.0, 0.0);
            for j in 0..n {
                if i != j {
                    denom *= roots[i] - roots[j];
                }
            }
            let step = if denom.norm() < 1e-300 {
                Complex64::new(1e-6, 1e-6)
            } else {
                eval(&monic, roots[i]) / denom
            };
            roots[i] -= step;
            max_step = max_step.max(step.norm());
        }
        if max_step < TOLERANCE {
            break;
        }
    }

    for root in roots.iter_mut() {
        *root = polish(&monic, *root);
    }
    roots
}

/// Newton iteration on one root; stops as soon as the residual stops shrinking
pub fn polish(coeffs: &[f64], root: Complex64) -> Complex64 {
    let mut z = root;
    let mut best = root;
    let mut best_residual = f64::INFINITY;

    for _ in 0..POLISH_ITERATIONS {
        let (y, dy) = eval_with_derivative(coeffs, z);
        let residual = y.norm();
        if residual >= best_residual {
            return best;
        }
        best_residual = residual;
        best = z;
        if dy.norm() == 0.0 || residual == 0.0 {
            return best;
        }
        z -= y / dy;
    }
    best
}
