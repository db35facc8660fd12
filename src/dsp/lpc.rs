//! Linear prediction: autocorrelation (Levinson-Durbin) and Burg solvers

use serde::{Deserialize, Serialize};

use crate::error::FrameDegeneracy;

/// How the all-pole model is fitted to a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LpcMethod {
    /// Levinson-Durbin on the frame's autocorrelation
    #[default]
    Autocorrelation,
    /// Burg's forward-backward lattice
    Burg,
}

impl LpcMethod {
    /// Fit an order-`order` model to the (already windowed) frame
    pub fn fit(self, x: &[f64], order: usize) -> Result<LpcModel, FrameDegeneracy> {
        match self {
            LpcMethod::Autocorrelation => levinson_durbin(&autocorrelation(x, order), order),
            LpcMethod::Burg => burg(x, order),
        }
    }
}

impl std::fmt::Display for LpcMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LpcMethod::Autocorrelation => write!(f, "autocorrelation"),
            LpcMethod::Burg => write!(f, "burg"),
        }
    }
}

/// All-pole model `A(z) = 1 + a1·z⁻¹ + ... + ap·z⁻ᵖ`
#[derive(Debug, Clone, PartialEq)]
pub struct LpcModel {
    /// `[1, a1, ..., ap]`
    pub coefficients: Vec<f64>,
    /// Reflection coefficients `k1..kp`
    pub reflection: Vec<f64>,
    /// Final prediction error energy
    pub error: f64,
}

impl LpcModel {
    pub fn order(&self) -> usize {
        self.coefficients.len().saturating_sub(1)
    }
}

/// Autocorrelation for lags `0..=max_lag`
pub fn autocorrelation(x: &[f64], max_lag: usize) -> Vec<f64> {
    (0..=max_lag)
        .map(|lag| {
            if lag >= x.len() {
                return 0.0;
            }
            x.iter().zip(&x[lag..]).map(|(a, b)| a * b).sum()
        })
        .collect()
}

/// In-place first-order pre-emphasis `y[n] = x[n] - coef·x[n-1]`
pub fn pre_emphasis(x: &mut [f64], coef: f64) {
    let mut prev = match x.first() {
        Some(&v) => v,
        None => return,
    };
    for v in x.iter_mut().skip(1) {
        let current = *v;
        *v -= coef * prev;
        prev = current;
    }
}

/// Pre-emphasis coefficient for a corner frequency
pub fn pre_emphasis_coefficient(corner_hz: f64, sample_rate: f64) -> f64 {
    (-2.0 * std::f64::consts::PI * corner_hz / sample_rate).exp()
}

/// Levinson-Durbin recursion on autocorrelation `r[0..=order]`.
///
/// A zero-energy frame is [`FrameDegeneracy::Silent`]. A reflection
/// coefficient of magnitude ≥ 1, or a prediction error that drops to zero or
/// below, is [`FrameDegeneracy::Unstable`].
pub fn levinson_durbin(r: &[f64], order: usize) -> Result<LpcModel, FrameDegeneracy> {
    if r.len() < order + 1 {
        return Err(FrameDegeneracy::TooShort);
    }
    if r[0] <= 0.0 || !r[0].is_finite() {
        return Err(FrameDegeneracy::Silent);
    }

    let mut a = vec![0.0f64; order + 1];
    a[0] = 1.0;
    let mut reflection = Vec::with_capacity(order);
    let mut error = r[0];

    for i in 1..=order {
        let acc: f64 = r[i] + (1..i).map(|j| a[j] * r[i - j]).sum::<f64>();
        let k = -acc / error;
        if !k.is_finite() || k.abs() >= 1.0 {
            return Err(FrameDegeneracy::Unstable);
        }

        let previous = a.clone();
        a[i] = k;
        for j in 1..i {
            a[j] = previous[j] + k * previous[i - j];
        }
        reflection.push(k);

        error *= 1.0 - k * k;
        if error <= 0.0 {
            return Err(FrameDegeneracy::Unstable);
        }
    }

    Ok(LpcModel {
        coefficients: a,
        reflection,
        error,
    })
}

/// Burg's method on `x`.
///
/// Each stage picks the reflection coefficient that minimises the summed
/// forward and backward prediction error energy over the frame, so no
/// autocorrelation estimate (and no implicit zero padding) is involved.
/// Degeneracy reasons match [`levinson_durbin`].
pub fn burg(x: &[f64], order: usize) -> Result<LpcModel, FrameDegeneracy> {
    if x.len() <= order {
        return Err(FrameDegeneracy::TooShort);
    }
    let energy: f64 = x.iter().map(|v| v * v).sum();
    if energy <= 0.0 || !energy.is_finite() {
        return Err(FrameDegeneracy::Silent);
    }

    let mut forward = x.to_vec();
    let mut backward = x.to_vec();
    let mut a = vec![0.0f64; order + 1];
    a[0] = 1.0;
    let mut reflection = Vec::with_capacity(order);
    let mut error = energy;

    for m in 1..=order {
        let (mut num, mut den) = (0.0, 0.0);
        for n in m..x.len() {
            num += forward[n] * backward[n - 1];
            den += forward[n] * forward[n] + backward[n - 1] * backward[n - 1];
        }
        if den <= 0.0 {
            return Err(FrameDegeneracy::Unstable);
        }
        let k = -2.0 * num / den;
        if !k.is_finite() || k.abs() >= 1.0 {
            return Err(FrameDegeneracy::Unstable);
        }

        let previous = a.clone();
        for i in 1..=m {
            a[i] = previous[i] + k * previous[m - i];
        }

        // Descending so `backward[n - 1]` still holds the previous stage
        for n in (m..x.len()).rev() {
            let f = forward[n];
            forward[n] = f + k * backward[n - 1];
            backward[n] = backward[n - 1] + k * f;
        }

        reflection.push(k);
        error *= 1.0 - k * k;
        if error <= 0.0 {
            return Err(FrameDegeneracy::Unstable);
        }
    }

    Ok(LpcModel {
        coefficients: a,
        reflection,
        error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// `x[n] = 1.6·x[n-1] - 0.8·x[n-2] + e[n]` driven by deterministic noise
    fn ar2(len: usize) -> Vec<f64> {
        let mut state: u64 = 0x2545_F491_4F6C_DD1D;
        let (mut y1, mut y2) = (0.0, 0.0);
        (0..len)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                let e = (state >> 11) as f64 / (1u64 << 52) as f64 - 1.0;
                let y = 1.6 * y1 - 0.8 * y2 + e;
                y2 = y1;
                y1 = y;
                y
            })
            .collect()
    }

    #[test]
    fn test_autocorrelation() {
        let r = autocorrelation(&[1.0, 2.0, 3.0], 4);
        assert_eq!(r, vec![14.0, 8.0, 3.0, 0.0, 0.0]);
    }

    #[test]
    fn test_pre_emphasis() {
        let mut x = vec![1.0, 1.0, 1.0];
        pre_emphasis(&mut x, 0.5);
        assert_eq!(x, vec![1.0, 0.5, 0.5]);

        let mut empty: Vec<f64> = Vec::new();
        pre_emphasis(&mut empty, 0.9);
    }

    #[test]
    fn test_recovers_ar1() {
        // r[k] = 0.8^k is the autocorrelation of x[n] = 0.8 x[n-1] + e[n]
        let r: Vec<f64> = (0..=4).map(|k| 0.8f64.powi(k)).collect();
        let model = levinson_durbin(&r, 4).unwrap();
        assert!((model.coefficients[1] + 0.8).abs() < 1e-12);
        for &a in &model.coefficients[2..] {
            assert!(a.abs() < 1e-12);
        }
        assert!((model.error - 0.36).abs() < 1e-12);
        assert_eq!(model.order(), 4);
    }

    #[test]
    fn test_zero_energy_is_silent() {
        assert_eq!(
            levinson_durbin(&[0.0; 5], 4),
            Err(FrameDegeneracy::Silent)
        );
    }

    #[test]
    fn test_invalid_autocorrelation_is_unstable() {
        // |r1| > r0 cannot come from a real signal
        assert_eq!(
            levinson_durbin(&[1.0, 1.5, 0.0], 2),
            Err(FrameDegeneracy::Unstable)
        );
    }

    #[test]
    fn test_short_input() {
        assert_eq!(
            levinson_durbin(&[1.0, 0.5], 4),
            Err(FrameDegeneracy::TooShort)
        );
    }

    #[test]
    fn test_burg_recovers_ar2() {
        let model = burg(&ar2(4000), 2).unwrap();
        assert!((model.coefficients[1] + 1.6).abs() < 0.05, "{:?}", model);
        assert!((model.coefficients[2] - 0.8).abs() < 0.05, "{:?}", model);
        assert!(model.reflection.iter().all(|k| k.abs() < 1.0));
    }

    #[test]
    fn test_burg_agrees_with_autocorrelation() {
        let x = ar2(4000);
        let burg = LpcMethod::Burg.fit(&x, 4).unwrap();
        let ld = LpcMethod::Autocorrelation.fit(&x, 4).unwrap();
        for (b, l) in burg.coefficients.iter().zip(&ld.coefficients) {
            assert!((b - l).abs() < 0.05, "burg {:?} vs {:?}", burg, ld);
        }
    }

    #[test]
    fn test_burg_degenerate_frames() {
        assert_eq!(burg(&[0.0; 64], 4), Err(FrameDegeneracy::Silent));
        assert_eq!(burg(&[1.0, 2.0, 3.0], 4), Err(FrameDegeneracy::TooShort));
        // A constant frame is perfectly predicted by its first stage
        assert_eq!(burg(&[0.5; 64], 4), Err(FrameDegeneracy::Unstable));
    }
}
