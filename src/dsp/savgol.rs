//! Savitzky–Golay smoothing: a sliding least-squares polynomial fit.
//!
//! Interior points use a centred window; the first and last `window / 2`
//! points are evaluated from the fit over the first/last full window, so
//! the output has no edge shrinkage.

use super::fit_poly;

/// Odd window of roughly `fs / 5` samples, at least `degree + 2`.
pub fn window_for(sample_rate_hz: f64, degree: usize) -> usize {
    let target = (sample_rate_hz / 5.0).round().max(0.0) as usize;
    let w = target.max(degree + 2);
    if w % 2 == 0 { w + 1 } else { w }
}

/// Smooth `x` with a degree-`degree` polynomial over `window` samples.
///
/// The window is shrunk to the largest odd length ≤ `x.len()`; if that
/// leaves no more points than coefficients the input is returned as is.
pub fn smooth(x: &[f64], window: usize, degree: usize) -> Vec<f64> {
    let n = x.len();
    let mut w = window.min(n);
    if w % 2 == 0 {
        w = w.saturating_sub(1);
    }
    if w <= degree {
        return x.to_vec();
    }
    let half = w / 2;

    let mut out = Vec::with_capacity(n);
    let mut xs = vec![0.0; w];
    for i in 0..n {
        let start = i.saturating_sub(half).min(n - w);
        for (j, v) in xs.iter_mut().enumerate() {
            *v = (start + j) as f64 - i as f64;
        }
        let value = fit_poly(&xs, &x[start..start + w], degree).map_or(x[i], |c| c[0]);
        out.push(value);
    }
    out
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn window_sizing() {
        assert_eq!(window_for(20.0, 2), 5);
        assert_eq!(window_for(40.0, 2), 9);
        assert_eq!(window_for(10.0, 2), 5);
        assert_eq!(window_for(10.0, 4), 7);
    }

    #[test]
    fn preserves_polynomials_up_to_degree() {
        let x: Vec<f64> = (0..30)
            .map(|i| 0.5 * f64::from(i).powi(2) - 3.0 * f64::from(i) + 1.0)
            .collect();
        let y = smooth(&x, 7, 2);
        for (a, b) in x.iter().zip(&y) {
            assert_relative_eq!(a, b, epsilon = 1e-6);
        }
    }

    #[test]
    fn reduces_alternating_noise() {
        let x: Vec<f64> = (0..40).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let y = smooth(&x, 5, 2);
        let peak = y[5..35].iter().fold(0.0_f64, |m, v| m.max(v.abs()));
        assert!(peak < 0.5);
    }

    #[test]
    fn short_input_passthrough() {
        assert_eq!(smooth(&[1.0, 2.0], 5, 2), vec![1.0, 2.0]);
    }
}
