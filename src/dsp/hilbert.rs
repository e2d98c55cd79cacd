//! Analytic-signal envelope via FFT.
//!
//! `X = FFT(x)`; zero the negative frequencies, double the positive ones,
//! keep DC (and Nyquist for even lengths); the magnitude of the inverse
//! transform is the instantaneous amplitude of `x`.

use core::f64::consts::PI;

use num_complex::Complex64;
use rustfft::FftPlanner;

use super::odd_extend;

/// Instantaneous amplitude `|x + j·H{x}|` of a real signal.
pub fn envelope(x: &[f64]) -> Vec<f64> {
    let n = x.len();
    if n == 0 {
        return Vec::new();
    }

    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(n);
    let ifft = planner.plan_fft_inverse(n);

    let mut buf: Vec<Complex64> = x.iter().map(|&v| Complex64::new(v, 0.0)).collect();
    fft.process(&mut buf);

    let half = n / 2;
    for (k, c) in buf.iter_mut().enumerate() {
        let h = if k == 0 || (n % 2 == 0 && k == half) {
            1.0
        } else if k <= half {
            2.0
        } else {
            0.0
        };
        *c *= h;
    }

    ifft.process(&mut buf);
    let scale = 1.0 / n as f64;
    buf.iter().map(|c| c.norm() * scale).collect()
}

/// [`envelope`] computed over an odd extension of `pad` samples at each
/// end.  The extensions are faded to zero with a raised-cosine taper and
/// the transform is zero-padded to at least twice the extended length, so
/// the far end of the trace does not wrap onto the near one.
pub fn envelope_padded(x: &[f64], pad: usize) -> Vec<f64> {
    let (mut ext, pad) = odd_extend(x, pad);
    if ext.is_empty() {
        return Vec::new();
    }
    let len = ext.len();
    for i in 0..pad {
        let w = 0.5 - 0.5 * (PI * (i as f64 + 0.5) / pad as f64).cos();
        ext[i] *= w;
        ext[len - 1 - i] *= w;
    }
    ext.resize((2 * len).next_power_of_two(), 0.0);
    let env = envelope(&ext);
    env[pad..pad + x.len()].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_amplitude_tone() {
        let x: Vec<f64> = (0..400)
            .map(|i| 1.5 * (2.0 * PI * 10.0 * i as f64 / 400.0).cos())
            .collect();
        let env = envelope(&x);
        assert!(env.iter().all(|v| (v - 1.5).abs() < 1e-9));
    }

    #[test]
    fn tracks_slow_amplitude_modulation() {
        let n = 1000;
        let fs = 20.0;
        let amp = |i: usize| 1.0 + 0.5 * (2.0 * PI * 0.02 * i as f64 / fs).sin();
        let x: Vec<f64> = (0..n)
            .map(|i| amp(i) * (2.0 * PI * 1.2 * i as f64 / fs).sin())
            .collect();
        let env = envelope(&x);
        for i in 100..900 {
            assert!((env[i] - amp(i)).abs() < 0.05, "i={i}: {} vs {}", env[i], amp(i));
        }
    }

    #[test]
    fn padding_suppresses_edge_dip() {
        let fs = 20.0;
        let x: Vec<f64> = (0..400)
            .map(|i| (2.0 * PI * 1.2 * i as f64 / fs).sin())
            .collect();
        let env = envelope_padded(&x, 80);
        assert_eq!(env.len(), x.len());
        assert!(env[..20].iter().all(|v| (v - 1.0).abs() < 0.1), "{:?}", &env[..20]);
        assert!(envelope_padded(&[], 80).is_empty());
    }

    #[test]
    fn far_edge_does_not_wrap_onto_near_edge() {
        // Both tones end mid-cycle, so their odd extensions carry an offset
        // at the far end.
        for (freq, n) in [(1.0, 300), (1.5, 500)] {
            let x: Vec<f64> = (0..n)
                .map(|i| (2.0 * PI * freq * i as f64 / 20.0).sin())
                .collect();
            let env = envelope_padded(&x, 80);
            let head = &env[..20];
            assert!(head.iter().all(|v| (v - 1.0).abs() < 0.05), "{freq} Hz: {head:?}");
        }
    }

    #[test]
    fn odd_length_and_empty() {
        assert!(envelope(&[]).is_empty());
        assert_eq!(envelope(&[1.0, -1.0, 1.0]).len(), 3);
    }
}
