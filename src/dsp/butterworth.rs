//! 4th-order Butterworth band-pass built from second-order sections,
//! applied forward and backward for zero phase.
//!
//! Each 4th-order stage is two biquads with the Butterworth pole Qs
//! (`1 / (2 cos(π/8))` and `1 / (2 cos(3π/8))`), designed with the bilinear
//! transform prewarped at the cutoff (RBJ cookbook form).  Sections run in
//! transposed direct form II.

use core::f64::consts::PI;

use super::odd_extend;

/// Pole quality factors of a 4th-order Butterworth prototype.
const BUTTER4_Q: [f64; 2] = [0.541_196_100_146_197, 1.306_562_964_876_376_7];

/// Upper cutoff is clamped to this fraction of the sample rate.
pub const MAX_CUTOFF_FRACTION: f64 = 0.45;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Biquad {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

impl Biquad {
    pub fn lowpass(cutoff_hz: f64, fs: f64, q: f64) -> Self {
        let (cos, alpha) = Self::prewarp(cutoff_hz, fs, q);
        let b = (1.0 - cos) / 2.0;
        Self::normalise(b, 1.0 - cos, b, 1.0 + alpha, -2.0 * cos, 1.0 - alpha)
    }

    pub fn highpass(cutoff_hz: f64, fs: f64, q: f64) -> Self {
        let (cos, alpha) = Self::prewarp(cutoff_hz, fs, q);
        let b = (1.0 + cos) / 2.0;
        Self::normalise(b, -(1.0 + cos), b, 1.0 + alpha, -2.0 * cos, 1.0 - alpha)
    }

    fn prewarp(cutoff_hz: f64, fs: f64, q: f64) -> (f64, f64) {
        let w0 = 2.0 * PI * cutoff_hz / fs;
        (w0.cos(), w0.sin() / (2.0 * q))
    }

    fn normalise(b0: f64, b1: f64, b2: f64, a0: f64, a1: f64, a2: f64) -> Self {
        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }

    /// Gain at DC.
    pub fn dc_gain(&self) -> f64 {
        (self.b0 + self.b1 + self.b2) / (1.0 + self.a1 + self.a2)
    }

    /// Filter `x` in place, starting from the steady state for a constant
    /// input equal to `x[0]`.
    fn run(&self, x: &mut [f64]) {
        let Some(&x0) = x.first() else { return };
        let y0 = self.dc_gain() * x0;
        let mut z2 = self.b2 * x0 - self.a2 * y0;
        let mut z1 = self.b1 * x0 - self.a1 * y0 + z2;

        for v in x.iter_mut() {
            let xi = *v;
            let yi = self.b0 * xi + z1;
            z1 = self.b1 * xi - self.a1 * yi + z2;
            z2 = self.b2 * xi - self.a2 * yi;
            *v = yi;
        }
    }
}

/// Cascade of biquads.
#[derive(Debug, Clone, PartialEq)]
pub struct SosFilter {
    sections: Vec<Biquad>,
}

impl SosFilter {
    /// 4th-order high-pass at `low_hz` cascaded with 4th-order low-pass at
    /// `high_hz` (clamped to `0.45 × fs`).  `None` if the band collapses.
    pub fn bandpass(low_hz: f64, high_hz: f64, fs: f64) -> Option<Self> {
        let high_hz = high_hz.min(MAX_CUTOFF_FRACTION * fs);
        if !(fs > 0.0 && low_hz > 0.0 && low_hz < high_hz) {
            return None;
        }
        let mut sections = Vec::with_capacity(4);
        sections.extend(BUTTER4_Q.iter().map(|&q| Biquad::highpass(low_hz, fs, q)));
        sections.extend(BUTTER4_Q.iter().map(|&q| Biquad::lowpass(high_hz, fs, q)));
        Some(Self { sections })
    }

    /// Causal single pass.
    pub fn filter(&self, x: &[f64]) -> Vec<f64> {
        let mut y = x.to_vec();
        for s in &self.sections {
            s.run(&mut y);
        }
        y
    }

    /// Zero-phase forward-backward filtering with `padlen` samples of odd
    /// extension at each end (limited to `len − 1`).
    pub fn filtfilt(&self, x: &[f64], padlen: usize) -> Vec<f64> {
        let n = x.len();
        if n < 2 {
            return x.to_vec();
        }
        let (ext, pad) = odd_extend(x, padlen);
        let mut y = self.filter(&ext);
        y.reverse();
        let mut y = self.filter(&y);
        y.reverse();
        y[pad..pad + n].to_vec()
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn tone(freq: f64, fs: f64, n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| (2.0 * PI * freq * i as f64 / fs).sin())
            .collect()
    }

    fn rms(x: &[f64]) -> f64 {
        (x.iter().map(|v| v * v).sum::<f64>() / x.len() as f64).sqrt()
    }

    #[test]
    fn section_dc_gains() {
        let lp = Biquad::lowpass(5.0, 20.0, BUTTER4_Q[0]);
        let hp = Biquad::highpass(0.5, 20.0, BUTTER4_Q[1]);
        assert_relative_eq!(lp.dc_gain(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(hp.dc_gain(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn passes_heart_band_rejects_drift_and_noise() {
        let fs = 20.0;
        let f = SosFilter::bandpass(0.5, 5.0, fs).unwrap();
        let n = 2000;
        let mid = 500..1500;

        let pass = f.filtfilt(&tone(1.2, fs, n), 80);
        assert_relative_eq!(
            rms(&pass[mid.clone()]),
            core::f64::consts::FRAC_1_SQRT_2,
            epsilon = 0.01
        );

        let drift = f.filtfilt(&tone(0.05, fs, n), 80);
        assert!(rms(&drift[mid.clone()]) < 1e-3);

        let hiss = f.filtfilt(&tone(8.0, fs, n), 80);
        assert!(rms(&hiss[mid]) < 1e-3);
    }

    #[test]
    fn filtfilt_is_zero_phase() {
        let fs = 20.0;
        let f = SosFilter::bandpass(0.5, 5.0, fs).unwrap();
        let x = tone(1.0, fs, 1000);
        let y = f.filtfilt(&x, 80);
        // Peak of the input at i = 5 (quarter period) stays at i ≈ 5 + k·20.
        let seg = &y[400..420];
        let argmax = seg
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i + 400)
            .unwrap();
        assert_eq!(argmax % 20, 5);
    }

    #[test]
    fn constant_input_has_no_startup_transient() {
        let f = SosFilter::bandpass(0.5, 5.0, 20.0).unwrap();
        let y = f.filter(&[100.0; 50]);
        assert!(y.iter().all(|v| v.abs() < 1e-9));
    }

    #[test]
    fn upper_edge_clamped_and_collapsed_band_rejected() {
        assert!(SosFilter::bandpass(0.5, 50.0, 10.0).is_some());
        assert!(SosFilter::bandpass(0.5, 5.0, 1.0).is_none());
        assert!(SosFilter::bandpass(2.0, 1.0, 20.0).is_none());
    }
}
