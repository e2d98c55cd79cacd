//! Oscillometric signal processing.
//!
//! ```text
//!  DeflateRun ─▶ detrend ─▶ bandpass (filtfilt) ─▶ |analytic| ─▶ Savitzky–Golay
//!   p(t)          linear      0.5–5 Hz, 4th order     envelope      envelope
//!    │                                                                 │
//!    │                                                                 ▼
//!    └──── p[index] ────────────▶ MAP / SYS / DIA ◀──────────── ratio thresholds
//!                                        │
//!                                  validate + quality
//! ```
//!
//! Landmark pressures are the recorded cuff pressures at the envelope
//! indices of the peak and the two crossings.

pub mod butterworth;
pub mod estimate;
pub mod hilbert;
pub mod savgol;

use log::{debug, warn};

use crate::config::EstimateConfig;
use crate::error::AbortReason;
use crate::measurement::{DeflateRun, EnvelopeTrace, MeasurementResult, Quality};

use self::butterworth::SosFilter;

/// Minimum odd-extension length for forward-backward filtering.
const MIN_PADLEN: usize = 27;

/// Fraction of the run at each end used as the envelope noise floor.
const SNR_EDGE_FRACTION: f64 = 0.10;

// ---------------------------------------------------------------------------
// Least squares
// ---------------------------------------------------------------------------

/// Least-squares polynomial fit `y ≈ Σ c[k]·x^k`.  Returns the
/// `degree + 1` coefficients, or `None` if the system is singular.
pub(crate) fn fit_poly(x: &[f64], y: &[f64], degree: usize) -> Option<Vec<f64>> {
    let m = degree + 1;
    if x.len() != y.len() || x.len() < m {
        return None;
    }

    // Normal equations: A[j][k] = Σ x^(j+k), b[j] = Σ y·x^j.
    let mut powers = vec![0.0; 2 * degree + 1];
    let mut b = vec![0.0; m];
    for (&xi, &yi) in x.iter().zip(y) {
        let mut p = 1.0;
        for (k, s) in powers.iter_mut().enumerate() {
            *s += p;
            if k < m {
                b[k] += yi * p;
            }
            p *= xi;
        }
    }
    let mut a: Vec<Vec<f64>> = (0..m).map(|j| powers[j..j + m].to_vec()).collect();

    // Gaussian elimination with partial pivoting.
    for col in 0..m {
        let pivot = (col..m).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
        if a[pivot][col].abs() < 1e-12 {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);
        for row in col + 1..m {
            let f = a[row][col] / a[col][col];
            for k in col..m {
                a[row][k] -= f * a[col][k];
            }
            b[row] -= f * b[col];
        }
    }
    let mut c = vec![0.0; m];
    for row in (0..m).rev() {
        let tail: f64 = (row + 1..m).map(|k| a[row][k] * c[k]).sum();
        c[row] = (b[row] - tail) / a[row][row];
    }
    Some(c)
}

/// Point-reflect `pad` samples (at most `len − 1`) about each end of `x`.
/// Returns the extended signal and the pad actually used.
pub(crate) fn odd_extend(x: &[f64], pad: usize) -> (Vec<f64>, usize) {
    let n = x.len();
    let pad = pad.min(n.saturating_sub(1));
    if pad == 0 {
        return (x.to_vec(), 0);
    }
    let (first, last) = (x[0], x[n - 1]);
    let mut ext = Vec::with_capacity(n + 2 * pad);
    ext.extend((1..=pad).rev().map(|i| 2.0 * first - x[i]));
    ext.extend_from_slice(x);
    ext.extend((1..=pad).map(|i| 2.0 * last - x[n - 1 - i]));
    (ext, pad)
}

/// Remove the least-squares line from `y(t)`.  Returns the residual and the
/// fitted slope (units of `y` per unit `t`).
pub fn detrend(t: &[f64], y: &[f64]) -> (Vec<f64>, f64) {
    if t.is_empty() {
        return (Vec::new(), 0.0);
    }
    let t_mean = t.iter().sum::<f64>() / t.len() as f64;
    let tc: Vec<f64> = t.iter().map(|v| v - t_mean).collect();
    match fit_poly(&tc, y, 1) {
        Some(c) => {
            let residual = tc.iter().zip(y).map(|(x, v)| v - (c[0] + c[1] * x)).collect();
            (residual, c[1])
        }
        None => {
            let mean = y.iter().sum::<f64>() / y.len() as f64;
            (y.iter().map(|v| v - mean).collect(), 0.0)
        }
    }
}

// ---------------------------------------------------------------------------
// SignalProcessor
// ---------------------------------------------------------------------------

/// Intermediate products of one pass over a run.
struct Envelope {
    pressure: Vec<f64>,
    smoothed: Vec<f64>,
    slope: f64,
    sample_rate_hz: f64,
}

/// Turns a finished deflate trace into SYS/DIA/MAP.
#[derive(Debug, Clone, Copy)]
pub struct SignalProcessor {
    config: EstimateConfig,
}

impl SignalProcessor {
    pub fn new(config: EstimateConfig) -> Self {
        Self { config }
    }

    /// Smoothed oscillation envelope of `run`, index-aligned with its
    /// samples.  `None` if the run is too short, its sample rate cannot
    /// support the passband, or it contains non-finite pressures.
    pub fn envelope_trace(&self, run: &DeflateRun) -> Option<EnvelopeTrace> {
        self.envelope(run).map(|e| EnvelopeTrace {
            pressure: e.pressure,
            envelope: e.smoothed,
        })
    }

    fn envelope(&self, run: &DeflateRun) -> Option<Envelope> {
        let cfg = &self.config;
        let n = run.len();
        if n < cfg.min_samples.max(3) {
            debug!("DSP: run too short ({n} samples)");
            return None;
        }
        let t: Vec<f64> = run.samples().iter().map(|s| s.t_secs).collect();
        let p: Vec<f64> = run.samples().iter().map(|s| s.pressure_mmhg).collect();
        if p.iter().any(|v| !v.is_finite()) {
            warn!("DSP: non-finite pressure in run {}", run.session_id);
            return None;
        }

        let fs = run.sample_rate_hz();
        let Some(filter) = SosFilter::bandpass(cfg.passband_low_hz, cfg.passband_high_hz, fs) else {
            warn!(
                "DSP: {fs:.1} Hz cannot carry a {:.1}–{:.1} Hz passband",
                cfg.passband_low_hz, cfg.passband_high_hz
            );
            return None;
        };

        let (residual, slope) = detrend(&t, &p);
        let padlen = MIN_PADLEN.max((2.0 * fs / cfg.passband_low_hz).ceil() as usize);
        let oscillation = filter.filtfilt(&residual, padlen);

        let raw = hilbert::envelope_padded(&oscillation, padlen);
        let window = savgol::window_for(fs, cfg.savgol_degree);
        let smoothed = savgol::smooth(&raw, window, cfg.savgol_degree);

        Some(Envelope {
            pressure: p,
            smoothed,
            slope,
            sample_rate_hz: fs,
        })
    }

    /// Run the full pipeline.  Rejections come back as results with
    /// `valid == false` and an algorithmic `abort_reason`.
    pub fn analyze(&self, run: &DeflateRun) -> MeasurementResult {
        let cfg = &self.config;
        let base_quality = Quality {
            sample_count: run.len(),
            sample_rate_hz: run.sample_rate_hz(),
            invalid_samples: run.invalid_samples,
            ..Quality::default()
        };
        let reject = |quality: Quality| MeasurementResult {
            quality,
            ..MeasurementResult::aborted(AbortReason::NoValidEnvelope)
        };

        let Some(env) = self.envelope(run) else {
            return reject(base_quality);
        };
        let Some((map_idx, peak)) = estimate::find_map(&env.smoothed) else {
            return reject(base_quality);
        };

        let quality = Quality {
            peak_amplitude: peak,
            avg_dpdt: -env.slope,
            envelope_snr_proxy: snr_proxy(&env.smoothed, peak),
            sample_rate_hz: env.sample_rate_hz,
            ..base_quality
        };

        if peak < cfg.min_peak_amplitude_mmhg {
            debug!("DSP: peak envelope {peak:.3} mmHg below floor");
            return reject(quality);
        }

        let map = env.pressure[map_idx];
        let sys_idx = estimate::find_sys(&env.smoothed, map_idx, cfg.sys_frac * peak);
        let dia_idx = estimate::find_dia(&env.smoothed, map_idx, cfg.dia_frac * peak);
        let (Some(sys_idx), Some(dia_idx)) = (sys_idx, dia_idx) else {
            debug!(
                "DSP: missing crossing (sys {sys_idx:?}, dia {dia_idx:?}) around MAP {map:.1}"
            );
            return MeasurementResult {
                map_mmhg: map,
                ..reject(quality)
            };
        };

        let sys = env.pressure[sys_idx];
        let dia = env.pressure[dia_idx];
        let pulse_pressure = sys - dia;
        let mut result = MeasurementResult {
            systolic_mmhg: sys,
            diastolic_mmhg: dia,
            map_mmhg: map,
            pulse_pressure_mmhg: pulse_pressure,
            valid: true,
            abort_reason: None,
            quality,
        };

        if !(dia < map && map < sys) {
            debug!("DSP: ordering violated (SYS {sys:.1}, MAP {map:.1}, DIA {dia:.1})");
            return result.rejected(AbortReason::NoValidEnvelope);
        }
        if !(cfg.min_pulse_pressure_mmhg..=cfg.max_pulse_pressure_mmhg).contains(&pulse_pressure) {
            debug!("DSP: pulse pressure {pulse_pressure:.1} mmHg out of range");
            result = result.rejected(AbortReason::InvalidPulsePressure);
        }
        result
    }
}

/// Peak envelope over the mean envelope in the outer edges of the run.
fn snr_proxy(envelope: &[f64], peak: f64) -> f64 {
    let n = envelope.len();
    let edge = ((n as f64 * SNR_EDGE_FRACTION) as usize).max(1).min(n / 2);
    if edge == 0 {
        return 0.0;
    }
    let floor = envelope[..edge]
        .iter()
        .chain(&envelope[n - edge..])
        .sum::<f64>()
        / (2 * edge) as f64;
    peak / floor.max(1e-9)
}

#[cfg(test)]
mod tests {
    use core::f64::consts::TAU;

    use approx::assert_relative_eq;

    use super::*;
    use crate::measurement::PressureSample;
    use crate::sim::SimPatient;

    const FS: f64 = 20.0;

    fn estimate_config() -> EstimateConfig {
        EstimateConfig {
            sys_frac: 0.55,
            dia_frac: 0.80,
            ..EstimateConfig::default()
        }
    }

    /// Linear deflation from `from` to `to` over `secs`, with the patient's
    /// oscillation superimposed.
    fn deflate_run(patient: Option<SimPatient>, from: f64, to: f64, secs: f64) -> DeflateRun {
        let n = (secs * FS) as usize;
        let rate = (from - to) / secs;
        DeflateRun::from_samples(
            1,
            (0..=n).map(|i| {
                let t = i as f64 / FS;
                let p = from - rate * t;
                let osc = patient.map_or(0.0, |pt| {
                    pt.amplitude_at(p) * (TAU * pt.heart_rate_hz * t).sin()
                });
                PressureSample {
                    t_secs: t,
                    pressure_mmhg: p + osc,
                    duty: 20,
                }
            }),
        )
    }

    #[test]
    fn fit_poly_recovers_quadratic() {
        let x: Vec<f64> = (-5..=5).map(f64::from).collect();
        let y: Vec<f64> = x.iter().map(|v| 2.0 - 0.5 * v + 0.25 * v * v).collect();
        let c = fit_poly(&x, &y, 2).unwrap();
        assert_relative_eq!(c[0], 2.0, epsilon = 1e-9);
        assert_relative_eq!(c[1], -0.5, epsilon = 1e-9);
        assert_relative_eq!(c[2], 0.25, epsilon = 1e-9);
    }

    #[test]
    fn fit_poly_rejects_degenerate_input() {
        assert!(fit_poly(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0], 1).is_none());
        assert!(fit_poly(&[1.0], &[1.0], 1).is_none());
    }

    #[test]
    fn odd_extension_reflects_about_endpoints() {
        let (ext, pad) = odd_extend(&[1.0, 2.0, 4.0], 2);
        assert_eq!(pad, 2);
        assert_eq!(ext, vec![-2.0, 0.0, 1.0, 2.0, 4.0, 6.0, 7.0]);
        assert_eq!(odd_extend(&[1.0, 2.0], 10).1, 1);
        assert_eq!(odd_extend(&[5.0], 3), (vec![5.0], 0));
    }

    #[test]
    fn detrend_removes_ramp() {
        let t: Vec<f64> = (0..100).map(|i| f64::from(i) * 0.05).collect();
        let y: Vec<f64> = t.iter().map(|v| 180.0 - 3.0 * v).collect();
        let (r, slope) = detrend(&t, &y);
        assert_relative_eq!(slope, -3.0, epsilon = 1e-9);
        assert!(r.iter().all(|v| v.abs() < 1e-9));
    }

    #[test]
    fn map_located_at_injected_peak() {
        let k = 400;
        let sigma = 60.0;
        let run = DeflateRun::from_samples(
            1,
            (0..1000).map(|i| {
                let t = i as f64 / FS;
                let z = (i as f64 - k as f64) / sigma;
                let amp = 2.0 * (-0.5 * z * z).exp();
                PressureSample {
                    t_secs: t,
                    pressure_mmhg: 150.0 - 2.5 * t + amp * (TAU * 1.2 * t).sin(),
                    duty: 20,
                }
            }),
        );
        let trace = SignalProcessor::new(estimate_config()).envelope_trace(&run).unwrap();
        assert_eq!(trace.len(), run.len());
        let (idx, peak) = estimate::find_map(&trace.envelope).unwrap();
        assert!(idx.abs_diff(k) <= 1, "peak at {idx}, expected {k}");
        assert_relative_eq!(peak, 2.0, epsilon = 0.05);
    }

    #[test]
    fn sys_dia_within_two_mmhg() {
        let patient = SimPatient::new(125.0, 82.0, 0.55, 0.80);
        let run = deflate_run(Some(patient), 180.0, 40.0, 50.0);
        let r = SignalProcessor::new(estimate_config()).analyze(&run);

        assert!(r.valid, "{r:?}");
        assert_eq!(r.abort_reason, None);
        assert!((r.systolic_mmhg - 125.0).abs() <= 2.0, "SYS {}", r.systolic_mmhg);
        assert!((r.diastolic_mmhg - 82.0).abs() <= 2.0, "DIA {}", r.diastolic_mmhg);
        assert!((r.map_mmhg - patient.map_mmhg()).abs() <= 2.0, "MAP {}", r.map_mmhg);
        assert!(r.diastolic_mmhg < r.map_mmhg && r.map_mmhg < r.systolic_mmhg);
        assert_relative_eq!(
            r.pulse_pressure_mmhg,
            r.systolic_mmhg - r.diastolic_mmhg,
            epsilon = 1e-12
        );
    }

    #[test]
    fn landmarks_read_from_recorded_pressures() {
        let patient = SimPatient::new(125.0, 82.0, 0.55, 0.80);
        let run = deflate_run(Some(patient), 180.0, 40.0, 50.0);
        let cfg = estimate_config();
        let dsp = SignalProcessor::new(cfg);
        let r = dsp.analyze(&run);
        assert!(r.valid, "{r:?}");

        let trace = dsp.envelope_trace(&run).unwrap();
        let recorded: Vec<f64> = run.samples().iter().map(|s| s.pressure_mmhg).collect();
        assert_eq!(trace.pressure, recorded);

        let (map_idx, peak) = estimate::find_map(&trace.envelope).unwrap();
        let sys_idx = estimate::find_sys(&trace.envelope, map_idx, cfg.sys_frac * peak).unwrap();
        let dia_idx = estimate::find_dia(&trace.envelope, map_idx, cfg.dia_frac * peak).unwrap();
        assert_eq!(r.map_mmhg, run.samples()[map_idx].pressure_mmhg);
        assert_eq!(r.systolic_mmhg, run.samples()[sys_idx].pressure_mmhg);
        assert_eq!(r.diastolic_mmhg, run.samples()[dia_idx].pressure_mmhg);
    }

    #[test]
    fn quality_block_populated() {
        let patient = SimPatient::new(125.0, 82.0, 0.55, 0.80);
        let run = deflate_run(Some(patient), 180.0, 40.0, 50.0);
        let q = SignalProcessor::new(estimate_config()).analyze(&run).quality;

        assert_eq!(q.sample_count, run.len());
        assert_relative_eq!(q.sample_rate_hz, FS, epsilon = 1e-6);
        assert_relative_eq!(q.avg_dpdt, 2.8, epsilon = 0.05);
        assert_relative_eq!(q.peak_amplitude, 2.0, epsilon = 0.05);
        assert!(q.envelope_snr_proxy > 5.0, "snr {}", q.envelope_snr_proxy);
    }

    #[test]
    fn flat_trace_has_no_envelope() {
        let run = deflate_run(None, 180.0, 40.0, 50.0);
        let r = SignalProcessor::new(estimate_config()).analyze(&run);
        assert!(!r.valid);
        assert_eq!(r.abort_reason, Some(AbortReason::NoValidEnvelope));
        assert_eq!(r.quality.sample_count, run.len());
    }

    #[test]
    fn wide_pulse_pressure_rejected_with_values() {
        let patient = SimPatient::new(160.0, 60.0, 0.55, 0.80);
        let run = deflate_run(Some(patient), 190.0, 30.0, 50.0);
        let r = SignalProcessor::new(estimate_config()).analyze(&run);

        assert!(!r.valid);
        assert_eq!(r.abort_reason, Some(AbortReason::InvalidPulsePressure));
        assert!(r.pulse_pressure_mmhg > 80.0, "pp {}", r.pulse_pressure_mmhg);
    }

    #[test]
    fn short_run_rejected() {
        let patient = SimPatient::new(125.0, 82.0, 0.55, 0.80);
        let run = deflate_run(Some(patient), 130.0, 128.0, 1.0);
        let dsp = SignalProcessor::new(estimate_config());
        assert_eq!(dsp.analyze(&run).abort_reason, Some(AbortReason::NoValidEnvelope));
        assert!(dsp.envelope_trace(&DeflateRun::default()).is_none());
    }

    #[test]
    fn envelope_starting_above_threshold_rejected() {
        // Deflation starts below SYS: no upward crossing before MAP.
        let patient = SimPatient::new(125.0, 82.0, 0.55, 0.80);
        let run = deflate_run(Some(patient), 110.0, 40.0, 30.0);
        let r = SignalProcessor::new(estimate_config()).analyze(&run);
        assert!(!r.valid);
        assert_eq!(r.abort_reason, Some(AbortReason::NoValidEnvelope));
    }

    mod proptests {
        use proptest::prelude::*;

        use super::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(32))]

            #[test]
            fn valid_results_are_ordered(
                sys in 100.0f64..160.0,
                pp in 25.0f64..60.0,
                rate in 2.0f64..4.0,
            ) {
                let dia = sys - pp;
                let patient = SimPatient::new(sys, dia, 0.55, 0.80);
                let from = sys + 50.0;
                let to = (dia - 30.0).max(20.0);
                let run = deflate_run(Some(patient), from, to, (from - to) / rate);
                let r = SignalProcessor::new(estimate_config()).analyze(&run);
                if r.valid {
                    prop_assert!(r.diastolic_mmhg < r.map_mmhg);
                    prop_assert!(r.map_mmhg < r.systolic_mmhg);
                    prop_assert!((20.0..=80.0).contains(&r.pulse_pressure_mmhg));
                }
                prop_assert!((r.systolic_mmhg - sys).abs() <= 3.0 || !r.valid);
            }
        }
    }
}
