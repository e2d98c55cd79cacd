//! Achieved deflation rate per LUT bin.
//!
//! The deflate LUT is retuned offline by comparing the rate each bin
//! actually produced against the 2–4 mmHg/s target.  This module turns a
//! finished [`DeflateRun`] into that per-bin report; it is attached to the
//! measurement's quality block and never fed back within a session.

use serde::{Deserialize, Serialize};

use crate::calibration::DeflateLut;
use crate::measurement::DeflateRun;

/// Deflation target band used to flag bins for retuning (mmHg/s).
pub const TARGET_DPDT_MIN: f64 = 2.0;
pub const TARGET_DPDT_MAX: f64 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BinRate {
    /// Bin lower bound (mmHg).
    pub bin_mmhg: f64,
    /// Duty the LUT prescribes for the bin.
    pub duty: u8,
    /// Achieved deflation rate, positive when falling (mmHg/s).
    pub dpdt: f64,
    pub samples: usize,
}

impl BinRate {
    pub fn in_target(&self) -> bool {
        (TARGET_DPDT_MIN..=TARGET_DPDT_MAX).contains(&self.dpdt)
    }
}

/// Least-squares deflation rate of every bin that received at least
/// three samples, in LUT order.
pub fn achieved_rates(run: &DeflateRun, lut: &DeflateLut) -> Vec<BinRate> {
    let mut out = Vec::with_capacity(lut.len());
    for (idx, entry) in lut.entries().iter().enumerate() {
        let (t, p): (Vec<f64>, Vec<f64>) = run
            .samples()
            .iter()
            .filter(|s| lut.bin_index(s.pressure_mmhg) == Some(idx))
            .map(|s| (s.t_secs, s.pressure_mmhg))
            .unzip();
        if t.len() < 3 {
            continue;
        }
        if let Some(slope) = slope(&t, &p) {
            out.push(BinRate {
                bin_mmhg: entry.bin_mmhg,
                duty: entry.duty,
                dpdt: -slope,
                samples: t.len(),
            });
        }
    }
    out
}

fn slope(x: &[f64], y: &[f64]) -> Option<f64> {
    let n = x.len() as f64;
    let mx = x.iter().sum::<f64>() / n;
    let my = y.iter().sum::<f64>() / n;
    let (mut sxy, mut sxx) = (0.0, 0.0);
    for (&xi, &yi) in x.iter().zip(y) {
        sxy += (xi - mx) * (yi - my);
        sxx += (xi - mx) * (xi - mx);
    }
    (sxx > 0.0).then(|| sxy / sxx)
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::calibration::LutEntry;
    use crate::measurement::PressureSample;

    #[test]
    fn rates_per_bin() {
        let lut = DeflateLut::from_entries([
            LutEntry { bin_mmhg: 150.0, duty: 30 },
            LutEntry { bin_mmhg: 120.0, duty: 50 },
        ])
        .unwrap();
        // 3 mmHg/s above 150, then 2 mmHg/s.
        let mut samples = Vec::new();
        let mut p = 180.0;
        for i in 0..400 {
            let t = f64::from(i) * 0.05;
            samples.push(PressureSample { t_secs: t, pressure_mmhg: p, duty: lut.lookup(p) });
            p -= if p >= 150.0 { 0.15 } else { 0.10 };
        }
        let run = DeflateRun::from_samples(1, samples);
        let rates = achieved_rates(&run, &lut);

        assert_eq!(rates.len(), 2);
        assert_relative_eq!(rates[0].dpdt, 3.0, epsilon = 1e-6);
        assert_relative_eq!(rates[1].dpdt, 2.0, epsilon = 1e-6);
        assert!(rates[0].in_target());
        assert_eq!(rates[1].duty, 50);
    }

    #[test]
    fn sparse_bins_are_skipped() {
        let lut = DeflateLut::from_entries([LutEntry { bin_mmhg: 100.0, duty: 40 }]).unwrap();
        let run = DeflateRun::from_samples(
            1,
            [
                PressureSample { t_secs: 0.0, pressure_mmhg: 110.0, duty: 40 },
                PressureSample { t_secs: 0.1, pressure_mmhg: 109.0, duty: 40 },
            ],
        );
        assert!(achieved_rates(&run, &lut).is_empty());
    }
}
