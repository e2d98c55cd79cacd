//! Fuzz target: `SignalProcessor::analyze`
//!
//! Interprets the input as a stream of little-endian `f32` pressures
//! sampled at a rate taken from the first byte, and checks that analysis
//! never panics and that valid results are ordered.
//!
//! cargo fuzz run fuzz_analyze

#![no_main]

use cuffbp::config::EstimateConfig;
use cuffbp::dsp::SignalProcessor;
use cuffbp::measurement::{DeflateRun, PressureSample};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Some((&rate, body)) = data.split_first() else {
        return;
    };
    let dt = 1.0 / f64::from(rate.max(1));

    let run = DeflateRun::from_samples(
        1,
        body.chunks_exact(4).enumerate().map(|(i, b)| PressureSample {
            t_secs: i as f64 * dt,
            pressure_mmhg: f64::from(f32::from_le_bytes([b[0], b[1], b[2], b[3]])),
            duty: 50,
        }),
    );

    let r = SignalProcessor::new(EstimateConfig::default()).analyze(&run);
    if r.valid {
        assert!(r.diastolic_mmhg < r.map_mmhg && r.map_mmhg < r.systolic_mmhg);
        assert!(r.systolic_mmhg.is_finite() && r.diastolic_mmhg.is_finite());
    }
});
