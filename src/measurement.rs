//! Measurement data model: raw ADC samples, the deflate trace, and the
//! result handed to collaborators (GUI, MQTT, storage).
//!
//! `MeasurementResult` is the only type that leaves the engine; it
//! serializes to the JSON shape collaborators consume:
//!
//! ```json
//! { "systolic_mmhg": 121.0, "diastolic_mmhg": 79.5, "map_mmhg": 93.2,
//!   "pulse_pressure_mmhg": 41.5, "valid": true, "abort_reason": null,
//!   "quality": { "peak_amplitude": 1.9, "sample_count": 2400, ... } }
//! ```

use core::time::Duration;

use serde::{Deserialize, Serialize};

use crate::control::deflate::BinRate;
use crate::error::AbortReason;

/// One ADC transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawSample {
    pub timestamp: Duration,
    /// Signed 24-bit value (after optional inversion).
    pub counts: i32,
}

/// One point of the deflate trace.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PressureSample {
    /// Seconds since deflation started.
    pub t_secs: f64,
    pub pressure_mmhg: f64,
    /// Valve-open duty applied for the period that followed this reading.
    pub duty: u8,
}

// ---------------------------------------------------------------------------
// DeflateRun
// ---------------------------------------------------------------------------

/// One measurement attempt's deflate trace.
///
/// Created when the session enters DEFLATING and consumed by the signal
/// processor.  Never reused across sessions.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DeflateRun {
    pub session_id: u32,
    /// Cuff pressure when deflation started (mmHg).
    pub start_pressure: f64,
    samples: Vec<PressureSample>,
    pub abort_reason: Option<AbortReason>,
    /// Readings dropped from the trace (saturated or timed out).
    pub invalid_samples: u32,
}

impl DeflateRun {
    pub fn new(session_id: u32, start_pressure: f64) -> Self {
        Self {
            session_id,
            start_pressure,
            samples: Vec::with_capacity(4096),
            abort_reason: None,
            invalid_samples: 0,
        }
    }

    /// Build a run from pre-recorded samples (replay, tests).  Samples whose
    /// timestamp does not advance are dropped.
    pub fn from_samples(
        session_id: u32,
        samples: impl IntoIterator<Item = PressureSample>,
    ) -> Self {
        let mut run = Self::new(session_id, 0.0);
        for s in samples {
            run.push(s);
        }
        run.start_pressure = run.samples.first().map_or(0.0, |s| s.pressure_mmhg);
        run
    }

    /// Append a sample.  Returns `false` (and drops the sample) if `t` does
    /// not strictly increase.
    pub fn push(&mut self, sample: PressureSample) -> bool {
        if let Some(last) = self.samples.last() {
            if sample.t_secs <= last.t_secs {
                return false;
            }
        }
        self.samples.push(sample);
        true
    }

    pub fn record_invalid(&mut self) {
        self.invalid_samples = self.invalid_samples.saturating_add(1);
    }

    pub fn samples(&self) -> &[PressureSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Run length in seconds (first to last sample).
    pub fn duration_secs(&self) -> f64 {
        match (self.samples.first(), self.samples.last()) {
            (Some(a), Some(b)) => b.t_secs - a.t_secs,
            _ => 0.0,
        }
    }

    /// Mean sample rate over the run, 0 if fewer than two samples.
    pub fn sample_rate_hz(&self) -> f64 {
        let d = self.duration_secs();
        if self.samples.len() < 2 || d <= 0.0 {
            0.0
        } else {
            (self.samples.len() - 1) as f64 / d
        }
    }
}

// ---------------------------------------------------------------------------
// EnvelopeTrace
// ---------------------------------------------------------------------------

/// Smoothed oscillation envelope, index-aligned with the run it came from.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EnvelopeTrace {
    pub pressure: Vec<f64>,
    pub envelope: Vec<f64>,
}

impl EnvelopeTrace {
    pub fn len(&self) -> usize {
        self.envelope.len()
    }

    pub fn is_empty(&self) -> bool {
        self.envelope.is_empty()
    }
}

// ---------------------------------------------------------------------------
// MeasurementResult
// ---------------------------------------------------------------------------

/// Diagnostics for downstream accuracy auditing.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Quality {
    /// Envelope amplitude at MAP (mmHg).
    pub peak_amplitude: f64,
    /// Valid samples in the deflate trace.
    pub sample_count: usize,
    /// Average deflation rate, positive when pressure falls (mmHg/s).
    pub avg_dpdt: f64,
    /// Peak envelope over the mean envelope in the outer 10 % of the run.
    pub envelope_snr_proxy: f64,
    pub sample_rate_hz: f64,
    /// Readings dropped from the trace.
    pub invalid_samples: u32,
    /// Achieved deflation rate per LUT bin.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bin_rates: Vec<BinRate>,
}

/// Final output of a session.
///
/// If `valid`, `diastolic < map < systolic` and the pulse pressure lies in
/// the configured plausible range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementResult {
    pub systolic_mmhg: f64,
    pub diastolic_mmhg: f64,
    pub map_mmhg: f64,
    pub pulse_pressure_mmhg: f64,
    pub valid: bool,
    pub abort_reason: Option<AbortReason>,
    pub quality: Quality,
}

impl MeasurementResult {
    /// Result for a session that ended without a usable trace.
    pub fn aborted(reason: AbortReason) -> Self {
        Self {
            systolic_mmhg: 0.0,
            diastolic_mmhg: 0.0,
            map_mmhg: 0.0,
            pulse_pressure_mmhg: 0.0,
            valid: false,
            abort_reason: Some(reason),
            quality: Quality::default(),
        }
    }

    /// Attach an abort reason to an existing result, marking it invalid.
    #[must_use]
    pub fn rejected(mut self, reason: AbortReason) -> Self {
        self.valid = false;
        self.abort_reason = Some(reason);
        self
    }
}
