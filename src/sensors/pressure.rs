//! Cuff pressure transducer: HX710 counts → mmHg.
//!
//! Applies the session's [`CalibrationParams`].  Saturated conversions
//! are reported with `saturated = true` and still carry the (meaningless)
//! mmHg value; the control loop drops them from the trace.

use core::time::Duration;

use embedded_hal::digital::{InputPin, OutputPin};
use log::debug;

use crate::calibration::CalibrationParams;
use crate::drivers::hx710::{self, AdcStats, Hx710};
use crate::error::HwError;
use crate::hal::Clock;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PressureReading {
    pub counts: i32,
    pub mmhg: f64,
    pub saturated: bool,
}

pub struct PressureSensor<DOUT, SCK, C> {
    adc: Hx710<DOUT, SCK, C>,
    cal: CalibrationParams,
}

impl<DOUT, SCK, C> PressureSensor<DOUT, SCK, C>
where
    DOUT: InputPin,
    SCK: OutputPin,
    C: Clock,
{
    /// Wrap the ADC pins; the conversion mode and inversion come from `cal`.
    pub fn new(dout: DOUT, sck: SCK, clock: C, cal: CalibrationParams) -> Self {
        let adc = Hx710::new(dout, sck, clock, cal.sps_mode.adc_mode(), cal.adc_inverted);
        Self { adc, cal }
    }

    pub fn initialize(&mut self) -> Result<(), HwError> {
        self.adc.initialize()
    }

    pub fn read(&mut self, timeout: Duration) -> Result<PressureReading, HwError> {
        let counts = self.adc.read(timeout)?;
        let saturated = hx710::is_saturated(counts);
        if saturated {
            debug!("Pressure: saturated conversion ({counts})");
        }
        Ok(PressureReading {
            counts,
            mmhg: self.cal.counts_to_mmhg(counts),
            saturated,
        })
    }

    /// Switch to a new calibration (between sessions).
    pub fn set_calibration(&mut self, cal: CalibrationParams) {
        if cal.sps_mode != self.cal.sps_mode {
            self.adc.set_mode(cal.sps_mode.adc_mode());
        }
        self.adc.set_inverted(cal.adc_inverted);
        self.cal = cal;
    }

    pub fn calibration(&self) -> &CalibrationParams {
        &self.cal
    }

    pub fn power_down(&mut self) -> Result<(), HwError> {
        self.adc.power_down()
    }

    pub fn power_up(&mut self) -> Result<(), HwError> {
        self.adc.power_up()
    }

    pub fn stats(&self) -> AdcStats {
        self.adc.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SpsMode;
    use crate::sim::{SimAdc, SimClock, SimDout, SimSck};

    const TIMEOUT: Duration = Duration::from_millis(100);

    fn sensor(adc: &SimAdc, clock: &SimClock) -> PressureSensor<SimDout, SimSck, SimClock> {
        let (dout, sck) = adc.pins();
        let cal = CalibrationParams {
            offset_counts: 5_000,
            slope_mmhg_per_count: 2.0e-4,
            adc_inverted: false,
            sps_mode: SpsMode::Sps40,
        };
        PressureSensor::new(dout, sck, clock.clone(), cal)
    }

    #[test]
    fn offset_reads_zero_and_span_reads_150() {
        let clock = SimClock::new();
        let adc = SimAdc::new(clock.clone(), 40.0);
        let mut s = sensor(&adc, &clock);

        adc.set_counts(5_000);
        let r = s.read(TIMEOUT).unwrap();
        assert!(r.mmhg.abs() < f64::EPSILON);
        assert!(!r.saturated);

        let span = 5_000 + (150.0_f64 / 2.0e-4).round() as i32;
        adc.set_counts(span);
        let r = s.read(TIMEOUT).unwrap();
        assert!((r.mmhg - 150.0).abs() <= 2.0e-4);
    }

    #[test]
    fn saturation_is_flagged() {
        let clock = SimClock::new();
        let adc = SimAdc::new(clock.clone(), 40.0);
        let mut s = sensor(&adc, &clock);
        adc.set_counts(hx710::MAX_24);
        assert!(s.read(TIMEOUT).unwrap().saturated);
    }

    #[test]
    fn calibration_swap_applies_inversion() {
        let clock = SimClock::new();
        let adc = SimAdc::new(clock.clone(), 40.0);
        let mut s = sensor(&adc, &clock);
        let mut cal = *s.calibration();
        cal.adc_inverted = true;
        s.set_calibration(cal);

        adc.set_counts(-5_001);
        let r = s.read(TIMEOUT).unwrap();
        assert_eq!(r.counts, 5_000);
        assert!(r.mmhg.abs() < f64::EPSILON);
    }
}
