//! Hardware adapter: bridges the drivers to the engine's port traits.
//!
//! Owns the [`PressureSensor`] and the [`ActuatorController`], exposing
//! them through [`PressurePort`] and [`ActuatorPort`].  Generic over the
//! pin and clock types, so the same adapter wraps Raspberry Pi GPIO
//! (`rpi` feature) and the simulator's pins.

use core::time::Duration;

use embedded_hal::digital::{InputPin, OutputPin};

use crate::app::ports::{ActuatorPort, PressurePort};
use crate::calibration::CalibrationParams;
use crate::drivers::actuator::{ActuatorController, ActuatorState};
use crate::drivers::hx710::AdcStats;
use crate::error::HwError;
use crate::hal::Clock;
use crate::sensors::{PressureReading, PressureSensor};

/// Concrete adapter that combines the cuff hardware behind port traits.
pub struct HardwareAdapter<DOUT, SCK, P: OutputPin, V: OutputPin, C> {
    sensor: PressureSensor<DOUT, SCK, C>,
    actuators: ActuatorController<P, V, C>,
}

impl<DOUT, SCK, P, V, C> HardwareAdapter<DOUT, SCK, P, V, C>
where
    DOUT: InputPin,
    SCK: OutputPin,
    P: OutputPin,
    V: OutputPin,
    C: Clock,
{
    /// Claim the four lines.  Pump and valve are driven to the safe state
    /// before this returns.
    pub fn new(
        dout: DOUT,
        sck: SCK,
        pump: P,
        valve: V,
        clock: C,
        cal: CalibrationParams,
    ) -> Result<Self, HwError> {
        let actuators = ActuatorController::new(pump, valve, clock.clone())?;
        let sensor = PressureSensor::new(dout, sck, clock, cal);
        Ok(Self { sensor, actuators })
    }

    /// ADC transaction counters since the last initialisation.
    pub fn adc_stats(&self) -> AdcStats {
        self.sensor.stats()
    }
}

// ── PressurePort implementation ───────────────────────────────

impl<DOUT, SCK, P, V, C> PressurePort for HardwareAdapter<DOUT, SCK, P, V, C>
where
    DOUT: InputPin,
    SCK: OutputPin,
    P: OutputPin,
    V: OutputPin,
    C: Clock,
{
    fn initialize(&mut self) -> Result<(), HwError> {
        self.sensor.initialize()
    }

    fn read_pressure(&mut self, timeout: Duration) -> Result<PressureReading, HwError> {
        self.sensor.read(timeout)
    }

    fn set_calibration(&mut self, params: CalibrationParams) {
        self.sensor.set_calibration(params);
    }

    fn power_down(&mut self) -> Result<(), HwError> {
        self.sensor.power_down()
    }
}

// ── ActuatorPort implementation ───────────────────────────────

impl<DOUT, SCK, P, V, C> ActuatorPort for HardwareAdapter<DOUT, SCK, P, V, C>
where
    DOUT: InputPin,
    SCK: OutputPin,
    P: OutputPin,
    V: OutputPin,
    C: Clock,
{
    fn pump_on(&mut self) -> Result<(), HwError> {
        self.actuators.pump_on()
    }

    fn pump_off(&mut self) -> Result<(), HwError> {
        self.actuators.pump_off()
    }

    fn valve_open(&mut self) -> Result<(), HwError> {
        self.actuators.valve_open()
    }

    fn valve_close(&mut self) -> Result<(), HwError> {
        self.actuators.valve_close()
    }

    fn vent(&mut self) -> Result<(), HwError> {
        self.actuators.vent()
    }

    fn deflate_pulse(&mut self, duty: u8, period: Duration) -> Result<(), HwError> {
        self.actuators.deflate_pulse(duty, period)
    }

    fn state(&self) -> ActuatorState {
        self.actuators.state()
    }
}
