//! Pump + valve controller.
//!
//! The rest state, and the state on every error path, is
//! `{pump: off, valve: open}`.  The constructor writes it before returning,
//! [`vent`](ActuatorController::vent) restores it, and `Drop` writes it
//! again so that unwinding or an early return out of a session can never
//! leave the cuff sealed.
//!
//! Deflation rate is throttled by PWM on the valve: within one period the
//! valve is held open for `duty/100 × period` and closed for the rest.

use core::time::Duration;

use embedded_hal::digital::OutputPin;
use log::{error, trace};

use super::pump::PumpDriver;
use super::valve::ValveDriver;
use crate::error::HwError;
use crate::hal::Clock;

/// Last commanded actuator levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActuatorState {
    pub pump_on: bool,
    pub valve_open: bool,
}

impl ActuatorState {
    pub const SAFE: Self = Self {
        pump_on: false,
        valve_open: true,
    };

    /// Pump off and valve open.
    pub fn is_safe(&self) -> bool {
        *self == Self::SAFE
    }
}

pub struct ActuatorController<P: OutputPin, V: OutputPin, C> {
    pump: PumpDriver<P>,
    valve: ValveDriver<V>,
    clock: C,
}

impl<P: OutputPin, V: OutputPin, C: Clock> ActuatorController<P, V, C> {
    /// Take ownership of both lines and force the safe state.
    pub fn new(pump_pin: P, valve_pin: V, clock: C) -> Result<Self, HwError> {
        let (pump, pump_res) = PumpDriver::new(pump_pin);
        let (valve, valve_res) = ValveDriver::new(valve_pin);
        // Built before checking so that Drop retries the safe state.
        let ctl = Self { pump, valve, clock };
        pump_res?;
        valve_res?;
        Ok(ctl)
    }

    pub fn pump_on(&mut self) -> Result<(), HwError> {
        self.pump.start()
    }

    pub fn pump_off(&mut self) -> Result<(), HwError> {
        self.pump.stop()
    }

    pub fn valve_open(&mut self) -> Result<(), HwError> {
        self.valve.open()
    }

    pub fn valve_close(&mut self) -> Result<(), HwError> {
        self.valve.close()
    }

    /// Pump off, valve open.  Both writes are attempted even if the first
    /// fails; the first error is returned.
    pub fn vent(&mut self) -> Result<(), HwError> {
        let pump = self.pump.stop();
        let valve = self.valve.open();
        pump.and(valve)
    }

    /// One PWM period of controlled bleed: valve open for `duty`% of
    /// `period`, closed for the remainder.  Blocks for `period`.  The pump
    /// is stopped first if it was running.
    pub fn deflate_pulse(&mut self, duty: u8, period: Duration) -> Result<(), HwError> {
        let duty = duty.min(100);
        if self.pump.is_running() {
            self.pump.stop()?;
        }

        let open_for = period.mul_f64(f64::from(duty) / 100.0);
        let closed_for = period.saturating_sub(open_for);
        trace!("deflate pulse: duty {duty}% open {open_for:?} closed {closed_for:?}");

        if !open_for.is_zero() {
            self.valve.open()?;
            self.clock.sleep(open_for);
        }
        if !closed_for.is_zero() {
            self.valve.close()?;
            self.clock.sleep(closed_for);
        }
        Ok(())
    }

    pub fn state(&self) -> ActuatorState {
        ActuatorState {
            pump_on: self.pump.is_running(),
            valve_open: self.valve.is_open(),
        }
    }
}

impl<P: OutputPin, V: OutputPin, C> Drop for ActuatorController<P, V, C> {
    fn drop(&mut self) {
        let pump = self.pump.stop();
        let valve = self.valve.open();
        if let Err(e) = pump.and(valve) {
            error!("Actuator drop: failed to reach safe state: {e}");
        }
    }
}
