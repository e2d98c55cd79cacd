//! Inflation pump driver (single MOSFET gate, active-high).
//!
//! ## Safety contract
//!
//! The pump must never run against a closed-off cuff past the soft limit.
//! That is enforced by the safety supervisor; this driver is a dumb
//! actuator that only tracks what it last wrote.

use embedded_hal::digital::OutputPin;

use crate::error::HwError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpState {
    Stopped,
    Running,
}

pub struct PumpDriver<P> {
    pin: P,
    state: PumpState,
}

impl<P: OutputPin> PumpDriver<P> {
    /// Takes the gate pin and drives it low.  The driver is returned even
    /// if that first write fails so the caller can retry through
    /// [`stop`](Self::stop).
    pub fn new(pin: P) -> (Self, Result<(), HwError>) {
        let mut drv = Self {
            pin,
            state: PumpState::Stopped,
        };
        let res = drv.stop();
        (drv, res)
    }

    pub fn start(&mut self) -> Result<(), HwError> {
        self.pin.set_high().map_err(|_| HwError::Gpio)?;
        self.state = PumpState::Running;
        Ok(())
    }

    pub fn stop(&mut self) -> Result<(), HwError> {
        self.pin.set_low().map_err(|_| HwError::Gpio)?;
        self.state = PumpState::Stopped;
        Ok(())
    }

    pub fn state(&self) -> PumpState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, PumpState::Running)
    }
}
