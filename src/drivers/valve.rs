//! Normally-open bleed valve.
//!
//! The coil must be energised (pin HIGH) to close the valve.  With the
//! line low, released, or unpowered the cuff vents to atmosphere.

use embedded_hal::digital::OutputPin;

use crate::error::HwError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValveState {
    Open,
    Closed,
}

pub struct ValveDriver<V> {
    pin: V,
    state: ValveState,
}

impl<V: OutputPin> ValveDriver<V> {
    /// Takes the coil pin and de-energises it (valve open).
    pub fn new(pin: V) -> (Self, Result<(), HwError>) {
        let mut drv = Self {
            pin,
            state: ValveState::Open,
        };
        let res = drv.open();
        (drv, res)
    }

    pub fn open(&mut self) -> Result<(), HwError> {
        self.pin.set_low().map_err(|_| HwError::Gpio)?;
        self.state = ValveState::Open;
        Ok(())
    }

    pub fn close(&mut self) -> Result<(), HwError> {
        self.pin.set_high().map_err(|_| HwError::Gpio)?;
        self.state = ValveState::Closed;
        Ok(())
    }

    pub fn state(&self) -> ValveState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, ValveState::Open)
    }
}
