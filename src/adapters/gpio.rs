//! Raspberry Pi GPIO via `rppal`.
//!
//! rppal's pins implement the `embedded-hal` 1.0 digital traits (`hal`
//! feature), so they plug straight into
//! [`HardwareAdapter`](super::hardware::HardwareAdapter).  Output lines
//! start low: pump off, valve de-energised (open).

use rppal::gpio::{Gpio, InputPin, OutputPin};

use crate::config::GpioConfig;

/// The four lines a session needs.
pub struct RpiPins {
    pub dout: InputPin,
    pub sck: OutputPin,
    pub pump: OutputPin,
    pub valve: OutputPin,
}

/// Claim the configured BCM lines.
pub fn open(cfg: &GpioConfig) -> Result<RpiPins, rppal::gpio::Error> {
    let gpio = Gpio::new()?;
    Ok(RpiPins {
        dout: gpio.get(cfg.dout)?.into_input(),
        sck: gpio.get(cfg.sck)?.into_output_low(),
        pump: gpio.get(cfg.pump)?.into_output_low(),
        valve: gpio.get(cfg.valve)?.into_output_low(),
    })
}
