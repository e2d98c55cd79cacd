//! Port traits: the hexagonal boundary between the session engine and the
//! outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ Engine (domain)
//! ```
//!
//! Driven adapters (pressure sensor, actuators, event sinks, abort
//! sources) implement these traits.  The [`Engine`](super::service::Engine)
//! consumes them via generics, so the control loop never touches GPIO
//! directly and runs unchanged against the simulator.
//!
//! ## Safety notes
//!
//! - **ActuatorPort::vent** must attempt both lines even if one fails.
//! - **AbortSignal** implementations must be cheap and non-blocking; they
//!   are polled inside pump pulses.

use core::sync::atomic::{AtomicBool, Ordering};
use core::time::Duration;
use std::sync::Arc;

use crate::calibration::CalibrationParams;
use crate::drivers::actuator::ActuatorState;
use crate::error::HwError;
use crate::sensors::PressureReading;

use super::events::SessionEvent;

// ───────────────────────────────────────────────────────────────
// Pressure port (driven adapter: hardware → domain)
// ───────────────────────────────────────────────────────────────

/// Read-side port: the engine calls this to obtain cuff pressure.
pub trait PressurePort {
    /// Wake the converter and discard its first conversions.
    fn initialize(&mut self) -> Result<(), HwError>;

    /// One conversion, bounded by `timeout`.
    fn read_pressure(&mut self, timeout: Duration) -> Result<PressureReading, HwError>;

    /// Apply the calibration frozen for the next session.
    fn set_calibration(&mut self, params: CalibrationParams);

    /// Put the converter to sleep between sessions.
    fn power_down(&mut self) -> Result<(), HwError>;
}

// ───────────────────────────────────────────────────────────────
// Actuator port (driven adapter: domain → hardware)
// ───────────────────────────────────────────────────────────────

/// Write-side port: the engine calls this to command pump and valve.
pub trait ActuatorPort {
    fn pump_on(&mut self) -> Result<(), HwError>;

    fn pump_off(&mut self) -> Result<(), HwError>;

    fn valve_open(&mut self) -> Result<(), HwError>;

    fn valve_close(&mut self) -> Result<(), HwError>;

    /// Pump off and valve open: the safe state.
    fn vent(&mut self) -> Result<(), HwError>;

    /// One valve PWM period: open for `duty` % of `period`, closed for the
    /// rest.  Blocks for `period`.
    fn deflate_pulse(&mut self, duty: u8, period: Duration) -> Result<(), HwError>;

    /// Last commanded line levels.
    fn state(&self) -> ActuatorState;
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The engine emits structured [`SessionEvent`]s through this port.
/// Adapters decide where they go (log, GUI, MQTT bridge).
pub trait EventSink {
    fn emit(&mut self, event: &SessionEvent);
}

impl EventSink for Vec<SessionEvent> {
    fn emit(&mut self, event: &SessionEvent) {
        self.push(event.clone());
    }
}

// ───────────────────────────────────────────────────────────────
// Abort signal (driven adapter: operator → domain)
// ───────────────────────────────────────────────────────────────

/// External request to end the session and vent the cuff.
pub trait AbortSignal {
    fn is_raised(&self) -> bool;
}

impl AbortSignal for AtomicBool {
    fn is_raised(&self) -> bool {
        self.load(Ordering::Acquire)
    }
}

impl<T: AbortSignal + ?Sized> AbortSignal for &T {
    fn is_raised(&self) -> bool {
        (**self).is_raised()
    }
}

impl<T: AbortSignal + ?Sized> AbortSignal for Arc<T> {
    fn is_raised(&self) -> bool {
        (**self).is_raised()
    }
}

/// Never raised.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAbort;

impl AbortSignal for NoAbort {
    fn is_raised(&self) -> bool {
        false
    }
}

/// Adapts a closure into an [`AbortSignal`].
#[derive(Debug, Clone, Copy)]
pub struct AbortFn<F>(pub F);

impl<F: Fn() -> bool> AbortSignal for AbortFn<F> {
    fn is_raised(&self) -> bool {
        (self.0)()
    }
}
