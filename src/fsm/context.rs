//! Shared mutable context threaded through every FSM handler.
//!
//! `SessionContext` is the blackboard for one measurement session: the
//! latest pressure snapshot (written by the engine before each tick), the
//! actuator command (written by state handlers, applied by the engine
//! after each tick), timing, the frozen calibration, the latched fault
//! mask, and the deflate trace being recorded.

use std::sync::Arc;

use crate::calibration::Calibration;
use crate::config::EngineConfig;
use crate::error::{AbortReason, SafetyFault};
use crate::measurement::{DeflateRun, MeasurementResult};

// ---------------------------------------------------------------------------
// Pressure snapshot (read-only to state handlers; written by the engine)
// ---------------------------------------------------------------------------

/// The most recent pressure read.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PressureSnapshot {
    /// Calibrated cuff pressure (mmHg).  Stale unless `valid && fresh`.
    pub mmhg: f64,
    pub counts: i32,
    /// The read returned an unsaturated conversion.
    pub valid: bool,
    pub saturated: bool,
    /// A read was attempted this tick.
    pub fresh: bool,
}

impl PressureSnapshot {
    /// A valid reading taken this tick.
    pub fn usable(&self) -> Option<f64> {
        (self.valid && self.fresh).then_some(self.mmhg)
    }
}

// ---------------------------------------------------------------------------
// Actuator command (written by state handlers; applied by the engine)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActuatorCommand {
    /// Pump off, valve open.
    Vent,
    /// Pump off, valve closed.
    Hold,
    /// Valve closed, pump on for `secs`, then off.
    PumpPulse { secs: f64 },
    /// One valve PWM period at `duty` %.
    DeflatePulse { duty: u8, period_secs: f64 },
}

impl ActuatorCommand {
    pub fn is_vent(&self) -> bool {
        matches!(self, Self::Vent)
    }
}

// ---------------------------------------------------------------------------
// SessionContext
// ---------------------------------------------------------------------------

/// The shared context passed to every state handler function.
pub struct SessionContext {
    // -- Timing --
    /// Engine clock at the last read (s).
    pub now_secs: f64,
    /// Engine clock when the current state was entered (s).
    pub state_entry_secs: f64,
    /// Monotonic total tick count.
    pub total_ticks: u64,

    // -- Inputs --
    pub pressure: PressureSnapshot,
    /// Set by the engine to leave `Idle`.
    pub start_requested: bool,

    // -- Outputs --
    pub command: ActuatorCommand,

    // -- Configuration --
    pub config: EngineConfig,
    /// Calibration frozen for this session.
    pub calibration: Arc<Calibration>,

    // -- Safety --
    /// Latched safety fault bitmask (see `SafetyFault::mask()`).
    pub fault_flags: u8,
    /// Why the session is ending early, once known.
    pub abort_reason: Option<AbortReason>,

    // -- Session data --
    pub session_id: u32,
    pub run: Option<DeflateRun>,
    pub result: Option<MeasurementResult>,
}

impl SessionContext {
    pub fn new(config: EngineConfig, calibration: Arc<Calibration>, session_id: u32) -> Self {
        Self {
            now_secs: 0.0,
            state_entry_secs: 0.0,
            total_ticks: 0,
            pressure: PressureSnapshot::default(),
            start_requested: false,
            command: ActuatorCommand::Vent,
            config,
            calibration,
            fault_flags: 0,
            abort_reason: None,
            session_id,
            run: None,
            result: None,
        }
    }

    /// Seconds elapsed since the current state was entered.
    pub fn secs_in_state(&self) -> f64 {
        (self.now_secs - self.state_entry_secs).max(0.0)
    }

    /// Returns `true` if **any** safety fault is active.
    pub fn has_faults(&self) -> bool {
        self.fault_flags != 0
    }

    /// Check whether a specific fault flag is set.
    pub fn has_fault(&self, fault: SafetyFault) -> bool {
        self.fault_flags & fault.mask() != 0
    }
}
