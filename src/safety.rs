//! Safety supervisor.
//!
//! The supervisor runs **every tick before the FSM** and accumulates a
//! fault bitmask that is copied into `SessionContext.fault_flags`.  Every
//! non-terminal state handler checks the mask first and moves to
//! `Aborted` when any bit is set.
//!
//! ## Fault lifecycle
//!
//! Faults are latched for the rest of the session: a cuff that once read
//! above the soft limit, or an ADC that stopped answering, is not trusted
//! again until a fresh session starts with a fresh supervisor.  When
//! several faults are set at once, [`SafetyFault::PRIORITY`] decides which
//! one is reported as the abort reason.
//!
//! | Fault | Condition |
//! |---|---|
//! | `Overpressure` | valid reading ≥ `inflate_soft_limit_mmhg` |
//! | `SensorTimeout` | more than `max_read_retries` consecutive bad reads, the last one a timeout |
//! | `SensorSaturated` | more than `max_read_retries` consecutive bad reads, the last one saturated |
//! | `ExternalAbort` | abort signal raised |
//! | `ActuatorFault` | pump/valve write failed |

use core::cmp::Ordering;

use log::{error, warn};

use crate::config::ControlConfig;
use crate::error::{AbortReason, SafetyFault};

/// Outcome of one pressure read, as seen by the supervisor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReadOutcome {
    Valid(f64),
    Saturated,
    Timeout,
}

/// Safety supervisor.
#[derive(Debug)]
pub struct SafetySupervisor {
    soft_limit_mmhg: f64,
    max_read_retries: u32,
    /// Latched fault bitmask.
    faults: u8,
    /// Consecutive reads that produced no usable pressure.
    consecutive_bad: u32,
}

impl SafetySupervisor {
    pub fn new(config: &ControlConfig) -> Self {
        Self {
            soft_limit_mmhg: config.inflate_soft_limit_mmhg,
            max_read_retries: config.max_read_retries,
            faults: 0,
            consecutive_bad: 0,
        }
    }

    /// Evaluate the latest read.  Returns the updated fault bitmask.
    pub fn evaluate(&mut self, read: ReadOutcome) -> u8 {
        match read {
            ReadOutcome::Valid(mmhg) => {
                self.consecutive_bad = 0;
                // Anything not strictly below the limit trips, NaN included.
                if !matches!(mmhg.partial_cmp(&self.soft_limit_mmhg), Some(Ordering::Less)) {
                    error!(
                        "Pressure {mmhg:.1} mmHg at or above soft limit {:.1}",
                        self.soft_limit_mmhg
                    );
                    self.set_fault(SafetyFault::Overpressure);
                }
            }
            ReadOutcome::Saturated | ReadOutcome::Timeout => {
                self.consecutive_bad += 1;
                let fault = if read == ReadOutcome::Timeout {
                    SafetyFault::SensorTimeout
                } else {
                    SafetyFault::SensorSaturated
                };
                warn!(
                    "Bad ADC read: {fault} ({}/{})",
                    self.consecutive_bad, self.max_read_retries
                );
                if self.consecutive_bad > self.max_read_retries {
                    self.set_fault(fault);
                }
            }
        }
        self.faults
    }

    /// Latch the external-abort fault.
    pub fn raise_external_abort(&mut self) -> u8 {
        self.set_fault(SafetyFault::ExternalAbort);
        self.faults
    }

    /// Latch the actuator fault after a failed pump/valve write.
    pub fn raise_actuator_fault(&mut self) -> u8 {
        self.set_fault(SafetyFault::ActuatorFault);
        self.faults
    }

    /// Current fault bitmask.
    pub fn faults(&self) -> u8 {
        self.faults
    }

    /// True if **any** fault is active.
    pub fn has_faults(&self) -> bool {
        self.faults != 0
    }

    /// Check if a specific fault is active.
    pub fn has_fault(&self, fault: SafetyFault) -> bool {
        self.faults & fault.mask() != 0
    }

    /// Highest-priority abort reason among the latched faults.
    pub fn abort_reason(&self) -> Option<AbortReason> {
        abort_reason_for(self.faults)
    }

    // ── Internal ──────────────────────────────────────────────────

    fn set_fault(&mut self, fault: SafetyFault) {
        if self.faults & fault.mask() == 0 {
            error!("SAFETY FAULT SET: {fault}");
        }
        self.faults |= fault.mask();
    }
}

/// Highest-priority abort reason encoded in a fault mask.
pub fn abort_reason_for(faults: u8) -> Option<AbortReason> {
    SafetyFault::PRIORITY
        .iter()
        .find(|f| faults & f.mask() != 0)
        .map(|f| f.abort_reason())
}
