//! Outbound session events.
//!
//! The [`Engine`](super::service::Engine) emits these through the
//! [`EventSink`](super::ports::EventSink) port.  Adapters on the other
//! side decide what to do with them: log them, forward them to the GUI,
//! publish them over MQTT.

use crate::error::AbortReason;
use crate::fsm::StateId;
use crate::measurement::MeasurementResult;

/// Structured events emitted by the session engine.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A session took the calibration lease and left Idle.
    Started { session_id: u32 },

    /// The FSM transitioned between states.
    StateChanged { from: StateId, to: StateId },

    /// A reading was kept out of the deflate trace.
    SampleDropped { saturated: bool },

    /// One or more safety faults were raised (bitmask).
    FaultDetected(u8),

    /// The session ended early; the cuff is vented.
    Aborted(AbortReason),

    /// The session produced a result (possibly marked invalid).
    Completed(MeasurementResult),
}
