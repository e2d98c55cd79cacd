//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing session events through the `log`
//! facade.  A GUI or MQTT bridge would implement the same trait.

use log::{debug, info, warn};

use crate::app::events::SessionEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`SessionEvent`].
#[derive(Debug, Default)]
pub struct LogEventSink {
    dropped: u32,
}

impl LogEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Samples dropped from deflate traces since construction.
    pub fn dropped_samples(&self) -> u32 {
        self.dropped
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &SessionEvent) {
        match event {
            SessionEvent::Started { session_id } => {
                info!("START | session={session_id}");
            }
            SessionEvent::StateChanged { from, to } => {
                info!("STATE | {from:?} -> {to:?}");
            }
            SessionEvent::SampleDropped { saturated } => {
                self.dropped = self.dropped.saturating_add(1);
                debug!(
                    "SAMPLE | dropped ({})",
                    if *saturated { "saturated" } else { "no conversion" }
                );
            }
            SessionEvent::FaultDetected(flags) => {
                warn!("FAULT | detected, flags=0b{flags:08b}");
            }
            SessionEvent::Aborted(reason) => {
                warn!("ABORT | {reason}");
            }
            SessionEvent::Completed(r) => {
                info!(
                    "RESULT | SYS={:.0} DIA={:.0} MAP={:.0} PP={:.0} | valid={} | peak={:.2}mmHg n={} dpdt={:.1}mmHg/s",
                    r.systolic_mmhg,
                    r.diastolic_mmhg,
                    r.map_mmhg,
                    r.pulse_pressure_mmhg,
                    r.valid,
                    r.quality.peak_amplitude,
                    r.quality.sample_count,
                    r.quality.avg_dpdt,
                );
            }
        }
    }
}
