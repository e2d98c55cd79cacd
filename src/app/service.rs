//! Session engine: the hexagonal core.
//!
//! [`Engine`] owns the configuration and the calibration store and runs
//! one measurement session at a time.  All I/O flows through port traits
//! injected at the call site, so the same loop drives real GPIO and the
//! simulator.
//!
//! ```text
//!  PressurePort ──▶ ┌────────────────────────┐ ──▶ EventSink
//!                   │         Engine         │
//!  ActuatorPort ◀── │  FSM · Safety · DSP    │ ◀── AbortSignal
//!                   └────────────────────────┘
//! ```
//!
//! Per tick: abort check → pressure read → safety → FSM → actuator apply.
//! Every exit path, including faults mid-pulse, ends with a vent.

use core::sync::atomic::{AtomicU32, Ordering};
use core::time::Duration;
use std::sync::Arc;

use log::{debug, error, info, warn};

use crate::calibration::{Calibration, CalibrationStore};
use crate::config::EngineConfig;
use crate::error::{AbortReason, HwError, Result};
use crate::fsm::context::{ActuatorCommand, PressureSnapshot, SessionContext};
use crate::fsm::states::build_state_table;
use crate::fsm::{Fsm, StateId};
use crate::hal::{Clock, secs};
use crate::measurement::MeasurementResult;
use crate::safety::{ReadOutcome, SafetySupervisor, abort_reason_for};

use super::events::SessionEvent;
use super::ports::{AbortSignal, ActuatorPort, EventSink, PressurePort};

/// Pump pulses are sliced so the abort signal is polled at least this often.
const PUMP_SLICE: Duration = Duration::from_millis(50);

// ───────────────────────────────────────────────────────────────
// Engine
// ───────────────────────────────────────────────────────────────

/// Runs measurement sessions against injected hardware.
pub struct Engine {
    config: EngineConfig,
    store: CalibrationStore,
    next_session_id: AtomicU32,
}

impl Engine {
    /// Build an engine from a configuration that has already passed
    /// [`EngineConfig::validate`].
    pub fn new(config: EngineConfig) -> Self {
        let store = CalibrationStore::new(Calibration::from_config(&config));
        Self {
            config,
            store,
            next_session_id: AtomicU32::new(1),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The calibration store.  Replacing the calibration is refused while
    /// a session is running.
    pub fn calibration(&self) -> &CalibrationStore {
        &self.store
    }

    /// Run one complete session: inflate, settle, deflate, analyze.
    ///
    /// Hardware faults, timeouts and aborts do not produce `Err`; they end
    /// the session with the cuff vented and are reported in the result's
    /// `abort_reason`.  `Err` means the session could not start because
    /// another one holds the calibration lease.
    ///
    /// The `hw` parameter satisfies **both** [`PressurePort`] and
    /// [`ActuatorPort`]; this avoids a double mutable borrow while
    /// keeping the port boundary explicit.
    pub fn run_session(
        &self,
        hw: &mut (impl PressurePort + ActuatorPort),
        clock: &impl Clock,
        abort: &impl AbortSignal,
        sink: &mut impl EventSink,
    ) -> Result<MeasurementResult> {
        let lease = self.store.lease()?;
        let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        let calibration = Arc::clone(lease.calibration());
        let started = clock.now();

        hw.set_calibration(calibration.params);
        if let Err(e) = hw.initialize() {
            warn!("Engine: ADC initialisation failed ({e}), reads will be retried");
        }

        let mut session = Session::new(self.config.clone(), calibration, session_id);
        session.ctx.now_secs = clock.now_secs();
        session.fsm.start(&mut session.ctx);
        session.apply(hw, clock, abort);
        sink.emit(&SessionEvent::Started { session_id });
        session.ctx.start_requested = true;

        while !session.fsm.current_state().is_terminal() {
            session.tick(hw, clock, abort, sink);
        }

        if let Err(e) = hw.vent() {
            error!("Engine: final vent failed: {e}");
        }
        if let Err(e) = hw.power_down() {
            debug!("Engine: ADC power-down failed: {e}");
        }

        let result = session.finish();
        match result.abort_reason {
            Some(reason) if session.fsm.current_state() == StateId::Aborted => {
                sink.emit(&SessionEvent::Aborted(reason));
            }
            _ => sink.emit(&SessionEvent::Completed(result.clone())),
        }
        info!(
            "Engine: session {session_id} finished in {:.1}s after {} ticks",
            clock.now().saturating_sub(started).as_secs_f64(),
            session.fsm.tick_count()
        );
        Ok(result)
    }
}

// ───────────────────────────────────────────────────────────────
// Session (one run of the FSM)
// ───────────────────────────────────────────────────────────────

struct Session {
    fsm: Fsm,
    ctx: SessionContext,
    safety: SafetySupervisor,
    read_timeout: Duration,
    reported_faults: u8,
}

impl Session {
    fn new(config: EngineConfig, calibration: Arc<Calibration>, session_id: u32) -> Self {
        let safety = SafetySupervisor::new(&config.control);
        let read_timeout = Duration::from_millis(u64::from(config.read_timeout_ms));
        Self {
            fsm: Fsm::new(build_state_table(), StateId::Idle),
            ctx: SessionContext::new(config, calibration, session_id),
            safety,
            read_timeout,
            reported_faults: 0,
        }
    }

    // ── Per-tick orchestration ────────────────────────────────

    fn tick(
        &mut self,
        hw: &mut (impl PressurePort + ActuatorPort),
        clock: &impl Clock,
        abort: &impl AbortSignal,
        sink: &mut impl EventSink,
    ) {
        let prev_state = self.fsm.current_state();

        // 1. Abort check, then read while the cuff is live
        if abort.is_raised() {
            self.safety.raise_external_abort();
            self.ctx.pressure.fresh = false;
        } else if prev_state == StateId::Analyzing {
            self.ctx.pressure.fresh = false;
        } else {
            self.read(hw, sink);
        }
        self.ctx.now_secs = clock.now_secs();

        // 2. Safety
        self.sync_faults(sink);

        // 3. FSM tick (pure state logic)
        self.fsm.tick(&mut self.ctx);

        // 4. Actuators
        self.apply(hw, clock, abort);
        if self.safety.faults() != self.ctx.fault_flags {
            self.sync_faults(sink);
        }

        // 5. Emit state change if the FSM moved
        let new_state = self.fsm.current_state();
        if new_state != prev_state {
            sink.emit(&SessionEvent::StateChanged {
                from: prev_state,
                to: new_state,
            });
        }
    }

    fn read(&mut self, hw: &mut impl PressurePort, sink: &mut impl EventSink) {
        let (snapshot, outcome) = match hw.read_pressure(self.read_timeout) {
            Ok(r) if r.saturated => (
                PressureSnapshot {
                    mmhg: r.mmhg,
                    counts: r.counts,
                    valid: false,
                    saturated: true,
                    fresh: true,
                },
                ReadOutcome::Saturated,
            ),
            Ok(r) => (
                PressureSnapshot {
                    mmhg: r.mmhg,
                    counts: r.counts,
                    valid: true,
                    saturated: false,
                    fresh: true,
                },
                ReadOutcome::Valid(r.mmhg),
            ),
            Err(e) => {
                debug!("Engine: pressure read failed: {e}");
                (
                    PressureSnapshot {
                        valid: false,
                        saturated: false,
                        fresh: true,
                        ..self.ctx.pressure
                    },
                    ReadOutcome::Timeout,
                )
            }
        };
        self.ctx.pressure = snapshot;
        if !snapshot.valid && self.fsm.current_state() == StateId::Deflating {
            sink.emit(&SessionEvent::SampleDropped {
                saturated: snapshot.saturated,
            });
        }
        self.safety.evaluate(outcome);
    }

    /// Copy the supervisor's mask into the context and, on a new fault,
    /// jump straight to `Aborted`.
    fn sync_faults(&mut self, sink: &mut impl EventSink) {
        let faults = self.safety.faults();
        self.ctx.fault_flags = faults;
        if faults == 0 {
            return;
        }
        if faults != self.reported_faults {
            self.reported_faults = faults;
            warn!("Safety fault! flags=0b{faults:08b}");
            sink.emit(&SessionEvent::FaultDetected(faults));
        }
        if !self.fsm.current_state().is_terminal() {
            if self.ctx.abort_reason.is_none() {
                self.ctx.abort_reason = abort_reason_for(faults);
            }
            self.fsm.force_transition(StateId::Aborted, &mut self.ctx);
        }
    }

    /// Translate the FSM's actuator command into port calls.  A failed
    /// write latches `ActuatorFault`, aborts the session and vents.
    fn apply(
        &mut self,
        hw: &mut impl ActuatorPort,
        clock: &impl Clock,
        abort: &impl AbortSignal,
    ) {
        let res = match self.ctx.command {
            ActuatorCommand::Vent => hw.vent(),
            ActuatorCommand::Hold => hw.pump_off().and_then(|()| hw.valve_close()),
            ActuatorCommand::PumpPulse { secs: s } => pump_pulse(hw, clock, abort, secs(s)),
            ActuatorCommand::DeflatePulse { duty, period_secs } => {
                hw.deflate_pulse(duty, secs(period_secs))
            }
        };

        if let Err(e) = res {
            error!(
                "{}: actuator write failed ({e}) applying {:?}",
                self.fsm.state_name(),
                self.ctx.command
            );
            self.safety.raise_actuator_fault();
            self.ctx.abort_reason.get_or_insert(AbortReason::ActuatorFault);
            self.fsm.force_transition(StateId::Aborted, &mut self.ctx);
            if let Err(e) = hw.vent() {
                error!("Engine: vent after actuator fault failed: {e}");
            }
        }
    }

    /// Take the session's result, synthesising one if the FSM never
    /// produced it.
    fn finish(&mut self) -> MeasurementResult {
        match self.ctx.result.take() {
            Some(r) => r,
            None => {
                let reason = self.ctx.abort_reason.unwrap_or(AbortReason::UserAbort);
                MeasurementResult::aborted(reason)
            }
        }
    }
}

/// Valve closed, pump on for `length`, then pump off.  The pump is stopped
/// even if the pulse is cut short.
fn pump_pulse(
    hw: &mut impl ActuatorPort,
    clock: &impl Clock,
    abort: &impl AbortSignal,
    length: Duration,
) -> core::result::Result<(), HwError> {
    let run = hw.valve_close().and_then(|()| hw.pump_on());
    if run.is_ok() {
        let end = clock.now() + length;
        loop {
            let now = clock.now();
            if now >= end || abort.is_raised() {
                break;
            }
            clock.sleep((end - now).min(PUMP_SLICE));
        }
    }
    let stop = hw.pump_off();
    run.and(stop)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::hardware::HardwareAdapter;
    use crate::app::ports::{AbortFn, NoAbort};
    use crate::error::{CalibrationError, Error};
    use crate::sim::{CuffParams, SimClock, SimCuff, SimPatient};

    fn bench(
        clock: &SimClock,
        config: &EngineConfig,
    ) -> (SimCuff, impl PressurePort + ActuatorPort) {
        let cal = Calibration::from_config(config).params;
        let cuff = SimCuff::new(clock.clone(), cal, CuffParams::default())
            .with_patient(SimPatient::new(120.0, 80.0, 0.55, 0.80));
        let adc = cuff.adc(config.mode.rate_hz());
        let (dout, sck) = adc.pins();
        let hw = HardwareAdapter::new(
            dout,
            sck,
            cuff.pump_pin(),
            cuff.valve_pin(),
            clock.clone(),
            cal,
        )
        .unwrap();
        (cuff, hw)
    }

    #[test]
    fn second_session_refused_while_lease_held() {
        let config = EngineConfig::default();
        let engine = Engine::new(config.clone());
        let clock = SimClock::new();
        let (_cuff, mut hw) = bench(&clock, &config);

        let _lease = engine.calibration().lease().unwrap();
        let mut events: Vec<SessionEvent> = Vec::new();
        let err = engine.run_session(&mut hw, &clock, &NoAbort, &mut events);
        assert!(matches!(err, Err(Error::Calibration(CalibrationError::SessionActive))));
        assert!(events.is_empty());
    }

    #[test]
    fn pump_pulse_stops_early_on_abort() {
        let config = EngineConfig::default();
        let clock = SimClock::new();
        let (cuff, mut hw) = bench(&clock, &config);

        let deadline = clock.now() + Duration::from_millis(120);
        let c = clock.clone();
        let abort = AbortFn(move || c.now() >= deadline);
        pump_pulse(&mut hw, &clock, &abort, Duration::from_secs(2)).unwrap();

        assert!(clock.now() < Duration::from_millis(200));
        assert!(!cuff.pump_running());
        assert!(!cuff.valve_open());
    }

    #[test]
    fn pre_aborted_session_ends_vented_without_pumping() {
        let config = EngineConfig::default();
        let engine = Engine::new(config.clone());
        let clock = SimClock::new();
        let (cuff, mut hw) = bench(&clock, &config);

        let mut events: Vec<SessionEvent> = Vec::new();
        let r = engine
            .run_session(&mut hw, &clock, &AbortFn(|| true), &mut events)
            .unwrap();

        assert!(!r.valid);
        assert_eq!(r.abort_reason, Some(AbortReason::UserAbort));
        assert!(cuff.peak_pressure() < 1.0);
        assert!(cuff.valve_open() && !cuff.pump_running());
        assert!(!engine.calibration().is_session_active());
        assert_eq!(events.last(), Some(&SessionEvent::Aborted(AbortReason::UserAbort)));
    }
}
