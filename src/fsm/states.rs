//! Concrete state handler functions and table builder.
//!
//! ```text
//!  IDLE ──[start]──▶ INFLATING ──[p ≥ target − hyst]──▶ SETTLING
//!                        │                                  │
//!                 [inflate timeout]                    [grace elapsed]
//!                        │                                  ▼
//!                        │          ANALYZING ◀──[p < cutoff]── DEFLATING
//!                        │           │      │                    │
//!                        │      [result] [no envelope]   [deflate timeout]
//!                        ▼           ▼      ▼                    │
//!                     ABORTED ◀──────┼──────┘◀───────────────────┘
//!                                    ▼
//!                                 COMPLETE
//!
//!  Any live state ──[safety fault]──▶ ABORTED(reason)
//! ```
//!
//! Terminal states command `Vent` on entry and never leave.

use log::{error, info, warn};

use super::context::{ActuatorCommand, SessionContext};
use super::{StateDescriptor, StateId};
use crate::control::deflate::achieved_rates;
use crate::dsp::SignalProcessor;
use crate::error::AbortReason;
use crate::measurement::{DeflateRun, MeasurementResult, PressureSample};
use crate::safety::abort_reason_for;

// ═══════════════════════════════════════════════════════════════════════════
//  Table builder
// ═══════════════════════════════════════════════════════════════════════════

/// Build the static state table.  Called once per session.
pub fn build_state_table() -> [StateDescriptor; StateId::COUNT] {
    [
        // Index 0 — Idle
        StateDescriptor {
            id: StateId::Idle,
            name: "Idle",
            on_enter: Some(idle_enter),
            on_exit: None,
            on_update: idle_update,
        },
        // Index 1 — Inflating
        StateDescriptor {
            id: StateId::Inflating,
            name: "Inflating",
            on_enter: Some(inflating_enter),
            on_exit: Some(inflating_exit),
            on_update: inflating_update,
        },
        // Index 2 — Settling
        StateDescriptor {
            id: StateId::Settling,
            name: "Settling",
            on_enter: Some(settling_enter),
            on_exit: None,
            on_update: settling_update,
        },
        // Index 3 — Deflating
        StateDescriptor {
            id: StateId::Deflating,
            name: "Deflating",
            on_enter: Some(deflating_enter),
            on_exit: Some(deflating_exit),
            on_update: deflating_update,
        },
        // Index 4 — Analyzing
        StateDescriptor {
            id: StateId::Analyzing,
            name: "Analyzing",
            on_enter: Some(analyzing_enter),
            on_exit: None,
            on_update: analyzing_update,
        },
        // Index 5 — Complete
        StateDescriptor {
            id: StateId::Complete,
            name: "Complete",
            on_enter: Some(complete_enter),
            on_exit: None,
            on_update: terminal_update,
        },
        // Index 6 — Aborted
        StateDescriptor {
            id: StateId::Aborted,
            name: "Aborted",
            on_enter: Some(aborted_enter),
            on_exit: None,
            on_update: terminal_update,
        },
    ]
}

/// Common guard for every live state: a latched fault ends the session.
fn fault_guard(ctx: &mut SessionContext) -> Option<StateId> {
    if ctx.has_faults() {
        if ctx.abort_reason.is_none() {
            ctx.abort_reason = abort_reason_for(ctx.fault_flags);
        }
        return Some(StateId::Aborted);
    }
    None
}

fn abort_with(ctx: &mut SessionContext, reason: AbortReason) -> Option<StateId> {
    ctx.abort_reason.get_or_insert(reason);
    Some(StateId::Aborted)
}

// ═══════════════════════════════════════════════════════════════════════════
//  IDLE
// ═══════════════════════════════════════════════════════════════════════════

fn idle_enter(ctx: &mut SessionContext) {
    ctx.command = ActuatorCommand::Vent;
    info!("IDLE: session {} ready, cuff vented", ctx.session_id);
}

fn idle_update(ctx: &mut SessionContext) -> Option<StateId> {
    if let Some(next) = fault_guard(ctx) {
        return Some(next);
    }
    if ctx.start_requested {
        ctx.start_requested = false;
        return Some(StateId::Inflating);
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  INFLATING — pump bursts against a closed valve
// ═══════════════════════════════════════════════════════════════════════════

fn inflating_enter(ctx: &mut SessionContext) {
    ctx.command = ActuatorCommand::Hold;
    info!(
        "INFLATING: target {:.0} mmHg (soft limit {:.0}, timeout {:.0}s)",
        ctx.config.control.inflate_target_mmhg,
        ctx.config.control.inflate_soft_limit_mmhg,
        ctx.config.control.inflate_timeout_s
    );
}

fn inflating_update(ctx: &mut SessionContext) -> Option<StateId> {
    if let Some(next) = fault_guard(ctx) {
        return Some(next);
    }

    let ctl = &ctx.config.control;
    if let Some(p) = ctx.pressure.usable() {
        if p >= ctl.inflate_target_mmhg - ctl.inflate_hysteresis_mmhg {
            info!(
                "INFLATING: target reached at {p:.1} mmHg after {:.1}s",
                ctx.secs_in_state()
            );
            return Some(StateId::Settling);
        }
    }

    if ctx.secs_in_state() > ctl.inflate_timeout_s {
        warn!(
            "INFLATING: target not reached within {:.0}s (last {:.1} mmHg)",
            ctl.inflate_timeout_s, ctx.pressure.mmhg
        );
        return abort_with(ctx, AbortReason::InflateTimeout);
    }

    ctx.command = if ctx.pressure.usable().is_some() {
        ActuatorCommand::PumpPulse {
            secs: ctl.inflate_pulse_s,
        }
    } else {
        // No trustworthy reading this tick: do not pump blind.
        ActuatorCommand::Hold
    };
    None
}

fn inflating_exit(ctx: &mut SessionContext) {
    ctx.command = ActuatorCommand::Hold;
}

// ═══════════════════════════════════════════════════════════════════════════
//  SETTLING — let cuff and tissue equilibrate
// ═══════════════════════════════════════════════════════════════════════════

fn settling_enter(ctx: &mut SessionContext) {
    ctx.command = ActuatorCommand::Hold;
    info!(
        "SETTLING: holding for {:.1}s",
        ctx.config.control.inflate_grace_s
    );
}

fn settling_update(ctx: &mut SessionContext) -> Option<StateId> {
    if let Some(next) = fault_guard(ctx) {
        return Some(next);
    }
    if ctx.secs_in_state() >= ctx.config.control.inflate_grace_s {
        return Some(StateId::Deflating);
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  DEFLATING — LUT-driven valve PWM, one trace sample per period
// ═══════════════════════════════════════════════════════════════════════════

fn deflating_enter(ctx: &mut SessionContext) {
    let start = ctx.pressure.mmhg;
    ctx.run = Some(DeflateRun::new(ctx.session_id, start));
    info!(
        "DEFLATING: from {start:.1} mmHg to {:.0} mmHg, PWM period {:.3}s",
        ctx.config.control.deflate_cutoff_mmhg, ctx.config.control.deflate_pwm_period_s
    );
}

fn deflating_update(ctx: &mut SessionContext) -> Option<StateId> {
    if let Some(next) = fault_guard(ctx) {
        return Some(next);
    }

    let t = ctx.secs_in_state();
    let ctl = &ctx.config.control;
    if t > ctl.deflate_timeout_s {
        warn!("DEFLATING: cutoff not reached within {:.0}s", ctl.deflate_timeout_s);
        return abort_with(ctx, AbortReason::DeflateTimeout);
    }

    let Some(p) = ctx.pressure.usable() else {
        // Keep the previous valve duty; the safety supervisor bounds how
        // long this can go on.
        if let Some(run) = ctx.run.as_mut() {
            run.record_invalid();
        }
        return None;
    };

    if p < ctl.deflate_cutoff_mmhg {
        return Some(StateId::Analyzing);
    }

    let duty = ctx.calibration.lut.lookup(p);
    let period_secs = ctl.deflate_pwm_period_s;
    if let Some(run) = ctx.run.as_mut() {
        if !run.push(PressureSample {
            t_secs: t,
            pressure_mmhg: p,
            duty,
        }) {
            run.record_invalid();
        }
    }
    ctx.command = ActuatorCommand::DeflatePulse { duty, period_secs };
    None
}

fn deflating_exit(ctx: &mut SessionContext) {
    ctx.command = ActuatorCommand::Vent;
    if let Some(run) = ctx.run.as_ref() {
        info!(
            "DEFLATING: {} samples over {:.1}s ({} dropped)",
            run.len(),
            run.duration_secs(),
            run.invalid_samples
        );
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  ANALYZING — envelope estimation on the recorded trace
// ═══════════════════════════════════════════════════════════════════════════

fn analyzing_enter(ctx: &mut SessionContext) {
    ctx.command = ActuatorCommand::Vent;
}

fn analyzing_update(ctx: &mut SessionContext) -> Option<StateId> {
    if let Some(next) = fault_guard(ctx) {
        return Some(next);
    }

    let run = ctx.run.take().unwrap_or_default();
    let processor = SignalProcessor::new(ctx.config.estimate);
    let mut result = processor.analyze(&run);
    result.quality.bin_rates = achieved_rates(&run, &ctx.calibration.lut);

    match result.abort_reason {
        Some(AbortReason::NoValidEnvelope) => {
            ctx.result = Some(result);
            abort_with(ctx, AbortReason::NoValidEnvelope)
        }
        _ => {
            ctx.result = Some(result);
            Some(StateId::Complete)
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  COMPLETE / ABORTED — terminal, cuff vented
// ═══════════════════════════════════════════════════════════════════════════

fn complete_enter(ctx: &mut SessionContext) {
    ctx.command = ActuatorCommand::Vent;
    match ctx.result.as_ref() {
        Some(r) if r.valid => info!(
            "COMPLETE: SYS {:.0} / DIA {:.0} mmHg, MAP {:.0}",
            r.systolic_mmhg, r.diastolic_mmhg, r.map_mmhg
        ),
        Some(r) => warn!(
            "COMPLETE: measurement rejected ({})",
            r.abort_reason.map_or_else(|| "unknown".into(), |a| a.to_string())
        ),
        None => warn!("COMPLETE: no result recorded"),
    }
}

fn aborted_enter(ctx: &mut SessionContext) {
    ctx.command = ActuatorCommand::Vent;

    let reason = match ctx.abort_reason.or_else(|| abort_reason_for(ctx.fault_flags)) {
        Some(r) => r,
        None => {
            warn!("ABORTED: no reason recorded, reporting user abort");
            AbortReason::UserAbort
        }
    };
    ctx.abort_reason = Some(reason);

    if let Some(run) = ctx.run.as_mut() {
        run.abort_reason = Some(reason);
    }
    let result = match ctx.result.take() {
        Some(r) => r.rejected(reason),
        None => {
            let mut r = MeasurementResult::aborted(reason);
            if let Some(run) = ctx.run.as_ref() {
                r.quality.sample_count = run.len();
                r.quality.invalid_samples = run.invalid_samples;
            }
            r
        }
    };
    ctx.result = Some(result);

    if reason.is_algorithmic() {
        warn!("ABORTED: {reason}, cuff vented");
    } else {
        error!("ABORTED: {reason}, cuff vented");
    }
}

fn terminal_update(ctx: &mut SessionContext) -> Option<StateId> {
    ctx.command = ActuatorCommand::Vent;
    None
}
