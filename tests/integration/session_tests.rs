//! End-to-end sessions against the simulated cuff.
//!
//! Every scenario drives the real drivers, FSM, safety supervisor and
//! signal processor through [`Engine::run_session`]; only the pins and the
//! clock are simulated.

use core::time::Duration;

use cuffbp::app::events::SessionEvent;
use cuffbp::app::ports::{AbortFn, NoAbort};
use cuffbp::config::EngineConfig;
use cuffbp::error::{AbortReason, SafetyFault};
use cuffbp::fsm::StateId;
use cuffbp::hal::Clock;
use cuffbp::sim::{CuffParams, SimPatient};

use crate::bench::Bench;

// ── Full measurement ──────────────────────────────────────────

#[test]
fn healthy_patient_measured_within_tolerance() {
    let mut bench = Bench::standard();
    let r = bench.run(&NoAbort);

    assert!(r.valid, "result rejected: {:?}", r.abort_reason);
    assert_eq!(r.abort_reason, None);
    assert!((r.systolic_mmhg - 120.0).abs() <= 4.0, "SYS {}", r.systolic_mmhg);
    assert!((r.diastolic_mmhg - 80.0).abs() <= 4.0, "DIA {}", r.diastolic_mmhg);
    let map = SimPatient::new(120.0, 80.0, 0.55, 0.80).map_mmhg();
    assert!((r.map_mmhg - map).abs() <= 8.0, "MAP {}", r.map_mmhg);
    assert!(r.diastolic_mmhg < r.map_mmhg && r.map_mmhg < r.systolic_mmhg);
    assert!((r.pulse_pressure_mmhg - (r.systolic_mmhg - r.diastolic_mmhg)).abs() < 1e-9);
}

#[test]
fn healthy_session_walks_every_state() {
    let mut bench = Bench::standard();
    bench.run(&NoAbort);

    assert_eq!(
        bench.state_path(),
        vec![
            StateId::Idle,
            StateId::Inflating,
            StateId::Settling,
            StateId::Deflating,
            StateId::Analyzing,
            StateId::Complete,
        ]
    );
    assert!(matches!(bench.events.first(), Some(SessionEvent::Started { session_id: 1 })));
    assert!(matches!(bench.events.last(), Some(SessionEvent::Completed(r)) if r.valid));
    assert!(bench.fault_events().is_empty());
}

#[test]
fn healthy_session_quality_block() {
    let mut bench = Bench::standard();
    let r = bench.run(&NoAbort);
    let q = &r.quality;

    assert!(q.sample_count > 500, "samples {}", q.sample_count);
    assert!(q.avg_dpdt > 2.0 && q.avg_dpdt < 4.0, "dp/dt {}", q.avg_dpdt);
    assert!(q.peak_amplitude > 1.0 && q.peak_amplitude < 3.0);
    assert!(q.envelope_snr_proxy > 1.0);
    assert!(q.sample_rate_hz > 15.0 && q.sample_rate_hz < 25.0);
    assert_eq!(q.invalid_samples, 0);
    assert!(!q.bin_rates.is_empty());
}

#[test]
fn session_ends_vented_and_releases_lease() {
    let mut bench = Bench::standard();
    bench.run(&NoAbort);

    assert!(bench.is_vented());
    assert!(!bench.engine.calibration().is_session_active());
    assert!(bench.adc.is_powered_down());
    let peak = bench.cuff.peak_pressure();
    assert!(peak >= 168.0 && peak < 250.0, "peak {peak}");
}

#[test]
fn inverted_adc_measures_the_same() {
    let mut config = EngineConfig::default();
    config.calibration.adc_inverted = true;
    let patient = SimPatient::new(120.0, 80.0, config.estimate.sys_frac, config.estimate.dia_frac);
    let mut bench = Bench::new(config, patient, CuffParams::default());
    let r = bench.run(&NoAbort);

    assert!(r.valid, "result rejected: {:?}", r.abort_reason);
    assert!((r.systolic_mmhg - 120.0).abs() <= 4.0);
    assert!((r.diastolic_mmhg - 80.0).abs() <= 4.0);
}

#[test]
fn flat_trace_aborts_with_no_valid_envelope() {
    let mut config = EngineConfig::default();
    config.estimate.min_peak_amplitude_mmhg = 0.5;
    let mut quiet = SimPatient::new(120.0, 80.0, 0.55, 0.80);
    quiet.peak_amplitude_mmhg = 0.0;
    let mut bench = Bench::new(config, quiet, CuffParams::default());
    let r = bench.run(&NoAbort);

    assert!(!r.valid);
    assert_eq!(r.abort_reason, Some(AbortReason::NoValidEnvelope));
    assert_eq!(bench.events.last(), Some(&SessionEvent::Aborted(AbortReason::NoValidEnvelope)));
    assert_eq!(bench.state_path().last(), Some(&StateId::Aborted));
    assert!(bench.state_path().contains(&StateId::Analyzing));
    assert!(bench.is_vented());
}

// ── Safety aborts ─────────────────────────────────────────────

#[test]
fn runaway_pump_aborts_on_overpressure() {
    let config = EngineConfig::default();
    let patient = SimPatient::new(120.0, 80.0, 0.55, 0.80);
    let params = CuffParams {
        pump_rate: 1500.0,
        pump_stall_mmhg: 1000.0,
        ..CuffParams::default()
    };
    let mut bench = Bench::new(config, patient, params);
    let r = bench.run(&NoAbort);

    assert!(!r.valid);
    assert_eq!(r.abort_reason, Some(AbortReason::Overpressure));
    assert!(bench.cuff.peak_pressure() >= 250.0);
    assert!(bench.is_vented());
    assert!(
        bench
            .fault_events()
            .iter()
            .any(|f| f & SafetyFault::Overpressure.mask() != 0)
    );
    assert_eq!(bench.events.last(), Some(&SessionEvent::Aborted(AbortReason::Overpressure)));
    assert_eq!(bench.state_path().last(), Some(&StateId::Aborted));
}

#[test]
fn adc_stall_mid_deflate_aborts_with_sensor_timeout() {
    let mut bench = Bench::standard();
    bench.cuff.stall_adc_at(Duration::from_secs(15));
    let r = bench.run(&NoAbort);

    assert_eq!(r.abort_reason, Some(AbortReason::SensorTimeout));
    assert!(!r.valid);
    assert!(bench.dropped_samples() >= 3, "dropped {}", bench.dropped_samples());
    assert!(bench.state_path().contains(&StateId::Deflating));
    assert!(bench.is_vented());
}

#[test]
fn user_abort_mid_inflate_vents() {
    let mut bench = Bench::standard();
    let clock = bench.clock.clone();
    let abort = AbortFn(move || clock.now() >= Duration::from_secs(5));
    let r = bench.run(&abort);

    assert_eq!(r.abort_reason, Some(AbortReason::UserAbort));
    assert!(bench.is_vented());
    assert!(bench.clock.now() < Duration::from_secs(6));
    assert_eq!(bench.events.last(), Some(&SessionEvent::Aborted(AbortReason::UserAbort)));
}

#[test]
fn weak_pump_hits_inflate_timeout() {
    let config = EngineConfig::default();
    let patient = SimPatient::new(120.0, 80.0, 0.55, 0.80);
    let params = CuffParams {
        pump_stall_mmhg: 100.0,
        ..CuffParams::default()
    };
    let mut bench = Bench::new(config, patient, params);
    let r = bench.run(&NoAbort);

    assert_eq!(r.abort_reason, Some(AbortReason::InflateTimeout));
    assert!(bench.clock.now() >= Duration::from_secs(30));
    assert!(bench.cuff.peak_pressure() < 100.0);
    assert!(bench.is_vented());
    assert!(!bench.state_path().contains(&StateId::Deflating));
}

#[test]
fn valve_failure_mid_inflate_stops_pump() {
    let mut bench = Bench::standard();
    bench.cuff.fail_valve_writes_from(Duration::from_secs(3));
    let r = bench.run(&NoAbort);

    assert_eq!(r.abort_reason, Some(AbortReason::ActuatorFault));
    assert!(!bench.cuff.pump_running());
    assert!(
        bench
            .fault_events()
            .iter()
            .any(|f| f & SafetyFault::ActuatorFault.mask() != 0)
    );
    assert!(!bench.engine.calibration().is_session_active());
}

#[test]
fn dead_pump_line_aborts_before_inflating() {
    let mut bench = Bench::standard();
    bench.cuff.fail_pump_writes(true);
    let r = bench.run(&NoAbort);

    assert_eq!(r.abort_reason, Some(AbortReason::ActuatorFault));
    assert!(bench.cuff.peak_pressure() < 1.0);
    assert!(bench.cuff.valve_open());
}

// ── Engine lifecycle ──────────────────────────────────────────

#[test]
fn session_ids_increase_across_runs() {
    let mut bench = Bench::standard();
    bench.run(&AbortFn(|| true));
    bench.run(&AbortFn(|| true));

    let ids: Vec<u32> = bench
        .events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::Started { session_id } => Some(*session_id),
            _ => None,
        })
        .collect();
    assert_eq!(ids, vec![1, 2]);
}

#[test]
fn calibration_replaceable_between_sessions() {
    let mut bench = Bench::standard();
    bench.run(&AbortFn(|| true));

    let mut config = bench.engine.config().clone();
    config.calibration.offset_counts += 10;
    let replacement = cuffbp::calibration::Calibration::from_config(&config);
    assert!(bench.engine.calibration().replace(replacement).is_ok());
    assert_eq!(bench.engine.calibration().snapshot().params.offset_counts, 120_010);
}
