//! cuffbp: run one oscillometric measurement and print the result as JSON.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    Adapters (outer ring)                     │
//! │                                                              │
//! │  HardwareAdapter        LogEventSink      MonotonicClock     │
//! │  (Pressure+Actuator)    (EventSink)       / SimClock         │
//! │  rppal GPIO / sim pins  stdin abort       (Clock)            │
//! │                                                              │
//! │  ──────────────── Port Trait Boundary ─────────────────      │
//! │                                                              │
//! │  ┌────────────────────────────────────────────────────────┐  │
//! │  │              Engine (session loop)                     │  │
//! │  │  FSM · Safety · DSP                                    │  │
//! │  └────────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};

use cuffbp::adapters::hardware::HardwareAdapter;
use cuffbp::adapters::log_sink::LogEventSink;
use cuffbp::app::service::Engine;
use cuffbp::calibration::Calibration;
use cuffbp::config::EngineConfig;
use cuffbp::measurement::MeasurementResult;
use cuffbp::sim::{CuffParams, SimClock, SimCuff, SimPatient};

#[derive(Debug, Parser)]
#[command(name = "cuffbp", version, about = "Oscillometric cuff blood-pressure measurement")]
struct Args {
    /// Engine configuration (YAML, or JSON with a .json extension).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run against the built-in cuff simulator instead of GPIO.
    #[arg(long)]
    simulate: bool,

    /// Simulated patient systolic pressure (mmHg).
    #[arg(long, default_value_t = 120.0, requires = "simulate")]
    sim_systolic: f64,

    /// Simulated patient diastolic pressure (mmHg).
    #[arg(long, default_value_t = 80.0, requires = "simulate")]
    sim_diastolic: f64,

    /// Pretty-print the JSON result.
    #[arg(long)]
    pretty: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    info!("cuffbp v{}", env!("CARGO_PKG_VERSION"));

    let config = match &args.config {
        Some(path) => {
            let cfg = EngineConfig::load(path)
                .with_context(|| format!("loading config {}", path.display()))?;
            info!("Config loaded from {}", path.display());
            cfg
        }
        None => {
            warn!("No --config given, using bench defaults");
            EngineConfig::default()
        }
    };
    config.validate().context("validating config")?;

    let engine = Engine::new(config);
    let result = if args.simulate {
        run_simulated(&engine, &args)?
    } else {
        run_hardware(&engine)?
    };

    let json = if args.pretty {
        serde_json::to_string_pretty(&result)?
    } else {
        serde_json::to_string(&result)?
    };
    println!("{json}");
    Ok(())
}

/// One session against the simulator, in virtual time.
fn run_simulated(engine: &Engine, args: &Args) -> Result<MeasurementResult> {
    let config = engine.config();
    let cal = Calibration::from_config(config).params;
    let patient = SimPatient::new(
        args.sim_systolic,
        args.sim_diastolic,
        config.estimate.sys_frac,
        config.estimate.dia_frac,
    );
    info!(
        "Simulating patient {:.0}/{:.0} mmHg (MAP {:.0})",
        args.sim_systolic,
        args.sim_diastolic,
        patient.map_mmhg()
    );

    let clock = SimClock::new();
    let cuff = SimCuff::new(clock.clone(), cal, CuffParams::default()).with_patient(patient);
    let adc = cuff.adc(config.mode.rate_hz());
    let (dout, sck) = adc.pins();
    let mut hw = HardwareAdapter::new(
        dout,
        sck,
        cuff.pump_pin(),
        cuff.valve_pin(),
        clock.clone(),
        cal,
    )
    .context("claiming simulated actuators")?;

    let mut sink = LogEventSink::new();
    let result = engine.run_session(&mut hw, &clock, &cuffbp::app::ports::NoAbort, &mut sink)?;
    info!(
        "Simulated cuff peaked at {:.1} mmHg, {} samples dropped",
        cuff.peak_pressure(),
        sink.dropped_samples()
    );
    Ok(result)
}

/// Abort flag raised when the operator presses Enter.
#[cfg_attr(not(feature = "rpi"), allow(dead_code))]
fn stdin_abort() -> Arc<AtomicBool> {
    let flag = Arc::new(AtomicBool::new(false));
    let raised = Arc::clone(&flag);
    std::thread::spawn(move || {
        let mut line = String::new();
        if std::io::stdin().read_line(&mut line).is_ok_and(|n| n > 0) {
            raised.store(true, Ordering::Release);
        }
    });
    flag
}

#[cfg(feature = "rpi")]
fn run_hardware(engine: &Engine) -> Result<MeasurementResult> {
    use cuffbp::adapters::gpio;
    use cuffbp::adapters::time::MonotonicClock;

    let config = engine.config();
    let pins = gpio::open(&config.gpio).context("opening GPIO")?;
    let clock = MonotonicClock::new();
    let mut hw = HardwareAdapter::new(
        pins.dout,
        pins.sck,
        pins.pump,
        pins.valve,
        clock,
        Calibration::from_config(config).params,
    )
    .context("claiming pump/valve lines")?;

    info!("Press Enter to abort and vent the cuff");
    let abort = stdin_abort();
    let mut sink = LogEventSink::new();
    let result = engine.run_session(&mut hw, &clock, &abort, &mut sink)?;
    info!("ADC: {:?}", hw.adc_stats());
    Ok(result)
}

#[cfg(not(feature = "rpi"))]
fn run_hardware(_engine: &Engine) -> Result<MeasurementResult> {
    anyhow::bail!("built without the `rpi` feature: no GPIO backend, use --simulate")
}
