//! Simulated bench for session tests.
//!
//! Wires a [`SimCuff`] (pump, valve, transducer physics and a synthetic
//! patient) to the real drivers through [`HardwareAdapter`], and records
//! every emitted event.

use cuffbp::adapters::hardware::HardwareAdapter;
use cuffbp::app::events::SessionEvent;
use cuffbp::app::ports::AbortSignal;
use cuffbp::app::service::Engine;
use cuffbp::calibration::Calibration;
use cuffbp::config::EngineConfig;
use cuffbp::fsm::StateId;
use cuffbp::measurement::MeasurementResult;
use cuffbp::sim::{
    CuffParams, SimAdc, SimClock, SimCuff, SimDout, SimPatient, SimPumpPin, SimSck, SimValvePin,
};

pub type SimHardware = HardwareAdapter<SimDout, SimSck, SimPumpPin, SimValvePin, SimClock>;

pub struct Bench {
    pub clock: SimClock,
    pub cuff: SimCuff,
    pub adc: SimAdc,
    pub hw: SimHardware,
    pub engine: Engine,
    pub events: Vec<SessionEvent>,
}

#[allow(dead_code)]
impl Bench {
    pub fn new(config: EngineConfig, patient: SimPatient, params: CuffParams) -> Self {
        config.validate().unwrap();
        let clock = SimClock::new();
        let cal = Calibration::from_config(&config).params;
        let cuff = SimCuff::new(clock.clone(), cal, params).with_patient(patient);
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
        Self {
            clock,
            cuff,
            adc,
            hw,
            engine: Engine::new(config),
            events: Vec::new(),
        }
    }

    /// Default config, default cuff, a 120/80 patient.
    pub fn standard() -> Self {
        let config = EngineConfig::default();
        let est = &config.estimate;
        let patient = SimPatient::new(120.0, 80.0, est.sys_frac, est.dia_frac);
        Self::new(config, patient, CuffParams::default())
    }

    pub fn run(&mut self, abort: &impl AbortSignal) -> MeasurementResult {
        self.engine
            .run_session(&mut self.hw, &self.clock, abort, &mut self.events)
            .unwrap()
    }

    /// Pump off and valve open.
    pub fn is_vented(&self) -> bool {
        self.cuff.valve_open() && !self.cuff.pump_running()
    }

    /// States entered, in order, starting from Idle.
    pub fn state_path(&self) -> Vec<StateId> {
        let mut path = vec![StateId::Idle];
        path.extend(self.events.iter().filter_map(|e| match e {
            SessionEvent::StateChanged { to, .. } => Some(*to),
            _ => None,
        }));
        path
    }

    pub fn dropped_samples(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, SessionEvent::SampleDropped { .. }))
            .count()
    }

    pub fn fault_events(&self) -> Vec<u8> {
        self.events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::FaultDetected(f) => Some(*f),
                _ => None,
            })
            .collect()
    }
}
