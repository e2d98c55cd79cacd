//! Host simulator: virtual clock, HX710 pin pair and cuff pneumatics.
//!
//! Used by the `--simulate` binary mode and by every host test.  All parts
//! share one [`SimClock`]; nothing blocks, `sleep` just advances virtual
//! time, so a full 60 s session runs in milliseconds.
//!
//! ```text
//!  SimPumpPin ─┐                       ┌─▶ SimAdc (DOUT/SCK protocol)
//!  SimValvePin ┴─▶ Cuff (pressure ODE) ┘        counts = f(p + oscillation)
//! ```
//!
//! Physics is integrated lazily: every pin access first advances the cuff
//! to the current virtual time in ≤ 1 ms steps using the actuator state
//! that held until then.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use core::time::Duration;

use embedded_hal::digital::{self, ErrorKind, ErrorType, InputPin, OutputPin};

use crate::calibration::CalibrationParams;
use crate::drivers::hx710::{MAX_24, MIN_24, encode_24};
use crate::hal::Clock;

// ───────────────────────────────────────────────────────────────
// Clock
// ───────────────────────────────────────────────────────────────

/// Virtual monotonic clock.  Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct SimClock {
    now: Rc<Cell<Duration>>,
}

impl SimClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, d: Duration) {
        self.now.set(self.now.get() + d);
    }
}

impl Clock for SimClock {
    fn now(&self) -> Duration {
        self.now.get()
    }

    fn sleep(&self, d: Duration) {
        self.advance(d);
    }
}

// ───────────────────────────────────────────────────────────────
// Pin error
// ───────────────────────────────────────────────────────────────

/// Injected GPIO failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimPinError;

impl digital::Error for SimPinError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

// ───────────────────────────────────────────────────────────────
// Patient + cuff physics
// ───────────────────────────────────────────────────────────────

/// Oscillometric model: Gaussian envelope peaking at MAP, with widths
/// chosen so the envelope is exactly `sys_frac`/`dia_frac` of its peak at
/// SYS/DIA.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimPatient {
    pub systolic_mmhg: f64,
    pub diastolic_mmhg: f64,
    pub heart_rate_hz: f64,
    /// Oscillation amplitude at MAP (mmHg).
    pub peak_amplitude_mmhg: f64,
    width_above: f64,
    width_below: f64,
}

impl SimPatient {
    pub fn new(systolic_mmhg: f64, diastolic_mmhg: f64, sys_frac: f64, dia_frac: f64) -> Self {
        let map = Self::map_of(systolic_mmhg, diastolic_mmhg);
        Self {
            systolic_mmhg,
            diastolic_mmhg,
            heart_rate_hz: 1.2,
            peak_amplitude_mmhg: 2.0,
            width_above: (systolic_mmhg - map) / (-sys_frac.ln()).sqrt(),
            width_below: (map - diastolic_mmhg) / (-dia_frac.ln()).sqrt(),
        }
    }

    fn map_of(sys: f64, dia: f64) -> f64 {
        dia + (sys - dia) / 3.0
    }

    /// Mean arterial pressure of the model.
    pub fn map_mmhg(&self) -> f64 {
        Self::map_of(self.systolic_mmhg, self.diastolic_mmhg)
    }

    /// Oscillation amplitude at cuff pressure `p`.
    pub fn amplitude_at(&self, p: f64) -> f64 {
        let map = self.map_mmhg();
        let w = if p >= map { self.width_above } else { self.width_below };
        let z = (p - map) / w;
        self.peak_amplitude_mmhg * (-z * z).exp()
    }

    fn oscillation(&self, p: f64, t_secs: f64) -> f64 {
        self.amplitude_at(p) * (core::f64::consts::TAU * self.heart_rate_hz * t_secs).sin()
    }
}

/// Pneumatic parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CuffParams {
    /// Pump inflation rate into an empty cuff (mmHg/s).
    pub pump_rate: f64,
    /// Pressure at which the pump stalls (mmHg).
    pub pump_stall_mmhg: f64,
    /// Bleed constant through the open valve (1/s): dp/dt = −k·p.
    pub bleed_per_s: f64,
    /// Leak constant with the valve closed (1/s).
    pub leak_per_s: f64,
}

impl Default for CuffParams {
    fn default() -> Self {
        Self {
            pump_rate: 40.0,
            pump_stall_mmhg: 300.0,
            bleed_per_s: 0.1,
            leak_per_s: 0.0,
        }
    }
}

const PHYSICS_STEP: Duration = Duration::from_millis(1);
/// SCK high longer than this powers the HX710 down.
const POWER_DOWN_THRESHOLD: Duration = Duration::from_micros(60);
/// Data pulses per frame; any further pulses select the next mode.
const DATA_PULSES: u8 = 24;
/// SCK low at least this long ends a frame's mode pulses.
const FRAME_GAP: Duration = Duration::from_micros(20);

#[derive(Debug)]
struct Cuff {
    clock: SimClock,
    updated: Duration,
    pressure: f64,
    peak_pressure: f64,
    pump_on: bool,
    valve_closed: bool,
    params: CuffParams,
    patient: Option<SimPatient>,
    calibration: CalibrationParams,
    /// Pump writes fail from this virtual time on.
    pump_fail_from: Option<Duration>,
    valve_fail_from: Option<Duration>,
    adc_stall_at: Option<Duration>,
}

impl Cuff {
    fn advance(&mut self) {
        let now = self.clock.now();
        while self.updated < now {
            let step = (now - self.updated).min(PHYSICS_STEP);
            let dt = step.as_secs_f64();
            let p = self.pressure;
            let mut dpdt = 0.0;
            if self.pump_on {
                dpdt += self.params.pump_rate * (1.0 - p / self.params.pump_stall_mmhg).max(0.0);
            }
            dpdt -= if self.valve_closed {
                self.params.leak_per_s * p
            } else {
                self.params.bleed_per_s * p
            };
            self.pressure = (p + dpdt * dt).max(0.0);
            self.peak_pressure = self.peak_pressure.max(self.pressure);
            self.updated += step;
        }
    }

    fn sensed_mmhg(&mut self) -> f64 {
        self.advance();
        let t = self.updated.as_secs_f64();
        let osc = self
            .patient
            .map_or(0.0, |pt| pt.oscillation(self.pressure, t));
        self.pressure + osc
    }

    fn counts(&mut self) -> i32 {
        let mmhg = self.sensed_mmhg();
        let counts = self
            .calibration
            .mmhg_to_counts(mmhg)
            .clamp(MIN_24, MAX_24);
        if self.calibration.adc_inverted { !counts } else { counts }
    }

    fn failing(&self, from: Option<Duration>) -> bool {
        from.is_some_and(|at| self.clock.now() >= at)
    }

    fn adc_stalled(&self) -> bool {
        self.adc_stall_at.is_some_and(|at| self.clock.now() >= at)
    }
}

/// Simulated cuff with pump, valve and pressure transducer.
#[derive(Debug, Clone)]
pub struct SimCuff {
    inner: Rc<RefCell<Cuff>>,
}

impl SimCuff {
    pub fn new(clock: SimClock, calibration: CalibrationParams, params: CuffParams) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Cuff {
                updated: clock.now(),
                clock,
                pressure: 0.0,
                peak_pressure: 0.0,
                pump_on: false,
                valve_closed: false,
                params,
                patient: None,
                calibration,
                pump_fail_from: None,
                valve_fail_from: None,
                adc_stall_at: None,
            })),
        }
    }

    pub fn with_patient(self, patient: SimPatient) -> Self {
        self.inner.borrow_mut().patient = Some(patient);
        self
    }

    /// Pressure transducer wired to this cuff, converting at `sps`.
    pub fn adc(&self, sps: f64) -> SimAdc {
        let clock = self.inner.borrow().clock.clone();
        SimAdc::with_source(clock, sps, Source::Cuff(self.inner.clone()))
    }

    pub fn pump_pin(&self) -> SimPumpPin {
        SimPumpPin {
            cuff: self.inner.clone(),
        }
    }

    pub fn valve_pin(&self) -> SimValvePin {
        SimValvePin {
            cuff: self.inner.clone(),
        }
    }

    /// Current cuff pressure without oscillation (mmHg).
    pub fn pressure(&self) -> f64 {
        let mut c = self.inner.borrow_mut();
        c.advance();
        c.pressure
    }

    /// Highest pressure reached so far (mmHg).
    pub fn peak_pressure(&self) -> f64 {
        let mut c = self.inner.borrow_mut();
        c.advance();
        c.peak_pressure
    }

    pub fn set_pressure(&self, mmhg: f64) {
        let mut c = self.inner.borrow_mut();
        c.advance();
        c.pressure = mmhg;
    }

    pub fn pump_running(&self) -> bool {
        self.inner.borrow().pump_on
    }

    pub fn valve_open(&self) -> bool {
        !self.inner.borrow().valve_closed
    }

    /// Stop the ADC from signalling ready from virtual time `at` onwards.
    pub fn stall_adc_at(&self, at: Duration) {
        self.inner.borrow_mut().adc_stall_at = Some(at);
    }

    pub fn fail_pump_writes(&self, fail: bool) {
        self.inner.borrow_mut().pump_fail_from = fail.then_some(Duration::ZERO);
    }

    /// Make pump writes fail from virtual time `at` onwards.
    pub fn fail_pump_writes_from(&self, at: Duration) {
        self.inner.borrow_mut().pump_fail_from = Some(at);
    }

    pub fn fail_valve_writes(&self, fail: bool) {
        self.inner.borrow_mut().valve_fail_from = fail.then_some(Duration::ZERO);
    }

    /// Make valve writes fail from virtual time `at` onwards.
    pub fn fail_valve_writes_from(&self, at: Duration) {
        self.inner.borrow_mut().valve_fail_from = Some(at);
    }
}

/// Pump gate.  HIGH = running.
#[derive(Debug)]
pub struct SimPumpPin {
    cuff: Rc<RefCell<Cuff>>,
}

impl ErrorType for SimPumpPin {
    type Error = SimPinError;
}

impl SimPumpPin {
    fn write(&mut self, on: bool) -> Result<(), SimPinError> {
        let mut c = self.cuff.borrow_mut();
        if c.failing(c.pump_fail_from) {
            return Err(SimPinError);
        }
        c.advance();
        c.pump_on = on;
        Ok(())
    }
}

impl OutputPin for SimPumpPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.write(false)
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.write(true)
    }
}

/// Valve coil.  HIGH = energised = closed.
#[derive(Debug)]
pub struct SimValvePin {
    cuff: Rc<RefCell<Cuff>>,
}

impl ErrorType for SimValvePin {
    type Error = SimPinError;
}

impl SimValvePin {
    fn write(&mut self, energised: bool) -> Result<(), SimPinError> {
        let mut c = self.cuff.borrow_mut();
        if c.failing(c.valve_fail_from) {
            return Err(SimPinError);
        }
        c.advance();
        c.valve_closed = energised;
        Ok(())
    }
}

impl OutputPin for SimValvePin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.write(false)
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.write(true)
    }
}

// ───────────────────────────────────────────────────────────────
// HX710
// ───────────────────────────────────────────────────────────────

#[derive(Debug)]
enum Source {
    Fixed(i32),
    Cuff(Rc<RefCell<Cuff>>),
}

#[derive(Debug)]
struct Adc {
    clock: SimClock,
    period: Duration,
    /// Conversion grid origin (last power-up).
    origin: Duration,
    next_ready: Duration,
    stalled: bool,
    sck_high: bool,
    sck_high_since: Duration,
    sck_low_since: Duration,
    latched: u32,
    tx_pulses: u8,
    total_pulses: u64,
    source: Source,
}

impl Adc {
    fn stalled(&self) -> bool {
        match &self.source {
            Source::Cuff(c) => self.stalled || c.borrow().adc_stalled(),
            Source::Fixed(_) => self.stalled,
        }
    }

    fn powered_down(&self) -> bool {
        self.sck_high && self.clock.now() - self.sck_high_since > POWER_DOWN_THRESHOLD
    }

    fn ready(&self) -> bool {
        !self.stalled() && !self.powered_down() && self.clock.now() >= self.next_ready
    }

    fn sample(&mut self) -> i32 {
        match &self.source {
            Source::Fixed(v) => *v,
            Source::Cuff(c) => c.borrow_mut().counts(),
        }
    }

    /// True while `tx_pulses` belongs to a frame that has not finished:
    /// still shifting data, or clocking mode pulses back to back.
    fn in_frame(&self) -> bool {
        match self.tx_pulses {
            0 => false,
            1..=DATA_PULSES => true,
            _ => self.clock.now().saturating_sub(self.sck_low_since) < FRAME_GAP,
        }
    }

    fn rising_edge(&mut self) {
        self.total_pulses += 1;
        if self.in_frame() {
            self.tx_pulses = self.tx_pulses.saturating_add(1);
        } else if self.ready() {
            self.latched = encode_24(self.sample());
            self.tx_pulses = 1;
            let now = self.clock.now();
            let elapsed = now.saturating_sub(self.origin);
            let periods = elapsed.as_nanos() / self.period.as_nanos().max(1) + 1;
            self.next_ready = self.origin + self.period * periods as u32;
        } else {
            self.tx_pulses = 0;
        }
    }

    fn falling_edge(&mut self) {
        let now = self.clock.now();
        if self.sck_high && now - self.sck_high_since > POWER_DOWN_THRESHOLD {
            // Wake from power-down: restart the conversion grid, first
            // result after four periods.
            self.origin = now;
            self.next_ready = self.origin + self.period * 4;
            self.tx_pulses = 0;
        }
        self.sck_low_since = now;
    }

    fn dout_high(&self) -> bool {
        match self.tx_pulses {
            1..=DATA_PULSES => {
                (self.latched >> (u32::from(DATA_PULSES) - u32::from(self.tx_pulses))) & 1 == 1
            }
            _ => !self.ready(),
        }
    }
}

/// Simulated HX710.  Hand out its pins with [`pins`](Self::pins).
#[derive(Debug, Clone)]
pub struct SimAdc {
    inner: Rc<RefCell<Adc>>,
}

impl SimAdc {
    /// Stand-alone ADC returning a fixed value (see [`set_counts`](Self::set_counts)).
    pub fn new(clock: SimClock, sps: f64) -> Self {
        Self::with_source(clock, sps, Source::Fixed(0))
    }

    fn with_source(clock: SimClock, sps: f64, source: Source) -> Self {
        let period = Duration::from_secs_f64(1.0 / sps.max(1.0));
        let origin = clock.now();
        Self {
            inner: Rc::new(RefCell::new(Adc {
                clock,
                period,
                origin,
                next_ready: origin + period,
                stalled: false,
                sck_high: false,
                sck_high_since: origin,
                sck_low_since: origin,
                latched: 0,
                tx_pulses: 0,
                total_pulses: 0,
                source,
            })),
        }
    }

    pub fn pins(&self) -> (SimDout, SimSck) {
        (
            SimDout {
                adc: self.inner.clone(),
            },
            SimSck {
                adc: self.inner.clone(),
            },
        )
    }

    /// Value returned by subsequent conversions (stand-alone ADC only).
    pub fn set_counts(&self, counts: i32) {
        let mut a = self.inner.borrow_mut();
        if let Source::Fixed(v) = &mut a.source {
            *v = counts;
        }
    }

    pub fn set_stalled(&self, stalled: bool) {
        self.inner.borrow_mut().stalled = stalled;
    }

    /// SCK pulses in the most recent transaction (data + mode pulses).
    pub fn last_transaction_pulses(&self) -> u8 {
        self.inner.borrow().tx_pulses
    }

    pub fn total_pulses(&self) -> u64 {
        self.inner.borrow().total_pulses
    }

    pub fn is_powered_down(&self) -> bool {
        self.inner.borrow().powered_down()
    }
}

/// HX710 DOUT line.
#[derive(Debug)]
pub struct SimDout {
    adc: Rc<RefCell<Adc>>,
}

impl ErrorType for SimDout {
    type Error = core::convert::Infallible;
}

impl InputPin for SimDout {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.adc.borrow().dout_high())
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.adc.borrow().dout_high())
    }
}

/// HX710 PD_SCK line.
#[derive(Debug)]
pub struct SimSck {
    adc: Rc<RefCell<Adc>>,
}

impl ErrorType for SimSck {
    type Error = core::convert::Infallible;
}

impl OutputPin for SimSck {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        let mut a = self.adc.borrow_mut();
        if a.sck_high {
            a.falling_edge();
            a.sck_high = false;
        }
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        let mut a = self.adc.borrow_mut();
        if !a.sck_high {
            a.sck_high = true;
            a.sck_high_since = a.clock.now();
            a.rising_edge();
        }
        Ok(())
    }
}
