//! HX710 24-bit pressure ADC, bit-banged over two GPIO lines.
//!
//! ```text
//!  DOUT ‾‾‾‾‾\____[b23][b22] ... [b0]‾‾‾‾‾‾‾‾‾‾
//!  SCK  ______/‾\_/‾\_ ... _/‾\_/‾\_/‾\_______      24 data + 1..3 mode pulses
//!             ^ ready (DOUT low)            ^ mode pulses select the NEXT conversion
//! ```
//!
//! DOUT falls when a conversion is ready.  Each SCK pulse shifts one bit
//! out, MSB first; the driver samples after the falling edge.  After the
//! 24 data bits, 1–3 extra pulses select the input and rate of the next
//! conversion.  Holding SCK high for more than 60 µs powers the chip down,
//! so the bit loop only ever uses microsecond delays.
//!
//! The driver is generic over `embedded-hal` pins and a [`Clock`]; the
//! same code runs on a Raspberry Pi (rppal pins) and against the
//! simulator in tests.

use core::time::Duration;

use embedded_hal::digital::{InputPin, OutputPin};
use log::{debug, info, warn};

use crate::error::HwError;
use crate::hal::Clock;
use crate::measurement::RawSample;

/// Smallest 24-bit two's-complement value; a reading equal to it is
/// saturation, not data.
pub const MIN_24: i32 = -(1 << 23);
/// Largest 24-bit two's-complement value; saturation.
pub const MAX_24: i32 = (1 << 23) - 1;

const DATA_BITS: u8 = 24;
/// SCK high/low hold inside the bit loop.
const CLOCK_HOLD_US: u32 = 1;
/// DOUT poll interval while waiting for a conversion.
const READY_POLL_US: u32 = 50;
/// SCK high time used for power-down (chip requires > 60 µs).
const POWER_DOWN_HOLD_US: u32 = 100;
/// Wake-up conversions discarded by [`Hx710::initialize`].
const WAKE_READS: u8 = 3;

/// Conversion mode, selected by the total number of SCK pulses per read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Differential input, 10 samples/s (25 pulses).
    Diff10Hz,
    /// Temperature / auxiliary input, 40 samples/s (26 pulses).
    Temp40Hz,
    /// Differential input, 40 samples/s (27 pulses).
    Diff40Hz,
}

impl Mode {
    /// Total SCK pulses per transaction (24 data + mode pulses).
    pub const fn pulses(self) -> u8 {
        match self {
            Self::Diff10Hz => 25,
            Self::Temp40Hz => 26,
            Self::Diff40Hz => 27,
        }
    }

    /// Extra pulses after the 24 data bits.
    pub const fn mode_pulses(self) -> u8 {
        self.pulses() - DATA_BITS
    }

    /// Output settling time after power-up or a mode change.
    pub const fn settle_time(self) -> Duration {
        match self {
            Self::Diff10Hz => Duration::from_millis(400),
            Self::Temp40Hz | Self::Diff40Hz => Duration::from_millis(100),
        }
    }

    /// Nominal time between conversions.
    pub const fn conversion_period(self) -> Duration {
        match self {
            Self::Diff10Hz => Duration::from_millis(100),
            Self::Temp40Hz | Self::Diff40Hz => Duration::from_millis(25),
        }
    }
}

/// Sign-extend a 24-bit two's-complement word.
pub const fn decode_24(raw: u32) -> i32 {
    let raw = raw & 0x00FF_FFFF;
    if raw & 0x0080_0000 != 0 {
        (raw | 0xFF00_0000) as i32
    } else {
        raw as i32
    }
}

/// Inverse of [`decode_24`] for values in `[MIN_24, MAX_24]`.
pub const fn encode_24(value: i32) -> u32 {
    (value as u32) & 0x00FF_FFFF
}

/// True if `value` sits on either rail of the 24-bit range.
pub const fn is_saturated(value: i32) -> bool {
    value == MIN_24 || value == MAX_24
}

/// Read counters since construction (or the last [`Hx710::reset_stats`]).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AdcStats {
    pub read_count: u32,
    pub error_count: u32,
    pub saturated_count: u32,
    /// `error_count / (read_count + error_count)`, 0 with no attempts.
    pub error_rate: f32,
    pub last_value: Option<i32>,
}

/// HX710 driver.
pub struct Hx710<DOUT, SCK, C> {
    dout: DOUT,
    sck: SCK,
    clock: C,
    mode: Mode,
    inverted: bool,
    powered: bool,
    read_count: u32,
    error_count: u32,
    saturated_count: u32,
    last_value: Option<i32>,
}

impl<DOUT, SCK, C> Hx710<DOUT, SCK, C>
where
    DOUT: InputPin,
    SCK: OutputPin,
    C: Clock,
{
    pub fn new(dout: DOUT, sck: SCK, clock: C, mode: Mode, inverted: bool) -> Self {
        Self {
            dout,
            sck,
            clock,
            mode,
            inverted,
            powered: false,
            read_count: 0,
            error_count: 0,
            saturated_count: 0,
            last_value: None,
        }
    }

    /// Drive SCK low, wait for the output to settle, then discard up to
    /// three wake-up conversions.  Saturated or late wake-up reads are not
    /// an error; only a pin failure is.
    pub fn initialize(&mut self) -> Result<(), HwError> {
        self.sck.set_low().map_err(|_| HwError::Gpio)?;
        self.powered = true;
        self.clock.sleep(self.mode.settle_time());

        let wake_timeout = self.mode.conversion_period() * 4;
        for attempt in 1..=WAKE_READS {
            match self.read(wake_timeout) {
                Ok(v) if !is_saturated(v) => {
                    debug!("HX710: wake read {attempt} = {v}");
                    break;
                }
                Ok(v) => debug!("HX710: wake read {attempt} saturated ({v})"),
                Err(HwError::Timeout) => debug!("HX710: wake read {attempt} timed out"),
                Err(e) => return Err(e),
            }
        }
        self.reset_stats();
        info!(
            "HX710 initialised ({:?}, {} pulses{})",
            self.mode,
            self.mode.pulses(),
            if self.inverted { ", inverted" } else { "" }
        );
        Ok(())
    }

    /// One conversion.
    ///
    /// Waits up to `timeout` for DOUT to fall; on timeout no clock pulse is
    /// issued.  Otherwise clocks 24 data bits and the mode pulses, then
    /// sign-extends and optionally inverts.
    pub fn read(&mut self, timeout: Duration) -> Result<i32, HwError> {
        match self.transact(timeout) {
            Ok(value) => {
                self.read_count = self.read_count.saturating_add(1);
                if is_saturated(value) {
                    self.saturated_count = self.saturated_count.saturating_add(1);
                }
                self.last_value = Some(value);
                Ok(value)
            }
            Err(e) => {
                self.error_count = self.error_count.saturating_add(1);
                Err(e)
            }
        }
    }

    /// [`read`](Self::read) with the completion timestamp attached.
    pub fn read_sample(&mut self, timeout: Duration) -> Result<RawSample, HwError> {
        let counts = self.read(timeout)?;
        Ok(RawSample {
            timestamp: self.clock.now(),
            counts,
        })
    }

    /// Hold SCK high long enough for the chip to enter power-down.
    pub fn power_down(&mut self) -> Result<(), HwError> {
        self.sck.set_high().map_err(|_| HwError::Gpio)?;
        self.clock.delay_us(POWER_DOWN_HOLD_US);
        self.powered = false;
        debug!("HX710: powered down");
        Ok(())
    }

    /// Release SCK and wait for the first conversion to settle.
    pub fn power_up(&mut self) -> Result<(), HwError> {
        self.sck.set_low().map_err(|_| HwError::Gpio)?;
        self.clock.sleep(self.mode.settle_time());
        self.powered = true;
        debug!("HX710: powered up");
        Ok(())
    }

    pub fn is_powered(&self) -> bool {
        self.powered
    }

    /// Change the conversion mode.  Takes effect after the next read.
    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn set_inverted(&mut self, inverted: bool) {
        self.inverted = inverted;
    }

    pub fn stats(&self) -> AdcStats {
        let attempts = self.read_count + self.error_count;
        AdcStats {
            read_count: self.read_count,
            error_count: self.error_count,
            saturated_count: self.saturated_count,
            error_rate: if attempts == 0 {
                0.0
            } else {
                self.error_count as f32 / attempts as f32
            },
            last_value: self.last_value,
        }
    }

    pub fn reset_stats(&mut self) {
        self.read_count = 0;
        self.error_count = 0;
        self.saturated_count = 0;
    }

    /// Give the pins back.
    pub fn release(self) -> (DOUT, SCK) {
        (self.dout, self.sck)
    }

    // ── Internal ──────────────────────────────────────────────────

    fn transact(&mut self, timeout: Duration) -> Result<i32, HwError> {
        self.wait_ready(timeout)?;

        let mut raw: u32 = 0;
        for _ in 0..DATA_BITS {
            self.pulse()?;
            let bit = self.dout.is_high().map_err(|_| HwError::Gpio)?;
            raw = (raw << 1) | u32::from(bit);
        }
        for _ in 0..self.mode.mode_pulses() {
            self.pulse()?;
        }

        let value = decode_24(raw);
        Ok(if self.inverted { !value } else { value })
    }

    fn wait_ready(&mut self, timeout: Duration) -> Result<(), HwError> {
        let start = self.clock.now();
        loop {
            if self.dout.is_low().map_err(|_| HwError::Gpio)? {
                return Ok(());
            }
            if self.clock.now().saturating_sub(start) >= timeout {
                warn!("HX710: DOUT not ready within {timeout:?}");
                return Err(HwError::Timeout);
            }
            self.clock.delay_us(READY_POLL_US);
        }
    }

    fn pulse(&mut self) -> Result<(), HwError> {
        self.sck.set_high().map_err(|_| HwError::Gpio)?;
        self.clock.delay_us(CLOCK_HOLD_US);
        self.sck.set_low().map_err(|_| HwError::Gpio)?;
        self.clock.delay_us(CLOCK_HOLD_US);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimAdc, SimClock, SimDout, SimSck};

    fn driver(
        adc: &SimAdc,
        clock: &SimClock,
        mode: Mode,
        inverted: bool,
    ) -> Hx710<SimDout, SimSck, SimClock> {
        let (dout, sck) = adc.pins();
        Hx710::new(dout, sck, clock.clone(), mode, inverted)
    }

    #[test]
    fn decode_sign_extends() {
        assert_eq!(decode_24(0x00_0001), 1);
        assert_eq!(decode_24(0x7F_FFFF), MAX_24);
        assert_eq!(decode_24(0x80_0000), MIN_24);
        assert_eq!(decode_24(0xFF_FFFF), -1);
        assert_eq!(decode_24(0xFF_FFF3), -13);
    }

    #[test]
    fn saturation_only_at_rails() {
        assert!(is_saturated(MIN_24));
        assert!(is_saturated(MAX_24));
        assert!(!is_saturated(MAX_24 - 1));
        assert!(!is_saturated(0));
    }

    #[test]
    fn reads_counts_and_clocks_mode_pulses() {
        let clock = SimClock::new();
        let adc = SimAdc::new(clock.clone(), 40.0);
        adc.set_counts(123_456);
        let mut hx = driver(&adc, &clock, Mode::Diff40Hz, false);

        assert_eq!(hx.read(Duration::from_millis(100)), Ok(123_456));
        assert_eq!(adc.last_transaction_pulses(), 27);

        hx.set_mode(Mode::Diff10Hz);
        adc.set_counts(-42);
        assert_eq!(hx.read(Duration::from_millis(200)), Ok(-42));
        assert_eq!(adc.last_transaction_pulses(), 25);

        hx.set_mode(Mode::Temp40Hz);
        hx.read(Duration::from_millis(200)).unwrap();
        assert_eq!(adc.last_transaction_pulses(), 26);
    }

    #[test]
    fn inversion_keeps_rails_on_rails() {
        let clock = SimClock::new();
        let adc = SimAdc::new(clock.clone(), 40.0);
        let mut hx = driver(&adc, &clock, Mode::Diff40Hz, true);

        adc.set_counts(1000);
        assert_eq!(hx.read(Duration::from_millis(100)), Ok(-1001));
        adc.set_counts(MAX_24);
        let v = hx.read(Duration::from_millis(100)).unwrap();
        assert_eq!(v, MIN_24);
        assert!(is_saturated(v));
        assert_eq!(hx.stats().saturated_count, 1);
    }

    #[test]
    fn stalled_adc_times_out_without_pulses() {
        let clock = SimClock::new();
        let adc = SimAdc::new(clock.clone(), 40.0);
        adc.set_stalled(true);
        let mut hx = driver(&adc, &clock, Mode::Diff40Hz, false);

        let timeout = Duration::from_millis(200);
        let before = clock.now();
        assert_eq!(hx.read(timeout), Err(HwError::Timeout));
        let elapsed = clock.now() - before;

        assert!(elapsed >= timeout);
        assert!(elapsed <= timeout + Duration::from_millis(1));
        assert_eq!(adc.total_pulses(), 0);

        let stats = hx.stats();
        assert_eq!(stats.error_count, 1);
        assert_eq!(stats.read_count, 0);
        assert!((stats.error_rate - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn initialize_tolerates_saturated_wake_reads() {
        let clock = SimClock::new();
        let adc = SimAdc::new(clock.clone(), 40.0);
        adc.set_counts(MAX_24);
        let mut hx = driver(&adc, &clock, Mode::Diff40Hz, false);

        assert!(hx.initialize().is_ok());
        assert!(clock.now() >= Mode::Diff40Hz.settle_time());
        assert_eq!(hx.stats().read_count, 0);
    }

    #[test]
    fn initialize_tolerates_stalled_adc() {
        let clock = SimClock::new();
        let adc = SimAdc::new(clock.clone(), 10.0);
        adc.set_stalled(true);
        let mut hx = driver(&adc, &clock, Mode::Diff10Hz, false);
        assert!(hx.initialize().is_ok());
        assert!(clock.now() >= Mode::Diff10Hz.settle_time());
    }

    #[test]
    fn power_down_holds_sck_high() {
        let clock = SimClock::new();
        let adc = SimAdc::new(clock.clone(), 40.0);
        let mut hx = driver(&adc, &clock, Mode::Diff40Hz, false);

        hx.power_down().unwrap();
        assert!(!hx.is_powered());
        assert!(adc.is_powered_down());

        hx.power_up().unwrap();
        assert!(hx.is_powered());
        assert!(!adc.is_powered_down());
        adc.set_counts(77);
        assert_eq!(hx.read(Duration::from_millis(100)), Ok(77));
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn encode_decode_roundtrip(v in MIN_24..=MAX_24) {
            prop_assert_eq!(decode_24(encode_24(v)), v);
        }

        #[test]
        fn inversion_stays_in_range(v in MIN_24..=MAX_24) {
            let inv = !v;
            prop_assert!((MIN_24..=MAX_24).contains(&inv));
            prop_assert_eq!(is_saturated(inv), is_saturated(v));
        }
    }
}
