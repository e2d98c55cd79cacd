//! Timing primitives injected into drivers and the control loop.
//!
//! GPIO lines use the `embedded-hal` 1.0 digital traits directly; this
//! module adds the one thing those traits don't cover: a monotonic clock
//! that can also sleep.  Production code uses
//! [`MonotonicClock`](crate::adapters::time::MonotonicClock); tests and the
//! simulator use [`SimClock`](crate::sim::SimClock), which advances virtual
//! time instead of blocking.

use core::time::Duration;

/// Monotonic time source with blocking delays.
///
/// `Clone` so that the ADC driver, the actuator controller and the engine
/// can each hold a handle to the same time base.
pub trait Clock: Clone {
    /// Time elapsed since an arbitrary, fixed epoch.
    fn now(&self) -> Duration;

    /// Block for at least `d`.
    fn sleep(&self, d: Duration);

    /// Short busy-wait used inside bit-banged protocols.  Must not yield to
    /// the scheduler for microsecond-scale delays.
    fn delay_us(&self, us: u32) {
        self.sleep(Duration::from_micros(u64::from(us)));
    }

    /// Seconds since the epoch as `f64`.
    fn now_secs(&self) -> f64 {
        self.now().as_secs_f64()
    }
}

/// Convert a non-negative seconds value from configuration into a
/// [`Duration`], clamping negatives and NaN to zero.
pub fn secs(value: f64) -> Duration {
    if value.is_finite() && value > 0.0 {
        Duration::from_secs_f64(value)
    } else {
        Duration::ZERO
    }
}
