//! Host time adapter.
//!
//! [`MonotonicClock`] wraps `std::time::Instant`.  Delays below
//! [`SPIN_THRESHOLD`] busy-wait: the HX710 clock pulses are a microsecond
//! wide and `thread::sleep` overshoots them by tens of microseconds, long
//! enough to push the chip into power-down.

use core::time::Duration;
use std::time::Instant;

use crate::hal::Clock;

/// Delays shorter than this spin instead of sleeping.
pub const SPIN_THRESHOLD: Duration = Duration::from_millis(2);

/// Monotonic clock with an arbitrary epoch (construction time).
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    epoch: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }

    fn spin(d: Duration) {
        let start = Instant::now();
        while start.elapsed() < d {
            core::hint::spin_loop();
        }
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.epoch.elapsed()
    }

    fn sleep(&self, d: Duration) {
        if d >= SPIN_THRESHOLD {
            std::thread::sleep(d);
        } else {
            Self::spin(d);
        }
    }

    fn delay_us(&self, us: u32) {
        Self::spin(Duration::from_micros(u64::from(us)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_are_at_least_requested() {
        let clock = MonotonicClock::new();
        let t0 = clock.now();
        clock.delay_us(200);
        clock.sleep(Duration::from_millis(3));
        assert!(clock.now() - t0 >= Duration::from_micros(3200));
    }
}
